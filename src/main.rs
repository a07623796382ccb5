use clap::{CommandFactory, Parser};
use revymanus::batch::Workers;
use revymanus::cache::CacheGate;
use revymanus::convert::LatexConverter;
use revymanus::pipeline::{Pipeline, Request};
use revymanus::render::TexRenderer;
use revymanus::{config, output, plan};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc;

#[derive(Parser)]
#[command(name = "revymanus")]
#[command(about = "Assemble a revue manuscript from LaTeX parts")]
#[command(long_about = "\
Assemble a revue manuscript from LaTeX parts

The plan file (aktoversigt.plan) lists acts, materials, roles and props.
Every part is rendered to LaTeX, converted to PDF and merged in order.

Parts:
  aktoversigt   act outline                 pdf/aktoversigt.pdf
  roles         role overview               pdf/rolleliste.pdf
  frontpage     frontpage                   pdf/forside.pdf
  props         prop list                   pdf/rekvisitliste.pdf
  contacts      contact list                pdf/kontaktliste.pdf
  signup        role signup form            pdf/rolletilmelding.pdf
  material      every sketch and song       pdf/<category>/<name>.pdf
  individual    one booklet per actor       pdf/individuelle/<actor>.pdf
  songmanus     song manuscript             pdf/sangmanuskript.pdf
  manus         everything but signup, then pdf/manuskript.pdf

With no parts, the whole manuscript is made. 'plan' writes a new plan file
from the .tex files below the material directory; so does any run when the
plan file is missing.

Per-actor frontpages are cached in pdf/cache/ and reused while they exist.")]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = config::CONFIG_FILENAME)]
    config: PathBuf,

    /// Regenerate cached frontpages
    #[arg(long)]
    no_cache: bool,

    /// Maximum parallel jobs (overrides processing.max_processes)
    #[arg(long, short)]
    jobs: Option<usize>,

    /// Print a stock revy.toml with all options documented
    #[arg(long)]
    gen_config: bool,

    /// Parts to make
    parts: Vec<String>,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    if cli.gen_config {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let request = match Request::from_tokens(&cli.parts) {
        Ok(request) => request,
        Err(e) => Cli::command()
            .error(clap::error::ErrorKind::InvalidValue, e)
            .exit(),
    };

    let mut config = config::load_config(&cli.config)?;
    if let Some(jobs) = cli.jobs {
        config.processing.max_processes = Some(jobs);
        config.validate()?;
    }

    if request == Request::Plan || !config.paths.plan.exists() {
        let count = plan::create_plan_file(&config.paths)?;
        output::print_plan_created(&config.paths.plan, count);
        return Ok(());
    }

    let revue = plan::load_plan(&config.paths.plan, &config.paths.material)?;
    let workers = Workers::from_config(&config.processing)?;
    log::debug!("running with {} workers", workers.threads());
    let renderer = TexRenderer::new(&config.paths.tex, &config.paths.contacts);
    let converter = LatexConverter::new(&config.converter);
    let cache = if cli.no_cache {
        CacheGate::disabled(config.paths.cache_dir())
    } else {
        CacheGate::new(config.paths.cache_dir(), config.cache.mode)
    };

    let (tx, rx) = mpsc::channel();
    let pdf_root = config.paths.pdf.clone();
    let printer = std::thread::spawn(move || {
        for event in rx {
            for line in output::format_event(&event, &pdf_root) {
                println!("{}", line);
            }
        }
    });
    let result = Pipeline::new(&config, &revue, &renderer, &converter, &workers, cache)
        .with_events(tx)
        .run(&request);
    printer.join().map_err(|_| "output thread panicked")?;

    let summary = result?;
    output::print_summary(&summary, request == Request::Full);
    Ok(())
}
