//! Source-to-PDF conversion.
//!
//! [`DocumentConverter`] is the seam to the external typesetting engine: it
//! turns one source file into one PDF. The production implementation,
//! [`LatexConverter`], runs the configured LaTeX engine in a scratch
//! directory so auxiliary files never reach the output tree.
//!
//! [`Converter`] adds the job model on top: a single synchronous conversion
//! ([`Converter::convert_one`]) or a parallel batch on the shared worker pool
//! ([`Converter::convert_many`]) with the partial-failure policy described in
//! [`crate::batch`].

use crate::batch::{BatchError, Workers};
use crate::config::ConverterConfig;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

/// Lines of engine output kept in a failure report.
const LOG_TAIL_LINES: usize = 12;

#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Source not found: {0}")]
    SourceNotFound(PathBuf),
    #[error("Converter '{command}' could not be started: {source}")]
    ToolMissing {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("Converter '{command}' failed on {source_path:?} ({status}):\n{log}")]
    Failed {
        command: String,
        source_path: PathBuf,
        status: String,
        log: String,
    },
    #[error("Converter produced no output for {0}")]
    MissingOutput(PathBuf),
}

/// Converts a single source document into a PDF.
///
/// Must be `Sync`: batches call it from several worker threads at once,
/// always with distinct output paths.
pub trait DocumentConverter: Sync {
    /// Convert `source` and write the result to `output_dir/output_name`.
    fn convert(
        &self,
        source: &Path,
        output_dir: &Path,
        output_name: &str,
    ) -> Result<PathBuf, ConversionError>;
}

/// One unit of conversion work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionJob {
    pub source: PathBuf,
    pub output_dir: PathBuf,
    pub output_name: String,
}

impl ConversionJob {
    pub fn new(
        source: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        output_name: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            output_dir: output_dir.into(),
            output_name: output_name.into(),
        }
    }

    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(&self.output_name)
    }
}

/// Runs conversion jobs against a backend.
pub struct Converter<'a, C: ?Sized> {
    backend: &'a C,
    workers: &'a Workers,
    default_dir: PathBuf,
}

impl<'a, C: DocumentConverter + ?Sized> Converter<'a, C> {
    /// `default_dir` is where [`Converter::job`] places outputs, normally the
    /// configured PDF root.
    pub fn new(backend: &'a C, workers: &'a Workers, default_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            workers,
            default_dir: default_dir.into(),
        }
    }

    /// A job writing into the default output directory.
    pub fn job(&self, source: impl Into<PathBuf>, output_name: impl Into<String>) -> ConversionJob {
        ConversionJob::new(source, self.default_dir.clone(), output_name)
    }

    /// Convert one job synchronously and return the output path.
    pub fn convert_one(&self, job: &ConversionJob) -> Result<PathBuf, ConversionError> {
        if !job.source.exists() {
            return Err(ConversionError::SourceNotFound(job.source.clone()));
        }
        fs::create_dir_all(&job.output_dir)?;
        log::debug!(
            "converting {} -> {}",
            job.source.display(),
            job.output_path().display()
        );
        self.backend
            .convert(&job.source, &job.output_dir, &job.output_name)
    }

    /// Convert every job on the worker pool.
    ///
    /// Returns output paths in job order once all jobs have been attempted,
    /// or every failure labelled by its output path below the default
    /// directory. Outputs of successful jobs stay on disk either way.
    pub fn convert_many(
        &self,
        jobs: &[ConversionJob],
    ) -> Result<Vec<PathBuf>, BatchError<ConversionError>> {
        self.workers
            .run(jobs, |job| self.label(job), |job| self.convert_one(job))
    }

    /// Output path of `job` relative to the default directory, so jobs with
    /// the same output name in different directories stay distinguishable.
    fn label(&self, job: &ConversionJob) -> String {
        let output = job.output_path();
        output
            .strip_prefix(&self.default_dir)
            .unwrap_or(output.as_path())
            .display()
            .to_string()
    }
}

/// Runs a LaTeX engine (`pdflatex`, `xelatex`, `lualatex`, ...).
pub struct LatexConverter {
    command: String,
    args: Vec<String>,
}

impl LatexConverter {
    pub fn new(config: &ConverterConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
        }
    }
}

impl DocumentConverter for LatexConverter {
    fn convert(
        &self,
        source: &Path,
        output_dir: &Path,
        output_name: &str,
    ) -> Result<PathBuf, ConversionError> {
        // The engine runs in the source's directory, so a relative source
        // path would be resolved twice
        let source = &std::path::absolute(source)?;
        let scratch = tempfile::Builder::new().prefix("revymanus-").tempdir()?;
        let jobname = Path::new(output_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| output_name.to_string());

        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .arg(format!("-output-directory={}", scratch.path().display()))
            .arg(format!("-jobname={jobname}"))
            .arg(source);
        // Relative \input paths resolve against the source's directory
        if let Some(dir) = source.parent() {
            cmd.current_dir(dir);
        }

        let output = cmd.output().map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ConversionError::ToolMissing {
                command: self.command.clone(),
                source: e,
            },
            _ => ConversionError::Io(e),
        })?;

        if !output.status.success() {
            return Err(ConversionError::Failed {
                command: self.command.clone(),
                source_path: source.to_path_buf(),
                status: output.status.to_string(),
                log: log_tail(&String::from_utf8_lossy(&output.stdout)),
            });
        }

        let produced = scratch.path().join(format!("{jobname}.pdf"));
        if !produced.exists() {
            return Err(ConversionError::MissingOutput(source.to_path_buf()));
        }
        let target = output_dir.join(output_name);
        fs::copy(&produced, &target)?;
        Ok(target)
    }
}

/// The last non-empty lines of engine output.
fn log_tail(stdout: &str) -> String {
    let lines: Vec<&str> = stdout.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(LOG_TAIL_LINES);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{MockConverter, page_labels};
    use tempfile::TempDir;

    fn sources(dir: &Path, names: &[&str]) -> Vec<PathBuf> {
        names
            .iter()
            .map(|n| {
                let p = dir.join(format!("{n}.tex"));
                fs::write(&p, n).unwrap();
                p
            })
            .collect()
    }

    #[test]
    fn convert_one_writes_into_default_dir() {
        let tmp = TempDir::new().unwrap();
        let workers = Workers::new(1).unwrap();
        let backend = MockConverter::new();
        let converter = Converter::new(&backend, &workers, tmp.path().join("pdf"));
        let src = sources(tmp.path(), &["forside"]);

        let job = converter.job(&src[0], "forside.pdf");
        let out = converter.convert_one(&job).unwrap();

        assert_eq!(out, tmp.path().join("pdf/forside.pdf"));
        assert_eq!(page_labels(&out), ["forside"]);
        assert_eq!(backend.conversions(), ["forside.pdf"]);
    }

    #[test]
    fn convert_one_missing_source() {
        let tmp = TempDir::new().unwrap();
        let workers = Workers::new(1).unwrap();
        let backend = MockConverter::new();
        let converter = Converter::new(&backend, &workers, tmp.path());

        let job = converter.job(tmp.path().join("nope.tex"), "nope.pdf");
        let result = converter.convert_one(&job);

        assert!(matches!(result, Err(ConversionError::SourceNotFound(_))));
        assert!(backend.conversions().is_empty());
    }

    #[test]
    fn convert_many_returns_paths_in_job_order() {
        let tmp = TempDir::new().unwrap();
        let workers = Workers::new(4).unwrap();
        let backend = MockConverter::new();
        let converter = Converter::new(&backend, &workers, tmp.path().join("out"));
        let names = ["a", "b", "c", "d", "e", "f"];
        let jobs: Vec<ConversionJob> = sources(tmp.path(), &names)
            .into_iter()
            .zip(names)
            .map(|(src, n)| converter.job(src, format!("{n}.pdf")))
            .collect();

        let outputs = converter.convert_many(&jobs).unwrap();

        let expected: Vec<PathBuf> = jobs.iter().map(ConversionJob::output_path).collect();
        assert_eq!(outputs, expected);
    }

    #[test]
    fn convert_many_isolates_failed_job() {
        let tmp = TempDir::new().unwrap();
        let workers = Workers::new(3).unwrap();
        let backend = MockConverter::failing(&["job3.pdf"]);
        let out = tmp.path().join("out");
        let converter = Converter::new(&backend, &workers, &out);
        let names = ["job1", "job2", "job3", "job4", "job5"];
        let jobs: Vec<ConversionJob> = sources(tmp.path(), &names)
            .into_iter()
            .zip(names)
            .map(|(src, n)| converter.job(src, format!("{n}.pdf")))
            .collect();

        let err = converter.convert_many(&jobs).unwrap_err();

        assert_eq!(err.total, 5);
        assert_eq!(err.failed_labels(), ["job3.pdf"]);
        for ok in ["job1", "job2", "job4", "job5"] {
            assert_eq!(page_labels(&out.join(format!("{ok}.pdf"))), [ok]);
        }
        assert!(!out.join("job3.pdf").exists());
        assert_eq!(backend.conversions().len(), 5);
    }

    #[test]
    fn convert_many_labels_failures_by_path() {
        let tmp = TempDir::new().unwrap();
        let workers = Workers::new(2).unwrap();
        let backend = MockConverter::failing(&["a.pdf"]);
        let pdf = tmp.path().join("pdf");
        let converter = Converter::new(&backend, &workers, &pdf);
        let src = sources(tmp.path(), &["a"]);
        let jobs = [
            ConversionJob::new(&src[0], pdf.join("sketches"), "a.pdf"),
            ConversionJob::new(&src[0], pdf.join("sange"), "a.pdf"),
        ];

        let err = converter.convert_many(&jobs).unwrap_err();

        assert_eq!(err.failed_labels(), ["sketches/a.pdf", "sange/a.pdf"]);
    }

    /// Stands in for a LaTeX engine: fails like one when its input file
    /// (the last argument) cannot be opened from its working directory,
    /// otherwise copies the input to `<output-directory>/<jobname>.pdf`.
    #[cfg(unix)]
    fn fake_engine() -> LatexConverter {
        let script = r#"
for arg; do
    case "$arg" in
        -output-directory=*) out="${arg#-output-directory=}" ;;
        -jobname=*) job="${arg#-jobname=}" ;;
    esac
    input="$arg"
done
if [ ! -f "$input" ]; then
    echo "! I can't find file $input"
    exit 1
fi
cp "$input" "$out/$job.pdf"
"#;
        LatexConverter {
            command: "sh".into(),
            args: vec!["-c".into(), script.into(), "engine".into()],
        }
    }

    #[cfg(unix)]
    #[test]
    fn latex_converter_accepts_relative_source() {
        // A directory below the working directory, addressed relatively
        let work = tempfile::Builder::new()
            .prefix("revymanus-rel-")
            .tempdir_in(".")
            .unwrap();
        assert!(work.path().is_relative());
        let source = work.path().join("tex/forside.tex");
        fs::create_dir_all(source.parent().unwrap()).unwrap();
        fs::write(&source, "forside").unwrap();
        let out = TempDir::new().unwrap();

        let produced = fake_engine()
            .convert(&source, out.path(), "forside.pdf")
            .unwrap();

        assert_eq!(produced, out.path().join("forside.pdf"));
        assert_eq!(fs::read_to_string(&produced).unwrap(), "forside");
    }

    #[cfg(unix)]
    #[test]
    fn latex_converter_reports_engine_failure() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("tom.tex");
        let out = TempDir::new().unwrap();

        let err = fake_engine()
            .convert(&source, out.path(), "tom.pdf")
            .unwrap_err();

        match err {
            ConversionError::Failed { log, .. } => assert!(log.contains("can't find file")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_tool_reported() {
        let tmp = TempDir::new().unwrap();
        let src = sources(tmp.path(), &["x"]);
        let backend = LatexConverter {
            command: "revymanus-no-such-latex-engine".into(),
            args: Vec::new(),
        };
        let result = backend.convert(&src[0], tmp.path(), "x.pdf");
        assert!(matches!(result, Err(ConversionError::ToolMissing { .. })));
    }

    #[test]
    fn log_tail_keeps_last_lines() {
        let log: String = (1..=20).map(|i| format!("line {i}\n\n")).collect();
        let tail = log_tail(&log);
        assert!(tail.starts_with("line 9"));
        assert!(tail.ends_with("line 20"));
        assert_eq!(tail.lines().count(), LOG_TAIL_LINES);
    }

    #[test]
    #[ignore] // Requires pdflatex
    fn latex_converter_produces_pdf() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("hello.tex");
        fs::write(
            &src,
            "\\documentclass{article}\\begin{document}Hej\\end{document}",
        )
        .unwrap();
        let backend = LatexConverter::new(&ConverterConfig::default());
        let out = backend.convert(&src, tmp.path(), "hello.pdf").unwrap();
        assert!(out.exists());
        assert!(!tmp.path().join("hello.aux").exists());
    }
}
