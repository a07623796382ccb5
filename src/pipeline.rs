//! Pipeline driver: sequences the creation of manuscript parts.
//!
//! Every part follows the same shape: render sources with the
//! [`Renderer`], convert them with the [`DocumentConverter`], and for the
//! assembled parts merge the results with the [`Merger`]. Parts are a closed
//! set ([`Part`]) dispatched from their command line token.
//!
//! ```text
//! aktoversigt  roles  frontpage  props  contacts      render + convert one file
//! material                                             convert every material
//! individual   frontpages (cached) + one merge per actor
//! songmanus    shared frontpage (cached) + songs
//! manus        every part above, then the master manuscript
//! ```
//!
//! The driver stops at the first failed part. A failed batch reports every
//! failed entity, and outputs that were written before the failure stay on
//! disk. There is no resumption: running again redoes the uncached work and
//! overwrites outputs with identical content.
//!
//! ## Run state
//!
//! `NotStarted → PartsGenerating → PartsConverting → Merging → Done`, with
//! `Failed(part)` reachable from any state. Each part walks the states it
//! needs, so a multi-part run cycles through them once per part.

use crate::batch::{BatchError, Workers};
use crate::cache::{ArtifactKind, CacheGate, CacheStats};
use crate::config::{CacheMode, ConfigError, RevyConfig};
use crate::convert::{ConversionError, ConversionJob, Converter, DocumentConverter};
use crate::merge::{MergeError, MergeItem, MergeRequest, MergeTemplate, Merger, TemplateItem};
use crate::model::{Actor, Revue};
use crate::render::{RenderError, Renderer, Source};
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::mpsc::Sender;
use thiserror::Error;

/// File name of the master manuscript below the PDF root.
pub const MANUSCRIPT_FILE: &str = "manuskript.pdf";

/// File name of the song manuscript below the PDF root.
pub const SONG_MANUSCRIPT_FILE: &str = "sangmanuskript.pdf";

/// Cache key of the song manuscript's shared frontpage.
const SONG_FRONTPAGE_KEY: &str = "sangmanuskript";

/// A part of the manuscript that can be requested on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Part {
    ActOutline,
    Roles,
    Frontpage,
    Props,
    Contacts,
    Signup,
    Material,
    Individual,
    SongManus,
    /// The master manuscript, merged from the outputs of the other parts.
    Manuscript,
}

/// Parts of a full run, in execution order. The signup form is only made
/// on request.
pub const FULL_SEQUENCE: [Part; 9] = [
    Part::ActOutline,
    Part::Roles,
    Part::Frontpage,
    Part::Props,
    Part::Contacts,
    Part::Material,
    Part::Individual,
    Part::SongManus,
    Part::Manuscript,
];

const ALL_PARTS: [Part; 10] = [
    Part::ActOutline,
    Part::Roles,
    Part::Frontpage,
    Part::Props,
    Part::Contacts,
    Part::Signup,
    Part::Material,
    Part::Individual,
    Part::SongManus,
    Part::Manuscript,
];

impl Part {
    /// Command line token of the part.
    pub fn token(self) -> &'static str {
        match self {
            Part::ActOutline => "aktoversigt",
            Part::Roles => "roles",
            Part::Frontpage => "frontpage",
            Part::Props => "props",
            Part::Contacts => "contacts",
            Part::Signup => "signup",
            Part::Material => "material",
            Part::Individual => "individual",
            Part::SongManus => "songmanus",
            Part::Manuscript => "manus",
        }
    }
}

impl fmt::Display for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("Unknown part '{0}' (expected plan, {tokens})", tokens = part_tokens())]
pub struct UnknownPart(pub String);

fn part_tokens() -> String {
    ALL_PARTS.map(Part::token).join(", ")
}

impl FromStr for Part {
    type Err = UnknownPart;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_PARTS
            .into_iter()
            .find(|p| p.token() == s)
            .ok_or_else(|| UnknownPart(s.to_string()))
    }
}

/// What a command line asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// (Re)create the plan file and stop.
    Plan,
    /// Every part plus the master manuscript.
    Full,
    /// The given parts in the given order.
    Parts(Vec<Part>),
}

impl Request {
    /// Interpret command line tokens. No tokens or `manus` means a full run;
    /// `plan` wins over everything. Every token is validated first.
    pub fn from_tokens<S: AsRef<str>>(tokens: &[S]) -> Result<Self, UnknownPart> {
        let mut plan = false;
        let mut full = tokens.is_empty();
        let mut parts = Vec::new();
        for token in tokens {
            match token.as_ref() {
                "plan" => plan = true,
                other => match other.parse()? {
                    Part::Manuscript => full = true,
                    part if !parts.contains(&part) => parts.push(part),
                    _ => {}
                },
            }
        }
        Ok(if plan {
            Request::Plan
        } else if full {
            Request::Full
        } else {
            Request::Parts(parts)
        })
    }
}

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    PartsGenerating,
    PartsConverting,
    Merging,
    Done,
    Failed(Part),
}

/// Progress events, rendered by [`crate::output::format_event`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    PartStarted { part: Part },
    /// A per-entity artifact was reused from the cache.
    CacheHit { key: String, artifact: PathBuf },
    Converted { output: PathBuf },
    Merged { output: PathBuf, documents: usize },
    PartFinished { part: Part, outputs: usize },
}

#[derive(Error, Debug)]
pub enum PartError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Render failed: {0}")]
    Render(#[from] RenderError),
    #[error("Rendering failed: {0}")]
    Renders(#[from] BatchError<RenderError>),
    #[error("Conversion failed: {0}")]
    Conversion(#[from] ConversionError),
    #[error("Conversion failed: {0}")]
    Conversions(#[from] BatchError<ConversionError>),
    #[error("Merge failed: {0}")]
    Merge(#[from] MergeError),
    #[error("Merge failed: {0}")]
    Merges(#[from] BatchError<MergeError>),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Part '{part}' failed: {source}")]
    Part {
        part: Part,
        #[source]
        source: PartError,
    },
}

/// Result of a successful run.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Every file written, in part order.
    pub outputs: Vec<PathBuf>,
    pub cache: CacheStats,
}

/// Drives the parts of a run against one production.
pub struct Pipeline<'a> {
    config: &'a RevyConfig,
    revue: &'a Revue,
    renderer: &'a dyn Renderer,
    converter: &'a dyn DocumentConverter,
    workers: &'a Workers,
    cache: CacheGate,
    stats: CacheStats,
    state: RunState,
    events: Option<Sender<PipelineEvent>>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a RevyConfig,
        revue: &'a Revue,
        renderer: &'a dyn Renderer,
        converter: &'a dyn DocumentConverter,
        workers: &'a Workers,
        cache: CacheGate,
    ) -> Self {
        Self {
            config,
            revue,
            renderer,
            converter,
            workers,
            cache,
            stats: CacheStats::default(),
            state: RunState::NotStarted,
            events: None,
        }
    }

    /// Send progress events to `tx`.
    pub fn with_events(mut self, tx: Sender<PipelineEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn run(&mut self, request: &Request) -> Result<RunSummary, PipelineError> {
        match request {
            Request::Plan => Ok(RunSummary::default()),
            Request::Full => self.run_parts(&FULL_SEQUENCE),
            Request::Parts(parts) => self.run_parts(parts),
        }
    }

    /// Run `parts` in order, stopping at the first failure.
    ///
    /// Required inputs of every requested part are checked before anything
    /// is dispatched.
    pub fn run_parts(&mut self, parts: &[Part]) -> Result<RunSummary, PipelineError> {
        self.state = RunState::NotStarted;
        self.stats = CacheStats::default();
        self.check_inputs(parts)?;

        let mut outputs = Vec::new();
        for &part in parts {
            log::debug!("starting part {part}");
            self.emit(PipelineEvent::PartStarted { part });
            match self.run_part(part) {
                Ok(produced) => {
                    self.emit(PipelineEvent::PartFinished {
                        part,
                        outputs: produced.len(),
                    });
                    outputs.extend(produced);
                }
                Err(source) => {
                    self.enter(RunState::Failed(part));
                    return Err(PipelineError::Part { part, source });
                }
            }
        }
        self.enter(RunState::Done);
        Ok(RunSummary {
            outputs,
            cache: self.stats,
        })
    }

    fn check_inputs(&self, parts: &[Part]) -> Result<(), ConfigError> {
        let paths = &self.config.paths;
        let needs = |part| parts.contains(&part) || parts.contains(&Part::Manuscript);
        if needs(Part::Contacts) && !paths.contacts.is_file() {
            return Err(ConfigError::Validation(format!(
                "paths.contacts: {} does not exist",
                paths.contacts.display()
            )));
        }
        if needs(Part::Material)
            && let Some(m) = self.revue.materials().find(|m| !m.path.is_file())
        {
            return Err(ConfigError::Validation(format!(
                "source of '{}' does not exist: {}",
                m.title,
                m.path.display()
            )));
        }
        Ok(())
    }

    fn run_part(&mut self, part: Part) -> Result<Vec<PathBuf>, PartError> {
        match part {
            Part::ActOutline => self.single_document(Source::ActOutline),
            Part::Roles => self.single_document(Source::RoleOverview),
            Part::Frontpage => self.single_document(Source::Frontpage { subtitle: None }),
            Part::Props => self.single_document(Source::PropsList),
            Part::Contacts => self.single_document(Source::ContactsList),
            Part::Signup => self.single_document(Source::SignupForm),
            Part::Material => self.materials(),
            Part::Individual => self.individual(),
            Part::SongManus => self.song_manuscript(),
            Part::Manuscript => self.manuscript(),
        }
    }

    /// Render one source and convert it to `<pdf>/<stem>.pdf`.
    fn single_document(&mut self, source: Source) -> Result<Vec<PathBuf>, PartError> {
        self.enter(RunState::PartsGenerating);
        let tex = self.renderer.render(&source, self.revue)?;

        self.enter(RunState::PartsConverting);
        let converter = Converter::new(self.converter, self.workers, &self.config.paths.pdf);
        let job = converter.job(tex, output_name(&source));
        let output = converter.convert_one(&job)?;
        self.emit(PipelineEvent::Converted {
            output: output.clone(),
        });
        Ok(vec![output])
    }

    /// Convert every material of every act into `<pdf>/<category>/`.
    fn materials(&mut self) -> Result<Vec<PathBuf>, PartError> {
        self.enter(RunState::PartsConverting);
        let pdf = &self.config.paths.pdf;
        let jobs: Vec<ConversionJob> = self
            .revue
            .materials()
            .map(|m| ConversionJob::new(&m.path, pdf.join(&m.category), m.pdf_name()))
            .collect();
        let converter = Converter::new(self.converter, self.workers, pdf);
        let outputs = converter.convert_many(&jobs)?;
        for output in &outputs {
            self.emit(PipelineEvent::Converted {
                output: output.clone(),
            });
        }
        Ok(outputs)
    }

    /// One booklet per actor: personal frontpage, act outline, role
    /// overview, the actor's materials, prop list.
    fn individual(&mut self) -> Result<Vec<PathBuf>, PartError> {
        let config = self.config;
        let revue = self.revue;
        let keys: Vec<String> = revue.actors.iter().map(|a| a.name.clone()).collect();
        self.ensure_frontpages(&keys)?;

        self.enter(RunState::Merging);
        let pdf = &config.paths.pdf;
        let cache = &self.cache;
        let template = MergeTemplate::new(
            vec![
                TemplateItem::per_entity(|actor: &Actor| {
                    MergeItem::literal(cache.artifact_path(ArtifactKind::Frontpage, &actor.name))
                }),
                TemplateItem::literal(pdf.join(output_name(&Source::ActOutline))),
                TemplateItem::literal(pdf.join(output_name(&Source::RoleOverview))),
                TemplateItem::per_entity(|actor: &Actor| {
                    MergeItem::entity(
                        actor.name.clone(),
                        revue.materials_for(actor).map(|m| m.pdf_path(pdf)).collect(),
                    )
                }),
                TemplateItem::literal(pdf.join(output_name(&Source::PropsList))),
            ],
            |actor: &Actor| {
                config
                    .paths
                    .individual_pdf
                    .join(format!("{}.pdf", actor.name))
            },
        );
        let requests = template.expand(&revue.actors);

        let outputs = Merger::new(self.workers).merge_many(&requests)?;
        for request in &requests {
            self.emit(PipelineEvent::Merged {
                output: request.output.clone(),
                documents: request.inputs().len(),
            });
        }
        Ok(outputs)
    }

    /// Shared song frontpage followed by every song in declared order.
    fn song_manuscript(&mut self) -> Result<Vec<PathBuf>, PartError> {
        let config = self.config;
        let frontpages = self.ensure_frontpages(&[SONG_FRONTPAGE_KEY.to_string()])?;

        self.enter(RunState::Merging);
        let pdf = &config.paths.pdf;
        let songs: Vec<PathBuf> = self
            .revue
            .materials_in(&config.paths.songs)
            .map(|m| m.pdf_path(pdf))
            .collect();
        if songs.is_empty() {
            log::warn!("no materials in category '{}'", config.paths.songs);
        }
        let mut items: Vec<MergeItem> = frontpages.into_iter().map(MergeItem::Literal).collect();
        items.push(MergeItem::entity(config.paths.songs.clone(), songs));
        let request = MergeRequest::new(items, pdf.join(SONG_MANUSCRIPT_FILE));
        self.merge_single(&request)
    }

    /// Master manuscript: frontpage, act outline, role overview, every
    /// material in act order, prop list, contact list.
    fn manuscript(&mut self) -> Result<Vec<PathBuf>, PartError> {
        self.enter(RunState::Merging);
        let config = self.config;
        let revue = self.revue;
        let pdf = &config.paths.pdf;
        let part = |source: Source| MergeItem::literal(pdf.join(output_name(&source)));
        let request = MergeRequest::new(
            vec![
                part(Source::Frontpage { subtitle: None }),
                part(Source::ActOutline),
                part(Source::RoleOverview),
                MergeItem::entity(
                    revue.title.clone(),
                    revue.materials().map(|m| m.pdf_path(pdf)).collect(),
                ),
                part(Source::PropsList),
                part(Source::ContactsList),
            ],
            pdf.join(MANUSCRIPT_FILE),
        );
        self.merge_single(&request)
    }

    fn merge_single(&mut self, request: &MergeRequest) -> Result<Vec<PathBuf>, PartError> {
        let output = Merger::new(self.workers).merge_one(request)?;
        self.emit(PipelineEvent::Merged {
            output: output.clone(),
            documents: request.inputs().len(),
        });
        Ok(vec![output])
    }

    /// Make sure a frontpage exists in the cache for every key and return
    /// their paths in key order.
    ///
    /// Only missing (or, in content-hash mode, stale) frontpages are
    /// rendered and converted; the conversions run as one batch.
    fn ensure_frontpages(&mut self, keys: &[String]) -> Result<Vec<PathBuf>, PartError> {
        let kind = ArtifactKind::Frontpage;
        self.cache.ensure_cache_dir()?;

        self.enter(RunState::PartsGenerating);
        let (renderer, revue) = (self.renderer, self.revue);
        let render = |key: &String| {
            let subtitle = Some(key.clone());
            renderer.render(&Source::Frontpage { subtitle }, revue)
        };

        let stale: Vec<(String, PathBuf)> = if self.cache.mode() == CacheMode::ContentHash {
            // The source must exist to be hashed, so everything is rendered
            let sources = self.workers.run(keys, String::clone, render)?;
            let mut stale = Vec::new();
            for (key, source) in keys.iter().zip(sources) {
                if self.cache.is_current(kind, key, &source)? {
                    self.cache_hit(kind, key);
                } else {
                    stale.push((key.clone(), source));
                }
            }
            stale
        } else {
            let mut missing = Vec::new();
            for key in keys {
                if self.cache.should_generate(kind, key) {
                    missing.push(key.clone());
                } else {
                    self.cache_hit(kind, key);
                }
            }
            let sources = self.workers.run(&missing, String::clone, render)?;
            missing.into_iter().zip(sources).collect()
        };

        let artifacts: Vec<PathBuf> = keys
            .iter()
            .map(|key| self.cache.artifact_path(kind, key))
            .collect();
        if stale.is_empty() {
            return Ok(artifacts);
        }

        self.enter(RunState::PartsConverting);
        let jobs: Vec<ConversionJob> = stale
            .iter()
            .map(|(key, source)| ConversionJob::new(source, self.cache.dir(), kind.file_name(key)))
            .collect();
        let converter = Converter::new(self.converter, self.workers, self.cache.dir());
        let produced = converter.convert_many(&jobs)?;
        for ((key, source), output) in stale.iter().zip(produced) {
            self.cache.record(kind, key, source)?;
            self.stats.miss();
            self.emit(PipelineEvent::Converted { output });
        }
        Ok(artifacts)
    }

    fn cache_hit(&mut self, kind: ArtifactKind, key: &str) {
        self.stats.hit();
        self.emit(PipelineEvent::CacheHit {
            key: key.to_string(),
            artifact: self.cache.artifact_path(kind, key),
        });
    }

    fn enter(&mut self, state: RunState) {
        if self.state != state {
            log::debug!("run state {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.events {
            // A dropped receiver only means nobody is listening
            let _ = tx.send(event);
        }
    }
}

/// Output file name of a generated single document.
fn output_name(source: &Source) -> String {
    format!("{}.pdf", source.file_stem())
}
