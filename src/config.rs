//! Production configuration module.
//!
//! Handles loading and validating `revy.toml`. Every component receives the
//! resolved [`RevyConfig`] at construction time; nothing reads configuration
//! from ambient state during a run.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [paths]
//! pdf = "pdf"                        # Output root; cache/ lives here
//! individual_pdf = "pdf/individuelle" # Per-actor booklets
//! tex = "tex"                        # Generated LaTeX sources
//! material = "."                     # Root that plan-file material paths are relative to
//! songs = "sange"                    # Category name marking a material as a song
//! plan = "aktoversigt.plan"          # Plan file
//! contacts = "contacts.csv"          # Contact list source
//!
//! [processing]
//! max_processes = 4                  # Max parallel workers (omit for auto = CPU cores)
//!
//! [converter]
//! command = "pdflatex"
//! args = ["-interaction=nonstopmode", "-halt-on-error"]
//!
//! [cache]
//! mode = "exists"                    # "exists" or "content-hash"
//! ```
//!
//! Relative paths are resolved against the directory holding `revy.toml`.
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILENAME: &str = "revy.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Production configuration loaded from `revy.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RevyConfig {
    /// Input and output locations.
    pub paths: PathsConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
    /// External LaTeX engine invocation.
    pub converter: ConverterConfig,
    /// Per-entity artifact cache behaviour.
    pub cache: CacheConfig,
}

/// Input and output locations. Relative entries are resolved by
/// [`RevyConfig::resolve_paths`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    pub pdf: PathBuf,
    pub individual_pdf: PathBuf,
    pub tex: PathBuf,
    pub material: PathBuf,
    /// Category name, not a path: materials in this category are songs.
    pub songs: String,
    pub plan: PathBuf,
    pub contacts: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            pdf: PathBuf::from("pdf"),
            individual_pdf: PathBuf::from("pdf/individuelle"),
            tex: PathBuf::from("tex"),
            material: PathBuf::from("."),
            songs: "sange".to_string(),
            plan: PathBuf::from("aktoversigt.plan"),
            contacts: PathBuf::from("contacts.csv"),
        }
    }
}

impl PathsConfig {
    /// Directory holding cached per-entity artifacts.
    pub fn cache_dir(&self) -> PathBuf {
        self.pdf.join("cache")
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel workers for conversions and merges.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective worker count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

/// External LaTeX engine invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConverterConfig {
    /// Executable name or path.
    pub command: String,
    /// Arguments placed before the output directory and source file.
    pub args: Vec<String>,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            command: "pdflatex".to_string(),
            args: vec![
                "-interaction=nonstopmode".to_string(),
                "-halt-on-error".to_string(),
            ],
        }
    }
}

/// How the cache gate decides whether an artifact is current.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheMode {
    /// The artifact file existing is the whole cache key.
    #[default]
    Exists,
    /// The artifact must also match the SHA-256 of its rendered source.
    ContentHash,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub mode: CacheMode,
}

impl RevyConfig {
    /// Validate that every required entry is present and usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("paths.pdf", &self.paths.pdf),
            ("paths.individual_pdf", &self.paths.individual_pdf),
            ("paths.tex", &self.paths.tex),
            ("paths.material", &self.paths.material),
            ("paths.plan", &self.paths.plan),
            ("paths.contacts", &self.paths.contacts),
        ];
        for (key, path) in required {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::Validation(format!("{key} must not be empty")));
            }
        }
        if self.paths.songs.trim().is_empty() {
            return Err(ConfigError::Validation(
                "paths.songs must not be empty".into(),
            ));
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        if self.converter.command.trim().is_empty() {
            return Err(ConfigError::Validation(
                "converter.command must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Make every relative path absolute with respect to `base`.
    pub fn resolve_paths(mut self, base: &Path) -> Self {
        let paths = &mut self.paths;
        for path in [
            &mut paths.pdf,
            &mut paths.individual_pdf,
            &mut paths.tex,
            &mut paths.material,
            &mut paths.plan,
            &mut paths.contacts,
        ] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
        self
    }
}

/// Load and validate a config file.
///
/// Returns stock defaults when the file does not exist. Paths are resolved
/// against the file's directory either way, and are always absolute.
pub fn load_config(path: &Path) -> Result<RevyConfig, ConfigError> {
    let base = std::path::absolute(
        path.parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new(".")),
    )?;
    let config = if path.exists() {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content)?
    } else {
        log::debug!("no config at {}, using defaults", path.display());
        RevyConfig::default()
    };
    config.validate()?;
    Ok(config.resolve_paths(&base))
}

/// A fully-documented `revy.toml` with all stock defaults.
pub fn stock_config_toml() -> &'static str {
    r#"# revymanus configuration
# All options are optional; the values below are the defaults.

[paths]
# Output root. Cached per-actor frontpages are kept in <pdf>/cache.
pdf = "pdf"
# Where the personalized booklets (one per actor) are written.
individual_pdf = "pdf/individuelle"
# Where generated LaTeX sources are written.
tex = "tex"
# Root directory that material paths in the plan file are relative to.
material = "."
# Category name that marks a material as a song.
songs = "sange"
# Plan file listing acts and materials.
plan = "aktoversigt.plan"
# CSV file (name,phone,email) used for the contact list.
contacts = "contacts.csv"

[processing]
# Maximum number of parallel workers. Omit to use all CPU cores.
# max_processes = 4

[converter]
command = "pdflatex"
args = ["-interaction=nonstopmode", "-halt-on-error"]

[cache]
# "exists": a cached file is reused as long as it exists.
# "content-hash": a cached file is also regenerated when its source changes.
mode = "exists"
"#
}
