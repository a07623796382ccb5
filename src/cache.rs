//! Cache gate for expensive per-entity artifacts.
//!
//! Running the LaTeX engine is the bottleneck of a run, and a production
//! with twenty actors needs twenty personalized frontpages that rarely
//! change. The cache gate lets the pipeline skip regenerating an artifact
//! that is already on disk.
//!
//! # Design
//!
//! A cache entry is identified by `(kind, entity key)` and realized as a file
//! at a deterministic path:
//!
//! ```text
//! pdf/cache/forside-Anna.pdf
//! pdf/cache/forside-sangmanuskript.pdf
//! ```
//!
//! In the default [`CacheMode::Exists`] mode the existence of that file is
//! the entire cache key and value: no timestamps, no hashes, no manifest.
//! Nothing is ever invalidated; delete the file (or pass `--no-cache`) to
//! force regeneration. The existence check is advisory, not an atomic
//! check-and-create, so two concurrent runs may both regenerate the same
//! artifact. Regeneration overwrites the same path, which is harmless.
//!
//! ## Content-hash mode
//!
//! With `cache.mode = "content-hash"` an artifact additionally carries a
//! `<artifact>.sha256` sidecar holding the SHA-256 of the rendered source it
//! was built from. The source is rendered first (cheap), and the artifact is
//! reused only if the sidecar matches. Artifacts without a sidecar are
//! treated as stale.

use crate::config::CacheMode;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Kinds of cached per-entity artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Frontpage,
}

impl ArtifactKind {
    /// File name prefix of this kind of artifact.
    pub fn prefix(self) -> &'static str {
        match self {
            ArtifactKind::Frontpage => "forside",
        }
    }

    /// File name of the artifact for `key`.
    pub fn file_name(self, key: &str) -> String {
        format!("{}-{}.pdf", self.prefix(), key)
    }
}

/// Decides whether a per-entity artifact needs regenerating.
#[derive(Debug, Clone)]
pub struct CacheGate {
    cache_dir: PathBuf,
    mode: CacheMode,
    enabled: bool,
}

impl CacheGate {
    pub fn new(cache_dir: impl Into<PathBuf>, mode: CacheMode) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            mode,
            enabled: true,
        }
    }

    /// A gate that reports every artifact as missing (`--no-cache`).
    pub fn disabled(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            enabled: false,
            ..Self::new(cache_dir, CacheMode::Exists)
        }
    }

    pub fn mode(&self) -> CacheMode {
        self.mode
    }

    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Deterministic location of the artifact for `(kind, key)`.
    pub fn artifact_path(&self, kind: ArtifactKind, key: &str) -> PathBuf {
        self.cache_dir.join(kind.file_name(key))
    }

    /// Create the cache directory if absent. Idempotent.
    pub fn ensure_cache_dir(&self) -> io::Result<()> {
        fs::create_dir_all(&self.cache_dir)
    }

    /// `false` iff the artifact for `(kind, key)` already exists.
    ///
    /// In content-hash mode this is only the first half of the decision;
    /// see [`CacheGate::is_current`].
    pub fn should_generate(&self, kind: ArtifactKind, key: &str) -> bool {
        let generate = !self.enabled || !self.artifact_path(kind, key).exists();
        log::debug!(
            "cache {} for {}",
            if generate { "miss" } else { "hit" },
            kind.file_name(key)
        );
        generate
    }

    /// Content-hash check: the artifact exists and was built from a source
    /// with the same content as `source`.
    pub fn is_current(&self, kind: ArtifactKind, key: &str, source: &Path) -> io::Result<bool> {
        if self.should_generate(kind, key) {
            return Ok(false);
        }
        let sidecar = sidecar_path(&self.artifact_path(kind, key));
        let recorded = match fs::read_to_string(&sidecar) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e),
        };
        Ok(recorded.trim() == hash_file(source)?)
    }

    /// Record the source hash next to a freshly generated artifact. Only
    /// writes in content-hash mode.
    pub fn record(&self, kind: ArtifactKind, key: &str, source: &Path) -> io::Result<()> {
        if self.mode != CacheMode::ContentHash {
            return Ok(());
        }
        let sidecar = sidecar_path(&self.artifact_path(kind, key));
        fs::write(sidecar, hash_file(source)?)
    }
}

fn sidecar_path(artifact: &Path) -> PathBuf {
    let mut name = artifact.as_os_str().to_owned();
    name.push(".sha256");
    PathBuf::from(name)
}

/// SHA-256 hash of a file's contents, returned as a hex string.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let bytes = fs::read(path)?;
    let digest = Sha256::digest(&bytes);
    Ok(format!("{:x}", digest))
}

/// Summary of cache performance for a run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u32,
    pub misses: u32,
}

impl CacheStats {
    pub fn hit(&mut self) {
        self.hits += 1;
    }

    pub fn miss(&mut self) {
        self.misses += 1;
    }

    pub fn total(&self) -> u32 {
        self.hits + self.misses
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits > 0 {
            write!(
                f,
                "{} cached, {} generated ({} total)",
                self.hits,
                self.misses,
                self.total()
            )
        } else {
            write!(f, "{} generated", self.misses)
        }
    }
}
