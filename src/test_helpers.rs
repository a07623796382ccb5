//! Shared test utilities for the revymanus test suite.
//!
//! Provides a small production on disk, labelled PDF fixtures, and recording
//! doubles for the renderer and converter seams.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = TempDir::new().unwrap();
//! let config = fixture_config(tmp.path());
//! let revue = fixture_revue(tmp.path());
//!
//! write_labeled_pdf(&tmp.path().join("a.pdf"), &["a1", "a2"]);
//! assert_eq!(page_labels(&tmp.path().join("a.pdf")), ["a1", "a2"]);
//! ```
//!
//! Every page of a fixture PDF carries a `Label` entry in its page
//! dictionary, so a merged document's page order can be read back without a
//! text extractor.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use lopdf::{Document, Object, dictionary};

use crate::config::RevyConfig;
use crate::convert::{ConversionError, DocumentConverter};
use crate::model::Revue;
use crate::plan::load_plan;
use crate::render::{RenderError, Renderer, Source};

// =========================================================================
// PDF fixtures
// =========================================================================

/// Write a PDF with one page per label.
pub fn write_labeled_pdf(path: &Path, labels: &[&str]) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let kids: Vec<Object> = labels
        .iter()
        .map(|label| {
            let page = dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(595),
                    Object::Integer(842),
                ],
                "Label" => Object::string_literal(*label),
            };
            Object::Reference(doc.add_object(page))
        })
        .collect();
    let pages = dictionary! {
        "Type" => "Pages",
        "Count" => Object::Integer(kids.len() as i64),
        "Kids" => kids,
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    doc.save(path).unwrap();
}

/// Labels of every page in document order.
pub fn page_labels(path: &Path) -> Vec<String> {
    let doc = Document::load(path)
        .unwrap_or_else(|e| panic!("cannot load {}: {e}", path.display()));
    doc.get_pages()
        .values()
        .map(|id| {
            let page = doc.get_dictionary(*id).unwrap();
            match page.get(b"Label") {
                Ok(Object::String(bytes, _)) => String::from_utf8_lossy(bytes).into_owned(),
                _ => panic!("page {id:?} of {} has no label", path.display()),
            }
        })
        .collect()
}

// =========================================================================
// Production fixture
// =========================================================================

const FIXTURE_PLAN: &str = r#"
title = "Testrevy"

[[acts]]
name = "Første akt"

[[acts.materials]]
file = "sketches/intro.tex"
title = "Intro"
roles = [
    { abbreviation = "A", actor = "Anna", role = "Bager" },
    { abbreviation = "B", actor = "Bo", role = "Kunde" },
]
props = [{ name = "Kage", responsible = "Anna" }]

[[acts.materials]]
file = "sange/vise.tex"
title = "Vise"
roles = [{ abbreviation = "B", actor = "Bo", role = "Sanger" }]

[[acts]]
name = "Anden akt"

[[acts.materials]]
file = "sketches/finale.tex"
title = "Finale"
roles = [{ abbreviation = "A", actor = "Anna", role = "Fortæller" }]
props = [{ name = "Paraply" }]
"#;

/// Write a two-act, three-material production below `root` and load it.
///
/// Acts: "Første akt" (Intro, Vise), "Anden akt" (Finale). Vise is the only
/// song. Anna plays in Intro and Finale, Bo in Intro and Vise.
pub fn fixture_revue(root: &Path) -> Revue {
    for (file, title) in [
        ("sketches/intro.tex", "Intro"),
        ("sange/vise.tex", "Vise"),
        ("sketches/finale.tex", "Finale"),
    ] {
        let path = root.join(file);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, format!("\\title{{{title}}}\n")).unwrap();
    }
    let plan = root.join("aktoversigt.plan");
    fs::write(&plan, FIXTURE_PLAN).unwrap();
    load_plan(&plan, root).unwrap()
}

/// Stock config resolved against `root`, with a contacts file in place.
pub fn fixture_config(root: &Path) -> RevyConfig {
    let config = RevyConfig::default().resolve_paths(root);
    fs::write(
        &config.paths.contacts,
        "name,phone,email\nAnna,12345678,anna@example.org\nBo,87654321,bo@example.org\n",
    )
    .unwrap();
    config
}

// =========================================================================
// Recording doubles
// =========================================================================

/// Renderer that writes a placeholder source per call and records the
/// file stem of every source it was asked for.
#[derive(Default)]
pub struct MockRenderer {
    pub tex_dir: PathBuf,
    pub operations: Mutex<Vec<String>>,
}

impl MockRenderer {
    pub fn new(tex_dir: impl Into<PathBuf>) -> Self {
        Self {
            tex_dir: tex_dir.into(),
            operations: Mutex::new(Vec::new()),
        }
    }

    pub fn renders(&self) -> Vec<String> {
        self.operations.lock().unwrap().clone()
    }
}

impl Renderer for MockRenderer {
    fn render(&self, source: &Source, revue: &Revue) -> Result<PathBuf, RenderError> {
        let stem = source.file_stem();
        self.operations.lock().unwrap().push(stem.clone());
        fs::create_dir_all(&self.tex_dir)?;
        let path = self.tex_dir.join(format!("{stem}.tex"));
        fs::write(&path, format!("{} {stem}", revue.title))?;
        Ok(path)
    }
}

/// Converter that writes a one-page PDF labelled with the output's file
/// stem, so merged outputs can be checked page by page.
///
/// Output names passed to [`MockConverter::failing`] fail with
/// [`ConversionError::Failed`] instead.
#[derive(Default)]
pub struct MockConverter {
    pub fail_on: HashSet<String>,
    pub operations: Mutex<Vec<String>>,
}

impl MockConverter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(output_names: &[&str]) -> Self {
        Self {
            fail_on: output_names.iter().map(|s| s.to_string()).collect(),
            operations: Mutex::new(Vec::new()),
        }
    }

    /// Output names of every conversion attempted, in call order.
    pub fn conversions(&self) -> Vec<String> {
        self.operations.lock().unwrap().clone()
    }
}

impl DocumentConverter for MockConverter {
    fn convert(
        &self,
        source: &Path,
        output_dir: &Path,
        output_name: &str,
    ) -> Result<PathBuf, ConversionError> {
        self.operations
            .lock()
            .unwrap()
            .push(output_name.to_string());

        if self.fail_on.contains(output_name) {
            return Err(ConversionError::Failed {
                command: "mock".to_string(),
                source_path: source.to_path_buf(),
                status: "exit status: 1".to_string(),
                log: String::new(),
            });
        }

        let target = output_dir.join(output_name);
        let label = Path::new(output_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        write_labeled_pdf(&target, &[&label]);
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn labeled_pdf_reads_back() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/x.pdf");
        write_labeled_pdf(&path, &["one", "two"]);
        assert_eq!(page_labels(&path), ["one", "two"]);
    }

    #[test]
    fn fixture_revue_shape() {
        let tmp = TempDir::new().unwrap();
        let revue = fixture_revue(tmp.path());
        assert_eq!(revue.acts.len(), 2);
        assert_eq!(revue.materials().count(), 3);
        assert_eq!(revue.materials_in("sange").count(), 1);
        assert!(revue.materials().all(|m| m.path.is_file()));
    }
}
