//! CLI output formatting.
//!
//! Output leads with what was made (a part, an actor, a file name) and shows
//! paths relative to the PDF root, so a run reads as an inventory of the
//! manuscript rather than a list of absolute paths.
//!
//! # Output Format
//!
//! ## Run
//!
//! ```text
//! aktoversigt
//!     converted → aktoversigt.pdf
//! material
//!     converted → sketches/intro.pdf
//!     converted → sange/vise.pdf
//! individual
//!     Anna: cached → cache/forside-Anna.pdf
//!     converted → cache/forside-Bo.pdf
//!     merged 6 documents → individuelle/Anna.pdf
//!     merged 6 documents → individuelle/Bo.pdf
//!
//! Cache: 1 cached, 1 generated (2 total)
//! Manuscript successfully created!
//! ```
//!
//! ## Plan
//!
//! ```text
//! Plan file 'aktoversigt.plan' created successfully.
//!     3 materials
//! ```
//!
//! # Architecture
//!
//! Each output has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::pipeline::{PipelineEvent, RunSummary};
use std::path::Path;

/// Final line of a successful full run.
pub const MANUSCRIPT_CREATED: &str = "Manuscript successfully created!";

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// `path` relative to `root` when it lies below it, as given otherwise.
fn relative(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

// ============================================================================
// Run output
// ============================================================================

/// Format a single pipeline event as display lines.
///
/// Parts are headers; everything a part produces is indented below it.
pub fn format_event(event: &PipelineEvent, pdf_root: &Path) -> Vec<String> {
    match event {
        PipelineEvent::PartStarted { part } => vec![part.to_string()],
        PipelineEvent::CacheHit { key, artifact } => vec![format!(
            "{}{}: cached \u{2192} {}",
            indent(1),
            key,
            relative(artifact, pdf_root)
        )],
        PipelineEvent::Converted { output } => vec![format!(
            "{}converted \u{2192} {}",
            indent(1),
            relative(output, pdf_root)
        )],
        PipelineEvent::Merged { output, documents } => vec![format!(
            "{}merged {} \u{2192} {}",
            indent(1),
            plural(*documents, "document"),
            relative(output, pdf_root)
        )],
        // The produced files were already listed
        PipelineEvent::PartFinished { .. } => Vec::new(),
    }
}

/// Format the end-of-run summary. `full` adds the manuscript notice.
pub fn format_summary(summary: &RunSummary, full: bool) -> Vec<String> {
    let mut lines = vec![String::new()];
    if summary.cache.total() > 0 {
        lines.push(format!("Cache: {}", summary.cache));
    }
    lines.push(format!("Wrote {}", plural(summary.outputs.len(), "file")));
    if full {
        lines.push(MANUSCRIPT_CREATED.to_string());
    }
    lines
}

/// Print the end-of-run summary to stdout.
pub fn print_summary(summary: &RunSummary, full: bool) {
    for line in format_summary(summary, full) {
        println!("{}", line);
    }
}

// ============================================================================
// Plan output
// ============================================================================

/// Format the notice after writing a new plan file.
pub fn format_plan_created(plan: &Path, materials: usize) -> Vec<String> {
    vec![
        format!("Plan file '{}' created successfully.", plan.display()),
        format!("{}{}", indent(1), plural(materials, "material")),
    ]
}

/// Print the plan file notice to stdout.
pub fn print_plan_created(plan: &Path, materials: usize) {
    for line in format_plan_created(plan, materials) {
        println!("{}", line);
    }
}
