//! # revymanus
//!
//! Assembles the printed manuscript of a revue from many small documents:
//! act outline, role overview, prop and contact lists, one LaTeX source per
//! sketch or song, and a personalized frontpage per actor. Every part is
//! rendered to LaTeX, converted to PDF, and merged in a fixed order into the
//! final outputs:
//!
//! ```text
//! pdf/manuskript.pdf            master manuscript
//! pdf/sangmanuskript.pdf        song manuscript
//! pdf/individuelle/<actor>.pdf  one booklet per actor
//! ```
//!
//! # Architecture
//!
//! ```text
//! plan file → Revue → render → convert (parallel) → merge (parallel) → outputs
//!                               ↑
//!                         cache gate (per-actor frontpages)
//! ```
//!
//! The [`pipeline`] drives the parts in order. Conversions and merges of one
//! part run as a batch on a bounded worker pool ([`batch`]) and act as a
//! barrier: the next step starts only after every job of the batch has
//! finished or failed.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`config`] | `revy.toml` loading, validation, and path resolution |
//! | [`model`] | Read-only entity model: acts, materials, roles, props, actors |
//! | [`plan`] | Plan file loading into the model, and plan generation from the material tree |
//! | [`render`] | LaTeX source generation for the generated parts |
//! | [`convert`] | Source-to-PDF conversion, single or as a parallel batch |
//! | [`cache`] | Existence-keyed cache of per-actor frontpages |
//! | [`merge`] | Ordered PDF merging with per-entity expansion |
//! | [`batch`] | Worker pool and aggregated batch failures |
//! | [`pipeline`] | Part sequencing, run state, and progress events |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Merge Order Is Item Order
//!
//! A merged PDF contains its inputs in exactly the order they are listed,
//! however the conversions that produced them were scheduled. Collection
//! placeholders ("this actor's materials") only exist in a
//! [`merge::MergeTemplate`] and are expanded in place before merging, so the
//! merger only ever sees concrete, ordered paths.
//!
//! ## Existence Is the Cache Key
//!
//! A cached frontpage is reused when its file exists. There is no manifest
//! and no invalidation; `--no-cache` or deleting `pdf/cache/` forces a
//! rebuild. An opt-in content-hash mode additionally compares the rendered
//! source against a recorded SHA-256.
//!
//! ## Partial Failure
//!
//! One failed conversion never cancels its siblings. A batch reports every
//! failed job by name after all jobs were attempted, and the run stops at
//! the part that failed. Outputs written so far stay on disk; running again
//! is safe because every output path is written by exactly one job.

pub mod batch;
pub mod cache;
pub mod config;
pub mod convert;
pub mod merge;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod plan;
pub mod render;

#[cfg(test)]
pub(crate) mod test_helpers;
