//! Ordered PDF merging.
//!
//! A [`MergeRequest`] is an ordered list of [`MergeItem`]s plus an output
//! path. Items are either literal PDF paths or the resolved contribution of a
//! single entity (an actor's materials, every material of the revue), which
//! may be zero or more PDFs spliced in at the item's position. The merged
//! document contains the pages of every input in item order, and within
//! each input in its own page order. Completion order of parallel work never
//! influences page order.
//!
//! Collection-valued placeholders ("one booklet per actor") only exist in a
//! [`MergeTemplate`]. The pipeline expands a template into one concrete
//! request per entity before calling the [`Merger`], so the merger never
//! sees an unresolved placeholder.

use crate::batch::{BatchError, Workers};
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Input document not found: {}{}", .path.display(), entity_suffix(.entity))]
    Missing {
        path: PathBuf,
        entity: Option<String>,
    },
    #[error("Incomplete document {}: {reason}", .path.display())]
    IncompleteDocument { path: PathBuf, reason: String },
    #[error("Nothing to merge into {}", .0.display())]
    Empty(PathBuf),
}

fn entity_suffix(entity: &Option<String>) -> String {
    entity
        .as_ref()
        .map(|e| format!(" (for {e})"))
        .unwrap_or_default()
}

/// One position in a merge request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeItem {
    /// A single PDF.
    Literal(PathBuf),
    /// The PDFs resolved for one entity, merged in the given order.
    Entity { key: String, documents: Vec<PathBuf> },
}

impl MergeItem {
    pub fn literal(path: impl Into<PathBuf>) -> Self {
        MergeItem::Literal(path.into())
    }

    pub fn entity(key: impl Into<String>, documents: Vec<PathBuf>) -> Self {
        MergeItem::Entity {
            key: key.into(),
            documents,
        }
    }
}

/// A fully resolved merge: items in order, one output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRequest {
    pub items: Vec<MergeItem>,
    pub output: PathBuf,
}

impl MergeRequest {
    pub fn new(items: Vec<MergeItem>, output: impl Into<PathBuf>) -> Self {
        Self {
            items,
            output: output.into(),
        }
    }

    /// Every input path in merge order, paired with the entity it came from.
    pub fn inputs(&self) -> Vec<(&Path, Option<&str>)> {
        let mut inputs = Vec::new();
        for item in &self.items {
            match item {
                MergeItem::Literal(path) => inputs.push((path.as_path(), None)),
                MergeItem::Entity { key, documents } => inputs.extend(
                    documents
                        .iter()
                        .map(|d| (d.as_path(), Some(key.as_str()))),
                ),
            }
        }
        inputs
    }
}

type Resolver<'a, E> = Box<dyn Fn(&E) -> MergeItem + 'a>;

/// A position in a [`MergeTemplate`].
pub enum TemplateItem<'a, E> {
    /// Identical in every expanded request.
    Fixed(MergeItem),
    /// Replaced by the member's resolved item when expanding.
    PerEntity(Resolver<'a, E>),
}

impl<'a, E> TemplateItem<'a, E> {
    pub fn literal(path: impl Into<PathBuf>) -> Self {
        TemplateItem::Fixed(MergeItem::literal(path))
    }

    pub fn per_entity(resolve: impl Fn(&E) -> MergeItem + 'a) -> Self {
        TemplateItem::PerEntity(Box::new(resolve))
    }
}

/// A merge description that yields one request per member of a collection.
pub struct MergeTemplate<'a, E> {
    items: Vec<TemplateItem<'a, E>>,
    output: Box<dyn Fn(&E) -> PathBuf + 'a>,
}

impl<'a, E> MergeTemplate<'a, E> {
    pub fn new(items: Vec<TemplateItem<'a, E>>, output: impl Fn(&E) -> PathBuf + 'a) -> Self {
        Self {
            items,
            output: Box::new(output),
        }
    }

    /// One request per entity, in collection order. Each request keeps every
    /// fixed item in place and substitutes the entity's resolved item at each
    /// placeholder position.
    pub fn expand(&self, entities: &[E]) -> Vec<MergeRequest> {
        entities
            .iter()
            .map(|entity| {
                let items = self
                    .items
                    .iter()
                    .map(|item| match item {
                        TemplateItem::Fixed(fixed) => fixed.clone(),
                        TemplateItem::PerEntity(resolve) => resolve(entity),
                    })
                    .collect();
                MergeRequest::new(items, (self.output)(entity))
            })
            .collect()
    }
}

/// Merges requests, alone or as a parallel batch.
pub struct Merger<'a> {
    workers: &'a Workers,
}

impl<'a> Merger<'a> {
    pub fn new(workers: &'a Workers) -> Self {
        Self { workers }
    }

    /// Merge one request synchronously and return its output path.
    pub fn merge_one(&self, request: &MergeRequest) -> Result<PathBuf, MergeError> {
        let mut documents = Vec::new();
        for (path, entity) in request.inputs() {
            if !path.is_file() {
                return Err(MergeError::Missing {
                    path: path.to_path_buf(),
                    entity: entity.map(str::to_string),
                });
            }
            let document = Document::load(path).map_err(|e| MergeError::IncompleteDocument {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
            documents.push((path, document));
        }
        if documents.is_empty() {
            return Err(MergeError::Empty(request.output.clone()));
        }

        let mut merged = concatenate(documents)?;
        if let Some(parent) = request.output.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(fs::File::create(&request.output)?);
        merged
            .save_to(&mut writer)
            .map_err(|e| io::Error::other(e.to_string()))?;
        writer.flush()?;
        log::debug!("merged {}", request.output.display());
        Ok(request.output.clone())
    }

    /// Merge every request on the worker pool. Output paths come back in
    /// request order; failures are labelled by output path.
    pub fn merge_many(
        &self,
        requests: &[MergeRequest],
    ) -> Result<Vec<PathBuf>, BatchError<MergeError>> {
        self.workers.run(
            requests,
            |r| r.output.display().to_string(),
            |r| self.merge_one(r),
        )
    }
}

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Deepest page tree walked when resolving inherited attributes.
const MAX_TREE_DEPTH: usize = 64;

/// `Type` name of a dictionary or stream object.
fn object_type(object: &Object) -> Option<&[u8]> {
    let dict = match object {
        Object::Dictionary(dict) => dict,
        Object::Stream(stream) => &stream.dict,
        _ => return None,
    };
    dict.get(b"Type").and_then(Object::as_name).ok()
}

/// Copy inherited attributes onto the page itself, since the page tree it
/// inherited them from is replaced when merging.
fn inherit_attributes(doc: &Document, page: &mut Dictionary) {
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    let mut depth = 0;
    while let Some(id) = parent {
        let Ok(node) = doc.get_dictionary(id) else {
            break;
        };
        for key in INHERITABLE {
            if !page.has(key)
                && let Ok(value) = node.get(key)
            {
                page.set(key.to_vec(), value.clone());
            }
        }
        depth += 1;
        if depth >= MAX_TREE_DEPTH {
            break;
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }
}

/// Concatenate the page trees of `documents` in order into a new document.
///
/// Object ids of each input are shifted past the previous input's, so
/// every object keeps a unique id. Pages are collected as a list in
/// document order, then page order, and become the `Kids` of a single page
/// tree root.
fn concatenate(documents: Vec<(&Path, Document)>) -> Result<Document, MergeError> {
    let first = documents
        .first()
        .map(|(path, _)| path.to_path_buf())
        .unwrap_or_default();
    let mut max_id = 1;
    let mut pages: Vec<(ObjectId, Dictionary)> = Vec::new();
    let mut objects = Vec::new();

    for (path, mut doc) in documents {
        let incomplete = |reason: String| MergeError::IncompleteDocument {
            path: path.to_path_buf(),
            reason,
        };
        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;

        let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
        if page_ids.is_empty() {
            return Err(incomplete("document has no pages".into()));
        }
        for id in page_ids {
            let mut page = doc
                .get_dictionary(id)
                .map_err(|e| incomplete(e.to_string()))?
                .clone();
            inherit_attributes(&doc, &mut page);
            pages.push((id, page));
        }
        objects.extend(doc.objects);
    }

    let mut merged = Document::with_version("1.5");
    let mut catalog: Option<(ObjectId, Dictionary)> = None;
    let mut page_tree: Option<(ObjectId, Dictionary)> = None;

    for (id, object) in objects {
        match object_type(&object) {
            Some(b"Catalog") => {
                if catalog.is_none()
                    && let Ok(dict) = object.as_dict()
                {
                    catalog = Some((id, dict.clone()));
                }
            }
            Some(b"Pages") => {
                // All page tree nodes collapse into the first one
                if page_tree.is_none()
                    && let Ok(dict) = object.as_dict()
                {
                    page_tree = Some((id, dict.clone()));
                }
            }
            Some(b"Page") | Some(b"Outlines") | Some(b"Outline") => {}
            _ => {
                merged.objects.insert(id, object);
            }
        }
    }

    let no_root = |reason: &str| MergeError::IncompleteDocument {
        path: first.clone(),
        reason: reason.to_string(),
    };
    let (catalog_id, mut catalog) = catalog.ok_or_else(|| no_root("no document catalog"))?;
    let (tree_id, mut tree) = page_tree.ok_or_else(|| no_root("no page tree"))?;

    let kids: Vec<Object> = pages.iter().map(|(id, _)| Object::Reference(*id)).collect();
    for (id, mut page) in pages {
        page.set("Parent", Object::Reference(tree_id));
        merged.objects.insert(id, Object::Dictionary(page));
    }

    tree.set("Count", Object::Integer(kids.len() as i64));
    tree.set("Kids", Object::Array(kids));
    tree.remove(b"Parent");
    merged.objects.insert(tree_id, Object::Dictionary(tree));

    catalog.set("Pages", Object::Reference(tree_id));
    catalog.remove(b"Outlines");
    merged.objects.insert(catalog_id, Object::Dictionary(catalog));

    merged.trailer.set("Root", Object::Reference(catalog_id));
    merged.max_id = merged.objects.keys().map(|(id, _)| *id).max().unwrap_or(0);
    merged.renumber_objects();
    merged.compress();
    Ok(merged)
}
