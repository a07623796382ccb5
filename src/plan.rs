//! Plan file loading and generation.
//!
//! The plan file (`aktoversigt.plan`) is the production's table of contents:
//! acts in order, each listing its materials with roles and props. It is a
//! TOML document:
//!
//! ```toml
//! title = "Revy 2026"
//!
//! [[acts]]
//! name = "Første akt"
//!
//! [[acts.materials]]
//! file = "sketches/intro.tex"      # relative to paths.material
//! title = "Intro"
//! category = "sketches"            # defaults to the parent directory name
//! roles = [{ abbreviation = "A", actor = "Anna", role = "Bager" }]
//! props = [{ name = "Kage", responsible = "Anna" }]
//! ```
//!
//! [`load_plan`] turns it into a [`Revue`]; [`create_plan_file`] writes a
//! starting plan by walking the material directory.
//!
//! ## Validation
//!
//! - Two materials may not convert to the same output file, i.e. share
//!   category and file stem. Parallel conversion relies on every job writing
//!   a distinct path.
//! - Actor names become file names, so they must be non-empty and free of
//!   path separators.

use crate::config::PathsConfig;
use crate::model::{Act, Actor, Material, Prop, Revue, Role};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum PlanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Plan parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Plan serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Materials '{first}' and '{second}' would both be written to {output}")]
    DuplicateOutput {
        first: String,
        second: String,
        output: String,
    },
    #[error("Invalid actor name '{0}' (must be non-empty and contain no path separators)")]
    InvalidActorName(String),
}

/// On-disk plan file layout.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanFile {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub acts: Vec<PlanAct>,
}

fn default_title() -> String {
    "Revy".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanAct {
    pub name: String,
    #[serde(default)]
    pub materials: Vec<PlanMaterial>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanMaterial {
    pub file: PathBuf,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub roles: Vec<PlanRole>,
    #[serde(default)]
    pub props: Vec<PlanProp>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanRole {
    pub abbreviation: String,
    pub actor: String,
    pub role: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanProp {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responsible: Option<String>,
}

/// Load the plan file and build the entity model.
///
/// Material paths are resolved against `material_root`.
pub fn load_plan(plan_path: &Path, material_root: &Path) -> Result<Revue, PlanError> {
    let content = fs::read_to_string(plan_path)?;
    let plan: PlanFile = toml::from_str(&content)?;
    build_revue(plan, material_root)
}

/// Convert a parsed plan into a validated [`Revue`].
pub fn build_revue(plan: PlanFile, material_root: &Path) -> Result<Revue, PlanError> {
    let mut actors: Vec<Actor> = Vec::new();
    let mut outputs: Vec<(String, String)> = Vec::new();
    let mut acts = Vec::with_capacity(plan.acts.len());

    for act in plan.acts {
        let mut materials = Vec::with_capacity(act.materials.len());
        for m in act.materials {
            let category = m.category.unwrap_or_else(|| category_of(&m.file));
            let roles: Vec<Role> = m
                .roles
                .into_iter()
                .map(|r| Role {
                    abbreviation: r.abbreviation,
                    actor: r.actor,
                    name: r.role,
                })
                .collect();

            for role in &roles {
                validate_actor_name(&role.actor)?;
                if !actors.iter().any(|a| a.name == role.actor) {
                    actors.push(Actor {
                        name: role.actor.clone(),
                    });
                }
            }

            let material = Material {
                title: m.title,
                path: material_root.join(&m.file),
                category,
                roles,
                props: m
                    .props
                    .into_iter()
                    .map(|p| Prop {
                        name: p.name,
                        responsible: p.responsible,
                    })
                    .collect(),
            };

            let output = format!("{}/{}", material.category, material.pdf_name());
            if let Some((first, _)) = outputs.iter().find(|(_, o)| *o == output) {
                return Err(PlanError::DuplicateOutput {
                    first: first.clone(),
                    second: material.title,
                    output,
                });
            }
            outputs.push((material.title.clone(), output));
            materials.push(material);
        }
        acts.push(Act {
            name: act.name,
            materials,
        });
    }

    Ok(Revue {
        title: plan.title,
        acts,
        actors,
    })
}

fn validate_actor_name(name: &str) -> Result<(), PlanError> {
    if name.trim().is_empty() || name.contains(['/', '\\']) || name == ".." {
        return Err(PlanError::InvalidActorName(name.to_string()));
    }
    Ok(())
}

/// Category defaults to the name of the material's parent directory.
fn category_of(file: &Path) -> String {
    file.parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Write a starting plan file listing every `.tex` file under
/// `paths.material`, skipping the generated tex and pdf directories.
///
/// Everything lands in a single act; the plan is meant to be edited by hand
/// afterwards. Returns the number of materials found.
pub fn create_plan_file(paths: &PathsConfig) -> Result<usize, PlanError> {
    let plan = scan_materials(paths)?;
    let count = plan.acts.iter().map(|a| a.materials.len()).sum();
    let content = toml::to_string_pretty(&plan)?;
    if let Some(parent) = paths.plan.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&paths.plan, content)?;
    Ok(count)
}

fn scan_materials(paths: &PathsConfig) -> Result<PlanFile, PlanError> {
    let root = &paths.material;
    let skip: HashSet<PathBuf> = [&paths.tex, &paths.pdf]
        .into_iter()
        .map(|p| p.canonicalize().unwrap_or_else(|_| p.clone()))
        .collect();

    let mut files = Vec::new();
    let walker = WalkDir::new(root).sort_by_file_name().into_iter();
    for entry in walker.filter_entry(|e| {
        let path = e.path().canonicalize().unwrap_or_else(|_| e.path().to_path_buf());
        !skip.contains(&path)
    }) {
        let entry = entry?;
        let path = entry.path();
        let is_tex = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("tex"))
            .unwrap_or(false);
        if entry.file_type().is_file() && is_tex {
            files.push(path.to_path_buf());
        }
    }

    let mut materials = Vec::with_capacity(files.len());
    for path in files {
        let relative = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
        let content = fs::read_to_string(&path)?;
        let title = latex_title(&content).unwrap_or_else(|| {
            path.file_stem()
                .map(|s| s.to_string_lossy().replace(['-', '_'], " "))
                .unwrap_or_default()
        });
        materials.push(PlanMaterial {
            file: relative,
            title,
            category: None,
            roles: Vec::new(),
            props: Vec::new(),
        });
    }

    Ok(PlanFile {
        title: default_title(),
        acts: vec![PlanAct {
            name: "Første akt".to_string(),
            materials,
        }],
    })
}

/// Content of the first `\title{...}` in a LaTeX source.
fn latex_title(content: &str) -> Option<String> {
    let start = content.find("\\title{")? + "\\title{".len();
    let rest = &content[start..];
    let end = rest.find('}')?;
    let title = rest[..end].trim();
    (!title.is_empty()).then(|| title.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PLAN: &str = r#"
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

        [[acts]]
        name = "Anden akt"

        [[acts.materials]]
        file = "sange/vise.tex"
        title = "Vise"
        roles = [{ abbreviation = "B", actor = "Bo", role = "Sanger" }]
    "#;

    #[test]
    fn build_revue_from_plan() {
        let plan: PlanFile = toml::from_str(PLAN).unwrap();
        let revue = build_revue(plan, Path::new("/rev")).unwrap();

        assert_eq!(revue.title, "Testrevy");
        assert_eq!(revue.acts.len(), 2);
        let intro = &revue.acts[0].materials[0];
        assert_eq!(intro.path, PathBuf::from("/rev/sketches/intro.tex"));
        assert_eq!(intro.category, "sketches");
        assert_eq!(intro.props[0].responsible.as_deref(), Some("Anna"));
        assert_eq!(revue.acts[1].materials[0].category, "sange");
    }

    #[test]
    fn actors_in_first_appearance_order() {
        let plan: PlanFile = toml::from_str(PLAN).unwrap();
        let revue = build_revue(plan, Path::new("/rev")).unwrap();
        let names: Vec<&str> = revue.actors.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["Anna", "Bo"]);
    }

    #[test]
    fn explicit_category_overrides_directory() {
        let plan: PlanFile = toml::from_str(
            r#"
            [[acts]]
            name = "1"
            [[acts.materials]]
            file = "misc/duet.tex"
            title = "Duet"
            category = "sange"
            "#,
        )
        .unwrap();
        let revue = build_revue(plan, Path::new("/rev")).unwrap();
        assert_eq!(revue.acts[0].materials[0].category, "sange");
    }

    #[test]
    fn duplicate_output_rejected() {
        let plan: PlanFile = toml::from_str(
            r#"
            [[acts]]
            name = "1"
            [[acts.materials]]
            file = "sketches/a.tex"
            title = "First"
            [[acts]]
            name = "2"
            [[acts.materials]]
            file = "other/a.tex"
            title = "Second"
            category = "sketches"
            "#,
        )
        .unwrap();
        let err = build_revue(plan, Path::new("/rev")).unwrap_err();
        assert!(matches!(err, PlanError::DuplicateOutput { .. }));
        assert!(err.to_string().contains("sketches/a.pdf"));
    }

    #[test]
    fn actor_with_path_separator_rejected() {
        let plan: PlanFile = toml::from_str(
            r#"
            [[acts]]
            name = "1"
            [[acts.materials]]
            file = "sketches/a.tex"
            title = "A"
            roles = [{ abbreviation = "X", actor = "../x", role = "X" }]
            "#,
        )
        .unwrap();
        assert!(matches!(
            build_revue(plan, Path::new("/rev")),
            Err(PlanError::InvalidActorName(_))
        ));
    }

    #[test]
    fn unknown_plan_key_rejected() {
        let result: Result<PlanFile, _> = toml::from_str("titel = \"x\"");
        assert!(result.is_err());
    }

    #[test]
    fn latex_title_extracted() {
        assert_eq!(
            latex_title("\\documentclass{revy}\n\\title{Morgenvise}\n"),
            Some("Morgenvise".to_string())
        );
        assert_eq!(latex_title("\\title{}"), None);
        assert_eq!(latex_title("no title"), None);
    }

    #[test]
    fn create_plan_file_lists_tex_files() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("sange")).unwrap();
        fs::create_dir_all(root.join("sketches")).unwrap();
        fs::create_dir_all(root.join("tex")).unwrap();
        fs::write(root.join("sange/vise.tex"), "\\title{Vise}").unwrap();
        fs::write(root.join("sketches/b-sketch.tex"), "").unwrap();
        fs::write(root.join("sketches/notes.txt"), "").unwrap();
        fs::write(root.join("tex/forside.tex"), "").unwrap();

        let paths = PathsConfig {
            material: root.to_path_buf(),
            tex: root.join("tex"),
            pdf: root.join("pdf"),
            plan: root.join("aktoversigt.plan"),
            ..PathsConfig::default()
        };
        let count = create_plan_file(&paths).unwrap();
        assert_eq!(count, 2);

        let revue = load_plan(&paths.plan, root).unwrap();
        let titles: Vec<&str> = revue.materials().map(|m| m.title.as_str()).collect();
        assert_eq!(titles, ["Vise", "b sketch"]);
        let categories: Vec<&str> = revue.materials().map(|m| m.category.as_str()).collect();
        assert_eq!(categories, ["sange", "sketches"]);
    }
}
