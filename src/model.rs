//! In-memory entity model of a production.
//!
//! Built once by [`crate::plan::load_plan`] and read-only for the rest of the
//! run. Entities are identified by stable keys: actors by name, materials by
//! their `(category, stem)` pair, which is also their output file location.

use std::path::{Path, PathBuf};

/// The whole production.
#[derive(Debug, Clone)]
pub struct Revue {
    pub title: String,
    pub acts: Vec<Act>,
    /// Every actor with at least one role, in order of first appearance.
    pub actors: Vec<Actor>,
}

#[derive(Debug, Clone)]
pub struct Act {
    pub name: String,
    pub materials: Vec<Material>,
}

/// One sketch or song.
#[derive(Debug, Clone)]
pub struct Material {
    pub title: String,
    /// Absolute path of the LaTeX source.
    pub path: PathBuf,
    pub category: String,
    pub roles: Vec<Role>,
    pub props: Vec<Prop>,
}

impl Material {
    /// File stem of the source; together with the category this names the
    /// converted PDF.
    pub fn stem(&self) -> &str {
        self.path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
    }

    /// Output file name of the converted material.
    pub fn pdf_name(&self) -> String {
        format!("{}.pdf", self.stem())
    }

    /// Location of the converted material below the PDF root.
    pub fn pdf_path(&self, pdf_root: &Path) -> PathBuf {
        pdf_root.join(&self.category).join(self.pdf_name())
    }

    pub fn has_actor(&self, actor: &str) -> bool {
        self.roles.iter().any(|r| r.actor == actor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    /// Short form used in overviews, e.g. `"A"`.
    pub abbreviation: String,
    pub actor: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prop {
    pub name: String,
    pub responsible: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub name: String,
}

impl Revue {
    /// All materials across all acts in declared order.
    pub fn materials(&self) -> impl Iterator<Item = &Material> {
        self.acts.iter().flat_map(|act| act.materials.iter())
    }

    /// Materials the actor has a role in, in declared order.
    pub fn materials_for<'a>(&'a self, actor: &'a Actor) -> impl Iterator<Item = &'a Material> {
        self.materials().filter(move |m| m.has_actor(&actor.name))
    }

    /// Materials in the given category, in declared order.
    pub fn materials_in<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a Material> {
        self.materials().filter(move |m| m.category == category)
    }

    /// `(material title, role)` for every role played by `actor`.
    pub fn roles_of<'a>(&'a self, actor: &'a Actor) -> Vec<(&'a str, &'a Role)> {
        self.materials()
            .flat_map(move |m| {
                m.roles
                    .iter()
                    .filter(move |r| r.actor == actor.name)
                    .map(move |r| (m.title.as_str(), r))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn material(title: &str, category: &str, actors: &[&str]) -> Material {
        Material {
            title: title.to_string(),
            path: PathBuf::from(format!("/src/{category}/{}.tex", title.to_lowercase())),
            category: category.to_string(),
            roles: actors
                .iter()
                .map(|a| Role {
                    abbreviation: a[..1].to_string(),
                    actor: a.to_string(),
                    name: format!("{a}s rolle"),
                })
                .collect(),
            props: Vec::new(),
        }
    }

    fn revue() -> Revue {
        Revue {
            title: "Revy".into(),
            acts: vec![
                Act {
                    name: "1".into(),
                    materials: vec![
                        material("Intro", "sketches", &["Anna", "Bo"]),
                        material("Vise", "sange", &["Bo"]),
                    ],
                },
                Act {
                    name: "2".into(),
                    materials: vec![material("Finale", "sketches", &["Anna"])],
                },
            ],
            actors: vec![Actor { name: "Anna".into() }, Actor { name: "Bo".into() }],
        }
    }

    #[test]
    fn materials_in_declared_order() {
        let r = revue();
        let titles: Vec<&str> = r.materials().map(|m| m.title.as_str()).collect();
        assert_eq!(titles, ["Intro", "Vise", "Finale"]);
    }

    #[test]
    fn materials_for_actor() {
        let r = revue();
        let anna = &r.actors[0];
        let titles: Vec<&str> = r.materials_for(anna).map(|m| m.title.as_str()).collect();
        assert_eq!(titles, ["Intro", "Finale"]);
    }

    #[test]
    fn materials_in_category() {
        let r = revue();
        let songs: Vec<&str> = r.materials_in("sange").map(|m| m.title.as_str()).collect();
        assert_eq!(songs, ["Vise"]);
    }

    #[test]
    fn pdf_path_uses_category_and_stem() {
        let r = revue();
        let intro = r.materials().next().unwrap();
        assert_eq!(
            intro.pdf_path(Path::new("/out")),
            PathBuf::from("/out/sketches/intro.pdf")
        );
    }

    #[test]
    fn roles_of_lists_every_role() {
        let r = revue();
        let bo = &r.actors[1];
        let roles: Vec<&str> = r.roles_of(bo).into_iter().map(|(t, _)| t).collect();
        assert_eq!(roles, ["Intro", "Vise"]);
    }
}
