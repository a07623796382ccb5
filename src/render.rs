//! LaTeX source generation for the generated parts.
//!
//! The [`Renderer`] trait is the seam between the pipeline and the templating:
//! given a [`Source`] description and the production, it writes a renderable
//! source file and returns its path. [`TexRenderer`] is the production
//! implementation; tests substitute a recording double.
//!
//! Every source is written to `<tex>/<Source::file_stem>.tex`, so distinct
//! sources never share a file even when rendered concurrently.

use crate::model::Revue;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Contacts file {}: {source}", .path.display())]
    Contacts {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// What to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Title page, optionally personalized with a subtitle (actor name or
    /// "sangmanuskript").
    Frontpage { subtitle: Option<String> },
    ActOutline,
    RoleOverview,
    PropsList,
    ContactsList,
    SignupForm,
}

impl Source {
    /// File stem of the rendered source.
    pub fn file_stem(&self) -> String {
        match self {
            Source::Frontpage { subtitle: None } => "forside".to_string(),
            Source::Frontpage {
                subtitle: Some(sub),
            } => format!("forside-{sub}"),
            Source::ActOutline => "aktoversigt".to_string(),
            Source::RoleOverview => "rolleliste".to_string(),
            Source::PropsList => "rekvisitliste".to_string(),
            Source::ContactsList => "kontaktliste".to_string(),
            Source::SignupForm => "rolletilmelding".to_string(),
        }
    }
}

/// Produces renderable source documents.
///
/// Implementations must be `Sync`: sources may be rendered from worker
/// threads.
pub trait Renderer: Sync {
    fn render(&self, source: &Source, revue: &Revue) -> Result<PathBuf, RenderError>;
}

/// Writes standalone LaTeX documents into a directory.
pub struct TexRenderer {
    tex_dir: PathBuf,
    contacts: PathBuf,
}

impl TexRenderer {
    pub fn new(tex_dir: impl Into<PathBuf>, contacts: impl Into<PathBuf>) -> Self {
        Self {
            tex_dir: tex_dir.into(),
            contacts: contacts.into(),
        }
    }

    fn body(&self, source: &Source, revue: &Revue) -> Result<String, RenderError> {
        Ok(match source {
            Source::Frontpage { subtitle } => frontpage(revue, subtitle.as_deref()),
            Source::ActOutline => act_outline(revue),
            Source::RoleOverview => role_overview(revue),
            Source::PropsList => props_list(revue),
            Source::ContactsList => contacts_list(&read_contacts(&self.contacts)?),
            Source::SignupForm => signup_form(revue),
        })
    }
}

impl Renderer for TexRenderer {
    fn render(&self, source: &Source, revue: &Revue) -> Result<PathBuf, RenderError> {
        let body = self.body(source, revue)?;
        fs::create_dir_all(&self.tex_dir)?;
        let path = self.tex_dir.join(format!("{}.tex", source.file_stem()));
        fs::write(&path, document(&body))?;
        log::debug!("rendered {}", path.display());
        Ok(path)
    }
}

/// A row of the contacts CSV (`name,phone,email`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub name: String,
    pub phone: String,
    pub email: String,
}

/// Read the contacts CSV. The first row is a header.
pub fn read_contacts(path: &Path) -> Result<Vec<Contact>, RenderError> {
    let wrap = |source: csv::Error| RenderError::Contacts {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(wrap)?;
    let mut contacts = Vec::new();
    for record in reader.records() {
        let record = record.map_err(wrap)?;
        let field = |i: usize| record.get(i).unwrap_or_default().to_string();
        contacts.push(Contact {
            name: field(0),
            phone: field(1),
            email: field(2),
        });
    }
    Ok(contacts)
}

/// Escape LaTeX special characters.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\textbackslash{}"),
            '&' | '%' | '$' | '#' | '_' | '{' | '}' => {
                out.push('\\');
                out.push(c);
            }
            '~' => out.push_str("\\textasciitilde{}"),
            '^' => out.push_str("\\textasciicircum{}"),
            _ => out.push(c),
        }
    }
    out
}

fn document(body: &str) -> String {
    format!(
        "\\documentclass[a4paper,11pt]{{article}}\n\
         \\usepackage[utf8]{{inputenc}}\n\
         \\usepackage[T1]{{fontenc}}\n\
         \\usepackage{{longtable}}\n\
         \\pagestyle{{empty}}\n\
         \\begin{{document}}\n{body}\\end{{document}}\n"
    )
}

fn frontpage(revue: &Revue, subtitle: Option<&str>) -> String {
    let mut s = String::new();
    s.push_str("\\begin{center}\n\\vspace*{6cm}\n");
    let _ = writeln!(s, "{{\\Huge {}}}\\\\[1cm]", escape(&revue.title));
    if let Some(sub) = subtitle {
        let _ = writeln!(s, "{{\\LARGE {}}}\\\\", escape(sub));
    }
    s.push_str("\\end{center}\n");
    s
}

fn act_outline(revue: &Revue) -> String {
    let mut s = String::from("\\section*{Aktoversigt}\n");
    for act in &revue.acts {
        let _ = writeln!(s, "\\subsection*{{{}}}", escape(&act.name));
        s.push_str("\\begin{enumerate}\n");
        for m in &act.materials {
            let cast: Vec<String> = m.roles.iter().map(|r| escape(&r.abbreviation)).collect();
            let _ = writeln!(
                s,
                "\\item {} \\hfill {}",
                escape(&m.title),
                cast.join(", ")
            );
        }
        s.push_str("\\end{enumerate}\n");
    }
    s
}

fn role_overview(revue: &Revue) -> String {
    let mut s = String::from("\\section*{Rolleliste}\n");
    for actor in &revue.actors {
        let _ = writeln!(s, "\\subsection*{{{}}}", escape(&actor.name));
        s.push_str("\\begin{itemize}\n");
        for (title, role) in revue.roles_of(actor) {
            let _ = writeln!(
                s,
                "\\item {}: {} ({})",
                escape(title),
                escape(&role.name),
                escape(&role.abbreviation)
            );
        }
        s.push_str("\\end{itemize}\n");
    }
    s
}

fn props_list(revue: &Revue) -> String {
    let mut s = String::from(
        "\\section*{Rekvisitliste}\n\\begin{longtable}{p{5cm}p{5cm}p{4cm}}\n\
         \\textbf{Rekvisit} & \\textbf{Nummer} & \\textbf{Ansvarlig}\\\\\n\\hline\n",
    );
    for m in revue.materials() {
        for prop in &m.props {
            let _ = writeln!(
                s,
                "{} & {} & {}\\\\",
                escape(&prop.name),
                escape(&m.title),
                escape(prop.responsible.as_deref().unwrap_or(""))
            );
        }
    }
    s.push_str("\\end{longtable}\n");
    s
}

fn contacts_list(contacts: &[Contact]) -> String {
    let mut s = String::from(
        "\\section*{Kontaktliste}\n\\begin{longtable}{p{5cm}p{3cm}p{6cm}}\n\
         \\textbf{Navn} & \\textbf{Telefon} & \\textbf{E-mail}\\\\\n\\hline\n",
    );
    for c in contacts {
        let _ = writeln!(
            s,
            "{} & {} & {}\\\\",
            escape(&c.name),
            escape(&c.phone),
            escape(&c.email)
        );
    }
    s.push_str("\\end{longtable}\n");
    s
}

fn signup_form(revue: &Revue) -> String {
    let mut s = String::from("\\section*{Rolletilmelding}\n");
    for act in &revue.acts {
        let _ = writeln!(s, "\\subsection*{{{}}}", escape(&act.name));
        s.push_str("\\begin{longtable}{p{5cm}p{3cm}p{6cm}}\n");
        s.push_str("\\textbf{Nummer} & \\textbf{Rolle} & \\textbf{Tilmeldte}\\\\\n\\hline\n");
        for m in &act.materials {
            for role in &m.roles {
                let _ = writeln!(
                    s,
                    "{} & {} & \\\\[0.5cm]",
                    escape(&m.title),
                    escape(&role.name)
                );
            }
        }
        s.push_str("\\end{longtable}\n");
    }
    s
}
