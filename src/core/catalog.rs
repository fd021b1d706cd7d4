//! Purpose: Parse, mutate, and serialize the section-delimited catalog document.
//! Exports: `CatalogDocument`, `Section`, `CatalogEntry`, `MatchMode`, and the
//! text-level `create`/`update`/`delete`/`contains` operations.
//! Role: Pure transformer over document text; owns no storage.
//! Invariants: Every serialized section is preceded by `SECTION_MARKER` and
//! terminated by a newline; blank sections are dropped on serialization.
//! Invariants: Update and delete act on the first matching section only, so
//! relative order of all other sections is preserved.
//! Notes: The marker must not occur inside entry values; the split would
//! misparse. Callers sanitize; this module does not.

use crate::core::error::{Error, ErrorKind};

pub const SECTION_MARKER: &str = "## ";
const KEY_SUFFIX: &str = " - Description";

/// How a product name is compared against a section.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum MatchMode {
    /// Section body starts with the name (case-sensitive). `"Alpha"` also
    /// matches a section for `"AlphaBeta"` if that one comes first, and an
    /// empty name matches every section.
    #[default]
    Prefix,
    /// Product name on the key line equals the name.
    Exact,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CatalogEntry {
    pub product_name: String,
    pub description: String,
    pub features: Vec<String>,
    pub specs: Vec<String>,
}

impl CatalogEntry {
    /// Section text without the leading marker.
    pub fn body(&self) -> String {
        let features = bullet_lines(&self.features);
        let specs = bullet_lines(&self.specs);
        format!(
            "{}{KEY_SUFFIX}\nDescription: {}\nKey Features:\n{features}\nTechnical Specifications:\n{specs}\n",
            self.product_name, self.description
        )
    }

    /// Full section text as appended to a document.
    pub fn section(&self) -> String {
        format!("{SECTION_MARKER}{}", self.body())
    }

    pub fn contains_marker(&self) -> bool {
        std::iter::once(&self.product_name)
            .chain(std::iter::once(&self.description))
            .chain(self.features.iter())
            .chain(self.specs.iter())
            .any(|value| value.contains(SECTION_MARKER))
    }
}

fn bullet_lines(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("- {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Section {
    body: String,
}

impl Section {
    pub fn new(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// First line of the body, without the line break.
    pub fn key(&self) -> &str {
        let line = self.body.split('\n').next().unwrap_or_default();
        line.strip_suffix('\r').unwrap_or(line)
    }

    pub fn product_name(&self) -> &str {
        let key = self.key();
        key.strip_suffix(KEY_SUFFIX).unwrap_or(key).trim()
    }

    pub fn matches(&self, name: &str, mode: MatchMode) -> bool {
        match mode {
            MatchMode::Prefix => self.body.starts_with(name),
            MatchMode::Exact => self.product_name() == name,
        }
    }

    fn is_blank(&self) -> bool {
        self.body.trim().is_empty()
    }
}

/// A catalog split into its sections.
///
/// Text before the first marker is kept as a preamble and written back
/// unchanged (trimmed), so hand-written headers survive rewrites.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CatalogDocument {
    preamble: String,
    sections: Vec<Section>,
}

impl CatalogDocument {
    pub fn parse(text: &str) -> Self {
        let mut parts = text.split(SECTION_MARKER);
        let preamble = parts.next().unwrap_or_default().to_string();
        let sections = parts.map(Section::new).collect();
        Self { preamble, sections }
    }

    pub fn serialize(&self) -> String {
        let mut out = String::new();
        let preamble = self.preamble.trim();
        if !preamble.is_empty() {
            out.push_str(preamble);
            out.push('\n');
        }
        for section in self.sections.iter().filter(|section| !section.is_blank()) {
            out.push_str(SECTION_MARKER);
            out.push_str(section.body.trim());
            out.push('\n');
        }
        out
    }

    pub fn preamble(&self) -> &str {
        &self.preamble
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn len(&self) -> usize {
        self.sections.iter().filter(|section| !section.is_blank()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn position(&self, name: &str, mode: MatchMode) -> Option<usize> {
        self.sections
            .iter()
            .position(|section| section.matches(name, mode))
    }

    pub fn append(&mut self, entry: &CatalogEntry) {
        self.sections.push(Section::new(entry.body()));
    }

    pub fn update(&mut self, entry: &CatalogEntry, mode: MatchMode) -> Result<(), Error> {
        let index = self
            .position(&entry.product_name, mode)
            .ok_or_else(|| not_found(&entry.product_name))?;
        self.sections[index] = Section::new(entry.body());
        Ok(())
    }

    pub fn remove(&mut self, name: &str, mode: MatchMode) -> Result<Section, Error> {
        let index = self.position(name, mode).ok_or_else(|| not_found(name))?;
        Ok(self.sections.remove(index))
    }
}

fn not_found(name: &str) -> Error {
    Error::new(ErrorKind::NotFound).with_message(format!("Product '{name}' not found"))
}

/// Appends `entry` to `text` without touching the existing sections.
pub fn create(text: &str, entry: &CatalogEntry) -> String {
    let mut out = String::with_capacity(text.len() + 128);
    out.push_str(text);
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(&entry.section());
    out
}

pub fn update(text: &str, entry: &CatalogEntry, mode: MatchMode) -> Result<String, Error> {
    let mut document = CatalogDocument::parse(text);
    document.update(entry, mode)?;
    Ok(document.serialize())
}

pub fn delete(text: &str, name: &str, mode: MatchMode) -> Result<String, Error> {
    let mut document = CatalogDocument::parse(text);
    document.remove(name, mode)?;
    Ok(document.serialize())
}

pub fn contains(text: &str, name: &str, mode: MatchMode) -> bool {
    CatalogDocument::parse(text).position(name, mode).is_some()
}
