//! Lookup of SPEC documents by id

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tagtrace_core::validate_spec_id_format;

/// Answers whether a SPEC document backs an id.
pub trait SpecCatalog {
    fn spec_exists(&self, spec_id: &str) -> bool;

    /// Where a new SPEC document for `spec_id` should be created.
    fn expected_path(&self, spec_id: &str) -> PathBuf;
}

/// SPEC documents on disk: `<dir>/<SPEC-ID>/spec.md` or `<dir>/<SPEC-ID>.md`.
#[derive(Debug, Clone)]
pub struct SpecDirectory {
    root: PathBuf,
}

impl SpecDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Existing document for `spec_id`, if any. Ids that fail format
    /// validation never touch the filesystem.
    pub fn document_path(&self, spec_id: &str) -> Option<PathBuf> {
        if !validate_spec_id_format(spec_id) {
            return None;
        }
        [
            self.root.join(spec_id).join("spec.md"),
            self.root.join(format!("{spec_id}.md")),
        ]
        .into_iter()
        .find(|candidate| candidate.is_file())
    }
}

impl SpecCatalog for SpecDirectory {
    fn spec_exists(&self, spec_id: &str) -> bool {
        self.document_path(spec_id).is_some()
    }

    fn expected_path(&self, spec_id: &str) -> PathBuf {
        self.root.join(spec_id).join("spec.md")
    }
}

/// In-memory catalog for tests and callers that already know the spec set.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    ids: BTreeSet<String>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_spec(mut self, spec_id: impl Into<String>) -> Self {
        self.ids.insert(spec_id.into());
        self
    }

    pub fn insert(&mut self, spec_id: impl Into<String>) {
        self.ids.insert(spec_id.into());
    }
}

impl<S: Into<String>> FromIterator<S> for MemoryCatalog {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl SpecCatalog for MemoryCatalog {
    fn spec_exists(&self, spec_id: &str) -> bool {
        self.ids.contains(spec_id)
    }

    fn expected_path(&self, spec_id: &str) -> PathBuf {
        PathBuf::from("specs").join(spec_id).join("spec.md")
    }
}
