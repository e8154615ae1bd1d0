//! Persistent linkage store
//!
//! One physical set of tag records, indexed two ways: spec id to locations
//! and file to tags. Both indexes are rebuilt from the records on load and
//! kept in step on every mutation.
//!
//! ## On-disk format
//! ```json
//! {
//!   "tags": [{"spec_id": "SPEC-AUTH-001", "verb": "impl", "category": "CODE",
//!             "file_path": "src/auth.rs", "line": 3}],
//!   "files": {"src/auth.rs": ["SPEC-AUTH-001"]}
//! }
//! ```
//! Records hold strings only. A record that no longer parses is skipped with
//! a warning rather than failing the whole load.

use crate::catalog::SpecCatalog;
use crate::error::{StoreError, TraceError};
use crate::lock::{AdvisoryLock, LockGuard};
use facet::Facet;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tagtrace_core::{Category, Tag, Verb, normalize_path, parse_spec_id};
use tracing::{debug, info, warn};

/// A persisted tag record.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct LinkageEntry {
    pub spec_id: String,
    pub verb: String,
    pub category: String,
    pub file_path: String,
    pub line: usize,
    #[facet(default)]
    pub description: Option<String>,
}

impl From<&Tag> for LinkageEntry {
    fn from(tag: &Tag) -> Self {
        Self {
            spec_id: tag.spec_id.to_string(),
            verb: tag.verb.as_str().to_string(),
            category: tag.category.as_str().to_string(),
            file_path: tag.file_path.clone(),
            line: tag.line,
            description: tag.description.clone(),
        }
    }
}

impl LinkageEntry {
    /// Convert back into a validated tag; `None` if any field is malformed.
    pub fn to_tag(&self) -> Option<Tag> {
        let spec_id = parse_spec_id(&self.spec_id)?;
        let verb = Verb::parse(&self.verb)?;
        let category = Category::parse(&self.category)?;
        let tag = Tag::new(spec_id, verb, category, self.file_path.as_str(), self.line);
        Some(match &self.description {
            Some(description) => tag.with_description(description.as_str()),
            None => tag,
        })
    }
}

#[derive(Debug, Default, Facet)]
struct StoreDocument {
    #[facet(default)]
    tags: Vec<LinkageEntry>,
    #[facet(default)]
    files: BTreeMap<String, Vec<String>>,
}

/// Where a spec is referenced.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CodeLocation {
    pub file_path: String,
    pub line: usize,
}

/// How the store came to hold its current contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    /// No store file existed
    Fresh,
    /// Loaded from disk; `skipped` malformed records were dropped
    Loaded { skipped: usize },
    /// The file was corrupted; the store started empty and the next write
    /// replaces it
    Degraded(String),
    /// The file exists but could not be read; writes are refused until a
    /// reload succeeds
    Unreadable(String),
}

impl LoadStatus {
    pub fn is_degraded(&self) -> bool {
        matches!(self, LoadStatus::Degraded(_) | LoadStatus::Unreadable(_))
    }
}

/// Record identity: one link at one line of one file. A comment may carry
/// several TAGs for the same spec, so category and verb are part of it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct EntryKey {
    file_path: String,
    line: usize,
    spec_id: String,
    category: Category,
    verb: Verb,
}

impl EntryKey {
    fn of(tag: &Tag) -> Self {
        Self {
            file_path: tag.file_path.clone(),
            line: tag.line,
            spec_id: tag.spec_id.to_string(),
            category: tag.category,
            verb: tag.verb,
        }
    }
}

/// Bidirectionally indexed tag store, optionally backed by a JSON file.
#[derive(Debug)]
pub struct LinkageStore {
    path: Option<PathBuf>,
    entries: BTreeMap<EntryKey, Tag>,
    by_spec: HashMap<String, BTreeSet<EntryKey>>,
    by_file: HashMap<String, BTreeSet<EntryKey>>,
    status: LoadStatus,
    /// Inside `update`: mutations mark the store dirty instead of writing
    deferred: bool,
    dirty: bool,
}

impl LinkageStore {
    /// Open the store at `path`. Never fails: a missing file gives an empty
    /// store, an unusable one gives an empty store in degraded mode.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let mut store = Self::empty(Some(path.into()));
        store.reload();
        store
    }

    /// A store that is never written to disk.
    pub fn in_memory() -> Self {
        Self::empty(None)
    }

    fn empty(path: Option<PathBuf>) -> Self {
        Self {
            path,
            entries: BTreeMap::new(),
            by_spec: HashMap::new(),
            by_file: HashMap::new(),
            status: LoadStatus::Fresh,
            deferred: false,
            dirty: false,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn status(&self) -> &LoadStatus {
        &self.status
    }

    /// Replace the in-memory state with what is on disk. In-memory stores
    /// have no backing file and keep their contents.
    pub fn reload(&mut self) {
        let Some(path) = self.path.clone() else {
            return;
        };
        self.clear_indexes();

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Store {} does not exist yet", path.display());
                self.status = LoadStatus::Fresh;
                return;
            }
            Err(source) => {
                let err = StoreError::Read { path, source };
                warn!("{}; starting read-only with an empty store", err);
                self.status = LoadStatus::Unreadable(err.to_string());
                return;
            }
        };

        if content.trim().is_empty() {
            self.status = LoadStatus::Loaded { skipped: 0 };
            return;
        }

        let document: StoreDocument = match facet_json::from_str(&content) {
            Ok(document) => document,
            Err(e) => {
                let err = StoreError::Corrupted {
                    path,
                    reason: e.to_string(),
                };
                warn!("{}; starting with an empty store", err);
                self.status = LoadStatus::Degraded(err.to_string());
                return;
            }
        };

        let mut skipped = 0;
        for entry in &document.tags {
            match entry.to_tag() {
                Some(tag) => self.insert(tag),
                None => {
                    skipped += 1;
                    warn!(
                        "Skipping malformed store record {}:{} ({})",
                        entry.file_path, entry.line, entry.spec_id
                    );
                }
            }
        }

        if skipped == 0 && document.files != self.files_view() {
            warn!(
                "File index in {} disagrees with its records, rebuilt from records",
                path.display()
            );
        }

        info!(
            "Loaded {} tags from {}",
            self.entries.len(),
            path.display()
        );
        self.status = LoadStatus::Loaded { skipped };
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All tags, ordered by file, line, spec id, category and verb.
    pub fn tags(&self) -> impl Iterator<Item = &Tag> {
        self.entries.values()
    }

    /// Distinct spec ids, sorted.
    pub fn spec_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.by_spec.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Distinct files, sorted.
    pub fn files(&self) -> Vec<&str> {
        let mut files: Vec<&str> = self.by_file.keys().map(String::as_str).collect();
        files.sort_unstable();
        files
    }

    pub fn add_tag(&mut self, tag: Tag) -> Result<(), StoreError> {
        self.commit(|store| store.insert(tag))
    }

    pub fn add_tags(&mut self, tags: impl IntoIterator<Item = Tag>) -> Result<(), StoreError> {
        self.commit(|store| {
            for tag in tags {
                store.insert(tag);
            }
        })
    }

    /// Locations referencing `spec_id`, ordered by file and line. A line
    /// carrying several TAGs for the spec is listed once.
    pub fn get_code_locations(&self, spec_id: &str) -> Vec<CodeLocation> {
        let mut locations: Vec<CodeLocation> = self
            .by_spec
            .get(spec_id)
            .into_iter()
            .flatten()
            .map(|key| CodeLocation {
                file_path: key.file_path.clone(),
                line: key.line,
            })
            .collect();
        locations.dedup();
        locations
    }

    /// Tags referencing `spec_id`.
    pub fn get_tags_by_spec(&self, spec_id: &str) -> Vec<&Tag> {
        self.lookup(self.by_spec.get(spec_id))
    }

    pub fn get_tags_by_file(&self, file_path: &str) -> Vec<&Tag> {
        self.lookup(self.by_file.get(&normalize_path(file_path)))
    }

    fn lookup(&self, keys: Option<&BTreeSet<EntryKey>>) -> Vec<&Tag> {
        keys.into_iter()
            .flatten()
            .filter_map(|key| self.entries.get(key))
            .collect()
    }

    /// Delete every record for `file_path`. Returns how many were removed;
    /// removing an unknown file is a no-op.
    pub fn remove_file_tags(&mut self, file_path: &str) -> Result<usize, StoreError> {
        let file_path = normalize_path(file_path);
        if !self.by_file.contains_key(&file_path) {
            return Ok(0);
        }
        self.commit(|store| store.remove_file(&file_path))
    }

    /// Replace the records of one file with a fresh scan, persisting once.
    pub fn replace_file_tags(
        &mut self,
        file_path: &str,
        tags: impl IntoIterator<Item = Tag>,
    ) -> Result<(), StoreError> {
        let file_path = normalize_path(file_path);
        self.commit(|store| {
            store.remove_file(&file_path);
            for tag in tags {
                if tag.file_path != file_path {
                    warn!(
                        "Tag for {} passed while replacing {}, storing it anyway",
                        tag.file_path, file_path
                    );
                }
                store.insert(tag);
            }
        })
    }

    /// Tags whose spec id has no SPEC document behind it.
    pub fn find_orphaned_tags(&self, catalog: &dyn SpecCatalog) -> Vec<&Tag> {
        let missing: BTreeSet<&str> = self
            .by_spec
            .keys()
            .map(String::as_str)
            .filter(|id| !catalog.spec_exists(id))
            .collect();
        self.entries
            .values()
            .filter(|tag| missing.contains(tag.spec_id.as_str()))
            .collect()
    }

    pub fn clear(&mut self) -> Result<(), StoreError> {
        self.commit(Self::clear_indexes)
    }

    /// Run a read-modify-write sequence under `lock`: reload from disk, apply
    /// `f`, persist once. If `f` or the write fails, the state from before
    /// `f` is restored.
    pub fn update<T>(
        &mut self,
        lock: &dyn AdvisoryLock,
        timeout: Duration,
        f: impl FnOnce(&mut Self) -> Result<T, StoreError>,
    ) -> Result<T, TraceError> {
        let guard = LockGuard::acquire(lock, timeout)?;
        self.reload();
        let snapshot = self.entries.clone();

        self.deferred = true;
        self.dirty = false;
        let result = f(self);
        self.deferred = false;

        let result = result.and_then(|value| {
            if self.dirty {
                self.persist()?;
            }
            Ok(value)
        });
        self.dirty = false;
        if result.is_err() {
            self.restore(snapshot);
        }
        guard.release()?;
        Ok(result?)
    }

    /// Check that both indexes describe exactly the stored records.
    pub fn is_consistent(&self) -> bool {
        let indexed = |index: &HashMap<String, BTreeSet<EntryKey>>,
                       field: fn(&EntryKey) -> &str| {
            let mut count = 0;
            for (name, keys) in index {
                if keys.is_empty() {
                    return None;
                }
                for key in keys {
                    if field(key) != name.as_str() || !self.entries.contains_key(key) {
                        return None;
                    }
                    count += 1;
                }
            }
            Some(count)
        };

        let spec_count = indexed(&self.by_spec, |key| key.spec_id.as_str());
        let file_count = indexed(&self.by_file, |key| key.file_path.as_str());
        let records_match = self
            .entries
            .iter()
            .all(|(key, tag)| *key == EntryKey::of(tag));

        records_match
            && spec_count == Some(self.entries.len())
            && file_count == Some(self.entries.len())
    }

    fn insert(&mut self, tag: Tag) {
        let key = EntryKey::of(&tag);
        self.by_spec
            .entry(key.spec_id.clone())
            .or_default()
            .insert(key.clone());
        self.by_file
            .entry(key.file_path.clone())
            .or_default()
            .insert(key.clone());
        self.entries.insert(key, tag);
    }

    fn remove_file(&mut self, file_path: &str) -> usize {
        let Some(keys) = self.by_file.remove(file_path) else {
            return 0;
        };
        for key in &keys {
            self.entries.remove(key);
            if let Some(spec_keys) = self.by_spec.get_mut(&key.spec_id) {
                spec_keys.remove(key);
                if spec_keys.is_empty() {
                    self.by_spec.remove(&key.spec_id);
                }
            }
        }
        keys.len()
    }

    /// Apply `change` and persist it. A failed write undoes the change, so
    /// memory never holds state the file does not.
    fn commit<T>(&mut self, change: impl FnOnce(&mut Self) -> T) -> Result<T, StoreError> {
        let snapshot = (!self.deferred && self.path.is_some()).then(|| self.entries.clone());
        let value = change(self);
        if let Err(e) = self.persist() {
            if let Some(snapshot) = snapshot {
                self.restore(snapshot);
            }
            return Err(e);
        }
        Ok(value)
    }

    fn restore(&mut self, entries: BTreeMap<EntryKey, Tag>) {
        self.clear_indexes();
        for tag in entries.into_values() {
            self.insert(tag);
        }
    }

    fn clear_indexes(&mut self) {
        self.entries.clear();
        self.by_spec.clear();
        self.by_file.clear();
    }

    fn files_view(&self) -> BTreeMap<String, Vec<String>> {
        self.by_file
            .iter()
            .map(|(file, keys)| {
                let ids: BTreeSet<&str> = keys.iter().map(|key| key.spec_id.as_str()).collect();
                (file.clone(), ids.into_iter().map(str::to_string).collect())
            })
            .collect()
    }

    /// Write the store atomically: temp file in the same directory, then
    /// rename over the target.
    fn persist(&mut self) -> Result<(), StoreError> {
        if self.deferred {
            self.dirty = true;
            return Ok(());
        }
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        if let LoadStatus::Unreadable(reason) = &self.status {
            return Err(StoreError::Unreadable {
                path: path.to_path_buf(),
                reason: reason.clone(),
            });
        }

        let document = StoreDocument {
            tags: self.entries.values().map(LinkageEntry::from).collect(),
            files: self.files_view(),
        };
        let json = facet_json::to_string_pretty(&document)
            .map_err(|e| StoreError::Serialize(e.to_string()))?;

        let write_err = |source: std::io::Error| StoreError::Write {
            path: path.to_path_buf(),
            source,
        };
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir).map_err(write_err)?;

        let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
        temp.write_all(json.as_bytes()).map_err(write_err)?;
        temp.as_file().sync_all().map_err(write_err)?;
        temp.persist(path).map_err(|e| write_err(e.error))?;

        debug!("Persisted {} tags to {}", self.entries.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::MemoryLock;
    use tagtrace_core::SpecId;

    fn spec(id: &str) -> SpecId {
        parse_spec_id(id).unwrap()
    }

    fn tag(id: &str, category: Category, file: &str, line: usize) -> Tag {
        Tag::new(spec(id), Verb::Impl, category, file, line)
    }

    #[test]
    fn test_upsert_by_file_line_and_spec() {
        let mut store = LinkageStore::in_memory();
        store
            .add_tag(tag("SPEC-AUTH-001", Category::Code, "src/auth.rs", 3))
            .unwrap();
        store
            .add_tag(
                tag("SPEC-AUTH-001", Category::Code, "src/auth.rs", 3).with_description("login"),
            )
            .unwrap();
        store
            .add_tag(tag("SPEC-AUTH-002", Category::Code, "src/auth.rs", 3))
            .unwrap();

        assert_eq!(store.len(), 2);
        let tags = store.get_tags_by_file("./src/auth.rs");
        assert_eq!(tags[0].description.as_deref(), Some("login"));
        assert!(store.is_consistent());
    }

    #[test]
    fn test_same_line_tags_of_different_categories_coexist() {
        let mut store = LinkageStore::in_memory();
        store
            .add_tags([
                tag("SPEC-AUTH-001", Category::Req, "specs/auth.md", 1),
                tag("SPEC-AUTH-001", Category::Design, "specs/auth.md", 1),
            ])
            .unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.get_tags_by_spec("SPEC-AUTH-001").len(), 2);
        assert_eq!(store.get_code_locations("SPEC-AUTH-001").len(), 1);
        assert!(store.is_consistent());
    }

    #[test]
    fn test_remove_cleans_both_indexes() {
        let mut store = LinkageStore::in_memory();
        store
            .add_tags([
                tag("SPEC-A-001", Category::Code, "src/a.rs", 1),
                tag("SPEC-A-001", Category::Test, "tests/a.rs", 1),
                tag("SPEC-B-001", Category::Code, "src/a.rs", 9),
            ])
            .unwrap();

        assert_eq!(store.remove_file_tags("src/a.rs").unwrap(), 2);
        assert_eq!(store.spec_ids(), vec!["SPEC-A-001"]);
        assert!(store.get_code_locations("SPEC-B-001").is_empty());
        assert!(store.is_consistent());
    }

    #[test]
    fn test_update_rolls_back_on_error() {
        let mut store = LinkageStore::in_memory();
        let lock = MemoryLock::new();
        let result: Result<(), TraceError> =
            store.update(&lock, Duration::from_secs(1), |store| {
                store.add_tag(tag("SPEC-A-001", Category::Code, "src/a.rs", 1))?;
                Err(StoreError::Serialize("boom".to_string()))
            });

        assert!(result.is_err());
        assert!(store.is_empty());
        assert!(!lock.is_held());
    }

    #[test]
    fn test_in_memory_update_keeps_existing_tags() {
        let mut store = LinkageStore::in_memory();
        let lock = MemoryLock::new();
        store
            .add_tag(tag("SPEC-A-001", Category::Code, "src/a.rs", 1))
            .unwrap();

        store
            .update(&lock, Duration::from_secs(1), |store| {
                store.add_tag(tag("SPEC-A-001", Category::Test, "tests/a.rs", 2))
            })
            .unwrap();
        assert_eq!(store.len(), 2);

        let result: Result<(), TraceError> =
            store.update(&lock, Duration::from_secs(1), |store| {
                store.remove_file_tags("src/a.rs")?;
                Err(StoreError::Serialize("boom".to_string()))
            });
        assert!(result.is_err());
        assert_eq!(store.len(), 2);
        assert!(store.is_consistent());
    }

    #[test]
    fn test_update_rolls_back_when_write_fails() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("linkage.json");
        let blocker = temp.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();

        let mut store = LinkageStore::open(&path);
        store
            .add_tag(tag("SPEC-A-001", Category::Code, "src/a.rs", 1))
            .unwrap();

        let lock = MemoryLock::new();
        let result = store.update(&lock, Duration::from_secs(1), |store| {
            store.remove_file_tags("src/a.rs")?;
            store.add_tag(tag("SPEC-B-001", Category::Code, "src/b.rs", 2))?;
            store.path = Some(blocker.join("linkage.json"));
            Ok(())
        });

        assert!(matches!(
            result,
            Err(TraceError::Store(StoreError::Write { .. }))
        ));
        assert_eq!(store.spec_ids(), vec!["SPEC-A-001"]);
        assert!(store.is_consistent());
        assert!(!lock.is_held());
    }

    #[test]
    fn test_direct_mutation_rolls_back_when_write_fails() {
        let temp = tempfile::tempdir().unwrap();
        let blocker = temp.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();

        let mut store = LinkageStore::in_memory();
        store
            .add_tag(tag("SPEC-A-001", Category::Code, "src/a.rs", 1))
            .unwrap();
        store.path = Some(blocker.join("linkage.json"));

        assert!(store.clear().is_err());
        assert_eq!(store.len(), 1);
        assert!(store.is_consistent());
    }

    #[test]
    fn test_unreadable_store_refuses_to_overwrite() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("linkage.json");

        let mut store = LinkageStore::open(&path);
        store
            .add_tag(tag("SPEC-A-001", Category::Code, "src/a.rs", 1))
            .unwrap();
        let on_disk = std::fs::read_to_string(&path).unwrap();

        store.clear_indexes();
        store.status = LoadStatus::Unreadable("permission denied".to_string());
        let err = store
            .add_tag(tag("SPEC-B-001", Category::Code, "src/b.rs", 2))
            .unwrap_err();

        assert!(matches!(err, StoreError::Unreadable { .. }));
        assert!(store.is_empty());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), on_disk);

        store.reload();
        assert_eq!(store.status(), &LoadStatus::Loaded { skipped: 0 });
        assert_eq!(store.spec_ids(), vec!["SPEC-A-001"]);
    }

    #[test]
    fn test_entry_round_trip_rejects_bad_fields() {
        let good = LinkageEntry::from(&tag("SPEC-A-001", Category::Api, "src/a.rs", 4));
        assert_eq!(good.category, "API");
        assert!(good.to_tag().is_some());

        let mut bad = good.clone();
        bad.verb = "define".to_string();
        assert!(bad.to_tag().is_none());

        let mut bad = good;
        bad.spec_id = "SPEC-A-1".to_string();
        assert!(bad.to_tag().is_none());
    }
}
