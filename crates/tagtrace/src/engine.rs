//! Trace context: the single object owning config, store, catalog and lock.
//!
//! Hooks and tools construct one [`TraceContext`] per project and call into
//! it as files are created, modified and deleted.

use crate::catalog::{SpecCatalog, SpecDirectory};
use crate::code_dirs::CodeDirectoryMatcher;
use crate::config::{Config, DEFAULT_CONFIG_PATH};
use crate::error::{TraceError, TraceResult};
use crate::lock::{AdvisoryLock, FileLock, MemoryLock};
use crate::output::{ReportFormat, export_to_file, generate_report};
use crate::policy::{PolicyValidator, ValidationReport, extract_tags};
use crate::store::{LinkageStore, LoadStatus};
use std::path::{Path, PathBuf};
use tagtrace_core::{ChainLink, Tag, links_from_tags, normalize_path};
use tracing::{debug, info, warn};

pub struct TraceContext {
    root: PathBuf,
    config: Config,
    policy: PolicyValidator,
    store: LinkageStore,
    lock: Box<dyn AdvisoryLock>,
}

impl TraceContext {
    /// Open the project at `root`, reading `.tagtrace/config.yaml` if present.
    pub fn open(root: impl Into<PathBuf>) -> TraceResult<Self> {
        let root = root.into();
        let config = Config::load(&root.join(DEFAULT_CONFIG_PATH))
            .map_err(|e| TraceError::Config(format!("{e:#}")))?;
        Self::with_config(root, config)
    }

    /// Open the project at `root` with an explicit config. The store and its
    /// lock file live under the root; SPEC documents are read from disk.
    pub fn with_config(root: impl Into<PathBuf>, config: Config) -> TraceResult<Self> {
        let root = root.into();
        let store_path = config.resolve_store_path(&root);
        let lock = FileLock::for_store(&store_path)
            .with_poll_interval(config.lock_poll_interval())
            .with_stale_after(config.lock_stale_after());
        let catalog = SpecDirectory::new(config.resolve_specs_dir(&root));

        let context = Self::assemble(
            root,
            config,
            Box::new(catalog),
            LinkageStore::open(store_path),
            Box::new(lock),
        )?;
        match context.store.status() {
            LoadStatus::Degraded(reason) => {
                warn!("Trace context running in degraded mode: {}", reason);
            }
            LoadStatus::Unreadable(reason) => {
                warn!("Trace context running read-only: {}", reason);
            }
            _ => {}
        }
        info!(
            "Opened trace context at {} ({} tags)",
            context.root.display(),
            context.store.len()
        );
        Ok(context)
    }

    /// A context that keeps everything in memory, for tests and dry runs.
    pub fn in_memory(
        root: impl Into<PathBuf>,
        config: Config,
        catalog: impl SpecCatalog + Send + Sync + 'static,
    ) -> TraceResult<Self> {
        Self::assemble(
            root.into(),
            config,
            Box::new(catalog),
            LinkageStore::in_memory(),
            Box::new(MemoryLock::new()),
        )
    }

    fn assemble(
        root: PathBuf,
        config: Config,
        catalog: Box<dyn SpecCatalog + Send + Sync>,
        store: LinkageStore,
        lock: Box<dyn AdvisoryLock>,
    ) -> TraceResult<Self> {
        let matcher = CodeDirectoryMatcher::from_config(&config)
            .map_err(|e| TraceError::Config(format!("{e:#}")))?;
        let policy = PolicyValidator::new(matcher, catalog, config.strict_mode())
            .with_domain_directories(config.domain_directories.clone());
        Ok(Self {
            root,
            config,
            policy,
            store,
            lock,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &LinkageStore {
        &self.store
    }

    pub fn policy(&self) -> &PolicyValidator {
        &self.policy
    }

    /// Re-read the store from disk.
    pub fn reload(&mut self) {
        self.store.reload();
    }

    /// Validate a file that is about to be created. Nothing is recorded.
    pub fn before_creation(&self, path: &str, content: &str) -> ValidationReport {
        let path = self.relative(path);
        self.policy
            .validate_before_creation(&path, content, &self.store)
    }

    /// Validate a modified file, then record its tags in place of the old
    /// ones. Validation and the update run under one lock acquisition.
    pub fn after_modification(
        &mut self,
        path: &str,
        content: &str,
    ) -> TraceResult<ValidationReport> {
        let path = self.relative(path);
        let tags = extract_tags(&path, content).tags;
        let policy = &self.policy;

        let report = self
            .store
            .update(&*self.lock, self.config.lock_timeout(), |store| {
                let report = policy.validate_after_modification(&path, content, store);
                store.replace_file_tags(&path, tags)?;
                Ok(report)
            })?;
        debug!("Recorded tags for {}", path);
        Ok(report)
    }

    /// Forget every tag recorded for a deleted file.
    pub fn file_deleted(&mut self, path: &str) -> TraceResult<usize> {
        let path = self.relative(path);
        self.store
            .update(&*self.lock, self.config.lock_timeout(), |store| {
                store.remove_file_tags(&path)
            })
    }

    /// Empty the store.
    pub fn clear(&mut self) -> TraceResult<()> {
        self.store
            .update(&*self.lock, self.config.lock_timeout(), LinkageStore::clear)
    }

    /// Stored tags whose SPEC document does not exist.
    pub fn find_orphaned_tags(&self) -> Vec<&Tag> {
        self.store.find_orphaned_tags(self.policy.catalog())
    }

    /// Analyzer input for everything in the store.
    pub fn links(&self) -> Vec<ChainLink> {
        links_from_tags(self.store.tags())
    }

    pub fn report(&self, format: ReportFormat, title: &str) -> String {
        generate_report(&self.links(), format, title)
    }

    /// Write a report; relative paths are resolved against the project root.
    pub fn export_report(&self, path: &Path, format: ReportFormat) -> eyre::Result<()> {
        export_to_file(&self.links(), &self.root.join(path), format)
    }

    /// Project-relative, `/`-separated form of `path`.
    fn relative(&self, path: &str) -> String {
        let relative = Path::new(path)
            .strip_prefix(&self.root)
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(|_| path.to_string());
        normalize_path(&relative)
    }
}
