//! tagtrace - TAG traceability engine
//!
//! Builds on [`tagtrace_core`] (parsing, format validation, chain analysis)
//! with the stateful parts:
//!
//! - [`LinkageStore`]: persistent spec id <-> file index with atomic writes
//! - [`FileLock`] / [`MemoryLock`]: advisory locking around store updates
//! - [`PolicyValidator`]: project rules checked before creation and after
//!   modification of a file
//! - report rendering in text, terminal, markdown, HTML and JSON
//! - [`TraceContext`]: owns all of the above for one project
//!
//! ```no_run
//! use tagtrace::{ReportFormat, TraceContext};
//!
//! let mut ctx = TraceContext::open(".")?;
//! let report = ctx.after_modification("src/auth.rs", "// @CODE:SPEC-AUTH-001 impl")?;
//! for violation in &report.violations {
//!     eprintln!("{violation}");
//! }
//! println!("{}", ctx.report(ReportFormat::Terminal, "Auth"));
//! # Ok::<(), tagtrace::TraceError>(())
//! ```

pub mod catalog;
pub mod code_dirs;
pub mod config;
mod engine;
mod error;
pub mod lock;
pub mod output;
pub mod policy;
pub mod store;

pub use tagtrace_core;

pub use catalog::{MemoryCatalog, SpecCatalog, SpecDirectory};
pub use code_dirs::{CodeDirectoryMatcher, Language};
pub use config::{Config, DetectionMode};
pub use engine::TraceContext;
pub use error::{LockError, StoreError, TraceError, TraceResult};
pub use lock::{AdvisoryLock, FileLock, LockGuard, LockMetadata, MemoryLock};
pub use output::{
    ReportFormat, TraceabilityReport, export_to_file, generate_report,
    generate_report_with_template,
};
pub use policy::{
    PolicyValidator, ValidationReport, ValidationViolation, ViolationAction, ViolationLevel,
    ViolationType,
};
pub use store::{CodeLocation, LinkageEntry, LinkageStore, LoadStatus};
