//! tagtrace-core - Core library for TAG traceability
//!
//! This crate provides the I/O-free building blocks for:
//! - Extracting TAG annotations from comments in source code, tests and spec documents
//! - Validating TAG structure (spec id grammar, verbs)
//! - Analyzing REQ -> DESIGN -> TASK -> TEST chains and computing coverage
//!
//! # TAG Syntax
//!
//! A TAG is an `@KEYWORD` inside a comment, followed by a spec id, an
//! optional verb and optional free text after a dash:
//!
//! ```text
//! // @CODE:SPEC-AUTH-001 impl - password hashing
//! # @TEST:SPEC-AUTH-001 verify
//! <!-- @REQ:SPEC-AUTH-001 -->
//! // @TAG SPEC-AUTH-001 depends
//! ```
//!
//! The keyword is either a category (`REQ`, `DESIGN`, `TASK`, `TEST`, `CODE`,
//! `FEATURE`, `API`, `UI`, `DATA`, `PERF`, `SEC`, `DOCS`) or the generic
//! `TAG`, whose category is inferred from the verb and the file.
//!
//! ```
//! use tagtrace_core::{MemorySources, Tags, Verb};
//!
//! let result = Tags::extract(
//!     MemorySources::new()
//!         .add("src/auth.rs", "// @CODE:SPEC-AUTH-001 impl - login")
//!         .add("tests/auth.rs", "// @TEST:SPEC-AUTH-001 verify")
//!         .add("src/bad.rs", "// @CODE:SPEC-auth-1"),
//! )
//! .unwrap();
//!
//! assert_eq!(result.tags.len(), 2);
//! assert_eq!(result.tags.tags[1].verb, Verb::Verify);
//! assert_eq!(result.tags.format_errors.len(), 1);
//! ```
//!
//! # Chain Analysis
//!
//! ```
//! use tagtrace_core::{Category, ChainLink, calculate_implementation_coverage};
//!
//! let links = vec![
//!     ChainLink::new(Category::Req, "SPEC-PAY-001"),
//!     ChainLink::new(Category::Design, "SPEC-PAY-001"),
//! ];
//! let stats = calculate_implementation_coverage(&links);
//! assert_eq!(stats.total_chains, 1);
//! assert_eq!(stats.complete_chains, 0);
//! ```

mod chain;
pub mod format;
mod lexer;
pub mod markdown;
mod sources;
mod spec_id;
mod tag;

pub use chain::{
    CategoryCoverage, ChainLink, ChainMatrix, CoverageStats, GroupStatistics, MissingLink,
    SummaryStatistics, analyze_missing_connections, calculate_implementation_coverage,
    generate_chain_matrix, generate_summary_statistics, links_from_tags,
};
pub use format::{FormatError, TagField, validate_tag, validate_verb};
pub use lexer::{RawTag, SourceSpan, TagKeyword, TagMatches, Tags, parse};
pub use sources::{ExtractionResult, MemorySources, PathSources, Sources};
pub use spec_id::{SpecId, chain_key, parse_spec_id, validate_spec_id_format};
pub use tag::{Category, SuperGroup, Tag, Verb, is_test_path, normalize_path};
