//! Policy validation of proposed file contents
//!
//! Format errors say a TAG is malformed; violations say a well-formed set of
//! TAGs breaks a project rule. Both validators only read the store.

use crate::catalog::SpecCatalog;
use crate::code_dirs::{CodeDirectoryMatcher, suggested_tag_line};
use crate::store::LinkageStore;
use facet::Facet;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use tagtrace_core::{Category, FormatError, Tag, Tags, markdown, normalize_path};
use tracing::{debug, info};

/// Exit code signalling a blocked operation.
pub const BLOCKING_EXIT_CODE: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Facet)]
#[facet(rename_all = "snake_case")]
#[repr(u8)]
pub enum ViolationType {
    /// Code file without any valid TAG
    SpeclessCode,
    /// TAG pointing at a SPEC document that does not exist
    NoSpecReference,
    /// The same link written twice in one file
    DuplicateTags,
    /// Implementation without a test for the same spec
    ChainBreak,
    /// Implementation TAG in the wrong directory for its domain
    DirectoryScope,
}

impl ViolationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SpeclessCode => "specless_code",
            Self::NoSpecReference => "no_spec_reference",
            Self::DuplicateTags => "duplicate_tags",
            Self::ChainBreak => "chain_break",
            Self::DirectoryScope => "directory_scope",
        }
    }
}

/// Severity, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Facet)]
#[facet(rename_all = "lowercase")]
#[repr(u8)]
pub enum ViolationLevel {
    Critical,
    High,
    Medium,
    Low,
}

impl ViolationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    /// Only critical violations block.
    pub fn action(&self) -> ViolationAction {
        match self {
            Self::Critical => ViolationAction::Block,
            _ => ViolationAction::Warn,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Facet)]
#[facet(rename_all = "lowercase")]
#[repr(u8)]
pub enum ViolationAction {
    Block,
    Warn,
}

#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct ValidationViolation {
    pub level: ViolationLevel,
    #[facet(rename = "type")]
    pub violation_type: ViolationType,
    pub message: String,
    pub file_path: String,
    pub action: ViolationAction,
    pub guidance: String,
    pub auto_fix_possible: bool,
    #[facet(default)]
    pub spec_id: Option<String>,
    #[facet(default)]
    pub line: Option<usize>,
    #[facet(default)]
    pub suggested_fix: Option<String>,
}

impl ValidationViolation {
    pub fn new(
        violation_type: ViolationType,
        level: ViolationLevel,
        file_path: &str,
        message: impl Into<String>,
        guidance: impl Into<String>,
    ) -> Self {
        Self {
            level,
            violation_type,
            message: message.into(),
            file_path: file_path.to_string(),
            action: level.action(),
            guidance: guidance.into(),
            auto_fix_possible: false,
            spec_id: None,
            line: None,
            suggested_fix: None,
        }
    }

    pub fn with_spec(mut self, spec_id: &str) -> Self {
        self.spec_id = Some(spec_id.to_string());
        self
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    /// Attach a mechanical fix; marks the violation auto-fixable.
    pub fn with_fix(mut self, fix: impl Into<String>) -> Self {
        self.suggested_fix = Some(fix.into());
        self.auto_fix_possible = true;
        self
    }
}

impl std::fmt::Display for ValidationViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.level.as_str(), self.file_path)?;
        if let Some(line) = self.line {
            write!(f, ":{line}")?;
        }
        write!(f, ": {} ({})", self.message, self.violation_type.as_str())
    }
}

/// Outcome of validating one file.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct ValidationReport {
    pub file_path: String,
    pub violations: Vec<ValidationViolation>,
    pub format_errors: Vec<FormatError>,
    pub strict_mode: bool,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty() && self.format_errors.is_empty()
    }

    pub fn count(&self, level: ViolationLevel) -> usize {
        self.violations.iter().filter(|v| v.level == level).count()
    }

    pub fn of_type(&self, violation_type: ViolationType) -> Vec<&ValidationViolation> {
        self.violations
            .iter()
            .filter(|v| v.violation_type == violation_type)
            .collect()
    }

    /// Strict mode blocks on any critical violation. Non-strict mode never
    /// blocks; the caller decides what to do with the report.
    pub fn is_blocking(&self) -> bool {
        self.strict_mode && self.count(ViolationLevel::Critical) > 0
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_blocking() {
            BLOCKING_EXIT_CODE
        } else {
            0
        }
    }
}

/// Applies project rules to proposed file contents.
pub struct PolicyValidator {
    matcher: CodeDirectoryMatcher,
    catalog: Box<dyn SpecCatalog + Send + Sync>,
    domain_directories: BTreeMap<String, String>,
    strict_mode: bool,
}

impl PolicyValidator {
    pub fn new(
        matcher: CodeDirectoryMatcher,
        catalog: Box<dyn SpecCatalog + Send + Sync>,
        strict_mode: bool,
    ) -> Self {
        Self {
            matcher,
            catalog,
            domain_directories: BTreeMap::new(),
            strict_mode,
        }
    }

    /// Domain to directory prefix, for `directory_scope` checks.
    pub fn with_domain_directories(mut self, dirs: BTreeMap<String, String>) -> Self {
        self.domain_directories = dirs
            .into_iter()
            .map(|(domain, dir)| (domain, normalize_path(&dir).trim_end_matches('/').to_string()))
            .collect();
        self
    }

    pub fn matcher(&self) -> &CodeDirectoryMatcher {
        &self.matcher
    }

    pub fn catalog(&self) -> &dyn SpecCatalog {
        self.catalog.as_ref()
    }

    pub fn strict_mode(&self) -> bool {
        self.strict_mode
    }

    /// Check a file that is about to be created.
    pub fn validate_before_creation(
        &self,
        path: &str,
        content: &str,
        store: &LinkageStore,
    ) -> ValidationReport {
        let path = normalize_path(path);
        let tags = extract_tags(&path, content);
        let mut violations = Vec::new();

        if tags.is_empty() && self.matcher.is_code_path(&path) {
            let spec_id = placeholder_spec_id(&path);
            violations.push(
                ValidationViolation::new(
                    ViolationType::SpeclessCode,
                    ViolationLevel::Critical,
                    &path,
                    "code file has no TAG linking it to a SPEC",
                    "Write or pick the SPEC this code implements and reference it in a TAG comment",
                )
                .with_fix(suggested_tag_line(&path, Category::Code, &spec_id)),
            );
        }

        let mut seen = BTreeSet::new();
        for tag in &tags.tags {
            let id = tag.spec_id.as_str();
            if !seen.insert(id) || self.catalog.spec_exists(id) {
                continue;
            }
            let elsewhere = store.get_code_locations(id).len();
            let guidance = if elsewhere > 0 {
                format!("Create the SPEC document; {elsewhere} stored location(s) already reference {id}")
            } else {
                format!("Create the SPEC document for {id} or fix the id")
            };
            violations.push(
                ValidationViolation::new(
                    ViolationType::NoSpecReference,
                    ViolationLevel::Critical,
                    &path,
                    format!("{id} has no SPEC document"),
                    guidance,
                )
                .with_spec(id)
                .at_line(tag.line)
                .with_fix(self.catalog.expected_path(id).display().to_string()),
            );
        }

        self.finish(path, violations, tags.format_errors)
    }

    /// Check a file after it was modified.
    pub fn validate_after_modification(
        &self,
        path: &str,
        content: &str,
        store: &LinkageStore,
    ) -> ValidationReport {
        let path = normalize_path(path);
        let tags = extract_tags(&path, content);
        let mut violations = Vec::new();

        self.check_chain_breaks(&path, &tags.tags, store, &mut violations);
        check_duplicates(&path, &tags.tags, &mut violations);
        self.check_directory_scope(&path, &tags.tags, &mut violations);

        self.finish(path, violations, tags.format_errors)
    }

    fn check_chain_breaks(
        &self,
        path: &str,
        tags: &[Tag],
        store: &LinkageStore,
        violations: &mut Vec<ValidationViolation>,
    ) {
        let mut checked = BTreeSet::new();
        for tag in tags.iter().filter(|t| t.category.is_code()) {
            let id = tag.spec_id.as_str();
            if !checked.insert(id) {
                continue;
            }
            // Stored records of this file are stale; the new content replaces them
            let tested_here = tags
                .iter()
                .any(|t| t.spec_id == tag.spec_id && t.category == Category::Test);
            let tested_elsewhere = store
                .get_tags_by_spec(id)
                .iter()
                .any(|t| t.file_path != path && t.category == Category::Test);
            if tested_here || tested_elsewhere {
                continue;
            }
            violations.push(
                ValidationViolation::new(
                    ViolationType::ChainBreak,
                    ViolationLevel::High,
                    path,
                    format!("{id} is implemented but no TEST TAG verifies it"),
                    format!("Add a test annotated with @TEST:{id} verify"),
                )
                .with_spec(id)
                .at_line(tag.line),
            );
        }
    }

    fn check_directory_scope(
        &self,
        path: &str,
        tags: &[Tag],
        violations: &mut Vec<ValidationViolation>,
    ) {
        let in_code_dir = self.matcher.is_code_path(path);
        for tag in tags.iter().filter(|t| t.category.is_code()) {
            let domain = tag.spec_id.domain();
            let message = if !in_code_dir {
                format!(
                    "@{} TAG for {} outside the active code directories",
                    tag.category, tag.spec_id
                )
            } else if let Some(dir) = self.domain_directories.get(domain)
                && !is_under(path, dir)
            {
                format!("{} belongs under {dir}/", tag.spec_id)
            } else {
                continue;
            };
            violations.push(
                ValidationViolation::new(
                    ViolationType::DirectoryScope,
                    ViolationLevel::Medium,
                    path,
                    message,
                    format!("Move the code for domain {domain} or retag it"),
                )
                .with_spec(tag.spec_id.as_str())
                .at_line(tag.line),
            );
        }
    }

    fn finish(
        &self,
        file_path: String,
        violations: Vec<ValidationViolation>,
        format_errors: Vec<FormatError>,
    ) -> ValidationReport {
        let report = ValidationReport {
            file_path,
            violations,
            format_errors,
            strict_mode: self.strict_mode,
        };
        if report.is_clean() {
            debug!("{} passes policy", report.file_path);
        } else {
            info!(
                file = %report.file_path,
                violations = report.violations.len(),
                format_errors = report.format_errors.len(),
                blocking = report.is_blocking(),
                "Policy validation found problems"
            );
        }
        report
    }
}

fn check_duplicates(path: &str, tags: &[Tag], violations: &mut Vec<ValidationViolation>) {
    let mut first_seen: HashMap<(&str, &str, Category), usize> = HashMap::new();
    for tag in tags {
        let key = (tag.spec_id.as_str(), tag.verb.as_str(), tag.category);
        let Some(first_line) = first_seen.get(&key).copied() else {
            first_seen.insert(key, tag.line);
            continue;
        };
        violations.push(
            ValidationViolation::new(
                ViolationType::DuplicateTags,
                ViolationLevel::Medium,
                path,
                format!(
                    "@{}:{} {} repeats the TAG on line {first_line}",
                    tag.category, tag.spec_id, tag.verb
                ),
                "Keep one TAG per link",
            )
            .with_spec(tag.spec_id.as_str())
            .at_line(tag.line)
            .with_fix(format!("remove line {}", tag.line)),
        );
    }
}

/// Valid tags and format errors, with fenced examples removed from markdown.
pub(crate) fn extract_tags(path: &str, content: &str) -> Tags {
    if path.ends_with(".md") {
        Tags::extract_from_content(Path::new(path), &markdown::strip_fenced_code(content))
    } else {
        Tags::extract_from_content(Path::new(path), content)
    }
}

fn is_under(path: &str, dir: &str) -> bool {
    path.strip_prefix(dir)
        .is_some_and(|rest| rest.starts_with('/'))
}

/// `SPEC-AUTH-001` for `src/auth.rs`, used in suggested TAG lines.
fn placeholder_spec_id(path: &str) -> String {
    let stem = path
        .rsplit('/')
        .next()
        .and_then(|name| name.split('.').next())
        .unwrap_or_default();
    let domain: String = stem
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if domain.is_empty() {
        "SPEC-DOMAIN-001".to_string()
    } else {
        format!("SPEC-{domain}-001")
    }
}
