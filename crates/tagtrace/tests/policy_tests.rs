//! Integration tests for the policy validator.

mod common;

use common::tag;
use std::collections::BTreeMap;
use tagtrace::tagtrace_core::Category;
use tagtrace::{
    CodeDirectoryMatcher, DetectionMode, Language, LinkageStore, MemoryCatalog, PolicyValidator,
    ViolationAction, ViolationLevel, ViolationType,
};

fn validator(strict: bool) -> PolicyValidator {
    let matcher = CodeDirectoryMatcher::new(
        DetectionMode::Hybrid,
        &[Language::Rust, Language::Python],
        &["src".to_string()],
        &[],
    )
    .unwrap();
    let catalog = MemoryCatalog::new()
        .with_spec("SPEC-AUTH-001")
        .with_spec("SPEC-PAY-001");
    let domains = BTreeMap::from([("PAY".to_string(), "src/payments/".to_string())]);
    PolicyValidator::new(matcher, Box::new(catalog), strict).with_domain_directories(domains)
}

#[test]
fn test_specless_code_blocks_in_strict_mode() {
    let store = LinkageStore::in_memory();
    let report = validator(true).validate_before_creation(
        "src/new_module.rs",
        "pub fn helper() -> u32 {\n    42\n}\n",
        &store,
    );

    let specless = report.of_type(ViolationType::SpeclessCode);
    assert_eq!(specless.len(), 1);
    assert_eq!(specless[0].level, ViolationLevel::Critical);
    assert_eq!(specless[0].action, ViolationAction::Block);
    assert!(specless[0].auto_fix_possible);
    assert_eq!(
        specless[0].suggested_fix.as_deref(),
        Some("// @CODE:SPEC-NEWMODULE-001 impl")
    );
    assert!(report.is_blocking());
    assert_eq!(report.exit_code(), 2);
}

#[test]
fn test_non_strict_mode_never_blocks() {
    let store = LinkageStore::in_memory();
    let report =
        validator(false).validate_before_creation("src/new_module.rs", "fn main() {}\n", &store);

    assert_eq!(report.count(ViolationLevel::Critical), 1);
    assert!(!report.is_blocking());
    assert_eq!(report.exit_code(), 0);
}

#[test]
fn test_python_comment_in_suggested_fix() {
    let store = LinkageStore::in_memory();
    let report =
        validator(true).validate_before_creation("src/billing.py", "def charge(): ...\n", &store);

    let specless = report.of_type(ViolationType::SpeclessCode);
    assert_eq!(
        specless[0].suggested_fix.as_deref(),
        Some("# @CODE:SPEC-BILLING-001 impl")
    );
}

#[test]
fn test_unknown_spec_reference() {
    let mut store = LinkageStore::in_memory();
    store
        .add_tag(tag("SPEC-BILL-001", Category::Code, "src/invoice.rs", 4))
        .unwrap();

    let content = "// @CODE:SPEC-BILL-001 impl\npub fn bill() {}\n// @API:SPEC-BILL-001 impl\n";
    let report = validator(true).validate_before_creation("src/billing.rs", content, &store);

    assert!(report.of_type(ViolationType::SpeclessCode).is_empty());
    let missing = report.of_type(ViolationType::NoSpecReference);
    assert_eq!(missing.len(), 1, "one violation per distinct id");
    assert_eq!(missing[0].spec_id.as_deref(), Some("SPEC-BILL-001"));
    assert_eq!(missing[0].line, Some(1));
    assert_eq!(
        missing[0].suggested_fix.as_deref(),
        Some("specs/SPEC-BILL-001/spec.md")
    );
    assert!(missing[0].guidance.contains("1 stored location"));
    assert!(report.is_blocking());
}

#[test]
fn test_known_spec_passes_creation() {
    let store = LinkageStore::in_memory();
    let report = validator(true).validate_before_creation(
        "src/auth.rs",
        "// @CODE:SPEC-AUTH-001 impl - login\npub fn login() {}\n",
        &store,
    );
    assert!(report.is_clean(), "{:?}", report.violations);
}

#[test]
fn test_chain_break_without_test() {
    let store = LinkageStore::in_memory();
    let report = validator(true).validate_after_modification(
        "src/auth.rs",
        "\n// @CODE:SPEC-AUTH-001 impl\npub fn login() {}\n",
        &store,
    );

    let breaks = report.of_type(ViolationType::ChainBreak);
    assert_eq!(breaks.len(), 1);
    assert_eq!(breaks[0].level, ViolationLevel::High);
    assert_eq!(breaks[0].action, ViolationAction::Warn);
    assert_eq!(breaks[0].line, Some(2));
    assert!(!report.is_blocking());
}

#[test]
fn test_chain_closed_by_stored_test() {
    let mut store = LinkageStore::in_memory();
    store
        .add_tag(tag("SPEC-AUTH-001", Category::Test, "tests/auth.rs", 8))
        .unwrap();

    let report = validator(true).validate_after_modification(
        "src/auth.rs",
        "// @CODE:SPEC-AUTH-001 impl\n",
        &store,
    );
    assert!(report.of_type(ViolationType::ChainBreak).is_empty());
}

#[test]
fn test_stale_records_of_same_file_do_not_close_chain() {
    let mut store = LinkageStore::in_memory();
    store
        .add_tag(tag("SPEC-AUTH-001", Category::Test, "src/auth.rs", 20))
        .unwrap();

    let report = validator(true).validate_after_modification(
        "src/auth.rs",
        "// @CODE:SPEC-AUTH-001 impl\n",
        &store,
    );
    assert_eq!(report.of_type(ViolationType::ChainBreak).len(), 1);
}

#[test]
fn test_duplicate_tags() {
    let store = LinkageStore::in_memory();
    let content = "\
// @CODE:SPEC-AUTH-001 impl - login
pub fn login() {}
// @CODE:SPEC-AUTH-001 impl - again
pub fn login_again() {}
// @CODE:SPEC-AUTH-001 related
";
    let report = validator(true).validate_after_modification("src/auth.rs", content, &store);

    let duplicates = report.of_type(ViolationType::DuplicateTags);
    assert_eq!(duplicates.len(), 1);
    assert_eq!(duplicates[0].level, ViolationLevel::Medium);
    assert_eq!(duplicates[0].line, Some(3));
    assert_eq!(duplicates[0].suggested_fix.as_deref(), Some("remove line 3"));
}

#[test]
fn test_code_tag_outside_code_directories() {
    let store = LinkageStore::in_memory();
    let report = validator(true).validate_after_modification(
        "docs/notes.txt",
        "// @CODE:SPEC-AUTH-001 impl\n",
        &store,
    );

    let scope = report.of_type(ViolationType::DirectoryScope);
    assert_eq!(scope.len(), 1);
    assert_eq!(scope[0].level, ViolationLevel::Medium);
}

#[test]
fn test_domain_directory_mismatch() {
    let store = LinkageStore::in_memory();
    let validator = validator(true);

    let report = validator.validate_after_modification(
        "src/lib.rs",
        "// @CODE:SPEC-PAY-001 impl\n",
        &store,
    );
    let scope = report.of_type(ViolationType::DirectoryScope);
    assert_eq!(scope.len(), 1);
    assert!(scope[0].message.contains("src/payments/"));

    let report = validator.validate_after_modification(
        "src/payments/charge.rs",
        "// @CODE:SPEC-PAY-001 impl\n",
        &store,
    );
    assert!(report.of_type(ViolationType::DirectoryScope).is_empty());

    // A sibling directory sharing the prefix is not inside it
    let report = validator.validate_after_modification(
        "src/payments_old/charge.rs",
        "// @CODE:SPEC-PAY-001 impl\n",
        &store,
    );
    assert_eq!(report.of_type(ViolationType::DirectoryScope).len(), 1);
}

#[test]
fn test_format_errors_are_reported() {
    let store = LinkageStore::in_memory();
    let report = validator(true).validate_before_creation(
        "src/logout.rs",
        "// @CODE:spec-auth-003 impl\npub fn logout() {}\n",
        &store,
    );

    assert!(!report.format_errors.is_empty());
    assert!(!report.is_clean());
    // The malformed TAG does not count as a link
    assert_eq!(report.of_type(ViolationType::SpeclessCode).len(), 1);
}

#[test]
fn test_non_code_files_without_tags_are_clean() {
    let store = LinkageStore::in_memory();
    let validator = validator(true);

    for path in ["README.txt", "tests/auth_test.rs", "docs/guide.md"] {
        let report = validator.validate_before_creation(path, "nothing to see\n", &store);
        assert!(report.is_clean(), "{path}: {:?}", report.violations);
        assert_eq!(report.exit_code(), 0);
    }
}

#[test]
fn test_fenced_examples_in_markdown_are_ignored() {
    let store = LinkageStore::in_memory();
    let content = "\
# Guide

<!-- @REQ:SPEC-AUTH-001 -->

```rust
// @CODE:SPEC-NOPE-001 impl
```
";
    let report = validator(true).validate_before_creation("docs/guide.md", content, &store);
    assert!(report.is_clean(), "{:?}", report.violations);
}

#[test]
fn test_violation_display() {
    let store = LinkageStore::in_memory();
    let report = validator(true).validate_after_modification(
        "src/auth.rs",
        "// @CODE:SPEC-AUTH-001 impl\n",
        &store,
    );
    let line = report.violations[0].to_string();
    assert_eq!(
        line,
        "[high] src/auth.rs:1: SPEC-AUTH-001 is implemented but no TEST TAG verifies it (chain_break)"
    );
}
