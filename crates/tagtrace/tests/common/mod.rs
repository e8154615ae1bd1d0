//! Common test utilities.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use tagtrace::tagtrace_core::{Category, Tag, Verb, parse_spec_id};

/// Get the path to the test fixtures directory.
pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

pub fn read_fixture(name: &str) -> String {
    std::fs::read_to_string(fixtures_dir().join(name))
        .unwrap_or_else(|e| panic!("Failed to read fixture {name}: {e}"))
}

/// Install a subscriber once so `RUST_LOG=debug` shows store and lock logs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn tag(spec_id: &str, category: Category, file_path: &str, line: usize) -> Tag {
    Tag::new(
        parse_spec_id(spec_id).expect("valid spec id"),
        Verb::Impl,
        category,
        file_path,
        line,
    )
}

/// A project directory with the fixture config and SPEC documents for
/// SPEC-AUTH-001 and SPEC-PAY-001.
pub fn create_temp_project() -> tempfile::TempDir {
    let temp = tempfile::tempdir().expect("Failed to create temp dir");
    let fixtures = fixtures_dir();

    std::fs::create_dir_all(temp.path().join(".tagtrace")).expect("Failed to create .tagtrace");
    std::fs::copy(
        fixtures.join("config.yaml"),
        temp.path().join(".tagtrace/config.yaml"),
    )
    .expect("Failed to copy config.yaml");

    write_spec(temp.path(), "SPEC-AUTH-001");
    write_spec(temp.path(), "SPEC-PAY-001");

    temp
}

pub fn write_spec(root: &Path, spec_id: &str) {
    let dir = root.join("specs").join(spec_id);
    std::fs::create_dir_all(&dir).expect("Failed to create spec dir");
    std::fs::write(
        dir.join("spec.md"),
        format!("# {spec_id}\n\n<!-- @REQ:{spec_id} -->\n"),
    )
    .expect("Failed to write spec.md");
}
