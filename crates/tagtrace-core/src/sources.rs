//! Source providers for TAG extraction
//!
//! Deciding which files to scan is the caller's business; a source only
//! knows how to hand content to the lexer.

use crate::lexer::{Tags, extract_from_content};
use eyre::{Result, WrapErr};
use std::path::PathBuf;

/// Result of extracting tags, including warnings about unreadable inputs
#[derive(Debug, Default)]
pub struct ExtractionResult {
    pub tags: Tags,
    pub warnings: Vec<String>,
}

/// Trait for providing source files to extract tags from
pub trait Sources {
    /// Extract tags from all sources
    fn extract(self) -> Result<ExtractionResult>;
}

/// Sources from an explicit list of file paths
pub struct PathSources {
    paths: Vec<PathBuf>,
    skip_unreadable: bool,
}

impl PathSources {
    /// Create from an iterator of paths
    pub fn new(paths: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
            skip_unreadable: false,
        }
    }

    /// Record unreadable or non-UTF-8 files as warnings instead of failing
    pub fn skip_unreadable(mut self) -> Self {
        self.skip_unreadable = true;
        self
    }
}

impl Sources for PathSources {
    fn extract(self) -> Result<ExtractionResult> {
        let mut result = ExtractionResult::default();
        for path in self.paths {
            match std::fs::read_to_string(&path) {
                Ok(content) => {
                    let content = if path.extension().is_some_and(|ext| ext == "md") {
                        crate::markdown::strip_fenced_code(&content)
                    } else {
                        content
                    };
                    extract_from_content(&path, &content, &mut result.tags);
                }
                Err(e) if self.skip_unreadable => {
                    result
                        .warnings
                        .push(format!("Skipping {}: {}", path.display(), e));
                }
                Err(e) => {
                    return Err(e).wrap_err_with(|| format!("Failed to read {}", path.display()));
                }
            }
        }
        Ok(result)
    }
}

/// In-memory sources (useful for testing and editor buffers)
pub struct MemorySources(Vec<(PathBuf, String)>);

impl MemorySources {
    /// Create empty memory sources
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Add a file with content
    pub fn add(mut self, path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        self.0.push((path.into(), content.into()));
        self
    }
}

impl Default for MemorySources {
    fn default() -> Self {
        Self::new()
    }
}

impl Sources for MemorySources {
    fn extract(self) -> Result<ExtractionResult> {
        let mut tags = Tags::new();
        for (path, content) in self.0 {
            extract_from_content(&path, &content, &mut tags);
        }
        Ok(ExtractionResult {
            tags,
            warnings: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::{Category, Verb};

    #[test]
    fn test_memory_sources() {
        let result = Tags::extract(
            MemorySources::new()
                .add("src/auth.rs", "// @CODE:SPEC-AUTH-001")
                .add("tests/auth.rs", "// @TEST:SPEC-AUTH-001 verify"),
        )
        .unwrap();

        assert_eq!(result.tags.len(), 2);
        assert!(result.warnings.is_empty());
        assert_eq!(result.tags.tags[1].verb, Verb::Verify);
    }

    #[test]
    fn test_memory_sources_mixed_languages() {
        let result = Tags::extract(
            MemorySources::new()
                .add("src/lib.rs", "// @TAG SPEC-CORE-001")
                .add("app/models.py", "# @TAG SPEC-CORE-002")
                .add("db/schema.sql", "-- @DATA:SPEC-CORE-003")
                .add("web/index.ts", "/* @UI:SPEC-CORE-004 */"),
        )
        .unwrap();

        assert_eq!(result.tags.len(), 4);
        assert_eq!(result.tags.tags[2].category, Category::Data);
        assert_eq!(result.tags.tags[3].category, Category::Ui);
    }

    #[test]
    fn test_memory_sources_collect_format_errors() {
        let result = Tags::extract(
            MemorySources::new()
                .add("src/a.rs", "// @CODE:SPEC-A-1")
                .add("src/b.rs", "// @CODE:SPEC-B-001"),
        )
        .unwrap();

        assert_eq!(result.tags.len(), 1);
        assert_eq!(result.tags.format_errors.len(), 1);
        assert_eq!(result.tags.format_errors[0].file_path, "src/a.rs");
    }

    #[test]
    fn test_path_sources_missing_file() {
        let missing = std::env::temp_dir().join("tagtrace-definitely-missing.rs");
        assert!(Tags::extract(PathSources::new([missing.clone()])).is_err());

        let result = Tags::extract(PathSources::new([missing]).skip_unreadable()).unwrap();
        assert!(result.tags.is_empty());
        assert_eq!(result.warnings.len(), 1);
    }
}
