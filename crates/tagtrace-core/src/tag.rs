//! TAG data model: verbs, categories and validated tags

use crate::spec_id::SpecId;
use facet::Facet;

/// The relationship between an annotated location and a spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Facet)]
#[repr(u8)]
pub enum Verb {
    /// Code that fulfills the spec
    #[default]
    Impl,
    /// Tests that verify the implementation matches the spec
    Verify,
    /// Strict dependency - recheck if the referenced spec changes
    Depends,
    /// Loose connection - show when reviewing
    Related,
}

impl Verb {
    pub const ALL: [Verb; 4] = [Verb::Impl, Verb::Verify, Verb::Depends, Verb::Related];

    /// Parse a verb from its string representation
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "impl" => Some(Verb::Impl),
            "verify" => Some(Verb::Verify),
            "depends" => Some(Verb::Depends),
            "related" => Some(Verb::Related),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Impl => "impl",
            Verb::Verify => "verify",
            Verb::Depends => "depends",
            Verb::Related => "related",
        }
    }
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Super-groups used when summarizing categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Facet)]
#[repr(u8)]
pub enum SuperGroup {
    Primary,
    Implementation,
    Quality,
}

impl SuperGroup {
    pub const ALL: [SuperGroup; 3] = [
        SuperGroup::Primary,
        SuperGroup::Implementation,
        SuperGroup::Quality,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SuperGroup::Primary => "PRIMARY",
            SuperGroup::Implementation => "IMPLEMENTATION",
            SuperGroup::Quality => "QUALITY",
        }
    }

    /// Categories belonging to this group, in chain order.
    pub fn categories(&self) -> &'static [Category] {
        match self {
            SuperGroup::Primary => &Category::PRIMARY_CHAIN,
            SuperGroup::Implementation => &[
                Category::Code,
                Category::Feature,
                Category::Api,
                Category::Ui,
                Category::Data,
            ],
            SuperGroup::Quality => &[Category::Perf, Category::Sec, Category::Docs],
        }
    }
}

impl std::fmt::Display for SuperGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of artifact a TAG annotates.
///
/// Declaration order is chain order: REQ, DESIGN, TASK and TEST sort first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Facet)]
#[repr(u8)]
pub enum Category {
    Req,
    Design,
    Task,
    Test,
    Code,
    Feature,
    Api,
    Ui,
    Data,
    Perf,
    Sec,
    Docs,
}

impl Category {
    /// The four stages of the primary chain, in order.
    pub const PRIMARY_CHAIN: [Category; 4] = [
        Category::Req,
        Category::Design,
        Category::Task,
        Category::Test,
    ];

    pub const ALL: [Category; 12] = [
        Category::Req,
        Category::Design,
        Category::Task,
        Category::Test,
        Category::Code,
        Category::Feature,
        Category::Api,
        Category::Ui,
        Category::Data,
        Category::Perf,
        Category::Sec,
        Category::Docs,
    ];

    /// Parse an uppercase category keyword (`REQ`, `CODE`, ...).
    pub fn parse(s: &str) -> Option<Self> {
        Category::ALL.into_iter().find(|c| c.as_str() == s)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Req => "REQ",
            Category::Design => "DESIGN",
            Category::Task => "TASK",
            Category::Test => "TEST",
            Category::Code => "CODE",
            Category::Feature => "FEATURE",
            Category::Api => "API",
            Category::Ui => "UI",
            Category::Data => "DATA",
            Category::Perf => "PERF",
            Category::Sec => "SEC",
            Category::Docs => "DOCS",
        }
    }

    pub fn group(&self) -> SuperGroup {
        match self {
            Category::Req | Category::Design | Category::Task | Category::Test => {
                SuperGroup::Primary
            }
            Category::Code | Category::Feature | Category::Api | Category::Ui | Category::Data => {
                SuperGroup::Implementation
            }
            Category::Perf | Category::Sec | Category::Docs => SuperGroup::Quality,
        }
    }

    /// Whether this category marks implementation code.
    pub fn is_code(&self) -> bool {
        self.group() == SuperGroup::Implementation
    }

    /// Category of a generic `@TAG` annotation, inferred from its verb and
    /// the file it lives in.
    pub fn infer(verb: Verb, file_path: &str) -> Self {
        if verb == Verb::Verify || is_test_path(file_path) {
            Category::Test
        } else if file_path.ends_with(".md") {
            Category::Req
        } else {
            Category::Code
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Heuristic test-file detection used for category inference.
pub fn is_test_path(file_path: &str) -> bool {
    let normalized = file_path.replace('\\', "/");
    let mut components = normalized.split('/').peekable();
    let mut file_name = "";
    while let Some(component) = components.next() {
        if components.peek().is_none() {
            file_name = component;
            break;
        }
        if matches!(component, "tests" | "test" | "__tests__" | "spec") {
            return true;
        }
    }

    let stem = file_name.split('.').next().unwrap_or(file_name);
    stem.starts_with("test_")
        || stem.ends_with("_test")
        || stem.ends_with("_tests")
        || stem.ends_with("Test")
        || stem.ends_with("Tests")
        || file_name.contains(".test.")
        || file_name.contains(".spec.")
}

/// A validated TAG: one link between a location and a spec.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Facet)]
pub struct Tag {
    pub spec_id: SpecId,
    pub verb: Verb,
    pub category: Category,
    /// Path of the annotated file, `/`-separated
    pub file_path: String,
    /// Line number (1-indexed)
    pub line: usize,
    /// Free text after the dash separator
    #[facet(default)]
    pub description: Option<String>,
}

impl Tag {
    pub fn new(
        spec_id: SpecId,
        verb: Verb,
        category: Category,
        file_path: impl Into<String>,
        line: usize,
    ) -> Self {
        Self {
            spec_id,
            verb,
            category,
            file_path: normalize_path(&file_path.into()),
            line,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Two tags are duplicates when they state the same relationship,
    /// regardless of where in the file they appear.
    pub fn same_link(&self, other: &Tag) -> bool {
        self.spec_id == other.spec_id && self.verb == other.verb && self.category == other.category
    }
}

/// Normalize a path to the `/`-separated form stored in tags.
pub fn normalize_path(path: &str) -> String {
    let normalized = path.replace('\\', "/");
    normalized
        .strip_prefix("./")
        .map(str::to_string)
        .unwrap_or(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verb_round_trips_through_strings() {
        for verb in Verb::ALL {
            assert_eq!(Verb::parse(verb.as_str()), Some(verb));
        }
        assert_eq!(Verb::parse("define"), None);
        assert_eq!(Verb::default(), Verb::Impl);
    }

    #[test]
    fn category_groups() {
        assert_eq!(Category::Req.group(), SuperGroup::Primary);
        assert_eq!(Category::Api.group(), SuperGroup::Implementation);
        assert_eq!(Category::Sec.group(), SuperGroup::Quality);
        assert!(Category::Code.is_code());
        assert!(!Category::Test.is_code());
        assert_eq!(Category::parse("DESIGN"), Some(Category::Design));
        assert_eq!(Category::parse("design"), None);
    }

    #[test]
    fn category_inference() {
        assert_eq!(Category::infer(Verb::Verify, "src/auth.rs"), Category::Test);
        assert_eq!(Category::infer(Verb::Impl, "tests/auth.rs"), Category::Test);
        assert_eq!(Category::infer(Verb::Impl, "pkg/test_auth.py"), Category::Test);
        assert_eq!(Category::infer(Verb::Impl, "web/login.spec.ts"), Category::Test);
        assert_eq!(Category::infer(Verb::Impl, "docs/auth.md"), Category::Req);
        assert_eq!(Category::infer(Verb::Impl, "src/auth.rs"), Category::Code);
    }

    #[test]
    fn normalize_path_strips_dot_prefix() {
        assert_eq!(normalize_path("./src/lib.rs"), "src/lib.rs");
        assert_eq!(normalize_path("src\\lib.rs"), "src/lib.rs");
    }
}
