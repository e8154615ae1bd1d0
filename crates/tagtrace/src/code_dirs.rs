//! Code directory detection
//!
//! A path is code iff it matches at least one include glob and no exclude
//! glob. Include globs come from the languages (auto), from the project
//! config (manual), or from both (hybrid).

use crate::config::{Config, DetectionMode};
use eyre::{Result, WrapErr};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use tagtrace_core::{Category, normalize_path};

/// Languages with default include globs and comment syntax
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Go,
    Java,
    Kotlin,
    Swift,
    C,
    Cpp,
    CSharp,
    Ruby,
    Php,
    Shell,
    Sql,
}

impl Language {
    pub const ALL: [Language; 15] = [
        Language::Rust,
        Language::Python,
        Language::JavaScript,
        Language::TypeScript,
        Language::Go,
        Language::Java,
        Language::Kotlin,
        Language::Swift,
        Language::C,
        Language::Cpp,
        Language::CSharp,
        Language::Ruby,
        Language::Php,
        Language::Shell,
        Language::Sql,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "rust" | "rs" => Some(Self::Rust),
            "python" | "py" => Some(Self::Python),
            "javascript" | "js" => Some(Self::JavaScript),
            "typescript" | "ts" => Some(Self::TypeScript),
            "go" | "golang" => Some(Self::Go),
            "java" => Some(Self::Java),
            "kotlin" | "kt" => Some(Self::Kotlin),
            "swift" => Some(Self::Swift),
            "c" => Some(Self::C),
            "cpp" | "c++" => Some(Self::Cpp),
            "csharp" | "c#" | "cs" => Some(Self::CSharp),
            "ruby" | "rb" => Some(Self::Ruby),
            "php" => Some(Self::Php),
            "shell" | "sh" | "bash" => Some(Self::Shell),
            "sql" => Some(Self::Sql),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rust => "rust",
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Go => "go",
            Self::Java => "java",
            Self::Kotlin => "kotlin",
            Self::Swift => "swift",
            Self::C => "c",
            Self::Cpp => "cpp",
            Self::CSharp => "csharp",
            Self::Ruby => "ruby",
            Self::Php => "php",
            Self::Shell => "shell",
            Self::Sql => "sql",
        }
    }

    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Self::Rust => &["rs"],
            Self::Python => &["py"],
            Self::JavaScript => &["js", "jsx", "mjs", "cjs"],
            Self::TypeScript => &["ts", "tsx"],
            Self::Go => &["go"],
            Self::Java => &["java"],
            Self::Kotlin => &["kt", "kts"],
            Self::Swift => &["swift"],
            Self::C => &["c", "h"],
            Self::Cpp => &["cc", "cpp", "cxx", "hpp", "hh"],
            Self::CSharp => &["cs"],
            Self::Ruby => &["rb"],
            Self::Php => &["php"],
            Self::Shell => &["sh", "bash"],
            Self::Sql => &["sql"],
        }
    }

    /// Line comment marker used when suggesting a TAG for this language.
    pub fn comment_marker(&self) -> &'static str {
        match self {
            Self::Python | Self::Ruby | Self::Shell => "#",
            Self::Sql => "--",
            _ => "//",
        }
    }

    /// Include globs used in auto and hybrid mode.
    pub fn default_includes(&self) -> Vec<String> {
        self.extensions()
            .iter()
            .map(|ext| format!("**/*.{ext}"))
            .collect()
    }

    /// The language of a file, by extension.
    pub fn for_path(path: &str) -> Option<Self> {
        let ext = path.rsplit_once('.')?.1;
        if ext.contains('/') {
            return None;
        }
        Self::ALL
            .into_iter()
            .find(|lang| lang.extensions().contains(&ext))
    }
}

/// Paths that are never code, whatever the mode.
pub const GLOBAL_EXCLUDES: &[&str] = &[
    "**/tests/**",
    "**/test/**",
    "**/__tests__/**",
    "**/spec/**",
    "**/*_test.*",
    "**/*_tests.*",
    "**/test_*.*",
    "**/*.test.*",
    "**/*.spec.*",
    "**/node_modules/**",
    "**/target/**",
    "**/vendor/**",
    "**/dist/**",
    "**/build/**",
    "**/.git/**",
    "**/.tagtrace/**",
];

/// Decides whether a project-relative path is code.
#[derive(Debug, Clone)]
pub struct CodeDirectoryMatcher {
    include: GlobSet,
    exclude: GlobSet,
    mode: DetectionMode,
}

impl CodeDirectoryMatcher {
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.detection_mode(),
            &config.languages(),
            &config.code_directories,
            &config.exclude,
        )
    }

    pub fn new(
        mode: DetectionMode,
        languages: &[Language],
        project_dirs: &[String],
        extra_excludes: &[String],
    ) -> Result<Self> {
        let mut include = Vec::new();
        if mode != DetectionMode::Manual {
            include.extend(languages.iter().flat_map(Language::default_includes));
        }
        if mode != DetectionMode::Auto {
            include.extend(project_dirs.iter().map(|dir| directory_glob(dir)));
        }

        let exclude = GLOBAL_EXCLUDES
            .iter()
            .map(|pattern| pattern.to_string())
            .chain(extra_excludes.iter().cloned());

        Ok(Self {
            include: build_globset(include)?,
            exclude: build_globset(exclude)?,
            mode,
        })
    }

    pub fn mode(&self) -> DetectionMode {
        self.mode
    }

    pub fn is_code_path(&self, path: &str) -> bool {
        let path = normalize_path(path);
        self.include.is_match(&path) && !self.exclude.is_match(&path)
    }
}

/// A bare directory such as `src` matches everything beneath it.
fn directory_glob(entry: &str) -> String {
    let entry = normalize_path(entry);
    let entry = entry.trim_end_matches('/');
    if entry.contains(['*', '?', '[', '{']) {
        entry.to_string()
    } else {
        format!("{entry}/**")
    }
}

fn build_globset(patterns: impl IntoIterator<Item = String>) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(&pattern)
            .literal_separator(true)
            .build()
            .wrap_err_with(|| format!("Invalid glob pattern '{pattern}'"))?;
        builder.add(glob);
    }
    builder.build().wrap_err("Failed to compile glob set")
}

/// Comment prefix and suffix for writing a TAG into a file.
pub fn comment_marker_for(path: &str) -> (&'static str, &'static str) {
    let lower = path.to_lowercase();
    if lower.ends_with(".md") || lower.ends_with(".html") || lower.ends_with(".xml") {
        return ("<!--", " -->");
    }
    if lower.ends_with(".yaml") || lower.ends_with(".yml") || lower.ends_with(".toml") {
        return ("#", "");
    }
    let marker = Language::for_path(&lower)
        .map(|lang| lang.comment_marker())
        .unwrap_or("//");
    (marker, "")
}

/// A ready-to-paste TAG comment line for `path`.
pub fn suggested_tag_line(path: &str, category: Category, spec_id: &str) -> String {
    let (prefix, suffix) = comment_marker_for(path);
    format!("{prefix} @{}:{spec_id} impl{suffix}", category.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(mode: DetectionMode, dirs: &[&str]) -> CodeDirectoryMatcher {
        let dirs: Vec<String> = dirs.iter().map(|d| d.to_string()).collect();
        CodeDirectoryMatcher::new(mode, &Language::ALL, &dirs, &[]).unwrap()
    }

    #[test]
    fn test_no_default_include_is_globally_excluded() {
        let excludes = build_globset(GLOBAL_EXCLUDES.iter().map(|p| p.to_string())).unwrap();
        for lang in Language::ALL {
            for pattern in lang.default_includes() {
                assert!(
                    !GLOBAL_EXCLUDES.contains(&pattern.as_str()),
                    "{pattern} of {} is also excluded",
                    lang.as_str()
                );
                // A representative file for the include must survive the excludes
                let sample = pattern.replace("**/*", "src/module");
                assert!(
                    !excludes.is_match(&sample),
                    "{sample} is excluded by the global set"
                );
            }
        }
    }

    #[test]
    fn test_auto_mode_uses_language_globs() {
        let m = matcher(DetectionMode::Auto, &["lib"]);
        assert!(m.is_code_path("src/auth.rs"));
        assert!(m.is_code_path("app/models.py"));
        assert!(m.is_code_path("main.go"));
        assert!(!m.is_code_path("lib/data.bin"));
        assert!(!m.is_code_path("README.md"));
    }

    #[test]
    fn test_manual_mode_uses_project_dirs_only() {
        let m = matcher(DetectionMode::Manual, &["src", "lib/**/*.rb"]);
        assert!(m.is_code_path("src/auth.rs"));
        assert!(m.is_code_path("src/templates/login.html"));
        assert!(m.is_code_path("lib/a/b.rb"));
        assert!(!m.is_code_path("app/models.py"));
    }

    #[test]
    fn test_hybrid_is_union() {
        let m = matcher(DetectionMode::Hybrid, &["templates"]);
        assert!(m.is_code_path("templates/page.html"));
        assert!(m.is_code_path("app/models.py"));
    }

    #[test]
    fn test_excludes_win() {
        let m = matcher(DetectionMode::Hybrid, &["src"]);
        assert!(!m.is_code_path("tests/auth.rs"));
        assert!(!m.is_code_path("src/auth_test.go"));
        assert!(!m.is_code_path("app/test_models.py"));
        assert!(!m.is_code_path("web/login.spec.ts"));
        assert!(!m.is_code_path("node_modules/pkg/index.js"));
        assert!(!m.is_code_path("target/debug/build.rs"));

        let extra = CodeDirectoryMatcher::new(
            DetectionMode::Auto,
            &[Language::Rust],
            &[],
            &["**/generated/**".to_string()],
        )
        .unwrap();
        assert!(!extra.is_code_path("src/generated/schema.rs"));
        assert!(extra.is_code_path("src/schema.rs"));
    }

    #[test]
    fn test_invalid_glob_is_error() {
        let result = CodeDirectoryMatcher::new(
            DetectionMode::Manual,
            &[],
            &["src/[".to_string()],
            &[],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_suggested_tag_line() {
        assert_eq!(
            suggested_tag_line("src/auth.rs", Category::Code, "SPEC-AUTH-001"),
            "// @CODE:SPEC-AUTH-001 impl"
        );
        assert_eq!(
            suggested_tag_line("app/auth.py", Category::Code, "SPEC-AUTH-001"),
            "# @CODE:SPEC-AUTH-001 impl"
        );
        assert_eq!(
            suggested_tag_line("db/schema.sql", Category::Data, "SPEC-DB-001"),
            "-- @DATA:SPEC-DB-001 impl"
        );
        assert_eq!(
            suggested_tag_line("specs/auth.md", Category::Req, "SPEC-AUTH-001"),
            "<!-- @REQ:SPEC-AUTH-001 impl -->"
        );
    }
}
