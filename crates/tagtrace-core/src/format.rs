//! Structural validation of TAG candidates

use crate::lexer::{RawTag, TagKeyword};
use crate::spec_id::parse_spec_id;
use crate::tag::{Category, Tag, Verb};
use facet::Facet;

pub use crate::spec_id::validate_spec_id_format;

/// The TAG field a format error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Facet)]
#[repr(u8)]
pub enum TagField {
    SpecId,
    Verb,
}

impl TagField {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagField::SpecId => "spec_id",
            TagField::Verb => "verb",
        }
    }
}

/// A malformed TAG. Reported, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct FormatError {
    pub field: TagField,
    /// The offending value as written
    pub value: String,
    pub file_path: String,
    /// Line number (1-indexed)
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for FormatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}: {}: {}",
            self.file_path,
            self.line,
            self.field.as_str(),
            self.message
        )
    }
}

/// Returns true when `v` is one of the known verbs.
pub fn validate_verb(v: &str) -> bool {
    Verb::parse(v).is_some()
}

/// Validate one candidate. Each error names the field it is about.
pub fn validate_tag(tag: &RawTag) -> Result<(), Vec<FormatError>> {
    let mut errors = Vec::new();

    if !validate_spec_id_format(&tag.spec_id) {
        errors.push(FormatError {
            field: TagField::SpecId,
            value: tag.spec_id.clone(),
            file_path: tag.file_path.clone(),
            line: tag.line,
            message: format!(
                "'{}' does not match SPEC-{{DOMAIN}}-{{NNN}} (uppercase letters and digits, three-digit number)",
                printable(&tag.spec_id)
            ),
        });
    }

    if let Some(verb) = tag.verb.as_deref().filter(|v| !validate_verb(v)) {
        let known: Vec<&str> = Verb::ALL.iter().map(Verb::as_str).collect();
        errors.push(FormatError {
            field: TagField::Verb,
            value: verb.to_string(),
            file_path: tag.file_path.clone(),
            line: tag.line,
            message: format!(
                "unknown verb '{}', expected one of: {}",
                printable(verb),
                known.join(", ")
            ),
        });
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

/// Escape control characters so hostile ids cannot forge output lines.
fn printable(value: &str) -> String {
    value.escape_debug().to_string()
}

impl Tag {
    /// Convert a candidate into a tag. `None` when it fails validation.
    pub fn from_raw(raw: &RawTag) -> Option<Tag> {
        let spec_id = parse_spec_id(&raw.spec_id)?;
        let verb = match &raw.verb {
            Some(v) => Verb::parse(v)?,
            None => Verb::default(),
        };
        let category = match raw.keyword {
            TagKeyword::Category(category) => category,
            TagKeyword::Generic => Category::infer(verb, &raw.file_path),
        };

        let mut tag = Tag::new(spec_id, verb, category, raw.file_path.as_str(), raw.line);
        tag.description = raw.description.clone();
        Some(tag)
    }
}
