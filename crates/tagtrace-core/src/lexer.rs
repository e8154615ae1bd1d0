//! Lexer for extracting TAG annotations from comments
//!
//! A TAG lives inside a comment and looks like
//! `@CODE:SPEC-AUTH-001 impl - login handler` or `@TAG SPEC-AUTH-001 verify`.
//! The lexer only finds candidates; whether the id and verb are well formed
//! is decided by [`crate::format`].

use crate::format::{FormatError, validate_tag};
use crate::sources::{ExtractionResult, Sources};
use crate::tag::{Category, Tag};
use eyre::Result;
use facet::Facet;
use std::path::Path;

/// Byte span in source code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Facet)]
pub struct SourceSpan {
    /// Byte offset from start of file
    pub offset: usize,
    /// Byte length
    pub length: usize,
}

impl SourceSpan {
    pub fn new(offset: usize, length: usize) -> Self {
        Self { offset, length }
    }
}

/// The keyword after `@`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Facet)]
#[repr(u8)]
pub enum TagKeyword {
    /// `@TAG`: the category is inferred from verb and file
    Generic,
    /// `@REQ`, `@CODE`, ...: the category is explicit
    Category(Category),
}

/// A TAG candidate as written in the source, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct RawTag {
    pub keyword: TagKeyword,
    /// The spec id token exactly as written
    pub spec_id: String,
    /// The verb token, if one was written
    #[facet(default)]
    pub verb: Option<String>,
    /// Free text after the dash separator
    #[facet(default)]
    pub description: Option<String>,
    /// File the candidate was found in
    pub file_path: String,
    /// Line number (1-indexed)
    pub line: usize,
    pub span: SourceSpan,
}

/// Lazy sequence of TAG candidates in one piece of content.
///
/// Cloning the iterator (or calling [`parse`] again) restarts the scan.
#[derive(Debug, Clone)]
pub struct TagMatches<'a> {
    content: &'a str,
    file_path: &'a str,
    /// Byte offset where the next unread line starts
    next_line: usize,
    line_num: usize,
    /// Unscanned comment text on the current line, with its byte offset
    pending: Option<(usize, &'a str)>,
}

impl<'a> Iterator for TagMatches<'a> {
    type Item = RawTag;

    fn next(&mut self) -> Option<RawTag> {
        loop {
            if let Some((offset, text)) = self.pending.take() {
                if let Some((tag, consumed)) =
                    scan_comment(text, offset, self.line_num, self.file_path)
                {
                    if consumed < text.len() {
                        self.pending = Some((offset + consumed, &text[consumed..]));
                    }
                    return Some(tag);
                }
                continue;
            }

            if self.next_line >= self.content.len() {
                return None;
            }

            let rest = &self.content[self.next_line..];
            let line_len = rest.find('\n').unwrap_or(rest.len());
            let line = &rest[..line_len];
            let line = line.strip_suffix('\r').unwrap_or(line);
            let line_start = self.next_line;

            self.line_num += 1;
            self.next_line += line_len + 1;

            if let Some(pos) = find_comment_start(line) {
                self.pending = Some((line_start + pos, &line[pos..]));
            }
        }
    }
}

/// Scan `content` for TAG candidates.
///
/// The scan is context-free: fenced code blocks in markdown must be removed
/// by the caller first (see [`crate::markdown::strip_fenced_code`]).
pub fn parse<'a>(content: &'a str, file_path: &'a str) -> TagMatches<'a> {
    TagMatches {
        content,
        file_path,
        next_line: 0,
        line_num: 0,
        pending: None,
    }
}

const COMMENT_MARKERS: &[&str] = &["//", "/*", "<!--", "--", "#", ";"];

/// Byte position where the comment on this line starts, if any.
fn find_comment_start(line: &str) -> Option<usize> {
    let trimmed = line.trim_start();
    if trimmed.starts_with('*') {
        return Some(line.len() - trimmed.len());
    }
    COMMENT_MARKERS
        .iter()
        .filter_map(|marker| line.find(marker))
        .min()
}

/// Find the first TAG in a piece of comment text.
///
/// Returns the candidate and how many bytes of `text` it consumed.
fn scan_comment(
    text: &str,
    text_offset: usize,
    line: usize,
    file_path: &str,
) -> Option<(RawTag, usize)> {
    let mut search_from = 0;
    while let Some(rel) = text[search_from..].find('@') {
        let at = search_from + rel;
        if let Some((mut tag, consumed)) = parse_at(text, at) {
            tag.file_path = file_path.to_string();
            tag.line = line;
            tag.span = SourceSpan::new(text_offset + at, consumed - at);
            return Some((tag, consumed));
        }
        search_from = at + 1;
    }
    None
}

/// Try to read a TAG starting at the `@` at byte `at`.
fn parse_at(text: &str, at: usize) -> Option<(RawTag, usize)> {
    // `user@HOST` is not a TAG
    if text[..at]
        .chars()
        .next_back()
        .is_some_and(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }

    let after_at = &text[at + 1..];
    let keyword_len = after_at
        .bytes()
        .take_while(|b| b.is_ascii_uppercase())
        .count();
    let keyword = match &after_at[..keyword_len] {
        "TAG" => TagKeyword::Generic,
        other => TagKeyword::Category(Category::parse(other)?),
    };

    let mut pos = at + 1 + keyword_len;
    match text[pos..].chars().next() {
        Some(':') => pos += 1,
        Some(c) if c.is_whitespace() => {}
        _ => return None,
    }
    pos = skip_whitespace(text, pos);

    let token_len = text[pos..]
        .find(char::is_whitespace)
        .unwrap_or(text.len() - pos);
    let token = trim_token(&text[pos..pos + token_len]);
    if token.is_empty() {
        return None;
    }
    pos += token_len;

    let mut tag = RawTag {
        keyword,
        spec_id: token.to_string(),
        verb: None,
        description: None,
        file_path: String::new(),
        line: 0,
        span: SourceSpan::new(0, 0),
    };

    // Optional verb
    let word_start = skip_whitespace(text, pos);
    let word_len = text[word_start..]
        .find(char::is_whitespace)
        .unwrap_or(text.len() - word_start);
    let word = &text[word_start..word_start + word_len];
    if !word.is_empty() && word.bytes().all(|b| b.is_ascii_lowercase()) {
        let after_word = skip_whitespace(text, word_start + word_len);
        let is_known = crate::tag::Verb::parse(word).is_some();
        if is_known || ends_clause(&text[after_word..]) {
            tag.verb = Some(word.to_string());
            pos = word_start + word_len;
        } else {
            // Plain prose after the id; keep scanning the rest of the comment
            return Some((tag, pos));
        }
    }

    // Optional free text after a dash separator
    let rest_start = skip_whitespace(text, pos);
    let rest = &text[rest_start..];
    if is_comment_closer(rest) {
        return Some((tag, text.len()));
    }
    if rest.starts_with('-') || rest.starts_with('\u{2014}') {
        let description = trim_closers(rest.trim_start_matches(['-', '\u{2014}'])).trim();
        if !description.is_empty() {
            tag.description = Some(description.to_string());
        }
        return Some((tag, text.len()));
    }

    Some((tag, pos))
}

fn skip_whitespace(text: &str, pos: usize) -> usize {
    let rest = &text[pos..];
    pos + (rest.len() - rest.trim_start().len())
}

/// Whether `rest` ends the TAG clause: end of comment, separator or closer.
fn ends_clause(rest: &str) -> bool {
    rest.is_empty() || rest.starts_with('-') || rest.starts_with('\u{2014}') || is_comment_closer(rest)
}

fn is_comment_closer(rest: &str) -> bool {
    let rest = rest.trim_end();
    rest == "*/" || rest == "-->"
}

/// Strip comment closers and trailing punctuation glued to an id token.
fn trim_token(token: &str) -> &str {
    let token = trim_closers(token);
    token.trim_end_matches([',', '.', ')', ']'])
}

fn trim_closers(text: &str) -> &str {
    let text = text.trim_end();
    let text = text.strip_suffix("*/").unwrap_or(text);
    let text = text.strip_suffix("-->").unwrap_or(text);
    text.trim_end()
}

/// Valid tags and format errors extracted from source files
#[derive(Debug, Clone, Default)]
pub struct Tags {
    /// Tags that passed format validation
    pub tags: Vec<Tag>,
    /// Candidates that were rejected, one entry per offending field
    pub format_errors: Vec<FormatError>,
}

impl Tags {
    /// Create an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of valid tags
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Whether there are no valid tags
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Extract tags from any source
    pub fn extract(sources: impl Sources) -> Result<ExtractionResult> {
        sources.extract()
    }

    /// Extract tags from raw content (no I/O)
    pub fn extract_from_content(path: &Path, content: &str) -> Self {
        let mut tags = Tags::new();
        extract_from_content(path, content, &mut tags);
        tags
    }

    /// Merge another collection into this one
    pub fn extend(&mut self, other: Tags) {
        self.tags.extend(other.tags);
        self.format_errors.extend(other.format_errors);
    }
}

/// Parse and validate every candidate in `content` into `tags`.
pub(crate) fn extract_from_content(path: &Path, content: &str, tags: &mut Tags) {
    let file_path = crate::tag::normalize_path(&path.to_string_lossy());
    for raw in parse(content, &file_path) {
        match validate_tag(&raw) {
            Ok(()) => {
                if let Some(tag) = Tag::from_raw(&raw) {
                    tags.tags.push(tag);
                }
            }
            Err(errors) => tags.format_errors.extend(errors),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::Verb;

    fn collect(content: &str) -> Vec<RawTag> {
        parse(content, "src/auth.rs").collect()
    }

    #[test]
    fn test_extract_category_tag() {
        let content = r#"
            // @CODE:SPEC-AUTH-001 impl - login handler
            fn login() {}
        "#;

        let tags = collect(content);
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].keyword, TagKeyword::Category(Category::Code));
        assert_eq!(tags[0].spec_id, "SPEC-AUTH-001");
        assert_eq!(tags[0].verb.as_deref(), Some("impl"));
        assert_eq!(tags[0].description.as_deref(), Some("login handler"));
        assert_eq!(tags[0].line, 2);
    }

    #[test]
    fn test_extract_generic_tag_with_space() {
        let tags = collect("# @TAG SPEC-AUTH-001 verify\n");
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].keyword, TagKeyword::Generic);
        assert_eq!(tags[0].verb.as_deref(), Some("verify"));
        assert_eq!(tags[0].description, None);
        assert_eq!(tags[0].line, 1);
    }

    #[test]
    fn test_verb_is_optional() {
        let tags = collect("// @API:SPEC-PAY-002\n");
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].verb, None);
    }

    #[test]
    fn test_prose_after_id_is_not_a_verb() {
        let tags = collect("// @CODE:SPEC-PAY-002 handles refunds here\n");
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].verb, None);
    }

    #[test]
    fn test_lone_unknown_verb_is_captured() {
        let tags = collect("// @CODE:SPEC-PAY-002 implements - refunds\n");
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].verb.as_deref(), Some("implements"));
    }

    #[test]
    fn test_unrelated_comments_yield_nothing() {
        let content = r#"
            // just a comment
            /// @param name the user name
            // @Override
            // mail me at dev@TAG.example
            let x = "@TAG SPEC-AUTH-001"; let y = 1;
        "#;
        assert!(collect(content).is_empty());
    }

    #[test]
    fn test_block_and_html_comments() {
        let content = "/* @TEST:SPEC-AUTH-001 verify */\n<!-- @REQ:SPEC-AUTH-001 -->\n * @DESIGN:SPEC-AUTH-001\n";
        let tags = collect(content);
        assert_eq!(tags.len(), 3);
        assert_eq!(tags[0].keyword, TagKeyword::Category(Category::Test));
        assert_eq!(tags[0].verb.as_deref(), Some("verify"));
        assert_eq!(tags[1].keyword, TagKeyword::Category(Category::Req));
        assert_eq!(tags[1].spec_id, "SPEC-AUTH-001");
        assert_eq!(tags[1].description, None);
        assert_eq!(tags[2].keyword, TagKeyword::Category(Category::Design));
        assert_eq!(tags[2].line, 3);
    }

    #[test]
    fn test_multiple_tags_in_one_comment() {
        let tags = collect("// @CODE:SPEC-AUTH-001 @API:SPEC-AUTH-002 related\n");
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].spec_id, "SPEC-AUTH-001");
        assert_eq!(tags[1].spec_id, "SPEC-AUTH-002");
        assert_eq!(tags[1].verb.as_deref(), Some("related"));
    }

    #[test]
    fn test_malformed_ids_are_still_candidates() {
        let tags = collect("// @CODE:SPEC-AUTH-001;rm\n// @TAG spec-auth-1\n");
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].spec_id, "SPEC-AUTH-001;rm");
        assert_eq!(tags[1].spec_id, "spec-auth-1");
    }

    #[test]
    fn test_span_tracking() {
        let content = "// @CODE:SPEC-AUTH-001";
        let tags = collect(content);
        assert_eq!(tags[0].span.offset, 3);
        assert_eq!(tags[0].span.length, content.len() - 3);
    }

    #[test]
    fn test_iterator_is_restartable() {
        let content = "// @CODE:SPEC-A-001\n// @TEST:SPEC-A-001\n";
        let matches = parse(content, "src/a.rs");
        let first: Vec<_> = matches.clone().collect();
        let second: Vec<_> = matches.collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn test_crlf_line_endings() {
        let tags = collect("// one\r\n// @CODE:SPEC-A-001 impl\r\n");
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].line, 2);
        assert_eq!(tags[0].verb.as_deref(), Some("impl"));
    }

    #[test]
    fn test_extract_from_content_validates() {
        let content = "// @CODE:SPEC-AUTH-001\n// @TEST:SPEC-AUTH-01 verify\n// @TAG SPEC-AUTH-002 frobnicate\n";
        let tags = Tags::extract_from_content(Path::new("./src/auth.rs"), content);
        assert_eq!(tags.len(), 1);
        assert_eq!(tags.tags[0].file_path, "src/auth.rs");
        assert_eq!(tags.tags[0].verb, Verb::Impl);
        assert_eq!(tags.format_errors.len(), 2);
    }
}
