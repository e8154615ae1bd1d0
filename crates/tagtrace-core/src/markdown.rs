//! Markdown helpers for callers that feed spec documents to the lexer.
//!
//! TAG examples inside fenced code blocks are documentation, not links, so
//! they have to disappear before scanning. Lines are blanked rather than
//! removed so that line numbers still point into the original document.
//!
//! ```
//! use tagtrace_core::markdown::strip_fenced_code;
//!
//! let doc = "<!-- @REQ:SPEC-AUTH-001 -->\n```rust\n// @CODE:SPEC-AUTH-999\n```\n";
//! let stripped = strip_fenced_code(doc);
//! assert!(stripped.contains("SPEC-AUTH-001"));
//! assert!(!stripped.contains("SPEC-AUTH-999"));
//! assert_eq!(stripped.lines().count(), doc.lines().count());
//! ```

use pulldown_cmark::{CodeBlockKind, Event, Parser, Tag};
use std::ops::Range;

/// Blank out every fenced code block, keeping the newlines.
pub fn strip_fenced_code(markdown: &str) -> String {
    let fenced = fenced_ranges(markdown);
    if fenced.is_empty() {
        return markdown.to_string();
    }

    let mut output = String::with_capacity(markdown.len());
    let mut blocks = fenced.iter().peekable();
    for (idx, ch) in markdown.char_indices() {
        while blocks.peek().is_some_and(|range| range.end <= idx) {
            blocks.next();
        }
        let inside = blocks.peek().is_some_and(|range| range.contains(&idx));
        if !inside || ch == '\n' {
            output.push(ch);
        }
    }
    output
}

/// Byte ranges of fenced code blocks, in document order.
fn fenced_ranges(markdown: &str) -> Vec<Range<usize>> {
    Parser::new(markdown)
        .into_offset_iter()
        .filter_map(|(event, range)| match event {
            Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(_))) => Some(range),
            _ => None,
        })
        .collect()
}
