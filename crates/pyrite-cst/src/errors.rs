//! Parse-time error types and pretty rendering.
//!
//! `prettify_error` is grounded on the teacher's `prettify_error`/`bol_offset`
//! pair (tugtool-python-cst): carve out a few lines of context around the
//! failing span and hand it to `annotate-snippets`.

use std::cmp::{max, min};

use annotate_snippets::{Level, Renderer, Snippet};
use pyrite_core::Span;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum LexError {
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("invalid numeric literal: {0}")]
    BadNumber(String),
    #[error("inconsistent use of tabs and spaces in indentation")]
    TabError,
    #[error("unindent does not match any outer indentation level")]
    DedentMismatch,
    #[error("unexpected character {0:?}")]
    UnexpectedChar(char),
    #[error("EOF in multi-line statement")]
    UnexpectedEof,
}

#[derive(Debug, Clone, Error, PartialEq)]
#[error("expected {expected}, found {found}")]
pub struct ParseError {
    pub expected: String,
    pub found: String,
    pub span: Span,
}

/// Byte offset of the beginning of line `n` (1-indexed), or `source.len()`
/// once `n` runs past the last line.
fn bol_offset(source: &str, n: i64) -> usize {
    if n <= 1 {
        return 0;
    }
    source
        .match_indices('\n')
        .nth((n - 2) as usize)
        .map(|(index, _)| index + 1)
        .unwrap_or(source.len())
}

fn line_of_offset(source: &str, offset: usize) -> usize {
    source[..offset.min(source.len())].matches('\n').count() + 1
}

/// Renders a parse error with one line of source context on either side, in
/// the style the editor-facing diagnostic sink also uses for terminal output.
pub fn prettify_error(source: &str, span: Span, message: &str, label: &str) -> String {
    let context = 1i64;
    let start_line = line_of_offset(source, span.start as usize) as i64;
    let end_line = line_of_offset(source, span.end as usize) as i64;

    let line_start = max(1, start_line - context) as usize;
    let start_offset = bol_offset(source, start_line - context);
    let end_offset = bol_offset(source, end_line + context + 1);
    let snippet_source = &source[start_offset..end_offset.max(start_offset)];

    let start = span.start as usize - start_offset;
    let end = span.end as usize - start_offset;
    let end = if start == end {
        min(end + 1, snippet_source.len())
    } else {
        end.min(snippet_source.len())
    };
    let start = start.min(end);

    Renderer::styled()
        .render(
            Level::Error.title(label).snippet(
                Snippet::source(snippet_source)
                    .line_start(line_start)
                    .fold(false)
                    .annotations(vec![Level::Error.span(start..end).label(message)]),
            ),
        )
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bol_offset_first_line() {
        assert_eq!(bol_offset("abc\ndef\n", 1), 0);
    }

    #[test]
    fn bol_offset_second_line() {
        assert_eq!(bol_offset("abc\ndef\n", 2), 4);
    }

    #[test]
    fn bol_offset_past_end_clamps() {
        assert_eq!(bol_offset("abc\ndef\n", 50), "abc\ndef\n".len());
    }

    #[test]
    fn prettify_includes_label_and_message() {
        let src = "def f(:\n    pass\n";
        let rendered = prettify_error(src, Span::new(6, 7), "expected parameter name", "t.py");
        assert!(rendered.contains("t.py"));
        assert!(rendered.contains("expected parameter name"));
    }
}
