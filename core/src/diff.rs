//! Character-level diffing between a snapshot and its predecessor.
//!
//! The algorithm is `dissimilar`'s diff-match-patch port, which applies the
//! semantic cleanup pass (short equal runs between edits are merged) and is
//! deterministic for a given pair of inputs.

use std::fmt::Write as _;

use anstyle::AnsiColor;
use anstyle::Color;
use anstyle::Style;
use dissimilar::Chunk;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiffKind {
    Equal,
    Insert,
    Delete,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiffSpan {
    pub kind: DiffKind,
    pub text: String,
}

const INSERT_STYLE: Style = Style::new().bg_color(Some(Color::Ansi(AnsiColor::Green)));

/// Diff `before` against `after`, semantic cleanup included.
pub fn diff_main(before: &str, after: &str) -> Vec<DiffSpan> {
    dissimilar::diff(before, after)
        .into_iter()
        .map(|chunk| match chunk {
            Chunk::Equal(text) => DiffSpan {
                kind: DiffKind::Equal,
                text: text.to_owned(),
            },
            Chunk::Insert(text) => DiffSpan {
                kind: DiffKind::Insert,
                text: text.to_owned(),
            },
            Chunk::Delete(text) => DiffSpan {
                kind: DiffKind::Delete,
                text: text.to_owned(),
            },
        })
        .collect()
}

pub fn addition_bytes(spans: &[DiffSpan]) -> usize {
    spans
        .iter()
        .filter(|span| span.kind == DiffKind::Insert)
        .map(|span| span.text.len())
        .sum()
}

pub fn deletion_bytes(spans: &[DiffSpan]) -> usize {
    spans
        .iter()
        .filter(|span| span.kind == DiffKind::Delete)
        .map(|span| span.text.len())
        .sum()
}

/// Render a diff as "what appeared since the last run": equal text verbatim,
/// inserted non-whitespace on a green background, deletions omitted.
/// Inserted whitespace stays unstyled so new indentation does not paint
/// empty blocks.
pub fn pretty_text(spans: &[DiffSpan]) -> String {
    let mut out = String::new();

    for span in spans {
        match span.kind {
            DiffKind::Equal => out.push_str(&span.text),
            DiffKind::Insert => {
                for c in span.text.chars() {
                    if c.is_whitespace() {
                        out.push(c);
                    } else {
                        let _ = write!(
                            out,
                            "{}{c}{}",
                            INSERT_STYLE.render(),
                            INSERT_STYLE.render_reset()
                        );
                    }
                }
            }
            DiffKind::Delete => {}
        }
    }

    out
}
