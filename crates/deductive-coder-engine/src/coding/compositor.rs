//! Highlight composition.
//!
//! The compositor turns the canonical text plus the current span set into
//! a linear sequence of render segments. It never mutates the text:
//! concatenating the `text` of every emitted segment reproduces the input
//! exactly, so no character is created, duplicated, or dropped no matter
//! how spans overlap or nest.

use std::ops::Range;

use crate::codebook::Codebook;
use crate::coding::document::Document;
use crate::coding::spans::{CodedSpan, SpanId, SpanIndex};

/// One run of rendered text, either undecorated or highlighted with the
/// color of its span's primary code.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Plain {
        text: String,
    },
    Highlighted {
        text: String,
        color: String,
        code_id: crate::codebook::CodeId,
    },
}

impl Segment {
    pub fn text(&self) -> &str {
        match self {
            Segment::Plain { text } | Segment::Highlighted { text, .. } => text,
        }
    }
}

/// One render block: a contiguous document range and its segments. In flat
/// mode a single block covers the whole document; in paragraph mode there
/// is one block per paragraph range.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderBlock {
    pub range: Range<usize>,
    pub segments: Vec<Segment>,
}

/// The composed view of the whole document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HighlightLayout {
    pub blocks: Vec<RenderBlock>,
    /// Spans that could not be rendered because they cross a paragraph
    /// boundary in paragraph mode. Reported instead of silently dropped so
    /// callers can surface the omission.
    pub omitted: Vec<SpanId>,
}

/// Compose one text scope into segments.
///
/// `scope_start` is the canonical offset of `text`'s first byte; span
/// ranges are translated into scope-local coordinates and clamped to the
/// scope (the span index has already rejected malformed spans, clamping
/// here is defense in depth).
///
/// Spans are sorted by start ascending, shorter span first on ties, and
/// swept left to right. When a span starts before the sweep cursor the
/// already-consumed bytes are not re-emitted: the uncovered tail extends
/// the previous highlighted segment, so the overlapped region keeps the
/// earliest-sorted span's styling and every byte appears in exactly one
/// segment.
pub fn compose(
    text: &str,
    scope_start: usize,
    spans: &[&CodedSpan],
    codebook: &Codebook,
) -> Vec<Segment> {
    let mut sorted: Vec<&CodedSpan> = spans.to_vec();
    sorted.sort_by_key(|span| (span.start, span.end));

    let mut segments: Vec<Segment> = Vec::new();
    let mut cursor = 0usize;

    for span in sorted {
        let start = clamp_to_scope(text, span.start, scope_start);
        let end = clamp_to_scope(text, span.end, scope_start);
        if end <= cursor || start == end {
            // Empty after clamping, or nested inside an already-consumed
            // region.
            continue;
        }

        if start > cursor {
            segments.push(Segment::Plain {
                text: text[cursor..start].to_string(),
            });
        }

        let styled_from = start.max(cursor);
        let chunk = &text[styled_from..end];
        if start < cursor {
            // Overlap: merge the tail into the previous highlight rather
            // than starting a second segment over consumed bytes.
            if let Some(Segment::Highlighted { text: prev, .. }) = segments.last_mut() {
                prev.push_str(chunk);
            } else {
                segments.push(highlighted(chunk, span, codebook));
            }
        } else {
            segments.push(highlighted(chunk, span, codebook));
        }

        cursor = end;
    }

    if cursor < text.len() {
        segments.push(Segment::Plain {
            text: text[cursor..].to_string(),
        });
    }

    segments
}

/// Compose the whole document.
///
/// With `split_paragraphs` false the document renders as one block
/// containing every span. With it true, each paragraph renders its fully
/// contained spans; spans crossing a paragraph boundary are collected into
/// [`HighlightLayout::omitted`].
pub fn compose_layout(
    document: &Document,
    index: &SpanIndex,
    codebook: &Codebook,
    split_paragraphs: bool,
) -> HighlightLayout {
    if !split_paragraphs {
        let spans: Vec<&CodedSpan> = index.spans().iter().collect();
        return HighlightLayout {
            blocks: vec![RenderBlock {
                range: 0..document.len(),
                segments: compose(document.text(), 0, &spans, codebook),
            }],
            omitted: Vec::new(),
        };
    }

    let mut blocks = Vec::new();
    for range in document.paragraphs() {
        let contained: Vec<&CodedSpan> = index
            .spans()
            .iter()
            .filter(|span| range.start <= span.start && span.end <= range.end)
            .collect();
        blocks.push(RenderBlock {
            range: range.clone(),
            segments: compose(
                document.slice(range.clone()),
                range.start,
                &contained,
                codebook,
            ),
        });
    }

    // Paragraph ranges partition the document, so a span either sits in
    // exactly one of them or crosses a boundary.
    let omitted = index
        .spans()
        .iter()
        .filter(|span| {
            !document
                .paragraphs()
                .iter()
                .any(|range| range.start <= span.start && span.end <= range.end)
        })
        .map(|span| span.id)
        .collect();

    HighlightLayout { blocks, omitted }
}

fn highlighted(chunk: &str, span: &CodedSpan, codebook: &Codebook) -> Segment {
    match span.primary_code() {
        Some(code_id) => Segment::Highlighted {
            text: chunk.to_string(),
            color: codebook.color_for(code_id).to_string(),
            code_id: code_id.clone(),
        },
        // Unreachable past span index validation; render undecorated
        // rather than panic.
        None => Segment::Plain {
            text: chunk.to_string(),
        },
    }
}

/// Translate a canonical offset into scope-local coordinates, clamped to
/// the scope and snapped down to a `char` boundary.
fn clamp_to_scope(text: &str, offset: usize, scope_start: usize) -> usize {
    let mut local = offset.saturating_sub(scope_start).min(text.len());
    while local > 0 && !text.is_char_boundary(local) {
        local -= 1;
    }
    local
}
