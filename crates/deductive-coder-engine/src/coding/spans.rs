use std::fmt;
use std::ops::Range;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::codebook::CodeId;
use crate::coding::document::Document;

/// Stable identifier of a coded span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SpanId(Uuid);

impl SpanId {
    pub(crate) fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A tagged character range of the document.
///
/// Spans are immutable once created; the only edit path is removal and
/// re-creation. `text` caches the document slice at creation time so
/// exports can reproduce the coded excerpt without re-slicing. `codes`
/// order is insignificant for equality of meaning but the first entry is
/// the primary code used for highlight styling.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CodedSpan {
    pub id: SpanId,
    pub text: String,
    pub codes: Vec<CodeId>,
    pub start: usize,
    pub end: usize,
}

impl CodedSpan {
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    /// The code whose color styles this span's highlight.
    pub fn primary_code(&self) -> Option<&CodeId> {
        self.codes.first()
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SpanError {
    #[error("span has no codes attached")]
    EmptyCodes,
    #[error("span lists code {0} more than once")]
    DuplicateCode(CodeId),
    #[error("span range {start}..{end} is inverted or empty")]
    InvertedRange { start: usize, end: usize },
    #[error("span range {start}..{end} exceeds document length {len}")]
    OutOfBounds { start: usize, end: usize, len: usize },
    #[error("span offset {0} is not a character boundary")]
    NotCharBoundary(usize),
    #[error("span text does not match the document at {start}..{end}")]
    TextMismatch { start: usize, end: usize },
}

/// Owner of all coded spans of a session.
///
/// Spans are kept in insertion order so exports and result listings are
/// deterministic. The index is the validation boundary: a span that passes
/// [`SpanIndex::add`] is well-formed for every consumer downstream, so the
/// compositor only clamps and never re-validates.
#[derive(Debug, Clone, Default)]
pub struct SpanIndex {
    spans: Vec<CodedSpan>,
    version: u64,
}

impl SpanIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and append a span.
    ///
    /// Overlapping or nested spans are accepted deliberately - a user may
    /// knowingly double-code a region. There is no deduplication.
    pub fn add(&mut self, span: CodedSpan, document: &Document) -> Result<SpanId, SpanError> {
        validate(&span, document)?;
        let id = span.id;
        self.spans.push(span);
        self.version += 1;
        Ok(id)
    }

    /// Remove a span by id. Removing an unknown id is a no-op, not an
    /// error.
    pub fn remove(&mut self, id: &SpanId) -> bool {
        let before = self.spans.len();
        self.spans.retain(|span| &span.id != id);
        let removed = self.spans.len() != before;
        if removed {
            self.version += 1;
        }
        removed
    }

    pub fn get(&self, id: &SpanId) -> Option<&CodedSpan> {
        self.spans.iter().find(|span| &span.id == id)
    }

    pub fn spans(&self) -> &[CodedSpan] {
        &self.spans
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Spans whose range contains `offset`.
    pub fn spans_containing(&self, offset: usize) -> Vec<&CodedSpan> {
        self.spans
            .iter()
            .filter(|span| span.start <= offset && offset < span.end)
            .collect()
    }

    /// Spans whose range intersects `range`.
    pub fn spans_overlapping(&self, range: &Range<usize>) -> Vec<&CodedSpan> {
        self.spans
            .iter()
            .filter(|span| span.start < range.end && range.start < span.end)
            .collect()
    }

    /// Bumped on every mutation; renderers and statistics consumers use it
    /// to detect staleness.
    pub fn version(&self) -> u64 {
        self.version
    }
}

fn validate(span: &CodedSpan, document: &Document) -> Result<(), SpanError> {
    if span.codes.is_empty() {
        return Err(SpanError::EmptyCodes);
    }
    for (i, code) in span.codes.iter().enumerate() {
        if span.codes[..i].contains(code) {
            return Err(SpanError::DuplicateCode(code.clone()));
        }
    }
    if span.start >= span.end {
        return Err(SpanError::InvertedRange {
            start: span.start,
            end: span.end,
        });
    }
    if span.end > document.len() {
        return Err(SpanError::OutOfBounds {
            start: span.start,
            end: span.end,
            len: document.len(),
        });
    }
    if !document.is_boundary(span.start) {
        return Err(SpanError::NotCharBoundary(span.start));
    }
    if !document.is_boundary(span.end) {
        return Err(SpanError::NotCharBoundary(span.end));
    }
    if span.text != document.slice(span.range()) {
        return Err(SpanError::TextMismatch {
            start: span.start,
            end: span.end,
        });
    }
    Ok(())
}
