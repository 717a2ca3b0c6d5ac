use std::ops::Range;

/// Canonical document under analysis.
///
/// The document is loaded once at session start and never mutated. All
/// offsets used anywhere in the engine (selections, coded spans, render
/// segments, exported positions) are **byte offsets into this exact
/// string** with no normalization or trimming applied, which is what keeps
/// exported positions meaningful after the session ends.
///
/// ## Offsets
///
/// Offsets are 0-indexed and half-open (`start..end`). Public operations
/// that accept caller-supplied ranges either reject offsets that do not
/// land on `char` boundaries (span/selection validation) or clamp and snap
/// them silently (rendering paths), so a well-formed `Document` can never
/// be sliced mid-character.
///
/// ## Paragraphs
///
/// The paragraph partition is computed once at load time: the document is
/// split on blank-line boundaries, with separator blank lines attached to
/// the preceding paragraph. Every byte of the document belongs to exactly
/// one paragraph range, so paragraph-mode rendering preserves the
/// whole-document round trip.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    text: String,
    paragraphs: Vec<Range<usize>>,
}

impl Document {
    /// Create a document from its full text.
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let paragraphs = compute_paragraphs(&text);
        Self { text, paragraphs }
    }

    /// The canonical text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Length of the canonical text in bytes.
    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Whether `offset` is within the document and on a `char` boundary.
    pub fn is_boundary(&self, offset: usize) -> bool {
        offset <= self.text.len() && self.text.is_char_boundary(offset)
    }

    /// Whether `range` is a non-empty, in-bounds, boundary-aligned range.
    pub fn is_valid_range(&self, range: &Range<usize>) -> bool {
        range.start < range.end
            && range.end <= self.text.len()
            && self.is_boundary(range.start)
            && self.is_boundary(range.end)
    }

    /// Slice the canonical text, clamping the range to document bounds and
    /// snapping both ends down to `char` boundaries.
    ///
    /// Invalid ranges are clamped rather than rejected - rendering code
    /// runs after validation has already happened at the span index, so a
    /// stray range here must not panic.
    pub fn slice(&self, range: Range<usize>) -> &str {
        let start = floor_boundary(&self.text, range.start.min(self.text.len()));
        let end = floor_boundary(&self.text, range.end.min(self.text.len())).max(start);
        &self.text[start..end]
    }

    /// A context window of up to `radius` bytes either side of `range`,
    /// clamped to document bounds and snapped to `char` boundaries.
    pub fn context_window(&self, range: &Range<usize>, radius: usize) -> &str {
        let start = floor_boundary(&self.text, range.start.saturating_sub(radius));
        let end = floor_boundary(
            &self.text,
            range.end.saturating_add(radius).min(self.text.len()),
        );
        &self.text[start..end.max(start)]
    }

    /// The blank-line paragraph partition of the document.
    ///
    /// Ranges are contiguous, non-overlapping, and cover `0..len()`
    /// exactly; an empty document has no paragraphs.
    pub fn paragraphs(&self) -> &[Range<usize>] {
        &self.paragraphs
    }
}

/// Snap `offset` down to the nearest `char` boundary.
fn floor_boundary(text: &str, mut offset: usize) -> usize {
    offset = offset.min(text.len());
    while offset > 0 && !text.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}

/// Partition `text` into paragraph ranges on blank-line boundaries.
///
/// A paragraph break happens before a non-blank line that follows at least
/// one blank line; blank lines themselves stay attached to the paragraph
/// before them (leading blank lines attach to the first paragraph). The
/// returned ranges partition the whole text.
fn compute_paragraphs(text: &str) -> Vec<Range<usize>> {
    let mut paragraphs = Vec::new();
    let mut start = 0usize;
    let mut pos = 0usize;
    let mut seen_content = false;
    let mut in_gap = false;

    for line in text.split_inclusive('\n') {
        let blank = line.trim().is_empty();
        if blank {
            if seen_content {
                in_gap = true;
            }
        } else if in_gap {
            // First non-blank line after a gap closes the previous paragraph.
            paragraphs.push(start..pos);
            start = pos;
            in_gap = false;
        }
        if !blank {
            seen_content = true;
        }
        pos += line.len();
    }

    if pos > start {
        paragraphs.push(start..pos);
    }

    paragraphs
}
