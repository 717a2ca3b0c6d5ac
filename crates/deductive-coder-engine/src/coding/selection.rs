use std::ops::Range;

use crate::coding::document::Document;

/// A live selection as reported by whatever surface renders the document.
///
/// Offsets are byte positions into the *rendered text* of the containing
/// block, in either anchor/focus order. `container_start` is the canonical
/// offset of the block's first byte: 0 when the whole document renders as
/// one block, or the paragraph's own start offset in paragraph mode.
///
/// The mapper relies on the pre-decoration invariant: the rendered
/// character count of a block (markup excluded) equals the length of its
/// canonical byte range, because highlighting only ever partitions the
/// text into styling segments without inserting or removing characters.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSelection {
    pub anchor_offset: usize,
    pub focus_offset: usize,
    pub container_start: usize,
}

/// Capability abstraction over whatever global selection state a surface
/// exposes, so the offset mapper stays a pure function testable without a
/// real rendering surface.
pub trait SelectionProvider {
    fn current_selection(&self) -> Option<RawSelection>;
}

/// Map a raw selection into canonical document offsets.
///
/// `start` is the raw selection start (container start plus the smaller of
/// the two offsets); `end` is `start` plus the byte length of the selected
/// text with surrounding whitespace trimmed, so a selection dragging over
/// trailing whitespace still yields the tight range of what was actually
/// selected.
///
/// Returns `None` for collapsed selections, selections that are empty
/// after trimming, and offsets that fall outside the document or off
/// `char` boundaries - the caller simply receives no selection event.
pub fn resolve_selection(document: &Document, raw: &RawSelection) -> Option<Range<usize>> {
    let (lo, hi) = if raw.anchor_offset <= raw.focus_offset {
        (raw.anchor_offset, raw.focus_offset)
    } else {
        (raw.focus_offset, raw.anchor_offset)
    };
    if lo == hi {
        return None;
    }

    let start = raw.container_start.checked_add(lo)?;
    let raw_end = raw.container_start.checked_add(hi)?;
    if raw_end > document.len() || !document.is_boundary(start) || !document.is_boundary(raw_end) {
        return None;
    }

    let selected = &document.text()[start..raw_end];
    let trimmed_len = selected.trim().len();
    if trimmed_len == 0 {
        return None;
    }

    let end = start + trimmed_len;
    if !document.is_boundary(end) {
        // Multi-byte leading whitespace can land the trimmed end inside a
        // character; treat it as no selection rather than guess.
        return None;
    }

    Some(start..end)
}
