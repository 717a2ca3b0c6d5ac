/*!
 * # Coding Core Module
 *
 * This module implements the deductive-coding core: everything between a
 * raw on-screen text selection and the exported list of coded segments.
 *
 * ## Architecture Overview
 *
 * ### 1. Single Source of Truth: the canonical document
 * - The document under analysis is one immutable UTF-8 string, fixed at
 *   session start
 * - Every offset anywhere in the system is a byte offset into that exact
 *   string, which is what makes exported positions reproducible
 * - The paragraph partition is computed once at load and covers every
 *   byte, so paragraph-mode rendering can never lose text
 *
 * ### 2. Selection Mapping
 * - Rendering surfaces expose their live selection through the
 *   `SelectionProvider` capability; the offset mapper is a pure function
 *   over that abstraction and testable without a real surface
 * - Mapping relies on the pre-decoration invariant: highlighting splits
 *   the text into styling segments but never adds or removes characters,
 *   so rendered offsets line up with canonical offsets
 *
 * ### 3. Validated Span Index
 * - `SpanIndex` owns all coded spans in insertion order and is the
 *   validation boundary: malformed spans (empty codes, inverted or
 *   out-of-bounds ranges, stale cached text) are rejected at insertion
 *   and never reach rendering
 * - Overlapping and nested spans are accepted; a user may knowingly
 *   double-code a region
 *
 * ### 4. Highlight Composition
 * - The compositor sweeps the sorted span set left to right and
 *   partitions the text into plain/highlighted segments
 * - Round-trip invariant: concatenating segment text reproduces the
 *   input exactly; overlaps collapse to the earliest-sorted span's
 *   styling instead of duplicating characters
 * - One compositor serves both the flat and the paragraph-aware view;
 *   paragraph splitting is a preprocessing flag, and spans that cross a
 *   paragraph boundary are reported as omitted rather than silently
 *   dropped
 *
 * ### 5. Session Orchestration
 * - `CodingSession` drives the `Idle -> SelectionPending -> Idle` state
 *   machine, owns the span set and the codebook reference, and
 *   recomputes statistics on every span change
 * - The optional AI suggestion call is fire-and-forget: results carry a
 *   `SuggestionToken`, and a token that no longer matches the pending
 *   selection means the result is stale and silently discarded
 */

pub mod compositor;
pub mod document;
pub mod selection;
pub mod session;
pub mod spans;
pub mod stats;

pub use compositor::{HighlightLayout, RenderBlock, Segment, compose, compose_layout};
pub use document::Document;
pub use selection::{RawSelection, SelectionProvider, resolve_selection};
pub use session::{
    CONTEXT_RADIUS, CodedSegmentRecord, CodingSession, MatchedSuggestion, PendingSelection,
    SegmentPosition, SessionError, SuggestionToken,
};
pub use spans::{CodedSpan, SpanError, SpanId, SpanIndex};
pub use stats::{CodeUsage, code_stats};
