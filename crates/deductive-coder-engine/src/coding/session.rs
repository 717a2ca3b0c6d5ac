use std::ops::Range;

use serde::Serialize;
use thiserror::Error;

use crate::codebook::{CodeDefinition, CodeId, Codebook};
use crate::coding::compositor::{HighlightLayout, compose_layout};
use crate::coding::document::Document;
use crate::coding::spans::{CodedSpan, SpanError, SpanId, SpanIndex};
use crate::coding::stats::{CodeUsage, code_stats};
use crate::suggest::CodeSuggestion;

/// Bytes of surrounding text captured either side of a selection for
/// display and for the suggestion service.
pub const CONTEXT_RADIUS: usize = 200;

/// Opaque token tying an in-flight suggestion request to the selection it
/// was made for. The session bumps its generation on every selection
/// change, so a result delivered with yesterday's token is detectably
/// stale and gets discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuggestionToken(u64);

/// A suggestion matched case-insensitively onto the codebook.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedSuggestion {
    pub code_id: CodeId,
    pub explanation: String,
    pub confidence: u8,
}

/// The selection currently awaiting codes.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSelection {
    pub range: Range<usize>,
    pub text: String,
    pub context: String,
    token: SuggestionToken,
    suggestions: Vec<MatchedSuggestion>,
}

impl PendingSelection {
    pub fn token(&self) -> SuggestionToken {
        self.token
    }

    pub fn suggestions(&self) -> &[MatchedSuggestion] {
        &self.suggestions
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SessionError {
    #[error("no selection is pending")]
    NoPendingSelection,
    #[error("selection range {start}..{end} is not valid for this document")]
    InvalidRange { start: usize, end: usize },
    #[error("no codes were chosen for the selection")]
    NoCodesChosen,
    #[error("unknown code id {0}")]
    UnknownCode(CodeId),
    #[error(transparent)]
    Span(#[from] SpanError),
}

/// One coded segment in the stable export shape: the excerpt, its resolved
/// code definitions, and its position in the canonical document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CodedSegmentRecord {
    pub text: String,
    pub codes: Vec<CodeDefinition>,
    pub position: SegmentPosition,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentPosition {
    pub start: usize,
    pub end: usize,
}

/// Orchestrator of one coding session.
///
/// Owns the document, the codebook, and the span index, and drives the
/// `Idle -> SelectionPending -> Idle` state machine. At most one selection
/// is pending at a time; starting a new selection first discards the
/// pending one with cancel semantics, never a silent merge. All mutations
/// happen synchronously on the caller's thread; the only asynchronous
/// collaborator is the suggestion service, which is decoupled through
/// [`SuggestionToken`] so late results can only ever be discarded, never
/// applied to a selection they were not requested for.
pub struct CodingSession {
    document: Document,
    codebook: Codebook,
    spans: SpanIndex,
    pending: Option<PendingSelection>,
    generation: u64,
}

impl CodingSession {
    pub fn new(document: Document, codebook: Codebook) -> Self {
        Self {
            document,
            codebook,
            spans: SpanIndex::new(),
            pending: None,
            generation: 0,
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn codebook(&self) -> &Codebook {
        &self.codebook
    }

    pub fn spans(&self) -> &SpanIndex {
        &self.spans
    }

    pub fn pending(&self) -> Option<&PendingSelection> {
        self.pending.as_ref()
    }

    /// Enter `SelectionPending` for a canonical range.
    ///
    /// Captures the selected slice and a clamped context window, and
    /// issues a fresh suggestion token. Any previously pending selection
    /// is discarded first. An invalid range is rejected before anything is
    /// discarded - a range that never was a selection does not cancel one.
    pub fn select(&mut self, range: Range<usize>) -> Result<SuggestionToken, SessionError> {
        if !self.document.is_valid_range(&range) {
            return Err(SessionError::InvalidRange {
                start: range.start,
                end: range.end,
            });
        }

        self.clear_pending();
        self.generation += 1;
        let token = SuggestionToken(self.generation);
        self.pending = Some(PendingSelection {
            text: self.document.slice(range.clone()).to_string(),
            context: self.document.context_window(&range, CONTEXT_RADIUS).to_string(),
            range,
            token,
            suggestions: Vec::new(),
        });
        Ok(token)
    }

    /// Confirm the pending selection with a set of codes, creating a span.
    ///
    /// On any validation failure the session *stays* in
    /// `SelectionPending` so the user can fix the code choice or cancel.
    pub fn confirm_codes(&mut self, code_ids: &[CodeId]) -> Result<SpanId, SessionError> {
        let pending = self.pending.as_ref().ok_or(SessionError::NoPendingSelection)?;
        if code_ids.is_empty() {
            return Err(SessionError::NoCodesChosen);
        }
        for code_id in code_ids {
            if !self.codebook.contains(code_id) {
                return Err(SessionError::UnknownCode(code_id.clone()));
            }
        }

        let span = CodedSpan {
            id: SpanId::generate(),
            text: pending.text.clone(),
            codes: code_ids.to_vec(),
            start: pending.range.start,
            end: pending.range.end,
        };
        let id = self.spans.add(span, &self.document)?;
        self.clear_pending();
        Ok(id)
    }

    /// Discard the pending selection, returning to `Idle`. No-op when
    /// already idle.
    pub fn cancel(&mut self) {
        self.clear_pending();
    }

    /// Remove a span by id; idempotent, allowed in any state.
    pub fn remove_span(&mut self, id: &SpanId) -> bool {
        self.spans.remove(id)
    }

    /// Deliver the result of a suggestion request.
    ///
    /// Accepted only when `token` still belongs to the current pending
    /// selection; anything else is a stale result from a selection that
    /// was canceled or applied in the meantime, and is dropped silently.
    /// Suggestion names are matched case-insensitively against the
    /// codebook; unmatched names are discarded. Returns whether the result
    /// was applied.
    pub fn offer_suggestions(
        &mut self,
        token: SuggestionToken,
        suggestions: Vec<CodeSuggestion>,
    ) -> bool {
        match &mut self.pending {
            Some(pending) if pending.token == token => {
                pending.suggestions = match_suggestions(&self.codebook, suggestions);
                true
            }
            _ => {
                tracing::debug!("discarding stale suggestion result");
                false
            }
        }
    }

    /// Compose the current highlight view.
    pub fn layout(&self, split_paragraphs: bool) -> HighlightLayout {
        compose_layout(&self.document, &self.spans, &self.codebook, split_paragraphs)
    }

    /// Per-code usage statistics, recomputed from the current span set.
    pub fn code_stats(&self) -> Vec<CodeUsage> {
        code_stats(&self.codebook, self.spans.spans())
    }

    /// The full result set in the stable export shape, in span insertion
    /// order. Codes the codebook does not know resolve to an "Unknown"
    /// placeholder rather than disappearing from the record.
    pub fn coded_segments(&self) -> Vec<CodedSegmentRecord> {
        self.spans
            .spans()
            .iter()
            .map(|span| CodedSegmentRecord {
                text: span.text.clone(),
                codes: span
                    .codes
                    .iter()
                    .map(|code_id| match self.codebook.get(code_id) {
                        Some(code) => code.clone(),
                        None => CodeDefinition {
                            id: code_id.clone(),
                            name: "Unknown".to_string(),
                            definition: String::new(),
                            color: "#000000".to_string(),
                        },
                    })
                    .collect(),
                position: SegmentPosition {
                    start: span.start,
                    end: span.end,
                },
            })
            .collect()
    }

    fn clear_pending(&mut self) {
        if self.pending.take().is_some() {
            // Invalidate any in-flight suggestion request for the
            // discarded selection.
            self.generation += 1;
        }
    }
}

/// Match raw suggestions onto the codebook, dropping unmatched names and
/// duplicate hits on the same code.
fn match_suggestions(
    codebook: &Codebook,
    suggestions: Vec<CodeSuggestion>,
) -> Vec<MatchedSuggestion> {
    let mut matched: Vec<MatchedSuggestion> = Vec::new();
    for suggestion in suggestions {
        let Some(code) = codebook.find_by_name(&suggestion.code_name) else {
            tracing::debug!(name = %suggestion.code_name, "suggestion does not match any code");
            continue;
        };
        if matched.iter().any(|m| m.code_id == code.id) {
            continue;
        }
        matched.push(MatchedSuggestion {
            code_id: code.id.clone(),
            explanation: suggestion.explanation,
            confidence: suggestion.confidence.clamp(1, 10),
        });
    }
    matched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codebook::CodeDefinition;
    use pretty_assertions::assert_eq;

    const TEXT: &str = "The team showed strong leadership during the merger.\n\nEveryone collaborated on the new process.";

    fn session() -> CodingSession {
        let codebook = Codebook::new(vec![
            CodeDefinition::new(CodeId::new("code_1"), "Leadership", "Leads", "#3b82f6"),
            CodeDefinition::new(CodeId::new("code_2"), "Collaboration", "Teams", "#10b981"),
        ]);
        CodingSession::new(Document::new(TEXT), codebook)
    }

    fn suggestion(name: &str, confidence: u8) -> CodeSuggestion {
        CodeSuggestion {
            code_name: name.to_string(),
            explanation: "because".to_string(),
            confidence,
        }
    }

    #[test]
    fn select_captures_text_and_context() {
        let mut session = session();
        session.select(23..33).unwrap();

        let pending = session.pending().unwrap();
        assert_eq!(pending.text, "leadership");
        // Context radius exceeds the document, so the window is the whole
        // text, clamped.
        assert_eq!(pending.context, TEXT);
        assert!(pending.suggestions().is_empty());
    }

    #[test]
    fn select_rejects_invalid_ranges_and_keeps_state() {
        let mut session = session();
        session.select(0..8).unwrap();

        let err = session.select(5..5).unwrap_err();
        assert_eq!(err, SessionError::InvalidRange { start: 5, end: 5 });
        // The previously pending selection survives a rejected range.
        assert_eq!(session.pending().unwrap().range, 0..8);

        assert!(matches!(
            session.select(0..9999).unwrap_err(),
            SessionError::InvalidRange { .. }
        ));
    }

    #[test]
    fn new_selection_discards_pending_one() {
        let mut session = session();
        let first_token = session.select(0..8).unwrap();
        let second_token = session.select(23..33).unwrap();

        assert_ne!(first_token, second_token);
        assert_eq!(session.pending().unwrap().text, "leadership");
    }

    #[test]
    fn confirm_creates_span_and_returns_to_idle() {
        let mut session = session();
        session.select(23..33).unwrap();
        let id = session
            .confirm_codes(&[CodeId::new("code_1"), CodeId::new("code_2")])
            .unwrap();

        assert!(session.pending().is_none());
        let span = session.spans().get(&id).unwrap();
        assert_eq!(span.text, "leadership");
        assert_eq!(span.start, 23);
        assert_eq!(span.end, 33);
        assert_eq!(span.codes.len(), 2);
    }

    #[test]
    fn confirm_without_pending_selection_fails() {
        let mut session = session();
        assert_eq!(
            session.confirm_codes(&[CodeId::new("code_1")]).unwrap_err(),
            SessionError::NoPendingSelection
        );
    }

    #[test]
    fn confirm_with_no_codes_stays_pending() {
        let mut session = session();
        session.select(0..8).unwrap();
        assert_eq!(
            session.confirm_codes(&[]).unwrap_err(),
            SessionError::NoCodesChosen
        );
        assert!(session.pending().is_some());
    }

    #[test]
    fn confirm_with_unknown_code_stays_pending() {
        let mut session = session();
        session.select(0..8).unwrap();
        assert_eq!(
            session.confirm_codes(&[CodeId::new("code_42")]).unwrap_err(),
            SessionError::UnknownCode(CodeId::new("code_42"))
        );
        assert!(session.pending().is_some());
    }

    #[test]
    fn confirm_with_duplicate_codes_stays_pending() {
        let mut session = session();
        session.select(0..8).unwrap();
        let err = session
            .confirm_codes(&[CodeId::new("code_1"), CodeId::new("code_1")])
            .unwrap_err();
        assert_eq!(
            err,
            SessionError::Span(SpanError::DuplicateCode(CodeId::new("code_1")))
        );
        assert!(session.pending().is_some());
    }

    #[test]
    fn cancel_returns_to_idle() {
        let mut session = session();
        session.select(0..8).unwrap();
        session.cancel();
        assert!(session.pending().is_none());
        // Canceling while idle is harmless.
        session.cancel();
    }

    #[test]
    fn remove_span_is_idempotent_through_the_session() {
        let mut session = session();
        session.select(0..8).unwrap();
        let id = session.confirm_codes(&[CodeId::new("code_1")]).unwrap();

        assert!(session.remove_span(&id));
        assert!(!session.remove_span(&id));
        assert!(session.spans().is_empty());
    }

    #[test]
    fn suggestions_apply_to_the_matching_selection() {
        let mut session = session();
        let token = session.select(23..33).unwrap();

        let applied = session.offer_suggestions(
            token,
            vec![suggestion("leadership", 8), suggestion("Collaboration", 4)],
        );
        assert!(applied);

        let suggestions = session.pending().unwrap().suggestions();
        assert_eq!(suggestions.len(), 2);
        // Matched case-insensitively onto the codebook.
        assert_eq!(suggestions[0].code_id, CodeId::new("code_1"));
        assert_eq!(suggestions[0].confidence, 8);
    }

    #[test]
    fn stale_suggestions_after_cancel_are_discarded() {
        let mut session = session();
        let token = session.select(23..33).unwrap();
        session.cancel();

        // The request was still in flight when the user canceled.
        assert!(!session.offer_suggestions(token, vec![suggestion("Leadership", 9)]));
        assert!(session.pending().is_none());
    }

    #[test]
    fn stale_suggestions_after_reselection_are_discarded() {
        let mut session = session();
        let old_token = session.select(0..8).unwrap();
        session.select(23..33).unwrap();

        assert!(!session.offer_suggestions(old_token, vec![suggestion("Leadership", 9)]));
        assert!(session.pending().unwrap().suggestions().is_empty());
    }

    #[test]
    fn stale_suggestions_after_confirm_are_discarded() {
        let mut session = session();
        let token = session.select(0..8).unwrap();
        session.confirm_codes(&[CodeId::new("code_1")]).unwrap();

        assert!(!session.offer_suggestions(token, vec![suggestion("Leadership", 9)]));
    }

    #[test]
    fn unmatched_suggestion_names_are_dropped() {
        let mut session = session();
        let token = session.select(0..8).unwrap();
        let applied = session.offer_suggestions(
            token,
            vec![
                suggestion("Leadership", 8),
                suggestion("Not In Codebook", 9),
                suggestion("LEADERSHIP", 5),
            ],
        );
        assert!(applied);

        // The unmatched name is gone and the duplicate hit collapsed.
        let suggestions = session.pending().unwrap().suggestions();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].code_id, CodeId::new("code_1"));
    }

    #[test]
    fn coded_segments_resolve_codes_in_insertion_order() {
        let mut session = session();
        session.select(23..33).unwrap();
        session.confirm_codes(&[CodeId::new("code_1")]).unwrap();
        session.select(63..75).unwrap();
        session.confirm_codes(&[CodeId::new("code_2")]).unwrap();

        let records = session.coded_segments();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].text, "leadership");
        assert_eq!(records[0].codes[0].name, "Leadership");
        assert_eq!(records[0].position, SegmentPosition { start: 23, end: 33 });
        assert_eq!(records[1].text, "collaborated");
    }

    #[test]
    fn layout_and_stats_reflect_confirmed_spans() {
        let mut session = session();
        session.select(23..33).unwrap();
        session.confirm_codes(&[CodeId::new("code_1")]).unwrap();

        let layout = session.layout(false);
        let rendered: String = layout.blocks[0]
            .segments
            .iter()
            .map(|segment| segment.text())
            .collect();
        assert_eq!(rendered, TEXT);

        let stats = session.code_stats();
        assert_eq!(stats[0].name, "Leadership");
        assert_eq!(stats[0].count, 1);
        assert_eq!(stats[0].percentage, 100.0);
    }
}
