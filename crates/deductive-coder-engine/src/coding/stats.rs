use serde::Serialize;

use crate::codebook::{CodeId, Codebook};
use crate::coding::spans::CodedSpan;

/// Usage of one code across the current span set, in the stable accessor
/// shape handed to export and report consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CodeUsage {
    pub id: CodeId,
    pub name: String,
    pub definition: String,
    pub color: String,
    pub count: usize,
    pub percentage: f64,
}

/// Per-code usage counts and percentages.
///
/// Pure function of the codebook and span set. Every code appears in the
/// output, including unused ones at count 0. Percentage is against the
/// total number of spans (0.0 when there are none, never a division
/// fault). Ordered by count descending; the sort is stable so ties keep
/// codebook order, which keeps exports deterministic.
pub fn code_stats(codebook: &Codebook, spans: &[CodedSpan]) -> Vec<CodeUsage> {
    let total = spans.len();
    let mut usages: Vec<CodeUsage> = codebook
        .codes()
        .iter()
        .map(|code| {
            let count = spans
                .iter()
                .filter(|span| span.codes.contains(&code.id))
                .count();
            let percentage = if total == 0 {
                0.0
            } else {
                count as f64 / total as f64 * 100.0
            };
            CodeUsage {
                id: code.id.clone(),
                name: code.name.clone(),
                definition: code.definition.clone(),
                color: code.color.clone(),
                count,
                percentage,
            }
        })
        .collect();

    usages.sort_by(|a, b| b.count.cmp(&a.count));
    usages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codebook::CodeDefinition;
    use crate::coding::document::Document;
    use crate::coding::spans::{SpanId, SpanIndex};

    fn codebook(names: &[(&str, &str)]) -> Codebook {
        Codebook::new(
            names
                .iter()
                .map(|(id, name)| {
                    CodeDefinition::new(CodeId::new(*id), *name, "definition", "#3b82f6")
                })
                .collect(),
        )
    }

    fn add_span(index: &mut SpanIndex, doc: &Document, start: usize, end: usize, codes: &[&str]) {
        index
            .add(
                CodedSpan {
                    id: SpanId::generate(),
                    text: doc.text()[start..end].to_string(),
                    codes: codes.iter().map(|c| CodeId::new(*c)).collect(),
                    start,
                    end,
                },
                doc,
            )
            .unwrap();
    }

    #[test]
    fn counts_multi_coded_spans_once_per_code() {
        let doc = Document::new("0123456789abcdefghij");
        let codebook = codebook(&[("code_1", "A"), ("code_2", "B")]);
        let mut index = SpanIndex::new();
        add_span(&mut index, &doc, 0, 3, &["code_1"]);
        add_span(&mut index, &doc, 4, 8, &["code_1", "code_2"]);
        add_span(&mut index, &doc, 9, 12, &["code_2"]);

        let stats = code_stats(&codebook, index.spans());
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].count, 2);
        assert_eq!(stats[1].count, 2);
        assert!((stats[0].percentage - 200.0 / 3.0).abs() < 1e-9);
        assert!((stats[1].percentage - 200.0 / 3.0).abs() < 1e-9);
        // Tie on count keeps codebook order.
        assert_eq!(stats[0].name, "A");
        assert_eq!(stats[1].name, "B");
    }

    #[test]
    fn orders_by_count_descending() {
        let doc = Document::new("0123456789abcdefghij");
        let codebook = codebook(&[("code_1", "Rare"), ("code_2", "Common")]);
        let mut index = SpanIndex::new();
        add_span(&mut index, &doc, 0, 3, &["code_2"]);
        add_span(&mut index, &doc, 4, 8, &["code_2"]);
        add_span(&mut index, &doc, 9, 12, &["code_1"]);

        let stats = code_stats(&codebook, index.spans());
        assert_eq!(stats[0].name, "Common");
        assert_eq!(stats[0].count, 2);
        assert_eq!(stats[1].name, "Rare");
        assert_eq!(stats[1].count, 1);
    }

    #[test]
    fn zero_spans_reports_every_code_at_zero() {
        let codebook = codebook(&[("code_1", "A"), ("code_2", "B"), ("code_3", "C")]);
        let stats = code_stats(&codebook, &[]);
        assert_eq!(stats.len(), 3);
        for usage in &stats {
            assert_eq!(usage.count, 0);
            assert_eq!(usage.percentage, 0.0);
        }
        // Codebook order preserved on an all-zero tie.
        let names: Vec<&str> = stats.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
    }
}
