//! Export rendering.
//!
//! The export layer consumes the two stable accessor shapes - the full
//! result set ([`CodedSegmentRecord`]) and the per-code statistics
//! ([`CodeUsage`]) - and renders them to the three formats the tool has
//! always offered: structured JSON, spreadsheet CSV, and a plain-text
//! report. The engine guarantees the accessor shapes; everything in this
//! module is serialization.

use serde_json::json;
use thiserror::Error;

use crate::coding::session::CodedSegmentRecord;
use crate::coding::stats::CodeUsage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
    Text,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
            ExportFormat::Text => "txt",
        }
    }
}

/// Which optional sections to include in an export.
#[derive(Debug, Clone, Copy)]
pub struct ExportOptions {
    pub include_stats: bool,
    pub include_definitions: bool,
    pub include_positions: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            include_stats: true,
            include_definitions: true,
            include_positions: true,
        }
    }
}

/// Provenance recorded in every export.
#[derive(Debug, Clone)]
pub struct ExportMetadata {
    pub document: String,
    pub framework: String,
    pub generated: String,
}

#[derive(Debug, Error)]
#[error("failed to serialize export: {0}")]
pub struct ExportError(#[from] serde_json::Error);

/// Render the results in the requested format.
pub fn render(
    format: ExportFormat,
    metadata: &ExportMetadata,
    records: &[CodedSegmentRecord],
    stats: &[CodeUsage],
    options: &ExportOptions,
) -> Result<String, ExportError> {
    match format {
        ExportFormat::Json => to_json(metadata, records, stats, options),
        ExportFormat::Csv => Ok(to_csv(records, options)),
        ExportFormat::Text => Ok(to_text(metadata, records, stats, options)),
    }
}

fn to_json(
    metadata: &ExportMetadata,
    records: &[CodedSegmentRecord],
    stats: &[CodeUsage],
    options: &ExportOptions,
) -> Result<String, ExportError> {
    let results: Vec<serde_json::Value> = records
        .iter()
        .map(|record| {
            let codes: Vec<serde_json::Value> = record
                .codes
                .iter()
                .map(|code| {
                    let mut value = json!({
                        "id": code.id,
                        "name": code.name,
                    });
                    if options.include_definitions {
                        value["definition"] = json!(code.definition);
                        value["color"] = json!(code.color);
                    }
                    value
                })
                .collect();

            let mut result = json!({
                "text": record.text,
                "codes": codes,
            });
            if options.include_positions {
                result["position"] = json!({
                    "start": record.position.start,
                    "end": record.position.end,
                });
            }
            result
        })
        .collect();

    let mut data = json!({
        "metadata": {
            "document": metadata.document,
            "framework": metadata.framework,
            "timestamp": metadata.generated,
            "totalSegments": records.len(),
            "exportOptions": {
                "includeStats": options.include_stats,
                "includeDefinitions": options.include_definitions,
                "includePositions": options.include_positions,
            },
        },
        "results": results,
    });

    if options.include_stats {
        let statistics: Vec<serde_json::Value> = stats
            .iter()
            .map(|usage| {
                let mut value = json!({
                    "code": usage.name,
                    "count": usage.count,
                    "percentage": usage.percentage,
                });
                if options.include_definitions {
                    value["definition"] = json!(usage.definition);
                    value["color"] = json!(usage.color);
                }
                value
            })
            .collect();
        data["statistics"] = json!(statistics);
    }

    Ok(serde_json::to_string_pretty(&data)?)
}

fn to_csv(records: &[CodedSegmentRecord], options: &ExportOptions) -> String {
    let mut headers = vec!["Text", "Codes"];
    if options.include_definitions {
        headers.push("Code Definitions");
    }
    if options.include_positions {
        headers.push("Start Position");
        headers.push("End Position");
    }

    let mut lines = vec![headers.join(",")];
    for record in records {
        let codes = record
            .codes
            .iter()
            .map(|code| code.name.as_str())
            .collect::<Vec<_>>()
            .join("; ");

        let mut row = vec![csv_quote(&record.text), csv_quote(&codes)];
        if options.include_definitions {
            let definitions = record
                .codes
                .iter()
                .map(|code| format!("{}: {}", code.name, code.definition))
                .collect::<Vec<_>>()
                .join("; ");
            row.push(csv_quote(&definitions));
        }
        if options.include_positions {
            row.push(record.position.start.to_string());
            row.push(record.position.end.to_string());
        }
        lines.push(row.join(","));
    }

    lines.join("\n")
}

fn to_text(
    metadata: &ExportMetadata,
    records: &[CodedSegmentRecord],
    stats: &[CodeUsage],
    options: &ExportOptions,
) -> String {
    let mut content = vec![
        "Deductive Coding Analysis Results".to_string(),
        format!("Generated: {}", metadata.generated),
        format!("Document: {}", metadata.document),
        format!("Framework: {}", metadata.framework),
        format!("Total Segments: {}", records.len()),
        String::new(),
        "=".repeat(50),
        String::new(),
        "CODED SEGMENTS:".to_string(),
        String::new(),
    ];

    for (i, record) in records.iter().enumerate() {
        content.push(format!("{}. \"{}\"", i + 1, record.text));

        let codes = record
            .codes
            .iter()
            .map(|code| code.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        content.push(format!("   Codes: {codes}"));

        if options.include_definitions {
            for code in &record.codes {
                content.push(format!("   - {}: {}", code.name, code.definition));
            }
        }
        if options.include_positions {
            content.push(format!(
                "   Position: {}-{}",
                record.position.start, record.position.end
            ));
        }
        content.push(String::new());
    }

    if options.include_stats {
        content.push("=".repeat(50));
        content.push(String::new());
        content.push("CODING STATISTICS:".to_string());
        content.push(String::new());

        for usage in stats {
            content.push(format!(
                "{}: {} times ({:.1}%)",
                usage.name, usage.count, usage.percentage
            ));
            if options.include_definitions {
                content.push(format!("  Definition: {}", usage.definition));
            }
            content.push(String::new());
        }
    }

    content.join("\n")
}

/// Quote a CSV field, doubling embedded quotes.
fn csv_quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codebook::{CodeDefinition, CodeId};
    use crate::coding::session::SegmentPosition;
    use pretty_assertions::assert_eq;

    fn metadata() -> ExportMetadata {
        ExportMetadata {
            document: "interview.txt".to_string(),
            framework: "framework.csv".to_string(),
            generated: "2025-03-14T09:26:53Z".to_string(),
        }
    }

    fn records() -> Vec<CodedSegmentRecord> {
        vec![CodedSegmentRecord {
            text: "strong \"leadership\" shown".to_string(),
            codes: vec![
                CodeDefinition::new(CodeId::new("code_1"), "Leadership", "Leads things", "#3b82f6"),
                CodeDefinition::new(CodeId::new("code_2"), "Collaboration", "Teams", "#10b981"),
            ],
            position: SegmentPosition { start: 10, end: 35 },
        }]
    }

    fn stats() -> Vec<CodeUsage> {
        vec![CodeUsage {
            id: CodeId::new("code_1"),
            name: "Leadership".to_string(),
            definition: "Leads things".to_string(),
            color: "#3b82f6".to_string(),
            count: 2,
            percentage: 200.0 / 3.0,
        }]
    }

    #[test]
    fn json_export_includes_all_sections_by_default() {
        let rendered = render(
            ExportFormat::Json,
            &metadata(),
            &records(),
            &stats(),
            &ExportOptions::default(),
        )
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();

        assert_eq!(value["metadata"]["document"], "interview.txt");
        assert_eq!(value["metadata"]["totalSegments"], 1);
        assert_eq!(value["results"][0]["text"], "strong \"leadership\" shown");
        assert_eq!(value["results"][0]["codes"][0]["id"], "code_1");
        assert_eq!(value["results"][0]["codes"][0]["definition"], "Leads things");
        assert_eq!(value["results"][0]["position"]["start"], 10);
        assert_eq!(value["statistics"][0]["code"], "Leadership");
        assert_eq!(value["statistics"][0]["count"], 2);
    }

    #[test]
    fn json_export_honors_disabled_options() {
        let options = ExportOptions {
            include_stats: false,
            include_definitions: false,
            include_positions: false,
        };
        let rendered = render(
            ExportFormat::Json,
            &metadata(),
            &records(),
            &stats(),
            &options,
        )
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();

        assert!(value.get("statistics").is_none());
        assert!(value["results"][0].get("position").is_none());
        assert!(value["results"][0]["codes"][0].get("definition").is_none());
        // Id and name always survive.
        assert_eq!(value["results"][0]["codes"][0]["name"], "Leadership");
    }

    #[test]
    fn csv_export_quotes_and_doubles_embedded_quotes() {
        let rendered = render(
            ExportFormat::Csv,
            &metadata(),
            &records(),
            &stats(),
            &ExportOptions::default(),
        )
        .unwrap();
        let lines: Vec<&str> = rendered.lines().collect();

        assert_eq!(
            lines[0],
            "Text,Codes,Code Definitions,Start Position,End Position"
        );
        assert!(lines[1].starts_with("\"strong \"\"leadership\"\" shown\""));
        assert!(lines[1].contains("\"Leadership; Collaboration\""));
        assert!(lines[1].ends_with("10,35"));
    }

    #[test]
    fn csv_export_drops_optional_columns() {
        let options = ExportOptions {
            include_stats: true,
            include_definitions: false,
            include_positions: false,
        };
        let rendered = render(
            ExportFormat::Csv,
            &metadata(),
            &records(),
            &stats(),
            &options,
        )
        .unwrap();
        assert_eq!(rendered.lines().next().unwrap(), "Text,Codes");
    }

    #[test]
    fn text_export_lays_out_segments_and_statistics() {
        let rendered = render(
            ExportFormat::Text,
            &metadata(),
            &records(),
            &stats(),
            &ExportOptions::default(),
        )
        .unwrap();

        assert!(rendered.starts_with("Deductive Coding Analysis Results"));
        assert!(rendered.contains("Document: interview.txt"));
        assert!(rendered.contains("Total Segments: 1"));
        assert!(rendered.contains("1. \"strong \"leadership\" shown\""));
        assert!(rendered.contains("   Codes: Leadership, Collaboration"));
        assert!(rendered.contains("   - Leadership: Leads things"));
        assert!(rendered.contains("   Position: 10-35"));
        assert!(rendered.contains("CODING STATISTICS:"));
        assert!(rendered.contains("Leadership: 2 times (66.7%)"));
    }

    #[test]
    fn empty_result_set_still_renders() {
        let rendered = render(
            ExportFormat::Text,
            &metadata(),
            &[],
            &[],
            &ExportOptions::default(),
        )
        .unwrap();
        assert!(rendered.contains("Total Segments: 0"));

        let csv = render(
            ExportFormat::Csv,
            &metadata(),
            &[],
            &[],
            &ExportOptions::default(),
        )
        .unwrap();
        assert_eq!(csv.lines().count(), 1);
    }

    #[test]
    fn format_extensions() {
        assert_eq!(ExportFormat::Json.extension(), "json");
        assert_eq!(ExportFormat::Csv.extension(), "csv");
        assert_eq!(ExportFormat::Text.extension(), "txt");
    }
}
