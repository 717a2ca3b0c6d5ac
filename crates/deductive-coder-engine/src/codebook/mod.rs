//! Codebook loading and lookup.
//!
//! A codebook is the ordered list of code definitions available for
//! tagging. It is parsed in bulk from a CSV framework file at session
//! start and immutable afterwards; coded spans reference codes by id and
//! never copy them.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Highlight palette assigned cyclically to codes by the loader.
pub const PALETTE: [&str; 8] = [
    "#3b82f6", "#10b981", "#f59e0b", "#ef4444", "#8b5cf6", "#06b6d4", "#84cc16", "#f97316",
];

/// Color used when a span references a code the codebook does not know.
pub const FALLBACK_COLOR: &str = "#3b82f6";

/// Stable identifier of a code definition.
///
/// The loader assigns ids deterministically by data-row index
/// (`code_1`, `code_2`, ...), so re-loading the same framework file yields
/// the same ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CodeId(String);

impl CodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One entry of the coding framework.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeDefinition {
    pub id: CodeId,
    pub name: String,
    pub definition: String,
    pub color: String,
}

impl CodeDefinition {
    /// Create a definition, falling back to [`FALLBACK_COLOR`] when the
    /// given color is not a `#rrggbb` hex string.
    pub fn new(
        id: CodeId,
        name: impl Into<String>,
        definition: impl Into<String>,
        color: impl Into<String>,
    ) -> Self {
        let color = color.into();
        let color = if is_hex_color(&color) {
            color
        } else {
            FALLBACK_COLOR.to_string()
        };
        Self {
            id,
            name: name.into(),
            definition: definition.into(),
            color,
        }
    }
}

/// Whether `value` is a six-digit hex color like `#3b82f6`.
pub fn is_hex_color(value: &str) -> bool {
    static HEX_COLOR: OnceLock<Regex> = OnceLock::new();
    let re = HEX_COLOR.get_or_init(|| {
        Regex::new(r"^#[0-9a-fA-F]{6}$").expect("Invalid hex color regex")
    });
    re.is_match(value)
}

#[derive(Debug, Error, PartialEq)]
pub enum CodebookError {
    #[error("framework file is missing required column \"{0}\"")]
    MissingColumn(&'static str),
    #[error("framework file is empty")]
    EmptyFile,
}

/// Ordered list of code definitions, with id and name lookup.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Codebook {
    codes: Vec<CodeDefinition>,
}

impl Codebook {
    pub fn new(codes: Vec<CodeDefinition>) -> Self {
        Self { codes }
    }

    /// Parse a CSV framework file into a codebook.
    ///
    /// The header row is matched case-insensitively and must contain a
    /// `code` and a `definition` column; anything else fails fast so a
    /// session never starts on a half-loaded framework. Data rows are
    /// split on plain commas (quoted fields are not supported, matching
    /// the upload format this tool accepts); rows with an empty code or
    /// definition cell are skipped. Ids and colors are assigned by row
    /// index, colors cycling through [`PALETTE`].
    pub fn parse_csv(content: &str) -> Result<Self, CodebookError> {
        let mut lines = content.trim().lines();
        let header = lines.next().ok_or(CodebookError::EmptyFile)?;
        let headers: Vec<String> = header
            .split(',')
            .map(|h| h.trim().to_lowercase())
            .collect();

        let code_idx = headers
            .iter()
            .position(|h| h == "code")
            .ok_or(CodebookError::MissingColumn("code"))?;
        let definition_idx = headers
            .iter()
            .position(|h| h == "definition")
            .ok_or(CodebookError::MissingColumn("definition"))?;

        let mut codes = Vec::new();
        for (row, line) in lines.enumerate() {
            let values: Vec<&str> = line.split(',').map(str::trim).collect();
            let name = values.get(code_idx).copied().unwrap_or("");
            let definition = values.get(definition_idx).copied().unwrap_or("");
            if name.is_empty() || definition.is_empty() {
                continue;
            }
            codes.push(CodeDefinition {
                id: CodeId::new(format!("code_{}", row + 1)),
                name: name.to_string(),
                definition: definition.to_string(),
                color: PALETTE[row % PALETTE.len()].to_string(),
            });
        }

        Ok(Self { codes })
    }

    pub fn codes(&self) -> &[CodeDefinition] {
        &self.codes
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn contains(&self, id: &CodeId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: &CodeId) -> Option<&CodeDefinition> {
        self.codes.iter().find(|code| &code.id == id)
    }

    /// Case-insensitive lookup by code name, used to match AI suggestions
    /// back onto the framework.
    pub fn find_by_name(&self, name: &str) -> Option<&CodeDefinition> {
        self.codes
            .iter()
            .find(|code| code.name.eq_ignore_ascii_case(name))
    }

    /// Highlight color for a code id, falling back when the id is unknown.
    pub fn color_for(&self, id: &CodeId) -> &str {
        self.get(id).map_or(FALLBACK_COLOR, |code| &code.color)
    }

    /// One-line-per-code description of the framework, as handed to the
    /// suggestion service.
    pub fn description(&self) -> String {
        self.codes
            .iter()
            .map(|code| format!("- {}: {}", code.name, code.definition))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
