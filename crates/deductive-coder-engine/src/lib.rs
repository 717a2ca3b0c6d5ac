pub mod codebook;
pub mod coding;
pub mod export;
pub mod io;
pub mod suggest;


// Re-export key types for easier usage
pub use codebook::{CodeDefinition, CodeId, Codebook, CodebookError};
pub use coding::*;
pub use export::{ExportFormat, ExportMetadata, ExportOptions};
pub use suggest::{CodeSuggestion, SuggestConfig, SuggestError, SuggestionClient};
