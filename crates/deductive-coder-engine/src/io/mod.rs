use std::fs;
use std::path::{Path, PathBuf};

use crate::codebook::{Codebook, CodebookError};
use crate::coding::document::Document;

#[derive(Debug, thiserror::Error)]
pub enum IoError {
    #[error("File not found: {0}")]
    NotFound(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0} is not valid UTF-8 text")]
    InvalidUtf8(PathBuf),
    #[error("invalid framework file: {0}")]
    Codebook(#[from] CodebookError),
}

/// Read a text file into a canonical document.
pub fn load_document(path: &Path) -> Result<Document, IoError> {
    Ok(Document::new(read_text(path)?))
}

/// Read and parse a CSV framework file into a codebook.
pub fn load_codebook(path: &Path) -> Result<Codebook, IoError> {
    Ok(Codebook::parse_csv(&read_text(path)?)?)
}

fn read_text(path: &Path) -> Result<String, IoError> {
    if !path.exists() {
        return Err(IoError::NotFound(path.to_path_buf()));
    }
    let bytes = fs::read(path).map_err(IoError::Io)?;
    String::from_utf8(bytes).map_err(|_| IoError::InvalidUtf8(path.to_path_buf()))
}
