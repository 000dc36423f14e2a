use std::{fs, path::Path};

use thiserror::Error;

use crate::models::Event;
use crate::utils;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("export io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("export json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Writes `events` as a pretty-printed JSON array and returns how many were written.
pub fn write_events(path: &Path, events: &[Event]) -> Result<usize, ExportError> {
    utils::ensure_parent(path);
    let contents = serde_json::to_string_pretty(events)?;
    fs::write(path, contents)?;
    Ok(events.len())
}

pub fn read_events(path: &Path) -> Result<Vec<Event>, ExportError> {
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}
