// ── Snapshot decoder ──
//
// Pure functions turning captured CLI output into typed records. Nothing
// here touches the store or spawns processes.

use std::collections::HashSet;

use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::warn;

use crate::model::Keyed;

/// Output that matched none of the accepted shapes.
#[derive(Debug, Clone, Error)]
#[error("unexpected output ({message})")]
pub struct DecodeError {
    pub message: String,
    /// The payload exactly as the CLI printed it.
    pub raw: String,
}

impl DecodeError {
    fn new(err: &serde_json::Error, raw: &str) -> Self {
        Self {
            message: err.to_string(),
            raw: raw.to_owned(),
        }
    }
}

/// Decode a JSON array of records, dropping duplicate identity keys.
pub fn decode_list<T>(raw: &str) -> Result<Vec<T>, DecodeError>
where
    T: DeserializeOwned + Keyed,
{
    let items: Vec<T> = serde_json::from_str(raw).map_err(|e| DecodeError::new(&e, raw))?;
    Ok(dedupe_by_key(items))
}

/// Decode output that may be a single object, an array, or nothing.
///
/// Tries the single-object shape first, then the array shape. Blank
/// output means zero records.
pub fn decode_one_or_many<T>(raw: &str) -> Result<Vec<T>, DecodeError>
where
    T: DeserializeOwned + Keyed,
{
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }

    let object_err = match serde_json::from_str::<T>(raw) {
        Ok(one) => return Ok(vec![one]),
        Err(e) => e,
    };

    match serde_json::from_str::<Vec<T>>(raw) {
        Ok(many) => Ok(dedupe_by_key(many)),
        // Report whichever attempt matches the payload's outer shape.
        Err(array_err) if raw.trim_start().starts_with('[') => {
            Err(DecodeError::new(&array_err, raw))
        }
        Err(_) => Err(DecodeError::new(&object_err, raw)),
    }
}

/// Non-blank lines of plain-text output, trimmed, duplicates removed.
pub fn decode_lines(raw: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| seen.insert(*line))
        .map(str::to_owned)
        .collect()
}

/// The single value printed by an `inspect`-style command, if any.
pub fn decode_single_line(raw: &str) -> Option<String> {
    raw.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_owned)
}

/// Keep the first record for each identity key.
pub fn dedupe_by_key<T: Keyed>(items: Vec<T>) -> Vec<T> {
    let mut seen: HashSet<String> = HashSet::with_capacity(items.len());
    items
        .into_iter()
        .filter(|item| {
            let fresh = seen.insert(item.key().to_owned());
            if !fresh {
                warn!(key = item.key(), "dropping record with duplicate identity key");
            }
            fresh
        })
        .collect()
}
