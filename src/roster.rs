use anyhow::{anyhow, Context, Result};
use std::path::Path;
use tracing::info;

use crate::models::split_list;

/// Read the stock codes in `column` of a CSV roster file.
/// Blank cells are skipped; duplicates are kept.
pub fn load_roster(path: &Path, column: &str) -> Result<Vec<String>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open roster file {}", path.display()))?;

    let index = reader
        .headers()
        .with_context(|| format!("Failed to read header of {}", path.display()))?
        .iter()
        .position(|header| header.trim() == column)
        .ok_or_else(|| anyhow!("Roster file {} has no '{}' column", path.display(), column))?;

    let mut codes = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("Failed to read a row of {}", path.display()))?;
        if let Some(code) = record.get(index).map(str::trim).filter(|c| !c.is_empty()) {
            codes.push(code.to_string());
        }
    }

    info!("📋 Loaded {} stock codes from {}", codes.len(), path.display());
    Ok(codes)
}

/// Parse an explicit comma-separated list such as `000001.SZ,600000.SH`
pub fn parse_stock_list(raw: &str) -> Vec<String> {
    split_list(raw)
}
