//! On-disk artifacts: one CSV per stock and run parameters.
//!
//! A file at the final path means the stock is complete. Writes go to a
//! hidden `.tmp` sibling first and are renamed into place, so an
//! interrupted write never leaves a file at the final path.

use anyhow::{anyhow, Context, Result};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::bars::BarTable;
use crate::models::{FetchParams, DATE_FORMAT};

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    output_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn ensure_output_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("Failed to create output dir: {}", self.output_dir.display()))
    }

    /// `{code}_{start}_{end}_{freq}.csv` under the output directory
    pub fn artifact_path(&self, ts_code: &str, params: &FetchParams) -> PathBuf {
        let file_name = format!(
            "{}_{}_{}_{}.csv",
            sanitize_code(ts_code),
            params.start_date.format(DATE_FORMAT),
            params.end_date.format(DATE_FORMAT),
            params.freq
        );
        self.output_dir.join(file_name)
    }

    pub fn exists(&self, ts_code: &str, params: &FetchParams) -> bool {
        self.artifact_path(ts_code, params).is_file()
    }

    /// Write `table` to the artifact path for `ts_code`. Returns the final path.
    pub fn write_atomic(
        &self,
        ts_code: &str,
        params: &FetchParams,
        table: &BarTable,
    ) -> Result<PathBuf> {
        let path = self.artifact_path(ts_code, params);
        write_csv_atomic(&path, table)?;
        Ok(path)
    }
}

/// Write a CSV (header plus rows) to `path` via a uniquely named temporary
/// sibling, so concurrent writers of the same path never share a temp file.
/// The last rename wins; every writer's output is complete.
pub fn write_csv_atomic(path: &Path, table: &BarTable) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let prefix = format!(
        ".{}.",
        path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default()
    );

    // Removed on drop unless persisted
    let mut tmp = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".tmp")
        .tempfile_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;

    write_csv(tmp.as_file_mut(), table)
        .with_context(|| format!("Failed to write {}", tmp.path().display()))?;

    tmp.persist(path).map_err(|e| {
        anyhow!("Failed to rename {} -> {}: {}", e.file.path().display(), path.display(), e.error)
    })?;
    sync_dir(dir)?;

    debug!("Wrote {} rows to {}", table.len(), path.display());
    Ok(())
}

fn write_csv(file: &mut File, table: &BarTable) -> Result<()> {
    let mut writer = csv::Writer::from_writer(&mut *file);

    writer.write_record(&table.columns)?;
    for row in &table.rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    drop(writer);

    file.sync_all()?;
    Ok(())
}

/// Make the rename itself durable
#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    File::open(dir)
        .and_then(|d| d.sync_all())
        .with_context(|| format!("Failed to sync directory {}", dir.display()))
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

/// Stock codes become file names; keep them from escaping the directory
fn sanitize_code(ts_code: &str) -> String {
    ts_code.replace(['/', '\\', ':'], "_")
}
