//! CSV persistence for raw and merged series

use crate::error::Result;
use crate::types::{AlignedRecord, Candle, FundingEvent};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;

pub fn write_funding(path: &Path, rows: &[FundingEvent]) -> Result<()> {
    write_csv(path, rows)
}

pub fn write_candles(path: &Path, rows: &[Candle]) -> Result<()> {
    write_csv(path, rows)
}

pub fn write_merged(path: &Path, rows: &[AlignedRecord]) -> Result<()> {
    write_csv(path, rows)
}

pub fn read_funding(path: &Path) -> Result<Vec<FundingEvent>> {
    read_csv(path)
}

pub fn read_candles(path: &Path) -> Result<Vec<Candle>> {
    read_csv(path)
}

pub fn read_merged(path: &Path) -> Result<Vec<AlignedRecord>> {
    read_csv(path)
}

/// Serialize rows to a sibling temp file, then rename it over `path`
fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    {
        let mut writer = csv::Writer::from_writer(tmp.as_file_mut());
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
    }
    tmp.as_file_mut().flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    tracing::debug!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}

fn read_csv<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}
