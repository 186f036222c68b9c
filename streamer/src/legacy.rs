//! Fallback for deployments that only publish the monolithic report file.

use std::collections::HashSet;

use serde_json::Value;
use shared::{LegacyRecord, Report, TileKey};

use crate::error::FetchError;
use crate::manifest::ManifestIndex;

/// The single synthetic tile holding every legacy report.
pub const LEGACY_TILE: TileKey = TileKey { zoom: 0, x: 0, y: 0 };

#[derive(Debug, Clone, Default)]
pub struct LegacyDataset {
    pub reports: Vec<Report>,
    pub dropped: usize,
}

impl LegacyDataset {
    pub fn manifest(&self, path: &str) -> ManifestIndex {
        ManifestIndex::single(LEGACY_TILE, path, self.reports.len())
    }
}

/// Normalizes every record of the legacy file, dropping the unusable ones.
///
/// Only the first record with a given id is kept.
pub fn parse_legacy_reports(bytes: &[u8]) -> Result<LegacyDataset, FetchError> {
    let records: Vec<Value> = serde_json::from_slice(bytes)?;
    let mut dataset = LegacyDataset {
        reports: Vec::with_capacity(records.len()),
        dropped: 0,
    };
    let mut seen_ids = HashSet::new();
    for (index, value) in records.into_iter().enumerate() {
        match LegacyRecord::from_value(value).and_then(|record| record.to_report(index)) {
            Ok(report) if !seen_ids.insert(report.id.clone()) => {
                tracing::debug!("legacy record {index} skipped: duplicate id {}", report.id);
                dataset.dropped += 1;
            }
            Ok(report) => dataset.reports.push(report),
            Err(err) => {
                tracing::debug!("legacy record {index} skipped: {err}");
                dataset.dropped += 1;
            }
        }
    }
    if dataset.dropped > 0 {
        tracing::warn!(
            "legacy file: {} records usable, {} skipped",
            dataset.reports.len(),
            dataset.dropped
        );
    }
    Ok(dataset)
}
