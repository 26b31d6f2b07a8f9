//! The persisted record of everything known about one experiment.
//!
//! Entries are append-only: catalog merges add keys that are absent and never
//! touch existing ones, because an existing image may already be materialized
//! and its raw blob deleted on the remote side.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PhenoError;
use crate::store::DatasetLayout;

/// Field names an image record already serializes; label metadata may not reuse them.
pub const RESERVED_IMAGE_FIELDS: &[&str] = &[
    "capture_id",
    "timestamp",
    "camera_label",
    "tile_id",
    "frame",
    "raw_blob_id",
    "orientation",
    "dataformat",
    "width",
    "height",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub hostname: String,
    pub database: String,
    pub experiment: String,
}

impl DatasetInfo {
    pub fn is_empty(&self) -> bool {
        self.hostname.is_empty() && self.database.is_empty() && self.experiment.is_empty()
    }
}

impl fmt::Display for DatasetInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.hostname, self.database, self.experiment)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureEvent {
    pub id: i64,
    pub barcode: Option<String>,
    pub cartag: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub weight_before: Option<f64>,
    pub weight_after: Option<f64>,
    pub water_amount: Option<f64>,
    pub completed: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub capture_id: String,
    pub timestamp: DateTime<Utc>,
    pub camera_label: String,
    pub tile_id: i64,
    pub frame: i64,
    pub raw_blob_id: i64,
    pub orientation: i32,
    pub dataformat: i32,
    pub width: u32,
    pub height: u32,
    #[serde(flatten)]
    pub label_fields: BTreeMap<String, String>,
}

impl ImageRecord {
    pub fn capture_date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }

    pub fn file_name(&self) -> String {
        format!("{}_{}_{}.png", self.camera_label, self.tile_id, self.frame)
    }

    /// `{UTCDate}/{captureId}/{file}`; doubles as the ledger key.
    pub fn relative_path(&self) -> String {
        format!(
            "{}/{}/{}",
            self.capture_date().format("%Y-%m-%d"),
            self.capture_id,
            self.file_name()
        )
    }
}

pub fn capture_key(id: i64) -> String {
    format!("snapshot{id}")
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    #[serde(default)]
    pub dataset: DatasetInfo,
    #[serde(default)]
    pub environment: BTreeMap<String, CaptureEvent>,
    #[serde(default)]
    pub images: BTreeMap<String, ImageRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LedgerStats {
    pub captures: usize,
    pub captures_without_images: usize,
    pub images: usize,
    pub materialized: usize,
    pub pending: usize,
}

impl Ledger {
    pub fn new(dataset: DatasetInfo) -> Self {
        Self {
            dataset,
            environment: BTreeMap::new(),
            images: BTreeMap::new(),
        }
    }

    /// Adopts `expected` on a fresh ledger, rejects a ledger recorded for another source.
    pub fn ensure_provenance(&mut self, expected: &DatasetInfo) -> Result<(), PhenoError> {
        if self.dataset.is_empty() {
            self.dataset = expected.clone();
            return Ok(());
        }
        if &self.dataset != expected {
            return Err(PhenoError::LedgerMismatch {
                expected: expected.to_string(),
                found: self.dataset.to_string(),
            });
        }
        Ok(())
    }

    pub fn stats(&self, layout: &DatasetLayout) -> LedgerStats {
        let with_images = self
            .images
            .values()
            .map(|record| record.capture_id.as_str())
            .collect::<BTreeSet<_>>();
        let materialized = self
            .images
            .keys()
            .filter(|key| layout.output_path(key).as_std_path().exists())
            .count();
        LedgerStats {
            captures: self.environment.len(),
            captures_without_images: self
                .environment
                .keys()
                .filter(|key| !with_images.contains(key.as_str()))
                .count(),
            images: self.images.len(),
            materialized,
            pending: self.images.len() - materialized,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn record() -> ImageRecord {
        ImageRecord {
            capture_id: capture_key(42),
            timestamp: Utc.with_ymd_and_hms(2019, 8, 9, 3, 15, 0).unwrap(),
            camera_label: "NIR_SV_90".to_string(),
            tile_id: 7,
            frame: 0,
            raw_blob_id: 1001,
            orientation: 0,
            dataformat: 4,
            width: 320,
            height: 256,
            label_fields: BTreeMap::new(),
        }
    }

    #[test]
    fn relative_path_uses_utc_date() {
        assert_eq!(
            record().relative_path(),
            "2019-08-09/snapshot42/NIR_SV_90_7_0.png"
        );
    }

    #[test]
    fn label_fields_are_flattened() {
        let mut image = record();
        image
            .label_fields
            .insert("angle".to_string(), "90".to_string());
        let json = serde_json::to_value(&image).unwrap();
        assert_eq!(json["angle"], "90");
        let back: ImageRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, image);
    }

    #[test]
    fn provenance_is_adopted_then_enforced() {
        let info = DatasetInfo {
            hostname: "host".to_string(),
            database: "db".to_string(),
            experiment: "DP1".to_string(),
        };
        let mut ledger = Ledger::default();
        ledger.ensure_provenance(&info).unwrap();
        assert_eq!(ledger.dataset, info);

        let other = DatasetInfo {
            experiment: "DP2".to_string(),
            ..info
        };
        assert!(matches!(
            ledger.ensure_provenance(&other),
            Err(PhenoError::LedgerMismatch { .. })
        ));
    }
}
