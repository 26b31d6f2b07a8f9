#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Cursor, Write};
use std::path::Path;
use std::sync::Mutex;

use chrono::{TimeZone, Utc};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use phenosync::domain::{FormatDescriptor, FormatTable, ImageKind, SampleType};
use phenosync::fetch::BlobStore;
use phenosync::ledger::{CaptureEvent, DatasetInfo, ImageRecord, Ledger, capture_key};

/// Wraps raw sample bytes the way the camera server stores them.
pub fn zip_payload(samples: &[u8]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file("data", SimpleFileOptions::default())
        .unwrap();
    writer.write_all(samples).unwrap();
    writer.finish().unwrap().into_inner()
}

pub fn u16_le(samples: &[u16]) -> Vec<u8> {
    samples.iter().flat_map(|value| value.to_le_bytes()).collect()
}

pub fn formats() -> FormatTable {
    [
        (
            0,
            FormatDescriptor::new(SampleType::Uint8, ImageKind::Mono, 8).unwrap(),
        ),
        (
            1,
            FormatDescriptor::new(SampleType::Uint8, ImageKind::Color, 8).unwrap(),
        ),
        (
            4,
            FormatDescriptor::new(SampleType::Uint16, ImageKind::Mono, 12).unwrap(),
        ),
    ]
    .into_iter()
    .collect()
}

pub fn dataset_info() -> DatasetInfo {
    DatasetInfo {
        hostname: "lemnatec.example.org".to_string(),
        database: "LTSystem".to_string(),
        experiment: "DP1".to_string(),
    }
}

pub fn image_record(blob_id: i64, dataformat: i32, width: u32, height: u32) -> ImageRecord {
    ImageRecord {
        capture_id: capture_key(42),
        timestamp: Utc.with_ymd_and_hms(2019, 8, 9, 3, 15, 0).unwrap(),
        camera_label: "VIS_SV_90".to_string(),
        tile_id: 7,
        frame: blob_id,
        raw_blob_id: blob_id,
        orientation: 0,
        dataformat,
        width,
        height,
        label_fields: BTreeMap::new(),
    }
}

pub fn ledger_with(records: Vec<ImageRecord>) -> Ledger {
    let mut ledger = Ledger::new(dataset_info());
    ledger.environment.insert(
        capture_key(42),
        CaptureEvent {
            id: 42,
            barcode: Some("Fp001AA123456".to_string()),
            cartag: Some("1234".to_string()),
            timestamp: Utc.with_ymd_and_hms(2019, 8, 9, 3, 15, 0).unwrap(),
            weight_before: Some(512.5),
            weight_after: Some(600.0),
            water_amount: Some(87.5),
            completed: Some(true),
        },
    );
    for record in records {
        ledger.images.insert(record.relative_path(), record);
    }
    ledger
}

/// Serves blobs from memory and records every remote path requested.
#[derive(Default)]
pub struct MockStore {
    pub blobs: BTreeMap<String, Vec<u8>>,
    pub calls: Mutex<Vec<String>>,
}

impl MockStore {
    pub fn with_blob(remote_path: &str, content: Vec<u8>) -> Self {
        let mut blobs = BTreeMap::new();
        blobs.insert(remote_path.to_string(), content);
        Self {
            blobs,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl BlobStore for MockStore {
    fn get(&self, remote_path: &str, local_path: &Path) -> io::Result<()> {
        self.calls.lock().unwrap().push(remote_path.to_string());
        match self.blobs.get(remote_path) {
            Some(content) => fs::write(local_path, content),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                "No such file",
            )),
        }
    }
}
