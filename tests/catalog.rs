mod common;

use chrono::{NaiveDate, NaiveDateTime};
use chrono_tz::America::Chicago;

use phenosync::catalog::{
    CaptureRow, CatalogClient, CatalogQuery, ImageRow, merge_captures, merge_images,
};
use phenosync::error::PhenoError;
use phenosync::labels::{LabelRules, label_to_fields};
use phenosync::ledger::Ledger;

use common::dataset_info;

fn timestamp(hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2019, 8, 8)
        .unwrap()
        .and_hms_opt(hour, 15, 0)
        .unwrap()
}

fn capture_row(id: i64, hour: u32) -> CaptureRow {
    CaptureRow {
        id,
        id_tag: Some(format!("Fp00{id}")),
        car_tag: Some("0001".to_string()),
        time_stamp: timestamp(hour),
        weight_before: Some(500.0),
        weight_after: Some(550.0),
        water_amount: Some(50.0),
        completed: Some(true),
    }
}

fn image_row(capture: CaptureRow, camera: &str, tile_id: i64, blob: i64) -> ImageRow {
    ImageRow {
        capture,
        camera_label: camera.to_string(),
        tile_id,
        frame: 0,
        raw_blob_id: blob,
        orientation: 2,
        dataformat: 4,
        width: 320,
        height: 256,
    }
}

fn rules() -> LabelRules {
    LabelRules::from_patterns([
        ("view", r"_(SV|TV)_"),
        ("angle", r"_(\d+)$"),
        ("wavelength", r"(\d+)nm"),
    ])
    .unwrap()
}

#[test]
fn captures_are_stored_in_utc() {
    let ledger = merge_captures(
        &Ledger::new(dataset_info()),
        &[capture_row(42, 22)],
        Chicago,
    );
    let event = &ledger.environment["snapshot42"];
    assert_eq!(event.timestamp.to_rfc3339(), "2019-08-09T03:15:00+00:00");
    assert_eq!(event.barcode.as_deref(), Some("Fp0042"));
}

#[test]
fn image_keys_use_utc_date_and_capture() {
    let rows = vec![image_row(capture_row(42, 22), "NIR_SV_90", 7, 1001)];
    let ledger = merge_images(&Ledger::new(dataset_info()), &rows, Chicago, &rules());
    let key = "2019-08-09/snapshot42/NIR_SV_90_7_0.png";
    let record = &ledger.images[key];
    assert_eq!(record.raw_blob_id, 1001);
    assert_eq!(record.orientation, 2);
    assert_eq!(record.label_fields["view"], "SV");
    assert_eq!(record.label_fields["angle"], "90");
    assert!(!record.label_fields.contains_key("wavelength"));
    // The joined row also records its capture.
    assert!(ledger.environment.contains_key("snapshot42"));
}

#[test]
fn merging_twice_is_idempotent() {
    let captures = vec![capture_row(1, 9), capture_row(2, 10)];
    let images = vec![
        image_row(capture_row(1, 9), "VIS_SV_0", 10, 100),
        image_row(capture_row(1, 9), "NIR_TV_0", 11, 101),
        image_row(capture_row(2, 10), "VIS_SV_0", 12, 102),
    ];
    let base = Ledger::new(dataset_info());
    let once = merge_images(&merge_captures(&base, &captures, Chicago), &images, Chicago, &rules());
    let twice = merge_images(&merge_captures(&once, &captures, Chicago), &images, Chicago, &rules());
    assert_eq!(once, twice);
    assert_eq!(once.images.len(), 3);
    assert_eq!(once.environment.len(), 2);
}

#[test]
fn existing_entries_are_never_overwritten() {
    let rows = vec![image_row(capture_row(42, 22), "NIR_SV_90", 7, 1001)];
    let mut ledger = merge_images(&Ledger::new(dataset_info()), &rows, Chicago, &rules());
    let key = "2019-08-09/snapshot42/NIR_SV_90_7_0.png".to_string();
    ledger.images.get_mut(&key).unwrap().raw_blob_id = 5;
    ledger
        .environment
        .get_mut("snapshot42")
        .unwrap()
        .water_amount = None;

    let mut changed = rows.clone();
    changed[0].raw_blob_id = 2002;
    changed[0].capture.water_amount = Some(99.0);
    let merged = merge_images(&ledger, &changed, Chicago, &rules());
    let merged = merge_captures(&merged, &[changed[0].capture.clone()], Chicago);

    assert_eq!(merged.images[&key].raw_blob_id, 5);
    assert_eq!(merged.environment["snapshot42"].water_amount, None);
}

#[test]
fn label_rules_apply_independently() {
    let fields = label_to_fields("VIS_TV_730nm_0", &rules());
    assert_eq!(fields.len(), 3);
    assert_eq!(fields["wavelength"], "730");
    assert_eq!(fields["angle"], "0");
    assert!(label_to_fields("", &rules()).is_empty());
}

struct MockCatalog {
    captures: Vec<CaptureRow>,
    images: Vec<ImageRow>,
    fail: bool,
}

impl CatalogClient for MockCatalog {
    fn capture_rows(&mut self, _experiment: &str) -> Result<Vec<CaptureRow>, PhenoError> {
        if self.fail {
            return Err(PhenoError::Catalog("connection refused".to_string()));
        }
        Ok(self.captures.clone())
    }

    fn image_rows(&mut self, _experiment: &str) -> Result<Vec<ImageRow>, PhenoError> {
        Ok(self.images.clone())
    }
}

#[test]
fn catalog_query_merges_through_client() {
    let client = MockCatalog {
        captures: vec![capture_row(7, 8), capture_row(8, 9)],
        images: vec![image_row(capture_row(7, 8), "VIS_SV_0", 70, 700)],
        fail: false,
    };
    let mut query = CatalogQuery::new(client, Chicago, rules());
    let ledger = query
        .query_captures(&Ledger::new(dataset_info()), "DP1")
        .unwrap();
    let ledger = query.query_images(&ledger, "DP1").unwrap();
    assert_eq!(ledger.environment.len(), 2);
    assert_eq!(ledger.images.len(), 1);
    assert_eq!(ledger.dataset, dataset_info());
}

#[test]
fn catalog_errors_propagate() {
    let client = MockCatalog {
        captures: Vec::new(),
        images: Vec::new(),
        fail: true,
    };
    let mut query = CatalogQuery::new(client, Chicago, rules());
    let err = query
        .query_captures(&Ledger::new(dataset_info()), "DP1")
        .unwrap_err();
    assert!(matches!(err, PhenoError::Catalog(_)));
}
