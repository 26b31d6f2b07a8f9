use std::collections::btree_map::Entry;

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use postgres::types::FromSql;
use postgres::{Client, NoTls, Row};
use tracing::{debug, info};

use crate::config::CatalogConnection;
use crate::error::PhenoError;
use crate::labels::{LabelRules, label_to_fields};
use crate::ledger::{CaptureEvent, ImageRecord, Ledger, capture_key};

const CAPTURES_SQL: &str = "SELECT snapshot.id::bigint AS id, \
    snapshot.id_tag::text AS id_tag, \
    snapshot.car_tag::text AS car_tag, \
    snapshot.time_stamp::timestamp AS time_stamp, \
    snapshot.weight_before::float8 AS weight_before, \
    snapshot.weight_after::float8 AS weight_after, \
    snapshot.water_amount::float8 AS water_amount, \
    snapshot.completed::boolean AS completed \
    FROM snapshot WHERE snapshot.measurement_label = $1";

const IMAGES_SQL: &str = "SELECT snapshot.id::bigint AS id, \
    snapshot.id_tag::text AS id_tag, \
    snapshot.car_tag::text AS car_tag, \
    snapshot.time_stamp::timestamp AS time_stamp, \
    snapshot.weight_before::float8 AS weight_before, \
    snapshot.weight_after::float8 AS weight_after, \
    snapshot.water_amount::float8 AS water_amount, \
    snapshot.completed::boolean AS completed, \
    tiled_image.camera_label::text AS camera_label, \
    tiled_image.id::bigint AS tile_id, \
    tile.frame::bigint AS frame, \
    tile.raw_image_oid::bigint AS raw_blob_id, \
    tile.rotate_flip_type::integer AS orientation, \
    tile.dataformat::integer AS dataformat, \
    tile.width::bigint AS width, \
    tile.height::bigint AS height \
    FROM snapshot \
    INNER JOIN tiled_image ON snapshot.id = tiled_image.snapshot_id \
    INNER JOIN tile ON tiled_image.id = tile.tiled_image_id \
    WHERE snapshot.measurement_label = $1";

/// Capture fields as returned by the catalog; the timestamp is naive local time.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRow {
    pub id: i64,
    pub id_tag: Option<String>,
    pub car_tag: Option<String>,
    pub time_stamp: NaiveDateTime,
    pub weight_before: Option<f64>,
    pub weight_after: Option<f64>,
    pub water_amount: Option<f64>,
    pub completed: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageRow {
    pub capture: CaptureRow,
    pub camera_label: String,
    pub tile_id: i64,
    pub frame: i64,
    pub raw_blob_id: i64,
    pub orientation: i32,
    pub dataformat: i32,
    pub width: u32,
    pub height: u32,
}

pub trait CatalogClient {
    fn capture_rows(&mut self, experiment: &str) -> Result<Vec<CaptureRow>, PhenoError>;
    fn image_rows(&mut self, experiment: &str) -> Result<Vec<ImageRow>, PhenoError>;
}

pub struct PgCatalogClient {
    client: Client,
}

impl PgCatalogClient {
    pub fn connect(connection: &CatalogConnection) -> Result<Self, PhenoError> {
        let client = postgres::Config::new()
            .host(&connection.hostname)
            .port(connection.port)
            .user(&connection.username)
            .password(&connection.password)
            .dbname(&connection.database)
            .connect(NoTls)
            .map_err(|err| PhenoError::Catalog(err.to_string()))?;
        Ok(Self { client })
    }

    fn query(&mut self, sql: &str, experiment: &str) -> Result<Vec<Row>, PhenoError> {
        self.client
            .query(sql, &[&experiment])
            .map_err(|err| PhenoError::Catalog(err.to_string()))
    }
}

impl CatalogClient for PgCatalogClient {
    fn capture_rows(&mut self, experiment: &str) -> Result<Vec<CaptureRow>, PhenoError> {
        self.query(CAPTURES_SQL, experiment)?
            .iter()
            .map(capture_from_row)
            .collect()
    }

    fn image_rows(&mut self, experiment: &str) -> Result<Vec<ImageRow>, PhenoError> {
        self.query(IMAGES_SQL, experiment)?
            .iter()
            .map(image_from_row)
            .collect()
    }
}

fn field<'a, T: FromSql<'a>>(row: &'a Row, name: &str) -> Result<T, PhenoError> {
    row.try_get(name).map_err(|err| PhenoError::CatalogRow {
        field: name.to_string(),
        message: err.to_string(),
    })
}

fn dimension(row: &Row, name: &str) -> Result<u32, PhenoError> {
    let value: i64 = field(row, name)?;
    u32::try_from(value).map_err(|_| PhenoError::CatalogRow {
        field: name.to_string(),
        message: format!("{value} is not a valid image dimension"),
    })
}

/// Camera labels become file names, so they may not carry path components.
fn checked_camera_label(label: String) -> Result<String, PhenoError> {
    if label.is_empty() || label == ".." || label.contains(['/', '\\', '\0']) {
        return Err(PhenoError::CatalogRow {
            field: "camera_label".to_string(),
            message: format!("{label:?} is not usable in a file name"),
        });
    }
    Ok(label)
}

fn capture_from_row(row: &Row) -> Result<CaptureRow, PhenoError> {
    Ok(CaptureRow {
        id: field(row, "id")?,
        id_tag: field(row, "id_tag")?,
        car_tag: field(row, "car_tag")?,
        time_stamp: field(row, "time_stamp")?,
        weight_before: field(row, "weight_before")?,
        weight_after: field(row, "weight_after")?,
        water_amount: field(row, "water_amount")?,
        completed: field(row, "completed")?,
    })
}

fn image_from_row(row: &Row) -> Result<ImageRow, PhenoError> {
    Ok(ImageRow {
        capture: capture_from_row(row)?,
        camera_label: checked_camera_label(field(row, "camera_label")?)?,
        tile_id: field(row, "tile_id")?,
        frame: field(row, "frame")?,
        raw_blob_id: field(row, "raw_blob_id")?,
        orientation: field(row, "orientation")?,
        dataformat: field(row, "dataformat")?,
        width: dimension(row, "width")?,
        height: dimension(row, "height")?,
    })
}

/// Tags a naive catalog timestamp with `tz` and converts it to UTC.
///
/// Ambiguous wall-clock times (end of daylight saving) resolve to the earlier
/// instant; times inside the spring-forward gap are shifted one hour later.
pub fn localize(naive: NaiveDateTime, tz: Tz) -> DateTime<Utc> {
    let local = tz
        .from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest());
    match local {
        Some(local) => local.with_timezone(&Utc),
        None => Utc.from_utc_datetime(&naive),
    }
}

fn capture_event(row: &CaptureRow, tz: Tz) -> CaptureEvent {
    CaptureEvent {
        id: row.id,
        barcode: row.id_tag.clone(),
        cartag: row.car_tag.clone(),
        timestamp: localize(row.time_stamp, tz),
        weight_before: row.weight_before,
        weight_after: row.weight_after,
        water_amount: row.water_amount,
        completed: row.completed,
    }
}

/// Adds capture events absent from `prior`; existing entries are left untouched.
pub fn merge_captures(prior: &Ledger, rows: &[CaptureRow], tz: Tz) -> Ledger {
    let mut ledger = prior.clone();
    for row in rows {
        if let Entry::Vacant(slot) = ledger.environment.entry(capture_key(row.id)) {
            slot.insert(capture_event(row, tz));
        }
    }
    ledger
}

/// Adds image records (and their captures, when unseen) absent from `prior`.
pub fn merge_images(prior: &Ledger, rows: &[ImageRow], tz: Tz, rules: &LabelRules) -> Ledger {
    let mut ledger = prior.clone();
    for row in rows {
        let capture_id = capture_key(row.capture.id);
        ledger
            .environment
            .entry(capture_id.clone())
            .or_insert_with(|| capture_event(&row.capture, tz));

        let record = ImageRecord {
            capture_id,
            timestamp: localize(row.capture.time_stamp, tz),
            camera_label: row.camera_label.clone(),
            tile_id: row.tile_id,
            frame: row.frame,
            raw_blob_id: row.raw_blob_id,
            orientation: row.orientation,
            dataformat: row.dataformat,
            width: row.width,
            height: row.height,
            label_fields: label_to_fields(&row.camera_label, rules),
        };
        if let Entry::Vacant(slot) = ledger.images.entry(record.relative_path()) {
            debug!(path = %slot.key(), "new image record");
            slot.insert(record);
        }
    }
    ledger
}

/// Catalog client bound to the source's time zone and label rules.
pub struct CatalogQuery<C: CatalogClient> {
    client: C,
    timezone: Tz,
    rules: LabelRules,
}

impl<C: CatalogClient> CatalogQuery<C> {
    pub fn new(client: C, timezone: Tz, rules: LabelRules) -> Self {
        Self {
            client,
            timezone,
            rules,
        }
    }

    pub fn query_captures(&mut self, prior: &Ledger, experiment: &str) -> Result<Ledger, PhenoError> {
        let rows = self.client.capture_rows(experiment)?;
        let merged = merge_captures(prior, &rows, self.timezone);
        info!(
            experiment,
            rows = rows.len(),
            added = merged.environment.len() - prior.environment.len(),
            "merged capture events"
        );
        Ok(merged)
    }

    pub fn query_images(&mut self, prior: &Ledger, experiment: &str) -> Result<Ledger, PhenoError> {
        let rows = self.client.image_rows(experiment)?;
        let merged = merge_images(prior, &rows, self.timezone, &self.rules);
        info!(
            experiment,
            rows = rows.len(),
            added = merged.images.len() - prior.images.len(),
            "merged image records"
        );
        Ok(merged)
    }
}
