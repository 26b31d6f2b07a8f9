use std::fs;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

use crate::catalog::{CatalogClient, CatalogQuery};
use crate::decode::RawDecoder;
use crate::encode::write_png;
use crate::error::{MaterializeError, PhenoError};
use crate::fetch::{BlobStore, Fetcher};
use crate::ledger::{DatasetInfo, ImageRecord, Ledger};
use crate::store::DatasetLayout;

#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileOptions {
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileSummary {
    pub materialized: usize,
    pub skipped: usize,
    pub failed: usize,
    pub planned: usize,
    pub items: Vec<ImageResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageResult {
    pub path: String,
    pub action: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub key: String,
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Merges the catalog into the dataset ledger and persists it before any transfer.
pub fn refresh_ledger<C: CatalogClient>(
    layout: &DatasetLayout,
    query: &mut CatalogQuery<C>,
    info: &DatasetInfo,
) -> Result<Ledger, PhenoError> {
    let ledger = layout.init(info)?;
    let ledger = query.query_captures(&ledger, &info.experiment)?;
    let ledger = query.query_images(&ledger, &info.experiment)?;
    layout.save_ledger(&ledger)?;
    Ok(ledger)
}

/// Walks the ledger's image records and materializes the ones without an output file.
///
/// The ledger is only read here; it must be merged and saved before a pass
/// starts so an interrupted pass resumes from the same state.
pub struct Reconciler<B: BlobStore> {
    layout: DatasetLayout,
    fetcher: Fetcher<B>,
    decoder: RawDecoder,
}

impl<B: BlobStore> Reconciler<B> {
    pub fn new(layout: DatasetLayout, fetcher: Fetcher<B>, decoder: RawDecoder) -> Self {
        Self {
            layout,
            fetcher,
            decoder,
        }
    }

    pub fn run(
        &self,
        ledger: &Ledger,
        options: ReconcileOptions,
        sink: &dyn ProgressSink,
    ) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();

        for (key, record) in &ledger.images {
            let output = self.layout.output_path(key);
            if output.as_std_path().exists() {
                summary.skipped += 1;
                summary.items.push(ImageResult {
                    path: key.clone(),
                    action: "skipped".to_string(),
                    reason: None,
                });
                continue;
            }

            if options.dry_run {
                summary.planned += 1;
                summary.items.push(ImageResult {
                    path: key.clone(),
                    action: "planned".to_string(),
                    reason: None,
                });
                sink.event(ProgressEvent {
                    key: key.clone(),
                    message: format!(
                        "phase=Plan; would fetch {}",
                        self.fetcher
                            .remote_path(record.raw_blob_id, record.capture_date())
                    ),
                    elapsed: None,
                });
                continue;
            }

            let started = Instant::now();
            match self.materialize(key, record, sink) {
                Ok(()) => {
                    summary.materialized += 1;
                    summary.items.push(ImageResult {
                        path: key.clone(),
                        action: "materialized".to_string(),
                        reason: None,
                    });
                    sink.event(ProgressEvent {
                        key: key.clone(),
                        message: "phase=Done; materialized".to_string(),
                        elapsed: Some(started.elapsed()),
                    });
                }
                Err(err) => {
                    warn!(path = %key, error = %err, "image left pending");
                    summary.failed += 1;
                    summary.items.push(ImageResult {
                        path: key.clone(),
                        action: "failed".to_string(),
                        reason: Some(err.to_string()),
                    });
                    sink.event(ProgressEvent {
                        key: key.clone(),
                        message: format!("phase=Failed; {err}"),
                        elapsed: Some(started.elapsed()),
                    });
                }
            }
        }

        info!(
            materialized = summary.materialized,
            skipped = summary.skipped,
            failed = summary.failed,
            planned = summary.planned,
            "reconciliation pass finished"
        );
        summary
    }

    fn materialize(
        &self,
        key: &str,
        record: &ImageRecord,
        sink: &dyn ProgressSink,
    ) -> Result<(), MaterializeError> {
        let output = self.layout.output_path(key);
        let capture_dir = output
            .parent()
            .ok_or_else(|| MaterializeError::Io(format!("invalid output path {output}")))?;
        fs::create_dir_all(capture_dir.as_std_path())
            .map_err(|err| MaterializeError::Io(format!("create {capture_dir}: {err}")))?;

        sink.event(ProgressEvent {
            key: key.to_string(),
            message: format!("phase=Fetch; blob{}", record.raw_blob_id),
            elapsed: None,
        });
        let staged = self
            .fetcher
            .fetch(record.raw_blob_id, record.capture_date(), capture_dir)?;
        let payload = fs::read(staged.as_std_path())
            .map_err(|err| MaterializeError::Io(format!("read {staged}: {err}")))?;

        sink.event(ProgressEvent {
            key: key.to_string(),
            message: format!("phase=Decode; dataformat {}", record.dataformat),
            elapsed: None,
        });
        // On decode failure the staged blob stays in place.
        let decoded = self.decoder.decode_record(&payload, record)?;
        write_png(&decoded.raster, &output)?;

        if let Err(err) = fs::remove_file(staged.as_std_path()) {
            warn!(path = %staged, error = %err, "failed to remove staged blob");
        }
        Ok(())
    }
}
