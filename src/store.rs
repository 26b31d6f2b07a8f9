use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::Builder;

use crate::error::PhenoError;
use crate::ledger::{DatasetInfo, Ledger};

pub const LEDGER_FILE: &str = "metadata.json";

/// On-disk layout of one dataset directory.
#[derive(Debug, Clone)]
pub struct DatasetLayout {
    root: Utf8PathBuf,
}

impl DatasetLayout {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn ledger_path(&self) -> Utf8PathBuf {
        self.root.join(LEDGER_FILE)
    }

    pub fn output_path(&self, key: &str) -> Utf8PathBuf {
        self.root.join(key)
    }

    pub fn staging_path(capture_dir: &Utf8Path, blob_id: i64) -> Utf8PathBuf {
        capture_dir.join(format!("blob{blob_id}"))
    }

    /// Creates the dataset root and an empty ledger when missing, then loads it.
    pub fn init(&self, info: &DatasetInfo) -> Result<Ledger, PhenoError> {
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| PhenoError::Filesystem(err.to_string()))?;
        if !self.ledger_path().as_std_path().exists() {
            self.save_ledger(&Ledger::new(info.clone()))?;
        }
        self.open(info)
    }

    /// Loads an existing ledger for `info` without creating or writing anything.
    pub fn open(&self, info: &DatasetInfo) -> Result<Ledger, PhenoError> {
        let mut ledger = self.load_ledger()?;
        ledger.ensure_provenance(info)?;
        Ok(ledger)
    }

    pub fn load_ledger(&self) -> Result<Ledger, PhenoError> {
        let path = self.ledger_path();
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| PhenoError::Filesystem(format!("read {path}: {err}")))?;
        serde_json::from_str(&content).map_err(|err| PhenoError::LedgerParse {
            path: path.to_string(),
            message: err.to_string(),
        })
    }

    pub fn save_ledger(&self, ledger: &Ledger) -> Result<(), PhenoError> {
        let mut content = serde_json::to_vec_pretty(ledger)
            .map_err(|err| PhenoError::Filesystem(err.to_string()))?;
        content.push(b'\n');
        Self::write_bytes_atomic(&self.ledger_path(), &content)
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), PhenoError> {
        let parent = path
            .parent()
            .ok_or_else(|| PhenoError::Filesystem(format!("invalid destination path {path}")))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| PhenoError::Filesystem(err.to_string()))?;
        let mut temp = Builder::new()
            .prefix(".phenosync")
            .suffix(".tmp")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| PhenoError::Filesystem(err.to_string()))?;
        temp.write_all(content)
            .map_err(|err| PhenoError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| PhenoError::Filesystem(err.to_string()))?;
        Ok(())
    }
}
