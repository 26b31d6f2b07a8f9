use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDate;
use tracing::debug;

use crate::config::{ResolvedConfig, Transport};
use crate::error::TransferFailure;
use crate::store::DatasetLayout;

/// Byte-stream provider addressed by remote path.
pub trait BlobStore {
    fn get(&self, remote_path: &str, local_path: &Path) -> io::Result<()>;
}

impl<B: BlobStore + ?Sized> BlobStore for &B {
    fn get(&self, remote_path: &str, local_path: &Path) -> io::Result<()> {
        (**self).get(remote_path, local_path)
    }
}

/// Copies blobs with the system `scp` binary; authentication is key based.
#[derive(Debug, Clone)]
pub struct ScpBlobStore {
    program: PathBuf,
    user: String,
    host: String,
}

impl ScpBlobStore {
    pub fn new(user: &str, host: &str) -> Self {
        Self {
            program: find_in_path("scp").unwrap_or_else(|| PathBuf::from("scp")),
            user: user.to_string(),
            host: host.to_string(),
        }
    }
}

impl BlobStore for ScpBlobStore {
    fn get(&self, remote_path: &str, local_path: &Path) -> io::Result<()> {
        let output = Command::new(&self.program)
            .args(["-q", "-o", "BatchMode=yes"])
            .arg(format!("{}@{}:{}", self.user, self.host, remote_path))
            .arg(local_path)
            .output()?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            format!("scp exited with {}", output.status)
        } else {
            stderr
        };
        Err(io::Error::other(message))
    }
}

/// Reads blobs from a local mount of the remote store root.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    mount: Utf8PathBuf,
    remote_root: String,
}

impl LocalBlobStore {
    /// `mount` replaces `remote_root` as the prefix of every remote path.
    pub fn new(mount: Utf8PathBuf, remote_root: &str) -> Self {
        Self {
            mount,
            remote_root: remote_root.trim_end_matches('/').to_string(),
        }
    }

    fn resolve(&self, remote_path: &str) -> Utf8PathBuf {
        let relative = remote_path
            .strip_prefix(&self.remote_root)
            .unwrap_or(remote_path)
            .trim_start_matches('/');
        self.mount.join(relative)
    }
}

impl BlobStore for LocalBlobStore {
    fn get(&self, remote_path: &str, local_path: &Path) -> io::Result<()> {
        fs::copy(self.resolve(remote_path).as_std_path(), local_path).map(|_| ())
    }
}

/// Runtime-selected store for the binary.
pub enum ConfiguredStore {
    Scp(ScpBlobStore),
    Local(LocalBlobStore),
}

impl ConfiguredStore {
    pub fn from_config(config: &ResolvedConfig) -> Self {
        match &config.transport {
            Transport::Scp { user, host } => ConfiguredStore::Scp(ScpBlobStore::new(user, host)),
            Transport::Local { root } => {
                ConfiguredStore::Local(LocalBlobStore::new(root.clone(), &config.remote_root))
            }
        }
    }
}

impl BlobStore for ConfiguredStore {
    fn get(&self, remote_path: &str, local_path: &Path) -> io::Result<()> {
        match self {
            ConfiguredStore::Scp(store) => store.get(remote_path, local_path),
            ConfiguredStore::Local(store) => store.get(remote_path, local_path),
        }
    }
}

/// Stages raw blobs from `{root}/{dataset}/{UTCDate}/blob{id}`.
pub struct Fetcher<B: BlobStore> {
    store: B,
    remote_root: String,
    dataset: String,
}

impl<B: BlobStore> Fetcher<B> {
    pub fn new(store: B, remote_root: &str, dataset: &str) -> Self {
        Self {
            store,
            remote_root: remote_root.trim_end_matches('/').to_string(),
            dataset: dataset.to_string(),
        }
    }

    pub fn remote_path(&self, blob_id: i64, date: NaiveDate) -> String {
        format!(
            "{}/{}/{}/blob{blob_id}",
            self.remote_root,
            self.dataset,
            date.format("%Y-%m-%d")
        )
    }

    pub fn fetch(
        &self,
        blob_id: i64,
        date: NaiveDate,
        staging_dir: &Utf8Path,
    ) -> Result<Utf8PathBuf, TransferFailure> {
        let remote_path = self.remote_path(blob_id, date);
        let local_path = DatasetLayout::staging_path(staging_dir, blob_id);
        debug!(remote = %remote_path, local = %local_path, "staging raw blob");
        self.store
            .get(&remote_path, local_path.as_std_path())
            .map_err(|err| TransferFailure {
                remote_path: remote_path.clone(),
                reason: err.to_string(),
            })?;
        Ok(local_path)
    }
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}
