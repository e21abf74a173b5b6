use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

const TIMESTAMP_FORMAT: &str = "%d.%m.%Y %H:%M:%S";

/// Append-only text log of rate lookups.
///
/// Each append opens the file, writes one whole block and closes it again.
/// Appends are serialised so blocks from concurrent sessions never interleave.
#[derive(Debug)]
pub struct ActivityLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ActivityLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ActivityLog {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, text: &str) -> std::io::Result<()> {
        self.append_at(Local::now().naive_local(), text).await
    }

    pub async fn append_at(&self, timestamp: NaiveDateTime, text: &str) -> std::io::Result<()> {
        let block = format!("{}\n{}\n\n", timestamp.format(TIMESTAMP_FORMAT), text);

        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(block.as_bytes()).await?;
        file.flush().await?;
        debug!("appended {} bytes to {}", block.len(), self.path.display());
        Ok(())
    }
}
