//! JSON feed output.
//!
//! Each batch is written to `{output_dir}/{YYYY-MM-DD}/{HHMMSS}.json` (UTC,
//! from the run timestamp) and then copied over `{output_dir}/latest.json`.
//! Both files are replaced atomically.

use super::Sink;
use crate::error::SinkError;
use crate::models::RunBatch;
use crate::utils::write_atomic;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

const LATEST: &str = "latest.json";

#[derive(Debug, Clone)]
pub struct JsonFileSink {
    output_dir: PathBuf,
}

impl JsonFileSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Dated path for a batch started at `run_timestamp`.
    pub fn batch_path(&self, run_timestamp: DateTime<Utc>) -> PathBuf {
        self.output_dir
            .join(run_timestamp.format("%Y-%m-%d").to_string())
            .join(format!("{}.json", run_timestamp.format("%H%M%S")))
    }

    pub fn latest_path(&self) -> PathBuf {
        self.output_dir.join(LATEST)
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> SinkError + '_ {
    move |source| SinkError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[async_trait]
impl Sink for JsonFileSink {
    #[instrument(
        level = "info",
        skip_all,
        fields(
            output_dir = %self.output_dir.display(),
            articles = batch.articles().len(),
            errors = batch.errors().len()
        )
    )]
    async fn write(&self, batch: &RunBatch) -> Result<PathBuf, SinkError> {
        let json = serde_json::to_vec_pretty(batch)?;

        let path = self.batch_path(batch.run_timestamp());
        if let Some(dir) = path.parent() {
            if let Err(e) = fs::create_dir_all(dir).await {
                error!(dir = %dir.display(), error = %e, "Failed to create feed dir");
                return Err(io_error(dir)(e));
            }
        }

        write_atomic(&path, &json).await.map_err(io_error(&path))?;
        let latest = self.latest_path();
        if let Err(e) = write_atomic(&latest, &json).await {
            error!(path = %latest.display(), error = %e, "Failed to update latest feed; withdrawing batch file");
            if let Err(rm) = fs::remove_file(&path).await {
                error!(path = %path.display(), error = %rm, "Failed to withdraw batch file");
            }
            return Err(io_error(&latest)(e));
        }

        info!(path = %path.display(), bytes = json.len(), "Wrote JSON feed");
        Ok(path)
    }
}
