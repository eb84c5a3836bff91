//! Feed output.
//!
//! The orchestrator hands every sealed [`RunBatch`] to a [`Sink`]. The only
//! production sink is [`json::JsonFileSink`]:
//!
//! ```text
//! output_dir/
//! ├── 2025-05-06/
//! │   ├── 080000.json
//! │   └── 090000.json
//! └── latest.json        # copy of the newest batch
//! ```

use crate::error::SinkError;
use crate::models::RunBatch;
use async_trait::async_trait;
use std::path::PathBuf;

pub mod json;

/// Destination for sealed run batches.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Persist `batch`, returning where it was written.
    ///
    /// A failed write must leave any previously published feed untouched.
    async fn write(&self, batch: &RunBatch) -> Result<PathBuf, SinkError>;
}
