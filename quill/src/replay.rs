//! Replays a captured slice of the message log through the processor
//! against in-memory stores. Useful for inspecting how a stream of
//! operations batches, checkpoints and normalizes without a real
//! deployment behind it.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use quill_processor::{
    LogEnvelope, ProcessorService, TracingHostContext, run_background_processor,
};
use quill_store::{ContentStore, InMemoryContentStore, InMemoryOperationStore};
use serde::Deserialize;
use snafu::ResultExt;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::{DeliverSnafu, ProcessorTaskSnafu, ReadInputSnafu, Result};

#[derive(Debug, clap::Args)]
pub struct ReplayArgs {
    /// JSON-lines input: either `{"offset": n, "value": {...}}` per
    /// line, or bare payloads that get sequential offsets.
    #[arg(long)]
    input: PathBuf,

    /// Offset assigned to the first bare payload line.
    #[arg(long, default_value_t = 0)]
    start_offset: i64,
}

/// An envelope as written by log capture tooling.
#[derive(Debug, Deserialize)]
struct FileEnvelope {
    offset: i64,
    value: serde_json::Value,
}

impl ReplayArgs {
    pub async fn run(self, ct: CancellationToken) -> Result<()> {
        let operations = Arc::new(InMemoryOperationStore::new());
        let contents = Arc::new(InMemoryContentStore::new());
        let host = Arc::new(TracingHostContext);

        let service =
            ProcessorService::new(operations.clone(), Some(contents as Arc<dyn ContentStore>), host);
        let client = service.client();
        let task = tokio::spawn(run_background_processor(service, ct.clone()));

        let file = File::open(&self.input).await.context(ReadInputSnafu {
            path: &self.input,
        })?;
        let mut lines = BufReader::new(file).lines();

        let mut next_offset = self.start_offset;
        let mut delivered = 0u64;
        while let Some(line) = lines.next_line().await.context(ReadInputSnafu {
            path: &self.input,
        })? {
            if ct.is_cancelled() {
                break;
            }
            if line.trim().is_empty() {
                continue;
            }
            let envelope = parse_line(&line, &mut next_offset);
            client.deliver(envelope).await.context(DeliverSnafu)?;
            delivered += 1;
        }

        info!(delivered, "replay input exhausted, draining");
        drop(client);
        let stats = task.await.context(ProcessorTaskSnafu)?;

        info!(
            sequenced = stats.sequenced_operations,
            idle = stats.idle_messages,
            dropped = stats.parse_failures,
            batches = stats.batches_completed,
            stored = operations.len(),
            "replay complete"
        );
        Ok(())
    }
}

fn parse_line(line: &str, next_offset: &mut i64) -> LogEnvelope {
    if let Ok(envelope) = serde_json::from_str::<FileEnvelope>(line) {
        *next_offset = envelope.offset + 1;
        return LogEnvelope {
            offset: envelope.offset,
            value: envelope.value.to_string().into_bytes().into(),
        };
    }

    // Bare payload line. Undecodable lines flow through as-is so the
    // processor's own drop path handles them.
    let offset = *next_offset;
    *next_offset += 1;
    LogEnvelope {
        offset,
        value: Bytes::copy_from_slice(line.as_bytes()),
    }
}
