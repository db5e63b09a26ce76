//! The actor task that owns the processor.
//!
//! Every mutation of processor state happens on this task: inbound
//! messages from the client, completions of in-flight sends, and the
//! resulting host callbacks. Sends themselves are ordinary futures
//! driven by the task's `FuturesUnordered`.

use std::sync::Arc;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use quill_store::{ContentStore, OperationStore};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::{ProcessorError, Result};
use crate::host::HostContext;
use crate::message::LogEnvelope;
use crate::processor::{OperationProcessor, ProcessorStats};

const INBOX_CAPACITY: usize = 100;

pub struct ProcessorService {
    tx: mpsc::Sender<LogEnvelope>,
    rx: mpsc::Receiver<LogEnvelope>,
    processor: OperationProcessor,
}

/// Handle the log reader uses to deliver messages to the processor
/// task.
#[derive(Clone)]
pub struct ProcessorClient {
    tx: mpsc::Sender<LogEnvelope>,
}

/// Runs the processor until cancelled or until every client is
/// dropped, then drains in-flight sends.
pub async fn run_background_processor(
    service: ProcessorService,
    ct: CancellationToken,
) -> ProcessorStats {
    service.run(ct).await
}

impl ProcessorService {
    pub fn new(
        operations: Arc<dyn OperationStore>,
        contents: Option<Arc<dyn ContentStore>>,
        host: Arc<dyn HostContext>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        Self {
            tx,
            rx,
            processor: OperationProcessor::new(operations, contents, host),
        }
    }

    pub fn client(&self) -> ProcessorClient {
        ProcessorClient {
            tx: self.tx.clone(),
        }
    }

    async fn run(self, ct: CancellationToken) -> ProcessorStats {
        let Self {
            tx,
            mut rx,
            mut processor,
        } = self;
        // Only clients keep the inbox open from here on, so dropping
        // the last client shuts the task down.
        drop(tx);

        let mut send_tasks = FuturesUnordered::new();

        loop {
            tokio::select! {
                _ = ct.cancelled() => {
                    info!("shutdown requested");
                    break;
                }
                envelope = rx.recv() => {
                    let Some(envelope) = envelope else {
                        break;
                    };
                    if let Some(task) = processor.handle(envelope) {
                        send_tasks.push(task);
                    }
                }
                Some(outcome) = send_tasks.next(), if !send_tasks.is_empty() => {
                    if let Some(task) = processor.complete_send(outcome) {
                        send_tasks.push(task);
                    }
                }
            }
        }

        processor.close();

        // In-flight sends complete naturally; their completions still
        // advance ranges and may emit a final checkpoint.
        while let Some(outcome) = send_tasks.next().await {
            if let Some(task) = processor.complete_send(outcome) {
                send_tasks.push(task);
            }
        }

        let stats = processor.stats();
        info!(
            sequenced = stats.sequenced_operations,
            idle = stats.idle_messages,
            dropped = stats.parse_failures,
            "processor stopped"
        );
        stats
    }
}

impl ProcessorClient {
    /// Delivers one log message to the processor task, applying the
    /// inbox's backpressure.
    pub async fn deliver(&self, envelope: LogEnvelope) -> Result<()> {
        self.tx
            .send(envelope)
            .await
            .map_err(|_| ProcessorError::Stopped)
    }
}
