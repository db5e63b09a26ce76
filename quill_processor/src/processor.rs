//! Message classification and routing across the pipeline set.

use std::sync::Arc;

use quill_pipeline_core::{
    KeyedBatch, Offset, PipelineHandle, PipelineSet, SendOutcome, SendTask,
};
use quill_store::{ContentStore, OperationDocument, OperationStore};
use tracing::warn;

use crate::error::ProcessorError;
use crate::host::HostContext;
use crate::message::{self, DocumentKey, IdleKey, LogEnvelope, RoutedMessage};
use crate::metrics::ProcessorMetrics;
use crate::sender::{IdleSender, OperationStoreSender};

/// Counters for one processor run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessorStats {
    pub sequenced_operations: u64,
    pub idle_messages: u64,
    pub parse_failures: u64,
    pub batches_completed: u64,
}

/// The processor core: classifies inbound messages, routes them to the
/// primary or idle pipeline, and forwards checkpoint and error events
/// to the host.
///
/// All methods must be called from a single task; the send futures
/// they return are the only work that may run elsewhere.
pub struct OperationProcessor {
    set: PipelineSet,
    primary: PipelineHandle<DocumentKey, OperationDocument>,
    idle: PipelineHandle<IdleKey, ()>,
    host: Arc<dyn HostContext>,
    metrics: ProcessorMetrics,
    stats: ProcessorStats,
    failed: bool,
}

impl OperationProcessor {
    pub fn new(
        operations: Arc<dyn OperationStore>,
        contents: Option<Arc<dyn ContentStore>>,
        host: Arc<dyn HostContext>,
    ) -> Self {
        let metrics = ProcessorMetrics::default();
        let mut set = PipelineSet::new();
        let primary = set.create_pipeline::<DocumentKey, OperationDocument>(Arc::new(
            OperationStoreSender::new(operations, contents, metrics.clone()),
        ));
        let idle = set.create_pipeline::<IdleKey, ()>(Arc::new(IdleSender));

        Self {
            set,
            primary,
            idle,
            host,
            metrics,
            stats: ProcessorStats::default(),
            failed: false,
        }
    }

    /// Classifies one log message and routes it to a pipeline.
    ///
    /// Undecodable payloads are logged and dropped without touching any
    /// pipeline, so the checkpoint stays pinned until a later
    /// well-formed message advances it.
    pub fn handle(&mut self, envelope: LogEnvelope) -> Option<SendTask> {
        if self.failed {
            return None;
        }

        match message::route(&envelope.value) {
            Ok(RoutedMessage::Sequenced { key, document }) => {
                self.stats.sequenced_operations += 1;
                self.metrics.sequenced_operations.add(1, &[]);
                self.set.add(self.primary, key, document, envelope.offset)
            }
            Ok(RoutedMessage::Idle) => {
                self.stats.idle_messages += 1;
                self.set.add(self.idle, IdleKey, (), envelope.offset)
            }
            Err(error) => {
                self.stats.parse_failures += 1;
                self.metrics.dropped_messages.add(1, &[]);
                warn!(offset = envelope.offset, %error, "dropping undecodable log message");
                None
            }
        }
    }

    /// Applies a send completion: forwards any checkpoint advance to
    /// the host and hands back the follow-up send, or reports a fatal
    /// error exactly once and goes silent until the host restarts us.
    pub fn complete_send(&mut self, outcome: SendOutcome) -> Option<SendTask> {
        if self.failed {
            return None;
        }

        match self.set.complete_send(outcome) {
            Ok(events) => {
                self.stats.batches_completed += 1;
                if let Some(offset) = events.checkpoint {
                    self.metrics.checkpoint_offset.record(offset, &[]);
                    self.host.checkpoint(offset);
                }
                events.next_send
            }
            Err(source) => {
                self.failed = true;
                self.host.error(ProcessorError::Persist { source }, true);
                None
            }
        }
    }

    /// Stops all pipelines from starting new sends. In-flight sends
    /// complete naturally and still go through [`Self::complete_send`].
    pub fn close(&mut self) {
        self.set.close();
    }

    pub fn stats(&self) -> ProcessorStats {
        self.stats
    }

    /// The last checkpoint offset derived for this stream.
    pub fn last_offset(&self) -> Offset {
        self.set.last_offset()
    }

    /// The primary batch retained in flight, present after a storage
    /// failure until the host restarts the processor. Diagnostic
    /// inspection only.
    pub fn primary_in_flight(&self) -> Option<(&KeyedBatch<DocumentKey, OperationDocument>, Offset)>
    {
        self.set.pipeline(self.primary).in_flight()
    }
}
