//! The double-buffered send loop.
//!
//! A pipeline owns two batch slots. New values accumulate in the
//! pending slot while at most one previously swapped-out batch drains
//! through the sender. The send future is handed back to the owning
//! task, which drives it and reports the outcome through
//! [`crate::set::PipelineSet::complete_send`]; the pipeline itself
//! never blocks the producer.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use snafu::Snafu;

use crate::batch::{BatchKey, KeyedBatch, OffsetBatch};
use crate::range::{Offset, OffsetRange};

/// Identifies a pipeline within its owning set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineId(pub(crate) usize);

/// Failure reported by a [`BatchSender`].
///
/// The message is forwarded to the host's error sink, so it should
/// describe what could not be persisted.
#[derive(Debug, Clone, Snafu)]
#[snafu(display("{message}"))]
pub struct SendError {
    message: String,
}

impl SendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Persists one coalesced batch. Implementations are shared by the
/// pipeline and its in-flight send futures.
#[async_trait]
pub trait BatchSender<K, V>: Send + Sync {
    async fn send(&self, batch: Arc<KeyedBatch<K, V>>) -> Result<(), SendError>;
}

/// Completion of an in-flight send, routed back to the owning set.
#[derive(Debug)]
pub struct SendOutcome {
    pub pipeline: PipelineId,
    pub result: Result<(), SendError>,
}

/// A running send. The owning task polls these (typically through a
/// `FuturesUnordered`) and feeds each outcome back to the set.
pub type SendTask = BoxFuture<'static, SendOutcome>;

struct InFlightBatch<K, V> {
    batch: Arc<KeyedBatch<K, V>>,
    offset: Offset,
}

/// A double-buffered batch pipeline bound to one sender.
pub struct BatchPipeline<K, V> {
    id: PipelineId,
    sender: Arc<dyn BatchSender<K, V>>,
    pending: OffsetBatch<K, V>,
    current: Option<InFlightBatch<K, V>>,
    range: OffsetRange,
    closed: bool,
}

impl<K, V> BatchPipeline<K, V>
where
    K: BatchKey,
    V: Send + Sync + 'static,
{
    pub(crate) fn new(id: PipelineId, sender: Arc<dyn BatchSender<K, V>>) -> Self {
        Self {
            id,
            sender,
            pending: OffsetBatch::new(),
            current: None,
            range: OffsetRange::empty(),
            closed: false,
        }
    }

    /// Accumulates a value and starts a send when none is in flight.
    ///
    /// Offsets must be non-decreasing across calls; the log delivery
    /// order guarantees this.
    pub fn add(&mut self, key: K, value: V, offset: Offset) -> Option<SendTask> {
        let was_empty = self.range.is_empty();
        debug_assert!(was_empty || offset >= self.range.head(), "offset went backwards");
        self.range.set_head(offset);
        if was_empty {
            // The new value is not durable yet, so the most the host
            // could checkpoint right now is the offset before it.
            self.range.set_tail(offset - 1);
        }
        self.pending.add(key, value, offset);
        self.start_send()
    }

    /// Swaps the pending batch into the in-flight slot and produces the
    /// send future, unless closed, already draining, or empty.
    fn start_send(&mut self) -> Option<SendTask> {
        if self.closed || self.current.is_some() {
            return None;
        }
        let (batch, offset) = self.pending.take()?;
        let batch = Arc::new(batch);
        self.current = Some(InFlightBatch {
            batch: Arc::clone(&batch),
            offset,
        });

        let sender = Arc::clone(&self.sender);
        let id = self.id;
        Some(Box::pin(async move {
            let result = sender.send(batch).await;
            SendOutcome {
                pipeline: id,
                result,
            }
        }))
    }

    /// Records a successful send: the completed batch becomes durable,
    /// the tail advances to its offset, and the next batch (if any)
    /// goes out immediately. A fully drained pipeline resets its tail
    /// so it stops holding the checkpoint back.
    pub(crate) fn complete_send(&mut self) -> (Offset, Option<SendTask>) {
        let in_flight = self
            .current
            .take()
            .expect("send completed with no batch in flight");
        self.range.set_tail(in_flight.offset);
        let next = self.start_send();
        if self.current.is_none() && self.pending.is_empty() {
            self.range.reset_tail();
        }
        (in_flight.offset, next)
    }

    /// Stops initiating sends. Values may still accumulate and an
    /// in-flight send completes naturally.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn id(&self) -> PipelineId {
        self.id
    }

    pub fn range(&self) -> OffsetRange {
        self.range
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// The batch currently draining, retained here when its send
    /// failed. Diagnostic inspection only.
    pub fn in_flight(&self) -> Option<(&KeyedBatch<K, V>, Offset)> {
        self.current
            .as_ref()
            .map(|in_flight| (in_flight.batch.as_ref(), in_flight.offset))
    }

    pub fn pending(&self) -> &OffsetBatch<K, V> {
        &self.pending
    }
}

impl<K, V> std::fmt::Debug for BatchPipeline<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchPipeline")
            .field("id", &self.id)
            .field("range", &self.range)
            .field("draining", &self.current.is_some())
            .field("closed", &self.closed)
            .finish()
    }
}
