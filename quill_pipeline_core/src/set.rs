//! A set of pipelines sharing one log stream, and the checkpoint math
//! that spans them.

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::batch::BatchKey;
use crate::pipeline::{BatchPipeline, BatchSender, PipelineId, SendError, SendOutcome, SendTask};
use crate::range::{Offset, OffsetRange};

/// Typed access to a pipeline owned by a [`PipelineSet`].
pub struct PipelineHandle<K, V> {
    id: PipelineId,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> Clone for PipelineHandle<K, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K, V> Copy for PipelineHandle<K, V> {}

impl<K, V> std::fmt::Debug for PipelineHandle<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PipelineHandle").field(&self.id).finish()
    }
}

/// Object-safe view of a pipeline, so heterogeneously keyed pipelines
/// can live in one set.
trait AnyPipeline: Send {
    fn range(&self) -> OffsetRange;
    fn close(&mut self);
    fn complete_send(&mut self) -> (Offset, Option<SendTask>);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<K, V> AnyPipeline for BatchPipeline<K, V>
where
    K: BatchKey,
    V: Send + Sync + 'static,
{
    fn range(&self) -> OffsetRange {
        BatchPipeline::range(self)
    }

    fn close(&mut self) {
        BatchPipeline::close(self);
    }

    fn complete_send(&mut self) -> (Offset, Option<SendTask>) {
        BatchPipeline::complete_send(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// What a successful send completion produced.
pub struct CompletionEvents {
    /// Offset of the batch that just became durable.
    pub work_complete: Offset,
    /// Follow-up send for the batch that accumulated meanwhile.
    pub next_send: Option<SendTask>,
    /// New checkpoint offset, present only when it advanced.
    pub checkpoint: Option<Offset>,
}

impl std::fmt::Debug for CompletionEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionEvents")
            .field("work_complete", &self.work_complete)
            .field("next_send", &self.next_send.is_some())
            .field("checkpoint", &self.checkpoint)
            .finish()
    }
}

/// Owns the pipelines draining one log stream and derives the offset
/// that is safe to checkpoint across all of them.
pub struct PipelineSet {
    pipelines: Vec<Box<dyn AnyPipeline>>,
    last_offset: Offset,
}

impl PipelineSet {
    pub fn new() -> Self {
        Self {
            pipelines: Vec::new(),
            last_offset: crate::range::OFFSET_NEG_INFINITY,
        }
    }

    /// Adds a pipeline draining through `sender` and returns its typed
    /// handle.
    pub fn create_pipeline<K, V>(
        &mut self,
        sender: Arc<dyn BatchSender<K, V>>,
    ) -> PipelineHandle<K, V>
    where
        K: BatchKey,
        V: Send + Sync + 'static,
    {
        let id = PipelineId(self.pipelines.len());
        self.pipelines.push(Box::new(BatchPipeline::new(id, sender)));
        PipelineHandle {
            id,
            _marker: PhantomData,
        }
    }

    /// Routes a value into the pipeline behind `handle`.
    pub fn add<K, V>(
        &mut self,
        handle: PipelineHandle<K, V>,
        key: K,
        value: V,
        offset: Offset,
    ) -> Option<SendTask>
    where
        K: BatchKey,
        V: Send + Sync + 'static,
    {
        self.pipeline_mut(handle).add(key, value, offset)
    }

    /// Applies a send completion. On success the pipeline settles
    /// (drains or re-swaps) and the checkpoint is recomputed; on
    /// failure the error is handed back and the failed pipeline keeps
    /// its in-flight batch untouched.
    pub fn complete_send(&mut self, outcome: SendOutcome) -> Result<CompletionEvents, SendError> {
        let SendOutcome { pipeline, result } = outcome;
        result?;

        let (work_complete, next_send) = self.pipelines[pipeline.0].complete_send();
        let checkpoint = self.recompute();
        Ok(CompletionEvents {
            work_complete,
            next_send,
            checkpoint,
        })
    }

    /// Derives the checkpoint offset from the pipeline ranges.
    ///
    /// The safe offset is the tail of the union across all pipelines:
    /// every offset at or below it has been persisted by every pipeline
    /// that saw it. Once nothing is outstanding anywhere, the union is
    /// empty and the checkpoint advances to the highest offset any
    /// pipeline has ever seen.
    fn recompute(&mut self) -> Option<Offset> {
        let mut max_head = self.last_offset;
        let mut union = OffsetRange::empty();
        for pipeline in &self.pipelines {
            let range = pipeline.range();
            max_head = max_head.max(range.head());
            union = OffsetRange::union(union, range);
        }

        let offset = if union.is_empty() {
            max_head
        } else {
            union.tail()
        };
        assert!(
            offset >= self.last_offset,
            "checkpoint offset regressed from {} to {offset}",
            self.last_offset
        );

        if offset == self.last_offset {
            return None;
        }
        self.last_offset = offset;
        Some(offset)
    }

    /// Closes every pipeline. In-flight sends complete naturally and
    /// still feed [`Self::complete_send`].
    pub fn close(&mut self) {
        for pipeline in &mut self.pipelines {
            pipeline.close();
        }
    }

    /// The last checkpoint offset derived for this stream.
    pub fn last_offset(&self) -> Offset {
        self.last_offset
    }

    pub fn pipeline<K, V>(&self, handle: PipelineHandle<K, V>) -> &BatchPipeline<K, V>
    where
        K: BatchKey,
        V: Send + Sync + 'static,
    {
        self.pipelines[handle.id.0]
            .as_any()
            .downcast_ref()
            .expect("pipeline handle does not match the pipeline's key and value types")
    }

    fn pipeline_mut<K, V>(&mut self, handle: PipelineHandle<K, V>) -> &mut BatchPipeline<K, V>
    where
        K: BatchKey,
        V: Send + Sync + 'static,
    {
        self.pipelines[handle.id.0]
            .as_any_mut()
            .downcast_mut()
            .expect("pipeline handle does not match the pipeline's key and value types")
    }
}

impl Default for PipelineSet {
    fn default() -> Self {
        Self::new()
    }
}
