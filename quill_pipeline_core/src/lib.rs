//! Double-buffered batching pipelines over a partitioned message log.
//!
//! A [`BatchPipeline`] coalesces values by routing key while a previous
//! batch drains to storage, keeping at most one send in flight. A
//! [`PipelineSet`] owns several pipelines sharing one log stream and
//! derives the highest offset that is safe to checkpoint from their
//! offset ranges.

pub mod batch;
pub mod pipeline;
pub mod range;
pub mod set;

pub use batch::{BatchKey, KeyedBatch, OffsetBatch};
pub use pipeline::{BatchPipeline, BatchSender, PipelineId, SendError, SendOutcome, SendTask};
pub use range::{OFFSET_NEG_INFINITY, Offset, OffsetRange};
pub use set::{CompletionEvents, PipelineHandle, PipelineSet};
