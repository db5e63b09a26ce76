//! The checkpointed stream processor.
//!
//! Drains one partition of the message log: sequenced operations are
//! coalesced per document and bulk-written to the operation store,
//! everything else flows through a no-op pipeline so the checkpoint
//! still advances. All processor state is mutated from a single actor
//! task; see [`service::ProcessorService`].

pub mod error;
pub mod host;
pub mod message;
pub mod metrics;
pub mod processor;
pub mod sender;
pub mod service;

pub use error::ProcessorError;
pub use host::{HostContext, MemoryHostContext, TracingHostContext};
pub use message::{DocumentKey, IdleKey, LogEnvelope};
pub use processor::{OperationProcessor, ProcessorStats};
pub use service::{ProcessorClient, ProcessorService, run_background_processor};
