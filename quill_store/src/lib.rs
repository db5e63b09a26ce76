//! Contracts for the durable stores behind the processor.
//!
//! The operation store receives every sequenced operation as a bulk
//! insert; the content store holds operation contents that were
//! persisted out-of-band and only needs sequence numbers stamped onto
//! existing records. Both stores signal duplicate-key collisions
//! distinguishably, because replays after a restart are expected and
//! benign.

pub mod error;
pub mod memory;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use memory::{InMemoryContentStore, InMemoryOperationStore};
pub use types::{
    ContentFilter, ContentRecord, OperationDocument, SEQUENCED_OPERATION_TYPE, SequenceNumberUpdate,
    SequencedOperation,
};

use async_trait::async_trait;

/// The durable home of sequenced operations.
#[async_trait]
pub trait OperationStore: Send + Sync {
    /// Bulk-inserts operation documents.
    ///
    /// With `ordered` false, every non-duplicate document is applied
    /// and a duplicate-key error is reported afterwards; with `ordered`
    /// true, the insert stops at the first duplicate. Either way the
    /// duplicate is reported as [`StoreError::DuplicateKey`].
    async fn insert_many(&self, documents: &[OperationDocument], ordered: bool) -> StoreResult<()>;
}

/// Conditional updates against out-of-band operation contents.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Stamps the authoritative sequence number onto the record
    /// matching `filter`. Matching nothing without `upsert` is a no-op.
    async fn update(
        &self,
        filter: ContentFilter,
        update: SequenceNumberUpdate,
        upsert: bool,
    ) -> StoreResult<()>;
}
