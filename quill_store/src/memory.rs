//! In-memory implementations of the store contracts.
//!
//! These keep everything in process memory and are primarily intended
//! for testing and development. The operation store enforces a unique
//! index on `(tenant, document, sequenceNumber)`, matching the unique
//! index a real deployment puts on the operation collection.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::error::{StoreError, StoreResult};
use crate::types::{ContentFilter, ContentRecord, OperationDocument, SequenceNumberUpdate};
use crate::{ContentStore, OperationStore};

/// In-memory operation store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOperationStore {
    /// Maps `(tenant, document)` to operations ordered by sequence number.
    documents: Arc<DashMap<(String, String), BTreeMap<i64, OperationDocument>>>,
}

impl InMemoryOperationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Operations stored for one document, in sequence-number order.
    pub fn operations(&self, tenant_id: &str, document_id: &str) -> Vec<OperationDocument> {
        self.documents
            .get(&(tenant_id.to_string(), document_id.to_string()))
            .map(|entry| entry.value().values().cloned().collect())
            .unwrap_or_default()
    }

    /// Total number of stored operations across all documents.
    pub fn len(&self) -> usize {
        self.documents.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl OperationStore for InMemoryOperationStore {
    async fn insert_many(&self, documents: &[OperationDocument], ordered: bool) -> StoreResult<()> {
        let mut duplicate = false;
        for document in documents {
            let key = (document.tenant_id.clone(), document.document_id.clone());
            let mut stored = self.documents.entry(key).or_default();
            match stored.entry(document.operation.sequence_number) {
                Entry::Occupied(_) => {
                    duplicate = true;
                    if ordered {
                        break;
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(document.clone());
                }
            }
        }

        if duplicate {
            return Err(StoreError::DuplicateKey);
        }
        Ok(())
    }
}

/// In-memory content store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryContentStore {
    records: Arc<DashMap<ContentFilter, ContentRecord>>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a content record, standing in for the out-of-band content
    /// write that happens before sequencing.
    pub fn insert(&self, filter: ContentFilter, contents: Value) {
        self.records.insert(
            filter,
            ContentRecord {
                contents,
                sequence_number: None,
            },
        );
    }

    pub fn record(&self, filter: &ContentFilter) -> Option<ContentRecord> {
        self.records.get(filter).map(|record| record.value().clone())
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn update(
        &self,
        filter: ContentFilter,
        update: SequenceNumberUpdate,
        upsert: bool,
    ) -> StoreResult<()> {
        if let Some(mut record) = self.records.get_mut(&filter) {
            record.sequence_number = Some(update.sequence_number);
            return Ok(());
        }

        if upsert {
            self.records.insert(
                filter,
                ContentRecord {
                    contents: Value::Null,
                    sequence_number: Some(update.sequence_number),
                },
            );
        }
        Ok(())
    }
}
