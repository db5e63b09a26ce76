//! The batch senders bound to the processor's pipelines.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use futures::try_join;
use quill_pipeline_core::{BatchSender, KeyedBatch, SendError};
use quill_store::{
    ContentFilter, ContentStore, OperationDocument, OperationStore, SequenceNumberUpdate,
    StoreResult,
};
use tracing::debug;

use crate::message::{DocumentKey, IdleKey};
use crate::metrics::ProcessorMetrics;

/// Persists coalesced operation batches: one bulk insert per document
/// group, plus sequence-number stamps for split operations.
pub struct OperationStoreSender {
    operations: Arc<dyn OperationStore>,
    contents: Option<Arc<dyn ContentStore>>,
    metrics: ProcessorMetrics,
}

impl OperationStoreSender {
    pub fn new(
        operations: Arc<dyn OperationStore>,
        contents: Option<Arc<dyn ContentStore>>,
        metrics: ProcessorMetrics,
    ) -> Self {
        Self {
            operations,
            contents,
            metrics,
        }
    }

    async fn persist_group(
        &self,
        key: &DocumentKey,
        documents: &[OperationDocument],
    ) -> StoreResult<()> {
        let inserts = async {
            // Unordered so a replayed duplicate does not block the rest
            // of the group.
            swallow_duplicates(self.operations.insert_many(documents, false).await)
        };

        let content_updates = async {
            let Some(contents) = self.contents.as_ref() else {
                return Ok(());
            };
            let updates = documents
                .iter()
                .filter(|document| document.operation.is_split())
                .filter_map(|document| {
                    let client_id = document.operation.client_id.clone()?;
                    Some(async move {
                        let filter = ContentFilter {
                            tenant_id: document.tenant_id.clone(),
                            document_id: document.document_id.clone(),
                            client_id,
                            client_sequence_number: document.operation.client_sequence_number,
                        };
                        let update = SequenceNumberUpdate {
                            sequence_number: document.operation.sequence_number,
                        };
                        swallow_duplicates(contents.update(filter, update, false).await)
                    })
                });
            try_join_all(updates).await?;
            Ok(())
        };

        try_join!(inserts, content_updates)?;

        debug!(
            tenant_id = %key.tenant_id,
            document_id = %key.document_id,
            operations = documents.len(),
            "persisted operation group"
        );
        self.metrics
            .operations_written
            .add(documents.len() as u64, &[]);
        Ok(())
    }
}

#[async_trait]
impl BatchSender<DocumentKey, OperationDocument> for OperationStoreSender {
    async fn send(
        &self,
        batch: Arc<KeyedBatch<DocumentKey, OperationDocument>>,
    ) -> Result<(), SendError> {
        batch
            .map(|key, documents| self.persist_group(key, documents))
            .await
            .map_err(|error| SendError::new(error.to_string()))?;
        self.metrics.batches_written.add(1, &[]);
        Ok(())
    }
}

/// Sender for the idle pipeline: completion is immediate, so
/// non-persisted traffic still advances the checkpoint.
pub struct IdleSender;

#[async_trait]
impl BatchSender<IdleKey, ()> for IdleSender {
    async fn send(&self, _batch: Arc<KeyedBatch<IdleKey, ()>>) -> Result<(), SendError> {
        Ok(())
    }
}

fn swallow_duplicates(result: StoreResult<()>) -> StoreResult<()> {
    match result {
        Err(error) if error.is_duplicate_key() => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use quill_store::{InMemoryContentStore, InMemoryOperationStore, StoreError};
    use serde_json::json;

    use super::*;

    fn split_document(sequence_number: i64) -> OperationDocument {
        serde_json::from_value(json!({
            "tenantId": "T",
            "documentId": "D",
            "operation": {
                "clientId": "c",
                "clientSequenceNumber": sequence_number,
                "sequenceNumber": sequence_number,
                "metadata": {"split": true},
                "contents": null,
            },
        }))
        .expect("document")
    }

    fn batch(documents: Vec<OperationDocument>) -> Arc<KeyedBatch<DocumentKey, OperationDocument>> {
        let mut batch = KeyedBatch::new();
        for document in documents {
            let key = DocumentKey {
                tenant_id: document.tenant_id.clone(),
                document_id: document.document_id.clone(),
            };
            batch.add(key, document);
        }
        Arc::new(batch)
    }

    fn content_filter(client_sequence_number: i64) -> ContentFilter {
        ContentFilter {
            tenant_id: "T".to_string(),
            document_id: "D".to_string(),
            client_id: "c".to_string(),
            client_sequence_number,
        }
    }

    #[tokio::test]
    async fn split_operations_stamp_their_content_records() {
        let operations = Arc::new(InMemoryOperationStore::new());
        let contents = Arc::new(InMemoryContentStore::new());
        contents.insert(content_filter(1), json!({"payload": "split"}));

        let sender = OperationStoreSender::new(
            operations.clone(),
            Some(contents.clone() as Arc<dyn ContentStore>),
            ProcessorMetrics::default(),
        );
        sender
            .send(batch(vec![split_document(1)]))
            .await
            .expect("send");

        assert_eq!(operations.len(), 1);
        let record = contents.record(&content_filter(1)).expect("record");
        assert_eq!(record.sequence_number, Some(1));
    }

    #[tokio::test]
    async fn split_operations_without_a_content_store_are_insert_only() {
        let operations = Arc::new(InMemoryOperationStore::new());
        let sender =
            OperationStoreSender::new(operations.clone(), None, ProcessorMetrics::default());

        sender
            .send(batch(vec![split_document(1)]))
            .await
            .expect("send");
        assert_eq!(operations.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_inserts_do_not_fail_the_batch() {
        let operations = Arc::new(InMemoryOperationStore::new());
        operations
            .insert_many(&[split_document(1)], false)
            .await
            .expect("seed");

        let sender =
            OperationStoreSender::new(operations.clone(), None, ProcessorMetrics::default());
        sender
            .send(batch(vec![split_document(1), split_document(2)]))
            .await
            .expect("duplicates are absorbed");
        assert_eq!(operations.len(), 2);
    }

    #[tokio::test]
    async fn backend_errors_fail_the_batch() {
        struct BrokenStore;

        #[async_trait]
        impl OperationStore for BrokenStore {
            async fn insert_many(
                &self,
                _documents: &[OperationDocument],
                _ordered: bool,
            ) -> StoreResult<()> {
                Err(StoreError::Backend {
                    message: "connection reset".to_string(),
                })
            }
        }

        let sender =
            OperationStoreSender::new(Arc::new(BrokenStore), None, ProcessorMetrics::default());
        let error = sender
            .send(batch(vec![split_document(1)]))
            .await
            .expect_err("backend failure propagates");
        assert!(error.to_string().contains("connection reset"));
    }
}
