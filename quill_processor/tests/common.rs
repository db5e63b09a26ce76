use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use quill_processor::{
    LogEnvelope, MemoryHostContext, ProcessorClient, ProcessorService, ProcessorStats,
    run_background_processor,
};
use quill_store::{
    ContentStore, InMemoryOperationStore, OperationDocument, OperationStore, StoreError,
    StoreResult,
};
use serde_json::json;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub fn spawn_processor(
    operations: Arc<dyn OperationStore>,
    contents: Option<Arc<dyn ContentStore>>,
) -> (
    JoinHandle<ProcessorStats>,
    ProcessorClient,
    Arc<MemoryHostContext>,
    CancellationToken,
) {
    let host = Arc::new(MemoryHostContext::new());
    let service = ProcessorService::new(operations, contents, host.clone());
    let client = service.client();
    let ct = CancellationToken::new();
    let task = tokio::spawn(run_background_processor(service, ct.clone()));
    (task, client, host, ct)
}

/// Lets the paused-clock runtime run every ready task to completion.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

pub fn sequenced_envelope(
    offset: i64,
    tenant_id: &str,
    document_id: &str,
    sequence_number: i64,
) -> LogEnvelope {
    let value = serde_json::to_vec(&json!({
        "type": "SequencedOperation",
        "tenantId": tenant_id,
        "documentId": document_id,
        "operation": {
            "clientId": "client-1",
            "clientSequenceNumber": sequence_number,
            "sequenceNumber": sequence_number,
            "contents": {"n": sequence_number},
        },
    }))
    .expect("payload");
    LogEnvelope {
        offset,
        value: value.into(),
    }
}

pub fn heartbeat_envelope(offset: i64) -> LogEnvelope {
    let value = serde_json::to_vec(&json!({"type": "NoOp"})).expect("payload");
    LogEnvelope {
        offset,
        value: value.into(),
    }
}

/// A document shaped the way the processor stores it, for seeding
/// replay collisions.
pub fn stored_document(
    tenant_id: &str,
    document_id: &str,
    sequence_number: i64,
) -> OperationDocument {
    serde_json::from_value(json!({
        "tenantId": tenant_id,
        "documentId": document_id,
        "operation": {
            "clientId": "client-1",
            "clientSequenceNumber": sequence_number,
            "sequenceNumber": sequence_number,
            "contents": json!({"n": sequence_number}).to_string(),
        },
    }))
    .expect("document")
}

/// Operation store wrapper that records every bulk insert and holds it
/// until the test releases the gate.
pub struct GatedOperationStore {
    inner: InMemoryOperationStore,
    gate: Semaphore,
    calls: Mutex<Vec<Vec<OperationDocument>>>,
}

impl GatedOperationStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryOperationStore::new(),
            gate: Semaphore::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Lets `count` pending or future inserts proceed.
    pub fn release(&self, count: usize) {
        self.gate.add_permits(count);
    }

    /// Every bulk insert observed so far, in call order, recorded
    /// before the gate.
    pub fn calls(&self) -> Vec<Vec<OperationDocument>> {
        self.calls.lock().expect("lock").clone()
    }

    pub fn inner(&self) -> &InMemoryOperationStore {
        &self.inner
    }
}

#[async_trait]
impl OperationStore for GatedOperationStore {
    async fn insert_many(&self, documents: &[OperationDocument], ordered: bool) -> StoreResult<()> {
        self.calls.lock().expect("lock").push(documents.to_vec());
        let permit = self.gate.acquire().await.expect("gate closed");
        permit.forget();
        self.inner.insert_many(documents, ordered).await
    }
}

/// Operation store that fails every insert with a non-duplicate error.
pub struct FailingOperationStore;

#[async_trait]
impl OperationStore for FailingOperationStore {
    async fn insert_many(
        &self,
        _documents: &[OperationDocument],
        _ordered: bool,
    ) -> StoreResult<()> {
        Err(StoreError::Backend {
            message: "operation collection unavailable".to_string(),
        })
    }
}
