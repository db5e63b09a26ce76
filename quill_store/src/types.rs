//! The document model shared by the processor and the stores.
//!
//! Field names follow the wire format of the upstream ordering
//! service, which is camelCase JSON.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Message type tag for operations that have been sequenced by the
/// ordering service.
pub const SEQUENCED_OPERATION_TYPE: &str = "SequencedOperation";

/// A single sequenced operation as carried in the log payload.
///
/// Unknown fields are preserved verbatim so documents round-trip
/// through the store without loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequencedOperation {
    /// Originating client, or `None` for server-generated operations.
    #[serde(default)]
    pub client_id: Option<String>,
    pub client_sequence_number: i64,
    pub sequence_number: i64,
    #[serde(default)]
    pub traces: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    pub contents: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SequencedOperation {
    /// True when the operation's contents were persisted out-of-band
    /// before sequencing and the content record still needs the
    /// authoritative sequence number.
    pub fn is_split(&self) -> bool {
        self.metadata
            .as_ref()
            .and_then(|metadata| metadata.get("split"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// The document written to the operation store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationDocument {
    pub tenant_id: String,
    pub document_id: String,
    pub operation: SequencedOperation,
}

/// Identifies the content record an operation's contents were written
/// to before sequencing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentFilter {
    pub tenant_id: String,
    pub document_id: String,
    pub client_id: String,
    pub client_sequence_number: i64,
}

/// Fields set by a content update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceNumberUpdate {
    pub sequence_number: i64,
}

/// A stored content record.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentRecord {
    pub contents: Value,
    /// Unset until the matching operation is sequenced.
    pub sequence_number: Option<i64>,
}
