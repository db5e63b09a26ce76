//! Inbound log messages: envelope, classification and normalization.

use bytes::Bytes;
use quill_pipeline_core::{BatchKey, Offset};
use quill_store::{OperationDocument, SEQUENCED_OPERATION_TYPE, SequencedOperation};
use serde::Deserialize;
use serde_json::Value;

/// A raw message as delivered by the partitioned log reader. The value
/// is UTF-8 JSON.
#[derive(Debug, Clone)]
pub struct LogEnvelope {
    pub offset: Offset,
    pub value: Bytes,
}

/// Routing key for the primary pipeline: operations for one document
/// coalesce into one bulk write.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentKey {
    pub tenant_id: String,
    pub document_id: String,
}

impl BatchKey for DocumentKey {
    fn encode(&self) -> String {
        // Tenant and document ids are opaque tokens without separators.
        format!("{}/{}", self.tenant_id, self.document_id)
    }
}

/// Singleton key for the idle pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdleKey;

impl BatchKey for IdleKey {
    fn encode(&self) -> String {
        "idle".to_string()
    }
}

/// A classified inbound message.
#[derive(Debug)]
pub enum RoutedMessage {
    /// A sequenced operation bound for the operation store.
    Sequenced {
        key: DocumentKey,
        document: OperationDocument,
    },
    /// Everything else. Routed through the no-op pipeline so the
    /// checkpoint still advances past it.
    Idle,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SequencedEnvelope {
    tenant_id: String,
    document_id: String,
    operation: SequencedOperation,
}

/// Decodes and classifies a log payload.
///
/// Sequenced operations are normalized on the way in: traces are
/// dropped, and operations without a `metadata` field carry their
/// contents as a JSON string for compatibility with older writers.
/// Any decode failure bubbles up so the caller can drop the message.
pub fn route(value: &[u8]) -> Result<RoutedMessage, serde_json::Error> {
    let payload: Value = serde_json::from_slice(value)?;

    if payload.get("type").and_then(Value::as_str) != Some(SEQUENCED_OPERATION_TYPE) {
        return Ok(RoutedMessage::Idle);
    }

    let envelope: SequencedEnvelope = serde_json::from_value(payload)?;
    let mut operation = envelope.operation;
    normalize(&mut operation);

    let key = DocumentKey {
        tenant_id: envelope.tenant_id.clone(),
        document_id: envelope.document_id.clone(),
    };
    let document = OperationDocument {
        tenant_id: envelope.tenant_id,
        document_id: envelope.document_id,
        operation,
    };
    Ok(RoutedMessage::Sequenced { key, document })
}

fn normalize(operation: &mut SequencedOperation) {
    operation.traces = Vec::new();
    if operation.metadata.is_none() {
        let raw = operation.contents.to_string();
        operation.contents = Value::String(raw);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sequenced_payload() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "type": "SequencedOperation",
            "tenantId": "T",
            "documentId": "D",
            "operation": {
                "contents": {"x": 1},
                "sequenceNumber": 5,
                "clientId": "c",
                "clientSequenceNumber": 1,
                "traces": [{"service": "orderer"}],
            },
        }))
        .expect("payload")
    }

    #[test]
    fn sequenced_operations_route_to_the_primary_key() {
        let routed = route(&sequenced_payload()).expect("route");
        let RoutedMessage::Sequenced { key, document } = routed else {
            panic!("expected a sequenced operation");
        };

        assert_eq!(key.tenant_id, "T");
        assert_eq!(key.document_id, "D");
        assert_eq!(document.tenant_id, "T");
        assert_eq!(document.operation.sequence_number, 5);
    }

    #[test]
    fn normalization_clears_traces_and_stringifies_contents() {
        let RoutedMessage::Sequenced { document, .. } =
            route(&sequenced_payload()).expect("route")
        else {
            panic!("expected a sequenced operation");
        };

        assert!(document.operation.traces.is_empty());
        // No metadata field means older writers: contents travel as a
        // JSON string.
        assert_eq!(
            document.operation.contents,
            Value::String("{\"x\":1}".to_string())
        );
    }

    #[test]
    fn operations_with_metadata_keep_structured_contents() {
        let payload = serde_json::to_vec(&json!({
            "type": "SequencedOperation",
            "tenantId": "T",
            "documentId": "D",
            "operation": {
                "contents": {"x": 1},
                "metadata": {"split": true},
                "sequenceNumber": 5,
                "clientId": "c",
                "clientSequenceNumber": 1,
            },
        }))
        .expect("payload");

        let RoutedMessage::Sequenced { document, .. } = route(&payload).expect("route") else {
            panic!("expected a sequenced operation");
        };
        assert_eq!(document.operation.contents, json!({"x": 1}));
        assert!(document.operation.is_split());
    }

    #[test]
    fn other_message_types_are_idle_routed() {
        let payload = serde_json::to_vec(&json!({"type": "NoOp"})).expect("payload");
        assert!(matches!(
            route(&payload).expect("route"),
            RoutedMessage::Idle
        ));

        // Payloads without a type tag count as "anything else" too.
        let payload = serde_json::to_vec(&json!({"contents": 1})).expect("payload");
        assert!(matches!(
            route(&payload).expect("route"),
            RoutedMessage::Idle
        ));
    }

    #[test]
    fn undecodable_payloads_are_errors() {
        assert!(route(b"{not json").is_err());
        assert!(route(&[0xff, 0xfe]).is_err());

        // A sequenced envelope missing its routing fields cannot be
        // processed either.
        let payload =
            serde_json::to_vec(&json!({"type": "SequencedOperation"})).expect("payload");
        assert!(route(&payload).is_err());
    }

    #[test]
    fn document_keys_encode_deterministically() {
        let first = DocumentKey {
            tenant_id: "T".to_string(),
            document_id: "D".to_string(),
        };
        let second = first.clone();
        assert_eq!(first.encode(), second.encode());
        assert_eq!(first.encode(), "T/D");
    }
}
