use quill_observability::{Counter, Gauge};

#[derive(Clone)]
pub struct ProcessorMetrics {
    pub sequenced_operations: Counter<u64>,
    pub dropped_messages: Counter<u64>,
    pub operations_written: Counter<u64>,
    pub batches_written: Counter<u64>,
    pub checkpoint_offset: Gauge<i64>,
}

impl Default for ProcessorMetrics {
    fn default() -> Self {
        let meter = quill_observability::meter("processor");
        Self {
            sequenced_operations: meter
                .u64_counter("processor.messages.sequenced")
                .with_unit("{message}")
                .with_description("sequenced operations routed to the primary pipeline")
                .build(),
            dropped_messages: meter
                .u64_counter("processor.messages.dropped")
                .with_unit("{message}")
                .with_description("undecodable messages dropped before routing")
                .build(),
            operations_written: meter
                .u64_counter("processor.operations.written")
                .with_unit("{operation}")
                .with_description("operations persisted to the operation store")
                .build(),
            batches_written: meter
                .u64_counter("processor.batches.written")
                .with_unit("{batch}")
                .with_description("coalesced batches persisted")
                .build(),
            checkpoint_offset: meter
                .i64_gauge("processor.checkpoint.offset")
                .with_description("last log offset reported to the host checkpoint")
                .build(),
        }
    }
}
