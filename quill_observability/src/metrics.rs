use std::sync::{Arc, Weak};

use opentelemetry_sdk::error::OTelSdkResult;
use opentelemetry_sdk::metrics::data::ResourceMetrics;
use opentelemetry_sdk::metrics::reader::MetricReader;
use opentelemetry_sdk::metrics::{InstrumentKind, ManualReader, MetricResult, Pipeline, Temporality};

/// A metric reader collected on demand by in-process consumers instead
/// of a periodic exporter. Clones share the same underlying reader.
#[derive(Clone, Debug)]
pub struct ManualMetricsReader {
    reader: Arc<ManualReader>,
}

impl ManualMetricsReader {
    pub fn new() -> Self {
        Self {
            reader: Arc::new(ManualReader::builder().build()),
        }
    }
}

impl Default for ManualMetricsReader {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricReader for ManualMetricsReader {
    fn register_pipeline(&self, pipeline: Weak<Pipeline>) {
        self.reader.register_pipeline(pipeline);
    }

    fn collect(&self, resource_metrics: &mut ResourceMetrics) -> MetricResult<()> {
        self.reader.collect(resource_metrics)
    }

    fn force_flush(&self) -> OTelSdkResult {
        self.reader.force_flush()
    }

    fn shutdown(&self) -> OTelSdkResult {
        self.reader.shutdown()
    }

    fn temporality(&self, kind: InstrumentKind) -> Temporality {
        self.reader.temporality(kind)
    }
}
