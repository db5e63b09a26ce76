//! Logging and metrics initialization shared by the quill binaries.
//!
//! Logs always go to stdout through `tracing`. OpenTelemetry export is
//! opt-in: the SDK stays disabled unless `OTEL_SDK_DISABLED=false`, so
//! development runs do not need a collector.

use std::borrow::Cow;
use std::time::Duration;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{InstrumentationScope, global};
use opentelemetry_otlp::{ExporterBuildError, MetricExporter, SpanExporter};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::metrics::{MeterProviderBuilder, PeriodicReader};
use opentelemetry_sdk::trace::SdkTracerProvider;
use snafu::{ResultExt, Snafu};
use tracing::Subscriber;
use tracing_opentelemetry::MetricsLayer;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, prelude::*};

pub use opentelemetry::{
    KeyValue,
    metrics::{Counter, Gauge, Histogram, Meter, UpDownCounter},
};

pub use crate::metrics::ManualMetricsReader;

mod metrics;

const OTEL_SDK_DISABLED: &str = "OTEL_SDK_DISABLED";

pub type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync>;

#[derive(Debug, Snafu)]
pub enum ObservabilityError {
    #[snafu(display("failed to build the OTLP exporter"))]
    Exporter { source: ExporterBuildError },
}

/// A meter for the given instrumentation scope.
pub fn meter(name: &'static str) -> Meter {
    global::meter(name)
}

/// Initializes logging and metrics for a binary.
pub fn init_observability(
    package_name: impl Into<Cow<'static, str>>,
    package_version: impl Into<Cow<'static, str>>,
) -> Result<(), ObservabilityError> {
    init_observability_with_reader(package_name, package_version, ManualMetricsReader::new())
}

/// Same as [`init_observability`], with a caller-supplied manual reader
/// so in-process consumers can collect the metrics.
pub fn init_observability_with_reader(
    package_name: impl Into<Cow<'static, str>>,
    package_version: impl Into<Cow<'static, str>>,
    reader: ManualMetricsReader,
) -> Result<(), ObservabilityError> {
    // The otel sdk does not honor the disabled flag itself, and we
    // diverge from its spec by defaulting to disabled.
    let sdk_disabled = std::env::var(OTEL_SDK_DISABLED)
        .map(|value| value == "true")
        .unwrap_or(true);

    if std::env::var("RUST_LOG").is_err() {
        unsafe {
            std::env::set_var("RUST_LOG", "info");
        }
    }

    let otel_layer = otel(package_name, package_version, reader, !sdk_disabled)?;
    let layers = vec![stdout(), otel_layer];
    tracing_subscriber::registry().with(layers).init();

    Ok(())
}

fn stdout<S>() -> BoxedLayer<S>
where
    S: Subscriber,
    for<'a> S: LookupSpan<'a>,
{
    let log_env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("INFO"));

    let json_fmt = std::env::var("RUST_LOG_FORMAT")
        .map(|value| value == "json")
        .unwrap_or(false);

    if json_fmt {
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .json()
            .with_filter(log_env_filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .compact()
            .with_target(true)
            .with_filter(log_env_filter)
            .boxed()
    }
}

fn otel<S>(
    package_name: impl Into<Cow<'static, str>>,
    version: impl Into<Cow<'static, str>>,
    reader: ManualMetricsReader,
    sdk_enabled: bool,
) -> Result<BoxedLayer<S>, ObservabilityError>
where
    S: Subscriber + Send + Sync,
    for<'a> S: LookupSpan<'a>,
{
    let package_name = package_name.into();
    let version = version.into();

    let resource = Resource::builder().build();
    let otel_env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("INFO"));

    let instrumentation_scope = InstrumentationScope::builder(package_name)
        .with_version(version)
        .build();

    let mut trace_provider = SdkTracerProvider::builder().with_resource(resource.clone());
    if sdk_enabled {
        let span_exporter = SpanExporter::builder()
            .with_tonic()
            .build()
            .context(ExporterSnafu)?;
        trace_provider = trace_provider.with_batch_exporter(span_exporter);
    }
    let trace_provider = trace_provider.build();
    let tracer = trace_provider.tracer_with_scope(instrumentation_scope);

    let mut meter_provider = MeterProviderBuilder::default()
        .with_resource(resource)
        .with_reader(reader);
    if sdk_enabled {
        let metrics_exporter = MetricExporter::builder()
            .with_tonic()
            .build()
            .context(ExporterSnafu)?;
        let metrics_reader = PeriodicReader::builder(metrics_exporter)
            .with_interval(Duration::from_secs(10))
            .build();
        meter_provider = meter_provider.with_reader(metrics_reader);
    }
    let meter_provider = meter_provider.build();

    global::set_meter_provider(meter_provider.clone());

    let otel_trace_layer = tracing_opentelemetry::layer().with_tracer(tracer);
    let otel_metrics_layer = MetricsLayer::new(meter_provider);
    let otel_layer = otel_env_filter
        .and_then(otel_metrics_layer)
        .and_then(otel_trace_layer)
        .boxed();

    Ok(otel_layer)
}
