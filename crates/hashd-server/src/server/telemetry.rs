//! Logging, tracing and metrics setup for `hashd-server`.
//!
//! Console logs go through `tracing-subscriber` and honour `RUST_LOG`
//! (default `info`). OpenTelemetry export is opt-in:
//!
//! | Feature   | Adds                                                      |
//! |-----------|-----------------------------------------------------------|
//! | `tracing` | request spans and `hashd` worker spans                    |
//! | `metrics` | the HTTP instruments below                                |
//! | `stdout`  | pretty-printed export to stdout                           |
//! | `otlp`    | OTLP/gRPC export to `OTEL_EXPORTER_OTLP_ENDPOINT`         |
//!
//! Instruments: `jobs_submitted`, `requests_inflight`, `requests_rejected`
//! and `request_duration` (ms). The recording helpers at the bottom of this
//! module are no-ops until [`init_telemetry`] has run, or always when
//! `metrics` is off.
//!
//! ```bash
//! cargo run --features tracing,metrics,stdout
//! OTEL_EXPORTER_OTLP_ENDPOINT=http://localhost:4317 cargo run --features tracing,otlp
//! ```

#[cfg(all(
    any(feature = "otlp", feature = "stdout"),
    not(any(feature = "tracing", feature = "metrics"))
))]
compile_error!("Exporter features need at least one of 'tracing' or 'metrics'.");

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(any(feature = "metrics", feature = "tracing"))]
use opentelemetry::{InstrumentationScope, KeyValue};
#[cfg(any(feature = "metrics", feature = "tracing"))]
use opentelemetry_sdk::Resource;
#[cfg(any(feature = "metrics", feature = "tracing"))]
use opentelemetry_semantic_conventions as semvcns;

#[cfg(feature = "metrics")]
use opentelemetry::metrics::{Counter, Histogram, Meter, UpDownCounter};
#[cfg(feature = "metrics")]
use opentelemetry_sdk::metrics::SdkMeterProvider;
#[cfg(feature = "metrics")]
use std::sync::OnceLock;

#[cfg(feature = "tracing")]
use opentelemetry::trace::TracerProvider as _;
#[cfg(feature = "tracing")]
use opentelemetry_sdk::trace::SdkTracerProvider;

#[cfg(any(feature = "stdout", feature = "otlp"))]
use core::time::Duration;

#[cfg(any(feature = "metrics", feature = "tracing"))]
const SERVICE_NAME: &str = "hashd-server";

/// How often buffered spans and metrics are pushed to an exporter.
#[cfg(any(feature = "stdout", feature = "otlp"))]
const EXPORT_INTERVAL: Duration = Duration::from_secs(5);
#[cfg(feature = "otlp")]
const EXPORT_TIMEOUT: Duration = Duration::from_secs(10);

/// Exporter handles kept alive for the life of the process so they can be
/// flushed by [`shutdown_telemetry`].
#[derive(Default)]
pub struct TelemetryProviders {
    #[cfg(feature = "tracing")]
    tracer: Option<SdkTracerProvider>,
    #[cfg(feature = "metrics")]
    meter: Option<SdkMeterProvider>,
}

/// Installs the global subscriber and, when enabled, the OpenTelemetry
/// tracer and meter providers.
pub fn init_telemetry() -> anyhow::Result<TelemetryProviders> {
    #[allow(unused_mut)]
    let mut providers = TelemetryProviders::default();

    let console = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339());

    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(console);

    #[cfg(feature = "tracing")]
    let registry = {
        opentelemetry::global::set_text_map_propagator(
            opentelemetry_sdk::propagation::TraceContextPropagator::new(),
        );
        let tracer = tracer_provider()?;
        opentelemetry::global::set_tracer_provider(tracer.clone());
        let layer = tracing_opentelemetry::layer()
            .with_tracer(tracer.tracer_with_scope(scope()))
            .with_error_records_to_exceptions(true);
        providers.tracer = Some(tracer);
        registry.with(layer)
    };

    #[cfg(feature = "metrics")]
    let registry = {
        let meter = meter_provider()?;
        opentelemetry::global::set_meter_provider(meter.clone());
        let _ = INSTRUMENTS.set(HttpInstruments::new(
            &opentelemetry::global::meter_with_scope(scope()),
        ));
        let layer = tracing_opentelemetry::MetricsLayer::new(meter.clone());
        providers.meter = Some(meter);
        registry.with(layer)
    };

    registry.init();
    Ok(providers)
}

/// Flushes whatever the exporters still buffer. The subscriber may already
/// be torn down, so failures go to stderr.
pub fn shutdown_telemetry(providers: TelemetryProviders) {
    let TelemetryProviders {
        #[cfg(feature = "tracing")]
        tracer,
        #[cfg(feature = "metrics")]
        meter,
    } = providers;

    #[cfg(feature = "tracing")]
    if let Some(tracer) = tracer {
        if let Err(err) = tracer.shutdown() {
            eprintln!("tracer shutdown failed: {err}");
        }
    }

    #[cfg(feature = "metrics")]
    if let Some(meter) = meter {
        if let Err(err) = meter.shutdown() {
            eprintln!("meter shutdown failed: {err}");
        }
    }
}

#[cfg(any(feature = "metrics", feature = "tracing"))]
fn scope() -> InstrumentationScope {
    InstrumentationScope::builder(SERVICE_NAME)
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_schema_url(semvcns::SCHEMA_URL)
        .build()
}

#[cfg(any(feature = "metrics", feature = "tracing"))]
fn resource() -> Resource {
    Resource::builder()
        .with_service_name(SERVICE_NAME)
        .with_schema_url(
            [KeyValue::new(
                semvcns::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            )],
            semvcns::SCHEMA_URL,
        )
        .build()
}

#[cfg(feature = "otlp")]
fn otlp_endpoint() -> anyhow::Result<String> {
    use anyhow::Context;
    std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        .context("the `otlp` feature needs OTEL_EXPORTER_OTLP_ENDPOINT")
}

#[cfg(feature = "tracing")]
fn tracer_provider() -> anyhow::Result<SdkTracerProvider> {
    #[allow(unused_mut)]
    let mut builder = SdkTracerProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    {
        use opentelemetry_sdk::trace::{BatchConfigBuilder, BatchSpanProcessor};
        let processor = BatchSpanProcessor::builder(opentelemetry_stdout::SpanExporter::default())
            .with_batch_config(
                BatchConfigBuilder::default()
                    .with_scheduled_delay(EXPORT_INTERVAL)
                    .build(),
            )
            .build();
        builder = builder.with_span_processor(processor);
    }

    #[cfg(feature = "otlp")]
    {
        use anyhow::Context;
        use opentelemetry_otlp::WithExportConfig;
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(otlp_endpoint()?)
            .with_timeout(EXPORT_TIMEOUT)
            .build()
            .context("building the OTLP span exporter")?;
        builder = builder.with_batch_exporter(exporter);
    }

    Ok(builder.build())
}

#[cfg(feature = "metrics")]
fn meter_provider() -> anyhow::Result<SdkMeterProvider> {
    #[cfg(any(feature = "stdout", feature = "otlp"))]
    use opentelemetry_sdk::metrics::PeriodicReader;

    #[allow(unused_mut)]
    let mut builder = SdkMeterProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    {
        let reader = PeriodicReader::builder(opentelemetry_stdout::MetricExporter::default())
            .with_interval(EXPORT_INTERVAL)
            .build();
        builder = builder.with_reader(reader);
    }

    #[cfg(feature = "otlp")]
    {
        use anyhow::Context;
        use opentelemetry_otlp::WithExportConfig;
        let exporter = opentelemetry_otlp::MetricExporter::builder()
            .with_tonic()
            .with_endpoint(otlp_endpoint()?)
            .with_timeout(EXPORT_TIMEOUT)
            .with_temporality(opentelemetry_sdk::metrics::Temporality::Delta)
            .build()
            .context("building the OTLP metric exporter")?;
        let reader = PeriodicReader::builder(exporter)
            .with_interval(EXPORT_INTERVAL)
            .build();
        builder = builder.with_reader(reader);
    }

    Ok(builder.build())
}

#[cfg(feature = "metrics")]
static INSTRUMENTS: OnceLock<HttpInstruments> = OnceLock::new();

#[cfg(feature = "metrics")]
struct HttpInstruments {
    jobs_submitted: Counter<u64>,
    inflight: UpDownCounter<i64>,
    rejected: Counter<u64>,
    duration_ms: Histogram<f64>,
}

#[cfg(feature = "metrics")]
impl HttpInstruments {
    fn new(meter: &Meter) -> Self {
        Self {
            jobs_submitted: meter
                .u64_counter("jobs_submitted")
                .with_description("Accepted password submissions")
                .build(),
            inflight: meter
                .i64_up_down_counter("requests_inflight")
                .with_description("Requests holding an admission")
                .build(),
            rejected: meter
                .u64_counter("requests_rejected")
                .with_description("Requests refused while draining")
                .build(),
            duration_ms: meter
                .f64_histogram("request_duration")
                .with_unit("ms")
                .with_description("Time spent handling /hash requests")
                .build(),
        }
    }
}

#[cfg(feature = "metrics")]
fn record(f: impl FnOnce(&HttpInstruments)) {
    if let Some(instruments) = INSTRUMENTS.get() {
        f(instruments);
    }
}

pub fn increment_jobs_submitted() {
    #[cfg(feature = "metrics")]
    record(|m| m.jobs_submitted.add(1, &[]));
}

pub fn increment_requests_inflight() {
    #[cfg(feature = "metrics")]
    record(|m| m.inflight.add(1, &[]));
}

pub fn decrement_requests_inflight() {
    #[cfg(feature = "metrics")]
    record(|m| m.inflight.add(-1, &[]));
}

pub fn increment_requests_rejected() {
    #[cfg(feature = "metrics")]
    record(|m| m.rejected.add(1, &[]));
}

pub fn record_request_duration(_duration_ms: f64) {
    #[cfg(feature = "metrics")]
    record(|m| m.duration_ms.record(_duration_ms, &[]));
}
