//! OTLP export layer and the category sampler.

use opentelemetry::trace::{Link, SamplingDecision, SamplingResult, SpanKind, TraceContextExt, TraceId, TraceState, TracerProvider as _};
use opentelemetry::{Context, KeyValue, global};
use opentelemetry_otlp::SpanExporter;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::{Sampler, SdkTracer, SdkTracerProvider, ShouldSample, SpanLimits};
use tracing_opentelemetry::OpenTelemetryLayer;

use crate::{TelemetryError, sample_rate};

/// Shuts the tracer provider down on drop, flushing pending spans. Also keeps
/// alive the runtime created for the exporter when the caller had none.
pub struct OtelGuard {
    provider: SdkTracerProvider,
    // Enter guard must drop before the runtime.
    _runtime_enter: Option<tokio::runtime::EnterGuard<'static>>,
    _runtime: Option<&'static tokio::runtime::Runtime>,
}

impl Drop for OtelGuard {
    fn drop(&mut self) {
        if let Err(e) = self.provider.shutdown() {
            eprintln!("OTel shutdown error: {e}");
        }
    }
}

/// Build the OpenTelemetry layer and its guard.
pub fn otel_layer<S>(service_name: &str) -> Result<(OpenTelemetryLayer<S, SdkTracer>, OtelGuard), TelemetryError>
where
    S: tracing::Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span>,
{
    let build = || {
        SpanExporter::builder()
            .with_tonic()
            .build()
            .map_err(|e| TelemetryError::Exporter(e.to_string()))
    };

    // The tonic channel needs a runtime. Binaries started outside one get a
    // leaked runtime that lives for the process.
    let (exporter, runtime, enter) = match tokio::runtime::Handle::try_current() {
        Ok(_) => (build()?, None, None),
        Err(_) => {
            let rt: &'static tokio::runtime::Runtime = Box::leak(Box::new(tokio::runtime::Runtime::new()?));
            let guard = rt.enter();
            let exporter = rt.block_on(async { build() })?;
            (exporter, Some(rt), Some(guard))
        }
    };

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_sampler(CategorySampler)
        .with_resource(Resource::builder().with_service_name(service_name.to_string()).build())
        .with_span_limits(SpanLimits::default())
        .build();

    global::set_tracer_provider(provider.clone());
    let layer = tracing_opentelemetry::layer().with_tracer(provider.tracer("whiteboard"));

    Ok((layer, OtelGuard { provider, _runtime_enter: enter, _runtime: runtime }))
}

/// Keeps sampled parents' children and errors; otherwise samples by
/// [`sample_rate`] on the span name.
#[derive(Debug, Clone)]
struct CategorySampler;

impl ShouldSample for CategorySampler {
    fn should_sample(
        &self,
        parent_context: Option<&Context>,
        trace_id: TraceId,
        name: &str,
        span_kind: &SpanKind,
        attributes: &[KeyValue],
        links: &[Link],
    ) -> SamplingResult {
        if let Some(cx) = parent_context {
            let parent = cx.span();
            let parent_ctx = parent.span_context();
            if parent_ctx.is_sampled() {
                return SamplingResult {
                    decision: SamplingDecision::RecordAndSample,
                    attributes: vec![],
                    trace_state: parent_ctx.trace_state().clone(),
                };
            }
        }

        let is_error = attributes.iter().any(|kv| {
            (kv.key.as_str() == "otel.status_code" && kv.value.as_str() == "ERROR")
                || (kv.key.as_str() == "error" && kv.value.as_str() == "true")
        });
        if is_error {
            return SamplingResult {
                decision: SamplingDecision::RecordAndSample,
                attributes: vec![],
                trace_state: TraceState::default(),
            };
        }

        Sampler::TraceIdRatioBased(sample_rate(name)).should_sample(
            parent_context,
            trace_id,
            name,
            span_kind,
            attributes,
            links,
        )
    }
}
