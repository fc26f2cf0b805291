//! Tracing setup for whiteboard binaries.
//!
//! [`init_tracing`] installs an `EnvFilter` (default `info`, `RUST_LOG`
//! overrides) and a stderr fmt layer. With the `telemetry` feature and the
//! standard OTel environment set, spans are also exported over OTLP:
//!
//! ```bash
//! OTEL_EXPORTER_OTLP_ENDPOINT=http://localhost:4317 whiteboard replay ...
//! ```
//!
//! Set `OTEL_SDK_DISABLED=true` to turn export off even when the endpoint is set.

#[cfg(feature = "telemetry")]
mod otel;

#[cfg(feature = "telemetry")]
pub use otel::{OtelGuard, otel_layer};

use thiserror::Error;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to start exporter runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error("failed to build OTLP exporter: {0}")]
    Exporter(String),
}

/// Check whether OTel export should be enabled.
///
/// True when `OTEL_SDK_DISABLED` is not `"true"` and either
/// `OTEL_EXPORTER_OTLP_ENDPOINT` is set or `OTEL_TRACES_EXPORTER` is set to
/// something other than `"none"`.
pub fn otel_enabled() -> bool {
    enabled_from(|key| std::env::var(key).ok())
}

fn enabled_from(var: impl Fn(&str) -> Option<String>) -> bool {
    if var("OTEL_SDK_DISABLED").is_some_and(|v| v.eq_ignore_ascii_case("true")) {
        return false;
    }
    if var("OTEL_EXPORTER_OTLP_ENDPOINT").is_some() {
        return true;
    }
    var("OTEL_TRACES_EXPORTER").is_some_and(|exporter| !exporter.eq_ignore_ascii_case("none"))
}

/// Sampling rate for a span name.
///
/// | Prefix          | Rate | |
/// |-----------------|------|-|
/// | `generation.*`  | 100% | one per generated node |
/// | `child.*`       | 100% | one per created child |
/// | `live.*`        |  1%  | drag and typing volume |
/// | other           | 10%  | |
///
/// Spans flagged as errors are always kept (see the OTel sampler).
pub fn sample_rate(span_name: &str) -> f64 {
    if span_name.starts_with("generation.") || span_name.starts_with("child.") {
        1.0
    } else if span_name.starts_with("live.") {
        0.01
    } else {
        0.1
    }
}

/// Held by `main` for the life of the process; flushes exported spans on drop.
#[must_use]
pub struct TelemetryGuard {
    #[cfg(feature = "telemetry")]
    _otel: Option<OtelGuard>,
}

/// Install the global subscriber. A second call keeps the first subscriber.
#[cfg_attr(not(feature = "telemetry"), allow(unused_variables))]
pub fn init_tracing(service: &str) -> TelemetryGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr));

    #[cfg(feature = "telemetry")]
    if otel_enabled() {
        match otel_layer(service) {
            Ok((layer, guard)) => {
                let _ = registry.with(layer).try_init();
                return TelemetryGuard { _otel: Some(guard) };
            }
            Err(e) => eprintln!("OTel export disabled: {e}"),
        }
    }

    let _ = registry.try_init();
    TelemetryGuard {
        #[cfg(feature = "telemetry")]
        _otel: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_otel_env_detection() {
        assert!(!enabled_from(env(&[])));
        assert!(enabled_from(env(&[("OTEL_EXPORTER_OTLP_ENDPOINT", "http://localhost:4317")])));
        assert!(enabled_from(env(&[("OTEL_TRACES_EXPORTER", "otlp")])));
        assert!(!enabled_from(env(&[("OTEL_TRACES_EXPORTER", "NONE")])));
        assert!(!enabled_from(env(&[
            ("OTEL_EXPORTER_OTLP_ENDPOINT", "http://localhost:4317"),
            ("OTEL_SDK_DISABLED", "True"),
        ])));
    }

    #[test]
    fn test_sample_rates_by_category() {
        assert_eq!(sample_rate("generation.event"), 1.0);
        assert_eq!(sample_rate("child.create"), 1.0);
        assert_eq!(sample_rate("live.commit"), 0.01);
        assert_eq!(sample_rate("persistence.save"), 0.1);
        assert_eq!(sample_rate("generationish"), 0.1);
    }
}
