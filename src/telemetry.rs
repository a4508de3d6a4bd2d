use std::sync::OnceLock;
use std::time::Duration;

use indicatif::ProgressStyle;
use opentelemetry::global;
use opentelemetry::trace::TracerProvider as _;
use tracing::Metadata;
use tracing::level_filters::LevelFilter;
use tracing_indicatif::{IndicatifLayer, TickSettings};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, filter, fmt};

use crate::error::TelemetryError;

const DEFAULT_LOG_DIRECTIVE: &str = "warn";
const PROGRESS_TARGET_PREFIX: &str = "ancs::";

static TRACING_INITIALISED: OnceLock<Result<(), TelemetryError>> = OnceLock::new();

/// Installs the process-wide subscriber on first use.
///
/// An explicit `log_level` wins over `RUST_LOG`. Interactive stderr gets a
/// pretty formatter with progress spinners for client spans; anything else
/// gets JSON lines.
pub(crate) fn initialise_tracing(
    service_name: &str,
    stderr_is_terminal: bool,
    log_level: Option<LevelFilter>,
) -> Result<(), &'static TelemetryError> {
    TRACING_INITIALISED
        .get_or_init(|| initialise_tracing_once(service_name, stderr_is_terminal, log_level))
        .as_ref()
        .copied()
}

fn initialise_tracing_once(
    service_name: &str,
    stderr_is_terminal: bool,
    log_level: Option<LevelFilter>,
) -> Result<(), TelemetryError> {
    let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder().build();
    let tracer = tracer_provider.tracer(service_name.to_owned());
    global::set_tracer_provider(tracer_provider);

    let log_filter = log_filter(log_level);

    if stderr_is_terminal {
        let indicatif_layer = IndicatifLayer::new()
            .with_progress_style(progress_style())
            .with_tick_settings(TickSettings {
                default_tick_interval: Some(Duration::from_millis(90)),
                ..TickSettings::default()
            });
        let formatting_layer = fmt::layer()
            .pretty()
            .with_target(false)
            .with_writer(indicatif_layer.get_stderr_writer());
        let progress_layer = indicatif_layer.with_filter(filter::filter_fn(is_progress_span));

        tracing_subscriber::registry()
            .with(formatting_layer.with_filter(log_filter))
            .with(progress_layer)
            .with(OpenTelemetryLayer::new(tracer))
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_filter(log_filter),
            )
            .with(OpenTelemetryLayer::new(tracer))
            .try_init()?;
    }

    Ok(())
}

fn log_filter(log_level: Option<LevelFilter>) -> EnvFilter {
    match log_level {
        Some(level) => EnvFilter::new(level.to_string()),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_missing| EnvFilter::new(DEFAULT_LOG_DIRECTIVE)),
    }
}

fn progress_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan.bold} {span_name} {msg}")
        .map(|style| style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "))
        .unwrap_or_else(|_error| ProgressStyle::default_spinner())
}

fn is_progress_span(metadata: &Metadata<'_>) -> bool {
    metadata.is_span()
        && metadata.target().starts_with(PROGRESS_TARGET_PREFIX)
        && *metadata.level() <= tracing::Level::INFO
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::debug(LevelFilter::DEBUG, "debug")]
    #[case::off(LevelFilter::OFF, "off")]
    fn explicit_level_overrides_environment(#[case] level: LevelFilter, #[case] expected: &str) {
        assert_eq!(expected, log_filter(Some(level)).to_string());
    }
}
