//! Logging and Prometheus metrics setup for the load generator binary.

use std::env;
use std::fs::File;
use std::io::IsTerminal;
use std::sync::Arc;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, Layer, Registry, prelude::*};

use crate::config::{LogFormat, Logging, Metrics};
use crate::workload::counters;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Installs the global tracing subscriber.
///
/// Logs go to stderr unless disabled and are additionally written to the configured log file.
/// The file never receives ANSI colors.
pub fn init_tracing(config: &Logging) -> Result<()> {
    let mut layers: Vec<BoxedLayer> = Vec::new();

    if config.stderr {
        let is_terminal = std::io::stderr().is_terminal();
        let format = match config.format {
            LogFormat::Auto if is_terminal => LogFormat::Pretty,
            LogFormat::Auto => LogFormat::Simplified,
            format => format,
        };
        layers.push(format_layer(format, is_terminal, std::io::stderr));
    }

    if let Some(path) = &config.file {
        let file = File::create(path)
            .with_context(|| format!("failed to create log file {}", path.display()))?;
        let format = match config.format {
            LogFormat::Json => LogFormat::Json,
            _ => LogFormat::Simplified,
        };
        layers.push(format_layer(format, false, Arc::new(file)));
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter(config.level))
        .try_init()
        .context("failed to initialize logging")?;

    Ok(())
}

fn format_layer<W>(format: LogFormat, ansi: bool, writer: W) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(true);

    match format {
        LogFormat::Auto | LogFormat::Pretty => layer.compact().boxed(),
        LogFormat::Simplified => layer.with_ansi(false).boxed(),
        LogFormat::Json => layer.json().flatten_event(true).boxed(),
    }
}

/// Uses `RUST_LOG` literally if set. Otherwise, logs the workspace crates at `level` and
/// everything else at `WARN` or below.
fn env_filter(level: LevelFilter) -> EnvFilter {
    if let Ok(value) = env::var(EnvFilter::DEFAULT_ENV) {
        return EnvFilter::new(value);
    }

    let other = level.min(LevelFilter::WARN);
    EnvFilter::new(format!(
        "{other},authzed_client={level},authzed_loadtest={level}"
    ))
}

/// Installs the Prometheus recorder and its scrape endpoint if enabled.
///
/// Must be called within a Tokio runtime.
pub fn init_metrics(config: &Metrics) -> Result<()> {
    if !config.enabled {
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(config.addr)
        .install()
        .with_context(|| format!("failed to serve metrics on {}", config.addr))?;
    counters::describe();

    tracing::info!(addr = %config.addr, "serving Prometheus metrics");
    Ok(())
}

