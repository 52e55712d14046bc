//! Command line entry point of the load generator.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use argh::FromArgs;
use tracing::level_filters::LevelFilter;

use crate::authorizer::{self, Offline};
use crate::config::{self, Config, Overrides};
use crate::observability;
use crate::preflight::preflight;
use crate::report::Summary;
use crate::workload::{self, Workload};

/// Configuration file read when no `--config` is given. Skipped if it does not exist.
const DEFAULT_CONFIG: &str = "config/config.yaml";

/// Synthetic load generator for AuthZed: writes relationships and checks permissions on them.
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the YAML configuration file (default: config/config.yaml)
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// duration of the run in seconds, overrides the configuration if greater than zero
    #[argh(option)]
    duration_sec: Option<u64>,

    /// permission checks per written relationship, overrides the configuration if greater than
    /// zero
    #[argh(option)]
    read_ratio: Option<usize>,

    /// exercise timing and control flow without sending any request to AuthZed
    #[argh(switch)]
    dry_run: bool,

    /// additionally write logs to this file
    #[argh(option)]
    log_file: Option<PathBuf>,

    /// keep serving Prometheus metrics after the run until interrupted
    #[argh(switch)]
    serve_metrics: bool,

    /// log every write and check
    #[argh(switch, short = 'v')]
    verbose: bool,

    /// do not log to stderr
    #[argh(switch, short = 'q')]
    quiet: bool,

    /// write the summary as JSON to this file
    #[argh(option)]
    report_json: Option<PathBuf>,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            duration_sec: self.duration_sec,
            read_ratio: self.read_ratio,
            log_file: self.log_file.clone(),
            serve_metrics: self.serve_metrics,
            quiet: self.quiet,
        }
    }
}

/// Bootstrap the runtime and run the configured workload.
pub fn execute() -> Result<()> {
    let args: Args = argh::from_env();

    let path = config_path(args.config.as_deref())?;
    let mut config = Config::load(path.as_deref()).context("failed to load configuration")?;
    config.apply(args.overrides());
    if args.verbose {
        config.logging.level = LevelFilter::DEBUG;
    }
    config.validate(args.dry_run)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("loadtest-rt")
        .enable_all()
        .build()?;
    let _runtime_guard = runtime.enter();

    observability::init_tracing(&config.logging)?;
    tracing::debug!(?config);
    observability::init_metrics(&config.metrics)?;

    runtime.block_on(async move {
        let summary = run(&config, args.dry_run).await?;

        summary.print();
        if let Some(path) = &args.report_json {
            write_report(&summary, path)?;
        }

        if config.metrics.enabled && config.metrics.serve {
            tracing::info!(addr = %config.metrics.addr, "serving metrics until interrupted");
            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for Ctrl-C")?;
        }

        Ok(())
    })
}

/// Resolves the configuration file to load.
///
/// An explicitly given file must exist, the default file is optional.
fn config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    match explicit {
        Some(path) if !path.is_file() => {
            bail!("configuration file {} does not exist", path.display())
        }
        Some(path) => Ok(Some(path.to_owned())),
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG);
            Ok(default.is_file().then_some(default))
        }
    }
}

fn build_workload(config: &config::Workload, dry_run: bool) -> Workload {
    let mut builder = Workload::builder(config.effective_duration())
        .read_ratio(config.read_ratio)
        .write_workers(config.write_workers)
        .max_readers(config.max_readers)
        .queue_capacity(config.queue_capacity)
        .idle_backoff(config.idle_backoff)
        .dry_run(dry_run)
        .vocabulary(config.vocabulary());
    if let Some(seed) = config.seed {
        builder = builder.seed(seed);
    }
    builder.build()
}

async fn run(config: &Config, dry_run: bool) -> Result<Summary> {
    let workload = build_workload(&config.workload, dry_run);

    if dry_run {
        tracing::warn!("dry run, no requests are sent to AuthZed");
        return workload::run(Arc::new(Offline), workload).await;
    }

    let client = authorizer::client(&config.authzed)?;
    preflight(&client, config.authzed.schema.as_deref()).await?;
    workload::run(Arc::new(client), workload).await
}

fn write_report(summary: &Summary, path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create report file {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, summary).context("failed to write JSON report")?;
    writer.flush()?;
    tracing::info!(path = %path.display(), "report written");
    Ok(())
}
