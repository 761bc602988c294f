mod config;

use clap::Parser;
use config::{Config, MetricsConfig};
use metrics_exporter_statsd::StatsdBuilder;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "clickgate", about = "Affiliate click routing service")]
struct Cli {
    /// Path to the YAML config file
    #[arg(long, short)]
    config: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::from_file(&cli.config) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("failed to load config: {error}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(error) = config.redirector.validate() {
        eprintln!("invalid config: {error}");
        return ExitCode::FAILURE;
    }

    init_tracing(&config.common.logging.filter);

    // Held for the process lifetime; dropping it flushes pending events.
    let _sentry_guard = config.common.logging.sentry_dsn.as_ref().map(|dsn| {
        sentry::init((
            dsn.as_str(),
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    if let Some(metrics_config) = &config.common.metrics {
        if let Err(error) = init_metrics(metrics_config) {
            // Metrics are ambient; a dead StatsD target must not stop the
            // service from taking traffic.
            tracing::warn!(error = %error, "statsd exporter not installed");
        }
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("failed to start runtime: {error}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(redirector::run(config.redirector)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(error = %error, "redirector exited");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn init_metrics(config: &MetricsConfig) -> Result<(), String> {
    let recorder = StatsdBuilder::from(config.statsd_host.as_str(), config.statsd_port)
        .with_queue_size(5000)
        .with_buffer_size(1024)
        .build(Some(&config.prefix))
        .map_err(|e| e.to_string())?;
    metrics::set_global_recorder(recorder).map_err(|e| e.to_string())?;

    for def in redirector::metrics_defs::ALL_METRICS {
        tracing::debug!(
            name = def.name,
            kind = def.metric_type.as_str(),
            "metric registered"
        );
    }
    Ok(())
}
