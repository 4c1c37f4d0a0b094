use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use sluice::{
    config::{Config, Telemetry},
    filter, publish,
    reporter::{self, Reporter},
    scheduler::{self, Scheduler},
};
use sluice_registry::Registry;
use sluice_signal::Watcher;
use tokio::{
    runtime::Builder,
    signal,
    time::{self, Duration, Instant},
};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, util::SubscriberInitExt};

#[derive(thiserror::Error, Debug)]
enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Failed to load sluice config: {0}")]
    Config(#[from] sluice::config::Error),
    #[error("Sluice filter returned an error: {0}")]
    Filter(#[from] filter::Error),
    #[error("Sluice publisher returned an error: {0}")]
    Publish(#[from] publish::Error),
    #[error("Sluice scheduler returned an error: {0}")]
    Scheduler(#[from] scheduler::Error),
    #[error("Process metric registration failed: {0}")]
    Registry(#[from] sluice_registry::Error),
    #[error("Failed to install prometheus recorder: {0}")]
    Prometheus(#[from] metrics_exporter_prometheus::BuildError),
    #[error(transparent)]
    Registration(#[from] sluice_signal::RegisterError),
    #[error("Scheduler task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

fn default_config_path() -> String {
    "/etc/sluice/sluice.yaml".to_string()
}

#[derive(Parser)]
#[clap(version, about, long_about = None)]
struct Opts {
    /// path on disk to the configuration file
    #[clap(long, default_value_t = default_config_path())]
    config_path: String,
}

/// Keep the process-level metrics fresh until shutdown.
async fn process_metrics(registry: Arc<Registry>, shutdown: Watcher) -> Result<(), Error> {
    let uptime = registry.gauge("sluice.uptime-seconds")?;
    let heartbeat = registry.meter("sluice.heartbeat")?;
    let started = Instant::now();

    let mut ticker = time::interval(Duration::from_secs(1));
    let shutdown_wait = shutdown.recv();
    tokio::pin!(shutdown_wait);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let elapsed = i64::try_from(started.elapsed().as_secs()).unwrap_or(i64::MAX);
                uptime.update(elapsed);
                heartbeat.mark(1);
            }
            () = &mut shutdown_wait => {
                return Ok(());
            }
        }
    }
}

async fn inner_main(config: Config) -> Result<(), Error> {
    if let Some(Telemetry { prometheus_addr }) = config.telemetry {
        PrometheusBuilder::new()
            .with_http_listener(prometheus_addr)
            .install()?;
        info!("prometheus telemetry listening on {prometheus_addr}");
    }

    let (shutdown_watcher, shutdown_broadcaster) = sluice_signal::signal();

    let registry = Arc::new(Registry::new());
    let process_handle = tokio::spawn(process_metrics(
        Arc::clone(&registry),
        shutdown_watcher.register()?,
    ));

    let interval = config.reporting_interval();
    let reporter = Reporter::new(
        registry,
        publish::Publisher::new(config.publisher)?,
        filter::Configured::new(config.filter)?,
        config.namespace,
    )
    .with_dimensions(config.static_dimensions)
    .with_duration_unit(config.duration_unit)
    .with_counter_mode(reporter::CounterMode::from(config.counter_mode));
    let scheduler = Scheduler::new(interval, shutdown_watcher)?;
    let scheduler_handle = tokio::spawn(scheduler.run(reporter));
    info!("reporting every {} milliseconds", interval.as_millis());

    signal::ctrl_c().await?;
    info!("received ctrl-c, shutting down");
    shutdown_broadcaster.signal_and_wait().await;

    scheduler_handle.await?;
    if let Err(err) = process_handle.await? {
        warn!("process metrics stopped with error: {err}");
    }
    Ok(())
}

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_ansi(false)
        .finish()
        .init();

    let version = env!("CARGO_PKG_VERSION");
    info!("Starting sluice {version}.");

    let opts = Opts::parse();
    let config = Config::from_path(&PathBuf::from(opts.config_path))?;

    let runtime = Builder::new_multi_thread()
        .enable_io()
        .enable_time()
        .build()?;
    let res = runtime.block_on(inner_main(config));
    info!("Bye. :)");
    res
}
