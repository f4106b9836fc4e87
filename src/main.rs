//! Reachability monitor CLI: run the connectivity monitor in the foreground and log status transitions.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use reach_monitor::network::DEFAULT_PROBE_TIMEOUT_MS;
use reach_monitor::{
    ConnectivityMonitor, EndpointStore, HttpProbe, InternetStatus, IpFamily, MonitorConfig,
    StatusSink, SystemResolver, DEFAULT_ENDPOINTS,
};
use tokio::sync::Notify;

#[derive(Parser, Debug)]
#[command(
    name = "reach-monitor",
    about = "Monitor internet reachability and detect captive portals",
    long_about = "Periodically probes the configured endpoints, classifies connectivity (none / limited / captive-portal / full) and logs every status transition. Endpoints are cached to disk so they survive restarts."
)]
struct Cli {
    /// Run once: wait for the first settled status reading, then exit (no loop)
    #[arg(long, short = '1', alias = "single")]
    pub once: bool,

    /// Probe endpoints; multiple or comma-separated
    /// e.g. --endpoints http://a/generate_204 --endpoints http://b/generate_204
    #[arg(long, value_delimiter(','), num_args = 1..)]
    pub endpoints: Option<Vec<String>>,

    /// Endpoint cache file path
    #[arg(long, default_value = "reach-monitor-endpoints.txt")]
    pub cache: PathBuf,

    /// Short check interval in seconds (initial verification and retries)
    #[arg(long, default_value_t = 5)]
    pub min_interval: u64,

    /// Steady-state re-check interval in seconds
    #[arg(long, default_value_t = 30)]
    pub interval: u64,

    /// Probe batch deadline in milliseconds
    #[arg(long, default_value_t = DEFAULT_PROBE_TIMEOUT_MS)]
    pub timeout_ms: u64,

    /// Probe with GET instead of HEAD (some origins reject HEAD)
    #[arg(long)]
    pub get: bool,
}

/// Logs every transition the monitor publishes and signals the first one,
/// so --once mode can exit on the first settled reading
struct LogSink {
    settled: Notify,
}

impl LogSink {
    fn new() -> Self {
        Self {
            settled: Notify::new(),
        }
    }
}

impl StatusSink for LogSink {
    fn on_internet_status_changed(&self, previous: InternetStatus, current: InternetStatus) {
        tracing::info!("Internet status changed: {} -> {}", previous, current);
        self.settled.notify_one();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let store = Arc::new(EndpointStore::open(&cli.cache));
    if let Some(endpoints) = &cli.endpoints {
        store.set(endpoints);
    }
    let defaults: Vec<String> = DEFAULT_ENDPOINTS.iter().map(|s| s.to_string()).collect();
    store.set_if_empty(&defaults);
    tracing::info!("Probe endpoints: {:?}", store.get());

    let cfg = MonitorConfig {
        min_interval: Duration::from_secs(cli.min_interval),
        steady_interval: Duration::from_secs(cli.interval),
        ..MonitorConfig::default()
    };
    let probe = Arc::new(HttpProbe::new(
        Duration::from_millis(cli.timeout_ms),
        !cli.get,
    ));
    let sink = Arc::new(LogSink::new());
    let monitor = ConnectivityMonitor::new(
        cfg,
        store,
        probe,
        Arc::new(SystemResolver),
        Arc::clone(&sink) as Arc<dyn StatusSink>,
    );

    // No interface manager is wired into the CLI; assume a link is present
    monitor.notify_link_state_changed(true, true);
    monitor.start()?;

    if cli.once {
        tracing::info!("Single-shot mode, waiting for the first settled reading...");
        sink.settled.notified().await;
        tracing::info!(
            "Settled status: {} ({})",
            monitor.internet_state(IpFamily::Unspecified),
            monitor.active_family()
        );
        monitor.stop().await;
        return Ok(());
    }

    tracing::info!(
        "Monitoring every {} s (short interval {} s), Ctrl-C to stop",
        cli.interval,
        cli.min_interval
    );
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down...");
    monitor.stop().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // An empty endpoint store makes HttpProbe report not-available without
    // any network I/O, so the first settled reading arrives immediately
    #[tokio::test]
    async fn once_mode_sink_signals_the_first_settled_reading() {
        let path = std::env::temp_dir().join(format!(
            "reach-monitor-once-{}.txt",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        let store = Arc::new(EndpointStore::open(path));
        let cfg = MonitorConfig {
            min_interval: Duration::from_millis(1),
            steady_interval: Duration::from_millis(1),
            ..MonitorConfig::default()
        };
        let probe = Arc::new(HttpProbe::new(Duration::from_millis(10), true));
        let sink = Arc::new(LogSink::new());
        let monitor = ConnectivityMonitor::new(
            cfg,
            store,
            probe,
            Arc::new(SystemResolver),
            Arc::clone(&sink) as Arc<dyn StatusSink>,
        );
        monitor.notify_link_state_changed(true, false);
        monitor.start().unwrap();

        tokio::time::timeout(Duration::from_secs(1), sink.settled.notified())
            .await
            .expect("no settled reading was published");
        assert_eq!(
            monitor.internet_state(IpFamily::Unspecified),
            InternetStatus::NotAvailable
        );
        monitor.stop().await;
        assert_eq!(
            monitor.internet_state(IpFamily::Unspecified),
            InternetStatus::Unknown
        );
    }
}
