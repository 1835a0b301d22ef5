use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use meshdash::config::DashboardConfig;
use meshdash::feed::{FeedConnector, FeedHub};
use meshdash::logging::init_logging;
use meshdash::models::metrics::{DOWNLOAD_RATE, UPLOAD_RATE};
use meshdash::notifications::TracingNotifier;
use meshdash::panels::{ContainerPanel, LogPanel, TrafficPanel};
use meshdash::transport::HttpTransport;

const SUMMARY_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match DashboardConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    let _log_guard = init_logging(&config.log_dir);
    info!(api = %config.api_base_url, feed = %config.feed_url, "Starting meshdash.");

    let transport = match HttpTransport::new(&config.api_base_url) {
        Ok(transport) => Arc::new(transport),
        Err(e) => {
            error!(error = %e, "Failed to build HTTP client.");
            std::process::exit(1);
        }
    };
    let notifier = Arc::new(TracingNotifier);

    let hub = Arc::new(FeedHub::new());
    let (feed_shutdown_tx, feed_shutdown_rx) = oneshot::channel::<()>();
    let feed_task = tokio::spawn(FeedConnector::new(config.feed_url.clone(), Arc::clone(&hub)).run(feed_shutdown_rx));

    let mut traffic = TrafficPanel::new(Arc::clone(&hub), config.stats_channel.clone(), config.window_capacity);
    let mut containers = ContainerPanel::new(transport.clone(), notifier.clone());
    let mut query_log = LogPanel::query_log(transport, notifier);

    traffic.mount();
    containers.mount(Duration::from_millis(config.container_poll_ms));
    query_log.mount(Duration::from_millis(config.log_poll_ms));

    let mut summary = interval(SUMMARY_INTERVAL);
    summary.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received.");
                break;
            }
            _ = summary.tick() => {
                let chart = traffic.snapshot();
                let last = |name: &str| chart.series(name).and_then(|values| values.last().copied());
                info!(
                    points = chart.len(),
                    upload = ?last(UPLOAD_RATE),
                    download = ?last(DOWNLOAD_RATE),
                    containers = containers.rows().len(),
                    running = containers.running_count(),
                    dns_queries = query_log.rows().len(),
                    dns_blocked = query_log.blocked_count(),
                    "Dashboard state."
                );
            }
        }
    }

    traffic.unmount();
    containers.unmount();
    query_log.unmount();
    let _ = feed_shutdown_tx.send(());
    if let Err(e) = feed_task.await {
        error!(error = %e, "Feed connector task failed.");
    }
    info!("meshdash stopped.");
}
