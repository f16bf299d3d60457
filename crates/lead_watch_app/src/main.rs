mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use lead_watch_engine::{
    AuthHook, CommandAuthHook, HttpSnapshotProvider, NoopAuthHook, Poller, PollerHandle,
    WebhookNotifier,
};
use watch_logging::{watch_info, watch_warn, LogDestination};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(config::DEFAULT_CONFIG_PATH));
    let config = config::load(&path).with_context(|| format!("loading {}", path.display()))?;

    let destination = match &config.log_file {
        Some(file) => LogDestination::Both(file.clone()),
        None => LogDestination::Terminal,
    };
    watch_logging::initialize(destination, config.log_level);
    watch_info!("lead_watch starting with {}", path.display());

    let provider = HttpSnapshotProvider::new(&config.source_url, config.fetch.clone())
        .context("building snapshot provider")?;
    let auth: Arc<dyn AuthHook> = match &config.auth {
        Some(command) => Arc::new(CommandAuthHook::new(
            command.program.clone(),
            command.args.clone(),
            command.timeout,
        )),
        None => {
            watch_warn!("no auth command configured; auth failures will only back off");
            Arc::new(NoopAuthHook)
        }
    };
    let notifier =
        WebhookNotifier::new(config.webhook.clone()).context("building webhook notifier")?;

    let poller = Poller::new(config.watch, Arc::new(provider), auth, Arc::new(notifier))
        .delivery_timeout(config.delivery_timeout);
    let handle = PollerHandle::spawn(poller);

    tokio::signal::ctrl_c()
        .await
        .context("waiting for ctrl-c")?;
    watch_info!("shutdown requested");

    let stats = handle.stop().await;
    watch_info!(
        "finished after {} cycles: {} new leads seen, {} notifications delivered, {} suppressed",
        stats.cycles_completed,
        stats.new_records_seen,
        stats.notifications_delivered,
        stats.batches_suppressed
    );
    Ok(())
}
