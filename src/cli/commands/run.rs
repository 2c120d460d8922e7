//! Run command - the foreground monitor.

use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::delivery::{Collaborators, CommandAlertSink, Courier, HttpTransport};
use crate::watcher::DispatchEngine;

/// Watch until Ctrl-C, then stop the engine and drain pending deliveries.
pub async fn run(
    settings: Settings,
    config_path: Option<PathBuf>,
    no_reload: bool,
) -> anyhow::Result<()> {
    if let Some(path) = &config_path {
        crate::log_event!("config", "using", "{}", path.display());
    }

    let collaborators = Collaborators::new(
        Arc::new(HttpTransport::new(settings.proxy.clone())),
        Arc::new(CommandAlertSink::new(settings.alert_command.clone())),
    );
    let courier = Arc::new(
        Courier::pooled(
            collaborators,
            settings.delivery_workers,
            settings.delivery_queue,
        )
        .context("failed to start delivery workers")?,
    );

    let mut engine = DispatchEngine::new(settings, Arc::clone(&courier));
    if let Some(path) = config_path.filter(|_| !no_reload) {
        engine = engine.with_config_path(path);
    }
    engine.schedule().context("nothing to watch")?;

    // Create cancellation token for coordinated shutdown
    let ct = CancellationToken::new();
    let signal_ct = ct.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("[run] user interrupt");
            signal_ct.cancel();
        }
    });

    engine.run(ct).await?;
    drop(engine);

    tokio::task::spawn_blocking(move || courier.shutdown())
        .await
        .context("delivery workers did not shut down")?;
    Ok(())
}
