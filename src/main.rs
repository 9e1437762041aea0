use std::sync::Arc;

use tracing::info;

use lodgebook::config::Config;
use lodgebook::directory::StaticDirectory;
use lodgebook::notifier::{Notifier, OutboxNotifier, TracingNotifier};
use lodgebook::system::BookingSystem;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    lodgebook::observability::init_tracing();

    let config = Config::from_env();
    lodgebook::observability::init_metrics(config.metrics_port)?;

    // Outbox drained by a delivery worker; delivery itself is logged here.
    let (outbox, mut queue) = OutboxNotifier::new(config.notify_queue);
    let delivery = tokio::spawn(async move {
        let sink = TracingNotifier;
        while let Some(n) = queue.recv().await {
            if let Err(e) = sink.notify(n).await {
                tracing::warn!("delivery failed: {e}");
            }
        }
    });

    let system = BookingSystem::start(&config, Arc::new(outbox), Arc::new(StaticDirectory::new())).await?;
    info!("lodgebook running");
    info!(
        "  data_dir: {}",
        config
            .data_dir
            .as_ref()
            .map_or("none (volatile)".to_string(), |d| d.display().to_string())
    );
    info!("  compact_threshold: {}", config.compact_threshold);
    info!("  reconcile_interval: {:?}", config.reconcile_interval);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }

    info!("shutdown signal received");
    if let Err(e) = system.store().compact().await {
        tracing::warn!("final compaction failed: {e}");
    }
    let bookings = system.store().booking_count();
    drop(system);
    delivery.abort();

    info!("lodgebook stopped ({bookings} bookings)");
    Ok(())
}
