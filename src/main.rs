use anyhow::Context;
use market_monitor::{init_logging, MarketMonitor, MonitorConfigBuilder, TracingRenderBridge};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_logging();

    let config = MonitorConfigBuilder::from_env()
        .context("reading MARKET_MONITOR_* environment")?
        .build();
    tracing::info!("Market monitor - backend {}", config.base_url);

    let mut monitor = MarketMonitor::http(config, Box::new(TracingRenderBridge))
        .context("building market monitor")?;

    let handle = monitor.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, shutting down");
            let _ = handle.shutdown();
        }
    });

    monitor.run().await.context("monitor loop failed")?;
    Ok(())
}
