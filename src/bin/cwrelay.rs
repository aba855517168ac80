//! cwrelay - CloudWatch to StatHat metrics relay
//!
//! Polls CloudWatch `GetMetricData` for the configured metrics and forwards
//! every newly published point to StatHat once.
//!
//! Usage:
//!   cargo run --release --bin cwrelay
//!
//! Environment variables:
//!   CWRELAY_CONFIG - config file path (default: config.toml)
//!   CWRELAY_SINK_KEY - overrides sink.key
//!   CWRELAY_INTERVAL - overrides interval (seconds)
//!   AWS_PROFILE, AWS_ACCESS_KEY_ID, ... - source credentials (default AWS provider chain)
//!   RUST_LOG - log filter (default: info)

use cwrelay::cloudwatch::CloudWatchClient;
use cwrelay::relay::{
    config::RelayConfig, FetchPolicy, InflightForwards, RelayEngine, ShutdownCoordinator,
    WindowPlanner,
};
use cwrelay::stathat::StatHatForwarder;
use dotenv::dotenv;
use log::{error, info, warn};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    info!("🚀 Starting cwrelay");

    let config = match RelayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("❌ {}", e);
            return Err(e.into());
        }
    };

    info!("📊 Configuration:");
    info!("   ├─ Interval: {:?}", config.interval);
    info!("   ├─ Region: {}", config.source.region);
    info!(
        "   ├─ Statistic: {} over {}s, look-back {}m",
        config.source.stat, config.source.period, config.source.lookback_minutes
    );
    info!(
        "   ├─ Fetch errors: {}",
        match config.fetch_policy {
            FetchPolicy::Fatal => "fatal",
            FetchPolicy::Retry { .. } => "retry with backoff",
        }
    );
    info!("   ├─ Sink: {}", config.sink.url);
    info!(
        "   └─ Metrics: {} ({} forwarded)",
        config.registry.len(),
        config.registry.forwarding_count()
    );

    let source = Arc::new(CloudWatchClient::from_env(&config.source).await);
    let forwarder = Arc::new(StatHatForwarder::new(&config.sink)?);

    let shutdown = ShutdownCoordinator::new(config.shutdown_grace);
    let _signals = shutdown.listen()?;

    let inflight = InflightForwards::new();
    let mut engine = RelayEngine::new(config.registry, source, forwarder, config.interval)
        .with_planner(WindowPlanner::new(chrono::Duration::minutes(
            config.source.lookback_minutes,
        )))
        .with_fetch_policy(config.fetch_policy)
        .with_inflight(inflight.clone());

    info!("🔄 Press CTRL+C to shutdown gracefully");

    let outcome = tokio::select! {
        result = engine.run(shutdown.handle()) => result,
        _ = shutdown.expired() => {
            warn!("⚠️  Poll still running after the grace period, abandoning it");
            Ok(())
        }
    };

    if let Err(e) = outcome {
        // Fatal fetch errors exit without draining pending forwards
        error!("❌ Relay stopped: {}", e);
        return Err(e.into());
    }

    shutdown.drain(&inflight).await;
    info!("✅ cwrelay stopped");
    Ok(())
}
