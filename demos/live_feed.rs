//! Terminal rendition of the fraud-alert dashboard.
//!
//! Connects to the alert backend, then logs the connection status whenever it
//! changes and every new alert as it arrives, newest on top.
//!
//! Run with tracing enabled:
//! ```sh
//! FRAUD_ALERTS_WS_URL=ws://localhost:8000/ws RUST_LOG=info cargo run --example live_feed
//! ```

use std::time::Duration;

use fraud_alert_feed::endpoint_from_env;
use fraud_alert_feed::feed::{Client, ConnectionStatus};
use fraud_alert_feed::ws::config::{Config, HeartbeatConfig};
use futures::StreamExt as _;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let endpoint = endpoint_from_env();
    let config = Config::default().with_heartbeat(HeartbeatConfig::new(
        Duration::from_secs(10),
        Duration::from_secs(20),
    ));

    let client = Client::new(&endpoint, config);
    client.start();
    info!(%endpoint, "Project Phoenix: live fraud alerts");

    let mut updates = Box::pin(client.updates());
    let mut last_status = None;
    let mut rendered = 0_usize;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            update = updates.next() => {
                let Some(snapshot) = update else { break };

                if last_status != Some(snapshot.status) {
                    if snapshot.status == ConnectionStatus::Connected {
                        info!(status = %snapshot.status, total = snapshot.len());
                    } else {
                        warn!(status = %snapshot.status, total = snapshot.len());
                    }
                    last_status = Some(snapshot.status);
                }

                // Newly prepended alerts sit in front of the ones already shown
                let fresh = snapshot.len().saturating_sub(rendered);
                for alert in snapshot.alerts.iter().take(fresh).rev() {
                    let tx = &alert.transaction;
                    info!(
                        kind = %alert.kind,
                        user = %tx.user_id,
                        card = %tx.card_id,
                        device = %tx.device_id,
                        amount = %tx.amount.round_dp(2),
                        merchant = %tx.merchant,
                        "{}",
                        alert.reason
                    );
                }
                rendered = snapshot.len();
            }
        }
    }

    client.stop().await;
    info!(total = rendered, discarded = client.snapshot().discarded, "stopped");

    Ok(())
}
