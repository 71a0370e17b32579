use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::manager::SettingsManager;

/// Periodically calls [`SettingsManager::reload`] so overrides written by
/// other processes become visible. Failures are logged and retried on the
/// next tick. Stops when `cancel` fires.
pub fn spawn_reload_loop(
    manager: Arc<SettingsManager>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("settings reload loop stopped");
                    break;
                }
                _ = ticker.tick() => {
                    match manager.reload().await {
                        Ok(changed) if !changed.is_empty() => {
                            info!(?changed, "settings changed in storage");
                        }
                        Ok(_) => {}
                        Err(err) => warn!(error = %err, "periodic settings reload failed"),
                    }
                }
            }
        }
    })
}
