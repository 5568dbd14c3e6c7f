use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::interval;

use super::registry::ConnectionRegistry;

/// Periodic task closing sessions idle longer than `idle_timeout`. Runs for
/// the life of the service; `shutdown` cancels it on the next tick boundary
/// so `main` can await a clean stop during shutdown.
pub fn spawn(registry: Arc<ConnectionRegistry>, ping_interval: Duration, idle_timeout: Duration) -> (tokio::task::JoinHandle<()>, oneshot::Sender<()>) {
    let (tx, mut rx) = oneshot::channel();

    let handle = tokio::spawn(async move {
        let mut ticker = interval(ping_interval);
        let idle_timeout_sec = idle_timeout.as_secs() as i64;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let idle = registry.idle_connections(idle_timeout_sec);
                    for id in idle {
                        tracing::info!(connection_id = %id, "idle sweeper closing connection");
                        registry.close_idle(&id, 1008, "idle timeout");
                    }
                }
                _ = &mut rx => {
                    tracing::info!("idle sweeper stopping");
                    break;
                }
            }
        }
    });

    (handle, tx)
}
