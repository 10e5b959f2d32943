//! Periodic health sweep.

use std::{sync::Arc, time::Duration};

use {
    tokio::{task::JoinHandle, time::MissedTickBehavior},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info},
};

use crate::lifecycle::LifecycleController;

/// Run [`LifecycleController::sweep`] every `interval` until `cancel` fires.
pub fn spawn_health_monitor(
    controller: Arc<LifecycleController>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        info!(interval_secs = interval.as_secs(), "health monitor started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let removed = controller.sweep().await;
                    if !removed.is_empty() {
                        info!(count = removed.len(), "health sweep removed workers");
                    }
                }
            }
        }
        debug!("health monitor stopped");
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use howl_common::Catalog;

    use {
        super::*,
        crate::{
            lifecycle::FleetPolicy,
            registry::FleetRegistry,
            testutil::{MockTransport, RecordingDispatcher},
        },
    };

    #[tokio::test]
    async fn removes_dead_worker_and_stops_on_cancel() {
        let registry = Arc::new(FleetRegistry::new());
        let controller = Arc::new(LifecycleController::new(
            Arc::clone(&registry),
            Arc::new(RecordingDispatcher::default()),
            Arc::new(Catalog::new("English")),
            FleetPolicy::default(),
        ));
        let transport = MockTransport::connected();
        controller.connect(transport.clone(), None).unwrap();
        transport.disconnect();

        let cancel = CancellationToken::new();
        let task = spawn_health_monitor(
            Arc::clone(&controller),
            Duration::from_millis(10),
            cancel.clone(),
        );

        tokio::time::timeout(Duration::from_secs(2), async {
            while !registry.is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
    }
}
