//! Periodic subscription renewal
//!
//! Context broker subscriptions carry a finite duration, so every registered
//! device with a command subscription gets its subscription refreshed on a
//! fixed interval. One failing device never blocks the others.

use crate::broker::ContextBroker;
use crate::registry::DeviceRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Spawn the background renewal loop
///
/// The interval's first tick fires immediately and is skipped: devices
/// registered at startup already hold fresh subscriptions.
pub fn spawn_renewal_task(
    registry: Arc<dyn DeviceRegistry>,
    broker: Arc<dyn ContextBroker>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            renew_all(registry.as_ref(), broker.as_ref()).await;
        }
    })
}

/// Renew the subscription of every registered device that holds one
pub async fn renew_all(registry: &dyn DeviceRegistry, broker: &dyn ContextBroker) {
    debug!("Renewing context broker subscriptions");
    let records = match registry.find_all().await {
        Ok(records) => records,
        Err(e) => {
            error!(error = %e, "Unable to list devices for subscription renewal");
            return;
        }
    };

    for record in records {
        let Some(subscription_id) = &record.subscription_id else {
            continue;
        };
        match broker.update_subscription(subscription_id).await {
            Ok(()) => {
                debug!(device_id = %record.device_id, subscription_id, "Subscription renewed")
            }
            Err(e) => {
                error!(
                    device_id = %record.device_id,
                    subscription_id,
                    error = %e,
                    "Unable to renew the subscription"
                );
            }
        }
    }
}
