use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::services::booking::AppointmentBookingService;

/// Periodically finishes Accepted appointments whose session has ended.
pub fn spawn_finish_sweeper(service: Arc<AppointmentBookingService>, every: Duration) -> JoinHandle<()> {
    info!("Starting auto-finish sweeper every {:?}", every);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match service.finish_overdue().await {
                Ok(0) => debug!("Sweeper found nothing to finish"),
                Ok(count) => info!("Sweeper finished {} appointments", count),
                Err(e) => error!("Sweeper run failed: {}", e),
            }
        }
    })
}
