use std::time::Duration;

use tracing::debug;

use crate::storage::{Availability, GuessStorage};

/// Bounded liveness check for a network driver. Results are never cached.
#[derive(Debug, Clone, Copy)]
pub struct AvailabilityProber {
    timeout: Duration,
}

impl AvailabilityProber {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub async fn probe(&self, driver: &dyn GuessStorage) -> Availability {
        match tokio::time::timeout(self.timeout, driver.ping()).await {
            Ok(Ok(())) => Availability::Reachable,
            Ok(Err(e)) => {
                debug!(driver = %driver.id(), error = %e, "Probe failed");
                Availability::Unreachable
            }
            Err(_) => {
                debug!(driver = %driver.id(), "Probe timed out after {:?}", self.timeout);
                Availability::Unreachable
            }
        }
    }
}
