// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Two-state view of collector reachability.
//!
//! The tracker only decides when to tell the operator about an outage. It
//! never gates sends: every flush still goes out while the collector is
//! considered unavailable.

use std::fmt::Display;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug)]
struct AvailabilityState {
    available: bool,
    last_warning: Option<Instant>,
}

#[derive(Debug)]
pub struct AvailabilityTracker {
    state: Mutex<AvailabilityState>,
    cooldown: Duration,
}

impl AvailabilityTracker {
    #[must_use]
    pub fn new(cooldown: Duration) -> Self {
        AvailabilityTracker {
            state: Mutex::new(AvailabilityState {
                available: true,
                last_warning: None,
            }),
            cooldown,
        }
    }

    fn lock(&self) -> MutexGuard<'_, AvailabilityState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_available(&self) -> bool {
        self.lock().available
    }

    /// Records a failed send. Returns whether a diagnostic was emitted.
    pub fn record_failure(&self, cause: &dyn Display) -> bool {
        let mut state = self.lock();
        let now = Instant::now();

        if state.available {
            state.available = false;
            state.last_warning = Some(now);
            warn!("SHIPPER | Collector unavailable: {cause}");
            return true;
        }

        let due = state
            .last_warning
            .map_or(true, |last| now.duration_since(last) > self.cooldown);
        if due {
            state.last_warning = Some(now);
            warn!("SHIPPER | Collector still unavailable: {cause}");
        }
        due
    }

    /// Records a successful send. Returns whether a recovery diagnostic was emitted.
    pub fn record_success(&self) -> bool {
        let mut state = self.lock();
        if state.available {
            return false;
        }
        state.available = true;
        state.last_warning = None;
        info!("SHIPPER | Collector available again");
        true
    }
}
