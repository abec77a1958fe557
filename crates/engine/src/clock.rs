//! Wall-clock access for active-time windows.
//!
//! Scene timers run on the monotonic Tokio clock; only the eligibility filter
//! needs the local time of day, so that is the one thing abstracted here.

use std::sync::{Mutex, PoisonError};

use chrono::{Local, NaiveTime};

/// Source of the current local time of day.
pub trait Clock: Send + Sync {
    fn time_of_day(&self) -> NaiveTime;
}

/// Reads the host's local time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn time_of_day(&self) -> NaiveTime {
        Local::now().time()
    }
}

/// A clock pinned to a settable time of day.
#[derive(Debug)]
pub struct FixedClock {
    time: Mutex<NaiveTime>,
}

impl FixedClock {
    pub fn new(time: NaiveTime) -> Self {
        Self {
            time: Mutex::new(time),
        }
    }

    /// Convenience constructor from hour and minute; out-of-range values clamp to midnight.
    pub fn at(hour: u32, minute: u32) -> Self {
        Self::new(NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN))
    }

    pub fn set(&self, time: NaiveTime) {
        *self.time.lock().unwrap_or_else(PoisonError::into_inner) = time;
    }
}

impl Clock for FixedClock {
    fn time_of_day(&self) -> NaiveTime {
        *self.time.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
