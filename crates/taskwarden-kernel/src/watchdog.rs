//! [`SoftWatchdog`] – deadline-based software watchdog.
//!
//! A [`WatchdogFacility`] for targets without a hardware task watchdog (and
//! for the host).  Every subscribed unit must be kicked within `timeout` of
//! its previous kick (or of its subscription).  The watchdog tracks the
//! timestamp of each kick and considers a unit *starved* once its deadline
//! has passed.
//!
//! The watchdog itself never escalates.  Call [`SoftWatchdog::check_all`]
//! from a monitor loop to obtain the starved unit ids and apply the
//! escalation policy there.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use taskwarden_hal::WatchdogFacility;
use taskwarden_types::{UnitHandle, UnitId, WatchdogError};

// ────────────────────────────────────────────────────────────────────────────
// Public types
// ────────────────────────────────────────────────────────────────────────────

/// Health state reported for a single unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitHealth {
    /// The unit has been kicked within its deadline.
    Healthy,
    /// The unit has not been kicked within its deadline.
    TimedOut,
}

// ────────────────────────────────────────────────────────────────────────────
// Internal entry
// ────────────────────────────────────────────────────────────────────────────

struct Subscription {
    last_kick: Instant,
}

// ────────────────────────────────────────────────────────────────────────────
// SoftWatchdog
// ────────────────────────────────────────────────────────────────────────────

/// Software watchdog with one deadline per subscribed unit.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use taskwarden_hal::WatchdogFacility;
/// use taskwarden_kernel::watchdog::{SoftWatchdog, UnitHealth};
/// use taskwarden_types::UnitHandle;
///
/// let wd = SoftWatchdog::new(Duration::from_secs(1), 4);
/// // SAFETY: the only handle for unit 1; no provider owns it.
/// let handle = unsafe { UnitHandle::from_raw(1) };
/// wd.subscribe(&handle).unwrap();
/// wd.kick(&handle).unwrap();
///
/// assert_eq!(wd.health(handle.id()), UnitHealth::Healthy);
/// ```
pub struct SoftWatchdog {
    timeout: Duration,
    max_subscribers: usize,
    subscriptions: Mutex<HashMap<UnitId, Subscription>>,
}

impl SoftWatchdog {
    /// Create a watchdog that allows `max_subscribers` units, each of which
    /// must be kicked at least every `timeout`.
    pub fn new(timeout: Duration, max_subscribers: usize) -> Self {
        Self {
            timeout,
            max_subscribers,
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn subscribed_count(&self) -> usize {
        self.subscriptions.lock().len()
    }

    /// Return the [`UnitHealth`] of `id`.
    ///
    /// Returns [`UnitHealth::TimedOut`] for units that are not subscribed.
    pub fn health(&self, id: UnitId) -> UnitHealth {
        match self.subscriptions.lock().get(&id) {
            Some(sub) if sub.last_kick.elapsed() <= self.timeout => UnitHealth::Healthy,
            _ => UnitHealth::TimedOut,
        }
    }

    /// Return the ids of all subscribed units whose deadline has passed.
    /// The order of the returned list is unspecified.
    pub fn check_all(&self) -> Vec<UnitId> {
        self.subscriptions
            .lock()
            .iter()
            .filter(|(_, sub)| sub.last_kick.elapsed() > self.timeout)
            .map(|(id, _)| *id)
            .collect()
    }
}

impl WatchdogFacility for SoftWatchdog {
    fn subscribe(&self, handle: &UnitHandle) -> Result<(), WatchdogError> {
        let mut subs = self.subscriptions.lock();
        if subs.contains_key(&handle.id()) {
            return Err(WatchdogError::AlreadySubscribed);
        }
        if subs.len() >= self.max_subscribers {
            return Err(WatchdogError::Exhausted);
        }
        subs.insert(
            handle.id(),
            Subscription {
                last_kick: Instant::now(),
            },
        );
        Ok(())
    }

    fn kick(&self, handle: &UnitHandle) -> Result<(), WatchdogError> {
        match self.subscriptions.lock().get_mut(&handle.id()) {
            Some(sub) => {
                sub.last_kick = Instant::now();
                Ok(())
            }
            None => Err(WatchdogError::NotSubscribed),
        }
    }

    fn unsubscribe(&self, handle: &UnitHandle) -> Result<(), WatchdogError> {
        self.subscriptions
            .lock()
            .remove(&handle.id())
            .map(|_| ())
            .ok_or(WatchdogError::NotSubscribed)
    }
}
