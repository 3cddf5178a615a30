//! Generic `WatchdogFacility` trait for liveness timers that supervise
//! execution units.

use taskwarden_types::{UnitHandle, WatchdogError};

/// A liveness timer that supervises subscribed execution units.
///
/// A subscribed unit must be kicked periodically or the facility escalates
/// (on a device, a reset).  Escalation is the facility's business, not the
/// registry's.
pub trait WatchdogFacility: Send + Sync {
    /// Start supervising `handle`.
    ///
    /// # Errors
    ///
    /// [`WatchdogError::AlreadySubscribed`] for a duplicate subscription,
    /// [`WatchdogError::Exhausted`] when no slot is free.
    fn subscribe(&self, handle: &UnitHandle) -> Result<(), WatchdogError>;

    /// Record progress for the unit owning `handle`.
    ///
    /// Hardware facilities that can only kick the calling context may ignore
    /// `handle`; it is the entry the registry resolved from the unit's name.
    fn kick(&self, handle: &UnitHandle) -> Result<(), WatchdogError>;

    /// Stop supervising `handle`.
    ///
    /// Returns [`WatchdogError::NotSubscribed`] when there was nothing to
    /// remove; callers tearing a unit down treat that as a no-op.
    fn unsubscribe(&self, handle: &UnitHandle) -> Result<(), WatchdogError>;
}
