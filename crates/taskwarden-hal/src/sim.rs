//! [`SimKernel`] and [`SimWatchdog`] – in-process simulation backends for CI.
//!
//! Both backends record every call they receive without touching a real
//! scheduler or watchdog peripheral, so the task registry can be exercised
//! in unit tests and CI pipelines.
//!
//! # Stub behaviour
//!
//! | Backend | Stub behaviour |
//! |---|---|
//! | [`SimKernel`]   | Mints sequential handles; entries are dropped without running. Counts creates and destroys per unit. |
//! | [`SimWatchdog`] | Tracks the subscribed set. Counts subscribes, unsubscribes and kicks per unit; a kick on an unsubscribed unit is recorded as *stale*. |
//!
//! Both support one-shot fault injection.
//!
//! # Example
//!
//! ```rust
//! use taskwarden_hal::{ExecutionProvider, SimKernel, SimWatchdog, WatchdogFacility};
//! use taskwarden_types::UnitSpec;
//!
//! let kernel = SimKernel::new();
//! let watchdog = SimWatchdog::new();
//!
//! let handle = kernel.create(&UnitSpec::new("sensor"), Box::new(|_| {}), None).unwrap();
//! watchdog.subscribe(&handle).unwrap();
//! assert!(watchdog.is_subscribed(handle.id()));
//!
//! let id = handle.id();
//! watchdog.unsubscribe(&handle).unwrap();
//! kernel.destroy(handle);
//! assert_eq!(kernel.destroy_count(id), 1);
//! ```

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use taskwarden_types::{
    KernelError, TaskEntry, TaskParam, UnitHandle, UnitId, UnitSpec, WatchdogError,
};

use crate::provider::ExecutionProvider;
use crate::watchdog::WatchdogFacility;

// ─────────────────────────────────────────────────────────────────────────────
// Sim kernel
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct KernelState {
    next_id: u64,
    live: HashMap<UnitId, UnitSpec>,
    created: Vec<UnitId>,
    destroyed: HashMap<UnitId, u32>,
    fail_next_create: Option<KernelError>,
}

/// Simulated execution provider.
#[derive(Default)]
pub struct SimKernel {
    state: Mutex<KernelState>,
}

impl SimKernel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next [`create`](ExecutionProvider::create) call fail with
    /// `error`.
    pub fn fail_next_create(&self, error: KernelError) {
        self.state.lock().fail_next_create = Some(error);
    }

    /// Whether `id` was created and not yet destroyed.
    pub fn is_alive(&self, id: UnitId) -> bool {
        self.state.lock().live.contains_key(&id)
    }

    /// Number of units currently alive.
    pub fn live_count(&self) -> usize {
        self.state.lock().live.len()
    }

    /// Creation parameters of a live unit.
    pub fn spec_of(&self, id: UnitId) -> Option<UnitSpec> {
        self.state.lock().live.get(&id).cloned()
    }

    /// Every unit ever created, in creation order.
    pub fn created(&self) -> Vec<UnitId> {
        self.state.lock().created.clone()
    }

    /// How many times `id` has been destroyed.
    pub fn destroy_count(&self, id: UnitId) -> u32 {
        self.state.lock().destroyed.get(&id).copied().unwrap_or(0)
    }
}

impl ExecutionProvider for SimKernel {
    fn create(
        &self,
        spec: &UnitSpec,
        _entry: TaskEntry,
        _param: Option<TaskParam>,
    ) -> Result<UnitHandle, KernelError> {
        let mut state = self.state.lock();
        if let Some(err) = state.fail_next_create.take() {
            return Err(err);
        }
        state.next_id += 1;
        // SAFETY: ids only ever increase, so each is minted once.
        let handle = unsafe { UnitHandle::from_raw(state.next_id) };
        state.live.insert(handle.id(), spec.clone());
        state.created.push(handle.id());
        Ok(handle)
    }

    fn destroy(&self, handle: UnitHandle) {
        let mut state = self.state.lock();
        state.live.remove(&handle.id());
        *state.destroyed.entry(handle.id()).or_insert(0) += 1;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sim watchdog
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct WatchdogState {
    subscribed: HashSet<UnitId>,
    subscribes: HashMap<UnitId, u32>,
    unsubscribes: HashMap<UnitId, u32>,
    kicks: HashMap<UnitId, u32>,
    stale_kicks: u32,
    fail_next_subscribe: Option<WatchdogError>,
    fail_next_unsubscribe: Option<WatchdogError>,
    fail_kicks: Option<WatchdogError>,
}

/// Simulated watchdog facility.
#[derive(Default)]
pub struct SimWatchdog {
    state: Mutex<WatchdogState>,
}

impl SimWatchdog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next [`subscribe`](WatchdogFacility::subscribe) call fail
    /// with `error`.
    pub fn fail_next_subscribe(&self, error: WatchdogError) {
        self.state.lock().fail_next_subscribe = Some(error);
    }

    /// Make the next [`unsubscribe`](WatchdogFacility::unsubscribe) call
    /// fail with `error`.  The subscription itself is left as it was.
    pub fn fail_next_unsubscribe(&self, error: WatchdogError) {
        self.state.lock().fail_next_unsubscribe = Some(error);
    }

    /// Make every kick fail with `error` until cleared with `None`.
    pub fn fail_kicks(&self, error: Option<WatchdogError>) {
        self.state.lock().fail_kicks = error;
    }

    pub fn is_subscribed(&self, id: UnitId) -> bool {
        self.state.lock().subscribed.contains(&id)
    }

    pub fn subscribed_count(&self) -> usize {
        self.state.lock().subscribed.len()
    }

    pub fn subscribe_count(&self, id: UnitId) -> u32 {
        self.state.lock().subscribes.get(&id).copied().unwrap_or(0)
    }

    pub fn unsubscribe_count(&self, id: UnitId) -> u32 {
        self.state.lock().unsubscribes.get(&id).copied().unwrap_or(0)
    }

    /// Kicks accepted for `id`.
    pub fn kick_count(&self, id: UnitId) -> u32 {
        self.state.lock().kicks.get(&id).copied().unwrap_or(0)
    }

    /// Kicks received for a unit that was not subscribed at the time.
    pub fn stale_kicks(&self) -> u32 {
        self.state.lock().stale_kicks
    }
}

impl WatchdogFacility for SimWatchdog {
    fn subscribe(&self, handle: &UnitHandle) -> Result<(), WatchdogError> {
        let mut state = self.state.lock();
        if let Some(err) = state.fail_next_subscribe.take() {
            return Err(err);
        }
        if !state.subscribed.insert(handle.id()) {
            return Err(WatchdogError::AlreadySubscribed);
        }
        *state.subscribes.entry(handle.id()).or_insert(0) += 1;
        Ok(())
    }

    fn kick(&self, handle: &UnitHandle) -> Result<(), WatchdogError> {
        let mut state = self.state.lock();
        if !state.subscribed.contains(&handle.id()) {
            state.stale_kicks += 1;
            return Err(WatchdogError::NotSubscribed);
        }
        if let Some(err) = state.fail_kicks.clone() {
            return Err(err);
        }
        *state.kicks.entry(handle.id()).or_insert(0) += 1;
        Ok(())
    }

    fn unsubscribe(&self, handle: &UnitHandle) -> Result<(), WatchdogError> {
        let mut state = self.state.lock();
        if let Some(err) = state.fail_next_unsubscribe.take() {
            return Err(err);
        }
        if !state.subscribed.remove(&handle.id()) {
            return Err(WatchdogError::NotSubscribed);
        }
        *state.unsubscribes.entry(handle.id()).or_insert(0) += 1;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> TaskEntry {
        Box::new(|_| {})
    }

    fn unit_handle(raw: u64) -> UnitHandle {
        // SAFETY: watchdog-only handle; no provider owns this unit.
        unsafe { UnitHandle::from_raw(raw) }
    }

    #[test]
    fn sim_kernel_mints_distinct_handles() {
        let kernel = SimKernel::new();
        let a = kernel.create(&UnitSpec::new("a"), noop(), None).unwrap();
        let b = kernel.create(&UnitSpec::new("b"), noop(), None).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(kernel.live_count(), 2);
        assert_eq!(kernel.created(), vec![a.id(), b.id()]);
    }

    #[test]
    fn sim_kernel_records_spec() {
        let kernel = SimKernel::new();
        let spec = UnitSpec::new("sensor").priority(10).stack_size(3072);
        let handle = kernel.create(&spec, noop(), None).unwrap();
        assert_eq!(kernel.spec_of(handle.id()), Some(spec));
    }

    #[test]
    fn sim_kernel_injected_create_failure_is_one_shot() {
        let kernel = SimKernel::new();
        kernel.fail_next_create(KernelError::OutOfMemory);
        let first = kernel.create(&UnitSpec::new("a"), noop(), None);
        assert_eq!(first.unwrap_err(), KernelError::OutOfMemory);
        assert_eq!(kernel.live_count(), 0);
        assert!(kernel.create(&UnitSpec::new("a"), noop(), None).is_ok());
    }

    #[test]
    fn sim_kernel_counts_destroys() {
        let kernel = SimKernel::new();
        let handle = kernel.create(&UnitSpec::new("a"), noop(), None).unwrap();
        let id = handle.id();
        kernel.destroy(handle);
        assert!(!kernel.is_alive(id));
        assert_eq!(kernel.destroy_count(id), 1);
    }

    #[test]
    fn sim_watchdog_rejects_duplicate_subscription() {
        let wd = SimWatchdog::new();
        let handle = unit_handle(1);
        wd.subscribe(&handle).unwrap();
        assert_eq!(wd.subscribe(&handle), Err(WatchdogError::AlreadySubscribed));
        assert_eq!(wd.subscribe_count(handle.id()), 1);
    }

    #[test]
    fn sim_watchdog_records_stale_kicks() {
        let wd = SimWatchdog::new();
        let handle = unit_handle(1);
        assert_eq!(wd.kick(&handle), Err(WatchdogError::NotSubscribed));
        assert_eq!(wd.stale_kicks(), 1);

        wd.subscribe(&handle).unwrap();
        wd.kick(&handle).unwrap();
        assert_eq!(wd.kick_count(handle.id()), 1);
        assert_eq!(wd.stale_kicks(), 1);
    }

    #[test]
    fn sim_watchdog_kick_fault_injection() {
        let wd = SimWatchdog::new();
        let handle = unit_handle(1);
        wd.subscribe(&handle).unwrap();
        wd.fail_kicks(Some(WatchdogError::Fault("timer busy".into())));
        assert!(matches!(wd.kick(&handle), Err(WatchdogError::Fault(_))));
        wd.fail_kicks(None);
        assert!(wd.kick(&handle).is_ok());
    }

    #[test]
    fn sim_watchdog_injected_subscribe_failure() {
        let wd = SimWatchdog::new();
        let handle = unit_handle(1);
        wd.fail_next_subscribe(WatchdogError::Exhausted);
        assert_eq!(wd.subscribe(&handle), Err(WatchdogError::Exhausted));
        assert!(!wd.is_subscribed(handle.id()));
        assert_eq!(wd.subscribe_count(handle.id()), 0);
    }

    #[test]
    fn sim_watchdog_injected_unsubscribe_failure_is_one_shot() {
        let wd = SimWatchdog::new();
        let handle = unit_handle(1);
        wd.subscribe(&handle).unwrap();

        wd.fail_next_unsubscribe(WatchdogError::Fault("bus error".into()));
        assert!(matches!(wd.unsubscribe(&handle), Err(WatchdogError::Fault(_))));
        assert!(wd.is_subscribed(handle.id()));
        assert_eq!(wd.unsubscribe_count(handle.id()), 0);

        wd.unsubscribe(&handle).unwrap();
        assert!(!wd.is_subscribed(handle.id()));
    }
}
