//! [`TaskRegistry`] – named execution units under watchdog supervision.
//!
//! The registry is the only owner of the units it creates.  A name is in
//! the registry **iff** its unit is alive in the kernel **and** subscribed
//! to the watchdog:
//!
//! - [`TaskRegistry::add`] creates the unit, subscribes it, then inserts the
//!   record.  If the subscription fails the fresh unit is destroyed before
//!   the error is returned, so a failed add leaves no trace.
//! - [`TaskRegistry::remove`] unsubscribes, destroys and erases.
//! - [`TaskRegistry::kick`] resolves the name and forwards a kick.
//! - [`TaskRegistry::teardown`] (also run on drop) retires every record and
//!   closes the registry: later adds fail with [`TaskError::RegistryClosed`].
//!
//! # Locking
//!
//! Every operation, including read-only queries, runs under one mutex that
//! guards the whole name → record map.  The lookup in `kick` and the kick
//! itself therefore happen in the same critical section as a concurrent
//! `remove`, which is what keeps kicks off destroyed handles.  Operations on
//! a single name are totally ordered.
//!
//! The lock is held across provider and watchdog calls, and it is not
//! re-entrant: an [`ExecutionProvider`] must not run a unit's entry routine
//! synchronously inside `create`, since an entry that kicks would deadlock.
//!
//! # Destruction caveat
//!
//! Destroying a unit does not release what the unit itself holds
//! (peripheral locks, buffers).  Units must either be safe to destroy at any
//! preemption point or cooperate with a shutdown signal before their
//! supervisor calls `remove`.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use taskwarden_hal::{SimKernel, SimWatchdog};
//! use taskwarden_kernel::TaskRegistry;
//! use taskwarden_types::{CoreAffinity, TaskError, UnitSpec};
//!
//! let registry = TaskRegistry::new(Arc::new(SimKernel::new()), Arc::new(SimWatchdog::new()));
//!
//! registry
//!     .add(UnitSpec::new("sensorTask").priority(10).core(CoreAffinity::Core(1)), |_| {}, None)
//!     .unwrap();
//! assert!(registry.kick("sensorTask").is_ok());
//!
//! let dup = registry.add(UnitSpec::new("sensorTask"), |_| {}, None);
//! assert!(matches!(dup, Err(TaskError::NameInUse(_))));
//!
//! registry.remove("sensorTask").unwrap();
//! assert!(matches!(registry.kick("sensorTask"), Err(TaskError::NotFound(_))));
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use taskwarden_hal::{ExecutionProvider, WatchdogFacility};
use taskwarden_types::{TaskError, TaskInfo, TaskParam, UnitId, UnitSpec, WatchdogError};
use tracing::{debug, error, info, warn};

use crate::record::TaskRecord;

/// Records plus the closed flag, guarded together.
#[derive(Default)]
struct TaskTable {
    records: BTreeMap<String, TaskRecord>,
    closed: bool,
}

/// Name-keyed registry of supervised execution units.
///
/// Share it between threads as `Arc<TaskRegistry>`.
pub struct TaskRegistry {
    kernel: Arc<dyn ExecutionProvider>,
    watchdog: Arc<dyn WatchdogFacility>,
    tasks: Mutex<TaskTable>,
}

impl TaskRegistry {
    /// Create an empty registry over the given kernel and watchdog.
    pub fn new(kernel: Arc<dyn ExecutionProvider>, watchdog: Arc<dyn WatchdogFacility>) -> Self {
        Self {
            kernel,
            watchdog,
            tasks: Mutex::new(TaskTable::default()),
        }
    }

    /// Create a named unit running `entry(param)` and put it under watchdog
    /// supervision.  Returns the new unit's id.
    ///
    /// # Errors
    ///
    /// - [`TaskError::RegistryClosed`] if the registry has been torn down.
    /// - [`TaskError::NameInUse`] if `spec.name` is already registered; the
    ///   existing record is left untouched.
    /// - [`TaskError::CreationFailed`] if the kernel refused the unit.
    /// - [`TaskError::SupervisionFailed`] if the watchdog refused the
    ///   subscription; the unit has already been destroyed again.
    ///
    /// In every error case the registry is exactly as it was before the call.
    pub fn add<F>(&self, spec: UnitSpec, entry: F, param: Option<TaskParam>) -> Result<UnitId, TaskError>
    where
        F: FnOnce(Option<TaskParam>) + Send + 'static,
    {
        let mut tasks = self.tasks.lock();

        if tasks.closed {
            warn!(task = %spec.name, "task registry is closed");
            return Err(TaskError::RegistryClosed(spec.name));
        }
        if tasks.records.contains_key(&spec.name) {
            warn!(task = %spec.name, "task name already in use");
            return Err(TaskError::NameInUse(spec.name));
        }

        let handle = match self.kernel.create(&spec, Box::new(entry), param) {
            Ok(handle) => handle,
            Err(source) => {
                error!(task = %spec.name, error = %source, "failed to create task");
                return Err(TaskError::CreationFailed {
                    name: spec.name,
                    source,
                });
            }
        };

        if let Err(source) = self.watchdog.subscribe(&handle) {
            error!(
                task = %spec.name,
                unit = %handle.id(),
                error = %source,
                "failed to subscribe task to watchdog; destroying it"
            );
            self.kernel.destroy(handle);
            return Err(TaskError::SupervisionFailed {
                name: spec.name,
                source,
            });
        }

        let id = handle.id();
        debug_assert!(
            tasks.records.values().all(|r| r.unit_id() != id),
            "kernel returned a handle that is already registered"
        );
        info!(
            task = %spec.name,
            unit = %id,
            priority = spec.priority,
            core = %spec.core_affinity,
            stack_size = spec.stack_size,
            "task created"
        );
        tasks.records.insert(spec.name.clone(), TaskRecord::new(spec, handle));
        Ok(id)
    }

    /// Unsubscribe, destroy and forget the unit registered as `name`.
    ///
    /// # Errors
    ///
    /// [`TaskError::NotFound`] if `name` is not registered.  No other record
    /// is affected.
    pub fn remove(&self, name: &str) -> Result<(), TaskError> {
        let mut tasks = self.tasks.lock();
        let Some(record) = tasks.records.remove(name) else {
            error!(task = %name, "task not found");
            return Err(TaskError::NotFound(name.to_string()));
        };
        self.retire(record);
        Ok(())
    }

    /// Kick the watchdog entry of the unit registered as `name`.
    ///
    /// Meant to be called periodically from inside that unit.
    ///
    /// # Latency
    ///
    /// The kick waits for the registry lock, which a concurrent `add` or
    /// `remove` holds for the whole provider and watchdog call sequence.  A
    /// unit kicking from another core can therefore stall for the duration
    /// of a unit creation.  Kick well inside the watchdog timeout.
    ///
    /// # Errors
    ///
    /// - [`TaskError::NotFound`] if `name` is not registered (a unit kicking
    ///   under the wrong name, or after being removed).
    /// - [`TaskError::KickFailed`] if the watchdog rejected the kick.  The
    ///   record is unchanged; escalation is up to the watchdog.
    pub fn kick(&self, name: &str) -> Result<(), TaskError> {
        let tasks = self.tasks.lock();
        let Some(record) = tasks.records.get(name) else {
            error!(task = %name, "task not found");
            return Err(TaskError::NotFound(name.to_string()));
        };
        if let Err(source) = self.watchdog.kick(record.handle()) {
            warn!(task = %name, error = %source, "failed to reset watchdog");
            return Err(TaskError::KickFailed {
                name: name.to_string(),
                source,
            });
        }
        debug!(task = %name, "watchdog kicked");
        Ok(())
    }

    /// Retire every remaining unit, leave the registry empty and close it.
    ///
    /// Once closed, [`add`](Self::add) fails with
    /// [`TaskError::RegistryClosed`]; an add that was waiting for the lock
    /// when teardown started fails the same way.  Idempotent.  Also runs
    /// when the registry is dropped.
    pub fn teardown(&self) {
        let mut tasks = self.tasks.lock();
        tasks.closed = true;
        if tasks.records.is_empty() {
            return;
        }
        let drained = std::mem::take(&mut tasks.records);
        let count = drained.len();
        for record in drained.into_values() {
            self.retire(record);
        }
        info!(count, "task registry torn down");
    }

    // ── Queries ────────────────────────────────────────────────────────────

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.lock().records.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().records.is_empty()
    }

    /// Whether [`teardown`](Self::teardown) has run.
    pub fn is_closed(&self) -> bool {
        self.tasks.lock().closed
    }

    /// Registered names in ascending order.
    pub fn names(&self) -> Vec<String> {
        self.tasks.lock().records.keys().cloned().collect()
    }

    pub fn info(&self, name: &str) -> Option<TaskInfo> {
        self.tasks.lock().records.get(name).map(TaskRecord::info)
    }

    /// Snapshot of every record, ordered by name.
    pub fn snapshot(&self) -> Vec<TaskInfo> {
        self.tasks.lock().records.values().map(TaskRecord::info).collect()
    }

    // Unsubscribe then destroy a record that has already left the map.
    // Callers hold the registry lock.
    fn retire(&self, record: TaskRecord) {
        let (name, handle) = record.into_parts();
        match self.watchdog.unsubscribe(&handle) {
            Ok(()) | Err(WatchdogError::NotSubscribed) => {}
            Err(e) => {
                warn!(task = %name, error = %e, "failed to unsubscribe task from watchdog");
            }
        }
        let id = handle.id();
        self.kernel.destroy(handle);
        info!(task = %name, unit = %id, "task deleted");
    }
}

impl Drop for TaskRegistry {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskwarden_hal::{SimKernel, SimWatchdog};
    use taskwarden_types::{CoreAffinity, KernelError};

    fn fixture() -> (TaskRegistry, Arc<SimKernel>, Arc<SimWatchdog>) {
        let kernel = Arc::new(SimKernel::new());
        let watchdog = Arc::new(SimWatchdog::new());
        let registry = TaskRegistry::new(kernel.clone(), watchdog.clone());
        (registry, kernel, watchdog)
    }

    fn add(registry: &TaskRegistry, name: &str) -> Result<UnitId, TaskError> {
        registry.add(UnitSpec::new(name), |_| {}, None)
    }

    #[test]
    fn add_creates_and_supervises() {
        let (registry, kernel, watchdog) = fixture();
        let id = registry
            .add(
                UnitSpec::new("sensorTask").priority(10).core(CoreAffinity::Core(1)).stack_size(3072),
                |_| {},
                None,
            )
            .unwrap();

        assert!(registry.contains("sensorTask"));
        assert!(kernel.is_alive(id));
        assert!(watchdog.is_subscribed(id));

        let spec = kernel.spec_of(id).unwrap();
        assert_eq!(spec.priority, 10);
        assert_eq!(spec.core_affinity, CoreAffinity::Core(1));
        assert_eq!(spec.stack_size, 3072);
    }

    #[test]
    fn duplicate_name_is_rejected_and_original_kept() {
        let (registry, kernel, watchdog) = fixture();
        let original = add(&registry, "x").unwrap();

        let err = add(&registry, "x").unwrap_err();
        assert_eq!(err, TaskError::NameInUse("x".to_string()));

        assert_eq!(registry.info("x").unwrap().unit_id, original);
        assert!(kernel.is_alive(original));
        assert!(watchdog.is_subscribed(original));
        // The rejected add never reached the kernel.
        assert_eq!(kernel.created().len(), 1);
    }

    #[test]
    fn creation_failure_leaves_registry_unchanged() {
        let (registry, kernel, watchdog) = fixture();
        add(&registry, "a").unwrap();

        kernel.fail_next_create(KernelError::OutOfMemory);
        let err = add(&registry, "b").unwrap_err();
        assert!(matches!(
            err,
            TaskError::CreationFailed { ref name, source: KernelError::OutOfMemory } if name == "b"
        ));
        assert_eq!(registry.names(), vec!["a".to_string()]);
        assert_eq!(watchdog.subscribed_count(), 1);
        assert_eq!(kernel.live_count(), 1);
    }

    #[test]
    fn supervision_failure_rolls_back_the_unit() {
        let (registry, kernel, watchdog) = fixture();

        watchdog.fail_next_subscribe(WatchdogError::Exhausted);
        let err = add(&registry, "led").unwrap_err();
        assert!(matches!(err, TaskError::SupervisionFailed { source: WatchdogError::Exhausted, .. }));

        assert!(registry.is_empty());
        assert_eq!(kernel.live_count(), 0);
        let id = kernel.created()[0];
        assert_eq!(kernel.destroy_count(id), 1);
        assert!(!watchdog.is_subscribed(id));

        // The name is free again.
        assert!(add(&registry, "led").is_ok());
    }

    #[test]
    fn remove_unsubscribes_then_destroys() {
        let (registry, kernel, watchdog) = fixture();
        let id = add(&registry, "worker1").unwrap();

        registry.remove("worker1").unwrap();
        assert!(!registry.contains("worker1"));
        assert!(!watchdog.is_subscribed(id));
        assert_eq!(watchdog.unsubscribe_count(id), 1);
        assert_eq!(kernel.destroy_count(id), 1);
    }

    #[test]
    fn remove_unknown_is_not_found_and_harmless() {
        let (registry, kernel, watchdog) = fixture();
        let id = add(&registry, "a").unwrap();

        assert_eq!(registry.remove("x"), Err(TaskError::NotFound("x".to_string())));
        assert!(registry.contains("a"));
        assert!(kernel.is_alive(id));
        assert!(watchdog.is_subscribed(id));
    }

    #[test]
    fn kick_known_task_reaches_watchdog() {
        let (registry, _kernel, watchdog) = fixture();
        let id = add(&registry, "monitor").unwrap();
        let before = registry.info("monitor").unwrap();

        registry.kick("monitor").unwrap();
        registry.kick("monitor").unwrap();

        assert_eq!(watchdog.kick_count(id), 2);
        assert_eq!(registry.info("monitor").unwrap(), before);
    }

    #[test]
    fn kick_unknown_is_not_found() {
        let (registry, _kernel, watchdog) = fixture();
        assert_eq!(registry.kick("ghost"), Err(TaskError::NotFound("ghost".to_string())));
        assert_eq!(watchdog.stale_kicks(), 0);
    }

    #[test]
    fn kick_failure_is_reported_without_mutation() {
        let (registry, kernel, watchdog) = fixture();
        let id = add(&registry, "compute").unwrap();

        watchdog.fail_kicks(Some(WatchdogError::Fault("timer busy".into())));
        let err = registry.kick("compute").unwrap_err();
        assert!(matches!(err, TaskError::KickFailed { ref name, .. } if name == "compute"));

        assert!(registry.contains("compute"));
        assert!(kernel.is_alive(id));
        assert!(watchdog.is_subscribed(id));
    }

    #[test]
    fn teardown_retires_everything_once() {
        let (registry, kernel, watchdog) = fixture();
        let ids: Vec<UnitId> = ["a", "b", "c"].iter().map(|n| add(&registry, n).unwrap()).collect();

        registry.teardown();
        registry.teardown();

        assert!(registry.is_empty());
        for id in ids {
            assert_eq!(kernel.destroy_count(id), 1);
            assert!(watchdog.unsubscribe_count(id) <= 1);
        }
        assert_eq!(watchdog.subscribed_count(), 0);
    }

    #[test]
    fn drop_tears_down() {
        let (registry, kernel, watchdog) = fixture();
        let id = add(&registry, "a").unwrap();
        drop(registry);
        assert_eq!(kernel.destroy_count(id), 1);
        assert!(!watchdog.is_subscribed(id));
    }

    #[test]
    fn snapshot_is_sorted_by_name() {
        let (registry, _kernel, _watchdog) = fixture();
        for name in ["monitor", "compute", "sensorTask"] {
            add(&registry, name).unwrap();
        }
        let names: Vec<String> = registry.snapshot().into_iter().map(|i| i.name).collect();
        assert_eq!(names, vec!["compute", "monitor", "sensorTask"]);
        assert_eq!(registry.names(), names);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn add_after_teardown_is_rejected() {
        let (registry, kernel, watchdog) = fixture();
        add(&registry, "a").unwrap();
        registry.teardown();
        assert!(registry.is_closed());

        assert_eq!(add(&registry, "late"), Err(TaskError::RegistryClosed("late".to_string())));
        assert!(registry.is_empty());
        assert_eq!(kernel.live_count(), 0);
        assert_eq!(kernel.created().len(), 1);
        assert_eq!(watchdog.subscribed_count(), 0);
    }

    #[test]
    fn teardown_of_empty_registry_still_closes_it() {
        let (registry, kernel, _watchdog) = fixture();
        registry.teardown();
        assert!(matches!(add(&registry, "a"), Err(TaskError::RegistryClosed(_))));
        assert!(kernel.created().is_empty());
    }

    #[test]
    fn remove_tolerates_not_subscribed() {
        let (registry, kernel, watchdog) = fixture();
        let id = add(&registry, "worker2").unwrap();

        watchdog.fail_next_unsubscribe(WatchdogError::NotSubscribed);
        registry.remove("worker2").unwrap();

        assert!(!registry.contains("worker2"));
        assert_eq!(kernel.destroy_count(id), 1);
        assert!(!kernel.is_alive(id));
    }

    #[test]
    fn remove_destroys_even_when_unsubscribe_faults() {
        let (registry, kernel, watchdog) = fixture();
        let id = add(&registry, "worker3").unwrap();

        watchdog.fail_next_unsubscribe(WatchdogError::Fault("bus error".into()));
        registry.remove("worker3").unwrap();

        assert!(!registry.contains("worker3"));
        assert_eq!(kernel.destroy_count(id), 1);
        assert_eq!(registry.remove("worker3"), Err(TaskError::NotFound("worker3".to_string())));
        assert_eq!(kernel.destroy_count(id), 1);
    }

    #[test]
    fn teardown_destroys_every_unit_despite_unsubscribe_errors() {
        let (registry, kernel, watchdog) = fixture();
        let ids: Vec<UnitId> = ["a", "b"].iter().map(|n| add(&registry, n).unwrap()).collect();

        watchdog.fail_next_unsubscribe(WatchdogError::Fault("bus error".into()));
        registry.teardown();

        assert!(registry.is_empty());
        assert_eq!(kernel.live_count(), 0);
        for id in ids {
            assert_eq!(kernel.destroy_count(id), 1);
        }
    }

    #[test]
    fn teardown_tolerates_not_subscribed() {
        let (registry, kernel, watchdog) = fixture();
        let id = add(&registry, "a").unwrap();

        watchdog.fail_next_unsubscribe(WatchdogError::NotSubscribed);
        registry.teardown();

        assert!(registry.is_empty());
        assert_eq!(kernel.destroy_count(id), 1);
    }
}
