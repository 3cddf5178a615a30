//! [`Supervisor`] – owns the task registry and watches its watchdog.
//!
//! The supervisor wires a [`TaskRegistry`] to a [`SoftWatchdog`] and runs a
//! monitor thread that polls [`SoftWatchdog::check_all`].  Starved units are
//! handed to an escalation hook once per starvation episode: a unit is
//! reported when its deadline passes and becomes reportable again only after
//! it has been kicked.
//!
//! The default hook logs at `error`.  On a device the equivalent is the
//! hardware watchdog resetting the chip; the registry itself never
//! escalates.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use taskwarden_hal::SimKernel;
//! use taskwarden_runtime::{Supervisor, SupervisorConfig};
//! use taskwarden_types::UnitSpec;
//!
//! let mut supervisor = Supervisor::start(SupervisorConfig::default(), Arc::new(SimKernel::new())).unwrap();
//! let registry = supervisor.registry();
//! registry.add(UnitSpec::new("monitor").priority(2), |_| {}, None).unwrap();
//! registry.kick("monitor").unwrap();
//!
//! supervisor.shutdown();
//! assert!(registry.is_empty());
//! ```

use std::collections::HashSet;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use taskwarden_hal::ExecutionProvider;
use taskwarden_kernel::{SoftWatchdog, TaskRegistry};
use taskwarden_types::{TaskInfo, UnitId};
use tracing::{error, info};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Shortest monitor poll period; zero would spin the monitor thread.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Tunables of a [`Supervisor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Longest a subscribed unit may go without kicking.
    pub watchdog_timeout: Duration,
    /// How often the monitor thread checks for starved units.
    pub poll_interval: Duration,
    /// Watchdog subscription slots.
    pub max_subscribers: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            watchdog_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(500),
            max_subscribers: 16,
        }
    }
}

/// Called by the monitor with the registered units whose watchdog expired.
pub type EscalationHook = Arc<dyn Fn(&[TaskInfo]) + Send + Sync>;

fn log_expiry(starved: &[TaskInfo]) {
    for task in starved {
        error!(
            task = %task.name,
            unit = %task.unit_id,
            "task watchdog expired; a hardware watchdog would reset the device"
        );
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Supervisor
// ─────────────────────────────────────────────────────────────────────────────

/// Registry owner and watchdog monitor.
pub struct Supervisor {
    registry: Arc<TaskRegistry>,
    watchdog: Arc<SoftWatchdog>,
    stop: Arc<AtomicBool>,
    monitor: Option<JoinHandle<()>>,
}

impl Supervisor {
    /// Start a supervisor over `kernel` with the default escalation hook.
    pub fn start(config: SupervisorConfig, kernel: Arc<dyn ExecutionProvider>) -> io::Result<Self> {
        Self::with_escalation(config, kernel, Arc::new(log_expiry))
    }

    /// Start a supervisor whose monitor reports expiries to `hook`.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the monitor thread cannot be spawned.
    pub fn with_escalation(
        config: SupervisorConfig,
        kernel: Arc<dyn ExecutionProvider>,
        hook: EscalationHook,
    ) -> io::Result<Self> {
        let watchdog = Arc::new(SoftWatchdog::new(config.watchdog_timeout, config.max_subscribers));
        let registry = Arc::new(TaskRegistry::new(kernel, watchdog.clone()));
        let stop = Arc::new(AtomicBool::new(false));

        let poll_interval = config.poll_interval.max(MIN_POLL_INTERVAL);
        let monitor = {
            let registry = registry.clone();
            let watchdog = watchdog.clone();
            let stop = stop.clone();
            std::thread::Builder::new()
                .name("taskwarden-monitor".to_string())
                .spawn(move || {
                    run_monitor(&registry, &watchdog, &stop, poll_interval, &*hook)
                })?
        };

        info!(
            timeout_ms = config.watchdog_timeout.as_millis() as u64,
            poll_ms = poll_interval.as_millis() as u64,
            max_subscribers = config.max_subscribers,
            "supervisor started"
        );

        Ok(Self {
            registry,
            watchdog,
            stop,
            monitor: Some(monitor),
        })
    }

    /// Shared handle to the task registry.
    pub fn registry(&self) -> Arc<TaskRegistry> {
        self.registry.clone()
    }

    pub fn watchdog(&self) -> &SoftWatchdog {
        &self.watchdog
    }

    /// Stop the monitor and tear down every registered unit.  The registry
    /// is closed afterwards, so holders of [`registry`](Self::registry)
    /// cannot add units that nothing would watch.  Idempotent.
    pub fn shutdown(&mut self) {
        if let Some(monitor) = self.monitor.take() {
            self.stop.store(true, Ordering::SeqCst);
            monitor.thread().unpark();
            if monitor.join().is_err() {
                error!("watchdog monitor thread panicked");
            }
            self.registry.teardown();
            info!("supervisor stopped");
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Monitor loop
// ─────────────────────────────────────────────────────────────────────────────

fn run_monitor(
    registry: &TaskRegistry,
    watchdog: &SoftWatchdog,
    stop: &AtomicBool,
    poll_interval: Duration,
    hook: &(dyn Fn(&[TaskInfo]) + Send + Sync),
) {
    let mut reported: HashSet<UnitId> = HashSet::new();

    while !stop.load(Ordering::SeqCst) {
        let expired: HashSet<UnitId> = watchdog.check_all().into_iter().collect();
        // Kicked (or removed) units become reportable again.
        reported.retain(|id| expired.contains(id));

        let fresh: Vec<TaskInfo> = registry
            .snapshot()
            .into_iter()
            .filter(|task| expired.contains(&task.unit_id) && reported.insert(task.unit_id))
            .collect();
        if !fresh.is_empty() {
            hook(&fresh);
        }

        std::thread::park_timeout(poll_interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Instant;
    use taskwarden_hal::SimKernel;
    use taskwarden_types::UnitSpec;

    fn fast_config() -> SupervisorConfig {
        SupervisorConfig {
            watchdog_timeout: Duration::from_millis(30),
            poll_interval: Duration::from_millis(5),
            max_subscribers: 4,
        }
    }

    fn recording_hook() -> (EscalationHook, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let hook: EscalationHook = Arc::new(move |starved: &[TaskInfo]| {
            sink.lock().extend(starved.iter().map(|t| t.name.clone()));
        });
        (hook, seen)
    }

    fn wait_for(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn starved_unit_is_reported_once_per_episode() {
        let (hook, seen) = recording_hook();
        let mut supervisor =
            Supervisor::with_escalation(fast_config(), Arc::new(SimKernel::new()), hook).unwrap();
        let registry = supervisor.registry();
        registry.add(UnitSpec::new("stalled"), |_| {}, None).unwrap();

        wait_for(|| !seen.lock().is_empty());
        // Several more polls while still starved: no duplicate report.
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(*seen.lock(), vec!["stalled".to_string()]);

        // A kick re-arms the unit; starving again yields a second report.
        registry.kick("stalled").unwrap();
        wait_for(|| seen.lock().len() == 2);

        supervisor.shutdown();
    }

    #[test]
    fn kicked_unit_is_not_reported() {
        let (hook, seen) = recording_hook();
        let config = SupervisorConfig {
            watchdog_timeout: Duration::from_millis(500),
            ..fast_config()
        };
        let mut supervisor =
            Supervisor::with_escalation(config, Arc::new(SimKernel::new()), hook).unwrap();
        let registry = supervisor.registry();
        registry.add(UnitSpec::new("healthy"), |_| {}, None).unwrap();

        for _ in 0..10 {
            registry.kick("healthy").unwrap();
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(seen.lock().is_empty());
        supervisor.shutdown();
    }

    #[test]
    fn shutdown_tears_down_registry() {
        let kernel = Arc::new(SimKernel::new());
        let mut supervisor = Supervisor::start(SupervisorConfig::default(), kernel.clone()).unwrap();
        let registry = supervisor.registry();
        registry.add(UnitSpec::new("a"), |_| {}, None).unwrap();
        registry.add(UnitSpec::new("b"), |_| {}, None).unwrap();
        assert_eq!(supervisor.watchdog().subscribed_count(), 2);

        supervisor.shutdown();
        supervisor.shutdown();

        assert!(registry.is_empty());
        assert_eq!(kernel.live_count(), 0);
        assert_eq!(supervisor.watchdog().subscribed_count(), 0);
    }

    #[test]
    fn watchdog_capacity_limits_registry() {
        let kernel = Arc::new(SimKernel::new());
        let config = SupervisorConfig {
            max_subscribers: 1,
            ..SupervisorConfig::default()
        };
        let supervisor = Supervisor::start(config, kernel.clone()).unwrap();
        let registry = supervisor.registry();

        registry.add(UnitSpec::new("first"), |_| {}, None).unwrap();
        let err = registry.add(UnitSpec::new("second"), |_| {}, None).unwrap_err();
        assert!(matches!(err, taskwarden_types::TaskError::SupervisionFailed { .. }));
        // The second unit was rolled back.
        assert_eq!(kernel.live_count(), 1);
    }

    #[test]
    fn registry_rejects_adds_after_shutdown() {
        let kernel = Arc::new(SimKernel::new());
        let mut supervisor = Supervisor::start(SupervisorConfig::default(), kernel.clone()).unwrap();
        let registry = supervisor.registry();

        supervisor.shutdown();
        let err = registry.add(UnitSpec::new("late"), |_| {}, None).unwrap_err();
        assert_eq!(err, taskwarden_types::TaskError::RegistryClosed("late".to_string()));

        drop(supervisor);
        assert_eq!(kernel.live_count(), 0);
        assert!(kernel.created().is_empty());
    }

    #[test]
    fn zero_poll_interval_does_not_stall_shutdown() {
        let config = SupervisorConfig {
            poll_interval: Duration::ZERO,
            ..fast_config()
        };
        let mut supervisor = Supervisor::start(config, Arc::new(SimKernel::new())).unwrap();
        supervisor.registry().add(UnitSpec::new("a"), |_| {}, None).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        supervisor.shutdown();
        assert!(supervisor.registry().is_closed());
    }
}
