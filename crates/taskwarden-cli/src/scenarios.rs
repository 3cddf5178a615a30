//! Demo workloads started from the REPL.
//!
//! Every worker runs as a supervised unit on the host thread backend and
//! kicks its own watchdog through a `Weak<TaskRegistry>`.  A worker exits
//! when the registry forgets it (kick returns `NotFound`), when the registry
//! itself is gone, or when the backend raises its stop flag.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use taskwarden_hal::thread as unit;
use taskwarden_runtime::TaskRegistry;
use taskwarden_types::{CoreAffinity, TaskError, TaskParam, UnitId, UnitSpec};
use tracing::{debug, info, warn};

// ─────────────────────────────────────────────────────────────────────────────
// Shared helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Kick `name`.  Returns `false` once the unit should exit.
fn kick(registry: &Weak<TaskRegistry>, name: &str) -> bool {
    let Some(registry) = registry.upgrade() else {
        return false;
    };
    match registry.kick(name) {
        Ok(()) => true,
        Err(TaskError::NotFound(_)) => false,
        Err(e) => {
            warn!(task = name, error = %e, "kick failed");
            true
        }
    }
}

/// Run `step`, kick, sleep `period`; repeat until the unit must exit.
fn heartbeat(registry: &Weak<TaskRegistry>, name: &str, period: Duration, mut step: impl FnMut()) {
    loop {
        step();
        if !kick(registry, name) || !unit::sleep_unless_stopped(period) {
            break;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Single units
// ─────────────────────────────────────────────────────────────────────────────

/// Add a unit that does nothing but kick its watchdog every `period`.
pub fn spawn_heartbeat(
    registry: &Arc<TaskRegistry>,
    spec: UnitSpec,
    period: Duration,
) -> Result<UnitId, TaskError> {
    let weak = Arc::downgrade(registry);
    let name = spec.name.clone();
    registry.add(
        spec,
        move |_| {
            let mut beats = 0u64;
            heartbeat(&weak, &name, period, || {
                beats += 1;
                debug!(task = %name, beats, "heartbeat");
            });
        },
        None,
    )
}

/// Add a unit that never kicks, so the supervisor reports it once the
/// watchdog timeout has elapsed.
pub fn spawn_stalled(registry: &Arc<TaskRegistry>, spec: UnitSpec) -> Result<UnitId, TaskError> {
    let name = spec.name.clone();
    registry.add(
        spec,
        move |_| {
            warn!(task = %name, "unit is stalled and will not kick its watchdog");
            while unit::sleep_unless_stopped(Duration::from_millis(100)) {}
        },
        None,
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Multi-task demo
// ─────────────────────────────────────────────────────────────────────────────

/// Sensor reading shared between the multi-task demo units.
#[derive(Debug, Default)]
struct SensorState {
    reading: AtomicU32,
}

fn sensor_of(param: Option<TaskParam>) -> Arc<SensorState> {
    param
        .and_then(|p| p.downcast::<SensorState>().ok())
        .unwrap_or_default()
}

/// Start the four-unit demo: a sensor sampler, an LED blinker driven by the
/// sensor, a periodic system monitor and a compute loop.
///
/// Returns one result per unit, in start order.
pub fn start_multi(registry: &Arc<TaskRegistry>) -> Vec<(String, Result<UnitId, TaskError>)> {
    let sensor: TaskParam = Arc::new(SensorState::default());
    let mut results = Vec::with_capacity(4);

    let weak = Arc::downgrade(registry);
    let spec = UnitSpec::new("sensorTask").priority(10).core(CoreAffinity::Core(1)).stack_size(3072);
    results.push((
        spec.name.clone(),
        registry.add(spec, move |p| sensor_task(weak, sensor_of(p)), Some(sensor.clone())),
    ));

    let weak = Arc::downgrade(registry);
    let spec = UnitSpec::new("ledControl").priority(5).core(CoreAffinity::Core(0)).stack_size(2048);
    results.push((
        spec.name.clone(),
        registry.add(spec, move |p| led_task(weak, sensor_of(p)), Some(sensor.clone())),
    ));

    let weak = Arc::downgrade(registry);
    let spec = UnitSpec::new("monitor").priority(2).core(CoreAffinity::Core(1)).stack_size(4096);
    results.push((
        spec.name.clone(),
        registry.add(spec, move |p| monitor_task(weak, sensor_of(p)), Some(sensor)),
    ));

    let weak = Arc::downgrade(registry);
    let spec = UnitSpec::new("compute").priority(3).core(CoreAffinity::Core(0)).stack_size(3072);
    results.push((spec.name.clone(), registry.add(spec, move |_| compute_task(weak), None)));

    results
}

fn sensor_task(registry: Weak<TaskRegistry>, sensor: Arc<SensorState>) {
    let mut samples = 0u64;
    heartbeat(&registry, "sensorTask", Duration::from_millis(50), || {
        let reading = (sensor.reading.load(Ordering::Relaxed) + 1) % 101;
        sensor.reading.store(reading, Ordering::Relaxed);
        samples += 1;
        if samples % 20 == 0 {
            info!(task = "sensorTask", reading, "sensor sample");
        }
    });
}

fn led_task(registry: Weak<TaskRegistry>, sensor: Arc<SensorState>) {
    let mut lit = false;
    loop {
        lit = !lit;
        let reading = sensor.reading.load(Ordering::Relaxed);
        debug!(task = "ledControl", lit, reading, "led toggled");
        // Blink fast while the reading is high.
        let period = if reading > 50 {
            Duration::from_millis(100)
        } else {
            Duration::from_millis(500)
        };
        if !kick(&registry, "ledControl") || !unit::sleep_unless_stopped(period) {
            break;
        }
    }
}

fn monitor_task(registry: Weak<TaskRegistry>, sensor: Arc<SensorState>) {
    let started = Instant::now();
    let mut ticks = 0u64;
    heartbeat(&registry, "monitor", Duration::from_secs(1), || {
        ticks += 1;
        if ticks % 5 != 0 {
            return;
        }
        let tasks = registry.upgrade().map(|r| r.len()).unwrap_or_default();
        info!(
            task = "monitor",
            uptime_s = started.elapsed().as_secs(),
            reading = sensor.reading.load(Ordering::Relaxed),
            tasks,
            "system status"
        );
    });
}

fn compute_task(registry: Weak<TaskRegistry>) {
    let mut iteration = 0u64;
    let mut acc = 0u64;
    heartbeat(&registry, "compute", Duration::from_millis(10), || {
        iteration += 1;
        acc = acc.wrapping_add(iteration.wrapping_mul(iteration));
        if iteration % 100 == 0 {
            debug!(task = "compute", iteration, acc, "compute progress");
        }
        if iteration >= 1000 {
            iteration = 0;
        }
    });
}

// ─────────────────────────────────────────────────────────────────────────────
// Lifecycle demo
// ─────────────────────────────────────────────────────────────────────────────

/// Name of the unit that drives the lifecycle demo.
pub const LIFECYCLE_MANAGER: &str = "taskManager";

const CYCLE: Duration = Duration::from_secs(3);
const IDLE_KICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy)]
struct WorkerPlan {
    name: &'static str,
    priority: u32,
    core: u8,
    stack_size: usize,
    /// `None` runs until the manager clears the running flag.
    iterations: Option<u32>,
    period: Duration,
}

const WORKERS: [WorkerPlan; 3] = [
    WorkerPlan {
        name: "worker1",
        priority: 5,
        core: 1,
        stack_size: 3072,
        iterations: Some(50),
        period: Duration::from_millis(100),
    },
    WorkerPlan {
        name: "worker2",
        priority: 5,
        core: 0,
        stack_size: 2048,
        iterations: Some(20),
        period: Duration::from_millis(500),
    },
    WorkerPlan {
        name: "worker3",
        priority: 3,
        core: 1,
        stack_size: 3072,
        iterations: None,
        period: Duration::from_millis(200),
    },
];

fn worker(registry: Weak<TaskRegistry>, plan: WorkerPlan, running: Arc<AtomicBool>) {
    info!(task = plan.name, "worker started");
    let mut done = 0u32;
    while running.load(Ordering::SeqCst) {
        done += 1;
        debug!(task = plan.name, iteration = done, "worker iteration");
        if plan.iterations.is_some_and(|limit| done >= limit) {
            info!(task = plan.name, iterations = done, "worker completed");
            running.store(false, Ordering::SeqCst);
        }
        if !kick(&registry, plan.name) || !unit::sleep_unless_stopped(plan.period) {
            return;
        }
    }
    // Finished work stays supervised until the manager removes it.
    heartbeat(&registry, plan.name, IDLE_KICK, || {});
}

fn add_worker(
    registry: &Arc<TaskRegistry>,
    plan: WorkerPlan,
    running: &Arc<AtomicBool>,
) -> Result<UnitId, TaskError> {
    running.store(true, Ordering::SeqCst);
    let weak = Arc::downgrade(registry);
    let flag: TaskParam = running.clone();
    let spec = UnitSpec::new(plan.name)
        .priority(plan.priority)
        .core(CoreAffinity::Core(plan.core))
        .stack_size(plan.stack_size);
    let result = registry.add(
        spec,
        move |p| {
            let running = p
                .and_then(|p| p.downcast::<AtomicBool>().ok())
                .unwrap_or_else(|| Arc::new(AtomicBool::new(false)));
            worker(weak, plan, running);
        },
        Some(flag),
    );
    if result.is_err() {
        running.store(false, Ordering::SeqCst);
    }
    result
}

fn remove_if_finished(registry: &TaskRegistry, plan: WorkerPlan, running: &AtomicBool) {
    if running.load(Ordering::SeqCst) {
        warn!(task = plan.name, "worker still running; removal skipped");
        return;
    }
    if let Err(e) = registry.remove(plan.name) {
        warn!(task = plan.name, error = %e, "worker removal failed");
    }
}

/// Start the lifecycle demo.
///
/// A manager unit walks a fixed schedule of one step per cycle: it adds the
/// three workers, removes the two finite ones once they finish, stops and
/// removes the third, then re-creates all of them.
pub fn start_lifecycle(registry: &Arc<TaskRegistry>) -> Result<UnitId, TaskError> {
    let weak = Arc::downgrade(registry);
    let spec = UnitSpec::new(LIFECYCLE_MANAGER)
        .priority(8)
        .core(CoreAffinity::Core(0))
        .stack_size(4096);
    registry.add(spec, move |_| lifecycle_manager(weak), None)
}

fn lifecycle_manager(registry: Weak<TaskRegistry>) {
    let running: [Arc<AtomicBool>; 3] = Default::default();
    let mut cycle = 0u32;

    heartbeat(&registry, LIFECYCLE_MANAGER, CYCLE, || {
        let Some(reg) = registry.upgrade() else {
            return;
        };
        cycle += 1;
        let start = |i: usize| {
            if let Err(e) = add_worker(&reg, WORKERS[i], &running[i]) {
                warn!(task = WORKERS[i].name, error = %e, "worker creation failed");
            }
        };
        match cycle {
            1 => start(0),
            3 => start(1),
            5 => start(2),
            7 => remove_if_finished(&reg, WORKERS[0], &running[0]),
            9 => remove_if_finished(&reg, WORKERS[1], &running[1]),
            11 => {
                running[2].store(false, Ordering::SeqCst);
                // Let the worker leave its work loop first.
                if !unit::sleep_unless_stopped(Duration::from_secs(2)) {
                    return;
                }
                remove_if_finished(&reg, WORKERS[2], &running[2]);
            }
            13 => {
                info!(task = LIFECYCLE_MANAGER, "re-creating all workers");
                (0..WORKERS.len()).for_each(start);
            }
            _ => {}
        }
        info!(
            task = LIFECYCLE_MANAGER,
            cycle,
            tasks = reg.len(),
            names = ?reg.names(),
            "lifecycle status"
        );
    });
}
