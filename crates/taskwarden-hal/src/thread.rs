//! [`ThreadProvider`] – host execution backend on `std::thread`.
//!
//! Each execution unit runs on its own named OS thread.  A host OS cannot
//! pin threads or honour RTOS priorities portably, so `priority` and
//! `core_affinity` are recorded as advisory and logged at `debug`.
//!
//! # Destruction
//!
//! An OS thread cannot be killed from outside.  [`ThreadProvider::destroy`]
//! raises the unit's stop flag and detaches the thread; the unit is expected
//! to poll [`should_stop`] (or sleep with [`sleep_unless_stopped`]) and
//! return.  This is the cooperative-shutdown path every unit should support
//! anyway, since forced destruction never releases what a unit holds.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use taskwarden_hal::{thread, ExecutionProvider, ThreadProvider};
//! use taskwarden_types::UnitSpec;
//!
//! let provider = ThreadProvider::new();
//! let handle = provider
//!     .create(
//!         &UnitSpec::new("blinker").stack_size(4096),
//!         Box::new(|_| {
//!             while thread::sleep_unless_stopped(Duration::from_millis(5)) {}
//!         }),
//!         None,
//!     )
//!     .unwrap();
//! provider.destroy(handle);
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use taskwarden_types::{KernelError, TaskEntry, TaskParam, UnitHandle, UnitId, UnitSpec};
use tracing::debug;

use crate::provider::ExecutionProvider;

/// Smallest stack a host thread is given, in bytes.
///
/// Embedded stack budgets are sized for the target's ABI and do not carry
/// over to a hosted runtime with formatting and logging on the stack.
pub const HOST_MIN_STACK_SIZE: usize = 64 * 1024;

/// Granularity at which [`sleep_unless_stopped`] re-checks the stop flag.
const STOP_POLL: Duration = Duration::from_millis(10);

// ─────────────────────────────────────────────────────────────────────────────
// Per-unit context
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
struct UnitContext {
    id: UnitId,
    stop: Arc<AtomicBool>,
}

thread_local! {
    static CURRENT: RefCell<Option<UnitContext>> = const { RefCell::new(None) };
}

/// Identifier of the unit running on the calling thread, if any.
pub fn current_unit() -> Option<UnitId> {
    CURRENT.with(|c| c.borrow().as_ref().map(|ctx| ctx.id))
}

/// Whether the unit running on the calling thread has been destroyed.
///
/// Always `false` outside a unit created by [`ThreadProvider`].
pub fn should_stop() -> bool {
    CURRENT.with(|c| {
        c.borrow()
            .as_ref()
            .is_some_and(|ctx| ctx.stop.load(Ordering::SeqCst))
    })
}

/// Sleep for `duration`, waking early if the calling unit is destroyed.
///
/// Returns `true` when the unit should keep running.
pub fn sleep_unless_stopped(duration: Duration) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if should_stop() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep(STOP_POLL.min(deadline - now));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ThreadProvider
// ─────────────────────────────────────────────────────────────────────────────

struct LiveUnit {
    name: String,
    stop: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

/// Execution provider backed by named OS threads.
pub struct ThreadProvider {
    next_id: AtomicU64,
    units: Mutex<HashMap<UnitId, LiveUnit>>,
}

impl Default for ThreadProvider {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            units: Mutex::new(HashMap::new()),
        }
    }
}

impl ThreadProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of units created and not yet destroyed.
    pub fn live_count(&self) -> usize {
        self.units.lock().len()
    }

    /// Whether the entry routine of live unit `id` has returned.
    ///
    /// `None` when `id` is not a live unit of this provider.
    pub fn is_finished(&self, id: UnitId) -> Option<bool> {
        self.units.lock().get(&id).map(|u| u.join.is_finished())
    }
}

impl ExecutionProvider for ThreadProvider {
    fn create(
        &self,
        spec: &UnitSpec,
        entry: TaskEntry,
        param: Option<TaskParam>,
    ) -> Result<UnitHandle, KernelError> {
        if spec.name.is_empty() {
            return Err(KernelError::InvalidParameter("name must not be empty".into()));
        }
        if spec.name.contains('\0') {
            return Err(KernelError::InvalidParameter("name must not contain NUL bytes".into()));
        }
        if spec.stack_size == 0 {
            return Err(KernelError::InvalidParameter("stack_size must be non-zero".into()));
        }

        let id = UnitId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let stop = Arc::new(AtomicBool::new(false));
        let ctx = UnitContext {
            id,
            stop: stop.clone(),
        };

        debug!(
            task = %spec.name,
            unit = %id,
            priority = spec.priority,
            core = %spec.core_affinity,
            stack_size = spec.stack_size,
            "priority and core affinity are advisory on the host"
        );

        let join = std::thread::Builder::new()
            .name(spec.name.clone())
            .stack_size(spec.stack_size.max(HOST_MIN_STACK_SIZE))
            .spawn(move || {
                CURRENT.with(|c| *c.borrow_mut() = Some(ctx));
                entry(param);
            })
            .map_err(|e| KernelError::Spawn(e.to_string()))?;

        self.units.lock().insert(
            id,
            LiveUnit {
                name: spec.name.clone(),
                stop,
                join,
            },
        );
        // SAFETY: `id` was just taken from `next_id` and is minted once.
        Ok(unsafe { UnitHandle::from_raw(id.0) })
    }

    fn destroy(&self, handle: UnitHandle) {
        let Some(unit) = self.units.lock().remove(&handle.id()) else {
            return;
        };
        unit.stop.store(true, Ordering::SeqCst);
        debug!(
            task = %unit.name,
            unit = %handle.id(),
            finished = unit.join.is_finished(),
            "stop raised, thread detached"
        );
        // Dropping the JoinHandle detaches the thread.
    }
}

impl Drop for ThreadProvider {
    fn drop(&mut self) {
        for unit in self.units.get_mut().values() {
            unit.stop.store(true, Ordering::SeqCst);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
