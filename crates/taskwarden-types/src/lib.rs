//! `taskwarden-types` – shared vocabulary for the TaskWarden workspace.
//!
//! Execution-unit identity ([`UnitId`], [`UnitHandle`]), creation
//! parameters ([`UnitSpec`], [`CoreAffinity`]), the entry-routine types
//! handed to an execution provider, and the error taxonomy returned by the
//! task registry and its collaborators.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Unit identity
// ─────────────────────────────────────────────────────────────────────────────

/// Copyable identifier of an execution unit.
///
/// Safe to log, compare and store anywhere.  It grants no authority over the
/// unit; only the owning [`UnitHandle`] can be used to destroy it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnitId(pub u64);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit#{}", self.0)
    }
}

/// Owned reference to a live execution unit.
///
/// `UnitHandle` is deliberately neither `Clone` nor `Copy`.  An execution
/// provider mints exactly one handle per created unit, and destroying the
/// unit consumes the handle, so a unit cannot be destroyed twice or
/// referenced after destruction.
#[derive(Debug, PartialEq, Eq)]
pub struct UnitHandle {
    id: UnitId,
}

impl UnitHandle {
    /// Mint a handle for a freshly created unit.
    ///
    /// Handles are ownership tokens, in the same sense as
    /// `OwnedFd::from_raw_fd`: a second handle for the same unit lets its
    /// holder destroy a unit that someone else still owns.  Minting is
    /// therefore `unsafe` and cannot happen by accident.
    ///
    /// # Safety
    ///
    /// `raw` must identify a unit the caller has just created, and no other
    /// live `UnitHandle` may exist for that unit.  Execution providers call
    /// this exactly once per unit, from `create`.
    ///
    /// Safe code cannot forge a handle:
    ///
    /// ```compile_fail,E0133
    /// use taskwarden_types::UnitHandle;
    ///
    /// let forged = UnitHandle::from_raw(1);
    /// ```
    pub unsafe fn from_raw(raw: u64) -> Self {
        Self { id: UnitId(raw) }
    }

    /// Identifier of the unit this handle owns.
    pub fn id(&self) -> UnitId {
        self.id
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Creation parameters
// ─────────────────────────────────────────────────────────────────────────────

/// Physical core an execution unit is pinned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoreAffinity {
    /// Pinned to the given core index.
    Core(u8),
    /// No preference; the scheduler may run the unit on any core.
    Any,
}

impl Default for CoreAffinity {
    fn default() -> Self {
        CoreAffinity::Core(0)
    }
}

impl fmt::Display for CoreAffinity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreAffinity::Core(n) => write!(f, "core {n}"),
            CoreAffinity::Any => write!(f, "any"),
        }
    }
}

/// Default scheduling priority for a new unit.
pub const DEFAULT_PRIORITY: u32 = 1;

/// Default stack reservation for a new unit, in bytes.
pub const DEFAULT_STACK_SIZE: usize = 1024;

/// Creation parameters of a named execution unit.
///
/// # Example
///
/// ```
/// use taskwarden_types::{CoreAffinity, UnitSpec};
///
/// let spec = UnitSpec::new("sensor")
///     .priority(10)
///     .core(CoreAffinity::Core(1))
///     .stack_size(3072);
///
/// assert_eq!(spec.name, "sensor");
/// assert_eq!(spec.priority, 10);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitSpec {
    /// Unique registry key, also used as the unit's name in the kernel.
    pub name: String,
    /// Scheduling priority (higher runs first).
    pub priority: u32,
    /// Core the unit is pinned to.
    pub core_affinity: CoreAffinity,
    /// Bytes reserved for the unit's call stack.
    pub stack_size: usize,
}

impl UnitSpec {
    /// Spec with the default priority, core and stack size.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority: DEFAULT_PRIORITY,
            core_affinity: CoreAffinity::default(),
            stack_size: DEFAULT_STACK_SIZE,
        }
    }

    pub fn priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn core(mut self, core_affinity: CoreAffinity) -> Self {
        self.core_affinity = core_affinity;
        self
    }

    pub fn stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }
}

/// Opaque parameter handed to a unit's entry routine.
pub type TaskParam = Arc<dyn Any + Send + Sync>;

/// Entry routine of an execution unit.  Runs once, in the unit's own
/// execution context, and receives the optional parameter given at creation.
pub type TaskEntry = Box<dyn FnOnce(Option<TaskParam>) + Send + 'static>;

// ─────────────────────────────────────────────────────────────────────────────
// Snapshots
// ─────────────────────────────────────────────────────────────────────────────

/// Read-only snapshot of one registered unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub name: String,
    pub unit_id: UnitId,
    pub priority: u32,
    pub core_affinity: CoreAffinity,
    pub stack_size: usize,
    pub created_at: DateTime<Utc>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Failures reported by an execution provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    #[error("invalid unit parameter: {0}")]
    InvalidParameter(String),

    #[error("not enough memory to create the unit")]
    OutOfMemory,

    #[error("unit could not be spawned: {0}")]
    Spawn(String),
}

/// Failures reported by a watchdog facility.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WatchdogError {
    #[error("unit is not subscribed to the watchdog")]
    NotSubscribed,

    #[error("unit is already subscribed to the watchdog")]
    AlreadySubscribed,

    #[error("watchdog has no free subscription slots")]
    Exhausted,

    #[error("watchdog fault: {0}")]
    Fault(String),
}

/// Errors returned by the task registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("task name already in use: {0}")]
    NameInUse(String),

    #[error("task not found: {0}")]
    NotFound(String),

    #[error("failed to create task {name}: {source}")]
    CreationFailed {
        name: String,
        #[source]
        source: KernelError,
    },

    #[error("failed to subscribe task {name} to the watchdog: {source}")]
    SupervisionFailed {
        name: String,
        #[source]
        source: WatchdogError,
    },

    #[error("failed to kick watchdog for task {name}: {source}")]
    KickFailed {
        name: String,
        #[source]
        source: WatchdogError,
    },

    /// The registry has been torn down and accepts no new tasks.
    #[error("task registry is closed; {0} was not created")]
    RegistryClosed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_spec_defaults_match_kernel_defaults() {
        let spec = UnitSpec::new("worker");
        assert_eq!(spec.priority, DEFAULT_PRIORITY);
        assert_eq!(spec.core_affinity, CoreAffinity::Core(0));
        assert_eq!(spec.stack_size, DEFAULT_STACK_SIZE);
    }

    #[test]
    fn unit_spec_builder_overrides_fields() {
        let spec = UnitSpec::new("monitor")
            .priority(2)
            .core(CoreAffinity::Any)
            .stack_size(4096);
        assert_eq!(spec.priority, 2);
        assert_eq!(spec.core_affinity, CoreAffinity::Any);
        assert_eq!(spec.stack_size, 4096);
    }

    #[test]
    fn unit_handle_exposes_id() {
        // SAFETY: the only handle for unit 7; it never reaches a provider.
        let handle = unsafe { UnitHandle::from_raw(7) };
        assert_eq!(handle.id(), UnitId(7));
        assert_eq!(handle.id().to_string(), "unit#7");
    }

    #[test]
    fn core_affinity_serializes_lowercase() {
        let json = serde_json::to_string(&CoreAffinity::Any).unwrap();
        assert_eq!(json, "\"any\"");
        let back: CoreAffinity = serde_json::from_str("{\"core\":1}").unwrap();
        assert_eq!(back, CoreAffinity::Core(1));
    }

    #[test]
    fn task_info_serializes_with_unit_id() {
        let info = TaskInfo {
            name: "sensor".to_string(),
            unit_id: UnitId(3),
            priority: 10,
            core_affinity: CoreAffinity::Core(1),
            stack_size: 3072,
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&info).unwrap();
        assert!(json.contains("\"unit_id\":3"));
        assert!(json.contains("\"sensor\""));
    }

    #[test]
    fn task_error_display() {
        let err = TaskError::NameInUse("sensor".to_string());
        assert!(err.to_string().contains("already in use"));

        let err = TaskError::CreationFailed {
            name: "sensor".to_string(),
            source: KernelError::OutOfMemory,
        };
        assert!(err.to_string().contains("sensor"));
        assert!(err.to_string().contains("memory"));

        let err = TaskError::SupervisionFailed {
            name: "led".to_string(),
            source: WatchdogError::Exhausted,
        };
        assert!(err.to_string().contains("free subscription slots"));

        let err = TaskError::RegistryClosed("late".to_string());
        assert!(err.to_string().contains("closed"));
        assert!(err.to_string().contains("late"));
    }
}
