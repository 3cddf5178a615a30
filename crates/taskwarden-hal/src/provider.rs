//! Generic `ExecutionProvider` trait for kernels that create schedulable
//! units of work (threads, RTOS tasks, …).

use taskwarden_types::{KernelError, TaskEntry, TaskParam, UnitHandle, UnitSpec};

/// A kernel primitive that creates and destroys execution units.
///
/// Implementations are handed to the `TaskRegistry` in `taskwarden-kernel`,
/// which is the only component that should ever call [`destroy`].
///
/// [`destroy`]: ExecutionProvider::destroy
pub trait ExecutionProvider: Send + Sync {
    /// Create a unit named `spec.name` that runs `entry(param)` with the
    /// requested priority, core affinity and stack size.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError`] when the unit cannot be created.  No unit is
    /// left running in that case.
    fn create(
        &self,
        spec: &UnitSpec,
        entry: TaskEntry,
        param: Option<TaskParam>,
    ) -> Result<UnitHandle, KernelError>;

    /// Destroy the unit owned by `handle`.
    ///
    /// Consumes the handle.  Resources the unit holds internally (locks,
    /// peripherals) are not released by destruction.
    fn destroy(&self, handle: UnitHandle);
}
