//! [`TaskRecord`] – one registered execution unit.

use chrono::{DateTime, Utc};
use taskwarden_types::{CoreAffinity, TaskInfo, UnitHandle, UnitId, UnitSpec};

/// Registry bookkeeping for one named unit.
///
/// The record owns the unit's [`UnitHandle`].  The handle is only released
/// through [`TaskRecord::into_parts`], which the registry calls when the
/// record leaves the map on its way to destruction.
#[derive(Debug)]
pub struct TaskRecord {
    name: String,
    handle: UnitHandle,
    priority: u32,
    core_affinity: CoreAffinity,
    stack_size: usize,
    created_at: DateTime<Utc>,
}

impl TaskRecord {
    pub(crate) fn new(spec: UnitSpec, handle: UnitHandle) -> Self {
        Self {
            name: spec.name,
            handle,
            priority: spec.priority,
            core_affinity: spec.core_affinity,
            stack_size: spec.stack_size,
            created_at: Utc::now(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit_id(&self) -> UnitId {
        self.handle.id()
    }

    pub(crate) fn handle(&self) -> &UnitHandle {
        &self.handle
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    pub fn core_affinity(&self) -> CoreAffinity {
        self.core_affinity
    }

    pub fn stack_size(&self) -> usize {
        self.stack_size
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Owned snapshot of this record.
    pub fn info(&self) -> TaskInfo {
        TaskInfo {
            name: self.name.clone(),
            unit_id: self.handle.id(),
            priority: self.priority,
            core_affinity: self.core_affinity,
            stack_size: self.stack_size,
            created_at: self.created_at,
        }
    }

    /// Consume the record, yielding its name and the owned handle.
    pub(crate) fn into_parts(self) -> (String, UnitHandle) {
        (self.name, self.handle)
    }
}
