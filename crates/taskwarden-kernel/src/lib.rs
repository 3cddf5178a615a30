//! `taskwarden-kernel` – Task supervision core
//!
//! Owns the set of named execution units running on the device and keeps
//! their watchdog subscriptions in lock-step with that set.
//!
//! # Modules
//!
//! - [`registry`] – [`TaskRegistry`][registry::TaskRegistry]:
//!   the name → [`TaskRecord`][record::TaskRecord] map.  Creates units
//!   through an [`ExecutionProvider`][taskwarden_hal::ExecutionProvider],
//!   subscribes them to a [`WatchdogFacility`][taskwarden_hal::WatchdogFacility],
//!   forwards kicks by name and tears everything down on drop.
//! - [`record`] – [`TaskRecord`][record::TaskRecord]: the bookkeeping entry
//!   binding a name to its owned unit handle and creation parameters.
//! - [`watchdog`] – [`SoftWatchdog`][watchdog::SoftWatchdog]:
//!   a deadline-based software watchdog for hosts without a hardware timer.

pub mod record;
pub mod registry;
pub mod watchdog;

pub use record::TaskRecord;
pub use registry::TaskRegistry;
pub use watchdog::{SoftWatchdog, UnitHealth};
