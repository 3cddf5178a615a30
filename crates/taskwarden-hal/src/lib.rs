//! `taskwarden-hal` – Execution and watchdog abstraction layer.
//!
//! The task registry never talks to a scheduler or a watchdog peripheral
//! directly.  It goes through the two traits defined here, so the same
//! registry runs on a host OS, in CI, or on a real-time kernel.
//!
//! # Modules
//!
//! - [`provider`] – [`ExecutionProvider`][provider::ExecutionProvider]:
//!   creates and destroys execution units.
//! - [`watchdog`] – [`WatchdogFacility`][watchdog::WatchdogFacility]:
//!   subscribes units to a liveness timer and forwards kicks.
//! - [`thread`] – [`ThreadProvider`][thread::ThreadProvider]: host backend
//!   that runs each unit on a named `std::thread`.
//! - [`sim`] – [`SimKernel`][sim::SimKernel] and
//!   [`SimWatchdog`][sim::SimWatchdog]: recording test doubles with fault
//!   injection for CI.

pub mod provider;
pub mod sim;
pub mod thread;
pub mod watchdog;

pub use provider::ExecutionProvider;
pub use sim::{SimKernel, SimWatchdog};
pub use thread::ThreadProvider;
pub use watchdog::WatchdogFacility;
