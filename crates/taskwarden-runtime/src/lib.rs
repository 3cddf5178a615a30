//! `taskwarden-runtime` – Supervision runtime
//!
//! Runs the task registry as a service: builds it over an execution
//! provider and a software watchdog, watches for starved units, and sets up
//! process-wide telemetry.
//!
//! # Modules
//!
//! - [`supervisor`] – [`Supervisor`][supervisor::Supervisor]:
//!   owns the [`TaskRegistry`] and a [`SoftWatchdog`][taskwarden_kernel::SoftWatchdog],
//!   runs the watchdog monitor thread and its escalation hook, and tears
//!   every unit down on shutdown.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]:
//!   initialises the global `tracing` subscriber with an optional OTLP span
//!   exporter.  Set `OTEL_EXPORTER_OTLP_ENDPOINT` to enable export.

pub mod supervisor;
pub mod telemetry;

pub use supervisor::{EscalationHook, Supervisor, SupervisorConfig};
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};

// Re-exported so supervisory code can hold the registry without a direct
// dependency on taskwarden-kernel.
pub use taskwarden_kernel::{TaskRegistry, UnitHealth};
