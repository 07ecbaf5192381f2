//! Callcheck - call-readiness diagnostics
//!
//! Command-line front end over `callcheck-core`: configuration, logging,
//! text rendering and a tracked session that runs the probes and exports
//! reports. `callcheck serve` hands the same engine to `callcheck-server`.

pub mod config;
pub mod logging;
pub mod render;
pub mod runner;

pub use callcheck_core::report::{ExportFormat, Report};
pub use callcheck_core::{OrchestrationMode, TestOrchestrator, VERSION};
pub use config::AppConfig;
pub use runner::Diagnostics;
