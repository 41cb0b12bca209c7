//! Provisioning workflow for the DNS alias sample.
//!
//! - [`plan`] - Random names, password and per-server SQL
//! - [`propagation`] - Waiting for the alias to reach its target
//! - [`runner`] - Ordered steps with unconditional cleanup

mod plan;
mod propagation;
mod runner;

pub use plan::{random_name, random_password, SamplePlan, ServerPlan, NAME_COLUMN};
pub use propagation::{Backoff, DnsProbe, PropagationProbe, PropagationWaiter, WaitOutcome};
pub use runner::{AliasWaits, CleanupContext, RunReport, SampleRunner};
