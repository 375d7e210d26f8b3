//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - [`Orchestrator`]: applies each live event to the snapshot, then publishes it
//! - [`RefreshService`]: bulk-loads every group from the snapshot API on a schedule

mod orchestrator;
mod refresh;

pub use orchestrator::Orchestrator;
pub use refresh::{RefreshError, RefreshReport, RefreshService};
