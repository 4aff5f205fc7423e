//! Runs a swarm of election nodes on one bus: launch, periodic sampling,
//! fault injection and the final report.

pub mod config;
pub mod report;
pub mod swarm;


pub use config::{FaultPlan, SwarmConfig, Transport};
pub use report::{describe, Report, Snapshot};
pub use swarm::Swarm;
