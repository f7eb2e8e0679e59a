pub mod directory;
pub mod health;
pub mod scheduler;
pub mod scoring;
pub mod workflow;

pub use directory::{AgentDirectory, SweepReport};
pub use health::HealthMonitor;
pub use scheduler::Scheduler;
pub use scoring::ScoreBreakdown;
pub use workflow::WorkflowEngine;
