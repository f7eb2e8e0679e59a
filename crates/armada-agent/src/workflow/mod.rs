pub mod engine;
pub mod mapping;
pub mod readiness;

pub use engine::WorkflowEngine;
