pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod traits;
pub mod types;
pub mod workflow;

pub use config::ArmadaConfig;
pub use context::ExecutionContext;
pub use error::{ArmadaError, Result};
pub use event::{ArmadaEvent, EventBus, EventSink};
pub use traits::{AgentInvoker, PerformanceHistory};
pub use types::*;
pub use workflow::*;
