use serde::{Deserialize, Serialize};

use crate::types::{AgentRecord, ExecutionId};
use crate::workflow::{StepError, WorkflowExecution};

/// Lifecycle notifications emitted by the directory and the workflow engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ArmadaEvent {
    /// An agent was registered.
    AgentRegistered { agent: AgentRecord },
    /// An agent was marked offline by an explicit unregister.
    AgentUnregistered { agent: AgentRecord },
    /// Status or health changed (heartbeat, update, or health sweep).
    AgentStatusUpdated { agent: AgentRecord },
    WorkflowStarted { execution: WorkflowExecution },
    WorkflowCompleted { execution: WorkflowExecution },
    WorkflowFailed { execution: WorkflowExecution },
    WorkflowCancelled { execution: WorkflowExecution },
    /// A step was dispatched.
    StepStarted {
        execution_id: ExecutionId,
        step_id: String,
    },
    /// A step's result was stored.
    StepCompleted {
        execution_id: ExecutionId,
        step_id: String,
        agent_id: String,
    },
    StepFailed {
        execution_id: ExecutionId,
        step_id: String,
        error: StepError,
    },
}

/// Receiver of lifecycle notifications. Optional everywhere it is accepted.
pub trait EventSink: Send + Sync + 'static {
    fn publish(&self, event: ArmadaEvent);
}

/// Event bus using tokio broadcast channel.
/// All subscribers receive all events.
pub struct EventBus {
    tx: tokio::sync::broadcast::Sender<ArmadaEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ArmadaEvent> {
        self.tx.subscribe()
    }
}

impl EventSink for EventBus {
    fn publish(&self, event: ArmadaEvent) {
        // Ignore error if no receivers
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bus_fans_out() {
        let bus = EventBus::new(8);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        bus.publish(ArmadaEvent::StepStarted {
            execution_id: ExecutionId::new(),
            step_id: "s1".into(),
        });
        assert!(matches!(a.recv().await, Ok(ArmadaEvent::StepStarted { .. })));
        assert!(matches!(b.recv().await, Ok(ArmadaEvent::StepStarted { .. })));
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::default();
        bus.publish(ArmadaEvent::StepStarted {
            execution_id: ExecutionId::new(),
            step_id: "s1".into(),
        });
    }
}
