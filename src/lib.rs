//! Capability-scored agent scheduling and DAG workflow execution.
//!
//! [`Armada`] wires an [`ArmadaConfig`] into a running agent directory with
//! its background health sweep, a scheduler, and a workflow engine.

mod logging;

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub use armada_agent::{AgentDirectory, HealthMonitor, Scheduler, WorkflowEngine};
pub use armada_core::{
    AgentInvoker, ArmadaConfig, ArmadaError, ArmadaEvent, EventBus, EventSink,
    PerformanceHistory, Result,
};
pub use logging::init_tracing;

/// A running directory, scheduler and engine sharing one configuration.
pub struct Armada {
    config: ArmadaConfig,
    directory: Arc<AgentDirectory>,
    scheduler: Arc<Scheduler>,
    engine: Arc<WorkflowEngine>,
    cancel: CancellationToken,
    monitor: JoinHandle<()>,
}

pub struct ArmadaBuilder {
    config: ArmadaConfig,
    invoker: Arc<dyn AgentInvoker>,
    events: Option<Arc<dyn EventSink>>,
    history: Option<Arc<dyn PerformanceHistory>>,
    cancel: Option<CancellationToken>,
}

impl ArmadaBuilder {
    /// Receive directory and workflow lifecycle events.
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_history(mut self, history: Arc<dyn PerformanceHistory>) -> Self {
        self.history = Some(history);
        self
    }

    /// Tie the health sweep to an outside shutdown signal.
    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Build the components and spawn the health sweep. Needs a tokio runtime.
    pub fn start(self) -> Armada {
        let cancel = self.cancel.unwrap_or_default();

        let mut directory = AgentDirectory::new(self.config.directory.clone());
        if let Some(events) = &self.events {
            directory = directory.with_events(events.clone());
        }
        let directory = Arc::new(directory);

        let mut scheduler = Scheduler::new(directory.clone(), self.config.scheduler.clone());
        if let Some(history) = self.history {
            scheduler = scheduler.with_history(history);
        }
        let scheduler = Arc::new(scheduler);

        let mut engine =
            WorkflowEngine::new(scheduler.clone(), self.invoker, self.config.engine.clone());
        if let Some(events) = self.events {
            engine = engine.with_events(events);
        }
        let engine = Arc::new(engine);

        let monitor = HealthMonitor::new(directory.clone(), cancel.clone()).spawn();
        info!(
            heartbeat_interval_secs = self.config.directory.heartbeat_interval_secs,
            "Armada started"
        );

        Armada {
            config: self.config,
            directory,
            scheduler,
            engine,
            cancel,
            monitor,
        }
    }
}

impl Armada {
    pub fn builder(config: ArmadaConfig, invoker: Arc<dyn AgentInvoker>) -> ArmadaBuilder {
        ArmadaBuilder {
            config,
            invoker,
            events: None,
            history: None,
            cancel: None,
        }
    }

    pub fn config(&self) -> &ArmadaConfig {
        &self.config
    }

    pub fn directory(&self) -> &Arc<AgentDirectory> {
        &self.directory
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn engine(&self) -> &Arc<WorkflowEngine> {
        &self.engine
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop the health sweep and wait for it to exit. Running executions
    /// are left to finish on their own tasks.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.monitor.await;
        info!("Armada stopped");
    }
}
