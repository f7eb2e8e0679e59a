use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use armada_core::config::EngineConfig;
use armada_core::context::ExecutionContext;
use armada_core::error::ArmadaError;
use armada_core::event::{ArmadaEvent, EventSink};
use armada_core::traits::AgentInvoker;
use armada_core::types::{ExecutionId, TaskRequirement};
use armada_core::workflow::{
    ErrorHandling, ExecutionMode, ExecutionStatus, Step, StepError, WorkflowDefinition,
    WorkflowError, WorkflowExecution,
};

use super::mapping;
use super::readiness;
use crate::scheduler::Scheduler;

/// Runs workflow definitions against the agent pool.
///
/// Each execution is driven on its own task. Executions stay queryable for
/// the configured retention period after they reach a terminal status.
///
/// Cancellation is advisory: the execution is marked cancelled at once and
/// no further steps are dispatched, but invocations already in flight run to
/// completion and their results are discarded.
pub struct WorkflowEngine {
    scheduler: Arc<Scheduler>,
    invoker: Arc<dyn AgentInvoker>,
    events: Option<Arc<dyn EventSink>>,
    config: EngineConfig,
    executions: RwLock<HashMap<ExecutionId, Arc<ExecutionHandle>>>,
}

struct ExecutionHandle {
    state: Mutex<WorkflowExecution>,
    cancel: CancellationToken,
    status: watch::Sender<ExecutionStatus>,
}

impl ExecutionHandle {
    fn new(execution: WorkflowExecution) -> Self {
        let (status, _) = watch::channel(execution.status);
        Self {
            state: Mutex::new(execution),
            cancel: CancellationToken::new(),
            status,
        }
    }

    fn snapshot(&self) -> WorkflowExecution {
        self.state.lock().clone()
    }
}

/// Result of a step task: the agent that ran it and what it returned.
struct StepSuccess {
    agent_id: String,
    result: Value,
}

enum StepRecord {
    Completed,
    Failed(StepError),
    /// The execution already ended; the outcome was not consulted.
    Discarded,
}

/// How a driver loop ended. `None` from a driver means it was cancelled.
type DriveOutcome = Option<Result<(), WorkflowError>>;

impl WorkflowEngine {
    pub fn new(
        scheduler: Arc<Scheduler>,
        invoker: Arc<dyn AgentInvoker>,
        config: EngineConfig,
    ) -> Self {
        Self {
            scheduler,
            invoker,
            events: None,
            config,
            executions: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Begin executing a workflow and return its execution id immediately.
    ///
    /// An invalid definition still yields an id; the execution is already
    /// `Failed` with [`WorkflowError::Invalid`].
    pub fn start(self: &Arc<Self>, definition: WorkflowDefinition, input: Value) -> ExecutionId {
        self.launch(definition, input).0
    }

    /// Start a workflow and wait for it to reach a terminal status.
    pub async fn execute(
        self: &Arc<Self>,
        definition: WorkflowDefinition,
        input: Value,
    ) -> WorkflowExecution {
        let (_, handle) = self.launch(definition, input);
        wait_terminal(&handle).await;
        handle.snapshot()
    }

    /// Wait for an execution to finish. `None` if the id is unknown or evicted.
    pub async fn wait(&self, id: &ExecutionId) -> Option<WorkflowExecution> {
        let handle = self.handle(id)?;
        wait_terminal(&handle).await;
        Some(handle.snapshot())
    }

    /// Current snapshot of an execution.
    pub fn get(&self, id: &ExecutionId) -> Option<WorkflowExecution> {
        self.handle(id).map(|h| h.snapshot())
    }

    /// Cancel a running execution. Returns false if the id is unknown or the
    /// execution already ended.
    pub fn cancel(self: &Arc<Self>, id: &ExecutionId) -> bool {
        let Some(handle) = self.handle(id) else {
            return false;
        };

        let snapshot = {
            let mut state = handle.state.lock();
            if state.is_terminal() {
                return false;
            }
            state.status = ExecutionStatus::Cancelled;
            state.ended_at = Some(Utc::now());
            state.error = Some("cancelled".to_string());
            state.clone()
        };

        handle.cancel.cancel();
        handle.status.send_replace(ExecutionStatus::Cancelled);
        info!(execution_id = %id, workflow = %snapshot.workflow_id, "Workflow cancelled");
        self.publish(ArmadaEvent::WorkflowCancelled {
            execution: snapshot,
        });
        self.schedule_eviction(id.clone());
        true
    }

    /// Ids of executions that have not reached a terminal status.
    pub fn active(&self) -> Vec<ExecutionId> {
        let mut ids: Vec<ExecutionId> = self
            .executions
            .read()
            .iter()
            .filter(|(_, h)| !h.state.lock().is_terminal())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        ids
    }

    fn handle(&self, id: &ExecutionId) -> Option<Arc<ExecutionHandle>> {
        self.executions.read().get(id).cloned()
    }

    fn launch(
        self: &Arc<Self>,
        definition: WorkflowDefinition,
        input: Value,
    ) -> (ExecutionId, Arc<ExecutionHandle>) {
        let mut execution =
            WorkflowExecution::new(&definition.id, ExecutionContext::from_value(input));
        let id = execution.id.clone();
        execution.started_at = Some(Utc::now());

        let invalid = definition.validate().err();
        match &invalid {
            Some(e) => {
                let reason = match e {
                    ArmadaError::InvalidWorkflow(reason) => reason.clone(),
                    other => other.to_string(),
                };
                let failure = WorkflowError::Invalid(reason);
                execution.status = ExecutionStatus::Failed;
                execution.ended_at = execution.started_at;
                execution.error = Some(failure.to_string());
                execution.failure = Some(failure);
            }
            None => execution.status = ExecutionStatus::Running,
        }

        let handle = Arc::new(ExecutionHandle::new(execution));
        self.executions.write().insert(id.clone(), handle.clone());

        if let Some(e) = invalid {
            warn!(execution_id = %id, workflow = %definition.id, error = %e, "Rejected workflow");
            self.publish(ArmadaEvent::WorkflowFailed {
                execution: handle.snapshot(),
            });
            self.schedule_eviction(id.clone());
            return (id, handle);
        }

        info!(
            execution_id = %id,
            workflow = %definition.id,
            steps = definition.steps.len(),
            mode = ?definition.execution_mode,
            "Workflow started"
        );
        self.publish(ArmadaEvent::WorkflowStarted {
            execution: handle.snapshot(),
        });

        let engine = Arc::clone(self);
        let driven = handle.clone();
        tokio::spawn(async move { engine.drive(driven, definition).await });

        (id, handle)
    }

    async fn drive(self: Arc<Self>, handle: Arc<ExecutionHandle>, definition: WorkflowDefinition) {
        let outcome = match definition.execution_mode {
            ExecutionMode::Sequential => self.run_sequential(&handle, &definition).await,
            ExecutionMode::Parallel => self.run_parallel(&handle, &definition).await,
        };
        if let Some(result) = outcome {
            self.finish(&handle, result);
        }
    }

    /// Steps run one at a time in declared order. Prerequisites are ignored.
    async fn run_sequential(
        &self,
        handle: &Arc<ExecutionHandle>,
        definition: &WorkflowDefinition,
    ) -> DriveOutcome {
        for step in &definition.steps {
            if handle.cancel.is_cancelled() {
                return None;
            }

            let task = self.dispatch(handle, step);
            let joined = tokio::select! {
                joined = task => joined,
                _ = handle.cancel.cancelled() => return None,
            };

            match self.record(handle, step, joined) {
                StepRecord::Completed => {}
                StepRecord::Discarded => return None,
                StepRecord::Failed(error) => {
                    if definition.error_handling == ErrorHandling::FailFast {
                        return Some(Err(WorkflowError::Step {
                            step_id: step.id.clone(),
                            error,
                        }));
                    }
                }
            }
        }

        Some(failed_steps_result(handle))
    }

    /// Every step whose prerequisites have completed is dispatched at once;
    /// the driver then wakes on the next step to finish.
    async fn run_parallel(
        &self,
        handle: &Arc<ExecutionHandle>,
        definition: &WorkflowDefinition,
    ) -> DriveOutcome {
        let mut running: HashSet<String> = HashSet::new();
        let mut in_flight = FuturesUnordered::new();

        loop {
            if handle.cancel.is_cancelled() {
                return None;
            }

            let ready: Vec<Step> = {
                let state = handle.state.lock();
                readiness::ready_steps(
                    &definition.steps,
                    &state.completed_steps,
                    &state.failed_steps,
                    &running,
                )
                .into_iter()
                .cloned()
                .collect()
            };

            for step in ready {
                running.insert(step.id.clone());
                let task = self.dispatch(handle, &step);
                in_flight.push(async move {
                    let joined = task.await;
                    (step, joined)
                });
            }

            if in_flight.is_empty() {
                let (execution_id, stuck) = {
                    let state = handle.state.lock();
                    let stuck = readiness::stuck_steps(
                        &definition.steps,
                        &state.completed_steps,
                        &state.failed_steps,
                    );
                    (state.id.clone(), stuck)
                };
                if !stuck.deadlocked.is_empty() {
                    warn!(
                        execution_id = %execution_id,
                        pending = ?stuck.deadlocked,
                        "Workflow deadlocked"
                    );
                    return Some(Err(WorkflowError::Deadlock {
                        pending: stuck.deadlocked,
                    }));
                }
                if !stuck.blocked_by_failure.is_empty() {
                    debug!(
                        execution_id = %execution_id,
                        blocked = ?stuck.blocked_by_failure,
                        "Steps skipped behind failed prerequisites"
                    );
                }
                break;
            }

            let next = tokio::select! {
                next = in_flight.next() => next,
                _ = handle.cancel.cancelled() => return None,
            };
            let Some((step, joined)) = next else {
                continue;
            };
            running.remove(&step.id);

            match self.record(handle, &step, joined) {
                StepRecord::Completed => {}
                StepRecord::Discarded => return None,
                StepRecord::Failed(error) => {
                    if definition.error_handling == ErrorHandling::FailFast {
                        return Some(Err(WorkflowError::Step {
                            step_id: step.id.clone(),
                            error,
                        }));
                    }
                }
            }
        }

        Some(failed_steps_result(handle))
    }

    /// Resolve the step's payload and spawn its schedule-and-invoke task.
    ///
    /// Dropping the returned handle detaches the task; it is never aborted.
    fn dispatch(
        &self,
        handle: &ExecutionHandle,
        step: &Step,
    ) -> JoinHandle<Result<StepSuccess, StepError>> {
        let (execution_id, payload) = {
            let state = handle.state.lock();
            (
                state.id.clone(),
                mapping::resolve_input(step, &state.context, &state.step_results),
            )
        };

        debug!(execution_id = %execution_id, step_id = %step.id, capability = %step.capability, "Dispatching step");
        self.publish(ArmadaEvent::StepStarted {
            execution_id,
            step_id: step.id.clone(),
        });

        let timeout_ms = step
            .timeout_ms
            .unwrap_or(self.config.default_step_timeout_ms);
        tokio::spawn(run_step(
            self.scheduler.clone(),
            self.invoker.clone(),
            step.requirement(),
            payload,
            timeout_ms,
        ))
    }

    /// Fold a finished step into the execution state.
    fn record(
        &self,
        handle: &ExecutionHandle,
        step: &Step,
        joined: std::result::Result<Result<StepSuccess, StepError>, JoinError>,
    ) -> StepRecord {
        let outcome = joined.unwrap_or_else(|e| {
            Err(StepError::Panicked {
                message: e.to_string(),
            })
        });

        let (execution_id, assigned) = {
            let mut state = handle.state.lock();
            if state.is_terminal() {
                return StepRecord::Discarded;
            }
            let assigned = match outcome {
                Ok(success) => {
                    mapping::apply_output(step, &success.result, &mut state.context);
                    state.step_results.insert(step.id.clone(), success.result);
                    state.completed_steps.insert(step.id.clone());
                    state
                        .assignments
                        .insert(step.id.clone(), success.agent_id.clone());
                    Ok(success.agent_id)
                }
                Err(error) => {
                    if let Some(agent_id) = error.agent_id() {
                        state
                            .assignments
                            .insert(step.id.clone(), agent_id.to_string());
                    }
                    state.failed_steps.insert(step.id.clone(), error.clone());
                    Err(error)
                }
            };
            (state.id.clone(), assigned)
        };

        match assigned {
            Ok(agent_id) => {
                debug!(execution_id = %execution_id, step_id = %step.id, agent = %agent_id, "Step completed");
                self.publish(ArmadaEvent::StepCompleted {
                    execution_id,
                    step_id: step.id.clone(),
                    agent_id,
                });
                StepRecord::Completed
            }
            Err(error) => {
                warn!(execution_id = %execution_id, step_id = %step.id, error = %error, "Step failed");
                self.publish(ArmadaEvent::StepFailed {
                    execution_id,
                    step_id: step.id.clone(),
                    error: error.clone(),
                });
                StepRecord::Failed(error)
            }
        }
    }

    /// Move the execution to its terminal status unless cancel got there first.
    fn finish(self: &Arc<Self>, handle: &ExecutionHandle, result: Result<(), WorkflowError>) {
        let snapshot = {
            let mut state = handle.state.lock();
            if state.is_terminal() {
                return;
            }
            state.ended_at = Some(Utc::now());
            match result {
                Ok(()) => state.status = ExecutionStatus::Completed,
                Err(failure) => {
                    state.status = ExecutionStatus::Failed;
                    state.error = Some(failure.to_string());
                    state.failure = Some(failure);
                }
            }
            state.clone()
        };

        handle.status.send_replace(snapshot.status);
        let id = snapshot.id.clone();
        if snapshot.status == ExecutionStatus::Completed {
            info!(execution_id = %id, workflow = %snapshot.workflow_id, "Workflow completed");
            self.publish(ArmadaEvent::WorkflowCompleted {
                execution: snapshot,
            });
        } else {
            warn!(
                execution_id = %id,
                workflow = %snapshot.workflow_id,
                error = snapshot.error.as_deref().unwrap_or_default(),
                "Workflow failed"
            );
            self.publish(ArmadaEvent::WorkflowFailed {
                execution: snapshot,
            });
        }
        self.schedule_eviction(id);
    }

    /// Drop a terminal execution from the table once retention elapses.
    fn schedule_eviction(self: &Arc<Self>, id: ExecutionId) {
        let retention = self.config.retention();
        let engine = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::time::sleep(retention).await;
            if let Some(engine) = engine.upgrade() {
                engine.executions.write().remove(&id);
                debug!(execution_id = %id, "Evicted execution");
            }
        });
    }

    fn publish(&self, event: ArmadaEvent) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }
}

async fn wait_terminal(handle: &ExecutionHandle) {
    let mut rx = handle.status.subscribe();
    // The sender lives in the handle, so this only returns once terminal.
    let _ = rx.wait_for(|status| status.is_terminal()).await;
}

fn failed_steps_result(handle: &ExecutionHandle) -> Result<(), WorkflowError> {
    let state = handle.state.lock();
    if state.failed_steps.is_empty() {
        Ok(())
    } else {
        Err(WorkflowError::StepsFailed {
            step_ids: state.failed_steps.keys().cloned().collect(),
        })
    }
}

/// Schedule an agent for the step and invoke it under the step timeout.
async fn run_step(
    scheduler: Arc<Scheduler>,
    invoker: Arc<dyn AgentInvoker>,
    requirement: TaskRequirement,
    payload: Value,
    timeout_ms: u64,
) -> Result<StepSuccess, StepError> {
    let decision = scheduler.schedule_task(&requirement).await?;
    let agent_id = decision.agent.id.clone();

    let invocation = invoker.invoke(
        &decision.agent.endpoint,
        &decision.capability.name,
        payload,
    );
    match tokio::time::timeout(Duration::from_millis(timeout_ms), invocation).await {
        Ok(Ok(result)) => Ok(StepSuccess { agent_id, result }),
        Ok(Err(e)) => Err(StepError::Invocation {
            agent_id,
            message: e.to_string(),
        }),
        Err(_) => Err(StepError::Timeout {
            agent_id,
            timeout_ms,
        }),
    }
}
