use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::ExecutionContext;
use crate::error::{ArmadaError, Result};
use crate::types::{ExecutionId, NoCandidate, Priority, TaskRequirement};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Sequential,
    Parallel,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorHandling {
    #[default]
    FailFast,
    ContinueOnError,
}

/// A declared workflow: steps plus how to run them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    #[serde(default)]
    pub error_handling: ErrorHandling,
}

impl WorkflowDefinition {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            steps: vec![],
            execution_mode: ExecutionMode::default(),
            error_handling: ErrorHandling::default(),
        }
    }

    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn parallel(mut self) -> Self {
        self.execution_mode = ExecutionMode::Parallel;
        self
    }

    pub fn continue_on_error(mut self) -> Self {
        self.error_handling = ErrorHandling::ContinueOnError;
        self
    }

    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Structural checks only. Unknown or cyclic prerequisites are not
    /// rejected here; parallel execution reports them as a deadlock.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(ArmadaError::InvalidWorkflow("workflow id is empty".into()));
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.id.trim().is_empty() {
                return Err(ArmadaError::InvalidWorkflow(format!(
                    "workflow '{}' has a step with an empty id",
                    self.id
                )));
            }
            if !seen.insert(step.id.as_str()) {
                return Err(ArmadaError::InvalidWorkflow(format!(
                    "duplicate step id '{}'",
                    step.id
                )));
            }
            if step.capability.trim().is_empty() {
                return Err(ArmadaError::InvalidWorkflow(format!(
                    "step '{}' has no capability",
                    step.id
                )));
            }
        }
        Ok(())
    }
}

/// One node of a workflow, bound to an agent capability at execution time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub capability: String,
    /// Payload path -> context path. A context path starting with `$step.`
    /// reads another step's stored result instead (`$step.fetch.body`).
    #[serde(default)]
    pub input_mapping: BTreeMap<String, String>,
    /// Result path -> context path.
    #[serde(default)]
    pub output_mapping: BTreeMap<String, String>,
    #[serde(default)]
    pub prerequisites: BTreeSet<String>,
    /// Falls back to the engine default when unset.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Extra scheduling constraints for this step.
    #[serde(default)]
    pub hints: StepHints,
}

/// Optional per-step scheduling constraints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepHints {
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub max_latency_ms: Option<u64>,
    #[serde(default)]
    pub min_reliability: Option<f64>,
    #[serde(default)]
    pub cost_budget: Option<f64>,
    #[serde(default)]
    pub preferred_tags: Vec<String>,
    #[serde(default)]
    pub excluded_agent_ids: HashSet<String>,
}

impl Step {
    pub fn new(id: impl Into<String>, capability: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            capability: capability.into(),
            input_mapping: BTreeMap::new(),
            output_mapping: BTreeMap::new(),
            prerequisites: BTreeSet::new(),
            timeout_ms: None,
            hints: StepHints::default(),
        }
    }

    pub fn after(mut self, step_id: impl Into<String>) -> Self {
        self.prerequisites.insert(step_id.into());
        self
    }

    pub fn with_input(mut self, payload_path: impl Into<String>, source: impl Into<String>) -> Self {
        self.input_mapping.insert(payload_path.into(), source.into());
        self
    }

    pub fn with_output(mut self, result_path: impl Into<String>, target: impl Into<String>) -> Self {
        self.output_mapping.insert(result_path.into(), target.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_hints(mut self, hints: StepHints) -> Self {
        self.hints = hints;
        self
    }

    /// The scheduling requirement for this step.
    pub fn requirement(&self) -> TaskRequirement {
        TaskRequirement {
            capability: self.capability.clone(),
            priority: self.hints.priority,
            max_latency_ms: self.hints.max_latency_ms,
            min_reliability: self.hints.min_reliability,
            cost_budget: self.hints.cost_budget,
            preferred_tags: self.hints.preferred_tags.clone(),
            excluded_agent_ids: self.hints.excluded_agent_ids.clone(),
        }
    }
}

/// Execution lifecycle. `Completed`, `Failed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Why a single step failed.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepError {
    #[error("no agent available for capability '{capability}'")]
    NoCandidate { capability: String },

    #[error("agent {agent_id} failed: {message}")]
    Invocation { agent_id: String, message: String },

    #[error("agent {agent_id} timed out after {timeout_ms}ms")]
    Timeout { agent_id: String, timeout_ms: u64 },

    #[error("step task aborted: {message}")]
    Panicked { message: String },
}

impl StepError {
    /// Timeouts are a kind of execution failure, distinguishable from
    /// failures the agent reported itself.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// The agent the step was dispatched to, if scheduling got that far.
    pub fn agent_id(&self) -> Option<&str> {
        match self {
            Self::Invocation { agent_id, .. } | Self::Timeout { agent_id, .. } => Some(agent_id),
            Self::NoCandidate { .. } | Self::Panicked { .. } => None,
        }
    }
}

impl From<NoCandidate> for StepError {
    fn from(err: NoCandidate) -> Self {
        Self::NoCandidate {
            capability: err.capability,
        }
    }
}

/// Why an execution ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowError {
    #[error("step '{step_id}' failed: {error}")]
    Step { step_id: String, error: StepError },

    #[error("steps failed: {}", step_ids.join(", "))]
    StepsFailed { step_ids: Vec<String> },

    #[error("deadlock detected: steps {} can never become ready", pending.join(", "))]
    Deadlock { pending: Vec<String> },

    #[error("invalid workflow: {0}")]
    Invalid(String),
}

/// Snapshot of one workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: ExecutionId,
    pub workflow_id: String,
    pub status: ExecutionStatus,
    pub completed_steps: BTreeSet<String>,
    pub failed_steps: BTreeMap<String, StepError>,
    pub step_results: HashMap<String, serde_json::Value>,
    /// Agent chosen for each dispatched step.
    pub assignments: HashMap<String, String>,
    pub context: ExecutionContext,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub failure: Option<WorkflowError>,
    pub error: Option<String>,
}

impl WorkflowExecution {
    pub fn new(workflow_id: impl Into<String>, context: ExecutionContext) -> Self {
        Self {
            id: ExecutionId::new(),
            workflow_id: workflow_id.into(),
            status: ExecutionStatus::Pending,
            completed_steps: BTreeSet::new(),
            failed_steps: BTreeMap::new(),
            step_results: HashMap::new(),
            assignments: HashMap::new(),
            context,
            started_at: None,
            ended_at: None,
            failure: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_duplicates() {
        let wf = WorkflowDefinition::new("wf")
            .with_step(Step::new("a", "x"))
            .with_step(Step::new("a", "y"));
        let err = wf.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate step id 'a'"));
    }

    #[test]
    fn test_validate_rejects_missing_capability() {
        let wf = WorkflowDefinition::new("wf").with_step(Step::new("a", " "));
        assert!(wf.validate().is_err());
        assert!(WorkflowDefinition::new("").validate().is_err());
    }

    #[test]
    fn test_validate_allows_unknown_prerequisites() {
        let wf = WorkflowDefinition::new("wf").with_step(Step::new("a", "x").after("ghost"));
        assert!(wf.validate().is_ok());
    }

    #[test]
    fn test_step_requirement_carries_hints() {
        let step = Step::new("s", "translate").with_hints(StepHints {
            max_latency_ms: Some(500),
            preferred_tags: vec!["eu".into()],
            ..Default::default()
        });
        let req = step.requirement();
        assert_eq!(req.capability, "translate");
        assert_eq!(req.max_latency_ms, Some(500));
        assert_eq!(req.preferred_tags, vec!["eu".to_string()]);
    }

    #[test]
    fn test_definition_from_toml() {
        let wf: WorkflowDefinition = toml::from_str(
            r#"
id = "ingest"
execution_mode = "parallel"
error_handling = "continue-on-error"

[[steps]]
id = "fetch"
capability = "http.fetch"
timeout_ms = 5000
output_mapping = { "body" = "raw.body" }

[[steps]]
id = "parse"
capability = "parse.json"
prerequisites = ["fetch"]
input_mapping = { "text" = "$step.fetch.body" }
"#,
        )
        .unwrap();
        assert_eq!(wf.execution_mode, ExecutionMode::Parallel);
        assert_eq!(wf.error_handling, ErrorHandling::ContinueOnError);
        assert_eq!(wf.steps.len(), 2);
        assert!(wf.steps[1].prerequisites.contains("fetch"));
        assert_eq!(wf.steps[0].timeout_ms, Some(5000));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!ExecutionStatus::Pending.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
        assert!(ExecutionStatus::Completed.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(ExecutionStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_error_messages() {
        let err = WorkflowError::Deadlock {
            pending: vec!["a".into(), "b".into()],
        };
        assert_eq!(
            err.to_string(),
            "deadlock detected: steps a, b can never become ready"
        );
        let timeout = StepError::Timeout {
            agent_id: "x".into(),
            timeout_ms: 10,
        };
        assert!(timeout.is_timeout());
    }
}
