use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Category of an agent. The set is fixed; routing only ever filters on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Language,
    Vision,
    Audio,
    Data,
    Code,
    Custom,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Language => "language",
            Self::Vision => "vision",
            Self::Audio => "audio",
            Self::Data => "data",
            Self::Code => "code",
            Self::Custom => "custom",
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Online,
    Offline,
    Maintenance,
}

/// A named operation an agent performs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    /// Unique within a single agent.
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Unitless cost per invocation.
    #[serde(default)]
    pub cost: f64,
    #[serde(default)]
    pub expected_latency_ms: u64,
    /// Probability of success in [0, 1].
    #[serde(default = "default_reliability")]
    pub reliability: f64,
    /// Opaque schema documents owned by the provider. Never inspected here.
    #[serde(default)]
    pub input_schema: Option<String>,
    #[serde(default)]
    pub output_schema: Option<String>,
}

fn default_reliability() -> f64 {
    1.0
}

impl Capability {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            cost: 0.0,
            expected_latency_ms: 0,
            reliability: default_reliability(),
            input_schema: None,
            output_schema: None,
        }
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        self.expected_latency_ms = latency_ms;
        self
    }

    pub fn with_reliability(mut self, reliability: f64) -> Self {
        self.reliability = reliability;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// What a provider submits when registering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub name: String,
    pub kind: AgentKind,
    #[serde(default = "default_version")]
    pub version: String,
    /// Transport handle handed back to the `AgentInvoker`.
    pub endpoint: String,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

impl AgentDescriptor {
    pub fn new(name: impl Into<String>, kind: AgentKind, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            version: default_version(),
            endpoint: endpoint.into(),
            capabilities: vec![],
            tags: BTreeSet::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }
}

/// A registered agent as tracked by the directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: String,
    pub name: String,
    pub kind: AgentKind,
    pub version: String,
    pub endpoint: String,
    pub capabilities: Vec<Capability>,
    pub status: AgentStatus,
    /// Always within [0, 100].
    pub health_score: f64,
    pub last_heartbeat: DateTime<Utc>,
    pub registered_at: DateTime<Utc>,
    pub tags: BTreeSet<String>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl AgentRecord {
    /// Look up a capability by name.
    pub fn capability(&self, name: &str) -> Option<&Capability> {
        self.capabilities.iter().find(|c| c.name == name)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn is_online(&self) -> bool {
        self.status == AgentStatus::Online
    }
}

/// Clamp a health value into [0, 100].
pub fn clamp_health(health: f64) -> f64 {
    if health.is_nan() {
        return 0.0;
    }
    health.clamp(0.0, 100.0)
}

/// Informational only; not used in scoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

/// What a task needs from an agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskRequirement {
    pub capability: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub max_latency_ms: Option<u64>,
    /// Falls back to the scheduler default (0.8) when unset.
    #[serde(default)]
    pub min_reliability: Option<f64>,
    #[serde(default)]
    pub cost_budget: Option<f64>,
    #[serde(default)]
    pub preferred_tags: Vec<String>,
    #[serde(default)]
    pub excluded_agent_ids: HashSet<String>,
}

impl TaskRequirement {
    pub fn new(capability: impl Into<String>) -> Self {
        Self {
            capability: capability.into(),
            ..Default::default()
        }
    }

    pub fn with_max_latency_ms(mut self, ms: u64) -> Self {
        self.max_latency_ms = Some(ms);
        self
    }

    pub fn with_min_reliability(mut self, reliability: f64) -> Self {
        self.min_reliability = Some(reliability);
        self
    }

    pub fn with_cost_budget(mut self, budget: f64) -> Self {
        self.cost_budget = Some(budget);
        self
    }

    pub fn with_preferred_tag(mut self, tag: impl Into<String>) -> Self {
        self.preferred_tags.push(tag.into());
        self
    }

    pub fn excluding(mut self, agent_id: impl Into<String>) -> Self {
        self.excluded_agent_ids.insert(agent_id.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

/// The scheduler's choice for a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub agent: AgentRecord,
    pub capability: Capability,
    /// Within [0, 100].
    pub score: f64,
    pub estimated_cost: f64,
    pub estimated_latency_ms: u64,
    /// Descriptive only.
    pub reasoning: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoCandidateReason {
    /// No online, healthy agent offers the capability at the required reliability.
    NoneQualified,
    /// Qualified agents exist but every one was excluded by the requirement.
    AllExcluded,
}

/// Returned when no agent can take a task.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("no agent available for capability '{capability}' ({reason:?})")]
pub struct NoCandidate {
    pub capability: String,
    pub reason: NoCandidateReason,
}

/// Outcome of a single scheduling request.
pub type ScheduleResult = std::result::Result<Decision, NoCandidate>;

/// Per-agent performance figures fed into the historical scoring term.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoricalPerformance {
    pub success_rate: f64,
    pub average_latency_ms: f64,
    pub average_cost: f64,
}

/// Unique workflow execution identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ExecutionId(pub String);

impl ExecutionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
