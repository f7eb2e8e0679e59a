use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use armada_core::config::SchedulerConfig;
use armada_core::traits::PerformanceHistory;
use armada_core::types::{
    AgentRecord, Capability, Decision, NoCandidate, NoCandidateReason, ScheduleResult,
    TaskRequirement,
};

use crate::directory::AgentDirectory;
use crate::scoring::{self, ScoreBreakdown};

/// Picks the best agent for a task.
///
/// Candidates come from the directory, are narrowed by the requirement's
/// exclusions and preferred tags, scored, and the top score wins. Equal
/// scores resolve to the lexicographically smallest agent id.
pub struct Scheduler {
    directory: Arc<AgentDirectory>,
    history: Option<Arc<dyn PerformanceHistory>>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(directory: Arc<AgentDirectory>, config: SchedulerConfig) -> Self {
        Self {
            directory,
            history: None,
            config,
        }
    }

    /// Attach a source of historical performance.
    pub fn with_history(mut self, history: Arc<dyn PerformanceHistory>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn directory(&self) -> &Arc<AgentDirectory> {
        &self.directory
    }

    /// Choose an agent for a single task.
    pub async fn schedule_task(&self, requirement: &TaskRequirement) -> ScheduleResult {
        let min_reliability = requirement
            .min_reliability
            .unwrap_or(self.config.default_min_reliability);

        let candidates = self
            .directory
            .find_by_capability(&requirement.capability, min_reliability)
            .await;
        if candidates.is_empty() {
            debug!(capability = %requirement.capability, "No qualified agents");
            return Err(NoCandidate {
                capability: requirement.capability.clone(),
                reason: NoCandidateReason::NoneQualified,
            });
        }

        let mut candidates: Vec<AgentRecord> = candidates
            .into_iter()
            .filter(|a| !requirement.excluded_agent_ids.contains(&a.id))
            .collect();
        if candidates.is_empty() {
            debug!(capability = %requirement.capability, "All qualified agents excluded");
            return Err(NoCandidate {
                capability: requirement.capability.clone(),
                reason: NoCandidateReason::AllExcluded,
            });
        }

        let tag_matched = narrow_to_preferred_tags(&mut candidates, &requirement.preferred_tags);

        let mut best: Option<(AgentRecord, Capability, ScoreBreakdown)> = None;
        for agent in candidates {
            let Some(capability) = best_capability(&agent, &requirement.capability, min_reliability)
            else {
                continue;
            };
            let history = match self.history {
                Some(ref h) => h.performance(&agent.id).await,
                None => None,
            };
            let breakdown = scoring::score(&agent, &capability, requirement, history.as_ref());

            let better = match best {
                None => true,
                Some((ref current, _, ref current_score)) => {
                    breakdown.total > current_score.total
                        || (breakdown.total == current_score.total && agent.id < current.id)
                }
            };
            if better {
                best = Some((agent, capability, breakdown));
            }
        }

        let Some((agent, capability, breakdown)) = best else {
            return Err(NoCandidate {
                capability: requirement.capability.clone(),
                reason: NoCandidateReason::NoneQualified,
            });
        };

        let reasoning = explain(&agent, &capability, requirement, &breakdown, tag_matched);
        info!(
            agent_id = %agent.id,
            capability = %capability.name,
            score = breakdown.total,
            "Task scheduled"
        );

        Ok(Decision {
            estimated_cost: capability.cost,
            estimated_latency_ms: capability.expected_latency_ms,
            score: breakdown.total,
            agent,
            capability,
            reasoning,
        })
    }

    /// Schedule many tasks in waves of `batch_concurrency`.
    ///
    /// Tasks within a wave are scheduled concurrently; the next wave starts
    /// only after the current one has fully resolved.
    pub async fn schedule_batch(
        &self,
        tasks: Vec<(String, TaskRequirement)>,
    ) -> HashMap<String, ScheduleResult> {
        let wave_size = self.config.batch_concurrency.max(1);
        let mut results = HashMap::with_capacity(tasks.len());

        for (wave, chunk) in tasks.chunks(wave_size).enumerate() {
            debug!(wave, size = chunk.len(), "Scheduling wave");
            let futs = chunk.iter().map(|(task_id, requirement)| async move {
                (task_id.clone(), self.schedule_task(requirement).await)
            });
            for (task_id, result) in futures::future::join_all(futs).await {
                results.insert(task_id, result);
            }
        }

        results
    }
}

/// Keep only tag-matching candidates if any exist. Returns whether narrowing applied.
fn narrow_to_preferred_tags(candidates: &mut Vec<AgentRecord>, preferred: &[String]) -> bool {
    if preferred.is_empty() {
        return false;
    }
    let matches = |a: &AgentRecord| preferred.iter().any(|t| a.has_tag(t));
    if !candidates.iter().any(matches) {
        return false;
    }
    candidates.retain(matches);
    true
}

/// The most reliable capability of the requested name meeting the floor.
fn best_capability(agent: &AgentRecord, name: &str, min_reliability: f64) -> Option<Capability> {
    agent
        .capabilities
        .iter()
        .filter(|c| c.name == name && c.reliability >= min_reliability)
        .max_by(|a, b| a.reliability.total_cmp(&b.reliability))
        .cloned()
}

fn explain(
    agent: &AgentRecord,
    capability: &Capability,
    requirement: &TaskRequirement,
    breakdown: &ScoreBreakdown,
    tag_matched: bool,
) -> Vec<String> {
    let mut reasons = vec![format!(
        "Offers capability '{}' (score {:.1})",
        capability.name, breakdown.total
    )];

    reasons.push(match agent.health_score {
        h if h >= 90.0 => format!("Excellent health ({:.0})", h),
        h if h >= 80.0 => format!("Good health ({:.0})", h),
        h => format!("Acceptable health ({:.0})", h),
    });

    reasons.push(match capability.reliability {
        r if r >= 0.95 => format!("Very high reliability ({:.0}%)", r * 100.0),
        r if r >= 0.9 => format!("High reliability ({:.0}%)", r * 100.0),
        r => format!("Reliability {:.0}% meets requirement", r * 100.0),
    });

    if let Some(max) = requirement.max_latency_ms {
        if capability.expected_latency_ms <= max {
            reasons.push(format!(
                "Expected latency {}ms within {}ms limit",
                capability.expected_latency_ms, max
            ));
        } else {
            reasons.push(format!(
                "Expected latency {}ms exceeds {}ms limit",
                capability.expected_latency_ms, max
            ));
        }
    }

    if tag_matched {
        let matched: Vec<&str> = requirement
            .preferred_tags
            .iter()
            .filter(|t| agent.has_tag(t))
            .map(String::as_str)
            .collect();
        reasons.push(format!("Matches preferred tags: {}", matched.join(", ")));
    }

    reasons
}
