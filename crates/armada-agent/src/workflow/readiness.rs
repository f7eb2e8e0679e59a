//! Ready-set computation and stuck-step analysis for parallel execution.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use armada_core::workflow::{Step, StepError};

/// Steps that can start now: not finished, not running, prerequisites completed.
pub fn ready_steps<'a>(
    steps: &'a [Step],
    completed: &BTreeSet<String>,
    failed: &BTreeMap<String, StepError>,
    running: &HashSet<String>,
) -> Vec<&'a Step> {
    steps
        .iter()
        .filter(|s| {
            !completed.contains(&s.id) && !failed.contains_key(&s.id) && !running.contains(&s.id)
        })
        .filter(|s| s.prerequisites.iter().all(|p| completed.contains(p)))
        .collect()
}

/// Steps that never finished, split into those waiting on a failed step
/// (directly or transitively) and those that can never run for any other
/// reason: a cycle, or a prerequisite that is not part of the workflow.
pub fn stuck_steps(
    steps: &[Step],
    completed: &BTreeSet<String>,
    failed: &BTreeMap<String, StepError>,
) -> StuckSteps {
    let mut blocked: BTreeSet<String> = BTreeSet::new();
    loop {
        let before = blocked.len();
        for step in steps {
            if completed.contains(&step.id) || failed.contains_key(&step.id) {
                continue;
            }
            if step
                .prerequisites
                .iter()
                .any(|p| failed.contains_key(p) || blocked.contains(p))
            {
                blocked.insert(step.id.clone());
            }
        }
        if blocked.len() == before {
            break;
        }
    }

    let deadlocked = steps
        .iter()
        .filter(|s| !completed.contains(&s.id) && !failed.contains_key(&s.id))
        .filter(|s| !blocked.contains(&s.id))
        .map(|s| s.id.clone())
        .collect();

    StuckSteps {
        blocked_by_failure: blocked.into_iter().collect(),
        deadlocked,
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct StuckSteps {
    pub blocked_by_failure: Vec<String>,
    pub deadlocked: Vec<String>,
}
