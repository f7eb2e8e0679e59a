//! Candidate scoring.
//!
//! Six signals, each normalized to [0, 1], are combined with fixed weights and
//! scaled to a score in [0, 100].

use serde::Serialize;

use armada_core::types::{AgentRecord, Capability, HistoricalPerformance, TaskRequirement};

pub const HEALTH_WEIGHT: f64 = 0.25;
pub const RELIABILITY_WEIGHT: f64 = 0.25;
pub const LATENCY_WEIGHT: f64 = 0.20;
pub const COST_WEIGHT: f64 = 0.15;
pub const HISTORICAL_WEIGHT: f64 = 0.10;
pub const LOAD_BALANCE_WEIGHT: f64 = 0.05;

/// Cost term when the requirement sets no budget.
const UNBUDGETED_COST: f64 = 0.8;
/// Historical term when no history is available.
const NEUTRAL_HISTORY: f64 = 0.5;
/// Tag that earns a small load-balance bonus.
pub const HIGH_PERFORMANCE_TAG: &str = "high-performance";

/// Each normalized term and the weighted total.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub health: f64,
    pub reliability: f64,
    pub latency: f64,
    pub cost: f64,
    pub historical: f64,
    pub load_balance: f64,
    /// Weighted sum scaled to [0, 100].
    pub total: f64,
}

/// Score one agent/capability pair against a requirement.
pub fn score(
    agent: &AgentRecord,
    capability: &Capability,
    requirement: &TaskRequirement,
    history: Option<&HistoricalPerformance>,
) -> ScoreBreakdown {
    let health = unit(agent.health_score / 100.0);
    let reliability = unit(capability.reliability);

    let latency = match requirement.max_latency_ms {
        Some(max) if max > 0 => unit(1.0 - capability.expected_latency_ms as f64 / max as f64),
        Some(_) => {
            if capability.expected_latency_ms == 0 { 1.0 } else { 0.0 }
        }
        None => 1.0,
    };

    let cost = match requirement.cost_budget {
        Some(budget) if budget > 0.0 => unit(1.0 - capability.cost / budget),
        Some(_) => {
            if capability.cost <= 0.0 { 1.0 } else { 0.0 }
        }
        None => UNBUDGETED_COST,
    };

    let historical = history.map_or(NEUTRAL_HISTORY, historical_term);

    let mut load_balance: f64 = if agent.health_score > 80.0 { 0.9 } else { 0.6 };
    if agent.has_tag(HIGH_PERFORMANCE_TAG) {
        load_balance += 0.1;
    }
    let load_balance = unit(load_balance);

    let weighted = health * HEALTH_WEIGHT
        + reliability * RELIABILITY_WEIGHT
        + latency * LATENCY_WEIGHT
        + cost * COST_WEIGHT
        + historical * HISTORICAL_WEIGHT
        + load_balance * LOAD_BALANCE_WEIGHT;

    ScoreBreakdown {
        health,
        reliability,
        latency,
        cost,
        historical,
        load_balance,
        total: (weighted * 100.0).clamp(0.0, 100.0),
    }
}

fn historical_term(history: &HistoricalPerformance) -> f64 {
    let latency_factor = if history.average_latency_ms < 5000.0 { 1.0 } else { 0.5 };
    let cost_factor = if history.average_cost < 0.01 { 1.0 } else { 0.7 };
    unit(unit(history.success_rate) * 0.5 + latency_factor * 0.3 + cost_factor * 0.2)
}

/// Clamp into [0, 1]; NaN counts as 0.
fn unit(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use armada_core::types::{AgentKind, AgentStatus};
    use chrono::Utc;
    use proptest::prelude::*;
    use std::collections::{BTreeSet, HashMap};

    fn agent(health: f64, tags: &[&str]) -> AgentRecord {
        AgentRecord {
            id: "a".into(),
            name: "a".into(),
            kind: AgentKind::Language,
            version: "1".into(),
            endpoint: "mem://a".into(),
            capabilities: vec![],
            status: AgentStatus::Online,
            health_score: health,
            last_heartbeat: Utc::now(),
            registered_at: Utc::now(),
            tags: tags.iter().map(|t| t.to_string()).collect::<BTreeSet<_>>(),
            metadata: HashMap::new(),
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_defaults_without_limits_or_history() {
        let cap = Capability::new("x").with_reliability(0.9);
        let s = score(&agent(90.0, &[]), &cap, &TaskRequirement::new("x"), None);
        assert!(close(s.latency, 1.0));
        assert!(close(s.cost, 0.8));
        assert!(close(s.historical, 0.5));
        assert!(close(s.load_balance, 0.9));
        // 0.225 + 0.225 + 0.2 + 0.12 + 0.05 + 0.045
        assert!(close(s.total, 86.5));
    }

    #[test]
    fn test_latency_over_limit_contributes_nothing() {
        let cap = Capability::new("x").with_latency_ms(200);
        let req = TaskRequirement::new("x").with_max_latency_ms(150);
        let s = score(&agent(90.0, &[]), &cap, &req, None);
        assert_eq!(s.latency, 0.0);

        let fast = Capability::new("x").with_latency_ms(75);
        let s = score(&agent(90.0, &[]), &fast, &req, None);
        assert!(close(s.latency, 0.5));
    }

    #[test]
    fn test_cost_budget() {
        let cap = Capability::new("x").with_cost(0.25);
        let req = TaskRequirement::new("x").with_cost_budget(1.0);
        assert!(close(score(&agent(90.0, &[]), &cap, &req, None).cost, 0.75));

        let pricey = Capability::new("x").with_cost(3.0);
        assert_eq!(score(&agent(90.0, &[]), &pricey, &req, None).cost, 0.0);
    }

    #[test]
    fn test_historical_term() {
        let good = HistoricalPerformance {
            success_rate: 1.0,
            average_latency_ms: 300.0,
            average_cost: 0.001,
        };
        let cap = Capability::new("x");
        let s = score(&agent(90.0, &[]), &cap, &TaskRequirement::new("x"), Some(&good));
        assert!(close(s.historical, 1.0));

        let poor = HistoricalPerformance {
            success_rate: 0.2,
            average_latency_ms: 9000.0,
            average_cost: 1.0,
        };
        let s = score(&agent(90.0, &[]), &cap, &TaskRequirement::new("x"), Some(&poor));
        // 0.1 + 0.15 + 0.14
        assert!(close(s.historical, 0.39));
    }

    #[test]
    fn test_load_balance_tiers() {
        let cap = Capability::new("x");
        let req = TaskRequirement::new("x");
        assert!(close(score(&agent(80.0, &[]), &cap, &req, None).load_balance, 0.6));
        assert!(close(
            score(&agent(80.0, &[HIGH_PERFORMANCE_TAG]), &cap, &req, None).load_balance,
            0.7
        ));
        assert!(close(
            score(&agent(95.0, &[HIGH_PERFORMANCE_TAG]), &cap, &req, None).load_balance,
            1.0
        ));
    }

    #[test]
    fn test_latency_fit_can_outweigh_health() {
        let req = TaskRequirement::new("x").with_max_latency_ms(150);
        let slow = score(
            &agent(90.0, &[]),
            &Capability::new("x").with_reliability(0.9).with_latency_ms(200),
            &req,
            None,
        );
        let fast = score(
            &agent(75.0, &[]),
            &Capability::new("x").with_reliability(0.95).with_latency_ms(100),
            &req,
            None,
        );
        assert!(fast.total > slow.total);
    }

    proptest! {
        #[test]
        fn test_score_always_in_range(
            health in -50.0f64..200.0,
            reliability in -1.0f64..2.0,
            latency in 0u64..100_000,
            cost in 0.0f64..1_000.0,
            max_latency in proptest::option::of(0u64..50_000),
            budget in proptest::option::of(0.0f64..500.0),
            success_rate in proptest::option::of(-1.0f64..2.0),
            tagged in any::<bool>(),
        ) {
            let tags: &[&str] = if tagged { &[HIGH_PERFORMANCE_TAG] } else { &[] };
            let record = agent(health, tags);
            let cap = Capability::new("x")
                .with_reliability(reliability)
                .with_latency_ms(latency)
                .with_cost(cost);
            let req = TaskRequirement {
                max_latency_ms: max_latency,
                cost_budget: budget,
                ..TaskRequirement::new("x")
            };
            let history = success_rate.map(|success_rate| HistoricalPerformance {
                success_rate,
                average_latency_ms: 1000.0,
                average_cost: 0.5,
            });

            let s = score(&record, &cap, &req, history.as_ref());
            prop_assert!((0.0..=100.0).contains(&s.total));
            for term in [s.health, s.reliability, s.latency, s.cost, s.historical, s.load_balance] {
                prop_assert!((0.0..=1.0).contains(&term));
            }
        }
    }
}
