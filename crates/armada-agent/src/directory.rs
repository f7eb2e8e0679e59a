use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use armada_core::config::DirectoryConfig;
use armada_core::event::{ArmadaEvent, EventSink};
use armada_core::types::{clamp_health, AgentDescriptor, AgentKind, AgentRecord, AgentStatus};

/// A record plus the bookkeeping the health sweep needs.
struct AgentEntry {
    record: AgentRecord,
    /// Health as of the last heartbeat; decay is always measured from here.
    health_at_heartbeat: f64,
}

/// What a single health sweep changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SweepReport {
    /// Agents whose health decayed but stayed reachable.
    pub decayed: Vec<String>,
    /// Agents the sweep marked offline.
    pub went_offline: Vec<String>,
}

/// Registry of agents, their capabilities, and their health.
///
/// The table is guarded by an async `RwLock`; each entry sits behind its own
/// lock so a sweep only ever contends with readers of the same agent.
/// Records are never removed: unregistering flips the status to offline.
pub struct AgentDirectory {
    agents: RwLock<HashMap<String, Arc<Mutex<AgentEntry>>>>,
    config: DirectoryConfig,
    events: Option<Arc<dyn EventSink>>,
}

impl AgentDirectory {
    pub fn new(config: DirectoryConfig) -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
            config,
            events: None,
        }
    }

    /// Attach a sink for lifecycle notifications.
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    /// Register an agent. It starts online with full health.
    pub async fn register(&self, descriptor: AgentDescriptor) -> AgentRecord {
        let now = Utc::now();
        let mut agents = self.agents.write().await;

        let base = agent_id(descriptor.kind, &descriptor.name, now);
        let mut id = base.clone();
        let mut n = 1;
        while agents.contains_key(&id) {
            id = format!("{}_{}", base, n);
            n += 1;
        }

        let record = AgentRecord {
            id: id.clone(),
            name: descriptor.name,
            kind: descriptor.kind,
            version: descriptor.version,
            endpoint: descriptor.endpoint,
            capabilities: descriptor.capabilities,
            status: AgentStatus::Online,
            health_score: 100.0,
            last_heartbeat: now,
            registered_at: now,
            tags: descriptor.tags,
            metadata: descriptor.metadata,
        };

        agents.insert(
            id.clone(),
            Arc::new(Mutex::new(AgentEntry {
                record: record.clone(),
                health_at_heartbeat: 100.0,
            })),
        );
        drop(agents);

        info!(
            agent_id = %id,
            kind = %record.kind,
            capabilities = record.capabilities.len(),
            "Agent registered"
        );
        self.publish(ArmadaEvent::AgentRegistered {
            agent: record.clone(),
        });
        record
    }

    /// Mark an agent offline. Unknown ids are ignored.
    ///
    /// Returns whether the agent was known.
    pub async fn unregister(&self, id: &str) -> bool {
        let Some(entry) = self.entry(id).await else {
            debug!(agent_id = %id, "Unregister for unknown agent ignored");
            return false;
        };

        let record = {
            let mut entry = entry.lock();
            entry.record.status = AgentStatus::Offline;
            entry.record.clone()
        };

        info!(agent_id = %id, "Agent unregistered");
        self.publish(ArmadaEvent::AgentUnregistered { agent: record });
        true
    }

    /// Set status (and optionally health) and refresh the heartbeat.
    /// Unknown ids are ignored.
    pub async fn update_status(&self, id: &str, status: AgentStatus, health: Option<f64>) -> bool {
        let Some(entry) = self.entry(id).await else {
            debug!(agent_id = %id, "Status update for unknown agent ignored");
            return false;
        };

        let record = {
            let mut entry = entry.lock();
            if let Some(health) = health {
                entry.record.health_score = clamp_health(health);
            }
            entry.record.status = status;
            entry.record.last_heartbeat = Utc::now();
            entry.health_at_heartbeat = entry.record.health_score;
            entry.record.clone()
        };

        debug!(
            agent_id = %id,
            status = ?record.status,
            health = record.health_score,
            "Agent status updated"
        );
        self.publish(ArmadaEvent::AgentStatusUpdated { agent: record });
        true
    }

    /// Heartbeat: the agent is online and keeps its current health.
    pub async fn heartbeat(&self, id: &str) -> bool {
        self.update_status(id, AgentStatus::Online, None).await
    }

    pub async fn get(&self, id: &str) -> Option<AgentRecord> {
        let entry = self.entry(id).await?;
        let record = entry.lock().record.clone();
        Some(record)
    }

    /// All records, offline ones included, ordered by id.
    pub async fn list(&self) -> Vec<AgentRecord> {
        let mut records = self.snapshot().await;
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    /// Online agents above the health threshold offering `capability` with at
    /// least `min_reliability`, best first by `health * reliability`.
    pub async fn find_by_capability(&self, capability: &str, min_reliability: f64) -> Vec<AgentRecord> {
        let mut matches: Vec<(f64, AgentRecord)> = self
            .snapshot()
            .await
            .into_iter()
            .filter(|r| r.is_online() && r.health_score > self.config.min_health)
            .filter_map(|r| {
                let reliability = r
                    .capabilities
                    .iter()
                    .filter(|c| c.name == capability && c.reliability >= min_reliability)
                    .map(|c| c.reliability)
                    .reduce(f64::max)?;
                Some((r.health_score * reliability, r))
            })
            .collect();

        matches.sort_by(|(sa, a), (sb, b)| sb.total_cmp(sa).then_with(|| a.id.cmp(&b.id)));
        matches.into_iter().map(|(_, r)| r).collect()
    }

    /// Online agents of a given kind, ordered by id.
    pub async fn find_by_kind(&self, kind: AgentKind) -> Vec<AgentRecord> {
        let mut records: Vec<AgentRecord> = self
            .snapshot()
            .await
            .into_iter()
            .filter(|r| r.is_online() && r.kind == kind)
            .collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    /// Apply heartbeat-staleness decay as of `now`.
    ///
    /// With `Δ = now - last_heartbeat` and `k = floor(Δ / interval)`:
    /// if `Δ > 2 * interval` the agent goes offline with health
    /// `h - decay * k - penalty`; otherwise its health becomes `h - decay * k`,
    /// where `h` is the health recorded at the last heartbeat. Agents already
    /// offline are left alone, so the penalty applies once.
    pub async fn sweep(&self, now: DateTime<Utc>, interval: Duration) -> SweepReport {
        let mut report = SweepReport::default();
        let interval_ms = interval.as_millis();
        if interval_ms == 0 {
            return report;
        }

        let mut went_offline = Vec::new();
        {
            let agents = self.agents.read().await;
            for (id, entry) in agents.iter() {
                let mut entry = entry.lock();
                if entry.record.status == AgentStatus::Offline {
                    continue;
                }

                let elapsed = (now - entry.record.last_heartbeat)
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                let missed = (elapsed.as_millis() / interval_ms) as f64;
                let decayed =
                    clamp_health(entry.health_at_heartbeat - self.config.decay_per_interval * missed);

                if elapsed > interval * 2 {
                    entry.record.status = AgentStatus::Offline;
                    entry.record.health_score = clamp_health(decayed - self.config.offline_penalty);
                    report.went_offline.push(id.clone());
                    went_offline.push(entry.record.clone());
                } else if decayed != entry.record.health_score {
                    entry.record.health_score = decayed;
                    report.decayed.push(id.clone());
                }
            }
        }

        for record in went_offline {
            warn!(
                agent_id = %record.id,
                health = record.health_score,
                "Agent missed heartbeats, marking offline"
            );
            self.publish(ArmadaEvent::AgentStatusUpdated { agent: record });
        }
        if !report.decayed.is_empty() {
            debug!(count = report.decayed.len(), "Agent health decayed");
        }

        report.decayed.sort();
        report.went_offline.sort();
        report
    }

    async fn entry(&self, id: &str) -> Option<Arc<Mutex<AgentEntry>>> {
        self.agents.read().await.get(id).cloned()
    }

    async fn snapshot(&self) -> Vec<AgentRecord> {
        self.agents
            .read()
            .await
            .values()
            .map(|e| e.lock().record.clone())
            .collect()
    }

    fn publish(&self, event: ArmadaEvent) {
        if let Some(ref events) = self.events {
            events.publish(event);
        }
    }
}

/// `kind_name_millis`, with the name reduced to lowercase alphanumerics and dashes.
fn agent_id(kind: AgentKind, name: &str, at: DateTime<Utc>) -> String {
    let slug: String = name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    format!("{}_{}_{}", kind, slug, at.timestamp_millis())
}
