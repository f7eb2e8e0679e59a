use std::collections::HashMap;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::time::Instant;

use armada_core::traits::PerformanceHistory;
use armada_core::types::HistoricalPerformance;

/// Fixed per-agent history.
#[derive(Default)]
pub struct StaticHistory {
    entries: HashMap<String, HistoricalPerformance>,
}

impl StaticHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, agent_id: &str, performance: HistoricalPerformance) -> Self {
        self.entries.insert(agent_id.to_string(), performance);
        self
    }
}

impl PerformanceHistory for StaticHistory {
    fn performance(&self, agent_id: &str) -> BoxFuture<'_, Option<HistoricalPerformance>> {
        let found = self.entries.get(agent_id).cloned();
        Box::pin(async move { found })
    }
}

/// History source that answers nothing after a delay and records when each
/// lookup began. Used to observe how many lookups run concurrently.
pub struct DelayedHistory {
    delay: Duration,
    calls: Mutex<Vec<Instant>>,
}

impl DelayedHistory {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().clone()
    }
}

impl PerformanceHistory for DelayedHistory {
    fn performance(&self, _agent_id: &str) -> BoxFuture<'_, Option<HistoricalPerformance>> {
        self.calls.lock().push(Instant::now());
        let delay = self.delay;
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            None
        })
    }
}
