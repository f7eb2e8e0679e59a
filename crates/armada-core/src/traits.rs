use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::HistoricalPerformance;

/// Calls a capability on a remote agent. Transport is the implementor's concern.
pub trait AgentInvoker: Send + Sync + 'static {
    /// Invoke `capability` on the agent reachable at `endpoint`.
    fn invoke(
        &self,
        endpoint: &str,
        capability: &str,
        payload: serde_json::Value,
    ) -> BoxFuture<'_, Result<serde_json::Value>>;
}

/// Source of historical per-agent performance for scoring.
pub trait PerformanceHistory: Send + Sync + 'static {
    /// `None` means no history; scoring falls back to a neutral value.
    fn performance(&self, agent_id: &str) -> BoxFuture<'_, Option<HistoricalPerformance>>;
}
