use std::collections::HashMap;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::time::Instant;

use armada_core::error::{ArmadaError, Result};
use armada_core::traits::AgentInvoker;

/// Scripted behavior for one capability.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Return the payload unchanged.
    Echo,
    /// Return this value.
    Value(Value),
    /// Fail with this message.
    Fail(String),
    /// Wait, then behave like the inner reply.
    After(Duration, Box<Reply>),
    /// Never answer.
    Hang,
}

impl Reply {
    pub fn value(value: Value) -> Self {
        Self::Value(value)
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self::Fail(message.into())
    }

    pub fn delayed(self, delay: Duration) -> Self {
        Self::After(delay, Box::new(self))
    }
}

/// One recorded call to the mock.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub endpoint: String,
    pub capability: String,
    pub payload: Value,
    pub started_at: Instant,
    /// Set once the scripted reply resolved. Stays `None` for hung calls.
    pub finished_at: Option<Instant>,
}

/// In-memory [`AgentInvoker`] with per-capability scripted replies.
///
/// Capabilities without a script echo their payload.
pub struct MockInvoker {
    replies: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<Invocation>>,
}

impl Default for MockInvoker {
    fn default() -> Self {
        Self::new()
    }
}

impl MockInvoker {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn on(self, capability: &str, reply: Reply) -> Self {
        self.replies.lock().insert(capability.to_string(), reply);
        self
    }

    /// Replace the script for a capability after construction.
    pub fn set(&self, capability: &str, reply: Reply) {
        self.replies.lock().insert(capability.to_string(), reply);
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().clone()
    }

    pub fn calls_for(&self, capability: &str) -> Vec<Invocation> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.capability == capability)
            .cloned()
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

impl AgentInvoker for MockInvoker {
    fn invoke(
        &self,
        endpoint: &str,
        capability: &str,
        payload: Value,
    ) -> BoxFuture<'_, Result<Value>> {
        let reply = self
            .replies
            .lock()
            .get(capability)
            .cloned()
            .unwrap_or(Reply::Echo);

        let index = {
            let mut calls = self.calls.lock();
            calls.push(Invocation {
                endpoint: endpoint.to_string(),
                capability: capability.to_string(),
                payload: payload.clone(),
                started_at: Instant::now(),
                finished_at: None,
            });
            calls.len() - 1
        };
        let capability = capability.to_string();

        Box::pin(async move {
            let result = resolve(reply, &capability, payload).await;
            if let Some(call) = self.calls.lock().get_mut(index) {
                call.finished_at = Some(Instant::now());
            }
            result
        })
    }
}

fn resolve(reply: Reply, capability: &str, payload: Value) -> BoxFuture<'_, Result<Value>> {
    Box::pin(async move {
        match reply {
            Reply::Echo => Ok(payload),
            Reply::Value(value) => Ok(value),
            Reply::Fail(message) => Err(ArmadaError::invocation(capability, message)),
            Reply::After(delay, inner) => {
                tokio::time::sleep(delay).await;
                resolve(*inner, capability, payload).await
            }
            Reply::Hang => std::future::pending().await,
        }
    })
}
