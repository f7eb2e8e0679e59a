use armada_core::types::{AgentDescriptor, AgentKind, Capability};

/// A capability with reliability 0.95, 100ms expected latency and cost 0.01.
pub fn capability(name: &str) -> Capability {
    Capability::new(name)
        .with_reliability(0.95)
        .with_latency_ms(100)
        .with_cost(0.01)
}

/// A language agent at `mem://{name}` offering each named capability.
pub fn agent(name: &str, capabilities: &[&str]) -> AgentDescriptor {
    capabilities.iter().fold(
        AgentDescriptor::new(name, AgentKind::Language, format!("mem://{name}")),
        |desc, cap| desc.with_capability(capability(cap)),
    )
}
