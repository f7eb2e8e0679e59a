use parking_lot::Mutex;

use armada_core::event::{ArmadaEvent, EventSink};

/// Event sink that keeps everything it receives.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ArmadaEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ArmadaEvent> {
        self.events.lock().clone()
    }

    /// Event kinds in arrival order, as their serde tag (`step_started`, ...).
    pub fn kinds(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| {
                serde_json::to_value(e)
                    .ok()
                    .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(String::from))
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, event: ArmadaEvent) {
        self.events.lock().push(event);
    }
}
