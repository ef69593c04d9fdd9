use std::sync::Arc;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;
use serde_json::Value;

use crate::settings::SettingsStore;
use crate::settings::EVENT_KEY_PREFIX;

/// Publishes named lifecycle/progress events into the settings store for a
/// co-located UI process to drain. This is a workaround for a host-imposed
/// IPC limitation (see DESIGN.md); a freestanding port would use an
/// in-memory broadcast channel instead.
pub struct EventPublisher {
    settings: Arc<SettingsStore>,
}

#[derive(Debug, Serialize)]
struct EventRecord {
    timestamp: u64,
    data: Value,
}

impl EventPublisher {
    pub fn new(settings: Arc<SettingsStore>) -> Self {
        Self { settings }
    }

    /// Publish `data` under `_event_<name>`, stamped with the current time.
    pub fn publish(&self, name: &str, data: impl Serialize) -> std::io::Result<()> {
        let record = EventRecord {
            timestamp: now_secs(),
            data: serde_json::to_value(data).unwrap_or(Value::Null),
        };
        let value = serde_json::to_value(record).unwrap_or(Value::Null);
        self.settings.set(&format!("{EVENT_KEY_PREFIX}{name}"), value)
    }

    /// Read and clear an event slot (drain semantics: the UI reads then the
    /// agent resets it to null).
    pub fn drain(&self, name: &str) -> Value {
        let value = self.settings.get(&format!("{EVENT_KEY_PREFIX}{name}"), Value::Null);
        let _ = self.settings.set(&format!("{EVENT_KEY_PREFIX}{name}"), Value::Null);
        value
    }
}

fn now_secs() -> u64 {
    #[expect(clippy::unwrap_used, reason = "system clock is never before the unix epoch")]
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs()
}
