use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;

use serde_json::Map;
use serde_json::Value;

/// Persistent key to JSON-value map with defaults, backed by a single JSON
/// file rewritten atomically on every write. Loaded fully into memory; all
/// operations are synchronous, matching the single-writer policy of the
/// agent's cooperative scheduler.
pub struct SettingsStore {
    path: PathBuf,
    values: Mutex<Map<String, Value>>,
}

/// Prefix reserved for event records (`_event_<name>`), drained by the UI.
pub const EVENT_KEY_PREFIX: &str = "_event_";

impl SettingsStore {
    /// Resolve the settings file under `$XDG_CONFIG_HOME/capydeploy-agent`
    /// (or the platform config-dir fallback) and load it, creating an empty
    /// store in memory if the file does not exist yet.
    pub fn open_default() -> io::Result<Self> {
        let dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("capydeploy-agent");
        Self::open(dir.join("settings.json"))
    }

    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Map::new(),
            Err(error) => return Err(error),
        };
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    /// Returns the stored value for `key`, or `default` if absent.
    pub fn get(&self, key: &str, default: Value) -> Value {
        #[expect(clippy::unwrap_used, reason = "poisoned only if a prior set panicked mid-write")]
        let values = self.values.lock().unwrap();
        values.get(key).cloned().unwrap_or(default)
    }

    pub fn get_string(&self, key: &str, default: &str) -> String {
        self.get(key, Value::String(default.to_string()))
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| default.to_string())
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get(key, Value::Bool(default)).as_bool().unwrap_or(default)
    }

    /// Set `key` to `value` and persist the whole store atomically.
    pub fn set(&self, key: &str, value: Value) -> io::Result<()> {
        if !key.starts_with(EVENT_KEY_PREFIX) {
            tracing::debug!(key, "setting updated");
        }
        #[expect(clippy::unwrap_used, reason = "poisoned only if a prior set panicked mid-write")]
        let mut values = self.values.lock().unwrap();
        values.insert(key.to_string(), value);
        self.persist(&values)
    }

    /// Remove `key` if present and persist the store.
    pub fn remove(&self, key: &str) -> io::Result<()> {
        #[expect(clippy::unwrap_used, reason = "poisoned only if a prior set panicked mid-write")]
        let mut values = self.values.lock().unwrap();
        values.remove(key);
        self.persist(&values)
    }

    fn persist(&self, values: &Map<String, Value>) -> io::Result<()> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, values)
            .map_err(|error| io::Error::new(io::ErrorKind::InvalidData, error))?;
        tmp.persist(&self.path).map_err(|error| {
            tracing::error!(error = %error, "failed to persist settings file");
            error.error
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_value_through_get_and_set() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SettingsStore::open(dir.path().join("settings.json")).expect("open");
        store.set("agent_name", Value::String("Deck".to_string())).expect("set");
        assert_eq!(store.get_string("agent_name", "fallback"), "Deck");
    }

    #[test]
    fn missing_key_returns_the_supplied_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SettingsStore::open(dir.path().join("settings.json")).expect("open");
        assert_eq!(store.get_string("missing", "fallback"), "fallback");
    }

    #[test]
    fn reloading_from_disk_sees_prior_writes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.json");
        let store = SettingsStore::open(&path).expect("open");
        store.set("enabled", Value::Bool(true)).expect("set");
        drop(store);

        let reopened = SettingsStore::open(&path).expect("reopen");
        assert!(reopened.get_bool("enabled", false));
    }
}
