use std::sync::Arc;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use rand::Rng;
use rand::distr::Alphanumeric;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::settings::SettingsStore;

const PENDING_TTL_SECS: u64 = 60;
const TOKEN_LEN: usize = 32;
const AUTHORIZED_HUBS_KEY: &str = "authorized_hubs";

/// A Hub authorized by a prior successful pairing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizedHub {
    pub name: String,
    pub token: String,
    #[serde(rename = "pairedAt")]
    pub paired_at: u64,
}

/// At most one at a time, in-memory only. Overwritten by any subsequent
/// unpaired `hub_connected`.
#[derive(Debug, Clone, PartialEq)]
struct PendingPairing {
    code: String,
    hub_id: String,
    hub_name: String,
    expires_at: u64,
}

/// Issues and validates pairing codes and bearer tokens. Authorized hubs are
/// persisted through the settings store; the pending code lives only in
/// memory, matching spec's "process-wide pending pair" design.
pub struct PairingManager {
    settings: Arc<SettingsStore>,
    pending: Mutex<Option<PendingPairing>>,
}

impl PairingManager {
    pub fn new(settings: Arc<SettingsStore>) -> Self {
        Self { settings, pending: Mutex::new(None) }
    }

    /// Replace any prior pending pair with a fresh six-digit code.
    pub fn generate_code(&self, hub_id: &str, hub_name: &str) -> String {
        let code: String = (0..6)
            .map(|_| char::from(b'0' + rand::rng().random_range(0..10)))
            .collect();
        #[expect(clippy::unwrap_used, reason = "poisoned only if a prior call panicked")]
        let mut pending = self.pending.lock().unwrap();
        *pending = Some(PendingPairing {
            code: code.clone(),
            hub_id: hub_id.to_string(),
            hub_name: hub_name.to_string(),
            expires_at: now_secs() + PENDING_TTL_SECS,
        });
        code
    }

    /// Validate a pairing code for `hub_id`. On success, mints a token,
    /// persists the authorized hub, and clears the pending pair.
    pub fn validate_code(&self, hub_id: &str, code: &str) -> std::io::Result<Option<String>> {
        #[expect(clippy::unwrap_used, reason = "poisoned only if a prior call panicked")]
        let mut pending_guard = self.pending.lock().unwrap();
        let matches = match pending_guard.as_ref() {
            Some(pending) => {
                pending.hub_id == hub_id && pending.code == code && now_secs() <= pending.expires_at
            }
            None => false,
        };
        if !matches {
            return Ok(None);
        }
        let hub_name = pending_guard.as_ref().map(|p| p.hub_name.clone()).unwrap_or_default();
        *pending_guard = None;
        drop(pending_guard);

        let token = generate_token();
        let mut hubs = self.load_hubs();
        hubs.insert(
            hub_id.to_string(),
            AuthorizedHub { name: hub_name, token: token.clone(), paired_at: now_secs() },
        );
        self.save_hubs(&hubs)?;
        Ok(Some(token))
    }

    /// Constant-time-ish lookup; a mismatch or unknown hub both return false.
    pub fn validate_token(&self, hub_id: &str, token: &str) -> bool {
        self.load_hubs().get(hub_id).is_some_and(|hub| hub.token == token)
    }

    pub fn authorized_hubs(&self) -> std::collections::BTreeMap<String, AuthorizedHub> {
        self.load_hubs()
    }

    /// Remove a hub's authorization. Returns `false` if it was not known.
    pub fn revoke(&self, hub_id: &str) -> std::io::Result<bool> {
        let mut hubs = self.load_hubs();
        let removed = hubs.remove(hub_id).is_some();
        if removed {
            self.save_hubs(&hubs)?;
        }
        Ok(removed)
    }

    fn load_hubs(&self) -> std::collections::BTreeMap<String, AuthorizedHub> {
        let value = self.settings.get(AUTHORIZED_HUBS_KEY, Value::Object(Default::default()));
        serde_json::from_value(value).unwrap_or_default()
    }

    fn save_hubs(&self, hubs: &std::collections::BTreeMap<String, AuthorizedHub>) -> std::io::Result<()> {
        #[expect(clippy::unwrap_used, reason = "a BTreeMap<String, AuthorizedHub> always serializes")]
        let value = serde_json::to_value(hubs).unwrap();
        self.settings.set(AUTHORIZED_HUBS_KEY, value)
    }
}

fn generate_token() -> String {
    rand::rng().sample_iter(&Alphanumeric).take(TOKEN_LEN).map(char::from).collect()
}

fn now_secs() -> u64 {
    #[expect(clippy::unwrap_used, reason = "system clock is never before the unix epoch")]
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_code_replaces_any_prior_pending_pair() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = SettingsStore::open(dir.path().join("settings.json")).expect("open");
        let manager = PairingManager::new(Arc::new(settings));
        let first = manager.generate_code("hub-a", "A");
        let _second = manager.generate_code("hub-b", "B");
        // the first code, for hub-a, is no longer valid since the slot was replaced
        assert_eq!(manager.validate_code("hub-a", &first).expect("validate"), None);
    }

    #[test]
    fn valid_code_mints_a_32_char_token_and_persists_it() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = SettingsStore::open(dir.path().join("settings.json")).expect("open");
        let manager = PairingManager::new(Arc::new(settings));
        let code = manager.generate_code("hub-a", "A");
        let token = manager.validate_code("hub-a", &code).expect("validate").expect("some token");
        assert_eq!(token.len(), 32);
        assert!(manager.validate_token("hub-a", &token));
    }

    #[test]
    fn token_survives_a_fresh_store_reload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.json");
        let token = {
            let settings = SettingsStore::open(&path).expect("open");
            let manager = PairingManager::new(Arc::new(settings));
            let code = manager.generate_code("hub-a", "A");
            manager.validate_code("hub-a", &code).expect("validate").expect("some token")
        };

        let settings = SettingsStore::open(&path).expect("reopen");
        let manager = PairingManager::new(Arc::new(settings));
        assert!(manager.validate_token("hub-a", &token));
    }

    #[test]
    fn wrong_code_does_not_consume_the_pending_pair() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = SettingsStore::open(dir.path().join("settings.json")).expect("open");
        let manager = PairingManager::new(Arc::new(settings));
        let code = manager.generate_code("hub-a", "A");
        assert_eq!(manager.validate_code("hub-a", "000000").expect("validate"), None);
        assert_eq!(
            manager.validate_code("hub-a", &code).expect("validate").map(|t| t.len()),
            Some(32)
        );
    }

    #[test]
    fn revoke_is_idempotent_for_an_unknown_hub() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = SettingsStore::open(dir.path().join("settings.json")).expect("open");
        let manager = PairingManager::new(Arc::new(settings));
        assert!(!manager.revoke("nobody").expect("revoke"));
    }
}
