use sha2::Digest;
use sha2::Sha256;

/// Stable identity of this agent installation. `agent_id` is derived once on
/// first boot and persisted thereafter; it never changes across restarts.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AgentIdentity {
    pub agent_id: String,
    pub agent_name: String,
    pub platform: String,
    pub version: String,
}

/// Derive an 8-hex-char agent id from `sha256(agent_name || platform ||
/// boot_time)[0:8]`. `boot_time` is an opaque seed supplied by the caller
/// (typically `SystemTime::now()` formatted as unix seconds) so this stays
/// a pure function under test.
pub fn derive_agent_id(agent_name: &str, platform: &str, boot_time: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(agent_name.as_bytes());
    hasher.update(platform.as_bytes());
    hasher.update(boot_time.as_bytes());
    let digest = hasher.finalize();
    digest[0..4].iter().map(|byte| format!("{byte:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let a = derive_agent_id("Deck", "linux", "1700000000");
        let b = derive_agent_id("Deck", "linux", "1700000000");
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
    }

    #[test]
    fn derivation_differs_with_boot_time() {
        let a = derive_agent_id("Deck", "linux", "1700000000");
        let b = derive_agent_id("Deck", "linux", "1700000001");
        assert_ne!(a, b);
    }
}
