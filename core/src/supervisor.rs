use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use capydeploy_discovery::AdvertisedInfo;
use capydeploy_discovery::Advertiser;
use serde::Serialize;
use serde_json::Value;
use tokio::net::TcpListener;

use crate::connection;
use crate::events::EventPublisher;
use crate::games;
use crate::identity::AgentIdentity;
use crate::identity::derive_agent_id;
use crate::pairing::PairingManager;
use crate::platform;
use crate::settings::SettingsStore;

pub const LISTEN_PORT: u16 = 9999;

/// A Hub currently connected and authorized on this process, if any. Reset
/// to `None` on socket close. Process-wide by design: the agent serves at
/// most one Hub at a time.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectedHubInfo {
    pub hub_id: String,
    pub name: String,
    pub version: String,
}

/// State shared across every connection task and the local control API.
/// Owned by [`AgentSupervisor`] and handed out as an `Arc`.
pub struct AgentShared {
    pub identity: AgentIdentity,
    pub settings: Arc<SettingsStore>,
    pub pairing: Arc<PairingManager>,
    pub events: Arc<EventPublisher>,
    pub connected_hub: Mutex<Option<ConnectedHubInfo>>,
}

#[derive(Debug, Serialize)]
pub struct AgentStatus {
    pub enabled: bool,
    pub connected: bool,
    #[serde(rename = "hubName", skip_serializing_if = "Option::is_none")]
    pub hub_name: Option<String>,
    #[serde(rename = "agentName")]
    pub agent_name: String,
    #[serde(rename = "installPath")]
    pub install_path: String,
    pub platform: String,
    pub version: String,
    pub port: u16,
    pub ip: String,
}

/// Per-invocation CLI overrides. These never get persisted to the settings
/// store — only explicit `set_*` calls do (SPEC_FULL §6 config precedence).
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub install_path: Option<String>,
    pub agent_name: Option<String>,
}

/// Composition root: owns the settings store, pairing manager, and event
/// publisher, and brings the discovery advertiser and the connection
/// listener up or down as `enabled` flips.
pub struct AgentSupervisor {
    shared: Arc<AgentShared>,
    advertiser: Option<Advertiser>,
    install_path_override: Option<String>,
}

impl AgentSupervisor {
    /// Load settings, derive or reuse the persisted `agent_id`, and build the
    /// shared runtime state. Does not start listening or advertising yet.
    pub fn load(overrides: CliOverrides) -> std::io::Result<Self> {
        let settings = Arc::new(SettingsStore::open_default()?);
        let probed = platform::probe();

        let agent_name = overrides
            .agent_name
            .unwrap_or_else(|| settings.get_string("agent_name", &probed.hostname));
        let existing_id = settings.get_string("agent_id", "");
        let agent_id = if existing_id.is_empty() {
            let boot_time = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs().to_string())
                .unwrap_or_default();
            let generated = derive_agent_id(&agent_name, &probed.platform, &boot_time);
            settings.set("agent_id", Value::String(generated.clone()))?;
            generated
        } else {
            existing_id
        };

        let identity = AgentIdentity {
            agent_id,
            agent_name,
            platform: probed.platform,
            version: env!("CARGO_PKG_VERSION").to_string(),
        };

        let pairing = Arc::new(PairingManager::new(Arc::clone(&settings)));
        let events = Arc::new(EventPublisher::new(Arc::clone(&settings)));

        let shared = Arc::new(AgentShared {
            identity,
            settings,
            pairing,
            events,
            connected_hub: Mutex::new(None),
        });

        Ok(Self {
            shared,
            advertiser: None,
            install_path_override: overrides.install_path,
        })
    }

    pub fn shared(&self) -> Arc<AgentShared> {
        Arc::clone(&self.shared)
    }

    fn install_root(&self) -> PathBuf {
        let configured = self
            .install_path_override
            .clone()
            .unwrap_or_else(|| self.shared.settings.get_string("install_path", ""));
        if configured.is_empty() {
            return std::env::temp_dir().join("capydeploy-agent/games");
        }
        let home = platform::resolve_user_home(std::path::Path::new("/"));
        platform::expand_home(&configured, &home)
    }

    /// Bring up the DNS-SD advertiser and the WebSocket listener on `port`
    /// (pass [`LISTEN_PORT`] for the spec's default). Returns a handle that
    /// must be polled to drive incoming connections; dropping it does not
    /// stop the advertiser (call [`AgentSupervisor::disable`]).
    pub async fn enable(&mut self, port: u16) -> std::io::Result<tokio::task::JoinHandle<()>> {
        let probed = platform::probe();
        let info = AdvertisedInfo {
            agent_id: self.shared.identity.agent_id.clone(),
            device_name: self.shared.identity.agent_name.clone(),
            platform: self.shared.identity.platform.clone(),
            version: self.shared.identity.version.clone(),
            hostname: probed.hostname,
            local_ipv4: probed.local_ipv4,
            port,
        };
        let advertiser = Advertiser::start(info)
            .map_err(|error| std::io::Error::other(error.to_string()))?;
        self.advertiser = Some(advertiser);

        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        let shared = Arc::clone(&self.shared);
        let install_root = self.install_root();
        std::fs::create_dir_all(&install_root)?;

        Ok(tokio::spawn(async move {
            loop {
                let (socket, peer) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(error) => {
                        tracing::warn!(%error, "accept failed");
                        continue;
                    }
                };
                let shared = Arc::clone(&shared);
                let install_root = install_root.clone();
                tokio::spawn(async move {
                    match tokio_tungstenite::accept_async(socket).await {
                        Ok(ws_stream) => {
                            tracing::debug!(%peer, "hub connected");
                            connection::handle_connection(ws_stream, shared, install_root).await;
                        }
                        Err(error) => tracing::warn!(%error, %peer, "websocket upgrade failed"),
                    }
                });
            }
        }))
    }

    /// Tear down the advertiser. The listener task, if any, must be aborted
    /// by the caller holding its `JoinHandle`.
    pub fn disable(&mut self) {
        if let Some(advertiser) = self.advertiser.take() {
            advertiser.stop();
        }
    }

    pub fn get_status(&self, port: u16) -> AgentStatus {
        let probed = platform::probe();
        #[expect(clippy::unwrap_used, reason = "poisoned only if a prior handler panicked while holding the lock")]
        let connected_hub = self.shared.connected_hub.lock().unwrap();
        AgentStatus {
            enabled: self.shared.settings.get_bool("enabled", false),
            connected: connected_hub.is_some(),
            hub_name: connected_hub.as_ref().map(|hub| hub.name.clone()),
            agent_name: self.shared.identity.agent_name.clone(),
            install_path: self.install_root().to_string_lossy().into_owned(),
            platform: self.shared.identity.platform.clone(),
            version: self.shared.identity.version.clone(),
            port,
            ip: probed.local_ipv4,
        }
    }

    pub fn get_installed_games(&self) -> Vec<games::InstalledGame> {
        games::list_installed_games(&self.install_root())
    }

    /// Persist a new `agent_name`. Takes effect on the next `load()`; the
    /// identity already loaded into this process is not mutated in place.
    pub fn set_agent_name(&self, name: &str) -> std::io::Result<()> {
        self.shared.settings.set("agent_name", Value::String(name.to_string()))
    }

    /// Persist a new `install_path`. Takes effect on the next `load()`, same
    /// as `set_agent_name`; a per-invocation `--install-path` override still
    /// wins over this for the process that set it.
    pub fn set_install_path(&self, path: &str) -> std::io::Result<()> {
        self.shared.settings.set("install_path", Value::String(path.to_string()))
    }

    /// Record the Steam-assigned `app_id` for a previously completed,
    /// still-pending shortcut. Returns `false` if no pending shortcut for
    /// `game_name` was found.
    pub fn register_shortcut(&self, game_name: &str, app_id: u64) -> std::io::Result<bool> {
        crate::shortcuts::set_app_id_by_game_name(&self.shared.settings, game_name, app_id)
    }

    /// Remove an installed game's directory by name and drop its tracked
    /// shortcut, if one exists. Returns `false` if the game directory was
    /// not present.
    pub fn uninstall_game(&self, name: &str) -> std::io::Result<bool> {
        let path = self.install_root().join(name);
        let removed = std::fs::remove_dir_all(&path).is_ok();
        let tracked = crate::shortcuts::load(&self.shared.settings);
        if let Some(shortcut) = tracked.iter().find(|s| s.game_name == name) {
            crate::shortcuts::remove_by_app_id(&self.shared.settings, shortcut.app_id)?;
        }
        Ok(removed)
    }

    /// Drain a named event slot for the local control API (see
    /// `events::EventPublisher::drain`).
    pub fn get_event(&self, name: &str) -> Value {
        self.shared.events.drain(name)
    }

    pub fn log_info(&self, message: &str) {
        tracing::info!(agent_id = %self.shared.identity.agent_id, "{message}");
    }

    pub fn log_error(&self, message: &str) {
        tracing::error!(agent_id = %self.shared.identity.agent_id, "{message}");
    }
}
