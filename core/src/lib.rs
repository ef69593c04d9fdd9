//! Core of the deployment agent: pairing/authorization, the upload session
//! registry, the connection handler, and the composition root that wires
//! them together with the settings store and the discovery advertiser.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

mod connection;
mod error;
mod events;
mod games;
mod identity;
mod pairing;
mod platform;
mod settings;
mod shortcuts;
mod supervisor;
mod uploads;

pub use connection::handle_connection;
pub use error::AgentError;
pub use events::EventPublisher;
pub use games::InstalledGame;
pub use games::list_installed_games;
pub use identity::AgentIdentity;
pub use identity::derive_agent_id;
pub use pairing::AuthorizedHub;
pub use pairing::PairingManager;
pub use platform::PlatformInfo;
pub use platform::SteamUser;
pub use platform::detect_platform;
pub use platform::expand_home;
pub use platform::list_steam_users;
pub use platform::probe;
pub use platform::resolve_steam_dir;
pub use platform::resolve_user_home;
pub use settings::EVENT_KEY_PREFIX;
pub use settings::SettingsStore;
pub use shortcuts::TrackedShortcut;
pub use supervisor::AgentShared;
pub use supervisor::AgentStatus;
pub use supervisor::AgentSupervisor;
pub use supervisor::CliOverrides;
pub use supervisor::ConnectedHubInfo;
pub use supervisor::LISTEN_PORT;
pub use uploads::CHUNK_SIZE;
pub use uploads::FileEntry;
pub use uploads::UploadRegistry;
pub use uploads::UploadSession;
pub use uploads::UploadStatus;
