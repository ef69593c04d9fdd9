//! Wire protocol shared between the agent and a Hub.
//!
//! A single bidirectional stream carries two frame flavors: UTF-8 JSON text
//! frames (the [`Envelope`] shape) and length-prefixed binary frames (see
//! [`binary`]). This crate only describes the shapes; it has no knowledge of
//! sockets, sessions, or authorization — that lives in `capydeploy-core`.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

mod binary;
mod envelope;
mod messages;

pub use binary::BinaryHeader;
pub use binary::decode_binary_frame;
pub use binary::encode_binary_frame;
pub use envelope::ErrorObject;
pub use envelope::Envelope;
pub use messages::ClientMessage;
pub use messages::DeleteGamePayload;
pub use messages::FileEntry;
pub use messages::InitUploadConfig;
pub use messages::InitUploadPayload;
pub use messages::PairConfirmPayload;
pub use messages::ShortcutConfig;
pub use messages::UploadChunkPayload;
pub use messages::CompleteUploadPayload;
pub use messages::CancelUploadPayload;
pub use messages::HubConnectedPayload;

/// Well-known error codes used on the wire. Not exhaustive — handlers may
/// also log-and-drop without ever constructing one of these.
pub mod error_codes {
    pub const NOT_AUTHORIZED: i64 = 401;
    pub const HUB_ID_REQUIRED: i64 = 401;
    pub const UPLOAD_NOT_FOUND: i64 = 404;
}

/// Capabilities advertised in `info_response`.
pub const CAPABILITIES: &[&str] = &["file_upload", "steam_shortcuts", "steam_artwork"];
