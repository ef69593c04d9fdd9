use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::Envelope;

/// A request parsed out of an inbound [`Envelope`]. Dispatch on this, not on
/// the raw envelope, so the authorization gate in the connection handler is
/// a single `match` site.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    HubConnected(HubConnectedPayload),
    PairConfirm(PairConfirmPayload),
    Ping,
    GetInfo,
    GetConfig,
    InitUpload(InitUploadPayload),
    UploadChunk(UploadChunkPayload),
    CompleteUpload(CompleteUploadPayload),
    CancelUpload(CancelUploadPayload),
    GetSteamUsers,
    ListShortcuts,
    DeleteGame(DeleteGamePayload),
    RestartSteam,
    /// A `type` the agent does not recognize. Handlers log and do not reply.
    Unknown(String),
}

impl ClientMessage {
    /// Parse the envelope's `type` + `payload` into a typed message.
    ///
    /// Returns `Err` only when the `type` is recognized but the `payload`
    /// does not match its expected shape; an unrecognized `type` yields
    /// `Ok(ClientMessage::Unknown(..))` rather than an error, matching the
    /// wire's "log; no reply" behavior for unknown types.
    pub fn parse(envelope: &Envelope) -> Result<Self, serde_json::Error> {
        let payload = envelope.payload.clone().unwrap_or(Value::Null);
        Ok(match envelope.kind.as_str() {
            "hub_connected" => ClientMessage::HubConnected(serde_json::from_value(payload)?),
            "pair_confirm" => ClientMessage::PairConfirm(serde_json::from_value(payload)?),
            "ping" => ClientMessage::Ping,
            "get_info" => ClientMessage::GetInfo,
            "get_config" => ClientMessage::GetConfig,
            "init_upload" => ClientMessage::InitUpload(serde_json::from_value(payload)?),
            "upload_chunk" => ClientMessage::UploadChunk(serde_json::from_value(payload)?),
            "complete_upload" => ClientMessage::CompleteUpload(serde_json::from_value(payload)?),
            "cancel_upload" => ClientMessage::CancelUpload(serde_json::from_value(payload)?),
            "get_steam_users" => ClientMessage::GetSteamUsers,
            "list_shortcuts" => ClientMessage::ListShortcuts,
            "delete_game" => ClientMessage::DeleteGame(serde_json::from_value(payload)?),
            "restart_steam" => ClientMessage::RestartSteam,
            other => ClientMessage::Unknown(other.to_string()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HubConnectedPayload {
    #[serde(rename = "hubId", default)]
    pub hub_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PairConfirmPayload {
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct InitUploadConfig {
    #[serde(rename = "gameName")]
    pub game_name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FileEntry {
    pub path: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct InitUploadPayload {
    pub config: InitUploadConfig,
    #[serde(rename = "totalSize")]
    pub total_size: u64,
    pub files: Vec<FileEntry>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UploadChunkPayload {
    #[serde(rename = "uploadId")]
    pub upload_id: String,
    #[serde(rename = "filePath")]
    pub file_path: String,
    pub offset: u64,
    /// Base64-encoded chunk bytes (the text-frame upload variant).
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ShortcutConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub exe: Option<String>,
    #[serde(default)]
    pub artwork: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CompleteUploadPayload {
    #[serde(rename = "uploadId")]
    pub upload_id: String,
    #[serde(rename = "createShortcut", default)]
    pub create_shortcut: bool,
    #[serde(default)]
    pub shortcut: Option<ShortcutConfig>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CancelUploadPayload {
    #[serde(rename = "uploadId")]
    pub upload_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DeleteGamePayload {
    #[serde(rename = "appId")]
    pub app_id: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hub_connected_with_token() {
        let env = Envelope {
            id: "1".to_string(),
            kind: "hub_connected".to_string(),
            payload: Some(serde_json::json!({
                "hubId": "H", "name": "Hub", "version": "0.1", "token": "abc"
            })),
            error: None,
        };
        let msg = ClientMessage::parse(&env).expect("parse");
        assert_eq!(
            msg,
            ClientMessage::HubConnected(HubConnectedPayload {
                hub_id: Some("H".to_string()),
                name: Some("Hub".to_string()),
                version: Some("0.1".to_string()),
                token: Some("abc".to_string()),
            })
        );
    }

    #[test]
    fn unknown_type_does_not_error() {
        let env = Envelope {
            id: "1".to_string(),
            kind: "frobnicate".to_string(),
            payload: None,
            error: None,
        };
        let msg = ClientMessage::parse(&env).expect("parse");
        assert_eq!(msg, ClientMessage::Unknown("frobnicate".to_string()));
    }

    #[test]
    fn rejects_malformed_payload_for_known_type() {
        let env = Envelope {
            id: "1".to_string(),
            kind: "init_upload".to_string(),
            payload: Some(serde_json::json!({"nonsense": true})),
            error: None,
        };
        assert!(ClientMessage::parse(&env).is_err());
    }
}
