use serde::Deserialize;
use serde::Serialize;

/// The text-frame envelope. `id` is an opaque correlator chosen by the
/// sender; the agent echoes it back on every response so the Hub can match
/// requests to replies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

impl Envelope {
    pub fn response(id: impl Into<String>, kind: impl Into<String>, payload: impl Serialize) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            payload: serde_json::to_value(payload).ok(),
            error: None,
        }
    }

    pub fn empty_response(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            payload: None,
            error: None,
        }
    }

    pub fn error(id: impl Into<String>, code: i64, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: "error".to_string(),
            payload: None,
            error: Some(ErrorObject {
                code,
                message: message.into(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let env = Envelope::response("1", "pong", serde_json::json!(null));
        let json = serde_json::to_string(&env).expect("serialize");
        let back: Envelope = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(env, back);
    }

    #[test]
    fn error_envelope_omits_payload() {
        let env = Envelope::error("5", 401, "Not authorized");
        let json = serde_json::to_value(&env).expect("serialize");
        assert!(json.get("payload").is_none());
        assert_eq!(json["error"]["code"], 401);
    }
}
