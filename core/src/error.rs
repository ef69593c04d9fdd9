use capydeploy_protocol::error_codes;

/// Errors raised by the agent's internal components. Handlers in the
/// connection dispatch table translate the variants that can occur on the
/// wire into the fixed `{code, message}` shape from the protocol; everything
/// else is logged and the connection survives.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("path escapes install root")]
    PathEscapesInstallRoot,

    #[error("upload not found")]
    UploadNotFound,

    #[error("hub_id required")]
    HubIdRequired,

    #[error("not authorized")]
    NotAuthorized,
}

impl AgentError {
    /// The fixed wire-visible `{code, message}` pair for this error. Only
    /// ever called on variants where [`AgentError::is_wire_mappable`]
    /// returns `true`.
    pub fn to_wire(&self, id: impl Into<String>) -> capydeploy_protocol::Envelope {
        let (code, message) = match self {
            AgentError::NotAuthorized => (error_codes::NOT_AUTHORIZED, "Not authorized"),
            AgentError::HubIdRequired => (error_codes::HUB_ID_REQUIRED, "hub_id required"),
            AgentError::UploadNotFound => (error_codes::UPLOAD_NOT_FOUND, "Upload not found"),
            AgentError::PathEscapesInstallRoot | AgentError::Io(_) | AgentError::Json(_) => {
                unreachable!("not wire-mappable, see is_wire_mappable")
            }
        };
        capydeploy_protocol::Envelope::error(id, code, message)
    }

    /// The three wire-taxonomy errors named in the protocol (401/401/404)
    /// are answered with an error envelope and the connection survives.
    /// Everything else is an "application-level failure": logged and not
    /// reported back, per the protocol's own rule that the Hub resends a
    /// well-formed message if it expected a reply and did not get one.
    pub fn is_wire_mappable(&self) -> bool {
        matches!(self, AgentError::NotAuthorized | AgentError::HubIdRequired | AgentError::UploadNotFound)
    }

    /// `Io`/`Json` escape the per-message scope and end the connection;
    /// `PathEscapesInstallRoot` is caught by the handler and logged instead.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AgentError::Io(_) | AgentError::Json(_))
    }
}
