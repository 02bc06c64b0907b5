/// Session error taxonomy. Only the credential, negotiation, and capture
/// failures terminate a connection attempt; everything else leaves the
/// session connected.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("credential fetch failed: {0}")]
    Credential(String),

    #[error("offer/answer negotiation failed: {0}")]
    Negotiation(String),

    #[error("audio capture device unavailable: {0}")]
    CaptureDevice(String),

    #[error("context retrieval failed: {0}")]
    Retrieval(String),

    /// An outbound send was attempted before the control channel opened.
    /// The request is dropped and reported, never queued.
    #[error("control channel not ready")]
    ChannelNotReady,

    /// The session that initiated this operation is no longer the live one.
    #[error("session is no longer live")]
    StaleSession,

    #[error("a session is already active")]
    AlreadyConnected,

    #[error("operation cancelled")]
    Cancelled,

    #[error("failed to encode outbound event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("transcript persistence failed: {0}")]
    Persistence(String),

    #[error("transport failure: {0}")]
    Transport(String),
}

impl SessionError {
    /// Whether this error terminates the session attempt.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SessionError::Credential(_)
                | SessionError::Negotiation(_)
                | SessionError::CaptureDevice(_)
        )
    }
}
