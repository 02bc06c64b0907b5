pub mod client;
pub mod server;

use client::*;
use server::*;

/// Outbound events sent over the control channel.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "message")]
    Message(MessageEvent),
    #[serde(rename = "response.create")]
    ResponseCreate(ResponseCreateEvent),
}

impl ClientEvent {
    pub fn message(text: &str) -> Self {
        Self::Message(MessageEvent::new(text))
    }
}

/// Inbound structured events. The wire kinds carry a `type` tag; `Unknown`
/// and `Malformed` are produced by the decoder and never appear on the wire.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum StructuredEvent {
    #[serde(rename = "session.created")]
    SessionCreated(SessionCreatedEvent),
    #[serde(rename = "turn.started")]
    TurnStarted(TurnStartedEvent),
    #[serde(rename = "turn.fragment")]
    TurnFragment(TurnFragmentEvent),
    #[serde(rename = "turn.finalized")]
    TurnFinalized(TurnFinalizedEvent),
    #[serde(rename = "speech.started")]
    SpeechStarted(SpeechStartedEvent),
    #[serde(rename = "speech.stopped")]
    SpeechStopped(SpeechStoppedEvent),
    #[serde(rename = "response.started")]
    ResponseStarted(ResponseStartedEvent),
    #[serde(rename = "response.completed")]
    ResponseCompleted(ResponseCompletedEvent),
    /// A well-formed event whose kind is not part of the recognized set.
    #[serde(skip)]
    Unknown {
        kind: String,
        payload: serde_json::Value,
    },
    /// A payload that could not be decoded. Surfaced, never fatal.
    #[serde(skip)]
    Malformed { raw: String, error: String },
}

impl StructuredEvent {
    /// The `type` tags the decoder treats as part of the protocol.
    pub const KNOWN_KINDS: &'static [&'static str] = &[
        "session.created",
        "turn.started",
        "turn.fragment",
        "turn.finalized",
        "speech.started",
        "speech.stopped",
        "response.started",
        "response.completed",
    ];
}
