use crate::turn::Speaker;

/// `session.created` event
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SessionCreatedEvent {
    /// Identifier the remote peer assigned to the session
    id: String,
}

impl SessionCreatedEvent {
    pub fn new(id: &str) -> Self {
        Self { id: id.to_string() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

/// `turn.started` event
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TurnStartedEvent {
    speaker: Speaker,
}

impl TurnStartedEvent {
    pub fn new(speaker: Speaker) -> Self {
        Self { speaker }
    }

    pub fn speaker(&self) -> Speaker {
        self.speaker
    }
}

/// `turn.fragment` event
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TurnFragmentEvent {
    speaker: Speaker,

    /// The incremental transcript piece to append
    delta: String,
}

impl TurnFragmentEvent {
    pub fn new(speaker: Speaker, delta: &str) -> Self {
        Self {
            speaker,
            delta: delta.to_string(),
        }
    }

    pub fn speaker(&self) -> Speaker {
        self.speaker
    }

    pub fn delta(&self) -> &str {
        &self.delta
    }
}

/// `turn.finalized` event
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TurnFinalizedEvent {
    speaker: Speaker,

    /// Authoritative final transcript. When present it replaces whatever was
    /// accumulated from fragments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

impl TurnFinalizedEvent {
    pub fn new(speaker: Speaker) -> Self {
        Self {
            speaker,
            text: None,
        }
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    pub fn speaker(&self) -> Speaker {
        self.speaker
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }
}

/// `speech.started` event
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SpeechStartedEvent {}

/// `speech.stopped` event
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SpeechStoppedEvent {}

/// `response.started` event
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ResponseStartedEvent {}

/// `response.completed` event
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ResponseCompletedEvent {}
