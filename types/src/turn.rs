/// The party a turn belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnState {
    Accumulating,
    Finalized,
}

/// One utterance by one speaker. The text is mutable while the turn is
/// accumulating and frozen once it finalizes; `sequence` records the order
/// of finalization within the session.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Turn {
    speaker: Speaker,
    state: TurnState,
    text: String,
    sequence: u64,
}

impl Turn {
    /// Opens a new accumulating turn with no content yet. The sequence is
    /// assigned when the turn finalizes.
    pub fn accumulating(speaker: Speaker) -> Self {
        Self {
            speaker,
            state: TurnState::Accumulating,
            text: String::new(),
            sequence: 0,
        }
    }

    /// Appends a fragment to an accumulating turn. Finalized turns are
    /// immutable; the delta is silently dropped.
    pub fn append(&mut self, delta: &str) {
        if self.state == TurnState::Finalized {
            return;
        }
        self.text.push_str(delta);
    }

    pub fn finalized(speaker: Speaker, text: String, sequence: u64) -> Self {
        Self {
            speaker,
            state: TurnState::Finalized,
            text,
            sequence,
        }
    }

    pub fn speaker(&self) -> Speaker {
        self.speaker
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}
