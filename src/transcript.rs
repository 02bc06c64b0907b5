use std::collections::HashMap;

use crate::types::{Speaker, Turn};

/// Reconstructs turns from fragmented partial updates.
///
/// Owns at most one accumulating turn per speaker plus the ordered log of
/// finalized turns. All mutation happens on the coordinator's single event
/// loop, which is what makes the finalize tie-break well defined.
#[derive(Debug, Default)]
pub struct TranscriptAggregator {
    accumulating: HashMap<Speaker, Turn>,
    log: Vec<Turn>,
    next_sequence: u64,
}

impl TranscriptAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Explicit "turn started" signal. A turn already accumulating for this
    /// speaker is kept as-is.
    pub fn on_turn_started(&mut self, speaker: Speaker) {
        self.accumulating
            .entry(speaker)
            .or_insert_with(|| Turn::accumulating(speaker));
    }

    /// Appends a fragment, implicitly opening a turn when none is
    /// accumulating for this speaker.
    pub fn on_fragment(&mut self, speaker: Speaker, delta: &str) {
        self.accumulating
            .entry(speaker)
            .or_insert_with(|| Turn::accumulating(speaker))
            .append(delta);
    }

    /// Finalizes the speaker's turn. Tie-break rule: authoritative final
    /// text wins outright and the accumulated buffer is discarded, never
    /// concatenated; without final text the accumulated buffer becomes the
    /// turn's content. The buffer is cleared unconditionally so the next
    /// fragment starts clean. A finalization that resolves to empty text
    /// emits nothing.
    pub fn on_turn_finalized(&mut self, speaker: Speaker, final_text: Option<&str>) -> Option<Turn> {
        let accumulated = self.accumulating.remove(&speaker);
        let text = match final_text {
            Some(text) => text.to_string(),
            None => accumulated.map(|turn| turn.text().to_string()).unwrap_or_default(),
        };
        if text.trim().is_empty() {
            tracing::debug!(?speaker, "finalization with no content, skipping turn");
            return None;
        }
        Some(self.push_finalized(speaker, text))
    }

    /// Finalizes typed text directly, bypassing the fragment path. Any turn
    /// the speaker is still accumulating by voice is left untouched.
    pub fn finalize_direct(&mut self, speaker: Speaker, text: &str) -> Turn {
        self.push_finalized(speaker, text.to_string())
    }

    pub fn transcript(&self) -> &[Turn] {
        &self.log
    }

    /// Drops all turn state. Turns live exactly as long as their session.
    pub fn reset(&mut self) {
        self.accumulating.clear();
        self.log.clear();
        self.next_sequence = 0;
    }

    fn push_finalized(&mut self, speaker: Speaker, text: String) -> Turn {
        let turn = Turn::finalized(speaker, text, self.next_sequence);
        self.next_sequence += 1;
        self.log.push(turn.clone());
        turn
    }
}
