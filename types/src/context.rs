/// Opaque supporting text retrieved for one query and injected into a
/// generation request. Never cached across calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AugmentationContext {
    text: String,
}

impl AugmentationContext {
    pub fn new(text: String) -> Self {
        Self { text }
    }

    /// The degraded-path context used when retrieval fails.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}
