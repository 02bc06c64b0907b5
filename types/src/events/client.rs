/// `message` event: user-typed text relayed to the remote peer.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MessageEvent {
    text: String,
}

impl MessageEvent {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// `response.create` event: asks the remote peer to generate a response
/// for the current turn.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ResponseCreateEvent {
    response: GenerationParams,
}

impl ResponseCreateEvent {
    pub fn new(response: GenerationParams) -> Self {
        Self { response }
    }

    pub fn response(&self) -> &GenerationParams {
        &self.response
    }
}

/// Generation parameters for a single request. Built fresh per user turn
/// from configuration and never mutated after send.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GenerationParams {
    /// The modalities the peer may respond with, e.g. ["audio", "text"]
    modalities: Vec<String>,

    /// The full prompt: retrieved context plus the user's utterance verbatim
    instructions: String,

    /// Voice used for the audio modality, e.g. "ash"
    voice: String,

    /// Output audio encoding, e.g. "pcm16"
    output_audio_format: String,

    /// Sampling temperature; omitted from the wire when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,

    /// Token budget for the generated response
    max_output_tokens: u32,
}

impl GenerationParams {
    pub fn new(instructions: &str) -> Self {
        Self {
            modalities: vec!["audio".to_string(), "text".to_string()],
            instructions: instructions.to_string(),
            voice: "ash".to_string(),
            output_audio_format: "pcm16".to_string(),
            temperature: None,
            max_output_tokens: 800,
        }
    }

    pub fn with_modalities(mut self, modalities: Vec<String>) -> Self {
        self.modalities = modalities;
        self
    }

    pub fn with_voice(mut self, voice: &str) -> Self {
        self.voice = voice.to_string();
        self
    }

    pub fn with_output_audio_format(mut self, format: &str) -> Self {
        self.output_audio_format = format.to_string();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    pub fn modalities(&self) -> &[String] {
        &self.modalities
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn voice(&self) -> &str {
        &self.voice
    }

    pub fn output_audio_format(&self) -> &str {
        &self.output_audio_format
    }

    pub fn temperature(&self) -> Option<f32> {
        self.temperature
    }

    pub fn max_output_tokens(&self) -> u32 {
        self.max_output_tokens
    }
}
