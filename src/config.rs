/// Coordinator configuration. Everything that varies across deployments
/// (endpoints, voice, token limit, prompt template) lives here instead of
/// being hardcoded at the call sites.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    session_url: String,
    negotiation_url: String,
    retrieval_url: String,
    voice: String,
    modalities: Vec<String>,
    output_audio_format: String,
    temperature: Option<f32>,
    max_output_tokens: u32,
    instruction_template: String,
    channel_capacity: usize,
}

pub struct CoordinatorConfigBuilder {
    config: CoordinatorConfig,
}

impl CoordinatorConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: CoordinatorConfig::new(),
        }
    }

    pub fn with_session_url(mut self, url: &str) -> Self {
        self.config.session_url = url.to_string();
        self
    }

    pub fn with_negotiation_url(mut self, url: &str) -> Self {
        self.config.negotiation_url = url.to_string();
        self
    }

    pub fn with_retrieval_url(mut self, url: &str) -> Self {
        self.config.retrieval_url = url.to_string();
        self
    }

    pub fn with_voice(mut self, voice: &str) -> Self {
        self.config.voice = voice.to_string();
        self
    }

    pub fn with_modalities(mut self, modalities: Vec<String>) -> Self {
        self.config.modalities = modalities;
        self
    }

    pub fn with_output_audio_format(mut self, format: &str) -> Self {
        self.config.output_audio_format = format.to_string();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = Some(temperature);
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.config.max_output_tokens = max_output_tokens;
        self
    }

    /// Template for generation instructions. `{context}` and `{query}` are
    /// replaced with the retrieved context and the user's utterance.
    pub fn with_instruction_template(mut self, template: &str) -> Self {
        self.config.instruction_template = template.to_string();
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    pub fn build(self) -> CoordinatorConfig {
        self.config
    }
}

impl Default for CoordinatorConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CoordinatorConfig {
    // Sets the default values.
    pub fn new() -> Self {
        Self {
            session_url: "http://localhost:8000/session".to_string(),
            negotiation_url:
                "https://api.openai.com/v1/realtime?model=gpt-4o-realtime-preview-2024-12-17"
                    .to_string(),
            retrieval_url: "http://localhost:8000".to_string(),
            voice: "ash".to_string(),
            modalities: vec!["audio".to_string(), "text".to_string()],
            output_audio_format: "pcm16".to_string(),
            temperature: None,
            max_output_tokens: 800,
            instruction_template: "Use the following reference context:\n{context}\nUser: {query}"
                .to_string(),
            channel_capacity: 64,
        }
    }

    pub fn builder() -> CoordinatorConfigBuilder {
        CoordinatorConfigBuilder::new()
    }

    pub fn session_url(&self) -> &str {
        &self.session_url
    }

    pub fn negotiation_url(&self) -> &str {
        &self.negotiation_url
    }

    pub fn retrieval_url(&self) -> &str {
        &self.retrieval_url
    }

    pub fn voice(&self) -> &str {
        &self.voice
    }

    pub fn modalities(&self) -> &[String] {
        &self.modalities
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

    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity
    }

    /// Renders the instruction template with the retrieved context and the
    /// user's utterance verbatim.
    pub fn render_instructions(&self, context: &str, query: &str) -> String {
        self.instruction_template
            .replace("{context}", context)
            .replace("{query}", query)
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self::new()
    }
}
