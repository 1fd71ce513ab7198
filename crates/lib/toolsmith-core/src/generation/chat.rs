use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{CodeGenerator, GenerationError, SynthesisPrompt};

pub const DEFAULT_BASE_URL: &str = "https://api.deepseek.com/v1";
pub const DEFAULT_MODEL: &str = "deepseek-chat";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Settings for an `OpenAI`-compatible chat completions endpoint.
#[derive(Debug, Clone)]
pub struct ChatCompletionsConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for ChatCompletionsConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            api_key: None,
            timeout: Duration::from_secs(300),
        }
    }
}

impl ChatCompletionsConfig {
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Generator backed by a `/chat/completions` endpoint.
pub struct ChatCompletionsGenerator {
    client: reqwest::Client,
    config: ChatCompletionsConfig,
}

impl ChatCompletionsGenerator {
    /// Builds the HTTP client.
    ///
    /// # Errors
    /// Returns `GenerationError::MissingApiKey` when no key is configured, or
    /// `GenerationError::Http` if the client cannot be built.
    pub fn new(config: ChatCompletionsConfig) -> Result<Self, GenerationError> {
        if config.api_key.as_deref().is_none_or(|key| key.trim().is_empty()) {
            return Err(GenerationError::MissingApiKey);
        }
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    async fn complete(&self, prompt: &SynthesisPrompt) -> Result<String, GenerationError> {
        let user = prompt.render();
        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &user,
            }],
            temperature: self.config.temperature,
        };

        let mut request = self.client.post(self.config.endpoint()).json(&body);
        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }
        debug!(tool = %prompt.tool_name, model = %self.config.model, "requesting module source");
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|err| GenerationError::Malformed(err.to_string()))?;
        let content = reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| GenerationError::Malformed("response has no choices".to_string()))?;
        extract_code(&content).ok_or(GenerationError::EmptyResponse)
    }
}

impl CodeGenerator for ChatCompletionsGenerator {
    fn generate<'a>(
        &'a self,
        prompt: &'a SynthesisPrompt,
    ) -> BoxFuture<'a, Result<String, GenerationError>> {
        Box::pin(self.complete(prompt))
    }
}

/// Pulls module source out of a chat reply: the body of the first fenced
/// block if there is one, otherwise the whole trimmed reply.
#[must_use]
pub fn extract_code(reply: &str) -> Option<String> {
    let mut lines = reply.lines();
    let mut fenced: Option<Vec<&str>> = None;
    for line in lines.by_ref() {
        if line.trim_start().starts_with("```") {
            fenced = Some(Vec::new());
            break;
        }
    }

    let code = match fenced {
        Some(mut body) => {
            for line in lines {
                if line.trim_start().starts_with("```") {
                    break;
                }
                body.push(line);
            }
            body.join("\n")
        }
        None => reply.to_string(),
    };

    let code = code.trim();
    (!code.is_empty()).then(|| format!("{code}\n"))
}
