use crate::config::ReasoningConfig;
use crate::error::ReasoningError;
use crate::prompt::ChatMessage;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;

/// Anything that can answer a chat prompt.
pub trait ReasoningService {
    fn complete(&self, messages: &[ChatMessage]) -> Result<String, ReasoningError>;
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

/// Blocking client for `/v1/chat/completions`-style servers (vLLM, OpenAI, ...).
pub struct OpenAiCompatibleClient {
    agent: ureq::Agent,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiCompatibleClient {
    /// Build a client; asks the server for its first model when none is configured.
    pub fn connect(cfg: &ReasoningConfig) -> Result<Self, ReasoningError> {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build();
        let base_url = cfg.base_url.trim_end_matches('/').to_string();
        let api_key = std::env::var(&cfg.api_key_env).ok().filter(|k| !k.is_empty());

        let mut client = Self {
            agent,
            base_url,
            api_key,
            model: cfg.model.clone().unwrap_or_default(),
        };
        if client.model.is_empty() {
            client.model = client.first_model()?;
            tracing::info!(model = %client.model, "using first model offered by reasoning service");
        }
        Ok(client)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn authorized(&self, req: ureq::Request) -> ureq::Request {
        match &self.api_key {
            Some(key) => req.set("Authorization", &format!("Bearer {key}")),
            None => req,
        }
    }

    fn first_model(&self) -> Result<String, ReasoningError> {
        let url = format!("{}/models", self.base_url);
        let resp = self
            .authorized(self.agent.get(&url))
            .call()
            .map_err(|e| ReasoningError::Http {
                url: url.clone(),
                message: e.to_string(),
            })?;
        let models: ModelList = resp.into_json()?;
        models
            .data
            .into_iter()
            .next()
            .map(|m| m.id)
            .ok_or(ReasoningError::NoModels { url })
    }
}

impl ReasoningService for OpenAiCompatibleClient {
    fn complete(&self, messages: &[ChatMessage]) -> Result<String, ReasoningError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatCompletionRequest {
            model: &self.model,
            messages,
        };
        let resp = self
            .authorized(self.agent.post(&url))
            .send_json(&body)
            .map_err(|e| ReasoningError::Http {
                url: url.clone(),
                message: e.to_string(),
            })?;
        let parsed: ChatCompletionResponse = resp.into_json()?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or(ReasoningError::EmptyResponse)?;
        Ok(choice.message.content.unwrap_or_default())
    }
}

/// Re-ask until the answer has at least `min_chars` characters.
pub fn ask_until_answered(
    service: &dyn ReasoningService,
    messages: &[ChatMessage],
    min_chars: usize,
    max_attempts: usize,
) -> Result<String, ReasoningError> {
    let attempts = max_attempts.max(1);
    for attempt in 1..=attempts {
        let answer = service.complete(messages)?;
        if answer.chars().count() >= min_chars {
            return Ok(answer);
        }
        tracing::debug!(attempt, len = answer.len(), "answer too short, asking again");
    }
    Err(ReasoningError::Exhausted { attempts })
}

fn complexity_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<complexity>(.*?)(?:</complexity>|\z)").unwrap())
}

/// Text after the first `<complexity>` up to the next closing tag, or to the
/// end of the answer when it was cut off before closing. Kept verbatim.
pub fn extract_complexity(answer: &str) -> Option<String> {
    complexity_re()
        .captures(answer)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}
