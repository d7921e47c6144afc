use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use telroute_core::config::{LlmConfig, LlmProvider};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("llm provider is offline")]
    Offline,
    #[error("http error: {0}")]
    Http(String),
    #[error("request timed out after {0} seconds")]
    Timeout(u64),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("llm returned an empty completion")]
    EmptyCompletion,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub json_mode: bool,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            temperature: 0.2,
            json_mode: false,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn expecting_json(mut self) -> Self {
        self.json_mode = true;
        self
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;
}

/// Chat-completions client for OpenAI and any endpoint speaking the same protocol (Ollama included).
pub struct OpenAiCompatibleClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<SecretString>,
    timeout_secs: u64,
}

pub const OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const OLLAMA_BASE_URL: &str = "http://localhost:11434";

impl OpenAiCompatibleClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let base_url = match (config.provider, config.base_url.as_deref()) {
            (LlmProvider::Offline, _) => return Err(LlmError::Offline),
            (_, Some(base_url)) => base_url.to_string(),
            (LlmProvider::OpenAi, None) => OPENAI_BASE_URL.to_string(),
            (LlmProvider::Ollama, None) => OLLAMA_BASE_URL.to_string(),
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Http(format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            endpoint: chat_completions_url(&base_url),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let body = request_body(&self.model, request);
        let mut http = self.client.post(&self.endpoint).json(&body);
        if let Some(api_key) = &self.api_key {
            http = http.bearer_auth(api_key.expose_secret());
        }

        let response = http.send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout(self.timeout_secs)
            } else {
                LlmError::Http(format!("request failed: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(LlmError::Http(format!("HTTP {status} from {}", self.endpoint)));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("body is not json: {e}")))?;
        extract_completion(&payload)
    }
}

/// Builds the configured client, or `None` when the LLM is offline.
pub fn client_from_config(
    config: &LlmConfig,
) -> Result<Option<std::sync::Arc<dyn LlmClient>>, LlmError> {
    if config.provider == LlmProvider::Offline {
        return Ok(None);
    }
    let client = OpenAiCompatibleClient::from_config(config)?;
    Ok(Some(std::sync::Arc::new(client)))
}

fn chat_completions_url(base_url: &str) -> String {
    let trimmed = base_url.trim_end_matches('/');
    if trimmed.ends_with("/chat/completions") {
        trimmed.to_string()
    } else if trimmed.ends_with("/v1") {
        format!("{trimmed}/chat/completions")
    } else {
        format!("{trimmed}/v1/chat/completions")
    }
}

fn request_body(model: &str, request: &CompletionRequest) -> Value {
    let mut body = json!({
        "model": model,
        "messages": request.messages,
        "temperature": request.temperature,
    });
    if request.json_mode {
        body["response_format"] = json!({ "type": "json_object" });
    }
    body
}

fn extract_completion(payload: &Value) -> Result<String, LlmError> {
    let content = payload
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
        .ok_or_else(|| {
            LlmError::InvalidResponse("missing choices[0].message.content".to_string())
        })?;

    let content = content.trim();
    if content.is_empty() {
        return Err(LlmError::EmptyCompletion);
    }
    Ok(content.to_string())
}

/// Pulls the first JSON object out of a completion, tolerating markdown fences.
pub fn extract_json_object(completion: &str) -> Option<Value> {
    let start = completion.find('{')?;
    let end = completion.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&completion[start..=end]).ok().filter(Value::is_object)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        chat_completions_url, client_from_config, extract_completion, extract_json_object,
        request_body, CompletionRequest, LlmError, OpenAiCompatibleClient,
    };
    use telroute_core::config::{AppConfig, LlmProvider};

    #[test]
    fn endpoint_is_derived_from_base_url() {
        assert_eq!(
            chat_completions_url("https://api.openai.com"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            chat_completions_url("http://localhost:11434/v1/"),
            "http://localhost:11434/v1/chat/completions"
        );
        assert_eq!(
            chat_completions_url("http://gateway/v1/chat/completions"),
            "http://gateway/v1/chat/completions"
        );
    }

    #[test]
    fn request_body_carries_messages_and_json_mode() {
        let request = CompletionRequest::new("be brief", "why is my bill high")
            .with_temperature(0.4)
            .expecting_json();
        let body = request_body("gpt-4o-mini", &request);

        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "why is my bill high");
        assert_eq!(body["response_format"]["type"], "json_object");
    }

    #[test]
    fn completion_content_is_extracted_and_trimmed() {
        let payload = json!({"choices": [{"message": {"role": "assistant", "content": "  hi  "}}]});
        assert_eq!(extract_completion(&payload), Ok("hi".to_string()));

        let empty = json!({"choices": [{"message": {"content": "   "}}]});
        assert_eq!(extract_completion(&empty), Err(LlmError::EmptyCompletion));

        let missing = json!({"error": "quota"});
        assert!(matches!(extract_completion(&missing), Err(LlmError::InvalidResponse(_))));
    }

    #[test]
    fn json_object_survives_markdown_fences() {
        let completion = "```json\n{\"intent\": \"billing\", \"confidence\": 0.8}\n```";
        let value = extract_json_object(completion).expect("object");
        assert_eq!(value["intent"], "billing");
        assert!(extract_json_object("no json here").is_none());
    }

    #[test]
    fn offline_config_builds_no_client() {
        let config = AppConfig::default();
        assert!(client_from_config(&config.llm).expect("offline is valid").is_none());
        assert!(matches!(
            OpenAiCompatibleClient::from_config(&config.llm),
            Err(LlmError::Offline)
        ));
    }

    #[test]
    fn ollama_defaults_to_local_endpoint() {
        let mut config = AppConfig::default().llm;
        config.provider = LlmProvider::Ollama;
        let client = OpenAiCompatibleClient::from_config(&config).expect("client");
        assert_eq!(client.endpoint(), "http://localhost:11434/v1/chat/completions");
    }
}
