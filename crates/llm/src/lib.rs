use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use hostagent_config::LlmConfig;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

// ── Chat messages ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Function name plus arguments as the model produced them: either a JSON
/// object or a string containing serialized JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default)]
    pub id: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    /// Result of a tool call, correlated by `call_id`.
    pub fn tool(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: Some(call_id.into()),
            name: Some(tool_name.into()),
            ..Self::plain(Role::Tool, content)
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

// ── Backend seam ─────────────────────────────────────────────────────────────

/// A chat model that can request tool calls.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// One non-streaming completion over the whole conversation.  `tools` is
    /// the function-schema array advertised to the model.
    async fn chat(&self, model: &str, messages: &[ChatMessage], tools: &Value) -> Result<ChatMessage>;
}

// ── Ollama ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    host: String,
}

impl OllamaClient {
    pub fn new(host: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            host: host.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(cfg: &LlmConfig) -> Result<Self> {
        Self::new(&cfg.ollama_host, Duration::from_secs(cfg.request_timeout_secs))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Names of locally installed models (`GET /api/tags`).
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let endpoint = format!("{}/api/tags", self.host);
        let response = self
            .client
            .get(&endpoint)
            .send()
            .await
            .with_context(|| format!("Ollama unavailable at {}", self.host))?;
        let status = response.status();
        let body: Value = response.json().await?;
        if !status.is_success() {
            bail!("Ollama error ({status}): {body}");
        }
        let mut models: Vec<String> = body
            .get("models")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| m.get("name").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        models.sort();
        Ok(models)
    }

    /// `true` when the server answers at all.
    pub async fn check_connection(&self) -> bool {
        match self.list_models().await {
            Ok(_) => true,
            Err(e) => {
                warn!(host = %self.host, error = %e, "Ollama connection check failed");
                false
            }
        }
    }
}

/// Extract the assistant message from an `/api/chat` response body, filling
/// in ids for tool calls that arrive without one.
pub fn parse_chat_response(body: Value) -> Result<ChatMessage> {
    if let Some(err) = body.get("error").and_then(Value::as_str) {
        bail!("Ollama error: {err}");
    }
    let message = body
        .get("message")
        .cloned()
        .with_context(|| format!("Ollama response missing message: {body}"))?;
    let mut message: ChatMessage =
        serde_json::from_value(message).context("malformed message in Ollama response")?;
    for call in &mut message.tool_calls {
        if call.id.is_empty() {
            call.id = uuid::Uuid::new_v4().to_string();
        }
    }
    Ok(message)
}

#[async_trait]
impl ModelBackend for OllamaClient {
    async fn chat(&self, model: &str, messages: &[ChatMessage], tools: &Value) -> Result<ChatMessage> {
        let endpoint = format!("{}/api/chat", self.host);
        let mut payload = json!({
            "model": model,
            "messages": messages,
            "stream": false,
        });
        if tools.as_array().is_some_and(|t| !t.is_empty()) {
            payload["tools"] = tools.clone();
        }

        debug!(model, messages = messages.len(), "sending chat request");
        let response = self
            .client
            .post(&endpoint)
            .json(&payload)
            .send()
            .await
            .with_context(|| {
                format!(
                    "Ollama unavailable at {}. Start Ollama and ensure model '{model}' is installed",
                    self.host
                )
            })?;

        let status = response.status();
        let body: Value = response.json().await.context("invalid JSON from Ollama")?;
        if !status.is_success() {
            bail!("Ollama error ({status}): {body}");
        }
        let message = parse_chat_response(body)?;
        debug!(tool_calls = message.tool_calls.len(), "chat response received");
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_message_serializes_correlation_fields() {
        let msg = ChatMessage::tool("call-1", "echo", "hi");
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["role"], "tool");
        assert_eq!(v["tool_call_id"], "call-1");
        assert_eq!(v["name"], "echo");
        assert!(v.get("tool_calls").is_none());
    }

    #[test]
    fn plain_message_omits_optional_fields() {
        let v = serde_json::to_value(ChatMessage::user("hello")).unwrap();
        assert_eq!(v, json!({"role": "user", "content": "hello"}));
    }

    #[test]
    fn parse_response_with_object_arguments_and_missing_id() {
        let body = json!({
            "model": "llama3.2:3b",
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [
                    {"function": {"name": "echo", "arguments": {"message": "hi"}}}
                ]
            },
            "done": true
        });
        let msg = parse_chat_response(body).unwrap();
        assert_eq!(msg.role, Role::Assistant);
        assert!(msg.has_tool_calls());
        let call = &msg.tool_calls[0];
        assert!(uuid::Uuid::parse_str(&call.id).is_ok());
        assert_eq!(call.function.name, "echo");
        assert_eq!(call.function.arguments["message"], "hi");
    }

    #[test]
    fn parse_response_keeps_existing_ids_and_string_arguments() {
        let body = json!({
            "message": {
                "role": "assistant",
                "tool_calls": [
                    {"id": "abc", "function": {"name": "get_time", "arguments": "{\"format\":\"%Y\"}"}}
                ]
            }
        });
        let msg = parse_chat_response(body).unwrap();
        assert_eq!(msg.content, "");
        assert_eq!(msg.tool_calls[0].id, "abc");
        assert!(msg.tool_calls[0].function.arguments.is_string());
    }

    #[test]
    fn parse_response_errors() {
        assert!(parse_chat_response(json!({"error": "model not found"})).is_err());
        assert!(parse_chat_response(json!({"done": true})).is_err());
    }

    #[test]
    fn client_trims_trailing_slash() {
        let c = OllamaClient::new("http://localhost:11434/", Duration::from_secs(5)).unwrap();
        assert_eq!(c.host(), "http://localhost:11434");
    }

    #[tokio::test]
    async fn unreachable_host_is_an_error() {
        let c = OllamaClient::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let err = c
            .chat("llama3.2:3b", &[ChatMessage::user("hi")], &json!([]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Ollama unavailable"));
        assert!(!c.check_connection().await);
    }
}
