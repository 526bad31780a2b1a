use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::CompletionService;
use crate::config::Config;
use crate::error::{CompletionError, CompletionResult};
use crate::state::Message;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ApiMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Client for an OpenAI-compatible chat completions endpoint (OpenRouter by default)
#[derive(Clone)]
pub struct OpenRouterClient {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    context_window: usize,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    system_prompt: Option<String>,
}

impl OpenRouterClient {
    pub fn new(endpoint: &str, model: &str, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.to_string(),
            model: model.to_string(),
            api_key,
            context_window: crate::config::DEFAULT_CONTEXT_WINDOW,
            max_tokens: None,
            temperature: None,
            system_prompt: None,
        }
    }

    pub fn from_config(config: &Config, api_key: Option<String>) -> Self {
        let client = Self::new(&config.endpoint, &config.model, api_key)
            .with_context_window(config.context_window)
            .with_generation(config.max_tokens, config.temperature);

        match &config.system_prompt {
            Some(prompt) => client.with_system_prompt(prompt.as_str()),
            None => client,
        }
    }

    pub fn with_context_window(mut self, context_window: usize) -> Self {
        self.context_window = context_window;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_generation(mut self, max_tokens: Option<u32>, temperature: Option<f32>) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    async fn post(&self, messages: &[ApiMessage]) -> CompletionResult<String> {
        let api_key = self.api_key.as_deref().ok_or(CompletionError::MissingApiKey)?;

        let request = CompletionRequest {
            model: &self.model,
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            stream: false,
        };

        tracing::debug!(
            endpoint = %self.endpoint,
            model = %self.model,
            messages = messages.len(),
            "sending completion request"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        interpret_response(status, &body)
    }
}

#[async_trait]
impl CompletionService for OpenRouterClient {
    async fn send_message(&self, user_text: &str, history: &[Message]) -> CompletionResult<String> {
        let messages = build_messages(
            user_text,
            history,
            self.context_window,
            self.system_prompt.as_deref(),
        );

        match self.post(&messages).await {
            Ok(content) => {
                tracing::info!(chars = content.len(), "completion received");
                Ok(content)
            }
            Err(e) if e.is_network() => {
                tracing::warn!(endpoint = %self.endpoint, "completion endpoint unreachable");
                Err(e)
            }
            Err(e) => {
                tracing::error!(error = ?e, "completion request failed");
                Err(e)
            }
        }
    }
}

/// Builds the outgoing message list: optional system prompt, the last
/// `window` history entries in order, then the new user text.
pub fn build_messages(
    user_text: &str,
    history: &[Message],
    window: usize,
    system_prompt: Option<&str>,
) -> Vec<ApiMessage> {
    let start = history.len().saturating_sub(window);
    let mut messages = Vec::with_capacity(history.len() - start + 2);

    if let Some(prompt) = system_prompt {
        messages.push(ApiMessage {
            role: "system".to_string(),
            content: prompt.to_string(),
        });
    }

    messages.extend(history[start..].iter().map(|msg| ApiMessage {
        role: msg.role.as_str().to_string(),
        content: msg.content.clone(),
    }));

    messages.push(ApiMessage {
        role: "user".to_string(),
        content: user_text.to_string(),
    });

    messages
}

/// Maps a status and raw body to the reply text or a `CompletionError`.
pub fn interpret_response(status: StatusCode, body: &str) -> CompletionResult<String> {
    if !status.is_success() {
        return Err(CompletionError::RequestFailed {
            status: status.as_u16(),
            message: error_message(status, body),
        });
    }

    let parsed: CompletionResponse = serde_json::from_str(body).map_err(|e| {
        tracing::warn!(error = %e, "completion body is not valid JSON");
        CompletionError::MalformedResponse
    })?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .ok_or(CompletionError::MalformedResponse)
}

fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        match value.get("error") {
            Some(serde_json::Value::String(s)) => return s.clone(),
            Some(obj) => {
                if let Some(s) = obj.get("message").and_then(|m| m.as_str()) {
                    return s.to_string();
                }
            }
            None => {}
        }
    }

    let trimmed = body.trim();
    if !trimmed.is_empty() {
        return trimmed.to_string();
    }

    status.canonical_reason().unwrap_or("Unknown status").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Role;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    fn history(n: usize) -> Vec<Message> {
        (0..n)
            .map(|i| {
                let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
                Message::new(role, format!("m{}", i))
            })
            .collect()
    }

    /// Serves one canned HTTP response and hands back the raw request.
    async fn serve_once(status_line: &'static str, body: &'static str) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];

            // Read headers, then as much body as Content-Length says
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf).to_string();
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let length = text[..header_end]
                        .lines()
                        .find_map(|l| {
                            let lower = l.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                        })
                        .unwrap_or(0);
                    if buf.len() >= header_end + 4 + length {
                        break;
                    }
                }
            }

            let response = format!(
                "{}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.flush().await.unwrap();
            let _ = tx.send(String::from_utf8_lossy(&buf).to_string());
        });

        (format!("http://{}/api/v1/chat/completions", addr), rx)
    }

    fn request_body(raw: &str) -> serde_json::Value {
        let start = raw.find("\r\n\r\n").unwrap() + 4;
        serde_json::from_str(&raw[start..]).unwrap()
    }

    #[test]
    fn test_window_keeps_last_ten_in_order() {
        let hist = history(15);
        let messages = build_messages("new", &hist, 10, None);

        assert_eq!(messages.len(), 11);
        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(
            contents,
            vec!["m5", "m6", "m7", "m8", "m9", "m10", "m11", "m12", "m13", "m14", "new"]
        );
    }

    #[test]
    fn test_short_history_is_sent_whole() {
        let messages = build_messages("hello", &[], 10, None);
        assert_eq!(
            messages,
            vec![ApiMessage { role: "user".to_string(), content: "hello".to_string() }]
        );

        let messages = build_messages("x", &history(3), 10, None);
        assert_eq!(messages.len(), 4);
    }

    #[test]
    fn test_roles_follow_sender() {
        let hist = history(6);
        let messages = build_messages("q", &hist, 10, None);
        for (msg, api) in hist.iter().zip(&messages) {
            let expected = if msg.is_from_user() { "user" } else { "assistant" };
            assert_eq!(api.role, expected);
            assert_eq!(api.content, msg.content);
        }
        assert_eq!(messages.last().unwrap().role, "user");
    }

    #[test]
    fn test_system_prompt_goes_first() {
        let messages = build_messages("q", &history(12), 3, Some("Be terse."));
        assert_eq!(messages.len(), 5);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[0].content, "Be terse.");
        assert_eq!(messages[1].content, "m9");
    }

    #[test]
    fn test_zero_window_sends_only_new_text() {
        let messages = build_messages("only", &history(4), 0, None);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "only");
    }

    #[test]
    fn test_success_returns_content_verbatim() {
        let body = r#"{"choices":[{"message":{"content":"HELLO"}}]}"#;
        assert_eq!(interpret_response(StatusCode::OK, body).unwrap(), "HELLO");

        let body = r#"{"choices":[{"message":{"role":"assistant","content":"  line one\nline two  "}}]}"#;
        assert_eq!(
            interpret_response(StatusCode::OK, body).unwrap(),
            "  line one\nline two  "
        );
    }

    #[test]
    fn test_empty_choices_is_malformed() {
        let err = interpret_response(StatusCode::OK, r#"{"choices":[]}"#).unwrap_err();
        assert_eq!(err, CompletionError::MalformedResponse);
    }

    #[test]
    fn test_missing_fields_are_malformed() {
        for body in [
            "{}",
            r#"{"choices":[{}]}"#,
            r#"{"choices":[{"message":{}}]}"#,
            "not json at all",
        ] {
            assert_eq!(
                interpret_response(StatusCode::OK, body).unwrap_err(),
                CompletionError::MalformedResponse,
                "body: {}",
                body
            );
        }
    }

    #[test]
    fn test_error_status_uses_error_field() {
        let err = interpret_response(StatusCode::UNAUTHORIZED, r#"{"error":"bad key"}"#).unwrap_err();
        assert_eq!(
            err,
            CompletionError::RequestFailed { status: 401, message: "bad key".to_string() }
        );
        let text = err.to_string();
        assert!(text.contains("401") && text.contains("bad key"));
    }

    #[test]
    fn test_error_status_with_error_object() {
        let body = r#"{"error":{"message":"Rate limit exceeded","code":429}}"#;
        let err = interpret_response(StatusCode::TOO_MANY_REQUESTS, body).unwrap_err();
        assert_eq!(
            err,
            CompletionError::RequestFailed { status: 429, message: "Rate limit exceeded".to_string() }
        );
    }

    #[test]
    fn test_error_status_falls_back_to_raw_body_then_reason() {
        let err = interpret_response(StatusCode::BAD_GATEWAY, "upstream down").unwrap_err();
        assert!(err.to_string().contains("upstream down"));

        let err = interpret_response(StatusCode::INTERNAL_SERVER_ERROR, "").unwrap_err();
        assert_eq!(
            err,
            CompletionError::RequestFailed {
                status: 500,
                message: "Internal Server Error".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_request_shape_and_reply() {
        let (url, captured) =
            serve_once("HTTP/1.1 200 OK", r#"{"choices":[{"message":{"content":"HELLO"}}]}"#).await;
        let client = OpenRouterClient::new(&url, "test/model", Some("sk-test".to_string()))
            .with_generation(Some(64), Some(0.5));

        let reply = client.send_message("ping", &history(12)).await.unwrap();
        assert_eq!(reply, "HELLO");

        let raw = captured.await.unwrap();
        assert!(raw.starts_with("POST /api/v1/chat/completions"));
        let lower = raw.to_ascii_lowercase();
        assert!(lower.contains("authorization: bearer sk-test"));
        assert!(lower.contains("content-type: application/json"));

        let body = request_body(&raw);
        assert_eq!(body["model"], "test/model");
        assert_eq!(body["stream"], false);
        assert_eq!(body["max_tokens"], 64);
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 11);
        assert_eq!(messages[0]["content"], "m2");
        assert_eq!(messages[10]["content"], "ping");
        assert_eq!(messages[10]["role"], "user");
    }

    #[tokio::test]
    async fn test_optional_fields_are_omitted() {
        let (url, captured) =
            serve_once("HTTP/1.1 200 OK", r#"{"choices":[{"message":{"content":"ok"}}]}"#).await;
        let client = OpenRouterClient::new(&url, "m", Some("k".to_string()));
        client.send_message("hi", &[]).await.unwrap();

        let body = request_body(&captured.await.unwrap());
        assert!(body.get("max_tokens").is_none());
        assert!(body.get("temperature").is_none());
    }

    #[tokio::test]
    async fn test_http_error_is_request_failed() {
        let (url, _captured) =
            serve_once("HTTP/1.1 401 Unauthorized", r#"{"error":"bad key"}"#).await;
        let client = OpenRouterClient::new(&url, "m", Some("wrong".to_string()));

        let err = client.send_message("hi", &[]).await.unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert!(err.to_string().contains("bad key"));
    }

    #[tokio::test]
    async fn test_closed_port_is_network_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = OpenRouterClient::new(&format!("http://{}/v1", addr), "m", Some("k".to_string()));
        let err = client.send_message("hi", &[]).await.unwrap_err();
        assert_eq!(err, CompletionError::NetworkUnavailable);
        assert!(err.is_network());
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_sending() {
        // Port 9 is never contacted: the key check comes first
        let client = OpenRouterClient::new("http://127.0.0.1:9/v1", "m", None);
        assert!(!client.has_api_key());
        let err = client.send_message("hi", &[]).await.unwrap_err();
        assert_eq!(err, CompletionError::MissingApiKey);
    }

    #[test]
    fn test_from_config_carries_settings() {
        let config = Config {
            model: "vendor/model".to_string(),
            context_window: 2,
            system_prompt: Some("sys".to_string()),
            max_tokens: Some(64),
            temperature: Some(0.5),
            ..Config::default()
        };
        let client = OpenRouterClient::from_config(&config, None);
        assert_eq!(client.model(), "vendor/model");
        assert_eq!(client.context_window, 2);
        assert_eq!(client.system_prompt.as_deref(), Some("sys"));
        assert_eq!(client.max_tokens, Some(64));
        assert_eq!(client.temperature, Some(0.5));
        assert_eq!(client.endpoint, crate::config::DEFAULT_ENDPOINT);
    }
}
