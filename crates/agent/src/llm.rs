use std::time::Duration;

use async_trait::async_trait;
use kopi_core::config::LlmConfig;
use kopi_core::errors::AgentError;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

const INITIAL_BACKOFF: Duration = Duration::from_millis(250);
const MAX_ERROR_BODY_CHARS: usize = 300;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
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

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("could not reach reasoning engine: {0}")]
    Transport(String),
    #[error("reasoning engine timed out after {0}s")]
    Timeout(u64),
    #[error("reasoning engine returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("reasoning engine returned an unreadable response: {0}")]
    Decode(String),
    #[error("reasoning engine client is misconfigured: {0}")]
    Config(String),
}

impl LlmError {
    /// Connect failures, timeouts, throttling and server-side errors are worth
    /// another attempt. Other 4xx responses are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Decode(_) | Self::Config(_) => false,
        }
    }
}

impl From<LlmError> for AgentError {
    fn from(value: LlmError) -> Self {
        AgentError::upstream(value.to_string())
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, LlmError>;
}

/// Client for any OpenAI-compatible `/chat/completions` endpoint (OpenAI,
/// Groq, or a local Ollama `/v1`).
pub struct HttpLlmClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<SecretString>,
    model: String,
    temperature: f32,
    timeout: Duration,
    max_retries: u32,
    initial_backoff: Duration,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    temperature: f32,
    stream: bool,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let timeout = Duration::from_secs(config.timeout_secs.max(1));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| LlmError::Config(error.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.endpoint_base()),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            timeout,
            max_retries: config.max_retries,
            initial_backoff: INITIAL_BACKOFF,
        })
    }

    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send_once(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let body = CompletionRequest {
            model: &self.model,
            temperature: self.temperature,
            stream: false,
            messages,
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request.send().await.map_err(|error| self.classify(error))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: text.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        let parsed: CompletionResponse =
            response.json().await.map_err(|error| LlmError::Decode(error.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .ok_or_else(|| LlmError::Decode("response contained no choices".to_string()))
    }

    fn classify(&self, error: reqwest::Error) -> LlmError {
        if error.is_timeout() {
            LlmError::Timeout(self.timeout.as_secs())
        } else {
            LlmError::Transport(error.to_string())
        }
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let mut attempt = 0u32;
        loop {
            match self.send_once(messages).await {
                Ok(content) => return Ok(content),
                Err(error) if error.is_retryable() && attempt < self.max_retries => {
                    let delay = self.initial_backoff * 2u32.saturating_pow(attempt);
                    warn!(
                        event_name = "agent.llm.retry",
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying reasoning engine call"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use kopi_core::config::{AppConfig, LlmConfig};
    use kopi_core::errors::AgentError;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    use super::{ChatMessage, HttpLlmClient, LlmClient, LlmError};

    fn config_for(base_url: &str, max_retries: u32) -> LlmConfig {
        let mut config = AppConfig::default().llm;
        config.base_url = Some(base_url.to_string());
        config.max_retries = max_retries;
        config.timeout_secs = 5;
        config
    }

    fn completion(content: &str) -> String {
        serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }]
        })
        .to_string()
    }

    async fn read_request(socket: &mut TcpStream) {
        let mut buffer = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let read = socket.read(&mut chunk).await.unwrap_or(0);
            if read == 0 {
                return;
            }
            buffer.extend_from_slice(&chunk[..read]);
            let Some(header_end) = buffer.windows(4).position(|window| window == b"\r\n\r\n")
            else {
                continue;
            };
            let headers = String::from_utf8_lossy(&buffer[..header_end]).to_ascii_lowercase();
            let content_length = headers
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buffer.len() >= header_end + 4 + content_length {
                return;
            }
        }
    }

    /// Serves the scripted `(status, body)` responses in order, one per connection.
    async fn scripted_server(responses: Vec<(u16, String)>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let address = listener.local_addr().expect("local addr");
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        tokio::spawn(async move {
            for (status, body) in responses {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                read_request(&mut socket).await;
                let response = format!(
                    "HTTP/1.1 {status} Scripted\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{address}"), hits)
    }

    #[test]
    fn retryable_classification() {
        assert!(LlmError::Transport("refused".into()).is_retryable());
        assert!(LlmError::Timeout(30).is_retryable());
        assert!(LlmError::Status { status: 429, body: String::new() }.is_retryable());
        assert!(LlmError::Status { status: 503, body: String::new() }.is_retryable());
        assert!(!LlmError::Status { status: 401, body: String::new() }.is_retryable());
        assert!(!LlmError::Decode("bad json".into()).is_retryable());
    }

    #[test]
    fn llm_errors_surface_as_upstream_unavailable() {
        let error: AgentError = LlmError::Timeout(30).into();
        assert!(matches!(error, AgentError::UpstreamUnavailable(_)));
    }

    #[test]
    fn endpoint_is_built_from_provider_base() {
        let client = HttpLlmClient::from_config(&config_for("http://localhost:11434/v1/", 0))
            .expect("client");
        assert_eq!(client.endpoint(), "http://localhost:11434/v1/chat/completions");
    }

    #[tokio::test]
    async fn successful_completion_returns_message_content() {
        let (base, hits) = scripted_server(vec![(200, completion("Hello from ZUS"))]).await;
        let client = HttpLlmClient::from_config(&config_for(&base, 2)).expect("client");

        let reply = client.chat(&[ChatMessage::user("hi")]).await.expect("chat");

        assert_eq!(reply, "Hello from ZUS");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn server_errors_are_retried_with_backoff() {
        let (base, hits) = scripted_server(vec![
            (503, "{\"error\":\"busy\"}".to_string()),
            (429, "{\"error\":\"slow down\"}".to_string()),
            (200, completion("recovered")),
        ])
        .await;
        let client = HttpLlmClient::from_config(&config_for(&base, 2))
            .expect("client")
            .with_initial_backoff(Duration::from_millis(5));

        let reply = client.chat(&[ChatMessage::user("hi")]).await.expect("chat");

        assert_eq!(reply, "recovered");
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn client_errors_fail_without_retry() {
        let (base, hits) = scripted_server(vec![
            (401, "{\"error\":\"bad key\"}".to_string()),
            (200, completion("never reached")),
        ])
        .await;
        let client = HttpLlmClient::from_config(&config_for(&base, 3))
            .expect("client")
            .with_initial_backoff(Duration::from_millis(5));

        let error = client.chat(&[ChatMessage::user("hi")]).await.expect_err("401 must fail");

        assert!(matches!(error, LlmError::Status { status: 401, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let (base, hits) = scripted_server(vec![
            (500, "{}".to_string()),
            (500, "{}".to_string()),
            (500, "{}".to_string()),
        ])
        .await;
        let client = HttpLlmClient::from_config(&config_for(&base, 1))
            .expect("client")
            .with_initial_backoff(Duration::from_millis(5));

        let error = client.chat(&[ChatMessage::user("hi")]).await.expect_err("must give up");

        assert!(matches!(error, LlmError::Status { status: 500, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn empty_choice_list_is_a_decode_error() {
        let (base, _hits) = scripted_server(vec![(200, "{\"choices\":[]}".to_string())]).await;
        let client = HttpLlmClient::from_config(&config_for(&base, 0)).expect("client");

        let error = client.chat(&[ChatMessage::user("hi")]).await.expect_err("no choices");

        assert!(matches!(error, LlmError::Decode(_)));
    }
}
