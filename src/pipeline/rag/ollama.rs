use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::types::{CompletionBackend, GenerationOptions};
use super::RagError;
use crate::config::CompletionConfig;

/// HTTP completion client speaking the Ollama `/generate` protocol.
pub struct OllamaClient {
    base_url: String,
    model: String,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl OllamaClient {
    pub fn new(config: &CompletionConfig) -> Result<Self, RagError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            client,
            timeout_secs: config.timeout_secs,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

/// Request body for `{base}/generate`
#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: &'a GenerationOptions,
}

/// Response body from `{base}/generate`
#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[async_trait]
impl CompletionBackend for OllamaClient {
    async fn complete(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, RagError> {
        let url = format!("{}/generate", self.base_url);
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    RagError::BackendConnection(self.base_url.clone())
                } else if e.is_timeout() {
                    RagError::Timeout(self.timeout_secs)
                } else {
                    RagError::HttpClient(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::BackendStatus {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                RagError::Timeout(self.timeout_secs)
            } else {
                RagError::ResponseParsing(e.to_string())
            }
        })?;

        tracing::debug!(model = %self.model, chars = parsed.response.len(), "Completion received");
        Ok(parsed.response)
    }
}

/// Mock backend for testing: fixed reply or fixed failure, with a call counter.
pub struct MockCompletion {
    reply: Option<String>,
    calls: AtomicUsize,
    last_prompt: Mutex<Option<String>>,
}

impl MockCompletion {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    /// Every call fails as if the backend were unreachable.
    pub fn failing() -> Self {
        Self {
            reply: None,
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl CompletionBackend for MockCompletion {
    async fn complete(
        &self,
        prompt: &str,
        _options: &GenerationOptions,
    ) -> Result<String, RagError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock().unwrap_or_else(|e| e.into_inner()) = Some(prompt.to_string());
        match &self.reply {
            Some(reply) => Ok(reply.clone()),
            None => Err(RagError::BackendConnection("mock".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/api")
    }

    fn config_for(base_url: String, timeout_secs: u64) -> CompletionConfig {
        CompletionConfig {
            base_url,
            timeout_secs,
            ..CompletionConfig::default()
        }
    }

    #[tokio::test]
    async fn sends_protocol_body_and_parses_response() {
        let captured = std::sync::Arc::new(Mutex::new(None::<Value>));
        let sink = captured.clone();
        let app = Router::new().route(
            "/api/generate",
            post(move |Json(body): Json<Value>| {
                let sink = sink.clone();
                async move {
                    *sink.lock().unwrap() = Some(body);
                    Json(json!({ "response": "Penicillin allergy [1].", "done": true }))
                }
            }),
        );
        let base = serve(app).await;
        let client = OllamaClient::new(&config_for(base, 5)).unwrap();

        let options = GenerationOptions::new(0.2, 0.9, 256);
        let text = client.complete("PROMPT", &options).await.unwrap();
        assert_eq!(text, "Penicillin allergy [1].");

        let body = captured.lock().unwrap().clone().unwrap();
        assert_eq!(body["model"], "llama3.2");
        assert_eq!(body["prompt"], "PROMPT");
        assert_eq!(body["stream"], false);
        assert_eq!(body["options"]["max_tokens"], 256);
        assert!(body["options"]["temperature"].as_f64().unwrap() <= 0.3);
    }

    #[tokio::test]
    async fn non_success_status_is_reported() {
        let app = Router::new().route(
            "/api/generate",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "model not loaded") }),
        );
        let base = serve(app).await;
        let client = OllamaClient::new(&config_for(base, 5)).unwrap();

        let err = client.complete("p", &GenerationOptions::default()).await.unwrap_err();
        match err {
            RagError::BackendStatus { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "model not loaded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_body_is_a_parse_error() {
        let app = Router::new().route(
            "/api/generate",
            post(|| async { Json(json!({ "unexpected": 1 })) }),
        );
        let base = serve(app).await;
        let client = OllamaClient::new(&config_for(base, 5)).unwrap();

        let err = client.complete("p", &GenerationOptions::default()).await.unwrap_err();
        assert!(matches!(err, RagError::ResponseParsing(_)));
    }

    #[tokio::test]
    async fn slow_backend_times_out() {
        let app = Router::new().route(
            "/api/generate",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                Json(json!({ "response": "late" }))
            }),
        );
        let base = serve(app).await;
        let client = OllamaClient::new(&config_for(base, 1)).unwrap();

        let err = client.complete("p", &GenerationOptions::default()).await.unwrap_err();
        assert!(matches!(err, RagError::Timeout(1)), "got {err:?}");
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_connection_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client = OllamaClient::new(&config_for(format!("http://{addr}/api"), 2)).unwrap();

        let err = client.complete("p", &GenerationOptions::default()).await.unwrap_err();
        assert!(matches!(err, RagError::BackendConnection(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn mock_counts_calls_and_keeps_prompt() {
        let mock = MockCompletion::new("ok");
        assert_eq!(mock.complete("first", &GenerationOptions::default()).await.unwrap(), "ok");
        assert_eq!(mock.calls(), 1);
        assert_eq!(mock.last_prompt().as_deref(), Some("first"));

        let failing = MockCompletion::failing();
        assert!(failing.complete("x", &GenerationOptions::default()).await.is_err());
        assert_eq!(failing.calls(), 1);
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client =
            OllamaClient::new(&config_for("http://localhost:11434/api/".into(), 5)).unwrap();
        assert_eq!(client.base_url, "http://localhost:11434/api");
        assert_eq!(client.model(), "llama3.2");
    }
}
