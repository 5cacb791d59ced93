//! Minimal LLM chat-completions client (OpenAI-compatible endpoint) used
//! for page condensing and summaries.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use cerberus_golden::{HttpRequest, HttpTransport};
use cerberus_ratelimit::RateLimiterRegistry;

use crate::error::{ClientError, Result};

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    content: Option<String>,
}

pub struct LlmClient {
    api_key: String,
    base_url: String,
    chat_path: String,
    queue: String,
    limiter: Arc<RateLimiterRegistry>,
    transport: Arc<dyn HttpTransport>,
}

impl LlmClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        queue: impl Into<String>,
        limiter: Arc<RateLimiterRegistry>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            chat_path: "/v1/chat/completions".to_string(),
            queue: queue.into(),
            limiter,
            transport,
        }
    }

    /// Generate a completion; returns the assistant message content.
    pub async fn generate(&self, model: &str, messages: &[ChatMessage]) -> Result<String> {
        self.limiter.apply_limit(&self.queue).await;

        let body = serde_json::json!({
            "model": model,
            "messages": messages
                .iter()
                .map(|m| serde_json::json!({"role": m.role, "content": m.content}))
                .collect::<Vec<_>>(),
        });
        let url = format!("{}{}", self.base_url, self.chat_path);

        debug!(model, "sending chat completion request");
        let response = self
            .transport
            .execute(
                &HttpRequest::post(url)
                    .header("Authorization", format!("Bearer {}", self.api_key))
                    .timeout(120)
                    .json_body(&body)?,
            )
            .await?;

        if !response.is_success() {
            return Err(ClientError::Api {
                status: response.status,
                message: response.body,
            });
        }

        let parsed: ApiResponse =
            serde_json::from_str(&response.body).map_err(|e| ClientError::Parse(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.is_empty())
            .ok_or(ClientError::NotFound)
    }

    /// Generate with the primary model, falling back to a second model on
    /// failure.
    pub async fn generate_with_fallback(
        &self,
        model: &str,
        fallback_model: &str,
        messages: &[ChatMessage],
    ) -> Result<String> {
        match self.generate(model, messages).await {
            Ok(content) => Ok(content),
            Err(e) => {
                warn!(model, error = %e, "primary model failed, trying fallback");
                self.generate(fallback_model, messages).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use cerberus_golden::HttpResponse;

    use super::*;

    struct ScriptedTransport {
        responses: Mutex<Vec<HttpResponse>>,
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn execute(
            &self,
            _request: &HttpRequest,
        ) -> std::result::Result<HttpResponse, cerberus_golden::GoldenError> {
            Ok(self.responses.lock().unwrap().remove(0))
        }
    }

    fn completion(content: &str) -> HttpResponse {
        HttpResponse {
            status: 200,
            headers: HashMap::new(),
            body: serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": content}}]
            })
            .to_string(),
        }
    }

    fn client(responses: Vec<HttpResponse>) -> LlmClient {
        LlmClient::new(
            "sk-test",
            "https://llm.example",
            "llm",
            Arc::new(RateLimiterRegistry::new()),
            Arc::new(ScriptedTransport {
                responses: Mutex::new(responses),
            }),
        )
    }

    #[tokio::test]
    async fn returns_first_choice_content() {
        let client = client(vec![completion("condensed text")]);
        let result = client
            .generate("gpt-4o-mini", &[ChatMessage::user("long text")])
            .await
            .unwrap();
        assert_eq!(result, "condensed text");
    }

    #[tokio::test]
    async fn fallback_model_is_tried_after_api_error() {
        let error = HttpResponse {
            status: 500,
            headers: HashMap::new(),
            body: "overloaded".to_string(),
        };
        let client = client(vec![error, completion("from fallback")]);
        let result = client
            .generate_with_fallback("primary", "fallback", &[ChatMessage::user("hi")])
            .await
            .unwrap();
        assert_eq!(result, "from fallback");
    }

    #[tokio::test]
    async fn empty_completion_is_an_error() {
        let client = client(vec![completion("")]);
        assert!(matches!(
            client.generate("m", &[ChatMessage::user("hi")]).await,
            Err(ClientError::NotFound)
        ));
    }
}
