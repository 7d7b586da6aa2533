//! Ollama 客户端
//!
//! 调用本地 Ollama 的 /api/generate（非流式），取响应中的 response 字段。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::llm::{LlmClient, LlmError, LlmRequest};

pub const OLLAMA_BASE_URL: &str = "http://localhost:11434";

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    system: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Ollama 客户端：持有 reqwest Client、base_url 与模型名
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(base_url: Option<&str>, model: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url
                .unwrap_or(OLLAMA_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            model: model.to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn complete(&self, request: &LlmRequest) -> Result<String, LlmError> {
        let body = GenerateRequest {
            model: &self.model,
            system: &request.system_prompt,
            prompt: &request.user_message,
            stream: false,
            options: GenerateOptions {
                temperature: request.temperature,
                num_predict: request.token_budget,
            },
        };

        let resp = self
            .http
            .post(self.endpoint())
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::Response(e.to_string()))?;
        Ok(parsed.response)
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let client = OllamaClient::new(Some("http://127.0.0.1:11434/"), "llama3.1:8b");
        assert_eq!(client.endpoint(), "http://127.0.0.1:11434/api/generate");
    }

    #[test]
    fn test_request_body_shape() {
        let body = GenerateRequest {
            model: "llama3.1:8b",
            system: "sys",
            prompt: "hi",
            stream: false,
            options: GenerateOptions {
                temperature: 0.5,
                num_predict: 1024,
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["stream"], false);
        assert_eq!(json["options"]["num_predict"], 1024);
        assert_eq!(json["system"], "sys");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_http_error() {
        let client = OllamaClient::new(Some("http://127.0.0.1:1"), "m");
        let request = LlmRequest {
            system_prompt: String::new(),
            user_message: "hi".to_string(),
            temperature: 0.1,
            token_budget: 16,
        };
        let err = client.complete(&request).await.unwrap_err();
        assert!(matches!(err, LlmError::Http(_)));
    }
}
