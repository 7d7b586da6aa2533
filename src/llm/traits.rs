//! LLM 客户端抽象
//!
//! 所有后端（Ollama / OpenAI 兼容 / Mock）实现 LlmClient：一次请求（system + user + 温度 + token 预算）得到一段文本。

use async_trait::async_trait;
use thiserror::Error;

/// 单次补全请求
#[derive(Debug, Clone, PartialEq)]
pub struct LlmRequest {
    pub system_prompt: String,
    pub user_message: String,
    pub temperature: f32,
    pub token_budget: u32,
}

/// LLM 调用错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("http error: {0}")]
    Http(String),

    #[error("status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("response error: {0}")]
    Response(String),
}

/// LLM 客户端 trait：非流式补全
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &LlmRequest) -> Result<String, LlmError>;

    /// 后端名称（用于日志）
    fn name(&self) -> &str;
}
