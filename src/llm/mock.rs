//! Mock LLM 客户端（无需 API）
//!
//! - MockLlmClient：规划一个 done 步骤回显用户请求，便于离线跑通整条流程
//! - ScriptedLlmClient：按顺序返回预设回复（测试用），并记录收到的请求

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError, LlmRequest};

/// Mock 客户端：回显用户请求
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, request: &LlmRequest) -> Result<String, LlmError> {
        let last_line = request
            .user_message
            .lines()
            .find_map(|l| {
                l.strip_prefix("User request: ")
                    .or_else(|| l.strip_prefix("Original request: "))
            })
            .unwrap_or("(no input)");
        let reply = serde_json::json!([
            {"action": "done", "params": {"message": format!("Mock planner received: {}", last_line)}}
        ]);
        Ok(reply.to_string())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// 脚本化客户端：每次调用弹出一条预设结果；脚本耗尽时返回 Http 错误
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedLlmClient {
    pub fn new<I>(replies: I) -> Self
    where
        I: IntoIterator<Item = Result<String, LlmError>>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// 全部成功回复
    pub fn replying<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(replies.into_iter().map(|r| Ok(r.into())))
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, request: &LlmRequest) -> Result<String, LlmError> {
        if let Ok(mut seen) = self.requests.lock() {
            seen.push(request.clone());
        }
        self.replies
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .unwrap_or_else(|| Err(LlmError::Http("planner unreachable".to_string())))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(user: &str) -> LlmRequest {
        LlmRequest {
            system_prompt: String::new(),
            user_message: user.to_string(),
            temperature: 0.1,
            token_budget: 64,
        }
    }

    #[tokio::test]
    async fn test_mock_echoes_request_as_done() {
        let out = MockLlmClient
            .complete(&request("Currently focused app: Finder\n\nUser request: open Notes"))
            .await
            .unwrap();
        assert!(out.contains("\"done\""));
        assert!(out.contains("open Notes"));
    }

    #[tokio::test]
    async fn test_scripted_pops_in_order_then_fails() {
        let client = ScriptedLlmClient::replying(["a", "b"]);
        assert_eq!(client.complete(&request("1")).await.unwrap(), "a");
        assert_eq!(client.complete(&request("2")).await.unwrap(), "b");
        assert!(client.complete(&request("3")).await.is_err());
        assert_eq!(client.requests().len(), 3);
    }
}
