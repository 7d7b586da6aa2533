//! 编排错误类型
//!
//! - PlanningError：外部规划调用失败（超时、网络、非 2xx）；不可解析的输出不在此列，由兜底合成吸收
//! - ActionError：单个步骤的执行器失败，由重规划恢复
//! - LimitExceeded：步数或总时长触顶，属于正常终止而非错误状态

use thiserror::Error;

use crate::llm::LlmError;

/// 规划器（Planner）调用失败
#[derive(Error, Debug, Clone)]
pub enum PlanningError {
    #[error("planner timed out after {0}s")]
    Timeout(u64),

    #[error("planner request failed: {0}")]
    Llm(#[from] LlmError),
}

/// 单个动作执行失败
#[derive(Error, Debug, Clone)]
pub enum ActionError {
    #[error("{action}: missing parameter '{param}'")]
    MissingParam { action: String, param: String },

    #[error("{action}: invalid parameter '{param}': {reason}")]
    InvalidParam {
        action: String,
        param: String,
        reason: String,
    },

    #[error("failed to launch {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("{program} timed out after {secs}s")]
    Timeout { program: String, secs: u64 },

    #[error("{0}")]
    Command(String),

    #[error("Command '{0}' is not in the allowlist")]
    NotAllowed(String),

    #[error("Forbidden pattern: {0}")]
    Forbidden(String),

    #[error("{0} unavailable")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl ActionError {
    pub fn missing(action: &str, param: &str) -> Self {
        Self::MissingParam {
            action: action.to_string(),
            param: param.to_string(),
        }
    }

    pub fn invalid(action: &str, param: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParam {
            action: action.to_string(),
            param: param.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for ActionError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// 安全上限触顶（在每个工作单元开始前检查，绝不在步骤中途打断）
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitExceeded {
    #[error("step ceiling of {0} reached")]
    Steps(usize),

    #[error("wall-clock ceiling of {0}s reached")]
    Time(u64),
}

impl LimitExceeded {
    /// 写入状态文件的终止消息
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Steps(_) => "Too many steps.",
            Self::Time(_) => "Timed out.",
        }
    }
}
