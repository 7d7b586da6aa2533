//! Ghosty - 桌面自动化助手编排器
//!
//! 模块划分：
//! - **actions**: 执行器能力（应用、键鼠、浏览器、Shell、视觉定位）与步骤分发
//! - **agents**: Supervisor / Router 变体（web / system / files / gui）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误、状态、安全上限、进程登记、状态发布、关闭与编排器
//! - **llm**: 规划器后端（Ollama / OpenAI 兼容 / Mock）
//! - **memory**: 跨运行的用户偏好
//! - **observability**: 日志初始化
//! - **planning**: 步骤模型、规划适配器、规划-执行-恢复主循环

pub mod actions;
pub mod agents;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod planning;

pub use crate::config::{load_config, AppConfig, RunMode};
pub use crate::core::{Orchestrator, OrchestratorBuilder, RunOutcome, RunStatus};
