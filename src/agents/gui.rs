//! GUI agent：切换应用、坐标点击、快捷键、按键、输入文字

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::actions::{AppControl, InputControl};
use crate::agents::{Agent, AgentTask};
use crate::core::ActionError;
use crate::planning::Params;

/// 应用切换之后要执行的操作
#[derive(Debug, Clone, PartialEq)]
pub enum GuiCommand {
    ClickAt { x: i64, y: i64, text: Option<String> },
    Hotkey { keys: Vec<String>, text: Option<String> },
    KeyPress(String),
    Type(String),
    /// 只有描述时如实报告
    Describe(String),
}

/// 参数解析结果：可选的目标应用 + 可选的操作
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GuiRequest {
    pub app: Option<String>,
    pub command: Option<GuiCommand>,
}

/// 按参数分发：坐标 > 快捷键 > 单键 > 文字 > 描述
pub fn from_params(params: &Params) -> GuiRequest {
    let text = params.text("text").map(str::to_string);
    let keys = params.key_list("keys");

    let command = match (params.number("x"), params.number("y")) {
        (Some(x), Some(y)) => Some(GuiCommand::ClickAt {
            x: x.round() as i64,
            y: y.round() as i64,
            text,
        }),
        _ if !keys.is_empty() => Some(GuiCommand::Hotkey { keys, text }),
        _ => params
            .text("key")
            .map(|k| GuiCommand::KeyPress(k.to_string()))
            .or_else(|| text.map(GuiCommand::Type))
            .or_else(|| {
                params
                    .text("description")
                    .map(|d| GuiCommand::Describe(d.to_string()))
            }),
    };

    GuiRequest {
        app: params.text("app").map(str::to_string),
        command,
    }
}

/// 从任务文本推断要输入的文字："type hello" / "type: hello"
pub fn infer_from_task(task: &str) -> Option<String> {
    let lower = task.to_lowercase();
    ["type ", "type: "].iter().find_map(|prefix| {
        let start = lower.find(prefix)? + prefix.len();
        let text = task
            .get(start..)?
            .trim()
            .trim_matches(|c: char| c == '"' || c == '\'');
        (!text.is_empty()).then(|| text.to_string())
    })
}

pub struct GuiAgent {
    apps: Arc<dyn AppControl>,
    input: Arc<dyn InputControl>,
    settle: Duration,
}

impl GuiAgent {
    pub fn new(apps: Arc<dyn AppControl>, input: Arc<dyn InputControl>) -> Self {
        Self {
            apps,
            input,
            settle: Duration::ZERO,
        }
    }

    /// 切换应用、点击之后等界面响应的时间
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// 切换失败时改为打开
    async fn focus(&self, app: &str) -> Result<(), ActionError> {
        if let Err(e) = self.apps.switch_to_app(app).await {
            tracing::debug!(app, error = %e, "switch failed, opening instead");
            self.apps.open_app(app).await?;
        }
        tokio::time::sleep(self.settle).await;
        Ok(())
    }

    async fn type_after(&self, summary: String, text: Option<String>) -> Result<String, ActionError> {
        match text {
            Some(text) => {
                self.input.type_text(&text).await?;
                Ok(format!("{} and typed '{}'", summary, text))
            }
            None => Ok(summary),
        }
    }
}

fn in_app(app: Option<&str>) -> String {
    app.map(|a| format!(" in {}", a)).unwrap_or_default()
}

#[async_trait]
impl Agent for GuiAgent {
    fn name(&self) -> &'static str {
        "gui"
    }

    async fn execute(&self, task: &AgentTask<'_>) -> Result<String, ActionError> {
        let request = from_params(task.params);
        let app = request.app.as_deref();
        if let Some(app) = app {
            self.focus(app).await?;
        }

        match request.command {
            Some(GuiCommand::ClickAt { x, y, text }) => {
                self.input.click(x, y).await?;
                tokio::time::sleep(self.settle).await;
                self.type_after(format!("Clicked at ({}, {})", x, y), text)
                    .await
            }
            Some(GuiCommand::Hotkey { keys, text }) => {
                self.input.hotkey(&keys).await?;
                tokio::time::sleep(self.settle).await;
                self.type_after(format!("Pressed {}", keys.join("+")), text)
                    .await
            }
            Some(GuiCommand::KeyPress(key)) => {
                self.input.key_press(&key).await?;
                Ok(format!("Pressed {}", key))
            }
            Some(GuiCommand::Type(text)) => {
                self.input.type_text(&text).await?;
                Ok(format!("Typed '{}'{}", text, in_app(app)))
            }
            Some(GuiCommand::Describe(description)) => {
                Ok(format!("GUI interaction: {}{}", description, in_app(app)))
            }
            None => {
                if let Some(app) = app {
                    return Ok(format!("Switched to {}", app));
                }
                match infer_from_task(task.task) {
                    Some(text) => {
                        self.input.type_text(&text).await?;
                        Ok(format!("Typed '{}'", text))
                    }
                    None => Ok(format!("GUI task handled: {}", task.task)),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::actions::RecordingDesktop;

    fn params(value: serde_json::Value) -> Params {
        serde_json::from_value(value).unwrap()
    }

    async fn execute(desktop: &Arc<RecordingDesktop>, task: &str, p: Params) -> String {
        let agent = GuiAgent::new(desktop.clone(), desktop.clone());
        agent
            .execute(&AgentTask {
                task,
                params: &p,
                intent: task,
            })
            .await
            .unwrap()
    }

    #[test]
    fn test_from_params_priority() {
        let req = from_params(&params(json!({"x": 10, "y": "20", "keys": "command+v"})));
        assert_eq!(
            req.command,
            Some(GuiCommand::ClickAt {
                x: 10,
                y: 20,
                text: None
            })
        );
        let req = from_params(&params(json!({"app": "Notes", "keys": ["command", "n"], "text": "hi"})));
        assert_eq!(req.app.as_deref(), Some("Notes"));
        assert_eq!(
            req.command,
            Some(GuiCommand::Hotkey {
                keys: vec!["command".to_string(), "n".to_string()],
                text: Some("hi".to_string())
            })
        );
        assert_eq!(from_params(&Params::new()), GuiRequest::default());
    }

    #[test]
    fn test_infer_text_to_type() {
        assert_eq!(infer_from_task("Type \"hello world\"").as_deref(), Some("hello world"));
        assert_eq!(infer_from_task("type: done").as_deref(), Some("done"));
        assert_eq!(infer_from_task("click the thing"), None);
    }

    #[tokio::test]
    async fn test_hotkey_then_type() {
        let desktop = Arc::new(RecordingDesktop::new());
        let summary = execute(
            &desktop,
            "new note",
            params(json!({"app": "Notes", "keys": "command+n", "text": "groceries"})),
        )
        .await;
        assert_eq!(summary, "Pressed command+n and typed 'groceries'");
        assert_eq!(
            desktop.calls(),
            vec![
                "switch_to_app Notes",
                "hotkey command+n",
                "type_text groceries"
            ]
        );
    }

    #[tokio::test]
    async fn test_switch_falls_back_to_open() {
        let desktop =
            Arc::new(RecordingDesktop::new().failing_once("switch_to_app", "not running"));
        let summary = execute(&desktop, "focus Notes", params(json!({"app": "Notes"}))).await;
        assert_eq!(summary, "Switched to Notes");
        assert_eq!(desktop.calls(), vec!["switch_to_app Notes", "open_app Notes"]);
    }
}
