//! System agent：音量、深色模式、白名单命令、脚本、系统设置

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;

use crate::actions::{AppControl, ShellControl};
use crate::agents::{Agent, AgentTask};
use crate::core::ActionError;
use crate::planning::Params;

static NUMBER_RE: OnceLock<Regex> = OnceLock::new();

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemCommand {
    SetVolume(u8),
    ToggleDarkMode,
    RunCommand(String),
    RunScript(String),
    OpenSettings,
}

fn clamp_volume(level: f64) -> u8 {
    level.round().clamp(0.0, 100.0) as u8
}

/// 按参数分发：volume > dark mode > command > script
pub fn from_params(params: &Params) -> Result<Option<SystemCommand>, ActionError> {
    if params.contains("volume") {
        let level = params
            .number("volume")
            .filter(|v| v.is_finite())
            .ok_or_else(|| ActionError::invalid("system", "volume", "expected a number"))?;
        return Ok(Some(SystemCommand::SetVolume(clamp_volume(level))));
    }
    if params.text("setting") == Some("dark_mode")
        || params.text("action") == Some("toggle_dark_mode")
    {
        return Ok(Some(SystemCommand::ToggleDarkMode));
    }
    if let Some(command) = params.text("command") {
        return Ok(Some(SystemCommand::RunCommand(command.to_string())));
    }
    if let Some(script) = params.text("script") {
        return Ok(Some(SystemCommand::RunScript(script.to_string())));
    }
    Ok(None)
}

/// 从任务文本推断："volume 30"、"mute"/"off"、"max"/"full"、"dark mode"、"system settings"
pub fn infer_from_task(task: &str) -> Option<SystemCommand> {
    let lower = task.to_lowercase();

    if lower.contains("volume") {
        let re = NUMBER_RE.get_or_init(|| Regex::new(r"\d+").unwrap());
        if let Some(level) = re.find(task).and_then(|m| m.as_str().parse::<f64>().ok()) {
            return Some(SystemCommand::SetVolume(clamp_volume(level)));
        }
        if lower.contains("mute") || lower.contains("off") {
            return Some(SystemCommand::SetVolume(0));
        }
        if lower.contains("max") || lower.contains("full") {
            return Some(SystemCommand::SetVolume(100));
        }
    }
    if lower.contains("dark mode") {
        return Some(SystemCommand::ToggleDarkMode);
    }
    if ["open system", "system settings", "system preferences"]
        .iter()
        .any(|k| lower.contains(k))
    {
        return Some(SystemCommand::OpenSettings);
    }
    None
}

pub struct SystemAgent {
    apps: Arc<dyn AppControl>,
    shell: Arc<dyn ShellControl>,
}

impl SystemAgent {
    pub fn new(apps: Arc<dyn AppControl>, shell: Arc<dyn ShellControl>) -> Self {
        Self { apps, shell }
    }

    async fn apply(&self, command: SystemCommand) -> Result<String, ActionError> {
        match command {
            SystemCommand::SetVolume(level) => {
                self.apps.set_volume(level).await?;
                Ok(match level {
                    0 => "Volume muted".to_string(),
                    level => format!("Volume set to {}", level),
                })
            }
            SystemCommand::ToggleDarkMode => {
                self.apps.toggle_dark_mode().await?;
                Ok("Toggled dark mode".to_string())
            }
            SystemCommand::RunCommand(command) => {
                let output = self.shell.run_command(&command).await?;
                let output = output.trim();
                Ok(if output.is_empty() {
                    format!("Ran command: {}", command)
                } else {
                    format!("Ran command: {}\n{}", command, output)
                })
            }
            SystemCommand::RunScript(script) => {
                let output = self.apps.run_script(&script).await?;
                Ok(if output.is_empty() {
                    "Ran AppleScript".to_string()
                } else {
                    format!("Ran AppleScript: {}", output)
                })
            }
            SystemCommand::OpenSettings => {
                self.apps.open_app("System Settings").await?;
                Ok("Opened System Settings".to_string())
            }
        }
    }
}

#[async_trait]
impl Agent for SystemAgent {
    fn name(&self) -> &'static str {
        "system"
    }

    async fn execute(&self, task: &AgentTask<'_>) -> Result<String, ActionError> {
        let command = match from_params(task.params)? {
            Some(command) => Some(command),
            None => infer_from_task(task.task),
        };
        match command {
            Some(command) => self.apply(command).await,
            None => Ok(format!("System task handled: {}", task.task)),
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

    #[test]
    fn test_volume_param_is_clamped_and_validated() {
        assert_eq!(
            from_params(&params(json!({"volume": 250}))).unwrap(),
            Some(SystemCommand::SetVolume(100))
        );
        assert_eq!(
            from_params(&params(json!({"volume": "40"}))).unwrap(),
            Some(SystemCommand::SetVolume(40))
        );
        assert!(from_params(&params(json!({"volume": "loud"}))).is_err());
    }

    #[test]
    fn test_infer_volume_and_settings() {
        assert_eq!(
            infer_from_task("set volume to 30"),
            Some(SystemCommand::SetVolume(30))
        );
        assert_eq!(
            infer_from_task("Mute the volume"),
            Some(SystemCommand::SetVolume(0))
        );
        assert_eq!(
            infer_from_task("volume to max"),
            Some(SystemCommand::SetVolume(100))
        );
        assert_eq!(
            infer_from_task("turn on dark mode"),
            Some(SystemCommand::ToggleDarkMode)
        );
        assert_eq!(
            infer_from_task("open System Preferences"),
            Some(SystemCommand::OpenSettings)
        );
        assert_eq!(infer_from_task("reboot"), None);
    }

    #[tokio::test]
    async fn test_command_param_runs_through_shell() {
        let desktop = Arc::new(RecordingDesktop::new());
        let agent = SystemAgent::new(desktop.clone(), desktop.clone());
        let p = params(json!({"command": "sw_vers"}));
        let summary = agent
            .execute(&AgentTask {
                task: "check macOS version",
                params: &p,
                intent: "what macOS am I on",
            })
            .await
            .unwrap();
        assert!(summary.starts_with("Ran command: sw_vers"));
        assert_eq!(desktop.calls(), vec!["run_command sw_vers"]);
    }
}
