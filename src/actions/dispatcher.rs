//! 步骤分发器
//!
//! 把 Step 的动作标签映射到对应执行器调用；参数提取按标签各自处理。分发器本身不加超时，
//! 每个执行器自己约束外部调用时长。不认识的标签记录告警并返回成功的 no-op。
//! 每次调用输出一条结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use crate::actions::Toolbox;
use crate::core::ActionError;
use crate::planning::{Action, Params, Step};

/// 审计日志中参数预览的最大字符数
const PARAMS_PREVIEW_CHARS: usize = 200;

pub struct StepDispatcher {
    toolbox: Toolbox,
    max_wait_secs: f64,
}

impl StepDispatcher {
    pub fn new(toolbox: Toolbox, max_wait_secs: f64) -> Self {
        Self {
            toolbox,
            max_wait_secs: max_wait_secs.max(0.0),
        }
    }

    pub fn toolbox(&self) -> &Toolbox {
        &self.toolbox
    }

    /// 执行一个步骤，返回一句结果摘要
    pub async fn dispatch(&self, step: &Step) -> Result<String, ActionError> {
        let start = Instant::now();
        let result = self.execute(step).await;

        let outcome = match (&result, &step.action) {
            (Ok(_), Action::Unknown(_)) => "noop",
            (Ok(_), _) => "ok",
            (Err(_), _) => "error",
        };
        let audit = serde_json::json!({
            "event": "action_audit",
            "ts": chrono::Utc::now().to_rfc3339(),
            "action": step.action.as_str(),
            "ok": result.is_ok(),
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "params_preview": params_preview(&step.params),
        });
        tracing::info!(audit = %audit.to_string(), "action");

        result
    }

    async fn execute(&self, step: &Step) -> Result<String, ActionError> {
        let tag = step.action.as_str();
        let p = &step.params;
        let tb = &self.toolbox;

        match &step.action {
            Action::OpenApp => {
                let name = p.require_text(tag, "name")?;
                tb.apps.open_app(name).await?;
                Ok(format!("Opened {}", name))
            }
            Action::SwitchToApp => {
                let name = p.require_text(tag, "name")?;
                tb.apps.switch_to_app(name).await?;
                Ok(format!("Switched to {}", name))
            }
            Action::OpenUrl => {
                let url = p.require_text(tag, "url")?;
                tb.apps.open_url(url).await?;
                Ok(format!("Opened {}", url))
            }
            Action::OpenFile => {
                let path = p.require_text(tag, "path")?;
                tb.apps.open_file(path).await?;
                Ok(format!("Opened {}", path))
            }
            Action::ClickElement => self.click_element(p.text("description").unwrap_or("")).await,
            Action::TypeText => {
                let text = p.require_text(tag, "text")?;
                tb.input.type_text(text).await?;
                Ok(format!("Typed '{}'", text))
            }
            Action::Hotkey => {
                let keys = p.key_list("keys");
                if keys.is_empty() {
                    return Err(ActionError::missing(tag, "keys"));
                }
                tb.input.hotkey(&keys).await?;
                Ok(format!("Pressed {}", keys.join("+")))
            }
            Action::KeyPress => {
                let key = p.require_text(tag, "key")?;
                tb.input.key_press(key).await?;
                Ok(format!("Pressed {}", key))
            }
            Action::Scroll => {
                let direction = p.text("direction").unwrap_or("down").to_lowercase();
                let amount = p.number("amount").unwrap_or(3.0).round() as i64;
                let clicks = match direction.as_str() {
                    "up" => amount,
                    "down" => -amount,
                    other => {
                        return Err(ActionError::invalid(
                            tag,
                            "direction",
                            format!("expected up or down, got '{}'", other),
                        ))
                    }
                };
                tb.input.scroll(clicks).await?;
                Ok(format!("Scrolled {} {}", direction, amount))
            }
            Action::RunScript => {
                let script = p.require_text(tag, "script")?;
                let output = tb.apps.run_script(script).await?;
                Ok(if output.is_empty() {
                    "Ran script".to_string()
                } else {
                    format!("Ran script: {}", output)
                })
            }
            Action::Wait => {
                let secs = self.wait_secs(p);
                tokio::time::sleep(Duration::from_secs_f64(secs)).await;
                Ok(format!("Waited {}s", secs))
            }
            Action::Done => Ok(step.done_message()),
            Action::Unknown(other) => {
                tracing::warn!(action = %other, "unknown action, skipping");
                Ok(format!("Skipped unknown action '{}'", other))
            }
        }
    }

    /// 默认 1 秒，限制在 [0, max_wait_secs]
    fn wait_secs(&self, params: &Params) -> f64 {
        let secs = params
            .number("seconds")
            .filter(|s| s.is_finite())
            .unwrap_or(1.0);
        secs.clamp(0.0, self.max_wait_secs)
    }

    /// 截屏 -> 视觉定位 -> 归一化坐标换算为屏幕坐标 -> 点击；未配置定位服务时跳过
    async fn click_element(&self, description: &str) -> Result<String, ActionError> {
        let Some(grounding) = &self.toolbox.grounding else {
            tracing::warn!(description = %description, "visual grounding unavailable, skipping click_element");
            return Ok(format!("Skipped click on '{}' (no visual grounding)", description));
        };

        let shot = self.toolbox.input.screenshot().await?;
        let (nx, ny) = grounding.ground(&shot, description).await?;
        let (width, height) = self.toolbox.input.screen_size().await?;
        let (x, y) = (
            (nx * f64::from(width)) as i64,
            (ny * f64::from(height)) as i64,
        );
        tracing::info!(description = %description, x, y, grounding = grounding.name(), "grounded click");
        self.toolbox.input.click(x, y).await?;
        Ok(format!("Clicked {} at ({}, {})", description, x, y))
    }
}

fn params_preview(params: &Params) -> String {
    let s = params.to_json();
    if s.chars().count() > PARAMS_PREVIEW_CHARS {
        format!("{}...", s.chars().take(PARAMS_PREVIEW_CHARS).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::actions::{RecordingDesktop, VisualGrounding};

    struct FixedGrounding(f64, f64);

    #[async_trait]
    impl VisualGrounding for FixedGrounding {
        async fn ground(&self, _: &Path, _: &str) -> Result<(f64, f64), ActionError> {
            Ok((self.0, self.1))
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn dispatcher(desktop: Arc<RecordingDesktop>) -> StepDispatcher {
        StepDispatcher::new(Toolbox::recording(desktop), 10.0)
    }

    #[tokio::test]
    async fn test_hotkey_accepts_joined_string() {
        let desktop = Arc::new(RecordingDesktop::new());
        let step = Step::new(Action::Hotkey).with_param("keys", "command + t");
        let summary = dispatcher(desktop.clone()).dispatch(&step).await.unwrap();
        assert_eq!(summary, "Pressed command+t");
        assert_eq!(desktop.calls(), vec!["hotkey command+t"]);
    }

    #[tokio::test]
    async fn test_hotkey_accepts_pre_split_list() {
        let desktop = Arc::new(RecordingDesktop::new());
        let step = Step::new(Action::Hotkey).with_param("keys", json!(["command", "shift", "n"]));
        dispatcher(desktop.clone()).dispatch(&step).await.unwrap();
        assert_eq!(desktop.calls(), vec!["hotkey command+shift+n"]);
    }

    #[tokio::test]
    async fn test_unknown_action_is_noop() {
        let desktop = Arc::new(RecordingDesktop::new());
        let step = Step::new(Action::parse("teleport"));
        let summary = dispatcher(desktop.clone()).dispatch(&step).await.unwrap();
        assert!(summary.contains("teleport"));
        assert!(desktop.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_param_is_action_error() {
        let desktop = Arc::new(RecordingDesktop::new());
        let err = dispatcher(desktop)
            .dispatch(&Step::new(Action::OpenApp))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "open_app: missing parameter 'name'");
    }

    #[tokio::test]
    async fn test_scroll_direction_and_default_amount() {
        let desktop = Arc::new(RecordingDesktop::new());
        let d = dispatcher(desktop.clone());
        d.dispatch(&Step::new(Action::Scroll)).await.unwrap();
        d.dispatch(&Step::new(Action::Scroll).with_param("direction", "up").with_param("amount", 5))
            .await
            .unwrap();
        assert_eq!(desktop.calls(), vec!["scroll -3", "scroll 5"]);
        assert!(d
            .dispatch(&Step::new(Action::Scroll).with_param("direction", "sideways"))
            .await
            .is_err());
    }

    #[test]
    fn test_wait_is_clamped() {
        let d = StepDispatcher::new(Toolbox::recording(Arc::new(RecordingDesktop::new())), 2.0);
        let params = |v: serde_json::Value| Step::new(Action::Wait).with_param("seconds", v).params;
        assert_eq!(d.wait_secs(&params(json!(30))), 2.0);
        assert_eq!(d.wait_secs(&params(json!(-1))), 0.0);
        assert_eq!(d.wait_secs(&params(json!("0.5"))), 0.5);
        assert_eq!(d.wait_secs(&Params::new()), 1.0);
    }

    #[tokio::test]
    async fn test_click_element_skipped_without_grounding() {
        let desktop = Arc::new(RecordingDesktop::new());
        let step = Step::new(Action::ClickElement).with_param("description", "the search box");
        let summary = dispatcher(desktop.clone()).dispatch(&step).await.unwrap();
        assert!(summary.starts_with("Skipped click"));
        assert!(desktop.calls().is_empty());
    }

    #[tokio::test]
    async fn test_click_element_converts_normalized_point() {
        let desktop = Arc::new(RecordingDesktop::new().with_screen(1000, 800));
        let toolbox = Toolbox::recording(desktop.clone())
            .with_grounding(Arc::new(FixedGrounding(0.25, 0.5)));
        let step = Step::new(Action::ClickElement).with_param("description", "OK button");
        StepDispatcher::new(toolbox, 10.0).dispatch(&step).await.unwrap();
        assert_eq!(desktop.calls(), vec!["screenshot", "click 250,400"]);
    }

    #[tokio::test]
    async fn test_executor_failure_propagates() {
        let desktop = Arc::new(RecordingDesktop::new().failing_once("open_app", "no such app"));
        let step = Step::new(Action::OpenApp).with_param("name", "Nope");
        let err = dispatcher(desktop).dispatch(&step).await.unwrap_err();
        assert_eq!(err.to_string(), "no such app");
    }
}
