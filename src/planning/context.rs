//! 环境快照：前台应用与运行中的应用
//!
//! 每次调用规划器前重新采集，从不持久化。采集失败不报错：前台应用记为 "Unknown"，应用列表为空。

use std::sync::Arc;

use async_trait::async_trait;

use crate::actions::AppControl;

/// 规划 prompt 中最多列出的运行中应用个数
pub const MAX_LISTED_APPS: usize = 15;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    pub frontmost_app: Option<String>,
    pub running_apps: Vec<String>,
}

impl Context {
    /// 渲染为 prompt 前缀行
    pub fn prompt_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(app) = &self.frontmost_app {
            lines.push(format!("Currently focused app: {}", app));
        }
        if !self.running_apps.is_empty() {
            let listed: Vec<&str> = self
                .running_apps
                .iter()
                .take(MAX_LISTED_APPS)
                .map(String::as_str)
                .collect();
            lines.push(format!("Running apps: {}", listed.join(", ")));
        }
        lines
    }
}

#[async_trait]
pub trait ContextGatherer: Send + Sync {
    async fn gather(&self) -> Context;
}

/// 通过 AppControl 采集
pub struct DesktopContextGatherer {
    apps: Arc<dyn AppControl>,
}

impl DesktopContextGatherer {
    pub fn new(apps: Arc<dyn AppControl>) -> Self {
        Self { apps }
    }
}

#[async_trait]
impl ContextGatherer for DesktopContextGatherer {
    async fn gather(&self) -> Context {
        let frontmost_app = match self.apps.frontmost_app().await {
            Ok(app) => app,
            Err(e) => {
                tracing::debug!(error = %e, "frontmost app unavailable");
                "Unknown".to_string()
            }
        };
        let running_apps = self.apps.running_apps().await.unwrap_or_else(|e| {
            tracing::debug!(error = %e, "running apps unavailable");
            Vec::new()
        });
        Context {
            frontmost_app: Some(frontmost_app),
            running_apps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::RecordingDesktop;

    #[tokio::test]
    async fn test_gather_falls_back_to_unknown() {
        let gatherer = DesktopContextGatherer::new(Arc::new(RecordingDesktop::new()));
        let ctx = gatherer.gather().await;
        assert_eq!(ctx.frontmost_app.as_deref(), Some("Unknown"));
        assert!(ctx.running_apps.is_empty());
        assert_eq!(ctx.prompt_lines(), vec!["Currently focused app: Unknown"]);
    }

    #[test]
    fn test_prompt_lines_cap_running_apps() {
        let ctx = Context {
            frontmost_app: Some("Safari".to_string()),
            running_apps: (0..20).map(|i| format!("App{}", i)).collect(),
        };
        let lines = ctx.prompt_lines();
        assert_eq!(lines[0], "Currently focused app: Safari");
        assert!(lines[1].ends_with("App14"));
        assert!(!lines[1].contains("App15"));
    }
}
