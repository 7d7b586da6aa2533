//! 动作执行层：执行器能力接口 + Toolbox 组合
//!
//! 编排器只依赖这里的 trait；macOS 实现（osascript / open / screencapture）在 automation、browser、shell、
//! grounding 子模块中，测试使用 recording 中的记录型桌面。

pub mod automation;
pub mod browser;
pub mod dispatcher;
pub mod grounding;
pub mod recording;
pub mod shell;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::AppConfig;
use crate::core::{ActionError, ProcessLauncher};

pub use automation::MacAutomation;
pub use browser::AppleScriptBrowser;
pub use dispatcher::StepDispatcher;
pub use grounding::HttpGrounding;
pub use recording::RecordingDesktop;
pub use shell::AllowlistShell;

/// 应用与系统控制
#[async_trait]
pub trait AppControl: Send + Sync {
    async fn open_app(&self, name: &str) -> Result<(), ActionError>;
    async fn switch_to_app(&self, name: &str) -> Result<(), ActionError>;
    async fn open_url(&self, url: &str) -> Result<(), ActionError>;
    async fn open_file(&self, path: &str) -> Result<(), ActionError>;
    async fn run_script(&self, script: &str) -> Result<String, ActionError>;
    async fn frontmost_app(&self) -> Result<String, ActionError>;
    async fn running_apps(&self) -> Result<Vec<String>, ActionError>;
    /// level 取值 0..=100
    async fn set_volume(&self, level: u8) -> Result<(), ActionError>;
    async fn toggle_dark_mode(&self) -> Result<(), ActionError>;
}

/// 键鼠与屏幕
#[async_trait]
pub trait InputControl: Send + Sync {
    async fn click(&self, x: i64, y: i64) -> Result<(), ActionError>;
    async fn type_text(&self, text: &str) -> Result<(), ActionError>;
    async fn hotkey(&self, keys: &[String]) -> Result<(), ActionError>;
    async fn key_press(&self, key: &str) -> Result<(), ActionError>;
    /// 正数向上，负数向下
    async fn scroll(&self, clicks: i64) -> Result<(), ActionError>;
    /// 截屏并返回图片路径
    async fn screenshot(&self) -> Result<PathBuf, ActionError>;
    async fn screen_size(&self) -> Result<(u32, u32), ActionError>;
}

/// 浏览器控制
#[async_trait]
pub trait BrowserControl: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), ActionError>;
    async fn search(&self, query: &str) -> Result<(), ActionError>;
    async fn new_tab(&self) -> Result<(), ActionError>;
    async fn focus_url_bar(&self) -> Result<(), ActionError>;
    async fn click_selector(&self, selector: &str) -> Result<(), ActionError>;
    async fn type_in_page(&self, selector: &str, text: &str) -> Result<(), ActionError>;
    /// 偏好中的浏览器覆盖自动检测
    fn set_preferred_browser(&self, name: &str);
}

/// 受限命令执行
#[async_trait]
pub trait ShellControl: Send + Sync {
    async fn run_command(&self, command: &str) -> Result<String, ActionError>;
}

/// 视觉定位：截图 + 自然语言描述 -> 归一化坐标 (0..1, 0..1)
#[async_trait]
pub trait VisualGrounding: Send + Sync {
    async fn ground(&self, screenshot: &Path, instruction: &str) -> Result<(f64, f64), ActionError>;

    fn name(&self) -> &str;
}

/// 一次运行可用的全部执行器
#[derive(Clone)]
pub struct Toolbox {
    pub apps: Arc<dyn AppControl>,
    pub input: Arc<dyn InputControl>,
    pub browser: Arc<dyn BrowserControl>,
    pub shell: Arc<dyn ShellControl>,
    /// 未配置视觉定位服务时为 None，click_element 将被跳过
    pub grounding: Option<Arc<dyn VisualGrounding>>,
}

impl Toolbox {
    /// 按配置组装 macOS 执行器，所有子进程都经同一个 launcher 启动
    pub fn macos(cfg: &AppConfig, launcher: ProcessLauncher) -> Self {
        let automation = Arc::new(MacAutomation::new(
            launcher.clone(),
            cfg.tools.script_timeout_secs,
        ));
        let browser = Arc::new(AppleScriptBrowser::new(
            automation.clone(),
            automation.clone(),
            cfg.tools.browser.order.clone(),
            cfg.tools.browser.default.clone(),
        ));
        let shell = Arc::new(AllowlistShell::new(
            launcher,
            cfg.tools.shell.allowed_commands.clone(),
            cfg.tools.shell_timeout_secs,
        ));
        let grounding: Option<Arc<dyn VisualGrounding>> = match &cfg.tools.grounding.endpoint {
            Some(endpoint) => {
                tracing::info!(endpoint = %endpoint, "visual grounding enabled");
                Some(Arc::new(HttpGrounding::new(
                    endpoint,
                    cfg.tools.grounding.timeout_secs,
                )))
            }
            None => None,
        };

        Self {
            apps: automation.clone(),
            input: automation,
            browser,
            shell,
            grounding,
        }
    }

    /// 所有能力都由同一个记录型桌面提供（测试与演练用）
    pub fn recording(desktop: Arc<RecordingDesktop>) -> Self {
        Self {
            apps: desktop.clone(),
            input: desktop.clone(),
            browser: desktop.clone(),
            shell: desktop,
            grounding: None,
        }
    }

    pub fn with_grounding(mut self, grounding: Arc<dyn VisualGrounding>) -> Self {
        self.grounding = Some(grounding);
        self
    }
}
