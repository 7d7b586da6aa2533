//! 记录型桌面：不触碰真实系统，只把每次调用记成一行文本
//!
//! 用于离线演练与测试；可以预设前台应用、运行中的应用、每次调用的延迟，以及按前缀注入一次性失败。

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::actions::{AppControl, BrowserControl, InputControl, ShellControl};
use crate::core::ActionError;

pub struct RecordingDesktop {
    calls: Mutex<Vec<String>>,
    failures: Mutex<Vec<(String, String)>>,
    frontmost: Option<String>,
    running: Vec<String>,
    screen: (u32, u32),
    delay: Duration,
}

impl Default for RecordingDesktop {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(Vec::new()),
            frontmost: None,
            running: Vec::new(),
            screen: (1440, 900),
            delay: Duration::ZERO,
        }
    }
}

impl RecordingDesktop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_frontmost(mut self, app: &str) -> Self {
        self.frontmost = Some(app.to_string());
        self
    }

    pub fn with_running(mut self, apps: &[&str]) -> Self {
        self.running = apps.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn with_screen(mut self, width: u32, height: u32) -> Self {
        self.screen = (width, height);
        self
    }

    /// 每次动作调用前等待的时长
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// 第一个以 prefix 开头的调用返回 ActionError::Command(message)
    pub fn failing_once(self, prefix: &str, message: &str) -> Self {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push((prefix.to_string(), message.to_string()));
        }
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn push(&self, call: String) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    async fn record(&self, call: String) -> Result<(), ActionError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let failure = self.failures.lock().ok().and_then(|mut failures| {
            let pos = failures.iter().position(|(p, _)| call.starts_with(p.as_str()))?;
            Some(failures.remove(pos).1)
        });
        self.push(call);
        match failure {
            Some(message) => Err(ActionError::Command(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl AppControl for RecordingDesktop {
    async fn open_app(&self, name: &str) -> Result<(), ActionError> {
        self.record(format!("open_app {}", name)).await
    }

    async fn switch_to_app(&self, name: &str) -> Result<(), ActionError> {
        self.record(format!("switch_to_app {}", name)).await
    }

    async fn open_url(&self, url: &str) -> Result<(), ActionError> {
        self.record(format!("open_url {}", url)).await
    }

    async fn open_file(&self, path: &str) -> Result<(), ActionError> {
        self.record(format!("open_file {}", path)).await
    }

    async fn run_script(&self, script: &str) -> Result<String, ActionError> {
        self.record(format!("run_script {}", script)).await?;
        Ok(String::new())
    }

    async fn frontmost_app(&self) -> Result<String, ActionError> {
        self.frontmost
            .clone()
            .ok_or_else(|| ActionError::Unavailable("frontmost app".to_string()))
    }

    async fn running_apps(&self) -> Result<Vec<String>, ActionError> {
        Ok(self.running.clone())
    }

    async fn set_volume(&self, level: u8) -> Result<(), ActionError> {
        self.record(format!("set_volume {}", level)).await
    }

    async fn toggle_dark_mode(&self) -> Result<(), ActionError> {
        self.record("toggle_dark_mode".to_string()).await
    }
}

#[async_trait]
impl InputControl for RecordingDesktop {
    async fn click(&self, x: i64, y: i64) -> Result<(), ActionError> {
        self.record(format!("click {},{}", x, y)).await
    }

    async fn type_text(&self, text: &str) -> Result<(), ActionError> {
        self.record(format!("type_text {}", text)).await
    }

    async fn hotkey(&self, keys: &[String]) -> Result<(), ActionError> {
        self.record(format!("hotkey {}", keys.join("+"))).await
    }

    async fn key_press(&self, key: &str) -> Result<(), ActionError> {
        self.record(format!("key_press {}", key)).await
    }

    async fn scroll(&self, clicks: i64) -> Result<(), ActionError> {
        self.record(format!("scroll {}", clicks)).await
    }

    async fn screenshot(&self) -> Result<PathBuf, ActionError> {
        self.record("screenshot".to_string()).await?;
        Ok(std::env::temp_dir().join("ghosty-recording.png"))
    }

    async fn screen_size(&self) -> Result<(u32, u32), ActionError> {
        Ok(self.screen)
    }
}

#[async_trait]
impl BrowserControl for RecordingDesktop {
    async fn navigate(&self, url: &str) -> Result<(), ActionError> {
        self.record(format!("navigate {}", url)).await
    }

    async fn search(&self, query: &str) -> Result<(), ActionError> {
        self.record(format!("search {}", query)).await
    }

    async fn new_tab(&self) -> Result<(), ActionError> {
        self.record("new_tab".to_string()).await
    }

    async fn focus_url_bar(&self) -> Result<(), ActionError> {
        self.record("focus_url_bar".to_string()).await
    }

    async fn click_selector(&self, selector: &str) -> Result<(), ActionError> {
        self.record(format!("click_selector {}", selector)).await
    }

    async fn type_in_page(&self, selector: &str, text: &str) -> Result<(), ActionError> {
        self.record(format!("type_in_page {} {}", selector, text)).await
    }

    fn set_preferred_browser(&self, name: &str) {
        self.push(format!("preferred_browser {}", name));
    }
}

#[async_trait]
impl ShellControl for RecordingDesktop {
    async fn run_command(&self, command: &str) -> Result<String, ActionError> {
        self.record(format!("run_command {}", command)).await?;
        Ok(String::new())
    }
}
