//! macOS 自动化执行器
//!
//! 应用控制走 `open` 与 osascript（AppleScript），键盘走 System Events 的 keystroke / key code，
//! 鼠标点击与滚轮走 JXA 调用 CoreGraphics，截屏走 screencapture。所有子进程都经 ProcessLauncher 启动。

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use crate::actions::{AppControl, InputControl};
use crate::core::{ActionError, ProcessLauncher};

/// 具名按键的虚拟键码（US 布局）
const KEY_CODES: &[(&str, u16)] = &[
    ("return", 36),
    ("enter", 76),
    ("tab", 48),
    ("escape", 53),
    ("esc", 53),
    ("delete", 51),
    ("backspace", 51),
    ("forwarddelete", 117),
    ("space", 49),
    ("up", 126),
    ("down", 125),
    ("left", 123),
    ("right", 124),
    ("home", 115),
    ("end", 119),
    ("pageup", 116),
    ("pagedown", 121),
    ("f1", 122),
    ("f2", 120),
    ("f3", 99),
    ("f4", 118),
    ("f5", 96),
    ("f6", 97),
    ("f7", 98),
    ("f8", 100),
    ("f9", 101),
    ("f10", 109),
    ("f11", 103),
    ("f12", 111),
];

fn key_code(name: &str) -> Option<u16> {
    KEY_CODES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, code)| *code)
}

fn modifier(name: &str) -> Option<&'static str> {
    match name {
        "command" | "cmd" => Some("command down"),
        "shift" => Some("shift down"),
        "option" | "alt" => Some("option down"),
        "control" | "ctrl" => Some("control down"),
        _ => None,
    }
}

/// 转义为 AppleScript 字符串字面量内容
pub fn escape_applescript(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// 单个按键（可带修饰键）对应的 System Events 语句
fn key_statement(key: &str, modifiers: &[&str]) -> String {
    let using = if modifiers.is_empty() {
        String::new()
    } else {
        format!(" using {{{}}}", modifiers.join(", "))
    };
    match key_code(key) {
        Some(code) => format!(
            "tell application \"System Events\" to key code {}{}",
            code, using
        ),
        None => format!(
            "tell application \"System Events\" to keystroke \"{}\"{}",
            escape_applescript(key),
            using
        ),
    }
}

/// 组合键 -> AppleScript；修饰键之外的最后一个键为主键
pub fn hotkey_script(keys: &[String]) -> Result<String, ActionError> {
    let mut modifiers = Vec::new();
    let mut target = None;
    for k in keys {
        let low = k.trim().to_lowercase();
        match modifier(&low) {
            Some(m) => modifiers.push(m),
            None if !low.is_empty() => target = Some(low),
            None => {}
        }
    }
    let target = target.ok_or_else(|| ActionError::invalid("hotkey", "keys", "no non-modifier key"))?;
    Ok(key_statement(&target, &modifiers))
}

/// 单键 -> AppleScript
pub fn key_press_script(key: &str) -> String {
    key_statement(&key.trim().to_lowercase(), &[])
}

fn click_jxa(x: i64, y: i64) -> String {
    format!(
        "ObjC.import('CoreGraphics');\
         var p = $.CGPointMake({x}, {y});\
         $.CGEventPost($.kCGHIDEventTap, $.CGEventCreateMouseEvent(null, $.kCGEventLeftMouseDown, p, $.kCGMouseButtonLeft));\
         $.CGEventPost($.kCGHIDEventTap, $.CGEventCreateMouseEvent(null, $.kCGEventLeftMouseUp, p, $.kCGMouseButtonLeft));"
    )
}

fn scroll_jxa(clicks: i64) -> String {
    format!(
        "ObjC.import('CoreGraphics');\
         $.CGEventPost($.kCGHIDEventTap, $.CGEventCreateScrollWheelEvent(null, $.kCGScrollEventUnitLine, 1, {clicks}));"
    )
}

const SCREEN_SIZE_JXA: &str = "ObjC.import('AppKit');\
     var f = $.NSScreen.mainScreen.frame;\
     Math.round(f.size.width) + 'x' + Math.round(f.size.height);";

fn parse_screen_size(raw: &str) -> Option<(u32, u32)> {
    let (w, h) = raw.trim().split_once('x')?;
    Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
}

/// `~/` 前缀展开为家目录
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|h| h.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None if path == "~" => dirs::home_dir().unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

/// macOS 执行器：同时实现应用控制与键鼠控制
pub struct MacAutomation {
    launcher: ProcessLauncher,
    timeout: Duration,
}

impl MacAutomation {
    pub fn new(launcher: ProcessLauncher, timeout_secs: u64) -> Self {
        Self {
            launcher,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    async fn run(&self, program: &str, args: Vec<String>) -> Result<String, ActionError> {
        self.launcher
            .output(program, &args, self.timeout)
            .await?
            .into_result(program)
    }

    /// 执行 AppleScript 并返回 stdout
    pub async fn osascript(&self, script: &str) -> Result<String, ActionError> {
        let out = self
            .launcher
            .output("osascript", &["-e".to_string(), script.to_string()], self.timeout)
            .await?;
        if out.success {
            Ok(out.stdout.trim().to_string())
        } else {
            Err(ActionError::Command(format!(
                "AppleScript failed: {}",
                out.stderr.trim()
            )))
        }
    }

    async fn jxa(&self, script: &str) -> Result<String, ActionError> {
        self.run(
            "osascript",
            vec![
                "-l".to_string(),
                "JavaScript".to_string(),
                "-e".to_string(),
                script.to_string(),
            ],
        )
        .await
    }
}

#[async_trait]
impl AppControl for MacAutomation {
    async fn open_app(&self, name: &str) -> Result<(), ActionError> {
        self.run("open", vec!["-a".to_string(), name.to_string()])
            .await
            .map(|_| ())
    }

    async fn switch_to_app(&self, name: &str) -> Result<(), ActionError> {
        self.osascript(&format!(
            "tell application \"{}\" to activate",
            escape_applescript(name)
        ))
        .await
        .map(|_| ())
    }

    async fn open_url(&self, url: &str) -> Result<(), ActionError> {
        self.run("open", vec![url.to_string()]).await.map(|_| ())
    }

    async fn open_file(&self, path: &str) -> Result<(), ActionError> {
        let expanded = expand_home(path);
        self.run("open", vec![expanded.to_string_lossy().to_string()])
            .await
            .map(|_| ())
    }

    async fn run_script(&self, script: &str) -> Result<String, ActionError> {
        self.osascript(script).await
    }

    async fn frontmost_app(&self) -> Result<String, ActionError> {
        self.osascript(
            "tell application \"System Events\" to get name of first application process whose frontmost is true",
        )
        .await
    }

    async fn running_apps(&self) -> Result<Vec<String>, ActionError> {
        let raw = self
            .osascript(
                "tell application \"System Events\" to get name of every application process whose background only is false",
            )
            .await?;
        Ok(raw
            .split(',')
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect())
    }

    async fn set_volume(&self, level: u8) -> Result<(), ActionError> {
        self.osascript(&format!("set volume output volume {}", level.min(100)))
            .await
            .map(|_| ())
    }

    async fn toggle_dark_mode(&self) -> Result<(), ActionError> {
        self.osascript(
            "tell application \"System Events\" to tell appearance preferences to set dark mode to not dark mode",
        )
        .await
        .map(|_| ())
    }
}

#[async_trait]
impl InputControl for MacAutomation {
    async fn click(&self, x: i64, y: i64) -> Result<(), ActionError> {
        self.jxa(&click_jxa(x, y)).await.map(|_| ())
    }

    async fn type_text(&self, text: &str) -> Result<(), ActionError> {
        self.osascript(&format!(
            "tell application \"System Events\" to keystroke \"{}\"",
            escape_applescript(text)
        ))
        .await
        .map(|_| ())
    }

    async fn hotkey(&self, keys: &[String]) -> Result<(), ActionError> {
        let script = hotkey_script(keys)?;
        self.osascript(&script).await.map(|_| ())
    }

    async fn key_press(&self, key: &str) -> Result<(), ActionError> {
        self.osascript(&key_press_script(key)).await.map(|_| ())
    }

    async fn scroll(&self, clicks: i64) -> Result<(), ActionError> {
        self.jxa(&scroll_jxa(clicks)).await.map(|_| ())
    }

    async fn screenshot(&self) -> Result<PathBuf, ActionError> {
        let path = std::env::temp_dir().join(format!("ghosty-{}.png", uuid::Uuid::new_v4()));
        self.run(
            "screencapture",
            vec!["-x".to_string(), path.to_string_lossy().to_string()],
        )
        .await?;
        Ok(path)
    }

    async fn screen_size(&self) -> Result<(u32, u32), ActionError> {
        let raw = self.jxa(SCREEN_SIZE_JXA).await?;
        parse_screen_size(&raw)
            .ok_or_else(|| ActionError::Command(format!("unexpected screen size output: {}", raw)))
    }
}
