//! 用户偏好：存储接口、JSON 文件实现与从意图中抽取偏好
//!
//! 运行开始时按意图加载一次，运行结束时把从意图中抽取到的新偏好合并后保存；运行中不修改。

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use thiserror::Error;

/// 偏好键值表
pub type Preferences = BTreeMap<String, String>;

pub const PREFERRED_BROWSER: &str = "preferred_browser";
pub const DEFAULT_APP: &str = "default_app";

#[derive(Error, Debug)]
pub enum PreferenceError {
    #[error("preference store I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("preference store format: {0}")]
    Format(#[from] serde_json::Error),
}

#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// 查询与意图相关的偏好
    async fn load(&self, intent: &str) -> Result<Preferences, PreferenceError>;

    async fn save(&self, prefs: &Preferences) -> Result<(), PreferenceError>;
}

/// 不保存任何偏好
#[derive(Debug, Default)]
pub struct NoopPreferenceStore;

#[async_trait]
impl PreferenceStore for NoopPreferenceStore {
    async fn load(&self, _intent: &str) -> Result<Preferences, PreferenceError> {
        Ok(Preferences::new())
    }

    async fn save(&self, _prefs: &Preferences) -> Result<(), PreferenceError> {
        Ok(())
    }
}

/// 单个 JSON 文件保存全部偏好；本地存储不做检索，load 返回全部键
#[derive(Debug)]
pub struct JsonFilePreferenceStore {
    path: PathBuf,
}

impl JsonFilePreferenceStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PreferenceStore for JsonFilePreferenceStore {
    async fn load(&self, _intent: &str) -> Result<Preferences, PreferenceError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => Ok(serde_json::from_str(&data)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Preferences::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// 先写临时文件再 rename，父目录不存在时自动创建
    async fn save(&self, prefs: &Preferences) -> Result<(), PreferenceError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_string_pretty(prefs)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        tracing::info!(path = %self.path.display(), count = prefs.len(), "saved preferences");
        Ok(())
    }
}

struct PreferencePattern {
    regex: Regex,
    key: &'static str,
}

static PATTERNS: OnceLock<Vec<PreferencePattern>> = OnceLock::new();

fn patterns() -> &'static [PreferencePattern] {
    PATTERNS.get_or_init(|| {
        vec![
            PreferencePattern {
                regex: Regex::new(
                    r"(?:use|prefer|switch to|set)\s+(\w[\w\s]*?)\s+(?:as|for|instead of)\s+(?:my\s+)?browser",
                )
                .unwrap(),
                key: PREFERRED_BROWSER,
            },
            PreferencePattern {
                regex: Regex::new(r"(?:use|prefer|switch to)\s+(chrome|safari|arc|brave|firefox|edge)")
                    .unwrap(),
                key: PREFERRED_BROWSER,
            },
            PreferencePattern {
                regex: Regex::new(r"(?:always|default)\s+(?:use|open with)\s+(\w[\w\s]*?)(?:\s|$)")
                    .unwrap(),
                key: DEFAULT_APP,
            },
        ]
    })
}

/// 浏览器简称 -> 应用名；未知名称按单词首字母大写
pub fn normalize_browser(name: &str) -> String {
    match name.trim().to_lowercase().as_str() {
        "chrome" => "Google Chrome".to_string(),
        "safari" => "Safari".to_string(),
        "arc" => "Arc".to_string(),
        "brave" => "Brave Browser".to_string(),
        "firefox" => "Firefox".to_string(),
        "edge" => "Microsoft Edge".to_string(),
        other => title_case(other),
    }
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// 从意图中抽取偏好；没有匹配时返回空表
pub fn extract_preferences(intent: &str) -> Preferences {
    let lower = intent.to_lowercase();
    let mut prefs = Preferences::new();
    for pattern in patterns() {
        let Some(value) = pattern
            .regex
            .captures(&lower)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
        else {
            continue;
        };
        let value = if pattern.key == PREFERRED_BROWSER {
            normalize_browser(&value)
        } else {
            value
        };
        prefs.insert(pattern.key.to_string(), value);
    }
    prefs
}
