//! 计划的数据模型：Step（动作标签 + 参数）与 Plan（有界的步骤序列）
//!
//! 动作标签取自封闭且带版本的词表；不认识的标签在语法上合法，执行时作为 no-op 并告警，
//! 这样词表可以向前扩展而不破坏旧计划。

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::ActionError;

/// done 步骤未给出 message 时的默认最终消息
pub const DEFAULT_DONE_MESSAGE: &str = "Task complete.";

/// 动作词表
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Action {
    OpenApp,
    SwitchToApp,
    OpenUrl,
    OpenFile,
    ClickElement,
    TypeText,
    Hotkey,
    KeyPress,
    Scroll,
    RunScript,
    Wait,
    Done,
    /// 词表之外的标签，原样保留
    Unknown(String),
}

impl Action {
    pub fn parse(tag: &str) -> Self {
        match tag.trim() {
            "open_app" => Self::OpenApp,
            "switch_to_app" => Self::SwitchToApp,
            "open_url" => Self::OpenUrl,
            "open_file" => Self::OpenFile,
            "click_element" => Self::ClickElement,
            "type_text" => Self::TypeText,
            "hotkey" => Self::Hotkey,
            "key_press" => Self::KeyPress,
            "scroll" => Self::Scroll,
            // 旧版词表里叫 applescript
            "run_script" | "applescript" => Self::RunScript,
            "wait" => Self::Wait,
            "done" => Self::Done,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::OpenApp => "open_app",
            Self::SwitchToApp => "switch_to_app",
            Self::OpenUrl => "open_url",
            Self::OpenFile => "open_file",
            Self::ClickElement => "click_element",
            Self::TypeText => "type_text",
            Self::Hotkey => "hotkey",
            Self::KeyPress => "key_press",
            Self::Scroll => "scroll",
            Self::RunScript => "run_script",
            Self::Wait => "wait",
            Self::Done => "done",
            Self::Unknown(tag) => tag,
        }
    }

    /// wait / done 自带时序语义：不计入执行记录，之后也不做步间停顿
    pub fn is_timing_only(&self) -> bool {
        matches!(self, Self::Wait | Self::Done)
    }
}

impl From<String> for Action {
    fn from(tag: String) -> Self {
        Self::parse(&tag)
    }
}

impl From<Action> for String {
    fn from(action: Action) -> Self {
        action.as_str().to_string()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 步骤或路由决策的参数表；值为任意 JSON，按键取用时做宽松转换
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(Map<String, Value>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// 非空字符串参数；空串视同缺省
    pub fn text(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    pub fn require_text(&self, action: &str, key: &str) -> Result<&str, ActionError> {
        self.text(key).ok_or_else(|| ActionError::missing(action, key))
    }

    /// 数值参数，接受 JSON 数字或可解析的数字字符串
    pub fn number(&self, key: &str) -> Option<f64> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// 按键序列：既可以是已拆好的数组，也可以是 "command+t" 这样用 + 连接的字符串
    pub fn key_list(&self, key: &str) -> Vec<String> {
        match self.0.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect(),
            Some(Value::String(joined)) => split_keys(joined),
            _ => Vec::new(),
        }
    }

    pub fn to_json(&self) -> String {
        Value::Object(self.0.clone()).to_string()
    }
}

/// "command + shift+t" -> ["command", "shift", "t"]
pub fn split_keys(joined: &str) -> Vec<String> {
    joined
        .split('+')
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect()
}

/// 一个原子动作及其参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub action: Action,
    #[serde(default)]
    pub params: Params,
}

impl Step {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            params: Params::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key, value);
        self
    }

    /// 终止步骤，携带最终消息
    pub fn done(message: impl Into<String>) -> Self {
        Self::new(Action::Done).with_param("message", message.into())
    }

    /// 从任意 JSON 值构造：必须是含字符串 action 的对象；params 缺省或为 null 时视为空
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let action = obj.get("action")?.as_str()?;
        let params = match obj.get("params") {
            None | Some(Value::Null) => Params::new(),
            Some(Value::Object(map)) => Params::from_map(map.clone()),
            Some(_) => return None,
        };
        Some(Self {
            action: Action::parse(action),
            params,
        })
    }

    /// done 步骤的最终消息
    pub fn done_message(&self) -> String {
        self.params
            .text("message")
            .unwrap_or(DEFAULT_DONE_MESSAGE)
            .to_string()
    }

    /// 供 UI 展示的一句话描述
    pub fn describe(&self) -> String {
        let p = &self.params;
        match &self.action {
            Action::OpenApp => format!("Opening {}...", p.text("name").unwrap_or("app")),
            Action::SwitchToApp => format!("Switching to {}...", p.text("name").unwrap_or("app")),
            Action::ClickElement => format!(
                "Clicking {}...",
                p.text("description").unwrap_or("element")
            ),
            Action::TypeText => "Typing text...".to_string(),
            Action::Hotkey => {
                let keys = p.key_list("keys");
                if keys.is_empty() {
                    "Pressing keys...".to_string()
                } else {
                    format!("Pressing {}...", keys.join("+"))
                }
            }
            Action::KeyPress => format!("Pressing {}...", p.text("key").unwrap_or("key")),
            Action::Scroll => format!("Scrolling {}...", p.text("direction").unwrap_or("down")),
            Action::OpenUrl => "Opening URL...".to_string(),
            Action::OpenFile => "Opening file...".to_string(),
            Action::RunScript => "Running AppleScript...".to_string(),
            Action::Wait => "Waiting...".to_string(),
            Action::Done => self.done_message(),
            Action::Unknown(tag) => format!("Executing {}...", tag),
        }
    }
}

/// 有界计划：长度永远不超过步数上限；超出部分被截掉并记为 overflowed
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    steps: Vec<Step>,
    ceiling: usize,
    overflowed: bool,
}

impl Plan {
    pub fn bounded(mut steps: Vec<Step>, ceiling: usize) -> Self {
        let overflowed = steps.len() > ceiling;
        steps.truncate(ceiling);
        Self {
            steps,
            ceiling,
            overflowed,
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// 规划结果是否因步数上限被截断
    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    /// 保留 [0, index] 的步骤，其后整体替换为 suffix；已执行的步骤不会被改动或重排
    pub fn splice_after(&mut self, index: usize, suffix: Vec<Step>) {
        self.steps.truncate(index.saturating_add(1));
        self.steps.extend(suffix);
        self.overflowed = self.steps.len() > self.ceiling;
        self.steps.truncate(self.ceiling);
    }
}
