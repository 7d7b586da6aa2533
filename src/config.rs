//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `GHOSTY__*` 覆盖（双下划线表示嵌套，如 `GHOSTY__LLM__PROVIDER=openai`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub safety: SafetySection,
    #[serde(default)]
    pub tools: ToolsSection,
    #[serde(default)]
    pub memory: MemorySection,
}

/// 编排形态：一次性规划 + 失败重规划，或 supervisor 逐步路由
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Plan,
    Supervisor,
}

/// [app] 段：运行形态与状态目录
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    #[serde(default)]
    pub mode: RunMode,
    /// 状态文件与偏好文件所在目录，未设置时用 ~/ghosty
    pub state_dir: Option<PathBuf>,
}

impl AppSection {
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("ghosty")
        })
    }

    /// UI 轮询的状态文件
    pub fn state_file(&self) -> PathBuf {
        self.state_dir().join("state.json")
    }
}

/// [llm] 段：后端选择、温度、token 预算与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：ollama / openai / mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default = "default_plan_temperature")]
    pub plan_temperature: f32,
    #[serde(default = "default_replan_temperature")]
    pub replan_temperature: f32,
    #[serde(default = "default_plan_temperature")]
    pub route_temperature: f32,
    #[serde(default = "default_token_budget")]
    pub token_budget: u32,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            plan_temperature: default_plan_temperature(),
            replan_temperature: default_replan_temperature(),
            route_temperature: default_plan_temperature(),
            token_budget: default_token_budget(),
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

fn default_provider() -> String {
    "ollama".to_string()
}

fn default_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_plan_temperature() -> f32 {
    0.1
}

fn default_replan_temperature() -> f32 {
    0.2
}

fn default_token_budget() -> u32 {
    1024
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    /// 单次规划请求超时（秒）
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

/// [safety] 段：步数、总时长、supervisor 重试次数与步间节奏
#[derive(Debug, Clone, Deserialize)]
pub struct SafetySection {
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    #[serde(default = "default_max_duration_secs")]
    pub max_duration_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// 普通步骤之间的停顿（毫秒）；wait / done 之后不停顿
    #[serde(default = "default_step_pacing_ms")]
    pub step_pacing_ms: u64,
    /// wait 步骤允许的最长等待（秒）
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: f64,
}

impl Default for SafetySection {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            max_duration_secs: default_max_duration_secs(),
            max_retries: default_max_retries(),
            step_pacing_ms: default_step_pacing_ms(),
            max_wait_secs: default_max_wait_secs(),
        }
    }
}

impl SafetySection {
    pub fn max_duration(&self) -> Duration {
        Duration::from_secs(self.max_duration_secs)
    }

    pub fn step_pacing(&self) -> Duration {
        Duration::from_millis(self.step_pacing_ms)
    }
}

fn default_max_steps() -> usize {
    20
}

fn default_max_duration_secs() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    2
}

fn default_step_pacing_ms() -> u64 {
    300
}

fn default_max_wait_secs() -> f64 {
    10.0
}

/// [tools] 段：脚本/命令超时、Shell 白名单、浏览器顺序、视觉定位服务
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 单次 osascript / open 调用超时（秒）
    #[serde(default = "default_script_timeout_secs")]
    pub script_timeout_secs: u64,
    /// 单次 Shell 命令超时（秒）
    #[serde(default = "default_shell_timeout_secs")]
    pub shell_timeout_secs: u64,
    #[serde(default)]
    pub shell: ShellSection,
    #[serde(default)]
    pub browser: BrowserSection,
    #[serde(default)]
    pub grounding: GroundingSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            script_timeout_secs: default_script_timeout_secs(),
            shell_timeout_secs: default_shell_timeout_secs(),
            shell: ShellSection::default(),
            browser: BrowserSection::default(),
            grounding: GroundingSection::default(),
        }
    }
}

fn default_script_timeout_secs() -> u64 {
    10
}

fn default_shell_timeout_secs() -> u64 {
    15
}

/// [tools.shell] 段：允许执行的命令名（仅首词）
#[derive(Debug, Clone, Deserialize)]
pub struct ShellSection {
    #[serde(default = "default_allowed_commands")]
    pub allowed_commands: Vec<String>,
}

impl Default for ShellSection {
    fn default() -> Self {
        Self {
            allowed_commands: default_allowed_commands(),
        }
    }
}

fn default_allowed_commands() -> Vec<String> {
    [
        "open", "mdfind", "defaults", "pmset", "mv", "cp", "mkdir", "ls", "cat", "head", "tail",
        "wc", "sort", "find", "which", "whoami", "date", "cal", "df", "du", "file", "mdls",
        "xattr", "stat", "say", "afplay", "screencapture", "osascript", "system_profiler",
        "networksetup", "scutil", "sw_vers", "uname",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// [tools.browser] 段：检测顺序与兜底浏览器
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserSection {
    #[serde(default = "default_browser_order")]
    pub order: Vec<String>,
    #[serde(default = "default_browser")]
    pub default: String,
}

impl Default for BrowserSection {
    fn default() -> Self {
        Self {
            order: default_browser_order(),
            default: default_browser(),
        }
    }
}

fn default_browser_order() -> Vec<String> {
    [
        "Google Chrome",
        "Safari",
        "Arc",
        "Brave Browser",
        "Microsoft Edge",
        "Firefox",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_browser() -> String {
    "Safari".to_string()
}

/// [tools.grounding] 段：视觉定位服务（截图 + 指令 -> 坐标）；未配置时 click_element 跳过
#[derive(Debug, Clone, Deserialize)]
pub struct GroundingSection {
    pub endpoint: Option<String>,
    #[serde(default = "default_grounding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GroundingSection {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: default_grounding_timeout_secs(),
        }
    }
}

fn default_grounding_timeout_secs() -> u64 {
    30
}

/// [memory] 段：偏好存储
#[derive(Debug, Clone, Deserialize)]
pub struct MemorySection {
    #[serde(default = "default_memory_enabled")]
    pub enabled: bool,
    /// 偏好文件，未设置时用 <state_dir>/preferences.json
    pub preferences_file: Option<PathBuf>,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            enabled: default_memory_enabled(),
            preferences_file: None,
        }
    }
}

fn default_memory_enabled() -> bool {
    true
}

/// 从 config 目录加载配置，环境变量 GHOSTY__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 GHOSTY__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("GHOSTY")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
