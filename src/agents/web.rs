//! Web agent：导航、搜索、标签页与页面内操作

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;

use crate::actions::BrowserControl;
use crate::agents::{Agent, AgentTask};
use crate::core::ActionError;
use crate::planning::Params;

static QUERY_RE: OnceLock<Regex> = OnceLock::new();

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebCommand {
    /// 打开 url，随后可选地搜索或在页面内输入
    Navigate {
        url: String,
        query: Option<String>,
        fill: Option<(String, String)>,
    },
    Search(String),
    NewTab,
    FocusUrlBar,
    TypeInPage { selector: String, text: String },
    ClickSelector(String),
}

/// 按参数分发：url > query > action > selector(+text) > text
pub fn from_params(params: &Params) -> Option<WebCommand> {
    let query = params.text("query").map(str::to_string);
    let selector = params.text("selector");
    let text = params.text("text");

    if let Some(url) = params.text("url") {
        let fill = match (&query, selector, text) {
            (None, Some(s), Some(t)) => Some((s.to_string(), t.to_string())),
            _ => None,
        };
        return Some(WebCommand::Navigate {
            url: url.to_string(),
            query,
            fill,
        });
    }
    if let Some(query) = query {
        return Some(WebCommand::Search(query));
    }
    match params.text("action") {
        Some("new_tab") => return Some(WebCommand::NewTab),
        Some("focus_url_bar") => return Some(WebCommand::FocusUrlBar),
        _ => {}
    }
    match (selector, text) {
        (Some(s), Some(t)) => Some(WebCommand::TypeInPage {
            selector: s.to_string(),
            text: t.to_string(),
        }),
        (Some(s), None) => Some(WebCommand::ClickSelector(s.to_string())),
        (None, Some(t)) => Some(WebCommand::Search(t.to_string())),
        (None, None) => None,
    }
}

/// "search for X" / "look up X" / "google X" / "find X" 中的 X
pub fn extract_search_query(text: &str) -> Option<String> {
    let re = QUERY_RE.get_or_init(|| {
        Regex::new(r#"(?i)(?:search\s+for|search|look\s+up|google|find)\s+["']?(.+?)["']?\s*$"#)
            .unwrap()
    });
    let query = re
        .captures(text)?
        .get(1)?
        .as_str()
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'');
    (!query.is_empty()).then(|| query.to_string())
}

/// 没有可用参数时从任务文本推断：先找搜索词（任务，再原始请求），再找 "open/go to/navigate" 后的域名
pub fn infer_from_task(task: &str, intent: &str) -> Option<WebCommand> {
    if let Some(query) = extract_search_query(task).or_else(|| extract_search_query(intent)) {
        return Some(WebCommand::Search(query));
    }

    let lower = task.to_lowercase();
    if !["navigate", "open", "go to"].iter().any(|k| lower.contains(k)) {
        return None;
    }
    task.split_whitespace()
        .map(|w| w.trim_end_matches(|c: char| matches!(c, '.' | ',' | ';' | '!' | '?')))
        .find(|w| w.contains('.') && !w.chars().take(4).any(|c| c == '/'))
        .map(|w| {
            let url = if w.starts_with("http") {
                w.to_string()
            } else {
                format!("https://{}", w)
            };
            WebCommand::Navigate {
                url,
                query: None,
                fill: None,
            }
        })
}

pub struct WebAgent {
    browser: Arc<dyn BrowserControl>,
    settle: Duration,
}

impl WebAgent {
    pub fn new(browser: Arc<dyn BrowserControl>) -> Self {
        Self {
            browser,
            settle: Duration::ZERO,
        }
    }

    /// 页面加载等待
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    async fn apply(&self, command: WebCommand) -> Result<String, ActionError> {
        match command {
            WebCommand::Navigate { url, query, fill } => {
                self.browser.navigate(&url).await?;
                tokio::time::sleep(self.settle).await;
                if let Some(query) = query {
                    self.browser.search(&query).await?;
                    return Ok(format!("Navigated to {} and searched for '{}'", url, query));
                }
                if let Some((selector, text)) = fill {
                    self.browser.type_in_page(&selector, &text).await?;
                }
                Ok(format!("Navigated to {}", url))
            }
            WebCommand::Search(query) => {
                self.browser.search(&query).await?;
                Ok(format!("Searched for '{}'", query))
            }
            WebCommand::NewTab => {
                self.browser.new_tab().await?;
                Ok("Opened new tab".to_string())
            }
            WebCommand::FocusUrlBar => {
                self.browser.focus_url_bar().await?;
                Ok("Focused URL bar".to_string())
            }
            WebCommand::TypeInPage { selector, text } => {
                self.browser.type_in_page(&selector, &text).await?;
                Ok(format!("Typed '{}' into '{}'", text, selector))
            }
            WebCommand::ClickSelector(selector) => {
                self.browser.click_selector(&selector).await?;
                Ok(format!("Clicked '{}'", selector))
            }
        }
    }
}

#[async_trait]
impl Agent for WebAgent {
    fn name(&self) -> &'static str {
        "web"
    }

    async fn execute(&self, task: &AgentTask<'_>) -> Result<String, ActionError> {
        let command = from_params(task.params).or_else(|| infer_from_task(task.task, task.intent));
        match command {
            Some(command) => self.apply(command).await,
            None => Ok(format!("Web task handled: {}", task.task)),
        }
    }
}
