//! 浏览器控制（AppleScript）
//!
//! 目标浏览器按以下顺序确定并缓存：偏好设置 -> 前台应用（若为已知浏览器）-> 按配置顺序第一个在运行的浏览器 -> 默认浏览器。

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::actions::automation::escape_applescript;
use crate::actions::{AppControl, BrowserControl, InputControl};
use crate::core::ActionError;

/// 支持 `execute ... javascript` 的 Chromium 系浏览器
const CHROME_LIKE: [&str; 5] = [
    "Google Chrome",
    "Brave Browser",
    "Microsoft Edge",
    "Arc",
    "Chromium",
];

const SEARCH_ENDPOINT: &str = "https://www.google.com/search";

fn is_chrome_like(browser: &str) -> bool {
    CHROME_LIKE.contains(&browser)
}

/// 搜索结果页 URL（查询词做表单编码）
pub fn search_url(query: &str) -> Result<String, ActionError> {
    reqwest::Url::parse_with_params(SEARCH_ENDPOINT, &[("q", query)])
        .map(|u| u.to_string())
        .map_err(|e| ActionError::invalid("search", "query", e.to_string()))
}

/// 在指定浏览器中打开 URL 的 AppleScript（复用前台标签页）
pub fn navigate_script(browser: &str, url: &str) -> String {
    let safe_url = url.replace('"', "");
    if is_chrome_like(browser) {
        format!(
            "tell application \"{b}\"\n  activate\n  if (count of windows) = 0 then make new window\n  set URL of active tab of front window to \"{u}\"\nend tell",
            b = browser,
            u = safe_url
        )
    } else if browser == "Safari" {
        format!(
            "tell application \"Safari\"\n  activate\n  if (count of windows) = 0 then\n    make new document with properties {{URL:\"{u}\"}}\n  else\n    set URL of current tab of front window to \"{u}\"\n  end if\nend tell",
            u = safe_url
        )
    } else {
        format!(
            "tell application \"{b}\"\n  activate\n  open location \"{u}\"\nend tell",
            b = browser,
            u = safe_url
        )
    }
}

/// AppleScript 浏览器控制
pub struct AppleScriptBrowser {
    apps: Arc<dyn AppControl>,
    input: Arc<dyn InputControl>,
    order: Vec<String>,
    fallback: String,
    preferred: Mutex<Option<String>>,
    active: Mutex<Option<String>>,
}

impl AppleScriptBrowser {
    pub fn new(
        apps: Arc<dyn AppControl>,
        input: Arc<dyn InputControl>,
        order: Vec<String>,
        fallback: String,
    ) -> Self {
        Self {
            apps,
            input,
            order,
            fallback,
            preferred: Mutex::new(None),
            active: Mutex::new(None),
        }
    }

    fn cached(&self) -> Option<String> {
        self.active.lock().ok().and_then(|a| a.clone())
    }

    fn remember(&self, browser: &str) -> String {
        if let Ok(mut active) = self.active.lock() {
            *active = Some(browser.to_string());
        }
        browser.to_string()
    }

    /// 确定要操作的浏览器
    pub async fn detect(&self) -> String {
        if let Some(browser) = self.cached() {
            return browser;
        }

        let preferred = self.preferred.lock().ok().and_then(|p| p.clone());
        if let Some(browser) = preferred {
            tracing::info!(browser = %browser, "using preferred browser");
            return self.remember(&browser);
        }

        if let Ok(front) = self.apps.frontmost_app().await {
            if self.order.iter().any(|b| *b == front) {
                tracing::info!(browser = %front, "using frontmost browser");
                return self.remember(&front);
            }
        }

        if let Ok(running) = self.apps.running_apps().await {
            if let Some(browser) = self.order.iter().find(|b| running.contains(b)) {
                tracing::info!(browser = %browser, "using running browser");
                return self.remember(browser);
            }
        }

        tracing::info!(browser = %self.fallback, "defaulting browser");
        self.remember(&self.fallback)
    }

    async fn ensure_front(&self) -> Result<String, ActionError> {
        let browser = self.detect().await;
        self.apps.switch_to_app(&browser).await?;
        tokio::time::sleep(Duration::from_millis(500)).await;
        Ok(browser)
    }

    async fn run_javascript(&self, browser: &str, js: &str) -> Result<String, ActionError> {
        let escaped = escape_applescript(js);
        let script = if is_chrome_like(browser) {
            format!(
                "tell application \"{}\" to execute active tab of front window javascript \"{}\"",
                browser, escaped
            )
        } else if browser == "Safari" {
            format!(
                "tell application \"Safari\" to do JavaScript \"{}\" in current tab of front window",
                escaped
            )
        } else {
            return Err(ActionError::Unavailable(format!(
                "JavaScript automation in {}",
                browser
            )));
        };
        self.apps.run_script(&script).await
    }
}

#[async_trait]
impl BrowserControl for AppleScriptBrowser {
    async fn navigate(&self, url: &str) -> Result<(), ActionError> {
        let browser = self.detect().await;
        self.apps.run_script(&navigate_script(&browser, url)).await?;
        tracing::info!(browser = %browser, url = %url, "navigated");
        Ok(())
    }

    async fn search(&self, query: &str) -> Result<(), ActionError> {
        let url = search_url(query)?;
        self.navigate(&url).await
    }

    async fn new_tab(&self) -> Result<(), ActionError> {
        self.ensure_front().await?;
        self.input
            .hotkey(&["command".to_string(), "t".to_string()])
            .await
    }

    async fn focus_url_bar(&self) -> Result<(), ActionError> {
        self.ensure_front().await?;
        self.input
            .hotkey(&["command".to_string(), "l".to_string()])
            .await
    }

    async fn click_selector(&self, selector: &str) -> Result<(), ActionError> {
        let browser = self.ensure_front().await?;
        let js = format!("document.querySelector('{}').click()", selector);
        self.run_javascript(&browser, &js).await.map(|_| ())
    }

    async fn type_in_page(&self, selector: &str, text: &str) -> Result<(), ActionError> {
        let browser = self.ensure_front().await?;
        let js = format!("document.querySelector('{}').focus()", selector);
        if let Err(e) = self.run_javascript(&browser, &js).await {
            tracing::warn!(selector = %selector, error = %e, "focus via JavaScript failed");
            let lower = selector.to_lowercase();
            if ["search", "name='q'", "name=\"q\"", "query"]
                .iter()
                .any(|hint| lower.contains(hint))
            {
                self.input
                    .hotkey(&["command".to_string(), "l".to_string()])
                    .await?;
            }
        }
        self.input.type_text(text).await
    }

    fn set_preferred_browser(&self, name: &str) {
        if let Ok(mut preferred) = self.preferred.lock() {
            *preferred = Some(name.to_string());
        }
        // 清掉检测缓存，偏好立即生效
        if let Ok(mut active) = self.active.lock() {
            *active = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::RecordingDesktop;

    fn browser(desktop: Arc<RecordingDesktop>) -> AppleScriptBrowser {
        AppleScriptBrowser::new(
            desktop.clone(),
            desktop,
            vec!["Google Chrome".to_string(), "Safari".to_string(), "Firefox".to_string()],
            "Safari".to_string(),
        )
    }

    #[test]
    fn test_search_url_encodes_query() {
        assert_eq!(
            search_url("rust async & tokio").unwrap(),
            "https://www.google.com/search?q=rust+async+%26+tokio"
        );
    }

    #[test]
    fn test_navigate_script_per_browser_family() {
        assert!(navigate_script("Arc", "https://a.b").contains("active tab of front window"));
        assert!(navigate_script("Safari", "https://a.b").contains("current tab of front window"));
        assert!(navigate_script("Firefox", "https://a.b").contains("open location"));
        assert!(!navigate_script("Safari", "https://a.b/\"x").contains("\"x"));
    }

    #[tokio::test]
    async fn test_detect_prefers_frontmost_browser() {
        let desktop = Arc::new(
            RecordingDesktop::new()
                .with_frontmost("Firefox")
                .with_running(&["Safari", "Firefox"]),
        );
        assert_eq!(browser(desktop).detect().await, "Firefox");
    }

    #[tokio::test]
    async fn test_detect_uses_configured_order_for_running_browsers() {
        let desktop = Arc::new(
            RecordingDesktop::new()
                .with_frontmost("Notes")
                .with_running(&["Firefox", "Safari"]),
        );
        assert_eq!(browser(desktop).detect().await, "Safari");
    }

    #[tokio::test]
    async fn test_preferred_browser_overrides_detection() {
        let desktop = Arc::new(RecordingDesktop::new().with_frontmost("Firefox"));
        let b = browser(desktop);
        assert_eq!(b.detect().await, "Firefox");
        b.set_preferred_browser("Arc");
        assert_eq!(b.detect().await, "Arc");
    }

    #[tokio::test]
    async fn test_falls_back_to_default() {
        let desktop = Arc::new(RecordingDesktop::new().with_frontmost("Notes"));
        assert_eq!(browser(desktop).detect().await, "Safari");
    }
}
