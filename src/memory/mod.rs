//! 记忆层：跨运行保留的用户偏好

pub mod preferences;

pub use preferences::{
    extract_preferences, normalize_browser, JsonFilePreferenceStore, NoopPreferenceStore,
    PreferenceError, PreferenceStore, Preferences, DEFAULT_APP, PREFERRED_BROWSER,
};
