use crate::page::encoding_from_charset;
use crate::session::TraceFlags;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const PROJECT_CONFIG_FILE: &str = "webreplay.toml";

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub browser: BrowserSection,
    #[serde(default)]
    pub trace: TraceSection,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_name")]
    pub name: String,
    /// Prefix prepended verbatim to the session name to form the artifact
    /// directory (e.g. `"recordings/"`).
    #[serde(default)]
    pub file_prefix: String,
    pub user_agent: Option<String>,
    /// Persist every fetched page under the session directory.
    #[serde(default)]
    pub save_to_file: bool,
    /// Replay previously saved pages instead of touching the network.
    #[serde(default)]
    pub not_use_network: bool,
    /// Charset label forced over response headers (e.g. `"shift_jis"`).
    pub encoding: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: default_session_name(),
            file_prefix: String::new(),
            user_agent: None,
            save_to_file: false,
            not_use_network: false,
            encoding: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrowserSection {
    #[serde(default = "default_headless")]
    pub headless: bool,
    pub chrome_path: Option<PathBuf>,
    pub user_data_dir: Option<PathBuf>,
    #[serde(default = "default_window_width")]
    pub window_width: u32,
    #[serde(default = "default_window_height")]
    pub window_height: u32,
    #[serde(default = "default_navigation_timeout")]
    pub navigation_timeout_secs: u64,
    pub action_timeout_secs: Option<u64>,
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,
}

impl Default for BrowserSection {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            chrome_path: None,
            user_data_dir: None,
            window_width: default_window_width(),
            window_height: default_window_height(),
            navigation_timeout_secs: default_navigation_timeout(),
            action_timeout_secs: None,
            download_timeout_secs: default_download_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct TraceSection {
    #[serde(default)]
    pub request_headers: bool,
    #[serde(default)]
    pub response_headers: bool,
    #[serde(default)]
    pub form_posting: bool,
}

impl TraceSection {
    pub fn flags(&self) -> TraceFlags {
        TraceFlags {
            request_headers: self.request_headers,
            response_headers: self.response_headers,
            form_posting: self.form_posting,
        }
    }
}

fn default_session_name() -> String {
    "session".to_string()
}
fn default_headless() -> bool {
    true
}
fn default_window_width() -> u32 {
    1280
}
fn default_window_height() -> u32 {
    800
}
fn default_navigation_timeout() -> u64 {
    30
}
fn default_download_timeout() -> u64 {
    60
}

impl Config {
    /// Loads `webreplay.toml` from the working directory when present, then
    /// applies `WEBREPLAY_*` environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        let path = PathBuf::from(PROJECT_CONFIG_FILE);
        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            config = toml::from_str(&content)?;
        }

        config.load_from_env();
        config.validate()?;
        Ok(config)
    }

    fn load_from_env(&mut self) {
        if let Ok(name) = std::env::var("WEBREPLAY_SESSION_NAME") {
            self.session.name = name;
        }
        if let Ok(prefix) = std::env::var("WEBREPLAY_FILE_PREFIX") {
            self.session.file_prefix = prefix;
        }
        if let Ok(ua) = std::env::var("WEBREPLAY_USER_AGENT") {
            self.session.user_agent = Some(ua);
        }
        if let Ok(v) = std::env::var("WEBREPLAY_SAVE_TO_FILE") {
            self.session.save_to_file = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("WEBREPLAY_NOT_USE_NETWORK") {
            self.session.not_use_network = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("WEBREPLAY_HEADLESS") {
            self.browser.headless = v == "true" || v == "1";
        }
        if let Ok(path) = std::env::var("WEBREPLAY_CHROME_PATH") {
            self.browser.chrome_path = Some(PathBuf::from(path));
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.session.name.is_empty() {
            return Err(Error::Config("session name must not be empty".into()));
        }
        if let Some(label) = &self.session.encoding
            && !label.eq_ignore_ascii_case("utf-8")
            && encoding_from_charset(label).is_none()
        {
            return Err(Error::Config(format!("unknown encoding label {label:?}")));
        }
        if self.browser.window_width == 0 || self.browser.window_height == 0 {
            return Err(Error::Config("window size must be non-zero".into()));
        }
        if self.browser.navigation_timeout_secs == 0 {
            return Err(Error::Config(
                "navigation_timeout_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
