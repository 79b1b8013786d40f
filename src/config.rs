use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading or validating a config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("missing required key `{0}`")]
    MissingKey(&'static str),
    #[error("`TRIGGERS` must contain at least one trigger")]
    EmptyTriggers,
    #[error("trigger #{0} is blank")]
    BlankTrigger(usize),
    #[error("`REPLY_TEXT` must not be blank")]
    EmptyReply,
    #[error("invalid setting `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// `.json` files are JSON; everything else is read as TOML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ConfigFormat::Json,
            _ => ConfigFormat::Toml,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub triggers: Vec<String>,
    pub reply_text: String,
    pub chat: ChatConfig,
    pub monitor: MonitorConfig,
    pub server: ServerConfig,
}

/// Where the chat lives and how to find things on the page.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ChatConfig {
    pub url: String,
    /// Selector for the text node of each rendered message.
    pub message_selector: String,
    pub input_selector: String,
    /// DevTools endpoint of an already running browser. When set the session
    /// attaches to it instead of launching a new one.
    pub debugger_url: Option<String>,
    pub user_data_dir: PathBuf,
    pub headless: bool,
    pub login_wait_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            url: "https://discord.com/app".to_string(),
            message_selector: "li[class*='messageListItem'] div[class*='messageContent']"
                .to_string(),
            input_selector: "div[role='textbox']".to_string(),
            debugger_url: None,
            user_data_dir: PathBuf::from("browser-profile"),
            headless: false,
            login_wait_secs: 0,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct MonitorConfig {
    pub poll_interval_ms: u64,
    pub call_timeout_ms: u64,
    /// Consecutive failed polls before the session is reported lost.
    pub session_lost_after: u32,
    /// Treat messages already on screen at start as seen.
    pub skip_existing: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1500,
            call_timeout_ms: 10_000,
            session_lost_after: 5,
            skip_existing: true,
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Delay before `run` asks the server to start monitoring.
    pub start_delay_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 5000)),
            start_delay_secs: 2,
        }
    }
}

// Loose shape of the file; required keys are checked in `Config::validate`.
#[derive(Deserialize)]
struct RawConfig {
    #[serde(rename = "TRIGGERS", alias = "triggers")]
    triggers: Option<Vec<String>>,
    #[serde(rename = "REPLY_TEXT", alias = "reply_text")]
    reply_text: Option<String>,
    #[serde(default)]
    chat: ChatConfig,
    #[serde(default)]
    monitor: MonitorConfig,
    #[serde(default)]
    server: ServerConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, ConfigFormat::from_path(path))
    }

    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self, ConfigError> {
        let raw: RawConfig = match format {
            ConfigFormat::Toml => {
                toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?
            }
            ConfigFormat::Json => {
                serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?
            }
        };
        Self::validate(raw)
    }

    fn validate(raw: RawConfig) -> Result<Self, ConfigError> {
        let triggers = raw.triggers.ok_or(ConfigError::MissingKey("TRIGGERS"))?;
        if triggers.is_empty() {
            return Err(ConfigError::EmptyTriggers);
        }
        if let Some(index) = triggers.iter().position(|t| t.trim().is_empty()) {
            return Err(ConfigError::BlankTrigger(index));
        }

        let reply_text = raw.reply_text.ok_or(ConfigError::MissingKey("REPLY_TEXT"))?;
        if reply_text.trim().is_empty() {
            return Err(ConfigError::EmptyReply);
        }

        if let Err(e) = url::Url::parse(&raw.chat.url) {
            return Err(ConfigError::Invalid {
                key: "chat.url",
                reason: e.to_string(),
            });
        }
        if raw.chat.message_selector.trim().is_empty() {
            return Err(invalid("chat.message_selector", "must not be empty"));
        }
        if raw.chat.input_selector.trim().is_empty() {
            return Err(invalid("chat.input_selector", "must not be empty"));
        }
        if raw.monitor.poll_interval_ms == 0 {
            return Err(invalid("monitor.poll_interval_ms", "must be positive"));
        }
        if raw.monitor.call_timeout_ms == 0 {
            return Err(invalid("monitor.call_timeout_ms", "must be positive"));
        }
        if raw.monitor.session_lost_after == 0 {
            return Err(invalid("monitor.session_lost_after", "must be positive"));
        }

        Ok(Config {
            triggers,
            reply_text,
            chat: raw.chat,
            monitor: raw.monitor,
            server: raw.server,
        })
    }
}

fn invalid(key: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn toml(content: &str) -> Result<Config, ConfigError> {
        Config::parse(content, ConfigFormat::Toml)
    }

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let config = toml(
            r#"
TRIGGERS = ["@team", "urgent help"]
REPLY_TEXT = "Team Take"
"#,
        )
        .unwrap();

        assert_eq!(config.triggers, vec!["@team", "urgent help"]);
        assert_eq!(config.reply_text, "Team Take");
        assert_eq!(config.monitor.poll_interval(), Duration::from_millis(1500));
        assert!(config.monitor.skip_existing);
        assert_eq!(config.chat.input_selector, "div[role='textbox']");
        assert!(config.chat.debugger_url.is_none());
        assert_eq!(config.server.bind.port(), 5000);
    }

    #[test]
    fn test_json_with_uppercase_keys() {
        let config = Config::parse(
            r#"{"TRIGGERS": ["@team"], "REPLY_TEXT": "on it", "monitor": {"poll_interval_ms": 250}}"#,
            ConfigFormat::Json,
        )
        .unwrap();

        assert_eq!(config.triggers, vec!["@team"]);
        assert_eq!(config.monitor.poll_interval_ms, 250);
        assert_eq!(config.monitor.call_timeout_ms, 10_000);
    }

    #[test]
    fn test_lowercase_aliases_accepted() {
        let config = toml("triggers = [\"hi\"]\nreply_text = \"hello\"\n").unwrap();
        assert_eq!(config.triggers, vec!["hi"]);
        assert_eq!(config.reply_text, "hello");
    }

    #[test]
    fn test_sections_override_defaults() {
        let config = toml(
            r#"
TRIGGERS = ["x"]
REPLY_TEXT = "y"

[chat]
url = "https://chat.example.com/room/1"
debugger_url = "http://127.0.0.1:9222"

[monitor]
session_lost_after = 2
skip_existing = false

[server]
bind = "0.0.0.0:8080"
"#,
        )
        .unwrap();

        assert_eq!(config.chat.url, "https://chat.example.com/room/1");
        assert_eq!(
            config.chat.debugger_url.as_deref(),
            Some("http://127.0.0.1:9222")
        );
        assert_eq!(config.monitor.session_lost_after, 2);
        assert!(!config.monitor.skip_existing);
        assert_eq!(config.server.bind.port(), 8080);
    }

    #[test]
    fn test_empty_triggers_rejected() {
        let err = toml("TRIGGERS = []\nREPLY_TEXT = \"ok\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::EmptyTriggers));
    }

    #[test]
    fn test_missing_keys_rejected() {
        let err = toml("REPLY_TEXT = \"ok\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey("TRIGGERS")));

        let err = Config::parse(r#"{"TRIGGERS": ["a"]}"#, ConfigFormat::Json).unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey("REPLY_TEXT")));
    }

    #[test]
    fn test_blank_trigger_and_reply_rejected() {
        let err = toml("TRIGGERS = [\"a\", \"  \"]\nREPLY_TEXT = \"ok\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::BlankTrigger(1)));

        let err = toml("TRIGGERS = [\"a\"]\nREPLY_TEXT = \"   \"\n").unwrap_err();
        assert!(matches!(err, ConfigError::EmptyReply));
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let err = toml("TRIGGERS = [\"a\"]\nREPLY_TEXT = \"b\"\n[chat]\nurl = \"not a url\"\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "chat.url", .. }));

        let err = toml("TRIGGERS = [\"a\"]\nREPLY_TEXT = \"b\"\n[monitor]\npoll_interval_ms = 0\n")
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "monitor.poll_interval_ms",
                ..
            }
        ));
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let err = Config::parse("{not json", ConfigFormat::Json).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_picks_format_from_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, r#"{{"TRIGGERS": ["@team"], "REPLY_TEXT": "Team Take"}}"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.reply_text, "Team Take");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
