use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub extraction: ExtractionSettings,
    #[serde(default)]
    pub auth: AuthSettings,
    #[serde(default)]
    pub delivery: DeliverySettings,
    #[serde(default)]
    pub proxy: ProxySettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionSettings {
    #[serde(default)]
    pub strict_validate: bool,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_ytdlp_timeout_secs")]
    pub ytdlp_timeout_secs: u64,
    #[serde(default)]
    pub extra_ytdlp_flags: Vec<String>,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            strict_validate: false,
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout_secs(),
            ytdlp_timeout_secs: default_ytdlp_timeout_secs(),
            extra_ytdlp_flags: Vec::new(),
        }
    }
}

/// Cookie material handed to extractors. Files are only ever read, never
/// written.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthSettings {
    #[serde(default)]
    pub instagram_cookie: Option<String>,
    #[serde(default)]
    pub instagram_cookies_file: Option<PathBuf>,
    #[serde(default)]
    pub facebook_cookie: Option<String>,
    #[serde(default)]
    pub facebook_cookies_file: Option<PathBuf>,
}

impl AuthSettings {
    pub fn instagram_cookies_path(&self) -> Option<PathBuf> {
        existing_file(self.instagram_cookies_file.as_ref())
    }

    pub fn facebook_cookies_path(&self) -> Option<PathBuf> {
        existing_file(self.facebook_cookies_file.as_ref())
    }
}

fn existing_file(path: Option<&PathBuf>) -> Option<PathBuf> {
    path.filter(|p| p.is_file()).cloned()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    #[default]
    Stream,
    Redirect,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DeliverySettings {
    #[serde(default)]
    pub mode: DeliveryMode,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProxySettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_proxy_type")]
    pub proxy_type: String,
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_proxy_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl ProxySettings {
    pub fn is_active(&self) -> bool {
        self.enabled && !self.host.is_empty()
    }

    /// `scheme://[user:pass@]host:port`, or `None` when disabled.
    pub fn url(&self) -> Option<String> {
        if !self.is_active() {
            return None;
        }

        let scheme = match self.proxy_type.as_str() {
            "socks5" | "socks" => "socks5",
            "https" => "https",
            _ => "http",
        };

        let auth = if self.username.is_empty() {
            String::new()
        } else {
            format!("{}:{}@", self.username, self.password)
        };

        Some(format!("{}://{}{}:{}", scheme, auth, self.host, self.port))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    8080
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.into()
}

fn default_request_timeout_secs() -> u64 {
    20
}

fn default_ytdlp_timeout_secs() -> u64 {
    90
}

fn default_proxy_type() -> String {
    "http".into()
}

fn default_proxy_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_gives_defaults() {
        let s: Settings = serde_json::from_str("{}").unwrap();
        assert_eq!(s.server.port, 8080);
        assert_eq!(s.delivery.mode, DeliveryMode::Stream);
        assert!(!s.extraction.strict_validate);
        assert_eq!(s.extraction.ytdlp_timeout_secs, 90);
        assert_eq!(s.logging.level, "info");
    }

    #[test]
    fn partial_sections_fill_missing_fields() {
        let s: Settings = serde_json::from_str(
            r#"{"server":{"port":8081},"delivery":{"mode":"redirect"},"extraction":{"strict_validate":true}}"#,
        )
        .unwrap();
        assert_eq!(s.server.port, 8081);
        assert_eq!(s.server.bind_address, "0.0.0.0");
        assert_eq!(s.delivery.mode, DeliveryMode::Redirect);
        assert!(s.extraction.strict_validate);
        assert_eq!(s.extraction.user_agent, DEFAULT_USER_AGENT);
    }

    #[test]
    fn proxy_url_formats() {
        let mut p = ProxySettings {
            enabled: true,
            proxy_type: "socks5".into(),
            host: "127.0.0.1".into(),
            port: 1080,
            username: String::new(),
            password: String::new(),
        };
        assert_eq!(p.url().as_deref(), Some("socks5://127.0.0.1:1080"));

        p.proxy_type = "http".into();
        p.username = "u".into();
        p.password = "p".into();
        assert_eq!(p.url().as_deref(), Some("http://u:p@127.0.0.1:1080"));

        p.enabled = false;
        assert_eq!(p.url(), None);
    }

    #[test]
    fn missing_cookie_file_is_ignored() {
        let auth = AuthSettings {
            instagram_cookies_file: Some(PathBuf::from("/definitely/not/here/cookies.txt")),
            ..Default::default()
        };
        assert!(auth.instagram_cookies_path().is_none());
    }
}
