use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Name of the cookie carrying the login token
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// How long a login stays valid, in hours (default: 168)
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: i64,
    /// Mark the login cookie `Secure` (enable behind HTTPS)
    #[serde(default)]
    pub secure_cookies: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            session_ttl_hours: default_session_ttl_hours(),
            secure_cookies: false,
        }
    }
}

fn default_cookie_name() -> String {
    "studyhall_session".to_string()
}

/// Upper bound for `auth.session_ttl_hours` (one year)
pub const MAX_SESSION_TTL_HOURS: i64 = 24 * 365;

fn default_session_ttl_hours() -> i64 {
    24 * 7
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionsConfig {
    /// Number of follow-up sessions generated for a recurring session
    #[serde(default = "default_recurrence_count")]
    pub recurrence_count: u32,
    /// Maximum comment length in characters
    #[serde(default = "default_comment_max_length")]
    pub comment_max_length: usize,
    /// Only members may comment on a session
    #[serde(default)]
    pub comments_require_membership: bool,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            recurrence_count: default_recurrence_count(),
            comment_max_length: default_comment_max_length(),
            comments_require_membership: false,
        }
    }
}

fn default_recurrence_count() -> u32 {
    4
}

fn default_comment_max_length() -> usize {
    500
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| "Failed to parse configuration file")?;
            config.validate()?;
            Ok(config)
        } else {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }

    fn validate(&self) -> Result<()> {
        let ttl = self.auth.session_ttl_hours;
        if !(1..=MAX_SESSION_TTL_HOURS).contains(&ttl) {
            bail!(
                "auth.session_ttl_hours must be between 1 and {} (got {})",
                MAX_SESSION_TTL_HOURS,
                ttl
            );
        }
        Ok(())
    }
}
