//! Configuration for the MySQL MCP server
//!
//! Loaded from TOML, then overridden from the environment. Every section has
//! defaults so an empty file (or no file) is a valid starting point.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

// ============================================================================
// Configuration Types
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub access: AccessConfig,
    #[serde(default)]
    pub caller: CallerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub security: SecurityConfig,
}

/// Connection settings for the single configured database
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
    /// Database (schema) name; empty means none selected
    #[serde(default)]
    pub database: String,
    #[serde(default = "default_charset")]
    pub charset: String,
    #[serde(default)]
    pub ssl_mode: SslMode,
    /// CA certificate for `verify_ca` / `verify_identity`
    #[serde(default)]
    pub ssl_ca: Option<PathBuf>,
    /// Upper bound on pooled connections, clamped to 1..=10
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    3306
}

fn default_user() -> String {
    "root".to_string()
}

fn default_charset() -> String {
    "utf8mb4".to_string()
}

fn default_pool_size() -> u32 {
    5
}

fn default_connect_timeout() -> u64 {
    10
}

pub const MIN_POOL_SIZE: u32 = 1;
pub const MAX_POOL_SIZE: u32 = 10;

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            user: default_user(),
            password: String::new(),
            database: String::new(),
            charset: default_charset(),
            ssl_mode: SslMode::default(),
            ssl_ca: None,
            pool_size: default_pool_size(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("database", &self.database)
            .field("charset", &self.charset)
            .field("ssl_mode", &self.ssl_mode)
            .field("ssl_ca", &self.ssl_ca)
            .field("pool_size", &self.pool_size)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SslMode {
    Disabled,
    #[default]
    Preferred,
    Required,
    VerifyCa,
    VerifyIdentity,
}

impl FromStr for SslMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "disabled" | "disable" => Ok(SslMode::Disabled),
            "preferred" | "prefer" => Ok(SslMode::Preferred),
            "required" | "require" => Ok(SslMode::Required),
            "verify_ca" => Ok(SslMode::VerifyCa),
            "verify_identity" => Ok(SslMode::VerifyIdentity),
            other => Err(format!("unknown SSL mode '{}'", other)),
        }
    }
}

/// Username allow-lists; membership is case-insensitive
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessConfig {
    #[serde(default)]
    pub admins: Vec<String>,
    #[serde(default)]
    pub writers: Vec<String>,
    #[serde(default)]
    pub readers: Vec<String>,
}

/// Identity of the caller behind the stdio transport
#[derive(Clone, Serialize, Deserialize)]
pub struct CallerConfig {
    #[serde(default = "default_login")]
    pub login: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub token: String,
}

fn default_login() -> String {
    "anonymous".to_string()
}

impl Default for CallerConfig {
    fn default() -> Self {
        Self {
            login: default_login(),
            name: String::new(),
            email: String::new(),
            token: String::new(),
        }
    }
}

impl fmt::Debug for CallerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallerConfig")
            .field("login", &self.login)
            .field("name", &self.name)
            .field("email", &self.email)
            .field("token", &"***")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Idle lifetime; each access extends the session
    #[serde(default = "default_lifetime_minutes")]
    pub lifetime_minutes: u64,
}

fn default_lifetime_minutes() -> u64 {
    60
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            lifetime_minutes: default_lifetime_minutes(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Keep per-tool call statistics (reported by `health_check`)
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Additional deny patterns, compiled case-insensitive and multiline
    #[serde(default)]
    pub extra_deny_patterns: Vec<String>,

    /// Row cap for read tools when the caller gives no limit
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
}

fn default_max_rows() -> usize {
    1000
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            extra_deny_patterns: Vec::new(),
            max_rows: default_max_rows(),
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

impl Config {
    /// Load configuration
    ///
    /// 1. TOML from `MYSQL_MCP_CONFIG`, else `~/.binks/mysql.toml` if present
    /// 2. Environment overrides (`MYSQL_*`, `GITHUB_*`, `MCP_CALLER_*`, ...)
    pub fn load() -> Result<Self> {
        let mut config = match Self::config_path() {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config from {}", path.display()))?;
                let config: Config = toml::from_str(&content)
                    .with_context(|| format!("Failed to parse config from {}", path.display()))?;
                tracing::info!(path = %path.display(), "Loaded config file");
                config
            }
            Some(path) => {
                tracing::info!(path = %path.display(), "No config file, using defaults");
                Config::default()
            }
            None => Config::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn config_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("MYSQL_MCP_CONFIG") {
            return Some(PathBuf::from(path));
        }
        dirs::home_dir().map(|home| home.join(".binks").join("mysql.toml"))
    }

    /// Apply overrides from a key lookup (normally the process environment)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db = &mut self.database;
        if let Some(v) = lookup("MYSQL_HOST") {
            db.host = v;
        }
        if let Some(v) = lookup("MYSQL_PORT") {
            db.port = parse_number("MYSQL_PORT", &v)?;
        }
        if let Some(v) = lookup("MYSQL_USER") {
            db.user = v;
        }
        if let Some(v) = lookup("MYSQL_PASSWORD") {
            db.password = v;
        }
        if let Some(v) = lookup("MYSQL_DATABASE") {
            db.database = v;
        }
        if let Some(v) = lookup("MYSQL_CHARSET") {
            db.charset = v;
        }
        if let Some(v) = lookup("MYSQL_SSL_MODE") {
            db.ssl_mode = v
                .parse()
                .map_err(|e: String| anyhow::anyhow!("MYSQL_SSL_MODE: {}", e))?;
        }
        if let Some(v) = lookup("MYSQL_SSL_CA") {
            db.ssl_ca = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("MYSQL_POOL_SIZE") {
            db.pool_size = parse_number("MYSQL_POOL_SIZE", &v)?;
        }
        if let Some(v) = lookup("MYSQL_CONNECT_TIMEOUT_SECS") {
            db.connect_timeout_secs = parse_number("MYSQL_CONNECT_TIMEOUT_SECS", &v)?;
        }
        db.pool_size = db.pool_size.clamp(MIN_POOL_SIZE, MAX_POOL_SIZE);

        if let Some(v) = lookup("GITHUB_ADMINS") {
            self.access.admins = split_list(&v);
        }
        if let Some(v) = lookup("GITHUB_WRITERS") {
            self.access.writers = split_list(&v);
        }
        if let Some(v) = lookup("GITHUB_READERS") {
            self.access.readers = split_list(&v);
        }

        let caller = &mut self.caller;
        if let Some(v) = lookup("MCP_CALLER_LOGIN") {
            caller.login = v;
        }
        if let Some(v) = lookup("MCP_CALLER_NAME") {
            caller.name = v;
        }
        if let Some(v) = lookup("MCP_CALLER_EMAIL") {
            caller.email = v;
        }
        if let Some(v) = lookup("MCP_CALLER_TOKEN") {
            caller.token = v;
        }

        if let Some(v) = lookup("SESSION_LIFETIME_MINUTES") {
            self.session.lifetime_minutes = parse_number("SESSION_LIFETIME_MINUTES", &v)?;
        }
        if self.session.lifetime_minutes == 0 {
            bail!("session lifetime must be at least one minute");
        }

        if let Some(v) = lookup("ENABLE_MONITORING") {
            self.monitoring.enabled = parse_bool("ENABLE_MONITORING", &v)?;
        }

        Ok(())
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("{} has invalid value '{}': {}", key, value, e))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => bail!("{} has invalid value '{}': expected true or false", key, value),
    }
}

/// Comma-separated list, trimmed, empties dropped
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
