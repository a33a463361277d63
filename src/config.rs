//! Configuration management for Turnstile.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Result, TurnstileError};

/// Prefix of environment variables read by [`TurnstileConfig::load`].
pub const ENV_PREFIX: &str = "TURNSTILE";

/// Main configuration for the Turnstile service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Admission control thresholds and static lists
    #[serde(default)]
    pub admission: AdmissionConfig,

    /// Request gate behaviour
    #[serde(default)]
    pub gate: GateConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    /// Error responses carry details
    Development,
    #[default]
    Production,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server address
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Deployment environment
    #[serde(default)]
    pub environment: Environment,

    /// Roles attached to every request by the demo router
    #[serde(default = "default_roles")]
    pub default_roles: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            environment: Environment::default(),
            default_roles: default_roles(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3000))
}

fn default_roles() -> Vec<String> {
    vec!["user".to_string()]
}

/// When a throttled request adds a strike.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrikeMode {
    /// Every rejected request adds a strike
    #[default]
    PerRejection,
    /// Only the first rejection within a window adds a strike
    PerWindow,
}

/// What happens to a key's strikes once it is temporarily blacklisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrikeReset {
    /// Strikes drop to zero when the blacklist is imposed
    #[default]
    OnBlacklist,
    /// Strikes accumulate forever
    Never,
}

/// Admission control configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Fixed window length in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Steady-state requests allowed per window
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Extra requests tolerated on top of `max_requests`
    #[serde(default = "default_burst_allowance")]
    pub burst_allowance: u32,

    /// Strikes needed to trigger a temporary blacklist
    #[serde(default = "default_max_strikes")]
    pub max_strikes: u32,

    /// Temporary blacklist duration in milliseconds
    #[serde(default = "default_blacklist_duration_ms")]
    pub blacklist_duration_ms: u64,

    /// When strikes are added
    #[serde(default)]
    pub strike_mode: StrikeMode,

    /// Whether strikes are cleared by a blacklist
    #[serde(default)]
    pub strike_reset: StrikeReset,

    /// Keys that are always admitted
    #[serde(default)]
    pub allow_list: Vec<String>,

    /// Keys that are always rejected
    #[serde(default)]
    pub deny_list: Vec<String>,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            max_requests: default_max_requests(),
            burst_allowance: default_burst_allowance(),
            max_strikes: default_max_strikes(),
            blacklist_duration_ms: default_blacklist_duration_ms(),
            strike_mode: StrikeMode::default(),
            strike_reset: StrikeReset::default(),
            allow_list: Vec::new(),
            deny_list: Vec::new(),
        }
    }
}

fn default_window_ms() -> u64 {
    60_000
}

fn default_max_requests() -> u32 {
    10
}

fn default_burst_allowance() -> u32 {
    5
}

fn default_max_strikes() -> u32 {
    3
}

fn default_blacklist_duration_ms() -> u64 {
    300_000
}

impl AdmissionConfig {
    /// Number of requests a key may make in one window before it is throttled.
    pub fn threshold(&self) -> u32 {
        self.max_requests.saturating_add(self.burst_allowance)
    }

    /// Window length.
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Temporary blacklist duration.
    pub fn blacklist_duration(&self) -> Duration {
        Duration::from_millis(self.blacklist_duration_ms)
    }

    /// Reject thresholds that would make the algorithm meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.window_ms == 0 {
            return Err(TurnstileError::Config(
                "window_ms must be greater than zero".to_string(),
            ));
        }
        if self.threshold() == 0 {
            return Err(TurnstileError::Config(
                "max_requests + burst_allowance must be greater than zero".to_string(),
            ));
        }
        if self.max_strikes == 0 {
            return Err(TurnstileError::Config(
                "max_strikes must be greater than zero".to_string(),
            ));
        }
        if self.blacklist_duration_ms == 0 {
            return Err(TurnstileError::Config(
                "blacklist_duration_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Where the gate reads a client's key from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum KeySource {
    /// The peer socket address of the connection
    #[default]
    PeerAddr,
    /// The first value of a request header, e.g. `x-forwarded-for`
    Header(String),
}

impl FromStr for KeySource {
    type Err = TurnstileError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "peer_addr" => Ok(KeySource::PeerAddr),
            other => match other.strip_prefix("header:") {
                Some(name) if !name.trim().is_empty() => {
                    Ok(KeySource::Header(name.trim().to_ascii_lowercase()))
                }
                _ => Err(TurnstileError::Config(format!(
                    "unknown key source '{}', expected 'peer_addr' or 'header:<name>'",
                    other
                ))),
            },
        }
    }
}

impl TryFrom<String> for KeySource {
    type Error = TurnstileError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<KeySource> for String {
    fn from(source: KeySource) -> Self {
        source.to_string()
    }
}

impl fmt::Display for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySource::PeerAddr => write!(f, "peer_addr"),
            KeySource::Header(name) => write!(f, "header:{}", name),
        }
    }
}

/// Treatment of requests whose key cannot be extracted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnidentifiedClients {
    /// Refuse the request
    #[default]
    Reject,
    /// Count every unidentified request against one shared key
    SharedBucket,
}

/// Behaviour when the counter store fails during a decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreFailurePolicy {
    /// Let the request through
    FailOpen,
    /// Answer 503
    #[default]
    FailClosed,
}

/// Request gate configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Key extraction strategy
    #[serde(default)]
    pub key_source: KeySource,

    /// Handling of requests without a usable key
    #[serde(default)]
    pub unidentified: UnidentifiedClients,

    /// Key shared by unidentified clients under `shared_bucket`
    #[serde(default = "default_anonymous_key")]
    pub anonymous_key: String,

    /// Handling of counter store failures
    #[serde(default)]
    pub on_store_error: StoreFailurePolicy,

    /// Body sent with throttled responses
    #[serde(default = "default_throttled_message")]
    pub throttled_message: String,

    /// Body sent while a key is temporarily blacklisted
    #[serde(default = "default_blacklisted_message")]
    pub blacklisted_message: String,

    /// Body sent to deny-listed keys
    #[serde(default = "default_denied_message")]
    pub denied_message: String,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            key_source: KeySource::default(),
            unidentified: UnidentifiedClients::default(),
            anonymous_key: default_anonymous_key(),
            on_store_error: StoreFailurePolicy::default(),
            throttled_message: default_throttled_message(),
            blacklisted_message: default_blacklisted_message(),
            denied_message: default_denied_message(),
        }
    }
}

fn default_anonymous_key() -> String {
    "anonymous".to_string()
}

fn default_throttled_message() -> String {
    "Too many requests, please try again later".to_string()
}

fn default_blacklisted_message() -> String {
    "Too many requests. You are temporarily blacklisted.".to_string()
}

fn default_denied_message() -> String {
    "Access denied.".to_string()
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Output format
    #[serde(default)]
    pub format: LogFormat,

    /// Default filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TurnstileConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| TurnstileError::Config(format!("Failed to parse configuration: {}", e)))
    }

    /// Load configuration from an optional YAML file overlaid with
    /// `TURNSTILE_*` environment variables.
    ///
    /// Nested keys are separated by a double underscore, for example
    /// `TURNSTILE_ADMISSION__MAX_REQUESTS=20`. List values are comma separated.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                ::config::File::from(path)
                    .format(::config::FileFormat::Yaml)
                    .required(true),
            );
        }

        let environment = ::config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("admission.allow_list")
            .with_list_parse_key("admission.deny_list")
            .with_list_parse_key("server.default_roles")
            .try_parsing(true);

        builder
            .add_source(environment)
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| TurnstileError::Config(format!("Failed to load configuration: {}", e)))
    }
}
