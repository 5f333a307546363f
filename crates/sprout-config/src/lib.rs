//! Shared configuration for sprout tools.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext),
//! and translation to `sprout_core::SyncConfig`. The CLI layers its flag
//! overrides on top.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use sprout_core::{ChannelKind, SyncConfig, Threshold, ThresholdBounds, TlsVerification};

const KEYRING_SERVICE: &str = "sprout";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found")]
    UnknownProfile { name: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named greenhouse profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Pick a profile: the explicit name, else `default_profile`, else the
    /// only profile if there is exactly one.
    pub fn profile(&self, name: Option<&str>) -> Result<(String, &Profile), ConfigError> {
        let wanted = name.map(str::to_owned).or_else(|| {
            self.default_profile
                .clone()
                .filter(|n| self.profiles.contains_key(n))
                .or_else(|| {
                    (self.profiles.len() == 1)
                        .then(|| self.profiles.keys().next().cloned())
                        .flatten()
                })
        });
        let name = wanted.unwrap_or_else(|| "default".into());
        self.profiles
            .get(&name)
            .map(|profile| (name.clone(), profile))
            .ok_or(ConfigError::UnknownProfile { name })
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default)]
    pub insecure: bool,

    /// HTTP request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            insecure: false,
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    30
}

/// A named greenhouse backend.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Dashboard backend base URL (e.g., "http://192.168.1.40:5000").
    pub backend: String,

    /// Feed service base URL. Defaults to `backend`.
    pub feed_url: Option<String>,

    /// Push stream URL. Defaults to `backend` over ws/wss.
    pub stream_url: Option<String>,

    /// Feed-service API key (plaintext; prefer keyring or env var).
    pub api_key: Option<String>,

    /// Environment variable name containing the API key.
    pub api_key_env: Option<String>,

    /// Bearer token (plaintext; prefer keyring or env var).
    pub token: Option<String>,

    /// Environment variable name containing the bearer token.
    pub token_env: Option<String>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override insecure TLS setting.
    pub insecure: Option<bool>,

    /// Override request timeout (seconds).
    pub timeout: Option<u64>,

    /// Push stream handshake timeout (seconds).
    pub handshake_timeout: Option<u64>,

    /// Command acknowledgment window (seconds).
    pub ack_timeout: Option<u64>,

    /// REST fallback polling cadence while the stream is down (seconds,
    /// 0 disables).
    pub polling_interval: Option<u64>,

    /// Give up reconnecting after this many consecutive failures.
    pub max_reconnect_attempts: Option<u32>,

    /// Channels beyond the stock greenhouse set.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub channels: BTreeMap<String, ChannelKind>,

    /// Local threshold overrides.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub thresholds: BTreeMap<String, ThresholdBounds>,
}

impl Profile {
    /// A bare profile for `backend`, everything else defaulted.
    pub fn for_backend(backend: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            ..Self::default()
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "sprout", "sprout").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("sprout");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file + environment. A missing file is fine.
///
/// Environment overrides use `SPROUT_` and `__` for nesting, e.g.
/// `SPROUT_DEFAULTS__TIMEOUT=5`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("SPROUT_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the feed-service API key: env var, then keyring, then
/// plaintext. `None` when nothing is configured.
pub fn resolve_api_key(profile: &Profile, profile_name: &str) -> Option<SecretString> {
    resolve_secret(
        profile.api_key_env.as_deref(),
        &format!("{profile_name}/api-key"),
        profile.api_key.as_deref(),
    )
}

/// Resolve the bearer token with the same chain as the API key.
pub fn resolve_token(profile: &Profile, profile_name: &str) -> Option<SecretString> {
    resolve_secret(
        profile.token_env.as_deref(),
        &format!("{profile_name}/token"),
        profile.token.as_deref(),
    )
}

fn resolve_secret(env_name: Option<&str>, keyring_user: &str, plaintext: Option<&str>) -> Option<SecretString> {
    // 1. Named env var
    if let Some(val) = env_name.and_then(|name| std::env::var(name).ok()) {
        return Some(SecretString::from(val));
    }

    // 2. System keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, keyring_user) {
        if let Ok(secret) = entry.get_password() {
            return Some(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    plaintext.map(|s| SecretString::from(s.to_owned()))
}

// ── Translation to SyncConfig ───────────────────────────────────────

/// Build a `SyncConfig` from a profile, without CLI flag overrides.
///
/// Profile values win over `defaults`; unset tuning keeps the
/// `SyncConfig::new` defaults.
pub fn profile_to_sync_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<SyncConfig, ConfigError> {
    let backend = parse_url("backend", &profile.backend)?;
    let mut config = SyncConfig::new(backend);

    if let Some(ref feed) = profile.feed_url {
        config.feed_url = parse_url("feed_url", feed)?;
    }
    if let Some(ref stream) = profile.stream_url {
        config.stream_url = parse_url("stream_url", stream)?;
        if !matches!(config.stream_url.scheme(), "ws" | "wss") {
            return Err(ConfigError::Validation {
                field: "stream_url".into(),
                reason: format!("expected a ws:// or wss:// URL, got {stream}"),
            });
        }
    }

    config.api_key = resolve_api_key(profile, profile_name);
    config.token = resolve_token(profile, profile_name);

    config.tls = if profile.insecure.unwrap_or(defaults.insecure) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    config.timeout = positive_secs("timeout", profile.timeout.unwrap_or(defaults.timeout))?;
    if let Some(secs) = profile.handshake_timeout {
        config.handshake_timeout = positive_secs("handshake_timeout", secs)?;
    }
    if let Some(secs) = profile.ack_timeout {
        config.ack_timeout = positive_secs("ack_timeout", secs)?;
    }
    if let Some(secs) = profile.polling_interval {
        config.polling_interval = Duration::from_secs(secs);
    }
    config.max_reconnect_attempts = profile.max_reconnect_attempts;

    for (name, kind) in &profile.channels {
        config.channels.insert(name.clone(), *kind);
    }
    for (name, bounds) in &profile.thresholds {
        let threshold = Threshold::try_from(*bounds).map_err(|e| ConfigError::Validation {
            field: format!("thresholds.{name}"),
            reason: e.to_string(),
        })?;
        config.thresholds.insert(name.clone(), threshold);
    }

    Ok(config)
}

fn parse_url(field: &str, raw: &str) -> Result<url::Url, ConfigError> {
    raw.parse().map_err(|_| ConfigError::Validation {
        field: field.into(),
        reason: format!("invalid URL: {raw}"),
    })
}

fn positive_secs(field: &str, secs: u64) -> Result<Duration, ConfigError> {
    if secs == 0 {
        return Err(ConfigError::Validation {
            field: field.into(),
            reason: "must be at least 1 second".into(),
        });
    }
    Ok(Duration::from_secs(secs))
}
