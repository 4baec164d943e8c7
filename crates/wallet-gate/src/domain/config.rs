//! Gate configuration with validation.
//!
//! Built once at startup (from the environment or directly) and injected
//! into every component; nothing reads ambient process state afterwards.

use super::address::Address;
use super::allow_list::AllowList;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Minimum length for the session and CSRF secrets (bytes).
pub const MIN_SECRET_LEN: usize = 32;

/// Minimum length of the challenge message (characters).
pub const MIN_CHALLENGE_LEN: usize = 10;

/// Default maximum request body size (10 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Fragments that mark a secret as an unedited template value.
const PLACEHOLDER_MARKERS: &[&str] = &["change-this", "changeme", "placeholder", "your-secret"];

/// Deployment mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Development,
    Production,
    Test,
}

impl RunMode {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::Invalid {
                name: "RUN_MODE",
                reason: format!("unknown mode '{other}'"),
            }),
        }
    }
}

/// A secret string that never appears in `Debug` output or serialized config.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// `true` if the value looks like an unedited template secret.
    pub fn is_placeholder(&self) -> bool {
        let lower = self.0.to_ascii_lowercase();
        lower == "secret" || PLACEHOLDER_MARKERS.iter().any(|m| lower.contains(m))
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretString(<redacted>)")
    }
}

impl Serialize for SecretString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("<redacted>")
    }
}

impl<'de> Deserialize<'de> for SecretString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self)
    }
}

/// Main gate configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub mode: RunMode,
    pub server: ServerConfig,
    pub session: SessionConfig,
    pub auth: AuthConfig,
    pub csrf: CsrfConfig,
    pub rate_limit: RateLimitConfig,
    pub input: InputGuardConfig,
    pub cors: CorsConfig,
    pub security: SecurityConfig,
    pub logging: LoggingConfig,
}

/// HTTP listener
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 3001,
        }
    }
}

/// Session token signing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub secret: SecretString,
    /// Token lifetime (also the cookie Max-Age)
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: SecretString::default(),
            ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Wallet sign-in
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// The exact message wallets sign
    pub challenge_message: String,
    /// Admitted wallets; empty admits every verified wallet
    pub wallet_allow_list: Vec<String>,
    /// Wallet allowed onto owner-only routes
    pub owner_address: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            challenge_message: "Sign this message to authenticate with your wallet".to_string(),
            wallet_allow_list: Vec::new(),
            owner_address: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CsrfConfig {
    pub secret: SecretString,
}

/// Rate limiting
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Fixed window shared by the general, rpc-proxy and per-wallet policies
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    /// General budget per client IP per window
    pub max_requests: u32,
    /// How often finished windows are pruned
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(15 * 60),
            max_requests: 100,
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

/// Body and query normalization
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputGuardConfig {
    /// Fields that keep the limited rich-text tag set
    pub rich_text_fields: Vec<String>,
    /// Fields passed through untouched
    pub verbatim_fields: Vec<String>,
    pub max_body_bytes: usize,
}

impl Default for InputGuardConfig {
    fn default() -> Self {
        Self {
            rich_text_fields: Vec::new(),
            verbatim_fields: vec!["message".to_string(), "signature".to_string()],
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// CORS
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// The single origin allowed to send credentialed requests
    pub frontend_url: String,
    /// Max age for preflight cache (seconds)
    pub max_age: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            frontend_url: "http://localhost:3000".to_string(),
            max_age: 600,
        }
    }
}

/// Client address resolution
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Proxies whose forwarding headers are believed
    pub trusted_proxies: Vec<IpAddr>,
    /// Also trust any private-range peer as a proxy
    pub trust_private_ips: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `error`, `warn`, `info` or `debug`
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl GateConfig {
    /// Load from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` for each variable. Unset variables keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| lookup(*k))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Self::default();

        if let Some(mode) = get(&["RUN_MODE", "NODE_ENV"]) {
            config.mode = mode.parse()?;
        }
        if let Some(host) = get(&["HOST"]) {
            config.server.host = parse_var("HOST", &host)?;
        }
        if let Some(port) = get(&["PORT"]) {
            config.server.port = parse_var("PORT", &port)?;
        }
        if let Some(url) = get(&["FRONTEND_URL"]) {
            config.cors.frontend_url = url;
        }
        if let Some(secret) = get(&["SESSION_SECRET", "JWT_SECRET"]) {
            config.session.secret = SecretString::new(secret);
        }
        if let Some(ttl) = get(&["SESSION_TTL", "JWT_EXPIRES_IN"]) {
            config.session.ttl = humantime_serde::parse_duration(&ttl).map_err(|reason| {
                ConfigError::Invalid {
                    name: "SESSION_TTL",
                    reason: reason.to_string(),
                }
            })?;
        }
        if let Some(message) = lookup("SIGNATURE_MESSAGE").filter(|m| !m.trim().is_empty()) {
            // The challenge is compared byte for byte, so it is not trimmed
            config.auth.challenge_message = message;
        }
        if let Some(list) = get(&["WALLET_WHITELIST"]) {
            config.auth.wallet_allow_list = split_csv(&list);
        }
        config.auth.owner_address = get(&["OWNER_ADDRESS"]);

        if let Some(window) = get(&["RATE_LIMIT_WINDOW"]) {
            config.rate_limit.window = humantime_serde::parse_duration(&window).map_err(
                |reason| ConfigError::Invalid {
                    name: "RATE_LIMIT_WINDOW",
                    reason: reason.to_string(),
                },
            )?;
        } else if let Some(ms) = get(&["RATE_LIMIT_WINDOW_MS"]) {
            config.rate_limit.window =
                Duration::from_millis(parse_var("RATE_LIMIT_WINDOW_MS", &ms)?);
        }
        if let Some(max) = get(&["RATE_LIMIT_MAX_REQUESTS"]) {
            config.rate_limit.max_requests = parse_var("RATE_LIMIT_MAX_REQUESTS", &max)?;
        }

        if let Some(secret) = get(&["CSRF_SECRET"]) {
            config.csrf.secret = SecretString::new(secret);
        }
        if let Some(proxies) = get(&["TRUSTED_PROXIES"]) {
            config.security.trusted_proxies = split_csv(&proxies)
                .iter()
                .map(|p| parse_var("TRUSTED_PROXIES", p))
                .collect::<Result<_, _>>()?;
        }
        if let Some(fields) = get(&["RICH_TEXT_FIELDS"]) {
            config.input.rich_text_fields = split_csv(&fields);
        }
        if let Some(max) = get(&["MAX_BODY_BYTES"]) {
            config.input.max_body_bytes = parse_var("MAX_BODY_BYTES", &max)?;
        }
        if let Some(level) = get(&["LOG_LEVEL"]) {
            config.logging.level = level.to_ascii_lowercase();
        }
        if let Some(format) = get(&["LOG_FORMAT"]) {
            config.logging.json = format.eq_ignore_ascii_case("json");
        }

        Ok(config)
    }

    /// Validate configuration.
    ///
    /// Placeholder secrets are fatal in production and logged otherwise.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, secret) in [
            ("SESSION_SECRET", &self.session.secret),
            ("CSRF_SECRET", &self.csrf.secret),
        ] {
            if secret.expose().len() < MIN_SECRET_LEN {
                return Err(ConfigError::SecretTooShort {
                    name,
                    min: MIN_SECRET_LEN,
                });
            }
            if secret.is_placeholder() {
                if self.mode.is_production() {
                    return Err(ConfigError::PlaceholderSecret { name });
                }
                warn!(
                    variable = name,
                    "Secret is a placeholder value; generate one with `openssl rand -base64 32`"
                );
            }
        }
        if self.session.secret == self.csrf.secret {
            return Err(ConfigError::SharedSecret);
        }

        if self.auth.challenge_message.chars().count() < MIN_CHALLENGE_LEN {
            return Err(ConfigError::Invalid {
                name: "SIGNATURE_MESSAGE",
                reason: format!("must be at least {MIN_CHALLENGE_LEN} characters"),
            });
        }
        self.allow_list()?;
        self.owner()?;

        if self.session.ttl.as_secs() == 0 {
            return Err(ConfigError::Zero("SESSION_TTL"));
        }
        if self.rate_limit.max_requests == 0 {
            return Err(ConfigError::Zero("RATE_LIMIT_MAX_REQUESTS"));
        }
        if self.rate_limit.window.as_millis() == 0 {
            return Err(ConfigError::Zero("RATE_LIMIT_WINDOW"));
        }
        if self.rate_limit.cleanup_interval.as_millis() == 0 {
            return Err(ConfigError::Zero("rate_limit.cleanup_interval"));
        }
        if self.input.max_body_bytes == 0 {
            return Err(ConfigError::Zero("MAX_BODY_BYTES"));
        }

        url::Url::parse(&self.cors.frontend_url).map_err(|e| ConfigError::Invalid {
            name: "FRONTEND_URL",
            reason: e.to_string(),
        })?;

        if !matches!(
            self.logging.level.as_str(),
            "error" | "warn" | "info" | "debug" | "trace"
        ) {
            return Err(ConfigError::Invalid {
                name: "LOG_LEVEL",
                reason: format!("unknown level '{}'", self.logging.level),
            });
        }

        Ok(())
    }

    /// Listener address
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.host, self.server.port)
    }

    /// Parsed allow-list
    pub fn allow_list(&self) -> Result<AllowList, ConfigError> {
        self.auth
            .wallet_allow_list
            .iter()
            .map(|a| {
                Address::parse(a.trim()).map_err(|_| ConfigError::Invalid {
                    name: "WALLET_WHITELIST",
                    reason: format!("'{a}' is not a wallet address"),
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(AllowList::new)
    }

    /// Parsed owner address, if configured
    pub fn owner(&self) -> Result<Option<Address>, ConfigError> {
        self.auth
            .owner_address
            .as_deref()
            .map(|a| {
                Address::parse(a.trim()).map_err(|_| ConfigError::Invalid {
                    name: "OWNER_ADDRESS",
                    reason: format!("'{a}' is not a wallet address"),
                })
            })
            .transpose()
    }
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_var<T: FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T::Err: fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Value present but unusable
    #[error("invalid {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
    /// Secret shorter than the minimum
    #[error("{name} must be at least {min} characters")]
    SecretTooShort { name: &'static str, min: usize },
    /// Secret still set to a template value
    #[error("{name} is a placeholder value; generate a real secret")]
    PlaceholderSecret { name: &'static str },
    /// Session and CSRF secrets are identical
    #[error("SESSION_SECRET and CSRF_SECRET must differ")]
    SharedSecret,
    /// Duration or count that must be positive
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Humantime serde module for Duration serialization
pub(crate) mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() != 0 {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        } else {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    /// Accepts `250ms`, `30s`, `15m`, `24h`, `7d`, or bare seconds.
    pub fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        let (digits, unit_secs, is_ms) = if let Some(ms) = s.strip_suffix("ms") {
            (ms, 0, true)
        } else if let Some(secs) = s.strip_suffix('s') {
            (secs, 1, false)
        } else if let Some(mins) = s.strip_suffix('m') {
            (mins, 60, false)
        } else if let Some(hours) = s.strip_suffix('h') {
            (hours, 60 * 60, false)
        } else if let Some(days) = s.strip_suffix('d') {
            (days, 24 * 60 * 60, false)
        } else {
            (s, 1, false)
        };

        let value = digits
            .trim()
            .parse::<u64>()
            .map_err(|_| "invalid duration format")?;
        if is_ms {
            return Ok(Duration::from_millis(value));
        }
        value
            .checked_mul(unit_secs)
            .map(Duration::from_secs)
            .ok_or("duration overflow")
    }
}
