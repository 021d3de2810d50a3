use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub vapid: VapidConfig,
    #[serde(default)]
    pub notification: NotificationConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub fallback: FallbackConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

/// VAPID credentials used to sign every push delivery.
#[derive(Debug, Clone, Deserialize)]
pub struct VapidConfig {
    /// Contact claim, e.g. "mailto:ops@example.com"
    #[serde(default = "default_vapid_subject")]
    pub subject: String,
    pub public_key: String,
    pub private_key: String,
}

/// Defaults applied when composing notification payloads.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_icon")]
    pub default_icon: String,
    #[serde(default)]
    pub badge: Option<String>,
    /// Base URL for the permalink placed in a stream notification's
    /// data field; the source id is appended.
    #[serde(default = "default_permalink_base")]
    pub permalink_base: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Upper bound on concurrent transport calls during one fan-out.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Remove subscriptions whose endpoint the transport reports as
    /// permanently gone.
    #[serde(default)]
    pub prune_invalid: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FallbackConfig {
    /// Periodic delivery-path check; off unless explicitly enabled.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_fallback_interval")]
    pub interval_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_vapid_subject() -> String {
    "mailto:ops@example.com".to_string()
}

fn default_icon() -> String {
    "/assets/images/logo.png".to_string()
}

fn default_permalink_base() -> String {
    "https://pulsefeed.example/status".to_string()
}

fn default_max_concurrent() -> usize {
    100
}

fn default_fallback_interval() -> u64 {
    5
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("vapid.public_key", "")?
            .set_default("vapid.private_key", "")?
            .set_default("fallback.interval_secs", 5)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables
            // SERVER_HOST, SERVER_PORT, FALLBACK_ENABLED, etc.
            .add_source(
                Environment::default()
                    .separator("_")
                    .try_parsing(true)
                    .list_separator(","),
            );

        let mut settings: Settings = builder.build()?.try_deserialize()?;

        // The conventional VAPID env var names contain underscores the
        // generic separator cannot map onto nested keys, so overlay
        // them explicitly.
        if let Ok(key) = env::var("VAPID_PUBLIC_KEY") {
            settings.vapid.public_key = key;
        }
        if let Ok(key) = env::var("VAPID_PRIVATE_KEY") {
            settings.vapid.private_key = key;
        }
        if let Ok(subject) = env::var("VAPID_SUBJECT") {
            settings.vapid.subject = subject;
        }
        if let Ok(port) = env::var("PORT") {
            settings.server.port = port
                .parse()
                .map_err(|_| ConfigError::Message(format!("invalid PORT value: {port}")))?;
        }

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.vapid.public_key.is_empty() || self.vapid.private_key.is_empty() {
            return Err(ConfigError::Message(
                "VAPID keys are required (set VAPID_PUBLIC_KEY and VAPID_PRIVATE_KEY)".to_string(),
            ));
        }
        if self.dispatch.max_concurrent == 0 {
            return Err(ConfigError::Message(
                "dispatch.max_concurrent must be at least 1".to_string(),
            ));
        }
        // A zero interval would panic the periodic timer.
        if self.fallback.interval_secs == 0 {
            return Err(ConfigError::Message(
                "fallback.interval_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![],
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            default_icon: default_icon(),
            badge: None,
            permalink_base: default_permalink_base(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            prune_invalid: false,
        }
    }
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_fallback_interval(),
        }
    }
}
