// Configuration management with layered configuration (file, env)

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub database: DatabaseConfig,
    pub scheduler: SchedulerSettings,
    pub mail: MailConfig,
    pub twilio: TwilioConfig,
    pub ops: OpsConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// How often the due-reminder pass runs (seconds)
    pub tick_interval_seconds: u64,
    /// Upper bound on a single notification send so a hung transport cannot
    /// stall the batch (seconds)
    pub notify_timeout_seconds: u64,
}

/// SMTP transport settings. Empty host/username means the email channel is
/// unconfigured: sends are logged and skipped rather than failing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub from_address: String,
}

fn default_smtp_port() -> u16 {
    587
}

impl MailConfig {
    pub fn is_configured(&self) -> bool {
        !self.host.is_empty() && !self.username.is_empty() && !self.from_address.is_empty()
    }
}

/// Twilio REST settings. Empty account SID means the SMS channel is
/// unconfigured: sends are logged and skipped rather than failing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwilioConfig {
    #[serde(default)]
    pub account_sid: String,
    #[serde(default)]
    pub auth_token: String,
    #[serde(default)]
    pub from_number: String,
    #[serde(default = "default_twilio_api_base")]
    pub api_base: String,
}

fn default_twilio_api_base() -> String {
    "https://api.twilio.com".to_string()
}

impl TwilioConfig {
    pub fn is_configured(&self) -> bool {
        !self.account_sid.is_empty() && !self.from_number.is_empty()
    }
}

/// Bind address for the operational HTTP surface (health check, manual tick)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpsConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
}

impl Settings {
    /// Load configuration with layered precedence: defaults file → local
    /// overrides → environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        if self.database.url.is_empty() {
            return Err("Database URL cannot be empty".to_string());
        }
        if self.database.max_connections == 0 {
            return Err("Database max_connections must be greater than 0".to_string());
        }

        if self.scheduler.tick_interval_seconds == 0 {
            return Err("Scheduler tick_interval_seconds must be greater than 0".to_string());
        }
        if self.scheduler.notify_timeout_seconds == 0 {
            return Err("Scheduler notify_timeout_seconds must be greater than 0".to_string());
        }

        if self.ops.port == 0 {
            return Err("Ops port must be greater than 0".to_string());
        }

        if self.twilio.is_configured() && self.twilio.auth_token.is_empty() {
            return Err("Twilio auth_token required when account_sid is set".to_string());
        }
        if self.mail.is_configured() && self.mail.password.is_empty() {
            return Err("Mail password required when SMTP host is set".to_string());
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "postgresql://localhost/meditrack".to_string(),
                max_connections: 10,
                min_connections: 2,
                connect_timeout_seconds: 30,
            },
            scheduler: SchedulerSettings {
                tick_interval_seconds: 60,
                notify_timeout_seconds: 15,
            },
            mail: MailConfig {
                host: String::new(),
                port: 587,
                username: String::new(),
                password: String::new(),
                from_address: String::new(),
            },
            twilio: TwilioConfig {
                account_sid: String::new(),
                auth_token: String::new(),
                from_number: String::new(),
                api_base: default_twilio_api_base(),
            },
            ops: OpsConfig {
                host: "0.0.0.0".to_string(),
                port: 8081,
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
            },
        }
    }
}
