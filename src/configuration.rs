use std::path::Path;
use std::sync::Arc;
use std::{env, time};

use config::{Config, ConfigError, Environment, File};
use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use sqlx::ConnectOptions;
use tracing::log::LevelFilter;
use url::Url;

use crate::domain::EmailAddress;
use crate::email_client::{MailTransport, PostmarkClient, SmtpRelay};
use crate::notifier::Notifier;

/// Settings
#[derive(Clone, serde::Deserialize)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub database: DatabaseSettings,
    pub email_client: EmailClientSettings,
}

impl Settings {
    /// Get settings from configuration files
    pub fn get_config() -> Result<Self, ConfigError> {
        let path = env::current_dir().map_err(|e| ConfigError::Foreign(Box::new(e)))?;

        // Detect the running environment (default: `dev`)
        let env: Env = env::var("APP_ENVIRONMENT")
            .unwrap_or_else(|_| "dev".into())
            .try_into()
            .map_err(ConfigError::Message)?;

        Self::load(&path.join("config"), &env)
    }

    /// Read settings for `env` from `config_dir` and the environment
    ///
    /// Database credentials only live in `dev.yaml`, so `prd` fails here
    /// unless they are provided through `CONTACT__DATABASE__*` variables.
    pub fn load(config_dir: &Path, env: &Env) -> Result<Self, ConfigError> {
        Config::builder()
            // Base configuration file
            .add_source(File::from(config_dir.join("base.yaml")).required(true))
            // Environment-specific configuration file
            .add_source(File::from(config_dir.join(format!("{}.yaml", env.as_str()))).required(true))
            // Environment variables (e.g., `CONTACT__APPLICATION__APP_PORT=8888`
            // would set Settings.application.app_port to 8888)
            .add_source(
                Environment::with_prefix("CONTACT")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("application.allowed_origins"),
            )
            // Hosting platforms hand out the listening port as `PORT`
            .set_override_option("application.app_port", env::var("PORT").ok())?
            .build()?
            .try_deserialize()
    }
}

/// Application settings
#[derive(Clone, serde::Deserialize)]
pub struct ApplicationSettings {
    pub app_host: String,
    pub app_port: u16,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    pub max_body_bytes: usize,
}

/// Database settings
#[derive(Clone, serde::Deserialize)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: SecretString,
    pub host: String,
    pub port: u16,
    pub database_name: String,
    pub require_ssl: bool,
    pub insert_timeout_millis: u64,
    pub connect_timeout_millis: u64,
}

impl DatabaseSettings {
    /// Generate options and flags that can be used to configure a database connection
    pub fn db_options(&self) -> PgConnectOptions {
        let ssl_mode = if self.require_ssl {
            PgSslMode::Require
        } else {
            PgSslMode::Prefer
        };
        PgConnectOptions::new()
            .username(&self.username)
            .password(self.password.expose_secret())
            .host(&self.host)
            .port(self.port)
            .database(&self.database_name)
            .ssl_mode(ssl_mode)
            .log_statements(LevelFilter::Trace)
    }

    /// Deadline for a single submission insert
    pub const fn insert_timeout(&self) -> time::Duration {
        time::Duration::from_millis(self.insert_timeout_millis)
    }

    /// Deadline for establishing the initial connection at startup
    pub const fn connect_timeout(&self) -> time::Duration {
        time::Duration::from_millis(self.connect_timeout_millis)
    }
}

/// Supported mail transports
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Postmark,
    Smtp,
}

/// Email client settings
///
/// Everything but the transport kind, timeout and queue size is optional so
/// that a partially configured deployment still accepts submissions.
#[derive(Clone, serde::Deserialize)]
pub struct EmailClientSettings {
    pub transport: TransportKind,
    pub sender_email: Option<String>,
    pub recipient_email: Option<String>,
    pub timeout_millis: u64,
    pub queue_capacity: usize,
    pub base_url: Option<String>,
    pub authorization_token: Option<SecretString>,
    pub smtp_host: Option<String>,
    pub smtp_port: Option<u16>,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<SecretString>,
    #[serde(default = "default_smtp_tls")]
    pub smtp_tls: bool,
}

const fn default_smtp_tls() -> bool {
    true
}

impl EmailClientSettings {
    /// Build the notifier, falling back to a disabled one when settings are incomplete
    pub fn notifier(&self) -> Notifier {
        match self.try_notifier() {
            Ok(notifier) => notifier,
            Err(reason) => {
                tracing::warn!(
                    reason = %reason,
                    "Email notifications are disabled, submissions will still be stored"
                );
                Notifier::disabled(reason)
            }
        }
    }

    fn try_notifier(&self) -> Result<Notifier, String> {
        let sender = parse_address("sender_email", self.sender_email.as_ref())?;
        let recipient = parse_address("recipient_email", self.recipient_email.as_ref())?;
        let transport = self.transport_client()?;
        Ok(Notifier::new(transport, sender, recipient))
    }

    /// Build the configured mail transport
    pub fn transport_client(&self) -> Result<Arc<dyn MailTransport>, String> {
        match self.transport {
            TransportKind::Postmark => {
                let base_url = required("base_url", self.base_url.as_ref())?;
                let base_url =
                    Url::parse(base_url).map_err(|e| format!("invalid base_url: {e}"))?;
                let token = required("authorization_token", self.authorization_token.as_ref())?;
                let client = PostmarkClient::new(base_url, token.clone(), self.timeout())
                    .map_err(|e| format!("{e:#}"))?;
                Ok(Arc::new(client))
            }
            TransportKind::Smtp => {
                let host = required("smtp_host", self.smtp_host.as_ref())?;
                let port = *required("smtp_port", self.smtp_port.as_ref())?;
                let credentials = match (&self.smtp_username, &self.smtp_password) {
                    (Some(username), Some(password)) => Some((username.clone(), password.clone())),
                    (None, None) => None,
                    _ => return Err("smtp_username and smtp_password must be set together".into()),
                };
                let relay = SmtpRelay::new(host, port, credentials, self.smtp_tls, self.timeout())
                    .map_err(|e| format!("{e:#}"))?;
                Ok(Arc::new(relay))
            }
        }
    }

    /// Get configured timeout
    pub const fn timeout(&self) -> time::Duration {
        time::Duration::from_millis(self.timeout_millis)
    }
}

/// Require an optional setting to be present
fn required<'a, T>(key: &str, value: Option<&'a T>) -> Result<&'a T, String> {
    value.ok_or_else(|| format!("missing email_client.{key}"))
}

/// Require an optional setting to hold a valid email address
fn parse_address(key: &str, value: Option<&String>) -> Result<EmailAddress, String> {
    let value = required(key, value)?;
    EmailAddress::parse(value.clone()).map_err(|e| format!("invalid email_client.{key}: {e}"))
}

/// Available runtime environments
pub enum Env {
    Development,
    Production,
}

impl Env {
    /// Represent environment as a string
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "dev",
            Self::Production => "prd",
        }
    }
}

impl TryFrom<String> for Env {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "dev" => Ok(Self::Development),
            "prd" => Ok(Self::Production),
            other => Err(format!(
                "`{other}` is not a supported environment. Use either `dev` or `prd`"
            )),
        }
    }
}
