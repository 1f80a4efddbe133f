use lettre::message::Mailbox;
use secureface_core::DEFAULT_MATCH_THRESHOLD;
use secureface_facepp::{FaceppConfig, DEFAULT_API_URL};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_ALERT_SENDER: &str = "alerts@secureface.local";

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Daemon configuration, loaded once from `SECUREFACE_*` environment variables.
pub struct Config {
    /// Address the HTTP API listens on (default: 0.0.0.0:5000).
    pub listen_addr: SocketAddr,
    /// Face++ credentials, endpoint and faceset.
    pub facepp: FaceppConfig,
    /// SQLite database path (or `:memory:`).
    pub database_url: String,
    /// Minimum search confidence (0 to 100) for a registered-user match.
    pub match_threshold: f64,
    /// Largest accepted request body, image included.
    pub max_upload_bytes: usize,
    pub alert: AlertConfig,
}

/// Where and how stranger alerts are mailed.
#[derive(Clone)]
pub struct AlertConfig {
    pub smtp_host: String,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub sender: Mailbox,
    pub recipient: Mailbox,
}

impl fmt::Debug for AlertConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlertConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &self.smtp_password.as_ref().map(|_| "<redacted>"))
            .field("sender", &self.sender.to_string())
            .field("recipient", &self.recipient.to_string())
            .finish()
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let facepp = FaceppConfig {
            base_url: get("SECUREFACE_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            api_key: required("SECUREFACE_API_KEY")?,
            api_secret: required("SECUREFACE_API_SECRET")?,
            faceset_token: required("SECUREFACE_FACESET_TOKEN")?,
            timeout: Duration::from_secs(parse_or(&get, "SECUREFACE_PROVIDER_TIMEOUT_SECS", 10u64)?),
        };
        let database_url = required("SECUREFACE_DATABASE_URL")?;
        let recipient = parse_required::<Mailbox>(&get, "SECUREFACE_ALERT_RECIPIENT")?;

        let smtp_username = get("SECUREFACE_SMTP_USERNAME");
        let smtp_password = get("SECUREFACE_SMTP_PASSWORD");
        // A username that is not an address (e.g. "apikey") falls through to the default.
        let sender = match get("SECUREFACE_ALERT_SENDER") {
            Some(raw) => parse_value::<Mailbox>("SECUREFACE_ALERT_SENDER", &raw)?,
            None => match smtp_username.as_deref().and_then(|user| user.parse::<Mailbox>().ok()) {
                Some(mailbox) => mailbox,
                None => parse_value::<Mailbox>("SECUREFACE_ALERT_SENDER", DEFAULT_ALERT_SENDER)?,
            },
        };

        let match_threshold = parse_or(&get, "SECUREFACE_MATCH_THRESHOLD", DEFAULT_MATCH_THRESHOLD)?;
        if !(0.0..=100.0).contains(&match_threshold) {
            return Err(ConfigError::Invalid {
                key: "SECUREFACE_MATCH_THRESHOLD",
                reason: format!("{match_threshold} is outside 0-100"),
            });
        }

        Ok(Self {
            listen_addr: parse_or(
                &get,
                "SECUREFACE_LISTEN_ADDR",
                SocketAddr::from(([0, 0, 0, 0], 5000)),
            )?,
            facepp,
            database_url,
            match_threshold,
            max_upload_bytes: parse_or(&get, "SECUREFACE_MAX_UPLOAD_BYTES", 10 * 1024 * 1024)?,
            alert: AlertConfig {
                smtp_host: get("SECUREFACE_SMTP_HOST").unwrap_or_else(|| "smtp.gmail.com".to_string()),
                smtp_username,
                smtp_password,
                sender,
                recipient,
            },
        })
    }
}

fn parse_value<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: format!("{raw:?}: {e}"),
    })
}

fn parse_required<T>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw = get(key).ok_or(ConfigError::Missing(key))?;
    parse_value(key, &raw)
}

fn parse_or<T>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match get(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}
