//! Poller configuration
//!
//! Defines the connection settings for the library API, the system account
//! used to authenticate, and the timing of the fetch and dispatch loops.

use chrono_tz::Tz;
use duewatch_core::domain::DueKind;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::service::QueueOrder;

/// Log output format for the fmt layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    /// Reads `LOG_FORMAT`, defaulting to text
    pub fn from_env() -> Self {
        match std::env::var("LOG_FORMAT") {
            Ok(value) if value.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }
}

/// Poller configuration
#[derive(Clone)]
pub struct Config {
    /// Identifier stamped on this instance's log spans
    pub instance_id: String,

    /// Library API base URL (e.g., "http://localhost:8000")
    pub api_url: String,

    /// System account e-mail
    pub email: String,

    /// System account password
    pub password: String,

    /// Which due-items resource this instance watches
    pub kind: DueKind,

    /// Fetch period; also the length of each fetch window
    pub fetch_interval: Duration,

    /// How long the dispatcher waits between checks of an empty queue
    pub idle_poll: Duration,

    /// Zone used for fetch windows and due-date display
    pub timezone: Tz,

    /// Pending queue discipline
    pub queue_order: QueueOrder,

    /// JSON-lines file receiving items whose submission failed
    pub dead_letter_path: Option<PathBuf>,

    /// Per-request HTTP timeout
    pub http_timeout: Duration,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(api_url: String, email: String, password: String) -> Self {
        Self {
            instance_id: uuid::Uuid::new_v4().to_string(),
            api_url,
            email,
            password,
            kind: DueKind::Borrow,
            fetch_interval: Duration::from_secs(10 * 60),
            idle_poll: Duration::from_secs(1),
            timezone: chrono_tz::Asia::Tbilisi,
            queue_order: QueueOrder::DueTime,
            dead_letter_path: None,
            http_timeout: Duration::from_secs(30),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - SYSTEM_PASSWORD (required)
    /// - DUEWATCH_API_URL (optional, default: http://localhost:8000)
    /// - DUEWATCH_EMAIL (optional, default: system@mail.com)
    /// - DUEWATCH_KIND (optional, borrow|reserve, default: borrow)
    /// - FETCH_INTERVAL_MINUTES (optional, default: 10)
    /// - IDLE_POLL_MILLIS (optional, default: 1000)
    /// - DUEWATCH_TIMEZONE (optional, IANA name, default: Asia/Tbilisi)
    /// - QUEUE_ORDER (optional, fifo|due, default: due)
    /// - DEAD_LETTER_PATH (optional)
    /// - HTTP_TIMEOUT_SECS (optional, default: 30)
    /// - INSTANCE_ID (optional, default: random UUID)
    pub fn from_env() -> anyhow::Result<Self> {
        let password = std::env::var("SYSTEM_PASSWORD")
            .map_err(|_| anyhow::anyhow!("SYSTEM_PASSWORD environment variable not set"))?;

        let api_url = std::env::var("DUEWATCH_API_URL")
            .unwrap_or_else(|_| "http://localhost:8000".to_string());

        let email =
            std::env::var("DUEWATCH_EMAIL").unwrap_or_else(|_| "system@mail.com".to_string());

        let mut config = Self::new(api_url, email, password);

        if let Ok(id) = std::env::var("INSTANCE_ID") {
            config.instance_id = id;
        }

        if let Some(kind) = parse_var::<DueKind>("DUEWATCH_KIND")? {
            config.kind = kind;
        }

        if let Some(minutes) = parse_var::<u64>("FETCH_INTERVAL_MINUTES")? {
            config.fetch_interval = Duration::from_secs(minutes * 60);
        }

        if let Some(millis) = parse_var::<u64>("IDLE_POLL_MILLIS")? {
            config.idle_poll = Duration::from_millis(millis);
        }

        if let Some(tz) = parse_var::<Tz>("DUEWATCH_TIMEZONE")? {
            config.timezone = tz;
        }

        if let Some(order) = parse_var::<QueueOrder>("QUEUE_ORDER")? {
            config.queue_order = order;
        }

        config.dead_letter_path = std::env::var_os("DEAD_LETTER_PATH").map(PathBuf::from);

        if let Some(secs) = parse_var::<u64>("HTTP_TIMEOUT_SECS")? {
            config.http_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_url.is_empty() {
            anyhow::bail!("api_url cannot be empty");
        }

        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            anyhow::bail!("api_url must start with http:// or https://");
        }

        if self.email.is_empty() {
            anyhow::bail!("email cannot be empty");
        }

        if self.password.is_empty() {
            anyhow::bail!("password cannot be empty");
        }

        if self.fetch_interval.is_zero() {
            anyhow::bail!("fetch_interval must be greater than 0");
        }

        if self.idle_poll.is_zero() {
            anyhow::bail!("idle_poll must be greater than 0");
        }

        if self.http_timeout.is_zero() {
            anyhow::bail!("http_timeout must be greater than 0");
        }

        Ok(())
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("instance_id", &self.instance_id)
            .field("api_url", &self.api_url)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("kind", &self.kind)
            .field("fetch_interval", &self.fetch_interval)
            .field("idle_poll", &self.idle_poll)
            .field("timezone", &self.timezone)
            .field("queue_order", &self.queue_order)
            .field("dead_letter_path", &self.dead_letter_path)
            .field("http_timeout", &self.http_timeout)
            .finish()
    }
}

/// Parses an optional environment variable, failing on values that are set but invalid
fn parse_var<T>(name: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("invalid {}='{}': {}", name, raw, e)),
        Err(_) => Ok(None),
    }
}
