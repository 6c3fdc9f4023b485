//! Client configuration.
//!
//! # Design
//! `CrmConfig` is validated when it is built: an empty URL, username or
//! password, or a zero timeout is a `CrmError::Config` raised immediately.
//! `from_env` follows the `CRM_*` variable convention and loads a `.env`
//! file first when one is present.

use std::time::Duration;

use crate::error::{CrmError, Result};

pub const ENV_URL: &str = "CRM_URL";
pub const ENV_USERNAME: &str = "CRM_USERNAME";
pub const ENV_PASSWORD: &str = "CRM_PASSWORD";
pub const ENV_TIMEOUT: &str = "CRM_TIMEOUT";
pub const ENV_DEBUG: &str = "CRM_DEBUG";
pub const ENV_VERIFY_SSL: &str = "CRM_VERIFY_SSL";

/// Default timeout applied to every request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Path of the REST entry point below the CRM's base URL.
pub const REST_PATH: &str = "/service/v4_1/rest.php";

const DEFAULT_APPLICATION_NAME: &str = "crm-core";

/// Connection settings for a CRM instance.
#[derive(Clone)]
pub struct CrmConfig {
    url: String,
    username: String,
    password: String,
    timeout: Duration,
    debug: bool,
    verify_ssl: bool,
    application_name: String,
}

impl std::fmt::Debug for CrmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrmConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("debug", &self.debug)
            .field("verify_ssl", &self.verify_ssl)
            .field("application_name", &self.application_name)
            .finish()
    }
}

impl CrmConfig {
    pub fn new(url: &str, username: &str, password: &str) -> Result<Self> {
        let config = Self {
            url: url.trim().trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
            timeout: DEFAULT_TIMEOUT,
            debug: false,
            verify_ssl: true,
            application_name: DEFAULT_APPLICATION_NAME.to_string(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Load from the process environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self> {
        check_dotenv(dotenvy::dotenv().map(|_| ()))?;
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load using an arbitrary variable lookup, e.g. a map in tests.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |name: &str| {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| CrmError::Config(format!("{name} is not set")))
        };
        let url = require(ENV_URL)?;
        let username = require(ENV_USERNAME)?;
        let password = require(ENV_PASSWORD)?;

        let mut config = Self::new(&url, &username, &password)?;

        if let Some(raw) = lookup(ENV_TIMEOUT) {
            let secs: u64 = raw
                .trim()
                .parse()
                .map_err(|_| CrmError::Config(format!("{ENV_TIMEOUT} must be a whole number of seconds, got '{raw}'")))?;
            config = config.with_timeout(Duration::from_secs(secs))?;
        }
        if let Some(raw) = lookup(ENV_DEBUG) {
            config.debug = parse_flag(ENV_DEBUG, &raw)?;
        }
        if let Some(raw) = lookup(ENV_VERIFY_SSL) {
            config.verify_ssl = parse_flag(ENV_VERIFY_SSL, &raw)?;
        }
        Ok(config)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.timeout = timeout;
        self.validate()?;
        Ok(self)
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_verify_ssl(mut self, verify_ssl: bool) -> Self {
        self.verify_ssl = verify_ssl;
        self
    }

    pub fn with_application_name(mut self, name: &str) -> Self {
        self.application_name = name.to_string();
        self
    }

    fn validate(&self) -> Result<()> {
        if self.url.is_empty() {
            return Err(CrmError::Config("url must not be empty".to_string()));
        }
        if self.username.is_empty() {
            return Err(CrmError::Config("username must not be empty".to_string()));
        }
        if self.password.is_empty() {
            return Err(CrmError::Config("password must not be empty".to_string()));
        }
        if self.timeout.is_zero() {
            return Err(CrmError::Config("timeout must be positive".to_string()));
        }
        Ok(())
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Full URL of the REST entry point.
    pub fn endpoint(&self) -> String {
        if self.url.ends_with("rest.php") {
            self.url.clone()
        } else {
            format!("{}{REST_PATH}", self.url)
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn verify_ssl(&self) -> bool {
        self.verify_ssl
    }

    pub fn application_name(&self) -> &str {
        &self.application_name
    }
}

/// A missing `.env` is normal outside development; an unreadable or
/// malformed one is a configuration error.
fn check_dotenv(loaded: std::result::Result<(), dotenvy::Error>) -> Result<()> {
    match loaded {
        Ok(()) => Ok(()),
        Err(e) if e.not_found() => Ok(()),
        Err(e) => Err(CrmError::Config(format!("failed to load .env: {e}"))),
    }
}

fn parse_flag(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(CrmError::Config(format!("{name} must be a boolean, got '{raw}'"))),
    }
}
