use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_PREFIX: &str = "KEYWORD_INSIGHT_";
const KEYRING_SERVICE: &str = "keyword-insight";
const KEYRING_SECRET_ENTRY: &str = "site-secret";

/// Process configuration, read once at startup.
///
/// ```yaml
/// data_dir: /var/lib/keyword-insight
/// admin_email: ops@example.com
/// google:
///   client_id: "123.apps.googleusercontent.com"
///   client_secret: "..."
///   view_id: "987654"
/// jobs:
///   ids: ["job-1"]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub site_secret: Option<String>,
    pub admin_email: String,
    pub click_threshold: i64,
    pub http_timeout_secs: u64,
    pub google: GoogleConfig,
    pub openai: OpenAiConfig,
    pub mail: MailConfig,
    pub jobs: JobsConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            site_secret: None,
            admin_email: String::new(),
            click_threshold: 100,
            http_timeout_secs: 30,
            google: GoogleConfig::default(),
            openai: OpenAiConfig::default(),
            mail: MailConfig::default(),
            jobs: JobsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub view_id: String,
    /// One-time authorization code from the consent redirect.
    pub auth_code: Option<String>,
    pub auth_url: String,
    pub token_url: String,
    pub api_url: String,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: "http://localhost/keywordinsightpro/oauth".to_string(),
            view_id: String::new(),
            auth_code: None,
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            api_url: "https://analyticsreporting.googleapis.com/v4".to_string(),
        }
    }
}

impl GoogleConfig {
    pub fn ensure_complete(&self) -> AppResult<()> {
        if self.client_id.trim().is_empty()
            || self.client_secret.trim().is_empty()
            || self.view_id.trim().is_empty()
        {
            return Err(AppError::Configuration(
                "Google API credentials or view ID not configured.".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-3.5-turbo".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    /// HTTP endpoint accepting `{to, subject, body}`; mail is only logged when unset.
    pub relay_url: Option<String>,
    pub relay_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    pub ids: Vec<String>,
    pub interval_secs: u64,
    pub timeout_secs: u64,
    pub alert_delay_secs: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            ids: Vec::new(),
            interval_secs: 300,
            timeout_secs: 240,
            alert_delay_secs: 60,
        }
    }
}

impl AppConfig {
    /// Reads the YAML file when present, then applies `KEYWORD_INSIGHT_*`
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let mut config = match path {
            Some(path) if path.exists() => {
                let raw = std::fs::read_to_string(path)?;
                Self::from_yaml(&raw)?
            }
            Some(path) => {
                tracing::warn!(path = %path.display(), "config file not found, using defaults");
                Self::default()
            }
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> AppResult<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| {
            lookup(&format!("{}{}", ENV_PREFIX, suffix)).filter(|value| !value.trim().is_empty())
        };

        if let Some(value) = var("DATA_DIR") {
            self.data_dir = PathBuf::from(value);
        }
        if let Some(value) = var("SITE_SECRET") {
            self.site_secret = Some(value);
        }
        if let Some(value) = var("ADMIN_EMAIL") {
            self.admin_email = value;
        }
        if let Some(value) = var("CLICK_THRESHOLD").and_then(|raw| raw.trim().parse::<i64>().ok()) {
            self.click_threshold = value;
        }
        if let Some(value) = var("OPENAI_API_KEY") {
            self.openai.api_key = Some(value);
        }
        if let Some(value) = var("GOOGLE_CLIENT_ID") {
            self.google.client_id = value;
        }
        if let Some(value) = var("GOOGLE_CLIENT_SECRET") {
            self.google.client_secret = value;
        }
        if let Some(value) = var("GOOGLE_VIEW_ID") {
            self.google.view_id = value;
        }
        if let Some(value) = var("AUTH_CODE") {
            self.google.auth_code = Some(value);
        }
        if let Some(value) = var("MAIL_RELAY_URL") {
            self.mail.relay_url = Some(value);
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("state.sqlite")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    /// The configured secret, or one provisioned in the OS keyring on first use.
    pub fn resolve_site_secret(&self) -> AppResult<String> {
        if let Some(secret) = self.site_secret.as_deref().filter(|secret| !secret.is_empty()) {
            return Ok(secret.to_string());
        }

        let entry = keyring::Entry::new(KEYRING_SERVICE, KEYRING_SECRET_ENTRY)
            .map_err(|error| AppError::Configuration(error.to_string()))?;
        match entry.get_password() {
            Ok(secret) if !secret.is_empty() => Ok(secret),
            Ok(_) | Err(keyring::Error::NoEntry) => {
                let bytes: [u8; 32] = rand::random();
                let secret = hex::encode(bytes);
                entry
                    .set_password(&secret)
                    .map_err(|error| AppError::Configuration(error.to_string()))?;
                tracing::info!("provisioned a new site secret in the OS keyring");
                Ok(secret)
            }
            Err(error) => Err(AppError::Configuration(format!(
                "site secret is not defined and the keyring is unavailable: {}",
                error
            ))),
        }
    }
}
