use crate::config::MailConfig;
use crate::errors::{AppError, AppResult};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> AppResult<()>;
}

#[derive(Debug, Serialize)]
struct RelayMessage<'a> {
    to: &'a str,
    subject: &'a str,
    body: &'a str,
    content_type: &'a str,
}

/// Posts messages as JSON to an HTTP mail relay.
pub struct HttpMailTransport {
    http: reqwest::Client,
    relay_url: String,
    relay_token: Option<String>,
}

impl HttpMailTransport {
    pub fn new(relay_url: &str, relay_token: Option<String>, timeout: Duration) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| AppError::Configuration(format!("mail HTTP client: {}", error)))?;
        Ok(Self {
            http,
            relay_url: relay_url.to_string(),
            relay_token,
        })
    }
}

#[async_trait]
impl MailTransport for HttpMailTransport {
    async fn send(&self, to: &str, subject: &str, body: &str) -> AppResult<()> {
        let mut request = self.http.post(&self.relay_url).json(&RelayMessage {
            to,
            subject,
            body,
            content_type: "text/plain; charset=UTF-8",
        });
        if let Some(token) = self.relay_token.as_deref() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Http(format!("mail relay error ({}): {}", status, error_text)));
        }
        tracing::info!(to = to, subject = subject, "mail handed to relay");
        Ok(())
    }
}

/// Writes messages to the log instead of delivering them.
#[derive(Debug, Default)]
pub struct LogMailTransport;

#[async_trait]
impl MailTransport for LogMailTransport {
    async fn send(&self, to: &str, subject: &str, body: &str) -> AppResult<()> {
        tracing::warn!(to = to, subject = subject, body = body, "no mail relay configured; message logged only");
        Ok(())
    }
}

pub fn transport_from_config(config: &MailConfig, timeout: Duration) -> AppResult<Box<dyn MailTransport>> {
    match config.relay_url.as_deref().filter(|url| !url.trim().is_empty()) {
        Some(url) => Ok(Box::new(HttpMailTransport::new(url, config.relay_token.clone(), timeout)?)),
        None => Ok(Box::new(LogMailTransport)),
    }
}
