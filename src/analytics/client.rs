use super::{AnalyticsApi, GetReportsRequest, GetReportsResponse};
use crate::errors::{AppError, AppResult};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

pub struct GoogleAnalyticsClient {
    http: reqwest::Client,
    api_url: String,
}

impl GoogleAnalyticsClient {
    pub fn new(api_url: &str, timeout: Duration) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("keyword-insight/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|error| AppError::Configuration(format!("analytics HTTP client: {}", error)))?;
        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl AnalyticsApi for GoogleAnalyticsClient {
    async fn batch_get(&self, access_token: &str, body: &GetReportsRequest) -> AppResult<GetReportsResponse> {
        let url = format!("{}/reports:batchGet", self.api_url);
        debug!(requests = body.report_requests.len(), "analytics batchGet");

        let response = self
            .http
            .post(&url)
            .bearer_auth(access_token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(AppError::Authentication(format!(
                "analytics API rejected the access token ({})",
                status
            )));
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Http(format!("analytics API error ({}): {}", status, error_text)));
        }

        Ok(response.json().await?)
    }
}
