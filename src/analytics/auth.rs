use crate::config::GoogleConfig;
use crate::credentials::CredentialStore;
use crate::errors::{AppError, AppResult};
use crate::models::TokenResponse;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Mutex;
use std::time::Duration;

pub const ANALYTICS_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/analytics.readonly";

/// OAuth token grants.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> AppResult<TokenResponse>;
    async fn exchange_code(&self, code: &str) -> AppResult<TokenResponse>;
}

/// Anything that can hand out a bearer token for the analytics API.
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    async fn access_token(&self) -> AppResult<String>;
}

pub struct GoogleTokenClient {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl GoogleTokenClient {
    pub fn new(config: &GoogleConfig, timeout: Duration) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| AppError::Configuration(format!("token HTTP client: {}", error)))?;
        Ok(Self {
            http,
            token_url: config.token_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
        })
    }

    async fn grant(&self, form: &[(&str, &str)]) -> AppResult<TokenResponse> {
        let mut params = vec![
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        params.extend_from_slice(form);

        let response = self.http.post(&self.token_url).form(&params).send().await?;
        let status = response.status();
        let body = response.text().await?;
        // Error grants come back as 4xx with a JSON body we still want to read.
        match serde_json::from_str::<TokenResponse>(&body) {
            Ok(token) => Ok(token),
            Err(_) => Err(AppError::Http(format!("token endpoint error ({}): {}", status, body))),
        }
    }
}

#[async_trait]
impl TokenEndpoint for GoogleTokenClient {
    async fn refresh(&self, refresh_token: &str) -> AppResult<TokenResponse> {
        self.grant(&[("grant_type", "refresh_token"), ("refresh_token", refresh_token)])
            .await
    }

    async fn exchange_code(&self, code: &str) -> AppResult<TokenResponse> {
        self.grant(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
        ])
        .await
    }
}

/// Keeps a usable access token in the credential store.
pub struct Authenticator {
    config: GoogleConfig,
    credentials: CredentialStore,
    endpoint: Box<dyn TokenEndpoint>,
    auth_code: Mutex<Option<String>>,
}

impl Authenticator {
    pub fn new(config: GoogleConfig, credentials: CredentialStore, endpoint: Box<dyn TokenEndpoint>) -> Self {
        let auth_code = config.auth_code.clone().filter(|code| !code.trim().is_empty());
        Self {
            config,
            credentials,
            endpoint,
            auth_code: Mutex::new(auth_code),
        }
    }

    /// URL the administrator must visit when no refresh token is stored.
    pub fn consent_url(&self) -> AppResult<String> {
        let url = reqwest::Url::parse_with_params(
            &self.config.auth_url,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", ANALYTICS_READONLY_SCOPE),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )
        .map_err(|error| AppError::Configuration(format!("invalid auth url: {}", error)))?;
        Ok(url.to_string())
    }

    pub async fn ensure_access_token(&self) -> AppResult<String> {
        self.config.ensure_complete()?;

        let stored = self.credentials.load()?;
        if let Some(credential) = stored.as_ref() {
            if !credential.access_token.is_empty() && !credential.is_expired(Utc::now()) {
                return Ok(credential.access_token.clone());
            }
        }

        let refresh_token = stored.and_then(|credential| credential.refresh_token);
        let response = match refresh_token {
            Some(refresh_token) => self.endpoint.refresh(&refresh_token).await,
            None => match self.take_auth_code()? {
                Some(code) => self.endpoint.exchange_code(&code).await,
                None => {
                    return Err(AppError::Authentication(format!(
                        "Authorization required. Grant access at {}",
                        self.consent_url()?
                    )))
                }
            },
        }
        .map_err(|error| AppError::Authentication(format!("token request failed: {}", error)))?;

        if let Some(error) = response.error.as_deref() {
            tracing::error!(
                error = error,
                description = response.error_description.as_deref().unwrap_or_default(),
                "Google token refresh error"
            );
            self.credentials.clear()?;
            return Err(AppError::Authentication(
                "Failed to refresh Google API token. Please reconnect.".to_string(),
            ));
        }

        let credential = self.credentials.save_token(&response)?;
        if credential.access_token.is_empty() {
            return Err(AppError::Authentication(
                "token endpoint returned no access token".to_string(),
            ));
        }
        tracing::info!(expires_at = %credential.expires_at, "refreshed analytics access token");
        Ok(credential.access_token)
    }

    fn take_auth_code(&self) -> AppResult<Option<String>> {
        let mut code = self
            .auth_code
            .lock()
            .map_err(|_| AppError::Internal("auth code mutex poisoned".to_string()))?;
        Ok(code.take())
    }
}

#[async_trait]
impl AccessTokenProvider for Authenticator {
    async fn access_token(&self) -> AppResult<String> {
        self.ensure_access_token().await
    }
}
