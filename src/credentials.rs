use crate::crypto::CredentialCipher;
use crate::errors::AppResult;
use crate::models::{Credential, TokenResponse};
use crate::store::TransientStore;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use std::sync::Arc;

pub const ACCESS_TOKEN_OPTION: &str = "kip_google_access_token";
pub const REFRESH_TOKEN_OPTION: &str = "kip_google_refresh_token";

const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Encrypted-at-rest OAuth tokens kept in the option store.
#[derive(Clone)]
pub struct CredentialStore {
    options: Arc<dyn TransientStore>,
    cipher: CredentialCipher,
}

impl CredentialStore {
    pub fn new(options: Arc<dyn TransientStore>, cipher: CredentialCipher) -> Self {
        Self { options, cipher }
    }

    pub fn refresh_token(&self) -> AppResult<Option<String>> {
        Ok(self
            .read_encrypted(REFRESH_TOKEN_OPTION)?
            .filter(|token| !token.is_empty()))
    }

    /// Loads the stored access token. A refresh token alone yields a
    /// credential that is already expired.
    pub fn load(&self) -> AppResult<Option<Credential>> {
        let refresh_token = self.refresh_token()?;
        let token = self
            .read_encrypted(ACCESS_TOKEN_OPTION)?
            .and_then(|raw| serde_json::from_str::<TokenResponse>(&raw).ok());

        let credential = match (token, refresh_token) {
            (Some(token), refresh_token) => match token.access_token.clone() {
                Some(access_token) => Some(Credential {
                    access_token,
                    refresh_token,
                    expires_at: expiry_of(&token),
                }),
                None => refresh_token.map(expired_with_refresh),
            },
            (None, Some(refresh_token)) => Some(expired_with_refresh(refresh_token)),
            (None, None) => None,
        };
        Ok(credential)
    }

    /// Persists whatever the token endpoint returned. The refresh token is
    /// only replaced when a new one is issued.
    pub fn save_token(&self, token: &TokenResponse) -> AppResult<Credential> {
        let mut stamped = token.clone();
        if stamped.created.is_none() {
            stamped.created = Some(Utc::now().timestamp());
        }

        if let Some(refresh_token) = stamped.refresh_token.as_deref() {
            let encrypted = self.cipher.encrypt(refresh_token)?;
            self.options
                .set(REFRESH_TOKEN_OPTION, &Value::String(encrypted), None)?;
        }
        if stamped.access_token.is_some() {
            let encrypted = self.cipher.encrypt(&serde_json::to_string(&stamped)?)?;
            self.options
                .set(ACCESS_TOKEN_OPTION, &Value::String(encrypted), None)?;
        }

        Ok(Credential {
            access_token: stamped.access_token.clone().unwrap_or_default(),
            refresh_token: match stamped.refresh_token.clone() {
                Some(token) => Some(token),
                None => self.refresh_token()?,
            },
            expires_at: expiry_of(&stamped),
        })
    }

    pub fn clear(&self) -> AppResult<()> {
        self.options.delete(REFRESH_TOKEN_OPTION)?;
        self.options.delete(ACCESS_TOKEN_OPTION)?;
        Ok(())
    }

    fn read_encrypted(&self, option: &str) -> AppResult<Option<String>> {
        let Some(value) = self.options.get(option)? else {
            return Ok(None);
        };
        let Some(encoded) = value.as_str() else {
            return Ok(None);
        };
        let decrypted = self.cipher.decrypt(encoded);
        if decrypted.is_none() {
            tracing::warn!(option = option, "stored credential could not be decrypted");
        }
        Ok(decrypted)
    }
}

fn expiry_of(token: &TokenResponse) -> DateTime<Utc> {
    let created = token
        .created
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .unwrap_or_else(Utc::now);
    let default_lifetime = chrono::Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS);
    token
        .expires_in
        .and_then(chrono::Duration::try_seconds)
        .and_then(|lifetime| created.checked_add_signed(lifetime))
        .or_else(|| created.checked_add_signed(default_lifetime))
        .unwrap_or(created)
}

fn expired_with_refresh(refresh_token: String) -> Credential {
    Credential {
        access_token: String::new(),
        refresh_token: Some(refresh_token),
        expires_at: DateTime::<Utc>::default(),
    }
}
