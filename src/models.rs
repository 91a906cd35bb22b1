use crate::errors::AppResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OAuth credential as held in memory after decryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// Tokens count as expired 30 seconds before their recorded expiry.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .checked_sub_signed(chrono::Duration::seconds(30))
            .map_or(true, |edge| edge <= now)
    }
}

/// Token payload returned by the OAuth token endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRow {
    pub keyword: String,
    pub date: String,
    pub clicks: i64,
    pub impressions: i64,
    pub ctr: f64,
    pub position: f64,
}

/// Insert payload for the report table.
#[derive(Debug, Clone, PartialEq)]
pub struct NewKeywordReport {
    pub keyword: String,
    pub search_volume: Option<i64>,
    pub difficulty: Option<f64>,
    pub report_data: serde_json::Value,
}

impl NewKeywordReport {
    pub fn new<T: Serialize>(keyword: impl Into<String>, report_data: &T) -> AppResult<Self> {
        Ok(Self {
            keyword: keyword.into(),
            search_volume: None,
            difficulty: None,
            report_data: serde_json::to_value(report_data)?,
        })
    }

    /// Builds a report from a loosely typed payload. `search_volume` and
    /// `difficulty` are only taken when they are numeric; anything else is
    /// stored as null.
    pub fn from_payload(payload: &serde_json::Value) -> Self {
        let keyword = payload
            .get("keyword")
            .and_then(|value| value.as_str())
            .unwrap_or_default()
            .to_string();
        let search_volume = payload
            .get("search_volume")
            .and_then(numeric_value)
            .map(|value| value.trunc() as i64);
        let difficulty = payload.get("difficulty").and_then(numeric_value);
        let report_data = payload
            .get("report_data")
            .cloned()
            .unwrap_or_else(|| serde_json::Value::Array(Vec::new()));

        Self {
            keyword,
            search_volume,
            difficulty,
            report_data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordReport {
    pub id: i64,
    pub keyword: String,
    pub search_volume: Option<i64>,
    pub difficulty: Option<f64>,
    pub report_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdNotice {
    pub clicks: i64,
    pub threshold: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginSettings {
    pub api_key: String,
    pub update_interval: u32,
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            update_interval: 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub job_id: String,
    pub candidates: usize,
    pub validated: usize,
    pub stored: usize,
    pub failed: usize,
}

/// Numeric coercion in the loose sense: JSON numbers and strings that parse
/// as finite numbers.
pub fn numeric_value(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(number) => number.as_f64(),
        serde_json::Value::String(text) => text
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|parsed| parsed.is_finite()),
        _ => None,
    }
}
