use crate::errors::AppResult;
use crate::models::{numeric_value, PluginSettings};
use crate::sanitize::sanitize_text_field;
use crate::store::TransientStore;
use serde_json::Value;
use std::sync::Arc;

pub const SETTINGS_OPTION: &str = "ki_pro_settings";
pub const CLICK_THRESHOLD_OPTION: &str = "click_threshold";

/// Persisted plugin settings and the alert threshold override.
pub struct SettingsManager {
    options: Arc<dyn TransientStore>,
    default_threshold: i64,
}

impl SettingsManager {
    pub fn new(options: Arc<dyn TransientStore>, default_threshold: i64) -> Self {
        Self {
            options,
            default_threshold,
        }
    }

    /// Seeds default settings. Existing settings are left untouched.
    pub fn activate(&self) -> AppResult<bool> {
        if self.options.get(SETTINGS_OPTION)?.is_some() {
            return Ok(false);
        }
        let defaults = serde_json::to_value(PluginSettings::default())?;
        self.options.set(SETTINGS_OPTION, &defaults, None)?;
        tracing::info!(option = SETTINGS_OPTION, "default settings seeded");
        Ok(true)
    }

    pub fn load(&self) -> AppResult<PluginSettings> {
        let Some(raw) = self.options.get(SETTINGS_OPTION)? else {
            return Ok(PluginSettings::default());
        };
        Ok(sanitize_settings(&raw))
    }

    /// Sanitizes `input` and stores the result.
    pub fn save(&self, input: &Value) -> AppResult<PluginSettings> {
        let settings = sanitize_settings(input);
        self.options
            .set(SETTINGS_OPTION, &serde_json::to_value(&settings)?, None)?;
        Ok(settings)
    }

    pub fn click_threshold(&self) -> i64 {
        match self.options.get(CLICK_THRESHOLD_OPTION) {
            Ok(Some(value)) => numeric_value(&value)
                .map(|threshold| threshold.trunc() as i64)
                .unwrap_or(self.default_threshold),
            Ok(None) => self.default_threshold,
            Err(error) => {
                tracing::warn!(error = %error, "could not read click threshold; using default");
                self.default_threshold
            }
        }
    }

    pub fn set_click_threshold(&self, threshold: i64) -> AppResult<()> {
        self.options
            .set(CLICK_THRESHOLD_OPTION, &Value::from(threshold), None)?;
        Ok(())
    }
}

fn sanitize_settings(input: &Value) -> PluginSettings {
    let api_key = input
        .get("api_key")
        .and_then(Value::as_str)
        .map(sanitize_text_field)
        .unwrap_or_default();
    let update_interval = input
        .get("update_interval")
        .and_then(numeric_value)
        .map(|interval| interval.trunc().abs().min(u32::MAX as f64) as u32)
        .unwrap_or(1)
        .max(1);

    PluginSettings {
        api_key,
        update_interval,
    }
}
