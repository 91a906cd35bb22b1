use crate::cache::Cache;
use crate::errors::AppResult;
use crate::hooks::{Component, HookRegistry, MetricsListener, NoticeRenderer};
use crate::mail::MailTransport;
use crate::models::{MetricRow, ThresholdNotice};
use crate::sanitize::is_email;
use crate::scheduler::{DeferredTask, ScheduledTask, Scheduler};
use crate::settings::SettingsManager;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub const NOTICE_KEY: &str = "keywordinsight_clicks_below_threshold_notice";
pub const ALERT_SENT_KEY: &str = "keywordinsight_clicks_alert_sent";
pub const NOTICE_TTL: Duration = Duration::from_secs(60 * 60);
pub const ALERT_DEBOUNCE_TTL: Duration = Duration::from_secs(12 * 60 * 60);
pub const ALERT_SUBJECT: &str = "KeywordInsight Pro: Clicks Threshold Alert";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertDecision {
    AboveThreshold,
    /// Banner stored; an alert already went out inside the debounce window.
    NoticeOnly,
    EmailScheduled,
}

/// Raises a banner and a debounced email when site clicks drop under the
/// configured floor.
pub struct ThresholdNotifier {
    cache: Cache,
    settings: Arc<SettingsManager>,
    admin_email: String,
    mail: Arc<dyn MailTransport>,
    scheduler: Scheduler,
    alert_delay: Duration,
}

impl ThresholdNotifier {
    pub fn new(
        cache: Cache,
        settings: Arc<SettingsManager>,
        admin_email: impl Into<String>,
        mail: Arc<dyn MailTransport>,
        scheduler: Scheduler,
        alert_delay: Duration,
    ) -> Arc<Self> {
        let this = Arc::new(Self {
            cache,
            settings,
            admin_email: admin_email.into(),
            mail,
            scheduler: scheduler.clone(),
            alert_delay,
        });

        let weak = Arc::downgrade(&this);
        let attached = scheduler.set_executor(Arc::new(move |scheduled: ScheduledTask| {
            let weak = weak.clone();
            Box::pin(async move {
                let Some(strong) = weak.upgrade() else {
                    return true;
                };
                match scheduled.task {
                    DeferredTask::SendClicksAlert { clicks, threshold } => {
                        match strong.send_email(clicks, threshold).await {
                            Ok(_) => true,
                            Err(error) => {
                                tracing::error!(error = %error, clicks, threshold, "clicks alert email failed");
                                false
                            }
                        }
                    }
                }
            })
        }));
        if let Err(error) = attached {
            tracing::error!(error = %error, "could not attach deferred alert executor");
        }

        this
    }

    /// Sums clicks across the batch and checks the site total once.
    pub async fn check_thresholds(&self, rows: &[MetricRow]) -> AppResult<AlertDecision> {
        let clicks = rows.iter().fold(0i64, |total, row| total.saturating_add(row.clicks));
        self.check_clicks(clicks).await
    }

    pub async fn check_clicks(&self, clicks: i64) -> AppResult<AlertDecision> {
        let threshold = self.settings.click_threshold();
        if clicks >= threshold {
            return Ok(AlertDecision::AboveThreshold);
        }

        let decision = self.maybe_schedule_email(clicks, threshold).await?;
        self.cache
            .set_as(NOTICE_KEY, &ThresholdNotice { clicks, threshold }, NOTICE_TTL)?;
        tracing::info!(clicks, threshold, decision = ?decision, "clicks below threshold");
        Ok(decision)
    }

    async fn maybe_schedule_email(&self, clicks: i64, threshold: i64) -> AppResult<AlertDecision> {
        if self.alert_recently_sent() {
            return Ok(AlertDecision::NoticeOnly);
        }

        self.scheduler
            .schedule_once(DeferredTask::SendClicksAlert { clicks, threshold }, self.alert_delay)
            .await?;
        self.cache
            .set(ALERT_SENT_KEY, &serde_json::Value::Bool(true), ALERT_DEBOUNCE_TTL)?;
        Ok(AlertDecision::EmailScheduled)
    }

    fn alert_recently_sent(&self) -> bool {
        self.cache
            .get(ALERT_SENT_KEY)
            .is_some_and(|flag| flag.as_bool().unwrap_or(!flag.is_null()))
    }

    /// Returns `false` without sending when the admin address is not valid.
    pub async fn send_email(&self, clicks: i64, threshold: i64) -> AppResult<bool> {
        if !is_email(&self.admin_email) {
            tracing::warn!(admin_email = %self.admin_email, "skipping clicks alert; admin email is not valid");
            return Ok(false);
        }

        let body = format!(
            "Your site recorded {} clicks, which is below the threshold of {} clicks.",
            clicks, threshold
        );
        self.mail.send(&self.admin_email, ALERT_SUBJECT, &body).await?;
        Ok(true)
    }

    /// Consumes the pending notice. Notices with zero clicks or threshold are
    /// left in place and not returned.
    pub fn take_notice(&self) -> Option<ThresholdNotice> {
        let notice = self.cache.get_as::<ThresholdNotice>(NOTICE_KEY)?;
        if notice.clicks == 0 || notice.threshold == 0 {
            return None;
        }
        if let Err(error) = self.cache.delete(NOTICE_KEY) {
            tracing::warn!(error = %error, "could not clear threshold notice");
        }
        Some(notice)
    }

    pub fn render_admin_notice(&self) -> Option<String> {
        self.take_notice().map(|notice| {
            format!(
                "KeywordInsight Pro: Recorded clicks ({}) fell below the threshold ({}).",
                notice.clicks, notice.threshold
            )
        })
    }
}

#[async_trait]
impl MetricsListener for ThresholdNotifier {
    async fn after_metrics_fetch(&self, rows: &[MetricRow]) {
        if let Err(error) = self.check_thresholds(rows).await {
            tracing::error!(error = %error, rows = rows.len(), "threshold check failed");
        }
    }
}

impl NoticeRenderer for ThresholdNotifier {
    fn render_notice(&self) -> Option<String> {
        self.render_admin_notice()
    }
}

impl Component for ThresholdNotifier {
    fn name(&self) -> &'static str {
        "threshold-notifier"
    }

    fn register(self: Arc<Self>, registry: &mut HookRegistry) {
        registry.add_metrics_listener(self.clone());
        registry.add_notice_renderer(self);
    }
}
