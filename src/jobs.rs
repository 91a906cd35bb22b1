use crate::mail::MailTransport;
use crate::models::JobSummary;
use crate::processor::MetricsProcessor;
use crate::sanitize::is_email;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub const RECURRING_JOB_HOOK: &str = "keywordinsightpro_recurring_job";
pub const CRON_ERROR_SUBJECT: &str = "KeywordInsightPro Cron Error";

#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle_job(&self, job_id: &str) -> JobSummary;
}

#[async_trait]
impl JobHandler for MetricsProcessor {
    async fn handle_job(&self, job_id: &str) -> JobSummary {
        MetricsProcessor::handle_job(self, job_id).await
    }
}

/// Fires every configured job on a fixed interval until deactivated.
pub struct RecurringJobScheduler {
    handler: Arc<dyn JobHandler>,
    job_ids: Vec<String>,
    interval: Duration,
    timeout: Duration,
    admin_email: String,
    mail: Arc<dyn MailTransport>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl RecurringJobScheduler {
    pub fn new(
        handler: Arc<dyn JobHandler>,
        job_ids: Vec<String>,
        interval: Duration,
        timeout: Duration,
        admin_email: impl Into<String>,
        mail: Arc<dyn MailTransport>,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler,
            job_ids,
            interval,
            timeout,
            admin_email: admin_email.into(),
            mail,
            ticker: Mutex::new(None),
        })
    }

    pub fn is_scheduled(&self) -> bool {
        match self.ticker.lock() {
            Ok(ticker) => ticker.as_ref().is_some_and(|handle| !handle.is_finished()),
            Err(_) => false,
        }
    }

    /// Starts the ticker unless one is already running.
    pub fn activate(self: &Arc<Self>) -> bool {
        let Ok(mut ticker) = self.ticker.lock() else {
            tracing::error!(hook = RECURRING_JOB_HOOK, "ticker lock poisoned");
            return false;
        };
        if ticker.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return false;
        }

        let this = Arc::clone(self);
        *ticker = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(this.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                this.run_recurring_jobs().await;
            }
        }));
        tracing::info!(hook = RECURRING_JOB_HOOK, interval_secs = self.interval.as_secs(), "recurring job scheduled");
        true
    }

    pub fn deactivate(&self) -> bool {
        let Ok(mut ticker) = self.ticker.lock() else {
            return false;
        };
        match ticker.take() {
            Some(handle) => {
                handle.abort();
                tracing::info!(hook = RECURRING_JOB_HOOK, "recurring job cleared");
                true
            }
            None => false,
        }
    }

    /// One tick: every job in order, each bounded by the run timeout.
    pub async fn run_recurring_jobs(&self) -> Vec<JobSummary> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let mut summaries = Vec::with_capacity(self.job_ids.len());

        for job_id in &self.job_ids {
            let handler = Arc::clone(&self.handler);
            let owned_job_id = job_id.clone();
            let mut handle = tokio::spawn(async move { handler.handle_job(&owned_job_id).await });

            match tokio::time::timeout(self.timeout, &mut handle).await {
                Ok(Ok(summary)) => summaries.push(summary),
                Ok(Err(join_error)) => {
                    let message = format!(
                        "KeywordInsightPro recurring job error: job {} failed in run {}: {}",
                        job_id, run_id, join_error
                    );
                    self.report_failure(&message).await;
                }
                Err(_) => {
                    handle.abort();
                    let message = format!(
                        "KeywordInsightPro recurring job error: job {} exceeded {}s in run {}",
                        job_id,
                        self.timeout.as_secs(),
                        run_id
                    );
                    self.report_failure(&message).await;
                }
            }
        }
        summaries
    }

    async fn report_failure(&self, message: &str) {
        tracing::error!(hook = RECURRING_JOB_HOOK, "{}", message);
        if !is_email(&self.admin_email) {
            return;
        }
        if let Err(error) = self.mail.send(&self.admin_email, CRON_ERROR_SUBJECT, message).await {
            tracing::error!(error = %error, "could not email cron error");
        }
    }
}
