use crate::analytics::auth::{Authenticator, GoogleTokenClient};
use crate::analytics::client::GoogleAnalyticsClient;
use crate::analytics::fetcher::{MetricsFetcher, MetricsSource};
use crate::cache::Cache;
use crate::completion::openai::OpenAiClient;
use crate::completion::CompletionClient;
use crate::config::AppConfig;
use crate::credentials::CredentialStore;
use crate::crypto::CredentialCipher;
use crate::db::Database;
use crate::errors::AppResult;
use crate::hooks::{Component, HookRegistry};
use crate::jobs::RecurringJobScheduler;
use crate::mail::{transport_from_config, MailTransport};
use crate::notifier::ThresholdNotifier;
use crate::outline::KeywordOutlineGenerator;
use crate::processor::MetricsProcessor;
use crate::scheduler::{Scheduler, CLICKS_ALERT_HOOK};
use crate::settings::SettingsManager;
use crate::storage::ReportStore;
use crate::store::TransientStore;
use std::sync::Arc;
use std::time::Duration;

const DEFERRED_CONCURRENCY: usize = 2;
const DEFERRED_QUEUE_SIZE: usize = 256;

/// External services the pipeline talks to.
pub struct Collaborators {
    pub metrics: Arc<dyn MetricsSource>,
    pub mail: Arc<dyn MailTransport>,
    pub completion: Option<Arc<dyn CompletionClient>>,
}

/// Every long-lived component, built once at startup and passed by
/// reference from there.
pub struct AppContext {
    pub config: AppConfig,
    pub db: Arc<Database>,
    pub cache: Cache,
    pub settings: Arc<SettingsManager>,
    pub scheduler: Scheduler,
    pub notifier: Arc<ThresholdNotifier>,
    pub hooks: HookRegistry,
    pub processor: Arc<MetricsProcessor>,
    pub recurring: Arc<RecurringJobScheduler>,
    pub outline: Option<KeywordOutlineGenerator>,
}

impl AppContext {
    /// Opens the database under the data dir and wires the live HTTP clients.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let db = Arc::new(Database::new(&config.database_path())?);
        let timeout = Duration::from_secs(config.http_timeout_secs.max(1));

        let cipher = CredentialCipher::from_secret(&config.resolve_site_secret()?)?;
        let credentials = CredentialStore::new(db.clone(), cipher);
        let endpoint = GoogleTokenClient::new(&config.google, timeout)?;
        let authenticator = Arc::new(Authenticator::new(
            config.google.clone(),
            credentials,
            Box::new(endpoint),
        ));
        let api = Arc::new(GoogleAnalyticsClient::new(&config.google.api_url, timeout)?);
        let metrics = Arc::new(MetricsFetcher::new(api, authenticator, config.google.view_id.clone()));

        let mail: Arc<dyn MailTransport> = Arc::from(transport_from_config(&config.mail, timeout)?);
        let completion: Option<Arc<dyn CompletionClient>> = match config
            .openai
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
        {
            Some(key) => Some(Arc::new(
                OpenAiClient::new(key, timeout)?.with_base_url(&config.openai.base_url),
            ) as Arc<dyn CompletionClient>),
            None => None,
        };

        Self::assemble(
            config,
            db,
            Collaborators {
                metrics,
                mail,
                completion,
            },
        )
    }

    pub fn assemble(config: AppConfig, db: Arc<Database>, collaborators: Collaborators) -> AppResult<Self> {
        let options: Arc<dyn TransientStore> = db.clone();
        let cache = Cache::new(options.clone());
        let settings = Arc::new(SettingsManager::new(options, config.click_threshold));
        settings.activate()?;

        let scheduler = Scheduler::new(DEFERRED_CONCURRENCY, DEFERRED_QUEUE_SIZE);
        let notifier = ThresholdNotifier::new(
            cache.clone(),
            settings.clone(),
            config.admin_email.clone(),
            collaborators.mail.clone(),
            scheduler.clone(),
            Duration::from_secs(config.jobs.alert_delay_secs),
        );

        let components: Vec<Arc<dyn Component>> = vec![notifier.clone() as Arc<dyn Component>];
        let hooks = HookRegistry::from_components(components);

        let reports: Arc<dyn ReportStore> = db.clone();
        let processor = Arc::new(MetricsProcessor::new(
            reports,
            collaborators.metrics,
            hooks.metrics_listeners(),
        ));
        let recurring = RecurringJobScheduler::new(
            processor.clone(),
            config.jobs.ids.clone(),
            Duration::from_secs(config.jobs.interval_secs.max(1)),
            Duration::from_secs(config.jobs.timeout_secs.max(1)),
            config.admin_email.clone(),
            collaborators.mail,
        );
        let outline = collaborators
            .completion
            .map(|client| KeywordOutlineGenerator::new(client, cache.clone(), config.openai.model.clone()));

        Ok(Self {
            config,
            db,
            cache,
            settings,
            scheduler,
            notifier,
            hooks,
            processor,
            recurring,
            outline,
        })
    }

    /// Starts deferred tasks and the recurring job.
    pub fn start(&self) {
        self.scheduler.start();
        self.recurring.activate();
    }

    /// Stops the recurring job and drops alerts that have not fired yet.
    pub async fn shutdown(&self) {
        self.recurring.deactivate();
        let cleared = self.scheduler.clear_hook(CLICKS_ALERT_HOOK).await;
        if cleared > 0 {
            tracing::info!(cleared, hook = CLICKS_ALERT_HOOK, "pending alerts cleared");
        }
    }
}
