use async_trait::async_trait;
use keyword_insight_lib::analytics::auth::AccessTokenProvider;
use keyword_insight_lib::analytics::fetcher::{MetricsFetcher, MetricsSource};
use keyword_insight_lib::analytics::{
    AnalyticsApi, DateRangeValues, GetReportsRequest, GetReportsResponse, Report, ReportData, ReportRow,
};
use keyword_insight_lib::db::Database;
use keyword_insight_lib::mail::MailTransport;
use keyword_insight_lib::storage::ReportStore;
use keyword_insight_lib::{AppConfig, AppContext, AppError, AppResult, Collaborators};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

struct CannedMetrics {
    rows: Vec<Value>,
}

#[async_trait]
impl MetricsSource for CannedMetrics {
    async fn fetch_metrics(&self, _keywords: &[String]) -> AppResult<Vec<Value>> {
        Ok(self.rows.clone())
    }
}

#[derive(Default)]
struct Outbox {
    sent: Mutex<Vec<String>>,
}

#[async_trait]
impl MailTransport for Outbox {
    async fn send(&self, _to: &str, subject: &str, _body: &str) -> AppResult<()> {
        self.sent.lock().expect("outbox").push(subject.to_string());
        Ok(())
    }
}

fn config(dir: &std::path::Path) -> AppConfig {
    AppConfig {
        data_dir: dir.to_path_buf(),
        admin_email: "admin@example.com".to_string(),
        ..AppConfig::default()
    }
}

fn context(dir: &std::path::Path, metrics: Arc<dyn MetricsSource>) -> AppContext {
    let config = config(dir);
    let db = Arc::new(Database::new(&config.database_path()).expect("open database"));
    AppContext::assemble(
        config,
        db,
        Collaborators {
            metrics,
            mail: Arc::new(Outbox::default()),
            completion: None,
        },
    )
    .expect("assemble context")
}

#[tokio::test]
async fn job_run_stores_valid_rows_and_raises_notice() {
    let dir = tempfile::tempdir().expect("tempdir");
    let metrics = Arc::new(CannedMetrics {
        rows: vec![
            json!({"keyword": "seo", "date": "2026-10-18", "clicks": "12", "impressions": "400", "ctr": "0.03", "position": "2.5"}),
            json!({"keyword": "ppc", "date": "2026-10-18", "clicks": "nope", "impressions": "10", "ctr": "0.1", "position": "9"}),
        ],
    });
    let context = context(dir.path(), metrics);
    context
        .db
        .set_job_keywords("job-1", &["seo".to_string(), "ppc".to_string()])
        .expect("job keywords");

    let summary = context.processor.handle_job("job-1").await;
    assert_eq!(summary.stored, 1);
    assert_eq!(summary.validated, 1);

    let stored = context.db.get_report(1).expect("get report");
    assert_eq!(stored.keyword, "seo");
    assert_eq!(stored.report_data["job_id"], json!("job-1"));
    assert_eq!(stored.report_data["clicks"], json!(12));
    assert!(matches!(context.db.get_report(2), Err(AppError::NotFound(_))));

    assert_eq!(context.scheduler.pending().await.len(), 1);
    assert_eq!(
        context.hooks.render_notices(),
        vec!["KeywordInsight Pro: Recorded clicks (12) fell below the threshold (100).".to_string()]
    );
    assert!(context.hooks.render_notices().is_empty());
}

#[tokio::test]
async fn alert_state_survives_a_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let rows = vec![json!({"keyword": "seo", "date": "2026-10-18", "clicks": 5, "impressions": 50, "ctr": 0.1, "position": 1.0})];

    {
        let context = context(dir.path(), Arc::new(CannedMetrics { rows: rows.clone() }));
        context.db.set_job_keywords("job-1", &["seo".to_string()]).expect("job keywords");
        context.processor.handle_job("job-1").await;
        assert_eq!(context.scheduler.pending().await.len(), 1);
    }

    let context = context(dir.path(), Arc::new(CannedMetrics { rows }));
    let summary = context.processor.handle_job("job-1").await;
    assert_eq!(summary.stored, 1);
    assert!(context.scheduler.pending().await.is_empty());
    assert_eq!(context.db.get_report(2).expect("second run").keyword, "seo");
}

#[tokio::test]
async fn shutdown_drops_alerts_that_have_not_fired() {
    let dir = tempfile::tempdir().expect("tempdir");
    let rows = vec![json!({"keyword": "seo", "date": "2026-10-18", "clicks": 5, "impressions": 50, "ctr": 0.1, "position": 1.0})];
    let context = context(dir.path(), Arc::new(CannedMetrics { rows }));
    context.db.set_job_keywords("job-1", &["seo".to_string()]).expect("job keywords");

    context.processor.handle_job("job-1").await;
    assert_eq!(context.scheduler.pending().await.len(), 1);

    context.shutdown().await;
    assert!(context.scheduler.pending().await.is_empty());
    assert!(!context.recurring.is_scheduled());
}

struct StaticToken;

#[async_trait]
impl AccessTokenProvider for StaticToken {
    async fn access_token(&self) -> AppResult<String> {
        Ok("token".to_string())
    }
}

struct KeywordEcho {
    requests: Mutex<usize>,
}

#[async_trait]
impl AnalyticsApi for KeywordEcho {
    async fn batch_get(&self, _access_token: &str, body: &GetReportsRequest) -> AppResult<GetReportsResponse> {
        *self.requests.lock().expect("requests") += 1;
        let keywords = &body.report_requests[0].dimension_filter_clauses[0].filters[0].expressions;
        let rows = keywords
            .iter()
            .map(|keyword| ReportRow {
                dimensions: vec![keyword.clone()],
                metrics: vec![DateRangeValues {
                    values: vec!["3".to_string(), "90".to_string(), "0.033".to_string(), "4.1".to_string()],
                }],
            })
            .collect();
        Ok(GetReportsResponse {
            reports: vec![Report {
                data: ReportData { rows },
                ..Report::default()
            }],
        })
    }
}

#[tokio::test]
async fn fetched_analytics_rows_flow_into_storage() {
    let dir = tempfile::tempdir().expect("tempdir");
    let api = Arc::new(KeywordEcho {
        requests: Mutex::new(0),
    });
    let fetcher = Arc::new(MetricsFetcher::new(api.clone(), Arc::new(StaticToken), "987654"));
    let context = context(dir.path(), fetcher);

    let keywords: Vec<String> = (0..12).map(|index| format!("keyword {}", index)).collect();
    context.db.set_job_keywords("job-7", &keywords).expect("job keywords");

    let summary = context.processor.handle_job("job-7").await;
    assert_eq!(*api.requests.lock().expect("requests"), 2);
    assert_eq!(summary.candidates, 12);
    assert_eq!(summary.stored, 12);

    let last = context.db.get_report(12).expect("last report");
    assert_eq!(last.keyword, "keyword 11");
    assert_eq!(last.report_data["impressions"], json!(90));
}
