use crate::analytics::fetcher::MetricsSource;
use crate::errors::{AppError, AppResult};
use crate::hooks::MetricsListener;
use crate::models::{numeric_value, JobSummary, MetricRow, NewKeywordReport};
use crate::storage::ReportStore;
use serde_json::{Map, Value};
use std::sync::Arc;

pub const REQUIRED_KEYS: [&str; 6] = ["keyword", "date", "clicks", "impressions", "ctr", "position"];

/// A candidate row that passed validation, with its numeric fields coerced.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedMetric {
    pub row: MetricRow,
    /// The full candidate object, coerced values included.
    pub payload: Map<String, Value>,
}

/// Runs one job: keywords, fetch, validate, store, notify.
pub struct MetricsProcessor {
    reports: Arc<dyn ReportStore>,
    source: Arc<dyn MetricsSource>,
    listeners: Vec<Arc<dyn MetricsListener>>,
}

impl MetricsProcessor {
    pub fn new(
        reports: Arc<dyn ReportStore>,
        source: Arc<dyn MetricsSource>,
        listeners: Vec<Arc<dyn MetricsListener>>,
    ) -> Self {
        Self {
            reports,
            source,
            listeners,
        }
    }

    /// Never fails; problems are logged and reflected in the summary.
    pub async fn handle_job(&self, job_id: &str) -> JobSummary {
        let mut summary = JobSummary {
            job_id: job_id.to_string(),
            ..JobSummary::default()
        };
        match self.process(job_id, &mut summary).await {
            Ok(true) => {
                tracing::info!(job_id = %job_id, stored = summary.stored, failed = summary.failed, "job processed");
            }
            Ok(false) => {}
            Err(error) => {
                tracing::error!(job_id = %job_id, error = %error, "error processing job");
            }
        }
        summary
    }

    async fn process(&self, job_id: &str, summary: &mut JobSummary) -> AppResult<bool> {
        let keywords = self.reports.keywords_for_job(job_id)?;
        if keywords.is_empty() {
            tracing::warn!(job_id = %job_id, "no keywords found for job");
            return Ok(false);
        }

        let candidates = self.source.fetch_metrics(&keywords).await?;
        summary.candidates = candidates.len();
        if candidates.is_empty() {
            tracing::warn!(job_id = %job_id, "no metrics returned for job");
            return Ok(false);
        }

        let validated = validate_metrics(&candidates);
        summary.validated = validated.len();
        if validated.is_empty() {
            tracing::warn!(job_id = %job_id, "no valid metrics after validation");
            return Ok(false);
        }

        for (index, metric) in validated.iter().enumerate() {
            match self.store_metric(job_id, metric) {
                Ok(id) => {
                    summary.stored += 1;
                    tracing::debug!(job_id = %job_id, index, report_id = id, "metric stored");
                }
                Err(error) => {
                    summary.failed += 1;
                    tracing::error!(job_id = %job_id, index, keyword = %metric.row.keyword, error = %error, "failed to store metric");
                }
            }
        }

        let rows: Vec<MetricRow> = validated.into_iter().map(|metric| metric.row).collect();
        for listener in &self.listeners {
            listener.after_metrics_fetch(&rows).await;
        }
        Ok(true)
    }

    fn store_metric(&self, job_id: &str, metric: &ValidatedMetric) -> AppResult<i64> {
        let mut report_data = Map::new();
        report_data.insert("job_id".to_string(), Value::String(job_id.to_string()));
        report_data.extend(metric.payload.clone());

        let mut payload = Map::new();
        payload.insert("keyword".to_string(), Value::String(metric.row.keyword.clone()));
        for field in ["search_volume", "difficulty"] {
            if let Some(value) = metric.payload.get(field) {
                payload.insert(field.to_string(), value.clone());
            }
        }
        payload.insert("report_data".to_string(), Value::Object(report_data));
        self.reports
            .store_keyword_report(&NewKeywordReport::from_payload(&Value::Object(payload)))
    }
}

/// Keeps candidates that carry every required key with usable types. Each
/// rejected row is logged; the rest of the batch is unaffected.
pub fn validate_metrics(candidates: &[Value]) -> Vec<ValidatedMetric> {
    candidates
        .iter()
        .enumerate()
        .filter_map(|(index, candidate)| match validate_metric(candidate) {
            Ok(metric) => Some(metric),
            Err(error) => {
                tracing::warn!(index, error = %error, "metric skipped");
                None
            }
        })
        .collect()
}

fn validate_metric(candidate: &Value) -> AppResult<ValidatedMetric> {
    let Value::Object(object) = candidate else {
        return Err(AppError::Validation("metric is not an object".to_string()));
    };

    let missing: Vec<&str> = REQUIRED_KEYS
        .iter()
        .copied()
        .filter(|key| !object.contains_key(*key))
        .collect();
    if !missing.is_empty() {
        return Err(AppError::Validation(format!(
            "missing required keys: {}",
            missing.join(", ")
        )));
    }

    let text = |key: &str| object.get(key).and_then(Value::as_str).map(str::to_string);
    let number = |key: &str| object.get(key).and_then(numeric_value);
    let (Some(keyword), Some(date), Some(clicks), Some(impressions), Some(ctr), Some(position)) = (
        text("keyword"),
        text("date"),
        number("clicks"),
        number("impressions"),
        number("ctr"),
        number("position"),
    ) else {
        let wrong: Vec<&str> = REQUIRED_KEYS
            .iter()
            .copied()
            .filter(|key| match *key {
                "keyword" | "date" => text(*key).is_none(),
                _ => number(*key).is_none(),
            })
            .collect();
        return Err(AppError::Validation(format!(
            "invalid data types: {}",
            wrong.join(", ")
        )));
    };

    let row = MetricRow {
        keyword,
        date,
        clicks: clicks.trunc() as i64,
        impressions: impressions.trunc() as i64,
        ctr,
        position,
    };
    let mut payload = object.clone();
    payload.insert("clicks".to_string(), Value::from(row.clicks));
    payload.insert("impressions".to_string(), Value::from(row.impressions));
    payload.insert("ctr".to_string(), Value::from(row.ctr));
    payload.insert("position".to_string(), Value::from(row.position));

    Ok(ValidatedMetric { row, payload })
}

#[cfg(test)]
mod tests {
    use super::{validate_metrics, MetricsProcessor};
    use crate::analytics::fetcher::MetricsSource;
    use crate::errors::{AppError, AppResult};
    use crate::hooks::MetricsListener;
    use crate::models::{KeywordReport, MetricRow, NewKeywordReport};
    use crate::storage::ReportStore;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct FakeStore {
        keywords: Vec<String>,
        fail_on_attempt: Option<usize>,
        attempts: AtomicUsize,
        stored: Mutex<Vec<NewKeywordReport>>,
    }

    impl ReportStore for FakeStore {
        fn keywords_for_job(&self, _job_id: &str) -> AppResult<Vec<String>> {
            Ok(self.keywords.clone())
        }

        fn store_keyword_report(&self, report: &NewKeywordReport) -> AppResult<i64> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on_attempt == Some(attempt) {
                return Err(AppError::Internal("Could not insert keyword report".to_string()));
            }
            let mut stored = self.stored.lock().expect("stored");
            stored.push(report.clone());
            Ok(stored.len() as i64)
        }

        fn get_report(&self, id: i64) -> AppResult<KeywordReport> {
            Err(AppError::NotFound(format!("Report {} not found", id)))
        }
    }

    struct FakeSource {
        rows: AppResult<Vec<Value>>,
        requested: Mutex<Vec<String>>,
    }

    impl FakeSource {
        fn returning(rows: Vec<Value>) -> Arc<Self> {
            Arc::new(Self {
                rows: Ok(rows),
                requested: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl MetricsSource for FakeSource {
        async fn fetch_metrics(&self, keywords: &[String]) -> AppResult<Vec<Value>> {
            self.requested.lock().expect("requested").extend(keywords.iter().cloned());
            match &self.rows {
                Ok(rows) => Ok(rows.clone()),
                Err(error) => Err(AppError::Http(error.to_string())),
            }
        }
    }

    #[derive(Default)]
    struct RecordingListener {
        batches: Mutex<Vec<Vec<MetricRow>>>,
    }

    #[async_trait]
    impl MetricsListener for RecordingListener {
        async fn after_metrics_fetch(&self, rows: &[MetricRow]) {
            self.batches.lock().expect("batches").push(rows.to_vec());
        }
    }

    fn valid(keyword: &str) -> Value {
        json!({
            "keyword": keyword,
            "date": "2026-10-18",
            "clicks": "12",
            "impressions": 340,
            "ctr": "0.035",
            "position": 4.2
        })
    }

    fn store_with(keywords: &[&str]) -> FakeStore {
        FakeStore {
            keywords: keywords.iter().map(|keyword| keyword.to_string()).collect(),
            ..FakeStore::default()
        }
    }

    #[test]
    fn validation_drops_exactly_the_bad_rows() {
        let mut missing_ctr = valid("missing");
        missing_ctr.as_object_mut().expect("object").remove("ctr");
        let mut numeric_keyword = valid("typed");
        numeric_keyword["keyword"] = json!(42);
        let mut text_clicks = valid("clicks");
        text_clicks["clicks"] = json!("many");

        let candidates = vec![
            valid("first"),
            missing_ctr,
            numeric_keyword,
            json!("not an object"),
            text_clicks,
            valid("last"),
        ];
        let validated = validate_metrics(&candidates);
        let keywords: Vec<&str> = validated.iter().map(|metric| metric.row.keyword.as_str()).collect();
        assert_eq!(keywords, vec!["first", "last"]);
    }

    #[test]
    fn numeric_fields_are_coerced() {
        let mut candidate = valid("seo");
        candidate["clicks"] = json!("7.9");
        let validated = validate_metrics(&[candidate]);
        let metric = &validated[0];
        assert_eq!(metric.row.clicks, 7);
        assert_eq!(metric.row.impressions, 340);
        assert!((metric.row.ctr - 0.035).abs() < f64::EPSILON);
        assert_eq!(metric.payload["clicks"], json!(7));
        assert_eq!(metric.payload["ctr"], json!(0.035));
    }

    #[tokio::test]
    async fn one_failed_insert_does_not_stop_the_batch() {
        let store = Arc::new(FakeStore {
            fail_on_attempt: Some(10),
            ..store_with(&["seo"])
        });
        let rows = (1..=23).map(|index| valid(&format!("kw-{}", index))).collect();
        let processor = MetricsProcessor::new(store.clone(), FakeSource::returning(rows), Vec::new());

        let summary = processor.handle_job("job-1").await;
        assert_eq!(store.attempts.load(Ordering::SeqCst), 23);
        assert_eq!(summary.stored, 22);
        assert_eq!(summary.failed, 1);

        let stored = store.stored.lock().expect("stored");
        assert_eq!(stored.len(), 22);
        assert!(stored.iter().all(|report| report.keyword != "kw-10"));
        assert_eq!(stored[9].keyword, "kw-11");
    }

    #[tokio::test]
    async fn job_rows_are_tagged_and_listeners_see_the_valid_batch() {
        let store = Arc::new(store_with(&["seo", "ppc"]));
        let mut malformed = valid("ppc");
        malformed.as_object_mut().expect("object").remove("position");
        let source = FakeSource::returning(vec![valid("seo"), malformed]);
        let listener = Arc::new(RecordingListener::default());
        let processor = MetricsProcessor::new(store.clone(), source.clone(), vec![listener.clone()]);

        let summary = processor.handle_job("job-1").await;
        assert_eq!(summary.candidates, 2);
        assert_eq!(summary.validated, 1);
        assert_eq!(summary.stored, 1);
        assert_eq!(*source.requested.lock().expect("requested"), vec!["seo", "ppc"]);

        let stored = store.stored.lock().expect("stored");
        assert_eq!(stored[0].report_data["job_id"], json!("job-1"));
        assert_eq!(stored[0].report_data["clicks"], json!(12));

        let batches = listener.batches.lock().expect("batches");
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 1);
    }

    #[tokio::test]
    async fn numeric_volume_and_difficulty_fill_report_columns() {
        let store = Arc::new(store_with(&["seo", "ppc"]));
        let mut seo = valid("seo");
        seo["search_volume"] = json!("1200");
        seo["difficulty"] = json!(0.4);
        let mut ppc = valid("ppc");
        ppc["search_volume"] = json!("n/a");
        let processor = MetricsProcessor::new(store.clone(), FakeSource::returning(vec![seo, ppc]), Vec::new());

        assert_eq!(processor.handle_job("job-2").await.stored, 2);
        let stored = store.stored.lock().expect("stored");
        assert_eq!(stored[0].search_volume, Some(1200));
        assert_eq!(stored[0].difficulty, Some(0.4));
        assert_eq!(stored[1].search_volume, None);
        assert_eq!(stored[1].difficulty, None);
        assert_eq!(stored[1].report_data["search_volume"], json!("n/a"));
    }

    #[tokio::test]
    async fn empty_stages_abort_without_storing() {
        let listener = Arc::new(RecordingListener::default());

        let store = Arc::new(store_with(&[]));
        let processor = MetricsProcessor::new(store.clone(), FakeSource::returning(vec![valid("seo")]), vec![listener.clone()]);
        assert_eq!(processor.handle_job("job-1").await.candidates, 0);

        let store = Arc::new(store_with(&["seo"]));
        let processor = MetricsProcessor::new(store.clone(), FakeSource::returning(Vec::new()), vec![listener.clone()]);
        assert_eq!(processor.handle_job("job-1").await.stored, 0);

        let processor = MetricsProcessor::new(
            store.clone(),
            FakeSource::returning(vec![json!({"keyword": "seo"})]),
            vec![listener.clone()],
        );
        let summary = processor.handle_job("job-1").await;
        assert_eq!((summary.candidates, summary.validated), (1, 0));

        assert_eq!(store.attempts.load(Ordering::SeqCst), 0);
        assert!(listener.batches.lock().expect("batches").is_empty());
    }

    #[tokio::test]
    async fn fetch_failure_is_swallowed() {
        let store = Arc::new(store_with(&["seo"]));
        let source = Arc::new(FakeSource {
            rows: Err(AppError::Authentication("Please reconnect.".to_string())),
            requested: Mutex::new(Vec::new()),
        });
        let processor = MetricsProcessor::new(store.clone(), source, Vec::new());
        let summary = processor.handle_job("job-1").await;
        assert_eq!(summary.stored, 0);
        assert_eq!(summary.job_id, "job-1");
    }
}
