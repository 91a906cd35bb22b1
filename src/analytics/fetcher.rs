use super::auth::AccessTokenProvider;
use super::{
    AnalyticsApi, ColumnHeader, DateRange, Dimension, DimensionFilter, DimensionFilterClause, FilterOperator,
    GetReportsRequest, Metric, Report, ReportData, ReportRequest, KEYWORD_DIMENSION, MAX_FILTER_VALUES, METRIC_SET,
};
use crate::errors::{AppError, AppResult};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

pub const DEFAULT_START_DATE: &str = "30daysAgo";
pub const DEFAULT_END_DATE: &str = "today";

/// Result of a fetch. Failures are carried as a message instead of an error
/// so callers on the scheduled path never see one propagate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FetchOutcome {
    Reports { reports: Vec<Report> },
    Error { error: String },
}

impl FetchOutcome {
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Error { error } => Some(error.as_str()),
            Self::Reports { .. } => None,
        }
    }

    pub fn reports(&self) -> &[Report] {
        match self {
            Self::Reports { reports } => reports,
            Self::Error { .. } => &[],
        }
    }
}

/// Source of raw, not yet validated metric objects for a keyword list.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn fetch_metrics(&self, keywords: &[String]) -> AppResult<Vec<Value>>;
}

pub struct MetricsFetcher {
    api: Arc<dyn AnalyticsApi>,
    tokens: Arc<dyn AccessTokenProvider>,
    view_id: String,
}

impl MetricsFetcher {
    pub fn new(api: Arc<dyn AnalyticsApi>, tokens: Arc<dyn AccessTokenProvider>, view_id: impl Into<String>) -> Self {
        Self {
            api,
            tokens,
            view_id: view_id.into(),
        }
    }

    pub async fn fetch_metrics(&self, keywords: &[String], start_date: &str, end_date: &str) -> FetchOutcome {
        if keywords.is_empty() {
            return FetchOutcome::Reports { reports: Vec::new() };
        }

        match self.fetch_merged(keywords, start_date, end_date).await {
            Ok(report) => FetchOutcome::Reports { reports: vec![report] },
            Err(error) => {
                tracing::warn!(keywords = keywords.len(), error = %error, "metrics fetch failed");
                FetchOutcome::Error {
                    error: error.to_string(),
                }
            }
        }
    }

    async fn fetch_merged(&self, keywords: &[String], start_date: &str, end_date: &str) -> AppResult<Report> {
        let access_token = self.tokens.access_token().await?;

        let mut header: Option<ColumnHeader> = None;
        let mut rows = Vec::new();

        for (index, chunk) in keywords.chunks(MAX_FILTER_VALUES).enumerate() {
            let body = self.build_request(chunk, start_date, end_date);
            let response = self.api.batch_get(&access_token, &body).await?;
            let Some(report) = response.reports.into_iter().next() else {
                tracing::debug!(chunk = index, "analytics returned no report for chunk");
                continue;
            };

            match header.as_ref() {
                _ if report.column_header.is_empty() => {}
                None => header = Some(report.column_header.clone()),
                Some(expected) if *expected != report.column_header => {
                    return Err(AppError::Validation(format!(
                        "column header of chunk {} differs from the first chunk",
                        index
                    )));
                }
                Some(_) => {}
            }
            rows.extend(report.data.rows);
        }

        Ok(Report {
            column_header: header.unwrap_or_default(),
            data: ReportData { rows },
        })
    }

    pub fn build_request(&self, chunk: &[String], start_date: &str, end_date: &str) -> GetReportsRequest {
        GetReportsRequest {
            report_requests: vec![ReportRequest {
                view_id: self.view_id.clone(),
                date_ranges: vec![DateRange {
                    start_date: start_date.to_string(),
                    end_date: end_date.to_string(),
                }],
                metrics: METRIC_SET
                    .iter()
                    .map(|(expression, alias)| Metric {
                        expression: expression.to_string(),
                        alias: alias.to_string(),
                    })
                    .collect(),
                dimensions: vec![Dimension {
                    name: KEYWORD_DIMENSION.to_string(),
                }],
                dimension_filter_clauses: vec![DimensionFilterClause {
                    filters: vec![DimensionFilter {
                        dimension_name: KEYWORD_DIMENSION.to_string(),
                        operator: FilterOperator::InList,
                        expressions: chunk.to_vec(),
                    }],
                }],
            }],
        }
    }
}

#[async_trait]
impl MetricsSource for MetricsFetcher {
    async fn fetch_metrics(&self, keywords: &[String]) -> AppResult<Vec<Value>> {
        let outcome = MetricsFetcher::fetch_metrics(self, keywords, DEFAULT_START_DATE, DEFAULT_END_DATE).await;
        if let Some(error) = outcome.error_message() {
            return Err(AppError::Http(error.to_string()));
        }
        let date = chrono::Utc::now().date_naive().format("%Y-%m-%d").to_string();
        Ok(outcome
            .reports()
            .iter()
            .flat_map(|report| flatten_report(report, &date))
            .collect())
    }
}

/// Turns report rows into `{keyword, date, <metric alias>: value}` objects.
/// Values are left as the API returned them.
pub fn flatten_report(report: &Report, date: &str) -> Vec<Value> {
    let names = report.column_header.metric_names();
    let names: Vec<&str> = if names.is_empty() {
        METRIC_SET.iter().map(|(_, alias)| *alias).collect()
    } else {
        names
    };

    report
        .data
        .rows
        .iter()
        .map(|row| {
            let mut object = Map::new();
            if let Some(keyword) = row.dimensions.first() {
                object.insert("keyword".to_string(), Value::String(keyword.clone()));
            }
            object.insert("date".to_string(), Value::String(date.to_string()));
            if let Some(values) = row.metrics.first() {
                for (name, value) in names.iter().zip(values.values.iter()) {
                    object.insert(name.to_string(), Value::String(value.clone()));
                }
            }
            Value::Object(object)
        })
        .collect()
}
