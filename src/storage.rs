use crate::errors::{AppError, AppResult};
use crate::models::{KeywordReport, NewKeywordReport};
use crate::sanitize::sanitize_text_field;

/// Report persistence as seen by the metrics processor.
pub trait ReportStore: Send + Sync {
    fn keywords_for_job(&self, job_id: &str) -> AppResult<Vec<String>>;
    fn store_keyword_report(&self, report: &NewKeywordReport) -> AppResult<i64>;
    fn get_report(&self, id: i64) -> AppResult<KeywordReport>;
}

/// Checks an insert payload and returns the sanitized keyword plus the JSON
/// text for `report_data`.
pub fn prepare_insert(report: &NewKeywordReport) -> AppResult<(String, String)> {
    let keyword = sanitize_text_field(&report.keyword);
    if keyword.is_empty() {
        return Err(AppError::Validation("Keyword is required.".to_string()));
    }
    let json = serde_json::to_string(&report.report_data)
        .map_err(|error| AppError::Serialization(format!("Failed to encode report data to JSON: {}", error)))?;
    Ok((keyword, json))
}

pub fn check_report_id(id: i64) -> AppResult<i64> {
    if id <= 0 {
        return Err(AppError::Validation(format!("Invalid report ID {}.", id)));
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::{check_report_id, prepare_insert};
    use crate::errors::AppError;
    use crate::models::NewKeywordReport;
    use serde_json::json;

    #[test]
    fn blank_keyword_is_rejected() {
        let report = NewKeywordReport::new("  <b></b> ", &json!({})).expect("report");
        let err = prepare_insert(&report).expect_err("blank keyword");
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn keyword_is_sanitized() {
        let report = NewKeywordReport::new(" long  tail\nseo ", &json!({"a": 1})).expect("report");
        let (keyword, json) = prepare_insert(&report).expect("valid");
        assert_eq!(keyword, "long tail seo");
        assert_eq!(json, r#"{"a":1}"#);
    }

    #[test]
    fn non_positive_ids_are_invalid() {
        assert!(matches!(check_report_id(0), Err(AppError::Validation(_))));
        assert!(matches!(check_report_id(-3), Err(AppError::Validation(_))));
        assert_eq!(check_report_id(7).expect("valid"), 7);
    }
}
