use super::Database;
use crate::errors::{AppError, AppResult};
use crate::models::{KeywordReport, NewKeywordReport};
use crate::storage::{check_report_id, prepare_insert, ReportStore};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

impl Database {
    /// Replaces the keyword list attached to a job, keeping caller order.
    pub fn set_job_keywords(&self, job_id: &str, keywords: &[String]) -> AppResult<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM job_keywords WHERE job_id = ?1", [job_id])?;
        let mut inserted = 0usize;
        for (position, keyword) in keywords.iter().enumerate() {
            let keyword = keyword.trim();
            if keyword.is_empty() {
                continue;
            }
            inserted += tx.execute(
                "INSERT OR IGNORE INTO job_keywords (job_id, position, keyword) VALUES (?1, ?2, ?3)",
                params![job_id, position as i64, keyword],
            )?;
        }
        tx.commit()?;
        Ok(inserted)
    }
}

impl ReportStore for Database {
    fn keywords_for_job(&self, job_id: &str) -> AppResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT keyword FROM job_keywords WHERE job_id = ?1 ORDER BY position ASC")?;
        let rows = stmt.query_map([job_id], |row| row.get::<_, String>(0))?;
        let mut keywords = Vec::new();
        for row in rows {
            keywords.push(row?);
        }
        Ok(keywords)
    }

    fn store_keyword_report(&self, report: &NewKeywordReport) -> AppResult<i64> {
        let (keyword, report_json) = prepare_insert(report)?;
        let created_at = Utc::now();

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO keyword_insight_reports (keyword, search_volume, difficulty, report_data, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                keyword,
                report.search_volume,
                report.difficulty,
                report_json,
                created_at.to_rfc3339()
            ],
        )
        .map_err(|error| AppError::Internal(format!("Could not insert keyword report: {}", error)))?;

        Ok(conn.last_insert_rowid())
    }

    fn get_report(&self, id: i64) -> AppResult<KeywordReport> {
        let id = check_report_id(id)?;
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, keyword, search_volume, difficulty, report_data, created_at
             FROM keyword_insight_reports WHERE id = ?1",
            [id],
            map_report,
        )
        .optional()?
        .ok_or_else(|| AppError::NotFound(format!("Keyword report {} not found.", id)))
    }
}

fn map_report(row: &Row<'_>) -> rusqlite::Result<KeywordReport> {
    let report_data: String = row.get(4)?;
    let created_at: String = row.get(5)?;
    Ok(KeywordReport {
        id: row.get(0)?,
        keyword: row.get(1)?,
        search_volume: row.get(2)?,
        difficulty: row.get(3)?,
        report_data: serde_json::from_str(&report_data)
            .map_err(|error| conversion_error(4, Box::new(error)))?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|value| value.with_timezone(&Utc))
            .map_err(|error| conversion_error(5, Box::new(error)))?,
    })
}

fn conversion_error(column: usize, error: Box<dyn std::error::Error + Send + Sync>) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, error)
}
