use super::Database;
use crate::errors::AppResult;
use crate::store::TransientStore;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, OptionalExtension};
use serde_json::Value;
use std::time::Duration;

impl Database {
    pub fn purge_expired_options(&self) -> AppResult<usize> {
        let conn = self.conn()?;
        let purged = conn.execute(
            "DELETE FROM options WHERE expires_at IS NOT NULL AND expires_at <= ?1",
            params![stamp(Utc::now())],
        )?;
        Ok(purged)
    }
}

fn stamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl TransientStore for Database {
    fn get(&self, key: &str) -> AppResult<Option<Value>> {
        let conn = self.conn()?;
        let row: Option<(String, Option<String>)> = conn
            .query_row(
                "SELECT value_json, expires_at FROM options WHERE name = ?1",
                [key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((value_json, expires_at)) = row else {
            return Ok(None);
        };

        let expired = expires_at
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|at| at.with_timezone(&Utc) <= Utc::now())
            .unwrap_or(false);
        if expired {
            conn.execute("DELETE FROM options WHERE name = ?1", [key])?;
            return Ok(None);
        }

        Ok(Some(serde_json::from_str(&value_json)?))
    }

    fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> AppResult<bool> {
        let expires_at = match ttl.filter(|ttl| !ttl.is_zero()) {
            Some(ttl) => {
                let ttl = chrono::Duration::from_std(ttl)
                    .map_err(|error| crate::errors::AppError::TransientStore(error.to_string()))?;
                Some(stamp(Utc::now() + ttl))
            }
            None => None,
        };
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO options (name, value_json, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET value_json = excluded.value_json, expires_at = excluded.expires_at",
            params![key, serde_json::to_string(value)?, expires_at],
        )?;
        Ok(true)
    }

    fn delete(&self, key: &str) -> AppResult<bool> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM options WHERE name = ?1", [key])?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;
    use crate::store::TransientStore;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn option_values_round_trip_with_tri_state() {
        let db = Database::open_in_memory().expect("db");
        assert_eq!(db.get("missing").expect("get"), None);

        db.set("flag", &json!(false), Some(Duration::from_secs(60))).expect("set");
        assert_eq!(db.get("flag").expect("get"), Some(json!(false)));

        db.set("flag", &json!({"clicks": 4}), None).expect("overwrite");
        assert_eq!(db.get("flag").expect("get"), Some(json!({"clicks": 4})));

        assert!(db.delete("flag").expect("delete"));
        assert!(!db.delete("flag").expect("delete again"));
    }

    #[test]
    fn expired_transients_read_as_missing_and_are_purged() {
        let db = Database::open_in_memory().expect("db");
        db.set("short", &json!(1), Some(Duration::from_millis(1))).expect("set");
        db.set("long", &json!(2), Some(Duration::from_secs(3600))).expect("set");
        std::thread::sleep(Duration::from_millis(10));

        assert_eq!(db.purge_expired_options().expect("purge"), 1);
        assert_eq!(db.get("short").expect("get"), None);
        assert_eq!(db.get("long").expect("get"), Some(json!(2)));
    }
}
