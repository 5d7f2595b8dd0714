//! 세션 레코드 스토리지 (SessionStore 포트 구현).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relaykeep_core::error::CoreError;
use relaykeep_core::models::session::SessionRecord;
use relaykeep_core::ports::session_store::SessionStore;
use rusqlite::OptionalExtension;
use tracing::debug;

use super::SqliteSessionStore;
use crate::crypto::format_version;

fn parse_time(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn load_record(&self, user_id: &str) -> Result<Option<SessionRecord>, CoreError> {
        let conn = self.lock()?;

        conn.query_row(
            "SELECT user_id, encrypted_credential, created_at, last_validated_at,
                    validation_attempts, is_valid, last_error
             FROM sessions WHERE user_id = ?1",
            rusqlite::params![user_id],
            |row| {
                let created_at: String = row.get(2)?;
                let last_validated_at: String = row.get(3)?;
                Ok(SessionRecord {
                    user_id: row.get(0)?,
                    encrypted_credential: row.get(1)?,
                    created_at: parse_time(&created_at),
                    last_validated_at: parse_time(&last_validated_at),
                    validation_attempts: row.get(4)?,
                    is_valid: row.get(5)?,
                    last_error: row.get(6)?,
                })
            },
        )
        .optional()
        .map_err(|e| CoreError::Storage(format!("세션 조회 실패: {e}")))
    }

    async fn save_record(&self, record: &SessionRecord) -> Result<(), CoreError> {
        let version = format_version(&record.encrypted_credential).unwrap_or_default();
        let conn = self.lock()?;

        conn.execute(
            "INSERT INTO sessions (user_id, encrypted_credential, format_version, created_at,
                                   last_validated_at, validation_attempts, is_valid, last_error,
                                   updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, datetime('now'))
             ON CONFLICT(user_id) DO UPDATE SET
                encrypted_credential = excluded.encrypted_credential,
                format_version = excluded.format_version,
                created_at = excluded.created_at,
                last_validated_at = excluded.last_validated_at,
                validation_attempts = excluded.validation_attempts,
                is_valid = excluded.is_valid,
                last_error = excluded.last_error,
                updated_at = datetime('now')",
            rusqlite::params![
                record.user_id,
                record.encrypted_credential,
                version,
                record.created_at.to_rfc3339(),
                record.last_validated_at.to_rfc3339(),
                record.validation_attempts,
                record.is_valid,
                record.last_error,
            ],
        )
        .map_err(|e| CoreError::Storage(format!("세션 저장 실패: {e}")))?;

        debug!("세션 저장: user_id={}", record.user_id);
        Ok(())
    }

    async fn delete_record(&self, user_id: &str) -> Result<(), CoreError> {
        let conn = self.lock()?;
        let deleted = conn
            .execute(
                "DELETE FROM sessions WHERE user_id = ?1",
                rusqlite::params![user_id],
            )
            .map_err(|e| CoreError::Storage(format!("세션 삭제 실패: {e}")))?;

        debug!("세션 삭제: user_id={user_id}, rows={deleted}");
        Ok(())
    }

    async fn list_user_ids(&self) -> Result<Vec<String>, CoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT user_id FROM sessions ORDER BY user_id")
            .map_err(|e| CoreError::Storage(format!("쿼리 준비 실패: {e}")))?;

        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| CoreError::Storage(format!("쿼리 실행 실패: {e}")))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(ids)
    }
}
