use chrono::NaiveDate;

use study_core::model::{QuestionId, UserId, UserProgress};

use super::mapping::{id_to_i64, map_progress_row};
use super::SqliteRepository;
use crate::repository::{ProgressRepository, StorageError, VersionedProgress};

const PROGRESS_COLUMNS: &str = r"
    user_id, question_id, ease_factor, interval_days, repetitions,
    next_review_date, times_reviewed, times_correct, times_incorrect,
    last_reviewed_at, version
";

fn conflict_on_unique(e: sqlx::Error) -> StorageError {
    if e.as_database_error()
        .is_some_and(sqlx::error::DatabaseError::is_unique_violation)
    {
        StorageError::Conflict
    } else {
        StorageError::Connection(e.to_string())
    }
}

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn find_progress(
        &self,
        user_id: UserId,
        question_id: QuestionId,
    ) -> Result<Option<VersionedProgress>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {PROGRESS_COLUMNS} FROM user_progress WHERE user_id = ?1 AND question_id = ?2"
        ))
        .bind(id_to_i64("user_id", user_id.value())?)
        .bind(id_to_i64("question_id", question_id.value())?)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        row.as_ref().map(map_progress_row).transpose()
    }

    async fn insert_progress(&self, progress: &UserProgress) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO user_progress (
                user_id, question_id, ease_factor, interval_days, repetitions,
                next_review_date, times_reviewed, times_correct, times_incorrect,
                last_reviewed_at, version
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 1)
            ",
        )
        .bind(id_to_i64("user_id", progress.user_id().value())?)
        .bind(id_to_i64("question_id", progress.question_id().value())?)
        .bind(progress.ease_factor())
        .bind(i64::from(progress.interval()))
        .bind(i64::from(progress.repetitions()))
        .bind(progress.next_review_date())
        .bind(i64::from(progress.times_reviewed()))
        .bind(i64::from(progress.times_correct()))
        .bind(i64::from(progress.times_incorrect()))
        .bind(progress.last_reviewed_at())
        .execute(self.pool())
        .await
        .map_err(conflict_on_unique)?;

        Ok(())
    }

    async fn update_progress(
        &self,
        progress: &UserProgress,
        expected_version: i64,
    ) -> Result<(), StorageError> {
        let user = id_to_i64("user_id", progress.user_id().value())?;
        let question = id_to_i64("question_id", progress.question_id().value())?;

        let result = sqlx::query(
            r"
            UPDATE user_progress SET
                ease_factor = ?3,
                interval_days = ?4,
                repetitions = ?5,
                next_review_date = ?6,
                times_reviewed = ?7,
                times_correct = ?8,
                times_incorrect = ?9,
                last_reviewed_at = ?10,
                version = version + 1
            WHERE user_id = ?1 AND question_id = ?2 AND version = ?11
            ",
        )
        .bind(user)
        .bind(question)
        .bind(progress.ease_factor())
        .bind(i64::from(progress.interval()))
        .bind(i64::from(progress.repetitions()))
        .bind(progress.next_review_date())
        .bind(i64::from(progress.times_reviewed()))
        .bind(i64::from(progress.times_correct()))
        .bind(i64::from(progress.times_incorrect()))
        .bind(progress.last_reviewed_at())
        .bind(expected_version)
        .execute(self.pool())
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        // zero rows: either the row is gone or someone else bumped the
        // version first
        let exists = sqlx::query(
            "SELECT 1 FROM user_progress WHERE user_id = ?1 AND question_id = ?2",
        )
        .bind(user)
        .bind(question)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        if exists.is_some() {
            Err(StorageError::Conflict)
        } else {
            Err(StorageError::NotFound)
        }
    }

    async fn progress_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<UserProgress>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {PROGRESS_COLUMNS} FROM user_progress WHERE user_id = ?1 ORDER BY question_id"
        ))
        .bind(id_to_i64("user_id", user_id.value())?)
        .fetch_all(self.pool())
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        rows.iter()
            .map(|row| map_progress_row(row).map(|v| v.progress))
            .collect()
    }

    async fn due_on_or_before(
        &self,
        user_id: UserId,
        date: NaiveDate,
    ) -> Result<Vec<UserProgress>, StorageError> {
        let rows = sqlx::query(&format!(
            r"
            SELECT {PROGRESS_COLUMNS} FROM user_progress
            WHERE user_id = ?1 AND next_review_date <= ?2
            ORDER BY next_review_date ASC, question_id ASC
            "
        ))
        .bind(id_to_i64("user_id", user_id.value())?)
        .bind(date)
        .fetch_all(self.pool())
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        rows.iter()
            .map(|row| map_progress_row(row).map(|v| v.progress))
            .collect()
    }
}
