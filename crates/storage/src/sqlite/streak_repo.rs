use study_core::model::{UserId, UserStreak};

use super::SqliteRepository;
use super::mapping::{id_to_i64, map_streak_row};
use crate::repository::{StorageError, StreakRepository, VersionedStreak};

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
impl StreakRepository for SqliteRepository {
    async fn find_streak(
        &self,
        user_id: UserId,
    ) -> Result<Option<VersionedStreak>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT user_id, current_streak, longest_streak, last_study_date, version
            FROM user_streaks
            WHERE user_id = ?1
            ",
        )
        .bind(id_to_i64("user_id", user_id.value())?)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        row.as_ref().map(map_streak_row).transpose()
    }

    async fn insert_streak(&self, streak: &UserStreak) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO user_streaks (user_id, current_streak, longest_streak, last_study_date, version)
            VALUES (?1, ?2, ?3, ?4, 1)
            ",
        )
        .bind(id_to_i64("user_id", streak.user_id().value())?)
        .bind(i64::from(streak.current_streak()))
        .bind(i64::from(streak.longest_streak()))
        .bind(streak.last_study_date())
        .execute(self.pool())
        .await
        .map_err(conflict_on_unique)?;

        Ok(())
    }

    async fn update_streak(
        &self,
        streak: &UserStreak,
        expected_version: i64,
    ) -> Result<(), StorageError> {
        let user = id_to_i64("user_id", streak.user_id().value())?;

        let result = sqlx::query(
            r"
            UPDATE user_streaks SET
                current_streak = ?2,
                longest_streak = ?3,
                last_study_date = ?4,
                version = version + 1
            WHERE user_id = ?1 AND version = ?5
            ",
        )
        .bind(user)
        .bind(i64::from(streak.current_streak()))
        .bind(i64::from(streak.longest_streak()))
        .bind(streak.last_study_date())
        .bind(expected_version)
        .execute(self.pool())
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        let exists = sqlx::query("SELECT 1 FROM user_streaks WHERE user_id = ?1")
            .bind(user)
            .fetch_optional(self.pool())
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        if exists.is_some() {
            Err(StorageError::Conflict)
        } else {
            Err(StorageError::NotFound)
        }
    }
}
