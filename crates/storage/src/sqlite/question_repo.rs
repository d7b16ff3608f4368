use sqlx::Row;

use study_core::model::{QuestionId, TopicId};

use super::SqliteRepository;
use super::mapping::{id_to_i64, question_id_from_i64, ser, topic_id_from_i64};
use crate::repository::{QuestionDirectory, StorageError};

impl SqliteRepository {
    /// Register or reassign a question (seed/test helper; question content
    /// itself lives with the directory collaborator, not the engine).
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    pub async fn upsert_question(
        &self,
        id: QuestionId,
        topic_id: TopicId,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO questions (id, topic_id, active)
            VALUES (?1, ?2, 1)
            ON CONFLICT(id) DO UPDATE SET
                topic_id = excluded.topic_id,
                active = 1
            ",
        )
        .bind(id_to_i64("question_id", id.value())?)
        .bind(id_to_i64("topic_id", topic_id.value())?)
        .execute(self.pool())
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl QuestionDirectory for SqliteRepository {
    async fn question_exists(&self, id: QuestionId) -> Result<bool, StorageError> {
        let row = sqlx::query("SELECT 1 FROM questions WHERE id = ?1 AND active = 1")
            .bind(id_to_i64("question_id", id.value())?)
            .fetch_optional(self.pool())
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(row.is_some())
    }

    async fn questions_of_topic(
        &self,
        topic_id: TopicId,
    ) -> Result<Vec<QuestionId>, StorageError> {
        let rows = sqlx::query(
            "SELECT id FROM questions WHERE topic_id = ?1 AND active = 1 ORDER BY id",
        )
        .bind(id_to_i64("topic_id", topic_id.value())?)
        .fetch_all(self.pool())
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        rows.iter()
            .map(|row| question_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?))
            .collect()
    }

    async fn topic_of(&self, id: QuestionId) -> Result<Option<TopicId>, StorageError> {
        let row = sqlx::query("SELECT topic_id FROM questions WHERE id = ?1 AND active = 1")
            .bind(id_to_i64("question_id", id.value())?)
            .fetch_optional(self.pool())
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        row.map(|r| topic_id_from_i64(r.try_get::<i64, _>("topic_id").map_err(ser)?))
            .transpose()
    }

    async fn total_question_count(&self) -> Result<u64, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM questions WHERE active = 1")
            .fetch_one(self.pool())
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let total: i64 = row.try_get("total").map_err(ser)?;
        u64::try_from(total)
            .map_err(|_| StorageError::Serialization("negative question count".into()))
    }
}
