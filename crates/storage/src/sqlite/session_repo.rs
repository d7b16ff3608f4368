use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::Row;

use study_core::model::{
    SessionAnswer, SessionId, StudyMode, StudySession, TopicId, UserId,
};

use super::SqliteRepository;
use super::mapping::{id_to_i64, map_answer_row, map_session_row, ser, session_id_from_i64};
use crate::repository::{SessionRepository, SessionStats, StorageError};

const SESSION_COLUMNS: &str = r"
    id, user_id, topic_id, mode, started_at, ended_at, duration_seconds,
    questions_reviewed, questions_correct, questions_incorrect, is_completed
";

impl SqliteRepository {
    async fn answers_for_sessions(
        &self,
        ids: &[SessionId],
    ) -> Result<HashMap<SessionId, Vec<SessionAnswer>>, StorageError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut sql = String::from(
            r"
            SELECT session_id, question_id, was_correct, user_answer, audio_url,
                   time_spent, answered_at
            FROM session_answers
            WHERE session_id IN (
            ",
        );
        for i in 0..ids.len() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push('?');
            sql.push_str(&(i + 1).to_string());
        }
        sql.push_str(")\nORDER BY answered_at ASC, id ASC");

        let mut q = sqlx::query(&sql);
        for id in ids {
            q = q.bind(id_to_i64("session_id", id.value())?);
        }

        let rows = q
            .fetch_all(self.pool())
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut by_session: HashMap<SessionId, Vec<SessionAnswer>> =
            HashMap::with_capacity(ids.len());
        for row in rows {
            let session_id =
                session_id_from_i64(row.try_get::<i64, _>("session_id").map_err(ser)?)?;
            by_session
                .entry(session_id)
                .or_default()
                .push(map_answer_row(&row)?);
        }
        Ok(by_session)
    }
}

#[async_trait::async_trait]
impl SessionRepository for SqliteRepository {
    async fn create_session(
        &self,
        user_id: UserId,
        topic_id: TopicId,
        mode: StudyMode,
        started_at: DateTime<Utc>,
    ) -> Result<StudySession, StorageError> {
        let result = sqlx::query(
            r"
            INSERT INTO study_sessions (user_id, topic_id, mode, started_at)
            VALUES (?1, ?2, ?3, ?4)
            ",
        )
        .bind(id_to_i64("user_id", user_id.value())?)
        .bind(id_to_i64("topic_id", topic_id.value())?)
        .bind(mode.as_str())
        .bind(started_at)
        .execute(self.pool())
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let id = session_id_from_i64(result.last_insert_rowid())?;
        Ok(StudySession::begin(id, user_id, topic_id, mode, started_at))
    }

    async fn get_session(&self, id: SessionId) -> Result<StudySession, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM study_sessions WHERE id = ?1"
        ))
        .bind(id_to_i64("session_id", id.value())?)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?
        .ok_or(StorageError::NotFound)?;

        let answers = self
            .answers_for_sessions(&[id])
            .await?
            .remove(&id)
            .unwrap_or_default();
        map_session_row(&row, answers)
    }

    async fn sessions_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<StudySession>, StorageError> {
        let rows = sqlx::query(&format!(
            r"
            SELECT {SESSION_COLUMNS} FROM study_sessions
            WHERE user_id = ?1
            ORDER BY started_at DESC, id DESC
            "
        ))
        .bind(id_to_i64("user_id", user_id.value())?)
        .fetch_all(self.pool())
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut ids = Vec::with_capacity(rows.len());
        for row in &rows {
            ids.push(session_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?);
        }
        let mut answers = self.answers_for_sessions(&ids).await?;

        let mut sessions = Vec::with_capacity(rows.len());
        for (row, id) in rows.iter().zip(ids) {
            let session_answers = answers.remove(&id).unwrap_or_default();
            sessions.push(map_session_row(row, session_answers)?);
        }
        Ok(sessions)
    }

    async fn append_answer(
        &self,
        id: SessionId,
        answer: &SessionAnswer,
    ) -> Result<(), StorageError> {
        let session = id_to_i64("session_id", id.value())?;
        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let (correct_inc, incorrect_inc) = if answer.was_correct() {
            (1_i64, 0_i64)
        } else {
            (0_i64, 1_i64)
        };

        let result = sqlx::query(
            r"
            UPDATE study_sessions SET
                questions_reviewed = questions_reviewed + 1,
                questions_correct = questions_correct + ?2,
                questions_incorrect = questions_incorrect + ?3
            WHERE id = ?1 AND is_completed = 0
            ",
        )
        .bind(session)
        .bind(correct_inc)
        .bind(incorrect_inc)
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        if result.rows_affected() == 0 {
            let exists = sqlx::query("SELECT 1 FROM study_sessions WHERE id = ?1")
                .bind(session)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| StorageError::Connection(e.to_string()))?;
            return Err(if exists.is_some() {
                StorageError::Conflict
            } else {
                StorageError::NotFound
            });
        }

        sqlx::query(
            r"
            INSERT INTO session_answers (
                session_id, question_id, was_correct, user_answer, audio_url,
                time_spent, answered_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ",
        )
        .bind(session)
        .bind(id_to_i64("question_id", answer.question_id().value())?)
        .bind(answer.was_correct())
        .bind(answer.user_answer())
        .bind(answer.audio_url())
        .bind(answer.time_spent().map(i64::from))
        .bind(answer.answered_at())
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))
    }

    async fn complete_session(&self, session: &StudySession) -> Result<(), StorageError> {
        let id = id_to_i64("session_id", session.id().value())?;

        let result = sqlx::query(
            r"
            UPDATE study_sessions SET
                ended_at = ?2,
                duration_seconds = ?3,
                is_completed = 1
            WHERE id = ?1 AND is_completed = 0
            ",
        )
        .bind(id)
        .bind(session.ended_at())
        .bind(session.duration())
        .execute(self.pool())
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        let exists = sqlx::query("SELECT 1 FROM study_sessions WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        if exists.is_some() {
            Err(StorageError::Conflict)
        } else {
            Err(StorageError::NotFound)
        }
    }

    async fn completed_stats(&self, user_id: UserId) -> Result<SessionStats, StorageError> {
        let row = sqlx::query(
            r"
            SELECT COUNT(*) AS completed, COALESCE(SUM(duration_seconds), 0) AS study_time
            FROM study_sessions
            WHERE user_id = ?1 AND is_completed = 1
            ",
        )
        .bind(id_to_i64("user_id", user_id.value())?)
        .fetch_one(self.pool())
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let completed: i64 = row.try_get("completed").map_err(ser)?;
        let study_time: i64 = row.try_get("study_time").map_err(ser)?;
        Ok(SessionStats {
            completed_sessions: u64::try_from(completed)
                .map_err(|_| StorageError::Serialization("negative session count".into()))?,
            total_study_time: study_time,
        })
    }
}
