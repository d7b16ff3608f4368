use sqlx::Row;

use study_core::model::{
    QuestionId, SessionAnswer, SessionId, StudyMode, StudySession, TopicId, UserId, UserProgress,
    UserStreak,
};

use crate::repository::{StorageError, VersionedProgress, VersionedStreak};

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

fn i64_to_u32(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn user_id_from_i64(v: i64) -> Result<UserId, StorageError> {
    Ok(UserId::new(i64_to_u64("user_id", v)?))
}

pub(crate) fn question_id_from_i64(v: i64) -> Result<QuestionId, StorageError> {
    Ok(QuestionId::new(i64_to_u64("question_id", v)?))
}

pub(crate) fn topic_id_from_i64(v: i64) -> Result<TopicId, StorageError> {
    Ok(TopicId::new(i64_to_u64("topic_id", v)?))
}

pub(crate) fn session_id_from_i64(v: i64) -> Result<SessionId, StorageError> {
    Ok(SessionId::new(i64_to_u64("session_id", v)?))
}

pub(crate) fn id_to_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn parse_mode(s: &str) -> Result<StudyMode, StorageError> {
    StudyMode::parse(s).ok_or_else(|| StorageError::Serialization(format!("invalid mode: {s}")))
}

pub(crate) fn map_progress_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<VersionedProgress, StorageError> {
    let progress = UserProgress::from_persisted(
        user_id_from_i64(row.try_get::<i64, _>("user_id").map_err(ser)?)?,
        question_id_from_i64(row.try_get::<i64, _>("question_id").map_err(ser)?)?,
        row.try_get("ease_factor").map_err(ser)?,
        i64_to_u32(
            "interval_days",
            row.try_get::<i64, _>("interval_days").map_err(ser)?,
        )?,
        i64_to_u32(
            "repetitions",
            row.try_get::<i64, _>("repetitions").map_err(ser)?,
        )?,
        row.try_get("next_review_date").map_err(ser)?,
        i64_to_u32(
            "times_reviewed",
            row.try_get::<i64, _>("times_reviewed").map_err(ser)?,
        )?,
        i64_to_u32(
            "times_correct",
            row.try_get::<i64, _>("times_correct").map_err(ser)?,
        )?,
        i64_to_u32(
            "times_incorrect",
            row.try_get::<i64, _>("times_incorrect").map_err(ser)?,
        )?,
        row.try_get("last_reviewed_at").map_err(ser)?,
    )
    .map_err(ser)?;

    Ok(VersionedProgress {
        progress,
        version: row.try_get("version").map_err(ser)?,
    })
}

pub(crate) fn map_streak_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<VersionedStreak, StorageError> {
    let streak = UserStreak::from_persisted(
        user_id_from_i64(row.try_get::<i64, _>("user_id").map_err(ser)?)?,
        i64_to_u32(
            "current_streak",
            row.try_get::<i64, _>("current_streak").map_err(ser)?,
        )?,
        i64_to_u32(
            "longest_streak",
            row.try_get::<i64, _>("longest_streak").map_err(ser)?,
        )?,
        row.try_get("last_study_date").map_err(ser)?,
    )
    .map_err(ser)?;

    Ok(VersionedStreak {
        streak,
        version: row.try_get("version").map_err(ser)?,
    })
}

pub(crate) fn map_answer_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<SessionAnswer, StorageError> {
    SessionAnswer::new(
        question_id_from_i64(row.try_get::<i64, _>("question_id").map_err(ser)?)?,
        row.try_get("was_correct").map_err(ser)?,
        row.try_get("user_answer").map_err(ser)?,
        row.try_get("audio_url").map_err(ser)?,
        row.try_get("time_spent").map_err(ser)?,
        row.try_get("answered_at").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_session_row(
    row: &sqlx::sqlite::SqliteRow,
    answers: Vec<SessionAnswer>,
) -> Result<StudySession, StorageError> {
    let mode_str: String = row.try_get("mode").map_err(ser)?;

    StudySession::from_persisted(
        session_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        user_id_from_i64(row.try_get::<i64, _>("user_id").map_err(ser)?)?,
        topic_id_from_i64(row.try_get::<i64, _>("topic_id").map_err(ser)?)?,
        parse_mode(&mode_str)?,
        row.try_get("started_at").map_err(ser)?,
        row.try_get("ended_at").map_err(ser)?,
        row.try_get("duration_seconds").map_err(ser)?,
        i64_to_u32(
            "questions_reviewed",
            row.try_get::<i64, _>("questions_reviewed").map_err(ser)?,
        )?,
        i64_to_u32(
            "questions_correct",
            row.try_get::<i64, _>("questions_correct").map_err(ser)?,
        )?,
        i64_to_u32(
            "questions_incorrect",
            row.try_get::<i64, _>("questions_incorrect").map_err(ser)?,
        )?,
        row.try_get("is_completed").map_err(ser)?,
        answers,
    )
    .map_err(ser)
}
