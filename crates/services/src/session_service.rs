use std::sync::Arc;

use study_core::Clock;
use study_core::model::{
    QuestionId, SessionAnswer, SessionError, SessionId, StudyMode, StudySession, TopicId, UserId,
    UserProgress,
};
use storage::repository::{QuestionDirectory, SessionRepository, StorageError};

use crate::error::{ProgressServiceError, SessionServiceError};
use crate::progress_service::ProgressService;
use crate::streak_service::StreakService;

/// One answer as recorded inside a session, together with the scheduling
/// state the review left behind.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedAnswer {
    pub answer: SessionAnswer,
    pub progress: UserProgress,
}

/// Orchestrates the lifetime of a study session.
///
/// A session is the unit the client opens per sitting: answers stream in
/// one by one, each feeding the per-question scheduler, and closing the
/// session is what counts towards the daily streak.
#[derive(Clone)]
pub struct SessionService {
    clock: Clock,
    sessions: Arc<dyn SessionRepository>,
    questions: Arc<dyn QuestionDirectory>,
    progress: ProgressService,
    streaks: StreakService,
}

impl SessionService {
    #[must_use]
    pub fn new(
        clock: Clock,
        sessions: Arc<dyn SessionRepository>,
        questions: Arc<dyn QuestionDirectory>,
        progress: ProgressService,
        streaks: StreakService,
    ) -> Self {
        Self {
            clock,
            sessions,
            questions,
            progress,
            streaks,
        }
    }

    /// Open a new in-progress session for a user and topic.
    ///
    /// # Errors
    ///
    /// Returns `SessionServiceError::Storage` if persistence fails.
    pub async fn create_session(
        &self,
        user_id: UserId,
        topic_id: TopicId,
        mode: StudyMode,
    ) -> Result<StudySession, SessionServiceError> {
        Ok(self
            .sessions
            .create_session(user_id, topic_id, mode, self.clock.now())
            .await?)
    }

    /// Record one answer into an open session.
    ///
    /// Appends the answer and bumps the session aggregates in one storage
    /// unit, then runs the scheduler for the answered question. The two
    /// writes are each atomic on their own; a crash between them loses
    /// neither invariant.
    ///
    /// # Errors
    ///
    /// Returns `SessionServiceError::Session` for a completed session or
    /// a negative `time_spent`, `Progress` for an unknown question or an
    /// exhausted scheduling retry, and `Storage` if persistence fails.
    #[allow(clippy::too_many_arguments)]
    pub async fn add_answer(
        &self,
        session_id: SessionId,
        question_id: QuestionId,
        was_correct: bool,
        user_answer: Option<String>,
        audio_url: Option<String>,
        time_spent: Option<i64>,
    ) -> Result<RecordedAnswer, SessionServiceError> {
        let session = self.sessions.get_session(session_id).await?;
        if session.is_completed() {
            return Err(SessionError::AlreadyCompleted.into());
        }
        if !self.questions.question_exists(question_id).await? {
            return Err(ProgressServiceError::QuestionNotFound(question_id).into());
        }

        let answer = SessionAnswer::new(
            question_id,
            was_correct,
            user_answer,
            audio_url,
            time_spent,
            self.clock.now(),
        )?;

        match self.sessions.append_answer(session_id, &answer).await {
            Ok(()) => {}
            // a concurrent finalize won between our read and the append
            Err(StorageError::Conflict) => return Err(SessionError::AlreadyCompleted.into()),
            Err(err) => return Err(err.into()),
        }

        let progress = self
            .progress
            .review_question(session.user_id(), question_id, was_correct)
            .await?;

        Ok(RecordedAnswer { answer, progress })
    }

    /// Close a session, stamping its end time and duration.
    ///
    /// A session that reviewed at least one question counts as study
    /// activity for the day; an empty session closes without touching the
    /// streak.
    ///
    /// # Errors
    ///
    /// Returns `SessionServiceError::Session` if the session was already
    /// completed, `Streak` if the streak update fails, and `Storage` if
    /// the session is missing or persistence fails.
    pub async fn end_session(
        &self,
        session_id: SessionId,
    ) -> Result<StudySession, SessionServiceError> {
        let mut session = self.sessions.get_session(session_id).await?;
        let now = self.clock.now();
        session.finish(now)?;

        match self.sessions.complete_session(&session).await {
            Ok(()) => {}
            Err(StorageError::Conflict) => return Err(SessionError::AlreadyCompleted.into()),
            Err(err) => return Err(err.into()),
        }

        if session.questions_reviewed() > 0 {
            self.streaks
                .record_activity_on(session.user_id(), now.date_naive())
                .await?;
        }

        Ok(session)
    }

    /// Fetch one session with its answers.
    ///
    /// # Errors
    ///
    /// Returns `SessionServiceError::Storage` with `NotFound` if missing.
    pub async fn get_session(
        &self,
        session_id: SessionId,
    ) -> Result<StudySession, SessionServiceError> {
        Ok(self.sessions.get_session(session_id).await?)
    }

    /// All of a user's sessions, most recently started first.
    ///
    /// # Errors
    ///
    /// Returns `SessionServiceError::Storage` if the query fails.
    pub async fn list_sessions(
        &self,
        user_id: UserId,
    ) -> Result<Vec<StudySession>, SessionServiceError> {
        Ok(self.sessions.sessions_for_user(user_id).await?)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
