use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

use study_core::model::{
    QuestionId, SessionAnswer, SessionId, StudyMode, StudySession, TopicId, UserId, UserProgress,
    UserStreak,
};

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    /// A compare-and-swap update lost its race; callers re-read and retry.
    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// A progress row together with its optimistic-concurrency version.
///
/// The version belongs to storage, not the domain: every successful update
/// increments it, and an update that names a stale version fails with
/// [`StorageError::Conflict`].
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedProgress {
    pub progress: UserProgress,
    pub version: i64,
}

/// A streak row together with its optimistic-concurrency version.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedStreak {
    pub streak: UserStreak,
    pub version: i64,
}

/// Completed-session rollup used by the statistics aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionStats {
    pub completed_sessions: u64,
    /// Sum of completed-session durations, in seconds.
    pub total_study_time: i64,
}

//
// ─── REPOSITORY CONTRACTS ──────────────────────────────────────────────────────
//

/// Repository contract for per-(user, question) scheduling state.
///
/// Writes use compare-and-swap on the row version so that two concurrent
/// reviews of the same question cannot interleave their read-modify-write.
/// Rows for different keys never contend.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Fetch one progress row with its version, if the pair has been
    /// reviewed before.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    async fn find_progress(
        &self,
        user_id: UserId,
        question_id: QuestionId,
    ) -> Result<Option<VersionedProgress>, StorageError>;

    /// Insert a brand-new progress row at version 1.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if a row for the pair already
    /// exists (a concurrent first review won the race).
    async fn insert_progress(&self, progress: &UserProgress) -> Result<(), StorageError>;

    /// Replace an existing row, guarded by its expected version.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the stored version no longer
    /// matches `expected_version`.
    async fn update_progress(
        &self,
        progress: &UserProgress,
        expected_version: i64,
    ) -> Result<(), StorageError>;

    /// All progress rows for a user. An unknown user yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the query fails.
    async fn progress_for_user(&self, user_id: UserId)
        -> Result<Vec<UserProgress>, StorageError>;

    /// Progress rows whose due date is on or before `date`, soonest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the query fails.
    async fn due_on_or_before(
        &self,
        user_id: UserId,
        date: NaiveDate,
    ) -> Result<Vec<UserProgress>, StorageError>;
}

/// Repository contract for per-user streak state.
#[async_trait]
pub trait StreakRepository: Send + Sync {
    /// Fetch a user's streak with its version, if one exists.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    async fn find_streak(&self, user_id: UserId)
        -> Result<Option<VersionedStreak>, StorageError>;

    /// Insert a user's first streak record at version 1.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if a record already exists.
    async fn insert_streak(&self, streak: &UserStreak) -> Result<(), StorageError>;

    /// Replace a streak record, guarded by its expected version.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` on a stale version.
    async fn update_streak(
        &self,
        streak: &UserStreak,
        expected_version: i64,
    ) -> Result<(), StorageError>;
}

/// Repository contract for study sessions and their answers.
///
/// Sessions have a single active writer by contract, so there is no row
/// versioning here; the completed flag still guards against a finalize
/// racing an append.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Create a session row and return it with its storage-assigned id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the insert fails.
    async fn create_session(
        &self,
        user_id: UserId,
        topic_id: TopicId,
        mode: StudyMode,
        started_at: DateTime<Utc>,
    ) -> Result<StudySession, StorageError>;

    /// Fetch a session with its answers.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing.
    async fn get_session(&self, id: SessionId) -> Result<StudySession, StorageError>;

    /// All sessions for a user, most recently started first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the query fails.
    async fn sessions_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<StudySession>, StorageError>;

    /// Append one answer and bump the session aggregates in a single unit.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the session is missing and
    /// `StorageError::Conflict` if it has already been completed.
    async fn append_answer(
        &self,
        id: SessionId,
        answer: &SessionAnswer,
    ) -> Result<(), StorageError>;

    /// Persist the terminal state of an already-finished session.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the session is missing and
    /// `StorageError::Conflict` if the stored row was already completed.
    async fn complete_session(&self, session: &StudySession) -> Result<(), StorageError>;

    /// Count and total duration of a user's completed sessions.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the query fails.
    async fn completed_stats(&self, user_id: UserId) -> Result<SessionStats, StorageError>;
}

/// Read contract for the question/topic directory collaborator.
///
/// The engine does not own questions or topics; it only needs existence
/// checks and the question-to-topic mapping for filters and rollups.
#[async_trait]
pub trait QuestionDirectory: Send + Sync {
    /// Whether an active question with this id exists.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    async fn question_exists(&self, id: QuestionId) -> Result<bool, StorageError>;

    /// Ids of the active questions belonging to a topic.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the query fails.
    async fn questions_of_topic(
        &self,
        topic_id: TopicId,
    ) -> Result<Vec<QuestionId>, StorageError>;

    /// The topic a question belongs to, if the question exists.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    async fn topic_of(&self, id: QuestionId) -> Result<Option<TopicId>, StorageError>;

    /// Number of active questions in the directory.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the query fails.
    async fn total_question_count(&self) -> Result<u64, StorageError>;
}

//
// ─── IN-MEMORY IMPLEMENTATION ──────────────────────────────────────────────────
//

/// Simple in-memory repository implementation for testing and prototyping.
///
/// Honors the same versioning discipline as the SQLite backend so CAS retry
/// paths can be exercised without a database.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    progress: Arc<Mutex<HashMap<(UserId, QuestionId), VersionedProgress>>>,
    streaks: Arc<Mutex<HashMap<UserId, VersionedStreak>>>,
    sessions: Arc<Mutex<HashMap<SessionId, StudySession>>>,
    questions: Arc<Mutex<HashMap<QuestionId, TopicId>>>,
    next_session_id: Arc<AtomicU64>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a question under a topic (test/seed helper; the real
    /// directory lives outside the engine).
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn add_question(&self, id: QuestionId, topic_id: TopicId) {
        self.questions
            .lock()
            .expect("questions lock poisoned")
            .insert(id, topic_id);
    }

    fn lock<T>(mutex: &Mutex<T>) -> Result<std::sync::MutexGuard<'_, T>, StorageError> {
        mutex
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn find_progress(
        &self,
        user_id: UserId,
        question_id: QuestionId,
    ) -> Result<Option<VersionedProgress>, StorageError> {
        let guard = Self::lock(&self.progress)?;
        Ok(guard.get(&(user_id, question_id)).cloned())
    }

    async fn insert_progress(&self, progress: &UserProgress) -> Result<(), StorageError> {
        let mut guard = Self::lock(&self.progress)?;
        let key = (progress.user_id(), progress.question_id());
        if guard.contains_key(&key) {
            return Err(StorageError::Conflict);
        }
        guard.insert(
            key,
            VersionedProgress {
                progress: progress.clone(),
                version: 1,
            },
        );
        Ok(())
    }

    async fn update_progress(
        &self,
        progress: &UserProgress,
        expected_version: i64,
    ) -> Result<(), StorageError> {
        let mut guard = Self::lock(&self.progress)?;
        let key = (progress.user_id(), progress.question_id());
        match guard.get_mut(&key) {
            Some(row) if row.version == expected_version => {
                row.progress = progress.clone();
                row.version += 1;
                Ok(())
            }
            Some(_) => Err(StorageError::Conflict),
            None => Err(StorageError::NotFound),
        }
    }

    async fn progress_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<UserProgress>, StorageError> {
        let guard = Self::lock(&self.progress)?;
        let mut rows: Vec<UserProgress> = guard
            .values()
            .filter(|row| row.progress.user_id() == user_id)
            .map(|row| row.progress.clone())
            .collect();
        rows.sort_by_key(|p| p.question_id());
        Ok(rows)
    }

    async fn due_on_or_before(
        &self,
        user_id: UserId,
        date: NaiveDate,
    ) -> Result<Vec<UserProgress>, StorageError> {
        let mut rows: Vec<UserProgress> = self
            .progress_for_user(user_id)
            .await?
            .into_iter()
            .filter(|p| p.is_due_on(date))
            .collect();
        rows.sort_by_key(UserProgress::next_review_date);
        Ok(rows)
    }
}

#[async_trait]
impl StreakRepository for InMemoryRepository {
    async fn find_streak(
        &self,
        user_id: UserId,
    ) -> Result<Option<VersionedStreak>, StorageError> {
        let guard = Self::lock(&self.streaks)?;
        Ok(guard.get(&user_id).cloned())
    }

    async fn insert_streak(&self, streak: &UserStreak) -> Result<(), StorageError> {
        let mut guard = Self::lock(&self.streaks)?;
        if guard.contains_key(&streak.user_id()) {
            return Err(StorageError::Conflict);
        }
        guard.insert(
            streak.user_id(),
            VersionedStreak {
                streak: streak.clone(),
                version: 1,
            },
        );
        Ok(())
    }

    async fn update_streak(
        &self,
        streak: &UserStreak,
        expected_version: i64,
    ) -> Result<(), StorageError> {
        let mut guard = Self::lock(&self.streaks)?;
        match guard.get_mut(&streak.user_id()) {
            Some(row) if row.version == expected_version => {
                row.streak = streak.clone();
                row.version += 1;
                Ok(())
            }
            Some(_) => Err(StorageError::Conflict),
            None => Err(StorageError::NotFound),
        }
    }
}

#[async_trait]
impl SessionRepository for InMemoryRepository {
    async fn create_session(
        &self,
        user_id: UserId,
        topic_id: TopicId,
        mode: StudyMode,
        started_at: DateTime<Utc>,
    ) -> Result<StudySession, StorageError> {
        let id = SessionId::new(self.next_session_id.fetch_add(1, Ordering::Relaxed) + 1);
        let session = StudySession::begin(id, user_id, topic_id, mode, started_at);
        let mut guard = Self::lock(&self.sessions)?;
        guard.insert(id, session.clone());
        Ok(session)
    }

    async fn get_session(&self, id: SessionId) -> Result<StudySession, StorageError> {
        let guard = Self::lock(&self.sessions)?;
        guard.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn sessions_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<StudySession>, StorageError> {
        let guard = Self::lock(&self.sessions)?;
        let mut rows: Vec<StudySession> = guard
            .values()
            .filter(|s| s.user_id() == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.started_at().cmp(&a.started_at()).then(b.id().cmp(&a.id())));
        Ok(rows)
    }

    async fn append_answer(
        &self,
        id: SessionId,
        answer: &SessionAnswer,
    ) -> Result<(), StorageError> {
        let mut guard = Self::lock(&self.sessions)?;
        let session = guard.get_mut(&id).ok_or(StorageError::NotFound)?;
        session
            .record_answer(answer.clone())
            .map_err(|_| StorageError::Conflict)?;
        Ok(())
    }

    async fn complete_session(&self, session: &StudySession) -> Result<(), StorageError> {
        let mut guard = Self::lock(&self.sessions)?;
        let stored = guard
            .get_mut(&session.id())
            .ok_or(StorageError::NotFound)?;
        if stored.is_completed() {
            return Err(StorageError::Conflict);
        }
        *stored = session.clone();
        Ok(())
    }

    async fn completed_stats(&self, user_id: UserId) -> Result<SessionStats, StorageError> {
        let guard = Self::lock(&self.sessions)?;
        let mut stats = SessionStats::default();
        for session in guard.values() {
            if session.user_id() == user_id && session.is_completed() {
                stats.completed_sessions += 1;
                stats.total_study_time += session.duration();
            }
        }
        Ok(stats)
    }
}

#[async_trait]
impl QuestionDirectory for InMemoryRepository {
    async fn question_exists(&self, id: QuestionId) -> Result<bool, StorageError> {
        let guard = Self::lock(&self.questions)?;
        Ok(guard.contains_key(&id))
    }

    async fn questions_of_topic(
        &self,
        topic_id: TopicId,
    ) -> Result<Vec<QuestionId>, StorageError> {
        let guard = Self::lock(&self.questions)?;
        let mut ids: Vec<QuestionId> = guard
            .iter()
            .filter(|(_, topic)| **topic == topic_id)
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn topic_of(&self, id: QuestionId) -> Result<Option<TopicId>, StorageError> {
        let guard = Self::lock(&self.questions)?;
        Ok(guard.get(&id).copied())
    }

    async fn total_question_count(&self) -> Result<u64, StorageError> {
        let guard = Self::lock(&self.questions)?;
        Ok(guard.len() as u64)
    }
}

//
// ─── STORAGE AGGREGATE ─────────────────────────────────────────────────────────
//

/// Aggregates the engine's repositories behind trait objects for easy
/// backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub progress: Arc<dyn ProgressRepository>,
    pub streaks: Arc<dyn StreakRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub questions: Arc<dyn QuestionDirectory>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_in_memory(InMemoryRepository::new())
    }

    #[must_use]
    pub fn from_in_memory(repo: InMemoryRepository) -> Self {
        Self {
            progress: Arc::new(repo.clone()),
            streaks: Arc::new(repo.clone()),
            sessions: Arc::new(repo.clone()),
            questions: Arc::new(repo),
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
