use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{QuestionId, SessionId, TopicId, UserId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionError {
    #[error("session is already completed")]
    AlreadyCompleted,

    #[error("time spent cannot be negative, got {provided}")]
    NegativeTimeSpent { provided: i64 },

    #[error("session end time is before its start time")]
    InvalidTimeRange,

    #[error("aggregate count {reviewed} does not match {answers} recorded answers")]
    AnswerCountMismatch { reviewed: u32, answers: usize },

    #[error("correct ({correct}) + incorrect ({incorrect}) does not equal reviewed ({reviewed})")]
    OutcomeCountMismatch {
        reviewed: u32,
        correct: u32,
        incorrect: u32,
    },

    #[error("a completed session is missing its end time")]
    MissingEndTime,
}

//
// ─── STUDY MODE ────────────────────────────────────────────────────────────────
//

/// The study surface a session was started from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StudyMode {
    Flashcard,
    Exam,
    QuickReview,
}

impl StudyMode {
    /// Storage encoding; matches the wire encoding used by the client.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            StudyMode::Flashcard => "flashcard",
            StudyMode::Exam => "exam",
            StudyMode::QuickReview => "quick-review",
        }
    }

    /// Inverse of [`as_str`](Self::as_str).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "flashcard" => Some(StudyMode::Flashcard),
            "exam" => Some(StudyMode::Exam),
            "quick-review" => Some(StudyMode::QuickReview),
            _ => None,
        }
    }
}

//
// ─── SESSION ANSWER ────────────────────────────────────────────────────────────
//

/// One answered question within a study session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionAnswer {
    question_id: QuestionId,
    was_correct: bool,
    user_answer: Option<String>,
    audio_url: Option<String>,
    time_spent: Option<u32>,
    answered_at: DateTime<Utc>,
}

impl SessionAnswer {
    /// Build an answer entry, validating the optional time spent.
    ///
    /// # Errors
    ///
    /// Returns `NegativeTimeSpent` if `time_spent` is negative. The wire
    /// carries it as a signed number, so the check happens here.
    pub fn new(
        question_id: QuestionId,
        was_correct: bool,
        user_answer: Option<String>,
        audio_url: Option<String>,
        time_spent: Option<i64>,
        answered_at: DateTime<Utc>,
    ) -> Result<Self, SessionError> {
        let time_spent = time_spent
            .map(|seconds| {
                u32::try_from(seconds)
                    .map_err(|_| SessionError::NegativeTimeSpent { provided: seconds })
            })
            .transpose()?;

        Ok(Self {
            question_id,
            was_correct,
            user_answer,
            audio_url,
            time_spent,
            answered_at,
        })
    }

    #[must_use]
    pub fn question_id(&self) -> QuestionId {
        self.question_id
    }

    #[must_use]
    pub fn was_correct(&self) -> bool {
        self.was_correct
    }

    #[must_use]
    pub fn user_answer(&self) -> Option<&str> {
        self.user_answer.as_deref()
    }

    #[must_use]
    pub fn audio_url(&self) -> Option<&str> {
        self.audio_url.as_deref()
    }

    /// Seconds the user spent on this question, when the client reported it.
    #[must_use]
    pub fn time_spent(&self) -> Option<u32> {
        self.time_spent
    }

    #[must_use]
    pub fn answered_at(&self) -> DateTime<Utc> {
        self.answered_at
    }
}

//
// ─── STUDY SESSION ─────────────────────────────────────────────────────────────
//

/// One study attempt, from start through completion.
///
/// A session is in progress from the moment it is created and becomes
/// terminal once ended: no further answers are accepted and the duration
/// is fixed. Aggregates are derived from the recorded answers and stay
/// consistent with them at every step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudySession {
    id: SessionId,
    user_id: UserId,
    topic_id: TopicId,
    mode: StudyMode,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    /// Seconds between start and end; zero until the session is completed.
    duration: i64,
    questions_reviewed: u32,
    questions_correct: u32,
    questions_incorrect: u32,
    is_completed: bool,
    answers: Vec<SessionAnswer>,
}

impl StudySession {
    /// Start a new session. There is no observable "created but not
    /// started" state; the session is immediately in progress.
    #[must_use]
    pub fn begin(
        id: SessionId,
        user_id: UserId,
        topic_id: TopicId,
        mode: StudyMode,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            topic_id,
            mode,
            started_at,
            ended_at: None,
            duration: 0,
            questions_reviewed: 0,
            questions_correct: 0,
            questions_incorrect: 0,
            is_completed: false,
            answers: Vec::new(),
        }
    }

    /// Rehydrate a session with its answers from storage, validating that
    /// the stored aggregates agree with the child rows.
    ///
    /// # Errors
    ///
    /// - `AnswerCountMismatch` if `questions_reviewed != answers.len()`
    /// - `OutcomeCountMismatch` if correct + incorrect != reviewed
    /// - `MissingEndTime` if completed without an end timestamp
    /// - `InvalidTimeRange` if the end time precedes the start time
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        id: SessionId,
        user_id: UserId,
        topic_id: TopicId,
        mode: StudyMode,
        started_at: DateTime<Utc>,
        ended_at: Option<DateTime<Utc>>,
        duration: i64,
        questions_reviewed: u32,
        questions_correct: u32,
        questions_incorrect: u32,
        is_completed: bool,
        answers: Vec<SessionAnswer>,
    ) -> Result<Self, SessionError> {
        if usize::try_from(questions_reviewed).ok() != Some(answers.len()) {
            return Err(SessionError::AnswerCountMismatch {
                reviewed: questions_reviewed,
                answers: answers.len(),
            });
        }
        if questions_correct + questions_incorrect != questions_reviewed {
            return Err(SessionError::OutcomeCountMismatch {
                reviewed: questions_reviewed,
                correct: questions_correct,
                incorrect: questions_incorrect,
            });
        }
        if is_completed && ended_at.is_none() {
            return Err(SessionError::MissingEndTime);
        }
        if let Some(ended) = ended_at
            && ended < started_at
        {
            return Err(SessionError::InvalidTimeRange);
        }

        Ok(Self {
            id,
            user_id,
            topic_id,
            mode,
            started_at,
            ended_at,
            duration,
            questions_reviewed,
            questions_correct,
            questions_incorrect,
            is_completed,
            answers,
        })
    }

    /// Append an answer and bump the aggregates.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyCompleted` once the session has ended.
    pub fn record_answer(&mut self, answer: SessionAnswer) -> Result<&SessionAnswer, SessionError> {
        if self.is_completed {
            return Err(SessionError::AlreadyCompleted);
        }

        self.questions_reviewed = self.questions_reviewed.saturating_add(1);
        if answer.was_correct() {
            self.questions_correct = self.questions_correct.saturating_add(1);
        } else {
            self.questions_incorrect = self.questions_incorrect.saturating_add(1);
        }
        let index = self.answers.len();
        self.answers.push(answer);

        Ok(&self.answers[index])
    }

    /// Seal the session: set the end time and duration and mark it
    /// completed. A session with zero answers may still be closed; an
    /// abandoned attempt is a valid (trivial) session, not an error.
    ///
    /// # Errors
    ///
    /// - `AlreadyCompleted` if called twice
    /// - `InvalidTimeRange` if `ended_at` precedes the start time
    pub fn finish(&mut self, ended_at: DateTime<Utc>) -> Result<(), SessionError> {
        if self.is_completed {
            return Err(SessionError::AlreadyCompleted);
        }
        if ended_at < self.started_at {
            return Err(SessionError::InvalidTimeRange);
        }

        self.ended_at = Some(ended_at);
        self.duration = ended_at.signed_duration_since(self.started_at).num_seconds();
        self.is_completed = true;
        Ok(())
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn topic_id(&self) -> TopicId {
        self.topic_id
    }

    #[must_use]
    pub fn mode(&self) -> StudyMode {
        self.mode
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Session length in seconds; zero until the session is completed.
    #[must_use]
    pub fn duration(&self) -> i64 {
        self.duration
    }

    #[must_use]
    pub fn questions_reviewed(&self) -> u32 {
        self.questions_reviewed
    }

    #[must_use]
    pub fn questions_correct(&self) -> u32 {
        self.questions_correct
    }

    #[must_use]
    pub fn questions_incorrect(&self) -> u32 {
        self.questions_incorrect
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.is_completed
    }

    /// Answers in the order they were recorded.
    #[must_use]
    pub fn answers(&self) -> &[SessionAnswer] {
        &self.answers
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
