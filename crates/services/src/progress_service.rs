use std::collections::HashSet;
use std::sync::Arc;

use study_core::Clock;
use study_core::model::{QuestionId, TopicId, UserId, UserProgress};
use study_core::scheduler::Scheduler;
use storage::repository::{ProgressRepository, QuestionDirectory, StorageError};

use crate::error::ProgressServiceError;

/// How many times a lost compare-and-swap race is retried before the
/// conflict is surfaced to the caller.
pub(crate) const MAX_CAS_RETRIES: usize = 3;

/// Orchestrates per-(user, question) scheduling state.
///
/// The service owns the read-modify-write cycle: load the current row,
/// run the scheduler over it, and persist the result guarded by the row
/// version. A lost race re-reads and recomputes, so a retried review is
/// always applied to the state the winner left behind.
#[derive(Clone)]
pub struct ProgressService {
    clock: Clock,
    scheduler: Scheduler,
    progress: Arc<dyn ProgressRepository>,
    questions: Arc<dyn QuestionDirectory>,
}

impl ProgressService {
    #[must_use]
    pub fn new(
        clock: Clock,
        scheduler: Scheduler,
        progress: Arc<dyn ProgressRepository>,
        questions: Arc<dyn QuestionDirectory>,
    ) -> Self {
        Self {
            clock,
            scheduler,
            progress,
            questions,
        }
    }

    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Record one review outcome and return the updated progress record.
    ///
    /// Creates the record on the first review of a pair; afterwards the
    /// scheduling triple and lifetime counters advance per review.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::QuestionNotFound` for an unknown or
    /// inactive question, `ConcurrentUpdate` when every retry lost its
    /// race, and `Storage` if repository access fails.
    pub async fn review_question(
        &self,
        user_id: UserId,
        question_id: QuestionId,
        was_correct: bool,
    ) -> Result<UserProgress, ProgressServiceError> {
        if !self.questions.question_exists(question_id).await? {
            return Err(ProgressServiceError::QuestionNotFound(question_id));
        }

        let now = self.clock.now();
        for _ in 0..MAX_CAS_RETRIES {
            match self.progress.find_progress(user_id, question_id).await? {
                None => {
                    let mut progress =
                        UserProgress::fresh(user_id, question_id, self.scheduler.config(), now);
                    let next =
                        self.scheduler
                            .compute_next(&progress.scheduler_state(), was_correct, now);
                    progress.apply_review(&next, was_correct, now);

                    match self.progress.insert_progress(&progress).await {
                        Ok(()) => return Ok(progress),
                        // a concurrent first review created the row; re-read
                        Err(StorageError::Conflict) => {}
                        Err(err) => return Err(err.into()),
                    }
                }
                Some(versioned) => {
                    let mut progress = versioned.progress;
                    let next =
                        self.scheduler
                            .compute_next(&progress.scheduler_state(), was_correct, now);
                    progress.apply_review(&next, was_correct, now);

                    match self
                        .progress
                        .update_progress(&progress, versioned.version)
                        .await
                    {
                        Ok(()) => return Ok(progress),
                        Err(StorageError::Conflict) => {}
                        Err(err) => return Err(err.into()),
                    }
                }
            }
        }

        Err(ProgressServiceError::ConcurrentUpdate)
    }

    /// All progress records for a user, optionally narrowed to one topic.
    ///
    /// A user with no reviews (or no reviews in the topic) yields an empty
    /// list, not an error.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` if repository access fails.
    pub async fn get_progress(
        &self,
        user_id: UserId,
        topic_id: Option<TopicId>,
    ) -> Result<Vec<UserProgress>, ProgressServiceError> {
        let rows = self.progress.progress_for_user(user_id).await?;

        let Some(topic_id) = topic_id else {
            return Ok(rows);
        };

        let in_topic: HashSet<QuestionId> = self
            .questions
            .questions_of_topic(topic_id)
            .await?
            .into_iter()
            .collect();
        Ok(rows
            .into_iter()
            .filter(|p| in_topic.contains(&p.question_id()))
            .collect())
    }

    /// Progress records due on or before today, soonest first.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` if repository access fails.
    pub async fn get_due_today(
        &self,
        user_id: UserId,
    ) -> Result<Vec<UserProgress>, ProgressServiceError> {
        Ok(self
            .progress
            .due_on_or_before(user_id, self.clock.today())
            .await?)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
