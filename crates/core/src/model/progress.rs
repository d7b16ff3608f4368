use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{QuestionId, UserId};
use crate::scheduler::{ScheduledReview, SchedulerConfig, SchedulerState};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("times_reviewed ({reviewed}) does not equal correct ({correct}) + incorrect ({incorrect})")]
    CounterMismatch {
        reviewed: u32,
        correct: u32,
        incorrect: u32,
    },

    #[error("repetitions ({repetitions}) exceed lifetime correct answers ({correct})")]
    RepetitionsExceedCorrect { repetitions: u32, correct: u32 },

    #[error("ease factor must be positive and finite, got {provided}")]
    InvalidEase { provided: f64 },
}

//
// ─── USER PROGRESS ─────────────────────────────────────────────────────────────
//

/// Scheduling state for one (user, question) pair.
///
/// Created lazily on the first review and mutated on every review after
/// that. The scheduling triple (`easeFactor`, `interval`, `repetitions`)
/// is only ever rewritten through [`apply_review`](Self::apply_review) so
/// the lifetime counters stay consistent with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProgress {
    user_id: UserId,
    question_id: QuestionId,
    ease_factor: f64,
    interval: u32,
    repetitions: u32,
    next_review_date: NaiveDate,
    times_reviewed: u32,
    times_correct: u32,
    times_incorrect: u32,
    last_reviewed_at: DateTime<Utc>,
}

impl UserProgress {
    /// State for a pair that is about to receive its first review.
    ///
    /// The record starts due immediately (interval zero, due `today`) and
    /// with zero lifetime counters; callers apply the first review before
    /// persisting, so this intermediate state is never stored.
    #[must_use]
    pub fn fresh(
        user_id: UserId,
        question_id: QuestionId,
        config: &SchedulerConfig,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            question_id,
            ease_factor: config.initial_ease,
            interval: 0,
            repetitions: 0,
            next_review_date: now.date_naive(),
            times_reviewed: 0,
            times_correct: 0,
            times_incorrect: 0,
            last_reviewed_at: now,
        }
    }

    /// Rehydrate a progress row from storage, validating its invariants.
    ///
    /// # Errors
    ///
    /// - `CounterMismatch` if `times_reviewed != times_correct + times_incorrect`
    /// - `RepetitionsExceedCorrect` if `repetitions > times_correct`
    /// - `InvalidEase` if the ease factor is non-finite or not positive
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        user_id: UserId,
        question_id: QuestionId,
        ease_factor: f64,
        interval: u32,
        repetitions: u32,
        next_review_date: NaiveDate,
        times_reviewed: u32,
        times_correct: u32,
        times_incorrect: u32,
        last_reviewed_at: DateTime<Utc>,
    ) -> Result<Self, ProgressError> {
        if times_reviewed != times_correct + times_incorrect {
            return Err(ProgressError::CounterMismatch {
                reviewed: times_reviewed,
                correct: times_correct,
                incorrect: times_incorrect,
            });
        }
        if repetitions > times_correct {
            return Err(ProgressError::RepetitionsExceedCorrect {
                repetitions,
                correct: times_correct,
            });
        }
        if !ease_factor.is_finite() || ease_factor <= 0.0 {
            return Err(ProgressError::InvalidEase {
                provided: ease_factor,
            });
        }

        Ok(Self {
            user_id,
            question_id,
            ease_factor,
            interval,
            repetitions,
            next_review_date,
            times_reviewed,
            times_correct,
            times_incorrect,
            last_reviewed_at,
        })
    }

    /// Fold one scheduled review into the record.
    ///
    /// Rewrites the scheduling triple and due date from `next`, bumps the
    /// lifetime counters, and stamps `last_reviewed_at`.
    pub fn apply_review(
        &mut self,
        next: &ScheduledReview,
        was_correct: bool,
        reviewed_at: DateTime<Utc>,
    ) {
        self.ease_factor = next.ease_factor;
        self.interval = next.interval_days;
        self.repetitions = next.repetitions;
        self.next_review_date = next.next_review_date;

        self.times_reviewed = self.times_reviewed.saturating_add(1);
        if was_correct {
            self.times_correct = self.times_correct.saturating_add(1);
        } else {
            self.times_incorrect = self.times_incorrect.saturating_add(1);
        }
        self.last_reviewed_at = reviewed_at;
    }

    /// The slice of this record the scheduler operates on.
    #[must_use]
    pub fn scheduler_state(&self) -> SchedulerState {
        SchedulerState::new(self.ease_factor, self.interval, self.repetitions)
    }

    /// Whether the question is due on or before the given date (inclusive).
    #[must_use]
    pub fn is_due_on(&self, date: NaiveDate) -> bool {
        self.next_review_date <= date
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn question_id(&self) -> QuestionId {
        self.question_id
    }

    #[must_use]
    pub fn ease_factor(&self) -> f64 {
        self.ease_factor
    }

    /// Days until the next review, counted from the last one.
    #[must_use]
    pub fn interval(&self) -> u32 {
        self.interval
    }

    /// Consecutive correct answers since the last lapse.
    #[must_use]
    pub fn repetitions(&self) -> u32 {
        self.repetitions
    }

    #[must_use]
    pub fn next_review_date(&self) -> NaiveDate {
        self.next_review_date
    }

    #[must_use]
    pub fn times_reviewed(&self) -> u32 {
        self.times_reviewed
    }

    #[must_use]
    pub fn times_correct(&self) -> u32 {
        self.times_correct
    }

    #[must_use]
    pub fn times_incorrect(&self) -> u32 {
        self.times_incorrect
    }

    #[must_use]
    pub fn last_reviewed_at(&self) -> DateTime<Utc> {
        self.last_reviewed_at
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::Scheduler;
    use crate::time::fixed_now;

    fn reviewed_once(was_correct: bool) -> UserProgress {
        let scheduler = Scheduler::new();
        let now = fixed_now();
        let mut progress = UserProgress::fresh(
            UserId::new(1),
            QuestionId::new(10),
            scheduler.config(),
            now,
        );
        let next = scheduler.compute_next(&progress.scheduler_state(), was_correct, now);
        progress.apply_review(&next, was_correct, now);
        progress
    }

    #[test]
    fn counters_stay_consistent_over_any_sequence() {
        let scheduler = Scheduler::new();
        let now = fixed_now();
        let mut progress = UserProgress::fresh(
            UserId::new(1),
            QuestionId::new(10),
            scheduler.config(),
            now,
        );

        for (i, was_correct) in [true, true, false, true, false, false, true]
            .into_iter()
            .enumerate()
        {
            let next = scheduler.compute_next(&progress.scheduler_state(), was_correct, now);
            progress.apply_review(&next, was_correct, now);

            assert_eq!(
                progress.times_reviewed(),
                progress.times_correct() + progress.times_incorrect()
            );
            assert_eq!(progress.times_reviewed() as usize, i + 1);
            assert!(progress.repetitions() <= progress.times_correct());
        }
    }

    #[test]
    fn first_correct_review_matches_expected_state() {
        let progress = reviewed_once(true);
        assert_eq!(progress.repetitions(), 1);
        assert_eq!(progress.interval(), 1);
        assert!((progress.ease_factor() - 2.6).abs() < 1e-9);
        assert_eq!(progress.times_correct(), 1);
        assert_eq!(progress.last_reviewed_at(), fixed_now());
    }

    #[test]
    fn due_comparison_is_inclusive() {
        let progress = reviewed_once(true);
        let due = progress.next_review_date();
        assert!(progress.is_due_on(due));
        assert!(progress.is_due_on(due + chrono::Duration::days(1)));
        assert!(!progress.is_due_on(due - chrono::Duration::days(1)));
    }

    #[test]
    fn from_persisted_rejects_counter_mismatch() {
        let err = UserProgress::from_persisted(
            UserId::new(1),
            QuestionId::new(2),
            2.5,
            6,
            2,
            fixed_now().date_naive(),
            5,
            2,
            2,
            fixed_now(),
        )
        .unwrap_err();
        assert!(matches!(err, ProgressError::CounterMismatch { .. }));
    }

    #[test]
    fn from_persisted_rejects_repetitions_above_correct() {
        let err = UserProgress::from_persisted(
            UserId::new(1),
            QuestionId::new(2),
            2.5,
            6,
            3,
            fixed_now().date_naive(),
            4,
            2,
            2,
            fixed_now(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ProgressError::RepetitionsExceedCorrect { .. }
        ));
    }

    #[test]
    fn from_persisted_rejects_bad_ease() {
        let err = UserProgress::from_persisted(
            UserId::new(1),
            QuestionId::new(2),
            f64::NAN,
            1,
            0,
            fixed_now().date_naive(),
            0,
            0,
            0,
            fixed_now(),
        )
        .unwrap_err();
        assert!(matches!(err, ProgressError::InvalidEase { .. }));
    }

    #[test]
    fn serializes_with_client_field_names() {
        let progress = reviewed_once(true);
        let json = serde_json::to_value(&progress).unwrap();

        assert!(json.get("easeFactor").is_some());
        assert!(json.get("nextReviewDate").is_some());
        assert!(json.get("timesReviewed").is_some());
        assert!(json.get("lastReviewedAt").is_some());
        assert_eq!(json["interval"], 1);

        let back: UserProgress = serde_json::from_value(json).unwrap();
        assert_eq!(back, progress);
    }
}
