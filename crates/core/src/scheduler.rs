use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SchedulerError {
    #[error("minimum ease must be positive and finite, got {provided}")]
    InvalidMinimumEase { provided: f64 },
    #[error("initial ease {provided} is below the minimum ease {minimum}")]
    InitialEaseBelowMinimum { provided: f64, minimum: f64 },
}

//
// ─── CONFIG ────────────────────────────────────────────────────────────────────
//

/// Tuning knobs for the binary-signal SM-2 variant.
///
/// The defaults match the values the client UI was built around: ease starts
/// at 2.5, never drops below 1.3, moves by +0.1 / -0.2 per answer, and 2.5 is
/// the "mastered" display threshold. The threshold is configuration rather
/// than an engine invariant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub initial_ease: f64,
    pub min_ease: f64,
    pub correct_bonus: f64,
    pub lapse_penalty: f64,
    pub mastery_threshold: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            initial_ease: 2.5,
            min_ease: 1.3,
            correct_bonus: 0.1,
            lapse_penalty: 0.2,
            mastery_threshold: 2.5,
        }
    }
}

//
// ─── SCHEDULER STATE ───────────────────────────────────────────────────────────
//

/// The slice of `UserProgress` the scheduler reads and rewrites.
///
/// A question that has never been reviewed carries the initial ease, an
/// interval of zero (due immediately), and zero repetitions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SchedulerState {
    pub ease_factor: f64,
    pub interval_days: u32,
    pub repetitions: u32,
}

impl SchedulerState {
    #[must_use]
    pub fn new(ease_factor: f64, interval_days: u32, repetitions: u32) -> Self {
        Self {
            ease_factor,
            interval_days,
            repetitions,
        }
    }

    /// State for a question before its first review.
    #[must_use]
    pub fn fresh(config: &SchedulerConfig) -> Self {
        Self {
            ease_factor: config.initial_ease,
            interval_days: 0,
            repetitions: 0,
        }
    }
}

/// Result of scheduling one review: the next state plus the due date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScheduledReview {
    pub ease_factor: f64,
    pub interval_days: u32,
    pub repetitions: u32,
    pub next_review_date: NaiveDate,
}

//
// ─── SCHEDULER ─────────────────────────────────────────────────────────────────
//

/// SM-2-style scheduler adapted for a binary correct/incorrect signal.
///
/// The classical algorithm grades recall quality on a 0-5 scale; the client
/// only reports a boolean, so the ease adjustment is a fixed small increment
/// on success and a larger penalty on lapse, floored at `min_ease`.
///
/// Interval progression on a correct answer:
/// 1 day after the first success, 6 days after the second, then the previous
/// interval times the updated ease (rounded half-up). Any incorrect answer
/// resets repetitions and forces a review the next day.
///
/// # Examples
///
/// ```
/// # use study_core::scheduler::Scheduler;
/// let scheduler = Scheduler::new();
/// let now = chrono::Utc::now();
///
/// let first = scheduler.compute_next(&scheduler.fresh_state(), true, now);
/// assert_eq!(first.repetitions, 1);
/// assert_eq!(first.interval_days, 1);
/// assert_eq!(first.ease_factor, 2.6);
/// ```
#[derive(Debug, Clone)]
pub struct Scheduler {
    config: SchedulerConfig,
}

impl Scheduler {
    /// Create a scheduler with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: SchedulerConfig::default(),
        }
    }

    /// Create a scheduler with a custom configuration.
    ///
    /// # Errors
    ///
    /// - `InvalidMinimumEase` if `min_ease` is not positive and finite
    /// - `InitialEaseBelowMinimum` if `initial_ease < min_ease`
    pub fn with_config(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        if !config.min_ease.is_finite() || config.min_ease <= 0.0 {
            return Err(SchedulerError::InvalidMinimumEase {
                provided: config.min_ease,
            });
        }
        if config.initial_ease < config.min_ease {
            return Err(SchedulerError::InitialEaseBelowMinimum {
                provided: config.initial_ease,
                minimum: config.min_ease,
            });
        }
        Ok(Self { config })
    }

    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// State for a question that has never been reviewed.
    #[must_use]
    pub fn fresh_state(&self) -> SchedulerState {
        SchedulerState::fresh(&self.config)
    }

    /// Whether an ease factor counts as "mastered" under this configuration.
    #[must_use]
    pub fn is_mastered(&self, ease_factor: f64) -> bool {
        ease_factor >= self.config.mastery_threshold
    }

    /// Compute the next scheduling state from a review outcome.
    ///
    /// Pure with respect to its inputs; `now` only anchors the due date.
    /// The returned interval is always at least one day, so a question is
    /// never rescheduled for the same calendar day.
    #[must_use]
    pub fn compute_next(
        &self,
        prior: &SchedulerState,
        was_correct: bool,
        now: DateTime<Utc>,
    ) -> ScheduledReview {
        let (ease_factor, interval_days, repetitions) = if was_correct {
            let repetitions = prior.repetitions + 1;
            let ease = clamp_ease(prior.ease_factor + self.config.correct_bonus, &self.config);
            let interval = match repetitions {
                1 => 1,
                2 => 6,
                _ => grown_interval(prior.interval_days, ease),
            };
            (ease, interval, repetitions)
        } else {
            let ease = clamp_ease(prior.ease_factor - self.config.lapse_penalty, &self.config);
            (ease, 1, 0)
        };

        ScheduledReview {
            ease_factor,
            interval_days,
            repetitions,
            next_review_date: now.date_naive() + Duration::days(i64::from(interval_days)),
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

fn clamp_ease(ease: f64, config: &SchedulerConfig) -> f64 {
    ease.max(config.min_ease)
}

/// Previous interval times the updated ease, rounded half-up, never below one.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn grown_interval(interval_days: u32, ease: f64) -> u32 {
    let scaled = f64::from(interval_days) * ease;
    // round-half-up on a non-negative value
    let rounded = (scaled + 0.5).floor() as u32;
    rounded.max(1)
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn review(state: &SchedulerState, was_correct: bool) -> ScheduledReview {
        Scheduler::new().compute_next(state, was_correct, fixed_now())
    }

    fn to_state(next: &ScheduledReview) -> SchedulerState {
        SchedulerState::new(next.ease_factor, next.interval_days, next.repetitions)
    }

    #[test]
    fn first_correct_review_from_fresh_state() {
        let s = Scheduler::new();
        let next = s.compute_next(&s.fresh_state(), true, fixed_now());

        assert_eq!(next.repetitions, 1);
        assert_eq!(next.interval_days, 1);
        assert!((next.ease_factor - 2.6).abs() < 1e-9);
        assert_eq!(
            next.next_review_date,
            fixed_now().date_naive() + Duration::days(1)
        );
    }

    #[test]
    fn second_correct_review_jumps_to_six_days() {
        let s = Scheduler::new();
        let first = s.compute_next(&s.fresh_state(), true, fixed_now());
        let second = review(&to_state(&first), true);

        assert_eq!(second.repetitions, 2);
        assert_eq!(second.interval_days, 6);
        assert!((second.ease_factor - 2.7).abs() < 1e-9);
    }

    #[test]
    fn incorrect_review_resets_repetitions_and_interval() {
        let s = Scheduler::new();
        let first = s.compute_next(&s.fresh_state(), true, fixed_now());
        let second = review(&to_state(&first), true);
        let lapsed = review(&to_state(&second), false);

        assert_eq!(lapsed.repetitions, 0);
        assert_eq!(lapsed.interval_days, 1);
        assert!((lapsed.ease_factor - 2.5).abs() < 1e-9);
    }

    #[test]
    fn third_correct_review_multiplies_interval() {
        let s = Scheduler::new();
        let first = s.compute_next(&s.fresh_state(), true, fixed_now());
        let second = review(&to_state(&first), true);
        let third = review(&to_state(&second), true);

        assert_eq!(third.repetitions, 3);
        // round(6 * 2.8) = 17
        assert_eq!(third.interval_days, 17);
    }

    #[test]
    fn ease_never_drops_below_floor() {
        let s = Scheduler::new();
        let mut state = s.fresh_state();
        for _ in 0..50 {
            let next = s.compute_next(&state, false, fixed_now());
            assert!(next.ease_factor >= s.config().min_ease);
            state = to_state(&next);
        }
        assert!((state.ease_factor - 1.3).abs() < 1e-9);
    }

    #[test]
    fn interval_is_non_decreasing_on_long_correct_streaks() {
        let s = Scheduler::new();
        let mut state = s.fresh_state();
        let mut previous_interval = 0;
        for step in 0..20 {
            let next = s.compute_next(&state, true, fixed_now());
            if step >= 2 {
                assert!(next.interval_days >= previous_interval);
            }
            previous_interval = next.interval_days;
            state = to_state(&next);
        }
    }

    #[test]
    fn interval_is_at_least_one_day_after_any_review() {
        let s = Scheduler::new();
        let fresh = s.fresh_state();
        assert_eq!(s.compute_next(&fresh, false, fixed_now()).interval_days, 1);
        assert!(s.compute_next(&fresh, true, fixed_now()).interval_days >= 1);
    }

    #[test]
    fn interval_growth_rounds_half_up() {
        // 10 * 1.35 = 13.5 -> 14 under round-half-up
        let config = SchedulerConfig {
            initial_ease: 1.3,
            correct_bonus: 0.05,
            ..SchedulerConfig::default()
        };
        let s = Scheduler::with_config(config).unwrap();
        let prior = SchedulerState::new(1.3, 10, 2);
        let next = s.compute_next(&prior, true, fixed_now());
        assert_eq!(next.interval_days, 14);
    }

    #[test]
    fn mastery_threshold_is_configurable() {
        let s = Scheduler::new();
        assert!(s.is_mastered(2.5));
        assert!(!s.is_mastered(2.49));

        let relaxed = Scheduler::with_config(SchedulerConfig {
            mastery_threshold: 2.0,
            ..SchedulerConfig::default()
        })
        .unwrap();
        assert!(relaxed.is_mastered(2.1));
    }

    #[test]
    fn with_config_rejects_invalid_values() {
        let err = Scheduler::with_config(SchedulerConfig {
            min_ease: 0.0,
            ..SchedulerConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidMinimumEase { .. }));

        let err = Scheduler::with_config(SchedulerConfig {
            initial_ease: 1.0,
            ..SchedulerConfig::default()
        })
        .unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::InitialEaseBelowMinimum { .. }
        ));
    }

    #[test]
    fn lapse_then_recovery_follows_first_steps_again() {
        let s = Scheduler::new();
        let mut state = s.fresh_state();
        for _ in 0..4 {
            state = to_state(&s.compute_next(&state, true, fixed_now()));
        }
        state = to_state(&s.compute_next(&state, false, fixed_now()));
        assert_eq!(state.repetitions, 0);

        let recovered = s.compute_next(&state, true, fixed_now());
        assert_eq!(recovered.repetitions, 1);
        assert_eq!(recovered.interval_days, 1);
    }
}
