use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::UserId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StreakError {
    #[error("activity on {provided} predates the last study date {last}")]
    RetroactiveDate {
        provided: NaiveDate,
        last: NaiveDate,
    },

    #[error("longest streak ({longest}) is below current streak ({current})")]
    LongestBelowCurrent { longest: u32, current: u32 },

    #[error("a streak record cannot have a zero current streak")]
    ZeroStreak,
}

/// What a call to [`UserStreak::record`] did to the streak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreakChange {
    /// Same calendar day as the last activity; nothing changed.
    Unchanged,
    /// Exactly one day after the last activity; the streak grew.
    Extended,
    /// A gap of more than one day; the streak restarted at one.
    Reset,
}

//
// ─── USER STREAK ───────────────────────────────────────────────────────────────
//

/// Consecutive-study-day counter for one user.
///
/// Mutated at most once per calendar day; repeat activity on the same day
/// is a no-op, which makes the update idempotent within a day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStreak {
    user_id: UserId,
    current_streak: u32,
    longest_streak: u32,
    last_study_date: NaiveDate,
}

impl UserStreak {
    /// Streak record for a user's first qualifying activity.
    #[must_use]
    pub fn started(user_id: UserId, today: NaiveDate) -> Self {
        Self {
            user_id,
            current_streak: 1,
            longest_streak: 1,
            last_study_date: today,
        }
    }

    /// Rehydrate a streak row from storage, validating its invariants.
    ///
    /// # Errors
    ///
    /// - `LongestBelowCurrent` if `longest_streak < current_streak`
    /// - `ZeroStreak` if `current_streak` is zero (records are only created
    ///   on a first activity, so zero never persists)
    pub fn from_persisted(
        user_id: UserId,
        current_streak: u32,
        longest_streak: u32,
        last_study_date: NaiveDate,
    ) -> Result<Self, StreakError> {
        if current_streak == 0 {
            return Err(StreakError::ZeroStreak);
        }
        if longest_streak < current_streak {
            return Err(StreakError::LongestBelowCurrent {
                longest: longest_streak,
                current: current_streak,
            });
        }
        Ok(Self {
            user_id,
            current_streak,
            longest_streak,
            last_study_date,
        })
    }

    /// Record qualifying activity on `today`.
    ///
    /// Same day is a no-op, the next day extends the streak, a longer gap
    /// resets it to one. `longest_streak` only ever ratchets upward.
    ///
    /// # Errors
    ///
    /// Returns `RetroactiveDate` if `today` is earlier than the stored
    /// last study date; callers must supply monotonic dates.
    pub fn record(&mut self, today: NaiveDate) -> Result<StreakChange, StreakError> {
        if today < self.last_study_date {
            return Err(StreakError::RetroactiveDate {
                provided: today,
                last: self.last_study_date,
            });
        }
        if today == self.last_study_date {
            return Ok(StreakChange::Unchanged);
        }

        let change = if today - self.last_study_date == chrono::Duration::days(1) {
            self.current_streak += 1;
            StreakChange::Extended
        } else {
            self.current_streak = 1;
            StreakChange::Reset
        };

        self.last_study_date = today;
        self.longest_streak = self.longest_streak.max(self.current_streak);
        Ok(change)
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn current_streak(&self) -> u32 {
        self.current_streak
    }

    #[must_use]
    pub fn longest_streak(&self) -> u32 {
        self.longest_streak
    }

    #[must_use]
    pub fn last_study_date(&self) -> NaiveDate {
        self.last_study_date
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use crate::time::fixed_today;

    #[test]
    fn first_activity_starts_at_one() {
        let streak = UserStreak::started(UserId::new(1), fixed_today());
        assert_eq!(streak.current_streak(), 1);
        assert_eq!(streak.longest_streak(), 1);
        assert_eq!(streak.last_study_date(), fixed_today());
    }

    #[test]
    fn same_day_activity_is_idempotent() {
        let mut streak = UserStreak::started(UserId::new(1), fixed_today());
        let change = streak.record(fixed_today()).unwrap();
        assert_eq!(change, StreakChange::Unchanged);
        assert_eq!(streak.current_streak(), 1);
    }

    #[test]
    fn consecutive_day_extends_and_gap_resets() {
        let day_n = fixed_today();
        let mut streak =
            UserStreak::from_persisted(UserId::new(1), 3, 5, day_n).unwrap();

        let change = streak.record(day_n + Duration::days(1)).unwrap();
        assert_eq!(change, StreakChange::Extended);
        assert_eq!(streak.current_streak(), 4);
        assert_eq!(streak.longest_streak(), 5);

        let change = streak.record(day_n + Duration::days(3)).unwrap();
        assert_eq!(change, StreakChange::Reset);
        assert_eq!(streak.current_streak(), 1);
        assert_eq!(streak.longest_streak(), 5);
    }

    #[test]
    fn longest_ratchets_when_current_passes_it() {
        let mut streak = UserStreak::started(UserId::new(1), fixed_today());
        for day in 1..=6 {
            streak.record(fixed_today() + Duration::days(day)).unwrap();
            assert!(streak.longest_streak() >= streak.current_streak());
        }
        assert_eq!(streak.current_streak(), 7);
        assert_eq!(streak.longest_streak(), 7);
    }

    #[test]
    fn retroactive_date_is_rejected() {
        let mut streak = UserStreak::started(UserId::new(1), fixed_today());
        let err = streak.record(fixed_today() - Duration::days(1)).unwrap_err();
        assert!(matches!(err, StreakError::RetroactiveDate { .. }));
        // record unchanged on failure
        assert_eq!(streak.current_streak(), 1);
        assert_eq!(streak.last_study_date(), fixed_today());
    }

    #[test]
    fn from_persisted_validates_invariants() {
        assert!(matches!(
            UserStreak::from_persisted(UserId::new(1), 5, 3, fixed_today()),
            Err(StreakError::LongestBelowCurrent { .. })
        ));
        assert!(matches!(
            UserStreak::from_persisted(UserId::new(1), 0, 3, fixed_today()),
            Err(StreakError::ZeroStreak)
        ));
    }

    #[test]
    fn serializes_with_client_field_names() {
        let streak = UserStreak::started(UserId::new(9), fixed_today());
        let json = serde_json::to_value(&streak).unwrap();
        assert!(json.get("currentStreak").is_some());
        assert!(json.get("longestStreak").is_some());
        assert!(json.get("lastStudyDate").is_some());
    }
}
