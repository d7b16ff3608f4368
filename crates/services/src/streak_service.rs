use std::sync::Arc;

use chrono::NaiveDate;

use study_core::Clock;
use study_core::model::{StreakChange, UserId, UserStreak};
use storage::repository::{StorageError, StreakRepository};

use crate::error::StreakServiceError;
use crate::progress_service::MAX_CAS_RETRIES;

/// Tracks consecutive-day study streaks, one record per user.
#[derive(Clone)]
pub struct StreakService {
    clock: Clock,
    streaks: Arc<dyn StreakRepository>,
}

impl StreakService {
    #[must_use]
    pub fn new(clock: Clock, streaks: Arc<dyn StreakRepository>) -> Self {
        Self { clock, streaks }
    }

    /// Record study activity for today according to the service clock.
    ///
    /// # Errors
    ///
    /// See [`record_activity_on`](Self::record_activity_on).
    pub async fn record_activity(
        &self,
        user_id: UserId,
    ) -> Result<UserStreak, StreakServiceError> {
        self.record_activity_on(user_id, self.clock.today()).await
    }

    /// Record study activity on an explicit calendar day.
    ///
    /// First activity creates the record at streak one; a repeat call on
    /// the same day changes nothing; the next consecutive day extends; a
    /// gap resets to one.
    ///
    /// # Errors
    ///
    /// Returns `StreakServiceError::Streak` for a date before the last
    /// recorded study date, `ConcurrentUpdate` when every retry lost its
    /// race, and `Storage` if repository access fails.
    pub async fn record_activity_on(
        &self,
        user_id: UserId,
        today: NaiveDate,
    ) -> Result<UserStreak, StreakServiceError> {
        for _ in 0..MAX_CAS_RETRIES {
            match self.streaks.find_streak(user_id).await? {
                None => {
                    let streak = UserStreak::started(user_id, today);
                    match self.streaks.insert_streak(&streak).await {
                        Ok(()) => return Ok(streak),
                        // concurrent first activity created the record
                        Err(StorageError::Conflict) => {}
                        Err(err) => return Err(err.into()),
                    }
                }
                Some(versioned) => {
                    let mut streak = versioned.streak;
                    let change = streak.record(today)?;
                    if change == StreakChange::Unchanged {
                        return Ok(streak);
                    }

                    match self.streaks.update_streak(&streak, versioned.version).await {
                        Ok(()) => return Ok(streak),
                        Err(StorageError::Conflict) => {}
                        Err(err) => return Err(err.into()),
                    }
                }
            }
        }

        Err(StreakServiceError::ConcurrentUpdate)
    }

    /// A user's streak record, if any activity has ever been recorded.
    ///
    /// # Errors
    ///
    /// Returns `StreakServiceError::Storage` if repository access fails.
    pub async fn get_streak(
        &self,
        user_id: UserId,
    ) -> Result<Option<UserStreak>, StreakServiceError> {
        Ok(self
            .streaks
            .find_streak(user_id)
            .await?
            .map(|versioned| versioned.streak))
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::Duration;
    use study_core::model::StreakError;
    use study_core::time::{fixed_clock, fixed_today};
    use storage::repository::{InMemoryRepository, VersionedStreak};

    fn service(repo: &InMemoryRepository) -> StreakService {
        StreakService::new(fixed_clock(), Arc::new(repo.clone()))
    }

    #[tokio::test]
    async fn first_activity_starts_at_one() {
        let repo = InMemoryRepository::new();
        let service = service(&repo);

        let streak = service.record_activity(UserId::new(1)).await.unwrap();
        assert_eq!(streak.current_streak(), 1);
        assert_eq!(streak.longest_streak(), 1);
        assert_eq!(streak.last_study_date(), fixed_today());
    }

    #[tokio::test]
    async fn same_day_activity_is_idempotent() {
        let repo = InMemoryRepository::new();
        let service = service(&repo);

        service.record_activity(UserId::new(1)).await.unwrap();
        let streak = service.record_activity(UserId::new(1)).await.unwrap();
        assert_eq!(streak.current_streak(), 1);

        // no write happened, so the stored version is still the insert's
        let versioned = repo.find_streak(UserId::new(1)).await.unwrap().unwrap();
        assert_eq!(versioned.version, 1);
    }

    #[tokio::test]
    async fn consecutive_days_extend_and_gaps_reset() {
        let repo = InMemoryRepository::new();
        let service = service(&repo);
        let day = fixed_today();

        service.record_activity_on(UserId::new(1), day).await.unwrap();
        let extended = service
            .record_activity_on(UserId::new(1), day + Duration::days(1))
            .await
            .unwrap();
        assert_eq!(extended.current_streak(), 2);
        assert_eq!(extended.longest_streak(), 2);

        let reset = service
            .record_activity_on(UserId::new(1), day + Duration::days(5))
            .await
            .unwrap();
        assert_eq!(reset.current_streak(), 1);
        assert_eq!(reset.longest_streak(), 2);
    }

    #[tokio::test]
    async fn retroactive_date_is_rejected() {
        let repo = InMemoryRepository::new();
        let service = service(&repo);

        service.record_activity(UserId::new(1)).await.unwrap();
        let err = service
            .record_activity_on(UserId::new(1), fixed_today() - Duration::days(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StreakServiceError::Streak(StreakError::RetroactiveDate { .. })
        ));
    }

    #[tokio::test]
    async fn missing_streak_reads_as_none() {
        let repo = InMemoryRepository::new();
        let service = service(&repo);
        assert!(service.get_streak(UserId::new(9)).await.unwrap().is_none());
    }

    /// Wraps the in-memory repository and answers the next `conflicts_left`
    /// writes with `Conflict`, as if another writer kept winning the race.
    struct ContendedStreakRepo {
        inner: InMemoryRepository,
        conflicts_left: Arc<AtomicUsize>,
    }

    impl ContendedStreakRepo {
        fn take_conflict(&self) -> bool {
            self.conflicts_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }
    }

    #[async_trait::async_trait]
    impl StreakRepository for ContendedStreakRepo {
        async fn find_streak(
            &self,
            user_id: UserId,
        ) -> Result<Option<VersionedStreak>, StorageError> {
            self.inner.find_streak(user_id).await
        }

        async fn insert_streak(&self, streak: &UserStreak) -> Result<(), StorageError> {
            if self.take_conflict() {
                return Err(StorageError::Conflict);
            }
            self.inner.insert_streak(streak).await
        }

        async fn update_streak(
            &self,
            streak: &UserStreak,
            expected_version: i64,
        ) -> Result<(), StorageError> {
            if self.take_conflict() {
                return Err(StorageError::Conflict);
            }
            self.inner.update_streak(streak, expected_version).await
        }
    }

    fn contended_service(
        repo: &InMemoryRepository,
        conflicts: usize,
    ) -> (StreakService, Arc<AtomicUsize>) {
        let conflicts_left = Arc::new(AtomicUsize::new(conflicts));
        let service = StreakService::new(
            fixed_clock(),
            Arc::new(ContendedStreakRepo {
                inner: repo.clone(),
                conflicts_left: Arc::clone(&conflicts_left),
            }),
        );
        (service, conflicts_left)
    }

    #[tokio::test]
    async fn activity_retries_past_transient_conflicts() {
        let repo = InMemoryRepository::new();
        let day = fixed_today();

        // two lost races on the first-ever activity: the insert path retries
        let (service, conflicts_left) = contended_service(&repo, 2);
        let streak = service.record_activity(UserId::new(1)).await.unwrap();
        assert_eq!(streak.current_streak(), 1);
        assert_eq!(conflicts_left.load(Ordering::SeqCst), 0);

        let versioned = repo.find_streak(UserId::new(1)).await.unwrap().unwrap();
        assert_eq!(versioned.version, 1);

        // one lost race on the next day: the update path retries too
        conflicts_left.store(1, Ordering::SeqCst);
        let streak = service
            .record_activity_on(UserId::new(1), day + Duration::days(1))
            .await
            .unwrap();
        assert_eq!(streak.current_streak(), 2);

        let versioned = repo.find_streak(UserId::new(1)).await.unwrap().unwrap();
        assert_eq!(versioned.version, 2);
    }

    #[tokio::test]
    async fn activity_surfaces_conflict_once_retries_are_exhausted() {
        let repo = InMemoryRepository::new();

        let (service, _) = contended_service(&repo, MAX_CAS_RETRIES);
        let err = service.record_activity(UserId::new(1)).await.unwrap_err();
        assert!(matches!(err, StreakServiceError::ConcurrentUpdate));

        // nothing was persisted by the losing attempts
        assert!(repo.find_streak(UserId::new(1)).await.unwrap().is_none());
    }
}
