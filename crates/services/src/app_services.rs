use std::sync::Arc;

use study_core::Clock;
use study_core::scheduler::Scheduler;
use storage::repository::Storage;

use crate::error::AppServicesError;
use crate::progress_service::ProgressService;
use crate::session_service::SessionService;
use crate::statistics_service::StatisticsService;
use crate::streak_service::StreakService;

/// Assembles the engine's services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    progress: Arc<ProgressService>,
    streaks: Arc<StreakService>,
    sessions: Arc<SessionService>,
    statistics: Arc<StatisticsService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        scheduler: Scheduler,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::from_storage(&storage, clock, scheduler))
    }

    /// Build services over an already-assembled storage aggregate.
    #[must_use]
    pub fn from_storage(storage: &Storage, clock: Clock, scheduler: Scheduler) -> Self {
        let progress = ProgressService::new(
            clock,
            scheduler.clone(),
            Arc::clone(&storage.progress),
            Arc::clone(&storage.questions),
        );
        let streaks = StreakService::new(clock, Arc::clone(&storage.streaks));
        let sessions = Arc::new(SessionService::new(
            clock,
            Arc::clone(&storage.sessions),
            Arc::clone(&storage.questions),
            progress.clone(),
            streaks.clone(),
        ));
        let progress = Arc::new(progress);
        let streaks = Arc::new(streaks);
        let statistics = Arc::new(StatisticsService::new(
            scheduler,
            Arc::clone(&storage.progress),
            Arc::clone(&storage.streaks),
            Arc::clone(&storage.sessions),
            Arc::clone(&storage.questions),
        ));

        Self {
            progress,
            streaks,
            sessions,
            statistics,
        }
    }

    #[must_use]
    pub fn progress(&self) -> Arc<ProgressService> {
        Arc::clone(&self.progress)
    }

    #[must_use]
    pub fn streaks(&self) -> Arc<StreakService> {
        Arc::clone(&self.streaks)
    }

    #[must_use]
    pub fn sessions(&self) -> Arc<SessionService> {
        Arc::clone(&self.sessions)
    }

    #[must_use]
    pub fn statistics(&self) -> Arc<StatisticsService> {
        Arc::clone(&self.statistics)
    }
}
