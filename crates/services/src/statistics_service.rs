use std::collections::BTreeMap;
use std::sync::Arc;

use study_core::model::{
    Statistics, TopicId, TopicStatistics, UserId, UserProgress, success_rate,
};
use study_core::scheduler::Scheduler;
use storage::repository::{
    ProgressRepository, QuestionDirectory, SessionRepository, StreakRepository,
};

use crate::error::StatisticsError;

/// Read-only rollups over progress, streak, and session state.
///
/// Aggregation happens here rather than in SQL so every backend reports
/// identical numbers.
#[derive(Clone)]
pub struct StatisticsService {
    scheduler: Scheduler,
    progress: Arc<dyn ProgressRepository>,
    streaks: Arc<dyn StreakRepository>,
    sessions: Arc<dyn SessionRepository>,
    questions: Arc<dyn QuestionDirectory>,
}

impl StatisticsService {
    #[must_use]
    pub fn new(
        scheduler: Scheduler,
        progress: Arc<dyn ProgressRepository>,
        streaks: Arc<dyn StreakRepository>,
        sessions: Arc<dyn SessionRepository>,
        questions: Arc<dyn QuestionDirectory>,
    ) -> Self {
        Self {
            scheduler,
            progress,
            streaks,
            sessions,
            questions,
        }
    }

    /// The full dashboard overview for one user.
    ///
    /// A user with no history gets the zero-valued overview (with the
    /// directory's question count), not an error.
    ///
    /// # Errors
    ///
    /// Returns `StatisticsError::Storage` if any repository access fails.
    pub async fn overview(&self, user_id: UserId) -> Result<Statistics, StatisticsError> {
        let total_questions = self.questions.total_question_count().await?;
        let rows = self.progress.progress_for_user(user_id).await?;

        let mut stats = Statistics::empty(total_questions);
        for row in &rows {
            stats.total_reviews += u64::from(row.times_reviewed());
            stats.total_correct += u64::from(row.times_correct());
            stats.total_incorrect += u64::from(row.times_incorrect());
            if self.scheduler.is_mastered(row.ease_factor()) {
                stats.total_mastered += 1;
            }
        }
        stats.success_rate = success_rate(stats.total_correct, stats.total_reviews);

        if let Some(versioned) = self.streaks.find_streak(user_id).await? {
            stats.current_streak = versioned.streak.current_streak();
            stats.longest_streak = versioned.streak.longest_streak();
        }

        let sessions = self.sessions.completed_stats(user_id).await?;
        stats.total_sessions = sessions.completed_sessions;
        stats.total_study_time = sessions.total_study_time;

        Ok(stats)
    }

    /// The user's most-lapsed questions, worst first.
    ///
    /// Ranked by lifetime incorrect count, ties broken by lower ease.
    /// Questions never answered incorrectly are excluded.
    ///
    /// # Errors
    ///
    /// Returns `StatisticsError::Storage` if repository access fails.
    pub async fn difficult_questions(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<UserProgress>, StatisticsError> {
        let mut rows: Vec<UserProgress> = self
            .progress
            .progress_for_user(user_id)
            .await?
            .into_iter()
            .filter(|row| row.times_incorrect() > 0)
            .collect();

        rows.sort_by(|a, b| {
            b.times_incorrect()
                .cmp(&a.times_incorrect())
                .then_with(|| a.ease_factor().total_cmp(&b.ease_factor()))
        });
        rows.truncate(limit);
        Ok(rows)
    }

    /// Per-topic review rollup, ordered by topic id.
    ///
    /// Progress rows whose question has left the directory are skipped.
    ///
    /// # Errors
    ///
    /// Returns `StatisticsError::Storage` if repository access fails.
    pub async fn by_topic(
        &self,
        user_id: UserId,
    ) -> Result<Vec<TopicStatistics>, StatisticsError> {
        let rows = self.progress.progress_for_user(user_id).await?;

        let mut topics: BTreeMap<TopicId, TopicStatistics> = BTreeMap::new();
        for row in &rows {
            let Some(topic_id) = self.questions.topic_of(row.question_id()).await? else {
                continue;
            };

            let entry = topics.entry(topic_id).or_insert_with(|| TopicStatistics {
                topic_id,
                questions_studied: 0,
                total_reviews: 0,
                total_correct: 0,
                success_rate: 0.0,
            });
            entry.questions_studied += 1;
            entry.total_reviews += u64::from(row.times_reviewed());
            entry.total_correct += u64::from(row.times_correct());
        }

        let mut rollup: Vec<TopicStatistics> = topics.into_values().collect();
        for topic in &mut rollup {
            topic.success_rate = success_rate(topic.total_correct, topic.total_reviews);
        }
        Ok(rollup)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    use study_core::Clock;
    use study_core::model::{QuestionId, StudyMode};
    use study_core::time::{fixed_clock, fixed_now, fixed_today};
    use storage::repository::InMemoryRepository;

    use crate::progress_service::ProgressService;
    use crate::session_service::SessionService;
    use crate::streak_service::StreakService;

    fn statistics(repo: &InMemoryRepository) -> StatisticsService {
        StatisticsService::new(
            Scheduler::new(),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
        )
    }

    fn progress_service(repo: &InMemoryRepository) -> ProgressService {
        ProgressService::new(
            fixed_clock(),
            Scheduler::new(),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
        )
    }

    #[tokio::test]
    async fn overview_for_a_user_with_no_history_is_all_zero() {
        let repo = InMemoryRepository::new();
        repo.add_question(QuestionId::new(1), TopicId::new(1));
        repo.add_question(QuestionId::new(2), TopicId::new(1));

        let stats = statistics(&repo).overview(UserId::new(1)).await.unwrap();
        assert_eq!(stats, Statistics::empty(2));
    }

    #[tokio::test]
    async fn overview_aggregates_reviews_streak_and_sessions() {
        let repo = InMemoryRepository::new();
        for question in 1..=3 {
            repo.add_question(QuestionId::new(question), TopicId::new(1));
        }

        let reviews = progress_service(&repo);
        let user = UserId::new(1);
        reviews.review_question(user, QuestionId::new(1), true).await.unwrap();
        reviews.review_question(user, QuestionId::new(1), true).await.unwrap();
        reviews.review_question(user, QuestionId::new(2), false).await.unwrap();

        StreakService::new(fixed_clock(), Arc::new(repo.clone()))
            .record_activity(user)
            .await
            .unwrap();

        let clock = fixed_clock();
        let sessions = SessionService::new(
            clock,
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            progress_service(&repo),
            StreakService::new(clock, Arc::new(repo.clone())),
        );
        let session = sessions
            .create_session(user, TopicId::new(1), StudyMode::Exam)
            .await
            .unwrap();
        sessions
            .add_answer(session.id(), QuestionId::new(3), true, None, None, Some(45))
            .await
            .unwrap();
        let later = SessionService::new(
            Clock::fixed(fixed_now() + chrono::Duration::seconds(120)),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            progress_service(&repo),
            StreakService::new(fixed_clock(), Arc::new(repo.clone())),
        );
        later.end_session(session.id()).await.unwrap();

        let stats = statistics(&repo).overview(user).await.unwrap();
        assert_eq!(stats.total_questions, 3);
        assert_eq!(stats.total_reviews, 4);
        assert_eq!(stats.total_correct, 3);
        assert_eq!(stats.total_incorrect, 1);
        assert!((stats.success_rate - 75.0).abs() < 1e-9);
        // questions 1 and 3 sit at or above the mastery ease, question 2
        // dropped below it with its lapse
        assert_eq!(stats.total_mastered, 2);
        assert_eq!(stats.current_streak, 1);
        assert_eq!(stats.longest_streak, 1);
        assert_eq!(stats.total_sessions, 1);
        assert_eq!(stats.total_study_time, 120);
    }

    #[tokio::test]
    async fn difficult_questions_rank_by_lapses_then_ease() {
        let repo = InMemoryRepository::new();
        for question in 1..=3 {
            repo.add_question(QuestionId::new(question), TopicId::new(1));
        }
        let reviews = progress_service(&repo);
        let user = UserId::new(1);

        // q1: one lapse; q2: two lapses; q3: never wrong
        reviews.review_question(user, QuestionId::new(1), false).await.unwrap();
        reviews.review_question(user, QuestionId::new(2), false).await.unwrap();
        reviews.review_question(user, QuestionId::new(2), false).await.unwrap();
        reviews.review_question(user, QuestionId::new(3), true).await.unwrap();

        let service = statistics(&repo);
        let worst = service.difficult_questions(user, 10).await.unwrap();
        assert_eq!(worst.len(), 2);
        assert_eq!(worst[0].question_id(), QuestionId::new(2));
        assert_eq!(worst[1].question_id(), QuestionId::new(1));

        let capped = service.difficult_questions(user, 1).await.unwrap();
        assert_eq!(capped.len(), 1);
    }

    #[tokio::test]
    async fn by_topic_rolls_up_per_topic_rates() {
        let repo = InMemoryRepository::new();
        repo.add_question(QuestionId::new(1), TopicId::new(100));
        repo.add_question(QuestionId::new(2), TopicId::new(100));
        repo.add_question(QuestionId::new(3), TopicId::new(200));

        let reviews = progress_service(&repo);
        let user = UserId::new(1);
        reviews.review_question(user, QuestionId::new(1), true).await.unwrap();
        reviews.review_question(user, QuestionId::new(2), false).await.unwrap();
        reviews.review_question(user, QuestionId::new(3), true).await.unwrap();

        let rollup = statistics(&repo).by_topic(user).await.unwrap();
        assert_eq!(rollup.len(), 2);

        assert_eq!(rollup[0].topic_id, TopicId::new(100));
        assert_eq!(rollup[0].questions_studied, 2);
        assert_eq!(rollup[0].total_reviews, 2);
        assert!((rollup[0].success_rate - 50.0).abs() < 1e-9);

        assert_eq!(rollup[1].topic_id, TopicId::new(200));
        assert!((rollup[1].success_rate - 100.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn streak_feeds_overview_even_without_reviews() {
        let repo = InMemoryRepository::new();
        StreakService::new(fixed_clock(), Arc::new(repo.clone()))
            .record_activity_on(UserId::new(1), fixed_today())
            .await
            .unwrap();

        let stats = statistics(&repo).overview(UserId::new(1)).await.unwrap();
        assert_eq!(stats.current_streak, 1);
        assert_eq!(stats.total_reviews, 0);
    }
}
