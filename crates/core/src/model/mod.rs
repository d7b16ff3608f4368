mod ids;
mod progress;
mod session;
mod statistics;
mod streak;

pub use ids::{ParseIdError, QuestionId, SessionId, TopicId, UserId};
pub use progress::{ProgressError, UserProgress};
pub use session::{SessionAnswer, SessionError, StudyMode, StudySession};
pub use statistics::{Statistics, TopicStatistics, success_rate};
pub use streak::{StreakChange, StreakError, UserStreak};
