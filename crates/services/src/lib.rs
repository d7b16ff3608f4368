#![forbid(unsafe_code)]

pub mod app_services;
pub mod error;
pub mod progress_service;
pub mod session_service;
pub mod statistics_service;
pub mod streak_service;

pub use study_core::Clock;

pub use app_services::AppServices;
pub use error::{
    AppServicesError, ProgressServiceError, SessionServiceError, StatisticsError,
    StreakServiceError,
};
pub use progress_service::ProgressService;
pub use session_service::{RecordedAnswer, SessionService};
pub use statistics_service::StatisticsService;
pub use streak_service::StreakService;
