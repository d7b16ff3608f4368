use serde::{Deserialize, Serialize};

use crate::model::ids::TopicId;

/// Read-only overview of one user's study history.
///
/// Shape mirrors the client's `Statistics` type field-for-field; rates are
/// percentages in `0.0..=100.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub total_questions: u64,
    pub total_reviews: u64,
    pub total_correct: u64,
    pub total_incorrect: u64,
    pub success_rate: f64,
    pub total_mastered: u64,
    pub current_streak: u32,
    pub longest_streak: u32,
    /// Total seconds spent in completed sessions.
    pub total_study_time: i64,
    pub total_sessions: u64,
}

impl Statistics {
    /// Overview for a user with no recorded activity at all.
    #[must_use]
    pub fn empty(total_questions: u64) -> Self {
        Self {
            total_questions,
            total_reviews: 0,
            total_correct: 0,
            total_incorrect: 0,
            success_rate: 0.0,
            total_mastered: 0,
            current_streak: 0,
            longest_streak: 0,
            total_study_time: 0,
            total_sessions: 0,
        }
    }
}

/// Per-topic rollup of review activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicStatistics {
    pub topic_id: TopicId,
    pub questions_studied: u64,
    pub total_reviews: u64,
    pub total_correct: u64,
    pub success_rate: f64,
}

/// Percentage of correct answers, defined as zero when nothing was reviewed.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn success_rate(correct: u64, reviewed: u64) -> f64 {
    if reviewed == 0 {
        0.0
    } else {
        correct as f64 / reviewed as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_rate_handles_zero_reviews() {
        assert_eq!(success_rate(0, 0), 0.0);
        assert_eq!(success_rate(7, 10), 70.0);
        assert_eq!(success_rate(3, 3), 100.0);
    }

    #[test]
    fn serializes_with_client_field_names() {
        let stats = Statistics::empty(12);
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["totalQuestions"], 12);
        assert!(json.get("successRate").is_some());
        assert!(json.get("totalMastered").is_some());
        assert!(json.get("totalStudyTime").is_some());
    }
}
