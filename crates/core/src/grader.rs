//! Free-text answer grading.
//!
//! The exam surface lets users type an answer instead of self-reporting, so
//! something has to turn that text into the correct/incorrect boolean the
//! scheduler consumes. Grading is pluggable; the engine itself only ever
//! sees the boolean.

/// Turns a free-text answer into the binary signal the scheduler consumes.
pub trait AnswerGrader: Send + Sync {
    /// Grade `user_answer` against the reference `expected_answer`.
    fn grade(&self, user_answer: &str, expected_answer: &str) -> bool;
}

/// Keyword-overlap heuristic grader.
///
/// Keywords are the words of the reference answer longer than
/// `min_keyword_len` characters, compared case-insensitively; a keyword
/// matches when it contains or is contained in any word of the user's
/// answer. The answer passes when at least `pass_ratio` of the keywords
/// match. A reference answer with no keywords at all trivially passes,
/// matching the behavior the exam UI shipped with.
#[derive(Debug, Clone)]
pub struct KeywordGrader {
    min_keyword_len: usize,
    pass_ratio: f64,
}

impl KeywordGrader {
    #[must_use]
    pub fn new(min_keyword_len: usize, pass_ratio: f64) -> Self {
        Self {
            min_keyword_len,
            pass_ratio,
        }
    }
}

impl Default for KeywordGrader {
    fn default() -> Self {
        Self::new(3, 0.5)
    }
}

impl AnswerGrader for KeywordGrader {
    #[allow(clippy::cast_precision_loss)]
    fn grade(&self, user_answer: &str, expected_answer: &str) -> bool {
        let user_answer = user_answer.to_lowercase();
        let user_words: Vec<&str> = user_answer.split_whitespace().collect();

        let expected_answer = expected_answer.to_lowercase();
        let keywords: Vec<&str> = expected_answer
            .split_whitespace()
            .filter(|word| word.len() > self.min_keyword_len)
            .collect();

        let matched = keywords
            .iter()
            .filter(|keyword| {
                user_words
                    .iter()
                    .any(|word| word.contains(*keyword) || keyword.contains(word))
            })
            .count();

        matched as f64 >= keywords.len() as f64 * self.pass_ratio
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_the_keywords_is_enough() {
        let grader = KeywordGrader::default();
        let expected = "photosynthesis converts sunlight into chemical energy";
        assert!(grader.grade("photosynthesis turns sunlight into energy", expected));
        assert!(!grader.grade("it is about plants", expected));
    }

    #[test]
    fn comparison_is_case_insensitive() {
        let grader = KeywordGrader::default();
        assert!(grader.grade("PHOTOSYNTHESIS uses SUNLIGHT", "photosynthesis sunlight"));
    }

    #[test]
    fn substring_matches_count_both_directions() {
        let grader = KeywordGrader::default();
        // answer word contains the keyword
        assert!(grader.grade("reschedule", "schedule"));
        // keyword contains the answer word
        assert!(grader.grade("chem", "chemistry"));
    }

    #[test]
    fn short_words_are_not_keywords() {
        let grader = KeywordGrader::default();
        // every reference word is <= 3 chars, so there is nothing to match
        // and the answer trivially passes
        assert!(grader.grade("anything", "it is ok"));
    }

    #[test]
    fn empty_user_answer_fails_against_real_keywords() {
        let grader = KeywordGrader::default();
        assert!(!grader.grade("", "mitochondria produce energy"));
    }
}
