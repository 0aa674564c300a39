use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown difficulty '{0}' (expected easy, medium or hard)")]
pub struct ParseDifficultyError(pub String);

impl FromStr for Difficulty {
    type Err = ParseDifficultyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            _ => Err(ParseDifficultyError(s.to_string())),
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Difficulty::Easy => write!(f, "easy"),
            Difficulty::Medium => write!(f, "medium"),
            Difficulty::Hard => write!(f, "hard"),
        }
    }
}

/// One (input, expected output) pair. Both sides are arbitrary JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: Value,
    pub expected_output: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub title: String,
    pub description: String,
    pub difficulty: Difficulty,
    pub category: String,
    pub test_cases: Vec<TestCase>,
}

impl Question {
    /// The first test case is shown to users before they submit.
    pub fn sample_test_case(&self) -> Option<&TestCase> {
        self.test_cases.first()
    }

    pub fn summary(&self) -> QuestionSummary {
        QuestionSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            difficulty: self.difficulty,
            category: self.category.clone(),
            sample_test_case: self.sample_test_case().cloned(),
            total_test_cases: self.test_cases.len(),
        }
    }
}

/// Public view of a question: hidden test cases are withheld.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionSummary {
    pub id: String,
    pub title: String,
    pub description: String,
    pub difficulty: Difficulty,
    pub category: String,
    pub sample_test_case: Option<TestCase>,
    pub total_test_cases: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub question_id: String,
    pub prompt: String,
    pub user_id: String,
    pub submitted_at: DateTime<Utc>,
}

impl Submission {
    pub fn new(question_id: impl Into<String>, prompt: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            question_id: question_id.into(),
            prompt: prompt.into(),
            user_id: user_id.into(),
            submitted_at: Utc::now(),
        }
    }
}

/// Queue payload. Carries a snapshot of the question so the worker
/// never consults the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionJob {
    pub submission: Submission,
    pub question: Question,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCaseResult {
    /// 1-based position of the test case within the question
    pub test_case_id: u32,
    pub input: Value,
    pub expected_output: Value,
    pub actual_output: Value,
    pub passed: bool,
    pub score: f64,
    pub missing_entries: Vec<Value>,
    pub extra_entries: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub submission_id: Uuid,
    pub question_id: String,
    pub score: f64,
    pub success: bool,
    pub passed_cases: usize,
    pub total_cases: usize,
    pub test_case_results: Vec<TestCaseResult>,
    pub model_response: String,
    pub parsed_response: Option<Value>,
    pub format_issues: Vec<String>,
}

/// Lifecycle of a single submission.
///
/// `Received → Normalizing → Scoring → Aggregated → Delivered`. A failed
/// generation skips scoring: `Normalizing → Aggregated`. `Rejected` is
/// reachable from any state that is not terminal: from `Received` for
/// invalid input, later on for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionState {
    Received,
    Normalizing,
    Scoring,
    Aggregated,
    Delivered,
    Rejected,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid submission state transition from {from:?} to {to:?}")]
pub struct StateTransitionError {
    pub from: SubmissionState,
    pub to: SubmissionState,
}

impl SubmissionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubmissionState::Delivered | SubmissionState::Rejected)
    }

    pub fn can_transition_to(&self, next: SubmissionState) -> bool {
        use SubmissionState::*;
        if next == Rejected {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Received, Normalizing)
                | (Normalizing, Scoring)
                | (Normalizing, Aggregated)
                | (Scoring, Aggregated)
                | (Aggregated, Delivered)
        )
    }

    pub fn transition(self, next: SubmissionState) -> Result<SubmissionState, StateTransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(StateTransitionError { from: self, to: next })
        }
    }
}

impl fmt::Display for SubmissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SubmissionState::Received => "received",
            SubmissionState::Normalizing => "normalizing",
            SubmissionState::Scoring => "scoring",
            SubmissionState::Aggregated => "aggregated",
            SubmissionState::Delivered => "delivered",
            SubmissionState::Rejected => "rejected",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_question() -> Question {
        Question {
            id: "q1".to_string(),
            title: "Filter adults".to_string(),
            description: "Keep people aged 18+".to_string(),
            difficulty: Difficulty::Easy,
            category: "filtering".to_string(),
            test_cases: vec![
                TestCase {
                    input: json!([{"name": "a", "age": 20}]),
                    expected_output: json!([{"name": "a"}]),
                },
                TestCase {
                    input: json!([{"name": "b", "age": 10}]),
                    expected_output: json!([]),
                },
            ],
        }
    }

    #[test]
    fn test_summary_hides_hidden_cases() {
        let summary = sample_question().summary();
        assert_eq!(summary.total_test_cases, 2);
        assert_eq!(
            summary.sample_test_case.unwrap().expected_output,
            json!([{"name": "a"}])
        );

        let serialized = serde_json::to_value(sample_question().summary()).unwrap();
        assert!(serialized.get("test_cases").is_none());
    }

    #[test]
    fn test_difficulty_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Difficulty::Medium).unwrap(), "\"medium\"");
        assert_eq!("HARD".parse::<Difficulty>(), Ok(Difficulty::Hard));
        assert_eq!(
            "extreme".parse::<Difficulty>(),
            Err(ParseDifficultyError("extreme".to_string()))
        );
    }

    #[test]
    fn test_state_happy_path() {
        let state = SubmissionState::Received
            .transition(SubmissionState::Normalizing)
            .and_then(|s| s.transition(SubmissionState::Scoring))
            .and_then(|s| s.transition(SubmissionState::Aggregated))
            .and_then(|s| s.transition(SubmissionState::Delivered))
            .unwrap();
        assert!(state.is_terminal());
    }

    #[test]
    fn test_state_rejected_from_any_live_state() {
        for state in [
            SubmissionState::Received,
            SubmissionState::Normalizing,
            SubmissionState::Scoring,
            SubmissionState::Aggregated,
        ] {
            assert_eq!(state.transition(SubmissionState::Rejected), Ok(SubmissionState::Rejected));
        }

        let err = SubmissionState::Delivered
            .transition(SubmissionState::Rejected)
            .unwrap_err();
        assert_eq!(err.from, SubmissionState::Delivered);
        assert!(!SubmissionState::Rejected.can_transition_to(SubmissionState::Rejected));
    }

    #[test]
    fn test_state_refuses_skips() {
        assert!(!SubmissionState::Received.can_transition_to(SubmissionState::Scoring));
        assert!(!SubmissionState::Scoring.can_transition_to(SubmissionState::Normalizing));
        assert!(!SubmissionState::Delivered.can_transition_to(SubmissionState::Received));
    }

    #[test]
    fn test_submission_new_assigns_id() {
        let a = Submission::new("q1", "prompt", "u1");
        let b = Submission::new("q1", "prompt", "u1");
        assert_ne!(a.id, b.id);
        assert_eq!(a.question_id, "q1");
    }
}
