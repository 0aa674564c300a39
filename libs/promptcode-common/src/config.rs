// Evaluation configuration shared by the worker and tooling

use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// How numbers compare during entry matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumericEquality {
    /// Numbers equal by value (`1 == 1.0`); never equal to strings
    #[default]
    Strict,
    /// Also treats numeric strings as numbers (`"42" == 42`)
    Lenient,
}

/// When a whole submission counts as passed.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassPolicy {
    #[default]
    AllCases,
    ScoreThreshold(f64),
}

impl PassPolicy {
    /// A submission with nothing scored never passes.
    pub fn is_passed(&self, passed_cases: usize, total_cases: usize, overall_score: f64) -> bool {
        if total_cases == 0 {
            return false;
        }
        match self {
            PassPolicy::AllCases => passed_cases == total_cases,
            PassPolicy::ScoreThreshold(threshold) => overall_score >= *threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EvaluationConfig {
    pub numeric_equality: NumericEquality,
    pub pass_policy: PassPolicy,
}

impl EvaluationConfig {
    /// Reads `EVAL_NUMERIC_EQUALITY` (strict|lenient) and
    /// `EVAL_PASS_THRESHOLD` (all|<float in [0,1]>).
    pub fn from_env() -> Result<Self, ConfigError> {
        let numeric = env::var("EVAL_NUMERIC_EQUALITY").unwrap_or_else(|_| "strict".to_string());
        let threshold = env::var("EVAL_PASS_THRESHOLD").unwrap_or_else(|_| "all".to_string());

        Ok(Self {
            numeric_equality: parse_numeric_equality(&numeric)?,
            pass_policy: parse_pass_policy(&threshold)?,
        })
    }
}

pub fn parse_numeric_equality(value: &str) -> Result<NumericEquality, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "strict" => Ok(NumericEquality::Strict),
        "lenient" => Ok(NumericEquality::Lenient),
        _ => Err(ConfigError::Invalid {
            key: "EVAL_NUMERIC_EQUALITY",
            value: value.to_string(),
            reason: "expected 'strict' or 'lenient'",
        }),
    }
}

pub fn parse_pass_policy(value: &str) -> Result<PassPolicy, ConfigError> {
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("all") {
        return Ok(PassPolicy::AllCases);
    }

    match trimmed.parse::<f64>() {
        Ok(t) if (0.0..=1.0).contains(&t) => Ok(PassPolicy::ScoreThreshold(t)),
        Ok(_) => Err(ConfigError::Invalid {
            key: "EVAL_PASS_THRESHOLD",
            value: value.to_string(),
            reason: "threshold must lie in [0, 1]",
        }),
        Err(_) => Err(ConfigError::Invalid {
            key: "EVAL_PASS_THRESHOLD",
            value: value.to_string(),
            reason: "expected 'all' or a number",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EvaluationConfig::default();
        assert_eq!(config.numeric_equality, NumericEquality::Strict);
        assert_eq!(config.pass_policy, PassPolicy::AllCases);
    }

    #[test]
    fn test_parse_values() {
        assert_eq!(parse_numeric_equality("Lenient").unwrap(), NumericEquality::Lenient);
        assert!(parse_numeric_equality("fuzzy").is_err());
        assert_eq!(parse_pass_policy("ALL").unwrap(), PassPolicy::AllCases);
        assert_eq!(parse_pass_policy("0.8").unwrap(), PassPolicy::ScoreThreshold(0.8));
        assert!(parse_pass_policy("1.5").is_err());
        assert!(parse_pass_policy("most").is_err());
    }

    #[test]
    fn test_pass_policy() {
        assert!(PassPolicy::AllCases.is_passed(3, 3, 1.0));
        assert!(!PassPolicy::AllCases.is_passed(2, 3, 0.9));
        assert!(PassPolicy::ScoreThreshold(0.75).is_passed(2, 3, 0.8));
        assert!(!PassPolicy::ScoreThreshold(0.75).is_passed(2, 3, 0.5));
        assert!(!PassPolicy::AllCases.is_passed(0, 0, 0.0));
        assert!(!PassPolicy::ScoreThreshold(0.0).is_passed(0, 0, 0.0));
    }
}
