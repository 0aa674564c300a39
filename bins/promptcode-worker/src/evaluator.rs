/// Submission Evaluator - Scoring and Aggregation
///
/// **Core Responsibility:**
/// Compare the model's output for each test case against the expected output
/// and reduce the per-case results into one `SubmissionResult`.
///
/// **Critical Properties:**
/// - Knows nothing about the model provider
/// - Knows nothing about Redis
/// - Pure function: (question, model output) → result
///
/// **Aggregation Rules:**
/// - overall score: mean of per-case scores (keeps partial credit)
/// - success: decided by the configured `PassPolicy`
/// - malformed output: case failed with score 0 and empty diff lists
///
/// **Response Shape:**
/// The model answers every test case at once with a JSON array holding one
/// output per test case, in order. A response of any other shape fails every
/// case with a single format issue.

use crate::differ::diff_entries;
use crate::normalizer::{normalize, normalize_actual, parse_model_response, split_case_outputs};
use crate::scorer::{score_case, CaseScore};
use promptcode_common::config::{EvaluationConfig, NumericEquality};
use promptcode_common::types::{SubmissionJob, SubmissionResult, TestCase, TestCaseResult};
use serde_json::Value;
use tracing::{debug, info, warn};

/// Raw model output for a whole submission.
/// Produced by a GenerationService, consumed by the Evaluator.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOutput {
    pub raw_text: String,
    /// Best-effort structured parse supplied by the generator
    pub parsed: Option<Value>,
}

/// Model output split into per-test-case values
#[derive(Debug, Clone)]
pub struct PreparedResponse {
    pub parsed: Option<Value>,
    /// `None` for every case when the response as a whole was unusable
    pub case_outputs: Vec<Option<Value>>,
    pub issue: Option<String>,
}

/// Outcome for one test case before aggregation
#[derive(Debug, Clone, PartialEq)]
pub struct CaseEvaluation {
    pub result: TestCaseResult,
    pub format_issue: Option<String>,
}

/// Parse (if the generator did not) and split the model output.
pub fn prepare_response(output: &ModelOutput, total_cases: usize) -> PreparedResponse {
    let parsed = match &output.parsed {
        Some(value) => Ok(value.clone()),
        None => parse_model_response(&output.raw_text),
    };

    let parsed = match parsed {
        Ok(value) => value,
        Err(e) => {
            return PreparedResponse {
                parsed: None,
                case_outputs: vec![None; total_cases],
                issue: Some(format!("Model response could not be parsed: {}", e)),
            };
        }
    };

    match split_case_outputs(&parsed, total_cases) {
        Ok(outputs) => PreparedResponse {
            parsed: Some(parsed),
            case_outputs: outputs.into_iter().map(Some).collect(),
            issue: None,
        },
        Err(e) => PreparedResponse {
            parsed: Some(parsed),
            case_outputs: vec![None; total_cases],
            issue: Some(format!("Model response has the wrong shape: {}", e)),
        },
    }
}

fn failed_result(test_case_id: u32, test_case: &TestCase, actual: Option<&Value>) -> TestCaseResult {
    let score = CaseScore::malformed();
    TestCaseResult {
        test_case_id,
        input: test_case.input.clone(),
        expected_output: test_case.expected_output.clone(),
        actual_output: actual.cloned().unwrap_or(Value::Null),
        passed: score.passed,
        score: score.score,
        missing_entries: Vec::new(),
        extra_entries: Vec::new(),
    }
}

/// Evaluate a single test case against the model's output for it
///
/// `actual` is `None` when the model produced nothing usable for this case.
pub fn evaluate_test(
    test_case_id: u32,
    test_case: &TestCase,
    actual: Option<&Value>,
    mode: NumericEquality,
) -> CaseEvaluation {
    let actual_entries = match normalize_actual(actual, &test_case.expected_output, mode) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(test_case_id, error = %e, "Malformed output for test case");
            return CaseEvaluation {
                result: failed_result(test_case_id, test_case, actual),
                format_issue: Some(format!("Test case {}: {}", test_case_id, e)),
            };
        }
    };

    let expected_entries = normalize(&test_case.expected_output, mode);
    let diff = diff_entries(&expected_entries, &actual_entries);
    let score = score_case(&diff);

    debug!(
        test_case_id,
        passed = score.passed,
        score = score.score,
        missing = diff.missing.len(),
        extra = diff.extra.len(),
        "Test case evaluated"
    );

    CaseEvaluation {
        result: TestCaseResult {
            test_case_id,
            input: test_case.input.clone(),
            expected_output: test_case.expected_output.clone(),
            actual_output: actual.cloned().unwrap_or(Value::Null),
            passed: score.passed,
            score: score.score,
            missing_entries: diff.missing,
            extra_entries: diff.extra,
        },
        format_issue: None,
    }
}

/// A case whose output was lost with the whole response.
/// The response-level issue already explains it.
pub fn unavailable_case(test_case_id: u32, test_case: &TestCase) -> CaseEvaluation {
    CaseEvaluation {
        result: failed_result(test_case_id, test_case, None),
        format_issue: None,
    }
}

/// Evaluate one case from a prepared response
pub fn evaluate_prepared_case(
    index: usize,
    test_case: &TestCase,
    prepared: &PreparedResponse,
    mode: NumericEquality,
) -> CaseEvaluation {
    let test_case_id = (index + 1) as u32;
    if prepared.issue.is_some() {
        return unavailable_case(test_case_id, test_case);
    }
    evaluate_test(test_case_id, test_case, prepared.case_outputs[index].as_ref(), mode)
}

/// Aggregate per-case evaluations into the final submission result
///
/// This function:
/// 1. Counts passed cases
/// 2. Averages per-case scores
/// 3. Applies the pass policy
/// 4. Collects format issues, response-level first
pub fn aggregate_results(
    job: &SubmissionJob,
    output: &ModelOutput,
    prepared: PreparedResponse,
    cases: Vec<CaseEvaluation>,
    config: &EvaluationConfig,
) -> SubmissionResult {
    let total_cases = cases.len();
    let passed_cases = cases.iter().filter(|c| c.result.passed).count();
    let overall_score = if total_cases == 0 {
        0.0
    } else {
        cases.iter().map(|c| c.result.score).sum::<f64>() / total_cases as f64
    };
    let success = config.pass_policy.is_passed(passed_cases, total_cases, overall_score);

    let mut format_issues: Vec<String> = prepared.issue.into_iter().collect();
    let mut test_case_results = Vec::with_capacity(total_cases);
    for case in cases {
        if let Some(issue) = case.format_issue {
            format_issues.push(issue);
        }
        test_case_results.push(case.result);
    }

    info!(
        submission_id = %job.submission.id,
        question_id = %job.question.id,
        passed_cases,
        total_cases,
        score = overall_score,
        success,
        format_issues = format_issues.len(),
        "Evaluation complete"
    );

    SubmissionResult {
        submission_id: job.submission.id,
        question_id: job.question.id.clone(),
        score: overall_score,
        success,
        passed_cases,
        total_cases,
        test_case_results,
        model_response: output.raw_text.clone(),
        parsed_response: prepared.parsed,
        format_issues,
    }
}

/// Result for a submission whose generation call failed
pub fn generation_failed(job: &SubmissionJob, reason: &str) -> SubmissionResult {
    SubmissionResult {
        submission_id: job.submission.id,
        question_id: job.question.id.clone(),
        score: 0.0,
        success: false,
        passed_cases: 0,
        total_cases: 0,
        test_case_results: Vec::new(),
        model_response: String::new(),
        parsed_response: None,
        format_issues: vec![format!("Generation failed: {}", reason)],
    }
}

/// Evaluate all test cases sequentially and produce the final result
///
/// Reference path for the executor, which fans the same per-case work out
/// across blocking tasks; both must produce identical results.
#[cfg(test)]
pub fn evaluate(job: &SubmissionJob, output: &ModelOutput, config: &EvaluationConfig) -> SubmissionResult {
    let test_cases = &job.question.test_cases;
    let prepared = prepare_response(output, test_cases.len());

    let cases = test_cases
        .iter()
        .enumerate()
        .map(|(idx, tc)| evaluate_prepared_case(idx, tc, &prepared, config.numeric_equality))
        .collect();

    aggregate_results(job, output, prepared, cases, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptcode_common::config::PassPolicy;
    use promptcode_common::types::{Difficulty, Question, Submission};
    use serde_json::json;

    /// Helper to create a job with the given expected outputs
    fn make_job(expected: Vec<Value>) -> SubmissionJob {
        let question = Question {
            id: "q1".to_string(),
            title: "Extract records".to_string(),
            description: String::new(),
            difficulty: Difficulty::Easy,
            category: "extraction".to_string(),
            test_cases: expected
                .into_iter()
                .enumerate()
                .map(|(i, expected_output)| TestCase {
                    input: json!({"case": i}),
                    expected_output,
                })
                .collect(),
        };
        SubmissionJob {
            submission: Submission::new("q1", "Return the records", "user-1"),
            question,
        }
    }

    fn make_output(raw: &str) -> ModelOutput {
        ModelOutput {
            raw_text: raw.to_string(),
            parsed: None,
        }
    }

    fn case(expected: Value, actual: Value) -> TestCaseResult {
        let tc = TestCase {
            input: json!(null),
            expected_output: expected,
        };
        evaluate_test(1, &tc, Some(&actual), NumericEquality::Strict).result
    }

    #[test]
    fn test_scenario_reordered() {
        let r = case(json!([{"a": 1}, {"a": 2}]), json!([{"a": 2}, {"a": 1}]));
        assert!(r.passed);
        assert_eq!(r.score, 1.0);
        assert!(r.missing_entries.is_empty());
        assert!(r.extra_entries.is_empty());
    }

    #[test]
    fn test_scenario_missing() {
        let r = case(json!([{"a": 1}, {"a": 2}]), json!([{"a": 1}]));
        assert!(!r.passed);
        assert_eq!(r.score, 0.5);
        assert_eq!(r.missing_entries, vec![json!({"a": 2})]);
        assert!(r.extra_entries.is_empty());
    }

    #[test]
    fn test_scenario_extra() {
        let r = case(json!([{"a": 1}]), json!([{"a": 1}, {"a": 99}]));
        assert!(!r.passed);
        assert_eq!(r.score, 1.0);
        assert!(r.missing_entries.is_empty());
        assert_eq!(r.extra_entries, vec![json!({"a": 99})]);
    }

    #[test]
    fn test_nothing_expected() {
        let r = case(json!([]), json!([]));
        assert!(r.passed);
        assert_eq!(r.score, 1.0);

        let r = case(json!([]), json!([{"a": 1}, {"a": 2}]));
        assert!(!r.passed);
        assert_eq!(r.score, 0.0);
        assert_eq!(r.extra_entries, vec![json!({"a": 1}), json!({"a": 2})]);
    }

    #[test]
    fn test_scenario_unparsable_response() {
        let job = make_job(vec![json!([1]), json!([2])]);
        let result = evaluate(&job, &make_output("I think the answer is 1"), &EvaluationConfig::default());

        assert!(!result.success);
        assert_eq!(result.score, 0.0);
        assert_eq!(result.total_cases, 2);
        assert_eq!(result.format_issues.len(), 1);
        assert!(result.format_issues[0].contains("could not be parsed"));
        assert!(result.parsed_response.is_none());
        for r in &result.test_case_results {
            assert!(!r.passed);
            assert_eq!(r.score, 0.0);
            assert!(r.missing_entries.is_empty() && r.extra_entries.is_empty());
        }
    }

    #[test]
    fn test_idempotent_rescoring() {
        let a = case(json!([1, 2, 3]), json!([3, 4, 1]));
        let b = case(json!([1, 2, 3]), json!([3, 4, 1]));
        assert_eq!(a, b);
    }

    #[test]
    fn test_all_pass() {
        let job = make_job(vec![json!([{"x": 1}]), json!({"total": 2})]);
        let output = make_output(r#"[[{"x": 1}], {"total": 2}]"#);

        let result = evaluate(&job, &output, &EvaluationConfig::default());

        assert!(result.success);
        assert_eq!(result.score, 1.0);
        assert_eq!(result.passed_cases, 2);
        assert_eq!(result.total_cases, 2);
        assert!(result.format_issues.is_empty());
        assert_eq!(result.test_case_results[1].test_case_id, 2);
        assert_eq!(result.submission_id, job.submission.id);
    }

    #[test]
    fn test_partial_credit_mean() {
        let job = make_job(vec![json!([1, 2]), json!([3]), json!([4, 5, 6, 7])]);
        // case 1: 1/2, case 2: 1.0 pass, case 3: 1/4
        let output = make_output("[[1], [3], [7, 8]]");

        let result = evaluate(&job, &output, &EvaluationConfig::default());

        assert!(!result.success);
        assert_eq!(result.passed_cases, 1);
        let expected_mean = (0.5 + 1.0 + 0.25) / 3.0;
        assert!((result.score - expected_mean).abs() < 1e-12);
        assert_eq!(result.test_case_results[2].extra_entries, vec![json!(8)]);
    }

    #[test]
    fn test_overall_score_is_mean_not_pass_ratio() {
        let job = make_job(vec![json!([1]), json!([2])]);
        // Both cases have full recall, second has an extra entry
        let result = evaluate(&job, &make_output("[[1], [2, 9]]"), &EvaluationConfig::default());

        assert_eq!(result.score, 1.0);
        assert_eq!(result.passed_cases, 1);
        assert!(!result.success);
    }

    #[test]
    fn test_null_element_is_per_case_issue() {
        let job = make_job(vec![json!([1]), json!([2])]);
        let result = evaluate(&job, &make_output("[null, [2]]"), &EvaluationConfig::default());

        assert_eq!(result.format_issues, vec!["Test case 1: no output was produced for this test case".to_string()]);
        assert!(!result.test_case_results[0].passed);
        assert!(result.test_case_results[1].passed);
        assert_eq!(result.score, 0.5);
    }

    #[test]
    fn test_wrong_top_level_shape() {
        let job = make_job(vec![json!([1]), json!([2])]);
        let result = evaluate(&job, &make_output(r#"{"answer": [1]}"#), &EvaluationConfig::default());

        assert_eq!(result.format_issues.len(), 1);
        assert!(result.format_issues[0].contains("wrong shape"));
        assert_eq!(result.parsed_response, Some(json!({"answer": [1]})));
        assert_eq!(result.passed_cases, 0);

        let result = evaluate(&job, &make_output("[[1]]"), &EvaluationConfig::default());
        assert!(result.format_issues[0].contains("expected 2 outputs"));
    }

    #[test]
    fn test_generator_parse_is_preferred() {
        let job = make_job(vec![json!([1])]);
        let output = ModelOutput {
            raw_text: "not json".to_string(),
            parsed: Some(json!([[1]])),
        };
        let result = evaluate(&job, &output, &EvaluationConfig::default());
        assert!(result.success);
        assert_eq!(result.model_response, "not json");
    }

    #[test]
    fn test_score_threshold_policy() {
        let job = make_job(vec![json!([1, 2]), json!([3])]);
        let output = make_output("[[1], [3]]");
        let config = EvaluationConfig {
            pass_policy: PassPolicy::ScoreThreshold(0.7),
            ..EvaluationConfig::default()
        };

        let result = evaluate(&job, &output, &config);
        assert_eq!(result.score, 0.75);
        assert_eq!(result.passed_cases, 1);
        assert!(result.success);
    }

    #[test]
    fn test_lenient_numeric_mode() {
        let job = make_job(vec![json!([{"id": 1, "price": 9.5}])]);
        let output = make_output(r#"[[{"id": "1", "price": "9.50"}]]"#);

        let strict = evaluate(&job, &output, &EvaluationConfig::default());
        assert!(!strict.success);

        let config = EvaluationConfig {
            numeric_equality: NumericEquality::Lenient,
            ..EvaluationConfig::default()
        };
        assert!(evaluate(&job, &output, &config).success);
    }

    #[test]
    fn test_generation_failed() {
        let job = make_job(vec![json!([1])]);
        let result = generation_failed(&job, "timed out after 60s");

        assert!(!result.success);
        assert_eq!(result.score, 0.0);
        assert!(result.test_case_results.is_empty());
        assert_eq!(result.total_cases, 0);
        assert_eq!(result.format_issues, vec!["Generation failed: timed out after 60s".to_string()]);
    }

    #[test]
    fn test_result_invariants() {
        let job = make_job(vec![json!([1]), json!([2, 3]), json!({"k": "v"})]);
        let result = evaluate(&job, &make_output(r#"[[1], [3], {"k": "v"}]"#), &EvaluationConfig::default());

        assert_eq!(result.total_cases, result.test_case_results.len());
        assert_eq!(
            result.passed_cases,
            result.test_case_results.iter().filter(|r| r.passed).count()
        );
        for r in &result.test_case_results {
            assert_eq!(r.passed, r.missing_entries.is_empty() && r.extra_entries.is_empty());
        }
    }
}
