/// Test Case Scorer
///
/// **Scoring Rules:**
/// - passed: no missing and no extra entries
/// - score: matched / expected, clamped to [0, 1]
/// - extra entries block `passed` but never lower the score
/// - nothing expected and nothing produced: passed, score 1.0
/// - nothing expected but entries produced: failed, score 0.0

use crate::differ::EntryDiff;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaseScore {
    pub passed: bool,
    pub score: f64,
}

impl CaseScore {
    /// Score for output that could not be compared at all
    pub fn malformed() -> Self {
        Self {
            passed: false,
            score: 0.0,
        }
    }
}

pub fn score_case(diff: &EntryDiff) -> CaseScore {
    let score = if diff.expected_count == 0 && diff.extra.is_empty() {
        1.0
    } else {
        diff.matched_count as f64 / diff.expected_count.max(1) as f64
    };

    CaseScore {
        passed: diff.is_exact(),
        score: score.clamp(0.0, 1.0),
    }
}
