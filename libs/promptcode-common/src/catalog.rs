// Question catalog: read-only lookup of questions by id
// Loaded from config/questions.json

use crate::error::{CatalogError, ValidationError};
use crate::types::Question;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

pub const DEFAULT_QUESTIONS_PATH: &str = "config/questions.json";

/// On-disk layout of the catalog file
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CatalogFile {
    pub questions: Vec<Question>,
}

/// Read-only question lookup used by the API and CLI
pub trait QuestionCatalog: Send + Sync {
    fn get(&self, id: &str) -> Option<&Question>;

    /// All questions in catalog order
    fn questions(&self) -> &[Question];
}

/// Catalog backed by a JSON file, indexed by question id
#[derive(Debug, Clone)]
pub struct JsonCatalog {
    questions: Vec<Question>,
    index: HashMap<String, usize>,
}

impl JsonCatalog {
    pub fn from_questions(questions: Vec<Question>) -> Result<Self, CatalogError> {
        let mut index = HashMap::with_capacity(questions.len());
        for (pos, question) in questions.iter().enumerate() {
            if index.insert(question.id.clone(), pos).is_some() {
                return Err(CatalogError::DuplicateQuestion(question.id.clone()));
            }
        }
        Ok(Self { questions, index })
    }

    /// Load the catalog from a questions.json file
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        if !path.exists() {
            return Err(CatalogError::NotFound(path.display().to_string()));
        }

        let content = fs::read_to_string(path)?;
        let file: CatalogFile = serde_json::from_str(&content)?;
        Self::from_questions(file.questions)
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn list_ids(&self) -> Vec<String> {
        self.questions.iter().map(|q| q.id.clone()).collect()
    }
}

impl QuestionCatalog for JsonCatalog {
    fn get(&self, id: &str) -> Option<&Question> {
        self.index.get(id).map(|&pos| &self.questions[pos])
    }

    fn questions(&self) -> &[Question] {
        &self.questions
    }
}

/// Problems that make a question unusable for grading.
/// Empty means the question is well-formed.
pub fn check_question(question: &Question) -> Vec<String> {
    let mut problems = Vec::new();
    if question.id.trim().is_empty() {
        problems.push("id is empty".to_string());
    }
    if question.title.trim().is_empty() {
        problems.push("title is empty".to_string());
    }
    if question.test_cases.is_empty() {
        problems.push("no test cases".to_string());
    }
    for (idx, tc) in question.test_cases.iter().enumerate() {
        if tc.expected_output.is_null() {
            problems.push(format!("test case {} has a null expected_output", idx + 1));
        }
    }
    problems
}

/// Validate a submission request against the catalog.
/// Returns a snapshot of the targeted question on success.
pub fn validate_submission(
    catalog: &dyn QuestionCatalog,
    question_id: &str,
    prompt: &str,
    user_id: &str,
) -> Result<Question, ValidationError> {
    if prompt.trim().is_empty() {
        return Err(ValidationError::EmptyPrompt);
    }
    if user_id.trim().is_empty() {
        return Err(ValidationError::MissingUser);
    }

    let question = catalog
        .get(question_id)
        .ok_or_else(|| ValidationError::UnknownQuestion(question_id.to_string()))?;

    if question.test_cases.is_empty() {
        return Err(ValidationError::NoTestCases(question.id.clone()));
    }

    Ok(question.clone())
}
