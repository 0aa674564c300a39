// CLI commands for managing the PromptCode question catalog
use anyhow::{bail, Context, Result};
use promptcode_common::catalog::{check_question, CatalogFile};
use promptcode_common::types::{Difficulty, Question, TestCase};
use serde_json::json;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Load the catalog file, or an empty catalog if it does not exist yet
fn load_catalog(path: &Path) -> Result<CatalogFile> {
    if !path.exists() {
        return Ok(CatalogFile::default());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

fn save_catalog(path: &Path, catalog: &CatalogFile) -> Result<()> {
    // Ensure config directory exists
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let json_content = serde_json::to_string_pretty(catalog)
        .context("Failed to serialize question catalog")?;

    fs::write(path, json_content)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    Ok(())
}

fn sample_question() -> Question {
    Question {
        id: "adults-only".to_string(),
        title: "Adults only".to_string(),
        description: "Write a prompt that returns the names of everyone aged 18 or older, \
                      as a list of {\"name\": ...} objects."
            .to_string(),
        difficulty: Difficulty::Easy,
        category: "filtering".to_string(),
        test_cases: vec![
            TestCase {
                input: json!([{"name": "Ada", "age": 36}, {"name": "Tim", "age": 12}]),
                expected_output: json!([{"name": "Ada"}]),
            },
            TestCase {
                input: json!([{"name": "Lin", "age": 18}, {"name": "Ola", "age": 71}]),
                expected_output: json!([{"name": "Lin"}, {"name": "Ola"}]),
            },
            TestCase {
                input: json!([{"name": "Kit", "age": 9}]),
                expected_output: json!([]),
            },
        ],
    }
}

/// Every problem in the catalog, one line each
pub fn catalog_problems(catalog: &CatalogFile) -> Vec<String> {
    let mut problems = Vec::new();
    let mut seen = HashSet::new();

    for (idx, question) in catalog.questions.iter().enumerate() {
        let label = if question.id.is_empty() {
            format!("question #{}", idx + 1)
        } else {
            format!("question '{}'", question.id)
        };

        if !seen.insert(question.id.as_str()) {
            problems.push(format!("{}: duplicate id", label));
        }
        for problem in check_question(question) {
            problems.push(format!("{}: {}", label, problem));
        }
    }

    problems
}

/// Create a catalog containing one sample question
pub fn init_catalog(path: &Path, force: bool) -> Result<()> {
    println!("🚀 Initializing question catalog at {}", path.display());

    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }

    let catalog = CatalogFile {
        questions: vec![sample_question()],
    };
    save_catalog(path, &catalog)?;

    println!("✅ Catalog created with sample question 'adults-only'");
    println!("\n📋 Next steps:");
    println!("  1. Add questions: promptcode-cli add-question --file question.json");
    println!("  2. Check the catalog: promptcode-cli validate");
    Ok(())
}

/// Validate a question file and append it to the catalog
pub fn add_question(catalog_path: &Path, question_file: &Path) -> Result<()> {
    let content = fs::read_to_string(question_file)
        .with_context(|| format!("Failed to read {}", question_file.display()))?;
    let question: Question = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse question in {}", question_file.display()))?;

    println!("🚀 Adding question: {}", question.id);

    let problems = check_question(&question);
    if !problems.is_empty() {
        bail!("Question '{}' is invalid: {}", question.id, problems.join("; "));
    }

    let mut catalog = load_catalog(catalog_path)?;

    // Check if question already exists
    if catalog.questions.iter().any(|q| q.id == question.id) {
        bail!("Question '{}' already exists in catalog", question.id);
    }

    let id = question.id.clone();
    let cases = question.test_cases.len();
    catalog.questions.push(question);

    println!("📝 Updating {}...", catalog_path.display());
    save_catalog(catalog_path, &catalog)?;

    println!("✅ Question '{}' added with {} test case(s) (1 sample, {} hidden)", id, cases, cases - 1);
    Ok(())
}

/// Questions matching the difficulty filter, in catalog order
pub fn filter_questions(questions: &[Question], difficulty: Option<Difficulty>) -> Vec<&Question> {
    questions
        .iter()
        .filter(|q| difficulty.map_or(true, |d| q.difficulty == d))
        .collect()
}

pub fn list_questions(catalog_path: &Path, difficulty: Option<Difficulty>) -> Result<()> {
    let catalog = load_catalog(catalog_path)?;
    let questions = filter_questions(&catalog.questions, difficulty);

    if questions.is_empty() {
        match difficulty {
            Some(d) => println!("No {} questions in {}", d, catalog_path.display()),
            None => println!("No questions in {}", catalog_path.display()),
        }
        return Ok(());
    }

    println!("{:<24} {:<8} {:<16} {:>5}  TITLE", "ID", "LEVEL", "CATEGORY", "CASES");
    for q in questions {
        println!(
            "{:<24} {:<8} {:<16} {:>5}  {}",
            q.id,
            q.difficulty,
            q.category,
            q.test_cases.len(),
            q.title
        );
    }
    Ok(())
}

pub fn validate_catalog(catalog_path: &Path) -> Result<()> {
    if !catalog_path.exists() {
        bail!("Catalog not found: {}", catalog_path.display());
    }

    let catalog = load_catalog(catalog_path)?;
    let problems = catalog_problems(&catalog);

    if problems.is_empty() {
        println!("✅ {} question(s), no problems found", catalog.questions.len());
        return Ok(());
    }

    for problem in &problems {
        println!("  ✗ {}", problem);
    }
    bail!("{} problem(s) found in {}", problems.len(), catalog_path.display())
}
