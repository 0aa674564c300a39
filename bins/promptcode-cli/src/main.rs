mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use promptcode_common::catalog::DEFAULT_QUESTIONS_PATH;
use promptcode_common::types::Difficulty;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "promptcode-cli")]
#[command(about = "PromptCode CLI - Manage the question catalog", long_about = None)]
struct Cli {
    /// Path to the question catalog
    #[arg(long, env = "QUESTIONS_PATH", default_value = DEFAULT_QUESTIONS_PATH, global = true)]
    catalog: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a catalog with one sample question
    Init {
        /// Overwrite an existing catalog
        #[arg(long, default_value = "false")]
        force: bool,
    },

    /// Add a question from a JSON file
    AddQuestion {
        /// File holding a single question object
        #[arg(short, long)]
        file: PathBuf,
    },

    /// List questions in the catalog
    ListQuestions {
        /// Only show questions of this difficulty (easy, medium, hard)
        #[arg(short, long)]
        difficulty: Option<Difficulty>,
    },

    /// Check the catalog for problems
    Validate,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { force } => {
            commands::init_catalog(&cli.catalog, force)?;
        }
        Commands::AddQuestion { file } => {
            commands::add_question(&cli.catalog, &file)?;
        }
        Commands::ListQuestions { difficulty } => {
            commands::list_questions(&cli.catalog, difficulty)?;
        }
        Commands::Validate => {
            commands::validate_catalog(&cli.catalog)?;
        }
    }

    Ok(())
}
