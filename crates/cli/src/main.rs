//! Stepwise CLI - step-progression tutoring for data-structure projects.

mod library;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use stepwise_ai::OllamaClient;
use stepwise_core::{LearnerId, ProjectId, StepwiseConfig, Tier};
use stepwise_progress::{
    Dashboard, EngineError, ProgressTracker, ProgressionEngine, ProjectProgress,
};
use stepwise_storage::{JsonStorage, LearnerStore, ProjectCatalog};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stepwise")]
#[command(about = "Step-by-step tutoring for data-structure projects", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Storage directory, overrides configuration
    #[arg(long, global = true)]
    storage: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the built-in project library
    Seed,
    /// List projects
    Projects {
        /// Filter by difficulty (beginner, intermediate, advanced)
        #[arg(long)]
        level: Option<String>,
    },
    /// Show project details
    Show {
        /// Project ID
        id: String,
    },
    /// Register or look up a learner by email
    Login {
        /// Email address
        email: String,
    },
    /// Set a learner's proficiency
    Proficiency {
        /// Learner ID
        learner: String,
        /// beginner, intermediate, advanced, or none
        tier: String,
    },
    /// Send a message for the current step (reads stdin when omitted)
    Chat {
        /// Learner ID
        #[arg(long)]
        learner: String,
        /// Project ID
        #[arg(long)]
        project: String,
        /// Message
        message: Option<String>,
    },
    /// Show a learner's progress
    Status {
        /// Learner ID
        #[arg(long)]
        learner: String,
        /// Only this project
        #[arg(long)]
        project: Option<String>,
    },
    /// Check that the reasoning server answers
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = StepwiseConfig::load(cli.config.as_deref()).context("invalid configuration")?;
    if let Some(path) = cli.storage {
        config.storage.path = path;
    }

    // Open storage
    let storage = Arc::new(JsonStorage::new(&config.storage.path).await?);

    match cli.command {
        Commands::Seed => {
            let report = library::seed(storage.as_ref()).await?;
            println!(
                "Seeded library: {} added, {} already present",
                report.added, report.skipped
            );
        }
        Commands::Projects { level } => {
            let level = level.map(|l| parse_tier(&l)).transpose()?;
            let projects = storage.list_projects(level).await?;

            println!("Projects ({})", projects.len());
            for project in projects {
                println!(
                    "  {} | {:<12} | {} steps | {}",
                    project.id,
                    project.difficulty.as_str(),
                    project.step_count(),
                    project.title,
                );
            }
        }
        Commands::Show { id } => {
            let project_id = parse_project(&id)?;
            let Some(project) = storage.get_project(project_id).await? else {
                println!("Error: Project not found.");
                return Ok(());
            };

            println!("Project: {}", project.id);
            println!("  Title: {}", project.title);
            println!("  Difficulty: {}", project.difficulty);
            println!("  Description: {}", project.description);
            for step in &project.steps {
                println!("  {}. {}", step.position, step.title);
            }
        }
        Commands::Login { email } => {
            let learner = storage.register(&email).await?;
            println!("Learner: {}", learner.id);
            println!("  Email: {}", learner.email);
            if let Some(tier) = learner.proficiency {
                println!("  Proficiency: {}", tier);
            }
        }
        Commands::Proficiency { learner, tier } => {
            let learner_id = parse_learner(&learner)?;
            let tier = match tier.to_lowercase().as_str() {
                "none" => None,
                other => Some(parse_tier(other)?),
            };
            let learner = storage.set_proficiency(learner_id, tier).await?;
            println!(
                "Proficiency for {}: {}",
                learner.email,
                learner.proficiency.map(|t| t.as_str()).unwrap_or("none")
            );
        }
        Commands::Chat {
            learner,
            project,
            message,
        } => {
            let learner_id = parse_learner(&learner)?;
            let project_id = parse_project(&project)?;
            let client = Arc::new(
                OllamaClient::new(&config.reasoning).context("failed to build HTTP client")?,
            );
            let engine = ProgressionEngine::from_config(storage, client, &config)
                .context("invalid safety configuration")?;

            match message {
                Some(message) => chat(&engine, learner_id, project_id, &message).await?,
                None => {
                    let mut lines = BufReader::new(tokio::io::stdin()).lines();
                    while let Some(line) = lines.next_line().await? {
                        if line.trim().is_empty() {
                            continue;
                        }
                        chat(&engine, learner_id, project_id, &line).await?;
                    }
                }
            }
        }
        Commands::Status { learner, project } => {
            let learner_id = parse_learner(&learner)?;
            let dashboard = Dashboard::new(storage.clone(), storage);

            if let Some(project) = project {
                let project_id = parse_project(&project)?;
                match dashboard.project_progress(learner_id, project_id).await? {
                    Some(progress) => println!("{}", progress_line(&progress)),
                    None => println!("Not started."),
                }
                return Ok(());
            }

            let summary = dashboard.summary(learner_id).await?;

            println!("Progress for {}", learner_id);
            for project in &summary.projects {
                println!("  {}", progress_line(project));
            }
            println!("  Overall: {:.0}%", summary.overall_percentage);
        }
        Commands::Health => {
            let client =
                OllamaClient::new(&config.reasoning).context("failed to build HTTP client")?;
            if client.health_check().await {
                println!("Reasoning server OK ({})", client.model());
            } else {
                return Err(anyhow!(
                    "reasoning server at {} is not answering",
                    config.reasoning.base_url
                ));
            }
        }
    }

    Ok(())
}

async fn chat(
    engine: &ProgressionEngine,
    learner_id: LearnerId,
    project_id: ProjectId,
    message: &str,
) -> Result<()> {
    match engine.handle_message(learner_id, project_id, message).await {
        Ok(reply) => println!("{}\n", reply),
        Err(EngineError::ProjectNotFound(id)) => {
            info!("Unknown project {}", id);
            println!("Error: Project not found.");
        }
        Err(e @ EngineError::TutorUnavailable(_)) => println!("{}", e),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

fn progress_line(progress: &ProjectProgress) -> String {
    format!(
        "{:<28} {}/{} steps ({:.0}%){}",
        progress.title,
        progress.completed_steps,
        progress.total_steps,
        progress.percentage,
        if progress.complete { " COMPLETE" } else { "" },
    )
}

fn parse_tier(s: &str) -> Result<Tier> {
    Tier::parse(s).ok_or_else(|| anyhow!("Unknown tier: {}", s))
}

fn parse_learner(s: &str) -> Result<LearnerId> {
    s.parse().map_err(|_| anyhow!("Invalid learner ID"))
}

fn parse_project(s: &str) -> Result<ProjectId> {
    s.parse().map_err(|_| anyhow!("Invalid project ID"))
}
