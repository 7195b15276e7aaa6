mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use db::{BuildSessionRepository, BuildSessionStatus, ErrorRecordRepository};
use events::{AgentStatusEvent, Event, Transition};
use forge_core::{AgentStatus, BuildRequest, PlanResult, PlanStatus, RequestType};
use orchestrator::{
    BoundedGenerator, DependencyGraph, GenerationService, OpenRouterClient, Orchestrator,
    RequirementDecomposer,
};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use crate::config::{ForgeConfig, Workspace, API_KEY_ENV, CONFIG_FILE, DEFAULT_DB_NAME, FORGE_DIR};

#[derive(Parser)]
#[command(name = "buildforge")]
#[command(about = "Multi-agent build orchestration", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file, defaults to .buildforge/config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct RequestArgs {
    /// create_app, modify_app, deploy_app or integrate_service
    #[arg(short = 't', long = "type")]
    request_type: RequestType,

    #[arg(short, long)]
    description: String,

    /// Defaults to the configured project name
    #[arg(long)]
    project: Option<String>,

    #[arg(long)]
    user: Option<String>,

    #[arg(short = 'r', long = "requirement")]
    requirements: Vec<String>,

    #[arg(short = 'c', long = "constraint")]
    constraints: Vec<String>,

    /// JSON file with prior analysis passed to planning and agents
    #[arg(long)]
    context: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    Init,
    /// Decompose a request and print the plan without running it
    Plan {
        #[command(flatten)]
        request: RequestArgs,
    },
    /// Decompose and run a request, streaming step status
    Run {
        #[command(flatten)]
        request: RequestArgs,

        /// Print the final result as JSON
        #[arg(long)]
        json: bool,
    },
    Status {
        /// Show the error log of one build session
        #[arg(long)]
        session: Option<Uuid>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let workspace = Workspace::current()?;
    let config_path = cli.config.unwrap_or_else(|| workspace.config_path());

    match cli.command {
        Commands::Init => init_project(&workspace, &config_path).await,
        Commands::Plan { request } => plan(&config_path, request).await,
        Commands::Run { request, json } => run(&workspace, &config_path, request, json).await,
        Commands::Status { session } => status(&workspace, &config_path, session).await,
    }
}

async fn init_project(workspace: &Workspace, config_path: &Path) -> Result<()> {
    if workspace.exists() {
        println!("Project already initialized at {}", workspace.dir().display());
        return Ok(());
    }

    println!("Initializing BuildForge in {}", workspace.root().display());
    tokio::fs::create_dir_all(workspace.dir()).await?;

    let project_name = workspace.project_name();
    let config = ForgeConfig::for_project(&project_name);
    config.save(config_path).await?;

    let pool = db::create_pool(&workspace.database_url()).await?;
    db::run_migrations(&pool).await?;

    println!();
    println!("Initialized BuildForge for '{}'", project_name);
    println!();
    println!("Created:");
    println!("  {}/", FORGE_DIR);
    println!("  ├── {}", CONFIG_FILE);
    println!("  └── {}", DEFAULT_DB_NAME);
    println!();
    println!("Next steps:");
    println!("  1. export {}=...", API_KEY_ENV);
    println!("  2. buildforge run --type create_app --description \"...\"");

    Ok(())
}

async fn load(config_path: &Path) -> Result<ForgeConfig> {
    let config = ForgeConfig::load(config_path).await?;
    init_tracing(&config);
    Ok(config)
}

fn generator(config: &ForgeConfig) -> Result<Arc<dyn GenerationService>> {
    let api_key = std::env::var(API_KEY_ENV)
        .with_context(|| format!("{} is not set", API_KEY_ENV))?;
    let generation = &config.orchestrator.generation;
    Ok(Arc::new(OpenRouterClient::new(
        api_key,
        generation.base_url.clone(),
        generation.model.clone(),
    )))
}

async fn build_request(config: &ForgeConfig, args: RequestArgs) -> Result<BuildRequest> {
    let mut request = BuildRequest::new(
        args.user.unwrap_or_else(|| config.project.user.clone()),
        args.project.unwrap_or_else(|| config.project.name.clone()),
        args.request_type,
        args.description,
    )
    .with_requirements(args.requirements)
    .with_constraints(args.constraints);

    if let Some(path) = args.context {
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let context: serde_json::Value = serde_json::from_str(&content)
            .with_context(|| format!("{} is not valid JSON", path.display()))?;
        request = request.with_context(context);
    }
    Ok(request)
}

async fn plan(config_path: &Path, args: RequestArgs) -> Result<()> {
    let config = load(config_path).await?;
    let generation = &config.orchestrator.generation;
    let bounded = Arc::new(BoundedGenerator::new(generator(&config)?, generation.timeout_ms));
    let decomposer = RequirementDecomposer::new(bounded, generation);
    let request = build_request(&config, args).await?;

    let decomposition = decomposer.decompose(&request).await;
    if let Some(reason) = &decomposition.fallback_reason {
        println!("{} {}", "Using fallback plan:".yellow(), reason);
    }
    let graph = DependencyGraph::build(&decomposition.steps)?;

    println!();
    println!("Plan for {} ({} steps)", request.request_type, decomposition.steps.len());
    for id in graph.order() {
        let Some(step) = decomposition.steps.iter().find(|s| &s.id == id) else {
            continue;
        };
        let marker = if step.critical { "*" } else { " " };
        let deps = if step.dependencies.is_empty() {
            String::new()
        } else {
            format!(" <- {}", step.dependencies.join(", "))
        };
        println!(
            "  {}{} [{}] {}{}",
            marker,
            step.id,
            step.agent_type,
            step.action,
            deps.dimmed()
        );
    }
    println!();
    println!("  * critical");

    Ok(())
}

async fn run(
    workspace: &Workspace,
    config_path: &Path,
    args: RequestArgs,
    json: bool,
) -> Result<()> {
    let config = load(config_path).await?;
    let generator = generator(&config)?;

    let database_url = workspace.database_url();
    tracing::info!("Database: {}", workspace.db_path().display());
    let pool = db::create_pool(&database_url)
        .await
        .context("Failed to create database pool")?;
    db::run_migrations(&pool).await?;

    let bus = events::EventBus::with_capacity(config.orchestrator.event_capacity);
    let orchestrator = Orchestrator::with_builtin_agents(config.orchestrator.clone(), generator, bus)
        .with_error_store(ErrorRecordRepository::new(pool.clone()))
        .with_session_store(BuildSessionRepository::new(pool));

    let request = build_request(&config, args).await?;
    let request_id = request.request_id;
    let mut rx = orchestrator.subscribe(request.session_id());

    let submission = orchestrator.submit_request(request).await?;
    println!();
    println!("Build {}", submission.request_id.to_string().bold());
    if submission.fallback {
        println!("{}", "Planning failed, running the fallback plan".yellow());
    }
    println!();

    let mut cancelling = false;
    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Ok(envelope) => {
                    let finished = matches!(envelope.event, Event::PlanFinished { .. });
                    print_event(&envelope.event);
                    if finished {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event stream lagged, {} events skipped", skipped);
                }
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c(), if !cancelling => {
                println!("{}", "Cancelling...".yellow());
                cancelling = orchestrator.cancel_request(request_id);
            }
        }
    }

    let result = orchestrator
        .get_result(request_id)
        .context("Build finished without a result")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_summary(&result);
    }

    if result.status != PlanStatus::Completed {
        bail!("Build {} {}", request_id, result.status);
    }
    Ok(())
}

fn print_event(event: &Event) {
    match event {
        Event::AgentStatus(status) => print_status(status),
        Event::PlanAccepted { total_steps, .. } => {
            println!("Plan accepted with {} steps", total_steps);
        }
        Event::PlanCancelled { .. } => println!("{}", "Build cancelled".yellow()),
        Event::PlanFinished {
            status,
            completed_steps,
            total_steps,
            ..
        } => {
            println!();
            println!(
                "Build {} ({}/{} steps)",
                status.as_str().bold(),
                completed_steps,
                total_steps
            );
        }
        Event::Error { message, .. } => println!("{} {}", "error:".red(), message),
    }
}

fn print_status(status: &AgentStatusEvent) {
    let label = format!("{} [{}]", status.step_id, status.agent_type);
    match status.transition {
        Transition::Started => {
            let operation = status.current_operation.as_deref().unwrap_or("");
            println!("{} {} {}", "▶".cyan(), label, operation.dimmed());
        }
        Transition::Progress => {
            let operation = status.current_operation.as_deref().unwrap_or("");
            println!(
                "  {} {}% {}",
                label.dimmed(),
                status.progress.unwrap_or(0),
                operation.dimmed()
            );
        }
        Transition::Retrying => {
            let category = status
                .classification
                .as_ref()
                .map(|c| c.category.as_str())
                .unwrap_or("unknown");
            println!(
                "{} {} retry {}/{} in {}ms ({}): {}",
                "↻".yellow(),
                label,
                status.retry_count,
                status.max_retries,
                status.delay_ms.unwrap_or(0),
                category,
                status.error.as_deref().unwrap_or("")
            );
        }
        Transition::Completed => {
            if status.recovered {
                println!(
                    "{} {} recovered after {} retries",
                    "✓".green(),
                    label,
                    status.retry_count
                );
            } else {
                println!("{} {}", "✓".green(), label);
            }
        }
        Transition::Failed => {
            let critical = if status.critical { " (critical)" } else { "" };
            println!(
                "{} {}{}: {}",
                "✗".red(),
                label,
                critical,
                status.error.as_deref().unwrap_or("")
            );
            if let Some(classification) = &status.classification {
                println!("    {}", classification.message.dimmed());
                for line in classification.suggested_action.guidance() {
                    println!("    - {}", line);
                }
            }
        }
        Transition::Skipped => println!("{} {} skipped", "○".dimmed(), label),
        Transition::Reset => println!("{} {} reset for retry", "↺".cyan(), label),
    }
}

fn print_summary(result: &PlanResult) {
    println!();
    for outcome in &result.steps {
        let icon = match outcome.status {
            AgentStatus::Completed => "●".green(),
            AgentStatus::Failed => "✗".red(),
            AgentStatus::Skipped => "○".dimmed(),
            _ => "?".normal(),
        };
        println!(
            "  {} {} [{}] {} attempt(s)",
            icon, outcome.step_id, outcome.agent_type, outcome.attempts
        );
    }
    if !result.artifacts.is_empty() {
        println!();
        println!("Artifacts:");
        for artifact in &result.artifacts {
            println!("  {} ({})", artifact.name, artifact.artifact_type);
        }
    }
    if let Some(error) = &result.error {
        println!();
        println!("{} {}", "error:".red(), error);
    }
}

async fn status(workspace: &Workspace, config_path: &Path, session: Option<Uuid>) -> Result<()> {
    if !workspace.exists() {
        println!("Not a BuildForge project.");
        println!("Run 'buildforge init' to initialize.");
        return Ok(());
    }

    let config = ForgeConfig::load(config_path).await?;
    let db_path = workspace.db_path();
    if !db_path.exists() {
        println!("Project: {} (database not initialized)", config.project.name);
        return Ok(());
    }

    let pool = db::create_pool(&workspace.database_url()).await?;
    let sessions = BuildSessionRepository::new(pool.clone());
    let errors = ErrorRecordRepository::new(pool);

    if let Some(session_id) = session {
        let Some(build) = sessions.find_by_id(session_id).await? else {
            bail!("Build session {} not found", session_id);
        };
        println!();
        println!("Build:   {}", build.id);
        println!("Status:  {}", build.status.as_str());
        println!("Steps:   {}/{}", build.completed_steps, build.total_steps);
        if let Some(error) = &build.error {
            println!("Error:   {}", error);
        }
        println!();

        let records = errors.find_by_session_id(session_id).await?;
        if records.is_empty() {
            println!("No errors recorded.");
        }
        for record in &records {
            let category = record
                .classification
                .as_ref()
                .map(|c| c.category.as_str())
                .unwrap_or("unknown");
            println!(
                "  [{}] {} {} (retry {}): {}",
                record.resolution.as_str(),
                record.step_id,
                category,
                record.retry_count,
                record.message
            );
        }
        println!();
        return Ok(());
    }

    let builds = sessions.find_by_project_id(&config.project.name).await?;
    println!();
    println!("Project: {}", config.project.name);
    println!("Path:    {}", workspace.root().display());
    println!();

    if builds.is_empty() {
        println!("No builds yet.");
    } else {
        println!("Builds ({}):", builds.len());
        for build in &builds {
            let icon = match build.status {
                BuildSessionStatus::Running => "◐",
                BuildSessionStatus::Success => "●",
                BuildSessionStatus::Failed => "✗",
                BuildSessionStatus::Cancelled => "○",
            };
            let unresolved = errors.count_unresolved(build.id).await?;
            let request_type = build
                .request_type
                .map(|t| t.as_str())
                .unwrap_or("unknown");
            println!(
                "  {} [{}] {} {} ({}/{} steps, {} unresolved errors)",
                icon,
                build.status.as_str(),
                build.id,
                request_type,
                build.completed_steps,
                build.total_steps,
                unresolved
            );
        }
    }
    println!();

    Ok(())
}

fn init_tracing(config: &ForgeConfig) {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter().into()),
        )
        .init();
}
