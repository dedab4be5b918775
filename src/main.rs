use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use checkpoint_flow::{
    drain_published, init_telemetry, BroadcastFanout, Catalog, CheckpointEngine, CreateWorkOrderRequest, EngineError,
    FlowConfig, InMemoryRepository, OperationTimer, Script, TracingActivitySink, WorkflowRepository,
};

#[derive(Parser)]
#[command(name = "checkpoint-flow")]
#[command(about = "Drive work orders through departmental checkpoints")]
#[command(long_about = "checkpoint-flow creates work orders from checkpoint templates and moves each \
                       checkpoint through PENDING, PROCESSING and a final state, enforcing department \
                       ownership and checkpoint order. Start with 'checkpoint-flow validate --catalog <file>'.")]
struct Cli {
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, help = "Log level filter, e.g. info or checkpoint_flow=debug")]
    log_level: Option<String>,

    /// Configuration file
    #[arg(long, global = true, help = "Path to a checkpoint-flow.toml configuration file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a catalog of departments, users and templates
    Validate {
        #[arg(long, help = "Catalog TOML file")]
        catalog: PathBuf,
    },
    /// Create a work order and apply a scripted sequence of actions to it
    Run {
        #[arg(long, help = "Catalog TOML file")]
        catalog: PathBuf,
        #[arg(long, help = "Script TOML file")]
        script: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    FlowConfig::load_env_file()?;
    let mut config = match &cli.config {
        Some(path) => FlowConfig::load_from(path)?,
        None => FlowConfig::load()?,
    };
    if let Some(level) = cli.log_level {
        config.observability.log_level = level;
    }
    init_telemetry(&config.observability)?;

    let runtime = tokio::runtime::Runtime::new()?;
    match cli.command {
        Commands::Validate { catalog } => runtime.block_on(validate_command(&catalog)),
        Commands::Run { catalog, script } => runtime.block_on(run_command(&config, &catalog, &script)),
    }
}

async fn validate_command(catalog_path: &Path) -> Result<()> {
    let catalog = Catalog::load(catalog_path)
        .await
        .with_context(|| format!("Invalid catalog {}", catalog_path.display()))?;
    let summary = catalog.summary().await;

    println!("✅ Catalog is valid: {}", catalog_path.display());
    println!("   Departments: {}", summary.departments);
    println!("   Users: {}", summary.users);
    println!("   Templates: {}", summary.templates.len());
    for template in &summary.templates {
        println!(
            "   - {} ({}): {} checkpoints",
            template.id, template.name, template.checkpoints
        );
    }
    Ok(())
}

#[cfg(feature = "database")]
async fn open_repository(config: &FlowConfig) -> Result<Arc<dyn WorkflowRepository>> {
    if let Some(database) = &config.database {
        let repository =
            checkpoint_flow::SqliteRepository::connect(&database.url, database.max_connections, database.auto_migrate)
                .await?;
        tracing::info!(url = %database.url, "Using SQLite repository");
        return Ok(Arc::new(repository));
    }
    Ok(Arc::new(InMemoryRepository::new()))
}

#[cfg(not(feature = "database"))]
async fn open_repository(config: &FlowConfig) -> Result<Arc<dyn WorkflowRepository>> {
    if config.database.is_some() {
        tracing::warn!("Database configured but this build lacks the `database` feature; using memory");
    }
    Ok(Arc::new(InMemoryRepository::new()))
}

fn error_line(step: usize, err: &EngineError) -> serde_json::Value {
    json!({
        "step": step,
        "error": { "kind": err.kind().as_str(), "message": err.to_string() },
    })
}

async fn run_command(config: &FlowConfig, catalog_path: &Path, script_path: &Path) -> Result<()> {
    let timer = OperationTimer::new("run_script");
    let catalog = Catalog::load(catalog_path)
        .await
        .with_context(|| format!("Invalid catalog {}", catalog_path.display()))?;
    let script = Script::load(script_path)
        .await
        .with_context(|| format!("Invalid script {}", script_path.display()))?;

    let fanout = Arc::new(BroadcastFanout::new(config.fanout.channel_capacity));
    let engine = CheckpointEngine::new(
        open_repository(config).await?,
        Arc::new(catalog.templates.clone()),
        catalog.departments.clone(),
        Arc::new(TracingActivitySink),
        fanout.clone(),
    )
    .with_settings(config.engine.clone());

    let request = CreateWorkOrderRequest {
        template_id: script.template.clone(),
        company: script.company.clone(),
        title: script.title.clone(),
        description: script.description.clone(),
        priority: script.priority,
        deadline: None,
    };
    let work_order = engine.create_work_order(request, &script.created_by).await?;
    let mut events = fanout.subscribe(&work_order.id)?;
    println!("{}", json!({ "created": &work_order }));

    let mut failed_steps = 0;
    for (index, step) in script.steps.iter().enumerate() {
        let number = index + 1;
        let outcome = match (catalog.user(&step.user), work_order.checkpoint_by_order(step.checkpoint)) {
            (None, _) => Err(EngineError::NotFound {
                entity: "User",
                id: step.user.to_string(),
            }),
            (_, None) => Err(EngineError::NotFound {
                entity: "Checkpoint",
                id: format!("order {} of work order {}", step.checkpoint, work_order.id),
            }),
            (Some(user), Some(checkpoint)) => engine.apply_action(&checkpoint.id, &step.action, user, None).await,
        };

        match outcome {
            Ok(checkpoint) => println!(
                "{}",
                json!({ "step": number, "user": &step.user, "action": &step.action, "checkpoint": checkpoint })
            ),
            Err(err) => {
                failed_steps += 1;
                println!("{}", error_line(number, &err));
            }
        }
    }

    let published = drain_published(&mut events);
    fanout.close(&work_order.id)?;

    let final_state = engine.get_work_order(&work_order.id).await?;
    println!(
        "{}",
        json!({
            "work_order": final_state.id,
            "progress": final_state.progress(),
            "failed_steps": failed_steps,
            "events": published,
        })
    );

    engine.metrics().log_stats();
    timer.finish();
    Ok(())
}
