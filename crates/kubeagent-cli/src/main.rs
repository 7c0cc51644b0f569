//! `kubeagent` command-line driver.

mod config;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use config::KubeAgentConfig;
use kubeagent_agent::{Diagnostician, LlmClient, Remediator};
use kubeagent_core::{AgentContext, ExecutionPlan, Payload, Request, Task};
use kubeagent_orchestrator::{parse_decomposition, validate, Coordinator};
use kubeagent_store::{FileStateStore, MemoryStateStore, StateStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kubeagent", about = "KubeAgent: multi-agent Kubernetes operations")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "kubeagent.toml")]
    config: PathBuf,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan and execute one request, printing the response as JSON
    Run {
        /// The request, e.g. "why is pod web-1 crashing?"
        input: String,
        /// Skip intent classification
        #[arg(long)]
        intent: Option<String>,
        /// Requesting user
        #[arg(long, default_value = "cli")]
        user: String,
        /// JSON object passed as request context
        #[arg(long)]
        context: Option<String>,
    },
    /// Check a plan or task-array file for dangling references and cycles
    Validate {
        /// JSON file holding an execution plan or a task array
        plan: PathBuf,
    },
}

fn init_tracing(format: LogFormat) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Commands::Run {
            input,
            intent,
            user,
            context,
        } => {
            let config = KubeAgentConfig::load(&cli.config).await?;

            let mut request = Request::new(user, input);
            if let Some(intent) = intent {
                request = request.with_intent(intent);
            }
            if let Some(raw) = context {
                let context: Payload =
                    serde_json::from_str(&raw).context("--context must be a JSON object")?;
                request = request.with_context(context);
            }

            let response = run(config, request).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
            if !response.is_success() {
                anyhow::bail!("request finished with status {}", response.status);
            }
        }
        Commands::Validate { plan } => {
            let tasks = read_tasks(&plan).await?;
            validate(&tasks).with_context(|| format!("'{}' is not runnable", plan.display()))?;
            println!("{}: {} tasks, valid", plan.display(), tasks.len());
        }
    }

    Ok(())
}

async fn run(
    config: KubeAgentConfig,
    request: Request,
) -> anyhow::Result<kubeagent_core::Response> {
    let store: Arc<dyn StateStore> = match &config.data_dir {
        Some(dir) => {
            info!(data_dir = %dir.display(), "Using file state store");
            Arc::new(FileStateStore::new(dir.clone()).await?)
        }
        None => Arc::new(MemoryStateStore::new()),
    };

    let llm = LlmClient::new(config.model);
    let coordinator = Coordinator::new(llm.clone(), store)
        .with_executor_config(config.executor.to_executor_config());
    coordinator.register_agent(Arc::new(Diagnostician::new(llm.clone())))?;
    coordinator.register_agent(Arc::new(Remediator::new(llm)))?;

    let ctx = Arc::new(AgentContext::for_request(
        request.id.clone(),
        request.user.clone(),
    ));
    let interrupt = {
        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling after the current round");
                ctx.cancel();
            }
        })
    };

    let result = coordinator.handle_with_context(&ctx, &request).await;
    interrupt.abort();
    Ok(result?)
}

/// Read either a saved [`ExecutionPlan`] or a bare decomposition array.
async fn read_tasks(path: &Path) -> anyhow::Result<Vec<Task>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read '{}'", path.display()))?;
    if let Ok(plan) = serde_json::from_str::<ExecutionPlan>(&raw) {
        return Ok(plan.tasks);
    }
    parse_decomposition(&raw, "query")
        .with_context(|| format!("'{}' is neither a plan nor a task array", path.display()))
}
