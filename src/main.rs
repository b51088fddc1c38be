//! Splat Node CLI
//!
//! Runs the polling worker against a hosted dataset repo, or inspects the
//! current task list.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use splat_node::hub::{HubClient, HubConfig, RemoteStore};
use splat_node::reconstruct::SharpCommand;
use splat_node::tasks::TaskStatus;
use splat_node::worker::{setup_signal_handler, TaskProcessor, TaskRunner, WorkerConfig};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "splat-node")]
#[command(about = "Local compute node for 3D Gaussian-splat reconstruction jobs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Dataset repo holding the task list and images
    #[arg(long, env = "SPLAT_REPO_ID", global = true, default_value = "")]
    repo: String,

    /// Local cache directory for downloads and work dirs
    #[arg(long, env = "SPLAT_CACHE_DIR", global = true, default_value = "./local_cache")]
    cache_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run as worker, polling the task list for processing tasks
    Worker {
        /// Poll interval in seconds (default: 5)
        #[arg(short, long, default_value = "5")]
        poll_interval: u64,

        /// Reconstruction timeout in seconds (default: 300)
        #[arg(short, long, default_value = "300")]
        timeout: u64,

        /// Reconstruction tool executable (must accept `predict -i <in> -o <out>`)
        #[arg(long, default_value = "sharp")]
        tool: String,

        /// Persist failure state after this many failed attempts
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Run a single poll cycle and exit (for testing)
        #[arg(long)]
        once: bool,
    },

    /// Fetch and print the current task list
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn hub_client(cli: &Cli) -> Result<HubClient> {
    if cli.repo.is_empty() {
        anyhow::bail!("Missing dataset repo id. Set SPLAT_REPO_ID or pass --repo.");
    }

    // The credential gates startup: refuse to run without it rather than
    // failing on the first hub call.
    let token = std::env::var("HF_TOKEN").map_err(|_| {
        anyhow::anyhow!("Missing HF_TOKEN. Set it in the environment or in .env.")
    })?;

    let mut config = HubConfig::new(cli.repo.clone(), token);
    config.cache_dir = cli.cache_dir.clone();
    Ok(HubClient::new(config)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match &cli.command {
        Commands::Worker {
            poll_interval,
            timeout,
            tool,
            max_attempts,
            once,
        } => {
            let store: Arc<dyn RemoteStore> = Arc::new(hub_client(&cli)?);
            info!("Watching repo: {}", cli.repo);

            let config = WorkerConfig::builder()
                .poll_interval_secs(*poll_interval)
                .task_timeout(Duration::from_secs(*timeout))
                .work_dir(cli.cache_dir.join("processing"))
                .max_attempts(*max_attempts)
                .build();

            let reconstructor = Arc::new(SharpCommand::new(tool.clone(), config.task_timeout));
            let processor = TaskProcessor::new(config.clone(), Arc::clone(&store), reconstructor);
            let runner = TaskRunner::new(store, config, processor);

            if *once {
                info!("Running a single poll cycle...");
                let report = runner.run_cycle().await?;
                println!(
                    "{} succeeded, {} failed, write-back: {}",
                    report.succeeded, report.failed, report.committed
                );
            } else {
                let shutdown = runner.shutdown_handle();
                setup_signal_handler(shutdown);
                runner.run().await?;
            }
        }

        Commands::List { json } => {
            let store = hub_client(&cli)?;
            let list = store.fetch_task_list().await?;

            if *json {
                println!("{}", splat_node::tasks::TaskList::to_json(&list.tasks)?);
            } else {
                println!(
                    "{} tasks (revision: {})",
                    list.tasks.len(),
                    list.revision.as_deref().unwrap_or("unknown")
                );
                for task in &list.tasks {
                    let marker = match task.status {
                        TaskStatus::Processing => "*",
                        TaskStatus::Failed => "!",
                        _ => " ",
                    };
                    println!(
                        "  {} [{}] {} -> {}",
                        marker,
                        serde_json::to_string(&task.status)?.trim_matches('"'),
                        task.photo_path,
                        task.splat_path.as_deref().unwrap_or("-")
                    );
                }
            }
        }
    }

    Ok(())
}
