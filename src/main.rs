use clap::{Parser, ValueEnum};
use serde::Serialize;
use serde_json::json;
use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use dispatch_lite::api::types::{SubmitEdgeJobRequest, SubmitJobRequest};
use dispatch_lite::config::{EdgeConfig, NodeConfig, QueueConfig, TrustedConfig};
use dispatch_lite::node::Node;
use dispatch_lite::scheduler::{Job, QueueStats, TagSet};
use dispatch_lite::shutdown::install_shutdown_handler;
use dispatch_lite::worker::{DispatchClient, EdgeWorker, JobExecutor, QueueKind, SHELL_KIND};

#[derive(Parser, Debug)]
#[command(name = "dispatch-lite")]
#[command(version)]
#[command(about = "A lease-based job dispatcher for pull-based workers")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the dispatcher
    Server(ServerArgs),

    /// Job management commands
    Job {
        #[command(flatten)]
        client: ClientArgs,

        #[command(subcommand)]
        command: JobCommands,
    },

    /// Show queue counters for both queues
    Stats {
        #[command(flatten)]
        client: ClientArgs,
    },

    /// Run an edge worker that executes shell jobs
    Worker(WorkerArgs),
}

// =============================================================================
// Server Arguments
// =============================================================================

/// Upper bound for every millisecond timing flag (30 days).
const MAX_TIMING_MS: u64 = 30 * 24 * 60 * 60 * 1000;

#[derive(Parser, Debug)]
struct ServerArgs {
    /// Address to listen on
    #[arg(long, env = "DISPATCH_LISTEN", default_value = "127.0.0.1:8080")]
    listen: SocketAddr,

    /// Shared secret trusted workers present as a bearer token.
    /// Without it the trusted worker endpoints answer 503.
    #[arg(long, env = "DISPATCH_WORKER_TOKEN", hide_env_values = true)]
    worker_token: Option<String>,

    /// Enable the edge queue
    #[arg(long, env = "DISPATCH_EDGE_ENABLED")]
    edge_enabled: bool,

    /// Maximum pending jobs on the trusted queue
    #[arg(long, env = "DISPATCH_TRUSTED_MAX_PENDING", default_value = "100")]
    trusted_max_pending: usize,

    /// Trusted lease duration in milliseconds
    #[arg(
        long,
        env = "DISPATCH_TRUSTED_LEASE_MS",
        default_value = "600000",
        value_parser = clap::value_parser!(u64).range(1..=MAX_TIMING_MS)
    )]
    trusted_lease_ms: u64,

    /// Maximum pending jobs on the edge queue
    #[arg(long, env = "DISPATCH_EDGE_MAX_PENDING", default_value = "500")]
    edge_max_pending: usize,

    /// Edge lease duration in milliseconds
    #[arg(
        long,
        env = "DISPATCH_EDGE_LEASE_MS",
        default_value = "30000",
        value_parser = clap::value_parser!(u64).range(1..=MAX_TIMING_MS)
    )]
    edge_lease_ms: u64,

    /// Heartbeat interval handed to edge workers, in milliseconds
    #[arg(
        long,
        env = "DISPATCH_EDGE_HEARTBEAT_MS",
        default_value = "10000",
        value_parser = clap::value_parser!(u64).range(1..=MAX_TIMING_MS)
    )]
    edge_heartbeat_ms: u64,

    /// Background lease reaper period in milliseconds
    #[arg(
        long,
        env = "DISPATCH_REAP_INTERVAL_MS",
        default_value = "1000",
        value_parser = clap::value_parser!(u64).range(1..=MAX_TIMING_MS)
    )]
    reap_interval_ms: u64,
}

// =============================================================================
// Client Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ClientArgs {
    /// Dispatcher base URL
    #[arg(long, short = 'a', env = "DISPATCH_ADDR", default_value = "http://127.0.0.1:8080")]
    addr: String,

    /// Queue to talk to
    #[arg(long, short = 'q', default_value = "trusted")]
    queue: QueueArg,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum QueueArg {
    Trusted,
    Edge,
}

impl From<QueueArg> for QueueKind {
    fn from(queue: QueueArg) -> Self {
        match queue {
            QueueArg::Trusted => QueueKind::Trusted,
            QueueArg::Edge => QueueKind::Edge,
        }
    }
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

// =============================================================================
// Job Commands
// =============================================================================

#[derive(clap::Subcommand, Debug)]
enum JobCommands {
    /// Submit a shell job (e.g., "echo hello")
    Submit {
        /// The command to execute
        command: String,

        /// low, normal or high
        #[arg(long, short = 'p')]
        priority: Option<String>,

        /// Comma separated tags a worker must carry (edge queue only)
        #[arg(long, short = 'r')]
        requires: Option<String>,
    },
    /// Get status of a specific job
    Status {
        /// The job ID (UUID)
        job_id: Uuid,
    },
    /// List all jobs, oldest first
    List,
}

// =============================================================================
// Worker Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct WorkerArgs {
    /// Dispatcher base URL
    #[arg(long, short = 'a', env = "DISPATCH_ADDR", default_value = "http://127.0.0.1:8080")]
    addr: String,

    /// Stable identifier for this worker
    #[arg(long, env = "DISPATCH_WORKER_ID")]
    worker_id: String,

    /// Comma separated capability tags
    #[arg(long, env = "DISPATCH_WORKER_TAGS", default_value = SHELL_KIND)]
    tags: String,

    /// Sleep between polls when the queue is empty, in milliseconds
    #[arg(
        long,
        default_value = "1000",
        value_parser = clap::value_parser!(u64).range(1..=MAX_TIMING_MS)
    )]
    poll_interval_ms: u64,

    /// Per-job command timeout in seconds
    #[arg(long, default_value = "60")]
    timeout_secs: u64,
}

// =============================================================================
// JSON Output Types
// =============================================================================

#[derive(Serialize)]
struct JobSubmitOutput {
    job_id: String,
    status: String,
    enqueued_at: String,
}

#[derive(Serialize)]
struct JobListOutput {
    jobs: Vec<Job>,
    total_count: usize,
}

// =============================================================================
// Server Implementation
// =============================================================================

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

async fn run_server(args: ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = NodeConfig {
        listen_addr: args.listen,
        reap_interval_ms: args.reap_interval_ms,
        trusted: TrustedConfig {
            worker_token: args.worker_token.filter(|t| !t.trim().is_empty()),
            queue: QueueConfig {
                max_pending: args.trusted_max_pending,
                lease_ms: args.trusted_lease_ms,
                ..QueueConfig::trusted()
            },
        },
        edge: EdgeConfig {
            enabled: args.edge_enabled,
            queue: QueueConfig {
                max_pending: args.edge_max_pending,
                lease_ms: args.edge_lease_ms,
                heartbeat_interval_ms: args.edge_heartbeat_ms,
            },
        },
    };

    tracing::info!(
        listen_addr = %config.listen_addr,
        edge_enabled = config.edge.enabled,
        trusted_lease_ms = config.trusted.queue.lease_ms,
        edge_lease_ms = config.edge.queue.lease_ms,
        "Starting dispatch-lite"
    );

    let shutdown = install_shutdown_handler()?;
    Node::new(config).run(shutdown).await?;
    Ok(())
}

async fn run_worker(args: WorkerArgs) -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let client = DispatchClient::new(args.addr);
    let executor = JobExecutor::new(Duration::from_secs(args.timeout_secs));
    let worker = EdgeWorker::new(client, args.worker_id, TagSet::parse_csv(&args.tags), executor)
        .with_poll_interval(args.poll_interval_ms);

    let shutdown = install_shutdown_handler()?;
    worker.run(shutdown).await?;
    Ok(())
}

// =============================================================================
// Client Command Handlers
// =============================================================================

async fn handle_job_submit(
    client: &DispatchClient,
    queue: QueueKind,
    command: String,
    priority: Option<String>,
    requires: Option<String>,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let job = match queue {
        QueueKind::Trusted => {
            if requires.is_some() {
                eprintln!("Warning: --requires is ignored by the trusted queue");
            }
            client
                .submit(&SubmitJobRequest {
                    kind: Some(SHELL_KIND.to_string()),
                    payload: json!({ "command": command }),
                    priority,
                    ..Default::default()
                })
                .await?
        }
        QueueKind::Edge => {
            client
                .submit_edge(&SubmitEdgeJobRequest {
                    task: Some(json!({ "kind": SHELL_KIND, "command": command })),
                    requirements: requires.as_deref().map(TagSet::parse_csv),
                    priority,
                    metadata: None,
                })
                .await?
        }
    };

    match output_format {
        OutputFormat::Json => {
            let output = JobSubmitOutput {
                job_id: job.id.to_string(),
                status: job.status.to_string(),
                enqueued_at: job.enqueued_at.to_rfc3339(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            println!("Job submitted successfully!");
            println!("Job ID: {}", job.id);
        }
    }
    Ok(())
}

async fn handle_job_status(
    client: &DispatchClient,
    queue: QueueKind,
    job_id: Uuid,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let job = client.get_job(queue, &job_id).await?;

    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&job)?);
        }
        OutputFormat::Table => {
            println!("Job ID:      {}", job.id);
            println!("Kind:        {}", job.kind);
            println!("Status:      {}", job.status);
            println!("Priority:    {}", job.priority);
            println!("Attempts:    {}", job.attempts);
            if !job.requirements.is_empty() {
                println!("Requires:    {}", job.requirements);
            }
            if let Some(worker) = &job.worker_id {
                println!("Worker:      {}", worker);
            }
            if let Some(expires) = job.lease_expires_at {
                println!("Lease Until: {}", expires.to_rfc3339());
            }
            if let Some(result) = &job.result {
                println!("Result:");
                for line in serde_json::to_string_pretty(result)?.lines() {
                    println!("  {}", line);
                }
            }
            if let Some(detail) = &job.detail {
                println!("Detail:");
                for line in serde_json::to_string_pretty(detail)?.lines() {
                    println!("  {}", line);
                }
            }
        }
    }
    Ok(())
}

async fn handle_job_list(
    client: &DispatchClient,
    queue: QueueKind,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let jobs = client.list_jobs(queue).await?;

    match output_format {
        OutputFormat::Json => {
            let output = JobListOutput {
                total_count: jobs.len(),
                jobs,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            if jobs.is_empty() {
                println!("No jobs found.");
                return Ok(());
            }
            println!(
                "{:<38} {:<10} {:<8} {:<16} KIND",
                "JOB ID", "STATUS", "PRIORITY", "WORKER"
            );
            println!("{}", "-".repeat(86));
            for job in &jobs {
                let worker = job.worker_id.as_deref().unwrap_or("-");
                let worker = if worker.chars().count() > 16 {
                    format!("{}...", worker.chars().take(13).collect::<String>())
                } else {
                    worker.to_string()
                };
                println!(
                    "{:<38} {:<10} {:<8} {:<16} {}",
                    job.id, job.status, job.priority, worker, job.kind
                );
            }
            println!();
            println!("{} jobs", jobs.len());
        }
    }
    Ok(())
}

async fn handle_stats(
    client: &DispatchClient,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let stats = client.stats().await?;

    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        OutputFormat::Table => {
            println!(
                "{:<8} {:>7} {:>7} {:>9} {:>7} {:>8} {:>8}",
                "QUEUE", "QUEUED", "LEASED", "COMPLETED", "FAILED", "PENDING", "WORKERS"
            );
            println!("{}", "-".repeat(62));
            print_stats_row("trusted", &stats.trusted);
            print_stats_row("edge", &stats.edge);
        }
    }
    Ok(())
}

fn print_stats_row(name: &str, stats: &QueueStats) {
    println!(
        "{:<8} {:>7} {:>7} {:>9} {:>7} {:>8} {:>8}",
        name,
        stats.queued,
        stats.leased,
        stats.completed,
        stats.failed,
        stats.pending,
        stats.workers
    );
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::Server(server_args) => {
            run_server(server_args).await?;
        }
        Commands::Worker(worker_args) => {
            run_worker(worker_args).await?;
        }
        Commands::Job { client, command } => {
            let http = DispatchClient::new(client.addr.clone());
            let queue = QueueKind::from(client.queue);

            match command {
                JobCommands::Submit {
                    command: cmd,
                    priority,
                    requires,
                } => {
                    handle_job_submit(&http, queue, cmd, priority, requires, &client.output)
                        .await?;
                }
                JobCommands::Status { job_id } => {
                    handle_job_status(&http, queue, job_id, &client.output).await?;
                }
                JobCommands::List => {
                    handle_job_list(&http, queue, &client.output).await?;
                }
            }
        }
        Commands::Stats { client } => {
            let http = DispatchClient::new(client.addr.clone());
            handle_stats(&http, &client.output).await?;
        }
    }

    Ok(())
}
