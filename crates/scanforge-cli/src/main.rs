mod bootstrap;
mod capability_stubs;
mod config;
mod workflow_schema;

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;
use clap::{Parser, Subcommand};
use futures::StreamExt;

use scanforge_core::orchestrator::{BulkMode, HistoryFilters};
use scanforge_types::ids::{ApprovalId, ExecutionId, ScheduleId, WorkflowId};
use scanforge_types::model::{
    ApprovalDecision, ExecutionStatus, ExecutionStrategy, Priority, ScanRequest, ScanType,
    SchedulingStrategy,
};
use scanforge_types::ErrorKind;

use config::ScanforgeConfig;

#[derive(Parser)]
#[command(name = "scanforge", about = "Enterprise scan orchestration core")]
struct Cli {
    /// Path to the config file (defaults to `~/.config/scanforge/config.toml`)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Path to the demo data-source catalog (defaults to none -- any data
    /// source id validates)
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a scan request for immediate or queued admission
    Submit(SubmitArgs),
    /// Show the current status of an execution
    Status {
        execution_id: String,
    },
    /// Cancel a non-terminal execution
    Cancel {
        execution_id: String,
    },
    /// List currently active (non-terminal) executions
    Active {
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Print orchestrator metrics (counters, resource utilization, queue depth)
    Metrics,
    /// Query the bounded completed/failed execution history
    History {
        /// Only include this execution status (completed, failed, cancelled)
        #[arg(long)]
        status: Option<String>,
        /// Only include executions completed at or after this RFC3339 timestamp
        #[arg(long)]
        since: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Place a scan request on the scheduler's timeline
    Schedule(ScheduleArgs),
    /// Cancel a pending schedule
    ScheduleCancel {
        schedule_id: String,
    },
    /// Print aggregate scheduler status
    SchedulerStatus,
    /// Register a reusable workflow template from a TOML definition
    WorkflowCreate {
        /// Path to a template TOML file (see workflow_schema docs)
        file: PathBuf,
    },
    /// Instantiate and run a registered workflow template
    WorkflowExecute {
        template: String,
        /// Path to a JSON file of instantiation params (defaults to `{}`)
        #[arg(long)]
        params_file: Option<PathBuf>,
        #[arg(long, default_value = "normal")]
        priority: String,
    },
    /// Show the current status of a workflow
    WorkflowStatus {
        workflow_id: String,
    },
    /// Record a decision against a pending workflow approval
    WorkflowApprove {
        approval_id: String,
        /// "approved" or "rejected"
        decision: String,
        actor: String,
    },
    /// Cancel a queued or running workflow
    WorkflowCancel {
        workflow_id: String,
    },
    /// Submit a batch of scan requests from a TOML file in one call
    Bulk {
        /// Path to a TOML file with a top-level `[[request]]` array
        file: PathBuf,
        #[arg(long, default_value = "adaptive")]
        strategy: String,
        /// "sequential" or "parallel:<n>"
        #[arg(long, default_value = "sequential")]
        mode: String,
    },
    /// Emit shell completion scripts
    Completions {
        shell: clap_complete::Shell,
    },
}

#[derive(clap::Args)]
struct SubmitArgs {
    data_source_id: String,
    #[arg(long, default_value = "full")]
    scan_type: String,
    #[arg(long, default_value = "normal")]
    priority: String,
    #[arg(long, value_delimiter = ',', required = true)]
    rule_ids: Vec<String>,
    #[arg(long, default_value_t = 3_600_000)]
    timeout_ms: u64,
    #[arg(long, default_value_t = 3)]
    max_attempts: u32,
    #[arg(long, default_value = "adaptive")]
    strategy: String,
    #[arg(long, default_value = "cli")]
    created_by: String,
    /// RFC3339 timestamp; mutually exclusive with --cron
    #[arg(long)]
    scheduled_time: Option<String>,
    #[arg(long)]
    cron: Option<String>,
    /// Block and print progress until the execution reaches a terminal state
    #[arg(long)]
    wait: bool,
}

#[derive(clap::Args)]
struct ScheduleArgs {
    #[command(flatten)]
    submit: SubmitArgs,
    #[arg(long, default_value = "immediate")]
    scheduling_strategy: String,
    #[arg(long, value_delimiter = ',')]
    dependencies: Vec<String>,
}

fn parse_enum<T: FromStr>(raw: &str, field: &str) -> anyhow::Result<T> {
    T::from_str(raw).map_err(|_| anyhow::anyhow!("invalid {field}: {raw}"))
}

fn build_request(args: &SubmitArgs) -> anyhow::Result<(ScanRequest, ExecutionStrategy)> {
    let scan_type: ScanType = parse_enum(&args.scan_type, "scan_type")?;
    let priority: Priority = parse_enum(&args.priority, "priority")?;
    let strategy: ExecutionStrategy = parse_enum(&args.strategy, "strategy")?;
    let scheduled_time = args
        .scheduled_time
        .as_deref()
        .map(chrono::DateTime::parse_from_rfc3339)
        .transpose()
        .context("--scheduled-time must be RFC3339")?
        .map(|dt| dt.with_timezone(&chrono::Utc));

    let request = ScanRequest {
        id: scanforge_types::ids::ScanRequestId::new(),
        data_source_id: args.data_source_id.clone(),
        scan_type,
        priority,
        rule_ids: args.rule_ids.clone(),
        timeout_ms: args.timeout_ms,
        max_attempts: args.max_attempts,
        params: HashMap::new(),
        tags: Default::default(),
        created_by: args.created_by.clone(),
        created_at: chrono::Utc::now(),
        scheduled_time,
        cron: args.cron.clone(),
        dependencies: Default::default(),
    };
    Ok((request, strategy))
}

/// Map an `ErrorKind` to the CLI exit code table (spec §6): 0 success, 2
/// usage/validation, 3 queue full, 4 cancelled, 5 timeout, 6 internal.
fn exit_code_for(err: &ErrorKind) -> i32 {
    match err {
        ErrorKind::InvalidRequest(_) => 2,
        ErrorKind::QueueFull { .. } => 3,
        ErrorKind::Cancelled(_) => 4,
        ErrorKind::Timeout(_) => 5,
        ErrorKind::RuleExecutionError { .. }
        | ErrorKind::ExecutionFailure(_)
        | ErrorKind::AllocationExpired(_)
        | ErrorKind::DependencyUnsatisfied { .. }
        | ErrorKind::ApprovalTimeout(_)
        | ErrorKind::InternalError(_) => 6,
    }
}

fn parse_uuid_id<T>(raw: &str, wrap: impl Fn(uuid::Uuid) -> T) -> anyhow::Result<T> {
    let uuid = uuid::Uuid::parse_str(raw).with_context(|| format!("invalid id: {raw}"))?;
    Ok(wrap(uuid))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(cli.config.as_ref())?;
    let catalog_path = cli.catalog.clone().unwrap_or_else(|| PathBuf::from("/dev/null"));
    let stack = bootstrap::build(&cfg, &catalog_path)?;

    let result = run(&cli.command, &stack).await;

    match result {
        Ok(()) => Ok(()),
        Err(CommandError::Orchestration(err)) => {
            eprintln!("error: {err}");
            std::process::exit(exit_code_for(&err));
        }
        Err(CommandError::Usage(err)) => {
            eprintln!("error: {err:#}");
            std::process::exit(2);
        }
    }
}

enum CommandError {
    Orchestration(ErrorKind),
    Usage(anyhow::Error),
}

impl From<ErrorKind> for CommandError {
    fn from(err: ErrorKind) -> Self {
        CommandError::Orchestration(err)
    }
}

impl From<anyhow::Error> for CommandError {
    fn from(err: anyhow::Error) -> Self {
        CommandError::Usage(err)
    }
}

async fn run(command: &Commands, stack: &bootstrap::Stack) -> Result<(), CommandError> {
    match command {
        Commands::Submit(args) => cmd_submit(args, stack).await,
        Commands::Status { execution_id } => cmd_status(execution_id, stack).await,
        Commands::Cancel { execution_id } => cmd_cancel(execution_id, stack).await,
        Commands::Active { limit } => {
            for execution in stack.orchestrator.active_executions(*limit).await {
                println!(
                    "{}  {:<12}  {:>5.1}%  {}",
                    execution.id, execution.status, execution.progress * 100.0, execution.current_step
                );
            }
            Ok(())
        }
        Commands::Metrics => {
            let snapshot = stack.orchestrator.metrics_snapshot();
            println!("{snapshot:#?}");
            let utilization = stack.orchestrator.resource_utilization().await;
            println!("resource_utilization: {utilization:#?}");
            Ok(())
        }
        Commands::History { status, since, limit } => cmd_history(status.as_deref(), since.as_deref(), *limit, stack),
        Commands::Schedule(args) => cmd_schedule(args, stack).await,
        Commands::ScheduleCancel { schedule_id } => {
            let id = parse_uuid_id(schedule_id, ScheduleId::from_uuid)?;
            stack.scheduler.cancel(id).await?;
            println!("schedule {schedule_id} cancelled");
            Ok(())
        }
        Commands::SchedulerStatus => {
            let status = stack.scheduler.status().await;
            println!("{status:#?}");
            Ok(())
        }
        Commands::WorkflowCreate { file } => {
            let template = workflow_schema::load_template(file)?;
            let name = stack.workflow_engine.create_template(template).await?;
            println!("template {name} registered");
            Ok(())
        }
        Commands::WorkflowExecute { template, params_file, priority } => {
            cmd_workflow_execute(template, params_file.as_deref(), priority, stack).await
        }
        Commands::WorkflowStatus { workflow_id } => {
            let id = parse_uuid_id(workflow_id, WorkflowId::from_uuid)?;
            match stack.workflow_engine.status(id).await {
                Some(workflow) => {
                    println!("{:<12}  stages:", workflow.status);
                    for stage in &workflow.stages {
                        println!("  {:<24} {:?}", stage.name, stage.status);
                    }
                    Ok(())
                }
                None => Err(anyhow::anyhow!("no such workflow {workflow_id}").into()),
            }
        }
        Commands::WorkflowApprove { approval_id, decision, actor } => {
            let id = parse_uuid_id(approval_id, ApprovalId::from_uuid)?;
            let decision: ApprovalDecision = parse_enum(decision, "decision")?;
            stack.workflow_engine.approve(id, decision, actor).await?;
            println!("approval {approval_id} recorded as {decision}");
            Ok(())
        }
        Commands::WorkflowCancel { workflow_id } => {
            let id = parse_uuid_id(workflow_id, WorkflowId::from_uuid)?;
            stack.workflow_engine.cancel_workflow(id).await?;
            println!("workflow {workflow_id} cancelled");
            Ok(())
        }
        Commands::Bulk { file, strategy, mode } => cmd_bulk(file, strategy, mode, stack).await,
        Commands::Completions { shell } => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            let name = cmd.get_name().to_string();
            clap_complete::generate(*shell, &mut cmd, name, &mut std::io::stdout());
            Ok(())
        }
    }
}

async fn cmd_submit(args: &SubmitArgs, stack: &bootstrap::Stack) -> Result<(), CommandError> {
    let (request, strategy) = build_request(args)?;
    let execution_id = stack.orchestrator.submit(request, strategy).await?;
    println!("execution {execution_id} submitted");
    if args.wait {
        wait_for_terminal(execution_id, stack).await?;
    }
    Ok(())
}

async fn wait_for_terminal(execution_id: ExecutionId, stack: &bootstrap::Stack) -> Result<(), CommandError> {
    let mut events = stack.orchestrator.stream(execution_id, std::time::Duration::from_millis(200));
    tokio::pin!(events);
    while let Some(snapshot) = events.next().await {
        println!(
            "{:<12}  {:>5.1}%  {}",
            snapshot.status,
            snapshot.progress * 100.0,
            snapshot.current_step
        );
        if snapshot.status.is_terminal() {
            return match snapshot.status {
                ExecutionStatus::Completed => Ok(()),
                ExecutionStatus::Cancelled => Err(ErrorKind::Cancelled(execution_id).into()),
                _ => Err(ErrorKind::ExecutionFailure(execution_id).into()),
            };
        }
    }
    Ok(())
}

async fn cmd_status(execution_id: &str, stack: &bootstrap::Stack) -> Result<(), CommandError> {
    let id = parse_uuid_id(execution_id, ExecutionId::from_uuid)?;
    match stack.orchestrator.status(id).await {
        Some(execution) => {
            println!(
                "{:<12}  {:>5.1}%  {}",
                execution.status,
                execution.progress * 100.0,
                execution.current_step
            );
            if let Some(reason) = &execution.failure_reason {
                println!("failure_reason: {reason}");
            }
            Ok(())
        }
        None => Err(anyhow::anyhow!("no such execution {execution_id}").into()),
    }
}

async fn cmd_cancel(execution_id: &str, stack: &bootstrap::Stack) -> Result<(), CommandError> {
    let id = parse_uuid_id(execution_id, ExecutionId::from_uuid)?;
    stack.orchestrator.cancel(id).await?;
    println!("execution {execution_id} cancelled");
    Ok(())
}

fn cmd_history(status: Option<&str>, since: Option<&str>, limit: usize, stack: &bootstrap::Stack) -> Result<(), CommandError> {
    let status = status.map(|s| parse_enum::<ExecutionStatus>(s, "status")).transpose()?;
    let since = since
        .map(chrono::DateTime::parse_from_rfc3339)
        .transpose()
        .context("--since must be RFC3339")?
        .map(|dt| dt.with_timezone(&chrono::Utc));

    let filters = HistoryFilters { status, since, limit };
    // `list_history` is async; block on the current runtime via a tiny
    // inline future since this helper has no `self: &Arc<Orchestrator>`
    // requirement that would force the caller's own async context.
    let results = futures::executor::block_on(stack.orchestrator.list_history(&filters));
    for execution in results {
        println!(
            "{}  {:<10}  {}",
            execution.id,
            execution.status,
            execution.completed_at.map(|t| t.to_rfc3339()).unwrap_or_default()
        );
    }
    Ok(())
}

async fn cmd_schedule(args: &ScheduleArgs, stack: &bootstrap::Stack) -> Result<(), CommandError> {
    let (request, _strategy) = build_request(&args.submit)?;
    let strategy: SchedulingStrategy = parse_enum(&args.scheduling_strategy, "scheduling_strategy")?;
    let dependencies = args
        .dependencies
        .iter()
        .map(|raw| parse_uuid_id(raw, ScheduleId::from_uuid))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let schedule_id = stack.scheduler.schedule(request, strategy, dependencies).await;
    println!("schedule {schedule_id} placed");
    Ok(())
}

async fn cmd_workflow_execute(
    template: &str,
    params_file: Option<&std::path::Path>,
    priority: &str,
    stack: &bootstrap::Stack,
) -> Result<(), CommandError> {
    let priority: Priority = parse_enum(priority, "priority")?;
    let params = match params_file {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            match serde_json::from_str::<serde_json::Value>(&contents)
                .with_context(|| format!("parsing {} as JSON", path.display()))?
            {
                serde_json::Value::Object(map) => map,
                _ => return Err(anyhow::anyhow!("{} must contain a JSON object", path.display()).into()),
            }
        }
        None => serde_json::Map::new(),
    };

    let workflow_id = stack.workflow_engine.execute_workflow(template, params, priority).await?;
    println!("workflow {workflow_id} started");
    Ok(())
}

async fn cmd_bulk(file: &std::path::Path, strategy: &str, mode: &str, stack: &bootstrap::Stack) -> Result<(), CommandError> {
    #[derive(serde::Deserialize)]
    struct RequestsFile {
        #[serde(default)]
        request: Vec<BulkRequestDef>,
    }
    #[derive(serde::Deserialize)]
    struct BulkRequestDef {
        data_source_id: String,
        #[serde(default = "default_scan_type")]
        scan_type: String,
        #[serde(default = "default_priority")]
        priority: String,
        rule_ids: Vec<String>,
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
        #[serde(default = "default_max_attempts")]
        max_attempts: u32,
        #[serde(default = "default_created_by")]
        created_by: String,
    }
    fn default_scan_type() -> String {
        "full".into()
    }
    fn default_priority() -> String {
        "normal".into()
    }
    fn default_timeout_ms() -> u64 {
        3_600_000
    }
    fn default_max_attempts() -> u32 {
        3
    }
    fn default_created_by() -> String {
        "cli".into()
    }

    let contents = std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let parsed: RequestsFile = toml::from_str(&contents).with_context(|| format!("parsing {}", file.display()))?;

    let mut requests = Vec::with_capacity(parsed.request.len());
    for def in parsed.request {
        let scan_type: ScanType = parse_enum(&def.scan_type, "scan_type")?;
        let priority: Priority = parse_enum(&def.priority, "priority")?;
        requests.push(ScanRequest {
            id: scanforge_types::ids::ScanRequestId::new(),
            data_source_id: def.data_source_id,
            scan_type,
            priority,
            rule_ids: def.rule_ids,
            timeout_ms: def.timeout_ms,
            max_attempts: def.max_attempts,
            params: HashMap::new(),
            tags: Default::default(),
            created_by: def.created_by,
            created_at: chrono::Utc::now(),
            scheduled_time: None,
            cron: None,
            dependencies: Default::default(),
        });
    }

    let strategy: ExecutionStrategy = parse_enum(strategy, "strategy")?;
    let mode = if mode == "sequential" {
        BulkMode::Sequential
    } else if let Some(n) = mode.strip_prefix("parallel:") {
        BulkMode::Parallel(n.parse().context("parallel:<n> must be a number")?)
    } else {
        return Err(anyhow::anyhow!("--mode must be \"sequential\" or \"parallel:<n>\"").into());
    };

    let (bulk_id, outcomes) = stack.orchestrator.bulk_execute(requests, strategy, mode).await?;
    println!("bulk {bulk_id}:");
    for (index, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            scanforge_core::orchestrator::BulkOutcome::Submitted(id) => println!("  [{index}] submitted {id}"),
            scanforge_core::orchestrator::BulkOutcome::Rejected(err) => println!("  [{index}] rejected: {err}"),
        }
    }
    Ok(())
}
