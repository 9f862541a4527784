//! cdw-sqlgen CLI
//!
//! Usage:
//!   cdw-sqlgen run --target location
//!   cdw-sqlgen run --target person --config pipeline.yaml --backend anthropic
//!   cdw-sqlgen exec --target location SQL/location_insert.sql
//!   cdw-sqlgen checks --target location
//!
//! Exit status is 0 when the run (or script) completes, 1 otherwise.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;

use cdw_agentic::{create_llm_client_with, AgentBackend};
use cdw_sqlgen::executor::ScriptExecutor;
use cdw_sqlgen::{
    omop_registry, read_records, FileSink, LlmDrafter, LlmRepairer, Orchestrator, PipelineConfig,
    SqlExecutor,
};

#[derive(Parser)]
#[command(name = "cdw-sqlgen")]
#[command(version = "0.1.0")]
#[command(about = "Draft, execute, validate and repair OMOP insert scripts")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Pipeline config (YAML)
    #[arg(long, short = 'c', global = true, env = "CDW_SQLGEN_CONFIG")]
    config: Option<PathBuf>,

    /// Database URL; overrides the host/port/user fields of the config
    #[arg(long, global = true, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Schema the checks are qualified with
    #[arg(long, global = true, env = "CDW_SCHEMA")]
    schema: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Draft, execute and repair until COMPLETE or FAILED
    Run {
        /// Table to populate (e.g. location, person)
        #[arg(long, short = 't')]
        target: Option<String>,

        /// Input directory (default: json/<target>)
        #[arg(long, short = 'i')]
        input_dir: Option<PathBuf>,

        /// Maximum number of repair attempts
        #[arg(long)]
        retry_ceiling: Option<u32>,

        /// Model backend: deepseek, anthropic, openai
        #[arg(long, env = "AGENT_BACKEND")]
        backend: Option<AgentBackend>,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Execute a script with the target's checks, no model involved
    Exec {
        #[arg(long, short = 't')]
        target: String,

        /// Script to run
        script: PathBuf,
    },

    /// List registered targets and their checks
    Checks {
        #[arg(long, short = 't')]
        target: Option<String>,
    },
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(url) = &cli.database_url {
        config.database.url = Some(url.clone());
    }
    if let Some(schema) = &cli.schema {
        config.database.schema = schema.clone();
    }
    Ok(config)
}

async fn run(
    mut config: PipelineConfig,
    target: Option<String>,
    input_dir: Option<PathBuf>,
    retry_ceiling: Option<u32>,
    backend: Option<AgentBackend>,
    json: bool,
) -> Result<bool> {
    let target = target
        .or_else(|| config.target.clone())
        .ok_or_else(|| anyhow!("no target given (use --target or set `target` in the config)"))?;
    if let Some(dir) = input_dir {
        config.input_dir = Some(dir);
    }
    if let Some(ceiling) = retry_ceiling {
        config.retry_ceiling = ceiling;
    }
    if let Some(backend) = backend {
        config.llm.backend = backend;
    }

    let records = read_records(&config.input_dir_for(&target))?;
    let client = create_llm_client_with(&config.llm).context("cannot create LLM client")?;

    let orchestrator = Orchestrator::builder()
        .drafter(Arc::new(LlmDrafter::new(client.clone())))
        .repairer(Arc::new(LlmRepairer::new(client)))
        .executor(Arc::new(SqlExecutor::new(config.database.clone())))
        .sink(Arc::new(FileSink::new(&config.sql_dir, &config.log_dir)))
        .registry(omop_registry(&config.database.schema))
        .retry_ceiling(config.retry_ceiling)
        .system_prompt(config.system_prompt()?)
        .build()?;

    let report = orchestrator.run(&target, &records).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let state = if report.is_complete() {
            report.state.to_string().green().bold()
        } else {
            report.state.to_string().red().bold()
        };
        println!("{} {} ({} repair attempts)", state, target, report.repair_attempts);
        if let Some(path) = &report.persisted {
            println!("  {}", path.display());
        }
    }
    Ok(report.is_complete())
}

async fn exec(config: PipelineConfig, target: String, script: PathBuf) -> Result<bool> {
    let checks = omop_registry(&config.database.schema).checks_for(&target);
    let executor = SqlExecutor::new(config.database);
    let outcome = executor.execute_file(&script, &checks).await?;

    println!("{}", outcome.execution.script_output_or_error);
    if outcome.execution.script_ran {
        println!("{}", outcome.validation.report());
    }
    let status = if outcome.committed {
        "COMMITTED".green().bold()
    } else {
        "ROLLED BACK".red().bold()
    };
    println!("{}", status);
    Ok(outcome.succeeded())
}

fn checks(config: &PipelineConfig, target: Option<String>) -> Result<bool> {
    let registry = omop_registry(&config.database.schema);
    let targets = match target {
        Some(target) => vec![target],
        None => registry.targets().into_iter().map(String::from).collect(),
    };
    for target in targets {
        let set = registry.checks_for(&target);
        println!("{}", target.bold());
        if set.is_empty() {
            println!("  {}", "(no checks registered)".yellow());
        }
        for name in set.names() {
            println!("  {}", name);
        }
    }
    Ok(true)
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {:#}", "ERROR:".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Commands::Run {
            target,
            input_dir,
            retry_ceiling,
            backend,
            json,
        } => run(config, target, input_dir, retry_ceiling, backend, json).await,
        Commands::Exec { target, script } => exec(config, target, script).await,
        Commands::Checks { target } => checks(&config, target),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{} {:#}", "ERROR:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
