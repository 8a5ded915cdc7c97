//! CLI entry point for agentflow.
//!
//! This binary provides the `agentflow` command with subcommands for
//! running an agent, validating a definitions file, and converting plain
//! schemas into typed fields.

mod cli;
mod helpers;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use agentflow_agent::{Context as RunContext, ContextState, EngineConfig, Runnable};
use agentflow_core::{OutputCollector, schema_to_data_type, validate_value};
use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use tracing::info;

use crate::cli::{Cli, Commands};
use crate::helpers::{build_services, init_tracing, load_registry, parse_input};

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing("info");

    match cli.command {
        Commands::Run {
            definitions,
            agent,
            input,
            stream,
            config,
            user_id,
            session_id,
        } => {
            cmd_run(RunArgs {
                definitions,
                agent,
                input,
                stream,
                config,
                state: ContextState {
                    user_id,
                    session_id,
                },
            })
            .await
        }
        Commands::Validate { definitions } => cmd_validate(&definitions),
        Commands::Schema { file } => cmd_schema(&file),
    }
}

// ---------------------------------------------------------------------------
// Subcommand: run
// ---------------------------------------------------------------------------

struct RunArgs {
    definitions: PathBuf,
    agent: String,
    input: String,
    stream: bool,
    config: PathBuf,
    state: ContextState,
}

async fn cmd_run(args: RunArgs) -> Result<()> {
    let config = EngineConfig::load(&args.config).context("failed to load configuration")?;
    let registry = load_registry(&args.definitions)?;
    registry
        .validate()
        .context("definitions failed validation")?;

    let runnable = registry
        .resolve(&args.agent)
        .with_context(|| format!("failed to resolve agent {}", args.agent))?;
    let input = parse_input(&args.input)?;
    validate_value(&runnable.info().definition().inputs, &input)
        .context("input does not match the agent's declared inputs")?;

    let services = build_services(config, &registry)?;
    let context = RunContext::new(registry, Arc::new(services)).with_state(args.state);

    info!(agent_id = %args.agent, stream = args.stream, "running agent");
    let mut stdout = std::io::stdout().lock();
    let mut chunks = runnable.stream(input, &context);

    if args.stream {
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.context("agent run failed")?;
            serde_json::to_writer(&mut stdout, &chunk)?;
            writeln!(stdout)?;
            stdout.flush()?;
        }
    } else {
        let mut collector = OutputCollector::new();
        while let Some(chunk) = chunks.next().await {
            collector.push(&chunk.context("agent run failed")?);
        }
        serde_json::to_writer_pretty(&mut stdout, &collector.into_output())?;
        writeln!(stdout)?;
    }

    info!(agent_id = %args.agent, "agent finished");
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: validate
// ---------------------------------------------------------------------------

fn cmd_validate(definitions: &Path) -> Result<()> {
    let registry = load_registry(definitions)?;
    registry
        .validate()
        .context("definitions failed validation")?;

    let ids = registry.list_ids();
    println!("{} definitions valid", ids.len());
    for id in ids {
        let info = registry.info(&id)?;
        println!(
            "  {id}  inputs={} outputs={}",
            info.inputs().len(),
            info.outputs().len()
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: schema
// ---------------------------------------------------------------------------

fn cmd_schema(file: &Path) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read schema file {}", file.display()))?;
    let schema: serde_json::Value =
        serde_json::from_str(&content).context("schema file is not valid JSON")?;
    let fields = schema_to_data_type(&schema).context("invalid schema")?;
    println!("{}", serde_json::to_string_pretty(&fields)?);
    Ok(())
}
