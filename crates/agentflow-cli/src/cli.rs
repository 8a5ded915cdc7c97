//! CLI argument definitions for agentflow.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// agentflow -- define, compose, and run agents.
#[derive(Parser)]
#[command(
    name = "agentflow",
    version,
    about = "agentflow -- define, compose, and run agents",
    long_about = "Runs LLM, function, and HTTP agents, alone or composed into pipelines \
                  and LLM-routed decisions, from a definitions file."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one agent from a definitions file.
    Run {
        /// JSON or TOML file holding the agent definitions.
        #[arg(long, short)]
        definitions: PathBuf,

        /// Id of the agent to run.
        #[arg(long, short)]
        agent: String,

        /// Input as a JSON object, or `@path` to read it from a file.
        #[arg(long, short, default_value = "{}")]
        input: String,

        /// Print each chunk as a JSON line as soon as it arrives.
        #[arg(long)]
        stream: bool,

        /// Engine configuration file (TOML or JSON).
        #[arg(long, short, default_value = "agentflow.toml")]
        config: PathBuf,

        /// User id passed to memory stores.
        #[arg(long)]
        user_id: Option<String>,

        /// Session id passed to memory stores.
        #[arg(long)]
        session_id: Option<String>,
    },

    /// Instantiate every definition and report configuration errors.
    Validate {
        /// JSON or TOML file holding the agent definitions.
        #[arg(long, short)]
        definitions: PathBuf,
    },

    /// Convert a plain JSON schema file into typed fields.
    Schema {
        /// File with `{ field: { type, description?, required?, ... } }`.
        file: PathBuf,
    },
}
