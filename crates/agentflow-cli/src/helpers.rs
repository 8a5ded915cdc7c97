//! Shared helper functions used across CLI subcommands.
//!
//! Includes tracing initialization, definitions loading, input parsing,
//! and service construction.

use std::path::Path;
use std::sync::Arc;

use agentflow_agent::{
    AgentDefinition, EngineConfig, InMemoryStore, OpenAiModel, Registry, RunInput, Services,
};
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber with the given default log level.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

/// Accepted shapes of a definitions file.
#[derive(Deserialize)]
#[serde(untagged)]
enum DefinitionsFile {
    List(Vec<AgentDefinition>),
    Table { agents: Vec<AgentDefinition> },
}

/// Parse definitions from file content.
///
/// JSON files hold an array or `{ "agents": [...] }`; TOML files hold
/// `[[agents]]` tables.
pub fn parse_definitions(content: &str, is_json: bool) -> Result<Vec<AgentDefinition>> {
    let file: DefinitionsFile = if is_json {
        serde_json::from_str(content).context("failed to parse JSON definitions")?
    } else {
        toml::from_str(content).context("failed to parse TOML definitions")?
    };
    Ok(match file {
        DefinitionsFile::List(agents) | DefinitionsFile::Table { agents } => agents,
    })
}

/// Load a definitions file into a fresh registry.
pub fn load_registry(path: &Path) -> Result<Registry> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read definitions file {}", path.display()))?;
    let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
    let definitions = parse_definitions(&content, is_json)?;

    let registry = Registry::new();
    let count = definitions.len();
    registry.register_all(definitions);
    info!(path = %path.display(), count, "definitions loaded");
    Ok(registry)
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Parse `--input`: inline JSON, or `@path` to read JSON from a file.
pub fn parse_input(raw: &str) -> Result<RunInput> {
    let text = match raw.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read input file {path}"))?,
        None => raw.to_owned(),
    };
    match serde_json::from_str(&text).context("input is not valid JSON")? {
        Value::Object(map) => Ok(map),
        other => bail!("input must be a JSON object, got {other}"),
    }
}

// ---------------------------------------------------------------------------
// Services
// ---------------------------------------------------------------------------

/// Build services for a CLI run.
///
/// The OpenAI-compatible model comes from `config.llm`.  Every memory
/// binding declared in the registry gets a process-local store.
pub fn build_services(config: EngineConfig, registry: &Registry) -> Result<Services> {
    let model = OpenAiModel::new(config.llm.clone()).context("failed to build model client")?;
    let mut services = Services::new(config)
        .context("failed to build HTTP client")?
        .with_model(Arc::new(model));

    for binding_id in memory_binding_ids(registry)? {
        debug!(binding = %binding_id, "attaching in-memory store");
        services = services.with_memory(binding_id, Arc::new(InMemoryStore::new()));
    }
    Ok(services)
}

fn memory_binding_ids(registry: &Registry) -> Result<Vec<String>> {
    let mut ids = Vec::new();
    for id in registry.list_ids() {
        let info = registry.info(&id)?;
        for binding in info.memories() {
            if !ids.contains(&binding.id) {
                ids.push(binding.id.clone());
            }
        }
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_list_and_toml_tables() {
        let json = r#"[{ "type": "open_api", "id": "api", "url": "https://x.test" }]"#;
        let agents = parse_definitions(json, true).unwrap();
        assert_eq!(agents[0].id(), "api");

        let toml = r#"
            [[agents]]
            type = "llm"
            id = "greeter"

            [[agents.messages]]
            id = "m1"
            role = "user"
            content = "hi {{name}}"
        "#;
        let agents = parse_definitions(toml, false).unwrap();
        assert_eq!(agents[0].kind(), "llm");
    }

    #[test]
    fn input_must_be_an_object() {
        assert_eq!(parse_input(r#"{"q": 1}"#).unwrap()["q"], 1);
        assert!(parse_input("[1]").is_err());
        assert!(parse_input("not json").is_err());
    }

    #[test]
    fn input_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.json");
        std::fs::write(&path, r#"{"question": "hello"}"#).unwrap();
        let input = parse_input(&format!("@{}", path.display())).unwrap();
        assert_eq!(input["question"], "hello");
    }

    #[test]
    fn memory_bindings_get_stores() {
        let registry = Registry::new();
        registry.register_all(
            parse_definitions(
                r#"[{ "type": "llm", "id": "a", "memories": [{ "id": "log" }],
                      "messages": [{ "id": "m", "role": "user", "content": "x" }] }]"#,
                true,
            )
            .unwrap(),
        );
        assert_eq!(memory_binding_ids(&registry).unwrap(), vec!["log"]);

        let services = build_services(EngineConfig::default(), &registry).unwrap();
        assert!(services.memory("log").is_some());
        assert!(services.model().is_ok());
    }
}
