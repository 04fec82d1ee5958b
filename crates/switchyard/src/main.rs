//! Switchyard command-line interface.

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use log::{debug, info, warn};
use serde_json::Value;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use switchyard::approval::ConsoleApproval;
use switchyard::model::HttpCompletionModel;
use switchyard_config::{LayeredConfigOptions, SwitchyardConfig, user_config_dir};
use switchyard_core::{
    ApprovalDecision, ApprovalHandler, DEFAULT_THRESHOLD, EvaluationScenario, JsonlDocumentStore,
    Orchestrator, StaticApproval, run_scenarios,
};
use switchyard_protocol::{DocumentStore, ProviderState, QueryContext};
use switchyard_providers::ConnectionInfo;
use switchyard_rules::{Rule, RulesEngine};

const RULES_FILE: &str = "rules.json";
const MEMORY_FILE: &str = "memory/documents.jsonl";

/// Command-line options shared by every subcommand.
#[derive(Parser)]
#[command(name = "switchyard", version, about)]
struct Cli {
    /// Extra switchyard.json5 applied on top of the discovered layers
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Provider configuration file, checked before the conventional locations
    #[arg(long, global = true)]
    providers: Option<PathBuf>,
    /// Rules file (default: ~/.switchyard/rules.json)
    #[arg(long, global = true)]
    rules: Option<PathBuf>,
    /// Run without a completion model even when an API key is set
    #[arg(long, global = true)]
    no_model: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Answer a prompt through the provider pipeline
    Query {
        prompt: String,
        /// Context entry; values that parse as JSON keep their type
        #[arg(long = "context", value_name = "KEY=VALUE")]
        context: Vec<String>,
        /// Print the whole outcome, metadata included, as JSON
        #[arg(long)]
        json: bool,
        /// Approve every operation a rule marks for approval
        #[arg(long)]
        yes: bool,
    },
    /// Connect to every provider and report its state
    Status,
    /// List operations offered by connected providers
    Operations,
    /// Inspect or edit the rules file
    Rules {
        #[command(subcommand)]
        action: RulesCommand,
    },
    /// Run tool-selection scenarios from a JSON file
    Evaluate {
        scenarios: PathBuf,
        #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
        threshold: f64,
    },
}

#[derive(Subcommand)]
enum RulesCommand {
    /// Print the rule document
    List,
    /// Add a rule given as JSON
    Add { rule: String },
    /// Remove a rule by id
    Remove { id: String },
    /// Replace every rule with the built-in set
    Reset,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    switchyard::init_logging();

    let cli = Cli::parse();
    let cwd = std::env::current_dir().context("failed to resolve current working directory")?;
    let mut config = load_config(&cwd, cli.config.as_deref())?;
    if let Some(path) = &cli.providers {
        config.providers.config_path = Some(path.to_string_lossy().to_string());
    }
    let rules_path = match &cli.rules {
        Some(path) => path.clone(),
        None => user_file(config.rules.path.as_deref(), RULES_FILE)?,
    };
    info!(
        "starting switchyard (rules={}, providers_override={}, no_model={})",
        rules_path.display(),
        config.providers.config_path.is_some(),
        cli.no_model
    );

    match cli.command {
        Command::Rules { action } => run_rules(&rules_path, action),
        Command::Query {
            prompt,
            context,
            json,
            yes,
        } => {
            let context = parse_context(&context)?;
            let approval: Option<Arc<dyn ApprovalHandler>> = if yes {
                Some(Arc::new(StaticApproval(ApprovalDecision::Allow)))
            } else if std::io::stdin().is_terminal() {
                Some(Arc::new(ConsoleApproval))
            } else {
                None
            };
            let (orchestrator, _) = build_orchestrator(config, &rules_path, cli.no_model, approval)?;
            orchestrator.initialize().await;
            let outcome = orchestrator.process_query(&prompt, &context).await;
            orchestrator.shutdown().await;
            let outcome = outcome?;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!("{}", outcome.response);
            }
            Ok(())
        }
        Command::Status => {
            let (orchestrator, _) = build_orchestrator(config, &rules_path, true, None)?;
            orchestrator.initialize().await;
            let status = orchestrator.status();
            println!(
                "providers: {} connected, {} errored, {} discovered",
                status.connected, status.errored, status.discovered
            );
            for connection in orchestrator.connections() {
                println!("{}", status_line(&connection));
            }
            orchestrator.shutdown().await;
            Ok(())
        }
        Command::Operations => {
            let (orchestrator, _) = build_orchestrator(config, &rules_path, true, None)?;
            orchestrator.initialize().await;
            for operation in orchestrator.operations() {
                println!(
                    "{}/{}: {}",
                    operation.provider, operation.name, operation.description
                );
            }
            orchestrator.shutdown().await;
            Ok(())
        }
        Command::Evaluate {
            scenarios,
            threshold,
        } => {
            let contents = std::fs::read_to_string(&scenarios)
                .with_context(|| format!("failed to read {}", scenarios.display()))?;
            let scenarios: Vec<EvaluationScenario> =
                serde_json::from_str(&contents).context("invalid scenarios file")?;
            let (orchestrator, documents) =
                build_orchestrator(config, &rules_path, cli.no_model, None)?;
            orchestrator.initialize().await;
            let documents = documents
                .as_ref()
                .map(|store| store.as_ref() as &dyn DocumentStore);
            let report = run_scenarios(&orchestrator, documents, &scenarios, threshold).await;
            orchestrator.shutdown().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.passed() {
                bail!("scenarios failed: {}", report.failed().join(", "));
            }
            Ok(())
        }
    }
}

fn load_config(cwd: &Path, runtime: Option<&Path>) -> anyhow::Result<SwitchyardConfig> {
    let mut options = LayeredConfigOptions::new(cwd);
    if let Some(path) = runtime {
        info!("adding runtime config layer (path={})", path.display());
        options = options.with_runtime_path(path);
    }
    let layered = SwitchyardConfig::load_layered_with_options(options)
        .context("failed to load layered config")?;
    debug!("layered config loaded (layers={})", layered.layers.len());
    Ok(layered.config)
}

/// A configured path, or `file` under `~/.switchyard`.
fn user_file(configured: Option<&str>, file: &str) -> anyhow::Result<PathBuf> {
    if let Some(path) = configured {
        return Ok(PathBuf::from(path));
    }
    let dir = user_config_dir().context("cannot locate the home directory")?;
    Ok(dir.join(file))
}

fn build_orchestrator(
    config: SwitchyardConfig,
    rules_path: &Path,
    no_model: bool,
    approval: Option<Arc<dyn ApprovalHandler>>,
) -> anyhow::Result<(Orchestrator, Option<Arc<JsonlDocumentStore>>)> {
    let rules = Arc::new(RulesEngine::load_rules(rules_path));
    let mut builder = Orchestrator::builder(config.clone()).rules(rules);

    if !no_model {
        match HttpCompletionModel::from_config(&config.model) {
            Some(model) => {
                info!("completion model enabled (model={})", config.model.name);
                builder = builder.model(Arc::new(model));
            }
            None => warn!(
                "no API key found, running without a model (env={})",
                config.model.api_key_env
            ),
        }
    }

    let documents = if config.memory.enabled {
        let path = user_file(config.memory.path.as_deref(), MEMORY_FILE)?;
        let store = Arc::new(
            JsonlDocumentStore::new(&path, config.memory.top_k)
                .with_context(|| format!("failed to open document store {}", path.display()))?,
        );
        builder = builder.documents(store.clone());
        Some(store)
    } else {
        None
    };
    if let Some(approval) = approval {
        builder = builder.approval_handler(approval);
    }
    Ok((builder.build()?, documents))
}

fn run_rules(path: &Path, action: RulesCommand) -> anyhow::Result<()> {
    let engine = RulesEngine::load_rules(path);
    match action {
        RulesCommand::List => {
            println!("{}", serde_json::to_string_pretty(&engine.document())?);
            return Ok(());
        }
        RulesCommand::Add { rule } => {
            let rule: Rule = serde_json::from_str(&rule).context("invalid rule JSON")?;
            let id = rule.id.clone();
            engine.add(rule)?;
            println!("added rule {id}");
        }
        RulesCommand::Remove { id } => {
            engine.remove(&id)?;
            println!("removed rule {id}");
        }
        RulesCommand::Reset => {
            engine.reset();
            println!("rules reset to defaults");
        }
    }
    engine.save()?;
    Ok(())
}

/// One `status` row: the error for errored providers, else their operations.
fn status_line(connection: &ConnectionInfo) -> String {
    let detail = match &connection.last_error {
        Some(error) if connection.state == ProviderState::Errored => error.clone(),
        _ => connection.operations.join(", "),
    };
    format!(
        "  {:<20} {:<10} {}",
        connection.name,
        connection.state.as_str(),
        detail
    )
}

/// `KEY=VALUE` pairs into a query context.
fn parse_context(entries: &[String]) -> anyhow::Result<QueryContext> {
    let mut context = QueryContext::new();
    for entry in entries {
        let Some((key, raw)) = entry.split_once('=') else {
            bail!("context entry must look like KEY=VALUE: {entry}");
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("context entry has an empty key: {entry}");
        }
        let value =
            serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        context.insert(key.to_string(), value);
    }
    Ok(context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn context_values_keep_json_types() {
        let context = parse_context(&[
            "user=alice".to_string(),
            "limit=5".to_string(),
            "tags=[\"a\",\"b\"]".to_string(),
            "note=a=b".to_string(),
        ])
        .expect("context");
        assert_eq!(
            Value::Object(context),
            json!({ "user": "alice", "limit": 5, "tags": ["a", "b"], "note": "a=b" })
        );
    }

    #[test]
    fn context_rejects_malformed_entries() {
        assert_eq!(parse_context(&["novalue".to_string()]).is_err(), true);
        assert_eq!(parse_context(&["=x".to_string()]).is_err(), true);
    }

    #[test]
    fn configured_paths_win_over_home() {
        assert_eq!(
            user_file(Some("/tmp/rules.json"), RULES_FILE).expect("path"),
            PathBuf::from("/tmp/rules.json")
        );
    }

    #[test]
    fn status_line_shows_state_and_detail() {
        let connected = ConnectionInfo {
            name: "demo".to_string(),
            state: ProviderState::Connected,
            operations: vec!["add".to_string(), "echo".to_string()],
            last_error: None,
        };
        assert_eq!(
            status_line(&connected),
            format!("  {:<20} {:<10} add, echo", "demo", "connected")
        );

        let errored = ConnectionInfo {
            name: "ghost".to_string(),
            state: ProviderState::Errored,
            operations: Vec::new(),
            last_error: Some("spawn failed".to_string()),
        };
        assert_eq!(
            status_line(&errored),
            format!("  {:<20} {:<10} spawn failed", "ghost", "errored")
        );
    }

    #[test]
    fn cli_parses_query_flags() {
        let cli = Cli::try_parse_from([
            "switchyard",
            "--no-model",
            "query",
            "add 4 and 5",
            "--context",
            "user=alice",
            "--json",
        ])
        .expect("parse");
        assert_eq!(cli.no_model, true);
        match cli.command {
            Command::Query {
                prompt,
                context,
                json,
                yes,
            } => {
                assert_eq!(prompt, "add 4 and 5");
                assert_eq!(context, vec!["user=alice".to_string()]);
                assert_eq!(json, true);
                assert_eq!(yes, false);
            }
            _ => panic!("expected query command"),
        }
    }
}
