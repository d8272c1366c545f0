use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use aqueduct_client::{ADDRESS_ENV, ClientConfig, SavedObjectSelection};
use aqueduct_config::EngineConfig;
use aqueduct_sdk::{ArtifactValue, WorkflowBuilder};
use aqueduct_workflow::{Dag, resolve_artifact_names, validate_engine_resources};

/// Aqueduct - build and operate workflows on an Aqueduct server
#[derive(Parser)]
#[command(name = "aqueduct")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the client config file (default: ~/.aqueduct/config.json)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Inspect and operate published flows
  Flows {
    #[command(subcommand)]
    command: FlowsCommand,
  },

  /// Inspect connected resources
  Resources {
    #[command(subcommand)]
    command: ResourcesCommand,
  },

  /// Work with serialized DAGs offline
  Dag {
    #[command(subcommand)]
    command: DagCommand,
  },
}

#[derive(Subcommand)]
enum FlowsCommand {
  /// List the flows in the workspace
  List,

  /// Start a run of a flow
  Trigger {
    flow_id: Uuid,

    /// Parameter override as name=<json value>; repeatable
    #[arg(long = "param", value_parser = parse_param)]
    params: Vec<(String, ArtifactValue)>,
  },

  /// Delete a flow
  Delete {
    flow_id: Uuid,

    /// Delete even if some saved objects could not be removed
    #[arg(long)]
    force: bool,
  },
}

#[derive(Subcommand)]
enum ResourcesCommand {
  /// List connected resources
  List,
}

#[derive(Subcommand)]
enum DagCommand {
  /// Validate a DAG file the way publishing does and print it with resolved names
  Check {
    /// Path to the DAG (JSON)
    dag_file: PathBuf,

    /// Engine config as JSON, e.g. {"type":"lambda","resource_id":"..."}
    #[arg(long)]
    engine: Option<String>,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  tracing_subscriber::registry()
    .with(EnvFilter::try_from_env("AQUEDUCT_LOG").unwrap_or_else(|_| "info".into()))
    .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
    .init();

  match cli.command {
    Some(Commands::Flows { command }) => {
      let builder = connect(cli.config.as_deref())?;
      match command {
        FlowsCommand::List => list_flows(&builder)?,
        FlowsCommand::Trigger { flow_id, params } => {
          let params: BTreeMap<String, ArtifactValue> = params.into_iter().collect();
          builder
            .trigger(flow_id, params)
            .with_context(|| format!("failed to trigger flow {}", flow_id))?;
          eprintln!("Triggered flow {}", flow_id);
        }
        FlowsCommand::Delete { flow_id, force } => {
          builder
            .delete_flow(flow_id, &SavedObjectSelection::new(), force)
            .with_context(|| format!("failed to delete flow {}", flow_id))?;
          eprintln!("Deleted flow {}", flow_id);
        }
      }
    }
    Some(Commands::Resources {
      command: ResourcesCommand::List,
    }) => {
      let builder = connect(cli.config.as_deref())?;
      let resources = builder
        .connected_resources()
        .context("failed to list resources")?;
      for (name, info) in resources {
        let state = if info.is_connected() {
          "connected".to_string()
        } else {
          info.exec_state.status.to_string()
        };
        println!("{}\t{}\t{}\t{}", info.id, name, info.service, state);
      }
    }
    Some(Commands::Dag {
      command: DagCommand::Check { dag_file, engine },
    }) => check_dag(&dag_file, engine.as_deref())?,
    None => {
      println!("aqueduct - use --help to see available commands");
    }
  }

  Ok(())
}

/// Environment variables win over the config file.
fn load_config(path: Option<&Path>) -> Result<ClientConfig> {
  if path.is_none() && std::env::var_os(ADDRESS_ENV).is_some() {
    return ClientConfig::from_env().context("failed to read client config from environment");
  }
  let path = match path {
    Some(path) => path.to_path_buf(),
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".aqueduct")
      .join("config.json"),
  };
  ClientConfig::from_file(&path)
    .with_context(|| format!("failed to read client config: {}", path.display()))
}

fn connect(config_path: Option<&Path>) -> Result<WorkflowBuilder> {
  let config = load_config(config_path)?;
  let address = config.address.clone();
  WorkflowBuilder::from_config(config)
    .with_context(|| format!("failed to connect to aqueduct server at {}", address))
}

fn list_flows(builder: &WorkflowBuilder) -> Result<()> {
  let flows = builder.list_flows().context("failed to list flows")?;
  for flow in flows {
    let last_run = flow
      .last_run_at
      .map(|t| t.to_rfc3339())
      .unwrap_or_else(|| "never".to_string());
    println!("{}\t{}\t{}\t{}", flow.id, flow.name, flow.status, last_run);
  }
  Ok(())
}

fn check_dag(dag_file: &Path, engine: Option<&str>) -> Result<()> {
  let content = std::fs::read_to_string(dag_file)
    .with_context(|| format!("failed to read dag file: {}", dag_file.display()))?;
  let mut dag: Dag = serde_json::from_str(&content)
    .with_context(|| format!("failed to parse dag file: {}", dag_file.display()))?;

  if let Some(engine) = engine {
    let engine: EngineConfig =
      serde_json::from_str(engine).context("failed to parse engine config")?;
    dag.engine_config = Some(engine);
  }

  dag.validate().context("invalid dag")?;
  validate_engine_resources(&dag).context("operator resources not supported by the engine")?;
  resolve_artifact_names(&mut dag).context("failed to resolve artifact names")?;

  eprintln!(
    "DAG is valid: {} operators, {} artifacts",
    dag.num_operators(),
    dag.num_artifacts()
  );
  println!("{}", serde_json::to_string_pretty(&dag)?);
  Ok(())
}

fn parse_param(s: &str) -> Result<(String, ArtifactValue)> {
  let Some((name, value)) = s.split_once('=') else {
    bail!("expected name=<json value>, got `{}`", s);
  };
  let name = name.trim();
  if name.is_empty() {
    bail!("parameter name must not be empty");
  }
  // Bare words are taken as strings.
  let value = serde_json::from_str(value)
    .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
  Ok((name.to_string(), ArtifactValue::from_json(value)))
}
