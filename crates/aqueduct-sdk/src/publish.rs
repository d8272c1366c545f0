use std::collections::HashSet;
use std::path::PathBuf;

use aqueduct_client::ClientError;
use aqueduct_config::{
  ArtifactId, EngineConfig, FlowId, FlowMetadata, RetentionPolicy, Schedule, TriggerType,
};
use aqueduct_workflow::{
  SubgraphDagDelta, apply_deltas_to_copy, resolve_artifact_names, validate_engine_resources,
};
use tracing::{info, warn};

use crate::artifact::{Artifact, BaseArtifact};
use crate::context::{AQUEDUCT_ENGINE, WorkflowBuilder};
use crate::cron::validate_cron;
use crate::error::SdkError;
use crate::flow::Flow;

/// Everything needed to publish a flow.
#[derive(Debug, Clone)]
pub struct PublishRequest {
  pub name: String,
  pub description: String,
  /// Cron expression for periodic runs.
  pub schedule: Option<String>,
  /// Run after every run of this flow.
  pub source_flow: Option<FlowId>,
  /// Engine name; falls back to the global config, then the built-in engine.
  pub engine: Option<String>,
  pub artifacts: Vec<Artifact>,
  /// Metrics to keep. `None` keeps every metric of the published artifacts.
  pub metrics: Option<Vec<Artifact>>,
  /// Checks to keep. `None` keeps every check of the published artifacts.
  pub checks: Option<Vec<Artifact>>,
  /// Runs to retain; `None` keeps all.
  pub k_latest_runs: Option<i64>,
  /// Allow artifacts created from local data.
  pub use_local: bool,
  pub run_now: bool,
  /// Where the Airflow DAG file is written.
  pub output_dir: PathBuf,
}

impl PublishRequest {
  pub fn new(name: impl Into<String>, artifacts: Vec<Artifact>) -> Self {
    Self {
      name: name.into(),
      description: String::new(),
      schedule: None,
      source_flow: None,
      engine: None,
      artifacts,
      metrics: None,
      checks: None,
      k_latest_runs: None,
      use_local: false,
      run_now: true,
      output_dir: PathBuf::from("."),
    }
  }

  pub fn description(mut self, description: impl Into<String>) -> Self {
    self.description = description.into();
    self
  }

  pub fn schedule(mut self, cron: impl Into<String>) -> Self {
    self.schedule = Some(cron.into());
    self
  }

  pub fn source_flow(mut self, flow_id: FlowId) -> Self {
    self.source_flow = Some(flow_id);
    self
  }

  pub fn engine(mut self, engine: impl Into<String>) -> Self {
    self.engine = Some(engine.into());
    self
  }

  pub fn metrics(mut self, metrics: Vec<Artifact>) -> Self {
    self.metrics = Some(metrics);
    self
  }

  pub fn checks(mut self, checks: Vec<Artifact>) -> Self {
    self.checks = Some(checks);
    self
  }

  pub fn k_latest_runs(mut self, k: i64) -> Self {
    self.k_latest_runs = Some(k);
    self
  }

  pub fn use_local(mut self, use_local: bool) -> Self {
    self.use_local = use_local;
    self
  }

  pub fn run_now(mut self, run_now: bool) -> Self {
    self.run_now = run_now;
    self
  }

  pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.output_dir = dir.into();
    self
  }
}

impl WorkflowBuilder {
  /// Prune, validate and register the workflow computing the requested
  /// artifacts.
  pub fn publish_flow(&self, request: PublishRequest) -> Result<Flow, SdkError> {
    let name = request.name.trim().to_string();
    if name.is_empty() {
      return Err(SdkError::user_argument("flow name must not be empty"));
    }
    if request.artifacts.is_empty() {
      return Err(SdkError::user_argument(
        "a flow must compute at least one artifact",
      ));
    }
    if request.schedule.is_some() && request.source_flow.is_some() {
      return Err(SdkError::user_argument(
        "a flow cannot have both a schedule and a source flow",
      ));
    }

    let schedule = match (&request.schedule, request.source_flow) {
      (Some(cron), _) => {
        validate_cron(cron)?;
        Schedule::periodic(cron.as_str())
      }
      (None, Some(source)) => {
        self.check_cascade(&name, source)?;
        Schedule::cascade(source)
      }
      (None, None) => Schedule::manual(),
    };

    let engine_name = request
      .engine
      .clone()
      .or_else(|| self.global_config().engine)
      .unwrap_or_else(|| AQUEDUCT_ENGINE.to_string());
    let engine = self.resolve_engine(&engine_name)?;

    let mut artifact_ids: Vec<ArtifactId> = Vec::new();
    for artifact in request
      .artifacts
      .iter()
      .chain(request.metrics.iter().flatten())
      .chain(request.checks.iter().flatten())
    {
      artifact.handle().ensure_in_session(self)?;
      if !artifact_ids.contains(&artifact.id()) {
        artifact_ids.push(artifact.id());
      }
    }

    let subgraph = SubgraphDagDelta {
      artifact_ids,
      include_saves: true,
      include_metrics: request.metrics.is_none(),
      include_checks: request.checks.is_none(),
    };
    let mut dag = apply_deltas_to_copy(&self.borrow_dag(), &[&subgraph])?;

    if !request.use_local
      && let Some(local) = dag.artifacts().find(|a| a.from_local_data)
    {
      return Err(SdkError::user_action(format!(
        "artifact `{}` was created from local data; publish with use_local to upload it",
        local.name
      )));
    }

    dag.metadata = FlowMetadata {
      name: name.clone(),
      description: request.description.clone(),
      schedule,
      retention_policy: RetentionPolicy {
        k_latest_runs: request.k_latest_runs.unwrap_or(-1),
      },
    };
    dag.engine_config = Some(engine.clone());

    validate_engine_resources(&dag)?;
    resolve_artifact_names(&mut dag)?;
    dag.validate()?;

    for op in dag.bfs_operators() {
      info!(operator = %op.name, kind = %op.kind(), "publishing operator");
    }

    let flow_id = match engine {
      EngineConfig::Airflow { .. } => {
        let response = self.client().register_airflow_workflow(&dag)?;
        let path = request.output_dir.join(format!("{}_airflow.py", name));
        std::fs::write(&path, response.file_bytes()?)?;
        info!(
          path = %path.display(),
          updated = response.is_update,
          "wrote airflow dag file; copy it into your Airflow dags folder"
        );
        response.id
      }
      _ => {
        let response = self.client().register_workflow(&dag, request.run_now)?;
        if let (Some(server), Some(local)) =
          (&response.python_version, &self.inner.runtime_version)
          && server != local
        {
          warn!(
            server = %server,
            local = %local,
            "the server runs flows with a different runtime version than this one"
          );
        }
        response.id
      }
    };

    info!(flow = %flow_id, name = %name, "published flow");
    Ok(Flow::new(self, flow_id))
  }

  /// A cascade source must not itself be triggered, directly or
  /// transitively, by the flow being published.
  fn check_cascade(&self, name: &str, source: FlowId) -> Result<(), SdkError> {
    let existing = self
      .client()
      .list_workflows()?
      .into_iter()
      .find(|flow| flow.name == name)
      .map(|flow| flow.id);

    let mut seen: HashSet<FlowId> = HashSet::new();
    let mut current = source;
    loop {
      if Some(current) == existing {
        return Err(SdkError::user_argument(format!(
          "triggering `{}` from flow {} would create a cycle",
          name, source
        )));
      }
      if !seen.insert(current) {
        return Ok(());
      }
      let flow = self.client().get_workflow(current).map_err(|e| match e {
        ClientError::NotFound { .. } => SdkError::ResourceNotFound {
          name: format!("flow {}", current),
        },
        other => other.into(),
      })?;
      match (flow.schedule.trigger, flow.schedule.source_id) {
        (TriggerType::Cascade, Some(next)) => current = next,
        _ => return Ok(()),
      }
    }
  }
}
