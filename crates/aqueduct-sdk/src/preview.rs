use std::collections::{BTreeMap, HashMap};

use aqueduct_client::ExecutionStatus;
use aqueduct_config::ArtifactId;
use aqueduct_workflow::{
  ArtifactValue, DagDelta, RenameArtifactDelta, SubgraphDagDelta, UpdateArtifactTypeDelta,
  UpdateParametersDelta, apply_deltas_to_copy,
};
use tracing::{debug, info};

use crate::context::WorkflowBuilder;
use crate::error::{OperatorFailure, SdkError};

impl WorkflowBuilder {
  /// Compute artifacts by previewing the part of the session DAG they depend
  /// on, optionally with overridden parameter values.
  pub(crate) fn preview_artifacts(
    &self,
    artifact_ids: &[ArtifactId],
    parameters: Option<&BTreeMap<String, ArtifactValue>>,
  ) -> Result<HashMap<ArtifactId, ArtifactValue>, SdkError> {
    let subgraph = SubgraphDagDelta::new(artifact_ids.to_vec());
    let update = parameters.map(|p| UpdateParametersDelta::new(p.clone()));
    let mut deltas: Vec<&dyn DagDelta> = vec![&subgraph];
    if let Some(update) = &update {
      deltas.push(update);
    }
    let dag = apply_deltas_to_copy(&self.borrow_dag(), &deltas)?;

    info!(operators = dag.num_operators(), "previewing");
    let response = self.client().preview(&dag)?;

    let failures: Vec<OperatorFailure> = dag
      .bfs_operators()
      .into_iter()
      .filter_map(|op| {
        let result = response.operator_results.get(&op.id)?;
        if result.exec_state.status != ExecutionStatus::Failed {
          return None;
        }
        let error = result.exec_state.error.clone().unwrap_or_default();
        Some(OperatorFailure {
          operator: op.name.clone(),
          context: error.context,
          tip: error.tip,
          stderr: result
            .user_logs
            .as_ref()
            .map(|logs| logs.stderr.clone())
            .unwrap_or_default(),
        })
      })
      .collect();
    if !failures.is_empty() {
      return Err(SdkError::PreviewExecution { failures });
    }
    if response.status == ExecutionStatus::Failed {
      return Err(SdkError::Server {
        message: "preview failed without reporting a failed operator".to_string(),
      });
    }

    let mut values = HashMap::new();
    for id in artifact_ids {
      let result = response.artifact_results.get(id).ok_or_else(|| {
        SdkError::internal(format!("preview returned no result for artifact {}", id))
      })?;
      let bytes = result.bytes()?;
      let value =
        self
          .inner
          .codec
          .decode(result.artifact_type, result.serialization_type, &bytes)?;
      debug!(artifact = %id, artifact_type = %value.artifact_type(), "decoded preview result");
      values.insert(*id, value);
    }
    Ok(values)
  }

  /// Record the concrete type of a computed value in the session DAG.
  pub(crate) fn record_value_type(
    &self,
    artifact_id: ArtifactId,
    value: &ArtifactValue,
  ) -> Result<(), SdkError> {
    self.apply(&[&UpdateArtifactTypeDelta::new(artifact_id, value.artifact_type())])
  }

  pub(crate) fn rename_artifact(&self, artifact_id: ArtifactId, name: String) -> Result<(), SdkError> {
    self.apply(&[&RenameArtifactDelta::new(artifact_id, name)])
  }
}
