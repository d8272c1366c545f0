//! Handles to published flows and their runs.

use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use aqueduct_client::{
  ClientError, DeleteWorkflowResponse, ExecutionStatus, GetWorkflowResponse,
  SavedObjectSelection, WorkflowEntry, WorkflowRun,
};
use aqueduct_config::{ArtifactId, FlowId, ParamSpec};
use aqueduct_workflow::{ArtifactValue, Dag, UpdateParametersDelta, apply_deltas_to_copy, param_spec};
use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::artifact::{Artifact, ArtifactHandle};
use crate::context::WorkflowBuilder;
use crate::error::SdkError;

fn flow_not_found(flow_id: FlowId) -> impl FnOnce(ClientError) -> SdkError {
  move |e| match e {
    ClientError::NotFound { .. } => SdkError::ResourceNotFound {
      name: format!("flow {}", flow_id),
    },
    other => other.into(),
  }
}

impl WorkflowBuilder {
  pub fn list_flows(&self) -> Result<Vec<WorkflowEntry>, SdkError> {
    Ok(self.client().list_workflows()?)
  }

  /// A handle to an existing flow.
  pub fn flow(&self, flow_id: FlowId) -> Result<Flow, SdkError> {
    self
      .client()
      .get_workflow(flow_id)
      .map_err(flow_not_found(flow_id))?;
    Ok(Flow::new(self, flow_id))
  }

  /// Start a run, overriding parameter values by name.
  pub fn trigger(
    &self,
    flow_id: FlowId,
    parameters: BTreeMap<String, ArtifactValue>,
  ) -> Result<(), SdkError> {
    let specs = if parameters.is_empty() {
      BTreeMap::new()
    } else {
      let flow = self
        .client()
        .get_workflow(flow_id)
        .map_err(flow_not_found(flow_id))?;
      // Same rules as for previews: existing parameters, strings for queries.
      apply_deltas_to_copy(&flow.dag, &[&UpdateParametersDelta::new(parameters.clone())])?;
      parameters
        .iter()
        .map(|(name, value)| -> Result<(String, ParamSpec), SdkError> {
          Ok((name.clone(), param_spec(value, false)?.0))
        })
        .collect::<Result<BTreeMap<_, _>, _>>()?
    };

    self
      .client()
      .refresh_workflow(flow_id, &specs)
      .map_err(flow_not_found(flow_id))?;
    info!(flow = %flow_id, parameters = specs.len(), "triggered flow");
    Ok(())
  }

  /// Delete a flow, and optionally objects its saves wrote. Without `force`,
  /// deleting a flow whose saved objects could not all be removed fails.
  pub fn delete_flow(
    &self,
    flow_id: FlowId,
    saved_objects: &SavedObjectSelection,
    force: bool,
  ) -> Result<DeleteWorkflowResponse, SdkError> {
    let response = self
      .client()
      .delete_workflow(flow_id, saved_objects, force)
      .map_err(flow_not_found(flow_id))?;

    let failed: Vec<&str> = response
      .saved_object_deletion_results
      .values()
      .flatten()
      .filter(|r| r.exec_state.status == ExecutionStatus::Failed)
      .map(|r| r.name.as_str())
      .collect();
    if !failed.is_empty() {
      if !force {
        return Err(SdkError::Server {
          message: format!("failed to delete saved objects: {}", failed.join(", ")),
        });
      }
      warn!(objects = %failed.join(", "), "flow deleted but some saved objects were not");
    }
    Ok(response)
  }
}

/// A published flow.
#[derive(Clone)]
pub struct Flow {
  builder: WorkflowBuilder,
  id: FlowId,
}

impl Flow {
  pub(crate) fn new(builder: &WorkflowBuilder, id: FlowId) -> Self {
    Self {
      builder: builder.clone(),
      id,
    }
  }

  pub fn id(&self) -> FlowId {
    self.id
  }

  fn fetch_flow(&self) -> Result<GetWorkflowResponse, SdkError> {
    self
      .builder
      .client()
      .get_workflow(self.id)
      .map_err(flow_not_found(self.id))
  }

  pub fn name(&self) -> Result<String, SdkError> {
    Ok(self.fetch_flow()?.name)
  }

  pub fn describe(&self) -> Result<String, SdkError> {
    let flow = self.fetch_flow()?;
    let mut out = format!("Flow: {}\nId: {}\n", flow.name, flow.id);
    if !flow.description.is_empty() {
      out.push_str(&format!("Description: {}\n", flow.description));
    }
    out.push_str(&format!("Trigger: {:?}\n", flow.schedule.trigger));
    if !flow.schedule.cron_schedule.is_empty() {
      out.push_str(&format!("Schedule: {}\n", flow.schedule.cron_schedule));
    }
    if let Some(latest) = flow.runs.first() {
      out.push_str(&format!(
        "Latest run: {} ({}, {})\n",
        latest.id, latest.status, latest.created_at
      ));
    }
    out.push_str("Operators:\n");
    for op in flow.dag.bfs_operators() {
      out.push_str(&format!("  {} ({})\n", op.name, op.kind()));
    }
    Ok(out)
  }

  /// Runs, most recent first.
  pub fn list_runs(&self) -> Result<Vec<WorkflowRun>, SdkError> {
    Ok(self.fetch_flow()?.runs)
  }

  pub fn latest(&self) -> Result<Option<FlowRun>, SdkError> {
    match self.fetch_flow()?.runs.first() {
      Some(run) => self.fetch(run.id).map(Some),
      None => Ok(None),
    }
  }

  pub fn fetch(&self, run_id: Uuid) -> Result<FlowRun, SdkError> {
    let result = self
      .builder
      .client()
      .get_workflow_dag_result(self.id, run_id)
      .map_err(|e| match e {
        ClientError::NotFound { .. } => SdkError::ResourceNotFound {
          name: format!("run {} of flow {}", run_id, self.id),
        },
        other => other.into(),
      })?;
    Ok(FlowRun {
      builder: self.builder.clone(),
      flow_id: self.id,
      id: result.id,
      status: result.status,
      created_at: result.created_at,
      dag: Rc::new(result.dag),
      artifact_statuses: result.artifact_statuses,
    })
  }

  pub fn trigger(&self, parameters: BTreeMap<String, ArtifactValue>) -> Result<(), SdkError> {
    self.builder.trigger(self.id, parameters)
  }
}

/// One run of a flow.
#[derive(Clone)]
pub struct FlowRun {
  builder: WorkflowBuilder,
  flow_id: FlowId,
  id: Uuid,
  status: ExecutionStatus,
  created_at: DateTime<Utc>,
  dag: Rc<Dag>,
  artifact_statuses: HashMap<ArtifactId, ExecutionStatus>,
}

impl FlowRun {
  pub fn id(&self) -> Uuid {
    self.id
  }

  pub fn flow_id(&self) -> FlowId {
    self.flow_id
  }

  pub fn status(&self) -> ExecutionStatus {
    self.status
  }

  pub fn created_at(&self) -> DateTime<Utc> {
    self.created_at
  }

  pub fn describe(&self) -> String {
    let mut out = format!(
      "Run: {}\nStatus: {}\nCreated at: {}\n",
      self.id, self.status, self.created_at
    );
    for op in self.dag.bfs_operators() {
      out.push_str(&format!("  {} ({})\n", op.name, op.kind()));
    }
    out
  }

  /// The artifact of this run with the given name. Its value is loaded when
  /// the run computed it; otherwise `get` reports it was never computed.
  pub fn artifact(&self, name: &str) -> Result<Option<Artifact>, SdkError> {
    let Some(metadata) = self.dag.get_artifact_by_name(name).cloned() else {
      return Ok(None);
    };

    let status = self
      .artifact_statuses
      .get(&metadata.id)
      .copied()
      .unwrap_or(ExecutionStatus::Unknown);
    let content = if status == ExecutionStatus::Succeeded {
      let response = self
        .builder
        .client()
        .get_artifact_result(self.flow_id, self.id, metadata.id)?;
      match response.result {
        Some(result) if response.exec_state.status == ExecutionStatus::Succeeded => {
          let bytes = result.bytes()?;
          Some(self.builder.inner.codec.decode(
            result.artifact_type,
            result.serialization_type,
            &bytes,
          )?)
        }
        _ => None,
      }
    } else {
      None
    };

    let handle = ArtifactHandle::flow_run(&self.builder, self.dag.clone(), metadata.id, content)?;
    Ok(Some(Artifact::from_handle(handle, metadata.artifact_type)))
  }
}
