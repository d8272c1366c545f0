//! Request and response bodies of the server API.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use aqueduct_config::{
  ArtifactId, ArtifactType, FlowId, OperatorId, ResourceId, Schedule, SerializationType,
  ServiceType,
};
use aqueduct_workflow::Dag;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ClientError;

/// Identifier of one run of a flow.
pub type RunId = Uuid;

/// Objects written by a flow's saves, keyed by resource, selected for deletion.
pub type SavedObjectSelection = BTreeMap<ResourceId, Vec<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
  Registered,
  Pending,
  Running,
  Succeeded,
  Failed,
  Canceled,
  #[serde(other)]
  Unknown,
}

impl fmt::Display for ExecutionStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      ExecutionStatus::Registered => "registered",
      ExecutionStatus::Pending => "pending",
      ExecutionStatus::Running => "running",
      ExecutionStatus::Succeeded => "succeeded",
      ExecutionStatus::Failed => "failed",
      ExecutionStatus::Canceled => "canceled",
      ExecutionStatus::Unknown => "unknown",
    };
    f.write_str(s)
  }
}

/// Error context the server attaches to a failed operator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecError {
  #[serde(default)]
  pub context: String,
  #[serde(default)]
  pub tip: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecState {
  pub status: ExecutionStatus,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<ExecError>,
}

impl ExecState {
  pub fn succeeded() -> Self {
    Self {
      status: ExecutionStatus::Succeeded,
      error: None,
    }
  }

  pub fn failed(context: impl Into<String>, tip: impl Into<String>) -> Self {
    Self {
      status: ExecutionStatus::Failed,
      error: Some(ExecError {
        context: context.into(),
        tip: tip.into(),
      }),
    }
  }
}

/// A resource (integration) connected to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceInfo {
  pub id: ResourceId,
  pub name: String,
  pub service: ServiceType,
  pub created_at: DateTime<Utc>,
  pub exec_state: ExecState,
}

impl ResourceInfo {
  /// Whether the server validated its connection to the resource.
  pub fn is_connected(&self) -> bool {
    self.exec_state.status == ExecutionStatus::Succeeded
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Logs {
  #[serde(default)]
  pub stdout: String,
  #[serde(default)]
  pub stderr: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorResult {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub user_logs: Option<Logs>,
  pub exec_state: ExecState,
}

/// Computed content of one artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactResult {
  pub artifact_type: ArtifactType,
  pub serialization_type: SerializationType,
  /// Base64 encoded.
  pub content: String,
}

impl ArtifactResult {
  pub fn new(
    artifact_type: ArtifactType,
    serialization_type: SerializationType,
    bytes: &[u8],
  ) -> Self {
    Self {
      artifact_type,
      serialization_type,
      content: STANDARD.encode(bytes),
    }
  }

  pub fn bytes(&self) -> Result<Vec<u8>, ClientError> {
    STANDARD
      .decode(&self.content)
      .map_err(|e| ClientError::Decode {
        field: "content".to_string(),
        message: e.to_string(),
      })
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewResponse {
  pub status: ExecutionStatus,
  #[serde(default)]
  pub operator_results: HashMap<OperatorId, OperatorResult>,
  #[serde(default)]
  pub artifact_results: HashMap<ArtifactId, ArtifactResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterWorkflowResponse {
  pub id: FlowId,
  /// Runtime version the server's engine runs flows with.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub python_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterAirflowWorkflowResponse {
  pub id: FlowId,
  /// Base64 encoded Airflow DAG file.
  pub file: String,
  #[serde(default)]
  pub is_update: bool,
}

impl RegisterAirflowWorkflowResponse {
  pub fn file_bytes(&self) -> Result<Vec<u8>, ClientError> {
    STANDARD.decode(&self.file).map_err(|e| ClientError::Decode {
      field: "file".to_string(),
      message: e.to_string(),
    })
  }
}

/// One flow in the workspace listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowEntry {
  pub id: FlowId,
  pub name: String,
  #[serde(default)]
  pub description: String,
  pub created_at: DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub last_run_at: Option<DateTime<Utc>>,
  pub status: ExecutionStatus,
}

/// One run of a flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRun {
  pub id: RunId,
  pub created_at: DateTime<Utc>,
  pub status: ExecutionStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetWorkflowResponse {
  pub id: FlowId,
  pub name: String,
  #[serde(default)]
  pub description: String,
  pub schedule: Schedule,
  /// Most recent first.
  #[serde(default)]
  pub runs: Vec<WorkflowRun>,
  /// The DAG as last published.
  pub dag: Dag,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDagResultResponse {
  pub id: RunId,
  pub status: ExecutionStatus,
  pub created_at: DateTime<Utc>,
  /// The DAG this run executed.
  pub dag: Dag,
  #[serde(default)]
  pub artifact_statuses: HashMap<ArtifactId, ExecutionStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactResultResponse {
  pub exec_state: ExecState,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub result: Option<ArtifactResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedObjectDeletion {
  pub name: String,
  pub exec_state: ExecState,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeleteWorkflowResponse {
  #[serde(default)]
  pub saved_object_deletion_results: HashMap<ResourceId, Vec<SavedObjectDeletion>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct DeleteWorkflowRequest<'a> {
  pub external_delete: &'a SavedObjectSelection,
  pub force: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VersionResponse {
  pub version: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListTablesResponse {
  pub table_names: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorResponse {
  pub error: String,
}
