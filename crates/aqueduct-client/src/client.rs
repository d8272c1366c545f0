use std::collections::BTreeMap;

use aqueduct_config::{ArtifactId, FlowId, ParamSpec, ResourceId, ServiceType};
use aqueduct_workflow::Dag;

use crate::error::ClientError;
use crate::responses::{
  ArtifactResultResponse, DeleteWorkflowResponse, GetWorkflowResponse, PreviewResponse,
  RegisterAirflowWorkflowResponse, RegisterWorkflowResponse, ResourceInfo, RunId,
  SavedObjectSelection, WorkflowDagResultResponse, WorkflowEntry,
};

/// The orchestration server API used by the SDK.
///
/// Calls are synchronous. [`HttpServerClient`](crate::HttpServerClient) is the
/// production implementation; tests substitute an in-memory one.
pub trait ServerClient {
  /// Version string the server advertises.
  fn server_version(&self) -> Result<String, ClientError>;

  fn list_resources(&self) -> Result<Vec<ResourceInfo>, ClientError>;

  fn list_tables(&self, resource_id: ResourceId) -> Result<Vec<String>, ClientError>;

  fn connect_resource(
    &self,
    name: &str,
    service: ServiceType,
    config: &BTreeMap<String, String>,
  ) -> Result<(), ClientError>;

  fn delete_resource(&self, resource_id: ResourceId) -> Result<(), ClientError>;

  /// Execute a DAG without registering it and return the computed artifacts.
  fn preview(&self, dag: &Dag) -> Result<PreviewResponse, ClientError>;

  fn register_workflow(
    &self,
    dag: &Dag,
    run_now: bool,
  ) -> Result<RegisterWorkflowResponse, ClientError>;

  /// Register a flow that runs on Airflow and receive the generated DAG file.
  fn register_airflow_workflow(
    &self,
    dag: &Dag,
  ) -> Result<RegisterAirflowWorkflowResponse, ClientError>;

  /// Trigger a run, optionally overriding parameter values.
  fn refresh_workflow(
    &self,
    flow_id: FlowId,
    parameters: &BTreeMap<String, ParamSpec>,
  ) -> Result<(), ClientError>;

  fn delete_workflow(
    &self,
    flow_id: FlowId,
    saved_objects: &SavedObjectSelection,
    force: bool,
  ) -> Result<DeleteWorkflowResponse, ClientError>;

  fn list_workflows(&self) -> Result<Vec<WorkflowEntry>, ClientError>;

  fn get_workflow(&self, flow_id: FlowId) -> Result<GetWorkflowResponse, ClientError>;

  fn get_workflow_dag_result(
    &self,
    flow_id: FlowId,
    run_id: RunId,
  ) -> Result<WorkflowDagResultResponse, ClientError>;

  fn get_artifact_result(
    &self,
    flow_id: FlowId,
    run_id: RunId,
    artifact_id: ArtifactId,
  ) -> Result<ArtifactResultResponse, ClientError>;
}
