use std::collections::BTreeMap;
use std::time::Duration;

use aqueduct_config::{ArtifactId, FlowId, ParamSpec, ResourceId, ServiceType};
use aqueduct_workflow::Dag;
use reqwest::StatusCode;
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::client::ServerClient;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::payload::{DagPayload, dag_payload};
use crate::responses::{
  ArtifactResultResponse, DeleteWorkflowRequest, DeleteWorkflowResponse, ErrorResponse,
  GetWorkflowResponse, ListTablesResponse, PreviewResponse, RegisterAirflowWorkflowResponse,
  RegisterWorkflowResponse, ResourceInfo, RunId, SavedObjectSelection, VersionResponse,
  WorkflowDagResultResponse, WorkflowEntry,
};

const API_KEY_HEADER: &str = "api-key";
const SDK_VERSION_HEADER: &str = "sdk-client-version";
const RUN_NOW_HEADER: &str = "run-now";
const RESOURCE_NAME_HEADER: &str = "integration-name";
const RESOURCE_SERVICE_HEADER: &str = "integration-service";
const RESOURCE_CONFIG_HEADER: &str = "integration-config";

/// [`ServerClient`] over the server's HTTP API.
pub struct HttpServerClient {
  config: ClientConfig,
  base_url: String,
  client: Client,
}

impl HttpServerClient {
  pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
    config.validate()?;
    let client = Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()?;
    Ok(Self {
      base_url: config.base_url(),
      config,
      client,
    })
  }

  pub fn config(&self) -> &ClientConfig {
    &self.config
  }

  fn url(&self, path: &str) -> String {
    format!("{}/api/{}", self.base_url, path)
  }

  fn get(&self, path: &str) -> RequestBuilder {
    self.authorized(self.client.get(self.url(path)))
  }

  fn post(&self, path: &str) -> RequestBuilder {
    self.authorized(self.client.post(self.url(path)))
  }

  fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
    request
      .header(API_KEY_HEADER, &self.config.api_key)
      .header(SDK_VERSION_HEADER, env!("CARGO_PKG_VERSION"))
  }

  fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
    let response = check_status(request.send()?)?;
    let body = response.text()?;
    Ok(serde_json::from_str(&body)?)
  }

  fn send_empty(&self, request: RequestBuilder) -> Result<(), ClientError> {
    check_status(request.send()?)?;
    Ok(())
  }
}

/// Map a non-success response to an error carrying the server's message.
fn check_status(response: Response) -> Result<Response, ClientError> {
  let status = response.status();
  if status.is_success() {
    return Ok(response);
  }
  let body = response.text().unwrap_or_default();
  Err(status_error(status, &body))
}

fn status_error(status: StatusCode, body: &str) -> ClientError {
  let message = serde_json::from_str::<ErrorResponse>(body)
    .map(|e| e.error)
    .unwrap_or_else(|_| body.to_string());
  if status == StatusCode::NOT_FOUND {
    ClientError::NotFound { message }
  } else if status.is_server_error() {
    ClientError::Server {
      status: status.as_u16(),
      message,
    }
  } else {
    ClientError::Request {
      status: status.as_u16(),
      message,
    }
  }
}

fn dag_form(payload: DagPayload) -> Result<Form, ClientError> {
  let mut form = Form::new().text("dag", payload.dag_json);
  for (op_id, bytes) in payload.files {
    let part = Part::bytes(bytes)
      .file_name(format!("{}.zip", op_id))
      .mime_str("application/zip")?;
    form = form.part(op_id.to_string(), part);
  }
  Ok(form)
}

impl ServerClient for HttpServerClient {
  fn server_version(&self) -> Result<String, ClientError> {
    let response: VersionResponse = self.send(self.get("version"))?;
    Ok(response.version)
  }

  fn list_resources(&self) -> Result<Vec<ResourceInfo>, ClientError> {
    self.send(self.get("integrations"))
  }

  fn list_tables(&self, resource_id: ResourceId) -> Result<Vec<String>, ClientError> {
    let response: ListTablesResponse =
      self.send(self.get(&format!("integration/{}/tables", resource_id)))?;
    Ok(response.table_names)
  }

  fn connect_resource(
    &self,
    name: &str,
    service: ServiceType,
    config: &BTreeMap<String, String>,
  ) -> Result<(), ClientError> {
    let request = self
      .post("integration/connect")
      .header(RESOURCE_NAME_HEADER, name)
      .header(RESOURCE_SERVICE_HEADER, service.to_string())
      .header(RESOURCE_CONFIG_HEADER, serde_json::to_string(config)?);
    self.send_empty(request)
  }

  fn delete_resource(&self, resource_id: ResourceId) -> Result<(), ClientError> {
    self.send_empty(self.post(&format!("integration/{}/delete", resource_id)))
  }

  fn preview(&self, dag: &Dag) -> Result<PreviewResponse, ClientError> {
    let form = dag_form(dag_payload(dag)?)?;
    debug!(operators = dag.num_operators(), "sending preview");
    self.send(self.post("preview").multipart(form))
  }

  fn register_workflow(
    &self,
    dag: &Dag,
    run_now: bool,
  ) -> Result<RegisterWorkflowResponse, ClientError> {
    let form = dag_form(dag_payload(dag)?)?;
    let request = self
      .post("workflow/register")
      .header(RUN_NOW_HEADER, run_now.to_string())
      .multipart(form);
    self.send(request)
  }

  fn register_airflow_workflow(
    &self,
    dag: &Dag,
  ) -> Result<RegisterAirflowWorkflowResponse, ClientError> {
    let form = dag_form(dag_payload(dag)?)?;
    self.send(self.post("workflow/register/airflow").multipart(form))
  }

  fn refresh_workflow(
    &self,
    flow_id: FlowId,
    parameters: &BTreeMap<String, ParamSpec>,
  ) -> Result<(), ClientError> {
    let form = Form::new().text("parameters", serde_json::to_string(parameters)?);
    self.send_empty(
      self
        .post(&format!("workflow/{}/refresh", flow_id))
        .multipart(form),
    )
  }

  fn delete_workflow(
    &self,
    flow_id: FlowId,
    saved_objects: &SavedObjectSelection,
    force: bool,
  ) -> Result<DeleteWorkflowResponse, ClientError> {
    let body = DeleteWorkflowRequest {
      external_delete: saved_objects,
      force,
    };
    self.send(
      self
        .post(&format!("workflow/{}/delete", flow_id))
        .json(&body),
    )
  }

  fn list_workflows(&self) -> Result<Vec<WorkflowEntry>, ClientError> {
    self.send(self.get("workflows"))
  }

  fn get_workflow(&self, flow_id: FlowId) -> Result<GetWorkflowResponse, ClientError> {
    self.send(self.get(&format!("workflow/{}", flow_id)))
  }

  fn get_workflow_dag_result(
    &self,
    flow_id: FlowId,
    run_id: RunId,
  ) -> Result<WorkflowDagResultResponse, ClientError> {
    self.send(self.get(&format!("workflow/{}/result/{}", flow_id, run_id)))
  }

  fn get_artifact_result(
    &self,
    flow_id: FlowId,
    run_id: RunId,
    artifact_id: ArtifactId,
  ) -> Result<ArtifactResultResponse, ClientError> {
    self.send(self.get(&format!(
      "workflow/{}/result/{}/artifact/{}",
      flow_id, run_id, artifact_id
    )))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_status_error_uses_server_message() {
    let err = status_error(StatusCode::BAD_REQUEST, r#"{"error": "bad cron"}"#);
    match err {
      ClientError::Request { status, message } => {
        assert_eq!(status, 400);
        assert_eq!(message, "bad cron");
      }
      other => panic!("unexpected error: {:?}", other),
    }
  }

  #[test]
  fn test_status_error_kinds() {
    assert!(matches!(
      status_error(StatusCode::NOT_FOUND, "no such flow"),
      ClientError::NotFound { ref message } if message == "no such flow"
    ));
    assert!(status_error(StatusCode::INTERNAL_SERVER_ERROR, "").is_server_error());
  }

  #[test]
  fn test_urls() {
    let client = HttpServerClient::new(ClientConfig::new("localhost:8080/", "key")).unwrap();
    assert_eq!(client.url("workflows"), "http://localhost:8080/api/workflows");
  }

  #[test]
  fn test_new_rejects_invalid_config() {
    assert!(HttpServerClient::new(ClientConfig::new("", "key")).is_err());
  }
}
