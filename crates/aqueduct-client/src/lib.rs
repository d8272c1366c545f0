//! Aqueduct Client
//!
//! Synchronous access to the Aqueduct orchestration server. The SDK talks to
//! the server only through the [`ServerClient`] trait, which
//! [`HttpServerClient`] implements over HTTP with `reqwest`.
//!
//! DAGs are sent as multipart requests: the DAG JSON plus one zip file per
//! operator with packaged user code.

mod client;
mod config;
mod error;
mod http;
mod payload;
mod responses;

pub use client::ServerClient;
pub use config::{ADDRESS_ENV, API_KEY_ENV, ClientConfig, RUNTIME_VERSION_ENV};
pub use error::ClientError;
pub use http::HttpServerClient;
pub use payload::{DagPayload, MAX_LOCAL_DATA_REQUEST_BYTES, dag_payload};
pub use responses::{
  ArtifactResult, ArtifactResultResponse, DeleteWorkflowResponse, ExecError, ExecState,
  ExecutionStatus, GetWorkflowResponse, Logs, OperatorResult, PreviewResponse,
  RegisterAirflowWorkflowResponse, RegisterWorkflowResponse, ResourceInfo, RunId,
  SavedObjectDeletion, SavedObjectSelection, WorkflowDagResultResponse, WorkflowEntry,
  WorkflowRun,
};
