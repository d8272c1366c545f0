//! Aqueduct Config
//!
//! This crate contains the serializable types that describe an Aqueduct DAG:
//! operators, artifacts, engine configuration and flow metadata. These are the
//! types exchanged with the orchestration server as JSON.
//!
//! The types here carry no behavior beyond small accessors. Graph structure,
//! rewrites and validation live in `aqueduct-workflow`.

mod artifact;
mod engine;
mod flow;
mod operator;
mod service;

pub use artifact::{ArtifactId, ArtifactMetadata, ArtifactType, SerializationType};
pub use engine::{EngineConfig, ResourceRequest};
pub use flow::{FlowMetadata, RetentionPolicy, Schedule, TriggerType};
pub use operator::{
  CheckSeverity, CheckSpec, ExtractParams, ExtractSpec, FunctionSpec, LoadParams, LoadSpec,
  Operator, OperatorId, OperatorKind, OperatorSpec, ParamSpec, S3Format, SystemMetricSpec,
  UpdateMode,
};
pub use service::ServiceType;

/// Identifier of a resource (integration) connected to the server.
pub type ResourceId = uuid::Uuid;

/// Identifier of a published flow.
pub type FlowId = uuid::Uuid;
