//! Aqueduct SDK
//!
//! Build workflows out of ordinary functions and publish them as flows.
//!
//! A [`WorkflowBuilder`] is one authoring session. Calling an [`OperatorFn`]
//! through it adds an operator to the session DAG and returns handles to the
//! operator's output [`Artifact`]s, which can be passed to further calls.
//! Unless a call is lazy, its outputs are previewed on the server right away.
//! [`WorkflowBuilder::publish_flow`] prunes the DAG to the requested
//! artifacts, validates it and registers it as a flow.

mod artifact;
mod compose;
mod context;
mod cron;
mod error;
mod flow;
mod operator;
mod packager;
mod params;
mod preview;
mod publish;
mod resource;

pub use artifact::{
  Artifact, ArtifactHandle, BaseArtifact, BoolArtifact, Bound, GenericArtifact, NumericArtifact,
  TableArtifact,
};
pub use context::{AQUEDUCT_ENGINE, GlobalConfig, SDK_VERSION, SessionOptions, WorkflowBuilder};
pub use cron::validate_cron;
pub use error::{ErrorKind, OperatorFailure, SdkError};
pub use flow::{Flow, FlowRun};
pub use operator::{Arg, ExecutionMode, FunctionKind, OperatorFn};
pub use packager::{FunctionPackager, FunctionSource, REQUIREMENTS_FILE, SourceFile, ZipPackager};
pub use publish::PublishRequest;
pub use resource::{RelationalResource, Resource, S3Resource, SaveConfig};

pub use aqueduct_client::{ClientConfig, ServerClient};
pub use aqueduct_workflow::{ArtifactValue, Table};
