//! Aqueduct Workflow
//!
//! The in-memory DAG engine behind the Aqueduct SDK. A [`Dag`] is an indexed
//! store of operators and artifacts; it only changes through [`delta`]s, each
//! of which is applied transactionally.
//!
//! Besides the container this crate provides:
//! - the naming service (ids, artifact name sanitizing and suffixing)
//! - publish-time artifact name resolution
//! - engine resource validation
//! - artifact values and their wire serialization
//! - query placeholder parsing for parameterized extracts and loads

mod dag;
pub mod delta;
mod error;
mod graph;
pub mod naming;
mod resolution;
mod serialize;
mod template;
mod validation;
mod value;

pub use dag::Dag;
pub use delta::{
  AddOperatorDelta, AddOrReplaceOperatorDelta, CollisionFn, DagDelta, RemoveCheckOperatorDelta,
  RemoveOperatorDelta, RenameArtifactDelta, SubgraphDagDelta, UpdateArtifactTypeDelta,
  UpdateParametersDelta, apply_deltas, apply_deltas_to_copy, collide_by_load_target,
  collide_by_name,
};
pub use error::WorkflowError;
pub use graph::Graph;
pub use resolution::resolve_artifact_names;
pub use serialize::{
  DefaultValueCodec, SerializedValue, ValueCodec, decode_param_spec, deserialize_value,
  param_spec, serialize_value,
};
pub use template::{BUILTIN_PLACEHOLDERS, placeholders, render_query};
pub use validation::{LAMBDA_MAX_MEMORY_MB, LAMBDA_MIN_MEMORY_MB, validate_engine_resources};
pub use value::{ArtifactValue, Table};
