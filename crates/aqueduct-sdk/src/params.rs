use aqueduct_config::{ArtifactId, ArtifactMetadata, Operator, OperatorKind, OperatorSpec};
use aqueduct_workflow::naming::{get_unclaimed_op_name, new_id};
use aqueduct_workflow::{AddOrReplaceOperatorDelta, ArtifactValue, DagDelta, param_spec};
use tracing::warn;

use crate::artifact::{Artifact, ArtifactHandle};
use crate::context::WorkflowBuilder;
use crate::error::SdkError;

impl WorkflowBuilder {
  /// Create a named parameter with a default value.
  ///
  /// Re-creating an explicit parameter overwrites it. A name taken by an
  /// implicitly created parameter or by another operator is rejected.
  pub fn create_param(
    &self,
    name: &str,
    default: Option<ArtifactValue>,
    description: &str,
  ) -> Result<Artifact, SdkError> {
    let default = default.ok_or_else(|| {
      SdkError::user_argument(format!("parameter `{}` must have a default value", name))
    })?;
    self.add_explicit_param(name, default, description, false)
  }

  /// Upload a value from this machine as a parameter. Flows using local
  /// data must be published with `use_local`.
  pub fn local_data(&self, name: &str, value: ArtifactValue) -> Result<Artifact, SdkError> {
    self.add_explicit_param(name, value, "", true)
  }

  fn add_explicit_param(
    &self,
    name: &str,
    value: ArtifactValue,
    description: &str,
    from_local_data: bool,
  ) -> Result<Artifact, SdkError> {
    let name = name.trim();
    if name.is_empty() {
      return Err(SdkError::user_argument("parameter name must not be empty"));
    }

    {
      let dag = self.borrow_dag();
      if let Some(existing) = dag.get_operator_by_name(name) {
        if existing.is_implicit_param() {
          return Err(SdkError::user_action(format!(
            "`{}` is an implicitly created parameter of another operator; choose a different name",
            name
          )));
        }
        if existing.kind() != OperatorKind::Param {
          return Err(SdkError::user_action(format!(
            "`{}` is already the name of a {} operator",
            name,
            existing.kind()
          )));
        }
      }
    }

    let (mut op, mut artifact) = param_operator(name, &value, false)?;
    op.description = description.to_string();
    artifact.explicitly_named = true;
    artifact.from_local_data = from_local_data;
    let id = artifact.id;

    self.apply(&[&AddOrReplaceOperatorDelta::new(op, vec![artifact])])?;
    let handle = ArtifactHandle::session(self, id)?;
    handle.set_cached(value);
    Artifact::refresh(handle)
  }

  /// The delta creating the implicit parameter for a literal argument.
  ///
  /// A re-call of the same operator overwrites the parameter it created
  /// last time; any other collision picks a fresh name.
  pub(crate) fn implicit_param(
    &self,
    op_name: &str,
    arg_name: &str,
    value: &ArtifactValue,
  ) -> Result<(Box<dyn DagDelta>, ArtifactId), SdkError> {
    let candidate = format!("{}:{}", op_name, arg_name);
    let name = {
      let dag = self.borrow_dag();
      match dag.get_operator_by_name(&candidate) {
        None => candidate,
        Some(existing) => {
          let recall = existing.is_implicit_param()
            && existing.outputs.iter().any(|output| {
              dag
                .list_operators(None, Some(*output))
                .iter()
                .any(|consumer| consumer.name == op_name)
            });
          if recall {
            candidate
          } else {
            get_unclaimed_op_name(&dag, &candidate)
          }
        }
      }
    };

    warn!(
      parameter = %name,
      operator = %op_name,
      "created an implicit parameter from a literal argument; use create_param to name and reuse it"
    );

    let (op, artifact) = param_operator(&name, value, true)?;
    let id = artifact.id;
    Ok((Box::new(AddOrReplaceOperatorDelta::new(op, vec![artifact])), id))
  }
}

fn param_operator(
  name: &str,
  value: &ArtifactValue,
  implicit: bool,
) -> Result<(Operator, ArtifactMetadata), SdkError> {
  let (spec, artifact_type) = param_spec(value, implicit)?;
  let artifact = ArtifactMetadata::new(new_id(), name, artifact_type);
  let mut op = Operator::new(new_id(), name, OperatorSpec::Param(spec));
  op.outputs.push(artifact.id);
  Ok((op, artifact))
}
