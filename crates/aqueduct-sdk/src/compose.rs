use aqueduct_config::{
  ArtifactId, ArtifactMetadata, ArtifactType, CheckSpec, FunctionSpec, Operator, OperatorKind,
  OperatorSpec,
};
use aqueduct_workflow::naming::{default_artifact_name_from_op, new_id, sanitize_artifact_name};
use aqueduct_workflow::{AddOrReplaceOperatorDelta, DagDelta};
use tracing::debug;

use crate::artifact::{Artifact, ArtifactHandle, BaseArtifact};
use crate::context::WorkflowBuilder;
use crate::error::SdkError;
use crate::operator::{Arg, ExecutionMode, FunctionKind, OperatorFn, Outputs};

impl WorkflowBuilder {
  /// Call an operator on artifacts and literals.
  ///
  /// Literals become implicit parameters named `"<operator>:<parameter>"`.
  /// The new operator replaces any operator of the same name along with its
  /// downstream. Unless the call is lazy, the outputs are previewed and
  /// their values cached on the returned handles.
  pub fn call(&self, op: &OperatorFn, args: Vec<Arg>) -> Result<Vec<Artifact>, SdkError> {
    let op_name = op.op_name().to_string();
    if args.len() != op.params.len() {
      return Err(SdkError::user_argument(format!(
        "`{}` takes {} arguments but {} were given",
        op_name,
        op.params.len(),
        args.len()
      )));
    }
    if op.outputs.len() == 0 {
      return Err(SdkError::user_argument(format!(
        "`{}` must produce at least one output",
        op_name
      )));
    }
    if !matches!(op.kind, FunctionKind::Function) && op.outputs.len() != 1 {
      return Err(SdkError::user_argument(format!(
        "metric and check `{}` must produce exactly one output",
        op_name
      )));
    }

    let mut inputs: Vec<ArtifactId> = Vec::with_capacity(args.len());
    let mut param_deltas: Vec<Box<dyn DagDelta>> = Vec::new();
    for (arg, param) in args.iter().zip(op.params.iter()) {
      match arg {
        Arg::Artifact(artifact) => {
          artifact.handle().ensure_in_session(self)?;
          self.check_input_kind(op, artifact.id())?;
          inputs.push(artifact.id());
        }
        Arg::Value(value) => {
          let (delta, id) = self.implicit_param(&op_name, param, value)?;
          param_deltas.push(delta);
          inputs.push(id);
        }
      }
    }

    let outputs = output_artifacts(op, &op_name)?;
    let function = FunctionSpec {
      entry_point: op.source.entry_point.clone(),
      builtin: false,
      args: Default::default(),
      requirements: op.source.requirements.clone(),
      package: self.inner.packager.package(&op.source)?,
    };
    let spec = match op.kind {
      FunctionKind::Function => OperatorSpec::Function(function),
      FunctionKind::Metric => OperatorSpec::Metric(function),
      FunctionKind::Check { severity } => OperatorSpec::Check(CheckSpec {
        function,
        level: severity,
      }),
    };

    let mut new_op = Operator::new(new_id(), op_name.as_str(), spec);
    new_op.description = op.description.clone();
    new_op.inputs = inputs;
    new_op.outputs = outputs.iter().map(|a| a.id).collect();
    new_op.resources = op.resources.clone();
    new_op.engine_override = match &op.engine {
      Some(engine) => Some(self.resolve_engine(engine)?),
      None => None,
    };

    let output_ids: Vec<ArtifactId> = new_op.outputs.clone();
    let add = AddOrReplaceOperatorDelta::new(new_op, outputs);
    // Replacing implicit params clears their downstream, which may include the
    // operator being replaced, so the replacement is checked against the DAG
    // as it was before the call.
    add.replaced_operators(&self.borrow_dag())?;
    let mut deltas: Vec<&dyn DagDelta> = param_deltas.iter().map(|d| d.as_ref()).collect();
    deltas.push(&add);

    debug!(operator = %op_name, inputs = args.len(), "adding operator");
    self.add_and_preview(&deltas, &output_ids, op.mode)
  }

  /// Like [`call`](Self::call) for operators with exactly one output.
  pub fn call_single(&self, op: &OperatorFn, args: Vec<Arg>) -> Result<Artifact, SdkError> {
    if op.outputs.len() != 1 {
      return Err(SdkError::user_argument(format!(
        "`{}` produces {} outputs; use `call`",
        op.op_name(),
        op.outputs.len()
      )));
    }
    let mut artifacts = self.call(op, args)?;
    artifacts
      .pop()
      .ok_or_else(|| SdkError::internal("operator call produced no artifact"))
  }

  /// Attach a built-in metric or check to an artifact.
  pub(crate) fn add_builtin(
    &self,
    op_name: String,
    spec: OperatorSpec,
    input: ArtifactId,
    output_type: ArtifactType,
  ) -> Result<Artifact, SdkError> {
    let output = ArtifactMetadata::new(new_id(), default_artifact_name_from_op(&op_name), output_type);
    let output_id = output.id;
    let mut op = Operator::new(new_id(), op_name, spec);
    op.inputs.push(input);
    op.outputs.push(output_id);

    let add = AddOrReplaceOperatorDelta::new(op, vec![output]);
    let mut artifacts = self.add_and_preview(&[&add], &[output_id], ExecutionMode::Eager)?;
    artifacts
      .pop()
      .ok_or_else(|| SdkError::internal("built-in operator produced no artifact"))
  }

  /// Apply deltas, then preview the outputs unless lazy. A failed preview
  /// rolls the session DAG back.
  pub(crate) fn add_and_preview(
    &self,
    deltas: &[&dyn DagDelta],
    output_ids: &[ArtifactId],
    mode: ExecutionMode,
  ) -> Result<Vec<Artifact>, SdkError> {
    let before = self.dag();
    self.apply(deltas)?;

    let handles = output_ids
      .iter()
      .map(|id| ArtifactHandle::session(self, *id))
      .collect::<Result<Vec<_>, _>>()?;

    if self.is_eager(mode) {
      let values = match self.preview_artifacts(output_ids, None) {
        Ok(values) => values,
        Err(e) => {
          self.restore(before);
          return Err(e);
        }
      };
      for handle in &handles {
        if let Some(value) = values.get(&handle.id()) {
          self.record_value_type(handle.id(), value)?;
          handle.set_cached(value.clone());
        }
      }
    }

    handles.into_iter().map(Artifact::refresh).collect()
  }

  /// Functions and metrics cannot consume the output of a check.
  fn check_input_kind(&self, op: &OperatorFn, input: ArtifactId) -> Result<(), SdkError> {
    if matches!(op.kind, FunctionKind::Check { .. }) {
      return Ok(());
    }
    let dag = self.borrow_dag();
    let producer = dag.must_get_operator_by_output(input)?;
    if producer.kind() == OperatorKind::Check {
      return Err(SdkError::user_action(format!(
        "`{}` cannot take the output of check `{}` as input",
        op.op_name(),
        producer.name
      )));
    }
    Ok(())
  }
}

fn output_artifacts(op: &OperatorFn, op_name: &str) -> Result<Vec<ArtifactMetadata>, SdkError> {
  let artifact_type = match op.kind {
    FunctionKind::Function => ArtifactType::Untyped,
    FunctionKind::Metric => ArtifactType::Numeric,
    FunctionKind::Check { .. } => ArtifactType::Bool,
  };
  match &op.outputs {
    Outputs::Named(names) => names
      .iter()
      .map(|name| -> Result<ArtifactMetadata, SdkError> {
        Ok(
          ArtifactMetadata::new(new_id(), sanitize_artifact_name(name)?, artifact_type)
            .explicitly_named(true),
        )
      })
      .collect(),
    Outputs::Count(n) => Ok(
      (0..*n)
        .map(|_| {
          ArtifactMetadata::new(new_id(), default_artifact_name_from_op(op_name), artifact_type)
        })
        .collect(),
    ),
  }
}
