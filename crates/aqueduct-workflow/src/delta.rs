//! Typed, atomic rewrites of a [`Dag`].
//!
//! [`apply_deltas`] runs a list of deltas against a scratch copy and only
//! commits when every delta succeeded, so a failed rewrite never leaves a
//! partially modified DAG behind.

use std::collections::{BTreeMap, HashSet, VecDeque};

use aqueduct_config::{
  ArtifactId, ArtifactMetadata, ArtifactType, Operator, OperatorId, OperatorKind, OperatorSpec,
};

use crate::dag::Dag;
use crate::error::WorkflowError;
use crate::serialize::param_spec;
use crate::value::ArtifactValue;

/// A rewrite of the DAG.
pub trait DagDelta {
  fn apply(&self, dag: &mut Dag) -> Result<(), WorkflowError>;
}

/// Apply deltas in order. On error the DAG is left untouched.
pub fn apply_deltas(dag: &mut Dag, deltas: &[&dyn DagDelta]) -> Result<(), WorkflowError> {
  let mut scratch = dag.clone();
  for delta in deltas {
    delta.apply(&mut scratch)?;
  }
  *dag = scratch;
  Ok(())
}

/// Apply deltas to a deep copy, leaving the original untouched.
pub fn apply_deltas_to_copy(dag: &Dag, deltas: &[&dyn DagDelta]) -> Result<Dag, WorkflowError> {
  let mut copy = dag.clone();
  apply_deltas(&mut copy, deltas)?;
  Ok(copy)
}

/// Finds the operator a new operator would replace.
pub type CollisionFn = fn(&Dag, &Operator) -> Option<OperatorId>;

/// An existing operator with the same name.
pub fn collide_by_name(dag: &Dag, op: &Operator) -> Option<OperatorId> {
  dag.get_operator_by_name(&op.name).map(|existing| existing.id)
}

/// An existing load of the same artifact into the same resource.
pub fn collide_by_load_target(dag: &Dag, op: &Operator) -> Option<OperatorId> {
  let OperatorSpec::Load(spec) = &op.spec else {
    return None;
  };
  let saved = op.inputs.last()?;
  dag
    .operators()
    .find(|existing| match &existing.spec {
      OperatorSpec::Load(existing_spec) => {
        existing_spec.resource_id == spec.resource_id && existing.inputs.last() == Some(saved)
      }
      _ => false,
    })
    .map(|existing| existing.id)
}

/// Append an operator and its output artifacts.
pub struct AddOperatorDelta {
  op: Operator,
  outputs: Vec<ArtifactMetadata>,
}

impl AddOperatorDelta {
  pub fn new(op: Operator, outputs: Vec<ArtifactMetadata>) -> Self {
    Self { op, outputs }
  }
}

impl DagDelta for AddOperatorDelta {
  fn apply(&self, dag: &mut Dag) -> Result<(), WorkflowError> {
    insert_operator(dag, &self.op, &self.outputs)
  }
}

fn insert_operator(
  dag: &mut Dag,
  op: &Operator,
  outputs: &[ArtifactMetadata],
) -> Result<(), WorkflowError> {
  if dag.get_operator(op.id).is_some() {
    return Err(WorkflowError::internal(format!(
      "operator id {} is already in the DAG",
      op.id
    )));
  }
  let declared: HashSet<ArtifactId> = op.outputs.iter().copied().collect();
  let supplied: HashSet<ArtifactId> = outputs.iter().map(|a| a.id).collect();
  if declared != supplied || op.outputs.len() != outputs.len() {
    return Err(WorkflowError::internal(format!(
      "operator `{}` outputs do not match the supplied artifacts",
      op.name
    )));
  }
  for output in outputs {
    if dag.get_artifact(output.id).is_some() {
      return Err(WorkflowError::internal(format!(
        "artifact id {} is already in the DAG",
        output.id
      )));
    }
  }
  for input in &op.inputs {
    dag.must_get_artifact(*input)?;
  }

  dag.add_artifacts(outputs.iter().cloned());
  dag.add_operator(op.clone());
  Ok(())
}

/// Add an operator, first removing the operator it collides with and
/// everything downstream of that operator.
pub struct AddOrReplaceOperatorDelta {
  op: Operator,
  outputs: Vec<ArtifactMetadata>,
  collision: CollisionFn,
}

impl AddOrReplaceOperatorDelta {
  /// Collides by operator name.
  pub fn new(op: Operator, outputs: Vec<ArtifactMetadata>) -> Self {
    Self::with_collision(op, outputs, collide_by_name)
  }

  /// Collides with an earlier load of the same artifact into the same resource.
  pub fn for_load(op: Operator) -> Self {
    Self::with_collision(op, Vec::new(), collide_by_load_target)
  }

  pub fn with_collision(op: Operator, outputs: Vec<ArtifactMetadata>, collision: CollisionFn) -> Self {
    Self {
      op,
      outputs,
      collision,
    }
  }
}

impl AddOrReplaceOperatorDelta {
  /// The operators this delta would remove from `dag`: the colliding
  /// operator and its downstream. Fails if the collision is not replaceable.
  pub fn replaced_operators(&self, dag: &Dag) -> Result<Vec<OperatorId>, WorkflowError> {
    let Some(colliding_id) = (self.collision)(dag, &self.op) else {
      return Ok(Vec::new());
    };
    let colliding = dag.must_get_operator(colliding_id)?;
    if colliding.kind() != self.op.kind() {
      return Err(WorkflowError::user_action(format!(
        "cannot replace {} `{}` with a {} of the same name",
        colliding.kind(),
        colliding.name,
        self.op.kind()
      )));
    }

    let downstream = dag.list_downstream(colliding_id);
    let mut produced: HashSet<ArtifactId> = HashSet::new();
    for id in &downstream {
      produced.extend(dag.must_get_operator(*id)?.outputs.iter().copied());
    }
    if self.op.inputs.iter().any(|input| produced.contains(input)) {
      return Err(WorkflowError::user_action(format!(
        "cannot replace `{}`: the new operator depends on its output. Give the new operator a different name.",
        colliding.name
      )));
    }
    Ok(downstream)
  }
}

impl DagDelta for AddOrReplaceOperatorDelta {
  fn apply(&self, dag: &mut Dag) -> Result<(), WorkflowError> {
    let replaced = self.replaced_operators(dag)?;
    dag.remove_operators(&replaced)?;
    insert_operator(dag, &self.op, &self.outputs)
  }
}

/// Remove an operator and its entire downstream.
pub struct RemoveOperatorDelta {
  op_id: OperatorId,
}

impl RemoveOperatorDelta {
  pub fn new(op_id: OperatorId) -> Self {
    Self { op_id }
  }
}

impl DagDelta for RemoveOperatorDelta {
  fn apply(&self, dag: &mut Dag) -> Result<(), WorkflowError> {
    dag.must_get_operator(self.op_id)?;
    let downstream = dag.list_downstream(self.op_id);
    dag.remove_operators(&downstream)
  }
}

/// Remove a check, by name, from the artifact it is attached to.
pub struct RemoveCheckOperatorDelta {
  artifact_id: ArtifactId,
  check_name: String,
}

impl RemoveCheckOperatorDelta {
  pub fn new(artifact_id: ArtifactId, check_name: impl Into<String>) -> Self {
    Self {
      artifact_id,
      check_name: check_name.into(),
    }
  }
}

impl DagDelta for RemoveCheckOperatorDelta {
  fn apply(&self, dag: &mut Dag) -> Result<(), WorkflowError> {
    let check_id = dag
      .list_operators(Some(&[OperatorKind::Check]), Some(self.artifact_id))
      .into_iter()
      .find(|op| op.name == self.check_name)
      .map(|op| op.id)
      .ok_or_else(|| {
        WorkflowError::user_action(format!("No check with name {}", self.check_name))
      })?;
    let downstream = dag.list_downstream(check_id);
    dag.remove_operators(&downstream)
  }
}

/// Give an artifact a user-chosen name. Uniqueness is checked at publish.
pub struct RenameArtifactDelta {
  artifact_id: ArtifactId,
  name: String,
}

impl RenameArtifactDelta {
  pub fn new(artifact_id: ArtifactId, name: impl Into<String>) -> Self {
    Self {
      artifact_id,
      name: name.into(),
    }
  }
}

impl DagDelta for RenameArtifactDelta {
  fn apply(&self, dag: &mut Dag) -> Result<(), WorkflowError> {
    dag.rename_artifact(self.artifact_id, self.name.clone(), true)
  }
}

/// Record the type of an artifact once its value is known.
pub struct UpdateArtifactTypeDelta {
  artifact_id: ArtifactId,
  artifact_type: ArtifactType,
}

impl UpdateArtifactTypeDelta {
  pub fn new(artifact_id: ArtifactId, artifact_type: ArtifactType) -> Self {
    Self {
      artifact_id,
      artifact_type,
    }
  }
}

impl DagDelta for UpdateArtifactTypeDelta {
  fn apply(&self, dag: &mut Dag) -> Result<(), WorkflowError> {
    dag.update_artifact_type(self.artifact_id, self.artifact_type)
  }
}

/// Prune the DAG to the upstream closure of the given artifacts.
///
/// Metrics (including system metrics), checks and saves attached to any
/// retained artifact are kept when the corresponding flag is set, together
/// with whatever they depend on.
pub struct SubgraphDagDelta {
  pub artifact_ids: Vec<ArtifactId>,
  pub include_saves: bool,
  pub include_metrics: bool,
  pub include_checks: bool,
}

impl SubgraphDagDelta {
  /// Only the artifacts and their dependencies.
  pub fn new(artifact_ids: Vec<ArtifactId>) -> Self {
    Self {
      artifact_ids,
      include_saves: false,
      include_metrics: false,
      include_checks: false,
    }
  }
}

impl DagDelta for SubgraphDagDelta {
  fn apply(&self, dag: &mut Dag) -> Result<(), WorkflowError> {
    for id in &self.artifact_ids {
      dag.must_get_artifact(*id)?;
    }

    let mut keep_ops: HashSet<OperatorId> = HashSet::new();
    let mut keep_artifacts: HashSet<ArtifactId> = HashSet::new();
    let mut queue: VecDeque<ArtifactId> = self.artifact_ids.iter().copied().collect();

    while let Some(artifact_id) = queue.pop_front() {
      if !keep_artifacts.insert(artifact_id) {
        continue;
      }

      let producer = dag.must_get_operator_by_output(artifact_id)?;
      if keep_ops.insert(producer.id) {
        queue.extend(producer.inputs.iter().chain(producer.outputs.iter()).copied());
      }

      for consumer in dag.list_operators(None, Some(artifact_id)) {
        let attach = match consumer.kind() {
          OperatorKind::Metric | OperatorKind::SystemMetric => self.include_metrics,
          OperatorKind::Check => self.include_checks,
          OperatorKind::Load => {
            self.include_saves && consumer.inputs.last() == Some(&artifact_id)
          }
          _ => false,
        };
        if attach && keep_ops.insert(consumer.id) {
          queue.extend(consumer.inputs.iter().chain(consumer.outputs.iter()).copied());
        }
      }
    }

    let pruned: Vec<OperatorId> = dag
      .operators()
      .filter(|op| !keep_ops.contains(&op.id))
      .map(|op| op.id)
      .collect();
    dag.remove_operators(&pruned)
  }
}

/// Overwrite the values of parameter operators, by name.
pub struct UpdateParametersDelta {
  parameters: BTreeMap<String, ArtifactValue>,
}

impl UpdateParametersDelta {
  pub fn new(parameters: impl IntoIterator<Item = (String, ArtifactValue)>) -> Self {
    Self {
      parameters: parameters.into_iter().collect(),
    }
  }
}

impl DagDelta for UpdateParametersDelta {
  fn apply(&self, dag: &mut Dag) -> Result<(), WorkflowError> {
    for (name, value) in &self.parameters {
      let op = dag.get_operator_by_name(name).ok_or_else(|| {
        WorkflowError::user_argument(format!("no parameter named `{}` exists", name))
      })?;
      let OperatorSpec::Param(current) = &op.spec else {
        return Err(WorkflowError::user_argument(format!(
          "`{}` is a {}, not a parameter",
          name,
          op.kind()
        )));
      };
      let op_id = op.id;
      let implicitly_created = current.implicitly_created;
      let output = *op.outputs.first().ok_or_else(|| {
        WorkflowError::internal(format!("parameter `{}` has no output", name))
      })?;

      let feeds_extract = !dag
        .list_operators(Some(&[OperatorKind::Extract]), Some(output))
        .is_empty();
      if feeds_extract && value.as_str().is_none() {
        return Err(WorkflowError::user_argument(format!(
          "parameter `{}` is used in an extract query and must be a string, got a {} value",
          name,
          value.artifact_type()
        )));
      }

      let (spec, artifact_type) = param_spec(value, implicitly_created)?;
      dag.update_operator_spec(op_id, OperatorSpec::Param(spec))?;
      dag.update_artifact_type(output, artifact_type)?;
    }
    Ok(())
  }
}
