//! The DAG container.
//!
//! Operators and artifacts are stored in two insertion-ordered maps keyed by
//! UUID, plus a denormalized name index. Every write keeps the index coherent.
//! Writes are only performed by the delta engine; see [`crate::delta`].

use std::collections::{HashMap, HashSet};

use aqueduct_config::{
  ArtifactId, ArtifactMetadata, ArtifactType, EngineConfig, FlowMetadata, Operator, OperatorId,
  OperatorKind, OperatorSpec,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;
use crate::graph::Graph;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "DagParts")]
pub struct Dag {
  operators: IndexMap<OperatorId, Operator>,
  artifacts: IndexMap<ArtifactId, ArtifactMetadata>,
  /// Operator ids by name, oldest first. Names are not unique.
  #[serde(skip)]
  operator_by_name: HashMap<String, Vec<OperatorId>>,
  #[serde(default)]
  pub metadata: FlowMetadata,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub engine_config: Option<EngineConfig>,
}

/// Wire form of a [`Dag`]; the name index is rebuilt on load.
#[derive(Deserialize)]
struct DagParts {
  #[serde(default)]
  operators: IndexMap<OperatorId, Operator>,
  #[serde(default)]
  artifacts: IndexMap<ArtifactId, ArtifactMetadata>,
  #[serde(default)]
  metadata: FlowMetadata,
  #[serde(default)]
  engine_config: Option<EngineConfig>,
}

impl From<DagParts> for Dag {
  fn from(parts: DagParts) -> Self {
    let mut dag = Dag {
      operators: parts.operators,
      artifacts: parts.artifacts,
      operator_by_name: HashMap::new(),
      metadata: parts.metadata,
      engine_config: parts.engine_config,
    };
    dag.rebuild_name_index();
    dag
  }
}

impl Dag {
  pub fn new() -> Self {
    Self::default()
  }

  // ---------------------------------------------------------------------------
  // Reads
  // ---------------------------------------------------------------------------

  pub fn operators(&self) -> impl Iterator<Item = &Operator> {
    self.operators.values()
  }

  pub fn artifacts(&self) -> impl Iterator<Item = &ArtifactMetadata> {
    self.artifacts.values()
  }

  pub fn num_operators(&self) -> usize {
    self.operators.len()
  }

  pub fn num_artifacts(&self) -> usize {
    self.artifacts.len()
  }

  pub fn get_operator(&self, id: OperatorId) -> Option<&Operator> {
    self.operators.get(&id)
  }

  pub fn must_get_operator(&self, id: OperatorId) -> Result<&Operator, WorkflowError> {
    self
      .operators
      .get(&id)
      .ok_or(WorkflowError::OperatorNotFound(id))
  }

  /// The most recently added operator with this name.
  pub fn get_operator_by_name(&self, name: &str) -> Option<&Operator> {
    self
      .operator_by_name
      .get(name)
      .and_then(|ids| ids.last())
      .and_then(|id| self.operators.get(id))
  }

  /// All operators sharing a name, oldest first.
  pub fn operators_named(&self, name: &str) -> Vec<&Operator> {
    self
      .operator_by_name
      .get(name)
      .map(|ids| ids.iter().filter_map(|id| self.operators.get(id)).collect())
      .unwrap_or_default()
  }

  /// The operator that produces the given artifact.
  pub fn get_operator_by_output(&self, artifact_id: ArtifactId) -> Option<&Operator> {
    self
      .operators
      .values()
      .find(|op| op.outputs.contains(&artifact_id))
  }

  pub fn must_get_operator_by_output(
    &self,
    artifact_id: ArtifactId,
  ) -> Result<&Operator, WorkflowError> {
    self.get_operator_by_output(artifact_id).ok_or_else(|| {
      WorkflowError::internal(format!("artifact {} has no producing operator", artifact_id))
    })
  }

  pub fn get_artifact(&self, id: ArtifactId) -> Option<&ArtifactMetadata> {
    self.artifacts.get(&id)
  }

  pub fn must_get_artifact(&self, id: ArtifactId) -> Result<&ArtifactMetadata, WorkflowError> {
    self
      .artifacts
      .get(&id)
      .ok_or(WorkflowError::ArtifactNotFound(id))
  }

  pub fn get_artifact_by_name(&self, name: &str) -> Option<&ArtifactMetadata> {
    self.artifacts.values().find(|a| a.name == name)
  }

  /// Artifacts in insertion order, optionally restricted to the given ids.
  pub fn list_artifacts(&self, filter_to: Option<&[ArtifactId]>) -> Vec<&ArtifactMetadata> {
    self
      .artifacts
      .values()
      .filter(|a| filter_to.is_none_or(|ids| ids.contains(&a.id)))
      .collect()
  }

  /// Operators matching every supplied filter.
  ///
  /// `on_artifact_id` matches operators that consume the artifact.
  pub fn list_operators(
    &self,
    filter_kinds: Option<&[OperatorKind]>,
    on_artifact_id: Option<ArtifactId>,
  ) -> Vec<&Operator> {
    self
      .operators
      .values()
      .filter(|op| filter_kinds.is_none_or(|kinds| kinds.contains(&op.kind())))
      .filter(|op| on_artifact_id.is_none_or(|id| op.inputs.contains(&id)))
      .collect()
  }

  /// Metric operators attached to any output of the given operator.
  pub fn list_metrics_for_operator(&self, op_id: OperatorId) -> Vec<&Operator> {
    self.list_attached(op_id, OperatorKind::Metric)
  }

  /// Check operators attached to any output of the given operator.
  pub fn list_checks_for_operator(&self, op_id: OperatorId) -> Vec<&Operator> {
    self.list_attached(op_id, OperatorKind::Check)
  }

  fn list_attached(&self, op_id: OperatorId, kind: OperatorKind) -> Vec<&Operator> {
    let Some(op) = self.operators.get(&op_id) else {
      return Vec::new();
    };
    self
      .operators
      .values()
      .filter(|candidate| candidate.kind() == kind)
      .filter(|candidate| candidate.inputs.iter().any(|i| op.outputs.contains(i)))
      .collect()
  }

  /// Every operator downstream of `op_id`, inclusive, in BFS order.
  pub fn list_downstream(&self, op_id: OperatorId) -> Vec<OperatorId> {
    if !self.operators.contains_key(&op_id) {
      return Vec::new();
    }
    Graph::new(self).reachable_from(op_id)
  }

  /// Operators without inputs.
  ///
  /// With `for_outputs`, only roots that the given artifacts transitively
  /// depend on are returned.
  pub fn list_root_operators(&self, for_outputs: Option<&[ArtifactId]>) -> Vec<&Operator> {
    let Some(outputs) = for_outputs else {
      return self
        .operators
        .values()
        .filter(|op| op.inputs.is_empty())
        .collect();
    };

    let graph = Graph::new(self);
    let mut reachable: HashSet<OperatorId> = HashSet::new();
    for artifact_id in outputs {
      if let Some(producer) = self.get_operator_by_output(*artifact_id) {
        reachable.extend(graph.ancestors_of(producer.id));
      }
    }

    self
      .operators
      .values()
      .filter(|op| op.inputs.is_empty() && reachable.contains(&op.id))
      .collect()
  }

  /// All operators breadth-first from the root operators.
  pub fn bfs_operators(&self) -> Vec<&Operator> {
    Graph::new(self)
      .bfs_order()
      .into_iter()
      .filter_map(|id| self.operators.get(&id))
      .collect()
  }

  /// Whether any operator in the DAG already uses this name.
  pub fn is_name_claimed(&self, name: &str) -> bool {
    self.operator_by_name.get(name).is_some_and(|ids| !ids.is_empty())
  }

  // ---------------------------------------------------------------------------
  // Writes
  // ---------------------------------------------------------------------------

  pub fn add_operator(&mut self, op: Operator) {
    self
      .operator_by_name
      .entry(op.name.clone())
      .or_default()
      .push(op.id);
    self.operators.insert(op.id, op);
  }

  pub fn add_artifacts(&mut self, artifacts: impl IntoIterator<Item = ArtifactMetadata>) {
    for artifact in artifacts {
      self.artifacts.insert(artifact.id, artifact);
    }
  }

  /// Remove an operator and the artifacts it produces.
  ///
  /// Consumers of those artifacts are left dangling; callers remove the whole
  /// downstream with [`Dag::list_downstream`] + [`Dag::remove_operators`].
  pub fn remove_operator(
    &mut self,
    id: OperatorId,
    must_be_kind: Option<OperatorKind>,
  ) -> Result<(), WorkflowError> {
    let op = self.must_get_operator(id)?;
    if let Some(kind) = must_be_kind
      && op.kind() != kind
    {
      return Err(WorkflowError::user_action(format!(
        "operator `{}` is a {}, expected a {}",
        op.name,
        op.kind(),
        kind
      )));
    }

    let Some(op) = self.operators.shift_remove(&id) else {
      return Err(WorkflowError::OperatorNotFound(id));
    };
    for output in &op.outputs {
      self.artifacts.shift_remove(output);
    }
    if let Some(ids) = self.operator_by_name.get_mut(&op.name) {
      ids.retain(|existing| *existing != id);
      if ids.is_empty() {
        self.operator_by_name.remove(&op.name);
      }
    }
    Ok(())
  }

  pub fn remove_operators(&mut self, ids: &[OperatorId]) -> Result<(), WorkflowError> {
    for id in ids {
      self.remove_operator(*id, None)?;
    }
    Ok(())
  }

  pub fn update_operator_spec(
    &mut self,
    id: OperatorId,
    spec: OperatorSpec,
  ) -> Result<(), WorkflowError> {
    let op = self
      .operators
      .get_mut(&id)
      .ok_or(WorkflowError::OperatorNotFound(id))?;
    if op.kind() != spec.kind() {
      return Err(WorkflowError::internal(format!(
        "cannot change operator `{}` from {} to {}",
        op.name,
        op.kind(),
        spec.kind()
      )));
    }
    op.spec = spec;
    Ok(())
  }

  pub fn update_artifact_type(
    &mut self,
    id: ArtifactId,
    artifact_type: ArtifactType,
  ) -> Result<(), WorkflowError> {
    let artifact = self
      .artifacts
      .get_mut(&id)
      .ok_or(WorkflowError::ArtifactNotFound(id))?;
    artifact.artifact_type = artifact_type;
    Ok(())
  }

  /// Rename an artifact. Uniqueness is not checked here.
  pub fn rename_artifact(
    &mut self,
    id: ArtifactId,
    name: String,
    explicitly_named: bool,
  ) -> Result<(), WorkflowError> {
    let artifact = self
      .artifacts
      .get_mut(&id)
      .ok_or(WorkflowError::ArtifactNotFound(id))?;
    artifact.name = name;
    artifact.explicitly_named = explicitly_named;
    Ok(())
  }

  /// Recompute the name index from the operator map.
  pub fn rebuild_name_index(&mut self) {
    self.operator_by_name.clear();
    for op in self.operators.values() {
      self
        .operator_by_name
        .entry(op.name.clone())
        .or_default()
        .push(op.id);
    }
  }

  // ---------------------------------------------------------------------------
  // Invariants
  // ---------------------------------------------------------------------------

  /// Verify the structural invariants that must hold after every delta.
  ///
  /// Explicit-name uniqueness is not checked here; it is a publish-time rule.
  pub fn validate(&self) -> Result<(), WorkflowError> {
    let mut producers: HashMap<ArtifactId, usize> = HashMap::new();

    for op in self.operators.values() {
      for id in op.inputs.iter().chain(op.outputs.iter()) {
        if !self.artifacts.contains_key(id) {
          return Err(WorkflowError::internal(format!(
            "operator `{}` references missing artifact {}",
            op.name, id
          )));
        }
      }
      for id in &op.outputs {
        *producers.entry(*id).or_default() += 1;
      }
      check_arity(op)?;
    }

    for artifact in self.artifacts.values() {
      match producers.get(&artifact.id) {
        Some(1) => {}
        Some(n) => {
          return Err(WorkflowError::internal(format!(
            "artifact `{}` has {} producers",
            artifact.name, n
          )));
        }
        None => {
          return Err(WorkflowError::internal(format!(
            "artifact `{}` has no producer",
            artifact.name
          )));
        }
      }
    }

    let indexed: usize = self.operator_by_name.values().map(Vec::len).sum();
    if indexed != self.operators.len() {
      return Err(WorkflowError::internal("operator name index is out of sync"));
    }
    for (name, ids) in &self.operator_by_name {
      for id in ids {
        match self.operators.get(id) {
          Some(op) if &op.name == name => {}
          _ => {
            return Err(WorkflowError::internal(format!(
              "operator name index entry `{}` is stale",
              name
            )));
          }
        }
      }
    }

    let graph = Graph::new(self);
    for op in self.operators.values() {
      if op.kind() != OperatorKind::Check {
        continue;
      }
      for downstream in graph.reachable_from(op.id) {
        let downstream = self.must_get_operator(downstream)?;
        if downstream.kind() != OperatorKind::Check {
          return Err(WorkflowError::user_action(format!(
            "`{}` consumes the output of check `{}`; only checks may follow a check",
            downstream.name, op.name
          )));
        }
      }
    }

    Ok(())
  }
}

fn check_arity(op: &Operator) -> Result<(), WorkflowError> {
  let (inputs, outputs) = (op.inputs.len(), op.outputs.len());
  let ok = match op.kind() {
    OperatorKind::Param => inputs == 0 && outputs == 1,
    OperatorKind::Extract => outputs == 1,
    OperatorKind::Load => inputs >= 1 && outputs == 0,
    OperatorKind::Function | OperatorKind::Metric | OperatorKind::Check => {
      inputs >= 1 && outputs >= 1
    }
    OperatorKind::SystemMetric => inputs == 1 && outputs == 1,
  };
  if ok {
    Ok(())
  } else {
    Err(WorkflowError::internal(format!(
      "{} operator `{}` has {} inputs and {} outputs",
      op.kind(),
      op.name,
      inputs,
      outputs
    )))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_support::{add_check, add_extract, add_function, add_metric, add_param};

  #[test]
  fn test_lookup_by_name_and_output() {
    let mut dag = Dag::new();
    let (extract, table) = add_extract(&mut dag, "demo query");
    let (func, out) = add_function(&mut dag, "clean", &[table]);

    assert_eq!(dag.get_operator_by_name("clean").unwrap().id, func);
    assert_eq!(dag.get_operator_by_output(table).unwrap().id, extract);
    assert_eq!(dag.must_get_artifact(out).unwrap().name, "clean artifact");
    assert!(dag.get_artifact_by_name("demo query artifact").is_some());
    assert!(dag.validate().is_ok());
  }

  #[test]
  fn test_duplicate_names_are_indexed() {
    let mut dag = Dag::new();
    let (first, _) = add_extract(&mut dag, "demo query");
    let (second, _) = add_extract(&mut dag, "demo query");

    assert_eq!(dag.get_operator_by_name("demo query").unwrap().id, second);
    let named: Vec<_> = dag.operators_named("demo query").iter().map(|op| op.id).collect();
    assert_eq!(named, vec![first, second]);

    dag.remove_operator(second, None).unwrap();
    assert_eq!(dag.get_operator_by_name("demo query").unwrap().id, first);
    assert!(dag.validate().is_ok());
  }

  #[test]
  fn test_remove_operator_drops_outputs() {
    let mut dag = Dag::new();
    let (extract, table) = add_extract(&mut dag, "demo query");
    dag.remove_operator(extract, None).unwrap();

    assert!(dag.get_artifact(table).is_none());
    assert!(!dag.is_name_claimed("demo query"));
    assert_eq!(dag.num_operators(), 0);
  }

  #[test]
  fn test_remove_operator_kind_guard() {
    let mut dag = Dag::new();
    let (extract, _) = add_extract(&mut dag, "demo query");
    let err = dag.remove_operator(extract, Some(OperatorKind::Check)).unwrap_err();
    assert!(matches!(err, WorkflowError::UserAction { .. }));
    assert_eq!(dag.num_operators(), 1);
  }

  #[test]
  fn test_list_operators_filters() {
    let mut dag = Dag::new();
    let (_, table) = add_extract(&mut dag, "demo query");
    let (func, out) = add_function(&mut dag, "clean", &[table]);
    let (metric, _) = add_metric(&mut dag, "row count", out);
    let (check, _) = add_check(&mut dag, "no nulls", out);

    let on_out: Vec<_> = dag.list_operators(None, Some(out)).iter().map(|op| op.id).collect();
    assert_eq!(on_out, vec![metric, check]);

    let checks = dag.list_operators(Some(&[OperatorKind::Check]), None);
    assert_eq!(checks.len(), 1);

    assert_eq!(dag.list_metrics_for_operator(func)[0].id, metric);
    assert_eq!(dag.list_checks_for_operator(func)[0].id, check);
  }

  #[test]
  fn test_list_downstream_inclusive() {
    let mut dag = Dag::new();
    let (extract, table) = add_extract(&mut dag, "demo query");
    let (func, out) = add_function(&mut dag, "clean", &[table]);
    let (check, _) = add_check(&mut dag, "no nulls", out);

    assert_eq!(dag.list_downstream(extract), vec![extract, func, check]);
    assert_eq!(dag.list_downstream(check), vec![check]);
  }

  #[test]
  fn test_list_root_operators_for_outputs() {
    let mut dag = Dag::new();
    let (extract, table) = add_extract(&mut dag, "demo query");
    let (param, param_out) = add_param(&mut dag, "threshold", false);
    let (_, out) = add_function(&mut dag, "filter", &[table, param_out]);
    let (other, _) = add_extract(&mut dag, "other query");

    let all: Vec<_> = dag.list_root_operators(None).iter().map(|op| op.id).collect();
    assert_eq!(all, vec![extract, param, other]);

    let for_out: Vec<_> = dag
      .list_root_operators(Some(&[out]))
      .iter()
      .map(|op| op.id)
      .collect();
    assert_eq!(for_out, vec![extract, param]);
  }

  #[test]
  fn test_validate_rejects_function_after_check() {
    let mut dag = Dag::new();
    let (_, table) = add_extract(&mut dag, "demo query");
    let (_, passed) = add_check(&mut dag, "valid", table);
    add_function(&mut dag, "after_check", &[passed]);

    assert!(matches!(
      dag.validate(),
      Err(WorkflowError::UserAction { .. })
    ));
  }

  #[test]
  fn test_json_round_trip_rebuilds_index() {
    let mut dag = Dag::new();
    let (_, table) = add_extract(&mut dag, "demo query");
    add_function(&mut dag, "clean", &[table]);

    let json = serde_json::to_string(&dag).unwrap();
    let back: Dag = serde_json::from_str(&json).unwrap();
    assert_eq!(back, dag);
    assert!(back.get_operator_by_name("clean").is_some());
    assert!(back.validate().is_ok());
  }
}
