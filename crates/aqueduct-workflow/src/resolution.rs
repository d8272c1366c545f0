//! Publish-time artifact name resolution.

use std::collections::{HashMap, HashSet};

use aqueduct_config::{ArtifactId, OperatorKind};
use tracing::debug;

use crate::dag::Dag;
use crate::error::WorkflowError;
use crate::naming::bump_artifact_suffix;

/// Priority of an implicitly named artifact when two share a name.
fn producer_rank(kind: Option<OperatorKind>) -> u8 {
  match kind {
    Some(OperatorKind::Extract) => 0,
    Some(OperatorKind::Function) => 1,
    Some(OperatorKind::Metric) => 2,
    Some(OperatorKind::SystemMetric) => 3,
    Some(OperatorKind::Check) => 4,
    Some(OperatorKind::Param) => 5,
    Some(OperatorKind::Load) | None => 6,
  }
}

/// Make every artifact name in the DAG unique.
///
/// At most one artifact per name may be explicitly named; it keeps the name.
/// Otherwise the highest-priority implicit artifact keeps it and the rest
/// are suffixed with `bump_artifact_suffix` until globally unique.
pub fn resolve_artifact_names(dag: &mut Dag) -> Result<(), WorkflowError> {
  let mut groups: Vec<(String, Vec<ArtifactId>)> = Vec::new();
  let mut group_of: HashMap<String, usize> = HashMap::new();
  for artifact in dag.artifacts() {
    match group_of.get(&artifact.name) {
      Some(index) => groups[*index].1.push(artifact.id),
      None => {
        group_of.insert(artifact.name.clone(), groups.len());
        groups.push((artifact.name.clone(), vec![artifact.id]));
      }
    }
  }

  let mut taken: HashSet<String> = dag.artifacts().map(|a| a.name.clone()).collect();
  let mut renames: Vec<(ArtifactId, String)> = Vec::new();

  for (name, members) in groups.into_iter().filter(|(_, members)| members.len() > 1) {
    let mut explicit = Vec::new();
    let mut implicit = Vec::new();
    for id in members {
      let artifact = dag.must_get_artifact(id)?;
      if artifact.explicitly_named {
        explicit.push(id);
      } else {
        let kind = dag.get_operator_by_output(id).map(|op| op.kind());
        implicit.push((producer_rank(kind), id));
      }
    }

    if explicit.len() > 1 {
      let producers: Vec<String> = explicit
        .iter()
        .filter_map(|id| dag.get_operator_by_output(*id))
        .map(|op| format!("`{}`", op.name))
        .collect();
      return Err(WorkflowError::user_action(format!(
        "multiple artifacts explicitly named {} (produced by {})",
        name,
        producers.join(", ")
      )));
    }

    // Stable, so equal ranks keep insertion order.
    implicit.sort_by_key(|(rank, _)| *rank);
    let keeps_name = if explicit.is_empty() { 1 } else { 0 };
    for (_, id) in implicit.into_iter().skip(keeps_name) {
      let mut candidate = bump_artifact_suffix(&name);
      while taken.contains(&candidate) {
        candidate = bump_artifact_suffix(&candidate);
      }
      debug!(from = %name, to = %candidate, "renaming artifact");
      taken.insert(candidate.clone());
      renames.push((id, candidate));
    }
  }

  for (id, name) in renames {
    dag.rename_artifact(id, name, false)?;
  }
  dag.rebuild_name_index();
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use aqueduct_config::ArtifactType;

  use crate::test_support::{add_extract, add_function, add_metric, add_param};

  fn names(dag: &Dag) -> Vec<String> {
    let mut names: Vec<String> = dag.artifacts().map(|a| a.name.clone()).collect();
    names.sort();
    names
  }

  #[test]
  fn test_implicit_duplicates_are_suffixed() {
    let mut dag = Dag::new();
    let (_, first) = add_extract(&mut dag, "demo query");
    let (_, second) = add_extract(&mut dag, "demo query");

    resolve_artifact_names(&mut dag).unwrap();
    assert_eq!(dag.must_get_artifact(first).unwrap().name, "demo query artifact");
    assert_eq!(
      dag.must_get_artifact(second).unwrap().name,
      "demo query artifact (1)"
    );
  }

  #[test]
  fn test_suffix_skips_names_in_use() {
    let mut dag = Dag::new();
    add_extract(&mut dag, "demo query");
    add_extract(&mut dag, "demo query");
    add_extract(&mut dag, "demo query");
    // Already named like a bumped artifact.
    let (_, taken) = add_function(&mut dag, "other", &[]);
    dag
      .rename_artifact(taken, "demo query artifact (1)".to_string(), false)
      .unwrap();

    resolve_artifact_names(&mut dag).unwrap();
    assert_eq!(
      names(&dag),
      vec![
        "demo query artifact",
        "demo query artifact (1)",
        "demo query artifact (2)",
        "demo query artifact (3)",
      ]
    );
  }

  #[test]
  fn test_suffix_beyond_u64_is_bumped() {
    let mut dag = Dag::new();
    let (_, first) = add_extract(&mut dag, "demo query");
    let (_, second) = add_extract(&mut dag, "demo query");
    for id in [first, second] {
      dag
        .rename_artifact(id, "big (18446744073709551615)".to_string(), false)
        .unwrap();
    }

    resolve_artifact_names(&mut dag).unwrap();
    assert_eq!(
      dag.must_get_artifact(first).unwrap().name,
      "big (18446744073709551615)"
    );
    assert_eq!(
      dag.must_get_artifact(second).unwrap().name,
      "big (18446744073709551616)"
    );
  }

  #[test]
  fn test_explicit_name_wins() {
    let mut dag = Dag::new();
    let (_, table) = add_extract(&mut dag, "demo query");
    let (_, implicit) = add_function(&mut dag, "clean", &[table]);
    let (_, explicit) = add_function(&mut dag, "predict", &[implicit]);
    dag
      .rename_artifact(explicit, "clean artifact".to_string(), true)
      .unwrap();

    resolve_artifact_names(&mut dag).unwrap();
    assert_eq!(dag.must_get_artifact(explicit).unwrap().name, "clean artifact");
    assert_eq!(
      dag.must_get_artifact(implicit).unwrap().name,
      "clean artifact (1)"
    );
    assert!(dag.must_get_artifact(explicit).unwrap().explicitly_named);
  }

  #[test]
  fn test_multiple_explicit_names_fail() {
    let mut dag = Dag::new();
    let (_, table) = add_extract(&mut dag, "demo query");
    let (_, a) = add_function(&mut dag, "a", &[table]);
    let (_, b) = add_function(&mut dag, "b", &[table]);
    dag.rename_artifact(a, "x".to_string(), true).unwrap();
    dag.rename_artifact(b, "x".to_string(), true).unwrap();

    match resolve_artifact_names(&mut dag).unwrap_err() {
      WorkflowError::UserAction { message } => {
        assert!(message.contains("multiple artifacts explicitly named x"))
      }
      other => panic!("unexpected error: {:?}", other),
    }
  }

  #[test]
  fn test_priority_order() {
    let mut dag = Dag::new();
    // Inserted before the extract, but a param ranks after it.
    let (_, param) = add_param(&mut dag, "shared", false);
    let (_, table) = add_extract(&mut dag, "demo query");
    dag.rename_artifact(table, "shared".to_string(), false).unwrap();
    let (_, metric) = add_metric(&mut dag, "rows", table);
    dag.rename_artifact(metric, "shared".to_string(), false).unwrap();

    resolve_artifact_names(&mut dag).unwrap();
    assert_eq!(dag.must_get_artifact(table).unwrap().name, "shared");
    assert_eq!(dag.must_get_artifact(metric).unwrap().name, "shared (1)");
    assert_eq!(dag.must_get_artifact(param).unwrap().name, "shared (2)");
    assert_eq!(
      dag.must_get_artifact(metric).unwrap().artifact_type,
      ArtifactType::Numeric
    );
  }

  #[test]
  fn test_unique_names_untouched() {
    let mut dag = Dag::new();
    let (_, table) = add_extract(&mut dag, "demo query");
    add_function(&mut dag, "clean", &[table]);
    let before = dag.clone();

    resolve_artifact_names(&mut dag).unwrap();
    assert_eq!(dag, before);
  }
}
