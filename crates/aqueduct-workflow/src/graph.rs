use std::collections::{HashMap, HashSet, VecDeque};

use aqueduct_config::{ArtifactId, OperatorId};

use crate::dag::Dag;

/// Operator-level view of a DAG for traversal.
///
/// Two operators are adjacent when one consumes an artifact the other produces.
#[derive(Debug, Clone)]
pub struct Graph {
  /// Adjacency list: operator -> operators consuming its outputs.
  adjacency: HashMap<OperatorId, Vec<OperatorId>>,
  /// Reverse adjacency: operator -> operators producing its inputs.
  reverse_adjacency: HashMap<OperatorId, Vec<OperatorId>>,
  /// Operators with no inputs, in insertion order.
  entry_points: Vec<OperatorId>,
  /// All operators in insertion order.
  order: Vec<OperatorId>,
}

impl Graph {
  /// Build the operator graph of a DAG.
  pub fn new(dag: &Dag) -> Self {
    let mut producers: HashMap<ArtifactId, OperatorId> = HashMap::new();
    let mut adjacency: HashMap<OperatorId, Vec<OperatorId>> = HashMap::new();
    let mut reverse_adjacency: HashMap<OperatorId, Vec<OperatorId>> = HashMap::new();

    for op in dag.operators() {
      adjacency.entry(op.id).or_default();
      reverse_adjacency.entry(op.id).or_default();
      for output in &op.outputs {
        producers.insert(*output, op.id);
      }
    }

    for op in dag.operators() {
      for input in &op.inputs {
        let Some(&upstream) = producers.get(input) else {
          continue;
        };
        let downstream = adjacency.entry(upstream).or_default();
        if !downstream.contains(&op.id) {
          downstream.push(op.id);
        }
        let upstreams = reverse_adjacency.entry(op.id).or_default();
        if !upstreams.contains(&upstream) {
          upstreams.push(upstream);
        }
      }
    }

    let entry_points = dag
      .operators()
      .filter(|op| op.inputs.is_empty())
      .map(|op| op.id)
      .collect();

    Self {
      adjacency,
      reverse_adjacency,
      entry_points,
      order: dag.operators().map(|op| op.id).collect(),
    }
  }

  /// Operators with no inputs.
  pub fn entry_points(&self) -> &[OperatorId] {
    &self.entry_points
  }

  /// Operators consuming an output of the given operator.
  pub fn downstream(&self, op_id: OperatorId) -> &[OperatorId] {
    self
      .adjacency
      .get(&op_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Operators producing an input of the given operator.
  pub fn upstream(&self, op_id: OperatorId) -> &[OperatorId] {
    self
      .reverse_adjacency
      .get(&op_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Every operator reachable downstream of `op_id`, including itself, in BFS order.
  pub fn reachable_from(&self, op_id: OperatorId) -> Vec<OperatorId> {
    self.bfs(std::iter::once(op_id), |id| self.downstream(id))
  }

  /// Every operator `op_id` transitively depends on, including itself.
  pub fn ancestors_of(&self, op_id: OperatorId) -> Vec<OperatorId> {
    self.bfs(std::iter::once(op_id), |id| self.upstream(id))
  }

  /// All operators breadth-first from the entry points.
  ///
  /// Operators unreachable from an entry point (only possible in a malformed
  /// DAG) are appended in insertion order.
  pub fn bfs_order(&self) -> Vec<OperatorId> {
    let mut order = self.bfs(self.entry_points.iter().copied(), |id| {
      self.downstream(id)
    });
    let seen: HashSet<OperatorId> = order.iter().copied().collect();
    order.extend(self.order.iter().filter(|id| !seen.contains(*id)));
    order
  }

  fn bfs<'a>(
    &'a self,
    start: impl Iterator<Item = OperatorId>,
    next: impl Fn(OperatorId) -> &'a [OperatorId],
  ) -> Vec<OperatorId> {
    let mut visited = HashSet::new();
    let mut queue: VecDeque<OperatorId> = VecDeque::new();
    let mut order = Vec::new();

    for id in start {
      if visited.insert(id) {
        queue.push_back(id);
      }
    }

    while let Some(id) = queue.pop_front() {
      order.push(id);
      for &neighbor in next(id) {
        if visited.insert(neighbor) {
          queue.push_back(neighbor);
        }
      }
    }

    order
  }
}
