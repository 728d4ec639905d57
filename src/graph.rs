use crate::data::{Duration, Edge, Instance, Machine, OpId, Time};
use crate::error::SolverError;
use ndarray::Array1;
use std::collections::VecDeque;

/// Disjunctive graph over the operations of an instance plus artificial
/// source and sink nodes.
///
/// Conjunctive edges encode job precedence; consolidated disjunctive edges
/// encode a chosen order on one machine and are the only disjunctive edges
/// that contribute to longest paths. Visual pairs are display hints for the
/// DAG export and never enter the topology.
///
/// Every edge `u -> v` is weighted with the processing time of `u` on its
/// assigned machine (0 for source edges), so a longest path to a node is
/// that node's earliest start and a longest path from a node includes its
/// own processing time.
#[derive(Debug, Clone)]
pub struct DisjunctiveGraph {
  n_ops: usize,
  succ: Vec<Vec<(usize, Duration)>>,
  pred: Vec<Vec<(usize, Duration)>>,
  consolidated: Vec<Vec<Edge>>,
  visual: Vec<Vec<Edge>>,
}

impl DisjunctiveGraph {
  /// Builds the conjunctive skeleton: job chains plus source/sink edges.
  /// Operation edge weights are taken from the current machine assignment;
  /// unassigned operations contribute weight 0 until they are assigned.
  pub fn new(instance: &Instance, assign: &[Option<Machine>]) -> Self {
    let n_ops = instance.n_ops();
    let n_nodes = n_ops + 2;

    let mut graph = DisjunctiveGraph {
      n_ops: n_ops,
      succ: vec![Vec::new(); n_nodes],
      pred: vec![Vec::new(); n_nodes],
      consolidated: vec![Vec::new(); instance.n_machines],
      visual: vec![Vec::new(); instance.n_machines],
    };

    let weight = |op: OpId| -> Duration {
      return assign[op].map(|m| instance.duration(op, m)).unwrap_or(0);
    };

    for ops in &instance.ops_by_job {
      graph.add_edge(graph.source(), ops[0], 0);
      for window in ops.windows(2) {
        graph.add_conjunctive(window[0], window[1], weight(window[0]));
      }
      let last = *ops.last().unwrap();
      graph.add_edge(last, graph.sink(), weight(last));
    }

    return graph;
  }

  pub fn source(&self) -> usize {
    return self.n_ops;
  }

  pub fn sink(&self) -> usize {
    return self.n_ops + 1;
  }

  fn add_edge(&mut self, from: usize, to: usize, weight: Duration) {
    self.succ[from].push((to, weight));
    self.pred[to].push((from, weight));
  }

  fn remove_edge(&mut self, from: usize, to: usize) {
    self.succ[from].retain(|&(node, _)| node != to);
    self.pred[to].retain(|&(node, _)| node != from);
  }

  fn has_edge(&self, from: usize, to: usize) -> bool {
    return self.succ[from].iter().any(|&(node, _)| node == to);
  }

  /// Job-precedence edge; idempotent.
  pub fn add_conjunctive(&mut self, from: OpId, to: OpId, weight: Duration) {
    if !self.has_edge(from, to) {
      self.add_edge(from, to, weight);
    }
  }

  /// Records an undirected display hint between two operations sharing a
  /// machine. Does not affect longest paths.
  pub fn add_visual(&mut self, machine: Machine, a: OpId, b: OpId) {
    self.visual[machine].push((a, b));
  }

  pub fn visual_pairs(&self, machine: Machine) -> &[Edge] {
    return &self.visual[machine];
  }

  /// Machine-order edge between two operations sharing `machine`: a
  /// directed, path-relevant edge weighted with the source's processing
  /// time when `consolidated`, a display hint otherwise.
  pub fn add_disjunctive(
    &mut self,
    instance: &Instance,
    machine: Machine,
    from: OpId,
    to: OpId,
    consolidated: bool,
  ) {
    if consolidated {
      self.add_edge(from, to, instance.duration(from, machine));
      self.consolidated[machine].push((from, to));
    } else {
      self.add_visual(machine, from, to);
    }
  }

  /// Orients the order chosen for one machine as directed edges
  /// `o_i -> o_{i+1}`. Pairs within the same job are skipped: the
  /// conjunctive chain already carries that precedence.
  pub fn consolidate_sequence(&mut self, instance: &Instance, machine: Machine, sequence: &[OpId]) {
    for window in sequence.windows(2) {
      let (from, to) = (window[0], window[1]);
      if instance.job_of_op[from] == instance.job_of_op[to] {
        continue;
      }
      self.add_disjunctive(instance, machine, from, to, true);
    }
  }

  /// Removes every consolidated edge previously added for `machine`.
  pub fn remove_sequence(&mut self, machine: Machine) {
    let edges = std::mem::replace(&mut self.consolidated[machine], Vec::new());
    for (from, to) in edges {
      self.remove_edge(from, to);
    }
  }

  pub fn is_consolidated(&self, machine: Machine) -> bool {
    return !self.consolidated[machine].is_empty();
  }

  fn topological_order(&self) -> Result<Vec<usize>, SolverError> {
    let n_nodes = self.n_ops + 2;
    let mut indegree: Vec<usize> = self.pred.iter().map(|edges| edges.len()).collect();

    let mut open = VecDeque::new();
    for node in 0..n_nodes {
      if indegree[node] == 0 {
        open.push_back(node);
      }
    }

    let mut order = Vec::with_capacity(n_nodes);
    while let Some(node) = open.pop_front() {
      order.push(node);
      for &(next, _) in &self.succ[node] {
        indegree[next] -= 1;
        if indegree[next] == 0 {
          open.push_back(next);
        }
      }
    }

    if order.len() < n_nodes {
      return Err(SolverError::CycleDetected);
    }
    return Ok(order);
  }

  /// Longest-path weight from the source to every node, i.e. the earliest
  /// start of each operation under the current orientation. The entry for
  /// the sink is the makespan.
  pub fn release_times(&self) -> Result<Array1<Time>, SolverError> {
    let order = self.topological_order()?;
    let mut release = Array1::<Time>::from_elem(self.n_ops + 2, 0);

    for &node in &order {
      for &(next, weight) in &self.succ[node] {
        release[next] = std::cmp::max(release[next], release[node] + weight);
      }
    }

    return Ok(release);
  }

  /// Longest-path weight from every node to the sink, including the node's
  /// own processing time (Taillard's tails).
  pub fn tail_times(&self) -> Result<Array1<Time>, SolverError> {
    let order = self.topological_order()?;
    let mut tail = Array1::<Time>::from_elem(self.n_ops + 2, 0);

    for &node in order.iter().rev() {
      for &(next, weight) in &self.succ[node] {
        tail[node] = std::cmp::max(tail[node], weight + tail[next]);
      }
    }

    return Ok(tail);
  }

  pub fn longest_path_to(&self, op: OpId) -> Result<Time, SolverError> {
    return Ok(self.release_times()?[op]);
  }

  pub fn longest_path_from(&self, op: OpId) -> Result<Time, SolverError> {
    return Ok(self.tail_times()?[op]);
  }

  pub fn makespan(&self) -> Result<Time, SolverError> {
    let release = self.release_times()?;
    return Ok(release[self.sink()]);
  }
}
