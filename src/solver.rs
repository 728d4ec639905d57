pub mod builder;
pub mod carlier;
pub mod local_search;
pub mod schrage;
pub mod shifting_bottleneck;
pub mod simulated_annealing;

use crate::data::{Instance, Machine, OpId, Time};
use crate::error::SolverError;
use crate::graph::DisjunctiveGraph;
use itertools::Itertools;
use ndarray::Array1;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// A (possibly partial) schedule: machine assignment per operation, the
/// processing order on every machine, start/finish times and the owning
/// disjunctive graph.
///
/// A solution starts empty (no assignments) and is populated by the
/// constructive builder or by copying. Copies leave the graph behind and
/// rebuild it on demand, so snapshots are cheap.
#[derive(Debug, Clone)]
pub struct Solution {
  pub assign: Array1<Option<Machine>>,
  pub machine_sequence: Vec<Vec<OpId>>,
  pub start_times: Array1<Time>,
  pub finish_times: Array1<Time>,
  pub makespan: Time,
  graph: Option<DisjunctiveGraph>,
}

impl Solution {
  pub fn new(instance: &Instance) -> Self {
    return Solution {
      assign: Array1::from_elem(instance.n_ops(), None),
      machine_sequence: vec![Vec::new(); instance.n_machines],
      start_times: Array1::from_elem(instance.n_ops(), 0),
      finish_times: Array1::from_elem(instance.n_ops(), 0),
      makespan: 0,
      graph: None,
    };
  }

  /// Deep-copies the schedule of `other`; the graph is left dirty and
  /// rebuilt lazily by the next consumer.
  pub fn copy_from(&mut self, other: &Solution) {
    self.assign = other.assign.clone();
    self.machine_sequence = other.machine_sequence.clone();
    self.start_times = other.start_times.clone();
    self.finish_times = other.finish_times.clone();
    self.makespan = other.makespan;
    self.graph = None;
  }

  pub fn assigned_machine(&self, op: OpId) -> Machine {
    return self.assign[op].expect("operation not assigned");
  }

  /// Derives the per-machine operation lists from the assignment vector,
  /// in global operation order.
  pub fn machines_assignment(&self, instance: &Instance) -> Vec<Vec<OpId>> {
    let mut assignment = vec![Vec::new(); instance.n_machines];
    for op in instance.ops() {
      if let Some(machine) = self.assign[op] {
        assignment[machine].push(op);
      }
    }

    return assignment;
  }

  pub fn graph(&self) -> Option<&DisjunctiveGraph> {
    return self.graph.as_ref();
  }

  pub fn graph_mut(&mut self) -> Option<&mut DisjunctiveGraph> {
    return self.graph.as_mut();
  }

  /// Rebuilds the owned graph from the current assignment. With
  /// `consolidate` the current machine sequences are oriented as
  /// disjunctive edges (a complete graph); without it only the conjunctive
  /// skeleton remains and machine orders are left to the shifting
  /// bottleneck procedure (a partial graph).
  pub fn rebuild_graph(&mut self, instance: &Instance, consolidate: bool) {
    let assign: Vec<Option<Machine>> = self.assign.iter().cloned().collect();
    let mut graph = DisjunctiveGraph::new(instance, &assign);

    if consolidate {
      for machine in instance.machines() {
        let sequence = self.machine_sequence[machine].clone();
        graph.consolidate_sequence(instance, machine, &sequence);
      }
    }

    self.graph = Some(graph);
  }

  /// Records display-only disjunctive pairs for every machine. With
  /// `include_same_job` pairs within one job are kept as well (used for
  /// the bare-instance DAG view).
  pub fn populate_visuals(&mut self, instance: &Instance, include_same_job: bool) {
    let sequences = self.machine_sequence.clone();
    if let Some(graph) = self.graph.as_mut() {
      for (machine, ops) in sequences.iter().enumerate() {
        for (&a, &b) in ops.iter().tuple_combinations() {
          if include_same_job || instance.job_of_op[a] != instance.job_of_op[b] {
            graph.add_visual(machine, a, b);
          }
        }
      }
    }
  }

  /// Reads start times back from the graph's longest paths and refreshes
  /// finish times and the makespan.
  pub fn recalculate_times(&mut self, instance: &Instance) -> Result<Time, SolverError> {
    if self.graph.is_none() {
      self.rebuild_graph(instance, true);
    }
    let release = self.graph.as_ref().unwrap().release_times()?;

    let mut makespan = 0;
    for op in instance.ops() {
      let machine = self.assigned_machine(op);
      let start = release[op];
      let finish = start + instance.duration(op, machine);
      self.start_times[op] = start;
      self.finish_times[op] = finish;
      makespan = std::cmp::max(makespan, finish);
    }

    self.makespan = makespan;
    return Ok(makespan);
  }

  /// Walks one critical path backwards from a random op finishing at the
  /// makespan, following tight machine/job predecessors; ties are broken
  /// uniformly at random. The flag reports whether more than one critical
  /// path exists (several terminal ops or a tight-predecessor tie).
  pub fn find_critical_path<R: Rng>(&self, instance: &Instance, rng: &mut R) -> (Vec<OpId>, bool) {
    let terminals: Vec<OpId> = instance
      .ops()
      .filter(|&op| self.finish_times[op] == self.makespan)
      .collect();
    if terminals.is_empty() {
      return (Vec::new(), false);
    }

    let mut multiple = terminals.len() > 1;
    let mut current = *terminals.choose(rng).unwrap();
    let mut path = vec![current];

    while self.start_times[current] > 0 {
      let mut preds = Vec::new();

      if let Some(job_pred) = instance.job_pred(current) {
        if self.finish_times[job_pred] == self.start_times[current] {
          preds.push(job_pred);
        }
      }

      let machine = self.assigned_machine(current);
      let sequence = &self.machine_sequence[machine];
      let position = sequence.iter().position(|&op| op == current);
      if let Some(position) = position {
        if position > 0 {
          let machine_pred = sequence[position - 1];
          if self.finish_times[machine_pred] == self.start_times[current]
            && !preds.contains(&machine_pred)
          {
            preds.push(machine_pred);
          }
        }
      }

      if preds.is_empty() {
        break;
      }
      if preds.len() > 1 {
        multiple = true;
      }

      current = *preds.choose(rng).unwrap();
      path.push(current);
    }

    path.reverse();
    return (path, multiple);
  }

  /// Canonical hash of the per-machine sequences; keys the tabu state. A
  /// collision only makes two schedules share a tabu entry, which is
  /// tolerable.
  pub fn scheduling_hash(&self) -> u64 {
    let mut hasher = DefaultHasher::new();
    self.machine_sequence.hash(&mut hasher);
    return hasher.finish();
  }
}

/// Checks assignment validity, job precedence, per-machine disjointness
/// and makespan tightness of a fully scheduled solution.
pub fn verify_solution(instance: &Instance, solution: &Solution) -> Result<(), String> {
  for op in instance.ops() {
    let machine = match solution.assign[op] {
      Some(machine) => machine,
      None => return Err(format!("operation {} is not assigned", op)),
    };
    if !instance.is_eligible(op, machine) {
      return Err(format!("operation {} assigned to ineligible machine {}", op, machine));
    }
    let expected = solution.start_times[op] + instance.duration(op, machine);
    if solution.finish_times[op] != expected {
      return Err(format!(
        "operation {} finish {} does not match start + duration {}",
        op, solution.finish_times[op], expected
      ));
    }
  }

  for (from, to) in instance.precedence_edges() {
    if solution.finish_times[from] > solution.start_times[to] {
      return Err(format!(
        "precedence violation {} -> {}: finish {} > start {}",
        from, to, solution.finish_times[from], solution.start_times[to]
      ));
    }
  }

  for machine in instance.machines() {
    for (&a, &b) in solution.machine_sequence[machine].iter().tuple_combinations() {
      let disjoint = solution.finish_times[a] <= solution.start_times[b]
        || solution.finish_times[b] <= solution.start_times[a];
      if !disjoint {
        return Err(format!(
          "overlap on machine {}: op {} [{}, {}) and op {} [{}, {})",
          machine,
          a,
          solution.start_times[a],
          solution.finish_times[a],
          b,
          solution.start_times[b],
          solution.finish_times[b]
        ));
      }
    }
  }

  let max_finish = instance.ops().map(|op| solution.finish_times[op]).max().unwrap_or(0);
  if solution.makespan != max_finish {
    return Err(format!(
      "makespan {} does not match latest finish {}",
      solution.makespan, max_finish
    ));
  }

  return Ok(());
}

/// Relative optimality gap in percent, `round(100 * (ub - lb) / ub, 4)`.
/// `None` stands for the original's "nan" when either bound is absent.
pub fn evaluate_gap(ub: Time, lb: Option<Time>) -> Option<f64> {
  let lb = lb?;
  if ub == 0 || lb == 0 {
    return None;
  }

  let gap = 100.0 * (ub as f64 - lb as f64) / ub as f64;
  return Some((gap * 10000.0).round() / 10000.0);
}

pub fn gap_to_string(gap: Option<f64>) -> String {
  return match gap {
    Some(gap) => format!("{}", gap),
    None => "nan".to_string(),
  };
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::parser::parse_instance;
  use rand::SeedableRng;
  use rand_chacha::ChaChaRng;

  fn scheduled_fixture() -> (Instance, Solution) {
    // job 0: m0 (3) then m1 (2); job 1: m1 (4) then m0 (1)
    let inst = parse_instance("t", "2 2\n2 1 1 3 1 2 2\n2 1 2 4 1 1 1\n").unwrap();
    let mut sol = Solution::new(&inst);
    sol.assign = Array1::from(vec![Some(0), Some(1), Some(1), Some(0)]);
    sol.machine_sequence = vec![vec![0, 3], vec![2, 1]];
    sol.rebuild_graph(&inst, true);
    sol.recalculate_times(&inst).unwrap();
    return (inst, sol);
  }

  #[test]
  fn recalculated_times_match_longest_paths() {
    let (inst, sol) = scheduled_fixture();

    assert_eq!(sol.start_times[0], 0);
    assert_eq!(sol.start_times[2], 0);
    assert_eq!(sol.start_times[1], 4);
    assert_eq!(sol.start_times[3], 4);
    assert_eq!(sol.makespan, 6);
    verify_solution(&inst, &sol).unwrap();
  }

  #[test]
  fn copies_are_deep_and_drop_the_graph() {
    let (inst, sol) = scheduled_fixture();
    let mut copy = Solution::new(&inst);
    copy.copy_from(&sol);

    assert_eq!(copy.makespan, sol.makespan);
    assert_eq!(copy.machine_sequence, sol.machine_sequence);
    assert!(copy.graph().is_none());

    copy.machine_sequence[0].reverse();
    assert_ne!(copy.machine_sequence, sol.machine_sequence);
  }

  #[test]
  fn critical_path_is_tight_throughout() {
    let (inst, sol) = scheduled_fixture();
    let mut rng = ChaChaRng::seed_from_u64(42);
    let (path, _multiple) = sol.find_critical_path(&inst, &mut rng);

    assert!(!path.is_empty());
    assert_eq!(sol.finish_times[*path.last().unwrap()], sol.makespan);
    assert_eq!(sol.start_times[path[0]], 0);
    for window in path.windows(2) {
      assert_eq!(sol.finish_times[window[0]], sol.start_times[window[1]]);
    }
  }

  #[test]
  fn scheduling_hash_tracks_sequence_changes() {
    let (_inst, sol) = scheduled_fixture();
    let mut other = sol.clone();
    assert_eq!(sol.scheduling_hash(), other.scheduling_hash());

    other.machine_sequence[1].reverse();
    assert_ne!(sol.scheduling_hash(), other.scheduling_hash());
  }

  #[test]
  fn verification_rejects_overlaps() {
    let (inst, mut sol) = scheduled_fixture();
    sol.start_times[1] = 2;
    sol.finish_times[1] = 4;
    sol.makespan = 6;
    assert!(verify_solution(&inst, &sol).is_err());
  }

  #[test]
  fn gap_follows_the_rounding_rule() {
    assert_eq!(evaluate_gap(50, Some(40)), Some(20.0));
    assert_eq!(evaluate_gap(3, Some(2)), Some(33.3333));
    assert_eq!(evaluate_gap(40, None), None);
    assert_eq!(gap_to_string(None), "nan");
  }
}
