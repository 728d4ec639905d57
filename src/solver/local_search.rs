use crate::data::{Instance, Machine, OpId, Time};
use crate::error::SolverError;
use crate::logging::RunLog;
use crate::solver::shifting_bottleneck;
use crate::solver::Solution;
use rand::seq::{IteratorRandom, SliceRandom};
use rand::Rng;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};

const MAX_ATTEMPTS: usize = 100;

/// Per-solution tabu state, keyed by the structural scheduling hash: a
/// shuffled queue of flexible critical operations still to explore and a
/// bounded deque of recently applied `(op, machine)` moves.
#[derive(Debug)]
struct TabuEntry {
  queue: VecDeque<OpId>,
  moves: VecDeque<(OpId, Machine)>,
  capacity: usize,
}

impl TabuEntry {
  fn remember(&mut self, moves: &[(OpId, Machine)]) {
    for &mv in moves {
      self.moves.push_back(mv);
      while self.moves.len() > self.capacity {
        self.moves.pop_front();
      }
    }
  }

  fn is_tabu(&self, mv: (OpId, Machine)) -> bool {
    return self.moves.contains(&mv);
  }
}

/// Tabu-aware generator of neighbor solutions: flexible operations on a
/// random critical path are reassigned to alternative machines and the
/// shifting bottleneck procedure rebuilds the machine orders.
#[derive(Debug)]
pub struct LocalSearch {
  tabu: HashMap<u64, TabuEntry>,
}

impl LocalSearch {
  pub fn new() -> Self {
    return LocalSearch { tabu: HashMap::new() };
  }

  /// Seeds (or reseeds) the tabu entry of `key` with the flexible ops of a
  /// fresh random critical path. Returns false when the path holds no
  /// flexible op, i.e. no neighbor can exist for this solution.
  fn seed_queue<R: Rng>(
    &mut self,
    instance: &Instance,
    sol: &Solution,
    key: u64,
    rng: &mut R,
    log: &mut RunLog,
  ) -> bool {
    let (critical_path, _) = sol.find_critical_path(instance, rng);
    let mut flexible: Vec<OpId> = critical_path
      .into_iter()
      .filter(|&op| instance.is_flexible(op))
      .collect();

    if flexible.is_empty() {
      log.log("critical path has no flexible ops, no neighbor possible");
      return false;
    }
    flexible.shuffle(rng);

    let capacity: usize = flexible.iter().map(|&op| instance.eligible[op].len() - 1).sum();
    log.log(&format!(
      "seeding tabu queue for key {}: {:?} (tabu capacity {})",
      key, flexible, capacity
    ));

    let queue: VecDeque<OpId> = flexible.into_iter().collect();
    match self.tabu.entry(key) {
      Entry::Occupied(mut entry) => {
        entry.get_mut().queue = queue;
      }
      Entry::Vacant(entry) => {
        entry.insert(TabuEntry {
          queue: queue,
          moves: VecDeque::new(),
          capacity: capacity,
        });
      }
    }
    return true;
  }

  /// Picks the first non-tabu `(op, machine)` reassignment for `op`, in a
  /// shuffled order over the alternative machines, and applies it to the
  /// neighbor. Returns None when every alternative is tabu.
  fn non_tabu_move<R: Rng>(
    &self,
    instance: &Instance,
    sol: &Solution,
    neighbor: &mut Solution,
    key: u64,
    op: OpId,
    rng: &mut R,
  ) -> Option<(OpId, Machine)> {
    let entry = self.tabu.get(&key).unwrap();
    let current = sol.assigned_machine(op);
    let mut alternatives: Vec<Machine> = instance.eligible[op]
      .iter()
      .cloned()
      .filter(|&m| m != current)
      .collect();
    if alternatives.is_empty() {
      return None;
    }
    alternatives.shuffle(rng);

    for machine in alternatives {
      let mv = (op, machine);
      if !entry.is_tabu(mv) {
        neighbor.assign[op] = Some(machine);
        return Some(mv);
      }
    }
    return None;
  }

  /// Generates one neighbor of `sol`. The intensity level and the relative
  /// temperature scale how many critical ops are reassigned. Returns
  /// `Ok(None)` when no non-tabu neighbor could be produced.
  pub fn generate_neighbor<R: Rng>(
    &mut self,
    instance: &Instance,
    sol: &Solution,
    intensity: u32,
    t_rel: f64,
    rng: &mut R,
    log: &mut RunLog,
    sbp_log: &mut RunLog,
  ) -> Result<Option<(Time, Solution)>, SolverError> {
    let key = sol.scheduling_hash();
    log.log(&format!(
      "generating neighbor | makespan {} | key {} | intensity {} | t_rel {:.4}",
      sol.makespan, key, intensity, t_rel
    ));

    let needs_seed = self
      .tabu
      .get(&key)
      .map(|entry| entry.queue.is_empty())
      .unwrap_or(true);
    if needs_seed && !self.seed_queue(instance, sol, key, rng, log) {
      return Ok(None);
    }

    let mut neighbor = Solution::new(instance);
    let mut attempts = 0;

    while attempts < MAX_ATTEMPTS {
      if self.tabu.get(&key).unwrap().queue.is_empty() {
        log.log("tabu queue exhausted without a feasible move");
        break;
      }
      attempts += 1;

      neighbor.copy_from(sol);
      let mut moves_made: Vec<(OpId, Machine)> = Vec::new();

      let chosen = self.choose_ops(&key, intensity, t_rel, rng);
      for op in chosen {
        if let Some(mv) = self.non_tabu_move(instance, sol, &mut neighbor, key, op, rng) {
          moves_made.push(mv);
        }
      }

      if moves_made.is_empty() {
        continue;
      }

      shifting_bottleneck::process(instance, &mut neighbor, sbp_log)?;
      let makespan = neighbor.makespan;

      self.tabu.get_mut(&key).unwrap().remember(&moves_made);
      log.log(&format!(
        "neighbor accepted | moves {:?} | makespan {}",
        moves_made, makespan
      ));
      return Ok(Some((makespan, neighbor)));
    }

    return Ok(None);
  }

  /// Draws the ops to reassign for this attempt from the key's queue.
  fn choose_ops<R: Rng>(&mut self, key: &u64, intensity: u32, t_rel: f64, rng: &mut R) -> Vec<OpId> {
    let entry = self.tabu.get_mut(key).unwrap();
    let queue_len = entry.queue.len();

    match intensity {
      0 => {
        return entry.queue.pop_back().into_iter().collect();
      }
      1 | 2 => {
        let scaled = if intensity == 1 {
          std::cmp::max(2, (0.05 * t_rel * queue_len as f64) as usize)
        } else {
          std::cmp::max(3, (0.10 * t_rel * queue_len as f64) as usize)
        };
        let count = std::cmp::min(scaled, queue_len);
        return (0..count).filter_map(|_| entry.queue.pop_back()).collect();
      }
      _ => {
        let fraction = f64::min(0.30, 0.15 + 0.30 * t_rel);
        let count = std::cmp::max(1, (fraction * queue_len as f64) as usize);
        let chosen: Vec<OpId> = entry.queue.iter().cloned().choose_multiple(rng, count);
        entry.queue.retain(|op| !chosen.contains(op));
        return chosen;
      }
    }
  }
}
