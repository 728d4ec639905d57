use crate::data::{Instance, Machine, OpId, Time};
use crate::error::SolverError;
use crate::solver::Solution;
use ndarray::Array1;
use rand::seq::SliceRandom;
use rand::Rng;

/// How the builder fixes a machine for each operation before sequencing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MachineStrategy {
  /// Fastest machine, ties broken uniformly at random.
  Greedy,
  /// Restricted candidate list: machines within
  /// `p_min + alpha * (p_max - p_min)`, chosen uniformly.
  Grasp { alpha: f64 },
  /// Uniform over all eligible machines.
  Random,
}

/// Builds a complete schedule into `solution`: machine choice per strategy,
/// then an active-list dispatch producing sequences and start/finish times.
pub fn build_solution<R: Rng>(
  instance: &Instance,
  solution: &mut Solution,
  strategy: MachineStrategy,
  rng: &mut R,
) -> Result<Time, SolverError> {
  select_machines(instance, solution, strategy, rng);
  let makespan = schedule_active_list(instance, solution)?;

  log::debug!(
    "constructive builder finished with makespan {} ({:?})",
    makespan,
    strategy
  );
  return Ok(makespan);
}

pub fn select_machines<R: Rng>(
  instance: &Instance,
  solution: &mut Solution,
  strategy: MachineStrategy,
  rng: &mut R,
) {
  for op in instance.ops() {
    let machines = &instance.eligible[op];
    let chosen = match strategy {
      MachineStrategy::Greedy => {
        let fastest = machines.iter().map(|&m| instance.duration(op, m)).min().unwrap();
        let candidates: Vec<Machine> = machines
          .iter()
          .cloned()
          .filter(|&m| instance.duration(op, m) == fastest)
          .collect();
        *candidates.choose(rng).unwrap()
      }
      MachineStrategy::Grasp { alpha } => {
        let p_min = machines.iter().map(|&m| instance.duration(op, m)).min().unwrap();
        let p_max = machines.iter().map(|&m| instance.duration(op, m)).max().unwrap();
        let threshold = p_min as f64 + alpha * (p_max - p_min) as f64;
        let candidates: Vec<Machine> = machines
          .iter()
          .cloned()
          .filter(|&m| instance.duration(op, m) as f64 <= threshold)
          .collect();
        *candidates.choose(rng).unwrap()
      }
      MachineStrategy::Random => *machines.choose(rng).unwrap(),
    };

    solution.assign[op] = Some(chosen);
  }
}

/// Priority key of the active-list rule: remaining work of the job on this
/// machine, total remaining work of the job, own processing time, number of
/// remaining job operations. The maximum wins; the first op reaching the
/// maximum is kept on ties.
fn priority_key(instance: &Instance, solution: &Solution, op: OpId, machine: Machine) -> (Time, Time, Time, usize) {
  let mut local_remaining = 0;
  let mut global_remaining = 0;
  let mut remaining_ops = 0;

  let mut succ = instance.job_succ(op);
  while let Some(next) = succ {
    let assigned = solution.assigned_machine(next);
    if assigned == machine {
      local_remaining += instance.duration(next, machine);
    }
    global_remaining += instance.duration(next, assigned);
    remaining_ops += 1;
    succ = instance.job_succ(next);
  }

  return (
    local_remaining,
    global_remaining,
    instance.duration(op, machine),
    remaining_ops,
  );
}

/// Active-list scheduler over a fixed assignment: machines are visited in
/// ascending order of their ready time and each receives its best ready
/// operation; a full pass without progress is a deadlock.
pub fn schedule_active_list(instance: &Instance, solution: &mut Solution) -> Result<Time, SolverError> {
  let n_ops = instance.n_ops();
  let mut machine_ready = Array1::<Time>::from_elem(instance.n_machines, 0);
  let mut scheduled = vec![false; n_ops];
  let mut n_scheduled = 0;

  solution.machine_sequence = vec![Vec::new(); instance.n_machines];

  while n_scheduled < n_ops {
    let mut machine_order: Vec<Machine> = instance.machines().collect();
    machine_order.sort_by_key(|&m| (machine_ready[m], m));

    let mut progress = false;
    for &machine in &machine_order {
      let ready: Vec<OpId> = instance
        .ops()
        .filter(|&op| {
          solution.assign[op] == Some(machine)
            && !scheduled[op]
            && instance.job_pred(op).map(|pred| scheduled[pred]).unwrap_or(true)
        })
        .collect();

      if ready.is_empty() {
        continue;
      }

      let mut best = ready[0];
      let mut best_key = priority_key(instance, solution, best, machine);
      for &op in &ready[1..] {
        let key = priority_key(instance, solution, op, machine);
        if key > best_key {
          best = op;
          best_key = key;
        }
      }

      let pred_finish = instance
        .job_pred(best)
        .map(|pred| solution.finish_times[pred])
        .unwrap_or(0);
      let start = std::cmp::max(machine_ready[machine], pred_finish);
      let finish = start + instance.duration(best, machine);

      solution.start_times[best] = start;
      solution.finish_times[best] = finish;
      solution.machine_sequence[machine].push(best);
      machine_ready[machine] = finish;
      scheduled[best] = true;
      n_scheduled += 1;
      progress = true;
    }

    if !progress {
      return Err(SolverError::Deadlock);
    }
  }

  let makespan = instance.ops().map(|op| solution.finish_times[op]).max().unwrap_or(0);
  solution.makespan = makespan;
  return Ok(makespan);
}
