use crate::data::{Instance, Machine, OpId, Time};
use crate::error::SolverError;
use crate::logging::RunLog;
use crate::solver::carlier::CarlierSolver;
use crate::solver::Solution;
use std::collections::HashMap;

/// Solves the one-machine subproblem of `machine` against the current
/// graph: release dates are longest paths from the source, delivery times
/// are tails minus the operation's own processing time.
fn solve_single_machine(
  instance: &Instance,
  machine: Machine,
  ops: &[OpId],
  release: &ndarray::Array1<Time>,
  tail: &ndarray::Array1<Time>,
  log: &mut RunLog,
) -> Result<(Time, Vec<OpId>), SolverError> {
  let r: HashMap<OpId, Time> = ops.iter().map(|&op| (op, release[op])).collect();
  let p: HashMap<OpId, Time> = ops.iter().map(|&op| (op, instance.duration(op, machine))).collect();
  let q: HashMap<OpId, Time> = ops
    .iter()
    .map(|&op| (op, tail[op] - instance.duration(op, machine)))
    .collect();

  if ops.len() == 1 {
    let op = ops[0];
    return Ok((r[&op] + p[&op] + q[&op], vec![op]));
  }

  let mut solver = CarlierSolver::new(instance, ops.to_vec(), r, p, q);
  return solver.solve(log);
}

/// Shifting bottleneck procedure: with the machine assignment fixed, the
/// machine orders are rebuilt one at a time. Each round solves a
/// max-lateness subproblem per unsequenced machine, consolidates the worst
/// one, and then re-derives the order of every machine sequenced earlier
/// against the updated graph.
pub fn process(instance: &Instance, solution: &mut Solution, log: &mut RunLog) -> Result<(), SolverError> {
  log.log("starting sbp processing");

  // Machine orders are unknowns here: group ops by assignment and drop any
  // previously consolidated edges.
  solution.machine_sequence = solution.machines_assignment(instance);
  solution.rebuild_graph(instance, false);

  let mut remaining: Vec<Machine> = instance
    .machines()
    .filter(|&m| !solution.machine_sequence[m].is_empty())
    .collect();
  let mut sequenced: Vec<Machine> = Vec::new();

  log.log(&format!("machines to sequence: {:?}", remaining));

  while !remaining.is_empty() {
    let log = &mut log.scope();

    let graph = solution.graph().expect("sbp requires a graph");
    let release = graph.release_times()?;
    let tail = graph.tail_times()?;

    // Bottleneck selection: the machine with the largest minimum maximum
    // lateness; remaining is in ascending order, so ties keep the lowest id.
    let mut bottleneck: Option<(Machine, Time, Vec<OpId>)> = None;
    for &machine in &remaining {
      let ops = solution.machine_sequence[machine].clone();
      let (lateness, sequence) =
        solve_single_machine(instance, machine, &ops, &release, &tail, log)?;
      log.log(&format!("machine {} | lateness {}", machine, lateness));

      let worse = match &bottleneck {
        Some((_, worst, _)) => lateness > *worst,
        None => true,
      };
      if worse {
        bottleneck = Some((machine, lateness, sequence));
      }
    }

    let (machine, lateness, sequence) = bottleneck.unwrap();
    log.log(&format!(
      "bottleneck machine {} | lateness {} | sequence {:?}",
      machine, lateness, sequence
    ));

    solution
      .graph_mut()
      .expect("sbp requires a graph")
      .consolidate_sequence(instance, machine, &sequence);
    solution.machine_sequence[machine] = sequence;
    remaining.retain(|&m| m != machine);

    let makespan = solution.recalculate_times(instance)?;
    log.log(&format!("updated makespan: {}", makespan));

    // Reoptimization: every machine consolidated earlier is re-sequenced
    // against the graph that now contains the new bottleneck order.
    for &earlier in &sequenced {
      let log = &mut log.scope();
      log.log(&format!("reoptimizing machine {}", earlier));

      let old_sequence = solution.machine_sequence[earlier].clone();
      solution.graph_mut().expect("sbp requires a graph").remove_sequence(earlier);

      let graph = solution.graph().expect("sbp requires a graph");
      let release = graph.release_times()?;
      let tail = graph.tail_times()?;

      let resequenced =
        solve_single_machine(instance, earlier, &old_sequence, &release, &tail, log);
      let new_sequence = match resequenced {
        Ok((_, new_sequence)) => new_sequence,
        Err(err) => {
          // Roll the graph back to its state at entry before failing.
          solution
            .graph_mut()
            .expect("sbp requires a graph")
            .consolidate_sequence(instance, earlier, &old_sequence);
          return Err(err);
        }
      };

      solution
        .graph_mut()
        .expect("sbp requires a graph")
        .consolidate_sequence(instance, earlier, &new_sequence);
      solution.machine_sequence[earlier] = new_sequence;
      let makespan = solution.recalculate_times(instance)?;
      log.log(&format!("new makespan: {}", makespan));
    }

    sequenced.push(machine);
  }

  return Ok(());
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::parser::parse_instance;
  use crate::solver::builder::{self, MachineStrategy};
  use crate::solver::verify_solution;
  use rand::SeedableRng;
  use rand_chacha::ChaChaRng;

  fn rebuild_via_sbp(body: &str, seed: u64) -> (crate::data::Instance, Solution) {
    let inst = parse_instance("t", body).unwrap();
    let mut sol = Solution::new(&inst);
    let mut rng = ChaChaRng::seed_from_u64(seed);
    builder::build_solution(&inst, &mut sol, MachineStrategy::Random, &mut rng).unwrap();

    process(&inst, &mut sol, &mut RunLog::off()).unwrap();
    return (inst, sol);
  }

  #[test]
  fn produces_valid_schedules_from_any_assignment() {
    let bodies = [
      "2 2\n2 1 1 3 1 2 2\n2 1 2 4 1 1 1\n",
      "3 2\n2 2 1 3 2 2 1 2 4\n2 1 2 2 2 1 3 2 5\n1 2 1 2 2 6\n",
      "3 3\n3 1 1 2 1 2 3 1 3 4\n3 1 2 2 1 3 3 1 1 4\n3 1 3 2 1 1 3 1 2 4\n",
    ];

    for body in &bodies {
      for seed in 0..5 {
        let (inst, sol) = rebuild_via_sbp(body, seed);
        verify_solution(&inst, &sol).unwrap();
      }
    }
  }

  #[test]
  fn start_times_equal_longest_paths_after_processing() {
    let (inst, sol) = rebuild_via_sbp("2 2\n2 1 1 3 1 2 2\n2 1 2 4 1 1 1\n", 42);

    let release = sol.graph().unwrap().release_times().unwrap();
    for op in inst.ops() {
      assert_eq!(sol.start_times[op], release[op]);
    }
    assert_eq!(sol.graph().unwrap().makespan().unwrap(), sol.makespan);
  }

  #[test]
  fn every_loaded_machine_ends_up_consolidated() {
    let (inst, sol) = rebuild_via_sbp("3 3\n3 1 1 2 1 2 3 1 3 4\n3 1 2 2 1 3 3 1 1 4\n3 1 3 2 1 1 3 1 2 4\n", 7);

    let graph = sol.graph().unwrap();
    for m in inst.machines() {
      // machines holding at least two cross-job ops carry consolidated edges
      let cross_job = sol.machine_sequence[m].len() > 1;
      if cross_job {
        assert!(graph.is_consolidated(m));
      }
    }
  }

  #[test]
  fn reuses_the_fixed_assignment_untouched() {
    let inst = parse_instance("t", "2 2\n2 2 1 3 2 4 1 2 2\n2 1 2 4 2 1 1 2 3\n").unwrap();
    let mut sol = Solution::new(&inst);
    let mut rng = ChaChaRng::seed_from_u64(1);
    builder::build_solution(&inst, &mut sol, MachineStrategy::Greedy, &mut rng).unwrap();
    let assign_before = sol.assign.clone();

    process(&inst, &mut sol, &mut RunLog::off()).unwrap();
    assert_eq!(sol.assign, assign_before);
    verify_solution(&inst, &sol).unwrap();
  }
}
