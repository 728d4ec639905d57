use fjssp_heuristics::logging::RunLog;
use fjssp_heuristics::parser::parse_instance;
use fjssp_heuristics::solver::builder::{self, MachineStrategy};
use fjssp_heuristics::solver::simulated_annealing::{self, Config as SaConfig};
use fjssp_heuristics::solver::{evaluate_gap, shifting_bottleneck, verify_solution, Solution};
use rand::SeedableRng;
use rand_chacha::ChaChaRng;
use std::time::Duration;

#[test]
fn trivial_single_job_single_machine() {
  let inst = parse_instance("trivial", "1 1\n1 1 1 5\n").unwrap();
  let mut sol = Solution::new(&inst);
  let mut rng = ChaChaRng::seed_from_u64(42);

  let makespan = builder::build_solution(&inst, &mut sol, MachineStrategy::Greedy, &mut rng).unwrap();

  assert_eq!(makespan, 5);
  assert_eq!(sol.assign[0], Some(0));
  assert_eq!(sol.machine_sequence[0], vec![0]);
  assert_eq!(sol.start_times[0], 0);
  verify_solution(&inst, &sol).unwrap();
}

#[test]
fn two_jobs_two_machines_without_flexibility() {
  // job 0: m1 (3) then m2 (2); job 1: m2 (4) then m1 (1). The machine-2
  // load (4 + 2 with op 1 released at 3) forces a makespan of 6.
  let inst = parse_instance("rigid", "2 2\n2 1 1 3 1 2 2\n2 1 2 4 1 1 1\n").unwrap();
  let mut sol = Solution::new(&inst);
  let mut rng = ChaChaRng::seed_from_u64(42);

  let makespan = builder::build_solution(&inst, &mut sol, MachineStrategy::Greedy, &mut rng).unwrap();

  assert_eq!(makespan, 6);
  assert_eq!(sol.assign[0], Some(0));
  assert_eq!(sol.assign[1], Some(1));
  assert_eq!(sol.assign[2], Some(1));
  assert_eq!(sol.assign[3], Some(0));
  verify_solution(&inst, &sol).unwrap();

  // the builder's times must equal the longest paths of the oriented graph
  let list_starts = sol.start_times.clone();
  sol.rebuild_graph(&inst, true);
  sol.recalculate_times(&inst).unwrap();
  assert_eq!(sol.start_times, list_starts);
  assert_eq!(sol.graph().unwrap().makespan().unwrap(), 6);
}

#[test]
fn one_fast_alternative_is_taken_by_greedy_grasp() {
  // both ops are fastest on machine 2; GRASP with alpha 0 behaves greedily
  let inst = parse_instance("flex", "1 2\n2 2 1 10 2 1 2 2 1 1 5\n").unwrap();
  let mut sol = Solution::new(&inst);
  let mut rng = ChaChaRng::seed_from_u64(42);

  let makespan =
    builder::build_solution(&inst, &mut sol, MachineStrategy::Grasp { alpha: 0.0 }, &mut rng)
      .unwrap();

  // raw machine 2 is dense index 1
  assert_eq!(sol.assign[0], Some(1));
  assert_eq!(sol.assign[1], Some(1));
  assert_eq!(sol.machine_sequence[1], vec![0, 1]);
  assert_eq!(makespan, 2);
}

#[test]
fn carlier_keeps_intra_job_blocks_unbranched() {
  // a single machine holding both chained ops of one job: the shifting
  // bottleneck pass returns the technological order from the first
  // Schrage schedule
  let inst = parse_instance("chain", "1 1\n2 1 1 3 1 1 2\n").unwrap();
  let mut sol = Solution::new(&inst);
  let mut rng = ChaChaRng::seed_from_u64(42);
  builder::build_solution(&inst, &mut sol, MachineStrategy::Greedy, &mut rng).unwrap();

  shifting_bottleneck::process(&inst, &mut sol, &mut RunLog::off()).unwrap();

  assert_eq!(sol.machine_sequence[0], vec![0, 1]);
  assert_eq!(sol.makespan, 5);
  verify_solution(&inst, &sol).unwrap();
}

#[test]
fn sbp_reoptimizes_previously_sequenced_machines() {
  // three machines with crossing job chains: after each bottleneck
  // consolidation the earlier machines are re-solved against the updated
  // graph, which the trace log records
  let body = "3 3\n3 1 2 2 1 1 100 1 3 5\n1 1 1 100\n2 1 2 28 1 3 120\n";
  let inst = parse_instance("crossing", body).unwrap();
  let mut sol = Solution::new(&inst);
  let mut rng = ChaChaRng::seed_from_u64(42);
  builder::build_solution(&inst, &mut sol, MachineStrategy::Greedy, &mut rng).unwrap();

  let dir = std::env::temp_dir().join("fjssp-scenario-sbp");
  std::fs::create_dir_all(&dir).unwrap();
  let log_path = dir.join("sbplog.log");
  {
    let mut log = RunLog::to_file(&log_path);
    shifting_bottleneck::process(&inst, &mut sol, &mut log).unwrap();
  }

  verify_solution(&inst, &sol).unwrap();
  let release = sol.graph().unwrap().release_times().unwrap();
  for op in inst.ops() {
    assert_eq!(sol.start_times[op], release[op]);
  }

  let trace = std::fs::read_to_string(&log_path).unwrap();
  let reopt_lines = trace.matches("reoptimizing machine").count();
  assert!(reopt_lines >= 2, "expected reoptimization passes, got {}", reopt_lines);
}

#[test]
fn sa_improves_or_matches_the_constructive_gap() {
  let body = "3 3\n3 2 1 4 2 6 2 2 5 3 7 1 3 3\n3 1 2 4 2 1 3 3 6 2 1 2 2 4\n2 2 2 3 3 5 2 1 6 3 2\n";
  let mut inst = parse_instance("known", body).unwrap();

  // the longest job chain under fastest machines is a valid lower bound
  let chain_bound: u32 = inst
    .ops_by_job
    .iter()
    .map(|ops| {
      ops
        .iter()
        .map(|&op| inst.eligible[op].iter().map(|&m| inst.duration(op, m)).min().unwrap())
        .sum()
    })
    .max()
    .unwrap();
  inst.optimum = Some(chain_bound);

  let mut rng = ChaChaRng::seed_from_u64(42);
  let mut initial = Solution::new(&inst);
  builder::build_solution(&inst, &mut initial, MachineStrategy::Grasp { alpha: 0.35 }, &mut rng)
    .unwrap();
  initial.rebuild_graph(&inst, true);
  initial.recalculate_times(&inst).unwrap();
  let constructive_gap = evaluate_gap(initial.makespan, inst.optimum);

  let config = SaConfig {
    max_time: Duration::from_secs(30),
    max_iterations: Some(80),
    seed: 42,
    ..SaConfig::default()
  };
  let result = simulated_annealing::optimize(
    &inst,
    &initial,
    &config,
    &mut RunLog::off(),
    &mut RunLog::off(),
  )
  .unwrap();

  verify_solution(&inst, &result.best).unwrap();
  assert!(result.best.makespan >= chain_bound);
  assert!(result.best.makespan <= initial.makespan);
  match (result.gap, constructive_gap) {
    (Some(sa_gap), Some(constr_gap)) => assert!(sa_gap <= constr_gap),
    _ => panic!("gaps must be defined when an optimum is known"),
  }
}

#[test]
fn identical_runs_reproduce_identical_schedules() {
  let body = "3 3\n3 2 1 4 2 6 2 2 5 3 7 1 3 3\n3 1 2 4 2 1 3 3 6 2 1 2 2 4\n2 2 2 3 3 5 2 1 6 3 2\n";
  let inst = parse_instance("repro", body).unwrap();

  let mut schedules = Vec::new();
  for _ in 0..2 {
    let mut rng = ChaChaRng::seed_from_u64(7);
    let mut initial = Solution::new(&inst);
    builder::build_solution(&inst, &mut initial, MachineStrategy::Grasp { alpha: 0.35 }, &mut rng)
      .unwrap();
    initial.rebuild_graph(&inst, true);
    initial.recalculate_times(&inst).unwrap();

    let config = SaConfig {
      max_time: Duration::from_secs(30),
      max_iterations: Some(50),
      seed: 7,
      ..SaConfig::default()
    };
    let result = simulated_annealing::optimize(
      &inst,
      &initial,
      &config,
      &mut RunLog::off(),
      &mut RunLog::off(),
    )
    .unwrap();
    schedules.push((result.best.makespan, result.best.assign.clone(), result.best.machine_sequence.clone()));
  }

  assert_eq!(schedules[0], schedules[1]);
}
