use crate::data::Instance;
use crate::error::SolverError;
use crate::logging::RunLog;
use crate::solver::builder::{self, MachineStrategy};
use crate::solver::local_search::LocalSearch;
use crate::solver::{evaluate_gap, Solution};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaChaRng;
use std::time::{Duration, Instant};

pub struct Config {
  /// Geometric cooling factor.
  pub alpha: f64,
  /// Temperature increase factor during calibration.
  pub beta: f64,
  /// Iterations per temperature level are `k * n_ops`.
  pub k: usize,
  /// Calibration seed temperature (clamped to the makespan scale).
  pub initial_temperature: f64,
  pub final_temperature: f64,
  pub max_time: Duration,
  /// Deterministic iteration budget; doubles as a virtual clock so runs
  /// can be reproduced independently of wall time.
  pub max_iterations: Option<u64>,
  pub seed: u64,
}

impl Default for Config {
  fn default() -> Self {
    return Config {
      alpha: 0.97,
      beta: 1.1,
      k: 2,
      initial_temperature: 2.0,
      final_temperature: 0.01,
      max_time: Duration::from_secs(300),
      max_iterations: None,
      seed: 42,
    };
  }
}

pub struct SaResult {
  pub best: Solution,
  pub elapsed: Duration,
  pub gap: Option<f64>,
}

struct Budget<'a> {
  config: &'a Config,
  start: Instant,
  iterations: u64,
}

impl<'a> Budget<'a> {
  fn new(config: &'a Config) -> Self {
    return Budget {
      config: config,
      start: Instant::now(),
      iterations: 0,
    };
  }

  fn tick(&mut self) {
    self.iterations += 1;
  }

  fn remaining(&self) -> bool {
    // an iteration budget acts as a virtual clock and replaces wall time,
    // keeping runs reproducible
    if let Some(cap) = self.config.max_iterations {
      return self.iterations < cap;
    }
    return self.start.elapsed() < self.config.max_time;
  }

  fn elapsed(&self) -> Duration {
    return self.start.elapsed();
  }
}

fn grasp_rebuild<R: Rng>(
  instance: &Instance,
  solution: &mut Solution,
  alpha: f64,
  rng: &mut R,
) -> Result<(), SolverError> {
  let alpha = f64::min(alpha, 1.0);
  builder::build_solution(instance, solution, MachineStrategy::Grasp { alpha: alpha }, rng)?;
  solution.rebuild_graph(instance, true);
  solution.recalculate_times(instance)?;
  return Ok(());
}

/// Calibrates the starting temperature toward a worsening-move acceptance
/// rate in [0.2, 0.5], beginning from the configured seed temperature
/// clamped to [0.1 * makespan, 5 * makespan].
fn calibrate_temperature<R: Rng>(
  instance: &Instance,
  solution: &Solution,
  config: &Config,
  search: &mut LocalSearch,
  rng: &mut R,
  log: &mut RunLog,
  sbp_log: &mut RunLog,
) -> Result<f64, SolverError> {
  let min_t = 0.1 * solution.makespan as f64;
  let max_t = 5.0 * solution.makespan as f64;
  let mut temperature = f64::min(f64::max(config.initial_temperature, min_t), max_t);

  let trials = std::cmp::max(1, config.k * instance.n_ops());
  let calibration_budget = config.max_time.mul_f64(0.15);
  let start = Instant::now();
  const MAX_ROUNDS: usize = 20;

  log.log(&format!(
    "[tempcalc] starting T0 calculation with limits [{:.2}, {:.2}]",
    min_t, max_t
  ));

  for _ in 0..MAX_ROUNDS {
    // on a pure iteration budget the wall clock is ignored for determinism
    if config.max_iterations.is_none() && start.elapsed() >= calibration_budget {
      break;
    }

    let mut accepted = 0usize;
    let mut recent: Vec<f64> = Vec::new();
    for trial in 0..trials {
      let neighbor =
        search.generate_neighbor(instance, solution, 0, 1.0, rng, log, sbp_log)?;
      let (makespan, _) = match neighbor {
        Some(pair) => pair,
        None => continue,
      };

      let delta = makespan as f64 - solution.makespan as f64;
      if delta <= 0.0 || rng.gen_range(0.0, 1.0) < (-delta / temperature).exp() {
        accepted += 1;
      }

      recent.push(accepted as f64 / (trial + 1) as f64);
      let window = 20;
      if recent.len() > window {
        let tail = &recent[recent.len() - window..];
        let mean: f64 = tail.iter().sum::<f64>() / window as f64;
        if mean > 0.3 {
          break;
        }
      }
    }

    let rate = accepted as f64 / trials as f64;
    log.log(&format!(
      "[tempcalc] T = {:.2} | acceptance = {:.2}",
      temperature, rate
    ));

    if rate < 0.2 {
      temperature *= config.beta;
    } else if rate > 0.5 {
      temperature *= 0.9;
    } else {
      break;
    }
    temperature = f64::min(f64::max(temperature, min_t), max_t);
  }

  log.log(&format!("[tempcalc] final initial T: {:.2}", temperature));
  return Ok(temperature);
}

/// Simulated annealing over tabu-aware critical-path reassignments, with
/// GRASP restarts as diversification and the recorded best never worsening.
pub fn optimize(
  instance: &Instance,
  initial: &Solution,
  config: &Config,
  log: &mut RunLog,
  sbp_log: &mut RunLog,
) -> Result<SaResult, SolverError> {
  let mut rng = ChaChaRng::seed_from_u64(config.seed);
  let mut search = LocalSearch::new();

  let mut current = Solution::new(instance);
  current.copy_from(initial);
  let mut best = Solution::new(instance);
  best.copy_from(initial);

  let iterations_per_temp = std::cmp::max(1, config.k * instance.n_ops());
  let stagnation_limit = (0.8 * iterations_per_temp as f64) as usize;
  let max_no_neighbors = iterations_per_temp;

  log.log("[1] calculating initial temperature");
  let start_temperature = calibrate_temperature(
    instance, &current, config, &mut search, &mut rng, log, sbp_log,
  )?;
  let mut temperature = start_temperature;

  log.log("[2] starting SA optimization");
  log.log(&format!(
    "starting best: {} | stagnation limit: {} its | max its per temp: {}",
    best.makespan, stagnation_limit, iterations_per_temp
  ));

  let mut budget = Budget::new(config);
  let mut intensity: u32 = 0;
  let mut no_improve: usize = 0;
  let mut no_neighbors: usize = 0;
  let mut diversify_level: usize = 0;

  while temperature > config.final_temperature && budget.remaining() {
    let log = &mut log.scope();
    log.log(&format!(
      "temperature: {:.4} | current: {} | best: {}",
      temperature, current.makespan, best.makespan
    ));

    let mut iteration = 0;
    while iteration < iterations_per_temp && budget.remaining() {
      iteration += 1;
      budget.tick();

      // A neighbor needs a flexible op on the critical path or an
      // alternative critical path to explore.
      let (critical_path, multiple) = current.find_critical_path(instance, &mut rng);
      let has_flexible = critical_path.iter().any(|&op| instance.is_flexible(op));

      if !has_flexible && !multiple {
        no_neighbors += 1;
        let f = if no_neighbors < max_no_neighbors / 4 {
          0.2
        } else if no_neighbors <= max_no_neighbors / 2 {
          0.6
        } else {
          0.9
        };
        log.log(&format!(
          "no neighbor possible from current, grasping a new solution (alpha {:.2})",
          0.1 + f
        ));

        grasp_rebuild(instance, &mut current, 0.1 + f, &mut rng)?;
        temperature = start_temperature;
        intensity = 0;
        no_improve = 0;
        diversify_level = 0;
        if current.makespan < best.makespan {
          best.copy_from(&current);
        }
        continue;
      }
      no_neighbors = 0;

      let t_rel = temperature / config.initial_temperature;
      let neighbor =
        search.generate_neighbor(instance, &current, intensity, t_rel, &mut rng, log, sbp_log)?;
      let (new_makespan, neighbor) = match neighbor {
        Some(pair) => pair,
        None => {
          log.log("local search failed to produce a non-tabu neighbor, grasping");
          grasp_rebuild(instance, &mut current, 0.5, &mut rng)?;
          intensity = 0;
          no_improve = 0;
          if current.makespan < best.makespan {
            best.copy_from(&current);
          }
          continue;
        }
      };

      let delta = new_makespan as f64 - current.makespan as f64;
      if delta <= 0.0 {
        current.copy_from(&neighbor);
        if new_makespan < best.makespan {
          best.copy_from(&neighbor);
          no_improve = 0;
          intensity = 0;
          diversify_level = 0;
          log.log(&format!("new BEST: {}", best.makespan));
        } else {
          no_improve += 1;
        }
      } else {
        let acceptance = (-delta / temperature).exp();
        let draw = rng.gen_range(0.0, 1.0);
        if draw < acceptance {
          current.copy_from(&neighbor);
          log.log(&format!(
            "worsening neighbor {} accepted (p {:.4}, draw {:.4})",
            new_makespan, acceptance, draw
          ));
        }
        no_improve += 1;
      }

      if no_improve > stagnation_limit {
        if intensity < 3 {
          intensity += 1;
          no_improve = 0;
          log.log(&format!("stagnation reached, new intensity {}", intensity));
        } else {
          let f = match diversify_level {
            0 => 0.2,
            1 => 0.35,
            _ => 0.5,
          };
          diversify_level += 1;
          log.log(&format!(
            "strong stagnation, grasping a brand new solution (alpha {:.2})",
            0.5 + f
          ));
          grasp_rebuild(instance, &mut current, 0.5 + f, &mut rng)?;
          intensity = 0;
          no_improve = 0;
          if current.makespan < best.makespan {
            best.copy_from(&current);
          }
        }
      }
    }

    if no_neighbors > max_no_neighbors {
      log.log("max no-neighbor attempts reached, stopping");
      break;
    }

    temperature *= config.alpha;
  }

  let elapsed = budget.elapsed();
  let gap = evaluate_gap(best.makespan, instance.optimum);
  log.log(&format!(
    "SA finished | best {} | elapsed {:.2}s | iterations {}",
    best.makespan,
    elapsed.as_secs_f64(),
    budget.iterations
  ));
  log::info!(
    "simulated annealing finished with makespan {} after {} iterations",
    best.makespan,
    budget.iterations
  );

  return Ok(SaResult {
    best: best,
    elapsed: elapsed,
    gap: gap,
  });
}
