use crate::data::Instance;
use crate::error::SolverError;
use crate::logging::RunLog;
use crate::parser;
use crate::render;
use crate::solver::builder::{self, MachineStrategy};
use crate::solver::simulated_annealing::{self, Config as SaConfig};
use crate::solver::{evaluate_gap, gap_to_string, verify_solution, Solution};
use rand::SeedableRng;
use rand_chacha::ChaChaRng;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Method {
  Cbc,
  Sa,
  Both,
}

impl FromStr for Method {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    return match s {
      "cbc" => Ok(Method::Cbc),
      "SA" | "sa" => Ok(Method::Sa),
      "both" => Ok(Method::Both),
      _ => Err(format!("unknown method '{}'", s)),
    };
  }
}

pub struct RunConfig {
  pub instance_path: PathBuf,
  pub output_dir: PathBuf,
  pub optimum_table: PathBuf,
  pub method: Method,
  pub time_limit: f64,
  pub sa_log_writing: bool,
  pub sbp_log_writing: bool,
  pub seed: u64,
}

impl RunConfig {
  pub fn new(instance_path: PathBuf, method: Method) -> Self {
    return RunConfig {
      instance_path: instance_path,
      output_dir: PathBuf::from("files/output"),
      optimum_table: PathBuf::from("files/instances/instances.json"),
      method: method,
      time_limit: 300.0,
      sa_log_writing: false,
      sbp_log_writing: false,
      seed: 42,
    };
  }
}

fn write_dag_if_drawable(svg: Option<String>, path: &Path, status: &mut dyn FnMut(String)) {
  match svg {
    Some(svg) => {
      if let Err(err) = render::write_svg(&svg, path) {
        log::warn!("could not write DAG {:?}: {}", path, err);
      }
    }
    None => status(format!("DAG export skipped for {:?} (too many disjunctives)", path)),
  }
}

/// Loads the instance and runs the requested methods end to end, writing
/// the instance echo, the Gantt/DAG exports and `results.csv` into a
/// per-instance output directory. Progress is streamed as plain messages
/// through `status`.
pub fn run(config: &RunConfig, status: &mut dyn FnMut(String)) -> Result<(), SolverError> {
  let contents = std::fs::read_to_string(&config.instance_path)?;
  let name = config
    .instance_path
    .file_stem()
    .map(|stem| stem.to_string_lossy().to_string())
    .unwrap_or_else(|| "instance".to_string());

  let mut instance: Instance = parser::parse_instance(&name, &contents)?;
  instance.optimum = parser::lookup_optimum(&name, &config.optimum_table);

  status(format!(
    "instance {} successfully loaded | known optimum = {}",
    name,
    instance
      .optimum
      .map(|o| o.to_string())
      .unwrap_or_else(|| "unknown".to_string())
  ));

  let instance_dir = config.output_dir.join(&name);
  let gantt_dir = instance_dir.join("Gantts");
  let dag_dir = instance_dir.join("DAGs");
  std::fs::create_dir_all(&gantt_dir)?;
  std::fs::create_dir_all(&dag_dir)?;
  status("created output paths".to_string());

  std::fs::write(
    instance_dir.join(format!("instance - {}.inst", name)),
    instance.summary(),
  )?;
  write_dag_if_drawable(
    render::render_dag(
      &instance,
      &render::instance_disjunctive_pairs(&instance),
      &format!("{} - instance", name),
    ),
    &dag_dir.join(format!("{} - instance.svg", name)),
    status,
  );
  status(format!(
    "created and saved '{}' instance dump and DAG, check {:?}",
    name, instance_dir
  ));

  let mut headers: Vec<String> = Vec::new();
  let mut values: Vec<String> = Vec::new();

  if config.method == Method::Cbc || config.method == Method::Both {
    // the MIP baseline is an external collaborator and is not bundled
    log::warn!("method 'cbc' requested but no MIP baseline is bundled, skipping");
    status("cbc method requested: no MIP baseline bundled, skipping".to_string());
  }

  if config.method == Method::Sa || config.method == Method::Both {
    status("solving FJSSP with heuristic approach".to_string());

    let mut rng = ChaChaRng::seed_from_u64(config.seed);
    let mut solution = Solution::new(&instance);
    status("building a feasible initial solution with constructive heuristic".to_string());
    builder::build_solution(
      &instance,
      &mut solution,
      MachineStrategy::Grasp { alpha: 0.35 },
      &mut rng,
    )?;
    solution.rebuild_graph(&instance, true);
    solution.recalculate_times(&instance)?;
    if let Err(violation) = verify_solution(&instance, &solution) {
      log::error!("constructive solution failed verification: {}", violation);
    }

    let constructive_gap = evaluate_gap(solution.makespan, instance.optimum);
    headers.push("constr.heur makespan".to_string());
    values.push(solution.makespan.to_string());
    headers.push("constr.heur gap".to_string());
    values.push(gap_to_string(constructive_gap));
    status(format!(
      "constructive heuristic makespan: {} | gap: {}",
      solution.makespan,
      gap_to_string(constructive_gap)
    ));

    render::write_svg(
      &render::render_gantt(&instance, &solution, &format!("{} - constructive heur solution", name)),
      &gantt_dir.join(format!("{} - constructive heur solution.svg", name)),
    )?;
    solution.populate_visuals(&instance, false);
    write_dag_if_drawable(
      render::render_dag(
        &instance,
        &render::solution_disjunctive_pairs(&solution, &instance),
        &format!("{} - constructive heuristic initial solution", name),
      ),
      &dag_dir.join(format!("{} - constructive heuristic initial solution.svg", name)),
      status,
    );
    status("saved initial solution Gantt and DAG".to_string());

    status("starting SA optimization".to_string());
    let mut sa_log = if config.sa_log_writing {
      RunLog::to_file(&instance_dir.join("salog.log"))
    } else {
      RunLog::off()
    };
    let mut sbp_log = if config.sbp_log_writing {
      RunLog::to_file(&instance_dir.join("sbplog.log"))
    } else {
      RunLog::off()
    };

    let sa_config = SaConfig {
      max_time: Duration::from_secs_f64(config.time_limit),
      seed: config.seed,
      ..SaConfig::default()
    };
    let result = simulated_annealing::optimize(
      &instance,
      &solution,
      &sa_config,
      &mut sa_log,
      &mut sbp_log,
    )?;
    if let Err(violation) = verify_solution(&instance, &result.best) {
      log::error!("SA solution failed verification: {}", violation);
    }

    headers.push("SA makespan".to_string());
    values.push(result.best.makespan.to_string());
    headers.push("SA time".to_string());
    values.push(format!("{:.2}", result.elapsed.as_secs_f64()));
    headers.push("SA gap".to_string());
    values.push(gap_to_string(result.gap));
    status(format!(
      "SA best makespan: {} | time: {:.2}s | gap: {}",
      result.best.makespan,
      result.elapsed.as_secs_f64(),
      gap_to_string(result.gap)
    ));

    render::write_svg(
      &render::render_gantt(&instance, &result.best, &format!("{} - SA best solution", name)),
      &gantt_dir.join(format!("{} - SA best solution.svg", name)),
    )?;
    status("saved SA solution Gantt".to_string());
  }

  let results_path = instance_dir.join("results.csv");
  if headers.is_empty() {
    std::fs::write(&results_path, "")?;
  } else {
    let mut writer = csv::Writer::from_path(&results_path)?;
    writer.write_record(&headers)?;
    writer.write_record(&values)?;
    writer.flush()?;
  }
  status(format!("saved results in {:?}", results_path));

  return Ok(());
}
