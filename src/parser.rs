use crate::data::{Duration, Instance, Machine, OpId, Time};
use crate::error::SolverError;
use ndarray::Array2;
use serde::Deserialize;
use std::path::Path;

fn missing(what: &str) -> SolverError {
  return SolverError::InvalidInstance(format!("{} missing", what));
}

fn parse_token<T: std::str::FromStr>(token: &str, what: &str) -> Result<T, SolverError> {
  return token
    .parse()
    .map_err(|_| SolverError::InvalidInstance(format!("invalid {}: '{}'", what, token)));
}

/// Parses the whitespace-delimited flexible job shop format:
/// a `num_jobs num_machines` prelude, then one line per job holding the
/// operation count followed by `k  m_1 t_1 .. m_k t_k` groups.
///
/// Raw machine ids are collected, sorted ascending and mapped to dense
/// indices `0..n_machines`.
pub fn parse_instance(name: &str, contents: &str) -> Result<Instance, SolverError> {
  let mut lines = contents.lines().filter(|l| !l.trim().is_empty());

  let prelude = lines.next().ok_or_else(|| missing("prelude"))?;
  let prelude_items: Vec<&str> = prelude.split_whitespace().collect();
  let n_jobs: usize = parse_token(prelude_items.get(0).ok_or_else(|| missing("n_jobs"))?, "n_jobs")?;
  let declared_machines: usize = parse_token(
    prelude_items.get(1).ok_or_else(|| missing("n_machines"))?,
    "n_machines",
  )?;

  if n_jobs == 0 {
    return Err(SolverError::InvalidInstance("instance has no jobs".to_string()));
  }

  // First pass: tokenize every job into (raw_machine, time) groups per op.
  let mut jobs: Vec<Vec<Vec<(u32, Duration)>>> = Vec::with_capacity(n_jobs);
  for job in 0..n_jobs {
    let line = lines
      .next()
      .ok_or_else(|| SolverError::InvalidInstance(format!("job line {} missing", job)))?;
    let items: Vec<&str> = line.split_whitespace().collect();

    let mut idx = 0;
    let n_ops: usize = parse_token(items.get(idx).ok_or_else(|| missing("op count"))?, "op count")?;
    idx += 1;

    if n_ops == 0 {
      return Err(SolverError::InvalidInstance(format!("job {} has no operations", job)));
    }

    let mut ops = Vec::with_capacity(n_ops);
    for _ in 0..n_ops {
      let k: usize = parse_token(
        items.get(idx).ok_or_else(|| missing("machine count"))?,
        "machine count",
      )?;
      idx += 1;

      if k == 0 {
        return Err(SolverError::InvalidInstance(format!(
          "operation in job {} has an empty machine set",
          job
        )));
      }

      let mut options = Vec::with_capacity(k);
      for _ in 0..k {
        let machine: u32 = parse_token(items.get(idx).ok_or_else(|| missing("machine"))?, "machine")?;
        let time: Duration =
          parse_token(items.get(idx + 1).ok_or_else(|| missing("duration"))?, "duration")?;
        idx += 2;

        if time == 0 {
          return Err(SolverError::InvalidInstance(format!(
            "non-positive processing time for machine {} in job {}",
            machine, job
          )));
        }
        options.push((machine, time));
      }
      ops.push(options);
    }
    jobs.push(ops);
  }

  // Collect the machine set and assign dense indices.
  let mut machine_ids: Vec<u32> = jobs
    .iter()
    .flat_map(|job| job.iter())
    .flat_map(|op| op.iter().map(|&(m, _)| m))
    .collect();
  machine_ids.sort_unstable();
  machine_ids.dedup();

  let n_machines = machine_ids.len();
  if n_machines != declared_machines {
    log::warn!(
      "instance declares {} machines but uses {}",
      declared_machines,
      n_machines
    );
  }
  let dense = |raw: u32| -> Machine {
    return machine_ids.binary_search(&raw).unwrap();
  };

  let n_ops: usize = jobs.iter().map(|job| job.len()).sum();
  let mut durations = Array2::<Duration>::from_elem((n_ops, n_machines), 0);
  let mut eligible: Vec<Vec<Machine>> = Vec::with_capacity(n_ops);
  let mut ops_by_job: Vec<Vec<OpId>> = Vec::with_capacity(n_jobs);
  let mut job_of_op: Vec<usize> = Vec::with_capacity(n_ops);

  let mut op_counter: OpId = 0;
  for (job, ops) in jobs.iter().enumerate() {
    let mut job_ops = Vec::with_capacity(ops.len());
    for options in ops {
      let mut machines: Vec<Machine> = Vec::with_capacity(options.len());
      for &(raw, time) in options {
        let m = dense(raw);
        durations[[op_counter, m]] = time;
        machines.push(m);
      }
      machines.sort_unstable();
      machines.dedup();

      eligible.push(machines);
      job_of_op.push(job);
      job_ops.push(op_counter);
      op_counter += 1;
    }
    ops_by_job.push(job_ops);
  }

  let mut ops_by_machine: Vec<Vec<OpId>> = vec![Vec::new(); n_machines];
  for op in 0..n_ops {
    for &m in &eligible[op] {
      ops_by_machine[m].push(op);
    }
  }

  return Ok(Instance {
    name: name.to_string(),
    n_jobs: n_jobs,
    n_machines: n_machines,
    machine_ids: machine_ids,
    durations: durations,
    eligible: eligible,
    ops_by_job: ops_by_job,
    job_of_op: job_of_op,
    ops_by_machine: ops_by_machine,
    optimum: None,
  });
}

#[derive(Debug, Deserialize)]
struct KnownOptimum {
  name: String,
  optimum: Option<f64>,
}

/// Looks up the known optimum for `instance_name` in the JSON table.
/// A missing table, a missing record and a `null` optimum all yield `None`.
pub fn lookup_optimum(instance_name: &str, table_path: &Path) -> Option<Time> {
  let contents = match std::fs::read_to_string(table_path) {
    Ok(contents) => contents,
    Err(err) => {
      log::warn!("could not read optimum table {:?}: {}", table_path, err);
      return None;
    }
  };

  let records: Vec<KnownOptimum> = match serde_json::from_str(&contents) {
    Ok(records) => records,
    Err(err) => {
      log::warn!("could not parse optimum table {:?}: {}", table_path, err);
      return None;
    }
  };

  return records
    .into_iter()
    .find(|record| record.name == instance_name)
    .and_then(|record| record.optimum)
    .map(|optimum| optimum.round() as Time);
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_the_trivial_single_op_instance() {
    let inst = parse_instance("t", "1 1\n1 1 1 5\n").unwrap();

    assert_eq!(inst.n_jobs, 1);
    assert_eq!(inst.n_machines, 1);
    assert_eq!(inst.n_ops(), 1);
    assert_eq!(inst.machine_ids, vec![1]);
    assert_eq!(inst.duration(0, 0), 5);
    assert_eq!(inst.eligible[0], vec![0]);
  }

  #[test]
  fn parses_flexible_operations_and_densifies_machine_ids() {
    let inst = parse_instance("t", "1 2\n2 2 1 10 2 1 2 1 2 2 5\n").unwrap();

    assert_eq!(inst.n_ops(), 2);
    assert_eq!(inst.machine_ids, vec![1, 2]);
    assert_eq!(inst.eligible[0], vec![0, 1]);
    assert_eq!(inst.duration(0, 0), 10);
    assert_eq!(inst.duration(0, 1), 1);
    assert_eq!(inst.duration(1, 0), 2);
    assert_eq!(inst.duration(1, 1), 5);
  }

  #[test]
  fn global_op_ids_follow_file_order() {
    let inst = parse_instance("t", "2 2\n2 1 1 3 1 2 2\n2 1 2 4 1 1 1\n").unwrap();

    assert_eq!(inst.ops_by_job, vec![vec![0, 1], vec![2, 3]]);
    assert_eq!(inst.job_of_op, vec![0, 0, 1, 1]);
    // raw ids 1, 2 map to dense 0, 1
    assert_eq!(inst.eligible[1], vec![1]);
    assert_eq!(inst.eligible[3], vec![0]);
  }

  #[test]
  fn rejects_empty_machine_sets() {
    let err = parse_instance("t", "1 1\n1 0\n").unwrap_err();
    assert!(format!("{}", err).contains("empty machine set"));
  }

  #[test]
  fn rejects_zero_processing_times() {
    assert!(parse_instance("t", "1 1\n1 1 1 0\n").is_err());
  }

  #[test]
  fn rejects_truncated_job_lines() {
    assert!(parse_instance("t", "1 1\n1 2 1 5\n").is_err());
    assert!(parse_instance("t", "2 1\n1 1 1 5\n").is_err());
  }

  #[test]
  fn optimum_lookup_handles_missing_tables() {
    assert_eq!(lookup_optimum("mk01", Path::new("/nonexistent/instances.json")), None);
  }

  #[test]
  fn optimum_lookup_finds_named_records() {
    let dir = std::env::temp_dir().join("fjssp-parser-test");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("instances.json");
    std::fs::write(
      &path,
      r#"[{"name": "mk01", "optimum": 40}, {"name": "mk02", "optimum": null}]"#,
    )
    .unwrap();

    assert_eq!(lookup_optimum("mk01", &path), Some(40));
    assert_eq!(lookup_optimum("mk02", &path), None);
    assert_eq!(lookup_optimum("mk03", &path), None);
  }
}
