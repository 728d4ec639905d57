use crate::data::{Duration, Instance, OpId, Time};
use crate::error::SolverError;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct SchrageResult {
  pub lmax: Time,
  pub start_times: HashMap<OpId, Time>,
  pub finish_times: HashMap<OpId, Time>,
  pub sequence: Vec<OpId>,
}

/// Non-preemptive list schedule for one machine under release dates `r`,
/// processing times `p` and delivery times `q`: at each decision point the
/// ready operation with the largest delivery time is dispatched (ties to
/// the lowest id). Operations of one job keep their technological order;
/// release dates are first propagated along same-job chains on an internal
/// copy.
pub fn schedule(
  instance: &Instance,
  ops: &[OpId],
  release: &HashMap<OpId, Time>,
  processing: &HashMap<OpId, Duration>,
  delivery: &HashMap<OpId, Time>,
) -> Result<SchrageResult, SolverError> {
  if ops.is_empty() {
    return Ok(SchrageResult {
      lmax: 0,
      start_times: HashMap::new(),
      finish_times: HashMap::new(),
      sequence: Vec::new(),
    });
  }

  let mut release: HashMap<OpId, Time> = release.clone();

  // Tighten release dates along technological chains within this op set.
  for ops_of_job in &instance.ops_by_job {
    for window in ops_of_job.windows(2) {
      let (pred, curr) = (window[0], window[1]);
      if release.contains_key(&pred) && release.contains_key(&curr) {
        let chained = release[&pred] + processing[&pred];
        if chained > release[&curr] {
          release.insert(curr, chained);
        }
      }
    }
  }

  let mut remaining: Vec<OpId> = ops.to_vec();
  let mut ready: Vec<OpId> = Vec::new();
  let mut sequence: Vec<OpId> = Vec::new();
  let mut start_times = HashMap::new();
  let mut finish_times = HashMap::new();
  let mut lmax: Time = 0;

  let in_subset = |op: OpId| -> bool { ops.contains(&op) };
  let mut t = ops.iter().map(|op| release[op]).min().unwrap();

  while !remaining.is_empty() || !ready.is_empty() {
    // Admit released ops whose same-job predecessors in this set are done.
    let mut admitted = Vec::new();
    for &op in &remaining {
      if release[&op] > t {
        continue;
      }
      let mut pred = instance.job_pred(op);
      let mut preds_done = true;
      while let Some(p) = pred {
        if in_subset(p) && !sequence.contains(&p) {
          preds_done = false;
          break;
        }
        pred = instance.job_pred(p);
      }
      if preds_done {
        admitted.push(op);
      }
    }
    remaining.retain(|op| !admitted.contains(op));
    ready.extend(admitted);

    if !ready.is_empty() {
      let mut best = ready[0];
      for &op in &ready[1..] {
        let better = delivery[&op] > delivery[&best] || (delivery[&op] == delivery[&best] && op < best);
        if better {
          best = op;
        }
      }
      ready.retain(|&op| op != best);

      start_times.insert(best, t);
      t += processing[&best];
      finish_times.insert(best, t);
      sequence.push(best);
      lmax = std::cmp::max(lmax, t + delivery[&best]);
    } else {
      let next = remaining.iter().map(|op| release[op]).min().unwrap();
      if next <= t {
        // every remaining op is released yet blocked on a predecessor
        // that can never be admitted
        return Err(SolverError::InfeasibleSubproblem);
      }
      t = next;
    }
  }

  return Ok(SchrageResult {
    lmax: lmax,
    start_times: start_times,
    finish_times: finish_times,
    sequence: sequence,
  });
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::parser::parse_instance;

  fn maps(entries: &[(OpId, Time)]) -> HashMap<OpId, Time> {
    return entries.iter().cloned().collect();
  }

  fn independent_ops_instance() -> Instance {
    // four single-op jobs sharing one machine
    return parse_instance("t", "4 1\n1 1 1 1\n1 1 1 1\n1 1 1 1\n1 1 1 1\n").unwrap();
  }

  #[test]
  fn dispatches_by_largest_delivery_time() {
    let inst = independent_ops_instance();
    let ops = vec![0, 1, 2];
    let r = maps(&[(0, 0), (1, 0), (2, 0)]);
    let p = maps(&[(0, 3), (1, 2), (2, 4)]);
    let q = maps(&[(0, 1), (1, 7), (2, 4)]);

    let result = schedule(&inst, &ops, &r, &p, &q).unwrap();
    assert_eq!(result.sequence, vec![1, 2, 0]);
    // finishes 2, 6, 9; lateness max(2+7, 6+4, 9+1) = 10
    assert_eq!(result.lmax, 10);
    assert_eq!(result.start_times[&1], 0);
    assert_eq!(result.start_times[&2], 2);
    assert_eq!(result.start_times[&0], 6);
  }

  #[test]
  fn idles_until_the_next_release() {
    let inst = independent_ops_instance();
    let ops = vec![0, 1];
    let r = maps(&[(0, 0), (1, 10)]);
    let p = maps(&[(0, 2), (1, 1)]);
    let q = maps(&[(0, 0), (1, 5)]);

    let result = schedule(&inst, &ops, &r, &p, &q).unwrap();
    assert_eq!(result.sequence, vec![0, 1]);
    assert_eq!(result.start_times[&1], 10);
    assert_eq!(result.lmax, 16);
  }

  #[test]
  fn equal_delivery_ties_go_to_the_lowest_id() {
    let inst = independent_ops_instance();
    let ops = vec![0, 1, 2, 3];
    let r = maps(&[(0, 0), (1, 0), (2, 0), (3, 0)]);
    let p = maps(&[(0, 1), (1, 1), (2, 1), (3, 1)]);
    let q = maps(&[(0, 5), (1, 5), (2, 5), (3, 5)]);

    let result = schedule(&inst, &ops, &r, &p, &q).unwrap();
    assert_eq!(result.sequence, vec![0, 1, 2, 3]);
  }

  #[test]
  fn same_job_ops_keep_their_order_and_propagate_releases() {
    // one job with two chained ops, both on the shared machine
    let inst = parse_instance("t", "1 1\n2 1 1 3 1 1 2\n").unwrap();
    let ops = vec![0, 1];
    let r = maps(&[(0, 0), (1, 0)]);
    let p = maps(&[(0, 3), (1, 2)]);
    // successor has the larger q but must still run second
    let q = maps(&[(0, 2), (1, 9)]);

    let result = schedule(&inst, &ops, &r, &p, &q).unwrap();
    assert_eq!(result.sequence, vec![0, 1]);
    assert_eq!(result.start_times[&1], 3);
    assert_eq!(result.lmax, 14);
  }

  #[test]
  fn deterministic_for_fixed_inputs() {
    let inst = independent_ops_instance();
    let ops = vec![0, 1, 2, 3];
    let r = maps(&[(0, 2), (1, 0), (2, 5), (3, 0)]);
    let p = maps(&[(0, 2), (1, 3), (2, 1), (3, 2)]);
    let q = maps(&[(0, 4), (1, 4), (2, 8), (3, 1)]);

    let first = schedule(&inst, &ops, &r, &p, &q).unwrap();
    let second = schedule(&inst, &ops, &r, &p, &q).unwrap();
    assert_eq!(first.sequence, second.sequence);
    assert_eq!(first.lmax, second.lmax);
  }
}
