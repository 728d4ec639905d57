use crate::data::{Duration, Instance, OpId, Time};
use crate::error::SolverError;
use crate::logging::RunLog;
use crate::solver::schrage::{self, SchrageResult};
use std::collections::HashMap;

const DEFAULT_MAX_DEPTH: usize = 30;

/// Depth-first branch-and-bound around the Schrage schedule, minimizing
/// maximum lateness on one machine. Branching fixes the classic Carlier
/// decision for the critical operation `k`: process it before or after the
/// tail block `J` by raising its delivery or release time. Recursion depth
/// is capped; on the cap the current incumbent is returned.
pub struct CarlierSolver<'a> {
  instance: &'a Instance,
  ops: Vec<OpId>,
  release: HashMap<OpId, Time>,
  processing: HashMap<OpId, Duration>,
  delivery: HashMap<OpId, Time>,
  max_depth: usize,
  best_lmax: Time,
  best_sequence: Vec<OpId>,
}

impl<'a> CarlierSolver<'a> {
  pub fn new(
    instance: &'a Instance,
    ops: Vec<OpId>,
    release: HashMap<OpId, Time>,
    processing: HashMap<OpId, Duration>,
    delivery: HashMap<OpId, Time>,
  ) -> Self {
    return CarlierSolver {
      instance: instance,
      ops: ops,
      release: release,
      processing: processing,
      delivery: delivery,
      max_depth: DEFAULT_MAX_DEPTH,
      best_lmax: Time::max_value(),
      best_sequence: Vec::new(),
    };
  }

  pub fn with_max_depth(mut self, max_depth: usize) -> Self {
    self.max_depth = max_depth;
    return self;
  }

  pub fn solve(&mut self, log: &mut RunLog) -> Result<(Time, Vec<OpId>), SolverError> {
    self.best_lmax = Time::max_value();
    self.best_sequence = Vec::new();

    log.log(&format!(
      "carlier: ops {:?} | max depth {}",
      self.ops, self.max_depth
    ));
    self.branch(0, log)?;

    log.log(&format!(
      "carlier finished | lmax {} | sequence {:?}",
      self.best_lmax, self.best_sequence
    ));
    return Ok((self.best_lmax, self.best_sequence.clone()));
  }

  fn branch(&mut self, depth: usize, log: &mut RunLog) -> Result<Time, SolverError> {
    if depth > self.max_depth {
      log.log("carlier: max recursion depth reached, keeping incumbent");
      return Ok(self.best_lmax);
    }
    let log = &mut log.scope();

    let result = schrage::schedule(
      self.instance,
      &self.ops,
      &self.release,
      &self.processing,
      &self.delivery,
    )?;
    let lmax = result.lmax;

    if lmax < self.best_lmax {
      self.best_lmax = lmax;
      self.best_sequence = result.sequence.clone();
      log.log(&format!("carlier: new incumbent {} at depth {}", lmax, depth));
    }

    let block = self.critical_block(&result);
    if block.is_empty() {
      return Ok(lmax);
    }

    // Optimality test: the block's own lower bound meets the schedule.
    let r_min = block.iter().map(|op| self.release[op]).min().unwrap();
    let q_min = block.iter().map(|op| self.delivery[op]).min().unwrap();
    let p_sum: Time = block.iter().map(|op| self.processing[op]).sum();
    if r_min + p_sum + q_min == lmax {
      log.log(&format!("carlier: block lower bound matches {} , optimal", lmax));
      return Ok(lmax);
    }

    // A block holding two ops of one job is already sequenced by precedence
    // and the standard branching cannot improve it.
    let mut jobs: Vec<usize> = block.iter().map(|&op| self.instance.job_of_op[op]).collect();
    jobs.sort_unstable();
    jobs.dedup();
    if jobs.len() < block.len() {
      log.log("carlier: critical block has intra-job ops, not branching");
      return Ok(lmax);
    }

    let i2 = *block.last().unwrap();
    let q_i2 = self.delivery[&i2];
    let k = block[..block.len() - 1]
      .iter()
      .rev()
      .find(|&&op| self.delivery[&op] < q_i2)
      .cloned();
    let k = match k {
      Some(k) => k,
      None => {
        log.log("carlier: no branching op found, terminating branch");
        return Ok(lmax);
      }
    };

    let k_index = block.iter().position(|&op| op == k).unwrap();
    let tail = &block[k_index + 1..];
    let tail_p_sum: Time = tail.iter().map(|op| self.processing[op]).sum();
    log.log(&format!("carlier: branching on op {} with block J = {:?}", k, tail));

    // Child A: process k before J by raising its delivery time.
    let q_k = self.delivery[&k];
    let new_q = std::cmp::max(q_k, tail_p_sum + self.delivery[tail.last().unwrap()]);
    let f1 = if new_q > q_k {
      self.delivery.insert(k, new_q);
      let f1 = self.branch(depth + 1, log)?;
      self.delivery.insert(k, q_k);
      f1
    } else {
      Time::max_value()
    };

    // Child B: process k after J by raising its release date.
    let r_k = self.release[&k];
    let tail_r_min = tail.iter().map(|op| self.release[op]).min().unwrap();
    let new_r = std::cmp::max(r_k, tail_r_min + tail_p_sum);
    let f2 = if new_r > r_k {
      self.release.insert(k, new_r);
      let f2 = self.branch(depth + 1, log)?;
      self.release.insert(k, r_k);
      f2
    } else {
      Time::max_value()
    };

    return Ok(std::cmp::min(f1, f2));
  }

  /// The contiguous critical block ending in the op that realizes the
  /// maximum lateness: predecessors are collected while the schedule has
  /// no idle gap.
  fn critical_block(&self, result: &SchrageResult) -> Vec<OpId> {
    let b_index = result
      .sequence
      .iter()
      .rposition(|op| result.finish_times[op] + self.delivery[op] == result.lmax);
    let b_index = match b_index {
      Some(index) => index,
      None => return Vec::new(),
    };

    let mut block = vec![result.sequence[b_index]];
    for index in (1..=b_index).rev() {
      let op = result.sequence[index];
      let pred = result.sequence[index - 1];
      if result.start_times[&op] == result.finish_times[&pred] {
        block.insert(0, pred);
      } else {
        break;
      }
    }

    return block;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::parser::parse_instance;
  use itertools::Itertools;

  fn maps(entries: &[(OpId, Time)]) -> HashMap<OpId, Time> {
    return entries.iter().cloned().collect();
  }

  fn single_op_jobs(n: usize) -> Instance {
    let mut body = format!("{} 1\n", n);
    for _ in 0..n {
      body.push_str("1 1 1 1\n");
    }
    return parse_instance("t", &body).unwrap();
  }

  fn brute_force_lmax(
    ops: &[OpId],
    r: &HashMap<OpId, Time>,
    p: &HashMap<OpId, Time>,
    q: &HashMap<OpId, Time>,
  ) -> Time {
    let mut best = Time::max_value();
    for perm in ops.iter().permutations(ops.len()) {
      let mut t = 0;
      let mut lmax = 0;
      for &&op in &perm {
        let start = std::cmp::max(t, r[&op]);
        t = start + p[&op];
        lmax = std::cmp::max(lmax, t + q[&op]);
      }
      best = std::cmp::min(best, lmax);
    }
    return best;
  }

  #[test]
  fn matches_brute_force_on_the_textbook_instance() {
    let inst = single_op_jobs(7);
    let ops: Vec<OpId> = (0..7).collect();
    let r = maps(&[(0, 10), (1, 13), (2, 11), (3, 20), (4, 30), (5, 0), (6, 30)]);
    let p = maps(&[(0, 5), (1, 6), (2, 7), (3, 4), (4, 3), (5, 6), (6, 2)]);
    let q = maps(&[(0, 7), (1, 26), (2, 24), (3, 21), (4, 8), (5, 17), (6, 0)]);

    let expected = brute_force_lmax(&ops, &r, &p, &q);
    let mut solver = CarlierSolver::new(&inst, ops.clone(), r.clone(), p.clone(), q.clone());
    let (lmax, sequence) = solver.solve(&mut RunLog::off()).unwrap();

    assert_eq!(lmax, expected);
    assert_eq!(sequence.len(), ops.len());
  }

  #[test]
  fn matches_brute_force_on_small_random_like_sets() {
    let inst = single_op_jobs(5);
    let cases: Vec<(Vec<Time>, Vec<Time>, Vec<Time>)> = vec![
      (vec![0, 2, 3, 1, 8], vec![3, 2, 2, 4, 1], vec![5, 9, 0, 3, 2]),
      (vec![4, 0, 0, 6, 2], vec![1, 5, 2, 2, 3], vec![0, 4, 7, 1, 6]),
      (vec![0, 0, 0, 0, 0], vec![2, 2, 2, 2, 2], vec![1, 2, 3, 4, 5]),
    ];

    for (rs, ps, qs) in cases {
      let ops: Vec<OpId> = (0..5).collect();
      let r: HashMap<OpId, Time> = ops.iter().map(|&o| (o, rs[o])).collect();
      let p: HashMap<OpId, Time> = ops.iter().map(|&o| (o, ps[o])).collect();
      let q: HashMap<OpId, Time> = ops.iter().map(|&o| (o, qs[o])).collect();

      let expected = brute_force_lmax(&ops, &r, &p, &q);
      let mut solver = CarlierSolver::new(&inst, ops, r, p, q);
      let (lmax, _) = solver.solve(&mut RunLog::off()).unwrap();
      assert_eq!(lmax, expected);
    }
  }

  #[test]
  fn intra_job_blocks_return_the_schrage_schedule() {
    // one job, two chained ops on the same machine; the released-late head
    // keeps the block lower bound strictly below the lateness, so only the
    // intra-job policy stops the branching
    let inst = parse_instance("t", "1 1\n2 1 1 3 1 1 2\n").unwrap();
    let ops = vec![0, 1];
    let r = maps(&[(0, 2), (1, 0)]);
    let p = maps(&[(0, 3), (1, 2)]);
    let q = maps(&[(0, 6), (1, 4)]);

    let schrage = schrage::schedule(&inst, &ops, &r, &p, &q).unwrap();
    let mut solver = CarlierSolver::new(&inst, ops, r, p, q);
    let (lmax, sequence) = solver.solve(&mut RunLog::off()).unwrap();

    assert_eq!(sequence, schrage.sequence);
    assert_eq!(lmax, schrage.lmax);
    assert_eq!(sequence, vec![0, 1]);
    assert_eq!(lmax, 11);
  }

  #[test]
  fn incumbent_never_exceeds_the_first_schrage_pass() {
    let inst = single_op_jobs(4);
    let ops: Vec<OpId> = (0..4).collect();
    let r = maps(&[(0, 0), (1, 1), (2, 2), (3, 3)]);
    let p = maps(&[(0, 4), (1, 2), (2, 3), (3, 1)]);
    let q = maps(&[(0, 0), (1, 6), (2, 2), (3, 8)]);

    let first = schrage::schedule(&inst, &ops, &r, &p, &q).unwrap();
    let mut solver = CarlierSolver::new(&inst, ops, r, p, q);
    let (lmax, _) = solver.solve(&mut RunLog::off()).unwrap();
    assert!(lmax <= first.lmax);
  }
}
