use ndarray::Array2;

pub type Machine = usize;
pub type Duration = u32;
pub type Time = u32;

pub type OpId = usize;

pub type Edge = (OpId, OpId);

/// Immutable problem data for a flexible job shop instance.
///
/// Operations carry global ids `0..n_ops` assigned in file order, so the
/// operations of one job are consecutive. Machines are dense indices
/// `0..n_machines`; the raw ids from the instance file are kept in
/// `machine_ids` for display only.
#[derive(Debug, Clone)]
pub struct Instance {
  pub name: String,
  pub n_jobs: usize,
  pub n_machines: usize,

  pub machine_ids: Vec<u32>,

  // durations[[op, m]] is p[(op, m)]; 0 marks an ineligible machine
  pub durations: Array2<Duration>,
  pub eligible: Vec<Vec<Machine>>,

  pub ops_by_job: Vec<Vec<OpId>>,
  pub job_of_op: Vec<usize>,
  pub ops_by_machine: Vec<Vec<OpId>>,

  pub optimum: Option<Time>,
}

impl Instance {
  pub fn n_ops(&self) -> usize {
    return self.job_of_op.len();
  }

  pub fn ops(&self) -> std::ops::Range<OpId> {
    return 0..self.n_ops();
  }

  pub fn machines(&self) -> std::ops::Range<Machine> {
    return 0..self.n_machines;
  }

  pub fn duration(&self, op: OpId, machine: Machine) -> Duration {
    return self.durations[[op, machine]];
  }

  pub fn is_eligible(&self, op: OpId, machine: Machine) -> bool {
    return self.durations[[op, machine]] > 0;
  }

  /// An operation is flexible when more than one machine can process it.
  pub fn is_flexible(&self, op: OpId) -> bool {
    return self.eligible[op].len() > 1;
  }

  pub fn job_pred(&self, op: OpId) -> Option<OpId> {
    if op > 0 && self.job_of_op[op - 1] == self.job_of_op[op] {
      return Some(op - 1);
    }
    return None;
  }

  pub fn job_succ(&self, op: OpId) -> Option<OpId> {
    if op + 1 < self.n_ops() && self.job_of_op[op + 1] == self.job_of_op[op] {
      return Some(op + 1);
    }
    return None;
  }

  pub fn precedence_edges(&self) -> Vec<Edge> {
    let mut edges = Vec::new();
    for ops in &self.ops_by_job {
      for window in ops.windows(2) {
        edges.push((window[0], window[1]));
      }
    }

    return edges;
  }

  /// Plain-text dump of the loaded sets, written next to the run outputs.
  pub fn summary(&self) -> String {
    let mut out = String::new();

    out.push_str(&format!(
      "#jobs: {} | #machines: {}\n",
      self.n_jobs, self.n_machines
    ));

    out.push_str("O: set of global operations:\n");
    out.push_str(&format!("{:?}\n", self.ops().collect::<Vec<_>>()));

    out.push_str("M: set of machines:\n");
    out.push_str(&format!("{:?}\n", self.machine_ids));

    out.push_str("M_i: allowed machines for operation 'i':\n");
    for op in self.ops() {
      let raw: Vec<u32> = self.eligible[op].iter().map(|&m| self.machine_ids[m]).collect();
      out.push_str(&format!("M_{}: {:?}\n", op, raw));
    }

    out.push_str("O_j: operations in job 'j':\n");
    for (job, ops) in self.ops_by_job.iter().enumerate() {
      out.push_str(&format!("O_{}: {:?}\n", job, ops));
    }

    out.push_str("P_j: technological sequence edges to job 'j':\n");
    for (job, ops) in self.ops_by_job.iter().enumerate() {
      let edges: Vec<Edge> = ops.windows(2).map(|w| (w[0], w[1])).collect();
      out.push_str(&format!("job {}: {:?}\n", job, edges));
    }

    out.push_str("O_m: operations that can be processed by machine 'm':\n");
    for m in self.machines() {
      out.push_str(&format!(
        "O_{}: {:?}\n",
        self.machine_ids[m], self.ops_by_machine[m]
      ));
    }

    out.push_str("p_{i,m}: processing time of operation 'i' in machine 'm':\n");
    for op in self.ops() {
      for &m in &self.eligible[op] {
        out.push_str(&format!(
          "p_({}, {}): {}\n",
          op,
          self.machine_ids[m],
          self.duration(op, m)
        ));
      }
    }

    out.push_str("j(o): job to which operation 'o' belongs:\n");
    for op in self.ops() {
      out.push_str(&format!(
        "operation {} belongs to job {}\n",
        op, self.job_of_op[op]
      ));
    }

    return out;
  }
}
