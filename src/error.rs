use thiserror::Error;

/// Fatal failure kinds of the optimization core.
///
/// Budget exhaustion and empty neighborhoods are not errors: the former
/// returns the current incumbent, the latter is reported as `None` and
/// handled by the annealer as a diversification trigger.
#[derive(Debug, Error)]
pub enum SolverError {
  #[error("invalid instance: {0}")]
  InvalidInstance(String),

  #[error("disjunctive graph contains a cycle")]
  CycleDetected,

  #[error("constructive scheduler made no progress")]
  Deadlock,

  #[error("single-machine subproblem has no feasible schedule")]
  InfeasibleSubproblem,

  #[error("i/o error: {0}")]
  Io(#[from] std::io::Error),

  #[error("csv error: {0}")]
  Csv(#[from] csv::Error),
}
