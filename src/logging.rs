use std::fs::File;
use std::io::{BufWriter, Write};
use std::ops::{Deref, DerefMut};
use std::path::Path;

/// File-backed trace log with scoped indentation.
///
/// The detailed SA and SBP traces go to per-run files (`salog.log`,
/// `sbplog.log`) when enabled and are dropped otherwise; console
/// diagnostics stay on the `log` crate macros. Indentation depth is
/// acquired through [`RunLog::scope`], whose guard restores the previous
/// depth on every exit path, early returns and unwinding included.
#[derive(Debug)]
pub struct RunLog {
  sink: Option<BufWriter<File>>,
  level: usize,
}

impl RunLog {
  /// A disabled log; every call is a no-op.
  pub fn off() -> Self {
    return RunLog { sink: None, level: 0 };
  }

  /// A log writing to `path`. Falls back to a disabled log with a warning
  /// when the file cannot be created.
  pub fn to_file(path: &Path) -> Self {
    match File::create(path) {
      Ok(file) => {
        return RunLog {
          sink: Some(BufWriter::new(file)),
          level: 0,
        };
      }
      Err(err) => {
        log::warn!("could not open trace log {:?}: {}", path, err);
        return RunLog::off();
      }
    }
  }

  pub fn is_enabled(&self) -> bool {
    return self.sink.is_some();
  }

  pub fn log(&mut self, message: &str) {
    let level = self.level;
    if let Some(sink) = self.sink.as_mut() {
      let indent = "    ".repeat(level);
      if let Err(err) = writeln!(sink, "{}> {}", indent, message) {
        log::warn!("trace log write failed: {}", err);
        self.sink = None;
      }
    }
  }

  pub fn breakline(&mut self) {
    if let Some(sink) = self.sink.as_mut() {
      if writeln!(sink).is_err() {
        self.sink = None;
      }
    }
  }

  /// Enters one indentation level; the previous level is restored when the
  /// returned guard is dropped.
  pub fn scope(&mut self) -> Scope<'_> {
    self.level += 1;
    return Scope { log: self };
  }
}

pub struct Scope<'a> {
  log: &'a mut RunLog,
}

impl<'a> Deref for Scope<'a> {
  type Target = RunLog;

  fn deref(&self) -> &RunLog {
    return self.log;
  }
}

impl<'a> DerefMut for Scope<'a> {
  fn deref_mut(&mut self) -> &mut RunLog {
    return self.log;
  }
}

impl<'a> Drop for Scope<'a> {
  fn drop(&mut self) {
    self.log.level -= 1;
  }
}
