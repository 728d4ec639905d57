#[macro_use]
extern crate log;

use clap::{App, Arg};
use fjssp_heuristics::runner::{self, Method, RunConfig};
use std::path::PathBuf;
use std::str::FromStr;

fn main() {
  env_logger::init();

  let matches = App::new("fjssp-heuristics")
    .version("1.0")
    .about("Heuristic solvers for the flexible job shop scheduling problem")
    .arg(
      Arg::with_name("instance")
        .long("instance")
        .help("Instance file path")
        .takes_value(true)
        .required(true),
    )
    .arg(
      Arg::with_name("method")
        .long("method")
        .help("Method(s) to optimize the problem")
        .possible_values(&["cbc", "SA", "both"])
        .takes_value(true)
        .required(true),
    )
    .arg(
      Arg::with_name("time-limit")
        .long("time-limit")
        .help("Time limit (in s) for each method")
        .takes_value(true)
        .default_value("300"),
    )
    .arg(
      Arg::with_name("sa-log-writing")
        .long("sa-log-writing")
        .help("Whether SA processing logs should be written to a file")
        .possible_values(&["Y", "N"])
        .takes_value(true)
        .default_value("N"),
    )
    .arg(
      Arg::with_name("sbp-log-writing")
        .long("sbp-log-writing")
        .help("Whether SBP processing logs should be written to a file")
        .possible_values(&["Y", "N"])
        .takes_value(true)
        .default_value("N"),
    )
    .arg(
      Arg::with_name("seed")
        .long("seed")
        .help("Seed for rng")
        .takes_value(true)
        .default_value("42"),
    )
    .get_matches();

  let instance = matches.value_of("instance").expect("Missing instance file");
  let method = matches
    .value_of("method")
    .and_then(|m| Method::from_str(m).ok())
    .expect("Invalid method");
  let time_limit: f64 = matches
    .value_of("time-limit")
    .and_then(|m| m.parse().ok())
    .expect("Invalid time limit");
  let seed: u64 = matches
    .value_of("seed")
    .and_then(|m| m.parse().ok())
    .expect("Invalid seed");

  let mut config = RunConfig::new(PathBuf::from(instance), method);
  config.time_limit = time_limit;
  config.sa_log_writing = matches.value_of("sa-log-writing") == Some("Y");
  config.sbp_log_writing = matches.value_of("sbp-log-writing") == Some("Y");
  config.seed = seed;

  info!(
    "instance: {} | method: {:?} | time limit: {}s | seed: {}",
    instance, method, time_limit, seed
  );

  let mut counter = 0;
  let result = runner::run(&config, &mut |message| {
    counter += 1;
    println!("[{}] {}", counter, message);
  });

  if let Err(err) = result {
    eprintln!("error: {}", err);
    std::process::exit(1);
  }
}
