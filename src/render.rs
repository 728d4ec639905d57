use crate::data::{Instance, Machine, OpId};
use crate::solver::Solution;
use itertools::Itertools;
use std::path::Path;
use svg::node::element::{Definitions, Line, Marker, Path as SvgPath, Rectangle, Style, Text, Title};
use svg::Document;

const LEFT_MARGIN: usize = 70; // px, room for machine labels
const TOP_MARGIN: usize = 50; // px, room for the title
const RIGHT_MARGIN: usize = 30; // px
const BOTTOM_MARGIN: usize = 40; // px, room for the time scale
const ROW_HEIGHT: usize = 28; // px
const ROW_SPACING: usize = 10; // px
const TARGET_PLOT_WIDTH: f64 = 900.0; // px

const NODE_RADIUS: usize = 14; // px
const NODE_DX: usize = 90; // px between job positions
const NODE_DY: usize = 70; // px between job rows

// beyond this many disjunctive pairs the DAG is unreadable and the export
// is skipped, mirroring the draw-timeout of the reference tooling
const MAX_DAG_PAIRS: usize = 400;

const JOB_PALETTE: [&str; 10] = [
  "#4e79a7", "#f28e2b", "#e15759", "#76b7b2", "#59a14f", "#edc948", "#b07aa1", "#ff9da7",
  "#9c755f", "#bab0ac",
];

fn job_color(job: usize) -> &'static str {
  return JOB_PALETTE[job % JOB_PALETTE.len()];
}

fn svg_header() -> (Style, Rectangle) {
  let style = Style::new(
    r#"
    text { font-family:monospace; font-size:11px; fill:black; }
    #title { text-anchor:middle; font-size:18px; }
    .row-label { text-anchor:end; dominant-baseline:middle; }
    .bar-label { text-anchor:middle; dominant-baseline:middle; fill:white; }
    .scale-label { text-anchor:middle; }
    .node-label { text-anchor:middle; dominant-baseline:middle; }
    .edge-label { text-anchor:middle; fill:#c03030; font-size:9px; }
    "#,
  );
  let background = Rectangle::new()
    .set("x", 0)
    .set("y", 0)
    .set("width", "100%")
    .set("height", "100%")
    .set("fill", "#fafafa");
  return (style, background);
}

/// Renders a fully scheduled solution as a machine-per-row Gantt chart with
/// job-colored bars.
pub fn render_gantt(instance: &Instance, solution: &Solution, title: &str) -> String {
  let makespan = std::cmp::max(solution.makespan, 1);
  let scale = TARGET_PLOT_WIDTH / makespan as f64;
  let width = LEFT_MARGIN as f64 + TARGET_PLOT_WIDTH + RIGHT_MARGIN as f64;
  let height = TOP_MARGIN + instance.n_machines * (ROW_HEIGHT + ROW_SPACING) + BOTTOM_MARGIN;

  let (style, background) = svg_header();
  let mut document = Document::new()
    .set("version", "1.1")
    .set("xmlns", "http://www.w3.org/2000/svg")
    .set("width", width)
    .set("height", height)
    .add(style)
    .add(background)
    .add(Text::new(title).set("id", "title").set("x", width / 2.0).set("y", 24));

  for machine in instance.machines() {
    let row_top = TOP_MARGIN + machine * (ROW_HEIGHT + ROW_SPACING);

    document = document.add(
      Text::new(format!("M{}", instance.machine_ids[machine]))
        .set("class", "row-label")
        .set("x", LEFT_MARGIN - 10)
        .set("y", row_top + ROW_HEIGHT / 2),
    );

    document = document.add(
      Line::new()
        .set("x1", LEFT_MARGIN)
        .set("y1", row_top + ROW_HEIGHT)
        .set("x2", LEFT_MARGIN as f64 + TARGET_PLOT_WIDTH)
        .set("y2", row_top + ROW_HEIGHT)
        .set("stroke", "#cccccc")
        .set("stroke-width", 1),
    );

    for &op in &solution.machine_sequence[machine] {
      let start = solution.start_times[op];
      let finish = solution.finish_times[op];
      let x = LEFT_MARGIN as f64 + start as f64 * scale;
      let bar_width = (finish - start) as f64 * scale;
      let job = instance.job_of_op[op];

      let bar = Rectangle::new()
        .set("x", x)
        .set("y", row_top)
        .set("width", bar_width)
        .set("height", ROW_HEIGHT)
        .set("fill", job_color(job))
        .set("stroke", "black")
        .set("stroke-width", 1)
        .add(Title::new(format!("op {} (job {}): [{}, {})", op, job, start, finish)));
      document = document.add(bar);

      if bar_width >= 18.0 {
        document = document.add(
          Text::new(format!("{}", op))
            .set("class", "bar-label")
            .set("x", x + bar_width / 2.0)
            .set("y", row_top + ROW_HEIGHT / 2),
        );
      }
    }
  }

  // time scale
  let scale_y = TOP_MARGIN + instance.n_machines * (ROW_HEIGHT + ROW_SPACING) + 15;
  let step = std::cmp::max(1, makespan / 10);
  let mut tick = 0;
  while tick <= makespan {
    let x = LEFT_MARGIN as f64 + tick as f64 * scale;
    document = document.add(
      Line::new()
        .set("x1", x)
        .set("y1", TOP_MARGIN)
        .set("x2", x)
        .set("y2", scale_y - 10)
        .set("stroke", "#e0e0e0")
        .set("stroke-width", 1),
    );
    document = document.add(
      Text::new(format!("{}", tick))
        .set("class", "scale-label")
        .set("x", x)
        .set("y", scale_y),
    );
    tick += step;
  }

  return document.to_string();
}

/// All machine-sharing pairs of an unscheduled instance, one entry per
/// machine both operations are eligible for.
pub fn instance_disjunctive_pairs(instance: &Instance) -> Vec<(Machine, OpId, OpId)> {
  let mut pairs = Vec::new();
  for machine in instance.machines() {
    for (&a, &b) in instance.ops_by_machine[machine].iter().tuple_combinations() {
      pairs.push((machine, a, b));
    }
  }
  return pairs;
}

/// The display pairs recorded in a solution's graph.
pub fn solution_disjunctive_pairs(solution: &Solution, instance: &Instance) -> Vec<(Machine, OpId, OpId)> {
  let mut pairs = Vec::new();
  if let Some(graph) = solution.graph() {
    for machine in instance.machines() {
      for &(a, b) in graph.visual_pairs(machine) {
        pairs.push((machine, a, b));
      }
    }
  }
  return pairs;
}

/// Renders the disjunctive graph on a grid (x: position in job, y: job
/// row): conjunctive edges solid, disjunctive pairs dashed in the owning
/// machine's color. Returns None when the pair count makes the drawing
/// unreadable; callers log and move on.
pub fn render_dag(
  instance: &Instance,
  disjunctive_pairs: &[(Machine, OpId, OpId)],
  title: &str,
) -> Option<String> {
  if disjunctive_pairs.len() > MAX_DAG_PAIRS {
    log::warn!(
      "skipping DAG export '{}': {} disjunctive pairs exceed the limit of {}",
      title,
      disjunctive_pairs.len(),
      MAX_DAG_PAIRS
    );
    return None;
  }

  let max_job_len = instance.ops_by_job.iter().map(|ops| ops.len()).max().unwrap_or(1);
  let width = LEFT_MARGIN + (max_job_len + 2) * NODE_DX + RIGHT_MARGIN;
  let height = TOP_MARGIN + std::cmp::max(instance.n_jobs, 1) * NODE_DY + BOTTOM_MARGIN;
  let center_y = TOP_MARGIN + (instance.n_jobs.saturating_sub(1)) * NODE_DY / 2;

  let node_pos = |op: OpId| -> (usize, usize) {
    let job = instance.job_of_op[op];
    let index = instance.ops_by_job[job].iter().position(|&o| o == op).unwrap();
    return (LEFT_MARGIN + (index + 1) * NODE_DX, TOP_MARGIN + job * NODE_DY);
  };
  let source_pos = (LEFT_MARGIN, center_y);
  let sink_pos = (LEFT_MARGIN + (max_job_len + 1) * NODE_DX, center_y);

  let arrow = Marker::new()
    .set("id", "arrow")
    .set("viewBox", "0 0 10 10")
    .set("refX", 9)
    .set("refY", 5)
    .set("markerWidth", 7)
    .set("markerHeight", 7)
    .set("orient", "auto-start-reverse")
    .add(SvgPath::new().set("d", "M 0 0 L 10 5 L 0 10 z").set("fill", "black"));

  let (style, background) = svg_header();
  let mut document = Document::new()
    .set("version", "1.1")
    .set("xmlns", "http://www.w3.org/2000/svg")
    .set("width", width)
    .set("height", height)
    .add(style)
    .add(background)
    .add(Definitions::new().add(arrow))
    .add(Text::new(title).set("id", "title").set("x", width / 2).set("y", 24));

  let edge = |from: (usize, usize), to: (usize, usize)| -> Line {
    return Line::new()
      .set("x1", from.0)
      .set("y1", from.1)
      .set("x2", to.0)
      .set("y2", to.1)
      .set("stroke", "black")
      .set("stroke-width", 1)
      .set("marker-end", "url(#arrow)");
  };

  for ops in &instance.ops_by_job {
    document = document.add(edge(source_pos, node_pos(ops[0])));
    document = document.add(edge(node_pos(*ops.last().unwrap()), sink_pos));
  }
  for (from, to) in instance.precedence_edges() {
    document = document.add(edge(node_pos(from), node_pos(to)));
  }

  for &(machine, a, b) in disjunctive_pairs {
    let from = node_pos(a);
    let to = node_pos(b);
    document = document.add(
      Line::new()
        .set("x1", from.0)
        .set("y1", from.1)
        .set("x2", to.0)
        .set("y2", to.1)
        .set("stroke", job_color(machine))
        .set("stroke-width", 1.5)
        .set("stroke-dasharray", "5,4")
        .add(Title::new(format!("machine {}", instance.machine_ids[machine]))),
    );
  }

  let draw_node = |document: Document, pos: (usize, usize), label: String| -> Document {
    let circle = svg::node::element::Circle::new()
      .set("cx", pos.0)
      .set("cy", pos.1)
      .set("r", NODE_RADIUS)
      .set("fill", "#cfe2f3")
      .set("stroke", "black")
      .set("stroke-width", 1);
    return document
      .add(circle)
      .add(Text::new(label).set("class", "node-label").set("x", pos.0).set("y", pos.1));
  };

  for op in instance.ops() {
    document = draw_node(document, node_pos(op), format!("{}", op));
  }
  document = draw_node(document, source_pos, "S".to_string());
  document = draw_node(document, sink_pos, "T".to_string());

  return Some(document.to_string());
}

pub fn write_svg(contents: &str, path: &Path) -> std::io::Result<()> {
  return std::fs::write(path, contents);
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::parser::parse_instance;
  use crate::solver::builder::{self, MachineStrategy};
  use rand::SeedableRng;
  use rand_chacha::ChaChaRng;

  fn scheduled() -> (Instance, Solution) {
    let inst = parse_instance("t", "2 2\n2 1 1 3 1 2 2\n2 1 2 4 1 1 1\n").unwrap();
    let mut sol = Solution::new(&inst);
    let mut rng = ChaChaRng::seed_from_u64(42);
    builder::build_solution(&inst, &mut sol, MachineStrategy::Greedy, &mut rng).unwrap();
    return (inst, sol);
  }

  #[test]
  fn gantt_contains_a_bar_per_operation() {
    let (inst, sol) = scheduled();
    let chart = render_gantt(&inst, &sol, "toy schedule");

    assert!(chart.contains("<svg"));
    assert!(chart.contains("toy schedule"));
    // one tooltip per op
    for op in inst.ops() {
      assert!(chart.contains(&format!("op {} ", op)));
    }
  }

  #[test]
  fn dag_draws_all_nodes_and_artificials() {
    let (inst, _sol) = scheduled();
    let pairs = instance_disjunctive_pairs(&inst);
    let dag = render_dag(&inst, &pairs, "toy dag").unwrap();

    assert!(dag.contains(">S</text>"));
    assert!(dag.contains(">T</text>"));
    assert!(dag.contains("stroke-dasharray"));
  }

  #[test]
  fn oversized_dags_are_skipped() {
    let (inst, _sol) = scheduled();
    let pairs: Vec<(Machine, OpId, OpId)> = (0..=MAX_DAG_PAIRS).map(|_| (0, 0, 1)).collect();
    assert!(render_dag(&inst, &pairs, "too big").is_none());
  }

  #[test]
  fn solution_pairs_come_from_the_graph_visuals() {
    let (inst, mut sol) = scheduled();
    sol.rebuild_graph(&inst, true);
    sol.populate_visuals(&inst, false);

    let pairs = solution_disjunctive_pairs(&sol, &inst);
    // machine 0 holds ops 0 and 3, machine 1 holds ops 2 and 1; both pairs
    // are cross-job
    assert_eq!(pairs.len(), 2);
  }
}
