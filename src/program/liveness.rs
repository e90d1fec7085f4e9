// Function -> liveness analysis -> Vec<AbstractLine>
// Vec<AbstractLine> -> raw interference graph, copies and usage -> AllocationProblem

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use crate::{
  program::{Function, Instr, Stmt},
  regalloc::{AllocationProblem, UsageInfo, VReg},
  utils::Graph,
};

type AbstractLineRef = usize; // we use index to refer to the line

/// The abstract line of the liveness analysis, one per instruction of the
/// flattened function body.
#[derive(Debug, Clone)]
pub struct AbstractLine {
  instr: Instr,
  /// The registers used in this instruction
  uses: Vec<VReg>,
  /// The registers defined in this instruction
  defines: Vec<VReg>,
  /// The live-in registers at this instruction
  live_in: HashSet<VReg>,
  /// The next line, if any
  default_succ: Option<AbstractLineRef>,
  /// Loop heads this line jumps back to; the last line of a loop body has
  /// one per enclosing loop that ends here.
  back_edges: Vec<AbstractLineRef>,
  loop_depth: u32,
}

impl AbstractLine {
  fn new(instr: Instr, loop_depth: u32) -> Self {
    Self {
      uses: instr.uses(),
      defines: instr.def().into_iter().collect(),
      instr,
      live_in: HashSet::new(),
      default_succ: None,
      back_edges: vec![],
      loop_depth,
    }
  }

  pub fn defines(&self) -> &Vec<VReg> {
    &self.defines
  }

  pub fn uses(&self) -> &Vec<VReg> {
    &self.uses
  }

  pub fn live_in(&self) -> &HashSet<VReg> {
    &self.live_in
  }

  pub fn instr(&self) -> &Instr {
    &self.instr
  }

  pub fn loop_depth(&self) -> u32 {
    self.loop_depth
  }

  pub fn successors(&self) -> Vec<AbstractLineRef> {
    self
      .default_succ
      .into_iter()
      .chain(self.back_edges.iter().copied())
      .collect()
  }
}

/// The liveness analysis result of a function
pub struct Liveness {
  pub lines: Vec<AbstractLine>,
  params: Vec<VReg>,
}

impl Liveness {
  /// Create a liveness analysis information from the given function
  pub fn from_function(func: &Function) -> Self {
    let mut lines = vec![];
    Self::flatten(&func.body, 0, &mut lines);
    let num_lines = lines.len();
    for (idx, line) in lines.iter_mut().enumerate() {
      if idx + 1 < num_lines {
        line.default_succ = Some(idx + 1);
      }
    }

    let liveness = Self {
      lines,
      params: func.params.clone(),
    };
    let pred_map = liveness.generate_predecessor_map();
    // Precompute which lines each variable is defined on for quick lookup
    let mut var_def_lines: HashMap<VReg, Vec<AbstractLineRef>> = HashMap::new();
    for (line_num, line) in liveness.lines().iter().enumerate() {
      for var in line.defines() {
        var_def_lines.entry(*var).or_default().push(line_num);
      }
    }

    liveness.derive_livein_set(&pred_map, &var_def_lines)
  }

  /// Append the lines of `body`, wiring a back edge from the end of every
  /// loop body to its first line.
  fn flatten(body: &[Stmt], depth: u32, lines: &mut Vec<AbstractLine>) {
    for stmt in body {
      match stmt {
        Stmt::Instr(instr) => lines.push(AbstractLine::new(instr.clone(), depth)),
        Stmt::Loop(inner) => {
          let head = lines.len();
          Self::flatten(inner, depth + 1, lines);
          if lines.len() > head {
            if let Some(last) = lines.last_mut() {
              last.back_edges.push(head);
            }
          }
        }
      }
    }
  }

  /// Variable based search to derive the live-in set for each line
  fn derive_livein_set(
    mut self,
    pred_map: &[HashSet<usize>],
    var_def_lines: &HashMap<VReg, Vec<AbstractLineRef>>,
  ) -> Self {
    let mut livein_sets = vec![HashSet::new(); self.lines.len()];
    for (line_num, line) in self.lines().iter().enumerate().rev() {
      for var in line.uses() {
        if livein_sets[line_num].contains(var) {
          continue; // Variable is already live, no need to traverse
        }

        let mut visited = HashSet::new();
        let mut to_visit = VecDeque::new();
        to_visit.push_back(line_num);

        while let Some(current_line_num) = to_visit.pop_front() {
          if !visited.insert(current_line_num) {
            continue; // Already visited this line for the current variable
          }

          if livein_sets[current_line_num].insert(*var) {
            for pred in &pred_map[current_line_num] {
              // If a variable is defined at this predecessor, no need to add to visit
              if var_def_lines
                .get(var)
                .map_or(true, |defs| !defs.contains(pred))
              {
                to_visit.push_back(*pred);
              }
            }
          }
        }
      }
    }

    for (line, live_in) in self.lines.iter_mut().zip(livein_sets) {
      line.live_in = live_in;
    }

    self
  }

  /// Generate the predecessor map of the lines
  ///
  /// e.g. pred_map[3] contains the predecessors of line 3
  fn generate_predecessor_map(&self) -> Vec<HashSet<AbstractLineRef>> {
    let mut pred_map = vec![HashSet::new(); self.lines.len()];
    for (idx, line) in self.lines.iter().enumerate() {
      for succ in line.successors() {
        pred_map[succ].insert(idx);
      }
    }

    pred_map
  }

  pub fn lines(&self) -> &Vec<AbstractLine> {
    &self.lines
  }

  /// Registers live right after `line` executes.
  pub fn live_out(&self, line: AbstractLineRef) -> HashSet<VReg> {
    self.lines[line]
      .successors()
      .into_iter()
      .flat_map(|succ| self.lines[succ].live_in.iter().copied())
      .collect()
  }

  /// Registers live on entry, before the first instruction.
  pub fn live_at_entry(&self) -> HashSet<VReg> {
    self
      .lines
      .first()
      .map(|line| line.live_in.clone())
      .unwrap_or_default()
  }

  /// Build the interference relation, copy list and usage counts.
  pub fn into_problem(self, func: &Function) -> AllocationProblem {
    let mut interference = Graph::new();
    let mut usage: BTreeMap<VReg, UsageInfo> = BTreeMap::new();
    let mut moves = vec![];

    // parameters are all defined together on entry
    let entry_live = self.live_at_entry();
    for param in &self.params {
      interference.add_node(*param);
      interference.add_graph_edges(*param, &self.params);
      interference.add_graph_edges(*param, &entry_live);
      usage.entry(*param).or_default().defs += 1;
    }

    for (line_num, line) in self.lines.iter().enumerate() {
      for var in line.uses().iter().chain(line.defines()) {
        interference.add_node(*var);
        let info = usage.entry(*var).or_default();
        info.loop_depth = info.loop_depth.max(line.loop_depth());
      }
      for var in line.uses() {
        usage.entry(*var).or_default().uses += 1;
      }

      let copy = line.instr().as_copy();
      if let Some((dest, src)) = copy {
        if dest != src {
          moves.push((dest, src));
        }
      }

      let live_out = self.live_out(line_num);
      for def in line.defines() {
        usage.entry(*def).or_default().defs += 1;
        // the source of a copy may share the destination's register
        let neighbors = live_out
          .iter()
          .filter(|v| copy.map_or(true, |(_, src)| **v != src));
        interference.add_graph_edges(*def, neighbors);
      }
    }

    for (vreg, info) in usage.iter_mut() {
      info.no_spill = !func.is_spillable(*vreg);
    }

    log::debug!(
      "{}: {} lines, {} registers, {} interferences, {} copies",
      func.name,
      self.lines.len(),
      interference.num_nodes(),
      interference.num_edges(),
      moves.len()
    );
    AllocationProblem {
      interference,
      moves,
      usage,
    }
  }
}
