//! Intraprocedural gen/kill dataflow analyses over the control-flow graph.
//!
//! Every analysis here is a set lattice over a finite universe of facts
//! (definitions, expressions, variables or copies) ordered by ⊆.  An analysis
//! only says what each instruction generates and kills, which way facts flow,
//! and how facts meet at a join; [`AnalysisRun`] does the rest.

use std::collections::BTreeSet as Set;
use std::fmt::{self, Debug, Display};

use log::{debug, trace};
use serde::Serialize;

use super::cfg::*;

pub mod available_copies;
pub mod available_exprs;
pub mod liveness;
pub mod reaching_defs;

#[cfg(test)]
mod tests;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Direction {
    Forward,
    Backward,
}

/// How facts meet where control-flow paths join.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Merge {
    /// May-analysis: a fact holds if it holds along any path.
    Union,
    /// Must-analysis: a fact holds only if it holds along every path.
    Intersection,
}

/// A gen/kill analysis prepared for one function.
pub trait GenKillAnalysis {
    type Fact: Clone + Debug + Display + Ord + Serialize;

    const NAME: &'static str;
    const DIRECTION: Direction;
    const MERGE: Merge;

    /// Collect whatever the transfer functions need to know about `f`, such
    /// as the universe of facts.
    fn for_function(f: &Function) -> Self;

    /// Facts the instruction at `site` makes true.
    fn gen(&self, f: &Function, site: InstId) -> Set<Self::Fact>;

    /// Facts the instruction at `site` invalidates.
    fn kill(&self, f: &Function, site: InstId) -> Set<Self::Fact>;
}

/// The tables of one block, indexed by the position of the instruction in
/// the block (program order for both directions).
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BlockTables<F: Ord> {
    pub label: String,
    pub gen: Vec<Set<F>>,
    pub kill: Vec<Set<F>>,
    pub ins: Vec<Set<F>>,
    pub outs: Vec<Set<F>>,
}

impl<F: Ord> BlockTables<F> {
    fn new(label: String, gen: Vec<Set<F>>, kill: Vec<Set<F>>) -> Self {
        let n = gen.len();
        BlockTables {
            label,
            gen,
            kill,
            ins: (0..n).map(|_| Set::new()).collect(),
            outs: (0..n).map(|_| Set::new()).collect(),
        }
    }

    // the facts entering the block in the direction of the analysis.
    fn boundary(&self, direction: Direction) -> Option<&Set<F>> {
        match direction {
            Direction::Forward => self.outs.last(),
            Direction::Backward => self.ins.first(),
        }
    }
}

/// The solution of one analysis over one function.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Results<F: Ord> {
    pub analysis: &'static str,
    pub function: String,
    /// Indexed by [`BlockId`].  Blocks the entry cannot reach keep empty
    /// `in`/`out` tables.
    pub blocks: Vec<BlockTables<F>>,
    /// Number of sweeps over the function until nothing changed.
    pub passes: usize,
}

impl<F: Ord> Results<F> {
    pub fn block(&self, bb: BlockId) -> &BlockTables<F> {
        &self.blocks[bb.0]
    }

    pub fn ins(&self, (bb, i): InstId) -> &Set<F> {
        &self.blocks[bb.0].ins[i]
    }

    pub fn outs(&self, (bb, i): InstId) -> &Set<F> {
        &self.blocks[bb.0].outs[i]
    }
}

/// Render a set of facts as `{a, b, c}`.
pub fn fmt_set<F: Display>(set: &Set<F>) -> String {
    let items = set.iter().map(ToString::to_string).collect::<Vec<_>>();
    format!("{{{}}}", items.join(", "))
}

impl<F: Ord + Display> Display for Results<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} of @{} ({} passes)",
            self.analysis, self.function, self.passes
        )?;
        for (b, tables) in self.blocks.iter().enumerate() {
            writeln!(f, "\n{} ({}):", BlockId(b), tables.label)?;
            for i in 0..tables.gen.len() {
                writeln!(
                    f,
                    "  {i}: gen {} kill {} in {} out {}",
                    fmt_set(&tables.gen[i]),
                    fmt_set(&tables.kill[i]),
                    fmt_set(&tables.ins[i]),
                    fmt_set(&tables.outs[i]),
                )?;
            }
        }
        Ok(())
    }
}

// SECTION: fixed-point engine

/// The state of one analysis invocation over one function.  It is consumed
/// by [`AnalysisRun::solve`], so every run starts from fresh tables.
pub struct AnalysisRun<'f, A: GenKillAnalysis> {
    analysis: A,
    func: &'f Function,
    tables: Vec<BlockTables<A::Fact>>,
    // blocks whose tables hold a solution (as opposed to the initial ∅).
    computed: Vec<bool>,
}

impl<'f, A: GenKillAnalysis> AnalysisRun<'f, A> {
    pub fn new(func: &'f Function) -> Self {
        let analysis = A::for_function(func);

        let tables = func
            .block_ids()
            .map(|bb| {
                let n = func[bb].insts().len();
                let gen = (0..n).map(|i| analysis.gen(func, (bb, i))).collect();
                let kill = (0..n).map(|i| analysis.kill(func, (bb, i))).collect();
                BlockTables::new(func[bb].label().name().to_owned(), gen, kill)
            })
            .collect();

        AnalysisRun {
            analysis,
            func,
            computed: vec![false; func.blocks.len()],
            tables,
        }
    }

    pub fn analysis(&self) -> &A {
        &self.analysis
    }

    /// Sweep the reachable blocks until a whole pass changes no table.
    pub fn solve(mut self) -> Results<A::Fact> {
        let mut order = self.func.reverse_postorder();
        if A::DIRECTION == Direction::Backward {
            order.reverse();
        }

        let mut passes = 0;
        loop {
            passes += 1;
            let mut changed = false;
            for &bb in &order {
                match self.boundary(bb) {
                    Some(boundary) => changed |= self.transfer(bb, boundary),
                    None => trace!("{}: deferring {bb}", A::NAME),
                }
            }
            if !changed {
                break;
            }
        }

        debug!(
            "{} of @{}: fixed point after {passes} passes",
            A::NAME,
            self.func.name
        );

        Results {
            analysis: A::NAME,
            function: self.func.name.clone(),
            blocks: self.tables,
            passes,
        }
    }

    // the blocks whose tables feed into `bb`, and whether `bb` also has the
    // virtual function entry (or exit) edge.
    fn neighbours(&self, bb: BlockId) -> (Vec<BlockId>, bool) {
        match A::DIRECTION {
            Direction::Forward => (
                self.func[bb].preds().iter().copied().collect(),
                bb == self.func.entry(),
            ),
            Direction::Backward => {
                let succs = self.func[bb].successors();
                let is_exit = succs.is_empty();
                (succs, is_exit)
            }
        }
    }

    // merge the neighbours' tables into the set flowing into `bb`.  `None`
    // means an intersection has nothing to intersect yet.
    fn boundary(&self, bb: BlockId) -> Option<Set<A::Fact>> {
        let (neighbours, virtual_edge) = self.neighbours(bb);
        let empty = Set::new();

        let mut incoming = neighbours.into_iter().filter_map(|n| {
            if self.computed[n.0] {
                Some(self.tables[n.0].boundary(A::DIRECTION).unwrap_or(&empty))
            } else {
                None
            }
        });

        match A::MERGE {
            Merge::Union => Some(incoming.fold(Set::new(), |acc, s| &acc | s)),
            Merge::Intersection if virtual_edge => Some(Set::new()),
            Merge::Intersection => {
                let first = incoming.next()?.clone();
                Some(incoming.fold(first, |acc, s| &acc & s))
            }
        }
    }

    // recompute the tables of `bb` from `boundary`; report whether anything
    // changed.
    fn transfer(&mut self, bb: BlockId, boundary: Set<A::Fact>) -> bool {
        trace!("{}: visiting {bb}", A::NAME);

        let t = &self.tables[bb.0];
        let n = t.gen.len();
        let mut ins = vec![Set::new(); n];
        let mut outs = vec![Set::new(); n];

        let step = |i: usize, before: &Set<A::Fact>| -> Set<A::Fact> {
            &t.gen[i] | &(before - &t.kill[i])
        };

        let mut current = boundary;
        match A::DIRECTION {
            Direction::Forward => {
                for i in 0..n {
                    let next = step(i, &current);
                    ins[i] = std::mem::replace(&mut current, next.clone());
                    outs[i] = next;
                }
            }
            Direction::Backward => {
                for i in (0..n).rev() {
                    let next = step(i, &current);
                    outs[i] = std::mem::replace(&mut current, next.clone());
                    ins[i] = next;
                }
            }
        }

        let changed = !self.computed[bb.0] || t.ins != ins || t.outs != outs;
        let t = &mut self.tables[bb.0];
        t.ins = ins;
        t.outs = outs;
        self.computed[bb.0] = true;
        changed
    }
}

/// Solve analysis `A` over `f`.
pub fn analyze<A: GenKillAnalysis>(f: &Function) -> Results<A::Fact> {
    AnalysisRun::<A>::new(f).solve()
}

// SECTION: driver

/// Every analysis of one function.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Report {
    pub function: String,
    pub reaching_defs: Results<reaching_defs::Definition>,
    pub available_exprs: Results<available_exprs::Expression>,
    pub liveness: Results<crate::middle_end::ir::VarId>,
    pub available_copies: Results<available_copies::Copy>,
}

impl Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\n{}\n{}\n{}",
            self.reaching_defs, self.available_exprs, self.liveness, self.available_copies
        )
    }
}

/// Run every analysis over every function of `cfg`.
pub fn run_all(cfg: &Cfg) -> Vec<Report> {
    cfg.functions
        .iter()
        .map(|f| Report {
            function: f.name.clone(),
            reaching_defs: reaching_defs::analyze(f),
            available_exprs: available_exprs::analyze(f),
            liveness: liveness::analyze(f),
            available_copies: available_copies::analyze(f),
        })
        .collect()
}
