//! Intraprocedural liveness analysis.
//!
//! Remember that this is a backwards analysis!  Tables are still indexed in
//! program order.
//!
//! Every variable an instruction reads is generated, including the slot a
//! `load` reads from.  Only `store`s kill: registers are written once, so
//! they never need to be.
//!
//! A `call` reads the registers of the `param` run right before it in the
//! same block, and the `param`s themselves read nothing.  This depends on
//! the lowering stage emitting arguments immediately before their call.

use super::*;
use crate::middle_end::ir::{Instruction, VarId};

pub struct Liveness;

// the `param` instructions right before the `call` at `site`.
fn call_arguments(f: &Function, (bb, i): InstId) -> Set<VarId> {
    f[bb].insts()[..i]
        .iter()
        .rev()
        .take_while(|inst| matches!(inst, Instruction::Param { .. }))
        .flat_map(|inst| inst.used_vars())
        .cloned()
        .collect()
}

impl GenKillAnalysis for Liveness {
    type Fact = VarId;

    const NAME: &'static str = "liveness";
    const DIRECTION: Direction = Direction::Backward;
    const MERGE: Merge = Merge::Union;

    fn for_function(_f: &Function) -> Self {
        Liveness
    }

    fn gen(&self, f: &Function, site: InstId) -> Set<VarId> {
        match f.inst(site) {
            Instruction::Param { .. } => Set::new(),
            Instruction::Call { .. } => call_arguments(f, site),
            inst => inst.used_vars().into_iter().cloned().collect(),
        }
    }

    fn kill(&self, f: &Function, site: InstId) -> Set<VarId> {
        f.inst(site).stored_var().into_iter().cloned().collect()
    }
}

pub fn analyze(f: &Function) -> Results<VarId> {
    super::analyze::<Liveness>(f)
}
