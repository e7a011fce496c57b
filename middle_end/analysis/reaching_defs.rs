//! Intraprocedural reaching definitions analysis.
//!
//! A definition is a `store` into a program variable.  Stores that spill an
//! incoming parameter register into its slot, and stores into the slot the
//! function returns from, are not tracked.

use super::*;
use crate::middle_end::ir::{Instruction, VarId};

/// A `store` at `site` writing `var`.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize)]
pub struct Definition {
    pub site: InstId,
    pub var: VarId,
}

impl Display for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (bb, n) = self.site;
        write!(f, "{}@{bb}.{n}", self.var)
    }
}

pub struct ReachingDefs {
    // every tracked definition of the function.
    defs: Set<Definition>,
    excluded: Set<VarId>,
}

impl ReachingDefs {
    fn definition(&self, f: &Function, site: InstId) -> Option<Definition> {
        match f.inst(site) {
            Instruction::Store { dst, .. } if !self.excluded.contains(dst) => Some(Definition {
                site,
                var: dst.clone(),
            }),
            _ => None,
        }
    }
}

impl GenKillAnalysis for ReachingDefs {
    type Fact = Definition;

    const NAME: &'static str = "reaching definitions";
    const DIRECTION: Direction = Direction::Forward;
    const MERGE: Merge = Merge::Union;

    fn for_function(f: &Function) -> Self {
        let excluded = &f.param_slots() | &f.return_slots();
        let mut analysis = ReachingDefs {
            defs: Set::new(),
            excluded,
        };
        analysis.defs = f
            .insts()
            .filter_map(|(site, _)| analysis.definition(f, site))
            .collect();
        analysis
    }

    fn gen(&self, f: &Function, site: InstId) -> Set<Definition> {
        self.definition(f, site).into_iter().collect()
    }

    fn kill(&self, f: &Function, site: InstId) -> Set<Definition> {
        match f.inst(site).stored_var() {
            Some(var) => self
                .defs
                .iter()
                .filter(|d| &d.var == var && d.site != site)
                .cloned()
                .collect(),
            None => Set::new(),
        }
    }
}

pub fn analyze(f: &Function) -> Results<Definition> {
    super::analyze::<ReachingDefs>(f)
}
