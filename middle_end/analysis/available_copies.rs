//! Available copies: the facts behind copy propagation.
//!
//! A copy `(A, B)` is a `load A -> r` immediately followed by `store r -> B`.
//! It stays available until `A` or `B` is written again, and a `call` may
//! write any global.  Loads and stores through pointers (`load_int_*`,
//! `store_int_*`) never make a copy: the pointed-to slot can be written
//! through another pointer.  This is a must analysis, so joins intersect.

use super::*;
use crate::middle_end::ir::{Instruction, Operand, VarId};

/// After the copy, `dst` holds the value of `src`.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize)]
pub struct Copy {
    pub src: VarId,
    pub dst: VarId,
}

impl Display for Copy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <- {}", self.dst, self.src)
    }
}

pub struct AvailableCopies {
    // every copy of the function, in order of appearance.
    copies: Vec<Copy>,
}

impl AvailableCopies {
    /// The copies of the function in order of appearance (block arena order,
    /// then instruction order).
    pub fn universe(&self) -> &[Copy] {
        &self.copies
    }
}

/// The copy made by the `store` at `site`, if its source register was loaded
/// by the instruction right before it and neither goes through a pointer.
pub fn copy_at(f: &Function, (bb, i): InstId) -> Option<Copy> {
    let insts = f[bb].insts();
    let prev = insts.get(i.checked_sub(1)?)?;
    match (prev, &insts[i]) {
        (
            Instruction::Load {
                ty: load_ty,
                src,
                dst: reg,
            },
            Instruction::Store {
                ty: store_ty,
                src: Operand::Var(stored),
                dst,
            },
        ) if reg == stored && !load_ty.pointer && !store_ty.pointer => Some(Copy {
            src: src.clone(),
            dst: dst.clone(),
        }),
        _ => None,
    }
}

impl GenKillAnalysis for AvailableCopies {
    type Fact = Copy;

    const NAME: &'static str = "available copies";
    const DIRECTION: Direction = Direction::Forward;
    const MERGE: Merge = Merge::Intersection;

    fn for_function(f: &Function) -> Self {
        let mut copies = vec![];
        for (site, _) in f.insts() {
            if let Some(copy) = copy_at(f, site) {
                if !copies.contains(&copy) {
                    copies.push(copy);
                }
            }
        }
        AvailableCopies { copies }
    }

    fn gen(&self, f: &Function, site: InstId) -> Set<Copy> {
        copy_at(f, site).into_iter().collect()
    }

    fn kill(&self, f: &Function, site: InstId) -> Set<Copy> {
        let inst = f.inst(site);
        let written = inst.defined_var();
        let call = matches!(inst, Instruction::Call { .. });
        let clobbered = |v: &VarId| Some(v) == written || (call && v.is_global());

        self.copies
            .iter()
            .filter(|c| clobbered(&c.src) || clobbered(&c.dst))
            .cloned()
            .collect()
    }
}

pub fn analyze(f: &Function) -> Results<Copy> {
    super::analyze::<AvailableCopies>(f)
}
