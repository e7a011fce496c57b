//! Available expressions.
//!
//! An expression is the result of a binary, comparison or `not` instruction.
//! It stops being available once a `store` writes a variable it reads, either
//! directly or through a register loaded from that variable.
//!
//! Joins use union, so an expression computed along any incoming path counts
//! as available.

use std::collections::BTreeMap as Map;

use super::*;
use crate::middle_end::ir::{Instruction, Operand, VarId};

/// The expression computed at `site`.  `rhs` is absent for unary `not`.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize)]
pub struct Expression {
    pub site: InstId,
    pub lhs: Operand,
    pub rhs: Option<Operand>,
}

impl Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (bb, n) = self.site;
        match &self.rhs {
            Some(rhs) => write!(f, "({}, {rhs})@{bb}.{n}", self.lhs),
            None => write!(f, "({})@{bb}.{n}", self.lhs),
        }
    }
}

impl Expression {
    fn operands(&self) -> impl Iterator<Item = &VarId> {
        std::iter::once(&self.lhs)
            .chain(self.rhs.as_ref())
            .filter_map(Operand::as_var)
    }
}

pub struct AvailableExprs {
    exprs: Set<Expression>,
    // register -> variables it was loaded from.
    loaded_from: Map<VarId, Set<VarId>>,
}

impl AvailableExprs {
    fn reads(&self, e: &Expression, var: &VarId) -> bool {
        e.operands().any(|op| {
            op == var
                || self
                    .loaded_from
                    .get(op)
                    .map_or(false, |sources| sources.contains(var))
        })
    }
}

fn expression(f: &Function, site: InstId) -> Option<Expression> {
    match f.inst(site) {
        Instruction::Binary { lhs, rhs, .. } => Some(Expression {
            site,
            lhs: lhs.clone(),
            rhs: Some(rhs.clone()),
        }),
        Instruction::Not { src, .. } => Some(Expression {
            site,
            lhs: src.clone(),
            rhs: None,
        }),
        _ => None,
    }
}

impl GenKillAnalysis for AvailableExprs {
    type Fact = Expression;

    const NAME: &'static str = "available expressions";
    const DIRECTION: Direction = Direction::Forward;
    const MERGE: Merge = Merge::Union;

    fn for_function(f: &Function) -> Self {
        let mut loaded_from: Map<VarId, Set<VarId>> = Map::new();
        for (_, inst) in f.insts() {
            if let Instruction::Load { src, dst, .. } = inst {
                loaded_from.entry(dst.clone()).or_default().insert(src.clone());
            }
        }

        AvailableExprs {
            exprs: f.insts().filter_map(|(site, _)| expression(f, site)).collect(),
            loaded_from,
        }
    }

    fn gen(&self, f: &Function, site: InstId) -> Set<Expression> {
        expression(f, site).into_iter().collect()
    }

    fn kill(&self, f: &Function, site: InstId) -> Set<Expression> {
        match f.inst(site).stored_var() {
            Some(var) => self
                .exprs
                .iter()
                .filter(|e| self.reads(e, var))
                .cloned()
                .collect(),
            None => Set::new(),
        }
    }
}

pub fn analyze(f: &Function) -> Results<Expression> {
    super::analyze::<AvailableExprs>(f)
}
