//! Control-flow graphs.
//!
//! The builder partitions each function of a flat instruction stream into
//! basic blocks.  Blocks live in a per-function arena and refer to each other
//! by [`BlockId`], so loops (back-edges) need no shared ownership.

use std::collections::{BTreeMap as Map, BTreeSet as Set};
use std::ops::Index;

use derive_more::Display;
use log::{debug, trace};
use serde::Serialize;

use super::ir::*;
use crate::commons::{InternalError, Valid};

pub mod cfg_dump_impl;

#[cfg(test)]
mod tests;

/// Index of a block in its function's arena.  The entry block is always
/// `BlockId(0)`.
#[derive(Copy, Clone, Debug, Display, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
#[display(fmt = "b{}", _0)]
pub struct BlockId(pub usize);

impl BlockId {
    pub const ENTRY: BlockId = BlockId(0);
}

/// Instruction IDs: the block and the index of the instruction in it.
pub type InstId = (BlockId, usize);

/// A basic block.  The variant says how control leaves it.
#[derive(Clone, Debug, PartialEq)]
pub enum Block {
    /// Falls through or jumps to at most one successor.
    Sequential {
        label: Label,
        insts: Vec<Instruction>,
        preds: Set<BlockId>,
        next_block: Option<BlockId>,
    },
    /// Ends in a `cbranch`.
    Condition {
        label: Label,
        insts: Vec<Instruction>,
        preds: Set<BlockId>,
        taken: BlockId,
        fall_through: BlockId,
    },
}

impl Block {
    fn new(label: Label) -> Self {
        Block::Sequential {
            label,
            insts: vec![],
            preds: Set::new(),
            next_block: None,
        }
    }

    pub fn label(&self) -> &Label {
        match self {
            Block::Sequential { label, .. } | Block::Condition { label, .. } => label,
        }
    }

    pub fn insts(&self) -> &[Instruction] {
        match self {
            Block::Sequential { insts, .. } | Block::Condition { insts, .. } => insts,
        }
    }

    /// Blocks that may transfer control into this one.
    pub fn preds(&self) -> &Set<BlockId> {
        match self {
            Block::Sequential { preds, .. } | Block::Condition { preds, .. } => preds,
        }
    }

    /// Successors in branch order: `taken` before `fall_through`.
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Block::Sequential { next_block, .. } => next_block.iter().copied().collect(),
            Block::Condition {
                taken,
                fall_through,
                ..
            } => vec![*taken, *fall_through],
        }
    }

    pub fn is_condition(&self) -> bool {
        matches!(self, Block::Condition { .. })
    }

    fn insts_mut(&mut self) -> &mut Vec<Instruction> {
        match self {
            Block::Sequential { insts, .. } | Block::Condition { insts, .. } => insts,
        }
    }

    fn preds_mut(&mut self) -> &mut Set<BlockId> {
        match self {
            Block::Sequential { preds, .. } | Block::Condition { preds, .. } => preds,
        }
    }

    fn into_parts(self) -> (Label, Vec<Instruction>, Set<BlockId>) {
        match self {
            Block::Sequential {
                label,
                insts,
                preds,
                ..
            }
            | Block::Condition {
                label,
                insts,
                preds,
                ..
            } => (label, insts, preds),
        }
    }

    // turn this block into a condition block, keeping its instructions and
    // predecessors.
    fn make_condition(&mut self, taken: BlockId, fall_through: BlockId) {
        let placeholder = Block::new(self.label().clone());
        let (label, insts, preds) = std::mem::replace(self, placeholder).into_parts();
        *self = Block::Condition {
            label,
            insts,
            preds,
            taken,
            fall_through,
        };
    }

    /// A copy of this block with every instruction passed through `f`.
    fn map_insts(&self, mut f: impl FnMut(usize, &Instruction) -> Instruction) -> Block {
        let mut block = self.clone();
        *block.insts_mut() = self
            .insts()
            .iter()
            .enumerate()
            .map(|(i, inst)| f(i, inst))
            .collect();
        block
    }
}

/// The blocks of one `define`-delimited function.
#[derive(Clone, Debug, PartialEq)]
pub struct Function {
    pub name: String,
    /// Block arena in discovery order; the entry block comes first.
    pub blocks: Vec<Block>,
    /// Blocks in source order, used to flatten the graph back into a stream.
    pub layout: Vec<BlockId>,
}

impl Index<BlockId> for Function {
    type Output = Block;

    fn index(&self, id: BlockId) -> &Block {
        &self.blocks[id.0]
    }
}

impl Function {
    pub fn entry(&self) -> BlockId {
        BlockId::ENTRY
    }

    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> {
        (0..self.blocks.len()).map(BlockId)
    }

    pub fn inst(&self, (bb, i): InstId) -> &Instruction {
        &self[bb].insts()[i]
    }

    /// Every instruction with its ID, block by block in arena order.
    pub fn insts(&self) -> impl Iterator<Item = (InstId, &Instruction)> {
        self.blocks.iter().enumerate().flat_map(|(b, block)| {
            block
                .insts()
                .iter()
                .enumerate()
                .map(move |(i, inst)| ((BlockId(b), i), inst))
        })
    }

    pub fn find(&self, label: &Label) -> Option<BlockId> {
        self.blocks
            .iter()
            .position(|b| b.label() == label)
            .map(BlockId)
    }

    /// Blocks without successors.
    pub fn exits(&self) -> Vec<BlockId> {
        self.block_ids()
            .filter(|&b| self[b].successors().is_empty())
            .collect()
    }

    /// Blocks reachable from the entry, in reverse postorder.
    pub fn reverse_postorder(&self) -> Vec<BlockId> {
        let mut visited = Set::new();
        let mut postorder = vec![];
        // (block, next successor to visit)
        let mut stack = vec![(self.entry(), 0)];
        visited.insert(self.entry());

        while let Some((bb, i)) = stack.pop() {
            let succs = self[bb].successors();
            match succs.get(i) {
                Some(&succ) => {
                    stack.push((bb, i + 1));
                    if visited.insert(succ) {
                        stack.push((succ, 0));
                    }
                }
                None => postorder.push(bb),
            }
        }

        postorder.reverse();
        postorder
    }

    pub fn reachable(&self) -> Set<BlockId> {
        self.reverse_postorder().into_iter().collect()
    }

    /// The parameter registers named by the function's `define`.
    pub fn params(&self) -> Vec<&VarId> {
        match self[self.entry()].insts().first() {
            Some(Instruction::Define { params, .. }) => params.iter().map(|(_, v)| v).collect(),
            _ => vec![],
        }
    }

    /// Variables that receive the incoming parameter registers: the targets
    /// of `store`s whose source is a parameter of the `define`.
    pub fn param_slots(&self) -> Set<VarId> {
        let params: Set<&VarId> = self.params().into_iter().collect();
        self.insts()
            .filter_map(|(_, inst)| match inst {
                Instruction::Store {
                    src: Operand::Var(src),
                    dst,
                    ..
                } if params.contains(src) => Some(dst.clone()),
                _ => None,
            })
            .collect()
    }

    /// Variables that hold the return value: the sources of the `load`s that
    /// feed a `return_*`.
    pub fn return_slots(&self) -> Set<VarId> {
        let returned: Set<&VarId> = self
            .insts()
            .filter_map(|(_, inst)| match inst {
                Instruction::Return {
                    src: Some(Operand::Var(r)),
                    ..
                } => Some(r),
                _ => None,
            })
            .collect();

        self.insts()
            .filter_map(|(_, inst)| match inst {
                Instruction::Load { src, dst, .. } if returned.contains(dst) => Some(src.clone()),
                _ => None,
            })
            .collect()
    }

    /// The function's instructions in source order.
    pub fn flatten(&self) -> Vec<Instruction> {
        self.layout
            .iter()
            .flat_map(|&b| self[b].insts().iter().cloned())
            .collect()
    }

    /// The same graph with every instruction passed through `f`.
    pub fn map_insts(&self, mut f: impl FnMut(InstId, &Instruction) -> Instruction) -> Function {
        Function {
            name: self.name.clone(),
            blocks: self
                .blocks
                .iter()
                .enumerate()
                .map(|(b, block)| block.map_insts(|i, inst| f((BlockId(b), i), inst)))
                .collect(),
            layout: self.layout.clone(),
        }
    }
}

/// The control-flow graphs of a whole compilation unit.
#[derive(Clone, Debug, PartialEq)]
pub struct Cfg {
    /// `global_*` declarations preceding the first function.
    pub globals: Vec<Instruction>,
    /// One entry per `define`, in source order.
    pub functions: Vec<Function>,
}

impl Cfg {
    pub fn build(program: &Valid<Program>) -> Result<Cfg, InternalError> {
        let mut globals = vec![];
        let mut functions = vec![];
        let mut builder: Option<Builder> = None;

        for inst in &program.0.insts {
            if let Instruction::Define { name, .. } = inst {
                if let Some(done) = builder.take() {
                    functions.push(done.finish()?);
                }
                builder = Some(Builder::new(name, inst));
                continue;
            }
            match builder.as_mut() {
                Some(b) => b.push(inst)?,
                None if matches!(inst, Instruction::Global { .. }) => globals.push(inst.clone()),
                None => return Err(InternalError::OutsideFunction(inst.to_string())),
            }
        }
        if let Some(done) = builder {
            functions.push(done.finish()?);
        }

        Ok(Cfg { globals, functions })
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Turn the graphs back into an instruction stream for the backend.
    /// Block and function boundaries come out exactly as they went in;
    /// unreachable code after a terminator is gone.
    pub fn flatten(&self) -> Program {
        let mut insts = self.globals.clone();
        for f in &self.functions {
            insts.extend(f.flatten());
        }
        Program { insts }
    }
}

// SECTION: construction

// builds the graph of a single function while its instructions stream past.
struct Builder {
    name: String,
    blocks: Vec<Block>,
    by_label: Map<Label, BlockId>,
    // blocks whose label marker has been reached.  Blocks that are only jump
    // targets so far are not in here yet.
    materialized: Set<BlockId>,
    layout: Vec<BlockId>,
    // the block receiving instructions; `None` right after a terminator.
    current: Option<BlockId>,
}

impl Builder {
    fn new(name: &str, define: &Instruction) -> Self {
        let mut entry = Block::new(label(name));
        entry.insts_mut().push(define.clone());

        Builder {
            name: name.to_owned(),
            blocks: vec![entry],
            by_label: Map::from([(label(name), BlockId::ENTRY)]),
            materialized: Set::from([BlockId::ENTRY]),
            layout: vec![BlockId::ENTRY],
            current: Some(BlockId::ENTRY),
        }
    }

    // the block named `l`, created on first sight.  Back-edges find the
    // existing block here.
    fn resolve(&mut self, l: &Label) -> BlockId {
        if let Some(&id) = self.by_label.get(l) {
            return id;
        }
        let id = BlockId(self.blocks.len());
        self.blocks.push(Block::new(l.clone()));
        self.by_label.insert(l.clone(), id);
        id
    }

    fn link(&mut self, from: BlockId, to: BlockId) {
        self.blocks[to.0].preds_mut().insert(from);
    }

    fn set_next(&mut self, from: BlockId, to: BlockId) {
        if let Block::Sequential { next_block, .. } = &mut self.blocks[from.0] {
            *next_block = Some(to);
        }
        self.link(from, to);
    }

    fn push(&mut self, inst: &Instruction) -> Result<(), InternalError> {
        if let Instruction::Label(l) = inst {
            let target = self.resolve(l);
            if !self.materialized.insert(target) {
                return Err(InternalError::DuplicateLabel {
                    func: self.name.clone(),
                    label: l.name().to_owned(),
                });
            }
            // an open block falls through into the label.
            if let Some(cur) = self.current {
                self.set_next(cur, target);
            }
            self.layout.push(target);
            self.blocks[target.0].insts_mut().push(inst.clone());
            self.current = Some(target);
            return Ok(());
        }

        let Some(cur) = self.current else {
            trace!("{}: dropping unreachable `{inst}`", self.name);
            return Ok(());
        };
        self.blocks[cur.0].insts_mut().push(inst.clone());

        match inst {
            Instruction::Jump(l) => {
                let target = self.resolve(l);
                self.set_next(cur, target);
            }
            Instruction::CBranch {
                taken,
                fall_through,
                ..
            } => {
                let taken = self.resolve(taken);
                let fall_through = self.resolve(fall_through);
                self.blocks[cur.0].make_condition(taken, fall_through);
                self.link(cur, taken);
                self.link(cur, fall_through);
            }
            Instruction::Return { .. } => (),
            _ => return Ok(()),
        }
        self.current = None;
        Ok(())
    }

    fn finish(self) -> Result<Function, InternalError> {
        if let Some(unresolved) = self
            .blocks
            .iter()
            .enumerate()
            .find(|(b, _)| !self.materialized.contains(&BlockId(*b)))
        {
            return Err(InternalError::UnresolvedLabel {
                func: self.name,
                label: unresolved.1.label().name().to_owned(),
            });
        }

        debug!("{}: {} blocks", self.name, self.blocks.len());

        Ok(Function {
            name: self.name,
            blocks: self.blocks,
            layout: self.layout,
        })
    }
}
