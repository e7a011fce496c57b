//! The flat three-address IR handed over by the lowering stage.
//!
//! A [`Program`] is a single instruction stream for a whole compilation unit:
//! leading `global_*` declarations followed by one `define`-delimited region
//! per function.  Blocks are only implied here (by label markers, `jump`,
//! `cbranch` and `return`); `middle_end::cfg` makes them explicit.

use std::cmp::Ordering;
use std::fmt::{self, Display};

use derive_more::Display;

pub mod fromstr_impl;
pub mod json_impl;
mod validate;


// SECTION: operands

/// A variable reference.  Locals are per-function synthetic registers
/// (`%3`, `%x`), globals are program-wide (`@x`).
#[derive(Clone, Debug, Display, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum VarId {
    #[display(fmt = "%{}", _0)]
    Local(String),
    #[display(fmt = "@{}", _0)]
    Global(String),
}

impl VarId {
    pub fn name(&self) -> &str {
        match self {
            VarId::Local(name) | VarId::Global(name) => name,
        }
    }

    pub fn is_global(&self) -> bool {
        matches!(self, VarId::Global(_))
    }
}

/// Create a variable from its printed form: `@x` is a global, `%x` (or a bare
/// name) is a local.
pub fn var_id(name: &str) -> VarId {
    match name.strip_prefix('@') {
        Some(global) => VarId::Global(global.to_owned()),
        None => VarId::Local(name.strip_prefix('%').unwrap_or(name).to_owned()),
    }
}

/// A block label.  Stored without its sigil, so `%L`, `@L` and `L` are the
/// same label.
#[derive(Clone, Debug, Display, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[display(fmt = "%{}", _0)]
pub struct Label(pub String);

impl Label {
    pub fn name(&self) -> &str {
        &self.0
    }
}

pub fn label(name: &str) -> Label {
    let name = name
        .strip_prefix('%')
        .or_else(|| name.strip_prefix('@'))
        .unwrap_or(name);
    Label(name.to_owned())
}

/// An immediate literal.
#[derive(Clone, Debug)]
pub enum Immediate {
    Int(i64),
    Float(f64),
    Char(char),
    Str(String),
}

impl Immediate {
    fn rank(&self) -> u8 {
        match self {
            Immediate::Int(_) => 0,
            Immediate::Float(_) => 1,
            Immediate::Char(_) => 2,
            Immediate::Str(_) => 3,
        }
    }
}

// floats are compared by their total order so immediates can live in sets.
impl Ord for Immediate {
    fn cmp(&self, other: &Self) -> Ordering {
        use Immediate::*;
        match (self, other) {
            (Int(a), Int(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Char(a), Char(b)) => a.cmp(b),
            (Str(a), Str(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Immediate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Immediate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Immediate {}

impl Display for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Immediate::Int(n) => write!(f, "{n}"),
            // `{:?}` keeps the fractional part, so `2.0` does not read back as
            // an integer.
            Immediate::Float(x) => write!(f, "{x:?}"),
            Immediate::Char(c) => write!(f, "'{c}'"),
            Immediate::Str(s) => write!(f, "'{s}'"),
        }
    }
}

#[derive(Clone, Debug, Display, Eq, PartialEq, Ord, PartialOrd)]
pub enum Operand {
    Var(VarId),
    Imm(Immediate),
}

impl Operand {
    pub fn as_var(&self) -> Option<&VarId> {
        match self {
            Operand::Var(v) => Some(v),
            Operand::Imm(_) => None,
        }
    }
}

impl From<VarId> for Operand {
    fn from(v: VarId) -> Self {
        Operand::Var(v)
    }
}

// SECTION: types and operators

#[derive(Copy, Clone, Debug, Display, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum BaseType {
    #[display(fmt = "int")]
    Int,
    #[display(fmt = "float")]
    Float,
    #[display(fmt = "char")]
    Char,
    #[display(fmt = "bool")]
    Bool,
    #[display(fmt = "string")]
    String,
    #[display(fmt = "void")]
    Void,
}

/// The element type carried in an opcode suffix: `int` in `store_int`,
/// `int_*` (a store through a pointer) in `store_int_*`, or `int_5` (an
/// array of five) in `alloc_int_5`.  Multi-dimensional arrays carry their
/// total size first, then each dimension: `int_6_2_3`.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Type {
    pub base: BaseType,
    pub dims: Vec<usize>,
    pub pointer: bool,
}

impl Type {
    pub const fn new(base: BaseType) -> Self {
        Type {
            base,
            dims: Vec::new(),
            pointer: false,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let (s, pointer) = match s.strip_suffix("_*") {
            Some(rest) => (rest, true),
            None => (s, false),
        };
        let mut parts = s.split('_');
        let base = match parts.next()? {
            "int" => BaseType::Int,
            "float" => BaseType::Float,
            "char" => BaseType::Char,
            "bool" => BaseType::Bool,
            "string" => BaseType::String,
            "void" => BaseType::Void,
            _ => return None,
        };
        let dims = parts
            .map(|d| d.parse().ok())
            .collect::<Option<Vec<usize>>>()?;
        Some(Type {
            base,
            dims,
            pointer,
        })
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base)?;
        for d in &self.dims {
            write!(f, "_{d}")?;
        }
        if self.pointer {
            write!(f, "_*")?;
        }
        Ok(())
    }
}

/// The binary/comparison family.
#[derive(Copy, Clone, Debug, Display, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum BinOp {
    #[display(fmt = "add")]
    Add,
    #[display(fmt = "sub")]
    Sub,
    #[display(fmt = "mul")]
    Mul,
    #[display(fmt = "div")]
    Div,
    #[display(fmt = "mod")]
    Mod,
    #[display(fmt = "and")]
    And,
    #[display(fmt = "or")]
    Or,
    #[display(fmt = "eq")]
    Eq,
    #[display(fmt = "ne")]
    Ne,
    #[display(fmt = "lt")]
    Lt,
    #[display(fmt = "le")]
    Le,
    #[display(fmt = "gt")]
    Gt,
    #[display(fmt = "ge")]
    Ge,
}

impl BinOp {
    pub fn from_mnemonic(s: &str) -> Option<Self> {
        use BinOp::*;
        let op = match s {
            "add" => Add,
            "sub" => Sub,
            "mul" => Mul,
            "div" => Div,
            "mod" => Mod,
            "and" => And,
            "or" => Or,
            "eq" => Eq,
            "ne" => Ne,
            "lt" => Lt,
            "le" => Le,
            "gt" => Gt,
            "ge" => Ge,
            _ => return None,
        };
        Some(op)
    }

    pub fn is_comparison(self) -> bool {
        use BinOp::*;
        matches!(self, Eq | Ne | Lt | Le | Gt | Ge)
    }
}

#[derive(Copy, Clone, Debug, Display, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum CastOp {
    #[display(fmt = "sitofp")]
    Sitofp,
    #[display(fmt = "fptosi")]
    Fptosi,
}

/// Initial value of a global.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum GlobalInit {
    Scalar(Immediate),
    List(Vec<Immediate>),
}

// SECTION: instructions

/// One three-address instruction.  Instructions are plain values: passes
/// build new ones rather than editing shared ones.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Instruction {
    /// Start of a function.  `ret` is absent for a bare `define`.
    Define {
        ret: Option<Type>,
        name: String,
        params: Vec<(Type, VarId)>,
    },
    /// Block label marker.
    Label(Label),
    Global {
        ty: Type,
        name: VarId,
        init: Option<GlobalInit>,
    },
    Alloc {
        ty: Type,
        var: VarId,
    },
    Load {
        ty: Type,
        src: VarId,
        dst: VarId,
    },
    Store {
        ty: Type,
        src: Operand,
        dst: VarId,
    },
    Literal {
        ty: Type,
        value: Immediate,
        dst: VarId,
    },
    Elem {
        ty: Type,
        base: VarId,
        index: Operand,
        dst: VarId,
    },
    Binary {
        op: BinOp,
        ty: Type,
        lhs: Operand,
        rhs: Operand,
        dst: VarId,
    },
    Not {
        ty: Type,
        src: Operand,
        dst: VarId,
    },
    Cast {
        op: CastOp,
        src: Operand,
        dst: VarId,
    },
    Param {
        ty: Type,
        src: Operand,
    },
    Call {
        func: String,
        dst: Option<VarId>,
    },
    Jump(Label),
    CBranch {
        cond: Operand,
        taken: Label,
        fall_through: Label,
    },
    Return {
        ty: Type,
        src: Option<Operand>,
    },
    Print {
        ty: Type,
        src: Option<Operand>,
    },
    Read {
        ty: Type,
        dst: VarId,
    },
}

impl Instruction {
    /// The opcode mnemonic as the lowering stage spells it.
    pub fn opcode(&self) -> String {
        use Instruction::*;
        match self {
            Define { ret: None, .. } => "define".to_owned(),
            Define { ret: Some(ty), .. } => format!("define_{ty}"),
            Label(l) => l.name().to_owned(),
            Global { ty, .. } => format!("global_{ty}"),
            Alloc { ty, .. } => format!("alloc_{ty}"),
            Load { ty, .. } => format!("load_{ty}"),
            Store { ty, .. } => format!("store_{ty}"),
            Literal { ty, .. } => format!("literal_{ty}"),
            Elem { ty, .. } => format!("elem_{ty}"),
            Binary { op, ty, .. } => format!("{op}_{ty}"),
            Not { ty, .. } => format!("not_{ty}"),
            Cast { op, .. } => op.to_string(),
            Param { ty, .. } => format!("param_{ty}"),
            Call { .. } => "call".to_owned(),
            Jump(_) => "jump".to_owned(),
            CBranch { .. } => "cbranch".to_owned(),
            Return { ty, .. } => format!("return_{ty}"),
            Print { ty, .. } => format!("print_{ty}"),
            Read { ty, .. } => format!("read_{ty}"),
        }
    }

    pub fn is_label(&self) -> bool {
        matches!(self, Instruction::Label(_))
    }

    pub fn is_store(&self) -> bool {
        matches!(self, Instruction::Store { .. })
    }

    /// Instructions after which control never falls through.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Instruction::Jump(_) | Instruction::CBranch { .. } | Instruction::Return { .. }
        )
    }

    /// The variable this instruction writes, if any.
    pub fn defined_var(&self) -> Option<&VarId> {
        use Instruction::*;
        match self {
            Load { dst, .. }
            | Store { dst, .. }
            | Literal { dst, .. }
            | Elem { dst, .. }
            | Binary { dst, .. }
            | Not { dst, .. }
            | Cast { dst, .. }
            | Read { dst, .. } => Some(dst),
            Call { dst, .. } => dst.as_ref(),
            _ => None,
        }
    }

    /// The variable a `store` writes.  Stores are the only instructions that
    /// redefine a program variable; every other write targets a fresh
    /// register.
    pub fn stored_var(&self) -> Option<&VarId> {
        match self {
            Instruction::Store { dst, .. } => Some(dst),
            _ => None,
        }
    }

    /// The variables this instruction reads, in operand order.
    pub fn used_vars(&self) -> Vec<&VarId> {
        use Instruction::*;
        let ops: Vec<&Operand> = match self {
            Store { src, .. }
            | Not { src, .. }
            | Cast { src, .. }
            | Param { src, .. } => vec![src],
            Elem { index, .. } => vec![index],
            Binary { lhs, rhs, .. } => vec![lhs, rhs],
            CBranch { cond, .. } => vec![cond],
            Return { src, .. } | Print { src, .. } => src.iter().collect(),
            _ => vec![],
        };
        let mut vars: Vec<&VarId> = match self {
            Load { src, .. } => vec![src],
            Elem { base, .. } => vec![base],
            _ => vec![],
        };
        vars.extend(ops.into_iter().filter_map(Operand::as_var));
        vars
    }

    /// Build a copy of this instruction whose reads are passed through
    /// `rewrite`.  Written variables are never touched.
    pub fn map_uses(&self, mut rewrite: impl FnMut(&VarId) -> Option<VarId>) -> Instruction {
        use Instruction::*;
        let rw = &mut rewrite as &mut dyn FnMut(&VarId) -> Option<VarId>;

        match self {
            Load { ty, src, dst } => Load {
                ty: ty.clone(),
                src: rewrite_var(rw, src),
                dst: dst.clone(),
            },
            Store { ty, src, dst } => Store {
                ty: ty.clone(),
                src: rewrite_operand(rw, src),
                dst: dst.clone(),
            },
            Elem {
                ty,
                base,
                index,
                dst,
            } => Elem {
                ty: ty.clone(),
                base: rewrite_var(rw, base),
                index: rewrite_operand(rw, index),
                dst: dst.clone(),
            },
            Binary {
                op,
                ty,
                lhs,
                rhs,
                dst,
            } => Binary {
                op: *op,
                ty: ty.clone(),
                lhs: rewrite_operand(rw, lhs),
                rhs: rewrite_operand(rw, rhs),
                dst: dst.clone(),
            },
            Not { ty, src, dst } => Not {
                ty: ty.clone(),
                src: rewrite_operand(rw, src),
                dst: dst.clone(),
            },
            Cast { op, src, dst } => Cast {
                op: *op,
                src: rewrite_operand(rw, src),
                dst: dst.clone(),
            },
            Param { ty, src } => Param {
                ty: ty.clone(),
                src: rewrite_operand(rw, src),
            },
            CBranch {
                cond,
                taken,
                fall_through,
            } => CBranch {
                cond: rewrite_operand(rw, cond),
                taken: taken.clone(),
                fall_through: fall_through.clone(),
            },
            Return { ty, src } => Return {
                ty: ty.clone(),
                src: src.as_ref().map(|o| rewrite_operand(rw, o)),
            },
            Print { ty, src } => Print {
                ty: ty.clone(),
                src: src.as_ref().map(|o| rewrite_operand(rw, o)),
            },
            other => other.clone(),
        }
    }
}

fn rewrite_var(rewrite: &mut dyn FnMut(&VarId) -> Option<VarId>, v: &VarId) -> VarId {
    rewrite(v).unwrap_or_else(|| v.clone())
}

fn rewrite_operand(rewrite: &mut dyn FnMut(&VarId) -> Option<VarId>, o: &Operand) -> Operand {
    match o {
        Operand::Var(v) => Operand::Var(rewrite_var(rewrite, v)),
        imm => imm.clone(),
    }
}

fn write_operands<T: Display>(f: &mut fmt::Formatter<'_>, ops: &[T]) -> fmt::Result {
    for op in ops {
        write!(f, " {op}")?;
    }
    Ok(())
}

impl Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Instruction::*;
        match self {
            Define { name, params, .. } => {
                write!(f, "{} @{name}", self.opcode())?;
                let params = params
                    .iter()
                    .map(|(ty, v)| format!("{ty} {v}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                if !params.is_empty() {
                    write!(f, " {params}")?;
                }
                Ok(())
            }
            Label(l) => write!(f, "{}:", l.name()),
            Global { name, init, .. } => {
                write!(f, "{} {name}", self.opcode())?;
                match init {
                    None => Ok(()),
                    Some(GlobalInit::Scalar(value)) => write!(f, " {value}"),
                    Some(GlobalInit::List(values)) => {
                        let values = values
                            .iter()
                            .map(ToString::to_string)
                            .collect::<Vec<_>>()
                            .join(", ");
                        write!(f, " [{values}]")
                    }
                }
            }
            Jump(target) => write!(f, "jump label {target}"),
            CBranch {
                cond,
                taken,
                fall_through,
            } => write!(f, "cbranch {cond} label {taken} label {fall_through}"),
            Call { func, dst } => {
                write!(f, "call @{func}")?;
                match dst {
                    Some(dst) => write!(f, " {dst}"),
                    None => Ok(()),
                }
            }
            Alloc { var, .. } => write!(f, "{} {var}", self.opcode()),
            Load { src, dst, .. } => write!(f, "{} {src} {dst}", self.opcode()),
            Store { src, dst, .. } => write!(f, "{} {src} {dst}", self.opcode()),
            Literal { value, dst, .. } => write!(f, "{} {value} {dst}", self.opcode()),
            Elem {
                base, index, dst, ..
            } => write!(f, "{} {base} {index} {dst}", self.opcode()),
            Binary { lhs, rhs, dst, .. } => write!(f, "{} {lhs} {rhs} {dst}", self.opcode()),
            Not { src, dst, .. } | Cast { src, dst, .. } => {
                write!(f, "{} {src} {dst}", self.opcode())
            }
            Param { src, .. } => write!(f, "{} {src}", self.opcode()),
            Return { src, .. } | Print { src, .. } => {
                write!(f, "{}", self.opcode())?;
                write_operands(f, src.as_slice())
            }
            Read { dst, .. } => write!(f, "{} {dst}", self.opcode()),
        }
    }
}

// SECTION: programs

/// The flat instruction stream of one compilation unit.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Program {
    pub insts: Vec<Instruction>,
}

impl Program {
    pub fn new(insts: Vec<Instruction>) -> Self {
        Program { insts }
    }
}

impl Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, inst) in self.insts.iter().enumerate() {
            if i > 0 && matches!(inst, Instruction::Define { .. }) {
                writeln!(f)?;
            }
            writeln!(f, "{inst}")?;
        }
        Ok(())
    }
}

// SECTION: errors

/// Errors reading an instruction stream.
#[derive(Clone, Debug, Display, PartialEq)]
pub enum IrError {
    #[display(fmt = "syntax error: {}", _0)]
    Parse(Box<pest::error::Error<fromstr_impl::Rule>>),
    #[display(fmt = "JSON instruction stream: {}", _0)]
    Json(String),
    #[display(fmt = "unknown opcode `{}`", _0)]
    UnknownOpcode(String),
    #[display(fmt = "unknown type suffix in `{}`", _0)]
    UnknownType(String),
    #[display(fmt = "`{}` expects {}", opcode, expected)]
    Malformed {
        opcode: String,
        expected: &'static str,
    },
}

impl std::error::Error for IrError {}
