//! The JSON hand-off format of the lowering stage: an array of instruction
//! tuples such as `["store_int", "%1", "%0"]`.  Label markers are one-element
//! tuples (`["5"]`).

use serde::de::Error as _;
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::fromstr_impl::{from_parts, RawOperand};
use super::*;

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(untagged)]
enum JsonOperand {
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<JsonOperand>),
}

impl From<JsonOperand> for RawOperand {
    fn from(op: JsonOperand) -> Self {
        match op {
            JsonOperand::Int(n) => RawOperand::Int(n),
            JsonOperand::Float(x) => RawOperand::Float(x),
            JsonOperand::Text(s) if s.starts_with('%') || s.starts_with('@') => {
                RawOperand::Name(s)
            }
            JsonOperand::Text(s) => RawOperand::Text(s),
            JsonOperand::List(ops) => RawOperand::List(ops.into_iter().map(Into::into).collect()),
        }
    }
}

fn imm(value: &Immediate) -> JsonOperand {
    match value {
        Immediate::Int(n) => JsonOperand::Int(*n),
        Immediate::Float(x) => JsonOperand::Float(*x),
        Immediate::Char(c) => JsonOperand::Text(c.to_string()),
        Immediate::Str(s) => JsonOperand::Text(s.clone()),
    }
}

fn text(t: impl ToString) -> JsonOperand {
    JsonOperand::Text(t.to_string())
}

fn operand(op: &Operand) -> JsonOperand {
    match op {
        Operand::Var(v) => text(v),
        Operand::Imm(i) => imm(i),
    }
}

impl Instruction {
    /// The tuple form of this instruction: opcode first, then operands.
    fn to_tuple(&self) -> Vec<JsonOperand> {
        use Instruction::*;

        let mut tuple = vec![text(self.opcode())];
        let operands = match self {
            Define { name, params, .. } => {
                let mut ops = vec![text(format!("@{name}"))];
                if !params.is_empty() {
                    ops.push(JsonOperand::List(
                        params
                            .iter()
                            .map(|(ty, v)| JsonOperand::List(vec![text(ty), text(v)]))
                            .collect(),
                    ));
                }
                ops
            }
            Label(_) => vec![],
            Global { name, init, .. } => {
                let mut ops = vec![text(name)];
                match init {
                    Some(GlobalInit::Scalar(v)) => ops.push(imm(v)),
                    Some(GlobalInit::List(vs)) => {
                        ops.push(JsonOperand::List(vs.iter().map(imm).collect()))
                    }
                    None => (),
                }
                ops
            }
            Alloc { var, .. } => vec![text(var)],
            Load { src, dst, .. } => vec![text(src), text(dst)],
            Store { src, dst, .. } => vec![operand(src), text(dst)],
            Literal { value, dst, .. } => vec![imm(value), text(dst)],
            Elem {
                base, index, dst, ..
            } => vec![text(base), operand(index), text(dst)],
            Binary { lhs, rhs, dst, .. } => vec![operand(lhs), operand(rhs), text(dst)],
            Not { src, dst, .. } | Cast { src, dst, .. } => vec![operand(src), text(dst)],
            Param { src, .. } => vec![operand(src)],
            Call { func, dst } => {
                let mut ops = vec![text(format!("@{func}"))];
                ops.extend(dst.iter().map(text));
                ops
            }
            Jump(target) => vec![text(target)],
            CBranch {
                cond,
                taken,
                fall_through,
            } => vec![operand(cond), text(taken), text(fall_through)],
            Return { src, .. } | Print { src, .. } => src.iter().map(operand).collect(),
            Read { dst, .. } => vec![text(dst)],
        };
        tuple.extend(operands);
        tuple
    }
}

impl Serialize for Program {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.insts.len()))?;
        for inst in &self.insts {
            seq.serialize_element(&inst.to_tuple())?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Program {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tuples = Vec::<Vec<JsonOperand>>::deserialize(deserializer)?;

        let insts = tuples
            .into_iter()
            .map(|tuple| {
                let mut tuple = tuple.into_iter();
                let opcode = match tuple.next() {
                    Some(JsonOperand::Text(op)) => op,
                    _ => return Err(D::Error::custom("instruction tuples start with an opcode")),
                };
                from_parts(&opcode, tuple.map(Into::into).collect()).map_err(D::Error::custom)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Program { insts })
    }
}

impl Program {
    pub fn from_json(json: &str) -> Result<Self, IrError> {
        serde_json::from_str(json).map_err(|e| IrError::Json(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, IrError> {
        serde_json::to_string_pretty(self).map_err(|e| IrError::Json(e.to_string()))
    }
}

// analysis results name variables and operands the way the text format does.

impl Serialize for VarId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl Serialize for Operand {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
