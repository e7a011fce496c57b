use super::*;

use pest::iterators::Pair;
use pest::Parser;

#[derive(pest_derive::Parser)]
#[grammar_inline = r#"
WHITESPACE = _{ " " | "\t" }
COMMENT = _{ "//" ~ (!NEWLINE ~ ANY)* }

program = { SOI ~ NEWLINE* ~ (line ~ (NEWLINE+ | &EOI))* ~ EOI }

line = _{ label_marker | define | instruction }

ident = @{ (ASCII_ALPHANUMERIC | "_" | ".")+ }
name = @{ ("%" | "@") ~ ident }

label_marker = { ident ~ ":" }

define = { define_op ~ name ~ (param ~ ("," ~ param)*)? }
define_op = @{ "define" ~ ("_" ~ ASCII_ALPHA+)? }
param = { type_name ~ name }
type_name = @{ ASCII_ALPHA+ ~ ("_" ~ ASCII_DIGIT+)* ~ "_*"? }

instruction = { opcode ~ operand* }
opcode = @{ ASCII_ALPHA ~ (ASCII_ALPHANUMERIC | "_")* ~ "*"? }

operand = _{ label_ref | list | name | float | int | string }
label_ref = { "label" ~ name }
list = { "[" ~ (literal ~ ("," ~ literal)*)? ~ "]" }
literal = _{ float | int | string }

float = @{ "-"? ~ ASCII_DIGIT+ ~ "." ~ ASCII_DIGIT* ~ (("e" | "E") ~ ("+" | "-")? ~ ASCII_DIGIT+)? }
int = @{ "-"? ~ ASCII_DIGIT+ }
string = ${ "'" ~ string_inner ~ "'" }
string_inner = @{ (!"'" ~ ANY)* }
"#]
struct IrParser;

/// An operand as it appears in either the text or the JSON form, before the
/// opcode gives it a meaning.
#[derive(Clone, Debug, PartialEq)]
pub enum RawOperand {
    Int(i64),
    Float(f64),
    /// A quoted literal or a bare word (a type name inside a `define`).
    Text(String),
    /// A `%`- or `@`-prefixed name: a variable, function or label.
    Name(String),
    List(Vec<RawOperand>),
}

impl std::str::FromStr for Program {
    type Err = IrError;

    fn from_str(prog_str: &str) -> Result<Self, Self::Err> {
        let mut parse_tree = IrParser::parse(Rule::program, prog_str)
            .map_err(|err| IrError::Parse(Box::new(err)))?;

        let insts = match parse_tree.next() {
            Some(program) => program
                .into_inner()
                .filter(|pair| pair.as_rule() != Rule::EOI)
                .map(create_instruction)
                .collect::<Result<Vec<_>, _>>()?,
            None => vec![],
        };

        Ok(Program { insts })
    }
}

fn create_instruction(pair: Pair<Rule>) -> Result<Instruction, IrError> {
    match pair.as_rule() {
        Rule::label_marker => {
            let name = pair.into_inner().as_str();
            Ok(Instruction::Label(label(name)))
        }
        Rule::define => {
            let mut inner = pair.into_inner();
            let opcode = inner.next().map(|p| p.as_str()).unwrap_or("define");
            let mut operands = vec![];
            if let Some(name) = inner.next() {
                operands.push(RawOperand::Name(name.as_str().to_owned()));
            }
            let params = inner
                .map(|param| {
                    RawOperand::List(
                        param
                            .into_inner()
                            .map(|p| match p.as_rule() {
                                Rule::name => RawOperand::Name(p.as_str().to_owned()),
                                _ => RawOperand::Text(p.as_str().to_owned()),
                            })
                            .collect(),
                    )
                })
                .collect::<Vec<_>>();
            if !params.is_empty() {
                operands.push(RawOperand::List(params));
            }
            from_parts(opcode, operands)
        }
        Rule::instruction => {
            let mut inner = pair.into_inner();
            let opcode = inner.next().map(|p| p.as_str()).unwrap_or_default();
            let operands = inner.map(create_operand).collect::<Result<Vec<_>, _>>()?;
            from_parts(opcode, operands)
        }
        _ => unreachable!("not a line: {:#?}", pair),
    }
}

fn create_operand(pair: Pair<Rule>) -> Result<RawOperand, IrError> {
    let malformed = |what: &str| IrError::Malformed {
        opcode: what.to_owned(),
        expected: "a number that fits in 64 bits",
    };

    Ok(match pair.as_rule() {
        Rule::label_ref | Rule::name => {
            let text = match pair.as_rule() {
                Rule::label_ref => pair.into_inner().as_str(),
                _ => pair.as_str(),
            };
            RawOperand::Name(text.to_owned())
        }
        Rule::int => RawOperand::Int(pair.as_str().parse().map_err(|_| malformed(pair.as_str()))?),
        Rule::float => {
            RawOperand::Float(pair.as_str().parse().map_err(|_| malformed(pair.as_str()))?)
        }
        Rule::string => RawOperand::Text(pair.into_inner().as_str().to_owned()),
        Rule::list => RawOperand::List(
            pair.into_inner()
                .map(create_operand)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        _ => unreachable!("not an operand: {:#?}", pair),
    })
}

// SECTION: building instructions from (opcode, operands) tuples

/// Split `store_int_*` into `("store", Some("int_*"))`.
fn split_opcode(opcode: &str) -> (&str, Option<&str>) {
    match opcode.split_once('_') {
        Some((head, suffix)) => (head, Some(suffix)),
        None => (opcode, None),
    }
}

/// Opcode families.  An operand-less tuple spelled like one of these is a
/// malformed instruction, never a label.
const MNEMONICS: &[&str] = &[
    "define", "global", "alloc", "load", "store", "literal", "elem", "not", "sitofp", "fptosi",
    "param", "call", "jump", "cbranch", "return", "print", "read",
];

fn is_mnemonic(head: &str) -> bool {
    MNEMONICS.contains(&head) || BinOp::from_mnemonic(head).is_some()
}

/// Build an instruction from the tuple form shared by the text and JSON
/// readers.  A lone operand-less tuple is a label marker, unless its opcode
/// names an instruction family.  Only the `*_void` forms of `return` and
/// `print` take no operands.
pub fn from_parts(opcode: &str, operands: Vec<RawOperand>) -> Result<Instruction, IrError> {
    use Instruction::*;

    let bad = |expected: &'static str| IrError::Malformed {
        opcode: opcode.to_owned(),
        expected,
    };
    let (head, suffix) = split_opcode(opcode);
    let ty = || {
        suffix
            .and_then(Type::parse)
            .ok_or_else(|| IrError::UnknownType(opcode.to_owned()))
    };

    if operands.is_empty() && !is_mnemonic(head) {
        return Ok(Label(label(opcode)));
    }

    let mut ops = operands.into_iter();
    let mut next = || ops.next();

    let inst = match head {
        "define" => {
            let ret = suffix.map(|_| ty()).transpose()?;
            let name = match next() {
                Some(RawOperand::Name(n)) => n.trim_start_matches('@').to_owned(),
                _ => return Err(bad("a function name")),
            };
            let params = match next() {
                None => vec![],
                Some(RawOperand::List(params)) => params
                    .into_iter()
                    .map(|param| match param {
                        RawOperand::List(pair) => match pair.as_slice() {
                            [RawOperand::Text(t), RawOperand::Name(v)] => Type::parse(t)
                                .map(|t| (t, var_id(v)))
                                .ok_or_else(|| IrError::UnknownType(t.clone())),
                            _ => Err(bad("parameters of the form `type %reg`")),
                        },
                        _ => Err(bad("parameters of the form `type %reg`")),
                    })
                    .collect::<Result<Vec<_>, _>>()?,
                Some(_) => return Err(bad("a parameter list")),
            };
            Define { ret, name, params }
        }
        "global" => {
            let ty = ty()?;
            let name = expect_var(next(), bad("a global name"))?;
            let init = match next() {
                None => None,
                Some(RawOperand::List(values)) => Some(GlobalInit::List(
                    values
                        .into_iter()
                        .map(|v| immediate(v, &ty).ok_or_else(|| bad("literal initializers")))
                        .collect::<Result<Vec<_>, _>>()?,
                )),
                Some(v) => Some(GlobalInit::Scalar(
                    immediate(v, &ty).ok_or_else(|| bad("a literal initializer"))?,
                )),
            };
            Global { ty, name, init }
        }
        "alloc" => Alloc {
            ty: ty()?,
            var: expect_var(next(), bad("a variable"))?,
        },
        "load" => Load {
            ty: ty()?,
            src: expect_var(next(), bad("a source variable"))?,
            dst: expect_var(next(), bad("a target register"))?,
        },
        "store" => {
            let ty = ty()?;
            Store {
                src: expect_operand(next(), &ty, bad("a source operand"))?,
                dst: expect_var(next(), bad("a target variable"))?,
                ty,
            }
        }
        "literal" => {
            let ty = ty()?;
            Literal {
                value: next()
                    .and_then(|v| immediate(v, &ty))
                    .ok_or_else(|| bad("a literal value"))?,
                dst: expect_var(next(), bad("a target register"))?,
                ty,
            }
        }
        "elem" => Elem {
            ty: ty()?,
            base: expect_var(next(), bad("a base variable"))?,
            index: expect_operand(next(), &Type::new(BaseType::Int), bad("an index"))?,
            dst: expect_var(next(), bad("a target register"))?,
        },
        "not" => {
            let ty = ty()?;
            Not {
                src: expect_operand(next(), &ty, bad("an operand"))?,
                dst: expect_var(next(), bad("a target register"))?,
                ty,
            }
        }
        "sitofp" | "fptosi" => {
            let (op, from) = match head {
                "sitofp" => (CastOp::Sitofp, BaseType::Int),
                _ => (CastOp::Fptosi, BaseType::Float),
            };
            Cast {
                op,
                src: expect_operand(next(), &Type::new(from), bad("an operand"))?,
                dst: expect_var(next(), bad("a target register"))?,
            }
        }
        "param" => {
            let ty = ty()?;
            Param {
                src: expect_operand(next(), &ty, bad("an argument"))?,
                ty,
            }
        }
        "call" => {
            let func = match next() {
                Some(RawOperand::Name(n)) => n.trim_start_matches('@').to_owned(),
                _ => return Err(bad("a function name")),
            };
            let dst = next().map(|v| expect_var(Some(v), bad("a target register"))).transpose()?;
            Call { func, dst }
        }
        "jump" => Jump(expect_label(next(), bad("a target label"))?),
        "cbranch" => CBranch {
            cond: expect_operand(next(), &Type::new(BaseType::Bool), bad("a predicate"))?,
            taken: expect_label(next(), bad("a taken label"))?,
            fall_through: expect_label(next(), bad("a fall-through label"))?,
        },
        "return" | "print" => {
            let ty = ty()?;
            let src = next()
                .map(|v| expect_operand(Some(v), &ty, bad("a value")))
                .transpose()?;
            if head == "return" {
                Return { ty, src }
            } else {
                Print { ty, src }
            }
        }
        "read" => Read {
            ty: ty()?,
            dst: expect_var(next(), bad("a target variable"))?,
        },
        _ => match BinOp::from_mnemonic(head) {
            Some(op) => {
                let ty = ty()?;
                Binary {
                    op,
                    lhs: expect_operand(next(), &ty, bad("a left operand"))?,
                    rhs: expect_operand(next(), &ty, bad("a right operand"))?,
                    dst: expect_var(next(), bad("a target register"))?,
                    ty,
                }
            }
            None => return Err(IrError::UnknownOpcode(opcode.to_owned())),
        },
    };

    if next().is_some() {
        return Err(bad("fewer operands"));
    }

    Ok(inst)
}

fn expect_var(op: Option<RawOperand>, err: IrError) -> Result<VarId, IrError> {
    match op {
        Some(RawOperand::Name(n)) => Ok(var_id(&n)),
        _ => Err(err),
    }
}

fn expect_label(op: Option<RawOperand>, err: IrError) -> Result<Label, IrError> {
    match op {
        Some(RawOperand::Name(n)) | Some(RawOperand::Text(n)) => Ok(label(&n)),
        _ => Err(err),
    }
}

fn expect_operand(op: Option<RawOperand>, ty: &Type, err: IrError) -> Result<Operand, IrError> {
    match op {
        Some(RawOperand::Name(n)) => Ok(Operand::Var(var_id(&n))),
        Some(op) => immediate(op, ty).map(Operand::Imm).ok_or(err),
        None => Err(err),
    }
}

// quoted literals of a `char` instruction are characters, everything else
// quoted is a string.
fn immediate(op: RawOperand, ty: &Type) -> Option<Immediate> {
    match op {
        RawOperand::Int(n) => Some(Immediate::Int(n)),
        RawOperand::Float(x) => Some(Immediate::Float(x)),
        RawOperand::Text(s) => {
            let mut chars = s.chars();
            match (ty.base, chars.next(), chars.next()) {
                (BaseType::Char, Some(c), None) => Some(Immediate::Char(c)),
                _ => Some(Immediate::Str(s)),
            }
        }
        RawOperand::Name(_) | RawOperand::List(_) => None,
    }
}
