// check whether an instruction stream is well formed enough for the
// optimizer:
//
// - only `global_*` declarations may come before the first `define`.
// - label markers are unique within their function.
// - every `jump`/`cbranch` target is a label marker of the same function.
//
// type correctness is the business of the type checker and is not re-checked.

use std::collections::BTreeSet as Set;

use super::*;
use crate::commons::{InternalError, Valid};

impl Program {
    pub fn validate(self) -> Result<Valid<Program>, InternalError> {
        let mut func: Option<&str> = None;
        let mut defined: Set<&Label> = Set::new();
        let mut targets: Vec<&Label> = vec![];

        fn check_targets(
            func: Option<&str>,
            defined: &Set<&Label>,
            targets: &[&Label],
        ) -> Result<(), InternalError> {
            match targets.iter().find(|l| !defined.contains(*l)) {
                Some(l) => Err(InternalError::UnresolvedLabel {
                    func: func.unwrap_or_default().to_owned(),
                    label: l.name().to_owned(),
                }),
                None => Ok(()),
            }
        }

        for inst in &self.insts {
            match inst {
                Instruction::Define { name, .. } => {
                    check_targets(func, &defined, &targets)?;
                    func = Some(name);
                    defined.clear();
                    targets.clear();
                }
                Instruction::Global { .. } => (),
                _ if func.is_none() => {
                    return Err(InternalError::OutsideFunction(inst.to_string()));
                }
                Instruction::Label(l) => {
                    if !defined.insert(l) {
                        return Err(InternalError::DuplicateLabel {
                            func: func.unwrap_or_default().to_owned(),
                            label: l.name().to_owned(),
                        });
                    }
                }
                Instruction::Jump(target) => targets.push(target),
                Instruction::CBranch {
                    taken,
                    fall_through,
                    ..
                } => {
                    targets.push(taken);
                    targets.push(fall_through);
                }
                _ => (),
            }
        }
        check_targets(func, &defined, &targets)?;

        Ok(Valid(self))
    }
}
