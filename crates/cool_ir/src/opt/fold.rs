// Copyright 2025 Diivanand Ramalingam
// Licensed under the Apache License, Version 2.0

//! Block-local constant folding.
//!
//! Walks each block with a map of temporaries whose values are known
//! within the block, collapsing pure operations on literals: unboxing a
//! constant, arithmetic on raw literals, boxing a literal back into a pool
//! constant, `isvoid` of a known object, equality of string literals, and
//! `concat` of two string literals. Cross-block knowledge is the job of
//! constant propagation.

use std::collections::HashMap;

use crate::opt::{eval_bin, eval_un, KnownVal as Known, RawVal};
use crate::tac::{Const, Instr, IrMethod, Operand, PrimClass, StrInterner, Temp, Term};

pub fn run(method: &mut IrMethod, strings: &mut StrInterner) -> bool {
    let mut changed = false;
    for block in &mut method.blocks {
        let mut known: HashMap<Temp, Known> = HashMap::new();
        let mut out = Vec::with_capacity(block.instrs.len());

        for mut instr in block.instrs.drain(..) {
            rewrite_raw_operands(&mut instr, &known, &mut changed);

            let folded = fold_instr(&instr, &known, strings);
            let instr = match folded {
                Some(new_instr) => {
                    changed = true;
                    new_instr
                }
                None => instr,
            };

            // Update block-local knowledge.
            if let Some(dst) = instr.def() {
                known.remove(&dst);
                match &instr {
                    Instr::LoadConst { konst, .. } => {
                        known.insert(dst, Known::Boxed(*konst));
                    }
                    Instr::Copy { src, .. } => match src {
                        Operand::Temp(t) => {
                            if let Some(k) = known.get(t).copied() {
                                known.insert(dst, k);
                            }
                        }
                        op => {
                            if let Some(raw) = RawVal::from_operand(*op) {
                                known.insert(dst, Known::Raw(raw));
                            }
                        }
                    },
                    _ => {}
                }
            }
            out.push(instr);
        }
        block.instrs = out;

        // Fold a branch whose condition became a literal.
        if let Term::Branch { cond, then_, else_ } = block.term.clone() {
            let new_cond = resolve(cond, &known);
            if let Operand::Bool(b) = new_cond {
                block.term = Term::Jump(if b { then_ } else { else_ });
                changed = true;
            } else if new_cond != cond {
                block.term = Term::Branch {
                    cond: new_cond,
                    then_,
                    else_,
                };
                changed = true;
            }
        }
    }
    changed
}

/// Replaces raw-position temp operands whose value is known.
fn rewrite_raw_operands(instr: &mut Instr, known: &HashMap<Temp, Known>, changed: &mut bool) {
    let rewrite = |op: &mut Operand, changed: &mut bool| {
        let new = resolve(*op, known);
        if new != *op {
            *op = new;
            *changed = true;
        }
    };
    match instr {
        Instr::Bin { lhs, rhs, .. } => {
            rewrite(lhs, changed);
            rewrite(rhs, changed);
        }
        Instr::Un { src, .. } | Instr::Box { src, .. } => rewrite(src, changed),
        _ => {}
    }
}

fn resolve(op: Operand, known: &HashMap<Temp, Known>) -> Operand {
    if let Operand::Temp(t) = op {
        if let Some(Known::Raw(raw)) = known.get(&t) {
            return raw.operand();
        }
    }
    op
}

fn known_of(op: Operand, known: &HashMap<Temp, Known>) -> Option<Known> {
    match op {
        Operand::Temp(t) => known.get(&t).copied(),
        _ => RawVal::from_operand(op).map(Known::Raw),
    }
}

fn fold_instr(
    instr: &Instr,
    known: &HashMap<Temp, Known>,
    strings: &mut StrInterner,
) -> Option<Instr> {
    match instr {
        Instr::Unbox { dst, src } => match known_of(*src, known)? {
            Known::Boxed(Const::Int(n)) => Some(Instr::Copy {
                dst: *dst,
                src: Operand::Int(n),
            }),
            Known::Boxed(Const::Bool(b)) => Some(Instr::Copy {
                dst: *dst,
                src: Operand::Bool(b),
            }),
            _ => None,
        },

        Instr::Bin { dst, op, lhs, rhs } => {
            let l = RawVal::from_operand(*lhs)?;
            let r = RawVal::from_operand(*rhs)?;
            let v = eval_bin(*op, l, r)?;
            Some(Instr::Copy {
                dst: *dst,
                src: v.operand(),
            })
        }

        Instr::Un { dst, op, src } => {
            let s = RawVal::from_operand(*src)?;
            let v = eval_un(*op, s)?;
            Some(Instr::Copy {
                dst: *dst,
                src: v.operand(),
            })
        }

        Instr::Box { dst, class, src } => {
            let raw = RawVal::from_operand(*src)?;
            let konst = match (class, raw) {
                (PrimClass::Int, RawVal::Int(n)) => Const::Int(n),
                (PrimClass::Bool, RawVal::Bool(b)) => Const::Bool(b),
                _ => return None,
            };
            Some(Instr::LoadConst { dst: *dst, konst })
        }

        Instr::IsVoid { dst, src } => match src {
            Operand::Void => Some(Instr::Copy {
                dst: *dst,
                src: Operand::Bool(true),
            }),
            Operand::SelfObj => Some(Instr::Copy {
                dst: *dst,
                src: Operand::Bool(false),
            }),
            Operand::Temp(_) => match known_of(*src, known)? {
                Known::Boxed(_) => Some(Instr::Copy {
                    dst: *dst,
                    src: Operand::Bool(false),
                }),
                Known::Raw(_) => None,
            },
            _ => None,
        },

        Instr::EqTest { dst, lhs, rhs } => {
            let (Known::Boxed(Const::Str(a)), Known::Boxed(Const::Str(b))) =
                (known_of(*lhs, known)?, known_of(*rhs, known)?)
            else {
                return None;
            };
            let eq = strings.get(a) == strings.get(b);
            Some(Instr::LoadConst {
                dst: *dst,
                konst: Const::Bool(eq),
            })
        }

        // Concatenation of two string literals becomes a single literal.
        Instr::Call {
            dst,
            recv,
            args,
            target,
        } if target.method == "concat" && args.len() == 1 => {
            let (Known::Boxed(Const::Str(a)), Known::Boxed(Const::Str(b))) =
                (known_of(*recv, known)?, known_of(args[0], known)?)
            else {
                return None;
            };
            let joined = format!("{}{}", strings.get(a), strings.get(b));
            let id = strings.intern(&joined);
            Some(Instr::LoadConst {
                dst: *dst,
                konst: Const::Str(id),
            })
        }

        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lower::lower;
    use crate::tac::MethodKind;
    use cool_frontend::{lex, parse_program, type_check_program};

    fn folded(src: &str) -> IrMethod {
        let toks = lex(src).unwrap();
        let mut prog = parse_program(&toks).unwrap();
        let table = type_check_program(&mut prog).unwrap();
        let mut ir = lower(&prog, &table).unwrap();
        let strings = &mut ir.strings;
        let mut method = ir
            .methods
            .iter()
            .find(|m| m.name == "main" && m.kind == MethodKind::Method)
            .unwrap()
            .clone();
        while run(&mut method, strings) {}
        method
    }

    #[test]
    fn folds_arithmetic_on_literals() {
        let m = folded("class Main { main() : Int { 3 + 4 * 5 }; };");
        assert!(m.blocks[0].instrs.iter().any(|i| matches!(
            i,
            Instr::LoadConst {
                konst: Const::Int(23),
                ..
            }
        )));
        assert!(!m.blocks[0]
            .instrs
            .iter()
            .any(|i| matches!(i, Instr::Bin { .. })));
    }

    #[test]
    fn folds_comparisons_to_bool_constants() {
        let m = folded("class Main { main() : Bool { 1 < 2 }; };");
        assert!(m.blocks[0].instrs.iter().any(|i| matches!(
            i,
            Instr::LoadConst {
                konst: Const::Bool(true),
                ..
            }
        )));
    }

    #[test]
    fn folds_branch_on_literal_condition() {
        let m = folded("class Main { main() : Int { if true then 1 else 2 fi }; };");
        assert!(matches!(m.blocks[0].term, Term::Jump(_)));
    }

    #[test]
    fn folds_literal_string_concat() {
        let m = folded(r#"class Main { main() : String { "foo".concat("bar") }; };"#);
        // The call disappears; a single literal remains.
        assert!(!m.blocks[0]
            .instrs
            .iter()
            .any(|i| matches!(i, Instr::Call { .. })));
    }

    #[test]
    fn integer_arithmetic_wraps_at_32_bits() {
        let m = folded("class Main { main() : Int { 2147483647 + 1 }; };");
        assert!(m.blocks[0].instrs.iter().any(|i| matches!(
            i,
            Instr::LoadConst {
                konst: Const::Int(n),
                ..
            } if *n == i32::MIN as i64
        )));
    }

    #[test]
    fn isvoid_of_literal_folds_false() {
        let m = folded("class Main { main() : Bool { isvoid 1 }; };");
        assert!(m.blocks[0].instrs.iter().any(|i| matches!(
            i,
            Instr::LoadConst {
                konst: Const::Bool(false),
                ..
            }
        )));
    }
}
