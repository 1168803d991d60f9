// Copyright 2025 Diivanand Ramalingam
// Licensed under the Apache License, Version 2.0

//! Constant propagation over the CFG.
//!
//! A worklist pass over per-block environments mapping temporaries to a
//! lattice value: absent (⊥, no information yet), a known constant, or
//! varying (⊤). Environments join pointwise at block entries; once the
//! fixed point is reached, raw operands whose temp is a known machine word
//! are rewritten to immediates. The folding pass then collapses whatever
//! became computable.

use std::collections::{HashMap, VecDeque};

use crate::cfg;
use crate::opt::{eval_bin, eval_un, KnownVal, RawVal};
use crate::tac::{Block, Const, Instr, IrMethod, Operand, PrimClass, Temp, Term};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Lat {
    Known(KnownVal),
    Varying,
}

/// Absent keys are ⊥.
type Env = HashMap<Temp, Lat>;

fn join_into(dst: &mut Env, src: &Env) {
    for (&t, &v) in src {
        match dst.get(&t) {
            None => {
                dst.insert(t, v);
            }
            Some(&cur) if cur != v => {
                dst.insert(t, Lat::Varying);
            }
            Some(_) => {}
        }
    }
}

fn val_of(op: Operand, env: &Env) -> Option<KnownVal> {
    match op {
        Operand::Temp(t) => match env.get(&t) {
            Some(Lat::Known(k)) => Some(*k),
            _ => None,
        },
        other => RawVal::from_operand(other).map(KnownVal::Raw),
    }
}

fn raw_of(op: Operand, env: &Env) -> Option<RawVal> {
    match val_of(op, env)? {
        KnownVal::Raw(r) => Some(r),
        KnownVal::Boxed(_) => None,
    }
}

fn transfer(block: &Block, env: &Env) -> Env {
    let mut env = env.clone();
    for instr in &block.instrs {
        let Some(dst) = instr.def() else { continue };
        let lat = match instr {
            Instr::LoadConst { konst, .. } => Lat::Known(KnownVal::Boxed(*konst)),
            Instr::Copy { src, .. } => match val_of(*src, &env) {
                Some(k) => Lat::Known(k),
                None => Lat::Varying,
            },
            Instr::Unbox { src, .. } => match val_of(*src, &env) {
                Some(KnownVal::Boxed(Const::Int(n))) => Lat::Known(KnownVal::Raw(RawVal::Int(n))),
                Some(KnownVal::Boxed(Const::Bool(b))) => {
                    Lat::Known(KnownVal::Raw(RawVal::Bool(b)))
                }
                _ => Lat::Varying,
            },
            Instr::Box { class, src, .. } => match (class, raw_of(*src, &env)) {
                (PrimClass::Int, Some(RawVal::Int(n))) => {
                    Lat::Known(KnownVal::Boxed(Const::Int(n)))
                }
                (PrimClass::Bool, Some(RawVal::Bool(b))) => {
                    Lat::Known(KnownVal::Boxed(Const::Bool(b)))
                }
                _ => Lat::Varying,
            },
            Instr::Bin { op, lhs, rhs, .. } => {
                match (raw_of(*lhs, &env), raw_of(*rhs, &env)) {
                    (Some(l), Some(r)) => match eval_bin(*op, l, r) {
                        Some(v) => Lat::Known(KnownVal::Raw(v)),
                        None => Lat::Varying,
                    },
                    _ => Lat::Varying,
                }
            }
            Instr::Un { op, src, .. } => match raw_of(*src, &env) {
                Some(s) => match eval_un(*op, s) {
                    Some(v) => Lat::Known(KnownVal::Raw(v)),
                    None => Lat::Varying,
                },
                None => Lat::Varying,
            },
            Instr::IsVoid { src, .. } => match val_of(*src, &env) {
                Some(KnownVal::Boxed(_)) => Lat::Known(KnownVal::Raw(RawVal::Bool(false))),
                _ => Lat::Varying,
            },
            Instr::GetAttr { .. }
            | Instr::New { .. }
            | Instr::EqTest { .. }
            | Instr::Call { .. }
            | Instr::SetAttr { .. }
            | Instr::VoidCheck { .. } => Lat::Varying,
        };
        env.insert(dst, lat);
    }
    env
}

pub fn run(method: &mut IrMethod) -> bool {
    let n = method.blocks.len();
    if n == 0 {
        return false;
    }

    let preds = cfg::predecessors(&method.blocks);
    let order = cfg::rpo(&method.blocks);

    let mut in_envs: Vec<Env> = vec![Env::new(); n];
    let mut out_envs: Vec<Env> = vec![Env::new(); n];
    let label_to_idx = cfg::label_map(&method.blocks);

    let mut worklist: VecDeque<usize> = order.iter().copied().collect();
    while let Some(i) = worklist.pop_front() {
        let mut env = Env::new();
        for &p in &preds[i] {
            join_into(&mut env, &out_envs[p]);
        }
        let out = transfer(&method.blocks[i], &env);
        in_envs[i] = env;
        if out != out_envs[i] {
            out_envs[i] = out;
            for succ in method.blocks[i].term.successors() {
                if let Some(&j) = label_to_idx.get(&succ) {
                    if !worklist.contains(&j) {
                        worklist.push_back(j);
                    }
                }
            }
        }
    }

    // Rewrite raw operand positions from the fixed point.
    let mut changed = false;
    for (i, block) in method.blocks.iter_mut().enumerate() {
        let mut env = in_envs[i].clone();
        for instr in &mut block.instrs {
            {
                let mut rewrite = |op: &mut Operand| {
                    if let Operand::Temp(t) = op {
                        if let Some(Lat::Known(KnownVal::Raw(raw))) = env.get(t) {
                            *op = raw.operand();
                            changed = true;
                        }
                    }
                };
                match instr {
                    Instr::Bin { lhs, rhs, .. } => {
                        rewrite(lhs);
                        rewrite(rhs);
                    }
                    Instr::Un { src, .. } | Instr::Box { src, .. } => rewrite(src),
                    _ => {}
                }
            }
            env = transfer_one(instr, env);
        }
        if let Term::Branch { cond, .. } = &mut block.term {
            if let Operand::Temp(t) = cond {
                if let Some(Lat::Known(KnownVal::Raw(raw @ RawVal::Bool(_)))) = env.get(t) {
                    *cond = raw.operand();
                    changed = true;
                }
            }
        }
    }
    changed
}

fn transfer_one(instr: &Instr, env: Env) -> Env {
    let block = Block {
        label: crate::tac::Label(u32::MAX),
        instrs: vec![instr.clone()],
        term: Term::Ret(Operand::Void),
    };
    transfer(&block, &env)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lower::lower;
    use crate::opt::fold;
    use crate::tac::MethodKind;
    use cool_frontend::{lex, parse_program, type_check_program};

    fn optimized_main(src: &str) -> IrMethod {
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
        for _ in 0..3 {
            let mut changed = fold::run(&mut method, strings);
            changed |= run(&mut method);
            if !changed {
                break;
            }
        }
        method
    }

    #[test]
    fn propagates_across_blocks() {
        // The `let` flows a known 5 through the branch condition.
        let m = optimized_main(
            "class Main { main() : Int { let x : Int <- 5 in if x < 10 then 1 else 2 fi }; };",
        );
        // After propagation and folding, the entry branch is decided.
        let entry_jumps = matches!(m.blocks[0].term, Term::Jump(_));
        assert!(entry_jumps, "entry terminator: {:?}", m.blocks[0].term);
    }

    #[test]
    fn join_of_disagreeing_paths_is_varying() {
        let mut a: Env = HashMap::new();
        a.insert(Temp(0), Lat::Known(KnownVal::Raw(RawVal::Int(1))));
        let mut b: Env = HashMap::new();
        b.insert(Temp(0), Lat::Known(KnownVal::Raw(RawVal::Int(2))));
        join_into(&mut a, &b);
        assert_eq!(a.get(&Temp(0)), Some(&Lat::Varying));
    }

    #[test]
    fn join_with_bottom_keeps_the_constant() {
        let mut a: Env = HashMap::new();
        let mut b: Env = HashMap::new();
        b.insert(Temp(0), Lat::Known(KnownVal::Raw(RawVal::Int(1))));
        join_into(&mut a, &b);
        assert_eq!(a.get(&Temp(0)), Some(&Lat::Known(KnownVal::Raw(RawVal::Int(1)))));
    }
}
