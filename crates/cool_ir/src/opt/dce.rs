// Copyright 2025 Diivanand Ramalingam
// Licensed under the Apache License, Version 2.0

//! Dead-code elimination.
//!
//! Removes pure instructions whose result is dead at that point, then
//! drops blocks a forward walk from the entry cannot reach. Calls,
//! allocations, attribute stores, and void checks are never removed.

use crate::cfg;
use crate::opt::liveness::Liveness;
use crate::tac::{IrMethod, Operand};

pub fn run(method: &mut IrMethod, live: &Liveness) -> bool {
    let mut changed = false;

    for (i, block) in method.blocks.iter_mut().enumerate() {
        let mut live_set = live.live_out[i].clone();
        for op in block.term.uses() {
            if let Operand::Temp(t) = op {
                live_set.insert(t);
            }
        }

        let mut kept = Vec::with_capacity(block.instrs.len());
        for instr in block.instrs.drain(..).rev() {
            let dead = instr.is_pure()
                && instr.def().map_or(false, |d| !live_set.contains(&d));
            if dead {
                changed = true;
                continue;
            }
            if let Some(d) = instr.def() {
                live_set.remove(&d);
            }
            for op in instr.uses() {
                if let Operand::Temp(t) = op {
                    live_set.insert(t);
                }
            }
            kept.push(instr);
        }
        kept.reverse();
        block.instrs = kept;
    }

    let keep = cfg::reachable(&method.blocks);
    if keep.iter().any(|k| !k) {
        let mut idx = 0;
        method.blocks.retain(|_| {
            let k = keep[idx];
            idx += 1;
            k
        });
        changed = true;
    }

    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opt::liveness;
    use crate::tac::{Block, Instr, Label, MethodKind, Temp, Term};

    fn method(blocks: Vec<Block>, n_temps: u32) -> IrMethod {
        IrMethod {
            class: 0,
            class_name: "T".into(),
            name: "m".into(),
            kind: MethodKind::Method,
            arity: 0,
            n_temps,
            blocks,
        }
    }

    #[test]
    fn removes_pure_instruction_with_dead_result() {
        let mut m = method(
            vec![Block {
                label: Label(0),
                instrs: vec![
                    Instr::Copy {
                        dst: Temp(0),
                        src: Operand::Int(1),
                    },
                    Instr::Copy {
                        dst: Temp(1),
                        src: Operand::Int(2),
                    },
                ],
                term: Term::Ret(Operand::Temp(Temp(1))),
            }],
            2,
        );
        let live = liveness::analyze(&m);
        assert!(run(&mut m, &live));
        assert_eq!(m.blocks[0].instrs.len(), 1);
    }

    #[test]
    fn keeps_impure_instructions() {
        let mut m = method(
            vec![Block {
                label: Label(0),
                instrs: vec![Instr::SetAttr {
                    slot: 0,
                    src: Operand::Int(1),
                }],
                term: Term::Ret(Operand::Void),
            }],
            0,
        );
        let live = liveness::analyze(&m);
        run(&mut m, &live);
        assert_eq!(m.blocks[0].instrs.len(), 1);
    }

    #[test]
    fn drops_unreachable_blocks() {
        let mut m = method(
            vec![
                Block {
                    label: Label(0),
                    instrs: vec![],
                    term: Term::Ret(Operand::Void),
                },
                Block {
                    label: Label(1),
                    instrs: vec![],
                    term: Term::Ret(Operand::Void),
                },
            ],
            0,
        );
        let live = liveness::analyze(&m);
        assert!(run(&mut m, &live));
        assert_eq!(m.blocks.len(), 1);
    }

    #[test]
    fn dead_chain_is_removed_transitively_over_rounds() {
        // t0 feeds only t1, t1 is dead: one round kills t1, next kills t0.
        let mut m = method(
            vec![Block {
                label: Label(0),
                instrs: vec![
                    Instr::Copy {
                        dst: Temp(0),
                        src: Operand::Int(1),
                    },
                    Instr::Un {
                        dst: Temp(1),
                        op: crate::tac::UnOp::Neg,
                        src: Operand::Temp(Temp(0)),
                    },
                ],
                term: Term::Ret(Operand::Void),
            }],
            2,
        );
        // The backward sweep handles the chain in a single pass.
        let live = liveness::analyze(&m);
        assert!(run(&mut m, &live));
        assert!(m.blocks[0].instrs.is_empty());
    }
}
