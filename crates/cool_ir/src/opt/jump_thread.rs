// Copyright 2025 Diivanand Ramalingam
// Licensed under the Apache License, Version 2.0

//! Jump threading: collapse empty forwarding blocks.
//!
//! A block with no instructions whose terminator is an unconditional jump
//! contributes nothing; every reference to it is retargeted at its final
//! destination and the block falls away as unreachable. Chains are chased
//! with a hop bound so a degenerate empty loop cannot hang the pass.

use std::collections::HashMap;

use crate::cfg;
use crate::tac::{IrMethod, Label, Term};

pub fn run(method: &mut IrMethod) -> bool {
    let map = cfg::label_map(&method.blocks);
    let max_hops = method.blocks.len();

    let resolve = |start: Label| -> Label {
        let mut cur = start;
        for _ in 0..max_hops {
            let Some(&i) = map.get(&cur) else { break };
            let block = &method.blocks[i];
            match (&block.instrs.is_empty(), &block.term) {
                (true, Term::Jump(next)) if *next != cur => cur = *next,
                _ => break,
            }
        }
        cur
    };

    let targets: HashMap<Label, Label> = method
        .blocks
        .iter()
        .flat_map(|b| b.term.successors())
        .map(|l| (l, resolve(l)))
        .collect();

    let mut changed = false;
    for block in &mut method.blocks {
        let retarget = |l: &mut Label, changed: &mut bool| {
            if let Some(&t) = targets.get(l) {
                if t != *l {
                    *l = t;
                    *changed = true;
                }
            }
        };
        match &mut block.term {
            Term::Jump(l) => retarget(l, &mut changed),
            Term::Branch { then_, else_, .. } => {
                retarget(then_, &mut changed);
                retarget(else_, &mut changed);
            }
            Term::Match { arms, .. } => {
                for (_, l) in arms {
                    retarget(l, &mut changed);
                }
            }
            Term::Ret(_) => {}
        }
        // A branch whose arms now agree is a plain jump.
        if let Term::Branch { then_, else_, .. } = &block.term {
            if then_ == else_ {
                block.term = Term::Jump(*then_);
                changed = true;
            }
        }
    }

    // Forwarding blocks are now bypassed; drop whatever became
    // unreachable.
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
    use crate::tac::{Block, Instr, MethodKind, Operand, Temp};

    fn jump_block(n: u32, to: u32) -> Block {
        Block {
            label: Label(n),
            instrs: vec![],
            term: Term::Jump(Label(to)),
        }
    }

    #[test]
    fn threads_through_an_empty_block() {
        let mut m = IrMethod {
            class: 0,
            class_name: "T".into(),
            name: "m".into(),
            kind: MethodKind::Method,
            arity: 0,
            n_temps: 0,
            blocks: vec![
                Block {
                    label: Label(0),
                    instrs: vec![Instr::Copy {
                        dst: Temp(0),
                        src: Operand::Int(1),
                    }],
                    term: Term::Jump(Label(1)),
                },
                jump_block(1, 2),
                Block {
                    label: Label(2),
                    instrs: vec![],
                    term: Term::Ret(Operand::Void),
                },
            ],
        };
        assert!(run(&mut m));
        assert_eq!(m.blocks.len(), 2);
        assert_eq!(m.blocks[0].term, Term::Jump(Label(2)));
    }

    #[test]
    fn branch_with_agreeing_arms_becomes_a_jump() {
        let mut m = IrMethod {
            class: 0,
            class_name: "T".into(),
            name: "m".into(),
            kind: MethodKind::Method,
            arity: 0,
            n_temps: 1,
            blocks: vec![
                Block {
                    label: Label(0),
                    instrs: vec![],
                    term: Term::Branch {
                        cond: Operand::Temp(Temp(0)),
                        then_: Label(1),
                        else_: Label(2),
                    },
                },
                jump_block(1, 3),
                jump_block(2, 3),
                Block {
                    label: Label(3),
                    instrs: vec![],
                    term: Term::Ret(Operand::Void),
                },
            ],
        };
        assert!(run(&mut m));
        assert_eq!(m.blocks[0].term, Term::Jump(Label(3)));
    }

    #[test]
    fn empty_self_loop_does_not_hang() {
        let mut m = IrMethod {
            class: 0,
            class_name: "T".into(),
            name: "m".into(),
            kind: MethodKind::Method,
            arity: 0,
            n_temps: 0,
            blocks: vec![
                Block {
                    label: Label(0),
                    instrs: vec![],
                    term: Term::Jump(Label(1)),
                },
                jump_block(1, 1),
            ],
        };
        let _ = run(&mut m);
    }
}
