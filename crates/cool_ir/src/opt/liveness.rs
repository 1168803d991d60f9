// Copyright 2025 Diivanand Ramalingam
// Licensed under the Apache License, Version 2.0

//! Backward live-variable analysis.
//!
//! live_in(b) = use(b) ∪ (live_out(b) − def(b)), with live_out(b) the
//! union of the live_in of b's successors. Iterated to a fixed point with
//! a worklist.

use std::collections::{HashSet, VecDeque};

use crate::cfg;
use crate::tac::{IrMethod, Operand, Temp};

#[derive(Debug)]
pub struct Liveness {
    pub live_in: Vec<HashSet<Temp>>,
    pub live_out: Vec<HashSet<Temp>>,
}

pub fn analyze(method: &IrMethod) -> Liveness {
    let blocks = &method.blocks;
    let n = blocks.len();
    let map = cfg::label_map(blocks);

    // Per-block summaries: upward-exposed uses and defs.
    let mut uses: Vec<HashSet<Temp>> = vec![HashSet::new(); n];
    let mut defs: Vec<HashSet<Temp>> = vec![HashSet::new(); n];
    for (i, b) in blocks.iter().enumerate() {
        for instr in &b.instrs {
            for op in instr.uses() {
                if let Operand::Temp(t) = op {
                    if !defs[i].contains(&t) {
                        uses[i].insert(t);
                    }
                }
            }
            if let Some(d) = instr.def() {
                defs[i].insert(d);
            }
        }
        for op in b.term.uses() {
            if let Operand::Temp(t) = op {
                if !defs[i].contains(&t) {
                    uses[i].insert(t);
                }
            }
        }
    }

    let mut live_in: Vec<HashSet<Temp>> = vec![HashSet::new(); n];
    let mut live_out: Vec<HashSet<Temp>> = vec![HashSet::new(); n];

    let mut worklist: VecDeque<usize> = (0..n).rev().collect();
    while let Some(i) = worklist.pop_front() {
        let mut out = HashSet::new();
        for succ in blocks[i].term.successors() {
            if let Some(&j) = map.get(&succ) {
                out.extend(live_in[j].iter().copied());
            }
        }

        let mut inn = uses[i].clone();
        inn.extend(out.difference(&defs[i]).copied());

        live_out[i] = out;
        if inn != live_in[i] {
            live_in[i] = inn;
            // Predecessors need recomputing; cheap to re-enqueue all of
            // them via a scan given typical method sizes.
            for (p, b) in blocks.iter().enumerate() {
                if b.term.successors().iter().any(|l| map.get(l) == Some(&i)) {
                    if !worklist.contains(&p) {
                        worklist.push_back(p);
                    }
                }
            }
        }
    }

    Liveness { live_in, live_out }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tac::{Block, Instr, Label, Term};
    use cool_frontend::ast::BinOp;

    #[test]
    fn value_used_in_later_block_is_live_across_the_edge() {
        let method = IrMethod {
            class: 0,
            class_name: "T".into(),
            name: "m".into(),
            kind: crate::tac::MethodKind::Method,
            arity: 0,
            n_temps: 2,
            blocks: vec![
                Block {
                    label: Label(0),
                    instrs: vec![Instr::Copy {
                        dst: Temp(0),
                        src: Operand::Int(1),
                    }],
                    term: Term::Jump(Label(1)),
                },
                Block {
                    label: Label(1),
                    instrs: vec![Instr::Bin {
                        dst: Temp(1),
                        op: BinOp::Add,
                        lhs: Operand::Temp(Temp(0)),
                        rhs: Operand::Int(2),
                    }],
                    term: Term::Ret(Operand::Temp(Temp(1))),
                },
            ],
        };
        let live = analyze(&method);
        assert!(live.live_out[0].contains(&Temp(0)));
        assert!(live.live_in[1].contains(&Temp(0)));
        assert!(!live.live_out[1].contains(&Temp(1)), "t1 dies at the return");
        assert!(live.live_in[1].len() == 1);
    }

    #[test]
    fn def_kills_liveness_upward() {
        let method = IrMethod {
            class: 0,
            class_name: "T".into(),
            name: "m".into(),
            kind: crate::tac::MethodKind::Method,
            arity: 0,
            n_temps: 1,
            blocks: vec![Block {
                label: Label(0),
                instrs: vec![Instr::Copy {
                    dst: Temp(0),
                    src: Operand::Int(1),
                }],
                term: Term::Ret(Operand::Temp(Temp(0))),
            }],
        };
        let live = analyze(&method);
        assert!(live.live_in[0].is_empty());
    }
}
