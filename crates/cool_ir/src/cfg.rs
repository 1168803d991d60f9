// Copyright 2025 Diivanand Ramalingam
// Licensed under the Apache License, Version 2.0

//! Control-flow-graph views over a method's blocks.
//!
//! Blocks own their terminators, so the graph is implicit; these helpers
//! materialise the pieces the dataflow passes need: a label index, the
//! predecessor lists, forward reachability, and a reverse postorder.

use std::collections::HashMap;

use crate::tac::{Block, Label};

pub fn label_map(blocks: &[Block]) -> HashMap<Label, usize> {
    blocks
        .iter()
        .enumerate()
        .map(|(i, b)| (b.label, i))
        .collect()
}

/// Predecessor block indices for each block.
pub fn predecessors(blocks: &[Block]) -> Vec<Vec<usize>> {
    let map = label_map(blocks);
    let mut preds = vec![Vec::new(); blocks.len()];
    for (i, b) in blocks.iter().enumerate() {
        for succ in b.term.successors() {
            if let Some(&j) = map.get(&succ) {
                preds[j].push(i);
            }
        }
    }
    preds
}

/// Blocks reachable from the entry block by a forward walk.
pub fn reachable(blocks: &[Block]) -> Vec<bool> {
    let map = label_map(blocks);
    let mut seen = vec![false; blocks.len()];
    if blocks.is_empty() {
        return seen;
    }
    let mut stack = vec![0usize];
    while let Some(i) = stack.pop() {
        if seen[i] {
            continue;
        }
        seen[i] = true;
        for succ in blocks[i].term.successors() {
            if let Some(&j) = map.get(&succ) {
                if !seen[j] {
                    stack.push(j);
                }
            }
        }
    }
    seen
}

/// Reverse postorder over the reachable blocks, starting at the entry.
pub fn rpo(blocks: &[Block]) -> Vec<usize> {
    let map = label_map(blocks);
    let mut state = vec![0u8; blocks.len()]; // 0 new, 1 open, 2 done
    let mut post = Vec::new();
    if blocks.is_empty() {
        return post;
    }

    // Iterative DFS with an explicit stack of (block, next-successor).
    let mut stack: Vec<(usize, usize)> = vec![(0, 0)];
    state[0] = 1;
    while let Some(&(i, next)) = stack.last() {
        let succs = blocks[i].term.successors();
        if next < succs.len() {
            stack.last_mut().unwrap().1 += 1;
            if let Some(&j) = map.get(&succs[next]) {
                if state[j] == 0 {
                    state[j] = 1;
                    stack.push((j, 0));
                }
            }
        } else {
            state[i] = 2;
            post.push(i);
            stack.pop();
        }
    }
    post.reverse();
    post
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tac::{Operand, Term};

    fn block(n: u32, term: Term) -> Block {
        Block {
            label: Label(n),
            instrs: vec![],
            term,
        }
    }

    #[test]
    fn straight_line_graph() {
        let blocks = vec![
            block(0, Term::Jump(Label(1))),
            block(1, Term::Ret(Operand::Void)),
        ];
        assert_eq!(predecessors(&blocks), vec![vec![], vec![0]]);
        assert_eq!(reachable(&blocks), vec![true, true]);
        assert_eq!(rpo(&blocks), vec![0, 1]);
    }

    #[test]
    fn diamond_rpo_visits_entry_first_and_merge_last() {
        let blocks = vec![
            block(
                0,
                Term::Branch {
                    cond: Operand::Bool(true),
                    then_: Label(1),
                    else_: Label(2),
                },
            ),
            block(1, Term::Jump(Label(3))),
            block(2, Term::Jump(Label(3))),
            block(3, Term::Ret(Operand::Void)),
        ];
        let order = rpo(&blocks);
        assert_eq!(order[0], 0);
        assert_eq!(order[3], 3);
    }

    #[test]
    fn unreachable_blocks_are_flagged() {
        let blocks = vec![
            block(0, Term::Ret(Operand::Void)),
            block(1, Term::Ret(Operand::Void)),
        ];
        assert_eq!(reachable(&blocks), vec![true, false]);
    }
}
