// Copyright 2025 Diivanand Ramalingam
// Licensed under the Apache License, Version 2.0

//! Machine-independent optimisation.
//!
//! The passes run in a fixed order and iterate to a fixed point, capped at
//! three global rounds to bound worst-case cost:
//!
//! 1. constant folding (including literal string concatenation),
//! 2. constant propagation over the CFG,
//! 3. liveness-driven dead-code elimination plus unreachable blocks,
//! 4. jump threading of empty forwarding blocks.

pub mod const_prop;
pub mod dce;
pub mod fold;
pub mod jump_thread;
pub mod liveness;

use cool_frontend::ast::BinOp;

use crate::tac::{IrProgram, Operand, UnOp};

const MAX_ROUNDS: usize = 3;

pub fn optimize(prog: &mut IrProgram) {
    let IrProgram { methods, strings } = prog;
    for method in methods {
        for _ in 0..MAX_ROUNDS {
            let mut changed = fold::run(method, strings);
            changed |= const_prop::run(method);
            let live = liveness::analyze(method);
            changed |= dce::run(method, &live);
            changed |= jump_thread::run(method);
            if !changed {
                break;
            }
        }
    }
}

/// A raw machine word known at compile time.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RawVal {
    Int(i64),
    Bool(bool),
}

/// What a pass knows about the value of a temp: a pointer to an interned
/// constant object, or a raw machine word.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum KnownVal {
    Boxed(crate::tac::Const),
    Raw(RawVal),
}

impl RawVal {
    pub fn operand(self) -> Operand {
        match self {
            RawVal::Int(n) => Operand::Int(n),
            RawVal::Bool(b) => Operand::Bool(b),
        }
    }

    pub fn from_operand(op: Operand) -> Option<RawVal> {
        match op {
            Operand::Int(n) => Some(RawVal::Int(n)),
            Operand::Bool(b) => Some(RawVal::Bool(b)),
            _ => None,
        }
    }
}

/// Int is 32-bit two's complement with wraparound; fold exactly the way
/// the emitted arithmetic behaves.
fn wrap(n: i64) -> i64 {
    n as i32 as i64
}

pub fn eval_bin(op: BinOp, lhs: RawVal, rhs: RawVal) -> Option<RawVal> {
    use RawVal::*;
    Some(match (op, lhs, rhs) {
        (BinOp::Add, Int(a), Int(b)) => Int(wrap(a.wrapping_add(b))),
        (BinOp::Sub, Int(a), Int(b)) => Int(wrap(a.wrapping_sub(b))),
        (BinOp::Mul, Int(a), Int(b)) => Int(wrap(a.wrapping_mul(b))),
        // Division by zero is left to the runtime.
        (BinOp::Div, Int(_), Int(0)) => return None,
        (BinOp::Div, Int(a), Int(b)) => Int(wrap((a as i32).wrapping_div(b as i32) as i64)),
        (BinOp::Lt, Int(a), Int(b)) => Bool(a < b),
        (BinOp::Le, Int(a), Int(b)) => Bool(a <= b),
        (BinOp::Eq, Int(a), Int(b)) => Bool(a == b),
        (BinOp::Eq, Bool(a), Bool(b)) => Bool(a == b),
        _ => return None,
    })
}

pub fn eval_un(op: UnOp, src: RawVal) -> Option<RawVal> {
    Some(match (op, src) {
        (UnOp::Neg, RawVal::Int(n)) => RawVal::Int(wrap(n.wrapping_neg())),
        (UnOp::Not, RawVal::Bool(b)) => RawVal::Bool(!b),
        _ => return None,
    })
}
