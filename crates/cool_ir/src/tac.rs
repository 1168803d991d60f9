// Copyright 2025 Diivanand Ramalingam
// Licensed under the Apache License, Version 2.0

//! Three-address code.
//!
//! A method is a list of basic blocks, each a run of straight-line
//! instructions ending in exactly one terminator. Operands are virtual
//! temporaries, raw immediates, or references to interned constants; boxed
//! values (heap objects) and raw machine words are distinguished by the
//! instructions that produce them (`LoadConst`/`Box` produce boxed values,
//! `Unbox` and the ALU instructions work on raw words).

use std::collections::HashMap;
use std::fmt;

pub use cool_frontend::ast::BinOp;
use cool_frontend::types::ClassId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Temp(pub u32);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Label(pub u32);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct StrId(pub u32);

/// Interned string literals, one entry per distinct literal. Indexed
/// during lowering and optimisation, flushed into `.data` at codegen.
#[derive(Debug, Default, Clone)]
pub struct StrInterner {
    items: Vec<String>,
    map: HashMap<String, StrId>,
}

impl StrInterner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, s: &str) -> StrId {
        if let Some(&id) = self.map.get(s) {
            return id;
        }
        let id = StrId(self.items.len() as u32);
        self.items.push(s.to_string());
        self.map.insert(s.to_string(), id);
        id
    }

    pub fn get(&self, id: StrId) -> &str {
        &self.items[id.0 as usize]
    }

    /// Literals in insertion order (stable across runs).
    pub fn iter(&self) -> impl Iterator<Item = (StrId, &str)> {
        self.items
            .iter()
            .enumerate()
            .map(|(i, s)| (StrId(i as u32), s.as_str()))
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Const {
    Int(i64),
    Bool(bool),
    Str(StrId),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Operand {
    Temp(Temp),
    /// Raw integer immediate.
    Int(i64),
    /// Raw boolean immediate.
    Bool(bool),
    /// The current receiver object.
    SelfObj,
    /// The null reference.
    Void,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PrimClass {
    Int,
    Bool,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum NewTarget {
    Class(ClassId),
    /// `new SELF_TYPE`: the runtime class of the receiver.
    SelfType,
}

/// A dispatch site: the slot index into the receiver's dispatch table, or
/// into `static_class`'s table for static dispatch. The method name is kept
/// for display and for recognising built-ins during folding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallTarget {
    pub method: String,
    pub slot: usize,
    pub static_class: Option<ClassId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    Copy { dst: Temp, src: Operand },
    /// dst := pointer to the interned constant object.
    LoadConst { dst: Temp, konst: Const },
    /// dst := raw payload word of the boxed Int/Bool in src.
    Unbox { dst: Temp, src: Operand },
    /// dst := fresh boxed Int/Bool holding the raw word src.
    Box { dst: Temp, class: PrimClass, src: Operand },
    Bin { dst: Temp, op: BinOp, lhs: Operand, rhs: Operand },
    Un { dst: Temp, op: UnOp, src: Operand },
    /// dst := attribute slot of self.
    GetAttr { dst: Temp, slot: usize },
    SetAttr { slot: usize, src: Operand },
    New { dst: Temp, target: NewTarget },
    /// dst := raw bool, true iff src is void.
    IsVoid { dst: Temp, src: Operand },
    /// Abort with the dispatch-on-void error if src is void.
    VoidCheck { src: Operand },
    /// dst := boxed Bool from the runtime equality test.
    EqTest { dst: Temp, lhs: Operand, rhs: Operand },
    Call { dst: Temp, recv: Operand, args: Vec<Operand>, target: CallTarget },
}

impl Instr {
    /// The temporary this instruction writes, if any.
    pub fn def(&self) -> Option<Temp> {
        match self {
            Instr::Copy { dst, .. }
            | Instr::LoadConst { dst, .. }
            | Instr::Unbox { dst, .. }
            | Instr::Box { dst, .. }
            | Instr::Bin { dst, .. }
            | Instr::Un { dst, .. }
            | Instr::GetAttr { dst, .. }
            | Instr::New { dst, .. }
            | Instr::IsVoid { dst, .. }
            | Instr::EqTest { dst, .. }
            | Instr::Call { dst, .. } => Some(*dst),
            Instr::SetAttr { .. } | Instr::VoidCheck { .. } => None,
        }
    }

    /// The operands this instruction reads.
    pub fn uses(&self) -> Vec<Operand> {
        match self {
            Instr::Copy { src, .. }
            | Instr::Unbox { src, .. }
            | Instr::Box { src, .. }
            | Instr::Un { src, .. }
            | Instr::SetAttr { src, .. }
            | Instr::IsVoid { src, .. }
            | Instr::VoidCheck { src } => vec![*src],
            Instr::Bin { lhs, rhs, .. } | Instr::EqTest { lhs, rhs, .. } => vec![*lhs, *rhs],
            Instr::LoadConst { .. } | Instr::GetAttr { .. } | Instr::New { .. } => vec![],
            Instr::Call { recv, args, .. } => {
                let mut ops = vec![*recv];
                ops.extend(args.iter().copied());
                ops
            }
        }
    }

    /// Instructions with no observable effect besides their result; safe
    /// to delete when the result is dead.
    pub fn is_pure(&self) -> bool {
        matches!(
            self,
            Instr::Copy { .. }
                | Instr::LoadConst { .. }
                | Instr::Unbox { .. }
                | Instr::Box { .. }
                | Instr::Bin { .. }
                | Instr::Un { .. }
                | Instr::GetAttr { .. }
                | Instr::IsVoid { .. }
                | Instr::EqTest { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Jump(Label),
    /// Two-way branch on a raw boolean.
    Branch { cond: Operand, then_: Label, else_: Label },
    /// Runtime-type match: jump to the arm of the most specific matching
    /// class, aborting on void or no match.
    Match { scrutinee: Operand, arms: Vec<(ClassId, Label)> },
    Ret(Operand),
}

impl Term {
    pub fn successors(&self) -> Vec<Label> {
        match self {
            Term::Jump(l) => vec![*l],
            Term::Branch { then_, else_, .. } => vec![*then_, *else_],
            Term::Match { arms, .. } => arms.iter().map(|(_, l)| *l).collect(),
            Term::Ret(_) => vec![],
        }
    }

    pub fn uses(&self) -> Vec<Operand> {
        match self {
            Term::Branch { cond, .. } => vec![*cond],
            Term::Match { scrutinee, .. } => vec![*scrutinee],
            Term::Ret(op) => vec![*op],
            Term::Jump(_) => vec![],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub label: Label,
    pub instrs: Vec<Instr>,
    pub term: Term,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MethodKind {
    /// A user method body.
    Method,
    /// The attribute initialiser `_init_<C>`.
    Init,
}

#[derive(Debug, Clone)]
pub struct IrMethod {
    pub class: ClassId,
    pub class_name: String,
    pub name: String,
    pub kind: MethodKind,
    pub arity: usize,
    pub n_temps: u32,
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, Default)]
pub struct IrProgram {
    pub methods: Vec<IrMethod>,
    pub strings: StrInterner,
}

impl fmt::Display for Temp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Temp(t) => write!(f, "{t}"),
            Operand::Int(n) => write!(f, "{n}"),
            Operand::Bool(b) => write!(f, "{b}"),
            Operand::SelfObj => write!(f, "self"),
            Operand::Void => write!(f, "void"),
        }
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instr::Copy { dst, src } => write!(f, "{dst} := {src}"),
            Instr::LoadConst { dst, konst } => match konst {
                Const::Int(n) => write!(f, "{dst} := const Int {n}"),
                Const::Bool(b) => write!(f, "{dst} := const Bool {b}"),
                Const::Str(s) => write!(f, "{dst} := const Str #{}", s.0),
            },
            Instr::Unbox { dst, src } => write!(f, "{dst} := unbox {src}"),
            Instr::Box { dst, class, src } => write!(f, "{dst} := box {class:?} {src}"),
            Instr::Bin { dst, op, lhs, rhs } => write!(f, "{dst} := {op:?} {lhs} {rhs}"),
            Instr::Un { dst, op, src } => write!(f, "{dst} := {op:?} {src}"),
            Instr::GetAttr { dst, slot } => write!(f, "{dst} := attr[{slot}]"),
            Instr::SetAttr { slot, src } => write!(f, "attr[{slot}] := {src}"),
            Instr::New { dst, target } => write!(f, "{dst} := new {target:?}"),
            Instr::IsVoid { dst, src } => write!(f, "{dst} := isvoid {src}"),
            Instr::VoidCheck { src } => write!(f, "voidcheck {src}"),
            Instr::EqTest { dst, lhs, rhs } => write!(f, "{dst} := eqtest {lhs} {rhs}"),
            Instr::Call { dst, recv, args, target } => {
                write!(f, "{dst} := call {recv}.{}[{}](", target.method, target.slot)?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Jump(l) => write!(f, "jump {l}"),
            Term::Branch { cond, then_, else_ } => {
                write!(f, "branch {cond} ? {then_} : {else_}")
            }
            Term::Match { scrutinee, arms } => {
                write!(f, "match {scrutinee} {{")?;
                for (tag, l) in arms {
                    write!(f, " {tag} => {l}")?;
                }
                write!(f, " }}")
            }
            Term::Ret(op) => write!(f, "ret {op}"),
        }
    }
}

impl fmt::Display for IrMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}.{} ({} temps):", self.class_name, self.name, self.n_temps)?;
        for b in &self.blocks {
            writeln!(f, "{}:", b.label)?;
            for i in &b.instrs {
                writeln!(f, "    {i}")?;
            }
            writeln!(f, "    {}", b.term)?;
        }
        Ok(())
    }
}
