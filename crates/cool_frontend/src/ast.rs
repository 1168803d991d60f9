// Copyright 2025 Diivanand Ramalingam
// Licensed under the Apache License, Version 2.0

use crate::diag::Span;
use crate::types::CoolType;

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub classes: Vec<Class>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Class {
    pub name: Ident,           // TYPE
    pub parent: Option<Ident>, // TYPE
    pub features: Vec<Feature>,
    pub span: Span,
}

/// An identifier (object or type) with its source span.
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

impl Ident {
    pub fn as_str(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Feature {
    Method {
        name: Ident, // ID
        formals: Vec<Formal>,
        ret_type: Ident, // TYPE
        body: Expr,
        span: Span,
    },
    Attr {
        name: Ident, // ID
        ty: Ident,   // TYPE
        init: Option<Expr>,
        span: Span,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Formal {
    pub name: Ident, // ID
    pub ty: Ident,   // TYPE
}

/// An expression node. The static type is filled in by the semantic
/// analyser; it is `None` straight out of the parser.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
    pub ty: Option<CoolType>,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self {
            kind,
            span,
            ty: None,
        }
    }

    /// The annotated static type. Panics if semantic analysis has not run.
    pub fn static_ty(&self) -> &CoolType {
        self.ty
            .as_ref()
            .expect("expression not annotated by semantic analysis")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Assign {
        name: Ident,
        expr: Box<Expr>,
    },

    /// Dynamic dispatch; static dispatch carries a non-empty `static_type`.
    Dispatch {
        recv: Box<Expr>,
        static_type: Option<Ident>,
        method: Ident,
        args: Vec<Expr>,
    },

    If {
        cond: Box<Expr>,
        then_: Box<Expr>,
        else_: Box<Expr>,
    },

    While {
        cond: Box<Expr>,
        body: Box<Expr>,
    },

    Block(Vec<Expr>),

    /// A single binding. `let a : T, b : U in e` is desugared to nested
    /// lets during parsing.
    Let {
        name: Ident,
        ty: Ident,
        init: Option<Box<Expr>>,
        body: Box<Expr>,
    },

    Case {
        scrutinee: Box<Expr>,
        arms: Vec<CaseArm>,
    },

    New(Ident),

    IsVoid(Box<Expr>),

    // unary boolean negation
    Not(Box<Expr>),

    // unary arithmetic negation
    Neg(Box<Expr>), // ~expr

    // infix binary operations
    Bin {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },

    // parenthesis expression
    Paren(Box<Expr>),

    // literals
    Id(Ident),
    Int(i64),
    Str(String),
    Bool(bool),
    Self_,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseArm {
    pub name: Ident,
    pub ty: Ident,
    pub body: Expr,
    pub span: Span,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Le,
    Eq,
}
