// Copyright 2025 Diivanand Ramalingam
// Licensed under the Apache License, Version 2.0

pub mod ast;
pub mod diag;
pub mod lexer;
pub mod parser;
pub mod typechecker;
pub mod types;

pub use ast::*;
pub use diag::{Diagnostic, SourceMap, Span};
pub use lexer::{lex, Tok, Token};
pub use parser::parse_program;
pub use typechecker::type_check_program;
pub use types::{ClassId, ClassTable, CoolType};
