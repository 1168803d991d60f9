// Copyright 2025 Diivanand Ramalingam
// Licensed under the Apache License, Version 2.0

pub mod cfg;
pub mod lower;
pub mod opt;
pub mod tac;

pub use lower::lower;
pub use opt::optimize;
pub use tac::{IrMethod, IrProgram, MethodKind, StrInterner};
