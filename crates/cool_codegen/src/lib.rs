// Copyright 2025 Diivanand Ramalingam
// Licensed under the Apache License, Version 2.0

pub mod abi;
pub mod data;
pub mod emit;
pub mod runtime;

use cool_frontend::types::ClassTable;
use cool_ir::tac::IrProgram;

/// Emits the complete SPIM assembly for an optimised program. Output is
/// byte-identical for identical inputs.
pub fn emit_program(ir: &IrProgram, table: &ClassTable) -> String {
    let ints = data::collect_int_constants(ir);
    let mut asm = emit::Asm::new();

    data::emit_data(&mut asm, table, ir, &ints);

    asm.raw(".text");
    asm.blank();
    runtime::emit_entry(&mut asm);
    runtime::emit_helpers(&mut asm);
    runtime::emit_builtins(&mut asm);
    runtime::emit_builtin_inits(&mut asm);
    emit::emit_methods(&mut asm, ir, table, &ints);

    asm.finish()
}
