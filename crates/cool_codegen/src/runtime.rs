// Copyright 2025 Diivanand Ramalingam
// Licensed under the Apache License, Version 2.0

//! The emitted runtime: program entry, allocation and equality helpers,
//! abort handlers, the built-in methods, and the trivial built-in class
//! initialisers.
//!
//! Calling convention (shared with generated methods): receiver in `$a0`,
//! arguments pushed in reverse order so argument i sits at `4*i($sp)` on
//! entry, result in `$a0`, caller pops the arguments.

use crate::emit::Asm;

pub fn emit_entry(asm: &mut Asm) {
    asm.comment("Program entry point");
    asm.raw(".globl main");
    asm.label("main");
    asm.ins("la $t0, _heap_start");
    asm.ins("sw $gp, 0($t0)");
    asm.ins("la $a0, _protObj_Main");
    asm.ins("jal _Object_copy");
    asm.ins("jal _init_Main");
    asm.ins("jal _method_Main_main");
    asm.ins("li $v0, 10");
    asm.ins("syscall");
    asm.blank();
}

pub fn emit_helpers(asm: &mut Asm) {
    asm.comment("Runtime support routines");

    // $a0 = object to clone; returns the copy in $a0. The requested size
    // is rounded up to a word multiple before sbrk.
    asm.label("_Object_copy");
    asm.ins("lw $t0, 4($a0)");
    asm.ins("addiu $t0, $t0, 3");
    asm.ins("li $t1, -4");
    asm.ins("and $t0, $t0, $t1");
    asm.ins("move $t1, $a0");
    asm.ins("move $a0, $t0");
    asm.ins("li $v0, 9");
    asm.ins("syscall");
    asm.ins("move $t2, $v0");
    asm.ins("move $t3, $t0");
    asm.label("_Object_copy_loop");
    asm.ins("beqz $t3, _Object_copy_done");
    asm.ins("lw $t4, 0($t1)");
    asm.ins("sw $t4, 0($t2)");
    asm.ins("addiu $t1, $t1, 4");
    asm.ins("addiu $t2, $t2, 4");
    asm.ins("addiu $t3, $t3, -4");
    asm.ins("j _Object_copy_loop");
    asm.label("_Object_copy_done");
    asm.ins("move $a0, $v0");
    asm.ins("jr $ra");
    asm.blank();

    // $a0, $a1 = operands; returns a Bool object in $a0. Pointer equality
    // first, then tag-equal value comparison for Int/Bool, byte comparison
    // for String, pointer inequality otherwise.
    asm.label("_equality_test");
    asm.ins("beq $a0, $a1, _eq_true");
    asm.ins("beqz $a0, _eq_false");
    asm.ins("beqz $a1, _eq_false");
    asm.ins("lw $t0, 0($a0)");
    asm.ins("lw $t1, 0($a1)");
    asm.ins("bne $t0, $t1, _eq_false");
    asm.ins("li $t2, 2");
    asm.ins("bne $t0, $t2, _eq_check_bool");
    asm.ins("lw $t0, 12($a0)");
    asm.ins("lw $t1, 12($a1)");
    asm.ins("beq $t0, $t1, _eq_true");
    asm.ins("j _eq_false");
    asm.label("_eq_check_bool");
    asm.ins("li $t2, 3");
    asm.ins("bne $t0, $t2, _eq_check_string");
    asm.ins("lw $t0, 12($a0)");
    asm.ins("lw $t1, 12($a1)");
    asm.ins("beq $t0, $t1, _eq_true");
    asm.ins("j _eq_false");
    asm.label("_eq_check_string");
    asm.ins("li $t2, 4");
    asm.ins("bne $t0, $t2, _eq_false");
    asm.ins("lw $t0, 12($a0)");
    asm.ins("lw $t1, 12($a1)");
    asm.ins("bne $t0, $t1, _eq_false");
    asm.ins("addiu $t2, $a0, 16");
    asm.ins("addiu $t3, $a1, 16");
    asm.label("_eq_string_loop");
    asm.ins("beqz $t0, _eq_true");
    asm.ins("lb $t4, 0($t2)");
    asm.ins("lb $t5, 0($t3)");
    asm.ins("bne $t4, $t5, _eq_false");
    asm.ins("addiu $t2, $t2, 1");
    asm.ins("addiu $t3, $t3, 1");
    asm.ins("addiu $t0, $t0, -1");
    asm.ins("j _eq_string_loop");
    asm.label("_eq_true");
    asm.ins("la $a0, _bool_const_true");
    asm.ins("jr $ra");
    asm.label("_eq_false");
    asm.ins("la $a0, _bool_const_false");
    asm.ins("jr $ra");
    asm.blank();

    emit_abort(asm, "_dispatch_void", "_dispatch_void_msg");
    emit_abort(asm, "_case_void", "_case_void_msg");
    emit_abort(asm, "_case_abort", "_case_abort_msg");
    emit_abort(asm, "_substr_abort", "_substr_abort_msg");

    asm.raw(".data");
    asm.label("_dispatch_void_msg");
    asm.ins(".asciiz \"Error: Dispatch on void\\n\"");
    asm.label("_case_void_msg");
    asm.ins(".asciiz \"Error: Case on void\\n\"");
    asm.label("_case_abort_msg");
    asm.ins(".asciiz \"Error: No match in case\\n\"");
    asm.label("_substr_abort_msg");
    asm.ins(".asciiz \"Error: substr out of range\\n\"");
    asm.raw(".text");
    asm.blank();
}

fn emit_abort(asm: &mut Asm, label: &str, msg: &str) {
    asm.label(label);
    asm.ins(format!("la $a0, {msg}"));
    asm.ins("li $v0, 4");
    asm.ins("syscall");
    asm.ins("li $v0, 10");
    asm.ins("syscall");
    asm.blank();
}

pub fn emit_builtins(asm: &mut Asm) {
    asm.comment("Built-in methods");

    asm.label("_method_Object_abort");
    asm.ins("li $v0, 10");
    asm.ins("syscall");
    asm.blank();

    asm.label("_method_Object_type_name");
    asm.ins("lw $t0, 0($a0)");
    asm.ins("sll $t0, $t0, 2");
    asm.ins("la $t1, _class_name_table");
    asm.ins("add $t0, $t0, $t1");
    asm.ins("lw $a0, 0($t0)");
    asm.ins("jr $ra");
    asm.blank();

    asm.label("_method_Object_copy");
    asm.ins("j _Object_copy");
    asm.blank();

    asm.label("_method_IO_out_string");
    asm.ins("lw $t1, 0($sp)");
    asm.ins("move $t0, $a0");
    asm.ins("addiu $a0, $t1, 16");
    asm.ins("li $v0, 4");
    asm.ins("syscall");
    asm.ins("move $a0, $t0");
    asm.ins("jr $ra");
    asm.blank();

    asm.label("_method_IO_out_int");
    asm.ins("lw $t1, 0($sp)");
    asm.ins("move $t0, $a0");
    asm.ins("lw $a0, 12($t1)");
    asm.ins("li $v0, 1");
    asm.ins("syscall");
    asm.ins("move $a0, $t0");
    asm.ins("jr $ra");
    asm.blank();

    // Reads a line into a fresh buffer, then builds a String object of
    // exactly the right size.
    asm.label("_method_IO_in_string");
    asm.ins("addiu $sp, $sp, -16");
    asm.ins("sw $ra, 12($sp)");
    asm.ins("sw $a0, 8($sp)");
    asm.ins("li $a0, 1024");
    asm.ins("li $v0, 9");
    asm.ins("syscall");
    asm.ins("sw $v0, 4($sp)");
    asm.ins("move $a0, $v0");
    asm.ins("li $a1, 1024");
    asm.ins("li $v0, 8");
    asm.ins("syscall");
    asm.ins("lw $t1, 4($sp)");
    asm.ins("li $t2, 0");
    asm.label("_in_string_len");
    asm.ins("lb $t3, 0($t1)");
    asm.ins("beqz $t3, _in_string_len_done");
    asm.ins("li $t4, 10");
    asm.ins("beq $t3, $t4, _in_string_len_done");
    asm.ins("addiu $t1, $t1, 1");
    asm.ins("addiu $t2, $t2, 1");
    asm.ins("j _in_string_len");
    asm.label("_in_string_len_done");
    asm.ins("sb $zero, 0($t1)");
    asm.ins("sw $t2, 0($sp)");
    asm.ins("addiu $t2, $t2, 20");
    asm.ins("li $t3, -4");
    asm.ins("and $a0, $t2, $t3");
    asm.ins("move $t8, $a0");
    asm.ins("li $v0, 9");
    asm.ins("syscall");
    asm.ins("move $a0, $v0");
    asm.ins("li $t0, 4");
    asm.ins("sw $t0, 0($a0)");
    asm.ins("sw $t8, 4($a0)");
    asm.ins("la $t0, _dispTab_String");
    asm.ins("sw $t0, 8($a0)");
    asm.ins("lw $t0, 0($sp)");
    asm.ins("sw $t0, 12($a0)");
    asm.ins("lw $t1, 4($sp)");
    asm.ins("addiu $t2, $a0, 16");
    asm.label("_in_string_copy");
    asm.ins("lb $t3, 0($t1)");
    asm.ins("sb $t3, 0($t2)");
    asm.ins("beqz $t3, _in_string_copy_done");
    asm.ins("addiu $t1, $t1, 1");
    asm.ins("addiu $t2, $t2, 1");
    asm.ins("j _in_string_copy");
    asm.label("_in_string_copy_done");
    asm.ins("lw $ra, 12($sp)");
    asm.ins("addiu $sp, $sp, 16");
    asm.ins("jr $ra");
    asm.blank();

    asm.label("_method_IO_in_int");
    asm.ins("addiu $sp, $sp, -8");
    asm.ins("sw $ra, 4($sp)");
    asm.ins("li $v0, 5");
    asm.ins("syscall");
    asm.ins("sw $v0, 0($sp)");
    asm.ins("la $a0, _protObj_Int");
    asm.ins("jal _Object_copy");
    asm.ins("lw $t0, 0($sp)");
    asm.ins("sw $t0, 12($a0)");
    asm.ins("lw $ra, 4($sp)");
    asm.ins("addiu $sp, $sp, 8");
    asm.ins("jr $ra");
    asm.blank();

    asm.label("_method_String_length");
    asm.ins("addiu $sp, $sp, -8");
    asm.ins("sw $ra, 4($sp)");
    asm.ins("lw $t0, 12($a0)");
    asm.ins("sw $t0, 0($sp)");
    asm.ins("la $a0, _protObj_Int");
    asm.ins("jal _Object_copy");
    asm.ins("lw $t0, 0($sp)");
    asm.ins("sw $t0, 12($a0)");
    asm.ins("lw $ra, 4($sp)");
    asm.ins("addiu $sp, $sp, 8");
    asm.ins("jr $ra");
    asm.blank();

    // self.concat(s): fresh String with both payloads.
    asm.label("_method_String_concat");
    asm.ins("lw $t1, 0($sp)");
    asm.ins("addiu $sp, $sp, -16");
    asm.ins("sw $ra, 12($sp)");
    asm.ins("sw $a0, 8($sp)");
    asm.ins("sw $t1, 4($sp)");
    asm.ins("lw $t2, 12($a0)");
    asm.ins("lw $t3, 12($t1)");
    asm.ins("addu $t2, $t2, $t3");
    asm.ins("sw $t2, 0($sp)");
    asm.ins("addiu $a0, $t2, 20");
    asm.ins("li $t3, -4");
    asm.ins("and $a0, $a0, $t3");
    asm.ins("move $t8, $a0");
    asm.ins("li $v0, 9");
    asm.ins("syscall");
    asm.ins("move $a0, $v0");
    asm.ins("li $t0, 4");
    asm.ins("sw $t0, 0($a0)");
    asm.ins("sw $t8, 4($a0)");
    asm.ins("la $t0, _dispTab_String");
    asm.ins("sw $t0, 8($a0)");
    asm.ins("lw $t0, 0($sp)");
    asm.ins("sw $t0, 12($a0)");
    asm.ins("addiu $t4, $a0, 16");
    asm.ins("lw $t1, 8($sp)");
    asm.ins("lw $t2, 12($t1)");
    asm.ins("addiu $t1, $t1, 16");
    asm.label("_concat_copy_self");
    asm.ins("blez $t2, _concat_self_done");
    asm.ins("lb $t5, 0($t1)");
    asm.ins("sb $t5, 0($t4)");
    asm.ins("addiu $t1, $t1, 1");
    asm.ins("addiu $t4, $t4, 1");
    asm.ins("addiu $t2, $t2, -1");
    asm.ins("j _concat_copy_self");
    asm.label("_concat_self_done");
    asm.ins("lw $t1, 4($sp)");
    asm.ins("lw $t2, 12($t1)");
    asm.ins("addiu $t1, $t1, 16");
    asm.label("_concat_copy_other");
    asm.ins("blez $t2, _concat_other_done");
    asm.ins("lb $t5, 0($t1)");
    asm.ins("sb $t5, 0($t4)");
    asm.ins("addiu $t1, $t1, 1");
    asm.ins("addiu $t4, $t4, 1");
    asm.ins("addiu $t2, $t2, -1");
    asm.ins("j _concat_copy_other");
    asm.label("_concat_other_done");
    asm.ins("sb $zero, 0($t4)");
    asm.ins("lw $ra, 12($sp)");
    asm.ins("addiu $sp, $sp, 16");
    asm.ins("jr $ra");
    asm.blank();

    // self.substr(i, l): out-of-range requests abort.
    asm.label("_method_String_substr");
    asm.ins("lw $t1, 0($sp)");
    asm.ins("lw $t2, 4($sp)");
    asm.ins("lw $t1, 12($t1)");
    asm.ins("lw $t2, 12($t2)");
    asm.ins("bltz $t1, _substr_abort");
    asm.ins("bltz $t2, _substr_abort");
    asm.ins("lw $t3, 12($a0)");
    asm.ins("addu $t4, $t1, $t2");
    asm.ins("slt $t5, $t3, $t4");
    asm.ins("bnez $t5, _substr_abort");
    asm.ins("addiu $sp, $sp, -16");
    asm.ins("sw $ra, 12($sp)");
    asm.ins("sw $a0, 8($sp)");
    asm.ins("sw $t1, 4($sp)");
    asm.ins("sw $t2, 0($sp)");
    asm.ins("addiu $a0, $t2, 20");
    asm.ins("li $t3, -4");
    asm.ins("and $a0, $a0, $t3");
    asm.ins("move $t8, $a0");
    asm.ins("li $v0, 9");
    asm.ins("syscall");
    asm.ins("move $a0, $v0");
    asm.ins("li $t0, 4");
    asm.ins("sw $t0, 0($a0)");
    asm.ins("sw $t8, 4($a0)");
    asm.ins("la $t0, _dispTab_String");
    asm.ins("sw $t0, 8($a0)");
    asm.ins("lw $t0, 0($sp)");
    asm.ins("sw $t0, 12($a0)");
    asm.ins("lw $t1, 8($sp)");
    asm.ins("addiu $t1, $t1, 16");
    asm.ins("lw $t2, 4($sp)");
    asm.ins("addu $t1, $t1, $t2");
    asm.ins("addiu $t4, $a0, 16");
    asm.ins("lw $t3, 0($sp)");
    asm.label("_substr_copy");
    asm.ins("blez $t3, _substr_copy_done");
    asm.ins("lb $t5, 0($t1)");
    asm.ins("sb $t5, 0($t4)");
    asm.ins("addiu $t1, $t1, 1");
    asm.ins("addiu $t4, $t4, 1");
    asm.ins("addiu $t3, $t3, -1");
    asm.ins("j _substr_copy");
    asm.label("_substr_copy_done");
    asm.ins("sb $zero, 0($t4)");
    asm.ins("lw $ra, 12($sp)");
    asm.ins("addiu $sp, $sp, 16");
    asm.ins("jr $ra");
    asm.blank();
}

/// The built-in classes have no attributes; their initialisers return
/// self untouched.
pub fn emit_builtin_inits(asm: &mut Asm) {
    asm.comment("Built-in class initialisers");
    for class in ["Object", "IO", "Int", "Bool", "String"] {
        asm.label(&format!("_init_{class}"));
        asm.ins("jr $ra");
    }
    asm.blank();
}
