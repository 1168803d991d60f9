// Copyright 2025 Diivanand Ramalingam
// Licensed under the Apache License, Version 2.0

//! TAC to MIPS32 translation.
//!
//! Each method is a stack machine with `$a0` as the accumulator. The frame
//! is built once in the prologue: a 12-byte header (`$fp`, `$ra`, self)
//! followed by one word per virtual temporary at negative offsets from
//! `$fp`. Caller-pushed arguments sit above the header, so argument i is
//! at `12 + 4*i($fp)`.

use std::fmt::Display;

use cool_frontend::types::ClassTable;
use cool_ir::tac::{
    Const, Instr, IrMethod, IrProgram, Label, MethodKind, Operand, PrimClass, Term,
};

use crate::abi;
use crate::data::{self, IntPool};

/// Line-oriented assembly writer.
#[derive(Default)]
pub struct Asm {
    out: String,
}

impl Asm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raw(&mut self, line: &str) {
        self.out.push_str(line);
        self.out.push('\n');
    }

    pub fn label(&mut self, label: &str) {
        self.out.push_str(label);
        self.out.push_str(":\n");
    }

    pub fn ins(&mut self, line: impl AsRef<str>) {
        self.out.push_str("    ");
        self.out.push_str(line.as_ref());
        self.out.push('\n');
    }

    pub fn word(&mut self, value: impl Display) {
        self.ins(format!(".word {value}"));
    }

    pub fn comment(&mut self, text: &str) {
        self.raw(&format!("# {text}"));
    }

    pub fn blank(&mut self) {
        self.out.push('\n');
    }

    pub fn finish(self) -> String {
        self.out
    }
}

pub fn emit_methods(asm: &mut Asm, ir: &IrProgram, table: &ClassTable, ints: &IntPool) {
    asm.comment("Class initialisers and methods");
    for method in &ir.methods {
        MethodEmitter {
            asm: &mut *asm,
            table,
            ir,
            ints,
            method,
            mlabel: match method.kind {
                MethodKind::Init => abi::init_label(&method.class_name),
                MethodKind::Method => abi::method_label(&method.class_name, &method.name),
            },
            aux: 0,
        }
        .emit();
    }
}

struct MethodEmitter<'a> {
    asm: &'a mut Asm,
    table: &'a ClassTable,
    ir: &'a IrProgram,
    ints: &'a IntPool,
    method: &'a IrMethod,
    mlabel: String,
    aux: u32,
}

impl MethodEmitter<'_> {
    fn emit(mut self) {
        self.asm.label(&self.mlabel.clone());
        self.prologue();
        let method = self.method;
        for block in &method.blocks {
            self.asm.label(&self.block_label(block.label));
            for instr in &block.instrs {
                self.instr(instr);
            }
            self.term(&block.term);
        }
        self.asm.blank();
    }

    fn block_label(&self, l: Label) -> String {
        format!("{}_L{}", self.mlabel, l.0)
    }

    fn aux_label(&mut self) -> String {
        self.aux += 1;
        format!("{}_x{}", self.mlabel, self.aux)
    }

    fn temp_off(&self, t: cool_ir::tac::Temp) -> i32 {
        -4 * (t.0 as i32 + 1)
    }

    fn prologue(&mut self) {
        self.asm.ins("addiu $sp, $sp, -12");
        self.asm.ins("sw $fp, 8($sp)");
        self.asm.ins("sw $ra, 4($sp)");
        self.asm.ins("sw $a0, 0($sp)");
        self.asm.ins("move $fp, $sp");
        if self.method.n_temps > 0 {
            self.asm
                .ins(format!("addiu $sp, $sp, -{}", 4 * self.method.n_temps));
        }

        if self.method.kind == MethodKind::Init {
            if let Some(parent) = self.table.parent(self.method.class) {
                let parent_init = abi::init_label(self.table.name_of(parent));
                self.asm.ins(format!("jal {parent_init}"));
                self.asm.ins("lw $a0, 0($fp)");
            }
        }

        // Caller-pushed arguments move into their temp slots.
        for i in 0..self.method.arity {
            self.asm.ins(format!("lw $t0, {}($fp)", 12 + 4 * i));
            self.asm.ins(format!(
                "sw $t0, {}($fp)",
                self.temp_off(cool_ir::tac::Temp(i as u32))
            ));
        }
    }

    fn epilogue(&mut self) {
        self.asm.ins("move $sp, $fp");
        self.asm.ins("lw $ra, 4($sp)");
        self.asm.ins("lw $fp, 8($sp)");
        self.asm.ins("addiu $sp, $sp, 12");
        self.asm.ins("jr $ra");
    }

    /// Loads an operand into a register.
    fn load(&mut self, reg: &str, op: Operand) {
        match op {
            Operand::Temp(t) => self.asm.ins(format!("lw {reg}, {}($fp)", self.temp_off(t))),
            Operand::Int(n) => self.asm.ins(format!("li {reg}, {}", n as i32)),
            Operand::Bool(b) => self.asm.ins(format!("li {reg}, {}", b as i32)),
            Operand::SelfObj => self.asm.ins(format!("lw {reg}, 0($fp)")),
            Operand::Void => self.asm.ins(format!("li {reg}, 0")),
        }
    }

    fn store(&mut self, reg: &str, dst: cool_ir::tac::Temp) {
        self.asm
            .ins(format!("sw {reg}, {}($fp)", self.temp_off(dst)));
    }

    fn instr(&mut self, instr: &Instr) {
        match instr {
            Instr::Copy { dst, src } => {
                self.load("$t0", *src);
                self.store("$t0", *dst);
            }

            Instr::LoadConst { dst, konst } => {
                let label = match konst {
                    Const::Int(n) => self.ints.label_of(*n),
                    Const::Bool(false) => abi::BOOL_FALSE.to_string(),
                    Const::Bool(true) => abi::BOOL_TRUE.to_string(),
                    Const::Str(id) => data::str_label(self.ir, *id),
                };
                self.asm.ins(format!("la $t0, {label}"));
                self.store("$t0", *dst);
            }

            Instr::Unbox { dst, src } => {
                self.load("$t0", *src);
                self.asm.ins(format!("lw $t0, {}($t0)", abi::OFFSET_PAYLOAD));
                self.store("$t0", *dst);
            }

            Instr::Box { dst, class, src } => match class {
                PrimClass::Int => {
                    self.load("$t0", *src);
                    self.asm.ins("addiu $sp, $sp, -4");
                    self.asm.ins("sw $t0, 0($sp)");
                    self.asm.ins("la $a0, _protObj_Int");
                    self.asm.ins("jal _Object_copy");
                    self.asm.ins("lw $t0, 0($sp)");
                    self.asm.ins("addiu $sp, $sp, 4");
                    self.asm.ins(format!("sw $t0, {}($a0)", abi::OFFSET_PAYLOAD));
                    self.store("$a0", *dst);
                }
                PrimClass::Bool => {
                    // Bools are shared constants, not allocations.
                    let done = self.aux_label();
                    self.load("$t0", *src);
                    self.asm.ins(format!("la $a0, {}", abi::BOOL_TRUE));
                    self.asm.ins(format!("bnez $t0, {done}"));
                    self.asm.ins(format!("la $a0, {}", abi::BOOL_FALSE));
                    self.asm.label(&done);
                    self.store("$a0", *dst);
                }
            },

            Instr::Bin { dst, op, lhs, rhs } => {
                use cool_ir::tac::BinOp;
                self.load("$t1", *lhs);
                self.load("$t2", *rhs);
                match op {
                    BinOp::Add => self.asm.ins("addu $t0, $t1, $t2"),
                    BinOp::Sub => self.asm.ins("subu $t0, $t1, $t2"),
                    BinOp::Mul => self.asm.ins("mul $t0, $t1, $t2"),
                    BinOp::Div => {
                        self.asm.ins("div $t1, $t2");
                        self.asm.ins("mflo $t0");
                    }
                    BinOp::Lt => self.asm.ins("slt $t0, $t1, $t2"),
                    BinOp::Le => {
                        self.asm.ins("slt $t0, $t2, $t1");
                        self.asm.ins("xori $t0, $t0, 1");
                    }
                    BinOp::Eq => {
                        self.asm.ins("xor $t0, $t1, $t2");
                        self.asm.ins("sltiu $t0, $t0, 1");
                    }
                }
                self.store("$t0", *dst);
            }

            Instr::Un { dst, op, src } => {
                self.load("$t0", *src);
                match op {
                    cool_ir::tac::UnOp::Neg => self.asm.ins("neg $t0, $t0"),
                    cool_ir::tac::UnOp::Not => self.asm.ins("xori $t0, $t0, 1"),
                }
                self.store("$t0", *dst);
            }

            Instr::GetAttr { dst, slot } => {
                self.asm.ins("lw $t0, 0($fp)");
                self.asm
                    .ins(format!("lw $t0, {}($t0)", abi::OFFSET_ATTR0 + 4 * slot));
                self.store("$t0", *dst);
            }

            Instr::SetAttr { slot, src } => {
                self.load("$t0", *src);
                self.asm.ins("lw $t1, 0($fp)");
                self.asm
                    .ins(format!("sw $t0, {}($t1)", abi::OFFSET_ATTR0 + 4 * slot));
            }

            Instr::New { dst, target } => match target {
                cool_ir::tac::NewTarget::Class(id) => {
                    let name = self.table.name_of(*id);
                    self.asm.ins(format!("la $a0, {}", abi::proto_label(name)));
                    self.asm.ins("jal _Object_copy");
                    self.asm.ins(format!("jal {}", abi::init_label(name)));
                    self.store("$a0", *dst);
                }
                cool_ir::tac::NewTarget::SelfType => {
                    self.asm.ins("lw $t0, 0($fp)");
                    self.asm.ins("lw $t0, 0($t0)");
                    self.asm.ins("sll $t0, $t0, 3");
                    self.asm.ins(format!("la $t1, {}", abi::CLASS_OBJ_TABLE));
                    self.asm.ins("addu $t1, $t1, $t0");
                    self.asm.ins("addiu $sp, $sp, -4");
                    self.asm.ins("sw $t1, 0($sp)");
                    self.asm.ins("lw $a0, 0($t1)");
                    self.asm.ins("jal _Object_copy");
                    self.asm.ins("lw $t1, 0($sp)");
                    self.asm.ins("addiu $sp, $sp, 4");
                    self.asm.ins("lw $t1, 4($t1)");
                    self.asm.ins("jalr $t1");
                    self.store("$a0", *dst);
                }
            },

            Instr::IsVoid { dst, src } => {
                self.load("$t0", *src);
                self.asm.ins("sltiu $t0, $t0, 1");
                self.store("$t0", *dst);
            }

            Instr::VoidCheck { src } => {
                self.load("$t0", *src);
                self.asm.ins("beqz $t0, _dispatch_void");
            }

            Instr::EqTest { dst, lhs, rhs } => {
                self.load("$t0", *lhs);
                self.load("$t1", *rhs);
                self.asm.ins("move $a0, $t0");
                self.asm.ins("move $a1, $t1");
                self.asm.ins("jal _equality_test");
                self.store("$a0", *dst);
            }

            Instr::Call {
                dst,
                recv,
                args,
                target,
            } => {
                for arg in args.iter().rev() {
                    self.load("$t0", *arg);
                    self.asm.ins("addiu $sp, $sp, -4");
                    self.asm.ins("sw $t0, 0($sp)");
                }
                self.load("$a0", *recv);
                match target.static_class {
                    Some(class) => {
                        let tab = abi::disptab_label(self.table.name_of(class));
                        self.asm.ins(format!("la $t1, {tab}"));
                    }
                    None => self.asm.ins(format!("lw $t1, {}($a0)", abi::OFFSET_DISPATCH)),
                }
                self.asm.ins(format!("lw $t1, {}($t1)", 4 * target.slot));
                self.asm.ins("jalr $t1");
                if !args.is_empty() {
                    self.asm.ins(format!("addiu $sp, $sp, {}", 4 * args.len()));
                }
                self.store("$a0", *dst);
            }
        }
    }

    fn term(&mut self, term: &Term) {
        match term {
            Term::Jump(l) => {
                let label = self.block_label(*l);
                self.asm.ins(format!("j {label}"));
            }

            Term::Branch { cond, then_, else_ } => {
                let then_label = self.block_label(*then_);
                let else_label = self.block_label(*else_);
                self.load("$t0", *cond);
                self.asm.ins(format!("beqz $t0, {else_label}"));
                self.asm.ins(format!("j {then_label}"));
            }

            Term::Ret(op) => {
                self.load("$a0", *op);
                self.epilogue();
            }

            Term::Match { scrutinee, arms } => {
                // Branches ordered by decreasing depth pick the most
                // specific match as the tag walk climbs the hierarchy.
                let mut ordered = arms.clone();
                ordered.sort_by(|a, b| {
                    self.table
                        .depth(b.0)
                        .cmp(&self.table.depth(a.0))
                        .then(a.0.cmp(&b.0))
                });

                let loop_label = self.aux_label();
                self.load("$t0", *scrutinee);
                self.asm.ins("beqz $t0, _case_void");
                self.asm.ins("lw $t1, 0($t0)");
                self.asm.label(&loop_label);
                for (tag, target) in &ordered {
                    let target_label = self.block_label(*target);
                    self.asm.ins(format!("li $t2, {tag}"));
                    self.asm.ins(format!("beq $t1, $t2, {target_label}"));
                }
                self.asm
                    .ins(format!("la $t2, {}", abi::CLASS_PARENT_TABLE));
                self.asm.ins("sll $t3, $t1, 2");
                self.asm.ins("addu $t2, $t2, $t3");
                self.asm.ins("lw $t1, 0($t2)");
                self.asm.ins("bltz $t1, _case_abort");
                self.asm.ins(format!("j {loop_label}"));
            }
        }
    }
}
