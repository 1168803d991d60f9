// Copyright 2025 Diivanand Ramalingam
// Licensed under the Apache License, Version 2.0

//! The `.data` segment: class-name String objects, the class tables,
//! dispatch tables, prototype objects, interned constants, and the heap
//! pointer. Emission order is fixed so output is reproducible.

use std::collections::HashMap;

use cool_frontend::types::{ClassTable, TAG_BOOL, TAG_INT, TAG_STRING};
use cool_ir::tac::{Const, Instr, IrProgram, StrId};

use crate::abi;
use crate::emit::Asm;

/// Integer constants referenced by the program, in first-use order.
#[derive(Debug, Default)]
pub struct IntPool {
    values: Vec<i64>,
    index: HashMap<i64, usize>,
}

impl IntPool {
    pub fn label_of(&self, value: i64) -> String {
        abi::int_const_label(self.index[&value])
    }

    fn add(&mut self, value: i64) {
        if !self.index.contains_key(&value) {
            self.index.insert(value, self.values.len());
            self.values.push(value);
        }
    }
}

/// Scans the optimised IR for the integer constants the text segment will
/// reference. Must run before emission so labels exist up front.
pub fn collect_int_constants(ir: &IrProgram) -> IntPool {
    let mut pool = IntPool::default();
    for method in &ir.methods {
        for block in &method.blocks {
            for instr in &block.instrs {
                if let Instr::LoadConst {
                    konst: Const::Int(n),
                    ..
                } = instr
                {
                    pool.add(*n);
                }
            }
        }
    }
    pool
}

/// The label a string constant loads from; the empty string aliases the
/// always-present `_str_const_empty`.
pub fn str_label(ir: &IrProgram, id: StrId) -> String {
    if ir.strings.get(id).is_empty() {
        abi::STR_EMPTY.to_string()
    } else {
        abi::str_const_label(id.0 as usize)
    }
}

pub fn emit_data(asm: &mut Asm, table: &ClassTable, ir: &IrProgram, ints: &IntPool) {
    asm.raw(".data");
    asm.blank();

    asm.comment("Class name strings");
    for id in table.ids() {
        let name = table.name_of(id);
        emit_string_object(asm, &abi::class_name_label(name), name);
    }
    asm.label(abi::CLASS_NAME_TABLE);
    for id in table.ids() {
        asm.word(abi::class_name_label(table.name_of(id)));
    }
    asm.blank();

    asm.comment("Class parent tags (-1 for Object)");
    asm.label(abi::CLASS_PARENT_TABLE);
    for id in table.ids() {
        match table.parent(id) {
            Some(p) => asm.word(p),
            None => asm.word(-1),
        }
    }
    asm.blank();

    asm.comment("Prototype/init pairs indexed by class tag");
    asm.label(abi::CLASS_OBJ_TABLE);
    for id in table.ids() {
        let name = table.name_of(id);
        asm.word(abi::proto_label(name));
        asm.word(abi::init_label(name));
    }
    asm.blank();

    asm.comment("Dispatch tables");
    for id in table.ids() {
        asm.label(&abi::disptab_label(table.name_of(id)));
        for entry in table.dispatch_layout(id) {
            asm.word(abi::method_label(table.name_of(entry.defined_in), &entry.name));
        }
    }
    asm.blank();

    asm.comment("Prototype objects");
    for id in table.ids() {
        let name = table.name_of(id);
        asm.label(&abi::proto_label(name));
        asm.word(id);
        asm.word(abi::object_size(table, id));
        asm.word(abi::disptab_label(name));
        match id {
            TAG_INT | TAG_BOOL => asm.word(0),
            TAG_STRING => {
                asm.word(0);
                asm.ins(".asciiz \"\"");
                asm.ins(".align 2");
            }
            _ => {
                for slot in table.attr_layout(id) {
                    asm.ins(format!(".word 0  # {}", slot.name));
                }
            }
        }
    }
    asm.blank();

    asm.comment("String constants");
    emit_string_object(asm, abi::STR_EMPTY, "");
    for (id, value) in ir.strings.iter() {
        if value.is_empty() {
            continue;
        }
        emit_string_object(asm, &abi::str_const_label(id.0 as usize), value);
    }
    asm.blank();

    asm.comment("Boolean constants");
    for (label, value) in [(abi::BOOL_FALSE, 0), (abi::BOOL_TRUE, 1)] {
        asm.label(label);
        asm.word(TAG_BOOL);
        asm.word(abi::PRIM_OBJ_BYTES);
        asm.word(abi::disptab_label("Bool"));
        asm.word(value);
    }
    asm.blank();

    asm.comment("Integer constants");
    for (i, value) in ints.values.iter().enumerate() {
        asm.label(&abi::int_const_label(i));
        asm.word(TAG_INT);
        asm.word(abi::PRIM_OBJ_BYTES);
        asm.word(abi::disptab_label("Int"));
        asm.word(*value as i32);
    }
    asm.blank();

    asm.comment("Heap management");
    asm.label(abi::HEAP_START);
    asm.word(0);
    asm.blank();
}

/// A String object: tag, size, dispatch, raw length, inline bytes.
fn emit_string_object(asm: &mut Asm, label: &str, value: &str) {
    asm.label(label);
    asm.word(TAG_STRING);
    asm.word(abi::string_obj_size(value.len()));
    asm.word(abi::disptab_label("String"));
    asm.word(value.len());
    emit_string_payload(asm, value);
    asm.ins(".align 2");
}

/// `.asciiz` handles the common case; strings with characters SPIM's
/// assembler mangles fall back to raw bytes.
fn emit_string_payload(asm: &mut Asm, value: &str) {
    // SPIM's handling of escaped backslashes in .asciiz is unreliable, so
    // anything containing one goes out as raw bytes.
    let simple = value
        .bytes()
        .all(|b| ((b' '..=b'~').contains(&b) && b != b'\\') || b == b'\n' || b == b'\t');
    if simple {
        let escaped = value
            .replace('"', "\\\"")
            .replace('\n', "\\n")
            .replace('\t', "\\t");
        asm.ins(format!(".asciiz \"{escaped}\""));
    } else {
        let mut bytes: Vec<String> = value.bytes().map(|b| b.to_string()).collect();
        bytes.push("0".to_string());
        for chunk in bytes.chunks(16) {
            asm.ins(format!(".byte {}", chunk.join(", ")));
        }
    }
}
