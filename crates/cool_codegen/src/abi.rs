// Copyright 2025 Diivanand Ramalingam
// Licensed under the Apache License, Version 2.0

//! COOL object-model ABI shared between the code generator and the
//! emitted runtime.
//!
//! Objects are word-aligned with a three-word header (class tag, size in
//! bytes, dispatch-table pointer) followed by attribute slots. `Int` and
//! `Bool` carry their raw value in the first slot; `String` carries a raw
//! length word there, with NUL-terminated bytes inline after it.

use cool_frontend::types::{ClassId, ClassTable, TAG_BOOL, TAG_INT, TAG_STRING};

pub const WORD: usize = 4;
pub const OBJ_HEADER_BYTES: usize = 3 * WORD;

/// Offsets (in bytes) into every object.
pub const OFFSET_TAG: usize = 0;
pub const OFFSET_SIZE: usize = 4;
pub const OFFSET_DISPATCH: usize = 8;
pub const OFFSET_ATTR0: usize = 12;

/// Int/Bool raw payload and String raw length live in the first slot.
pub const OFFSET_PAYLOAD: usize = 12;
/// String bytes start after the length word.
pub const OFFSET_STR_BYTES: usize = 16;

/// Boxed Int and Bool are header + one payload word.
pub const PRIM_OBJ_BYTES: usize = OBJ_HEADER_BYTES + WORD;

pub const BOOL_FALSE: &str = "_bool_const_false";
pub const BOOL_TRUE: &str = "_bool_const_true";
pub const STR_EMPTY: &str = "_str_const_empty";
pub const HEAP_START: &str = "_heap_start";
pub const CLASS_NAME_TABLE: &str = "_class_name_table";
pub const CLASS_PARENT_TABLE: &str = "_class_parent_table";
pub const CLASS_OBJ_TABLE: &str = "_class_obj_table";

pub fn align4(n: usize) -> usize {
    (n + 3) & !3
}

pub fn proto_label(class: &str) -> String {
    format!("_protObj_{class}")
}

pub fn disptab_label(class: &str) -> String {
    format!("_dispTab_{class}")
}

pub fn init_label(class: &str) -> String {
    format!("_init_{class}")
}

pub fn method_label(class: &str, method: &str) -> String {
    format!("_method_{class}_{method}")
}

pub fn class_name_label(class: &str) -> String {
    format!("_class_name_{class}")
}

pub fn int_const_label(index: usize) -> String {
    format!("_int_const_{index}")
}

pub fn str_const_label(index: usize) -> String {
    format!("_str_const_{index}")
}

/// The size in bytes of a String object with `len` payload bytes,
/// including the NUL terminator and alignment padding.
pub fn string_obj_size(len: usize) -> usize {
    OBJ_HEADER_BYTES + WORD + align4(len + 1)
}

/// Prototype size in bytes for a class.
pub fn object_size(table: &ClassTable, id: ClassId) -> usize {
    match id {
        TAG_INT | TAG_BOOL => PRIM_OBJ_BYTES,
        TAG_STRING => string_obj_size(0),
        _ => OBJ_HEADER_BYTES + WORD * table.attr_layout(id).len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment_rounds_up_to_words() {
        assert_eq!(align4(0), 0);
        assert_eq!(align4(1), 4);
        assert_eq!(align4(4), 4);
        assert_eq!(align4(5), 8);
    }

    #[test]
    fn string_sizes_cover_nul_and_padding() {
        // 16-byte header, then "" needs one NUL byte padded to 4.
        assert_eq!(string_obj_size(0), 20);
        assert_eq!(string_obj_size(3), 20);
        assert_eq!(string_obj_size(4), 24);
    }
}
