// Copyright 2025 Diivanand Ramalingam
// Licensed under the Apache License, Version 2.0

//! The class hierarchy and type relations.
//!
//! Classes are stored in a dense table; the index of a class doubles as its
//! runtime class tag (Object=0, IO=1, Int=2, Bool=3, String=4, user classes
//! from 5 in declaration order). The table also precomputes the flattened
//! attribute layout and the dispatch-table layout every later stage works
//! from, so offsets and slots are decided in exactly one place.

use std::collections::HashMap;

/// Built-in class names in COOL.
pub const OBJECT: &str = "Object";
pub const IO: &str = "IO";
pub const INT: &str = "Int";
pub const BOOL: &str = "Bool";
pub const STRING: &str = "String";
pub const SELF_TYPE_NAME: &str = "SELF_TYPE";

/// Reserved class tags. A `ClassId` is the class tag.
pub type ClassId = usize;
pub const TAG_OBJECT: ClassId = 0;
pub const TAG_IO: ClassId = 1;
pub const TAG_INT: ClassId = 2;
pub const TAG_BOOL: ClassId = 3;
pub const TAG_STRING: ClassId = 4;

/// COOL has the special type SELF_TYPE which depends on the current class.
/// A type is either a concrete class name or SELF_TYPE.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CoolType {
    Named(String),
    SelfType,
}

impl CoolType {
    pub fn named<S: Into<String>>(s: S) -> Self {
        CoolType::Named(s.into())
    }

    pub fn from_name(name: &str) -> Self {
        if name == SELF_TYPE_NAME {
            CoolType::SelfType
        } else {
            CoolType::named(name)
        }
    }

    pub fn as_named(&self) -> Option<&str> {
        match self {
            CoolType::Named(s) => Some(s.as_str()),
            CoolType::SelfType => None,
        }
    }

    pub fn display_name(&self) -> &str {
        self.as_named().unwrap_or(SELF_TYPE_NAME)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodSig {
    pub name: String,
    pub formals: Vec<CoolType>,
    pub ret: CoolType,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttrDef {
    pub name: String,
    pub ty: CoolType,
}

#[derive(Clone, Debug)]
pub struct ClassInfo {
    pub name: String,
    /// `None` only for `Object` (and for classes whose parent could not be
    /// resolved; those are reparented to `Object` during checking).
    pub parent: Option<ClassId>,
    pub depth: u32,
    pub is_builtin: bool,
    /// Own features only; inherited ones are reached through the layouts.
    pub attrs: Vec<AttrDef>,
    pub methods: Vec<MethodSig>,
}

/// An attribute slot in the flattened object layout. Slot 0 is the first
/// word after the three-word object header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttrSlot {
    pub name: String,
    pub ty: CoolType,
    pub defined_in: ClassId,
    pub slot: usize,
}

/// A dispatch-table entry: inherited order first, own methods after,
/// overrides replaced in place.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchEntry {
    pub name: String,
    pub defined_in: ClassId,
    pub slot: usize,
}

#[derive(Clone, Debug, Default)]
pub struct ClassTable {
    classes: Vec<ClassInfo>,
    by_name: HashMap<String, ClassId>,
    attr_layouts: Vec<Vec<AttrSlot>>,
    dispatch_layouts: Vec<Vec<DispatchEntry>>,
}

impl ClassTable {
    /// A table preloaded with the five built-in classes and their method
    /// signatures, at the reserved tags.
    pub fn with_builtins() -> Self {
        let mut table = ClassTable::default();

        let named = CoolType::named;
        let object_methods = vec![
            MethodSig { name: "abort".into(), formals: vec![], ret: named(OBJECT) },
            MethodSig { name: "type_name".into(), formals: vec![], ret: named(STRING) },
            MethodSig { name: "copy".into(), formals: vec![], ret: CoolType::SelfType },
        ];
        let io_methods = vec![
            MethodSig { name: "out_string".into(), formals: vec![named(STRING)], ret: CoolType::SelfType },
            MethodSig { name: "out_int".into(), formals: vec![named(INT)], ret: CoolType::SelfType },
            MethodSig { name: "in_string".into(), formals: vec![], ret: named(STRING) },
            MethodSig { name: "in_int".into(), formals: vec![], ret: named(INT) },
        ];
        let string_methods = vec![
            MethodSig { name: "length".into(), formals: vec![], ret: named(INT) },
            MethodSig { name: "concat".into(), formals: vec![named(STRING)], ret: named(STRING) },
            MethodSig {
                name: "substr".into(),
                formals: vec![named(INT), named(INT)],
                ret: named(STRING),
            },
        ];

        table.insert(OBJECT, None, true, vec![], object_methods);
        table.insert(IO, Some(TAG_OBJECT), true, vec![], io_methods);
        table.insert(INT, Some(TAG_OBJECT), true, vec![], vec![]);
        table.insert(BOOL, Some(TAG_OBJECT), true, vec![], vec![]);
        table.insert(STRING, Some(TAG_OBJECT), true, vec![], string_methods);
        table
    }

    fn insert(
        &mut self,
        name: &str,
        parent: Option<ClassId>,
        is_builtin: bool,
        attrs: Vec<AttrDef>,
        methods: Vec<MethodSig>,
    ) -> ClassId {
        let id = self.classes.len();
        self.by_name.insert(name.to_string(), id);
        self.classes.push(ClassInfo {
            name: name.to_string(),
            parent,
            depth: 0,
            is_builtin,
            attrs,
            methods,
        });
        id
    }

    /// Registers a user class with an unresolved parent; hierarchy
    /// validation fills in parent links and depths afterwards.
    pub fn add_user_class(&mut self, name: &str) -> ClassId {
        self.insert(name, Some(TAG_OBJECT), false, vec![], vec![])
    }

    pub fn id_of(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(name).copied()
    }

    pub fn name_of(&self, id: ClassId) -> &str {
        &self.classes[id].name
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn info(&self, id: ClassId) -> &ClassInfo {
        &self.classes[id]
    }

    pub fn info_mut(&mut self, id: ClassId) -> &mut ClassInfo {
        &mut self.classes[id]
    }

    pub fn parent(&self, id: ClassId) -> Option<ClassId> {
        self.classes[id].parent
    }

    pub fn depth(&self, id: ClassId) -> u32 {
        self.classes[id].depth
    }

    /// Class ids in tag order.
    pub fn ids(&self) -> impl Iterator<Item = ClassId> {
        0..self.classes.len()
    }

    /// `id` and its ancestors up to `Object`, most specific first.
    pub fn ancestors(&self, id: ClassId) -> Vec<ClassId> {
        let mut chain = vec![id];
        let mut cur = id;
        while let Some(p) = self.classes[cur].parent {
            chain.push(p);
            cur = p;
        }
        chain
    }

    /// Recomputes depths once parent links are final.
    pub fn compute_depths(&mut self) {
        for id in 0..self.classes.len() {
            self.classes[id].depth = (self.ancestors(id).len() - 1) as u32;
        }
    }

    fn is_subclass(&self, mut a: ClassId, b: ClassId) -> bool {
        loop {
            if a == b {
                return true;
            }
            match self.classes[a].parent {
                Some(p) => a = p,
                None => return false,
            }
        }
    }

    fn resolve(&self, ty: &CoolType, ctx: ClassId) -> Option<ClassId> {
        match ty {
            CoolType::SelfType => Some(ctx),
            CoolType::Named(n) => self.id_of(n),
        }
    }

    /// Resolves SELF_TYPE against the context class and returns the name.
    pub fn resolve_self_type(&self, ty: &CoolType, ctx: ClassId) -> CoolType {
        match ty {
            CoolType::SelfType => CoolType::named(self.name_of(ctx)),
            CoolType::Named(_) => ty.clone(),
        }
    }

    /// Conformance (`≤`) in context class `ctx`. SELF_TYPE conforms only to
    /// itself on the right; on the left it behaves as the context class.
    pub fn conforms(&self, a: &CoolType, b: &CoolType, ctx: ClassId) -> bool {
        match (a, b) {
            (CoolType::SelfType, CoolType::SelfType) => true,
            (_, CoolType::SelfType) => false,
            (a, b) => {
                let (Some(a), Some(b)) = (self.resolve(a, ctx), self.resolve(b, ctx)) else {
                    // Unknown class names were already reported; do not
                    // cascade.
                    return true;
                };
                self.is_subclass(a, b)
            }
        }
    }

    /// Least upper bound: SELF_TYPE resolves to the context class before
    /// walking to the nearest common ancestor.
    pub fn lub(&self, a: &CoolType, b: &CoolType, ctx: ClassId) -> CoolType {
        let (Some(mut a), Some(mut b)) = (self.resolve(a, ctx), self.resolve(b, ctx)) else {
            return CoolType::named(OBJECT);
        };
        while self.classes[a].depth > self.classes[b].depth {
            a = self.classes[a].parent.unwrap_or(TAG_OBJECT);
        }
        while self.classes[b].depth > self.classes[a].depth {
            b = self.classes[b].parent.unwrap_or(TAG_OBJECT);
        }
        while a != b {
            a = self.classes[a].parent.unwrap_or(TAG_OBJECT);
            b = self.classes[b].parent.unwrap_or(TAG_OBJECT);
        }
        CoolType::named(self.name_of(a))
    }

    /// Resolves a method by walking the ancestor chain, most specific
    /// first. Returns the signature and the class that defines it.
    pub fn lookup_method(&self, class: ClassId, name: &str) -> Option<(&MethodSig, ClassId)> {
        for id in self.ancestors(class) {
            if let Some(sig) = self.classes[id].methods.iter().find(|m| m.name == name) {
                return Some((sig, id));
            }
        }
        None
    }

    /// Like `lookup_method` but starting at the parent, for override checks.
    pub fn lookup_inherited_method(
        &self,
        class: ClassId,
        name: &str,
    ) -> Option<(&MethodSig, ClassId)> {
        self.lookup_method(self.parent(class)?, name)
    }

    /// Finds an attribute anywhere on the ancestor chain.
    pub fn lookup_attr(&self, class: ClassId, name: &str) -> Option<&AttrDef> {
        self.ancestors(class)
            .into_iter()
            .find_map(|id| self.classes[id].attrs.iter().find(|a| a.name == name))
    }

    /// Precomputes attribute and dispatch layouts for every class. Must be
    /// called after feature tables are installed and cycles are broken.
    pub fn finalize_layouts(&mut self) {
        let n = self.classes.len();
        let mut attr_layouts: Vec<Option<Vec<AttrSlot>>> = vec![None; n];
        let mut dispatch_layouts: Vec<Option<Vec<DispatchEntry>>> = vec![None; n];

        for id in 0..n {
            self.build_layout(id, &mut attr_layouts, &mut dispatch_layouts);
        }

        self.attr_layouts = attr_layouts.into_iter().map(Option::unwrap).collect();
        self.dispatch_layouts = dispatch_layouts.into_iter().map(Option::unwrap).collect();
    }

    fn build_layout(
        &self,
        id: ClassId,
        attrs: &mut Vec<Option<Vec<AttrSlot>>>,
        dispatch: &mut Vec<Option<Vec<DispatchEntry>>>,
    ) {
        if attrs[id].is_some() {
            return;
        }

        let (mut attr_layout, mut disp_layout) = match self.classes[id].parent {
            Some(p) => {
                self.build_layout(p, attrs, dispatch);
                (attrs[p].clone().unwrap(), dispatch[p].clone().unwrap())
            }
            None => (Vec::new(), Vec::new()),
        };

        for a in &self.classes[id].attrs {
            attr_layout.push(AttrSlot {
                name: a.name.clone(),
                ty: a.ty.clone(),
                defined_in: id,
                slot: attr_layout.len(),
            });
        }
        for m in &self.classes[id].methods {
            match disp_layout.iter_mut().find(|e| e.name == m.name) {
                Some(entry) => entry.defined_in = id,
                None => {
                    let slot = disp_layout.len();
                    disp_layout.push(DispatchEntry {
                        name: m.name.clone(),
                        defined_in: id,
                        slot,
                    });
                }
            }
        }

        attrs[id] = Some(attr_layout);
        dispatch[id] = Some(disp_layout);
    }

    /// Flattened attribute slots, parents first.
    pub fn attr_layout(&self, id: ClassId) -> &[AttrSlot] {
        &self.attr_layouts[id]
    }

    /// Dispatch table layout, inherited order with overrides in place.
    pub fn dispatch_layout(&self, id: ClassId) -> &[DispatchEntry] {
        &self.dispatch_layouts[id]
    }

    pub fn dispatch_slot(&self, id: ClassId, method: &str) -> Option<usize> {
        self.dispatch_layouts[id]
            .iter()
            .find(|e| e.name == method)
            .map(|e| e.slot)
    }

    pub fn attr_slot(&self, id: ClassId, attr: &str) -> Option<&AttrSlot> {
        self.attr_layouts[id].iter().find(|a| a.name == attr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with(user: &[(&str, &str)]) -> ClassTable {
        let mut t = ClassTable::with_builtins();
        for (name, _) in user {
            t.add_user_class(name);
        }
        for (name, parent) in user {
            let id = t.id_of(name).unwrap();
            let pid = t.id_of(parent).unwrap();
            t.info_mut(id).parent = Some(pid);
        }
        t.compute_depths();
        t
    }

    #[test]
    fn builtins_get_the_reserved_tags() {
        let t = ClassTable::with_builtins();
        assert_eq!(t.id_of("Object"), Some(TAG_OBJECT));
        assert_eq!(t.id_of("IO"), Some(TAG_IO));
        assert_eq!(t.id_of("Int"), Some(TAG_INT));
        assert_eq!(t.id_of("Bool"), Some(TAG_BOOL));
        assert_eq!(t.id_of("String"), Some(TAG_STRING));
    }

    #[test]
    fn user_classes_tag_from_five() {
        let t = table_with(&[("A", "Object"), ("B", "A")]);
        assert_eq!(t.id_of("A"), Some(5));
        assert_eq!(t.id_of("B"), Some(6));
    }

    #[test]
    fn conformance_and_lub() {
        let t = table_with(&[("A", "Object"), ("B", "A"), ("C", "A")]);
        let a = CoolType::named("A");
        let b = CoolType::named("B");
        let c = CoolType::named("C");
        let ctx = t.id_of("A").unwrap();

        assert!(t.conforms(&b, &a, ctx));
        assert!(!t.conforms(&a, &b, ctx));
        assert_eq!(t.lub(&b, &c, ctx), a);
        assert_eq!(t.lub(&b, &CoolType::named("String"), ctx), CoolType::named(OBJECT));
    }

    #[test]
    fn self_type_conforms_via_the_context_class() {
        let t = table_with(&[("A", "Object"), ("B", "A")]);
        let ctx = t.id_of("B").unwrap();
        assert!(t.conforms(&CoolType::SelfType, &CoolType::named("A"), ctx));
        assert!(t.conforms(&CoolType::SelfType, &CoolType::SelfType, ctx));
        assert!(!t.conforms(&CoolType::named("B"), &CoolType::SelfType, ctx));
    }

    #[test]
    fn dispatch_layout_extends_the_parent_prefix() {
        let mut t = table_with(&[("A", "IO"), ("B", "A")]);
        let a = t.id_of("A").unwrap();
        let b = t.id_of("B").unwrap();
        t.info_mut(a).methods.push(MethodSig {
            name: "m".into(),
            formals: vec![],
            ret: CoolType::named(OBJECT),
        });
        // B overrides m and adds n.
        t.info_mut(b).methods.push(MethodSig {
            name: "m".into(),
            formals: vec![],
            ret: CoolType::named(OBJECT),
        });
        t.info_mut(b).methods.push(MethodSig {
            name: "n".into(),
            formals: vec![],
            ret: CoolType::named(OBJECT),
        });
        t.finalize_layouts();

        let pa = t.dispatch_layout(a);
        let pb = t.dispatch_layout(b);
        assert_eq!(pb.len(), pa.len() + 1);
        for (ea, eb) in pa.iter().zip(pb.iter()) {
            assert_eq!(ea.name, eb.name);
            assert_eq!(ea.slot, eb.slot);
        }
        // The override is replaced in place; slots keep the parent order.
        let m = pb.iter().find(|e| e.name == "m").unwrap();
        assert_eq!(m.defined_in, b);
        assert_eq!(m.slot, pa.iter().find(|e| e.name == "m").unwrap().slot);
        // Inherited IO methods come before both.
        assert_eq!(pb[0].name, "abort");
        assert!(t.dispatch_slot(b, "out_string").unwrap() < m.slot);
    }

    #[test]
    fn attribute_offsets_are_stable_in_subclasses() {
        let mut t = table_with(&[("P", "Object"), ("Q", "P")]);
        let p = t.id_of("P").unwrap();
        let q = t.id_of("Q").unwrap();
        t.info_mut(p).attrs.push(AttrDef {
            name: "x".into(),
            ty: CoolType::named(INT),
        });
        t.info_mut(q).attrs.push(AttrDef {
            name: "y".into(),
            ty: CoolType::named(INT),
        });
        t.finalize_layouts();

        assert_eq!(t.attr_slot(p, "x").unwrap().slot, 0);
        assert_eq!(t.attr_slot(q, "x").unwrap().slot, 0);
        assert_eq!(t.attr_slot(q, "y").unwrap().slot, 1);
    }
}
