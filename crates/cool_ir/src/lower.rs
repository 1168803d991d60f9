// Copyright 2025 Diivanand Ramalingam
// Licensed under the Apache License, Version 2.0

//! Lowering from the typed AST to three-address code.
//!
//! Each method body becomes a list of basic blocks. Control forms turn
//! into branching terminators, arithmetic into unbox/compute/box triples,
//! dispatch into an explicit void check followed by a call through a
//! dispatch-table slot, and `case` into a `Match` terminator whose arms are
//! resolved against runtime class tags at emission.

use std::collections::HashMap;

use cool_frontend::ast::{BinOp, CaseArm, Expr, ExprKind, Feature, Program};
use cool_frontend::diag::Diagnostic;
use cool_frontend::types::{ClassId, ClassTable, CoolType, BOOL, INT, STRING, TAG_OBJECT};

use crate::tac::{
    Block, CallTarget, Const, Instr, IrMethod, IrProgram, Label, MethodKind, NewTarget, Operand,
    PrimClass, StrInterner, Temp, Term, UnOp,
};

/// Lowers a type-checked program. The only diagnostics produced here are
/// integer literals outside the 32-bit range, which the lexer let through.
pub fn lower(p: &Program, table: &ClassTable) -> Result<IrProgram, Vec<Diagnostic>> {
    let mut strings = StrInterner::new();
    let mut methods = Vec::new();
    let mut errors = Vec::new();

    for class in &p.classes {
        let Some(class_id) = table.id_of(class.name.as_str()) else {
            continue;
        };

        methods.push(lower_init(class, class_id, table, &mut strings, &mut errors));

        for feat in &class.features {
            if let Feature::Method {
                name,
                formals,
                body,
                ..
            } = feat
            {
                let mut b = FuncBuilder::new(table, class_id, &mut strings, &mut errors);
                for f in formals {
                    let t = b.new_temp();
                    b.bind(f.name.as_str(), t);
                }
                let result = b.lower_expr(body);
                b.terminate(Term::Ret(result));
                methods.push(b.finish(
                    name.as_str(),
                    MethodKind::Method,
                    formals.len(),
                    class.name.as_str(),
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(IrProgram { methods, strings })
    } else {
        Err(errors)
    }
}

/// The `_init_<C>` body: parent init is implicit in codegen; here we store
/// primitive defaults and then every declared initialiser, in declaration
/// order.
fn lower_init(
    class: &cool_frontend::ast::Class,
    class_id: ClassId,
    table: &ClassTable,
    strings: &mut StrInterner,
    errors: &mut Vec<Diagnostic>,
) -> IrMethod {
    let mut b = FuncBuilder::new(table, class_id, strings, errors);

    for feat in &class.features {
        let Feature::Attr { name, ty, init, .. } = feat else {
            continue;
        };
        let Some(slot) = table.attr_slot(class_id, name.as_str()).map(|s| s.slot) else {
            continue;
        };
        match init {
            Some(init) => {
                let v = b.lower_expr(init);
                b.emit(Instr::SetAttr { slot, src: v });
            }
            None => {
                // Primitive attributes default to 0 / false / "". Other
                // classes stay void, which the prototype already holds.
                if let Some(konst) = b.default_const(ty.as_str()) {
                    let t = b.new_temp();
                    b.emit(Instr::LoadConst { dst: t, konst });
                    b.emit(Instr::SetAttr {
                        slot,
                        src: Operand::Temp(t),
                    });
                }
            }
        }
    }

    b.terminate(Term::Ret(Operand::SelfObj));
    b.finish("init", MethodKind::Init, 0, class.name.as_str())
}

struct FuncBuilder<'a> {
    table: &'a ClassTable,
    class: ClassId,
    strings: &'a mut StrInterner,
    errors: &'a mut Vec<Diagnostic>,
    scopes: Vec<HashMap<String, Temp>>,
    next_temp: u32,
    blocks: Vec<(Label, Vec<Instr>, Option<Term>)>,
    cur: usize,
}

impl<'a> FuncBuilder<'a> {
    fn new(
        table: &'a ClassTable,
        class: ClassId,
        strings: &'a mut StrInterner,
        errors: &'a mut Vec<Diagnostic>,
    ) -> Self {
        Self {
            table,
            class,
            strings,
            errors,
            scopes: vec![HashMap::new()],
            next_temp: 0,
            blocks: vec![(Label(0), Vec::new(), None)],
            cur: 0,
        }
    }

    fn finish(self, name: &str, kind: MethodKind, arity: usize, class_name: &str) -> IrMethod {
        let blocks = self
            .blocks
            .into_iter()
            .map(|(label, instrs, term)| Block {
                label,
                instrs,
                // Unterminated blocks are unreachable join points; give
                // them a harmless return.
                term: term.unwrap_or(Term::Ret(Operand::Void)),
            })
            .collect();
        IrMethod {
            class: self.class,
            class_name: class_name.to_string(),
            name: name.to_string(),
            kind,
            arity,
            n_temps: self.next_temp,
            blocks,
        }
    }

    fn new_temp(&mut self) -> Temp {
        let t = Temp(self.next_temp);
        self.next_temp += 1;
        t
    }

    fn new_block(&mut self) -> Label {
        let label = Label(self.blocks.len() as u32);
        self.blocks.push((label, Vec::new(), None));
        label
    }

    fn switch_to(&mut self, label: Label) {
        self.cur = label.0 as usize;
    }

    fn emit(&mut self, instr: Instr) {
        self.blocks[self.cur].1.push(instr);
    }

    fn terminate(&mut self, term: Term) {
        let slot = &mut self.blocks[self.cur].2;
        if slot.is_none() {
            *slot = Some(term);
        }
    }

    fn bind(&mut self, name: &str, t: Temp) {
        self.scopes
            .last_mut()
            .unwrap()
            .insert(name.to_string(), t);
    }

    fn lookup(&self, name: &str) -> Option<Temp> {
        self.scopes.iter().rev().find_map(|s| s.get(name).copied())
    }

    fn default_const(&mut self, ty: &str) -> Option<Const> {
        match ty {
            INT => Some(Const::Int(0)),
            BOOL => Some(Const::Bool(false)),
            STRING => Some(Const::Str(self.strings.intern(""))),
            _ => None,
        }
    }

    /// The class whose dispatch table a method is looked up in, given the
    /// receiver's static type.
    fn static_class_of(&self, e: &Expr) -> ClassId {
        match e.static_ty() {
            CoolType::SelfType => self.class,
            CoolType::Named(n) => self.table.id_of(n).unwrap_or(TAG_OBJECT),
        }
    }

    fn is_prim(&self, e: &Expr, name: &str) -> bool {
        self.table
            .resolve_self_type(e.static_ty(), self.class)
            .as_named()
            == Some(name)
    }

    fn lower_expr(&mut self, e: &Expr) -> Operand {
        match &e.kind {
            ExprKind::Int(n) => {
                if *n > i32::MAX as i64 {
                    self.errors.push(Diagnostic::new(
                        "C001",
                        format!("integer literal {n} does not fit in 32 bits"),
                        e.span,
                    ));
                }
                let t = self.new_temp();
                self.emit(Instr::LoadConst {
                    dst: t,
                    konst: Const::Int(*n),
                });
                Operand::Temp(t)
            }

            ExprKind::Str(s) => {
                let id = self.strings.intern(s);
                let t = self.new_temp();
                self.emit(Instr::LoadConst {
                    dst: t,
                    konst: Const::Str(id),
                });
                Operand::Temp(t)
            }

            ExprKind::Bool(v) => {
                let t = self.new_temp();
                self.emit(Instr::LoadConst {
                    dst: t,
                    konst: Const::Bool(*v),
                });
                Operand::Temp(t)
            }

            ExprKind::Self_ => Operand::SelfObj,

            ExprKind::Id(name) => match self.lookup(name.as_str()) {
                Some(t) => Operand::Temp(t),
                None => {
                    // Not a local, so it is an attribute of self.
                    let slot = self
                        .table
                        .attr_slot(self.class, name.as_str())
                        .map(|s| s.slot)
                        .unwrap_or(0);
                    let t = self.new_temp();
                    self.emit(Instr::GetAttr { dst: t, slot });
                    Operand::Temp(t)
                }
            },

            ExprKind::Assign { name, expr } => {
                let v = self.lower_expr(expr);
                match self.lookup(name.as_str()) {
                    Some(local) => self.emit(Instr::Copy { dst: local, src: v }),
                    None => {
                        let slot = self
                            .table
                            .attr_slot(self.class, name.as_str())
                            .map(|s| s.slot)
                            .unwrap_or(0);
                        self.emit(Instr::SetAttr { slot, src: v });
                    }
                }
                v
            }

            ExprKind::Bin { op, lhs, rhs } => self.lower_bin(*op, lhs, rhs),

            ExprKind::Neg(inner) => {
                let v = self.lower_expr(inner);
                let raw = self.unbox(v);
                let neg = self.new_temp();
                self.emit(Instr::Un {
                    dst: neg,
                    op: UnOp::Neg,
                    src: raw,
                });
                self.boxed(PrimClass::Int, Operand::Temp(neg))
            }

            ExprKind::Not(inner) => {
                let v = self.lower_expr(inner);
                let raw = self.unbox(v);
                let not = self.new_temp();
                self.emit(Instr::Un {
                    dst: not,
                    op: UnOp::Not,
                    src: raw,
                });
                self.boxed(PrimClass::Bool, Operand::Temp(not))
            }

            ExprKind::IsVoid(inner) => {
                let v = self.lower_expr(inner);
                let raw = self.new_temp();
                self.emit(Instr::IsVoid { dst: raw, src: v });
                self.boxed(PrimClass::Bool, Operand::Temp(raw))
            }

            ExprKind::Block(exprs) => {
                let mut last = Operand::Void;
                for ex in exprs {
                    last = self.lower_expr(ex);
                }
                last
            }

            ExprKind::If { cond, then_, else_ } => {
                let c = self.lower_expr(cond);
                let raw = self.unbox(c);
                let then_l = self.new_block();
                let else_l = self.new_block();
                let end_l = self.new_block();
                let result = self.new_temp();
                self.terminate(Term::Branch {
                    cond: raw,
                    then_: then_l,
                    else_: else_l,
                });

                self.switch_to(then_l);
                let tv = self.lower_expr(then_);
                self.emit(Instr::Copy {
                    dst: result,
                    src: tv,
                });
                self.terminate(Term::Jump(end_l));

                self.switch_to(else_l);
                let ev = self.lower_expr(else_);
                self.emit(Instr::Copy {
                    dst: result,
                    src: ev,
                });
                self.terminate(Term::Jump(end_l));

                self.switch_to(end_l);
                Operand::Temp(result)
            }

            ExprKind::While { cond, body } => {
                let head_l = self.new_block();
                let body_l = self.new_block();
                let end_l = self.new_block();
                self.terminate(Term::Jump(head_l));

                self.switch_to(head_l);
                let c = self.lower_expr(cond);
                let raw = self.unbox(c);
                self.terminate(Term::Branch {
                    cond: raw,
                    then_: body_l,
                    else_: end_l,
                });

                self.switch_to(body_l);
                let _ = self.lower_expr(body);
                self.terminate(Term::Jump(head_l));

                self.switch_to(end_l);
                Operand::Void
            }

            ExprKind::Let {
                name,
                ty,
                init,
                body,
            } => {
                let value = match init {
                    Some(init) => self.lower_expr(init),
                    None => match self.default_const(ty.as_str()) {
                        Some(konst) => {
                            let t = self.new_temp();
                            self.emit(Instr::LoadConst { dst: t, konst });
                            Operand::Temp(t)
                        }
                        None => Operand::Void,
                    },
                };
                let local = self.new_temp();
                self.emit(Instr::Copy {
                    dst: local,
                    src: value,
                });

                self.scopes.push(HashMap::new());
                self.bind(name.as_str(), local);
                let result = self.lower_expr(body);
                self.scopes.pop();
                result
            }

            ExprKind::Case { scrutinee, arms } => self.lower_case(scrutinee, arms),

            ExprKind::New(ty) => {
                let target = if ty.as_str() == "SELF_TYPE" {
                    NewTarget::SelfType
                } else {
                    NewTarget::Class(self.table.id_of(ty.as_str()).unwrap_or(TAG_OBJECT))
                };
                let t = self.new_temp();
                self.emit(Instr::New { dst: t, target });
                Operand::Temp(t)
            }

            ExprKind::Dispatch {
                recv,
                static_type,
                method,
                args,
            } => {
                // The receiver evaluates first, then arguments left to
                // right (COOL reference §13, dispatch rule).
                let recv_op = self.lower_expr(recv);
                let arg_ops: Vec<Operand> = args.iter().map(|a| self.lower_expr(a)).collect();

                let static_class = static_type
                    .as_ref()
                    .map(|st| self.table.id_of(st.as_str()).unwrap_or(TAG_OBJECT));
                let lookup_class = static_class.unwrap_or_else(|| self.static_class_of(recv));
                let slot = self
                    .table
                    .dispatch_slot(lookup_class, method.as_str())
                    .unwrap_or(0);

                self.emit(Instr::VoidCheck { src: recv_op });
                let dst = self.new_temp();
                self.emit(Instr::Call {
                    dst,
                    recv: recv_op,
                    args: arg_ops,
                    target: CallTarget {
                        method: method.name.clone(),
                        slot,
                        static_class,
                    },
                });
                Operand::Temp(dst)
            }

            ExprKind::Paren(inner) => self.lower_expr(inner),
        }
    }

    fn lower_bin(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr) -> Operand {
        match op {
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => {
                let l = self.lower_expr(lhs);
                let r = self.lower_expr(rhs);
                let lraw = self.unbox(l);
                let rraw = self.unbox(r);
                let t = self.new_temp();
                self.emit(Instr::Bin {
                    dst: t,
                    op,
                    lhs: lraw,
                    rhs: rraw,
                });
                self.boxed(PrimClass::Int, Operand::Temp(t))
            }
            BinOp::Lt | BinOp::Le => {
                let l = self.lower_expr(lhs);
                let r = self.lower_expr(rhs);
                let lraw = self.unbox(l);
                let rraw = self.unbox(r);
                let t = self.new_temp();
                self.emit(Instr::Bin {
                    dst: t,
                    op,
                    lhs: lraw,
                    rhs: rraw,
                });
                self.boxed(PrimClass::Bool, Operand::Temp(t))
            }
            BinOp::Eq => {
                let l = self.lower_expr(lhs);
                let r = self.lower_expr(rhs);
                // Int and Bool compare by raw payload; String and
                // reference types go through the runtime test.
                if (self.is_prim(lhs, INT) && self.is_prim(rhs, INT))
                    || (self.is_prim(lhs, BOOL) && self.is_prim(rhs, BOOL))
                {
                    let lraw = self.unbox(l);
                    let rraw = self.unbox(r);
                    let t = self.new_temp();
                    self.emit(Instr::Bin {
                        dst: t,
                        op,
                        lhs: lraw,
                        rhs: rraw,
                    });
                    self.boxed(PrimClass::Bool, Operand::Temp(t))
                } else {
                    let t = self.new_temp();
                    self.emit(Instr::EqTest {
                        dst: t,
                        lhs: l,
                        rhs: r,
                    });
                    Operand::Temp(t)
                }
            }
        }
    }

    fn lower_case(&mut self, scrutinee: &Expr, arms: &[CaseArm]) -> Operand {
        let v = self.lower_expr(scrutinee);
        let scrut = self.new_temp();
        self.emit(Instr::Copy { dst: scrut, src: v });

        let end_l = self.new_block();
        let result = self.new_temp();

        let mut match_arms = Vec::new();
        let arm_labels: Vec<Label> = arms.iter().map(|_| self.new_block()).collect();
        for (arm, &label) in arms.iter().zip(&arm_labels) {
            let tag = self.table.id_of(arm.ty.as_str()).unwrap_or(TAG_OBJECT);
            match_arms.push((tag, label));
        }
        self.terminate(Term::Match {
            scrutinee: Operand::Temp(scrut),
            arms: match_arms,
        });

        for (arm, &label) in arms.iter().zip(&arm_labels) {
            self.switch_to(label);
            self.scopes.push(HashMap::new());
            let binder = self.new_temp();
            self.emit(Instr::Copy {
                dst: binder,
                src: Operand::Temp(scrut),
            });
            self.bind(arm.name.as_str(), binder);
            let bv = self.lower_expr(&arm.body);
            self.emit(Instr::Copy {
                dst: result,
                src: bv,
            });
            self.terminate(Term::Jump(end_l));
            self.scopes.pop();
        }

        self.switch_to(end_l);
        Operand::Temp(result)
    }

    fn unbox(&mut self, src: Operand) -> Operand {
        let t = self.new_temp();
        self.emit(Instr::Unbox { dst: t, src });
        Operand::Temp(t)
    }

    fn boxed(&mut self, class: PrimClass, src: Operand) -> Operand {
        let t = self.new_temp();
        self.emit(Instr::Box {
            dst: t,
            class,
            src,
        });
        Operand::Temp(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cool_frontend::{lex, parse_program, type_check_program};

    fn lower_src(src: &str) -> IrProgram {
        let toks = lex(src).unwrap();
        let mut prog = parse_program(&toks).unwrap();
        let table = type_check_program(&mut prog).unwrap();
        lower(&prog, &table).unwrap()
    }

    fn method<'p>(prog: &'p IrProgram, name: &str) -> &'p IrMethod {
        prog.methods
            .iter()
            .find(|m| m.name == name && m.kind == MethodKind::Method)
            .unwrap()
    }

    #[test]
    fn arithmetic_lowers_to_unbox_compute_box() {
        let prog = lower_src("class Main { main() : Int { 1 + 2 }; };");
        let m = method(&prog, "main");
        let instrs = &m.blocks[0].instrs;
        assert!(instrs.iter().any(|i| matches!(i, Instr::Unbox { .. })));
        assert!(instrs
            .iter()
            .any(|i| matches!(i, Instr::Bin { op: BinOp::Add, .. })));
        assert!(instrs.iter().any(|i| matches!(
            i,
            Instr::Box {
                class: PrimClass::Int,
                ..
            }
        )));
    }

    #[test]
    fn dispatch_emits_void_check_then_call() {
        let prog = lower_src(
            r#"
            class Main inherits IO {
              main() : Object { out_string("hi") };
            };
        "#,
        );
        let m = method(&prog, "main");
        let instrs = &m.blocks[0].instrs;
        let check = instrs
            .iter()
            .position(|i| matches!(i, Instr::VoidCheck { .. }))
            .unwrap();
        let call = instrs
            .iter()
            .position(|i| matches!(i, Instr::Call { .. }))
            .unwrap();
        assert!(check < call);
    }

    #[test]
    fn dispatch_slot_points_into_the_table() {
        let prog = lower_src(
            r#"
            class Main inherits IO {
              main() : Object { out_string("hi") };
            };
        "#,
        );
        let m = method(&prog, "main");
        let slot = m.blocks[0]
            .instrs
            .iter()
            .find_map(|i| match i {
                Instr::Call { target, .. } => Some(target.slot),
                _ => None,
            })
            .unwrap();
        // Object contributes abort/type_name/copy, then IO's out_string.
        assert_eq!(slot, 3);
    }

    #[test]
    fn if_lowers_to_branch_with_merge() {
        let prog = lower_src(
            "class Main { main() : Int { if true then 1 else 2 fi }; };",
        );
        let m = method(&prog, "main");
        assert!(matches!(m.blocks[0].term, Term::Branch { .. }));
        assert_eq!(m.blocks.len(), 4);
    }

    #[test]
    fn while_loops_back_to_the_header() {
        let prog = lower_src(
            "class Main { main() : Object { while false loop 1 pool }; };",
        );
        let m = method(&prog, "main");
        let Term::Jump(head) = &m.blocks[0].term else {
            panic!("expected jump to header");
        };
        // The body jumps back to the same header.
        let body = m
            .blocks
            .iter()
            .filter(|b| matches!(&b.term, Term::Jump(l) if l == head))
            .count();
        assert_eq!(body, 2, "entry and body both jump to the header");
    }

    #[test]
    fn case_lowers_to_match_terminator() {
        let prog = lower_src(
            r#"
            class Main {
              main() : Object {
                case 1 of
                  i : Int => i;
                  o : Object => o;
                esac
              };
            };
        "#,
        );
        let m = method(&prog, "main");
        let Term::Match { arms, .. } = &m.blocks[0].term else {
            panic!("expected match terminator");
        };
        assert_eq!(arms.len(), 2);
    }

    #[test]
    fn let_without_init_defaults_primitives() {
        let prog = lower_src("class Main { main() : Int { let x : Int in x }; };");
        let m = method(&prog, "main");
        assert!(m.blocks[0].instrs.iter().any(|i| matches!(
            i,
            Instr::LoadConst {
                konst: Const::Int(0),
                ..
            }
        )));
    }

    #[test]
    fn init_stores_declared_initialisers_in_order() {
        let prog = lower_src(
            r#"
            class Main {
              a : Int <- 1;
              b : String;
              main() : Int { a };
            };
        "#,
        );
        let init = prog
            .methods
            .iter()
            .find(|m| m.kind == MethodKind::Init && m.class_name == "Main")
            .unwrap();
        let sets: Vec<usize> = init.blocks[0]
            .instrs
            .iter()
            .filter_map(|i| match i {
                Instr::SetAttr { slot, .. } => Some(*slot),
                _ => None,
            })
            .collect();
        assert_eq!(sets, vec![0, 1]);
    }

    #[test]
    fn string_equality_uses_the_runtime_test() {
        let prog = lower_src(r#"class Main { main() : Bool { "a" = "b" }; };"#);
        let m = method(&prog, "main");
        assert!(m.blocks[0]
            .instrs
            .iter()
            .any(|i| matches!(i, Instr::EqTest { .. })));
    }

    #[test]
    fn int_equality_compares_raw_payloads() {
        let prog = lower_src("class Main { main() : Bool { 1 = 2 }; };");
        let m = method(&prog, "main");
        assert!(m.blocks[0]
            .instrs
            .iter()
            .any(|i| matches!(i, Instr::Bin { op: BinOp::Eq, .. })));
        assert!(!m.blocks[0]
            .instrs
            .iter()
            .any(|i| matches!(i, Instr::EqTest { .. })));
    }

    #[test]
    fn out_of_range_literal_is_flagged() {
        let toks = lex("class Main { main() : Int { 3000000000 }; };").unwrap();
        let mut prog = parse_program(&toks).unwrap();
        let table = type_check_program(&mut prog).unwrap();
        let errs = lower(&prog, &table).unwrap_err();
        assert_eq!(errs[0].code, "C001");
    }
}
