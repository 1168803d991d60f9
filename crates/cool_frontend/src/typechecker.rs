//! Semantic analysis.
//!
//! Five passes over the parsed program:
//!
//! 1. class collection (duplicates, illegal base classes),
//! 2. hierarchy validation (unknown parents, cycle detection, depths),
//! 3. feature tables (signatures, redefinition and override rules),
//! 4. expression typing,
//! 5. annotation of every expression node with its static type.
//!
//! Errors never stop a pass: the checker substitutes `Object` and keeps
//! going so a single run reports as much as possible.

use std::collections::{BTreeSet, HashMap};

use crate::ast::*;
use crate::diag::{Diagnostic, Span};
use crate::types::{
    AttrDef, ClassId, ClassTable, CoolType, MethodSig, BOOL, INT, OBJECT, SELF_TYPE_NAME, STRING,
    TAG_OBJECT,
};

/// Scoped object environment O(v) = T.
#[derive(Clone, Debug)]
struct ObjEnv {
    scopes: Vec<HashMap<String, CoolType>>,
}

impl ObjEnv {
    fn new() -> Self {
        Self {
            scopes: vec![HashMap::new()],
        }
    }

    fn push(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop(&mut self) {
        self.scopes.pop();
    }

    fn insert(&mut self, name: String, ty: CoolType) {
        self.scopes.last_mut().unwrap().insert(name, ty);
    }

    fn get(&self, name: &str) -> Option<CoolType> {
        self.scopes.iter().rev().find_map(|s| s.get(name).cloned())
    }
}

/// Public entry point. On success every expression node carries its static
/// type and the returned table holds the validated hierarchy and layouts.
pub fn type_check_program(p: &mut Program) -> Result<ClassTable, Vec<Diagnostic>> {
    let mut errors = Vec::new();
    let mut table = ClassTable::with_builtins();

    let duplicate = collect_classes(&mut table, p, &mut errors);
    validate_hierarchy(&mut table, p, &duplicate, &mut errors);
    install_features(&mut table, p, &duplicate, &mut errors);
    table.finalize_layouts();
    check_main(&table, &mut errors);
    check_bodies(&table, p, &duplicate, &mut errors);

    if errors.is_empty() {
        Ok(table)
    } else {
        Err(errors)
    }
}

/// Pass 1. Returns a per-class flag marking duplicates so later passes skip
/// them instead of cascading.
fn collect_classes(
    table: &mut ClassTable,
    p: &Program,
    errors: &mut Vec<Diagnostic>,
) -> Vec<bool> {
    let mut duplicate = vec![false; p.classes.len()];
    for (i, c) in p.classes.iter().enumerate() {
        let name = c.name.as_str();
        if name == SELF_TYPE_NAME {
            errors.push(Diagnostic::new(
                "S002",
                "a class may not be named SELF_TYPE",
                c.name.span,
            ));
            duplicate[i] = true;
            continue;
        }
        if table.id_of(name).is_some() {
            errors.push(Diagnostic::new(
                "S001",
                format!("duplicate class definition: {name}"),
                c.name.span,
            ));
            duplicate[i] = true;
            continue;
        }
        table.add_user_class(name);
    }
    duplicate
}

/// Pass 2: resolve parent links, reject illegal bases, detect cycles.
fn validate_hierarchy(
    table: &mut ClassTable,
    p: &Program,
    duplicate: &[bool],
    errors: &mut Vec<Diagnostic>,
) {
    let mut spans: HashMap<ClassId, Span> = HashMap::new();

    for (i, c) in p.classes.iter().enumerate() {
        if duplicate[i] {
            continue;
        }
        let id = table.id_of(c.name.as_str()).unwrap();
        spans.insert(id, c.name.span);

        let Some(parent) = &c.parent else { continue };
        match parent.as_str() {
            INT | BOOL | STRING | SELF_TYPE_NAME => {
                errors.push(Diagnostic::new(
                    "S002",
                    format!("class {} cannot inherit from {}", c.name.name, parent.name),
                    parent.span,
                ));
            }
            name => match table.id_of(name) {
                Some(pid) => table.info_mut(id).parent = Some(pid),
                None => {
                    errors.push(Diagnostic::new(
                        "S003",
                        format!("class {} has undefined parent {}", c.name.name, name),
                        parent.span,
                    ));
                }
            },
        }
    }

    // Cycle detection: follow parent links from every class. Since each
    // class has a single parent, a cycle is found exactly once, at the
    // first class revisited while its own walk is still open.
    let n = table.len();
    let mut state = vec![0u8; n]; // 0 = unvisited, 1 = on current walk, 2 = finished
    for start in 0..n {
        if state[start] != 0 {
            continue;
        }
        let mut path = Vec::new();
        let mut cur = start;
        loop {
            if state[cur] == 1 {
                errors.push(Diagnostic::new(
                    "S004",
                    format!("inheritance cycle involving class {}", table.name_of(cur)),
                    spans.get(&cur).copied().unwrap_or_else(|| (0..0).into()),
                ));
                table.info_mut(cur).parent = Some(TAG_OBJECT);
                break;
            }
            if state[cur] == 2 {
                break;
            }
            state[cur] = 1;
            path.push(cur);
            match table.parent(cur) {
                Some(parent) => cur = parent,
                None => break,
            }
        }
        for id in path {
            state[id] = 2;
        }
    }

    table.compute_depths();
}

/// Pass 3: install attribute and method signatures, then check the
/// inheritance-sensitive rules once every class is populated.
fn install_features(
    table: &mut ClassTable,
    p: &Program,
    duplicate: &[bool],
    errors: &mut Vec<Diagnostic>,
) {
    for (i, class) in p.classes.iter().enumerate() {
        if duplicate[i] {
            continue;
        }
        let id = table.id_of(class.name.as_str()).unwrap();

        for feat in &class.features {
            match feat {
                Feature::Attr { name, ty, .. } => {
                    if name.as_str() == "self" {
                        errors.push(Diagnostic::new(
                            "S028",
                            "an attribute may not be named 'self'",
                            name.span,
                        ));
                        continue;
                    }
                    check_type_name(table, ty, errors);
                    if table.info(id).attrs.iter().any(|a| a.name == name.name) {
                        errors.push(Diagnostic::new(
                            "S005",
                            format!("duplicate attribute {} in class {}", name.name, class.name.name),
                            name.span,
                        ));
                        continue;
                    }
                    table.info_mut(id).attrs.push(AttrDef {
                        name: name.name.clone(),
                        ty: CoolType::from_name(ty.as_str()),
                    });
                }

                Feature::Method {
                    name,
                    formals,
                    ret_type,
                    ..
                } => {
                    let mut formal_tys = Vec::new();
                    let mut seen = BTreeSet::new();
                    for f in formals {
                        if f.name.as_str() == "self" {
                            errors.push(Diagnostic::new(
                                "S028",
                                format!("formal parameter of {} may not be named 'self'", name.name),
                                f.name.span,
                            ));
                        } else if !seen.insert(f.name.name.clone()) {
                            errors.push(Diagnostic::new(
                                "S009",
                                format!(
                                    "duplicate formal parameter {} in method {}.{}",
                                    f.name.name, class.name.name, name.name
                                ),
                                f.name.span,
                            ));
                        }
                        if f.ty.as_str() == SELF_TYPE_NAME {
                            errors.push(Diagnostic::new(
                                "S030",
                                format!("formal parameter {} cannot have type SELF_TYPE", f.name.name),
                                f.ty.span,
                            ));
                        } else {
                            check_type_name(table, &f.ty, errors);
                        }
                        formal_tys.push(CoolType::from_name(f.ty.as_str()));
                    }
                    check_type_name(table, ret_type, errors);

                    if table.info(id).methods.iter().any(|m| m.name == name.name) {
                        errors.push(Diagnostic::new(
                            "S007",
                            format!("duplicate method {} in class {}", name.name, class.name.name),
                            name.span,
                        ));
                        continue;
                    }
                    table.info_mut(id).methods.push(MethodSig {
                        name: name.name.clone(),
                        formals: formal_tys,
                        ret: CoolType::from_name(ret_type.as_str()),
                    });
                }
            }
        }
    }

    // Inheritance-sensitive checks need every class populated first.
    for (i, class) in p.classes.iter().enumerate() {
        if duplicate[i] {
            continue;
        }
        let id = table.id_of(class.name.as_str()).unwrap();

        for feat in &class.features {
            match feat {
                Feature::Attr { name, .. } => {
                    let inherited = table
                        .parent(id)
                        .and_then(|p| table.lookup_attr(p, name.as_str()))
                        .is_some();
                    if inherited {
                        errors.push(Diagnostic::new(
                            "S006",
                            format!(
                                "attribute {} in class {} redefines an inherited attribute",
                                name.name, class.name.name
                            ),
                            name.span,
                        ));
                    }
                }
                Feature::Method { name, .. } => {
                    let own = table
                        .info(id)
                        .methods
                        .iter()
                        .find(|m| m.name == name.name)
                        .cloned();
                    let inherited = table
                        .lookup_inherited_method(id, name.as_str())
                        .map(|(sig, _)| sig.clone());
                    if let (Some(own), Some(inherited)) = (own, inherited) {
                        if own.formals != inherited.formals || own.ret != inherited.ret {
                            errors.push(Diagnostic::new(
                                "S008",
                                format!(
                                    "invalid override of method {}.{}: signature differs from inherited method",
                                    class.name.name, name.name
                                ),
                                name.span,
                            ));
                        }
                    }
                }
            }
        }
    }
}

fn check_type_name(table: &ClassTable, ty: &Ident, errors: &mut Vec<Diagnostic>) {
    if ty.as_str() != SELF_TYPE_NAME && table.id_of(ty.as_str()).is_none() {
        errors.push(Diagnostic::new(
            "S012",
            format!("unknown type '{}'", ty.name),
            ty.span,
        ));
    }
}

fn check_main(table: &ClassTable, errors: &mut Vec<Diagnostic>) {
    let Some(main_id) = table.id_of("Main") else {
        errors.push(Diagnostic::new(
            "S010",
            "program must define a class 'Main'",
            (0..0).into(),
        ));
        return;
    };
    match table.info(main_id).methods.iter().find(|m| m.name == "main") {
        Some(sig) if sig.formals.is_empty() => {}
        Some(_) => errors.push(Diagnostic::new(
            "S011",
            "'Main.main' must take no arguments",
            (0..0).into(),
        )),
        None => errors.push(Diagnostic::new(
            "S011",
            "class 'Main' must declare a 'main' method",
            (0..0).into(),
        )),
    }
}

/// Passes 4 and 5: type every attribute initialiser and method body,
/// writing the inferred type onto each node.
fn check_bodies(
    table: &ClassTable,
    p: &mut Program,
    duplicate: &[bool],
    errors: &mut Vec<Diagnostic>,
) {
    for (i, class) in p.classes.iter_mut().enumerate() {
        if duplicate[i] {
            continue;
        }
        let id = table.id_of(class.name.as_str()).unwrap();

        let mut env = ObjEnv::new();
        env.insert("self".to_string(), CoolType::SelfType);
        for slot in table.attr_layout(id) {
            env.insert(slot.name.clone(), slot.ty.clone());
        }

        for feat in &mut class.features {
            match feat {
                Feature::Attr { name, ty, init, .. } => {
                    if let Some(init) = init {
                        let declared = CoolType::from_name(ty.as_str());
                        let t_init = type_of_expr(table, &mut env, id, init, errors);
                        if !table.conforms(&t_init, &declared, id) {
                            errors.push(Diagnostic::new(
                                "S025",
                                format!(
                                    "initialiser of attribute {} has type {} but {} is declared",
                                    name.name,
                                    t_init.display_name(),
                                    declared.display_name()
                                ),
                                init.span,
                            ));
                        }
                    }
                }

                Feature::Method {
                    name,
                    formals,
                    ret_type,
                    body,
                    ..
                } => {
                    env.push();
                    for f in formals.iter() {
                        if f.name.as_str() != "self" {
                            env.insert(f.name.name.clone(), CoolType::from_name(f.ty.as_str()));
                        }
                    }

                    let body_ty = type_of_expr(table, &mut env, id, body, errors);
                    let declared = CoolType::from_name(ret_type.as_str());
                    let known = declared
                        .as_named()
                        .map_or(true, |n| table.id_of(n).is_some());
                    if known && !table.conforms(&body_ty, &declared, id) {
                        errors.push(Diagnostic::new(
                            "S027",
                            format!(
                                "body of {}.{} has type {} but {} is declared",
                                class.name.name,
                                name.name,
                                body_ty.display_name(),
                                declared.display_name()
                            ),
                            body.span,
                        ));
                    }
                    env.pop();
                }
            }
        }
    }
}

fn is_bool(table: &ClassTable, ty: &CoolType, ctx: ClassId) -> bool {
    table.resolve_self_type(ty, ctx) == CoolType::named(BOOL)
}

fn is_int(table: &ClassTable, ty: &CoolType, ctx: ClassId) -> bool {
    table.resolve_self_type(ty, ctx) == CoolType::named(INT)
}

/// Expression typing. Always returns a type (best effort `Object` on
/// error) and annotates the node before returning.
fn type_of_expr(
    table: &ClassTable,
    env: &mut ObjEnv,
    ctx: ClassId,
    e: &mut Expr,
    errors: &mut Vec<Diagnostic>,
) -> CoolType {
    let span = e.span;
    let ty = match &mut e.kind {
        ExprKind::Int(_) => CoolType::named(INT),
        ExprKind::Str(_) => CoolType::named(STRING),
        ExprKind::Bool(_) => CoolType::named(BOOL),
        ExprKind::Self_ => CoolType::SelfType,

        ExprKind::Id(name) => env.get(name.as_str()).unwrap_or_else(|| {
            errors.push(Diagnostic::new(
                "S013",
                format!("undefined identifier '{}'", name.name),
                name.span,
            ));
            CoolType::named(OBJECT)
        }),

        ExprKind::Assign { name, expr } => {
            let t_rhs = type_of_expr(table, env, ctx, expr, errors);
            match env.get(name.as_str()) {
                Some(t_var) => {
                    if !table.conforms(&t_rhs, &t_var, ctx) {
                        errors.push(Diagnostic::new(
                            "S015",
                            format!(
                                "cannot assign {} to '{}' of type {}",
                                t_rhs.display_name(),
                                name.name,
                                t_var.display_name()
                            ),
                            span,
                        ));
                    }
                }
                None => {
                    errors.push(Diagnostic::new(
                        "S013",
                        format!("assignment to undefined identifier '{}'", name.name),
                        name.span,
                    ));
                }
            }
            t_rhs
        }

        ExprKind::Block(exprs) => {
            let mut last = CoolType::named(OBJECT);
            for ex in exprs {
                last = type_of_expr(table, env, ctx, ex, errors);
            }
            last
        }

        ExprKind::If { cond, then_, else_ } => {
            let t_cond = type_of_expr(table, env, ctx, cond, errors);
            if !is_bool(table, &t_cond, ctx) {
                errors.push(Diagnostic::new(
                    "S016",
                    format!("if condition must be Bool, got {}", t_cond.display_name()),
                    cond.span,
                ));
            }
            let t_then = type_of_expr(table, env, ctx, then_, errors);
            let t_else = type_of_expr(table, env, ctx, else_, errors);
            table.lub(&t_then, &t_else, ctx)
        }

        ExprKind::While { cond, body } => {
            let t_cond = type_of_expr(table, env, ctx, cond, errors);
            if !is_bool(table, &t_cond, ctx) {
                errors.push(Diagnostic::new(
                    "S016",
                    format!("while condition must be Bool, got {}", t_cond.display_name()),
                    cond.span,
                ));
            }
            let _ = type_of_expr(table, env, ctx, body, errors);
            CoolType::named(OBJECT)
        }

        ExprKind::Let { name, ty, init, body } => {
            if name.as_str() == "self" {
                errors.push(Diagnostic::new(
                    "S028",
                    "'self' cannot be bound in a let",
                    name.span,
                ));
            }
            check_type_name(table, ty, errors);
            let declared = CoolType::from_name(ty.as_str());

            if let Some(init) = init {
                let t_init = type_of_expr(table, env, ctx, init, errors);
                if !table.conforms(&t_init, &declared, ctx) {
                    errors.push(Diagnostic::new(
                        "S025",
                        format!(
                            "initialiser of '{}' has type {} but {} is declared",
                            name.name,
                            t_init.display_name(),
                            declared.display_name()
                        ),
                        init.span,
                    ));
                }
            }

            env.push();
            if name.as_str() != "self" {
                env.insert(name.name.clone(), declared);
            }
            let t_body = type_of_expr(table, env, ctx, body, errors);
            env.pop();
            t_body
        }

        ExprKind::Case { scrutinee, arms } => {
            let _ = type_of_expr(table, env, ctx, scrutinee, errors);

            let mut seen = BTreeSet::new();
            let mut result: Option<CoolType> = None;
            for arm in arms {
                if arm.name.as_str() == "self" {
                    errors.push(Diagnostic::new(
                        "S028",
                        "'self' cannot be bound in a case branch",
                        arm.name.span,
                    ));
                }
                if arm.ty.as_str() == SELF_TYPE_NAME {
                    errors.push(Diagnostic::new(
                        "S031",
                        "a case branch cannot declare SELF_TYPE",
                        arm.ty.span,
                    ));
                } else {
                    check_type_name(table, &arm.ty, errors);
                    if !seen.insert(arm.ty.name.clone()) {
                        errors.push(Diagnostic::new(
                            "S026",
                            format!("duplicate branch type {} in case", arm.ty.name),
                            arm.ty.span,
                        ));
                    }
                }

                env.push();
                if arm.name.as_str() != "self" {
                    env.insert(arm.name.name.clone(), CoolType::from_name(arm.ty.as_str()));
                }
                let t_arm = type_of_expr(table, env, ctx, &mut arm.body, errors);
                env.pop();

                result = Some(match result {
                    None => t_arm,
                    Some(prev) => table.lub(&prev, &t_arm, ctx),
                });
            }
            result.unwrap_or_else(|| CoolType::named(OBJECT))
        }

        ExprKind::New(t) => {
            if t.as_str() == SELF_TYPE_NAME {
                CoolType::SelfType
            } else if table.id_of(t.as_str()).is_none() {
                errors.push(Diagnostic::new(
                    "S012",
                    format!("unknown type '{}' in new", t.name),
                    t.span,
                ));
                CoolType::named(OBJECT)
            } else {
                CoolType::named(t.as_str())
            }
        }

        ExprKind::IsVoid(inner) => {
            let _ = type_of_expr(table, env, ctx, inner, errors);
            CoolType::named(BOOL)
        }

        ExprKind::Not(inner) => {
            let t = type_of_expr(table, env, ctx, inner, errors);
            if !is_bool(table, &t, ctx) {
                errors.push(Diagnostic::new(
                    "S017",
                    format!("'not' expects Bool, got {}", t.display_name()),
                    inner.span,
                ));
            }
            CoolType::named(BOOL)
        }

        ExprKind::Neg(inner) => {
            let t = type_of_expr(table, env, ctx, inner, errors);
            if !is_int(table, &t, ctx) {
                errors.push(Diagnostic::new(
                    "S017",
                    format!("'~' expects Int, got {}", t.display_name()),
                    inner.span,
                ));
            }
            CoolType::named(INT)
        }

        ExprKind::Bin { op, lhs, rhs } => {
            let tl = type_of_expr(table, env, ctx, lhs, errors);
            let tr = type_of_expr(table, env, ctx, rhs, errors);
            match op {
                BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => {
                    if !is_int(table, &tl, ctx) || !is_int(table, &tr, ctx) {
                        errors.push(Diagnostic::new(
                            "S017",
                            format!(
                                "arithmetic expects Int operands, got {} and {}",
                                tl.display_name(),
                                tr.display_name()
                            ),
                            span,
                        ));
                    }
                    CoolType::named(INT)
                }
                BinOp::Lt | BinOp::Le => {
                    if !is_int(table, &tl, ctx) || !is_int(table, &tr, ctx) {
                        errors.push(Diagnostic::new(
                            "S018",
                            format!(
                                "comparison expects Int operands, got {} and {}",
                                tl.display_name(),
                                tr.display_name()
                            ),
                            span,
                        ));
                    }
                    CoolType::named(BOOL)
                }
                BinOp::Eq => {
                    let l = table.resolve_self_type(&tl, ctx);
                    let r = table.resolve_self_type(&tr, ctx);
                    let basic = |t: &CoolType| {
                        matches!(t.as_named(), Some(INT) | Some(BOOL) | Some(STRING))
                    };
                    if (basic(&l) || basic(&r)) && l != r {
                        errors.push(Diagnostic::new(
                            "S019",
                            format!(
                                "incomparable types in '=': {} and {}",
                                l.display_name(),
                                r.display_name()
                            ),
                            span,
                        ));
                    }
                    CoolType::named(BOOL)
                }
            }
        }

        ExprKind::Dispatch {
            recv,
            static_type,
            method,
            args,
        } => 'dispatch: {
            let t0 = type_of_expr(table, env, ctx, recv, errors);
            let arg_tys: Vec<(CoolType, Span)> = args
                .iter_mut()
                .map(|a| {
                    let span = a.span;
                    (type_of_expr(table, env, ctx, a, errors), span)
                })
                .collect();

            let recv_class = table
                .resolve_self_type(&t0, ctx)
                .as_named()
                .and_then(|n| table.id_of(n));

            let dispatch_class = match static_type {
                Some(st) if st.as_str() == SELF_TYPE_NAME => {
                    errors.push(Diagnostic::new(
                        "S024",
                        "static dispatch through SELF_TYPE is not allowed",
                        st.span,
                    ));
                    recv_class
                }
                Some(st) => match table.id_of(st.as_str()) {
                    None => {
                        errors.push(Diagnostic::new(
                            "S012",
                            format!("unknown static dispatch type @{}", st.name),
                            st.span,
                        ));
                        recv_class
                    }
                    Some(st_id) => {
                        let st_ty = CoolType::named(st.as_str());
                        if !table.conforms(&t0, &st_ty, ctx) {
                            errors.push(Diagnostic::new(
                                "S023",
                                format!(
                                    "receiver of type {} does not conform to @{}",
                                    t0.display_name(),
                                    st.name
                                ),
                                recv.span,
                            ));
                        }
                        Some(st_id)
                    }
                },
                None => recv_class,
            };

            let Some(dispatch_class) = dispatch_class else {
                // Receiver type was already reported as unknown.
                break 'dispatch CoolType::named(OBJECT);
            };

            let Some((sig, _)) = table.lookup_method(dispatch_class, method.as_str()) else {
                errors.push(Diagnostic::new(
                    "S020",
                    format!(
                        "class {} has no method '{}'",
                        table.name_of(dispatch_class),
                        method.name
                    ),
                    method.span,
                ));
                break 'dispatch CoolType::named(OBJECT);
            };
            let sig = sig.clone();

            if sig.formals.len() != arg_tys.len() {
                errors.push(Diagnostic::new(
                    "S021",
                    format!(
                        "method {}.{} expects {} argument(s), got {}",
                        table.name_of(dispatch_class),
                        method.name,
                        sig.formals.len(),
                        arg_tys.len()
                    ),
                    span,
                ));
            }
            for (i, (t_arg, arg_span)) in arg_tys.iter().enumerate() {
                if let Some(t_formal) = sig.formals.get(i) {
                    if !table.conforms(t_arg, t_formal, ctx) {
                        errors.push(Diagnostic::new(
                            "S022",
                            format!(
                                "argument {} of {}.{} has type {} but {} is expected",
                                i + 1,
                                table.name_of(dispatch_class),
                                method.name,
                                t_arg.display_name(),
                                t_formal.display_name()
                            ),
                            *arg_span,
                        ));
                    }
                }
            }

            match sig.ret {
                CoolType::SelfType => t0,
                other => other,
            }
        }

        ExprKind::Paren(inner) => type_of_expr(table, env, ctx, inner, errors),
    };

    annotate(e, ty)
}

fn annotate(e: &mut Expr, ty: CoolType) -> CoolType {
    e.ty = Some(ty.clone());
    ty
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::parser::parse_program;

    fn check(src: &str) -> Result<(Program, ClassTable), Vec<Diagnostic>> {
        let toks = lex(src).unwrap();
        let mut prog = parse_program(&toks).unwrap();
        let table = type_check_program(&mut prog)?;
        Ok((prog, table))
    }

    fn check_err(src: &str) -> Vec<Diagnostic> {
        check(src).unwrap_err()
    }

    #[test]
    fn typechecks_simple_arith() {
        let res = check("class Main { main() : Int { 1 + 2 * 3 }; };");
        assert!(res.is_ok(), "{res:?}");
    }

    #[test]
    fn annotates_every_expression() {
        let (prog, _) = check("class Main { main() : Int { 1 + 2 * 3 }; };").unwrap();
        let Feature::Method { body, .. } = &prog.classes[0].features[0] else {
            panic!("expected method");
        };
        assert_eq!(body.ty, Some(CoolType::named(INT)));
        let ExprKind::Bin { lhs, rhs, .. } = &body.kind else {
            panic!("expected binop");
        };
        assert_eq!(lhs.ty, Some(CoolType::named(INT)));
        assert_eq!(rhs.ty, Some(CoolType::named(INT)));
    }

    #[test]
    fn rejects_bad_if_condition() {
        let errs = check_err("class Main { main() : Int { if 1 then 2 else 3 fi }; };");
        assert!(errs.iter().any(|e| e.code == "S016"));
    }

    #[test]
    fn inheritance_cycle_reports_exactly_one_error() {
        let errs = check_err(
            r#"
            class B inherits A { };
            class A inherits B { };
            class Main { main() : Int { 1 }; };
        "#,
        );
        let cycles: Vec<_> = errs.iter().filter(|e| e.code == "S004").collect();
        assert_eq!(cycles.len(), 1, "{errs:?}");
        assert!(cycles[0].message.contains("inheritance cycle"));
    }

    #[test]
    fn rejects_inheriting_from_primitives() {
        let errs = check_err(
            r#"
            class A inherits Int { };
            class Main { main() : Int { 1 }; };
        "#,
        );
        assert!(errs.iter().any(|e| e.code == "S002"));
    }

    #[test]
    fn string_int_equality_is_incomparable() {
        let errs = check_err(r#"class Main { main() : Object { "a" = 1 }; };"#);
        assert!(errs.iter().any(|e| e.code == "S019"));
        assert!(errs.iter().any(|e| e.message.contains("incomparable types in '='")));
    }

    #[test]
    fn object_equality_is_fine() {
        assert!(check(
            r#"
            class A { };
            class Main { main() : Object { new A = new Object }; };
        "#
        )
        .is_ok());
    }

    #[test]
    fn missing_main_class_is_reported() {
        let errs = check_err("class A { };");
        assert!(errs.iter().any(|e| e.code == "S010"));
    }

    #[test]
    fn main_without_main_method_is_reported() {
        let errs = check_err("class Main { x : Int; };");
        assert!(errs.iter().any(|e| e.code == "S011"));
    }

    #[test]
    fn attribute_redefinition_is_rejected() {
        let errs = check_err(
            r#"
            class A { x : Int; };
            class B inherits A { x : Int; };
            class Main { main() : Int { 1 }; };
        "#,
        );
        assert!(errs.iter().any(|e| e.code == "S006"));
    }

    #[test]
    fn override_must_match_signature() {
        let errs = check_err(
            r#"
            class A { m(x : Int) : Int { x }; };
            class B inherits A { m(x : String) : Int { 1 }; };
            class Main { main() : Int { 1 }; };
        "#,
        );
        assert!(errs.iter().any(|e| e.code == "S008"));
    }

    #[test]
    fn matching_override_is_allowed() {
        assert!(check(
            r#"
            class A { m(x : Int) : Int { x }; };
            class B inherits A { m(x : Int) : Int { x + 1 }; };
            class Main { main() : Int { 1 }; };
        "#
        )
        .is_ok());
    }

    #[test]
    fn dispatch_resolves_builtin_methods() {
        assert!(check(
            r#"
            class Main inherits IO {
              main() : Object { out_string("Hello, World.\n") };
            };
        "#
        )
        .is_ok());
    }

    #[test]
    fn self_type_return_gives_receiver_type() {
        // IO.out_string returns SELF_TYPE, so chaining through a subclass
        // keeps the subclass type.
        assert!(check(
            r#"
            class Main inherits IO {
              main() : Object { out_string("a").out_int(1) };
            };
        "#
        )
        .is_ok());
    }

    #[test]
    fn let_shadows_and_scopes() {
        let errs = check_err(
            r#"
            class Main {
              main() : Object { { let x : Int <- 5 in x; x; } };
            };
        "#,
        );
        // The second x is out of scope.
        assert!(errs.iter().any(|e| e.code == "S013"));
    }

    #[test]
    fn case_branch_types_must_be_distinct() {
        let errs = check_err(
            r#"
            class Main {
              main() : Object {
                case 1 of
                  a : Int => a;
                  b : Int => b;
                esac
              };
            };
        "#,
        );
        assert!(errs.iter().any(|e| e.code == "S026"));
    }

    #[test]
    fn case_result_is_the_lub_of_branches() {
        let (prog, _) = check(
            r#"
            class A { };
            class B inherits A { };
            class C inherits A { };
            class Main {
              main() : Object {
                case new B of
                  b : B => b;
                  c : C => c;
                esac
              };
            };
        "#,
        )
        .unwrap();
        let main = prog.classes.iter().find(|c| c.name.name == "Main").unwrap();
        let Feature::Method { body, .. } = &main.features[0] else {
            panic!("expected method");
        };
        assert_eq!(body.ty, Some(CoolType::named("A")));
    }

    #[test]
    fn static_dispatch_requires_conformance() {
        let errs = check_err(
            r#"
            class A { m() : Int { 1 }; };
            class Main { main() : Int { (new Object)@A.m() }; };
        "#,
        );
        assert!(errs.iter().any(|e| e.code == "S023"));
    }

    #[test]
    fn undefined_identifier_recovers_with_object() {
        let errs = check_err("class Main { main() : Object { y }; };");
        assert!(errs.iter().any(|e| e.code == "S013"));
        // Only the undefined-identifier error: the body conforms as Object.
        assert_eq!(errs.len(), 1, "{errs:?}");
    }

    #[test]
    fn assignment_requires_conformance() {
        let errs = check_err(
            r#"
            class Main {
              x : Int;
              main() : Object { x <- "s" };
            };
        "#,
        );
        assert!(errs.iter().any(|e| e.code == "S015"));
    }
}
