// Copyright 2025 Diivanand Ramalingam
// Licensed under the Apache License, Version 2.0

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use chumsky::{extra, pratt};

use crate::ast::*;
use crate::diag::{Diagnostic, Span};
use crate::lexer::{Tok, Token};
use crate::types::SELF_TYPE_NAME;

pub type ParseError<'t> = Rich<'t, Tok>;
pub type PExtra<'t> = extra::Err<ParseError<'t>>;

/// Public API: parse a token stream into a Program.
///
/// Recovery is panic-mode at semicolons bounded by the enclosing feature or
/// class, so one run reports as many syntax errors as possible; any error
/// still fails the parse.
pub fn parse_program(tokens: &[Token]) -> Result<Program, Vec<Diagnostic>> {
    let eoi: Span = tokens
        .last()
        .map(|t| t.span)
        .unwrap_or_else(|| (0..0).into());

    let stream = Stream::from_iter(
        tokens
            .iter()
            .filter(|t| t.kind != Tok::Eof)
            .map(|t| (t.kind.clone(), t.span)),
    )
    .map(eoi, |(t, s): (_, _)| (t, s));

    program_parser().parse(stream).into_result().map_err(|errors| {
        errors
            .into_iter()
            .map(|e| Diagnostic::new("P001", e.to_string(), *e.span()))
            .collect()
    })
}

pub fn program_parser<'t, I>() -> impl Parser<'t, I, Program, PExtra<'t>>
where
    I: ValueInput<'t, Token = Tok, Span = Span>,
{
    class_parser()
        .then_ignore(just(Tok::Semi))
        .recover_with(skip_then_retry_until(any().ignored(), end()))
        .repeated()
        .at_least(1)
        .collect::<Vec<_>>()
        .map(|classes| Program { classes })
        .then_ignore(end())
}

fn class_parser<'t, I>() -> impl Parser<'t, I, Class, PExtra<'t>>
where
    I: ValueInput<'t, Token = Tok, Span = Span>,
{
    let feature_item = feature_parser()
        .then_ignore(just(Tok::Semi))
        .map(Some)
        .recover_with(via_parser(feature_recovery()));

    just(Tok::KwClass)
        .ignore_then(type_id())
        .then(just(Tok::KwInherits).ignore_then(type_id()).or_not())
        .then(
            just(Tok::LBrace)
                .ignore_then(feature_item.repeated().collect::<Vec<_>>())
                .then_ignore(just(Tok::RBrace)),
        )
        .map_with(|((name, parent), features), e| Class {
            name,
            parent,
            features: features.into_iter().flatten().collect(),
            span: e.span(),
        })
}

/// Skip a malformed feature up to (and through) its terminating semicolon,
/// stopping short of the class body's closing brace.
fn feature_recovery<'t, I>() -> impl Parser<'t, I, Option<Feature>, PExtra<'t>>
where
    I: ValueInput<'t, Token = Tok, Span = Span>,
{
    none_of([Tok::Semi, Tok::RBrace, Tok::KwClass])
        .ignored()
        .repeated()
        .at_least(1)
        .then_ignore(just(Tok::Semi).or_not())
        .map(|_| None)
}

fn feature_parser<'t, I>() -> impl Parser<'t, I, Feature, PExtra<'t>>
where
    I: ValueInput<'t, Token = Tok, Span = Span>,
{
    let method = obj_id()
        .then(
            just(Tok::LParen)
                .ignore_then(
                    formal_parser()
                        .separated_by(just(Tok::Comma))
                        .collect::<Vec<_>>(),
                )
                .then_ignore(just(Tok::RParen)),
        )
        .then_ignore(just(Tok::Colon))
        .then(type_id())
        .then(
            just(Tok::LBrace)
                .ignore_then(expr_parser())
                .then_ignore(just(Tok::RBrace)),
        )
        .map_with(|(((name, formals), ret_type), body), e| Feature::Method {
            name,
            formals,
            ret_type,
            body,
            span: e.span(),
        });

    let attr = obj_id()
        .then_ignore(just(Tok::Colon))
        .then(type_id())
        .then(just(Tok::Assign).ignore_then(expr_parser()).or_not())
        .map_with(|((name, ty), init), e| Feature::Attr {
            name,
            ty,
            init,
            span: e.span(),
        });

    method.or(attr)
}

fn formal_parser<'t, I>() -> impl Parser<'t, I, Formal, PExtra<'t>>
where
    I: ValueInput<'t, Token = Tok, Span = Span>,
{
    obj_id()
        .then_ignore(just(Tok::Colon))
        .then(type_id())
        .map(|(name, ty)| Formal { name, ty })
}

fn type_id<'t, I>() -> impl Parser<'t, I, Ident, PExtra<'t>>
where
    I: ValueInput<'t, Token = Tok, Span = Span>,
{
    select! {
        Tok::TypeId(s) = e => Ident { name: s, span: e.span() },
        Tok::SelfType = e => Ident { name: SELF_TYPE_NAME.to_string(), span: e.span() },
    }
}

fn obj_id<'t, I>() -> impl Parser<'t, I, Ident, PExtra<'t>>
where
    I: ValueInput<'t, Token = Tok, Span = Span>,
{
    select! { Tok::ObjId(s) = e => Ident { name: s, span: e.span() } }
}

fn bin(op: BinOp, lhs: Expr, rhs: Expr, span: Span) -> Expr {
    Expr::new(
        ExprKind::Bin {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        span,
    )
}

struct RawBinding {
    name: Ident,
    ty: Ident,
    init: Option<Expr>,
}

/// `let a : T <- x, b : U in e` becomes nested single-binding lets.
fn desugar_let(bindings: Vec<RawBinding>, body: Expr, span: Span) -> Expr {
    bindings.into_iter().rev().fold(body, |body, b| {
        Expr::new(
            ExprKind::Let {
                name: b.name,
                ty: b.ty,
                init: b.init.map(Box::new),
                body: Box::new(body),
            },
            span,
        )
    })
}

pub fn expr_parser<'t, I>() -> impl Parser<'t, I, Expr, PExtra<'t>>
where
    I: ValueInput<'t, Token = Tok, Span = Span>,
{
    recursive(|expr| {
        let paren = just(Tok::LParen)
            .ignore_then(expr.clone())
            .then_ignore(just(Tok::RParen))
            .map_with(|inner, e| Expr::new(ExprKind::Paren(Box::new(inner)), e.span()));

        let self_ = just(Tok::SelfId).map_with(|_, e| Expr::new(ExprKind::Self_, e.span()));
        let id = obj_id().map(|i| {
            let span = i.span;
            Expr::new(ExprKind::Id(i), span)
        });

        let literal = select! {
            Tok::Int(n) = e => Expr::new(ExprKind::Int(n), e.span()),
            Tok::Str(s) = e => Expr::new(ExprKind::Str(s), e.span()),
            Tok::KwTrue = e => Expr::new(ExprKind::Bool(true), e.span()),
            Tok::KwFalse = e => Expr::new(ExprKind::Bool(false), e.span()),
        };

        let block = just(Tok::LBrace)
            .ignore_then(
                expr.clone()
                    .then_ignore(just(Tok::Semi))
                    .repeated()
                    .at_least(1)
                    .collect::<Vec<_>>(),
            )
            .then_ignore(just(Tok::RBrace))
            .map_with(|exprs, e| Expr::new(ExprKind::Block(exprs), e.span()));

        let if_ = just(Tok::KwIf)
            .ignore_then(expr.clone())
            .then_ignore(just(Tok::KwThen))
            .then(expr.clone())
            .then_ignore(just(Tok::KwElse))
            .then(expr.clone())
            .then_ignore(just(Tok::KwFi))
            .map_with(|((cond, then_), else_), e| {
                Expr::new(
                    ExprKind::If {
                        cond: Box::new(cond),
                        then_: Box::new(then_),
                        else_: Box::new(else_),
                    },
                    e.span(),
                )
            });

        let while_ = just(Tok::KwWhile)
            .ignore_then(expr.clone())
            .then_ignore(just(Tok::KwLoop))
            .then(expr.clone())
            .then_ignore(just(Tok::KwPool))
            .map_with(|(cond, body), e| {
                Expr::new(
                    ExprKind::While {
                        cond: Box::new(cond),
                        body: Box::new(body),
                    },
                    e.span(),
                )
            });

        let let_binding = obj_id()
            .then_ignore(just(Tok::Colon))
            .then(type_id())
            .then(just(Tok::Assign).ignore_then(expr.clone()).or_not())
            .map(|((name, ty), init)| RawBinding { name, ty, init });

        let let_ = just(Tok::KwLet)
            .ignore_then(
                let_binding
                    .separated_by(just(Tok::Comma))
                    .at_least(1)
                    .collect::<Vec<_>>(),
            )
            .then_ignore(just(Tok::KwIn))
            .then(expr.clone())
            .map_with(|(bindings, body), e| desugar_let(bindings, body, e.span()));

        let case_arm = obj_id()
            .then_ignore(just(Tok::Colon))
            .then(type_id())
            .then_ignore(just(Tok::Darrow))
            .then(expr.clone())
            .then_ignore(just(Tok::Semi))
            .map_with(|((name, ty), body), e| CaseArm {
                name,
                ty,
                body,
                span: e.span(),
            });

        let case_ = just(Tok::KwCase)
            .ignore_then(expr.clone())
            .then_ignore(just(Tok::KwOf))
            .then(case_arm.repeated().at_least(1).collect::<Vec<_>>())
            .then_ignore(just(Tok::KwEsac))
            .map_with(|(scrutinee, arms), e| {
                Expr::new(
                    ExprKind::Case {
                        scrutinee: Box::new(scrutinee),
                        arms,
                    },
                    e.span(),
                )
            });

        let new_ = just(Tok::KwNew)
            .ignore_then(type_id())
            .map_with(|t, e| Expr::new(ExprKind::New(t), e.span()));

        let atom = if_
            .or(while_)
            .or(let_)
            .or(case_)
            .or(block)
            .or(new_)
            .or(paren)
            .or(literal)
            .or(self_)
            .or(id);

        // args: ( [expr (, expr)*]? )
        let args = just(Tok::LParen)
            .ignore_then(
                expr.clone()
                    .separated_by(just(Tok::Comma))
                    .collect::<Vec<_>>(),
            )
            .then_ignore(just(Tok::RParen));

        // Self-dispatch sugar: id(args) is self.id(args).
        let self_dispatch = obj_id().then(args.clone()).map_with(|(method, args), e| {
            Expr::new(
                ExprKind::Dispatch {
                    recv: Box::new(Expr::new(ExprKind::Self_, method.span)),
                    static_type: None,
                    method,
                    args,
                },
                e.span(),
            )
        });

        let primary = self_dispatch.or(atom);

        // recv [@TYPE] . id(args), left associative
        let dispatch_step = just(Tok::At)
            .ignore_then(type_id())
            .or_not()
            .then_ignore(just(Tok::Dot))
            .then(obj_id())
            .then(args.clone())
            .map_with(|((static_ty, method), args), e| (static_ty, method, args, e.span()));

        let postfix = primary
            .then(dispatch_step.repeated().collect::<Vec<_>>())
            .map(|(base, steps)| {
                steps
                    .into_iter()
                    .fold(base, |recv, (static_type, method, args, step_span): (Option<Ident>, Ident, Vec<Expr>, Span)| {
                        let span: Span = (recv.span.start..step_span.end).into();
                        Expr::new(
                            ExprKind::Dispatch {
                                recv: Box::new(recv),
                                static_type,
                                method,
                                args,
                            },
                            span,
                        )
                    })
            });

        // ~, isvoid, *, /, +, - (tightest first).
        let unit = postfix.pratt((
            pratt::prefix(4, just(Tok::Tilde), |_, rhs, e| {
                Expr::new(ExprKind::Neg(Box::new(rhs)), e.span())
            }),
            pratt::prefix(3, just(Tok::KwIsVoid), |_, rhs, e| {
                Expr::new(ExprKind::IsVoid(Box::new(rhs)), e.span())
            }),
            pratt::infix(pratt::left(2), just(Tok::Star), |lhs, _, rhs, e| {
                bin(BinOp::Mul, lhs, rhs, e.span())
            }),
            pratt::infix(pratt::left(2), just(Tok::Slash), |lhs, _, rhs, e| {
                bin(BinOp::Div, lhs, rhs, e.span())
            }),
            pratt::infix(pratt::left(1), just(Tok::Plus), |lhs, _, rhs, e| {
                bin(BinOp::Add, lhs, rhs, e.span())
            }),
            pratt::infix(pratt::left(1), just(Tok::Minus), |lhs, _, rhs, e| {
                bin(BinOp::Sub, lhs, rhs, e.span())
            }),
        ))
        .boxed();

        // <, <=, = are non-associative: `a < b < c` is a syntax error.
        let comparison = unit
            .clone()
            .then(
                just(Tok::Lt)
                    .to(BinOp::Lt)
                    .or(just(Tok::Le).to(BinOp::Le))
                    .or(just(Tok::Eq).to(BinOp::Eq))
                    .then(unit)
                    .or_not(),
            )
            .map_with(|(lhs, rest), e| match rest {
                Some((op, rhs)) => bin(op, lhs, rhs, e.span()),
                None => lhs,
            });

        // `not` binds weaker than comparisons; its operand extends to the
        // right as far as possible, assignment included.
        let not_level = just(Tok::KwNot)
            .ignore_then(expr.clone())
            .map_with(|rhs, e| Expr::new(ExprKind::Not(Box::new(rhs)), e.span()))
            .or(comparison);

        // id <- expr, right associative, lowest precedence.
        let assign = obj_id()
            .then_ignore(just(Tok::Assign))
            .then(expr.clone())
            .map_with(|(name, rhs), e| {
                Expr::new(
                    ExprKind::Assign {
                        name,
                        expr: Box::new(rhs),
                    },
                    e.span(),
                )
            })
            .or(not_level);

        assign.boxed()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;

    fn parse(src: &str) -> Program {
        let toks = lex(src).unwrap();
        parse_program(&toks).unwrap()
    }

    fn parse_err(src: &str) -> Vec<Diagnostic> {
        let toks = lex(src).unwrap();
        parse_program(&toks).unwrap_err()
    }

    fn main_body(prog: &Program) -> &Expr {
        match &prog.classes[0].features[0] {
            Feature::Method { body, .. } => body,
            _ => panic!("expected method"),
        }
    }

    #[test]
    fn parses_minimal_main_class() {
        let prog = parse(
            r#"
            class Main {
              main() : Int { 1 + 2 * 3 };
            };
        "#,
        );
        assert_eq!(prog.classes.len(), 1);
        assert_eq!(prog.classes[0].name.name, "Main");
        assert_eq!(prog.classes[0].features.len(), 1);
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let prog = parse("class T { m() : Int { 1 + 2 * 3 }; };");
        match &main_body(&prog).kind {
            ExprKind::Bin { op: BinOp::Add, rhs, .. } => {
                assert!(matches!(rhs.kind, ExprKind::Bin { op: BinOp::Mul, .. }));
            }
            other => panic!("expected addition at the top, got {other:?}"),
        }
    }

    #[test]
    fn chained_comparison_is_a_syntax_error() {
        let errs = parse_err("class T { m() : Bool { 1 < 2 < 3 }; };");
        assert!(!errs.is_empty());
    }

    #[test]
    fn not_extends_over_comparisons() {
        let prog = parse("class T { m() : Bool { not 1 < 2 }; };");
        match &main_body(&prog).kind {
            ExprKind::Not(inner) => {
                assert!(matches!(inner.kind, ExprKind::Bin { op: BinOp::Lt, .. }));
            }
            other => panic!("expected not at the top, got {other:?}"),
        }
    }

    #[test]
    fn assignment_is_right_associative() {
        let prog = parse("class T { m() : Int { x <- y <- 1 }; };");
        match &main_body(&prog).kind {
            ExprKind::Assign { name, expr } => {
                assert_eq!(name.name, "x");
                assert!(matches!(expr.kind, ExprKind::Assign { .. }));
            }
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn parses_attribute_without_init() {
        let prog = parse(
            r#"
            class Point {
              x : Int;
              y : Int;
            };
        "#,
        );
        assert_eq!(prog.classes[0].features.len(), 2);
        match &prog.classes[0].features[0] {
            Feature::Attr { name, ty, init, .. } => {
                assert_eq!(name.name, "x");
                assert_eq!(ty.name, "Int");
                assert!(init.is_none());
            }
            _ => panic!("expected attribute"),
        }
    }

    #[test]
    fn parses_attribute_with_init() {
        let prog = parse("class Counter { count : Int <- 0; };");
        match &prog.classes[0].features[0] {
            Feature::Attr { init, .. } => assert!(init.is_some()),
            _ => panic!("expected attribute"),
        }
    }

    #[test]
    fn parses_method_with_multiple_params() {
        let prog = parse("class Math { add(x : Int, y : Int, z : Int) : Int { x + y + z }; };");
        match &prog.classes[0].features[0] {
            Feature::Method { name, formals, .. } => {
                assert_eq!(name.name, "add");
                assert_eq!(formals.len(), 3);
                assert_eq!(formals[0].name.name, "x");
                assert_eq!(formals[2].name.name, "z");
            }
            _ => panic!("expected method"),
        }
    }

    #[test]
    fn rejects_trailing_comma_in_params() {
        let errs = parse_err("class T { m(x : Int,) : Int { x }; };");
        assert!(!errs.is_empty());
    }

    #[test]
    fn parses_if_then_else_expression() {
        let prog = parse("class T { m(x : Int) : Int { if x < 10 then 1 else 0 fi }; };");
        assert!(matches!(main_body(&prog).kind, ExprKind::If { .. }));
    }

    #[test]
    fn parses_while_loop() {
        let prog = parse("class T { m(x : Int) : Object { while x < 10 loop x <- x + 1 pool }; };");
        assert!(matches!(main_body(&prog).kind, ExprKind::While { .. }));
    }

    #[test]
    fn parses_new_self_type() {
        let prog = parse("class T { clone() : SELF_TYPE { new SELF_TYPE }; };");
        match &main_body(&prog).kind {
            ExprKind::New(t) => assert_eq!(t.name, "SELF_TYPE"),
            other => panic!("expected new, got {other:?}"),
        }
    }

    #[test]
    fn parses_case_expression_multiple_arms() {
        let prog = parse(
            r#"
            class T {
              m(x : Object) : Int {
                case x of
                  a : Int => a + 1;
                  b : String => 0;
                  c : Object => 42;
                esac
              };
            };
        "#,
        );
        match &main_body(&prog).kind {
            ExprKind::Case { arms, .. } => {
                assert_eq!(arms.len(), 3);
                assert_eq!(arms[0].name.name, "a");
                assert_eq!(arms[1].ty.name, "String");
            }
            other => panic!("expected case, got {other:?}"),
        }
    }

    #[test]
    fn multi_binding_let_desugars_to_nested_lets() {
        let prog = parse("class T { m() : Int { let x : Int <- 1, y : Int <- 2, z : Int in x }; };");
        let mut depth = 0;
        let mut cur = main_body(&prog);
        let order = ["x", "y", "z"];
        while let ExprKind::Let { name, body, .. } = &cur.kind {
            assert_eq!(name.name, order[depth]);
            depth += 1;
            cur = body;
        }
        assert_eq!(depth, 3);
        assert!(matches!(cur.kind, ExprKind::Id(_)));
    }

    #[test]
    fn let_body_extends_right() {
        // The body of the let is the whole assignment, not just `y`.
        let prog = parse("class T { m() : Int { let x : Int in y <- x }; };");
        match &main_body(&prog).kind {
            ExprKind::Let { body, .. } => {
                assert!(matches!(body.kind, ExprKind::Assign { .. }));
            }
            other => panic!("expected let, got {other:?}"),
        }
    }

    #[test]
    fn parses_static_dispatch() {
        let prog = parse("class T { m(x : Object) : String { x@Object.type_name() }; };");
        match &main_body(&prog).kind {
            ExprKind::Dispatch { static_type, method, .. } => {
                assert_eq!(static_type.as_ref().unwrap().name, "Object");
                assert_eq!(method.name, "type_name");
            }
            other => panic!("expected dispatch, got {other:?}"),
        }
    }

    #[test]
    fn parses_chained_dispatch() {
        let prog = parse("class T { m() : String { obj.method1().method2().method3() }; };");
        match &main_body(&prog).kind {
            ExprKind::Dispatch { method, .. } => assert_eq!(method.name, "method3"),
            other => panic!("expected dispatch, got {other:?}"),
        }
    }

    #[test]
    fn parses_self_dispatch() {
        let prog = parse(
            r#"
            class T {
              helper() : Int { 1 };
              m() : Int { helper() };
            };
        "#,
        );
        match &prog.classes[0].features[1] {
            Feature::Method { body, .. } => match &body.kind {
                ExprKind::Dispatch { recv, method, .. } => {
                    assert!(matches!(recv.kind, ExprKind::Self_));
                    assert_eq!(method.name, "helper");
                }
                other => panic!("expected dispatch, got {other:?}"),
            },
            _ => panic!("expected method"),
        }
    }

    #[test]
    fn parses_unary_operators() {
        let prog = parse(
            r#"
            class T {
              neg(x : Int) : Int { ~x };
              check(x : Object) : Bool { isvoid x };
              negate(x : Bool) : Bool { not x };
            };
        "#,
        );
        let bodies: Vec<_> = prog.classes[0]
            .features
            .iter()
            .map(|f| match f {
                Feature::Method { body, .. } => &body.kind,
                _ => panic!("expected method"),
            })
            .collect();
        assert!(matches!(bodies[0], ExprKind::Neg(_)));
        assert!(matches!(bodies[1], ExprKind::IsVoid(_)));
        assert!(matches!(bodies[2], ExprKind::Not(_)));
    }

    #[test]
    fn complement_binds_tighter_than_multiplication() {
        let prog = parse("class T { m(x : Int) : Int { ~x * 2 }; };");
        match &main_body(&prog).kind {
            ExprKind::Bin { op: BinOp::Mul, lhs, .. } => {
                assert!(matches!(lhs.kind, ExprKind::Neg(_)));
            }
            other => panic!("expected multiplication at the top, got {other:?}"),
        }
    }

    #[test]
    fn parses_nested_blocks() {
        let prog = parse(
            r#"
            class T {
              m() : Int {
                {
                  { 1; 2; };
                  3;
                }
              };
            };
        "#,
        );
        assert!(matches!(main_body(&prog).kind, ExprKind::Block(_)));
    }

    #[test]
    fn parses_multiple_classes_with_inheritance() {
        let prog = parse(
            r#"
            class Base { x : Int; };
            class Derived inherits Base { y : Int; };
        "#,
        );
        assert_eq!(prog.classes.len(), 2);
        assert!(prog.classes[0].parent.is_none());
        assert_eq!(prog.classes[1].parent.as_ref().unwrap().name, "Base");
    }

    #[test]
    fn recovery_reports_multiple_feature_errors() {
        let errs = parse_err(
            r#"
            class T {
              good : Int;
              bad1 Int;
              alsogood : Bool;
              bad2 : ;
            };
        "#,
        );
        assert!(errs.len() >= 2, "expected at least two diagnostics, got {errs:?}");
    }

    #[test]
    fn recovery_continues_at_the_next_class() {
        let errs = parse_err(
            r#"
            class Broken {
            class Fine { x : Int; };
        "#,
        );
        assert!(!errs.is_empty());
    }

    #[test]
    fn spans_cover_the_expression() {
        let src = "class T { m() : Int { 1 + 2 }; };";
        let prog = parse(src);
        let body = main_body(&prog);
        assert_eq!(&src[body.span.start..body.span.end], "1 + 2");
    }

    #[test]
    fn parses_empty_class() {
        let prog = parse("class Empty { };");
        assert_eq!(prog.classes[0].features.len(), 0);
    }
}
