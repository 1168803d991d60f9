// Copyright 2025 Diivanand Ramalingam
// Licensed under the Apache License, Version 2.0

use std::fmt;

use logos::{FilterResult, Logos};

use crate::diag::{Diagnostic, Span};

/// String literals longer than this are rejected (COOL reference, §10.2).
pub const MAX_STRING_LEN: usize = 1024;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LexErrorKind {
    #[default]
    UnexpectedChar,
    UnterminatedString,
    StringTooLong,
    NullInString,
    NewlineInString,
    UnterminatedComment,
    UnmatchedCommentClose,
}

impl LexErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            LexErrorKind::UnexpectedChar => "L001",
            LexErrorKind::UnterminatedString => "L002",
            LexErrorKind::StringTooLong => "L003",
            LexErrorKind::NullInString => "L004",
            LexErrorKind::NewlineInString => "L005",
            LexErrorKind::UnterminatedComment => "L006",
            LexErrorKind::UnmatchedCommentClose => "L007",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            LexErrorKind::UnexpectedChar => "unexpected character",
            LexErrorKind::UnterminatedString => "unterminated string literal",
            LexErrorKind::StringTooLong => "string literal exceeds 1024 characters",
            LexErrorKind::NullInString => "string literal contains a null byte",
            LexErrorKind::NewlineInString => "unescaped newline in string literal",
            LexErrorKind::UnterminatedComment => "EOF inside block comment",
            LexErrorKind::UnmatchedCommentClose => "unmatched '*)'",
        }
    }

    pub fn into_diagnostic(self, span: Span) -> Diagnostic {
        Diagnostic::new(self.code(), self.message(), span)
    }
}

#[derive(Logos, Debug, Clone, PartialEq, Eq, Hash)]
#[logos(error = LexErrorKind)]
#[logos(skip r"[ \t\r\n\f\v]+")]
#[logos(skip r"--[^\n]*")]
pub enum Tok {
    // Keywords (case-insensitive except true/false first letter must be lowercase)
    #[regex(r"(?i:class)")]
    KwClass,
    #[regex(r"(?i:inherits)")]
    KwInherits,
    #[regex(r"(?i:if)")]
    KwIf,
    #[regex(r"(?i:then)")]
    KwThen,
    #[regex(r"(?i:else)")]
    KwElse,
    #[regex(r"(?i:fi)")]
    KwFi,
    #[regex(r"(?i:while)")]
    KwWhile,
    #[regex(r"(?i:loop)")]
    KwLoop,
    #[regex(r"(?i:pool)")]
    KwPool,
    #[regex(r"(?i:let)")]
    KwLet,
    #[regex(r"(?i:in)")]
    KwIn,
    #[regex(r"(?i:case)")]
    KwCase,
    #[regex(r"(?i:of)")]
    KwOf,
    #[regex(r"(?i:esac)")]
    KwEsac,
    #[regex(r"(?i:new)")]
    KwNew,
    #[regex(r"(?i:isvoid)")]
    KwIsVoid,
    #[regex(r"(?i:not)")]
    KwNot,

    // true/false special casing rule (first char lowercase)
    #[regex(r"t[rR][uU][eE]")]
    KwTrue,
    #[regex(r"f[aA][lL][sS][eE]")]
    KwFalse,

    // Special identifiers
    #[token("self")]
    SelfId,
    #[token("SELF_TYPE")]
    SelfType,

    // Symbols / operators
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(":")]
    Colon,
    #[token(";")]
    Semi,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("@")]
    At,

    #[token("<-")]
    Assign,
    #[token("=>")]
    Darrow,
    #[token("<=")]
    Le,
    #[token("<")]
    Lt,
    #[token("=")]
    Eq,

    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,

    #[token("~")]
    Tilde,

    // Comments are consumed by callbacks; these variants never reach the
    // parser.
    #[token("(*", lex_block_comment)]
    BlockComment,
    #[token("*)", unmatched_comment_close)]
    CommentClose,

    // Literals. Out-of-range values are carried through and flagged during
    // lowering, so the payload is wider than the target Int.
    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().unwrap_or(i64::MAX))]
    Int(i64),

    #[token("\"", lex_string)]
    Str(String),

    // Identifiers
    #[regex(r"[A-Z][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    TypeId(String),

    #[regex(r"[a-z][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    ObjId(String),

    // Appended by `lex` so the parser can detect truncation.
    Eof,
}

/// Consume a string literal after the opening quote. Escapes follow the
/// COOL reference: `\n \t \b \f` are special, any other `\c` is `c`.
/// On error the scanner resyncs at the closing quote or at the newline.
fn lex_string(lex: &mut logos::Lexer<Tok>) -> Result<String, LexErrorKind> {
    let bytes = lex.remainder().as_bytes();
    let mut out = String::new();
    let mut pending: Option<LexErrorKind> = None;
    let mut i = 0usize;
    loop {
        match bytes.get(i) {
            None => {
                lex.bump(i);
                return Err(LexErrorKind::UnterminatedString);
            }
            Some(b'"') => {
                lex.bump(i + 1);
                break;
            }
            Some(b'\n') => {
                // Leave the newline for the whitespace skipper.
                lex.bump(i);
                return Err(pending.unwrap_or(LexErrorKind::NewlineInString));
            }
            Some(0) => {
                pending.get_or_insert(LexErrorKind::NullInString);
                i += 1;
            }
            Some(b'\\') => match bytes.get(i + 1) {
                None => {
                    lex.bump(i + 1);
                    return Err(LexErrorKind::UnterminatedString);
                }
                Some(&esc) => {
                    out.push(match esc {
                        b'n' => '\n',
                        b't' => '\t',
                        b'b' => '\u{0008}',
                        b'f' => '\u{000C}',
                        other => other as char,
                    });
                    i += 2;
                }
            },
            Some(&c) => {
                out.push(c as char);
                i += 1;
            }
        }
    }
    if let Some(err) = pending {
        return Err(err);
    }
    if out.len() > MAX_STRING_LEN {
        return Err(LexErrorKind::StringTooLong);
    }
    Ok(out)
}

/// Consume a `(* ... *)` comment, nesting to arbitrary depth.
fn lex_block_comment(lex: &mut logos::Lexer<Tok>) -> FilterResult<(), LexErrorKind> {
    let bytes = lex.remainder().as_bytes();
    let mut depth = 1usize;
    let mut i = 0usize;
    while depth > 0 {
        match (bytes.get(i), bytes.get(i + 1)) {
            (Some(b'('), Some(b'*')) => {
                depth += 1;
                i += 2;
            }
            (Some(b'*'), Some(b')')) => {
                depth -= 1;
                i += 2;
            }
            (Some(_), _) => i += 1,
            (None, _) => {
                lex.bump(i);
                return FilterResult::Error(LexErrorKind::UnterminatedComment);
            }
        }
    }
    lex.bump(i);
    FilterResult::Skip
}

fn unmatched_comment_close(_: &mut logos::Lexer<Tok>) -> FilterResult<(), LexErrorKind> {
    FilterResult::Error(LexErrorKind::UnmatchedCommentClose)
}

impl fmt::Display for Tok {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tok::KwClass => write!(f, "'class'"),
            Tok::KwInherits => write!(f, "'inherits'"),
            Tok::KwIf => write!(f, "'if'"),
            Tok::KwThen => write!(f, "'then'"),
            Tok::KwElse => write!(f, "'else'"),
            Tok::KwFi => write!(f, "'fi'"),
            Tok::KwWhile => write!(f, "'while'"),
            Tok::KwLoop => write!(f, "'loop'"),
            Tok::KwPool => write!(f, "'pool'"),
            Tok::KwLet => write!(f, "'let'"),
            Tok::KwIn => write!(f, "'in'"),
            Tok::KwCase => write!(f, "'case'"),
            Tok::KwOf => write!(f, "'of'"),
            Tok::KwEsac => write!(f, "'esac'"),
            Tok::KwNew => write!(f, "'new'"),
            Tok::KwIsVoid => write!(f, "'isvoid'"),
            Tok::KwNot => write!(f, "'not'"),
            Tok::KwTrue => write!(f, "'true'"),
            Tok::KwFalse => write!(f, "'false'"),
            Tok::SelfId => write!(f, "'self'"),
            Tok::SelfType => write!(f, "'SELF_TYPE'"),
            Tok::LBrace => write!(f, "'{{'"),
            Tok::RBrace => write!(f, "'}}'"),
            Tok::LParen => write!(f, "'('"),
            Tok::RParen => write!(f, "')'"),
            Tok::Colon => write!(f, "':'"),
            Tok::Semi => write!(f, "';'"),
            Tok::Comma => write!(f, "','"),
            Tok::Dot => write!(f, "'.'"),
            Tok::At => write!(f, "'@'"),
            Tok::Assign => write!(f, "'<-'"),
            Tok::Darrow => write!(f, "'=>'"),
            Tok::Le => write!(f, "'<='"),
            Tok::Lt => write!(f, "'<'"),
            Tok::Eq => write!(f, "'='"),
            Tok::Plus => write!(f, "'+'"),
            Tok::Minus => write!(f, "'-'"),
            Tok::Star => write!(f, "'*'"),
            Tok::Slash => write!(f, "'/'"),
            Tok::Tilde => write!(f, "'~'"),
            Tok::BlockComment => write!(f, "comment"),
            Tok::CommentClose => write!(f, "'*)'"),
            Tok::Int(n) => write!(f, "integer '{n}'"),
            Tok::Str(_) => write!(f, "string literal"),
            Tok::TypeId(s) => write!(f, "type identifier '{s}'"),
            Tok::ObjId(s) => write!(f, "identifier '{s}'"),
            Tok::Eof => write!(f, "end of input"),
        }
    }
}

/// A token paired with its byte span in the combined source.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: Tok,
    pub span: Span,
}

/// Lex COOL input into tokens, collecting every recoverable error.
/// The stream always ends in an `Eof` sentinel.
pub fn lex(source: &str) -> Result<Vec<Token>, Vec<Diagnostic>> {
    let mut tokens = Vec::new();
    let mut errors = Vec::new();

    for (result, range) in Tok::lexer(source).spanned() {
        let span = Span::from(range);
        match result {
            Ok(kind) => tokens.push(Token { kind, span }),
            Err(kind) => errors.push(kind.into_diagnostic(span)),
        }
    }

    let end = source.len();
    tokens.push(Token {
        kind: Tok::Eof,
        span: (end..end).into(),
    });

    if errors.is_empty() {
        Ok(tokens)
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Tok> {
        lex(src).unwrap().into_iter().map(|t| t.kind).collect()
    }

    fn errors(src: &str) -> Vec<&'static str> {
        lex(src).unwrap_err().into_iter().map(|d| d.code).collect()
    }

    #[test]
    fn strips_line_comments() {
        let toks = kinds("class Main { -- hi\n x : Int; };");
        assert!(toks.contains(&Tok::KwClass));
        assert!(!toks.iter().any(|t| matches!(t, Tok::ObjId(s) if s == "hi")));
    }

    #[test]
    fn strips_nested_block_comments() {
        let toks = kinds("(* a (* b *) c *) class Main { };");
        assert_eq!(toks[0], Tok::KwClass);
    }

    #[test]
    fn unterminated_block_comment_is_an_error() {
        assert_eq!(errors("class Main { }; (* oops"), vec!["L006"]);
    }

    #[test]
    fn stray_comment_close_is_an_error() {
        assert_eq!(errors("class Main { }; *)"), vec!["L007"]);
    }

    #[test]
    fn lex_keywords_case_insensitive_but_true_false_special() {
        let toks = kinds("ClAsS Main { x : Bool <- tRuE; };");
        assert!(toks.contains(&Tok::KwClass));
        assert!(toks.contains(&Tok::KwTrue));

        // "True" is a type identifier, not the boolean literal.
        let toks2 = kinds("class Main { x : Bool <- True; };");
        assert!(!toks2.contains(&Tok::KwTrue));
        assert!(toks2.iter().any(|t| matches!(t, Tok::TypeId(s) if s == "True")));
    }

    #[test]
    fn lex_basic_class_tokens() {
        let toks = kinds("class Main inherits Object { x : Int <- 1; };");
        assert!(toks.contains(&Tok::KwClass));
        assert!(toks.contains(&Tok::KwInherits));
        assert!(toks.iter().any(|t| matches!(t, Tok::TypeId(s) if s == "Main")));
        assert!(toks.iter().any(|t| matches!(t, Tok::ObjId(s) if s == "x")));
        assert!(toks.contains(&Tok::Int(1)));
        assert_eq!(toks.last(), Some(&Tok::Eof));
    }

    #[test]
    fn string_escapes() {
        let toks = kinds(r#"s : String <- "a\nb\tc\zd";"#);
        assert!(toks.iter().any(|t| matches!(t, Tok::Str(s) if s == "a\nb\tczd")));
    }

    #[test]
    fn string_with_newline_recovers() {
        let diags = lex("\"abc\ndef").unwrap_err();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, "L005");
    }

    #[test]
    fn string_with_null_byte_is_an_error() {
        assert_eq!(errors("\"a\0b\""), vec!["L004"]);
    }

    #[test]
    fn overlong_string_is_an_error() {
        let src = format!("\"{}\"", "a".repeat(MAX_STRING_LEN + 1));
        assert_eq!(errors(&src), vec!["L003"]);
    }

    #[test]
    fn string_at_eof_is_an_error() {
        assert_eq!(errors("\"abc"), vec!["L002"]);
    }

    #[test]
    fn spans_index_the_source() {
        let src = "class Main { };";
        let toks = lex(src).unwrap();
        let main = toks
            .iter()
            .find(|t| matches!(&t.kind, Tok::TypeId(s) if s == "Main"))
            .unwrap();
        assert_eq!(&src[main.span.start..main.span.end], "Main");
    }

    #[test]
    fn lex_round_trip_preserves_kinds() {
        let src = "class Main inherits IO { main() : Object { out_string(\"hi\") }; };";
        let toks = lex(src).unwrap();
        let rebuilt: String = toks
            .iter()
            .filter(|t| t.kind != Tok::Eof)
            .map(|t| format!("{} ", &src[t.span.start..t.span.end]))
            .collect();
        let again = lex(&rebuilt).unwrap();
        let a: Vec<_> = toks.iter().map(|t| &t.kind).collect();
        let b: Vec<_> = again.iter().map(|t| &t.kind).collect();
        assert_eq!(a, b);
    }
}
