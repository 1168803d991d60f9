// Copyright 2025 Diivanand Ramalingam
// Licensed under the Apache License, Version 2.0

//! The compiler driver: wires the stages together and maps failures to
//! process exit codes (0 success, 1 lex/parse, 2 semantic, 3 I/O,
//! 4 codegen/internal).

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use thiserror::Error;

use cool_frontend::diag::{Diagnostic, SourceMap};
use cool_frontend::{lex, parse_program, type_check_program, Tok};
use cool_ir::{lower, optimize};

#[derive(Parser)]
#[command(name = "coolc", version, about = "COOL to MIPS32 (SPIM) compiler")]
struct Args {
    /// COOL source files, compiled together as one program.
    #[arg(required = true, value_name = "FILE")]
    files: Vec<PathBuf>,

    /// Output assembly path (default: first source basename + `.s`).
    #[arg(short = 'o', long = "outfile", value_name = "PATH")]
    outfile: Option<PathBuf>,

    /// Dump the token stream and exit.
    #[arg(long)]
    tokens: bool,

    /// Dump the AST and exit.
    #[arg(long)]
    ast: bool,

    /// Dump the typed AST and exit.
    #[arg(long)]
    semantics: bool,

    /// Run through semantic analysis only.
    #[arg(long = "no-codegen")]
    no_codegen: bool,
}

#[derive(Debug, Error)]
enum Error {
    #[error("lexical or syntax errors")]
    Syntax,
    #[error("semantic errors")]
    Semantics,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("code generation errors")]
    Codegen,
}

impl Error {
    fn exit_code(&self) -> u8 {
        match self {
            Error::Syntax => 1,
            Error::Semantics => 2,
            Error::Io(_) => 3,
            Error::Codegen => 4,
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Error::Io(err) = &e {
                eprintln!("coolc: {err}");
            }
            ExitCode::from(e.exit_code())
        }
    }
}

/// Diagnostics go to stderr, one per line, in source order. Analysis
/// passes interleave class-level and body-level checks, so order by span
/// (stable, preserving insertion order within a line).
fn report(map: &SourceMap, diags: &[Diagnostic]) {
    let mut diags: Vec<&Diagnostic> = diags.iter().collect();
    diags.sort_by_key(|d| d.span.start);
    for d in diags {
        eprintln!("{}", map.render(d));
    }
}

fn run(args: &Args) -> Result<(), Error> {
    let mut map = SourceMap::new();
    for path in &args.files {
        let src = fs::read_to_string(path)?;
        map.push_file(path, &src);
    }

    let tokens = lex(map.source()).map_err(|diags| {
        report(&map, &diags);
        Error::Syntax
    })?;

    if args.tokens {
        for t in tokens.iter().filter(|t| t.kind != Tok::Eof) {
            let (path, line, col) = map.location(t.span.start);
            println!("{}:{line}:{col}: {}", path.display(), t.kind);
        }
        return Ok(());
    }

    let mut program = parse_program(&tokens).map_err(|diags| {
        report(&map, &diags);
        Error::Syntax
    })?;

    if args.ast {
        println!("{program:#?}");
        return Ok(());
    }

    let table = type_check_program(&mut program).map_err(|diags| {
        report(&map, &diags);
        Error::Semantics
    })?;

    if args.semantics {
        println!("{program:#?}");
        return Ok(());
    }
    if args.no_codegen {
        return Ok(());
    }

    let mut ir = lower(&program, &table).map_err(|diags| {
        report(&map, &diags);
        Error::Codegen
    })?;
    optimize(&mut ir);
    let asm = cool_codegen::emit_program(&ir, &table);

    let out = args
        .outfile
        .clone()
        .unwrap_or_else(|| default_outfile(&args.files[0]));
    fs::write(&out, asm)?;
    Ok(())
}

fn default_outfile(input: &Path) -> PathBuf {
    input.with_extension("s")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_output_swaps_the_extension() {
        assert_eq!(
            default_outfile(Path::new("examples/hello.cl")),
            PathBuf::from("examples/hello.s")
        );
    }

    #[test]
    fn exit_codes_match_the_documented_mapping() {
        assert_eq!(Error::Syntax.exit_code(), 1);
        assert_eq!(Error::Semantics.exit_code(), 2);
        assert_eq!(Error::Codegen.exit_code(), 4);
    }
}
