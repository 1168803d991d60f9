// Copyright 2025 Diivanand Ramalingam
// Licensed under the Apache License, Version 2.0

//! Source spans, multi-file source mapping, and diagnostics.
//!
//! Every stage reports problems as [`Diagnostic`] values carrying a byte
//! span into the combined source buffer, a stable code, and a message. The
//! sink is append-only so diagnostics come out in source order.

use std::fmt;
use std::path::{Path, PathBuf};

/// Byte span into the combined source buffer.
pub type Span = chumsky::span::SimpleSpan<usize>;

/// A single compiler diagnostic with a stable code.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub code: &'static str,
    pub message: String,
    pub span: Span,
}

impl Diagnostic {
    pub fn new(code: &'static str, message: impl Into<String>, span: Span) -> Self {
        Self {
            code,
            message: message.into(),
            span,
        }
    }
}

struct SourceFile {
    path: PathBuf,
    start: usize,
    /// Byte offsets (into the combined buffer) of every line start.
    line_starts: Vec<usize>,
}

/// Concatenates input files into one buffer while keeping enough structure
/// to attribute a byte offset back to `<path>:<line>:<col>`.
#[derive(Default)]
pub struct SourceMap {
    files: Vec<SourceFile>,
    source: String,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// A map over a single in-memory source, for tests and dumps.
    pub fn single(path: impl AsRef<Path>, src: &str) -> Self {
        let mut map = Self::new();
        map.push_file(path, src);
        map
    }

    /// Appends a file to the combined buffer. Files are separated by a
    /// newline so tokens can never glue across file boundaries.
    pub fn push_file(&mut self, path: impl AsRef<Path>, src: &str) {
        if !self.source.is_empty() && !self.source.ends_with('\n') {
            self.source.push('\n');
        }
        let start = self.source.len();
        let mut line_starts = vec![start];
        for (i, b) in src.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(start + i + 1);
            }
        }
        self.source.push_str(src);
        self.files.push(SourceFile {
            path: path.as_ref().to_path_buf(),
            start,
            line_starts,
        });
    }

    /// The combined source buffer that spans index into.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Resolves a byte offset to `(path, line, col)`, both 1-based.
    pub fn location(&self, offset: usize) -> (&Path, usize, usize) {
        let file = match self
            .files
            .binary_search_by(|f| f.start.cmp(&offset))
        {
            Ok(i) => &self.files[i],
            Err(0) => &self.files[0],
            Err(i) => &self.files[i - 1],
        };
        let line = match file.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let col = offset - file.line_starts[line] + 1;
        (&file.path, line + 1, col)
    }

    /// Renders a diagnostic as `<path>:<line>:<col>: <code>: <message>`.
    pub fn render(&self, diag: &Diagnostic) -> String {
        let (path, line, col) = self.location(diag.span.start);
        format!(
            "{}:{}:{}: {}: {}",
            path.display(),
            line,
            col,
            diag.code,
            diag.message
        )
    }
}

impl fmt::Debug for SourceMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceMap")
            .field("files", &self.files.len())
            .field("bytes", &self.source.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locates_offsets_within_a_single_file() {
        let map = SourceMap::single("main.cl", "class Main {\n  x : Int;\n};\n");
        let (path, line, col) = map.location(0);
        assert_eq!(path, Path::new("main.cl"));
        assert_eq!((line, col), (1, 1));

        // "x" on line 2, column 3.
        let off = map.source().find('x').unwrap();
        let (_, line, col) = map.location(off);
        assert_eq!((line, col), (2, 3));
    }

    #[test]
    fn attributes_offsets_to_the_right_file() {
        let mut map = SourceMap::new();
        map.push_file("a.cl", "class A { };\n");
        map.push_file("b.cl", "class B { };\n");

        let off = map.source().find("class B").unwrap();
        let (path, line, col) = map.location(off);
        assert_eq!(path, Path::new("b.cl"));
        assert_eq!((line, col), (1, 1));
    }

    #[test]
    fn renders_in_the_documented_format() {
        let map = SourceMap::single("m.cl", "class main { };\n");
        let d = Diagnostic::new("S001", "class names must start uppercase", (6..10).into());
        assert_eq!(map.render(&d), "m.cl:1:7: S001: class names must start uppercase");
    }
}
