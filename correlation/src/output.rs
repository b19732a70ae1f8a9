//! Compiled output: chunks of text optionally attributed to a source line.

use std::fmt;

use serde::Serialize;

use crate::path::normalize_path;

/// A source line attribution as reported by the compilation service.
///
/// The file path is normalized at construction so two locations compare equal
/// whenever they name the same physical line, however the path was spelled.
/// Lines are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
}

impl SourceLocation {
    pub fn new(file: &str, line: u32) -> Self {
        Self {
            file: normalize_path(file),
            line,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// One fragment of compiler output. `text` is absent for padding entries the
/// service sometimes emits; `source` is absent for unattributed text such as
/// assembler directives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledChunk {
    pub text: Option<String>,
    pub source: Option<SourceLocation>,
}

impl CompiledChunk {
    pub fn new(text: impl Into<String>, source: Option<SourceLocation>) -> Self {
        Self {
            text: Some(text.into()),
            source,
        }
    }
}

/// The result of one remote compilation: exit code plus the three output
/// streams, each an ordered chunk sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledText {
    pub code: i32,
    pub stdout: Vec<CompiledChunk>,
    pub stderr: Vec<CompiledChunk>,
    pub asm: Vec<CompiledChunk>,
}

impl CompiledText {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// The stderr stream flattened to one string, non-null chunks joined with
    /// newlines. This is what a failed compilation surfaces to the user.
    pub fn stderr_text(&self) -> String {
        join_chunks(&self.stderr)
    }

    pub fn stdout_text(&self) -> String {
        join_chunks(&self.stdout)
    }
}

fn join_chunks(chunks: &[CompiledChunk]) -> String {
    chunks
        .iter()
        .filter_map(|c| c.text.as_deref())
        .collect::<Vec<_>>()
        .join("\n")
}
