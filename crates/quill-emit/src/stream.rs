//! Append-only instruction stream with byte-offset bookkeeping

use crate::instruction::Instruction;
use std::fmt::{self, Write};

/// One appended instruction and the offset it starts at
#[derive(Debug, Clone, PartialEq)]
pub struct InstructionLine {
    pub offset: usize,
    pub instruction: Instruction,
}

/// Ordered record of everything emitted so far
#[derive(Debug, Clone, Default)]
pub struct InstructionStream {
    lines: Vec<InstructionLine>,
    offset: usize,
}

impl InstructionStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an instruction, returning the offset of the new line
    pub fn append(&mut self, instruction: Instruction) -> usize {
        let offset = self.offset;
        self.offset += instruction.size();
        self.lines.push(InstructionLine {
            offset,
            instruction,
        });
        offset
    }

    pub fn lines(&self) -> &[InstructionLine] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Offset the next appended instruction will get
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instruction> {
        self.lines.iter().map(|line| &line.instruction)
    }

    /// Structural equality that ignores auto-derived and user display names
    pub fn is_equivalent(&self, other: &InstructionStream) -> bool {
        self.lines.len() == other.lines.len()
            && self.lines.iter().zip(&other.lines).all(|(a, b)| {
                a.offset == b.offset && a.instruction.anonymized() == b.instruction.anonymized()
            })
    }

    /// Human-readable listing, one line per instruction plus a trailing
    /// marker for the current offset
    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            // Writing to a String cannot fail
            let _ = writeln!(out, "IL_{:04x}: {}", line.offset, line.instruction);
        }
        let _ = writeln!(out, "IL_{:04x}:", self.offset);
        out
    }
}

impl fmt::Display for InstructionStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl<'a> IntoIterator for &'a InstructionStream {
    type Item = &'a InstructionLine;
    type IntoIter = std::slice::Iter<'a, InstructionLine>;

    fn into_iter(self) -> Self::IntoIter {
        self.lines.iter()
    }
}
