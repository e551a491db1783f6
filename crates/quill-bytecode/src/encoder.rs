//! Bytecode encoding and decoding utilities
//!
//! This module provides tools for encoding and decoding Quill bytecode instructions.
//! All multi-byte values are little-endian.

use crate::opcode::{OpCode, OperandKind, EXTENDED_PREFIX};
use thiserror::Error;

/// Errors that can occur during bytecode decoding
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// Unexpected end of bytecode stream
    #[error("Unexpected end of bytecode at offset {0}")]
    UnexpectedEnd(usize),

    /// Invalid opcode
    #[error("Invalid opcode {0:#06x} at offset {1}")]
    InvalidOpcode(u16, usize),
}

/// Bytecode writer for encoding instructions
///
/// Provides methods for emitting opcodes and their operands into a binary buffer.
#[derive(Debug, Default, Clone)]
pub struct BytecodeWriter {
    buffer: Vec<u8>,
}

impl BytecodeWriter {
    /// Create a new bytecode writer
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Create a new bytecode writer with capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Get the current bytecode buffer
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Consume the writer and return the bytecode buffer
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Get the current offset (length of bytecode)
    pub fn offset(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    // ===== Basic Emission =====

    /// Emit a raw byte
    pub fn emit_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Emit a signed byte
    pub fn emit_i8(&mut self, value: i8) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 16-bit unsigned integer
    pub fn emit_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 32-bit unsigned integer
    pub fn emit_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 32-bit signed integer
    pub fn emit_i32(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 64-bit signed integer
    pub fn emit_i64(&mut self, value: i64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 32-bit float
    pub fn emit_f32(&mut self, value: f32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 64-bit float
    pub fn emit_f64(&mut self, value: f64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit an opcode (one or two bytes)
    pub fn emit_opcode(&mut self, opcode: OpCode) {
        let (bytes, len) = opcode.encode();
        self.buffer.extend_from_slice(&bytes[..len]);
    }

    // ===== Patching (for forward jumps) =====

    /// Reserve space for an i8 value (returns offset for later patching)
    pub fn reserve_i8(&mut self) -> usize {
        let offset = self.offset();
        self.emit_i8(0);
        offset
    }

    /// Reserve space for an i32 value (returns offset for later patching)
    pub fn reserve_i32(&mut self) -> usize {
        let offset = self.offset();
        self.emit_i32(0);
        offset
    }

    /// Patch a previously reserved i8 value at the given offset
    pub fn patch_i8(&mut self, offset: usize, value: i8) {
        self.buffer[offset] = value.to_le_bytes()[0];
    }

    /// Patch a previously reserved i32 value at the given offset
    pub fn patch_i32(&mut self, offset: usize, value: i32) {
        self.buffer[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }
}

/// Inline operand as it was read from the stream
#[derive(Debug, Clone, PartialEq)]
pub enum RawOperand {
    /// No operand
    None,
    /// Unsigned 8-bit value (short variable index, alignment)
    U8(u8),
    /// Unsigned 16-bit variable index
    U16(u16),
    /// Signed 8-bit immediate
    I8(i8),
    /// Signed 32-bit immediate
    I32(i32),
    /// Signed 64-bit immediate
    I64(i64),
    /// 32-bit float
    F32(f32),
    /// 64-bit float
    F64(f64),
    /// Branch target as an absolute offset
    Target(usize),
    /// Switch targets as absolute offsets
    Targets(Vec<usize>),
    /// Metadata token
    Token(u32),
}

/// One instruction decoded from a byte buffer
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedInstruction {
    /// Offset of the first opcode byte
    pub offset: usize,
    /// Decoded opcode
    pub opcode: OpCode,
    /// Decoded operand
    pub operand: RawOperand,
}

/// Bytecode reader for decoding instructions
///
/// Provides methods for reading opcodes and their operands from a binary buffer.
pub struct BytecodeReader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> BytecodeReader<'a> {
    /// Create a new bytecode reader
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            position: 0,
        }
    }

    /// Get the current position in the buffer
    pub fn position(&self) -> usize {
        self.position
    }

    /// Get the remaining bytes in the buffer
    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.position)
    }

    /// Check if there are more bytes to read
    pub fn has_more(&self) -> bool {
        self.position < self.buffer.len()
    }

    /// Seek to a specific position
    pub fn seek(&mut self, position: usize) {
        self.position = position;
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let end = self.position + N;
        let slice = self
            .buffer
            .get(self.position..end)
            .ok_or(DecodeError::UnexpectedEnd(self.position))?;
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(slice);
        self.position = end;
        Ok(bytes)
    }

    // ===== Basic Reading =====

    /// Read a single byte
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take::<1>()?[0])
    }

    /// Read a signed byte
    pub fn read_i8(&mut self) -> Result<i8, DecodeError> {
        Ok(i8::from_le_bytes(self.take()?))
    }

    /// Read a 16-bit unsigned integer
    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_le_bytes(self.take()?))
    }

    /// Read a 32-bit unsigned integer
    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    /// Read a 32-bit signed integer
    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_le_bytes(self.take()?))
    }

    /// Read a 64-bit signed integer
    pub fn read_i64(&mut self) -> Result<i64, DecodeError> {
        Ok(i64::from_le_bytes(self.take()?))
    }

    /// Read a 32-bit float
    pub fn read_f32(&mut self) -> Result<f32, DecodeError> {
        Ok(f32::from_le_bytes(self.take()?))
    }

    /// Read a 64-bit float
    pub fn read_f64(&mut self) -> Result<f64, DecodeError> {
        Ok(f64::from_le_bytes(self.take()?))
    }

    /// Read an opcode, following the `0xFE` prefix when present
    pub fn read_opcode(&mut self) -> Result<OpCode, DecodeError> {
        let start = self.position;
        let first = self.read_u8()?;
        let value = if first == EXTENDED_PREFIX {
            0xFE00 | u16::from(self.read_u8()?)
        } else {
            u16::from(first)
        };
        OpCode::from_value(value).ok_or(DecodeError::InvalidOpcode(value, start))
    }

    /// Read one opcode and its operand
    ///
    /// Branch displacements are resolved to absolute offsets relative to the
    /// end of the instruction.
    pub fn read_instruction(&mut self) -> Result<DecodedInstruction, DecodeError> {
        let offset = self.position;
        let opcode = self.read_opcode()?;
        let operand = match opcode.operand_kind() {
            OperandKind::None => RawOperand::None,
            OperandKind::ShortVar => RawOperand::U8(self.read_u8()?),
            OperandKind::Var => RawOperand::U16(self.read_u16()?),
            OperandKind::ShortI if opcode == OpCode::LdcI4S => RawOperand::I8(self.read_i8()?),
            OperandKind::ShortI => RawOperand::U8(self.read_u8()?),
            OperandKind::I => RawOperand::I32(self.read_i32()?),
            OperandKind::I8 => RawOperand::I64(self.read_i64()?),
            OperandKind::ShortR => RawOperand::F32(self.read_f32()?),
            OperandKind::R => RawOperand::F64(self.read_f64()?),
            OperandKind::ShortBrTarget => {
                let delta = self.read_i8()?;
                RawOperand::Target(relative_target(self.position, i32::from(delta)))
            }
            OperandKind::BrTarget => {
                let delta = self.read_i32()?;
                RawOperand::Target(relative_target(self.position, delta))
            }
            OperandKind::Switch => {
                let count = self.read_u32()? as usize;
                let mut deltas = Vec::with_capacity(count.min(self.remaining() / 4));
                for _ in 0..count {
                    deltas.push(self.read_i32()?);
                }
                let base = self.position;
                RawOperand::Targets(
                    deltas
                        .into_iter()
                        .map(|delta| relative_target(base, delta))
                        .collect(),
                )
            }
            OperandKind::Field
            | OperandKind::Method
            | OperandKind::Type
            | OperandKind::Tok
            | OperandKind::String
            | OperandKind::Sig => RawOperand::Token(self.read_u32()?),
        };
        Ok(DecodedInstruction {
            offset,
            opcode,
            operand,
        })
    }
}

fn relative_target(base: usize, delta: i32) -> usize {
    (base as i64 + i64::from(delta)).max(0) as usize
}

/// Decode a whole method body
pub fn disassemble(code: &[u8]) -> Result<Vec<DecodedInstruction>, DecodeError> {
    let mut reader = BytecodeReader::new(code);
    let mut instructions = Vec::new();
    while reader.has_more() {
        instructions.push(reader.read_instruction()?);
    }
    Ok(instructions)
}
