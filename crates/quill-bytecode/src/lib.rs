//! Quill Bytecode Definitions
//!
//! This crate provides the stack-machine instruction set (one-byte and
//! `0xFE`-prefixed two-byte opcodes), operand metadata, and little-endian
//! byte encoding/decoding used by the Quill assembler.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod encoder;
pub mod opcode;

pub use encoder::{disassemble, BytecodeReader, BytecodeWriter, DecodeError, DecodedInstruction, RawOperand};
pub use opcode::{FlowControl, OpCode, OperandKind};
