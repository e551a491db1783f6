//! Quill Emit
//!
//! A fluent, symbolic assembler for Quill stack-machine bytecode. Callers
//! chain named operations on an [`Emitter`]; each call picks the narrowest
//! valid opcode form, appends it to an [`InstructionStream`] and mirrors it
//! into an optional [`BytecodeSink`].
//!
//! # Example
//!
//! ```ignore
//! use quill_emit::{Emitter, NumericMode, Operations, SymbolScope};
//!
//! let mut e = Emitter::new();
//! let done = e.define_label(Some("done"))?;
//! e.ldarg(0)?.ldarg(1)?.add(NumericMode::CHECKED)?;
//! e.dup()?.brtrue(&done)?.pop()?.ldc_i4(-1)?;
//! e.mark_label(&done)?.ret()?;
//! println!("{}", e.render());
//! ```

#![warn(rust_2018_idioms)]

mod macros;

pub mod body;
pub mod emit;
pub mod emitter;
pub mod encode;
pub mod error;
pub mod instruction;
pub mod metadata;
pub mod ops;
pub mod options;
pub mod region;
pub mod sink;
pub mod stream;
pub mod symbols;

pub use body::{BodyError, ClauseKind, ExceptionClause, MethodBody, MethodBodySink};
pub use emit::{Emit, SymbolScope};
pub use emitter::Emitter;
pub use encode::{Comparison, Condition, NumericMode};
pub use error::{EmitError, EmitResult, SymbolKind};
pub use instruction::{HandlerKind, Immediate, Instruction, Operand, Pseudo};
pub use metadata::{
    CallConvention, CallSite, ConstructorRef, FieldRef, FieldScope, MethodRef, Symbol, TypeCode,
    TypeRef, UnmanagedConvention,
};
pub use ops::Operations;
pub use options::{BranchEncoding, EmitterOptions, HostMethods};
pub use region::{Region, RegionPhase, RegionStack, TryBlock};
pub use sink::{BytecodeSink, Detached, LocalDescriptor, Recorder};
pub use stream::{InstructionLine, InstructionStream};
pub use symbols::{Label, LabelTable, Local, LocalSlot, LocalTable};

pub use quill_bytecode::{OpCode, OperandKind};
