//! Capability traits composed by [`Emitter`](crate::Emitter)
//!
//! - [`SymbolScope`]: label and local tables
//! - [`Emit`]: raw instruction appends, label marks, scopes and region transitions
//! - [`Operations`](crate::Operations): the named operation surface, provided
//!   for every `Emit` implementor

use crate::error::EmitResult;
use crate::instruction::{Instruction, Operand};
use crate::metadata::TypeRef;
use crate::options::{EmitterOptions, HostMethods};
use crate::region::RegionStack;
use crate::symbols::{Label, LabelTable, Local, LocalTable};
use quill_bytecode::OpCode;

/// Owner of the label and local tables of one routine
pub trait SymbolScope {
    fn labels(&self) -> &LabelTable;

    fn locals(&self) -> &LocalTable;

    /// Define a new label; `None` derives the name from its ordinal
    fn define_label(&mut self, name: Option<&str>) -> EmitResult<Label>;

    /// Declare a new local slot; `None` derives the name from its ordinal
    fn declare_local(
        &mut self,
        value_type: TypeRef,
        pinned: bool,
        name: Option<&str>,
    ) -> EmitResult<Local>;
}

/// Raw emission into an instruction stream
pub trait Emit: SymbolScope + Sized {
    fn options(&self) -> &EmitterOptions;

    fn host(&self) -> &HostMethods;

    fn regions(&self) -> &RegionStack;

    /// Validate, mirror to the sink and append one instruction.
    ///
    /// Returns the offset of the appended line. On error nothing is appended.
    /// Region and scope markers are refused here; use the transition methods.
    fn append(&mut self, instruction: Instruction) -> EmitResult<usize>;

    /// Fix `label` at the current offset
    fn mark_label(&mut self, label: &Label) -> EmitResult<&mut Self>;

    /// Open a protected region, returning its end-of-region label
    fn begin_exception_block(&mut self) -> EmitResult<Label>;

    fn begin_catch_block(&mut self, exception_type: TypeRef) -> EmitResult<&mut Self>;

    fn begin_finally_block(&mut self) -> EmitResult<&mut Self>;

    fn begin_fault_block(&mut self) -> EmitResult<&mut Self>;

    /// Close the innermost region and mark its label
    fn end_exception_block(&mut self) -> EmitResult<&mut Self>;

    fn begin_scope(&mut self) -> EmitResult<&mut Self>;

    fn end_scope(&mut self) -> EmitResult<&mut Self>;

    fn emit(&mut self, instruction: Instruction) -> EmitResult<&mut Self> {
        self.append(instruction)?;
        Ok(self)
    }

    /// Emit an opcode that takes no operand
    fn emit_op(&mut self, opcode: OpCode) -> EmitResult<&mut Self> {
        self.emit(Instruction::new(opcode, Operand::None)?)
    }

    /// Emit an opcode with an operand, checked against the opcode's operand kind
    fn emit_with(&mut self, opcode: OpCode, operand: impl Into<Operand>) -> EmitResult<&mut Self> {
        self.emit(Instruction::new(opcode, operand)?)
    }
}
