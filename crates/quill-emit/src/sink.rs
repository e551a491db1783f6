//! Bytecode sinks
//!
//! A sink receives every instruction the emitter appends, synchronously and
//! in order. It is the only place where instructions turn into something the
//! host can load.

use crate::instruction::{Instruction, Pseudo};
use crate::metadata::TypeRef;
use crate::symbols::{Local, LocalSlot};
use std::convert::Infallible;

/// The sink's own description of a declared local
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalDescriptor {
    pub index: usize,
    pub value_type: TypeRef,
    pub pinned: bool,
}

impl From<&Local> for LocalDescriptor {
    fn from(local: &Local) -> Self {
        Self {
            index: local.ordinal(),
            value_type: local.value_type().clone(),
            pinned: local.is_pinned(),
        }
    }
}

impl LocalSlot for LocalDescriptor {
    fn slot_ordinal(&self) -> usize {
        self.index
    }

    fn slot_type(&self) -> &TypeRef {
        &self.value_type
    }

    fn slot_pinned(&self) -> bool {
        self.pinned
    }
}

/// Consumer of the emitted instruction stream
pub trait BytecodeSink {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Receive one appended instruction
    fn emit(&mut self, instruction: &Instruction) -> Result<(), Self::Error>;

    /// Allocate a slot for `local`.
    ///
    /// Called instead of [`emit`](Self::emit) for local declarations. The
    /// emitter checks that the returned slot matches the local it declared.
    fn declare_local(&mut self, local: &Local) -> Result<LocalDescriptor, Self::Error> {
        Ok(LocalDescriptor::from(local))
    }
}

impl<S: BytecodeSink + ?Sized> BytecodeSink for &mut S {
    type Error = S::Error;

    fn emit(&mut self, instruction: &Instruction) -> Result<(), Self::Error> {
        (**self).emit(instruction)
    }

    fn declare_local(&mut self, local: &Local) -> Result<LocalDescriptor, Self::Error> {
        (**self).declare_local(local)
    }
}

/// No sink attached; the emitter only models the stream
#[derive(Debug, Clone, Copy, Default)]
pub struct Detached;

impl BytecodeSink for Detached {
    type Error = Infallible;

    fn emit(&mut self, _instruction: &Instruction) -> Result<(), Infallible> {
        Ok(())
    }
}

/// Keeps a copy of everything mirrored to it
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    instructions: Vec<Instruction>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn into_instructions(self) -> Vec<Instruction> {
        self.instructions
    }
}

impl BytecodeSink for Recorder {
    type Error = Infallible;

    fn emit(&mut self, instruction: &Instruction) -> Result<(), Infallible> {
        self.instructions.push(instruction.clone());
        Ok(())
    }

    fn declare_local(&mut self, local: &Local) -> Result<LocalDescriptor, Infallible> {
        self.instructions
            .push(Instruction::Pseudo(Pseudo::DeclareLocal(local.clone())));
        Ok(LocalDescriptor::from(local))
    }
}
