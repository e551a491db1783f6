//! In-memory method body encoder
//!
//! [`MethodBodySink`] turns the mirrored instruction stream into encoded
//! bytes, resolving label displacements and building the exception clause
//! table once the body is finished.

use crate::instruction::{HandlerKind, Immediate, Instruction, Pseudo};
use crate::metadata::CallSite;
use crate::sink::{BytecodeSink, LocalDescriptor};
use crate::symbols::{Label, Local};
use quill_bytecode::{BytecodeWriter, OpCode, OperandKind};
use rustc_hash::FxHashMap;
use std::sync::Arc;
use thiserror::Error;

/// Token table tag of interned user strings
pub const USER_STRING_TAG: u32 = 0x7000_0000;

/// Token table tag of interned stand-alone signatures
pub const SIGNATURE_TAG: u32 = 0x1100_0000;

/// Failures while encoding or resolving a method body
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BodyError {
    #[error("label `{0}` is branched to but never marked")]
    UnmarkedLabel(String),

    #[error("branch at offset {offset} to `{label}` needs displacement {displacement}, which does not fit its operand")]
    BranchOutOfRange {
        offset: usize,
        label: String,
        displacement: i64,
    },

    #[error("label `{0}` is marked twice")]
    DuplicateMark(String),

    #[error("{0} outside of an exception block")]
    NoOpenRegion(&'static str),

    #[error("{0} exception block(s) still open")]
    UnclosedRegions(usize),

    #[error("cannot encode `{0}`")]
    UnsupportedOperand(String),
}

/// Kind of handler an exception clause describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClauseKind {
    Catch { type_token: u32 },
    Finally,
    Fault,
}

/// One row of the exception handling table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExceptionClause {
    pub kind: ClauseKind,
    pub try_offset: u32,
    pub try_length: u32,
    pub handler_offset: u32,
    pub handler_length: u32,
}

/// Finished, fully resolved method body
#[derive(Debug, Clone, PartialEq)]
pub struct MethodBody {
    pub code: Vec<u8>,
    pub locals: Vec<LocalDescriptor>,
    pub clauses: Vec<ExceptionClause>,
    /// Interned user strings; token of entry `i` is `USER_STRING_TAG | (i + 1)`
    pub strings: Vec<Arc<str>>,
    /// Interned call-site signatures; token of entry `i` is `SIGNATURE_TAG | (i + 1)`
    pub signatures: Vec<CallSite>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FixupWidth {
    Short,
    Long,
}

/// Displacement waiting for its label to be marked
#[derive(Debug, Clone)]
struct Fixup {
    label: Label,
    /// Offset of the reserved displacement bytes
    patch_at: usize,
    /// Offset displacements are relative to (end of the instruction)
    base: usize,
    width: FixupWidth,
}

/// Handler currently being emitted inside an open region
#[derive(Debug, Clone, Copy)]
struct OpenHandler {
    kind: ClauseKind,
    start: usize,
}

#[derive(Debug, Clone)]
struct OpenRegion {
    try_start: usize,
    /// End of the protected block, fixed by the first handler
    try_end: Option<usize>,
    handler: Option<OpenHandler>,
}

/// Sink that encodes instructions into a byte buffer
#[derive(Debug, Default)]
pub struct MethodBodySink {
    writer: BytecodeWriter,
    marks: FxHashMap<usize, usize>,
    fixups: Vec<Fixup>,
    locals: Vec<LocalDescriptor>,
    regions: Vec<OpenRegion>,
    clauses: Vec<ExceptionClause>,
    strings: Vec<Arc<str>>,
    string_tokens: FxHashMap<Arc<str>, u32>,
    signatures: Vec<CallSite>,
    signature_tokens: FxHashMap<CallSite, u32>,
}

impl MethodBodySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes encoded so far, with unresolved displacements still zero
    pub fn code(&self) -> &[u8] {
        self.writer.buffer()
    }

    pub fn offset(&self) -> usize {
        self.writer.offset()
    }

    /// Intern a user string, returning its token
    pub fn intern_string(&mut self, value: &str) -> u32 {
        if let Some(&token) = self.string_tokens.get(value) {
            return token;
        }
        let text: Arc<str> = Arc::from(value);
        let token = USER_STRING_TAG | (self.strings.len() as u32 + 1);
        self.strings.push(text.clone());
        self.string_tokens.insert(text, token);
        token
    }

    /// Intern a stand-alone call-site signature, returning its token
    pub fn intern_signature(&mut self, site: &CallSite) -> u32 {
        if let Some(&token) = self.signature_tokens.get(site) {
            return token;
        }
        let token = SIGNATURE_TAG | (self.signatures.len() as u32 + 1);
        self.signatures.push(site.clone());
        self.signature_tokens.insert(site.clone(), token);
        token
    }

    fn branch_to(&mut self, label: &Label, width: FixupWidth) {
        let patch_at = match width {
            FixupWidth::Short => self.writer.reserve_i8(),
            FixupWidth::Long => self.writer.reserve_i32(),
        };
        self.fixups.push(Fixup {
            label: label.clone(),
            patch_at,
            base: self.writer.offset(),
            width,
        });
    }

    fn leave(&mut self, region: &Label) {
        self.writer.emit_opcode(OpCode::Leave);
        self.branch_to(region, FixupWidth::Long);
    }

    fn mark(&mut self, label: &Label) -> Result<(), BodyError> {
        let offset = self.writer.offset();
        if self.marks.insert(label.ordinal(), offset).is_some() {
            return Err(BodyError::DuplicateMark(label.name().to_string()));
        }
        Ok(())
    }

    fn local_operand(&mut self, opcode: OpCode, local: &Local) -> Result<(), BodyError> {
        let unsupported = || BodyError::UnsupportedOperand(format!("{opcode} {local}"));
        match opcode.operand_kind() {
            OperandKind::None => {}
            OperandKind::ShortVar => {
                let index = u8::try_from(local.ordinal()).map_err(|_| unsupported())?;
                self.writer.emit_u8(index);
            }
            OperandKind::Var => {
                let index = u16::try_from(local.ordinal()).map_err(|_| unsupported())?;
                self.writer.emit_u16(index);
            }
            _ => return Err(unsupported()),
        }
        Ok(())
    }

    fn immediate(&mut self, value: &Immediate) {
        match value {
            Immediate::U8(v) => self.writer.emit_u8(*v),
            Immediate::I8(v) => self.writer.emit_i8(*v),
            Immediate::U16(v) => self.writer.emit_u16(*v),
            Immediate::I32(v) => self.writer.emit_i32(*v),
            Immediate::I64(v) => self.writer.emit_i64(*v),
            Immediate::F32(v) => self.writer.emit_f32(*v),
            Immediate::F64(v) => self.writer.emit_f64(*v),
            Immediate::Text(text) => {
                let token = self.intern_string(text);
                self.writer.emit_u32(token);
            }
        }
    }

    fn open_region(&mut self, action: &'static str) -> Result<&mut OpenRegion, BodyError> {
        self.regions
            .last_mut()
            .ok_or(BodyError::NoOpenRegion(action))
    }

    /// Close the running block (try or handler) at the current offset
    fn close_block(&mut self, action: &'static str) -> Result<(), BodyError> {
        let here = self.writer.offset();
        let region = self.open_region(action)?;
        match region.handler.take() {
            None => region.try_end = Some(here),
            Some(handler) => {
                let try_start = region.try_start;
                let try_end = region.try_end.unwrap_or(here);
                self.clauses.push(ExceptionClause {
                    kind: handler.kind,
                    try_offset: try_start as u32,
                    try_length: (try_end - try_start) as u32,
                    handler_offset: handler.start as u32,
                    handler_length: (here - handler.start) as u32,
                });
            }
        }
        Ok(())
    }

    fn begin_handler(
        &mut self,
        region: &Label,
        kind: ClauseKind,
        action: &'static str,
    ) -> Result<(), BodyError> {
        self.open_region(action)?;
        self.leave(region);
        self.close_block(action)?;
        let here = self.writer.offset();
        let open = self.open_region(action)?;
        // A finally or fault after catches protects the catches too
        if !matches!(kind, ClauseKind::Catch { .. }) {
            open.try_end = Some(here);
        }
        open.handler = Some(OpenHandler { kind, start: here });
        Ok(())
    }

    fn pseudo(&mut self, pseudo: &Pseudo) -> Result<(), BodyError> {
        match pseudo {
            Pseudo::BeginExceptionBlock(_) => {
                self.regions.push(OpenRegion {
                    try_start: self.writer.offset(),
                    try_end: None,
                    handler: None,
                });
            }
            Pseudo::BeginCatch {
                region,
                exception_type,
            } => {
                let kind = ClauseKind::Catch {
                    type_token: exception_type.token(),
                };
                self.begin_handler(region, kind, "catch")?;
            }
            Pseudo::BeginFinally { region } => {
                self.begin_handler(region, ClauseKind::Finally, "finally")?;
            }
            Pseudo::BeginFault { region } => {
                self.begin_handler(region, ClauseKind::Fault, "fault")?;
            }
            Pseudo::EndExceptionBlock { region, handler } => {
                self.open_region("end of exception block")?;
                match handler {
                    HandlerKind::Catch => self.leave(region),
                    HandlerKind::Finally | HandlerKind::Fault => {
                        self.writer.emit_opcode(OpCode::Endfinally)
                    }
                }
                self.close_block("end of exception block")?;
                self.regions.pop();
                self.mark(region)?;
            }
            Pseudo::MarkLabel(label) => self.mark(label)?,
            Pseudo::DeclareLocal(local) => {
                if self.locals.len() == local.ordinal() {
                    self.locals.push(LocalDescriptor::from(local));
                }
            }
            Pseudo::CallVarargs { method, .. } => {
                self.writer.emit_opcode(OpCode::Call);
                self.writer.emit_u32(method.token());
            }
            Pseudo::Calli(site) => {
                let token = self.intern_signature(site);
                self.writer.emit_opcode(OpCode::Calli);
                self.writer.emit_u32(token);
            }
            Pseudo::BeginScope | Pseudo::EndScope | Pseudo::DefineLabel(_) => {}
        }
        Ok(())
    }

    /// Resolve every displacement and hand out the encoded body
    pub fn finish(mut self) -> Result<MethodBody, BodyError> {
        if !self.regions.is_empty() {
            return Err(BodyError::UnclosedRegions(self.regions.len()));
        }

        for fixup in &self.fixups {
            let target = self
                .marks
                .get(&fixup.label.ordinal())
                .copied()
                .ok_or_else(|| BodyError::UnmarkedLabel(fixup.label.name().to_string()))?;
            let displacement = target as i64 - fixup.base as i64;
            let out_of_range = || BodyError::BranchOutOfRange {
                offset: fixup.patch_at,
                label: fixup.label.name().to_string(),
                displacement,
            };
            match fixup.width {
                FixupWidth::Short => {
                    let value = i8::try_from(displacement).map_err(|_| out_of_range())?;
                    self.writer.patch_i8(fixup.patch_at, value);
                }
                FixupWidth::Long => {
                    let value = i32::try_from(displacement).map_err(|_| out_of_range())?;
                    self.writer.patch_i32(fixup.patch_at, value);
                }
            }
        }

        tracing::debug!(
            code_size = self.writer.offset(),
            fixups = self.fixups.len(),
            clauses = self.clauses.len(),
            "method body finished"
        );

        Ok(MethodBody {
            code: self.writer.into_bytes(),
            locals: self.locals,
            clauses: self.clauses,
            strings: self.strings,
            signatures: self.signatures,
        })
    }
}

impl BytecodeSink for MethodBodySink {
    type Error = BodyError;

    fn emit(&mut self, instruction: &Instruction) -> Result<(), BodyError> {
        match instruction {
            Instruction::Op(opcode) => self.writer.emit_opcode(*opcode),
            Instruction::Immediate(opcode, value) => {
                self.writer.emit_opcode(*opcode);
                self.immediate(value);
            }
            Instruction::Local(opcode, local) => {
                self.writer.emit_opcode(*opcode);
                self.local_operand(*opcode, local)?;
            }
            Instruction::Label(opcode, label) => {
                self.writer.emit_opcode(*opcode);
                let width = match opcode.operand_kind() {
                    OperandKind::ShortBrTarget => FixupWidth::Short,
                    _ => FixupWidth::Long,
                };
                self.branch_to(label, width);
            }
            Instruction::Switch(opcode, labels) => {
                self.writer.emit_opcode(*opcode);
                self.writer.emit_u32(labels.len() as u32);
                let slots: Vec<usize> = labels.iter().map(|_| self.writer.reserve_i32()).collect();
                let base = self.writer.offset();
                self.fixups
                    .extend(labels.iter().zip(slots).map(|(label, patch_at)| Fixup {
                        label: label.clone(),
                        patch_at,
                        base,
                        width: FixupWidth::Long,
                    }));
            }
            Instruction::Symbol(opcode, symbol) => {
                self.writer.emit_opcode(*opcode);
                self.writer.emit_u32(symbol.token());
            }
            Instruction::Pseudo(pseudo) => self.pseudo(pseudo)?,
        }
        Ok(())
    }

    fn declare_local(&mut self, local: &Local) -> Result<LocalDescriptor, BodyError> {
        let descriptor = LocalDescriptor {
            index: self.locals.len(),
            value_type: local.value_type().clone(),
            pinned: local.is_pinned(),
        };
        self.locals.push(descriptor.clone());
        Ok(descriptor)
    }
}
