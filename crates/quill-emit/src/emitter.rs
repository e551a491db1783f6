//! The fluent emitter
//!
//! [`Emitter`] owns the symbol tables, the instruction stream and the region
//! stack of one routine and is the only thing that talks to the sink.

use crate::emit::{Emit, SymbolScope};
use crate::error::{EmitError, EmitResult, SymbolKind};
use crate::instruction::{Instruction, Pseudo};
use crate::metadata::TypeRef;
use crate::options::{EmitterOptions, HostMethods};
use crate::region::{RegionPhase, RegionStack};
use crate::sink::{BytecodeSink, Detached};
use crate::stream::InstructionStream;
use crate::symbols::{Label, LabelTable, Local, LocalTable};
use tracing::{debug, trace};

/// Symbolic assembler for one routine
///
/// Chained calls append to the stream in program order. A call that fails
/// validation appends nothing and leaves the symbol tables untouched.
#[derive(Debug)]
pub struct Emitter<S: BytecodeSink = Detached> {
    options: EmitterOptions,
    host: HostMethods,
    labels: LabelTable,
    locals: LocalTable,
    stream: InstructionStream,
    regions: RegionStack,
    scope_depth: usize,
    sink: S,
}

impl Emitter<Detached> {
    /// Emitter with no sink attached
    pub fn new() -> Self {
        Self::with_sink(Detached)
    }
}

impl Default for Emitter<Detached> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: BytecodeSink> Emitter<S> {
    /// Emitter mirroring every instruction into `sink`
    pub fn with_sink(sink: S) -> Self {
        Self {
            options: EmitterOptions::default(),
            host: HostMethods::default(),
            labels: LabelTable::new(),
            locals: LocalTable::new(),
            stream: InstructionStream::new(),
            regions: RegionStack::new(),
            scope_depth: 0,
            sink,
        }
    }

    pub fn with_options(mut self, options: EmitterOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_host_methods(mut self, host: HostMethods) -> Self {
        self.host = host;
        self
    }

    pub fn stream(&self) -> &InstructionStream {
        &self.stream
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Open lexical scopes
    pub fn scope_depth(&self) -> usize {
        self.scope_depth
    }

    /// Diagnostic listing of the stream
    pub fn render(&self) -> String {
        self.stream.render()
    }

    /// Take the stream and the sink apart
    pub fn into_parts(self) -> (InstructionStream, S) {
        (self.stream, self.sink)
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Check the operand shape and every symbol the instruction refers to
    fn validate(&self, instruction: &Instruction) -> EmitResult<()> {
        instruction.check_operand()?;
        match instruction {
            Instruction::Local(_, local) => self.locals.validate(local),
            Instruction::Label(_, label) => self.labels.validate(label),
            Instruction::Switch(_, labels) => labels
                .iter()
                .try_for_each(|label| self.labels.validate(label)),
            Instruction::Pseudo(pseudo) => match pseudo {
                Pseudo::DefineLabel(label) => self.labels.validate_next(label),
                Pseudo::DeclareLocal(local) => self.locals.validate_next(local),
                Pseudo::MarkLabel(label) | Pseudo::EndExceptionBlock { region: label, .. } => {
                    self.labels.validate_unmarked(label)
                }
                Pseudo::BeginExceptionBlock(label)
                | Pseudo::BeginCatch { region: label, .. }
                | Pseudo::BeginFinally { region: label }
                | Pseudo::BeginFault { region: label } => self.labels.validate(label),
                Pseudo::BeginScope
                | Pseudo::EndScope
                | Pseudo::CallVarargs { .. }
                | Pseudo::Calli(_) => Ok(()),
            },
            Instruction::Op(_) | Instruction::Immediate(..) | Instruction::Symbol(..) => Ok(()),
        }
    }

    fn mirror(&mut self, instruction: &Instruction) -> EmitResult<()> {
        match instruction {
            Instruction::Pseudo(Pseudo::DeclareLocal(local)) => {
                let slot = self.sink.declare_local(local).map_err(EmitError::sink)?;
                if !local.same_slot(&slot) {
                    return Err(EmitError::InvalidSymbol {
                        kind: SymbolKind::Local,
                        ordinal: local.ordinal(),
                        name: local.name().to_string(),
                        reason: "sink allocated a different slot",
                    });
                }
                Ok(())
            }
            other => self.sink.emit(other).map_err(EmitError::sink),
        }
    }

    /// Validate, mirror and append without the structural-marker guard
    fn push(&mut self, instruction: Instruction) -> EmitResult<usize> {
        self.validate(&instruction)?;
        self.mirror(&instruction)?;
        let offset = self.stream.offset();
        self.commit(&instruction, offset);
        trace!(offset, instruction = %instruction, "append");
        Ok(self.stream.append(instruction))
    }

    /// Record symbol state once the sink has accepted the instruction
    fn commit(&mut self, instruction: &Instruction, offset: usize) {
        if let Instruction::Pseudo(pseudo) = instruction {
            match pseudo {
                Pseudo::DefineLabel(label) => self.labels.insert(label.clone()),
                Pseudo::DeclareLocal(local) => self.locals.insert(local.clone()),
                Pseudo::MarkLabel(label) => self.labels.mark(label, offset),
                Pseudo::EndExceptionBlock { region, .. } => {
                    self.labels.mark(region, offset + pseudo.size())
                }
                _ => {}
            }
        }
    }
}

impl<S: BytecodeSink> SymbolScope for Emitter<S> {
    fn labels(&self) -> &LabelTable {
        &self.labels
    }

    fn locals(&self) -> &LocalTable {
        &self.locals
    }

    fn define_label(&mut self, name: Option<&str>) -> EmitResult<Label> {
        let label = self.labels.next(name, &self.options.label_prefix);
        self.push(Pseudo::DefineLabel(label.clone()).into())?;
        Ok(label)
    }

    fn declare_local(
        &mut self,
        value_type: TypeRef,
        pinned: bool,
        name: Option<&str>,
    ) -> EmitResult<Local> {
        let local = self
            .locals
            .next(value_type, pinned, name, &self.options.local_prefix)?;
        self.push(Pseudo::DeclareLocal(local.clone()).into())?;
        Ok(local)
    }
}

impl<S: BytecodeSink> Emit for Emitter<S> {
    fn options(&self) -> &EmitterOptions {
        &self.options
    }

    fn host(&self) -> &HostMethods {
        &self.host
    }

    fn regions(&self) -> &RegionStack {
        &self.regions
    }

    fn append(&mut self, instruction: Instruction) -> EmitResult<usize> {
        if let Instruction::Pseudo(pseudo) = &instruction {
            if pseudo.is_structural() {
                return Err(EmitError::sequence(
                    "append",
                    format!("`{pseudo}` must go through its region or scope transition"),
                ));
            }
        }
        self.push(instruction)
    }

    fn mark_label(&mut self, label: &Label) -> EmitResult<&mut Self> {
        let offset = self.push(Pseudo::MarkLabel(label.clone()).into())?;
        debug!(label = label.name(), offset, "label marked");
        Ok(self)
    }

    fn begin_exception_block(&mut self) -> EmitResult<Label> {
        let region = self.define_label(None)?;
        self.push(Pseudo::BeginExceptionBlock(region.clone()).into())?;
        self.regions.push(region.clone());
        debug!(region = region.name(), depth = self.regions.depth(), "exception block opened");
        Ok(region)
    }

    fn begin_catch_block(&mut self, exception_type: TypeRef) -> EmitResult<&mut Self> {
        let region = self.regions.check_catch()?.label().clone();
        debug!(region = region.name(), exception = exception_type.name(), "catch block");
        self.push(
            Pseudo::BeginCatch {
                region,
                exception_type,
            }
            .into(),
        )?;
        self.regions.enter(RegionPhase::Catch);
        Ok(self)
    }

    fn begin_finally_block(&mut self) -> EmitResult<&mut Self> {
        let region = self.regions.check_finally()?.label().clone();
        debug!(region = region.name(), "finally block");
        self.push(Pseudo::BeginFinally { region }.into())?;
        self.regions.enter(RegionPhase::Finally);
        Ok(self)
    }

    fn begin_fault_block(&mut self) -> EmitResult<&mut Self> {
        let region = self.regions.check_fault()?.label().clone();
        debug!(region = region.name(), "fault block");
        self.push(Pseudo::BeginFault { region }.into())?;
        self.regions.enter(RegionPhase::Fault);
        Ok(self)
    }

    fn end_exception_block(&mut self) -> EmitResult<&mut Self> {
        let current = self.regions.check_end()?;
        let region = current.label().clone();
        let handler = current
            .handler()
            .ok_or_else(|| EmitError::sequence("end exception block", "region has no handler"))?;
        self.push(Pseudo::EndExceptionBlock { region, handler }.into())?;
        if let Some(closed) = self.regions.close() {
            debug!(
                region = closed.label().name(),
                depth = self.regions.depth(),
                "exception block closed"
            );
        }
        Ok(self)
    }

    fn begin_scope(&mut self) -> EmitResult<&mut Self> {
        self.push(Pseudo::BeginScope.into())?;
        self.scope_depth += 1;
        Ok(self)
    }

    fn end_scope(&mut self) -> EmitResult<&mut Self> {
        if self.scope_depth == 0 {
            return Err(EmitError::sequence("end scope", "no scope is open"));
        }
        self.push(Pseudo::EndScope.into())?;
        self.scope_depth -= 1;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::TypeCode;
    use crate::ops::Operations;
    use crate::sink::{LocalDescriptor, Recorder};
    use quill_bytecode::OpCode;
    use std::fmt;

    fn int32() -> TypeRef {
        TypeRef::primitive(TypeCode::Int32)
    }

    #[test]
    fn test_define_label_appends_pseudo() {
        let mut e = Emitter::new();
        let label = e.define_label(Some("exit")).unwrap();
        assert_eq!(label.ordinal(), 0);
        assert_eq!(
            e.stream().lines()[0].instruction,
            Instruction::Pseudo(Pseudo::DefineLabel(label))
        );
    }

    #[test]
    fn test_auto_names_use_prefix() {
        let options = EmitterOptions {
            label_prefix: "L_".to_string(),
            local_prefix: "V_".to_string(),
            ..EmitterOptions::default()
        };
        let mut e = Emitter::new().with_options(options);
        e.define_label(None).unwrap();
        assert_eq!(e.define_label(None).unwrap().name(), "L_1");
        assert_eq!(e.declare_local(int32(), false, None).unwrap().name(), "V_0");
    }

    #[test]
    fn test_foreign_label_rejected() {
        let mut a = Emitter::new();
        let mut b = Emitter::new();
        a.define_label(Some("a0")).unwrap();
        let foreign = b.define_label(Some("b0")).unwrap();

        let before = a.stream().len();
        let err = a.br(&foreign).unwrap_err();
        assert!(err.is_invalid_symbol());
        assert_eq!(a.stream().len(), before);
    }

    #[test]
    fn test_double_mark_rejected() {
        let mut e = Emitter::new();
        let top = e.define_label(None).unwrap();
        e.mark_label(&top).unwrap();
        e.nop().unwrap();
        let err = e.mark_label(&top).unwrap_err();
        assert!(matches!(err, EmitError::LabelAlreadyMarked { offset: 0, .. }));
        assert_eq!(e.labels().position(&top), Some(0));
    }

    #[test]
    fn test_sink_mirrors_everything() {
        let mut e = Emitter::with_sink(Recorder::new());
        let x = e.declare_local(int32(), false, Some("x")).unwrap();
        e.ldc_i4(5).unwrap().stloc(&x).unwrap().ret().unwrap();
        let (stream, recorder) = e.into_parts();
        let streamed: Vec<_> = stream.iter().cloned().collect();
        assert_eq!(recorder.instructions(), streamed.as_slice());
    }

    #[derive(Debug)]
    struct Refusal;

    impl fmt::Display for Refusal {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("refused")
        }
    }

    impl std::error::Error for Refusal {}

    /// Accepts everything except `ret`, and hands out slots off by one
    #[derive(Debug)]
    struct Picky;

    impl BytecodeSink for Picky {
        type Error = Refusal;

        fn emit(&mut self, instruction: &Instruction) -> Result<(), Refusal> {
            match instruction.opcode() {
                Some(OpCode::Ret) => Err(Refusal),
                _ => Ok(()),
            }
        }

        fn declare_local(&mut self, local: &Local) -> Result<LocalDescriptor, Refusal> {
            Ok(LocalDescriptor {
                index: local.ordinal() + 1,
                value_type: local.value_type().clone(),
                pinned: local.is_pinned(),
            })
        }
    }

    #[test]
    fn test_sink_failure_leaves_stream_untouched() {
        let mut e = Emitter::with_sink(Picky);
        e.nop().unwrap();
        let err = e.ret().unwrap_err();
        assert!(matches!(err, EmitError::Sink(_)));
        assert_eq!(e.stream().len(), 1);
    }

    #[test]
    fn test_sink_slot_mismatch() {
        let mut e = Emitter::with_sink(Picky);
        let err = e.declare_local(int32(), false, None).unwrap_err();
        assert!(err.is_invalid_symbol());
        assert!(e.locals().is_empty());
    }

    #[test]
    fn test_scopes_balance() {
        let mut e = Emitter::new();
        assert!(e.end_scope().unwrap_err().is_sequencing());
        e.begin_scope().unwrap().begin_scope().unwrap();
        assert_eq!(e.scope_depth(), 2);
        e.end_scope().unwrap().end_scope().unwrap();
        assert_eq!(e.scope_depth(), 0);
    }

    #[test]
    fn test_end_marks_region_label() {
        let mut e = Emitter::new();
        let region = e.begin_exception_block().unwrap();
        e.nop().unwrap();
        e.begin_finally_block().unwrap();
        e.nop().unwrap();
        e.end_exception_block().unwrap();
        // nop, leave (5), nop, endfinally (1)
        assert_eq!(e.labels().position(&region), Some(8));
        assert!(e.regions().is_empty());
    }
}
