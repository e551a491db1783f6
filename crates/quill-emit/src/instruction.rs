//! Instruction model
//!
//! An [`Instruction`] is one opcode plus its optional operand, or a
//! [`Pseudo`] operation that structures the stream (regions, scopes, symbol
//! declarations, signature-carrying calls). Every instruction knows its own
//! encoded size so the stream can keep byte offsets without encoding.

use crate::error::{EmitError, EmitResult};
use crate::metadata::{CallSite, ConstructorRef, FieldRef, MethodRef, Symbol, TypeRef};
use crate::symbols::{Label, Local, SHORT_LOCAL_ORDINAL};
use quill_bytecode::{OpCode, OperandKind};
use std::fmt;
use std::sync::Arc;

/// Inline immediate value
#[derive(Debug, Clone, PartialEq)]
pub enum Immediate {
    U8(u8),
    I8(i8),
    /// Two-byte argument index
    U16(u16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    /// User string, encoded as a string token
    Text(Arc<str>),
}

impl Immediate {
    fn kind_name(&self) -> &'static str {
        match self {
            Self::U8(_) => "u8 immediate",
            Self::I8(_) => "i8 immediate",
            Self::U16(_) => "u16 immediate",
            Self::I32(_) => "i32 immediate",
            Self::I64(_) => "i64 immediate",
            Self::F32(_) => "f32 immediate",
            Self::F64(_) => "f64 immediate",
            Self::Text(_) => "string",
        }
    }

    fn fits(&self, kind: OperandKind) -> bool {
        matches!(
            (kind, self),
            (OperandKind::ShortVar, Self::U8(_))
                | (OperandKind::Var, Self::U16(_))
                | (OperandKind::ShortI, Self::I8(_) | Self::U8(_))
                | (OperandKind::I, Self::I32(_))
                | (OperandKind::I8, Self::I64(_))
                | (OperandKind::ShortR, Self::F32(_))
                | (OperandKind::R, Self::F64(_))
                | (OperandKind::String, Self::Text(_))
        )
    }
}

impl fmt::Display for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::U8(v) => write!(f, "{v}"),
            Self::I8(v) => write!(f, "{v}"),
            Self::U16(v) => write!(f, "{v}"),
            Self::I32(v) => write!(f, "{v}"),
            Self::I64(v) => write!(f, "{v}"),
            Self::F32(v) => write!(f, "{v:?}"),
            Self::F64(v) => write!(f, "{v:?}"),
            Self::Text(s) => write!(f, "{s:?}"),
        }
    }
}

/// Handler a region is closed from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    Catch,
    Finally,
    Fault,
}

/// Stream-structural operations
#[derive(Debug, Clone, PartialEq)]
pub enum Pseudo {
    /// Opens a protected region; the label is its end-of-region target
    BeginExceptionBlock(Label),
    /// Leaves the previous block and starts a catch handler
    BeginCatch {
        region: Label,
        exception_type: TypeRef,
    },
    /// Leaves the previous block and starts a finally handler
    BeginFinally { region: Label },
    /// Leaves the previous block and starts a fault handler
    BeginFault { region: Label },
    /// Closes the last handler and marks the region label just past it
    EndExceptionBlock { region: Label, handler: HandlerKind },
    BeginScope,
    EndScope,
    DeclareLocal(Local),
    DefineLabel(Label),
    MarkLabel(Label),
    /// `call` to a vararg method with extra argument types
    CallVarargs {
        method: MethodRef,
        optional: Vec<TypeRef>,
    },
    /// `calli` through a stand-alone signature
    Calli(CallSite),
}

impl Pseudo {
    /// Region and scope markers, which only the emitter's transition
    /// methods may append
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::BeginExceptionBlock(_)
                | Self::BeginCatch { .. }
                | Self::BeginFinally { .. }
                | Self::BeginFault { .. }
                | Self::EndExceptionBlock { .. }
                | Self::BeginScope
                | Self::EndScope
        )
    }

    /// Bytes this pseudo-operation materializes in the encoded body
    pub fn size(&self) -> usize {
        match self {
            Self::BeginCatch { .. } | Self::BeginFinally { .. } | Self::BeginFault { .. } => {
                OpCode::Leave.size()
            }
            Self::EndExceptionBlock { handler, .. } => match handler {
                HandlerKind::Catch => OpCode::Leave.size(),
                HandlerKind::Finally | HandlerKind::Fault => OpCode::Endfinally.size(),
            },
            Self::CallVarargs { .. } => OpCode::Call.size(),
            Self::Calli(_) => OpCode::Calli.size(),
            Self::BeginExceptionBlock(_)
            | Self::BeginScope
            | Self::EndScope
            | Self::DeclareLocal(_)
            | Self::DefineLabel(_)
            | Self::MarkLabel(_) => 0,
        }
    }

    fn anonymized(&self) -> Self {
        match self {
            Self::BeginExceptionBlock(label) => Self::BeginExceptionBlock(label.anonymized()),
            Self::BeginCatch {
                region,
                exception_type,
            } => Self::BeginCatch {
                region: region.anonymized(),
                exception_type: exception_type.clone(),
            },
            Self::BeginFinally { region } => Self::BeginFinally {
                region: region.anonymized(),
            },
            Self::BeginFault { region } => Self::BeginFault {
                region: region.anonymized(),
            },
            Self::EndExceptionBlock { region, handler } => Self::EndExceptionBlock {
                region: region.anonymized(),
                handler: *handler,
            },
            Self::DefineLabel(label) => Self::DefineLabel(label.anonymized()),
            Self::MarkLabel(label) => Self::MarkLabel(label.anonymized()),
            other => other.clone(),
        }
    }
}

impl fmt::Display for Pseudo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BeginExceptionBlock(region) => write!(f, ".try // ends at {region}"),
            Self::BeginCatch {
                region,
                exception_type,
            } => write!(f, "leave {region} .catch {exception_type}"),
            Self::BeginFinally { region } => write!(f, "leave {region} .finally"),
            Self::BeginFault { region } => write!(f, "leave {region} .fault"),
            Self::EndExceptionBlock { region, handler } => match handler {
                HandlerKind::Catch => write!(f, "leave {region} // end .try"),
                HandlerKind::Finally | HandlerKind::Fault => write!(f, "endfinally // end .try"),
            },
            Self::BeginScope => f.write_str("{"),
            Self::EndScope => f.write_str("}"),
            Self::DeclareLocal(local) => {
                write!(f, ".local {} {local}", local.value_type())?;
                if local.is_pinned() {
                    f.write_str(" pinned")?;
                }
                Ok(())
            }
            Self::DefineLabel(label) => write!(f, ".label {label}"),
            Self::MarkLabel(label) => write!(f, "{label}:"),
            Self::CallVarargs { method, optional } => {
                write!(f, "call vararg {method}")?;
                if !optional.is_empty() {
                    f.write_str(" [")?;
                    crate::metadata::write_type_list(f, optional)?;
                    f.write_str("]")?;
                }
                Ok(())
            }
            Self::Calli(site) => write!(f, "calli {site}"),
        }
    }
}

/// Operand handed to the checked [`Instruction::new`] constructor
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    None,
    Immediate(Immediate),
    Local(Local),
    Label(Label),
    Labels(Vec<Label>),
    Symbol(Symbol),
}

impl From<Immediate> for Operand {
    fn from(imm: Immediate) -> Self {
        Self::Immediate(imm)
    }
}

impl From<Local> for Operand {
    fn from(local: Local) -> Self {
        Self::Local(local)
    }
}

impl From<Label> for Operand {
    fn from(label: Label) -> Self {
        Self::Label(label)
    }
}

impl From<Vec<Label>> for Operand {
    fn from(labels: Vec<Label>) -> Self {
        Self::Labels(labels)
    }
}

impl From<Symbol> for Operand {
    fn from(symbol: Symbol) -> Self {
        Self::Symbol(symbol)
    }
}

macro_rules! symbol_operand {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Operand {
                fn from(value: $ty) -> Self {
                    Self::Symbol(Symbol::from(value))
                }
            }
        )*
    };
}

symbol_operand!(TypeRef, FieldRef, MethodRef, ConstructorRef);

/// One operation with its operand
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Op(OpCode),
    Immediate(OpCode, Immediate),
    /// Local access; the fixed-slot forms (`ldloc.0` ...) carry their local too
    Local(OpCode, Local),
    Label(OpCode, Label),
    Switch(OpCode, Vec<Label>),
    Symbol(OpCode, Symbol),
    Pseudo(Pseudo),
}

/// Opcodes whose slot is implied by the opcode itself
fn fixed_local_slot(opcode: OpCode) -> Option<usize> {
    match opcode {
        OpCode::Ldloc0 | OpCode::Stloc0 => Some(0),
        OpCode::Ldloc1 | OpCode::Stloc1 => Some(1),
        OpCode::Ldloc2 | OpCode::Stloc2 => Some(2),
        OpCode::Ldloc3 | OpCode::Stloc3 => Some(3),
        _ => None,
    }
}

fn local_fits(opcode: OpCode, local: &Local) -> bool {
    match (opcode.operand_kind(), fixed_local_slot(opcode)) {
        (OperandKind::None, Some(slot)) => slot == local.ordinal(),
        (OperandKind::ShortVar, None) => local.ordinal() <= SHORT_LOCAL_ORDINAL,
        (OperandKind::Var, None) => true,
        _ => false,
    }
}

fn symbol_fits(kind: OperandKind, symbol: &Symbol) -> bool {
    matches!(
        (kind, symbol),
        (OperandKind::Field, Symbol::Field(_))
            | (OperandKind::Method, Symbol::Method(_) | Symbol::Constructor(_))
            | (OperandKind::Type, Symbol::Type(_))
            | (OperandKind::Tok, _)
    )
}

impl Instruction {
    /// Build an instruction, checking the operand against the opcode's operand kind
    pub fn new(opcode: OpCode, operand: impl Into<Operand>) -> EmitResult<Self> {
        let instruction = match operand.into() {
            Operand::None => Self::Op(opcode),
            Operand::Immediate(imm) => Self::Immediate(opcode, imm),
            Operand::Local(local) => Self::Local(opcode, local),
            Operand::Label(label) => Self::Label(opcode, label),
            Operand::Labels(labels) => Self::Switch(opcode, labels),
            Operand::Symbol(symbol) => Self::Symbol(opcode, symbol),
        };
        instruction.check_operand()?;
        Ok(instruction)
    }

    /// Check the operand against the opcode's operand kind.
    ///
    /// Pseudo-operations carry their own payloads and always pass.
    pub fn check_operand(&self) -> EmitResult<()> {
        let Some(opcode) = self.opcode() else {
            return Ok(());
        };
        let kind = opcode.operand_kind();
        let (fits, found) = match self {
            Self::Op(_) => (
                kind == OperandKind::None && fixed_local_slot(opcode).is_none(),
                "no operand",
            ),
            Self::Immediate(_, imm) => (imm.fits(kind), imm.kind_name()),
            Self::Local(_, local) => (local_fits(opcode, local), "local"),
            Self::Label(..) => (
                matches!(kind, OperandKind::ShortBrTarget | OperandKind::BrTarget),
                "label",
            ),
            Self::Switch(..) => (kind == OperandKind::Switch, "label set"),
            Self::Symbol(_, symbol) => (symbol_fits(kind, symbol), symbol.category()),
            Self::Pseudo(_) => return Ok(()),
        };
        if fits {
            Ok(())
        } else {
            Err(EmitError::OperandMismatch {
                opcode,
                expected: kind,
                found,
            })
        }
    }

    /// The real opcode, if this is not a pseudo-operation
    pub fn opcode(&self) -> Option<OpCode> {
        match self {
            Self::Op(op)
            | Self::Immediate(op, _)
            | Self::Local(op, _)
            | Self::Label(op, _)
            | Self::Switch(op, _)
            | Self::Symbol(op, _) => Some(*op),
            Self::Pseudo(_) => None,
        }
    }

    pub fn is_pseudo(&self) -> bool {
        matches!(self, Self::Pseudo(_))
    }

    /// Encoded size in bytes
    pub fn size(&self) -> usize {
        match self {
            Self::Op(op)
            | Self::Immediate(op, _)
            | Self::Local(op, _)
            | Self::Label(op, _)
            | Self::Symbol(op, _) => op.size(),
            Self::Switch(op, labels) => op.size() + 4 * labels.len(),
            Self::Pseudo(pseudo) => pseudo.size(),
        }
    }

    /// Copy with every display name dropped, for name-insensitive comparison
    pub fn anonymized(&self) -> Self {
        match self {
            Self::Label(op, label) => Self::Label(*op, label.anonymized()),
            Self::Switch(op, labels) => {
                Self::Switch(*op, labels.iter().map(Label::anonymized).collect())
            }
            Self::Pseudo(pseudo) => Self::Pseudo(pseudo.anonymized()),
            other => other.clone(),
        }
    }
}

impl From<Pseudo> for Instruction {
    fn from(pseudo: Pseudo) -> Self {
        Self::Pseudo(pseudo)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Op(op) => write!(f, "{op}"),
            Self::Immediate(op, imm) => write!(f, "{op} {imm}"),
            Self::Local(op, local) if op.operand_kind() == OperandKind::None => {
                write!(f, "{op} // {local}")
            }
            Self::Local(op, local) => write!(f, "{op} {local}"),
            Self::Label(op, label) => write!(f, "{op} {label}"),
            Self::Switch(op, labels) => {
                write!(f, "{op} (")?;
                for (i, label) in labels.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{label}")?;
                }
                f.write_str(")")
            }
            Self::Symbol(op, symbol) => write!(f, "{op} {symbol}"),
            Self::Pseudo(pseudo) => pseudo.fmt(f),
        }
    }
}
