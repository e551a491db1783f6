//! Operation encoder
//!
//! Pure functions mapping a semantic request onto the narrowest valid
//! [`Instruction`]. Nothing here touches a stream or symbol table; range
//! checks happen before an instruction is built, so a failed request never
//! yields a partial result.

mod typed;

pub use typed::{
    call, call_direct, convert, field_address, load_element, load_field, load_indirect,
    store_element, store_field, store_indirect, unaligned,
};

use crate::error::{EmitError, EmitResult};
use crate::instruction::{Immediate, Instruction};
use crate::options::BranchEncoding;
use crate::symbols::{Label, Local};
use quill_bytecode::OpCode;

/// Overflow and signedness modifiers for arithmetic and conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NumericMode {
    pub checked: bool,
    pub unsigned: bool,
}

impl NumericMode {
    pub const PLAIN: Self = Self {
        checked: false,
        unsigned: false,
    };
    pub const UNSIGNED: Self = Self {
        checked: false,
        unsigned: true,
    };
    pub const CHECKED: Self = Self {
        checked: true,
        unsigned: false,
    };
    pub const CHECKED_UNSIGNED: Self = Self {
        checked: true,
        unsigned: true,
    };
}

/// Fixed-slot, short and long forms of one access family
struct IndexForms {
    fixed: Option<[OpCode; 4]>,
    short: OpCode,
    long: OpCode,
}

const LDARG: IndexForms = IndexForms {
    fixed: Some([OpCode::Ldarg0, OpCode::Ldarg1, OpCode::Ldarg2, OpCode::Ldarg3]),
    short: OpCode::LdargS,
    long: OpCode::Ldarg,
};

const LDARGA: IndexForms = IndexForms {
    fixed: None,
    short: OpCode::LdargaS,
    long: OpCode::Ldarga,
};

const STARG: IndexForms = IndexForms {
    fixed: None,
    short: OpCode::StargS,
    long: OpCode::Starg,
};

const LDLOC: IndexForms = IndexForms {
    fixed: Some([OpCode::Ldloc0, OpCode::Ldloc1, OpCode::Ldloc2, OpCode::Ldloc3]),
    short: OpCode::LdlocS,
    long: OpCode::Ldloc,
};

const LDLOCA: IndexForms = IndexForms {
    fixed: None,
    short: OpCode::LdlocaS,
    long: OpCode::Ldloca,
};

const STLOC: IndexForms = IndexForms {
    fixed: Some([OpCode::Stloc0, OpCode::Stloc1, OpCode::Stloc2, OpCode::Stloc3]),
    short: OpCode::StlocS,
    long: OpCode::Stloc,
};

/// Largest index the general two-byte argument form can hold
pub const MAX_ARGUMENT_INDEX: usize = u16::MAX as usize;

fn argument(forms: &IndexForms, index: usize) -> EmitResult<Instruction> {
    if let Some(fixed) = forms.fixed {
        if index < fixed.len() {
            return Ok(Instruction::Op(fixed[index]));
        }
    }
    if let Ok(short) = u8::try_from(index) {
        return Ok(Instruction::Immediate(forms.short, Immediate::U8(short)));
    }
    match u16::try_from(index) {
        Ok(long) => Ok(Instruction::Immediate(forms.long, Immediate::U16(long))),
        Err(_) => Err(EmitError::out_of_range(
            "argument index",
            index,
            "0..=65535",
        )),
    }
}

fn local(forms: &IndexForms, local: &Local) -> Instruction {
    let ordinal = local.ordinal();
    let opcode = match forms.fixed {
        Some(fixed) if ordinal < fixed.len() => fixed[ordinal],
        _ if local.is_short_form() => forms.short,
        _ => forms.long,
    };
    Instruction::Local(opcode, local.clone())
}

/// `ldarg.0`-`ldarg.3`, `ldarg.s` or `ldarg`
pub fn load_argument(index: usize) -> EmitResult<Instruction> {
    argument(&LDARG, index)
}

/// `ldarga.s` or `ldarga`
pub fn load_argument_address(index: usize) -> EmitResult<Instruction> {
    argument(&LDARGA, index)
}

/// `starg.s` or `starg`
pub fn store_argument(index: usize) -> EmitResult<Instruction> {
    argument(&STARG, index)
}

/// `ldloc.0`-`ldloc.3`, `ldloc.s` or `ldloc`
pub fn load_local(slot: &Local) -> Instruction {
    local(&LDLOC, slot)
}

/// `ldloca.s` or `ldloca`
pub fn load_local_address(slot: &Local) -> Instruction {
    local(&LDLOCA, slot)
}

/// `stloc.0`-`stloc.3`, `stloc.s` or `stloc`
pub fn store_local(slot: &Local) -> Instruction {
    local(&STLOC, slot)
}

/// Narrowest `ldc.i4` form for `value`
pub fn load_int32(value: i32) -> Instruction {
    let dedicated = match value {
        -1 => Some(OpCode::LdcI4M1),
        0 => Some(OpCode::LdcI4_0),
        1 => Some(OpCode::LdcI4_1),
        2 => Some(OpCode::LdcI4_2),
        3 => Some(OpCode::LdcI4_3),
        4 => Some(OpCode::LdcI4_4),
        5 => Some(OpCode::LdcI4_5),
        6 => Some(OpCode::LdcI4_6),
        7 => Some(OpCode::LdcI4_7),
        8 => Some(OpCode::LdcI4_8),
        _ => None,
    };
    if let Some(op) = dedicated {
        return Instruction::Op(op);
    }
    match i8::try_from(value) {
        Ok(short) => Instruction::Immediate(OpCode::LdcI4S, Immediate::I8(short)),
        Err(_) => Instruction::Immediate(OpCode::LdcI4, Immediate::I32(value)),
    }
}

pub fn load_int64(value: i64) -> Instruction {
    Instruction::Immediate(OpCode::LdcI8, Immediate::I64(value))
}

pub fn load_float32(value: f32) -> Instruction {
    Instruction::Immediate(OpCode::LdcR4, Immediate::F32(value))
}

pub fn load_float64(value: f64) -> Instruction {
    Instruction::Immediate(OpCode::LdcR8, Immediate::F64(value))
}

pub fn load_string(value: &str) -> Instruction {
    Instruction::Immediate(OpCode::Ldstr, Immediate::Text(value.into()))
}

/// Branch condition, before signedness is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    Always,
    /// Exit a protected region
    Leave,
    IfTrue,
    IfFalse,
    Equal,
    /// Not equal, or unordered for floats. Has no signed counterpart.
    NotEqual,
    GreaterOrEqual,
    Greater,
    LessOrEqual,
    Less,
}

impl Condition {
    /// Long-form opcode; `unsigned` selects the `.un` variant where one exists
    fn long_opcode(self, unsigned: bool) -> OpCode {
        match (self, unsigned) {
            (Self::Always, _) => OpCode::Br,
            (Self::Leave, _) => OpCode::Leave,
            (Self::IfTrue, _) => OpCode::Brtrue,
            (Self::IfFalse, _) => OpCode::Brfalse,
            (Self::Equal, _) => OpCode::Beq,
            (Self::NotEqual, _) => OpCode::BneUn,
            (Self::GreaterOrEqual, false) => OpCode::Bge,
            (Self::GreaterOrEqual, true) => OpCode::BgeUn,
            (Self::Greater, false) => OpCode::Bgt,
            (Self::Greater, true) => OpCode::BgtUn,
            (Self::LessOrEqual, false) => OpCode::Ble,
            (Self::LessOrEqual, true) => OpCode::BleUn,
            (Self::Less, false) => OpCode::Blt,
            (Self::Less, true) => OpCode::BltUn,
        }
    }
}

/// Branch to `target`.
///
/// Under [`BranchEncoding::LabelOrdinal`] the short form is picked whenever
/// the label's ordinal allows it, whatever the eventual byte distance.
pub fn branch(
    condition: Condition,
    unsigned: bool,
    target: &Label,
    encoding: BranchEncoding,
) -> Instruction {
    let long = condition.long_opcode(unsigned);
    let opcode = match encoding {
        BranchEncoding::LabelOrdinal if target.is_short_form() => long.short_form().unwrap_or(long),
        _ => long,
    };
    Instruction::Label(opcode, target.clone())
}

/// Jump table
pub fn switch(targets: &[Label]) -> Instruction {
    Instruction::Switch(OpCode::Switch, targets.to_vec())
}

/// Binary arithmetic with overflow variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arithmetic {
    Add,
    Subtract,
    Multiply,
}

pub fn arithmetic(operation: Arithmetic, mode: NumericMode) -> Instruction {
    use Arithmetic::*;
    let opcode = match (operation, mode.checked, mode.unsigned) {
        (Add, false, _) => OpCode::Add,
        (Add, true, false) => OpCode::AddOvf,
        (Add, true, true) => OpCode::AddOvfUn,
        (Subtract, false, _) => OpCode::Sub,
        (Subtract, true, false) => OpCode::SubOvf,
        (Subtract, true, true) => OpCode::SubOvfUn,
        (Multiply, false, _) => OpCode::Mul,
        (Multiply, true, false) => OpCode::MulOvf,
        (Multiply, true, true) => OpCode::MulOvfUn,
    };
    Instruction::Op(opcode)
}

pub fn divide(unsigned: bool) -> Instruction {
    Instruction::Op(if unsigned { OpCode::DivUn } else { OpCode::Div })
}

pub fn remainder(unsigned: bool) -> Instruction {
    Instruction::Op(if unsigned { OpCode::RemUn } else { OpCode::Rem })
}

pub fn shift_right(unsigned: bool) -> Instruction {
    Instruction::Op(if unsigned { OpCode::ShrUn } else { OpCode::Shr })
}

/// Relational comparison pushing 0 or 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparison {
    Equal,
    Greater,
    Less,
    GreaterOrEqual,
    LessOrEqual,
}

/// Comparison sequence; `>=` and `<=` have no opcode and come out as two
/// instructions, `clt`/`cgt` followed by `not`.
pub fn compare(comparison: Comparison, unsigned: bool) -> Vec<Instruction> {
    let cgt = if unsigned { OpCode::CgtUn } else { OpCode::Cgt };
    let clt = if unsigned { OpCode::CltUn } else { OpCode::Clt };
    match comparison {
        Comparison::Equal => vec![Instruction::Op(OpCode::Ceq)],
        Comparison::Greater => vec![Instruction::Op(cgt)],
        Comparison::Less => vec![Instruction::Op(clt)],
        Comparison::GreaterOrEqual => vec![Instruction::Op(clt), Instruction::Op(OpCode::Not)],
        Comparison::LessOrEqual => vec![Instruction::Op(cgt), Instruction::Op(OpCode::Not)],
    }
}
