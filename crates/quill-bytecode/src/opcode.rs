//! Opcodes for the Quill stack machine
//!
//! The instruction set is split across two pages:
//! - 0x00-0xE0: single-byte opcodes
//! - 0xFE 0x00-0x1E: two-byte opcodes, the first byte being the `0xFE` prefix
//!
//! Two-byte opcodes are stored as `0xFE00 | second_byte` so that every opcode
//! has a single `u16` value.

use std::fmt;

/// Prefix byte introducing the second opcode page
pub const EXTENDED_PREFIX: u8 = 0xFE;

/// Shape of the inline operand that follows an opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandKind {
    /// No operand
    None,
    /// Unsigned 8-bit argument or local index
    ShortVar,
    /// Unsigned 16-bit argument or local index
    Var,
    /// 8-bit immediate
    ShortI,
    /// 32-bit signed immediate
    I,
    /// 64-bit signed immediate
    I8,
    /// 32-bit float immediate
    ShortR,
    /// 64-bit float immediate
    R,
    /// Signed 8-bit branch displacement
    ShortBrTarget,
    /// Signed 32-bit branch displacement
    BrTarget,
    /// u32 count followed by that many i32 displacements
    Switch,
    /// Field token
    Field,
    /// Method or constructor token
    Method,
    /// Type token
    Type,
    /// Type, field or method token
    Tok,
    /// User-string token
    String,
    /// Stand-alone signature token
    Sig,
}

impl OperandKind {
    /// Size in bytes of the operand.
    ///
    /// For [`OperandKind::Switch`] this is only the count prefix; each target
    /// adds four more bytes.
    pub fn size(self) -> usize {
        match self {
            Self::None => 0,
            Self::ShortVar | Self::ShortI | Self::ShortBrTarget => 1,
            Self::Var => 2,
            Self::I
            | Self::ShortR
            | Self::BrTarget
            | Self::Switch
            | Self::Field
            | Self::Method
            | Self::Type
            | Self::Tok
            | Self::String
            | Self::Sig => 4,
            Self::I8 | Self::R => 8,
        }
    }

    /// Whether the operand is a metadata token
    pub fn is_token(self) -> bool {
        matches!(
            self,
            Self::Field | Self::Method | Self::Type | Self::Tok | Self::String | Self::Sig
        )
    }
}

/// How an opcode affects control flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowControl {
    /// Falls through to the next instruction
    Next,
    /// Unconditional transfer
    Branch,
    /// Conditional transfer (falls through when not taken)
    CondBranch,
    /// Leaves the routine or a handler
    Return,
    /// Raises an exception
    Throw,
    /// Calls another routine and continues afterwards
    Call,
    /// Prefix that modifies the following instruction
    Meta,
    /// Debugger breakpoint
    Break,
}

macro_rules! define_opcodes {
    ($(
        $(#[$doc:meta])*
        $variant:ident = $value:literal, $name:literal, $kind:ident, $flow:ident;
    )*) => {
        /// Stack-machine opcode
        ///
        /// The discriminant is the encoded value: `0x00..=0xE0` for the first
        /// page, `0xFE00 | b` for the second.
        #[repr(u16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum OpCode {
            $(
                $(#[$doc])*
                $variant = $value,
            )*
        }

        impl OpCode {
            /// Every defined opcode, in encoding order
            pub const ALL: &'static [OpCode] = &[$(OpCode::$variant),*];

            /// Look up an opcode by its encoded value
            ///
            /// Returns None if the value does not correspond to a defined opcode.
            pub fn from_value(value: u16) -> Option<Self> {
                match value {
                    $($value => Some(Self::$variant),)*
                    _ => None,
                }
            }

            /// Assembler mnemonic
            pub fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)*
                }
            }

            /// Shape of the inline operand
            pub fn operand_kind(self) -> OperandKind {
                match self {
                    $(Self::$variant => OperandKind::$kind,)*
                }
            }

            /// Control-flow class
            pub fn flow_control(self) -> FlowControl {
                match self {
                    $(Self::$variant => FlowControl::$flow,)*
                }
            }
        }
    };
}

define_opcodes! {
    // ===== Base instructions (0x00-0x14) =====
    /// No operation
    Nop = 0x00, "nop", None, Next;
    /// Signal a debugger breakpoint
    Break = 0x01, "break", None, Break;
    /// Load argument 0
    Ldarg0 = 0x02, "ldarg.0", None, Next;
    /// Load argument 1
    Ldarg1 = 0x03, "ldarg.1", None, Next;
    /// Load argument 2
    Ldarg2 = 0x04, "ldarg.2", None, Next;
    /// Load argument 3
    Ldarg3 = 0x05, "ldarg.3", None, Next;
    /// Load local 0
    Ldloc0 = 0x06, "ldloc.0", None, Next;
    /// Load local 1
    Ldloc1 = 0x07, "ldloc.1", None, Next;
    /// Load local 2
    Ldloc2 = 0x08, "ldloc.2", None, Next;
    /// Load local 3
    Ldloc3 = 0x09, "ldloc.3", None, Next;
    /// Store to local 0
    Stloc0 = 0x0A, "stloc.0", None, Next;
    /// Store to local 1
    Stloc1 = 0x0B, "stloc.1", None, Next;
    /// Store to local 2
    Stloc2 = 0x0C, "stloc.2", None, Next;
    /// Store to local 3
    Stloc3 = 0x0D, "stloc.3", None, Next;
    /// Load argument (operand: u8 index)
    LdargS = 0x0E, "ldarg.s", ShortVar, Next;
    /// Load argument address (operand: u8 index)
    LdargaS = 0x0F, "ldarga.s", ShortVar, Next;
    /// Store to argument (operand: u8 index)
    StargS = 0x10, "starg.s", ShortVar, Next;
    /// Load local (operand: u8 index)
    LdlocS = 0x11, "ldloc.s", ShortVar, Next;
    /// Load local address (operand: u8 index)
    LdlocaS = 0x12, "ldloca.s", ShortVar, Next;
    /// Store to local (operand: u8 index)
    StlocS = 0x13, "stloc.s", ShortVar, Next;
    /// Push a null reference
    Ldnull = 0x14, "ldnull", None, Next;

    // ===== Constants (0x15-0x23) =====
    /// Push -1
    LdcI4M1 = 0x15, "ldc.i4.m1", None, Next;
    /// Push 0
    LdcI4_0 = 0x16, "ldc.i4.0", None, Next;
    /// Push 1
    LdcI4_1 = 0x17, "ldc.i4.1", None, Next;
    /// Push 2
    LdcI4_2 = 0x18, "ldc.i4.2", None, Next;
    /// Push 3
    LdcI4_3 = 0x19, "ldc.i4.3", None, Next;
    /// Push 4
    LdcI4_4 = 0x1A, "ldc.i4.4", None, Next;
    /// Push 5
    LdcI4_5 = 0x1B, "ldc.i4.5", None, Next;
    /// Push 6
    LdcI4_6 = 0x1C, "ldc.i4.6", None, Next;
    /// Push 7
    LdcI4_7 = 0x1D, "ldc.i4.7", None, Next;
    /// Push 8
    LdcI4_8 = 0x1E, "ldc.i4.8", None, Next;
    /// Push an int32 (operand: i8)
    LdcI4S = 0x1F, "ldc.i4.s", ShortI, Next;
    /// Push an int32 (operand: i32)
    LdcI4 = 0x20, "ldc.i4", I, Next;
    /// Push an int64 (operand: i64)
    LdcI8 = 0x21, "ldc.i8", I8, Next;
    /// Push a float32 (operand: f32)
    LdcR4 = 0x22, "ldc.r4", ShortR, Next;
    /// Push a float64 (operand: f64)
    LdcR8 = 0x23, "ldc.r8", R, Next;

    // ===== Stack and calls (0x25-0x2A) =====
    /// Duplicate the top stack value
    Dup = 0x25, "dup", None, Next;
    /// Pop the top stack value
    Pop = 0x26, "pop", None, Next;
    /// Exit and jump to another routine (operand: method)
    Jmp = 0x27, "jmp", Method, Call;
    /// Direct call (operand: method)
    Call = 0x28, "call", Method, Call;
    /// Indirect call through a function pointer (operand: signature)
    Calli = 0x29, "calli", Sig, Call;
    /// Return from the routine
    Ret = 0x2A, "ret", None, Return;

    // ===== Short branches (0x2B-0x37) =====
    /// Unconditional branch (operand: i8 displacement)
    BrS = 0x2B, "br.s", ShortBrTarget, Branch;
    /// Branch if false, null or zero (operand: i8 displacement)
    BrfalseS = 0x2C, "brfalse.s", ShortBrTarget, CondBranch;
    /// Branch if true, non-null or non-zero (operand: i8 displacement)
    BrtrueS = 0x2D, "brtrue.s", ShortBrTarget, CondBranch;
    /// Branch if equal (operand: i8 displacement)
    BeqS = 0x2E, "beq.s", ShortBrTarget, CondBranch;
    /// Branch if greater or equal (operand: i8 displacement)
    BgeS = 0x2F, "bge.s", ShortBrTarget, CondBranch;
    /// Branch if greater (operand: i8 displacement)
    BgtS = 0x30, "bgt.s", ShortBrTarget, CondBranch;
    /// Branch if less or equal (operand: i8 displacement)
    BleS = 0x31, "ble.s", ShortBrTarget, CondBranch;
    /// Branch if less (operand: i8 displacement)
    BltS = 0x32, "blt.s", ShortBrTarget, CondBranch;
    /// Branch if not equal, unsigned or unordered (operand: i8 displacement)
    BneUnS = 0x33, "bne.un.s", ShortBrTarget, CondBranch;
    /// Branch if greater or equal, unsigned or unordered (operand: i8 displacement)
    BgeUnS = 0x34, "bge.un.s", ShortBrTarget, CondBranch;
    /// Branch if greater, unsigned or unordered (operand: i8 displacement)
    BgtUnS = 0x35, "bgt.un.s", ShortBrTarget, CondBranch;
    /// Branch if less or equal, unsigned or unordered (operand: i8 displacement)
    BleUnS = 0x36, "ble.un.s", ShortBrTarget, CondBranch;
    /// Branch if less, unsigned or unordered (operand: i8 displacement)
    BltUnS = 0x37, "blt.un.s", ShortBrTarget, CondBranch;

    // ===== Long branches (0x38-0x45) =====
    /// Unconditional branch (operand: i32 displacement)
    Br = 0x38, "br", BrTarget, Branch;
    /// Branch if false, null or zero (operand: i32 displacement)
    Brfalse = 0x39, "brfalse", BrTarget, CondBranch;
    /// Branch if true, non-null or non-zero (operand: i32 displacement)
    Brtrue = 0x3A, "brtrue", BrTarget, CondBranch;
    /// Branch if equal (operand: i32 displacement)
    Beq = 0x3B, "beq", BrTarget, CondBranch;
    /// Branch if greater or equal (operand: i32 displacement)
    Bge = 0x3C, "bge", BrTarget, CondBranch;
    /// Branch if greater (operand: i32 displacement)
    Bgt = 0x3D, "bgt", BrTarget, CondBranch;
    /// Branch if less or equal (operand: i32 displacement)
    Ble = 0x3E, "ble", BrTarget, CondBranch;
    /// Branch if less (operand: i32 displacement)
    Blt = 0x3F, "blt", BrTarget, CondBranch;
    /// Branch if not equal, unsigned or unordered (operand: i32 displacement)
    BneUn = 0x40, "bne.un", BrTarget, CondBranch;
    /// Branch if greater or equal, unsigned or unordered (operand: i32 displacement)
    BgeUn = 0x41, "bge.un", BrTarget, CondBranch;
    /// Branch if greater, unsigned or unordered (operand: i32 displacement)
    BgtUn = 0x42, "bgt.un", BrTarget, CondBranch;
    /// Branch if less or equal, unsigned or unordered (operand: i32 displacement)
    BleUn = 0x43, "ble.un", BrTarget, CondBranch;
    /// Branch if less, unsigned or unordered (operand: i32 displacement)
    BltUn = 0x44, "blt.un", BrTarget, CondBranch;
    /// Jump table (operands: u32 count, count x i32 displacement)
    Switch = 0x45, "switch", Switch, CondBranch;

    // ===== Indirect load/store (0x46-0x57) =====
    /// Load int8 through a pointer
    LdindI1 = 0x46, "ldind.i1", None, Next;
    /// Load uint8 through a pointer
    LdindU1 = 0x47, "ldind.u1", None, Next;
    /// Load int16 through a pointer
    LdindI2 = 0x48, "ldind.i2", None, Next;
    /// Load uint16 through a pointer
    LdindU2 = 0x49, "ldind.u2", None, Next;
    /// Load int32 through a pointer
    LdindI4 = 0x4A, "ldind.i4", None, Next;
    /// Load uint32 through a pointer
    LdindU4 = 0x4B, "ldind.u4", None, Next;
    /// Load int64 through a pointer
    LdindI8 = 0x4C, "ldind.i8", None, Next;
    /// Load native int through a pointer
    LdindI = 0x4D, "ldind.i", None, Next;
    /// Load float32 through a pointer
    LdindR4 = 0x4E, "ldind.r4", None, Next;
    /// Load float64 through a pointer
    LdindR8 = 0x4F, "ldind.r8", None, Next;
    /// Load object reference through a pointer
    LdindRef = 0x50, "ldind.ref", None, Next;
    /// Store object reference through a pointer
    StindRef = 0x51, "stind.ref", None, Next;
    /// Store int8 through a pointer
    StindI1 = 0x52, "stind.i1", None, Next;
    /// Store int16 through a pointer
    StindI2 = 0x53, "stind.i2", None, Next;
    /// Store int32 through a pointer
    StindI4 = 0x54, "stind.i4", None, Next;
    /// Store int64 through a pointer
    StindI8 = 0x55, "stind.i8", None, Next;
    /// Store float32 through a pointer
    StindR4 = 0x56, "stind.r4", None, Next;
    /// Store float64 through a pointer
    StindR8 = 0x57, "stind.r8", None, Next;

    // ===== Arithmetic and bitwise (0x58-0x66) =====
    /// Add
    Add = 0x58, "add", None, Next;
    /// Subtract
    Sub = 0x59, "sub", None, Next;
    /// Multiply
    Mul = 0x5A, "mul", None, Next;
    /// Signed divide
    Div = 0x5B, "div", None, Next;
    /// Unsigned divide
    DivUn = 0x5C, "div.un", None, Next;
    /// Signed remainder
    Rem = 0x5D, "rem", None, Next;
    /// Unsigned remainder
    RemUn = 0x5E, "rem.un", None, Next;
    /// Bitwise and
    And = 0x5F, "and", None, Next;
    /// Bitwise or
    Or = 0x60, "or", None, Next;
    /// Bitwise xor
    Xor = 0x61, "xor", None, Next;
    /// Shift left
    Shl = 0x62, "shl", None, Next;
    /// Arithmetic shift right
    Shr = 0x63, "shr", None, Next;
    /// Logical shift right
    ShrUn = 0x64, "shr.un", None, Next;
    /// Negate
    Neg = 0x65, "neg", None, Next;
    /// Bitwise complement
    Not = 0x66, "not", None, Next;

    // ===== Conversions (0x67-0x6E) =====
    /// Convert to int8
    ConvI1 = 0x67, "conv.i1", None, Next;
    /// Convert to int16
    ConvI2 = 0x68, "conv.i2", None, Next;
    /// Convert to int32
    ConvI4 = 0x69, "conv.i4", None, Next;
    /// Convert to int64
    ConvI8 = 0x6A, "conv.i8", None, Next;
    /// Convert to float32
    ConvR4 = 0x6B, "conv.r4", None, Next;
    /// Convert to float64
    ConvR8 = 0x6C, "conv.r8", None, Next;
    /// Convert to uint32
    ConvU4 = 0x6D, "conv.u4", None, Next;
    /// Convert to uint64
    ConvU8 = 0x6E, "conv.u8", None, Next;

    // ===== Object model (0x6F-0x81) =====
    /// Virtual call with null check (operand: method)
    Callvirt = 0x6F, "callvirt", Method, Call;
    /// Copy a value type (operand: type)
    Cpobj = 0x70, "cpobj", Type, Next;
    /// Load a value type through a pointer (operand: type)
    Ldobj = 0x71, "ldobj", Type, Next;
    /// Push a string literal (operand: string)
    Ldstr = 0x72, "ldstr", String, Next;
    /// Allocate and construct (operand: constructor)
    Newobj = 0x73, "newobj", Method, Call;
    /// Checked cast (operand: type)
    Castclass = 0x74, "castclass", Type, Next;
    /// Type test (operand: type)
    Isinst = 0x75, "isinst", Type, Next;
    /// Convert unsigned integer to float
    ConvRUn = 0x76, "conv.r.un", None, Next;
    /// Address of a boxed value (operand: type)
    Unbox = 0x79, "unbox", Type, Next;
    /// Throw the exception on the stack
    Throw = 0x7A, "throw", None, Throw;
    /// Load instance field (operand: field)
    Ldfld = 0x7B, "ldfld", Field, Next;
    /// Load instance field address (operand: field)
    Ldflda = 0x7C, "ldflda", Field, Next;
    /// Store instance field (operand: field)
    Stfld = 0x7D, "stfld", Field, Next;
    /// Load static field (operand: field)
    Ldsfld = 0x7E, "ldsfld", Field, Next;
    /// Load static field address (operand: field)
    Ldsflda = 0x7F, "ldsflda", Field, Next;
    /// Store static field (operand: field)
    Stsfld = 0x80, "stsfld", Field, Next;
    /// Store a value type through a pointer (operand: type)
    Stobj = 0x81, "stobj", Type, Next;

    // ===== Checked conversions from unsigned (0x82-0x8B) =====
    /// Checked unsigned to int8
    ConvOvfI1Un = 0x82, "conv.ovf.i1.un", None, Next;
    /// Checked unsigned to int16
    ConvOvfI2Un = 0x83, "conv.ovf.i2.un", None, Next;
    /// Checked unsigned to int32
    ConvOvfI4Un = 0x84, "conv.ovf.i4.un", None, Next;
    /// Checked unsigned to int64
    ConvOvfI8Un = 0x85, "conv.ovf.i8.un", None, Next;
    /// Checked unsigned to uint8
    ConvOvfU1Un = 0x86, "conv.ovf.u1.un", None, Next;
    /// Checked unsigned to uint16
    ConvOvfU2Un = 0x87, "conv.ovf.u2.un", None, Next;
    /// Checked unsigned to uint32
    ConvOvfU4Un = 0x88, "conv.ovf.u4.un", None, Next;
    /// Checked unsigned to uint64
    ConvOvfU8Un = 0x89, "conv.ovf.u8.un", None, Next;
    /// Checked unsigned to native int
    ConvOvfIUn = 0x8A, "conv.ovf.i.un", None, Next;
    /// Checked unsigned to native unsigned int
    ConvOvfUUn = 0x8B, "conv.ovf.u.un", None, Next;

    // ===== Arrays (0x8C-0xA5) =====
    /// Box a value type (operand: type)
    Box = 0x8C, "box", Type, Next;
    /// Allocate a zero-based array (operand: element type)
    Newarr = 0x8D, "newarr", Type, Next;
    /// Push array length
    Ldlen = 0x8E, "ldlen", None, Next;
    /// Load element address (operand: element type)
    Ldelema = 0x8F, "ldelema", Type, Next;
    /// Load int8 element
    LdelemI1 = 0x90, "ldelem.i1", None, Next;
    /// Load uint8 element
    LdelemU1 = 0x91, "ldelem.u1", None, Next;
    /// Load int16 element
    LdelemI2 = 0x92, "ldelem.i2", None, Next;
    /// Load uint16 element
    LdelemU2 = 0x93, "ldelem.u2", None, Next;
    /// Load int32 element
    LdelemI4 = 0x94, "ldelem.i4", None, Next;
    /// Load uint32 element
    LdelemU4 = 0x95, "ldelem.u4", None, Next;
    /// Load int64 element
    LdelemI8 = 0x96, "ldelem.i8", None, Next;
    /// Load native int element
    LdelemI = 0x97, "ldelem.i", None, Next;
    /// Load float32 element
    LdelemR4 = 0x98, "ldelem.r4", None, Next;
    /// Load float64 element
    LdelemR8 = 0x99, "ldelem.r8", None, Next;
    /// Load object reference element
    LdelemRef = 0x9A, "ldelem.ref", None, Next;
    /// Store native int element
    StelemI = 0x9B, "stelem.i", None, Next;
    /// Store int8 element
    StelemI1 = 0x9C, "stelem.i1", None, Next;
    /// Store int16 element
    StelemI2 = 0x9D, "stelem.i2", None, Next;
    /// Store int32 element
    StelemI4 = 0x9E, "stelem.i4", None, Next;
    /// Store int64 element
    StelemI8 = 0x9F, "stelem.i8", None, Next;
    /// Store float32 element
    StelemR4 = 0xA0, "stelem.r4", None, Next;
    /// Store float64 element
    StelemR8 = 0xA1, "stelem.r8", None, Next;
    /// Store object reference element
    StelemRef = 0xA2, "stelem.ref", None, Next;
    /// Load element of any type (operand: element type)
    Ldelem = 0xA3, "ldelem", Type, Next;
    /// Store element of any type (operand: element type)
    Stelem = 0xA4, "stelem", Type, Next;
    /// Unbox to a value (operand: type)
    UnboxAny = 0xA5, "unbox.any", Type, Next;

    // ===== Checked conversions (0xB3-0xBA) =====
    /// Checked to int8
    ConvOvfI1 = 0xB3, "conv.ovf.i1", None, Next;
    /// Checked to uint8
    ConvOvfU1 = 0xB4, "conv.ovf.u1", None, Next;
    /// Checked to int16
    ConvOvfI2 = 0xB5, "conv.ovf.i2", None, Next;
    /// Checked to uint16
    ConvOvfU2 = 0xB6, "conv.ovf.u2", None, Next;
    /// Checked to int32
    ConvOvfI4 = 0xB7, "conv.ovf.i4", None, Next;
    /// Checked to uint32
    ConvOvfU4 = 0xB8, "conv.ovf.u4", None, Next;
    /// Checked to int64
    ConvOvfI8 = 0xB9, "conv.ovf.i8", None, Next;
    /// Checked to uint64
    ConvOvfU8 = 0xBA, "conv.ovf.u8", None, Next;

    // ===== Typed references and misc (0xC2-0xE0) =====
    /// Address inside a typed reference (operand: type)
    Refanyval = 0xC2, "refanyval", Type, Next;
    /// Throw if not a finite number
    Ckfinite = 0xC3, "ckfinite", None, Next;
    /// Build a typed reference (operand: type)
    Mkrefany = 0xC6, "mkrefany", Type, Next;
    /// Push a runtime handle (operand: token)
    Ldtoken = 0xD0, "ldtoken", Tok, Next;
    /// Convert to uint16
    ConvU2 = 0xD1, "conv.u2", None, Next;
    /// Convert to uint8
    ConvU1 = 0xD2, "conv.u1", None, Next;
    /// Convert to native int
    ConvI = 0xD3, "conv.i", None, Next;
    /// Checked to native int
    ConvOvfI = 0xD4, "conv.ovf.i", None, Next;
    /// Checked to native unsigned int
    ConvOvfU = 0xD5, "conv.ovf.u", None, Next;
    /// Add with signed overflow check
    AddOvf = 0xD6, "add.ovf", None, Next;
    /// Add with unsigned overflow check
    AddOvfUn = 0xD7, "add.ovf.un", None, Next;
    /// Multiply with signed overflow check
    MulOvf = 0xD8, "mul.ovf", None, Next;
    /// Multiply with unsigned overflow check
    MulOvfUn = 0xD9, "mul.ovf.un", None, Next;
    /// Subtract with signed overflow check
    SubOvf = 0xDA, "sub.ovf", None, Next;
    /// Subtract with unsigned overflow check
    SubOvfUn = 0xDB, "sub.ovf.un", None, Next;
    /// End a finally or fault handler
    Endfinally = 0xDC, "endfinally", None, Return;
    /// Exit a protected region (operand: i32 displacement)
    Leave = 0xDD, "leave", BrTarget, Branch;
    /// Exit a protected region (operand: i8 displacement)
    LeaveS = 0xDE, "leave.s", ShortBrTarget, Branch;
    /// Store native int through a pointer
    StindI = 0xDF, "stind.i", None, Next;
    /// Convert to native unsigned int
    ConvU = 0xE0, "conv.u", None, Next;

    // ===== Second page (0xFE 0x00-0x1E) =====
    /// Push the argument-list handle
    Arglist = 0xFE00, "arglist", None, Next;
    /// Compare equal
    Ceq = 0xFE01, "ceq", None, Next;
    /// Compare greater
    Cgt = 0xFE02, "cgt", None, Next;
    /// Compare greater, unsigned or unordered
    CgtUn = 0xFE03, "cgt.un", None, Next;
    /// Compare less
    Clt = 0xFE04, "clt", None, Next;
    /// Compare less, unsigned or unordered
    CltUn = 0xFE05, "clt.un", None, Next;
    /// Push a method pointer (operand: method)
    Ldftn = 0xFE06, "ldftn", Method, Next;
    /// Push a virtual method pointer (operand: method)
    Ldvirtftn = 0xFE07, "ldvirtftn", Method, Next;
    /// Load argument (operand: u16 index)
    Ldarg = 0xFE09, "ldarg", Var, Next;
    /// Load argument address (operand: u16 index)
    Ldarga = 0xFE0A, "ldarga", Var, Next;
    /// Store to argument (operand: u16 index)
    Starg = 0xFE0B, "starg", Var, Next;
    /// Load local (operand: u16 index)
    Ldloc = 0xFE0C, "ldloc", Var, Next;
    /// Load local address (operand: u16 index)
    Ldloca = 0xFE0D, "ldloca", Var, Next;
    /// Store to local (operand: u16 index)
    Stloc = 0xFE0E, "stloc", Var, Next;
    /// Allocate from the local memory pool
    Localloc = 0xFE0F, "localloc", None, Next;
    /// End a filter clause
    Endfilter = 0xFE11, "endfilter", None, Return;
    /// Next pointer access may be unaligned (operand: u8 alignment)
    Unaligned = 0xFE12, "unaligned.", ShortI, Meta;
    /// Next pointer access is volatile
    Volatile = 0xFE13, "volatile.", None, Meta;
    /// Next call is a tail call
    Tail = 0xFE14, "tail.", None, Meta;
    /// Zero-initialize a value type (operand: type)
    Initobj = 0xFE15, "initobj", Type, Next;
    /// Constrain the next virtual call (operand: type)
    Constrained = 0xFE16, "constrained.", Type, Meta;
    /// Copy a memory block
    Cpblk = 0xFE17, "cpblk", None, Next;
    /// Initialize a memory block
    Initblk = 0xFE18, "initblk", None, Next;
    /// Skip the given fault checks on the next instruction (operand: u8 flags)
    No = 0xFE19, "no.", ShortI, Meta;
    /// Rethrow the current exception
    Rethrow = 0xFE1A, "rethrow", None, Throw;
    /// Push the size of a type (operand: type)
    Sizeof = 0xFE1C, "sizeof", Type, Next;
    /// Push the type token of a typed reference
    Refanytype = 0xFE1D, "refanytype", None, Next;
    /// Next array address is read-only
    Readonly = 0xFE1E, "readonly.", None, Meta;
}

impl OpCode {
    /// Encoded value (`0xFE00 | b` for second-page opcodes)
    pub fn value(self) -> u16 {
        self as u16
    }

    /// Whether the opcode lives on the `0xFE` page
    pub fn is_extended(self) -> bool {
        self.value() > 0xFF
    }

    /// Number of bytes the opcode itself occupies (1 or 2)
    pub fn opcode_size(self) -> usize {
        if self.is_extended() {
            2
        } else {
            1
        }
    }

    /// Encoded size of the opcode plus its fixed operand
    ///
    /// A `switch` additionally carries four bytes per target.
    pub fn size(self) -> usize {
        self.opcode_size() + self.operand_kind().size()
    }

    /// Bytes as they appear in the stream
    pub fn encode(self) -> ([u8; 2], usize) {
        let value = self.value();
        if self.is_extended() {
            ([EXTENDED_PREFIX, (value & 0xFF) as u8], 2)
        } else {
            ([value as u8, 0], 1)
        }
    }

    /// Check if this opcode takes a label operand
    pub fn is_branch(self) -> bool {
        matches!(
            self.operand_kind(),
            OperandKind::ShortBrTarget | OperandKind::BrTarget | OperandKind::Switch
        )
    }

    /// Check if this opcode is a prefix
    pub fn is_prefix(self) -> bool {
        self.flow_control() == FlowControl::Meta
    }

    /// Check if this opcode ends a basic block
    pub fn is_terminator(self) -> bool {
        matches!(
            self.flow_control(),
            FlowControl::Branch | FlowControl::CondBranch | FlowControl::Return | FlowControl::Throw
        ) || self == Self::Jmp
    }

    /// Short-displacement counterpart of a long branch
    pub fn short_form(self) -> Option<Self> {
        let short = match self {
            Self::Br => Self::BrS,
            Self::Brfalse => Self::BrfalseS,
            Self::Brtrue => Self::BrtrueS,
            Self::Beq => Self::BeqS,
            Self::Bge => Self::BgeS,
            Self::Bgt => Self::BgtS,
            Self::Ble => Self::BleS,
            Self::Blt => Self::BltS,
            Self::BneUn => Self::BneUnS,
            Self::BgeUn => Self::BgeUnS,
            Self::BgtUn => Self::BgtUnS,
            Self::BleUn => Self::BleUnS,
            Self::BltUn => Self::BltUnS,
            Self::Leave => Self::LeaveS,
            _ => return None,
        };
        Some(short)
    }

    /// Long-displacement counterpart of a short branch
    pub fn long_form(self) -> Option<Self> {
        let long = match self {
            Self::BrS => Self::Br,
            Self::BrfalseS => Self::Brfalse,
            Self::BrtrueS => Self::Brtrue,
            Self::BeqS => Self::Beq,
            Self::BgeS => Self::Bge,
            Self::BgtS => Self::Bgt,
            Self::BleS => Self::Ble,
            Self::BltS => Self::Blt,
            Self::BneUnS => Self::BneUn,
            Self::BgeUnS => Self::BgeUn,
            Self::BgtUnS => Self::BgtUn,
            Self::BleUnS => Self::BleUn,
            Self::BltUnS => Self::BltUn,
            Self::LeaveS => Self::Leave,
            _ => return None,
        };
        Some(long)
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_roundtrip() {
        for opcode in OpCode::ALL {
            assert_eq!(
                OpCode::from_value(opcode.value()),
                Some(*opcode),
                "Failed roundtrip for {:?}",
                opcode
            );
        }
    }

    #[test]
    fn test_invalid_opcode() {
        assert_eq!(OpCode::from_value(0x24), None);
        assert_eq!(OpCode::from_value(0x77), None);
        assert_eq!(OpCode::from_value(0xE1), None);
        assert_eq!(OpCode::from_value(0xFE08), None);
        assert_eq!(OpCode::from_value(0xFE1F), None);
    }

    #[test]
    fn test_opcode_names() {
        assert_eq!(OpCode::Nop.name(), "nop");
        assert_eq!(OpCode::LdcI4M1.name(), "ldc.i4.m1");
        assert_eq!(OpCode::BneUnS.name(), "bne.un.s");
        assert_eq!(OpCode::ConvOvfU8Un.name(), "conv.ovf.u8.un");
        assert_eq!(OpCode::Constrained.to_string(), "constrained.");
    }

    #[test]
    fn test_names_are_unique() {
        let mut names: Vec<_> = OpCode::ALL.iter().map(|op| op.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), OpCode::ALL.len());
    }

    #[test]
    fn test_sizes() {
        assert_eq!(OpCode::Ldarg0.size(), 1);
        assert_eq!(OpCode::LdargS.size(), 2);
        assert_eq!(OpCode::Ldarg.size(), 4);
        assert_eq!(OpCode::LdcI4S.size(), 2);
        assert_eq!(OpCode::LdcI4.size(), 5);
        assert_eq!(OpCode::LdcI8.size(), 9);
        assert_eq!(OpCode::LdcR4.size(), 5);
        assert_eq!(OpCode::LdcR8.size(), 9);
        assert_eq!(OpCode::BrS.size(), 2);
        assert_eq!(OpCode::Br.size(), 5);
        assert_eq!(OpCode::Switch.size(), 5);
        assert_eq!(OpCode::Ceq.size(), 2);
        assert_eq!(OpCode::Unaligned.size(), 3);
        assert_eq!(OpCode::Initobj.size(), 6);
    }

    #[test]
    fn test_encode() {
        assert_eq!(OpCode::Ret.encode(), ([0x2A, 0], 1));
        assert_eq!(OpCode::Ceq.encode(), ([0xFE, 0x01], 2));
        assert!(OpCode::Readonly.is_extended());
        assert!(!OpCode::ConvU.is_extended());
    }

    #[test]
    fn test_branch_pairs() {
        for opcode in OpCode::ALL {
            if let Some(short) = opcode.short_form() {
                assert_eq!(short.operand_kind(), OperandKind::ShortBrTarget);
                assert_eq!(short.long_form(), Some(*opcode));
                assert_eq!(short.flow_control(), opcode.flow_control());
            }
        }
        assert_eq!(OpCode::Switch.short_form(), None);
        assert_eq!(OpCode::Call.long_form(), None);
    }

    #[test]
    fn test_flow_classification() {
        assert!(OpCode::Br.is_branch());
        assert!(OpCode::LeaveS.is_branch());
        assert!(OpCode::Switch.is_branch());
        assert!(!OpCode::Call.is_branch());

        assert!(OpCode::Ret.is_terminator());
        assert!(OpCode::Throw.is_terminator());
        assert!(OpCode::Rethrow.is_terminator());
        assert!(OpCode::Jmp.is_terminator());
        assert!(!OpCode::Call.is_terminator());
        assert!(!OpCode::Add.is_terminator());

        assert!(OpCode::Tail.is_prefix());
        assert!(OpCode::Unaligned.is_prefix());
        assert!(!OpCode::Ldobj.is_prefix());
    }

    #[test]
    fn test_token_operands() {
        assert!(OpCode::Ldstr.operand_kind().is_token());
        assert!(OpCode::Calli.operand_kind().is_token());
        assert!(!OpCode::LdcI4.operand_kind().is_token());
        assert!(!OpCode::Br.operand_kind().is_token());
    }
}
