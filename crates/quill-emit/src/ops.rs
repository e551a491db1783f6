//! Named operations
//!
//! Every method resolves to one encoder call and appends the result. Most
//! return the emitter again so calls chain with `?`.

use crate::emit::Emit;
use crate::encode::{self, Arithmetic, Comparison, Condition, NumericMode};
use crate::error::{EmitError, EmitResult};
use crate::instruction::{Instruction, Pseudo};
use crate::metadata::{
    CallSite, ConstructorRef, FieldRef, MethodRef, Symbol, TypeCode, TypeRef,
};
use crate::region::TryBlock;
use crate::symbols::{Label, Local};
use quill_bytecode::OpCode;

macro_rules! bare_ops {
    ($($(#[$meta:meta])* $name:ident => $opcode:ident;)*) => {
        $(
            $(#[$meta])*
            fn $name(&mut self) -> EmitResult<&mut Self> {
                self.emit(Instruction::Op(OpCode::$opcode))
            }
        )*
    };
}

macro_rules! type_ops {
    ($($(#[$meta:meta])* $name:ident => $opcode:ident;)*) => {
        $(
            $(#[$meta])*
            fn $name(&mut self, ty: &TypeRef) -> EmitResult<&mut Self> {
                self.emit(Instruction::Symbol(OpCode::$opcode, Symbol::Type(ty.clone())))
            }
        )*
    };
}

macro_rules! branch_ops {
    ($($(#[$meta:meta])* $name:ident => $condition:ident;)*) => {
        $(
            $(#[$meta])*
            fn $name(&mut self, target: &Label) -> EmitResult<&mut Self> {
                self.branch(Condition::$condition, false, target)
            }
        )*
    };
}

macro_rules! relational_branch_ops {
    ($($(#[$meta:meta])* $name:ident => $condition:ident;)*) => {
        $(
            $(#[$meta])*
            fn $name(&mut self, target: &Label, unsigned: bool) -> EmitResult<&mut Self> {
                self.branch(Condition::$condition, unsigned, target)
            }
        )*
    };
}

/// The named operation surface
pub trait Operations: Emit {
    // ===== Arguments and locals =====

    fn ldarg(&mut self, index: usize) -> EmitResult<&mut Self> {
        self.emit(encode::load_argument(index)?)
    }

    fn ldarga(&mut self, index: usize) -> EmitResult<&mut Self> {
        self.emit(encode::load_argument_address(index)?)
    }

    fn starg(&mut self, index: usize) -> EmitResult<&mut Self> {
        self.emit(encode::store_argument(index)?)
    }

    fn ldloc(&mut self, local: &Local) -> EmitResult<&mut Self> {
        self.emit(encode::load_local(local))
    }

    fn ldloca(&mut self, local: &Local) -> EmitResult<&mut Self> {
        self.emit(encode::load_local_address(local))
    }

    fn stloc(&mut self, local: &Local) -> EmitResult<&mut Self> {
        self.emit(encode::store_local(local))
    }

    // ===== Constants =====

    fn ldc_i4(&mut self, value: i32) -> EmitResult<&mut Self> {
        self.emit(encode::load_int32(value))
    }

    fn ldc_i8(&mut self, value: i64) -> EmitResult<&mut Self> {
        self.emit(encode::load_int64(value))
    }

    fn ldc_r4(&mut self, value: f32) -> EmitResult<&mut Self> {
        self.emit(encode::load_float32(value))
    }

    fn ldc_r8(&mut self, value: f64) -> EmitResult<&mut Self> {
        self.emit(encode::load_float64(value))
    }

    fn ldc_bool(&mut self, value: bool) -> EmitResult<&mut Self> {
        self.emit(encode::load_int32(i32::from(value)))
    }

    fn ldstr(&mut self, value: &str) -> EmitResult<&mut Self> {
        self.emit(encode::load_string(value))
    }

    /// Push the runtime handle of a type, field or method
    fn ldtoken(&mut self, symbol: impl Into<Symbol>) -> EmitResult<&mut Self> {
        self.emit(Instruction::Symbol(OpCode::Ldtoken, symbol.into()))
    }

    /// Push the type object for `ty` (`ldtoken` + the host's type-from-handle call).
    ///
    /// Fails with an unsupported-operand error when the emitter was built
    /// without a `type_from_handle` host method.
    fn load_type(&mut self, ty: &TypeRef) -> EmitResult<&mut Self> {
        let helper = self
            .host()
            .type_from_handle
            .clone()
            .ok_or_else(|| EmitError::unsupported("load_type", ty))?;
        self.ldtoken(ty.clone())?;
        self.emit(encode::call_direct(&helper))
    }

    bare_ops! {
        arglist => Arglist;
        ldnull => Ldnull;
        nop => Nop;
        /// Debugger breakpoint
        break_ => Break;
        dup => Dup;
        pop => Pop;
        ret => Ret;
        throw => Throw;
        rethrow => Rethrow;
        endfinally => Endfinally;
        endfilter => Endfilter;
        ckfinite => Ckfinite;
        localloc => Localloc;
        cpblk => Cpblk;
        initblk => Initblk;
        neg => Neg;
        and => And;
        or => Or;
        xor => Xor;
        /// Bitwise complement
        not => Not;
        shl => Shl;
        ceq => Ceq;
        conv_r_un => ConvRUn;
        ldlen => Ldlen;
        refanytype => Refanytype;
        volatile => Volatile;
        tail => Tail;
        readonly => Readonly;
    }

    fn jmp(&mut self, method: &MethodRef) -> EmitResult<&mut Self> {
        self.emit(Instruction::Symbol(OpCode::Jmp, Symbol::Method(method.clone())))
    }

    // ===== Branches =====

    /// Branch with the form picked from the label and the configured encoding
    fn branch(
        &mut self,
        condition: Condition,
        unsigned: bool,
        target: &Label,
    ) -> EmitResult<&mut Self> {
        let encoding = self.options().branch_encoding;
        self.emit(encode::branch(condition, unsigned, target, encoding))
    }

    branch_ops! {
        br => Always;
        /// Exit a protected region
        leave => Leave;
        brtrue => IfTrue;
        brfalse => IfFalse;
        beq => Equal;
        /// Branch when not equal or unordered
        bne_un => NotEqual;
    }

    relational_branch_ops! {
        bge => GreaterOrEqual;
        bgt => Greater;
        ble => LessOrEqual;
        blt => Less;
    }

    fn switch(&mut self, targets: &[Label]) -> EmitResult<&mut Self> {
        self.emit(encode::switch(targets))
    }

    // ===== Arithmetic =====

    fn add(&mut self, mode: NumericMode) -> EmitResult<&mut Self> {
        self.emit(encode::arithmetic(Arithmetic::Add, mode))
    }

    fn sub(&mut self, mode: NumericMode) -> EmitResult<&mut Self> {
        self.emit(encode::arithmetic(Arithmetic::Subtract, mode))
    }

    fn mul(&mut self, mode: NumericMode) -> EmitResult<&mut Self> {
        self.emit(encode::arithmetic(Arithmetic::Multiply, mode))
    }

    fn div(&mut self, unsigned: bool) -> EmitResult<&mut Self> {
        self.emit(encode::divide(unsigned))
    }

    fn rem(&mut self, unsigned: bool) -> EmitResult<&mut Self> {
        self.emit(encode::remainder(unsigned))
    }

    fn shr(&mut self, unsigned: bool) -> EmitResult<&mut Self> {
        self.emit(encode::shift_right(unsigned))
    }

    // ===== Comparison =====

    fn compare(&mut self, comparison: Comparison, unsigned: bool) -> EmitResult<&mut Self> {
        for instruction in encode::compare(comparison, unsigned) {
            self.append(instruction)?;
        }
        Ok(self)
    }

    fn cgt(&mut self, unsigned: bool) -> EmitResult<&mut Self> {
        self.compare(Comparison::Greater, unsigned)
    }

    fn clt(&mut self, unsigned: bool) -> EmitResult<&mut Self> {
        self.compare(Comparison::Less, unsigned)
    }

    /// `>=` as `clt` + `not`
    fn cge(&mut self, unsigned: bool) -> EmitResult<&mut Self> {
        self.compare(Comparison::GreaterOrEqual, unsigned)
    }

    /// `<=` as `cgt` + `not`
    fn cle(&mut self, unsigned: bool) -> EmitResult<&mut Self> {
        self.compare(Comparison::LessOrEqual, unsigned)
    }

    // ===== Conversion =====

    fn conv(&mut self, target: TypeCode, mode: NumericMode) -> EmitResult<&mut Self> {
        self.emit(encode::convert(target, mode)?)
    }

    // ===== Objects =====

    fn newobj(&mut self, ctor: &ConstructorRef) -> EmitResult<&mut Self> {
        self.emit(Instruction::Symbol(
            OpCode::Newobj,
            Symbol::Constructor(ctor.clone()),
        ))
    }

    type_ops! {
        /// New zero-based array of `ty`
        newarr => Newarr;
        box_ => Box;
        unbox => Unbox;
        unbox_any => UnboxAny;
        castclass => Castclass;
        isinst => Isinst;
        initobj => Initobj;
        cpobj => Cpobj;
        ldobj => Ldobj;
        stobj => Stobj;
        sizeof => Sizeof;
        mkrefany => Mkrefany;
        refanyval => Refanyval;
        ldelema => Ldelema;
        /// Prefix for a call on a generic receiver
        constrained => Constrained;
    }

    fn ldftn(&mut self, method: &MethodRef) -> EmitResult<&mut Self> {
        self.emit(Instruction::Symbol(OpCode::Ldftn, Symbol::Method(method.clone())))
    }

    fn ldvirtftn(&mut self, method: &MethodRef) -> EmitResult<&mut Self> {
        self.emit(Instruction::Symbol(
            OpCode::Ldvirtftn,
            Symbol::Method(method.clone()),
        ))
    }

    // ===== Typed element and indirect access =====

    fn ldelem(&mut self, ty: &TypeRef) -> EmitResult<&mut Self> {
        self.emit(encode::load_element(ty)?)
    }

    fn stelem(&mut self, ty: &TypeRef) -> EmitResult<&mut Self> {
        self.emit(encode::store_element(ty)?)
    }

    fn ldind(&mut self, ty: &TypeRef) -> EmitResult<&mut Self> {
        self.emit(encode::load_indirect(ty)?)
    }

    fn stind(&mut self, ty: &TypeRef) -> EmitResult<&mut Self> {
        self.emit(encode::store_indirect(ty)?)
    }

    // ===== Fields =====

    fn ldfld(&mut self, field: &FieldRef) -> EmitResult<&mut Self> {
        self.emit(encode::load_field(field))
    }

    fn ldflda(&mut self, field: &FieldRef) -> EmitResult<&mut Self> {
        self.emit(encode::field_address(field))
    }

    fn stfld(&mut self, field: &FieldRef) -> EmitResult<&mut Self> {
        self.emit(encode::store_field(field))
    }

    // ===== Calls =====

    /// `call` for static and value-type methods, `callvirt` otherwise
    fn call(&mut self, method: &MethodRef) -> EmitResult<&mut Self> {
        self.emit(encode::call(method))
    }

    fn call_direct(&mut self, method: &MethodRef) -> EmitResult<&mut Self> {
        self.emit(encode::call_direct(method))
    }

    fn callvirt(&mut self, method: &MethodRef) -> EmitResult<&mut Self> {
        self.emit(Instruction::Symbol(
            OpCode::Callvirt,
            Symbol::Method(method.clone()),
        ))
    }

    fn call_varargs(&mut self, method: &MethodRef, optional: &[TypeRef]) -> EmitResult<&mut Self> {
        self.emit(Instruction::Pseudo(Pseudo::CallVarargs {
            method: method.clone(),
            optional: optional.to_vec(),
        }))
    }

    fn calli(&mut self, site: CallSite) -> EmitResult<&mut Self> {
        self.emit(Instruction::Pseudo(Pseudo::Calli(site)))
    }

    // ===== Prefixes =====

    /// `unaligned.` prefix; `alignment` must be 1, 2 or 4
    fn unaligned(&mut self, alignment: u8) -> EmitResult<&mut Self> {
        self.emit(encode::unaligned(alignment)?)
    }

    // ===== Regions =====

    /// Open a protected region and emit its body
    fn try_block<F>(&mut self, body: F) -> EmitResult<TryBlock<'_, Self>>
    where
        F: FnOnce(&mut Self) -> EmitResult<()>,
    {
        TryBlock::begin(self, body)
    }
}

impl<E: Emit> Operations for E {}
