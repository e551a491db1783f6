//! Type-directed opcode selection
//!
//! Element, indirect and conversion families dispatch over the closed
//! [`TypeCode`] set. Anything outside the specialized opcodes either falls
//! back to the generic token-carrying form or is rejected.

use super::NumericMode;
use crate::error::{EmitError, EmitResult};
use crate::instruction::{Immediate, Instruction};
use crate::metadata::{FieldRef, MethodRef, Symbol, TypeCode, TypeRef};
use quill_bytecode::OpCode;

/// Specialized opcode for a memory access family, `None` when the family
/// needs its generic typed form
struct TypedFamily {
    operation: &'static str,
    generic: OpCode,
    select: fn(TypeCode) -> Option<OpCode>,
}

fn ldelem_for(code: TypeCode) -> Option<OpCode> {
    use TypeCode::*;
    Some(match code {
        SByte => OpCode::LdelemI1,
        Boolean | Byte => OpCode::LdelemU1,
        Int16 => OpCode::LdelemI2,
        Char | UInt16 => OpCode::LdelemU2,
        Int32 => OpCode::LdelemI4,
        UInt32 => OpCode::LdelemU4,
        Int64 | UInt64 => OpCode::LdelemI8,
        Single => OpCode::LdelemR4,
        Double => OpCode::LdelemR8,
        IntPtr | UIntPtr | Pointer => OpCode::LdelemI,
        String | Object | Class | Array => OpCode::LdelemRef,
        Void | ValueType | GenericParameter | ByRef => return None,
    })
}

fn stelem_for(code: TypeCode) -> Option<OpCode> {
    use TypeCode::*;
    Some(match code {
        Boolean | SByte | Byte => OpCode::StelemI1,
        Char | Int16 | UInt16 => OpCode::StelemI2,
        Int32 | UInt32 => OpCode::StelemI4,
        Int64 | UInt64 => OpCode::StelemI8,
        Single => OpCode::StelemR4,
        Double => OpCode::StelemR8,
        IntPtr | UIntPtr | Pointer => OpCode::StelemI,
        String | Object | Class | Array => OpCode::StelemRef,
        Void | ValueType | GenericParameter | ByRef => return None,
    })
}

fn ldind_for(code: TypeCode) -> Option<OpCode> {
    use TypeCode::*;
    Some(match code {
        SByte => OpCode::LdindI1,
        Boolean | Byte => OpCode::LdindU1,
        Int16 => OpCode::LdindI2,
        Char | UInt16 => OpCode::LdindU2,
        Int32 => OpCode::LdindI4,
        UInt32 => OpCode::LdindU4,
        Int64 | UInt64 => OpCode::LdindI8,
        Single => OpCode::LdindR4,
        Double => OpCode::LdindR8,
        IntPtr | UIntPtr | Pointer => OpCode::LdindI,
        String | Object | Class | Array => OpCode::LdindRef,
        Void | ValueType | GenericParameter | ByRef => return None,
    })
}

fn stind_for(code: TypeCode) -> Option<OpCode> {
    use TypeCode::*;
    Some(match code {
        Boolean | SByte | Byte => OpCode::StindI1,
        Char | Int16 | UInt16 => OpCode::StindI2,
        Int32 | UInt32 => OpCode::StindI4,
        Int64 | UInt64 => OpCode::StindI8,
        Single => OpCode::StindR4,
        Double => OpCode::StindR8,
        IntPtr | UIntPtr | Pointer => OpCode::StindI,
        String | Object | Class | Array => OpCode::StindRef,
        Void | ValueType | GenericParameter | ByRef => return None,
    })
}

const LDELEM: TypedFamily = TypedFamily {
    operation: "ldelem",
    generic: OpCode::Ldelem,
    select: ldelem_for,
};

const STELEM: TypedFamily = TypedFamily {
    operation: "stelem",
    generic: OpCode::Stelem,
    select: stelem_for,
};

const LDIND: TypedFamily = TypedFamily {
    operation: "ldind",
    generic: OpCode::Ldobj,
    select: ldind_for,
};

const STIND: TypedFamily = TypedFamily {
    operation: "stind",
    generic: OpCode::Stobj,
    select: stind_for,
};

impl TypedFamily {
    fn encode(&self, ty: &TypeRef) -> EmitResult<Instruction> {
        if ty.code() == TypeCode::Void {
            return Err(EmitError::unsupported(self.operation, ty));
        }
        Ok(match (self.select)(ty.code()) {
            Some(opcode) => Instruction::Op(opcode),
            None => Instruction::Symbol(self.generic, Symbol::Type(ty.clone())),
        })
    }
}

/// Load an array element of type `ty`
pub fn load_element(ty: &TypeRef) -> EmitResult<Instruction> {
    LDELEM.encode(ty)
}

/// Store an array element of type `ty`
pub fn store_element(ty: &TypeRef) -> EmitResult<Instruction> {
    STELEM.encode(ty)
}

/// Load a value of type `ty` through a pointer
pub fn load_indirect(ty: &TypeRef) -> EmitResult<Instruction> {
    LDIND.encode(ty)
}

/// Store a value of type `ty` through a pointer
pub fn store_indirect(ty: &TypeRef) -> EmitResult<Instruction> {
    STIND.encode(ty)
}

/// Numeric conversion to `target`.
///
/// `mode.unsigned` reinterprets the source as unsigned; with `mode.checked`
/// this picks the `.ovf.*.un` variant. Unchecked unsigned conversion to a
/// float is `conv.r.un`.
pub fn convert(target: TypeCode, mode: NumericMode) -> EmitResult<Instruction> {
    use TypeCode::*;
    let opcode = match (mode.checked, mode.unsigned, target) {
        (false, _, SByte) => OpCode::ConvI1,
        (false, _, Int16) => OpCode::ConvI2,
        (false, _, Int32) => OpCode::ConvI4,
        (false, _, Int64) => OpCode::ConvI8,
        (false, _, Byte | Boolean) => OpCode::ConvU1,
        (false, _, UInt16 | Char) => OpCode::ConvU2,
        (false, _, UInt32) => OpCode::ConvU4,
        (false, _, UInt64) => OpCode::ConvU8,
        (false, _, IntPtr) => OpCode::ConvI,
        (false, _, UIntPtr | Pointer) => OpCode::ConvU,
        (false, true, Single | Double) => OpCode::ConvRUn,
        (false, false, Single) => OpCode::ConvR4,
        (false, false, Double) => OpCode::ConvR8,

        (true, false, SByte) => OpCode::ConvOvfI1,
        (true, false, Int16) => OpCode::ConvOvfI2,
        (true, false, Int32) => OpCode::ConvOvfI4,
        (true, false, Int64) => OpCode::ConvOvfI8,
        (true, false, Byte | Boolean) => OpCode::ConvOvfU1,
        (true, false, UInt16 | Char) => OpCode::ConvOvfU2,
        (true, false, UInt32) => OpCode::ConvOvfU4,
        (true, false, UInt64) => OpCode::ConvOvfU8,
        (true, false, IntPtr) => OpCode::ConvOvfI,
        (true, false, UIntPtr | Pointer) => OpCode::ConvOvfU,

        (true, true, SByte) => OpCode::ConvOvfI1Un,
        (true, true, Int16) => OpCode::ConvOvfI2Un,
        (true, true, Int32) => OpCode::ConvOvfI4Un,
        (true, true, Int64) => OpCode::ConvOvfI8Un,
        (true, true, Byte | Boolean) => OpCode::ConvOvfU1Un,
        (true, true, UInt16 | Char) => OpCode::ConvOvfU2Un,
        (true, true, UInt32) => OpCode::ConvOvfU4Un,
        (true, true, UInt64) => OpCode::ConvOvfU8Un,
        (true, true, IntPtr) => OpCode::ConvOvfIUn,
        (true, true, UIntPtr | Pointer) => OpCode::ConvOvfUUn,

        _ => return Err(EmitError::unsupported("conv", target)),
    };
    Ok(Instruction::Op(opcode))
}

/// `ldfld` or `ldsfld`
pub fn load_field(field: &FieldRef) -> Instruction {
    let opcode = if field.is_static() {
        OpCode::Ldsfld
    } else {
        OpCode::Ldfld
    };
    Instruction::Symbol(opcode, Symbol::Field(field.clone()))
}

/// `ldflda` or `ldsflda`
pub fn field_address(field: &FieldRef) -> Instruction {
    let opcode = if field.is_static() {
        OpCode::Ldsflda
    } else {
        OpCode::Ldflda
    };
    Instruction::Symbol(opcode, Symbol::Field(field.clone()))
}

/// `stfld` or `stsfld`
pub fn store_field(field: &FieldRef) -> Instruction {
    let opcode = if field.is_static() {
        OpCode::Stsfld
    } else {
        OpCode::Stfld
    };
    Instruction::Symbol(opcode, Symbol::Field(field.clone()))
}

/// Call `method`, using `callvirt` for every instance method on a reference
/// type.
///
/// `callvirt` also null-checks the receiver, so it is used even for
/// non-virtual instance methods. Static methods and methods on value types
/// use `call`.
pub fn call(method: &MethodRef) -> Instruction {
    let opcode = if method.is_static() || method.declaring_type().is_value_type() {
        OpCode::Call
    } else {
        OpCode::Callvirt
    };
    Instruction::Symbol(opcode, Symbol::Method(method.clone()))
}

/// Non-virtual `call`, whatever the method's shape
pub fn call_direct(method: &MethodRef) -> Instruction {
    Instruction::Symbol(OpCode::Call, Symbol::Method(method.clone()))
}

/// `unaligned.` prefix; only 1, 2 and 4 byte alignments exist
pub fn unaligned(alignment: u8) -> EmitResult<Instruction> {
    match alignment {
        1 | 2 | 4 => Ok(Instruction::Immediate(
            OpCode::Unaligned,
            Immediate::U8(alignment),
        )),
        other => Err(EmitError::out_of_range("alignment", other, "1, 2 or 4")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::FieldScope;

    fn prim(code: TypeCode) -> TypeRef {
        TypeRef::primitive(code)
    }

    fn opcode(result: EmitResult<Instruction>) -> OpCode {
        result.unwrap().opcode().unwrap()
    }

    #[test]
    fn test_element_dispatch() {
        assert_eq!(opcode(load_element(&prim(TypeCode::Byte))), OpCode::LdelemU1);
        assert_eq!(opcode(load_element(&prim(TypeCode::Char))), OpCode::LdelemU2);
        assert_eq!(opcode(load_element(&prim(TypeCode::UInt64))), OpCode::LdelemI8);
        assert_eq!(opcode(load_element(&prim(TypeCode::IntPtr))), OpCode::LdelemI);
        assert_eq!(opcode(load_element(&prim(TypeCode::String))), OpCode::LdelemRef);
        assert_eq!(opcode(store_element(&prim(TypeCode::Byte))), OpCode::StelemI1);
        assert_eq!(opcode(store_element(&prim(TypeCode::Double))), OpCode::StelemR8);
    }

    #[test]
    fn test_element_falls_back_to_generic() {
        let point = TypeRef::new("Point", TypeCode::ValueType, 0x0200_0001);
        assert_eq!(
            load_element(&point).unwrap(),
            Instruction::Symbol(OpCode::Ldelem, Symbol::Type(point.clone()))
        );
        assert_eq!(
            store_indirect(&point).unwrap(),
            Instruction::Symbol(OpCode::Stobj, Symbol::Type(point.clone()))
        );
        let generic = TypeRef::new("T", TypeCode::GenericParameter, 0x2A00_0001);
        assert_eq!(opcode(load_indirect(&generic)), OpCode::Ldobj);
    }

    #[test]
    fn test_void_is_unsupported() {
        let err = load_element(&prim(TypeCode::Void)).unwrap_err();
        assert!(matches!(err, EmitError::UnsupportedOperand { .. }));
        assert!(store_indirect(&prim(TypeCode::Void)).is_err());
    }

    #[test]
    fn test_indirect_dispatch() {
        assert_eq!(opcode(load_indirect(&prim(TypeCode::SByte))), OpCode::LdindI1);
        assert_eq!(opcode(load_indirect(&prim(TypeCode::UInt32))), OpCode::LdindU4);
        assert_eq!(opcode(store_indirect(&prim(TypeCode::UInt16))), OpCode::StindI2);
        assert_eq!(opcode(store_indirect(&prim(TypeCode::Object))), OpCode::StindRef);
    }

    #[test]
    fn test_booleans_load_unsigned() {
        let boolean = prim(TypeCode::Boolean);
        assert_eq!(opcode(load_element(&boolean)), OpCode::LdelemU1);
        assert_eq!(opcode(load_indirect(&boolean)), OpCode::LdindU1);
        assert_eq!(opcode(store_element(&boolean)), OpCode::StelemI1);
    }

    #[test]
    fn test_conversions() {
        assert_eq!(opcode(convert(TypeCode::Int32, NumericMode::PLAIN)), OpCode::ConvI4);
        assert_eq!(opcode(convert(TypeCode::Byte, NumericMode::UNSIGNED)), OpCode::ConvU1);
        assert_eq!(
            opcode(convert(TypeCode::Double, NumericMode::UNSIGNED)),
            OpCode::ConvRUn
        );
        assert_eq!(opcode(convert(TypeCode::Single, NumericMode::PLAIN)), OpCode::ConvR4);
        assert_eq!(
            opcode(convert(TypeCode::Int16, NumericMode::CHECKED)),
            OpCode::ConvOvfI2
        );
        assert_eq!(
            opcode(convert(TypeCode::UInt64, NumericMode::CHECKED_UNSIGNED)),
            OpCode::ConvOvfU8Un
        );
    }

    #[test]
    fn test_unrecognized_conversion_fails() {
        assert!(convert(TypeCode::String, NumericMode::PLAIN).is_err());
        assert!(convert(TypeCode::Double, NumericMode::CHECKED).is_err());
        assert!(convert(TypeCode::ValueType, NumericMode::PLAIN).is_err());
    }

    #[test]
    fn test_field_scope_dispatch() {
        let owner = TypeRef::new("Counter", TypeCode::Class, 1);
        let int32 = prim(TypeCode::Int32);
        let total = FieldRef::new(owner.clone(), "total", int32.clone(), FieldScope::Static, 2);
        let count = FieldRef::new(owner, "count", int32, FieldScope::Instance, 3);

        assert_eq!(load_field(&total).opcode(), Some(OpCode::Ldsfld));
        assert_eq!(load_field(&count).opcode(), Some(OpCode::Ldfld));
        assert_eq!(field_address(&total).opcode(), Some(OpCode::Ldsflda));
        assert_eq!(store_field(&count).opcode(), Some(OpCode::Stfld));
        assert_eq!(store_field(&total).opcode(), Some(OpCode::Stsfld));
    }

    #[test]
    fn test_call_dispatch() {
        let widget = TypeRef::new("Widget", TypeCode::Class, 1);
        let point = TypeRef::new("Point", TypeCode::ValueType, 2);

        let instance = MethodRef::new(widget.clone(), "Draw", 10);
        let factory = MethodRef::new(widget, "Create", 11).with_static(true);
        let length = MethodRef::new(point, "Length", 12);

        assert_eq!(call(&instance).opcode(), Some(OpCode::Callvirt));
        assert_eq!(call(&factory).opcode(), Some(OpCode::Call));
        assert_eq!(call(&length).opcode(), Some(OpCode::Call));
        assert_eq!(call_direct(&instance).opcode(), Some(OpCode::Call));
    }

    #[test]
    fn test_unaligned_domain() {
        assert!(unaligned(1).is_ok());
        assert!(unaligned(2).is_ok());
        assert!(unaligned(4).is_ok());
        assert!(unaligned(0).unwrap_err().is_range());
        assert!(unaligned(3).unwrap_err().is_range());
        assert!(unaligned(8).unwrap_err().is_range());
    }
}
