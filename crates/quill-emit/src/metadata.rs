//! External symbol references
//!
//! Fields, methods, constructors and types are owned by the embedding
//! environment's metadata system. The assembler only looks at the few
//! category bits it needs (static or instance, value or reference type,
//! primitive tag) and carries the opaque token through to the sink.

use std::fmt;
use std::sync::Arc;

/// Closed set of type categories used for typed opcode selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeCode {
    Void,
    Boolean,
    Char,
    SByte,
    Byte,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Single,
    Double,
    IntPtr,
    UIntPtr,
    String,
    Object,
    /// Any other reference type
    Class,
    /// Any array type
    Array,
    /// Any non-primitive value type
    ValueType,
    /// Generic type or method parameter
    GenericParameter,
    /// Unmanaged pointer
    Pointer,
    /// Managed pointer
    ByRef,
}

impl TypeCode {
    /// Short display name
    pub fn name(self) -> &'static str {
        match self {
            Self::Void => "void",
            Self::Boolean => "bool",
            Self::Char => "char",
            Self::SByte => "int8",
            Self::Byte => "uint8",
            Self::Int16 => "int16",
            Self::UInt16 => "uint16",
            Self::Int32 => "int32",
            Self::UInt32 => "uint32",
            Self::Int64 => "int64",
            Self::UInt64 => "uint64",
            Self::Single => "float32",
            Self::Double => "float64",
            Self::IntPtr => "native int",
            Self::UIntPtr => "native uint",
            Self::String => "string",
            Self::Object => "object",
            Self::Class => "class",
            Self::Array => "array",
            Self::ValueType => "valuetype",
            Self::GenericParameter => "generic",
            Self::Pointer => "pointer",
            Self::ByRef => "byref",
        }
    }

    /// Whether values of this category live inline rather than behind a reference
    pub fn is_value_type(self) -> bool {
        !matches!(
            self,
            Self::String
                | Self::Object
                | Self::Class
                | Self::Array
                | Self::Void
                | Self::GenericParameter
        )
    }

    /// Whether values of this category are object references
    pub fn is_reference(self) -> bool {
        matches!(self, Self::String | Self::Object | Self::Class | Self::Array)
    }

    /// Whether the category is an integer type (including `char`, `bool` and native ints)
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Self::Boolean
                | Self::Char
                | Self::SByte
                | Self::Byte
                | Self::Int16
                | Self::UInt16
                | Self::Int32
                | Self::UInt32
                | Self::Int64
                | Self::UInt64
                | Self::IntPtr
                | Self::UIntPtr
        )
    }
}

impl fmt::Display for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Reference to a type in the host metadata system
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeRef {
    name: Arc<str>,
    code: TypeCode,
    token: u32,
}

impl TypeRef {
    pub fn new(name: impl Into<Arc<str>>, code: TypeCode, token: u32) -> Self {
        Self {
            name: name.into(),
            code,
            token,
        }
    }

    /// A primitive type named after its category, with no host token
    pub fn primitive(code: TypeCode) -> Self {
        Self::new(code.name(), code, 0)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn code(&self) -> TypeCode {
        self.code
    }

    pub fn token(&self) -> u32 {
        self.token
    }

    pub fn is_value_type(&self) -> bool {
        self.code.is_value_type()
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Whether a field belongs to an instance or to its declaring type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldScope {
    Instance,
    Static,
}

/// Reference to a field
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    name: Arc<str>,
    declaring_type: TypeRef,
    field_type: TypeRef,
    scope: FieldScope,
    token: u32,
}

impl FieldRef {
    pub fn new(
        declaring_type: TypeRef,
        name: impl Into<Arc<str>>,
        field_type: TypeRef,
        scope: FieldScope,
        token: u32,
    ) -> Self {
        Self {
            name: name.into(),
            declaring_type,
            field_type,
            scope,
            token,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declaring_type(&self) -> &TypeRef {
        &self.declaring_type
    }

    pub fn field_type(&self) -> &TypeRef {
        &self.field_type
    }

    pub fn scope(&self) -> FieldScope {
        self.scope
    }

    pub fn is_static(&self) -> bool {
        self.scope == FieldScope::Static
    }

    pub fn token(&self) -> u32 {
        self.token
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}::{}", self.field_type, self.declaring_type, self.name)
    }
}

/// Reference to a method
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodRef {
    name: Arc<str>,
    declaring_type: TypeRef,
    is_static: bool,
    return_type: TypeRef,
    parameters: Vec<TypeRef>,
    token: u32,
}

impl MethodRef {
    /// An instance method returning `void` with no parameters
    pub fn new(declaring_type: TypeRef, name: impl Into<Arc<str>>, token: u32) -> Self {
        Self {
            name: name.into(),
            declaring_type,
            is_static: false,
            return_type: TypeRef::primitive(TypeCode::Void),
            parameters: Vec::new(),
            token,
        }
    }

    pub fn with_static(mut self, is_static: bool) -> Self {
        self.is_static = is_static;
        self
    }

    pub fn returns(mut self, return_type: TypeRef) -> Self {
        self.return_type = return_type;
        self
    }

    pub fn with_parameters(mut self, parameters: impl IntoIterator<Item = TypeRef>) -> Self {
        self.parameters = parameters.into_iter().collect();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declaring_type(&self) -> &TypeRef {
        &self.declaring_type
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    pub fn return_type(&self) -> &TypeRef {
        &self.return_type
    }

    pub fn parameters(&self) -> &[TypeRef] {
        &self.parameters
    }

    pub fn token(&self) -> u32 {
        self.token
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}::{}(", self.return_type, self.declaring_type, self.name)?;
        write_type_list(f, &self.parameters)?;
        f.write_str(")")
    }
}

/// Reference to a constructor
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConstructorRef {
    declaring_type: TypeRef,
    parameters: Vec<TypeRef>,
    token: u32,
}

impl ConstructorRef {
    pub fn new(
        declaring_type: TypeRef,
        parameters: impl IntoIterator<Item = TypeRef>,
        token: u32,
    ) -> Self {
        Self {
            declaring_type,
            parameters: parameters.into_iter().collect(),
            token,
        }
    }

    pub fn declaring_type(&self) -> &TypeRef {
        &self.declaring_type
    }

    pub fn parameters(&self) -> &[TypeRef] {
        &self.parameters
    }

    pub fn token(&self) -> u32 {
        self.token
    }
}

impl fmt::Display for ConstructorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::.ctor(", self.declaring_type)?;
        write_type_list(f, &self.parameters)?;
        f.write_str(")")
    }
}

/// Any external symbol an instruction can carry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Symbol {
    Type(TypeRef),
    Field(FieldRef),
    Method(MethodRef),
    Constructor(ConstructorRef),
}

impl Symbol {
    /// Host token of the referenced member
    pub fn token(&self) -> u32 {
        match self {
            Self::Type(ty) => ty.token(),
            Self::Field(field) => field.token(),
            Self::Method(method) => method.token(),
            Self::Constructor(ctor) => ctor.token(),
        }
    }

    /// Category name, used in diagnostics
    pub fn category(&self) -> &'static str {
        match self {
            Self::Type(_) => "type",
            Self::Field(_) => "field",
            Self::Method(_) => "method",
            Self::Constructor(_) => "constructor",
        }
    }
}

impl From<TypeRef> for Symbol {
    fn from(ty: TypeRef) -> Self {
        Self::Type(ty)
    }
}

impl From<FieldRef> for Symbol {
    fn from(field: FieldRef) -> Self {
        Self::Field(field)
    }
}

impl From<MethodRef> for Symbol {
    fn from(method: MethodRef) -> Self {
        Self::Method(method)
    }
}

impl From<ConstructorRef> for Symbol {
    fn from(ctor: ConstructorRef) -> Self {
        Self::Constructor(ctor)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type(ty) => ty.fmt(f),
            Self::Field(field) => field.fmt(f),
            Self::Method(method) => method.fmt(f),
            Self::Constructor(ctor) => ctor.fmt(f),
        }
    }
}

/// Native calling convention for unmanaged indirect calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnmanagedConvention {
    Cdecl,
    StdCall,
    ThisCall,
    FastCall,
}

impl fmt::Display for UnmanagedConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cdecl => "cdecl",
            Self::StdCall => "stdcall",
            Self::ThisCall => "thiscall",
            Self::FastCall => "fastcall",
        })
    }
}

/// Calling convention of an indirect call site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallConvention {
    /// Managed call; `has_this` passes an implicit receiver
    Managed { has_this: bool, varargs: bool },
    Unmanaged(UnmanagedConvention),
}

impl CallConvention {
    pub fn is_unmanaged(self) -> bool {
        matches!(self, Self::Unmanaged(_))
    }
}

impl fmt::Display for CallConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Managed { has_this, varargs } => {
                f.write_str("managed")?;
                if *has_this {
                    f.write_str(" instance")?;
                }
                if *varargs {
                    f.write_str(" vararg")?;
                }
                Ok(())
            }
            Self::Unmanaged(conv) => write!(f, "unmanaged {conv}"),
        }
    }
}

/// Signature of an indirect call
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallSite {
    pub convention: CallConvention,
    pub return_type: TypeRef,
    pub parameters: Vec<TypeRef>,
    /// Extra argument types for a managed vararg site
    pub optional_parameters: Vec<TypeRef>,
}

impl CallSite {
    pub fn managed(return_type: TypeRef, parameters: impl IntoIterator<Item = TypeRef>) -> Self {
        Self {
            convention: CallConvention::Managed {
                has_this: false,
                varargs: false,
            },
            return_type,
            parameters: parameters.into_iter().collect(),
            optional_parameters: Vec::new(),
        }
    }

    pub fn unmanaged(
        convention: UnmanagedConvention,
        return_type: TypeRef,
        parameters: impl IntoIterator<Item = TypeRef>,
    ) -> Self {
        Self {
            convention: CallConvention::Unmanaged(convention),
            return_type,
            parameters: parameters.into_iter().collect(),
            optional_parameters: Vec::new(),
        }
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}(", self.convention, self.return_type)?;
        write_type_list(f, &self.parameters)?;
        if !self.optional_parameters.is_empty() {
            f.write_str(", ..., ")?;
            write_type_list(f, &self.optional_parameters)?;
        }
        f.write_str(")")
    }
}

pub(crate) fn write_type_list(f: &mut fmt::Formatter<'_>, types: &[TypeRef]) -> fmt::Result {
    for (i, ty) in types.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{ty}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_categories() {
        assert!(TypeCode::Int32.is_value_type());
        assert!(TypeCode::ValueType.is_value_type());
        assert!(TypeCode::Pointer.is_value_type());
        assert!(!TypeCode::String.is_value_type());
        assert!(!TypeCode::GenericParameter.is_value_type());
        assert!(!TypeCode::GenericParameter.is_reference());
        assert!(TypeCode::Array.is_reference());
        assert!(TypeCode::Char.is_integer());
        assert!(!TypeCode::Double.is_integer());
    }

    #[test]
    fn test_display() {
        let point = TypeRef::new("Point", TypeCode::ValueType, 0x0200_0002);
        let int32 = TypeRef::primitive(TypeCode::Int32);
        let method = MethodRef::new(point.clone(), "Offset", 0x0600_0001)
            .returns(point.clone())
            .with_parameters([int32.clone(), int32.clone()]);
        assert_eq!(method.to_string(), "Point Point::Offset(int32, int32)");

        let field = FieldRef::new(point.clone(), "X", int32.clone(), FieldScope::Instance, 1);
        assert_eq!(field.to_string(), "int32 Point::X");

        let ctor = ConstructorRef::new(point, [int32.clone()], 2);
        assert_eq!(ctor.to_string(), "Point::.ctor(int32)");

        let site = CallSite::unmanaged(UnmanagedConvention::Cdecl, int32.clone(), [int32]);
        assert_eq!(site.to_string(), "unmanaged cdecl int32(int32)");
    }

    #[test]
    fn test_symbol_tokens() {
        let ty = TypeRef::new("Widget", TypeCode::Class, 0x0200_0010);
        let symbol = Symbol::from(ty);
        assert_eq!(symbol.token(), 0x0200_0010);
        assert_eq!(symbol.category(), "type");
    }
}
