//! Owned metadata rows.
//!
//! Readers hand these out by reference. Each row keeps its own [`Token`] so handles can be
//! recovered from a borrowed row without a second lookup.

use bitflags::bitflags;

use crate::metadata::{
    signatures::{SignatureMethod, TypeSignature},
    token::Token,
};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Flags of a `TypeDef` row
    pub struct TypeAttributes : u32 {
        /// Visible outside the assembly
        const PUBLIC = 0x0000_0001;
        /// Nested type, publicly visible
        const NESTED_PUBLIC = 0x0000_0002;
        /// Fields laid out sequentially
        const SEQUENTIAL_LAYOUT = 0x0000_0008;
        /// Fields laid out at explicit offsets
        const EXPLICIT_LAYOUT = 0x0000_0010;
        /// The type is an interface
        const INTERFACE = 0x0000_0020;
        /// The type is abstract
        const ABSTRACT = 0x0000_0080;
        /// The type cannot be derived from
        const SEALED = 0x0000_0100;
        /// The name has a special meaning
        const SPECIAL_NAME = 0x0000_0400;
        /// The type is a COM import
        const IMPORT = 0x0000_1000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Flags of a `Field` row
    pub struct FieldAttributes : u32 {
        /// Private visibility
        const PRIVATE = 0x0001;
        /// Public visibility
        const PUBLIC = 0x0006;
        /// Static, not per instance
        const STATIC = 0x0010;
        /// Only initialized in constructors
        const INIT_ONLY = 0x0020;
        /// Compile-time constant
        const LITERAL = 0x0040;
        /// Special name
        const SPECIAL_NAME = 0x0200;
        /// Runtime special name
        const RTSPECIAL_NAME = 0x0400;
        /// Has marshaling information
        const HAS_FIELD_MARSHAL = 0x1000;
        /// Has a default value in the `Constant` table
        const HAS_DEFAULT = 0x8000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Flags of a `Param` row
    pub struct ParamAttributes : u32 {
        /// Input parameter
        const IN = 0x0001;
        /// Output parameter
        const OUT = 0x0002;
        /// Optional parameter
        const OPTIONAL = 0x0010;
        /// Has a default value
        const HAS_DEFAULT = 0x1000;
        /// Has marshaling information
        const HAS_FIELD_MARSHAL = 0x2000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Flags of an `ImplMap` row
    pub struct PInvokeAttributes : u32 {
        /// Use the member name as specified
        const NO_MANGLE = 0x0001;
        /// The callee sets the thread's last error
        const SUPPORTS_LAST_ERROR = 0x0040;
        /// Platform default calling convention
        const CALL_CONV_WINAPI = 0x0100;
        /// cdecl
        const CALL_CONV_CDECL = 0x0200;
        /// stdcall
        const CALL_CONV_STDCALL = 0x0300;
        /// thiscall
        const CALL_CONV_THISCALL = 0x0400;
        /// fastcall
        const CALL_CONV_FASTCALL = 0x0500;
    }
}

/// `ClassLayout` information attached to a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClassLayout {
    /// Field alignment in bytes, 0 for the default
    pub packing_size: u16,
    /// Total size in bytes, 0 if computed
    pub class_size: u32,
}

impl ClassLayout {
    /// Returns `true` if neither packing nor size deviates from the default.
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.packing_size == 0 && self.class_size == 0
    }
}

/// A row of the `TypeDef` table.
#[derive(Debug, Clone)]
pub struct TypeDefinition {
    /// The handle of this row
    pub token: Token,
    /// Type flags
    pub flags: TypeAttributes,
    /// Namespace; empty for nested types
    pub namespace: String,
    /// Simple name
    pub name: String,
    /// Base type, a `TypeDef` or `TypeRef` handle
    pub extends: Option<Token>,
    /// Fields in declaration order
    pub fields: Vec<Token>,
    /// Methods in declaration order
    pub methods: Vec<Token>,
    /// Types nested directly in this one
    pub nested_types: Vec<Token>,
    /// The declaring type, for nested types
    pub enclosing: Option<Token>,
    /// Implemented interfaces
    pub interfaces: Vec<Token>,
    /// Explicit packing or size
    pub layout: Option<ClassLayout>,
}

impl TypeDefinition {
    /// Returns `true` if the type is nested in another type.
    #[must_use]
    pub fn is_nested(&self) -> bool {
        self.enclosing.is_some()
    }

    /// Returns `true` if the type is an interface.
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.flags.contains(TypeAttributes::INTERFACE)
    }

    /// Returns `true` if fields are placed at explicit offsets.
    #[must_use]
    pub fn is_explicit_layout(&self) -> bool {
        self.flags.contains(TypeAttributes::EXPLICIT_LAYOUT)
    }
}

/// Where a `TypeRef` row points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionScope {
    /// The same module
    Module,
    /// Another assembly, by `AssemblyRef` handle
    Assembly(Token),
    /// A type that encloses the referenced nested type
    TypeReference(Token),
}

/// A row of the `TypeRef` table.
#[derive(Debug, Clone)]
pub struct TypeReference {
    /// The handle of this row
    pub token: Token,
    /// Namespace; empty for nested types
    pub namespace: String,
    /// Simple name
    pub name: String,
    /// Resolution scope
    pub scope: ResolutionScope,
}

/// A row of the `AssemblyRef` table.
#[derive(Debug, Clone)]
pub struct AssemblyReference {
    /// The handle of this row
    pub token: Token,
    /// Simple assembly name
    pub name: String,
    /// Four-part version
    pub version: (u16, u16, u16, u16),
}

/// A value from the `Constant` table.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantValue {
    /// Boolean
    Boolean(bool),
    /// UTF-16 code unit
    Char(u16),
    /// Signed 8-bit
    I1(i8),
    /// Unsigned 8-bit
    U1(u8),
    /// Signed 16-bit
    I2(i16),
    /// Unsigned 16-bit
    U2(u16),
    /// Signed 32-bit
    I4(i32),
    /// Unsigned 32-bit
    U4(u32),
    /// Signed 64-bit
    I8(i64),
    /// Unsigned 64-bit
    U8(u64),
    /// 32-bit float
    R4(f32),
    /// 64-bit float
    R8(f64),
    /// String
    String(String),
    /// Null reference
    Null,
}

impl ConstantValue {
    /// The value as a wide integer, for integral constants.
    #[must_use]
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            ConstantValue::Boolean(value) => Some(i128::from(*value)),
            ConstantValue::Char(value) => Some(i128::from(*value)),
            ConstantValue::I1(value) => Some(i128::from(*value)),
            ConstantValue::U1(value) => Some(i128::from(*value)),
            ConstantValue::I2(value) => Some(i128::from(*value)),
            ConstantValue::U2(value) => Some(i128::from(*value)),
            ConstantValue::I4(value) => Some(i128::from(*value)),
            ConstantValue::U4(value) => Some(i128::from(*value)),
            ConstantValue::I8(value) => Some(i128::from(*value)),
            ConstantValue::U8(value) => Some(i128::from(*value)),
            _ => None,
        }
    }

    /// The signature of the constant's own type.
    #[must_use]
    pub fn signature(&self) -> TypeSignature {
        match self {
            ConstantValue::Boolean(_) => TypeSignature::Boolean,
            ConstantValue::Char(_) => TypeSignature::Char,
            ConstantValue::I1(_) => TypeSignature::I1,
            ConstantValue::U1(_) => TypeSignature::U1,
            ConstantValue::I2(_) => TypeSignature::I2,
            ConstantValue::U2(_) => TypeSignature::U2,
            ConstantValue::I4(_) => TypeSignature::I4,
            ConstantValue::U4(_) => TypeSignature::U4,
            ConstantValue::I8(_) => TypeSignature::I8,
            ConstantValue::U8(_) => TypeSignature::U8,
            ConstantValue::R4(_) => TypeSignature::R4,
            ConstantValue::R8(_) => TypeSignature::R8,
            ConstantValue::String(_) => TypeSignature::String,
            ConstantValue::Null => TypeSignature::Object,
        }
    }
}

/// A row of the `Field` table, with its constant and layout data folded in.
#[derive(Debug, Clone)]
pub struct FieldDefinition {
    /// The handle of this row
    pub token: Token,
    /// Field name
    pub name: String,
    /// Field flags
    pub flags: FieldAttributes,
    /// Field type
    pub signature: TypeSignature,
    /// Default value from the `Constant` table
    pub default: Option<ConstantValue>,
    /// Byte offset from the `FieldLayout` table
    pub offset: Option<u32>,
}

impl FieldDefinition {
    /// Returns `true` for static fields.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(FieldAttributes::STATIC)
    }

    /// Returns `true` for compile-time constants.
    #[must_use]
    pub fn is_literal(&self) -> bool {
        self.flags.contains(FieldAttributes::LITERAL)
    }
}

/// A row of the `Param` table.
#[derive(Debug, Clone)]
pub struct Parameter {
    /// The handle of this row
    pub token: Token,
    /// 0 for the return value, 1-based for parameters
    pub sequence: u16,
    /// Parameter name
    pub name: String,
    /// Parameter flags
    pub flags: ParamAttributes,
}

/// An `ImplMap` row attached to a method.
#[derive(Debug, Clone)]
pub struct MethodImport {
    /// Name of the native module exporting the entry point
    pub module: String,
    /// Exported symbol name
    pub entry_point: String,
    /// Import flags
    pub flags: PInvokeAttributes,
}

impl MethodImport {
    /// Returns `true` if the callee reports errors through the thread's last error.
    #[must_use]
    pub fn sets_last_error(&self) -> bool {
        self.flags.contains(PInvokeAttributes::SUPPORTS_LAST_ERROR)
    }
}

/// A row of the `MethodDef` table.
#[derive(Debug, Clone)]
pub struct MethodDefinition {
    /// The handle of this row
    pub token: Token,
    /// Method name
    pub name: String,
    /// Decoded signature
    pub signature: SignatureMethod,
    /// Parameter rows, including the return value row if present
    pub params: Vec<Parameter>,
    /// Native import information for extern methods
    pub import: Option<MethodImport>,
}

impl MethodDefinition {
    /// The parameter row with the given sequence number.
    #[must_use]
    pub fn param(&self, sequence: u16) -> Option<&Parameter> {
        self.params.iter().find(|param| param.sequence == sequence)
    }
}

/// A namespace and its contents, as produced by a depth-first walk.
#[derive(Debug, Clone, Default)]
pub struct NamespaceDefinition {
    /// Fully qualified namespace name; empty for the root
    pub name: String,
    /// Top-level types declared directly in this namespace
    pub types: Vec<Token>,
    /// Child namespaces
    pub children: Vec<NamespaceDefinition>,
}
