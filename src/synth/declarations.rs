//! The declaration tree produced by synthesis.
//!
//! Declarations are plain data. They name other types through [`TypeExpr`], which keeps the
//! namespace of the referenced type so that rendering can decide between the short
//! `winmdroot.` alias and a fully qualified `global::` name.

use strum::Display;

use crate::{docs::ApiDetails, synth::bitfield::BitfieldLayout};

/// A reference to a type, as it appears in a declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeExpr {
    /// A keyword type such as `uint` or `nint`
    Primitive(&'static str),
    /// A declared type; `name` is qualified by declaring types for nested types
    Named {
        /// Full namespace of the type, or of its outermost declaring type
        namespace: String,
        /// Emitted name
        name: String,
    },
    /// A type local to the declaring struct, referenced by its simple name
    Local(String),
    /// Unmanaged pointer
    Pointer(Box<TypeExpr>),
    /// Managed single-dimensional array
    Array(Box<TypeExpr>),
    /// Unmanaged function pointer
    FunctionPointer(Box<FunctionPointerSig>),
    /// The tail of a struct that ends in a variable-length array
    VariableLengthArray {
        /// Element type
        element: Box<TypeExpr>,
        /// Namespace of the helper struct
        namespace: String,
        /// Blittable storage of each element, when `element` is not blittable itself
        index: Option<&'static str>,
    },
}

impl TypeExpr {
    /// A declared type.
    pub fn named(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        TypeExpr::Named {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// A pointer to `self`.
    #[must_use]
    pub fn pointer(self) -> Self {
        TypeExpr::Pointer(Box::new(self))
    }

    /// Returns `true` for unmanaged pointers and function pointers.
    #[must_use]
    pub fn is_pointer(&self) -> bool {
        matches!(self, TypeExpr::Pointer(_) | TypeExpr::FunctionPointer(_))
    }

    /// Returns `true` for keyword types.
    #[must_use]
    pub fn is_primitive(&self) -> bool {
        matches!(self, TypeExpr::Primitive(_))
    }

    /// The simple name of the type, without namespace or pointer decoration.
    #[must_use]
    pub fn simple_name(&self) -> String {
        match self {
            TypeExpr::Primitive(keyword) => (*keyword).to_string(),
            TypeExpr::Named { name, .. } => name.rsplit('.').next().unwrap_or(name).to_string(),
            TypeExpr::Local(name) => name.clone(),
            TypeExpr::Pointer(inner) => format!("{}_ptr", inner.simple_name()),
            TypeExpr::Array(inner) => format!("{}_array", inner.simple_name()),
            TypeExpr::FunctionPointer(_) => "fnptr".to_string(),
            TypeExpr::VariableLengthArray { element, .. } => element.simple_name(),
        }
    }
}

/// Unmanaged calling conventions of function pointers and delegates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum CallingConvention {
    /// Caller cleans the stack
    Cdecl,
    /// Callee cleans the stack; the platform default on Windows
    Stdcall,
    /// `this` in a register
    Thiscall,
    /// Arguments in registers
    Fastcall,
}

impl CallingConvention {
    /// Maps a `System.Runtime.InteropServices.CallingConvention` value.
    ///
    /// `Winapi` resolves to `Stdcall`.
    #[must_use]
    pub fn from_runtime(value: i64) -> Option<Self> {
        match value {
            1 | 3 => Some(CallingConvention::Stdcall),
            2 => Some(CallingConvention::Cdecl),
            4 => Some(CallingConvention::Thiscall),
            5 => Some(CallingConvention::Fastcall),
            _ => None,
        }
    }
}

/// The signature of an unmanaged function pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionPointerSig {
    /// Calling convention
    pub convention: CallingConvention,
    /// Parameter types
    pub params: Vec<TypeExpr>,
    /// Return type
    pub ret: TypeExpr,
}

/// A parameter of a method, delegate or interface member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDecl {
    /// Parameter name
    pub name: String,
    /// Parameter type
    pub ty: TypeExpr,
    /// The callee writes through this parameter
    pub out: bool,
    /// The parameter may be null
    pub optional: bool,
    /// `UnmanagedType` name of a marshaling override
    pub marshal_as: Option<String>,
}

/// A method of a delegate, interface or extern import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSig {
    /// Method name
    pub name: String,
    /// Return type
    pub ret: TypeExpr,
    /// `UnmanagedType` name of a marshaling override for the return value
    pub ret_marshal_as: Option<String>,
    /// Parameters in declaration order
    pub params: Vec<ParamDecl>,
}

/// The value of a constant.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantExpr {
    /// A literal of the constant's own type, such as `260U`
    Literal(String),
    /// A literal of the underlying type, converted to a typedef struct or enum
    Converted {
        /// Target type
        ty: TypeExpr,
        /// Literal of the underlying value
        literal: String,
    },
    /// A GUID, emitted as a `static readonly` field
    Guid(uguid::Guid),
}

/// A named constant.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantDecl {
    /// Constant name
    pub name: String,
    /// Declared type
    pub ty: TypeExpr,
    /// Value
    pub value: ConstantExpr,
}

/// Explicit `StructLayout` settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LayoutSpec {
    /// Fields are placed at explicit offsets
    pub explicit: bool,
    /// Packing, 0 for the default
    pub pack: u16,
    /// Total size, 0 if computed
    pub size: u32,
    /// `char` fields are UTF-16
    pub unicode: bool,
}

/// An instance field of a struct.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    /// Field name
    pub name: String,
    /// Field type; the element type for fixed-length arrays
    pub ty: TypeExpr,
    /// Hidden behind an accessor
    pub private: bool,
    /// Byte offset under explicit layout
    pub offset: Option<u32>,
    /// Number of elements of a fixed-length inline array
    pub fixed_length: Option<u32>,
    /// `UnmanagedType` name of a marshaling override
    pub marshal_as: Option<String>,
    /// Obsolescence message
    pub obsolete: Option<String>,
    /// Documentation
    pub docs: Option<String>,
}

impl FieldDecl {
    /// A public field without further decoration.
    pub fn new(name: impl Into<String>, ty: TypeExpr) -> Self {
        FieldDecl {
            name: name.into(),
            ty,
            private: false,
            offset: None,
            fixed_length: None,
            marshal_as: None,
            obsolete: None,
            docs: None,
        }
    }
}

/// A property that exposes a raw integer field as an enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumAccessor {
    /// Property name
    pub name: String,
    /// Backing field name
    pub field: String,
    /// Enum type
    pub enum_ty: TypeExpr,
    /// Type of the backing field
    pub raw_ty: TypeExpr,
}

/// A property over a range of bits of an integer field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitfieldAccessor {
    /// Property name
    pub name: String,
    /// Backing field name
    pub field: String,
    /// Keyword of the backing field's type
    pub storage: &'static str,
    /// Bit placement
    pub layout: BitfieldLayout,
}

/// A member of a struct declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum StructMember {
    /// Instance field
    Field(FieldDecl),
    /// Literal static field
    Constant(ConstantDecl),
    /// Enum-typed view of a raw field
    EnumAccessor(EnumAccessor),
    /// Bitfield property
    Bitfield(BitfieldAccessor),
    /// `SizeOf(int count)` for a struct ending in a variable-length array
    SizeOf {
        /// Element type of the array
        element: TypeExpr,
    },
    /// A local struct indexing a variable-length array of pointers
    InlineArrayHelper {
        /// Element type
        element: TypeExpr,
    },
}

/// A struct declaration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StructDecl {
    /// Explicit layout, if any deviates from the default
    pub layout: Option<LayoutSpec>,
    /// `GuidAttribute` value
    pub guid: Option<uguid::Guid>,
    /// A strongly typed wrapper around one value
    pub typedef: bool,
    /// Function that releases values of this handle type
    pub release_method: Option<String>,
    /// Members in declaration order
    pub members: Vec<StructMember>,
    /// Nested type declarations
    pub nested: Vec<Declaration>,
}

/// An enum member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumMember {
    /// Member name
    pub name: String,
    /// Value, widened
    pub value: i128,
    /// Documentation
    pub docs: Option<String>,
}

/// An enum declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDecl {
    /// Members combine as flags
    pub flags: bool,
    /// Keyword of the underlying type
    pub base: &'static str,
    /// Width of the underlying type in bits
    pub base_bits: u8,
    /// The underlying type is signed
    pub base_signed: bool,
    /// Members, literal fields first, then associated constants
    pub members: Vec<EnumMember>,
}

/// A delegate declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegateDecl {
    /// Declared calling convention
    pub convention: Option<CallingConvention>,
    /// Signature of `Invoke`
    pub signature: MethodSig,
}

/// A COM interface, as an interface or as a struct with a vtable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceDecl {
    /// Interface id
    pub guid: Option<uguid::Guid>,
    /// Base interface
    pub base: Option<TypeExpr>,
    /// Methods declared by this interface
    pub methods: Vec<MethodSig>,
    /// Methods of base interfaces, outermost base first. Interface shapes leave out
    /// `IUnknown`'s, which the runtime supplies.
    pub inherited: Vec<MethodSig>,
    /// Emit a struct with an explicit vtable instead of an interface
    pub vtable: bool,
}

/// An extern method imported from a native module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternMethod {
    /// Module the method is grouped under, such as `Kernel32`
    pub module: String,
    /// File name of the native module
    pub library: String,
    /// Exported symbol
    pub entry_point: String,
    /// The callee reports errors through the thread's last error
    pub sets_last_error: bool,
    /// Signature, named as emitted
    pub signature: MethodSig,
    /// Obsolescence message
    pub obsolete: Option<String>,
}

/// Support code that does not come from metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum HelperKind {
    /// `VariableLengthInlineArray<T>`
    #[strum(serialize = "VariableLengthInlineArray1")]
    VariableLengthInlineArray,
    /// `VariableLengthInlineArray<T, TIndex>`
    #[strum(serialize = "VariableLengthInlineArray2")]
    VariableLengthInlineArrayIndexed,
}

/// The shape-specific part of a declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum DeclarationKind {
    /// Struct
    Struct(StructDecl),
    /// Enum
    Enum(EnumDecl),
    /// Bound delegate
    Delegate(DelegateDecl),
    /// A struct wrapping an untyped function address
    UntypedDelegate,
    /// COM interface
    Interface(InterfaceDecl),
    /// Extern method
    Method(ExternMethod),
    /// Constant
    Constant(ConstantDecl),
    /// Support code
    Helper(HelperKind),
}

/// One generated declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    /// Namespace the declaration belongs to
    pub namespace: String,
    /// Emitted name
    pub name: String,
    /// Documentation
    pub docs: Option<ApiDetails>,
    /// Shape
    pub kind: DeclarationKind,
}

impl Declaration {
    /// Creates an undocumented declaration.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, kind: DeclarationKind) -> Self {
        Declaration {
            namespace: namespace.into(),
            name: name.into(),
            docs: None,
            kind,
        }
    }

    /// Returns `true` for declarations that live in the methods and constants container.
    #[must_use]
    pub fn is_member(&self) -> bool {
        matches!(
            self.kind,
            DeclarationKind::Method(_) | DeclarationKind::Constant(_)
        )
    }

    /// The struct part, for struct declarations.
    #[must_use]
    pub fn as_struct(&self) -> Option<&StructDecl> {
        match &self.kind {
            DeclarationKind::Struct(decl) => Some(decl),
            _ => None,
        }
    }

    /// The enum part, for enum declarations.
    #[must_use]
    pub fn as_enum(&self) -> Option<&EnumDecl> {
        match &self.kind {
            DeclarationKind::Enum(decl) => Some(decl),
            _ => None,
        }
    }
}
