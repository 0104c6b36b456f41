//! Decoded signatures.
//!
//! Signature blobs are decoded by the store into these structured trees; everything past the
//! store works on them instead of raw bytes. Only the element types that occur in native API
//! metadata are modelled.

use crate::metadata::token::Token;

/// A decoded type signature.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TypeSignature {
    /// Placeholder for undecodable input
    #[default]
    Unknown,
    /// `void`
    Void,
    /// `bool`
    Boolean,
    /// UTF-16 code unit
    Char,
    /// Signed 8-bit integer
    I1,
    /// Unsigned 8-bit integer
    U1,
    /// Signed 16-bit integer
    I2,
    /// Unsigned 16-bit integer
    U2,
    /// Signed 32-bit integer
    I4,
    /// Unsigned 32-bit integer
    U4,
    /// Signed 64-bit integer
    I8,
    /// Unsigned 64-bit integer
    U8,
    /// 32-bit float
    R4,
    /// 64-bit float
    R8,
    /// Managed string
    String,
    /// Unmanaged pointer
    Ptr(SignaturePointer),
    /// Managed reference
    ByRef(Box<TypeSignature>),
    // TypeDefOrRefOrSpecEncoded
    /// A value type, by handle
    ValueType(Token),
    // TypeDefOrRefOrSpecEncoded
    /// A reference type, by handle
    Class(Token),
    /// General array with explicit bounds
    Array(SignatureArray),
    /// Native signed integer
    I,
    /// Native unsigned integer
    U,
    /// Function pointer
    FnPtr(Box<SignatureMethod>),
    /// `System.Object`
    Object,
    /// Single-dimensional, zero-based array
    SzArray(Box<TypeSignature>),
}

/// Bounds of one array dimension.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ArrayDimensions {
    /// Number of elements, if fixed
    pub size: Option<u32>,
    /// Lower bound, if not zero
    pub lower_bound: Option<u32>,
}

/// A general array signature.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SignatureArray {
    /// Element type
    pub base: Box<TypeSignature>,
    /// Number of dimensions
    pub rank: u32,
    /// Per-dimension bounds; may be shorter than `rank`
    pub dimensions: Vec<ArrayDimensions>,
}

/// A pointer signature.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SignaturePointer {
    /// Custom modifiers, such as the `const` marker
    pub modifiers: Vec<Token>,
    /// Pointee type
    pub base: Box<TypeSignature>,
}

/// One parameter or return value of a method signature.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SignatureParameter {
    /// Custom modifiers
    pub modifiers: Vec<Token>,
    /// Passed by reference
    pub by_ref: bool,
    /// Parameter type
    pub base: TypeSignature,
}

/// A method signature.
#[derive(Debug, Clone, PartialEq, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct SignatureMethod {
    /// Instance method
    pub has_this: bool,
    /// Default managed calling convention
    pub default: bool,
    /// Unmanaged cdecl
    pub cdecl: bool,
    /// Unmanaged stdcall
    pub stdcall: bool,
    /// Unmanaged thiscall
    pub thiscall: bool,
    /// Unmanaged fastcall
    pub fastcall: bool,
    /// Return value
    pub return_type: SignatureParameter,
    /// Parameters in declaration order
    pub params: Vec<SignatureParameter>,
}

/// A field signature.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SignatureField {
    /// Custom modifiers
    pub modifiers: Vec<Token>,
    /// Field type
    pub base: TypeSignature,
}

impl TypeSignature {
    /// Creates a pointer to `base`.
    #[must_use]
    pub fn pointer_to(base: TypeSignature) -> TypeSignature {
        TypeSignature::Ptr(SignaturePointer {
            modifiers: Vec::new(),
            base: Box::new(base),
        })
    }

    /// Storage width in bits and signedness of integral types.
    ///
    /// Native-sized integers report 64 bits, the widest they can be.
    #[must_use]
    pub fn integer_width(&self) -> Option<(u8, bool)> {
        match self {
            TypeSignature::U1 => Some((8, false)),
            TypeSignature::I1 => Some((8, true)),
            TypeSignature::U2 => Some((16, false)),
            TypeSignature::I2 => Some((16, true)),
            TypeSignature::U4 => Some((32, false)),
            TypeSignature::I4 => Some((32, true)),
            TypeSignature::U8 => Some((64, false)),
            TypeSignature::I8 => Some((64, true)),
            TypeSignature::U => Some((64, false)),
            TypeSignature::I => Some((64, true)),
            _ => None,
        }
    }

    /// Returns `true` for signatures that need no handle resolution.
    #[must_use]
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            TypeSignature::Void
                | TypeSignature::Boolean
                | TypeSignature::Char
                | TypeSignature::I1
                | TypeSignature::U1
                | TypeSignature::I2
                | TypeSignature::U2
                | TypeSignature::I4
                | TypeSignature::U4
                | TypeSignature::I8
                | TypeSignature::U8
                | TypeSignature::R4
                | TypeSignature::R8
                | TypeSignature::I
                | TypeSignature::U
                | TypeSignature::String
                | TypeSignature::Object
        )
    }

    /// The type handle at the core of this signature, looking through pointers and arrays.
    #[must_use]
    pub fn handle(&self) -> Option<Token> {
        match self {
            TypeSignature::ValueType(token) | TypeSignature::Class(token) => Some(*token),
            TypeSignature::Ptr(pointer) => pointer.base.handle(),
            TypeSignature::ByRef(base) | TypeSignature::SzArray(base) => base.handle(),
            TypeSignature::Array(array) => array.base.handle(),
            _ => None,
        }
    }
}

impl SignatureParameter {
    /// Creates a parameter of the given type without modifiers.
    #[must_use]
    pub fn of(base: TypeSignature) -> SignatureParameter {
        SignatureParameter {
            modifiers: Vec::new(),
            by_ref: false,
            base,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_widths() {
        assert_eq!(TypeSignature::I1.integer_width(), Some((8, true)));
        assert_eq!(TypeSignature::U4.integer_width(), Some((32, false)));
        assert_eq!(TypeSignature::U.integer_width(), Some((64, false)));
        assert_eq!(TypeSignature::Boolean.integer_width(), None);
        assert_eq!(TypeSignature::R8.integer_width(), None);
    }

    #[test]
    fn handle_looks_through_wrappers() {
        let token = Token(0x01000007);
        let sig = TypeSignature::pointer_to(TypeSignature::pointer_to(TypeSignature::ValueType(
            token,
        )));
        assert_eq!(sig.handle(), Some(token));

        let array = TypeSignature::Array(SignatureArray {
            base: Box::new(TypeSignature::Class(token)),
            rank: 1,
            dimensions: vec![ArrayDimensions {
                size: Some(4),
                lower_bound: None,
            }],
        });
        assert_eq!(array.handle(), Some(token));
        assert_eq!(TypeSignature::I4.handle(), None);
        assert!(TypeSignature::I4.is_primitive());
        assert!(!array.is_primitive());
    }
}
