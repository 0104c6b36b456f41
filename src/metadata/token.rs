//! Metadata tokens.
//!
//! A [`Token`] is the 32-bit handle ECMA-335 uses to address a row: the high byte selects the
//! table, the low 24 bits the 1-based row. Handles stay valid independent of any live reader,
//! which makes them suitable as keys in caches that outlive a rental.

use std::fmt;
use std::hash::{Hash, Hasher};

/// `TypeRef` table id.
pub const TABLE_TYPEREF: u8 = 0x01;
/// `TypeDef` table id.
pub const TABLE_TYPEDEF: u8 = 0x02;
/// `Field` table id.
pub const TABLE_FIELD: u8 = 0x04;
/// `MethodDef` table id.
pub const TABLE_METHODDEF: u8 = 0x06;
/// `Param` table id.
pub const TABLE_PARAM: u8 = 0x08;
/// `MemberRef` table id.
pub const TABLE_MEMBERREF: u8 = 0x0A;
/// `AssemblyRef` table id.
pub const TABLE_ASSEMBLYREF: u8 = 0x23;

/// The row a handle points into, as far as declaration generation cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    /// A type defined in the same store
    TypeDefinition,
    /// A reference to a type, defined in this or another store
    TypeReference,
    /// A reference to a member of a type
    MemberReference,
    /// A field definition
    FieldDefinition,
    /// A method definition
    MethodDefinition,
    /// A parameter row
    Parameter,
    /// A reference to another assembly
    AssemblyReference,
    /// Any other table
    Other(u8),
}

/// A metadata token.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Token(pub u32);

impl Token {
    /// Creates a token from its raw value.
    #[must_use]
    pub fn new(value: u32) -> Self {
        Token(value)
    }

    /// Creates a token from a table id and a 1-based row.
    #[must_use]
    pub fn from_parts(table: u8, row: u32) -> Self {
        Token((u32::from(table) << 24) | (row & 0x00FF_FFFF))
    }

    /// The raw token value.
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// The table id.
    #[must_use]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// The 1-based row.
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// Returns `true` for the null token.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Classifies the token by table.
    #[must_use]
    pub fn kind(&self) -> HandleKind {
        match self.table() {
            TABLE_TYPEREF => HandleKind::TypeReference,
            TABLE_TYPEDEF => HandleKind::TypeDefinition,
            TABLE_FIELD => HandleKind::FieldDefinition,
            TABLE_METHODDEF => HandleKind::MethodDefinition,
            TABLE_PARAM => HandleKind::Parameter,
            TABLE_MEMBERREF => HandleKind::MemberReference,
            TABLE_ASSEMBLYREF => HandleKind::AssemblyReference,
            other => HandleKind::Other(other),
        }
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token(value)
    }
}

impl From<Token> for u32 {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token(0x{:08x}, table: 0x{:02x}, row: {})",
            self.0,
            self.table(),
            self.row()
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

impl Hash for Token {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}
