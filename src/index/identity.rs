use std::fmt;

use crate::{
    metadata::{reader::MetadataReader, token::Token},
    Result,
};

/// The stable identity of a type, independent of any live reader.
///
/// Nested types carry the identity of their declaring type; their own namespace is empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeIdentity {
    /// Namespace of the type, or of its outermost declaring type
    pub namespace: String,
    /// Simple name
    pub name: String,
    /// Declaring type, for nested types
    pub parent: Option<Box<TypeIdentity>>,
}

impl TypeIdentity {
    /// Identity of a top-level type.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        TypeIdentity {
            namespace: namespace.into(),
            name: name.into(),
            parent: None,
        }
    }

    /// Identity of a type nested in `parent`.
    pub fn nested(parent: TypeIdentity, name: impl Into<String>) -> Self {
        TypeIdentity {
            namespace: parent.namespace.clone(),
            name: name.into(),
            parent: Some(Box::new(parent)),
        }
    }

    /// Computes the identity of a `TypeDef` row, following its declaring types.
    ///
    /// # Errors
    ///
    /// Returns an error if the token or one of its declaring types cannot be read.
    pub fn of(reader: &dyn MetadataReader, token: Token) -> Result<Self> {
        let def = reader.type_definition(token)?;
        match def.enclosing {
            Some(enclosing) => Ok(Self::nested(Self::of(reader, enclosing)?, &def.name)),
            None => Ok(Self::new(&def.namespace, &def.name)),
        }
    }

    /// Returns `true` for nested types.
    #[must_use]
    pub fn is_nested(&self) -> bool {
        self.parent.is_some()
    }

    /// The outermost declaring type, or this type itself.
    #[must_use]
    pub fn top_level(&self) -> &TypeIdentity {
        match &self.parent {
            Some(parent) => parent.top_level(),
            None => self,
        }
    }

    /// Name qualified by declaring types but not the namespace, such as `OUTER._Anonymous_e__Union`.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        match &self.parent {
            Some(parent) => format!("{}.{}", parent.qualified_name(), self.name),
            None => self.name.clone(),
        }
    }
}

impl fmt::Display for TypeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.qualified_name())
        } else {
            write!(f, "{}.{}", self.namespace, self.qualified_name())
        }
    }
}

/// The declaration shape of a type, classified once from its base type and flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// Derives from `System.ValueType`
    StructLike,
    /// Derives from `System.Enum`
    EnumLike,
    /// Derives from `System.MulticastDelegate`
    DelegateLike,
    /// Carries the interface flag
    InterfaceLike,
    /// Anything else, such as the `Apis` container classes
    Other,
}

impl TypeKind {
    /// Classifies a `TypeDef` row.
    ///
    /// # Errors
    ///
    /// Returns an error if the base type handle cannot be read.
    pub fn classify(reader: &dyn MetadataReader, token: Token) -> Result<Self> {
        let def = reader.type_definition(token)?;
        if def.is_interface() {
            return Ok(TypeKind::InterfaceLike);
        }

        let Some(base) = def.extends else {
            return Ok(TypeKind::Other);
        };

        Ok(match reader.type_name(base)? {
            ("System", "ValueType") => TypeKind::StructLike,
            ("System", "Enum") => TypeKind::EnumLike,
            ("System", "MulticastDelegate" | "Delegate") => TypeKind::DelegateLike,
            _ => TypeKind::Other,
        })
    }
}
