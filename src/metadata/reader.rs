//! The metadata reader capability.
//!
//! Parsing the binary metadata format is not part of this crate. A store delegates it to a
//! [`ReaderFactory`], which turns the mapped bytes into [`MetadataReader`] instances. Readers
//! are not required to be thread-safe; the store pool rents a distinct reader to every
//! concurrent consumer.

use std::sync::Arc;

use crate::{
    file::Backend,
    metadata::{
        customattributes::CustomAttribute,
        tables::{
            AssemblyReference, FieldDefinition, MethodDefinition, NamespaceDefinition,
            TypeDefinition, TypeReference,
        },
        token::{HandleKind, Token},
    },
    Result,
};

/// Read access to one metadata store.
pub trait MetadataReader: Send {
    /// Simple name of the assembly described by this store.
    fn assembly_name(&self) -> &str;

    /// Root of the namespace tree.
    fn root_namespace(&self) -> &NamespaceDefinition;

    /// Every row of the `TypeDef` table, in table order.
    fn type_definitions(&self) -> &[TypeDefinition];

    /// A `TypeDef` row.
    ///
    /// # Errors
    ///
    /// Returns an error if the token does not address a `TypeDef` row.
    fn type_definition(&self, token: Token) -> Result<&TypeDefinition>;

    /// A `TypeRef` row.
    ///
    /// # Errors
    ///
    /// Returns an error if the token does not address a `TypeRef` row.
    fn type_reference(&self, token: Token) -> Result<&TypeReference>;

    /// An `AssemblyRef` row.
    ///
    /// # Errors
    ///
    /// Returns an error if the token does not address an `AssemblyRef` row.
    fn assembly_reference(&self, token: Token) -> Result<&AssemblyReference>;

    /// A `Field` row.
    ///
    /// # Errors
    ///
    /// Returns an error if the token does not address a `Field` row.
    fn field(&self, token: Token) -> Result<&FieldDefinition>;

    /// A `MethodDef` row.
    ///
    /// # Errors
    ///
    /// Returns an error if the token does not address a `MethodDef` row.
    fn method(&self, token: Token) -> Result<&MethodDefinition>;

    /// Decoded custom attributes attached to `parent`; empty if there are none.
    fn custom_attributes(&self, parent: Token) -> &[CustomAttribute];

    /// Returns `true` if any definition in the store carries an attribute of the given type.
    ///
    /// Readers backed by a parser can answer this from the `MemberRef` table alone; the default
    /// walks every type, field and method.
    fn uses_attribute(&self, namespace: &str, name: &str) -> bool {
        let attached = |token: Token| {
            self.custom_attributes(token)
                .iter()
                .any(|attribute| attribute.is(namespace, name))
        };

        self.type_definitions().iter().any(|def| {
            attached(def.token)
                || def.fields.iter().any(|field| attached(*field))
                || def.methods.iter().any(|method| attached(*method))
        })
    }

    /// Namespace and name of a `TypeDef` or `TypeRef` handle.
    ///
    /// # Errors
    ///
    /// Returns an error for handles of any other kind.
    fn type_name(&self, token: Token) -> Result<(&str, &str)> {
        match token.kind() {
            HandleKind::TypeDefinition => {
                let def = self.type_definition(token)?;
                Ok((def.namespace.as_str(), def.name.as_str()))
            }
            HandleKind::TypeReference => {
                let reference = self.type_reference(token)?;
                Ok((reference.namespace.as_str(), reference.name.as_str()))
            }
            other => Err(malformed_error!(
                "Expected a type handle, found {:?} ({})",
                other,
                token
            )),
        }
    }
}

/// Creates readers over a store's mapped bytes.
pub trait ReaderFactory: Send + Sync {
    /// Creates a new reader.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not valid metadata.
    fn create(&self, backend: Arc<dyn Backend>) -> Result<Box<dyn MetadataReader>>;
}

impl<F> ReaderFactory for F
where
    F: Fn(Arc<dyn Backend>) -> Result<Box<dyn MetadataReader>> + Send + Sync,
{
    fn create(&self, backend: Arc<dyn Backend>) -> Result<Box<dyn MetadataReader>> {
        self(backend)
    }
}
