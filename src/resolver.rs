//! Resolution of type references.
//!
//! A reference is looked up in its own store first. References into other assemblies go to
//! the federation the generator is attached to, then to the [`TargetEnvironment`], which may
//! already define the type. Only when all of them come up empty is the reference reported as
//! missing.
//!
//! Stores never call each other directly: a generator only sees the narrow
//! [`ExternalTypeResolver`] query, and the federation decides which store answers it.

use tracing::trace;

use crate::{
    ledger::Context,
    metadata::{tables::ResolutionScope, token::Token},
    synth::{declarations::TypeExpr, Synthesizer},
    Error, Result,
};

/// Answers whether the code being generated for already has a type.
///
/// Types it knows are referenced by name and never declared.
pub trait TargetEnvironment: Send + Sync {
    /// Returns `true` if `full_name` (`Namespace.Name`) is already defined.
    fn has_type(&self, full_name: &str) -> bool;
}

impl<F> TargetEnvironment for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn has_type(&self, full_name: &str) -> bool {
        self(full_name)
    }
}

/// The core library of the target runtime: everything under `System`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoreLibrary;

impl TargetEnvironment for CoreLibrary {
    fn has_type(&self, full_name: &str) -> bool {
        full_name.starts_with("System.")
    }
}

/// Generates types on behalf of other stores.
pub trait ExternalTypeResolver: Send + Sync {
    /// Requests `namespace.name` from the store of `assembly`.
    ///
    /// Returns `Ok(None)` when no participating store has the type.
    ///
    /// # Errors
    ///
    /// Returns the error of generating the type, including
    /// [`Error::PlatformIncompatible`] when the store has it for other platforms only.
    fn try_request(
        &self,
        assembly: &str,
        namespace: &str,
        name: &str,
        context: Context,
    ) -> Result<Option<TypeExpr>>;
}

impl Synthesizer<'_> {
    /// Requests the type behind a `TypeRef` handle.
    pub(crate) fn resolve_reference(&self, token: Token, context: Context) -> Result<TypeExpr> {
        if let Some(def) = self.index().resolve_local(self.reader, token)? {
            return self.request_definition(def, context);
        }

        let reference = self.reader.type_reference(token)?;
        match reference.scope {
            ResolutionScope::TypeReference(parent) => {
                let TypeExpr::Named { namespace, name } = self.resolve_reference(parent, context)?
                else {
                    return Err(malformed_error!(
                        "{} is nested in a type that is not declared by name",
                        reference.name
                    ));
                };
                Ok(TypeExpr::named(namespace, format!("{name}.{}", reference.name)))
            }
            ResolutionScope::Module => Err(Error::NotFound(format!(
                "{}.{} is referenced but not defined in \"{}\".",
                reference.namespace,
                reference.name,
                self.index().assembly_name()
            ))),
            ResolutionScope::Assembly(assembly) => {
                let assembly = &self.reader.assembly_reference(assembly)?.name;
                self.resolve_external(assembly, &reference.namespace, &reference.name, context)
            }
        }
    }

    fn resolve_external(
        &self,
        assembly: &str,
        namespace: &str,
        name: &str,
        context: Context,
    ) -> Result<TypeExpr> {
        if let Some(federation) = self.generator.federation() {
            if let Some(expr) = federation.try_request(assembly, namespace, name, context)? {
                return Ok(expr);
            }
        }

        let full_name = format!("{namespace}.{name}");
        if self.generator.environment.has_type(&full_name) {
            trace!(%full_name, assembly, "Referenced type is defined by the target");
            return Ok(TypeExpr::named(namespace, name));
        }

        Err(Error::NotFound(format!(
            "Input metadata \"{assembly}\" has not been provided, or is referenced at a version that is lacking the type \"{full_name}\"."
        )))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::GeneratorOptions,
        generator::Generator,
        index::Platform,
        metadata::{memory::MetadataBuilder, signatures::TypeSignature},
        synth::declarations::StructMember,
        test::fixtures,
    };

    #[test]
    fn core_library_owns_the_system_namespace() {
        assert!(CoreLibrary.has_type("System.Guid"));
        assert!(!CoreLibrary.has_type("Systemic.Guid"));
        assert!(!CoreLibrary.has_type("Windows.Win32.Foundation.HANDLE"));

        let only_point = |name: &str| name == "Windows.Win32.Foundation.POINT";
        assert!(only_point.has_type("Windows.Win32.Foundation.POINT"));
    }

    #[test]
    fn local_references_resolve_to_definitions() {
        let mut builder = MetadataBuilder::new("Test");
        let point = builder.struct_type("Test.Geometry", "POINT");
        builder.field(point, "x", TypeSignature::I4);
        let point_ref = builder.local_ref("Test.Geometry", "POINT");
        let line = builder.struct_type("Test.Geometry", "LINE");
        builder.field(line, "from", TypeSignature::ValueType(point_ref));

        let generator =
            Generator::from_metadata(builder.build(), GeneratorOptions::default()).unwrap();
        generator
            .request_type_by_name("Test.Geometry", "LINE", Context::new(true))
            .unwrap();
        assert!(generator.declaration("Test.Geometry", "POINT").is_some());
    }

    #[test]
    fn nested_references_resolve_through_their_parent() {
        let mut builder = MetadataBuilder::new("Test");
        let outer = builder.struct_type("Test.Nesting", "OUTER");
        let inner = builder.struct_type("Test.Nesting", "INNER");
        builder.nest(outer, inner);
        builder.field(inner, "value", TypeSignature::I4);
        builder.field(outer, "inner", TypeSignature::ValueType(inner));
        let outer_ref = builder.local_ref("Test.Nesting", "OUTER");
        let inner_ref = builder.type_ref("", "INNER", ResolutionScope::TypeReference(outer_ref));
        let user = builder.struct_type("Test.Nesting", "USER");
        builder.field(user, "value", TypeSignature::ValueType(inner_ref));

        let generator =
            Generator::from_metadata(builder.build(), GeneratorOptions::default()).unwrap();
        generator
            .request_type_by_name("Test.Nesting", "USER", Context::new(true))
            .unwrap();

        let user = generator.declaration("Test.Nesting", "USER").unwrap();
        let StructMember::Field(field) = &user.as_struct().unwrap().members[0] else {
            panic!("Expected a field");
        };
        assert_eq!(field.ty, TypeExpr::named("Test.Nesting", "OUTER.INNER"));
        assert!(generator.declaration("Test.Nesting", "OUTER").is_some());
    }

    #[test]
    fn missing_stores_are_reported() {
        let generator = Generator::from_metadata(fixtures::contoso(), GeneratorOptions::default())
            .unwrap();
        let error = generator
            .request_type_by_name("Contoso.Interop.Widgets", "WIDGET", Context::new(true))
            .unwrap_err();
        assert_eq!(
            error.full_message(),
            "Failed to generate WIDGET -> Failed to generate Bounds -> Input metadata \"Windows.Win32\" has not been provided, or is referenced at a version that is lacking the type \"Windows.Win32.Foundation.RECT\"."
        );
    }

    #[test]
    fn the_target_environment_is_the_last_resort() {
        let generator = Generator::in_memory(
            fixtures::contoso(),
            GeneratorOptions::default().with_platform(Platform::X64),
        )
        .unwrap()
        .with_environment(Arc::new(|name: &str| {
            name.starts_with("System.") || name.starts_with("Windows.Win32.")
        }));
        generator
            .request_type_by_name("Contoso.Interop.Widgets", "WIDGET", Context::new(true))
            .unwrap();

        let widget = generator.declaration("Contoso.Interop.Widgets", "WIDGET").unwrap();
        let types: Vec<_> = widget
            .as_struct()
            .unwrap()
            .members
            .iter()
            .filter_map(|member| match member {
                StructMember::Field(field) => Some(field.ty.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(
            types,
            [
                TypeExpr::named(fixtures::FOUNDATION, "RECT"),
                TypeExpr::named(fixtures::FOUNDATION, "HANDLE"),
                TypeExpr::named("System", "Guid"),
            ]
        );
    }
}
