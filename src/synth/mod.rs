//! Declaration synthesis.
//!
//! A [`Synthesizer`] turns one metadata definition into one [`Declaration`], requesting every
//! type the definition mentions through the generator's ledger on the way. It lives for a
//! single request and borrows the reader rented for that request.
//!
//! # Key Components
//!
//! - [`declarations`] - The declaration tree handed to rendering
//! - [`bitfield`] - Bit placement arithmetic of native bitfields
//! - [`flexible`] - Sizing of structs that end in a variable-length array
//!
//! Synthesis of the individual shapes lives in private submodules: structs, enums, delegates,
//! interfaces, extern methods and constants. Type signatures are translated by the
//! `typeref` submodule, references to other stores by [`crate::resolver`].

pub mod bitfield;
pub mod declarations;
pub mod flexible;

mod constants;
mod delegates;
mod enums;
mod interfaces;
mod methods;
mod structs;
mod typeref;

pub use methods::{module_name, strip_wide_suffix};
pub use structs::POINTER_ARRAY_HELPER;

use std::sync::atomic::Ordering;

use tracing::trace;

use crate::{
    docs::ApiDetails,
    generator::Generator,
    index::{MetadataIndex, TypeIdentity, TypeKind},
    ledger::{Context, LedgerKey},
    metadata::{
        customattributes::{find_attribute, COMPILER_GENERATED, COMPILER_SERVICES_NAMESPACE},
        reader::MetadataReader,
        signatures::TypeSignature,
        tables::TypeDefinition,
        token::{HandleKind, Token},
    },
    synth::declarations::{Declaration, DeclarationKind, TypeExpr},
    Error, Result,
};

/// Suffix of types emitted a second time for contexts that forbid marshaling.
pub const UNMANAGED_SUFFIX: &str = "_unmanaged";

/// Where a translated type is going to appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Element {
    /// Instance field of a struct
    Field,
    /// Method, delegate or interface parameter
    Parameter,
    /// Return value
    Return,
    /// Anywhere else, such as the pointee of a pointer
    Other,
}

/// Synthesizes declarations for one generator, over one rented reader.
pub(crate) struct Synthesizer<'a> {
    pub(crate) generator: &'a Generator,
    pub(crate) reader: &'a dyn MetadataReader,
}

impl<'a> Synthesizer<'a> {
    pub(crate) fn new(generator: &'a Generator, reader: &'a dyn MetadataReader) -> Self {
        Synthesizer { generator, reader }
    }

    pub(crate) fn index(&self) -> &MetadataIndex {
        &self.generator.index
    }

    fn allows_marshaling(&self) -> bool {
        self.generator.options.allow_marshaling
    }

    fn docs(&self, name: &str) -> Option<ApiDetails> {
        self.generator
            .docs
            .as_ref()
            .and_then(|docs| docs.api_details(name))
    }

    /// Requests the type behind a `TypeDef` or `TypeRef` handle and returns how to refer to it.
    pub(crate) fn request_type(&self, token: Token, context: Context) -> Result<TypeExpr> {
        match token.kind() {
            HandleKind::TypeDefinition => self.request_definition(token, context),
            HandleKind::TypeReference => self.resolve_reference(token, context),
            other => Err(malformed_error!(
                "Expected a type handle, found {:?} ({})",
                other,
                token
            )),
        }
    }

    /// Requests a type defined in this store.
    ///
    /// Nested types are generated as part of their outermost declaring type. Delegates in a
    /// context without marshaling are not declared at all; the reference becomes a function
    /// pointer.
    pub(crate) fn request_definition(&self, token: Token, context: Context) -> Result<TypeExpr> {
        let def = self.reader.type_definition(token)?;

        if let Some(enclosing) = def.enclosing {
            let TypeExpr::Named { namespace, name } = self.request_definition(enclosing, context)?
            else {
                return Err(malformed_error!(
                    "{} is nested in a type that is not declared by name",
                    def.name
                ));
            };
            return Ok(TypeExpr::named(namespace, format!("{name}.{}", def.name)));
        }

        if !self
            .index()
            .is_compatible(self.reader.custom_attributes(token))
        {
            return match self
                .index()
                .namespace(&def.namespace)
                .and_then(|ns| ns.types.get(&def.name))
            {
                Some(&variant) if variant != token => self.request_definition(variant, context),
                _ => Err(Error::PlatformIncompatible(format!(
                    "The requested API ({}) was found but is not available given the target platform ({}).",
                    def.name,
                    self.index().platform()
                ))),
            };
        }

        let kind = self.index().kind(token);
        if kind == TypeKind::DelegateLike
            && !context.allow_marshaling
            && !delegates::is_untyped(&def.name)
        {
            return self.function_pointer_for(def, context);
        }

        let full_name = format!("{}.{}", def.namespace, def.name);
        if self.generator.environment.has_type(&full_name) {
            trace!(%full_name, "Type is already defined by the target");
            return Ok(TypeExpr::named(&def.namespace, &def.name));
        }

        let managed = self.is_managed(token)?;
        let emitted = if managed && !context.allow_marshaling && self.allows_marshaling() {
            format!("{}{UNMANAGED_SUFFIX}", def.name)
        } else {
            def.name.clone()
        };

        // Types that never need marshaling look the same in every context; one declaration
        // serves them all.
        let key_context = Context::new(if managed {
            context.allow_marshaling
        } else {
            self.allows_marshaling()
        });

        let key = LedgerKey::Type(TypeIdentity::new(&def.namespace, &def.name), key_context);
        self.generator.ledger.generate(key, || {
            self.synthesize(def, &emitted, key_context)
                .map_err(|error| error.wrap_generation(&emitted))
        })?;

        Ok(TypeExpr::named(&def.namespace, emitted))
    }

    /// Produces the declaration of a top-level type, or nothing for types that are not emitted.
    fn synthesize(
        &self,
        def: &TypeDefinition,
        emitted: &str,
        context: Context,
    ) -> Result<Option<Declaration>> {
        let attributes = self.reader.custom_attributes(def.token);
        if find_attribute(attributes, COMPILER_SERVICES_NAMESPACE, COMPILER_GENERATED).is_some() {
            return Ok(None);
        }

        self.generator.synthesis_calls.fetch_add(1, Ordering::Relaxed);
        let Some(kind) = self.synthesize_kind(def, context)? else {
            return Ok(None);
        };

        let mut declaration = Declaration::new(&def.namespace, emitted, kind);
        declaration.docs = self.docs(&def.name);
        Ok(Some(declaration))
    }

    fn synthesize_kind(
        &self,
        def: &TypeDefinition,
        context: Context,
    ) -> Result<Option<DeclarationKind>> {
        Ok(Some(match self.index().kind(def.token) {
            TypeKind::StructLike => DeclarationKind::Struct(self.synthesize_struct(def, context)?),
            TypeKind::EnumLike => DeclarationKind::Enum(self.synthesize_enum(def)?),
            TypeKind::DelegateLike if delegates::is_untyped(&def.name) => {
                DeclarationKind::UntypedDelegate
            }
            TypeKind::DelegateLike if context.allow_marshaling => {
                DeclarationKind::Delegate(self.synthesize_delegate(def, context)?)
            }
            TypeKind::DelegateLike => return Ok(None),
            TypeKind::InterfaceLike => {
                DeclarationKind::Interface(self.synthesize_interface(def, context)?)
            }
            TypeKind::Other => {
                return Err(not_supported!(
                    "{} is not a struct, enum, delegate or interface",
                    def.name
                ))
            }
        }))
    }

    /// Returns `true` if declarations of the type depend on runtime marshaling: delegates,
    /// interfaces, and structs that hold either.
    ///
    /// Recursive struct graphs terminate because a type under evaluation counts as blittable.
    pub(crate) fn is_managed(&self, token: Token) -> Result<bool> {
        if let Some(known) = self.generator.managed.get(&token) {
            return Ok(*known);
        }

        let managed = match self.index().kind(token) {
            TypeKind::DelegateLike => {
                let def = self.reader.type_definition(token)?;
                !delegates::is_untyped(&def.name)
            }
            TypeKind::InterfaceLike => true,
            TypeKind::EnumLike | TypeKind::Other => false,
            TypeKind::StructLike => {
                self.generator.managed.insert(token, false);
                match self.holds_managed_field(token) {
                    Ok(managed) => managed,
                    Err(error) => {
                        self.generator.managed.remove(&token);
                        return Err(error);
                    }
                }
            }
        };

        self.generator.managed.insert(token, managed);
        Ok(managed)
    }

    fn holds_managed_field(&self, token: Token) -> Result<bool> {
        let def = self.reader.type_definition(token)?;
        for &field in &def.fields {
            let field = self.reader.field(field)?;
            if !field.is_static() && self.signature_is_managed(&field.signature)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn signature_is_managed(&self, signature: &TypeSignature) -> Result<bool> {
        match signature {
            TypeSignature::ValueType(token) | TypeSignature::Class(token) => {
                match self.local_definition(*token) {
                    Some(def) => self.is_managed(def),
                    None => Ok(false),
                }
            }
            TypeSignature::Ptr(pointer) => Ok(self.interface_target(&pointer.base).is_some()),
            TypeSignature::Array(array) => self.signature_is_managed(&array.base),
            TypeSignature::SzArray(_) | TypeSignature::String | TypeSignature::Object => Ok(true),
            _ => Ok(false),
        }
    }

    /// The definition in this store a type handle refers to, if there is one for this
    /// platform.
    pub(crate) fn local_definition(&self, token: Token) -> Option<Token> {
        match token.kind() {
            HandleKind::TypeDefinition => Some(token),
            HandleKind::TypeReference => self
                .index()
                .resolve_local(self.reader, token)
                .unwrap_or_default(),
            _ => None,
        }
    }

    /// The interface a signature names, for `ValueType` or `Class` signatures of interfaces
    /// defined in this store.
    pub(crate) fn interface_target(&self, signature: &TypeSignature) -> Option<Token> {
        match signature {
            TypeSignature::ValueType(token) | TypeSignature::Class(token) => self
                .local_definition(*token)
                .filter(|def| self.index().kind(*def) == TypeKind::InterfaceLike),
            _ => None,
        }
    }
}
