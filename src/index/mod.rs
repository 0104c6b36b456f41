//! A per-platform summary of one metadata store.
//!
//! The [`MetadataIndex`] is built once per store and target platform by a depth-first walk of
//! the namespace tree and is immutable afterwards, apart from two lazily filled caches. It
//! holds handles and names only, never borrowed rows, so it can be shared freely between
//! threads that each rent their own reader.
//!
//! # Key Components
//!
//! - [`MetadataIndex`] - Namespace maps, release methods, type classification and lookups
//! - [`NamespaceMetadata`] - Per-namespace name to handle maps, split by platform
//! - [`TypeIdentity`] - Reader-independent identity of a type
//! - [`TypeKind`] - The declaration shape of a type
//! - [`Platform`] / [`InteropArchitecture`] - Target platform and architecture decorations

mod identity;
mod namespace;
mod platform;

pub use identity::{TypeIdentity, TypeKind};
pub use namespace::NamespaceMetadata;
pub use platform::{InteropArchitecture, Platform};

use std::collections::{HashMap, HashSet};

use dashmap::DashMap;
use tracing::debug;

use crate::{
    metadata::{
        customattributes::{
            find_decoration, CustomAttribute, INTEROP_DECORATION_NAMESPACE, RAII_FREE,
            SUPPORTED_ARCHITECTURE,
        },
        reader::MetadataReader,
        signatures::TypeSignature,
        tables::{FieldAttributes, NamespaceDefinition, ResolutionScope, TypeReference},
        token::Token,
    },
    Error, Result,
};

/// Name of the per-namespace class holding extern methods and constants.
pub const APIS_CLASS: &str = "Apis";

/// Summary of one store for one target platform.
pub struct MetadataIndex {
    assembly: String,
    platform: Platform,
    uses_architecture: bool,
    namespaces: Vec<NamespaceMetadata>,
    by_name: HashMap<String, usize>,
    apis: Vec<Token>,
    kinds: HashMap<Token, TypeKind>,
    release_methods: HashMap<Token, String>,
    release_method_names: HashSet<String>,
    pointer_sized_handles: HashSet<String>,
    common_namespace: String,
    enum_values: DashMap<String, Option<String>>,
    ref_to_def: DashMap<Token, LocalDefinition>,
}

/// Cached outcome of resolving a `TypeRef` within its own store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LocalDefinition {
    /// The definition, or `None` if the store does not define the name
    Resolved(Option<Token>),
    /// Only definitions for other platforms exist
    OtherPlatform,
}

impl MetadataIndex {
    /// Walks `reader` and builds the index for `platform`.
    ///
    /// # Errors
    ///
    /// Returns an error if a row referenced by the namespace tree cannot be read.
    pub fn build(reader: &dyn MetadataReader, platform: Platform) -> Result<Self> {
        let mut index = MetadataIndex {
            assembly: reader.assembly_name().to_string(),
            platform,
            uses_architecture: reader
                .uses_attribute(INTEROP_DECORATION_NAMESPACE, SUPPORTED_ARCHITECTURE),
            namespaces: Vec::new(),
            by_name: HashMap::new(),
            apis: Vec::new(),
            kinds: HashMap::new(),
            release_methods: HashMap::new(),
            release_method_names: HashSet::new(),
            pointer_sized_handles: HashSet::new(),
            common_namespace: String::new(),
            enum_values: DashMap::new(),
            ref_to_def: DashMap::new(),
        };

        for def in reader.type_definitions() {
            index
                .kinds
                .insert(def.token, TypeKind::classify(reader, def.token)?);
        }

        index.populate(reader, reader.root_namespace())?;

        let names: Vec<&str> = index.namespaces.iter().map(|ns| ns.name.as_str()).collect();
        let prefix = common_prefix(&names);
        index.common_namespace = prefix.strip_suffix('.').unwrap_or(prefix).to_string();

        debug!(
            assembly = %index.assembly,
            %platform,
            namespaces = index.namespaces.len(),
            types = index.namespaces.iter().map(|ns| ns.types.len()).sum::<usize>(),
            methods = index.namespaces.iter().map(|ns| ns.methods.len()).sum::<usize>(),
            release_methods = index.release_methods.len(),
            "Built metadata index"
        );
        Ok(index)
    }

    fn populate(&mut self, reader: &dyn MetadataReader, ns: &NamespaceDefinition) -> Result<()> {
        let mut metadata = NamespaceMetadata::new(&ns.name);

        for &token in &ns.types {
            let def = reader.type_definition(token)?;
            if def.name == "<Module>" {
                continue;
            }

            if def.name == APIS_CLASS {
                self.apis.push(token);
                for &method_token in &def.methods {
                    let method = reader.method(method_token)?;
                    if self.is_compatible(reader.custom_attributes(method_token)) {
                        metadata
                            .methods
                            .entry(method.name.clone())
                            .or_insert(method_token);
                    } else {
                        metadata
                            .methods_for_other_platform
                            .insert(method.name.clone());
                    }
                }

                for &field_token in &def.fields {
                    let field = reader.field(field_token)?;
                    if field
                        .flags
                        .contains(FieldAttributes::STATIC | FieldAttributes::PUBLIC)
                    {
                        metadata
                            .fields
                            .entry(field.name.clone())
                            .or_insert(field_token);
                    }
                }
            } else if self.is_compatible(reader.custom_attributes(token)) {
                metadata.types.insert(def.name.clone(), token);

                if def.fields.len() == 1 && self.kind(token) == TypeKind::StructLike {
                    let attributes = reader.custom_attributes(token);
                    if let Some(free) = find_decoration(attributes, RAII_FREE)
                        .and_then(|attr| attr.arg(0))
                        .and_then(|arg| arg.as_str())
                    {
                        self.release_methods.insert(token, free.to_string());
                        self.release_method_names.insert(free.to_string());

                        let field = reader.field(def.fields[0])?;
                        if matches!(field.signature, TypeSignature::I | TypeSignature::U) {
                            self.pointer_sized_handles.insert(def.name.clone());
                        }
                    }
                }
            } else {
                metadata.types_for_other_platform.insert(def.name.clone());
            }
        }

        if !metadata.is_empty() {
            self.by_name
                .insert(metadata.name.clone(), self.namespaces.len());
            self.namespaces.push(metadata);
        }

        for child in &ns.children {
            self.populate(reader, child)?;
        }
        Ok(())
    }

    /// Returns `true` if a definition with these attributes applies to the target platform.
    ///
    /// Stores that never use the architecture decoration are compatible throughout.
    #[must_use]
    pub fn is_compatible(&self, attributes: &[CustomAttribute]) -> bool {
        if !self.uses_architecture {
            return true;
        }

        match find_decoration(attributes, SUPPORTED_ARCHITECTURE)
            .and_then(|attr| attr.arg(0))
            .and_then(|arg| arg.as_i64())
        {
            Some(bits) => self
                .platform
                .supports(InteropArchitecture::from_bits_truncate(bits as u32)),
            None => true,
        }
    }

    /// Simple name of the indexed assembly.
    #[must_use]
    pub fn assembly_name(&self) -> &str {
        &self.assembly
    }

    /// The platform this index filters for.
    #[must_use]
    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Namespaces in walk order; empty namespaces are omitted.
    #[must_use]
    pub fn namespaces(&self) -> &[NamespaceMetadata] {
        &self.namespaces
    }

    /// A namespace by its exact name.
    #[must_use]
    pub fn namespace(&self, name: &str) -> Option<&NamespaceMetadata> {
        self.by_name.get(name).map(|&at| &self.namespaces[at])
    }

    /// A namespace by name, ignoring ASCII case.
    #[must_use]
    pub fn namespace_ignore_case(&self, name: &str) -> Option<&NamespaceMetadata> {
        self.namespace(name).or_else(|| {
            self.namespaces
                .iter()
                .find(|ns| ns.name.eq_ignore_ascii_case(name))
        })
    }

    /// The `Apis` classes of every namespace.
    #[must_use]
    pub fn apis(&self) -> &[Token] {
        &self.apis
    }

    /// The classification of a `TypeDef` row; [`TypeKind::Other`] for unknown handles.
    #[must_use]
    pub fn kind(&self, token: Token) -> TypeKind {
        self.kinds.get(&token).copied().unwrap_or(TypeKind::Other)
    }

    /// Platform-compatible top-level types named `name`, one per namespace that declares it.
    #[must_use]
    pub fn find_types(&self, name: &str) -> Vec<Token> {
        self.namespaces
            .iter()
            .filter_map(|ns| ns.types.get(name).copied())
            .collect()
    }

    /// Platform-compatible extern methods named `name`.
    #[must_use]
    pub fn find_methods(&self, name: &str) -> Vec<Token> {
        self.namespaces
            .iter()
            .filter_map(|ns| ns.methods.get(name).copied())
            .collect()
    }

    /// Constants named `name`.
    #[must_use]
    pub fn find_constants(&self, name: &str) -> Vec<Token> {
        self.namespaces
            .iter()
            .filter_map(|ns| ns.fields.get(name).copied())
            .collect()
    }

    /// The first constant named `name` in walk order.
    #[must_use]
    pub fn find_constant(&self, name: &str) -> Option<Token> {
        self.namespaces
            .iter()
            .find_map(|ns| ns.fields.get(name).copied())
    }

    /// Returns `true` if a type or method named `name` exists, but only for other platforms.
    #[must_use]
    pub fn exists_for_other_platform(&self, name: &str) -> bool {
        self.namespaces.iter().any(|ns| {
            ns.types_for_other_platform.contains(name)
                || ns.methods_for_other_platform.contains(name)
        })
    }

    /// The release method recorded for a handle type.
    #[must_use]
    pub fn release_method(&self, token: Token) -> Option<&str> {
        self.release_methods.get(&token).map(String::as_str)
    }

    /// Every handle type with a release method.
    #[must_use]
    pub fn release_methods(&self) -> &HashMap<Token, String> {
        &self.release_methods
    }

    /// Returns `true` if `method` releases some handle type.
    #[must_use]
    pub fn is_release_method(&self, method: &str) -> bool {
        self.release_method_names.contains(method)
    }

    /// Returns `true` if the handle type named `name` wraps a pointer-sized value.
    #[must_use]
    pub fn is_pointer_sized_handle(&self, name: &str) -> bool {
        self.pointer_sized_handles.contains(name)
    }

    /// The longest namespace prefix shared by every namespace, without a trailing `.`.
    #[must_use]
    pub fn common_namespace(&self) -> &str {
        &self.common_namespace
    }

    /// Finds the enum that declares a member named `member`.
    ///
    /// The first enum in table order wins. Results, including misses, are cached.
    #[must_use]
    pub fn enum_name(&self, reader: &dyn MetadataReader, member: &str) -> Option<String> {
        if let Some(cached) = self.enum_values.get(member) {
            return cached.clone();
        }

        let found = reader
            .type_definitions()
            .iter()
            .filter(|def| self.kind(def.token) == TypeKind::EnumLike)
            .find(|def| {
                def.fields.iter().any(|&field| {
                    reader
                        .field(field)
                        .is_ok_and(|field| field.is_literal() && field.name == member)
                })
            })
            .map(|def| def.name.clone());

        self.enum_values.insert(member.to_string(), found.clone());
        found
    }

    /// Translates a `TypeRef` to the `TypeDef` it names within this same store.
    ///
    /// Returns `Ok(None)` for references into other assemblies and for names this store does
    /// not define. Results are cached per handle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PlatformIncompatible`] when the only definitions with a matching name
    /// are restricted to other platforms.
    pub fn resolve_local(
        &self,
        reader: &dyn MetadataReader,
        reference: Token,
    ) -> Result<Option<Token>> {
        let cached = self.ref_to_def.get(&reference).map(|entry| *entry);
        let type_ref = reader.type_reference(reference)?;
        let resolved = match cached {
            Some(resolved) => resolved,
            None => {
                let resolved = self.scan_local(reader, type_ref)?;
                self.ref_to_def.insert(reference, resolved);
                resolved
            }
        };

        match resolved {
            LocalDefinition::Resolved(found) => Ok(found),
            LocalDefinition::OtherPlatform => Err(Error::PlatformIncompatible(format!(
                "{}.{} is not declared for this platform ({}).",
                type_ref.namespace, type_ref.name, self.platform
            ))),
        }
    }

    fn scan_local(
        &self,
        reader: &dyn MetadataReader,
        type_ref: &TypeReference,
    ) -> Result<LocalDefinition> {
        let expected_parent = match type_ref.scope {
            ResolutionScope::Assembly(_) => return Ok(LocalDefinition::Resolved(None)),
            ResolutionScope::Module => None,
            ResolutionScope::TypeReference(parent) => match self.resolve_local(reader, parent)? {
                Some(parent) => Some(parent),
                None => return Ok(LocalDefinition::Resolved(None)),
            },
        };

        let mut incompatible = false;
        for def in reader.type_definitions() {
            if def.name != type_ref.name || def.namespace != type_ref.namespace {
                continue;
            }
            if !self.is_compatible(reader.custom_attributes(def.token)) {
                incompatible = true;
                continue;
            }
            if def.enclosing == expected_parent {
                return Ok(LocalDefinition::Resolved(Some(def.token)));
            }
        }

        Ok(if incompatible {
            LocalDefinition::OtherPlatform
        } else {
            LocalDefinition::Resolved(None)
        })
    }
}

impl std::fmt::Debug for MetadataIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataIndex")
            .field("assembly", &self.assembly)
            .field("platform", &self.platform)
            .field("namespaces", &self.namespaces.len())
            .finish_non_exhaustive()
    }
}

fn common_prefix<'a>(names: &[&'a str]) -> &'a str {
    let Some((first, rest)) = names.split_first() else {
        return "";
    };

    let mut segments = first.split('.').count();
    for name in rest {
        segments = first
            .split('.')
            .zip(name.split('.'))
            .take(segments)
            .take_while(|(a, b)| a == b)
            .count();
    }
    // Every shared segment keeps its trailing separator; `first` itself may have none.
    let length: usize = first.split('.').take(segments).map(|s| s.len() + 1).sum();
    first.get(..length).unwrap_or(first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::{
            customattributes::CustomAttributeArgument, memory::MetadataBuilder,
            tables::ConstantValue,
        },
        test::fixtures,
    };

    #[test]
    fn common_prefix_trims_to_whole_segments() {
        assert_eq!(common_prefix(&[]), "");
        assert_eq!(common_prefix(&["Windows.Win32"]), "Windows.Win32");
        assert_eq!(
            common_prefix(&["Windows.Win32.Foundation", "Windows.Win32.Graphics.Gdi"]),
            "Windows.Win32."
        );
        assert_eq!(common_prefix(&["A.B", "C.D"]), "");
        assert_eq!(
            common_prefix(&["Windows.Win32.Foundation", "Windows.Win32.FileSystem"]),
            "Windows.Win32."
        );
        assert_eq!(
            common_prefix(&["Windows.Win32", "Windows.Win32.Foundation"]),
            "Windows.Win32"
        );
        assert_eq!(common_prefix(&["Ä.One", "Ö.Two"]), "");
        assert_eq!(common_prefix(&["Ä.One.Eins", "Ä.One.Zwei"]), "Ä.One.");
        assert_eq!(common_prefix(&["Äpfel.One", "Ärger.One"]), "");
    }

    #[test]
    fn non_ascii_namespaces_are_indexed() {
        let mut builder = MetadataBuilder::new("Test");
        let first = builder.struct_type("Ä.One", "FIRST");
        builder.field(first, "value", TypeSignature::I4);
        let second = builder.struct_type("Ö.Two", "SECOND");
        builder.field(second, "value", TypeSignature::I4);

        let index = MetadataIndex::build(&builder.build(), Platform::X64).unwrap();
        assert_eq!(index.common_namespace(), "");
        assert!(index.namespace("Ä.One").unwrap().types.contains_key("FIRST"));
    }

    #[test]
    fn namespaces_and_apis() {
        let metadata = fixtures::win32();
        let index = MetadataIndex::build(&metadata, Platform::X64).unwrap();

        assert_eq!(index.common_namespace(), "Windows.Win32");
        let foundation = index.namespace("Windows.Win32.Foundation").unwrap();
        assert!(foundation.types.contains_key("POINT"));
        assert!(foundation.methods.contains_key("CloseHandle"));
        assert!(foundation.fields.contains_key("MAX_PATH"));
        assert!(!foundation.types.contains_key(APIS_CLASS));
        assert!(index
            .namespace_ignore_case("windows.win32.foundation")
            .is_some());
        assert_eq!(index.apis().len(), 2);
    }

    #[test]
    fn release_methods_are_recorded() {
        let metadata = fixtures::win32();
        let index = MetadataIndex::build(&metadata, Platform::X64).unwrap();

        let handle = index.find_types("HANDLE")[0];
        assert_eq!(index.release_method(handle), Some("CloseHandle"));
        assert!(index.is_release_method("CloseHandle"));
        assert!(index.is_pointer_sized_handle("HANDLE"));
    }

    #[test]
    fn architecture_filtering() {
        let metadata = fixtures::win32();

        let x64 = MetadataIndex::build(&metadata, Platform::X64).unwrap();
        assert_eq!(x64.find_types("CONTEXT").len(), 1);

        let arm64 = MetadataIndex::build(&metadata, Platform::Arm64).unwrap();
        assert!(arm64.find_types("CONTEXT").is_empty());
        assert!(arm64.exists_for_other_platform("CONTEXT"));

        let any = MetadataIndex::build(&metadata, Platform::AnyCpu).unwrap();
        assert!(any.find_types("CONTEXT").is_empty());
        assert_eq!(any.find_types("POINT").len(), 1);
    }

    #[test]
    fn undecorated_stores_are_compatible_everywhere() {
        let mut builder = MetadataBuilder::new("Plain");
        builder.struct_type("Plain", "ONLY");
        let metadata = builder.build();

        let index = MetadataIndex::build(&metadata, Platform::AnyCpu).unwrap();
        assert_eq!(index.find_types("ONLY").len(), 1);
        assert!(index.is_compatible(&[CustomAttribute::new(
            INTEROP_DECORATION_NAMESPACE,
            SUPPORTED_ARCHITECTURE,
            vec![CustomAttributeArgument::I4(2)]
        )]));
    }

    #[test]
    fn enum_member_lookup_is_cached() {
        let metadata = fixtures::win32();
        let index = MetadataIndex::build(&metadata, Platform::X64).unwrap();

        assert_eq!(
            index.enum_name(&metadata, "FILE_SHARE_READ").as_deref(),
            Some("FILE_SHARE_MODE")
        );
        assert_eq!(index.enum_name(&metadata, "NOT_A_MEMBER"), None);
        assert!(index.enum_values.contains_key("NOT_A_MEMBER"));
    }

    #[test]
    fn empty_store_yields_empty_index() {
        let metadata = MetadataBuilder::new("Empty").build();
        let index = MetadataIndex::build(&metadata, Platform::X64).unwrap();
        assert!(index.namespaces().is_empty());
        assert_eq!(index.common_namespace(), "");
        assert!(index.find_constant("X").is_none());
    }

    #[test]
    fn local_references_resolve() {
        let mut builder = MetadataBuilder::new("Test");
        let point = builder.struct_type("Test", "POINT");
        let outer = builder.struct_type("Test", "OUTER");
        let inner = builder.struct_type("Test", "_Inner");
        builder.nest(outer, inner);
        let point_ref = builder.local_ref("Test", "POINT");
        let outer_ref = builder.local_ref("Test", "OUTER");
        let inner_ref = builder.type_ref("", "_Inner", ResolutionScope::TypeReference(outer_ref));
        let missing = builder.local_ref("Test", "MISSING");
        builder.constant(point, "UNUSED", ConstantValue::I4(0));
        let metadata = builder.build();

        let index = MetadataIndex::build(&metadata, Platform::X64).unwrap();
        assert_eq!(index.resolve_local(&metadata, point_ref).unwrap(), Some(point));
        assert_eq!(index.resolve_local(&metadata, inner_ref).unwrap(), Some(inner));
        assert_eq!(index.resolve_local(&metadata, missing).unwrap(), None);
    }

    #[test]
    fn incompatible_local_reference_is_reported() {
        let metadata = fixtures::win32();
        let index = MetadataIndex::build(&metadata, Platform::Arm64).unwrap();
        let reference = fixtures::type_ref(&metadata, "Windows.Win32.System.Diagnostics", "CONTEXT");

        let error = index.resolve_local(&metadata, reference).unwrap_err();
        assert!(matches!(error, Error::PlatformIncompatible(_)));
        assert_eq!(
            index.ref_to_def.get(&reference).map(|entry| *entry),
            Some(LocalDefinition::OtherPlatform)
        );

        let again = index.resolve_local(&metadata, reference).unwrap_err();
        assert_eq!(again.to_string(), error.to_string());
    }
}
