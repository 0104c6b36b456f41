//! The per-store generator.
//!
//! A [`Generator`] owns everything generated from one metadata store: the index built for the
//! target platform, the [`GenerationLedger`] of committed declarations and the caches shared by
//! every request. Requests rent their own reader from the store and run as one ledger
//! transaction each, so a failed request never leaves partial output behind.
//!
//! # Key Components
//!
//! - [`Generator`] - Type, method and constant requests against one store
//! - [`RequestOutcome`] - What a by-name request matched
//! - [`SweepReport`] - Per-item results of [`Generator::generate_all`]
//!
//! # Examples
//!
//! ```rust
//! use dotbind::prelude::*;
//!
//! let mut builder = MetadataBuilder::new("Contoso");
//! let point = builder.struct_type("Contoso.Geometry", "POINT");
//! builder.field(point, "x", TypeSignature::I4);
//!
//! let generator = Generator::from_metadata(builder.build(), GeneratorOptions::default())?;
//! let outcome = generator.try_generate("POINT", &CancellationToken::new())?;
//! assert_eq!(outcome, RequestOutcome::Generated(vec!["Contoso.Geometry.POINT".to_string()]));
//! # Ok::<(), dotbind::Error>(())
//! ```

mod requests;

pub use requests::{contains_illegal_characters, RequestOutcome, SweepReport};

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Weak,
    },
};

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::{
    config::GeneratorOptions,
    docs::DocsProvider,
    file::memory::Memory,
    index::MetadataIndex,
    ledger::{Context, GenerationLedger},
    metadata::{memory::InMemoryMetadata, reader::MetadataReader, token::Token},
    render::{self, OutputUnit, UnitSettings},
    resolver::{CoreLibrary, ExternalTypeResolver, TargetEnvironment},
    store::MetadataStore,
    synth::{
        declarations::{Declaration, TypeExpr},
        Synthesizer,
    },
    Error, Result,
};

/// Generates declarations from one metadata store.
pub struct Generator {
    store: Arc<MetadataStore>,
    pub(crate) index: Arc<MetadataIndex>,
    pub(crate) options: GeneratorOptions,
    pub(crate) ledger: GenerationLedger<Declaration>,
    pub(crate) synthesis_calls: AtomicUsize,
    federation: RwLock<Option<Weak<dyn ExternalTypeResolver>>>,
    pub(crate) environment: Arc<dyn TargetEnvironment>,
    pub(crate) docs: Option<Arc<dyn DocsProvider>>,
    pub(crate) managed: DashMap<Token, bool>,
}

impl std::fmt::Debug for Generator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generator")
            .field("store", &self.store)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

impl Generator {
    /// Creates a generator over `store`, indexing it for the target platform of `options`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is disposed or its index cannot be built.
    pub fn new(store: Arc<MetadataStore>, options: GeneratorOptions) -> Result<Self> {
        let index = store.index(options.target_platform())?;
        Ok(Generator {
            store,
            index,
            options,
            ledger: GenerationLedger::new(),
            synthesis_calls: AtomicUsize::new(0),
            federation: RwLock::new(None),
            environment: Arc::new(CoreLibrary),
            docs: None,
            managed: DashMap::new(),
        })
    }

    /// Creates a generator over metadata held in memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be built.
    pub fn in_memory(metadata: InMemoryMetadata, options: GeneratorOptions) -> Result<Self> {
        let path = format!("{}.winmd", metadata.assembly_name());
        let store =
            MetadataStore::from_backend(path, Arc::new(Memory::new(Vec::new())), metadata.factory());
        Self::new(store, options)
    }

    /// Shorthand for a shared [`Generator::in_memory`].
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be built.
    pub fn from_metadata(metadata: InMemoryMetadata, options: GeneratorOptions) -> Result<Arc<Self>> {
        Self::in_memory(metadata, options).map(Arc::new)
    }

    /// Replaces the environment consulted for types the destination already defines.
    #[must_use]
    pub fn with_environment(mut self, environment: Arc<dyn TargetEnvironment>) -> Self {
        self.environment = environment;
        self
    }

    /// Attaches documentation to the generated declarations.
    #[must_use]
    pub fn with_docs(mut self, docs: Arc<dyn DocsProvider>) -> Self {
        self.docs = Some(docs);
        self
    }

    /// Simple name of the assembly this generator reads.
    #[must_use]
    pub fn assembly_name(&self) -> &str {
        self.index.assembly_name()
    }

    /// The options this generator was created with.
    #[must_use]
    pub fn options(&self) -> &GeneratorOptions {
        &self.options
    }

    /// The index of the store for the target platform.
    #[must_use]
    pub fn index(&self) -> &Arc<MetadataIndex> {
        &self.index
    }

    /// The store this generator reads.
    #[must_use]
    pub fn store(&self) -> &Arc<MetadataStore> {
        &self.store
    }

    /// Number of declarations synthesized so far. Requests answered from the ledger do not
    /// count.
    #[must_use]
    pub fn synthesis_calls(&self) -> usize {
        self.synthesis_calls.load(Ordering::Relaxed)
    }

    /// Joins a federation that resolves references into other assemblies.
    ///
    /// The generator holds the federation weakly, so a federation owning its generators does
    /// not keep itself alive.
    pub fn attach(&self, federation: Weak<dyn ExternalTypeResolver>) {
        *self.federation.write() = Some(federation);
    }

    pub(crate) fn federation(&self) -> Option<Arc<dyn ExternalTypeResolver>> {
        self.federation.read().as_ref().and_then(Weak::upgrade)
    }

    /// The context top-level requests run in.
    pub(crate) fn default_context(&self) -> Context {
        Context::new(self.options.allow_marshaling)
    }

    /// Rents a reader and runs `f` as one ledger transaction.
    pub(crate) fn with_synthesizer<T>(
        &self,
        f: impl FnOnce(&Synthesizer<'_>) -> Result<T>,
    ) -> Result<T> {
        let reader = self.store.rent()?;
        let synthesizer = Synthesizer::new(self, &*reader);
        self.ledger.transaction(|| f(&synthesizer))
    }

    /// Generates the top-level type `namespace.name` and everything it depends on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the store does not define the type,
    /// [`Error::PlatformIncompatible`] if it does so for other platforms only, and the
    /// generation error otherwise.
    pub fn request_type_by_name(
        &self,
        namespace: &str,
        name: &str,
        context: Context,
    ) -> Result<TypeExpr> {
        self.try_request_type(namespace, name, context)?
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "{namespace}.{name} is not defined in \"{}\".",
                    self.assembly_name()
                ))
            })
    }

    /// Like [`Generator::request_type_by_name`], but returns `Ok(None)` if the store does
    /// not define the type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PlatformIncompatible`] if the type exists for other platforms only,
    /// and the generation error otherwise.
    pub fn try_request_type(
        &self,
        namespace: &str,
        name: &str,
        context: Context,
    ) -> Result<Option<TypeExpr>> {
        let Some(ns) = self.index.namespace(namespace) else {
            return Ok(None);
        };

        match ns.types.get(name) {
            Some(&token) => self
                .with_synthesizer(|synth| synth.request_definition(token, context))
                .map(Some),
            None if ns.types_for_other_platform.contains(name) => {
                Err(self.platform_incompatible(name))
            }
            None => Ok(None),
        }
    }

    /// Generates the extern method `name` and returns the name it is emitted under.
    ///
    /// With wide-only generation, `Foo` also finds `FooW`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Usage`] for banned APIs, [`Error::NotFound`] for unknown names,
    /// [`Error::PlatformIncompatible`] for methods of other platforms, and the generation
    /// error otherwise.
    pub fn request_method(&self, name: &str) -> Result<String> {
        if let Some(reason) = self.options.banned_reason(name) {
            return Err(Error::Usage(reason.to_string()));
        }

        match self.method_matches(None, name).as_slice() {
            [(namespace, token)] => {
                self.with_synthesizer(|synth| synth.request_method(namespace, *token))
            }
            [] if self.index.exists_for_other_platform(name) => {
                Err(self.platform_incompatible(name))
            }
            [] => Err(Error::NotFound(format!(
                "No extern method named {name} in \"{}\".",
                self.assembly_name()
            ))),
            _ => Err(Error::Usage(format!(
                "{name} is ambiguous; qualify it with its namespace"
            ))),
        }
    }

    /// Generates the constant `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for unknown names and the generation error otherwise.
    pub fn request_constant(&self, name: &str) -> Result<()> {
        let Some((namespace, token)) = self.constant_matches(None, name).into_iter().next() else {
            return Err(Error::NotFound(format!(
                "No constant named {name} in \"{}\".",
                self.assembly_name()
            )));
        };
        self.with_synthesizer(|synth| synth.request_constant(&namespace, token))
    }

    /// Extern methods matching `name`, optionally restricted to one namespace.
    pub(crate) fn method_matches(&self, namespace: Option<&str>, name: &str) -> Vec<(String, Token)> {
        let exact = self.matches(namespace, |ns| ns.methods.get(name).copied());
        if !exact.is_empty() || !self.options.wide_char_only {
            return exact;
        }

        let wide = format!("{name}W");
        self.matches(namespace, |ns| ns.methods.get(&wide).copied())
    }

    /// Top-level types matching `name`, optionally restricted to one namespace.
    pub(crate) fn type_matches(&self, namespace: Option<&str>, name: &str) -> Vec<(String, Token)> {
        self.matches(namespace, |ns| ns.types.get(name).copied())
    }

    /// Constants matching `name`, optionally restricted to one namespace.
    pub(crate) fn constant_matches(
        &self,
        namespace: Option<&str>,
        name: &str,
    ) -> Vec<(String, Token)> {
        self.matches(namespace, |ns| ns.fields.get(name).copied())
    }

    fn matches(
        &self,
        namespace: Option<&str>,
        find: impl Fn(&crate::index::NamespaceMetadata) -> Option<Token>,
    ) -> Vec<(String, Token)> {
        self.index
            .namespaces()
            .iter()
            .filter(|ns| namespace.map_or(true, |wanted| ns.name == wanted))
            .filter_map(|ns| find(ns).map(|token| (ns.name.clone(), token)))
            .collect()
    }

    pub(crate) fn platform_incompatible(&self, name: &str) -> Error {
        Error::PlatformIncompatible(format!(
            "The requested API ({name}) was found but is not available given the target platform ({}).",
            self.index.platform()
        ))
    }

    /// The committed declaration named `name` in `namespace`.
    #[must_use]
    pub fn declaration(&self, namespace: &str, name: &str) -> Option<Arc<Declaration>> {
        self.ledger
            .committed()
            .into_iter()
            .map(|(_, declaration)| declaration)
            .find(|declaration| declaration.namespace == namespace && declaration.name == name)
    }

    /// Every committed declaration, dependencies before their dependents.
    #[must_use]
    pub fn committed(&self) -> Vec<Arc<Declaration>> {
        self.ledger
            .committed()
            .into_iter()
            .map(|(_, declaration)| declaration)
            .collect()
    }

    /// Groups everything committed so far into output units.
    #[must_use]
    pub fn output_units(&self) -> Vec<OutputUnit> {
        let settings = Arc::new(UnitSettings::new(
            &self.options,
            self.index.common_namespace(),
        ));
        render::group(self.committed(), &settings, self.options.emit_single_file)
    }

    /// Renders every output unit, keyed by unit name.
    #[must_use]
    pub fn render(&self) -> BTreeMap<String, String> {
        render::render_units(&self.output_units())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        index::Platform,
        synth::declarations::DeclarationKind,
        test::fixtures,
    };

    fn win32(options: GeneratorOptions) -> Arc<Generator> {
        Generator::from_metadata(fixtures::win32(), options.with_platform(Platform::X64)).unwrap()
    }

    #[test]
    fn repeated_requests_are_answered_from_the_ledger() {
        let generator = win32(GeneratorOptions::default());
        let first = generator
            .request_type_by_name(fixtures::FOUNDATION, "RECT", Context::new(true))
            .unwrap();
        let calls = generator.synthesis_calls();
        let committed = generator.committed().len();

        let second = generator
            .request_type_by_name(fixtures::FOUNDATION, "RECT", Context::new(true))
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(generator.synthesis_calls(), calls);
        assert_eq!(generator.committed().len(), committed);
    }

    #[test]
    fn dependencies_commit_with_their_dependent() {
        let generator = win32(GeneratorOptions::default());
        generator
            .request_type_by_name(fixtures::IOCTL, "VOLUME_DISK_EXTENTS", Context::new(true))
            .unwrap();

        let order: Vec<_> = generator
            .committed()
            .iter()
            .map(|declaration| declaration.name.clone())
            .collect();
        let extent = order.iter().position(|name| name == "DISK_EXTENT").unwrap();
        let volume = order.iter().position(|name| name == "VOLUME_DISK_EXTENTS").unwrap();
        assert!(extent < volume);
    }

    #[test]
    fn unknown_types_are_not_found() {
        let generator = win32(GeneratorOptions::default());
        let error = generator
            .request_type_by_name(fixtures::FOUNDATION, "NOT_A_TYPE", Context::new(true))
            .unwrap_err();
        assert!(matches!(error, Error::NotFound(_)));
        assert!(generator
            .try_request_type("Nowhere", "POINT", Context::new(true))
            .unwrap()
            .is_none());
    }

    #[test]
    fn failed_requests_leave_no_trace() {
        let generator = Generator::from_metadata(fixtures::contoso(), GeneratorOptions::default())
            .unwrap();
        assert!(generator
            .request_type_by_name("Contoso.Interop.Widgets", "WIDGET", Context::new(true))
            .is_err());
        assert!(generator.committed().is_empty());
        assert!(generator.ledger.is_empty());
    }

    #[test]
    fn wide_names_fall_back_to_their_w_variant() {
        let generator = win32(GeneratorOptions::default());
        assert_eq!(generator.request_method("CreateFile").unwrap(), "CreateFile");
        let declaration = generator.declaration(fixtures::FILE_SYSTEM, "CreateFile").unwrap();
        let DeclarationKind::Method(method) = &declaration.kind else {
            panic!("Unexpected declaration {:?}", declaration.kind);
        };
        assert_eq!(method.entry_point, "CreateFileW");
    }

    #[test]
    fn banned_methods_are_refused() {
        let generator = win32(GeneratorOptions::default());
        let error = generator.request_method("GetLastError").unwrap_err();
        assert!(matches!(error, Error::Usage(message) if message.contains("GetLastWin32Error")));
    }

    #[test]
    fn environment_types_are_referenced_not_declared() {
        let generator = Generator::in_memory(
            fixtures::win32(),
            GeneratorOptions::default().with_platform(Platform::X64),
        )
        .unwrap()
        .with_environment(Arc::new(|name: &str| name == "Windows.Win32.Foundation.RECT"));

        let rect = generator
            .request_type_by_name(fixtures::FOUNDATION, "RECT", Context::new(true))
            .unwrap();
        assert_eq!(rect, TypeExpr::named(fixtures::FOUNDATION, "RECT"));
        assert!(generator.declaration(fixtures::FOUNDATION, "RECT").is_none());
    }
}
