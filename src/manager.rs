//! A federation of generators over several metadata stores.
//!
//! Metadata stores reference each other by assembly name. A [`GeneratorSet`] owns one
//! [`Generator`] per assembly and answers the [`ExternalTypeResolver`] queries its members
//! raise for types defined elsewhere, so a struct in one store may embed a type of another
//! and both end up generated. Members only ever see that narrow query; the set decides which
//! store answers it.
//!
//! Requests by name go to every member and their outcomes are combined.
//!
//! # Examples
//!
//! ```rust
//! use dotbind::prelude::*;
//!
//! let mut win32 = MetadataBuilder::new("Windows.Win32");
//! let point = win32.struct_type("Windows.Win32.Foundation", "POINT");
//! win32.field(point, "x", TypeSignature::I4);
//!
//! let set = GeneratorSet::new();
//! set.add(Generator::in_memory(win32.build(), GeneratorOptions::default())?)?;
//! assert!(set.try_generate("POINT", &CancellationToken::new())?.is_generated());
//! # Ok::<(), dotbind::Error>(())
//! ```

use std::{
    collections::{BTreeMap, HashSet},
    sync::{Arc, Weak},
};

use dashmap::DashMap;
use parking_lot::{ReentrantMutex, RwLock};
use tracing::debug;

use crate::{
    generator::{Generator, RequestOutcome, SweepReport},
    ledger::{Context, Gate},
    render::{self, OutputUnit},
    resolver::ExternalTypeResolver,
    synth::declarations::TypeExpr,
    utils::cancellation::CancellationToken,
    Error, Result,
};

/// Generators for several stores, resolving references between them.
///
/// Members share one transaction gate. A request runs in its own generator's transaction
/// and then in the transactions of every member it requests types from, so members holding
/// separate gates could wait for each other forever.
pub struct GeneratorSet {
    this: Weak<GeneratorSet>,
    gate: Gate,
    generators: DashMap<String, Arc<Generator>>,
    order: RwLock<Vec<Arc<Generator>>>,
}

impl GeneratorSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|this| GeneratorSet {
            this: this.clone(),
            gate: Arc::new(ReentrantMutex::new(())),
            generators: DashMap::new(),
            order: RwLock::new(Vec::new()),
        })
    }

    /// Adds the generator of one store and attaches it to this set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Usage`] if a generator for the same assembly, compared ignoring
    /// case, is already part of the set.
    pub fn add(&self, generator: Generator) -> Result<Arc<Generator>> {
        let key = generator.assembly_name().to_ascii_lowercase();
        if self.generators.contains_key(&key) {
            return Err(Error::Usage(format!(
                "Metadata for the assembly \"{}\" was provided more than once",
                generator.assembly_name()
            )));
        }

        generator.ledger.share_gate(Arc::clone(&self.gate));
        let generator = Arc::new(generator);
        let federation: Weak<dyn ExternalTypeResolver> = self.this.clone();
        generator.attach(federation);

        debug!(assembly = %generator.assembly_name(), "Added generator to federation");
        self.generators.insert(key, Arc::clone(&generator));
        self.order.write().push(Arc::clone(&generator));
        Ok(generator)
    }

    /// The generator of `assembly`, compared ignoring case.
    #[must_use]
    pub fn get(&self, assembly: &str) -> Option<Arc<Generator>> {
        self.generators
            .get(&assembly.to_ascii_lowercase())
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Every generator, in the order they were added.
    #[must_use]
    pub fn generators(&self) -> Vec<Arc<Generator>> {
        self.order.read().clone()
    }

    /// Number of generators.
    #[must_use]
    pub fn len(&self) -> usize {
        self.generators.len()
    }

    /// Returns `true` if the set has no generators.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.generators.is_empty()
    }

    /// Runs [`Generator::try_generate`] on every member and combines the outcomes.
    ///
    /// Matches of all members are reported together. A platform mismatch in one member does
    /// not hide a match in another; it is only returned when nothing matched anywhere.
    ///
    /// # Errors
    ///
    /// Returns the first error other than a platform mismatch, or the platform mismatch if
    /// nothing matched.
    pub fn try_generate(
        &self,
        name: &str,
        cancellation: &CancellationToken,
    ) -> Result<RequestOutcome> {
        let mut generated = Vec::new();
        let mut ambiguous = Vec::new();
        let mut redirected = None;
        let mut banned = None;
        let mut incompatible = None;

        for generator in self.generators() {
            match generator.try_generate(name, cancellation) {
                Ok(RequestOutcome::Generated(apis)) => generated.extend(apis),
                Ok(RequestOutcome::Ambiguous(apis)) => ambiguous.extend(apis),
                Ok(outcome @ RequestOutcome::RedirectedToEnum { .. }) => {
                    redirected.get_or_insert(outcome);
                }
                Ok(outcome @ RequestOutcome::Banned(_)) => {
                    banned.get_or_insert(outcome);
                }
                Ok(RequestOutcome::NotFound { .. }) => {}
                Err(error) if error.is_platform_incompatible() => {
                    incompatible.get_or_insert(error);
                }
                Err(error) => return Err(error),
            }
        }

        if let Some(banned) = banned {
            return Ok(banned);
        }
        if !ambiguous.is_empty() {
            ambiguous.extend(generated);
            return Ok(RequestOutcome::Ambiguous(ambiguous));
        }
        if !generated.is_empty() {
            return Ok(RequestOutcome::Generated(generated));
        }
        if let Some(redirected) = redirected {
            return Ok(redirected);
        }
        if let Some(incompatible) = incompatible {
            return Err(incompatible);
        }

        Ok(RequestOutcome::NotFound {
            suggestions: self.suggestions(name),
            illegal_characters: crate::generator::contains_illegal_characters(name),
        })
    }

    /// Runs [`Generator::generate_module`] on every member and returns the total match
    /// count.
    ///
    /// # Errors
    ///
    /// Returns the first error a member returns.
    pub fn generate_module(&self, module: &str, cancellation: &CancellationToken) -> Result<usize> {
        let mut total = 0;
        for generator in self.generators() {
            total += generator.generate_module(module, cancellation)?;
        }
        Ok(total)
    }

    /// Runs [`Generator::generate_all`] on every member, one after the other, and merges
    /// the reports.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] when `cancellation` fires.
    pub fn generate_all(&self, cancellation: &CancellationToken) -> Result<SweepReport> {
        let mut merged = SweepReport::default();
        for generator in self.generators() {
            let report = generator.generate_all(cancellation)?;
            merged.generated += report.generated;
            merged.skipped.extend(report.skipped);
            merged.failed.extend(report.failed);
        }
        Ok(merged)
    }

    /// Near misses for `name` across all members, without duplicates.
    #[must_use]
    pub fn suggestions(&self, name: &str) -> Vec<String> {
        let mut suggestions: Vec<String> = Vec::new();
        for generator in self.generators() {
            for suggestion in generator.suggestions(name) {
                if !suggestions.contains(&suggestion) {
                    suggestions.push(suggestion);
                }
            }
        }
        suggestions
    }

    /// Output units of every member. A unit whose name was already taken by an earlier
    /// member is prefixed with its member's assembly name.
    #[must_use]
    pub fn output_units(&self) -> Vec<OutputUnit> {
        let mut seen = HashSet::new();
        let mut units = Vec::new();
        for generator in self.generators() {
            for unit in generator.output_units() {
                units.push(render::disambiguate(
                    &mut seen,
                    generator.assembly_name(),
                    unit,
                ));
            }
        }
        units
    }

    /// Renders the output units of every member, keyed by unit name.
    #[must_use]
    pub fn render(&self) -> BTreeMap<String, String> {
        render::render_units(&self.output_units())
    }
}

impl ExternalTypeResolver for GeneratorSet {
    fn try_request(
        &self,
        assembly: &str,
        namespace: &str,
        name: &str,
        context: Context,
    ) -> Result<Option<TypeExpr>> {
        match self.get(assembly) {
            Some(generator) => generator.try_request_type(namespace, name, context),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::GeneratorOptions,
        index::Platform,
        metadata::{memory::MetadataBuilder, signatures::TypeSignature, tables::ResolutionScope},
        synth::declarations::StructMember,
        test::fixtures,
    };
    use std::{sync::mpsc, thread, time::Duration};

    fn options() -> GeneratorOptions {
        GeneratorOptions::default().with_platform(Platform::X64)
    }

    fn federation() -> (Arc<GeneratorSet>, Arc<Generator>, Arc<Generator>) {
        let set = GeneratorSet::new();
        let win32 = set
            .add(Generator::in_memory(fixtures::win32(), options()).unwrap())
            .unwrap();
        let contoso = set
            .add(Generator::in_memory(fixtures::contoso(), options()).unwrap())
            .unwrap();
        (set, win32, contoso)
    }

    #[test]
    fn duplicate_assemblies_are_rejected() {
        let set = GeneratorSet::new();
        set.add(Generator::in_memory(fixtures::win32(), options()).unwrap())
            .unwrap();
        let error = set
            .add(Generator::in_memory(fixtures::win32(), options()).unwrap())
            .unwrap_err();
        assert!(matches!(error, Error::Usage(_)));
        assert_eq!(set.len(), 1);
        assert!(set.get("windows.win32").is_some());
    }

    #[test]
    fn references_are_generated_by_their_owning_store() {
        let (_set, win32, contoso) = federation();
        contoso
            .request_type_by_name("Contoso.Interop.Widgets", "WIDGET", Context::new(true))
            .unwrap();

        let widget = contoso
            .declaration("Contoso.Interop.Widgets", "WIDGET")
            .unwrap();
        let StructMember::Field(bounds) = &widget.as_struct().unwrap().members[0] else {
            panic!("Expected a field");
        };
        assert_eq!(bounds.ty, TypeExpr::named(fixtures::FOUNDATION, "RECT"));

        assert!(win32.declaration(fixtures::FOUNDATION, "RECT").is_some());
        assert!(win32.declaration(fixtures::FOUNDATION, "HANDLE").is_some());
        assert!(contoso.declaration(fixtures::FOUNDATION, "RECT").is_none());
    }

    #[test]
    fn missing_types_of_known_stores_are_not_found() {
        let (_set, _win32, contoso) = federation();
        let error = contoso
            .request_type_by_name(
                "Contoso.Interop.Widgets",
                "BROKEN_WIDGET",
                Context::new(true),
            )
            .unwrap_err();
        assert!(error
            .full_message()
            .ends_with("lacking the type \"Windows.Win32.Foundation.NOT_THERE\"."));
    }

    #[test]
    fn requests_reach_every_member() {
        let (set, win32, contoso) = federation();
        let none = CancellationToken::new();

        assert_eq!(
            set.try_generate("WidgetCreate", &none).unwrap(),
            RequestOutcome::Generated(vec![
                "Contoso.Interop.Widgets.WidgetCreate".to_string()
            ])
        );
        assert!(contoso
            .declaration("Contoso.Interop.Widgets", "WidgetCreate")
            .is_some());
        assert!(win32.declaration(fixtures::FOUNDATION, "HANDLE").is_some());

        assert!(set.try_generate("POINT", &none).unwrap().is_generated());
        assert_eq!(set.generate_module("Contoso", &none).unwrap(), 1);

        let RequestOutcome::NotFound { suggestions, .. } =
            set.try_generate("WidgetCreateEx", &none).unwrap()
        else {
            panic!("WidgetCreateEx is not defined");
        };
        assert_eq!(suggestions, ["WidgetCreate"]);
    }

    #[test]
    fn sweeps_cover_every_member() {
        let (set, win32, contoso) = federation();
        let report = set.generate_all(&CancellationToken::new()).unwrap();
        assert!(report.generated > 0);

        let failed: Vec<_> = report.failed.iter().map(|(api, _)| api.as_str()).collect();
        assert_eq!(failed, ["Contoso.Interop.Widgets.BROKEN_WIDGET"]);
        assert!(contoso
            .declaration("Contoso.Interop.Widgets", "WIDGET")
            .is_some());
        assert!(win32.declaration(fixtures::FOUNDATION, "POINT").is_some());
    }

    #[test]
    fn output_units_of_all_members_are_merged() {
        let (set, _win32, _contoso) = federation();
        let none = CancellationToken::new();
        set.try_generate("WidgetCreate", &none).unwrap();
        set.try_generate("CloseHandle", &none).unwrap();

        let rendered = set.render();
        assert!(rendered.contains_key("HANDLE.g.cs"));
        assert!(rendered["PInvoke.Kernel32.g.cs"].contains(" CloseHandle("));
        assert!(rendered["PInvoke.Contoso.g.cs"]
            .contains("using winmdroot = global::Contoso.Interop.Widgets;"));
        assert!(rendered["PInvoke.Contoso.g.cs"]
            .contains("static extern unsafe global::Windows.Win32.Foundation.HANDLE WidgetCreate("));
    }

    fn cross_referencing(assembly: &str, other: &str) -> Generator {
        let namespace = format!("{assembly}.Types");
        let mut b = MetadataBuilder::new(assembly);
        let plain = b.struct_type(&namespace, "PLAIN");
        b.field(plain, "value", TypeSignature::I4);

        let other_assembly = b.assembly_ref(other);
        let other_plain = b.type_ref(
            &format!("{other}.Types"),
            "PLAIN",
            ResolutionScope::Assembly(other_assembly),
        );
        let user = b.struct_type(&namespace, "USER");
        b.field(user, "f", TypeSignature::ValueType(other_plain));
        Generator::in_memory(b.build(), options()).unwrap()
    }

    #[test]
    fn members_referencing_each_other_serve_threads_independently() {
        for _ in 0..16 {
            let set = GeneratorSet::new();
            let a = set.add(cross_referencing("Alpha", "Beta")).unwrap();
            let b = set.add(cross_referencing("Beta", "Alpha")).unwrap();
            assert!(Arc::ptr_eq(&a.ledger.gate(), &b.ledger.gate()));

            let (sender, receiver) = mpsc::channel();
            for (generator, namespace) in [(a, "Alpha.Types"), (b, "Beta.Types")] {
                let sender = sender.clone();
                thread::spawn(move || {
                    let result =
                        generator.request_type_by_name(namespace, "USER", Context::new(true));
                    sender.send(result.is_ok()).ok();
                });
            }

            for _ in 0..2 {
                let finished = receiver
                    .recv_timeout(Duration::from_secs(5))
                    .expect("request did not finish");
                assert!(finished);
            }
            let a = set.get("Alpha").unwrap();
            assert!(a.declaration("Alpha.Types", "USER").is_some());
            assert!(a.declaration("Alpha.Types", "PLAIN").is_some());
        }
    }

    #[test]
    fn dropped_sets_detach_their_members() {
        let (set, _win32, contoso) = federation();
        drop(set);
        assert!(contoso.federation().is_none());
        assert!(contoso
            .request_type_by_name("Contoso.Interop.Widgets", "WIDGET", Context::new(true))
            .is_err());
    }
}
