//! Request operations driven by API names.

use tracing::{debug, warn};

use crate::{
    error::Outcome,
    generator::Generator,
    index::TypeKind,
    metadata::customattributes::INTEROP_DECORATION_NAMESPACE,
    synth::module_name,
    utils::cancellation::CancellationToken,
    Error, Result,
};

/// Suffixes trimmed from a name before looking for near misses, in this order.
const SUGGESTION_SUFFIXES: [&str; 5] = ["A", "W", "32", "64", "Ex"];

/// What a by-name request matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    /// The request matched and everything it needs was generated. Holds the precise API
    /// names, qualified by namespace, or the wildcard as given.
    Generated(Vec<String>),
    /// More than one API matched an unqualified name. Nothing was generated.
    Ambiguous(Vec<String>),
    /// The name is a member of an enum; the declaring enum was generated instead.
    RedirectedToEnum {
        /// The requested member
        member: String,
        /// Qualified name of the declaring enum
        declaring_enum: String,
    },
    /// The API must not be generated, for the given reason.
    Banned(String),
    /// Nothing matched.
    NotFound {
        /// Near misses, possibly empty
        suggestions: Vec<String>,
        /// The name contains characters no API name has
        illegal_characters: bool,
    },
}

impl RequestOutcome {
    /// Returns `true` if anything was generated.
    #[must_use]
    pub fn is_generated(&self) -> bool {
        matches!(
            self,
            RequestOutcome::Generated(_) | RequestOutcome::RedirectedToEnum { .. }
        )
    }
}

/// Results of a sweep over every compatible API of a store.
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Number of APIs generated
    pub generated: usize,
    /// APIs skipped because something they need is not available on the target platform
    pub skipped: Vec<String>,
    /// APIs whose generation failed, with the cause
    pub failed: Vec<(String, Error)>,
}

impl SweepReport {
    fn record(&mut self, api: String, outcome: Outcome) {
        match outcome {
            Outcome::Generated => self.generated += 1,
            Outcome::Skipped(reason) => {
                debug!(%api, %reason, "Skipped API unavailable on the target platform");
                self.skipped.push(api);
            }
            Outcome::Failed(error) => {
                warn!(%api, error = %error.full_message(), "Failed to generate API");
                self.failed.push((api, error));
            }
        }
    }
}

/// Returns `true` if `name` contains a character that no API name contains: anything but
/// letters, digits, `_` and the `.` of qualified names.
#[must_use]
pub fn contains_illegal_characters(name: &str) -> bool {
    !name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '.')
}

/// Splits `Namespace.Name` at its last separator.
fn split_qualified(name: &str) -> (Option<&str>, &str) {
    match name.rsplit_once('.') {
        Some((namespace, simple)) if !namespace.is_empty() => (Some(namespace), simple),
        _ => (None, name),
    }
}

fn qualified(namespace: &str, name: &str) -> String {
    format!("{namespace}.{name}")
}

impl Generator {
    /// Generates whatever `name` denotes.
    ///
    /// `Module.*` generates every extern method of a native module and `PREFIX*` every
    /// constant starting with `PREFIX`. Any other name is tried as a namespace, an extern
    /// method, a type and a constant, in that order; names may be qualified with their
    /// namespace. A name matching none of them but naming an enum member generates the
    /// declaring enum.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Usage`] for blank names, [`Error::PlatformIncompatible`] if the API
    /// exists for other platforms only, [`Error::Cancelled`] if a module sweep was cancelled
    /// and the generation error otherwise.
    pub fn try_generate(
        &self,
        name: &str,
        cancellation: &CancellationToken,
    ) -> Result<RequestOutcome> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Usage("API cannot be null or empty.".to_string()));
        }

        if let Some(reason) = self.options.banned_reason(name) {
            return Ok(RequestOutcome::Banned(reason.to_string()));
        }

        if let Some(module) = name.strip_suffix(".*") {
            return Ok(match self.generate_module(module, cancellation)? {
                0 => self.not_found(name),
                _ => RequestOutcome::Generated(vec![name.to_string()]),
            });
        }

        if name.ends_with('*') {
            return Ok(match self.generate_constants(name)? {
                0 => self.not_found(name),
                _ => RequestOutcome::Generated(vec![name.to_string()]),
            });
        }

        if let Some(namespace) = self.generate_namespace(name)? {
            return Ok(RequestOutcome::Generated(vec![namespace]));
        }

        let (namespace, simple) = split_qualified(name);

        let methods = self.method_matches(namespace, simple);
        match methods.as_slice() {
            [(namespace, token)] => {
                let emitted =
                    self.with_synthesizer(|synth| synth.request_method(namespace, *token))?;
                return Ok(RequestOutcome::Generated(vec![qualified(namespace, &emitted)]));
            }
            [] => {}
            many => return Ok(ambiguous(many, simple)),
        }

        let types = self.type_matches(namespace, simple);
        match types.as_slice() {
            [(namespace, token)] => {
                let context = self.default_context();
                self.with_synthesizer(|synth| synth.request_definition(*token, context))?;
                return Ok(RequestOutcome::Generated(vec![qualified(namespace, simple)]));
            }
            [] => {}
            many => return Ok(ambiguous(many, simple)),
        }

        let constants = self.constant_matches(namespace, simple);
        match constants.as_slice() {
            [(namespace, token)] => {
                self.with_synthesizer(|synth| synth.request_constant(namespace, *token))?;
                return Ok(RequestOutcome::Generated(vec![qualified(namespace, simple)]));
            }
            [] => {}
            many => return Ok(ambiguous(many, simple)),
        }

        if self.index.exists_for_other_platform(simple) {
            return Err(self.platform_incompatible(name));
        }

        let reader = self.store().rent()?;
        if let Some(declaring) = self.index.enum_name(&*reader, simple) {
            drop(reader);
            if let [(namespace, token)] = self.type_matches(None, &declaring).as_slice() {
                let context = self.default_context();
                self.with_synthesizer(|synth| synth.request_definition(*token, context))?;
                debug!(member = simple, declaring = %declaring, "Redirected enum member to its enum");
                return Ok(RequestOutcome::RedirectedToEnum {
                    member: simple.to_string(),
                    declaring_enum: qualified(namespace, &declaring),
                });
            }
        }

        Ok(self.not_found(name))
    }

    fn not_found(&self, name: &str) -> RequestOutcome {
        RequestOutcome::NotFound {
            suggestions: self.suggestions(name),
            illegal_characters: contains_illegal_characters(name),
        }
    }

    /// Generates every extern method, type and constant of `namespace`, in one transaction.
    ///
    /// The namespace is matched exactly, or ignoring case when it starts with the store's
    /// common namespace. Banned methods are left out. Returns the matched namespace, or
    /// `None` if there is none.
    ///
    /// # Errors
    ///
    /// Returns the error of the first item that fails; nothing of the namespace is
    /// committed then.
    pub fn generate_namespace(&self, namespace: &str) -> Result<Option<String>> {
        let found = match self.index.namespace(namespace) {
            Some(found) => found,
            None => {
                let common = self.index.common_namespace();
                let prefixed = namespace
                    .get(..common.len())
                    .is_some_and(|prefix| prefix.eq_ignore_ascii_case(common));
                match self.index.namespace_ignore_case(namespace) {
                    Some(found) if prefixed => found,
                    _ => return Ok(None),
                }
            }
        };

        let context = self.default_context();
        self.with_synthesizer(|synth| {
            for (name, &token) in &found.methods {
                if self.options.banned_reason(name).is_none() {
                    synth.request_method(&found.name, token)?;
                }
            }
            for &token in found.types.values() {
                synth.request_definition(token, context)?;
            }
            for &token in found.fields.values() {
                synth.request_constant(&found.name, token)?;
            }
            Ok(())
        })?;

        debug!(namespace = %found.name, "Generated namespace");
        Ok(Some(found.name.clone()))
    }

    /// Generates every extern method imported from `module`, such as `Kernel32`, and returns
    /// how many were generated.
    ///
    /// The module name is compared ignoring case and a `.dll` extension. Each method is a
    /// transaction of its own; methods that need something unavailable on the target
    /// platform are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] when `cancellation` fires between two methods, and the
    /// first generation error otherwise.
    pub fn generate_module(&self, module: &str, cancellation: &CancellationToken) -> Result<usize> {
        let wanted = module_name(module);
        let reader = self.store().rent()?;

        let mut candidates = Vec::new();
        for ns in self.index.namespaces() {
            for (name, &token) in &ns.methods {
                let Some(import) = &reader.method(token)?.import else {
                    continue;
                };
                if module_name(&import.module).eq_ignore_ascii_case(&wanted)
                    && self.options.banned_reason(name).is_none()
                {
                    candidates.push((ns.name.clone(), token));
                }
            }
        }
        drop(reader);

        let mut generated = 0usize;
        for (namespace, token) in candidates {
            cancellation.check()?;
            match self.with_synthesizer(|synth| synth.request_method(&namespace, token)) {
                Ok(_) => generated += 1,
                Err(error) if error.is_platform_incompatible() => {
                    debug!(module, %error, "Skipped extern method");
                }
                Err(error) => return Err(error),
            }
        }
        Ok(generated)
    }

    /// Generates every constant whose name starts with `pattern` minus its trailing `*`, in
    /// one transaction, and returns how many matched.
    ///
    /// # Errors
    ///
    /// Returns the error of the first constant that fails.
    pub fn generate_constants(&self, pattern: &str) -> Result<usize> {
        let prefix = pattern.strip_suffix('*').unwrap_or(pattern);
        let matches: Vec<_> = self
            .index
            .namespaces()
            .iter()
            .flat_map(|ns| {
                ns.fields
                    .iter()
                    .filter(|(name, _)| name.starts_with(prefix))
                    .map(|(_, &token)| (ns.name.as_str(), token))
            })
            .collect();

        if matches.is_empty() {
            return Ok(0);
        }

        self.with_synthesizer(|synth| {
            for &(namespace, token) in &matches {
                synth.request_constant(namespace, token)?;
            }
            Ok(())
        })?;
        Ok(matches.len())
    }

    /// Generates every API of the store that is compatible with the target platform.
    ///
    /// Extern methods come first, then types, then constants. Every API is a transaction of
    /// its own: APIs that need something unavailable on the target platform are skipped and
    /// failures are recorded, and neither stops the sweep.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] when `cancellation` fires between two APIs. Everything
    /// generated before stays committed.
    pub fn generate_all(&self, cancellation: &CancellationToken) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        let context = self.default_context();

        for ns in self.index.namespaces() {
            for (name, &token) in &ns.methods {
                cancellation.check()?;
                if self.options.banned_reason(name).is_some() {
                    continue;
                }
                let outcome = Outcome::from_result(
                    self.with_synthesizer(|synth| synth.request_method(&ns.name, token)),
                );
                report.record(qualified(&ns.name, name), outcome);
            }
        }

        for ns in self.index.namespaces() {
            if ns.name == INTEROP_DECORATION_NAMESPACE {
                continue;
            }
            for (name, &token) in &ns.types {
                cancellation.check()?;
                if self.index.kind(token) == TypeKind::Other {
                    continue;
                }
                let outcome = Outcome::from_result(
                    self.with_synthesizer(|synth| synth.request_definition(token, context)),
                );
                report.record(qualified(&ns.name, name), outcome);
            }
        }

        for ns in self.index.namespaces() {
            for (name, &token) in &ns.fields {
                cancellation.check()?;
                let outcome = Outcome::from_result(
                    self.with_synthesizer(|synth| synth.request_constant(&ns.name, token)),
                );
                report.record(qualified(&ns.name, name), outcome);
            }
        }

        debug!(
            assembly = %self.assembly_name(),
            generated = report.generated,
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Generated all APIs"
        );
        Ok(report)
    }

    /// Names of APIs that `name` may have been meant as.
    ///
    /// The suffixes `A`, `W`, `32`, `64` and `Ex` are trimmed, in that order, and every
    /// constant, type and extern method whose name contains the rest is suggested.
    #[must_use]
    pub fn suggestions(&self, name: &str) -> Vec<String> {
        let mut stem = name;
        for suffix in SUGGESTION_SUFFIXES {
            stem = stem.strip_suffix(suffix).unwrap_or(stem);
        }
        if stem.is_empty() {
            return Vec::new();
        }

        let mut suggestions: Vec<String> = Vec::new();
        for ns in self.index.namespaces() {
            let candidates = ns.fields.keys().chain(ns.types.keys()).chain(ns.methods.keys());
            for candidate in candidates {
                if candidate.contains(stem) && !suggestions.contains(candidate) {
                    suggestions.push(candidate.clone());
                }
            }
        }
        suggestions
    }
}

fn ambiguous(matches: &[(String, crate::metadata::token::Token)], name: &str) -> RequestOutcome {
    RequestOutcome::Ambiguous(
        matches
            .iter()
            .map(|(namespace, _)| qualified(namespace, name))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::GeneratorOptions,
        index::Platform,
        metadata::{memory::MetadataBuilder, tables::ConstantValue},
        synth::declarations::DeclarationKind,
        test::fixtures,
    };
    use std::sync::Arc;

    fn win32(platform: Platform) -> Arc<Generator> {
        Generator::from_metadata(
            fixtures::win32(),
            GeneratorOptions::default().with_platform(platform),
        )
        .unwrap()
    }

    fn none() -> CancellationToken {
        CancellationToken::new()
    }

    #[test]
    fn blank_names_are_usage_errors() {
        let generator = win32(Platform::X64);
        assert!(matches!(
            generator.try_generate("  ", &none()),
            Err(Error::Usage(_))
        ));
    }

    #[test]
    fn exact_names_resolve_in_order() {
        let generator = win32(Platform::X64);
        assert_eq!(
            generator.try_generate("CloseHandle", &none()).unwrap(),
            RequestOutcome::Generated(vec![format!("{}.CloseHandle", fixtures::FOUNDATION)])
        );
        assert_eq!(
            generator.try_generate("POINT", &none()).unwrap(),
            RequestOutcome::Generated(vec![format!("{}.POINT", fixtures::FOUNDATION)])
        );
        assert_eq!(
            generator.try_generate("MAX_PATH", &none()).unwrap(),
            RequestOutcome::Generated(vec![format!("{}.MAX_PATH", fixtures::FOUNDATION)])
        );
        assert_eq!(
            generator
                .try_generate("Windows.Win32.Foundation.RECT", &none())
                .unwrap(),
            RequestOutcome::Generated(vec![format!("{}.RECT", fixtures::FOUNDATION)])
        );
        assert!(generator.declaration(fixtures::FOUNDATION, "RECT").is_some());
    }

    #[test]
    fn wide_methods_are_reported_under_their_emitted_name() {
        let generator = win32(Platform::X64);
        assert_eq!(
            generator.try_generate("CreateFileW", &none()).unwrap(),
            RequestOutcome::Generated(vec![format!("{}.CreateFile", fixtures::FILE_SYSTEM)])
        );
    }

    #[test]
    fn namespaces_generate_everything_they_hold() {
        let generator = win32(Platform::X64);
        let outcome = generator
            .try_generate("windows.win32.storage.filesystem", &none())
            .unwrap();
        assert_eq!(
            outcome,
            RequestOutcome::Generated(vec![fixtures::FILE_SYSTEM.to_string()])
        );
        assert!(generator.declaration(fixtures::FILE_SYSTEM, "FILE_SHARE_MODE").is_some());
        assert!(generator.declaration(fixtures::FILE_SYSTEM, "DeleteFile").is_some());
        assert!(generator
            .declaration(fixtures::FILE_SYSTEM, "INVALID_FILE_SIZE")
            .is_some());
        assert_eq!(generator.generate_namespace("Contoso").unwrap(), None);
    }

    #[test]
    fn banned_apis_are_reported() {
        let generator = win32(Platform::X64);
        let RequestOutcome::Banned(reason) = generator.try_generate("GetLastError", &none()).unwrap()
        else {
            panic!("GetLastError must be banned");
        };
        assert!(reason.contains("Marshal.GetLastWin32Error"));
        assert!(generator.committed().is_empty());
    }

    #[test]
    fn module_wildcards_count_their_methods() {
        let generator = win32(Platform::X64);
        assert_eq!(
            generator.try_generate("Kernel32.*", &none()).unwrap(),
            RequestOutcome::Generated(vec!["Kernel32.*".to_string()])
        );
        assert!(generator.declaration(fixtures::FOUNDATION, "CloseHandle").is_some());
        assert!(generator.declaration(fixtures::FOUNDATION, "GetLastError").is_none());

        assert!(generator.generate_module("kernel32.dll", &none()).unwrap() > 0);
        assert_eq!(generator.generate_module("Shell32", &none()).unwrap(), 0);
    }

    #[test]
    fn cancelled_module_sweeps_stop_between_methods() {
        let generator = win32(Platform::X64);
        let cancelled = CancellationToken::new();
        cancelled.cancel();
        assert!(matches!(
            generator.generate_module("Kernel32", &cancelled),
            Err(Error::Cancelled)
        ));
        assert!(generator.committed().is_empty());
    }

    #[test]
    fn constant_prefixes() {
        let generator = win32(Platform::X64);
        assert_eq!(generator.generate_constants("FILE_ATTRIBUTE_*").unwrap(), 1);
        assert!(generator
            .declaration(fixtures::FILE_SYSTEM, "FILE_ATTRIBUTE_READONLY")
            .is_some());
        assert_eq!(
            generator.try_generate("NO_SUCH_PREFIX_*", &none()).unwrap(),
            RequestOutcome::NotFound {
                suggestions: Vec::new(),
                illegal_characters: true,
            }
        );
    }

    #[test]
    fn enum_members_redirect_to_their_enum() {
        let generator = win32(Platform::X64);
        let outcome = generator.try_generate("FILE_SHARE_READ", &none()).unwrap();
        assert_eq!(
            outcome,
            RequestOutcome::RedirectedToEnum {
                member: "FILE_SHARE_READ".to_string(),
                declaring_enum: format!("{}.FILE_SHARE_MODE", fixtures::FILE_SYSTEM),
            }
        );
        assert!(outcome.is_generated());
        assert!(generator.declaration(fixtures::FILE_SYSTEM, "FILE_SHARE_MODE").is_some());
    }

    #[test]
    fn other_platforms_are_incompatible() {
        let generator = win32(Platform::Arm64);
        let error = generator.try_generate("CONTEXT", &none()).unwrap_err();
        assert!(error.is_platform_incompatible());
    }

    #[test]
    fn misses_come_with_suggestions() {
        let generator = win32(Platform::X64);
        let RequestOutcome::NotFound { suggestions, .. } =
            generator.try_generate("CreateFileA", &none()).unwrap()
        else {
            panic!("CreateFileA is not in the fixture");
        };
        assert_eq!(suggestions, ["CreateFileW"]);

        assert_eq!(
            generator.try_generate("Nothing_Like_It", &none()).unwrap(),
            RequestOutcome::NotFound {
                suggestions: Vec::new(),
                illegal_characters: false,
            }
        );
        assert_eq!(
            generator.try_generate("Create File", &none()).unwrap(),
            RequestOutcome::NotFound {
                suggestions: Vec::new(),
                illegal_characters: true,
            }
        );
    }

    #[test]
    fn suggestion_suffixes_are_trimmed_in_order() {
        let generator = win32(Platform::X64);
        assert_eq!(generator.suggestions("FindFirstFileExW"), ["FindFirstFileW"]);
        assert_eq!(generator.suggestions("CreateFileWA"), ["CreateFileW"]);
        assert!(generator.suggestions("CreateFileAW").is_empty());
        assert!(generator.suggestions("").is_empty());
    }

    #[test]
    fn illegal_characters() {
        assert!(!contains_illegal_characters("Windows.Win32.Foundation.RECT"));
        assert!(!contains_illegal_characters("MAX_PATH"));
        assert!(contains_illegal_characters("CreateFile("));
        assert!(contains_illegal_characters("Kernel32.*"));
    }

    #[test]
    fn ambiguous_names_generate_nothing() {
        let mut builder = MetadataBuilder::new("Test");
        let first = builder.class_type("Test.First", "Apis");
        builder.constant(first, "LIMIT", ConstantValue::U4(1));
        let second = builder.class_type("Test.Second", "Apis");
        builder.constant(second, "LIMIT", ConstantValue::U4(2));

        let generator =
            Generator::from_metadata(builder.build(), GeneratorOptions::default()).unwrap();
        assert_eq!(
            generator.try_generate("LIMIT", &none()).unwrap(),
            RequestOutcome::Ambiguous(vec![
                "Test.First.LIMIT".to_string(),
                "Test.Second.LIMIT".to_string()
            ])
        );
        assert!(generator.committed().is_empty());
        assert_eq!(
            generator.try_generate("Test.Second.LIMIT", &none()).unwrap(),
            RequestOutcome::Generated(vec!["Test.Second.LIMIT".to_string()])
        );
    }

    #[test]
    fn same_names_in_other_namespaces_are_generated_separately() {
        let mut builder = MetadataBuilder::new("Test");
        let first = builder.class_type("Test.First", "Apis");
        builder.constant(first, "LIMIT", ConstantValue::U4(1));
        let second = builder.class_type("Test.Second", "Apis");
        builder.constant(second, "LIMIT", ConstantValue::U4(2));

        let generator =
            Generator::from_metadata(builder.build(), GeneratorOptions::default()).unwrap();
        generator.try_generate("Test.First.LIMIT", &none()).unwrap();
        assert_eq!(
            generator.try_generate("Test.Second.LIMIT", &none()).unwrap(),
            RequestOutcome::Generated(vec!["Test.Second.LIMIT".to_string()])
        );
        assert!(generator.declaration("Test.First", "LIMIT").is_some());
        assert!(generator.declaration("Test.Second", "LIMIT").is_some());

        let report = generator.generate_all(&none()).unwrap();
        assert_eq!(report.generated, 2);
        assert_eq!(generator.committed().len(), 2);
    }

    #[test]
    fn sweeps_skip_other_platforms_and_record_failures() {
        let generator = win32(Platform::Arm64);
        let report = generator.generate_all(&none()).unwrap();
        assert!(report.generated > 0);
        assert!(report.failed.is_empty(), "{:?}", report.failed);
        assert!(generator.declaration(fixtures::DIAGNOSTICS, "CONTEXT").is_none());
        assert!(generator.declaration(fixtures::FOUNDATION, "GetLastError").is_none());
        assert!(generator
            .committed()
            .iter()
            .any(|declaration| matches!(declaration.kind, DeclarationKind::Interface(_))));

        let cancelled = CancellationToken::new();
        cancelled.cancel();
        assert!(matches!(
            generator.generate_all(&cancelled),
            Err(Error::Cancelled)
        ));
    }
}
