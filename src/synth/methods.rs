//! Extern methods imported from native modules.

use crate::{
    ledger::{Context, LedgerKey},
    metadata::{
        customattributes::{find_attribute, OBSOLETE, SYSTEM_NAMESPACE},
        tables::MethodDefinition,
        token::Token,
    },
    synth::{
        declarations::{Declaration, DeclarationKind, ExternMethod, MethodSig},
        Element, Synthesizer,
    },
    Result,
};

/// The name a native module is grouped under: `KERNEL32.dll` becomes `Kernel32`.
#[must_use]
pub fn module_name(library: &str) -> String {
    let stem = match library.len().checked_sub(4) {
        Some(split)
            if library.is_char_boundary(split)
                && library[split..].eq_ignore_ascii_case(".dll") =>
        {
            &library[..split]
        }
        _ => library,
    };

    let mut chars = stem.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// The name of a wide-character function without its `W` suffix, as in `CreateFileW`.
///
/// Only a `W` following a lowercase letter or digit counts, so names such as `MAKEWORD` or
/// `ShowW` keep theirs when the result would not look like a function name.
#[must_use]
pub fn strip_wide_suffix(name: &str) -> Option<&str> {
    let stem = name.strip_suffix('W')?;
    let last = stem.chars().last()?;
    (last.is_ascii_lowercase() || last.is_ascii_digit()).then_some(stem)
}

impl Synthesizer<'_> {
    /// The name a method is emitted under.
    ///
    /// With wide-only generation, `FooW` is exposed as `Foo` unless a method of that name
    /// already exists.
    pub(crate) fn emitted_method_name<'n>(&self, name: &'n str) -> &'n str {
        if !self.generator.options.wide_char_only {
            return name;
        }
        match strip_wide_suffix(name) {
            Some(stem) if self.index().find_methods(stem).is_empty() => stem,
            _ => name,
        }
    }

    /// Generates the extern method behind `token`, declared in `namespace`.
    pub(crate) fn request_method(&self, namespace: &str, token: Token) -> Result<String> {
        let method = self.reader.method(token)?;
        let emitted = self.emitted_method_name(&method.name).to_string();

        let key = LedgerKey::Method(namespace.to_string(), method.name.clone());
        self.generator.ledger.generate(key, || {
            let import = self
                .extern_method(method, &emitted)
                .map_err(|error| error.wrap_generation(&emitted))?;
            let mut declaration =
                Declaration::new(namespace, &emitted, DeclarationKind::Method(import));
            declaration.docs = self.docs(&method.name);
            Ok(Some(declaration))
        })?;
        Ok(emitted)
    }

    fn extern_method(&self, method: &MethodDefinition, emitted: &str) -> Result<ExternMethod> {
        let Some(import) = &method.import else {
            return Err(not_supported!(
                "{} is not imported from a native module",
                method.name
            ));
        };
        let context = Context::new(self.allows_marshaling());

        let ret = self.type_expr(&method.signature.return_type.base, context, Element::Return)?;
        let params = self.param_decls(method, context)?;
        let entry_point = if import.entry_point.is_empty() {
            method.name.clone()
        } else {
            import.entry_point.clone()
        };

        Ok(ExternMethod {
            module: module_name(&import.module),
            library: import.module.clone(),
            entry_point,
            sets_last_error: import.sets_last_error(),
            signature: MethodSig {
                name: emitted.to_string(),
                ret,
                ret_marshal_as: method.param(0).and_then(|ret| self.marshal_as(ret.token)),
                params,
            },
            obsolete: find_attribute(
                self.reader.custom_attributes(method.token),
                SYSTEM_NAMESPACE,
                OBSOLETE,
            )
            .map(|attribute| {
                attribute
                    .arg(0)
                    .and_then(|arg| arg.as_str())
                    .unwrap_or_default()
                    .to_string()
            }),
        })
    }
}
