use std::collections::{BTreeMap, BTreeSet};

use crate::metadata::token::Token;

/// The contents of one namespace, partitioned by platform compatibility.
#[derive(Debug, Clone, Default)]
pub struct NamespaceMetadata {
    /// Fully qualified namespace name
    pub name: String,
    /// Top-level types usable on the target platform
    pub types: BTreeMap<String, Token>,
    /// Names of types that exist only for other platforms
    pub types_for_other_platform: BTreeSet<String>,
    /// Extern methods of the namespace's `Apis` class usable on the target platform
    pub methods: BTreeMap<String, Token>,
    /// Names of extern methods that exist only for other platforms
    pub methods_for_other_platform: BTreeSet<String>,
    /// Public static fields (constants) of the namespace's `Apis` class
    pub fields: BTreeMap<String, Token>,
}

impl NamespaceMetadata {
    /// Creates an empty namespace entry.
    pub fn new(name: impl Into<String>) -> Self {
        NamespaceMetadata {
            name: name.into(),
            ..NamespaceMetadata::default()
        }
    }

    /// Returns `true` if nothing at all was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
            && self.types_for_other_platform.is_empty()
            && self.methods.is_empty()
            && self.methods_for_other_platform.is_empty()
            && self.fields.is_empty()
    }
}
