//! Configuration for declaration generation.
//!
//! [`GeneratorOptions`] controls the shape of the emitted declarations: whether marshaling is
//! permitted, which visibility is used, how methods and constants are grouped and which target
//! platform drives the architecture filtering done by the index.

use std::collections::HashMap;

use crate::index::Platform;

/// Options shared by every generator in a session.
#[derive(Debug, Clone)]
pub struct GeneratorOptions {
    /// Permit declarations that depend on runtime marshaling (default: true).
    ///
    /// When disabled, delegates become function pointers, interfaces become vtable structs and
    /// every struct is emitted in its blittable form.
    pub allow_marshaling: bool,

    /// Emit declarations with public visibility instead of internal (default: false).
    pub public: bool,

    /// Name of the container type that holds extern methods and constants (default: `PInvoke`).
    pub class_name: String,

    /// Materialize all output into a single unit (default: false).
    pub emit_single_file: bool,

    /// Target platform used to filter architecture-specific definitions.
    ///
    /// `None` behaves like [`Platform::AnyCpu`].
    pub platform: Option<Platform>,

    /// Expose `FooW` extern methods under the name `Foo` when no `Foo` exists (default: true).
    pub wide_char_only: bool,

    /// Additional APIs that must never be generated, with the reason reported to the caller.
    pub banned_apis: HashMap<String, String>,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            allow_marshaling: true,
            public: false,
            class_name: "PInvoke".to_string(),
            emit_single_file: false,
            platform: None,
            wide_char_only: true,
            banned_apis: HashMap::new(),
        }
    }
}

impl GeneratorOptions {
    /// Creates options with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates options for blittable-only output.
    ///
    /// Marshaling is disabled and the generated surface is public, which is the common shape for
    /// libraries that hand raw pointers across an FFI boundary.
    #[must_use]
    pub fn blittable() -> Self {
        Self {
            allow_marshaling: false,
            public: true,
            ..Self::default()
        }
    }

    /// Sets whether marshaling is permitted.
    #[must_use]
    pub fn with_marshaling(mut self, allow: bool) -> Self {
        self.allow_marshaling = allow;
        self
    }

    /// Sets the target platform.
    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Sets the container name for extern methods and constants.
    #[must_use]
    pub fn with_class_name(mut self, name: impl Into<String>) -> Self {
        self.class_name = name.into();
        self
    }

    /// Sets whether all output goes into one unit.
    #[must_use]
    pub fn with_single_file(mut self, single: bool) -> Self {
        self.emit_single_file = single;
        self
    }

    /// Sets public visibility.
    #[must_use]
    pub fn with_public(mut self, public: bool) -> Self {
        self.public = public;
        self
    }

    /// Bans an API in addition to the built-in list.
    #[must_use]
    pub fn ban(mut self, api: impl Into<String>, reason: impl Into<String>) -> Self {
        self.banned_apis.insert(api.into(), reason.into());
        self
    }

    /// The effective target platform.
    #[must_use]
    pub fn target_platform(&self) -> Platform {
        self.platform.unwrap_or(Platform::AnyCpu)
    }

    /// Returns the reason an API must not be generated, if it is banned.
    ///
    /// The built-in list depends on whether marshaling is permitted.
    #[must_use]
    pub fn banned_reason(&self, api: &str) -> Option<&str> {
        if let Some(reason) = self.banned_apis.get(api) {
            return Some(reason.as_str());
        }

        let builtin: &[(&str, &str)] = if self.allow_marshaling {
            BANNED_WITH_MARSHALING
        } else {
            BANNED_WITHOUT_MARSHALING
        };
        builtin
            .iter()
            .find(|(name, _)| *name == api)
            .map(|(_, reason)| *reason)
    }

    /// The keyword used for declaration visibility.
    #[must_use]
    pub fn visibility(&self) -> &'static str {
        if self.public {
            "public"
        } else {
            "internal"
        }
    }
}

const GET_LAST_ERROR: &str =
    "Do not generate GetLastError. Call Marshal.GetLastWin32Error() instead. Learn more from https://docs.microsoft.com/dotnet/api/system.runtime.interopservices.marshal.getlastwin32error";
const OLE_AUT_FREE: &str =
    "This API is only available when marshaling is permitted, because it releases memory the runtime allocated";

const BANNED_WITH_MARSHALING: &[(&str, &str)] = &[("GetLastError", GET_LAST_ERROR)];

const BANNED_WITHOUT_MARSHALING: &[(&str, &str)] = &[
    ("GetLastError", GET_LAST_ERROR),
    ("OleFreeVariant", OLE_AUT_FREE),
];
