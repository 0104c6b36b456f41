/// The circumstances a declaration is generated under.
///
/// Two requests for the same type in different contexts produce two independent declarations.
/// Contexts are small values; deriving one never mutates the original.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Context {
    /// Declarations may depend on runtime marshaling.
    pub allow_marshaling: bool,
    /// The declaration is nested in a struct with explicit field offsets.
    pub nested_in_explicit_layout: bool,
}

impl Context {
    /// A top-level context.
    #[must_use]
    pub fn new(allow_marshaling: bool) -> Self {
        Context {
            allow_marshaling,
            nested_in_explicit_layout: false,
        }
    }

    /// A copy with marshaling permitted or forbidden.
    #[must_use]
    pub fn with_marshaling(self, allow_marshaling: bool) -> Self {
        Context {
            allow_marshaling,
            ..self
        }
    }

    /// The context for types nested in an explicit-layout struct.
    ///
    /// Overlapping fields cannot hold references, so marshaling is switched off.
    #[must_use]
    pub fn nested_in_explicit(self) -> Self {
        Context {
            allow_marshaling: false,
            nested_in_explicit_layout: true,
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::new(true)
    }
}

impl std::fmt::Display for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.allow_marshaling {
            write!(f, "marshaling")
        } else if self.nested_in_explicit_layout {
            write!(f, "blittable, explicit layout")
        } else {
            write!(f, "blittable")
        }
    }
}
