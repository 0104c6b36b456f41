use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! not_supported {
    ($msg:expr) => {
        crate::Error::NotSupported($msg.to_string())
    };

    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::NotSupported(format!($fmt, $($arg)*))
    };
}

macro_rules! generation_failed {
    ($name:expr, $source:expr) => {
        crate::Error::GenerationFailed {
            name: $name.to_string(),
            source: Box::new($source),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Errors fall into three groups that callers are expected to treat differently:
///
/// ## Fatal to a single request
/// - [`Error::GenerationFailed`] - A synthesis-time fault, wrapped with the owning type, field or
///   method name. The ledger discards the failing transaction; earlier work is unaffected.
/// - [`Error::NotSupported`] - The metadata uses a shape that cannot be represented.
/// - [`Error::NotFound`] - A referenced definition is not present in any provided store.
/// - [`Error::Malformed`] - The metadata violates one of its own structural rules.
///
/// ## Expected and recoverable
/// - [`Error::PlatformIncompatible`] - The requested API exists, but not for the target platform.
///   Bulk sweeps skip it, single requests surface it as an actionable message.
/// - [`Error::Cancelled`] - A bulk sweep observed its cancellation token.
///
/// ## Usage and environment
/// - [`Error::Usage`] - Empty names, renting from a disposed store and similar caller mistakes.
/// - [`Error::FileError`] - Filesystem I/O errors while opening a store.
///
/// # Examples
///
/// ```rust,no_run
/// use dotbind::Error;
///
/// fn report(error: &Error) {
///     if error.is_platform_incompatible() {
///         println!("skipped: {error}");
///     } else {
///         println!("failed: {error}");
///     }
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// Synthesis of a named item failed.
    ///
    /// The `name` identifies the type, field, member or method whose generation was in progress
    /// when the cause was raised. Nested failures produce a chain of these, innermost last.
    #[error("Failed to generate {name}: {source}")]
    GenerationFailed {
        /// The name of the item being generated
        name: String,
        /// The underlying cause
        source: Box<Error>,
    },

    /// The requested item exists, but none of its variants apply to the target platform.
    #[error("{0}")]
    PlatformIncompatible(String),

    /// The caller violated an API contract.
    ///
    /// These errors are never retried. Typical causes are empty API names or renting a reader
    /// from a store that has already been disposed.
    #[error("Invalid usage - {0}")]
    Usage(String),

    /// A referenced definition could not be located.
    ///
    /// Raised only after the owning store, the federation of sibling stores and the target
    /// environment have all been consulted.
    #[error("{0}")]
    NotFound(String),

    /// The metadata describes a construct that has no supported representation.
    #[error("Not supported - {0}")]
    NotSupported(String),

    /// The metadata is damaged or violates a structural rule.
    ///
    /// The error carries the source location where it was detected to ease debugging.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// A bulk operation was cancelled between two independent requests.
    #[error("The operation was cancelled")]
    Cancelled,

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}

impl Error {
    /// Returns `true` if this error, or any error it wraps, is a platform mismatch.
    ///
    /// Platform mismatches raised while generating a dependency travel up through
    /// [`Error::GenerationFailed`] wrappers of the dependents, so the whole chain is inspected.
    #[must_use]
    pub fn is_platform_incompatible(&self) -> bool {
        match self {
            Error::PlatformIncompatible(_) => true,
            Error::GenerationFailed { source, .. } => source.is_platform_incompatible(),
            _ => false,
        }
    }

    /// Wraps this error with the name of the item whose generation failed.
    ///
    /// [`Error::PlatformIncompatible`] and [`Error::Cancelled`] pass through unchanged so that
    /// bulk callers can branch on them directly.
    #[must_use]
    pub fn wrap_generation(self, name: &str) -> Error {
        match self {
            Error::PlatformIncompatible(_) | Error::Cancelled => self,
            other => generation_failed!(name, other),
        }
    }

    /// Assembles a single message out of the whole wrapping chain, outermost first.
    #[must_use]
    pub fn full_message(&self) -> String {
        let mut message = String::new();
        let mut current = self;
        loop {
            match current {
                Error::GenerationFailed { name, source } => {
                    message.push_str("Failed to generate ");
                    message.push_str(name);
                    message.push_str(" -> ");
                    current = source;
                }
                other => {
                    message.push_str(&other.to_string());
                    return message;
                }
            }
        }
    }
}

/// The outcome of one independent item in a bulk sweep.
///
/// Bulk operations branch on this value instead of unwinding through errors, so a platform
/// mismatch or an individual failure never aborts the rest of the sweep.
#[derive(Debug)]
pub enum Outcome {
    /// The item and all of its dependencies were committed.
    Generated,
    /// The item does not apply to the target platform.
    Skipped(String),
    /// Generation of the item failed; nothing from its transaction was committed.
    Failed(Error),
}

impl Outcome {
    /// Classifies the result of generating one item.
    pub fn from_result<T>(result: crate::Result<T>) -> Outcome {
        match result {
            Ok(_) => Outcome::Generated,
            Err(error) if error.is_platform_incompatible() => Outcome::Skipped(error.to_string()),
            Err(error) => Outcome::Failed(error),
        }
    }

    /// Returns `true` for [`Outcome::Failed`].
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }
}
