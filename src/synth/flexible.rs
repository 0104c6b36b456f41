//! Structs that end in a variable-length array.
//!
//! Such a struct is declared with a one-element array as its last field, and callers allocate
//! room for the real element count. The generated `SizeOf(count)` helper mirrors
//! [`size_of`].

use crate::{
    synth::declarations::{HelperKind, TypeExpr},
    Error, Result,
};

/// Bytes needed for a struct of `base` bytes whose trailing array holds `count` elements of
/// `element` bytes each. The one element already included in `base` is not counted twice.
///
/// # Errors
///
/// Returns [`Error::Usage`] for negative counts and [`Error::Error`] if the size overflows.
pub fn size_of(base: usize, element: usize, count: i64) -> Result<usize> {
    if count < 0 {
        return Err(Error::Usage(format!(
            "A variable-length array cannot hold {count} elements"
        )));
    }
    if count <= 1 {
        return Ok(base);
    }

    usize::try_from(count - 1)
        .ok()
        .and_then(|extra| extra.checked_mul(element))
        .and_then(|extra| extra.checked_add(base))
        .ok_or_else(|| Error::Error(format!("{count} elements of {element} bytes overflow")))
}

/// The support struct a trailing array of `element` is declared with, and the indexer type
/// if it differs from the element.
///
/// `char` is not blittable on its own, so its array indexes through `ushort` storage.
#[must_use]
pub fn helper_for(element: &TypeExpr) -> (HelperKind, Option<&'static str>) {
    if *element == TypeExpr::Primitive("char") {
        (HelperKind::VariableLengthInlineArrayIndexed, Some("ushort"))
    } else {
        (HelperKind::VariableLengthInlineArray, None)
    }
}
