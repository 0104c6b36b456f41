//! Bit placement of native bitfields.
//!
//! Native API metadata describes C bitfields as a single integer storage field decorated with
//! one `NativeBitfield(name, offset, length)` per logical field. [`BitfieldLayout`] holds the
//! arithmetic behind the generated accessors, so the same rules drive both the emitted code
//! and the tests that pin down its behavior.

use crate::Result;

/// Placement of one bitfield within its storage integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitfieldLayout {
    /// Index of the lowest bit
    pub offset: u8,
    /// Number of bits
    pub length: u8,
    /// Width of the storage integer in bits
    pub storage_bits: u8,
    /// The storage integer is signed, so values sign-extend on read
    pub signed: bool,
}

impl BitfieldLayout {
    /// Validates and creates a layout.
    ///
    /// Returns `Ok(None)` for zero-length bitfields, which occur in real metadata and carry no
    /// storage.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the bits do not fit the storage.
    pub fn new(offset: i64, length: i64, storage_bits: u8, signed: bool) -> Result<Option<Self>> {
        if length == 0 {
            return Ok(None);
        }
        if offset < 0 || length < 0 || offset + length > i64::from(storage_bits) {
            return Err(malformed_error!(
                "Bitfield at offset {} with length {} does not fit {} bits of storage",
                offset,
                length,
                storage_bits
            ));
        }

        // Both fit into the storage width checked above.
        Ok(Some(BitfieldLayout {
            offset: offset as u8,
            length: length as u8,
            storage_bits,
            signed,
        }))
    }

    /// Mask of the bits in place, `((1 << length) - 1) << offset`.
    #[must_use]
    pub fn mask(&self) -> u64 {
        self.mask_no_offset() << self.offset
    }

    /// Mask of `length` low bits.
    #[must_use]
    pub fn mask_no_offset(&self) -> u64 {
        if self.length >= 64 {
            u64::MAX
        } else {
            (1u64 << self.length) - 1
        }
    }

    /// Smallest value the bitfield holds.
    #[must_use]
    pub fn min(&self) -> i128 {
        if self.signed {
            -(1i128 << (self.length - 1))
        } else {
            0
        }
    }

    /// Largest value the bitfield holds.
    #[must_use]
    pub fn max(&self) -> i128 {
        if self.signed {
            (1i128 << (self.length - 1)) - 1
        } else {
            (1i128 << self.length) - 1
        }
    }

    /// Width of the accessor property: the smallest of 8, 16, 32 and 64 bits that holds the
    /// bitfield. Single-bit fields are exposed as `bool` instead.
    #[must_use]
    pub fn property_bits(&self) -> u8 {
        match self.length {
            0..=8 => 8,
            9..=16 => 16,
            17..=32 => 32,
            _ => 64,
        }
    }

    /// Keyword of the accessor property type.
    #[must_use]
    pub fn property_type(&self) -> &'static str {
        if self.is_boolean() {
            return "bool";
        }
        match (self.property_bits(), self.signed) {
            (8, false) => "byte",
            (8, true) => "sbyte",
            (16, false) => "ushort",
            (16, true) => "short",
            (32, false) => "uint",
            (32, true) => "int",
            (_, false) => "ulong",
            (_, true) => "long",
        }
    }

    /// Returns `true` for unsigned single-bit fields, which become boolean accessors.
    #[must_use]
    pub fn is_boolean(&self) -> bool {
        self.length == 1 && !self.signed
    }

    /// Returns `true` if the setter has to check its argument: the property type admits
    /// values the bitfield cannot hold.
    #[must_use]
    pub fn asserts_range(&self) -> bool {
        !self.is_boolean() && self.property_bits() > self.length
    }

    /// Extracts the bitfield from `storage`, sign-extending for signed storage.
    #[must_use]
    pub fn read(&self, storage: u64) -> i128 {
        let raw = (storage >> self.offset) & self.mask_no_offset();
        if self.signed {
            let shift = 64 - u32::from(self.length);
            i128::from(((raw << shift) as i64) >> shift)
        } else {
            i128::from(raw)
        }
    }

    /// Stores `value` into `storage`, leaving all other bits untouched.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Usage`] if `value` lies outside `min()..=max()`.
    pub fn write(&self, storage: u64, value: i128) -> Result<u64> {
        if value < self.min() || value > self.max() {
            return Err(crate::Error::Usage(format!(
                "{} does not fit a {}-bit bitfield ({}..={})",
                value,
                self.length,
                self.min(),
                self.max()
            )));
        }

        // Two's complement truncation to the field width is the intended encoding.
        let bits = (value as u64) & self.mask_no_offset();
        Ok((storage & !self.mask()) | (bits << self.offset))
    }
}
