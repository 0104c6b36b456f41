//! The metadata model consumed by the generator.
//!
//! # Key Components
//!
//! - [`crate::metadata::token`] - Row handles and their classification
//! - [`crate::metadata::tables`] - Owned rows for types, fields, methods and references
//! - [`crate::metadata::signatures`] - Decoded type and method signatures
//! - [`crate::metadata::customattributes`] - Decoded decorations and lookup helpers
//! - [`crate::metadata::reader`] - The [`reader::MetadataReader`] capability and its factory
//! - [`crate::metadata::memory`] - An in-memory store and a builder for it

pub mod customattributes;
pub mod memory;
pub mod reader;
pub mod signatures;
pub mod tables;
pub mod token;
