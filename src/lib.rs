// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]
//#![deny(unsafe_code)]
// - 'file/physical.rs' uses mmap to map a file into memory

//! # dotbind
//!
//! On-demand generation of native interop declarations from ECMA-335 API metadata.
//!
//! API metadata files (`.winmd`) describe native APIs: structs, enums, callbacks, COM interfaces,
//! constants and the functions exported by native modules. `dotbind` reads such a store and
//! produces, for exactly the APIs a caller asks for, C# declarations that call them: the
//! requested API plus everything it transitively depends on, and nothing else.
//!
//! ## Features
//!
//! - **Demand-driven** - Request one API by name and get its whole dependency closure
//! - **Transactional** - A failed request leaves no partial output behind
//! - **Memoized** - Each type is synthesized once per marshaling context
//! - **Platform-aware** - Types restricted to another architecture are reported, not emitted
//! - **Federated** - Several stores referencing each other resolve across assembly boundaries
//! - **Parallel rendering** - Output units render on the `rayon` thread pool
//!
//! ## Quick Start
//!
//! ```rust
//! use dotbind::prelude::*;
//!
//! let mut builder = MetadataBuilder::new("Contoso");
//! let size = builder.struct_type("Contoso.Geometry", "SIZE");
//! builder.field(size, "cx", TypeSignature::I4);
//! builder.field(size, "cy", TypeSignature::I4);
//!
//! let generator = Generator::from_metadata(builder.build(), GeneratorOptions::default())?;
//! generator.try_generate("SIZE", &CancellationToken::new())?;
//!
//! let units = generator.render();
//! assert!(units["SIZE.g.cs"].contains("internal partial struct SIZE"));
//! # Ok::<(), dotbind::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`store`] - Opened metadata stores, renting one reader per thread
//! - [`index`] - Per-platform lookup tables built once per store
//! - [`ledger`] - Transactional, memoized record of generated declarations
//! - [`synth`] - Turns metadata definitions into declaration trees
//! - [`resolver`] - Cross-store and target-environment lookups for referenced types
//! - [`generator`] - Request operations against one store
//! - [`manager`] - Federation of generators over several stores
//! - [`render`] - Output units and their C# text
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, Error>`](Result):
//!
//! ```rust
//! use dotbind::{prelude::*, Error};
//!
//! let generator =
//!     Generator::from_metadata(MetadataBuilder::new("Empty").build(), GeneratorOptions::default())?;
//! match generator.request_method("CreateFileW") {
//!     Err(Error::NotFound(message)) => println!("{message}"),
//!     Err(Error::PlatformIncompatible(message)) => println!("{message}"),
//!     other => println!("{other:?}"),
//! }
//! # Ok::<(), dotbind::Error>(())
//! ```
#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit- and integration-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use dotbind::prelude::*;
///
/// let generator =
///     Generator::from_metadata(MetadataBuilder::new("Empty").build(), GeneratorOptions::default())?;
/// assert!(generator.committed().is_empty());
/// # Ok::<(), dotbind::Error>(())
/// ```
pub mod prelude;

/// Generation settings.
pub mod config;

/// API documentation attached to generated declarations.
pub mod docs;

/// File backends a metadata store maps its bytes from.
///
/// - [`file::physical::Physical`] - A memory-mapped file on disk
/// - [`file::memory::Memory`] - An owned buffer
pub mod file;

/// Request operations against one metadata store.
pub mod generator;

/// Lookup tables over one store, built for one target platform.
pub mod index;

/// The transactional record of generated declarations.
pub mod ledger;

/// Federation of generators over several metadata stores.
pub mod manager;

/// The view of ECMA-335 metadata the generator consumes.
///
/// Binary parsing is out of scope: a [`metadata::reader::ReaderFactory`] turns a file
/// backend into a [`metadata::reader::MetadataReader`]. [`metadata::memory::MetadataBuilder`]
/// assembles metadata in memory for hosts and tests.
pub mod metadata;

/// Output units and their rendered C# text.
pub mod render;

/// Lookups for types referenced from other assemblies.
pub mod resolver;

/// Opened metadata stores and the session registry that owns them.
pub mod store;

/// Synthesis of declaration trees from metadata definitions.
pub mod synth;

/// Small utilities shared across the crate.
pub mod utils;

/// `dotbind` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `dotbind` Error type
///
/// # Examples
///
/// ```rust
/// use dotbind::Error;
///
/// let error = Error::PlatformIncompatible("CONTEXT".to_string()).wrap_generation("THREAD_INFO");
/// assert!(error.is_platform_incompatible());
/// ```
pub use error::{Error, Outcome};

/// Request operations against one store.
pub use generator::{Generator, RequestOutcome, SweepReport};

/// Generators over several stores.
pub use manager::GeneratorSet;

/// Generation settings.
pub use config::GeneratorOptions;

/// Target architectures.
pub use index::Platform;

/// An opened metadata store and the registry of opened stores.
pub use store::{MetadataStore, StorePool};
