//! # dotbind Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the dotbind library. Import this module to get quick access to everything needed to
//! open a store, request APIs and render the result.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all dotbind operations
pub use crate::Error;

/// The result type used throughout dotbind
pub use crate::Result;

/// Per-item result tag of bulk operations
pub use crate::Outcome;

// ================================================================================================
// Configuration
// ================================================================================================

/// Generation settings and target architectures
pub use crate::{config::GeneratorOptions, index::Platform};

/// Marshaling context of a request
pub use crate::ledger::Context;

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// Request operations against one store, and their results
pub use crate::generator::{Generator, RequestOutcome, SweepReport};

/// Generators over several stores
pub use crate::manager::GeneratorSet;

/// Cooperative cancellation of bulk sweeps
pub use crate::utils::cancellation::CancellationToken;

// ================================================================================================
// Stores and Metadata
// ================================================================================================

/// Opened stores and the session registry
pub use crate::store::{MetadataStore, ReaderRental, StorePool};

/// File backends
pub use crate::file::{memory::Memory, physical::Physical, Backend};

/// The metadata view consumed by synthesis
pub use crate::metadata::{
    reader::{MetadataReader, ReaderFactory},
    signatures::TypeSignature,
    tables::ConstantValue,
    token::Token,
};

/// In-memory metadata for hosts and tests
pub use crate::metadata::memory::{InMemoryMetadata, MetadataBuilder};

// ================================================================================================
// Declarations and Output
// ================================================================================================

/// The declaration tree
pub use crate::synth::declarations::{Declaration, DeclarationKind, TypeExpr};

/// Output units
pub use crate::render::{OutputUnit, UnitSettings};

/// Environment and cross-store lookups
pub use crate::resolver::{CoreLibrary, ExternalTypeResolver, TargetEnvironment};

/// Documentation sources
pub use crate::docs::{ApiDetails, ApiDocs, DocsProvider};
