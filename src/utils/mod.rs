//! Small utilities shared across the crate.
//!
//! - [`cancellation`] - Cooperative cancellation of bulk sweeps

pub mod cancellation;
