//! Fixtures shared by the unit tests.

pub mod fixtures;
