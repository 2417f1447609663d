//! `chprep-core` is the core library of `chprep`: it prepares semi-structured data
//! for a column-oriented analytical store (ClickHouse dialect) and profiles the
//! tables it lands in.
//!
//! This crate includes:
//! - **Type grammar**: parsing of column type strings into type trees ([`type_grammar`]).
//! - **Classification**: structural and value kinds of columns ([`classify`]).
//! - **Schema resolution**: descriptors and dotted column families ([`schema`]).
//! - **Profiling**: batched aggregate statistics and the low-cardinality probe
//!   ([`profiler`], [`queries`]).
//! - **Record preparation**: nested flattening, null-safe coercion and inserts
//!   ([`flatten`], [`coerce`], [`prepare`]).
//!
//! The store itself is reached through the collaborator traits of
//! `chprep-core-common`.

pub mod classify;
pub mod coerce;
pub mod config;
pub mod display;
pub mod error;
pub mod flatten;
pub mod prepare;
pub mod profiler;
pub mod queries;
pub mod schema;
pub mod type_grammar;
pub mod utils;

pub use error::{PrepError, Result};
