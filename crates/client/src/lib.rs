//! Transport for synq.
//!
//! This crate provides the REST implementation of the engine's
//! [`DataSource`](synq_core::DataSource) capability.

pub mod rest;

pub use rest::{RestConfig, RestSource};
