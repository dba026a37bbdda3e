//! Core types and trait definitions for the Feedline fan-out pipeline.
//!
//! This crate is deliberately free of HTTP, database and runtime
//! dependencies. Every other crate depends on it.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod error;
pub mod event;
pub mod graph;
pub mod post;
pub mod store;
pub mod timeline;

pub use error::{Classify, Error, ErrorKind, Result};
pub use timeline::TIMELINE_CAPACITY;
