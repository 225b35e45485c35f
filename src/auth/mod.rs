//! # Request Authentication Context
//!
//! The store does not authenticate callers itself; the embedding layer does and
//! hands the result over as an [`Identity`] inside a [`RequestContext`].

pub mod context;

pub use context::{Identity, RequestContext};
