//! Common utilities for docfeed
//!
//! This crate provides the HTTP vocabulary shared by the feed dispatcher and
//! the transports plugged into it.

pub mod http;

pub use http::{HttpMethod, HttpRequestLike, HttpResponseLike, HttpStatus};
