//! docfeed-http: load-balanced feed dispatcher for the `/document/v1/` API
//!
//! Sends single document operations (put, update, remove) to a document
//! store over HTTP and turns each response into a [`FeedResult`] with stats.
//!
//! # Architecture
//!
//! One [`FeedClient::send`] call goes through:
//! - `request`: method, path and query for the document
//! - `compression`: gzip with pooled encoders when the body warrants it
//! - `balancer`: least-busy transport with lock-free inflight counters
//! - `transport`: the HTTP call itself, under the client-side deadline
//! - `response`: status classification and body decoding
//!
//! The client never retries and never batches; those belong to the caller.

pub mod balancer;
pub mod client;
pub mod compression;
pub mod config;
pub mod document;
pub mod error;
pub mod request;
pub mod response;
pub mod transport;

pub use client::FeedClient;
pub use config::{ClientOptions, Clock, Compression, HttpTransportConfig};
pub use document::{Document, Id, Operation};
pub use error::{FeedError, FeedErrorCategory};
pub use request::FeedRequest;
pub use response::{FeedResult, Stats, Status};
pub use transport::{HttpTransport, ResponseBody, Transport, TransportResponse};

// Re-export shared HTTP types from docfeed-common
pub use docfeed_common::http::{HttpMethod, HttpRequestLike, HttpResponseLike, HttpStatus};
