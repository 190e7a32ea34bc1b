//! Shared HTTP types for the docfeed ecosystem.

use std::fmt;

use ::http::HeaderMap;

/// Content type sent with every document operation.
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Content-Encoding value for gzip-compressed bodies.
pub const GZIP_ENCODING: &str = "gzip";

/// HTTP request methods used by the document API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    /// Returns the method as a string slice.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<HttpMethod> for ::http::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Post => ::http::Method::POST,
            HttpMethod::Put => ::http::Method::PUT,
            HttpMethod::Delete => ::http::Method::DELETE,
        }
    }
}

/// HTTP status code wrapper with helper methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HttpStatus(pub u16);

impl HttpStatus {
    // Codes the feed client classifies
    pub const OK: Self = Self(200);
    pub const PRECONDITION_FAILED: Self = Self(412);
    pub const BAD_GATEWAY: Self = Self(502);
    pub const GATEWAY_TIMEOUT: Self = Self(504);
    pub const INSUFFICIENT_STORAGE: Self = Self(507);

    /// Returns the status code as u16.
    pub fn code(&self) -> u16 {
        self.0
    }

    /// Returns true if this is a success status (2xx).
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.0)
    }
}

impl fmt::Display for HttpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for HttpStatus {
    fn from(code: u16) -> Self {
        Self(code)
    }
}

impl From<HttpStatus> for u16 {
    fn from(status: HttpStatus) -> Self {
        status.0
    }
}

/// Trait for types that represent HTTP responses.
///
/// Only the status line is exposed; bodies are read separately so a
/// response can be inspected before its body is consumed.
pub trait HttpResponseLike {
    /// Returns the HTTP status code.
    fn status_code(&self) -> u16;

    /// Returns the HTTP status.
    fn status(&self) -> HttpStatus {
        HttpStatus(self.status_code())
    }

    /// Returns true if this is a success response (2xx).
    fn is_success(&self) -> bool {
        self.status().is_success()
    }
}

/// Trait for types that represent HTTP requests.
pub trait HttpRequestLike {
    /// Returns the HTTP method.
    fn method(&self) -> HttpMethod;

    /// Returns the absolute request URL.
    fn url(&self) -> &str;

    /// Returns the request headers.
    fn headers(&self) -> &HeaderMap;

    /// Returns the request body as bytes.
    fn body_bytes(&self) -> &[u8];

    /// Gets a header value by name (case-insensitive).
    fn header(&self, name: &str) -> Option<&str> {
        self.headers().get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the Content-Type header value.
    fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Returns the Content-Encoding header value.
    fn content_encoding(&self) -> Option<&str> {
        self.header("content-encoding")
    }
}
