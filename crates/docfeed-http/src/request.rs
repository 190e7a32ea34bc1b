//! Request construction for the `/document/v1/` API
//!
//! Maps a [`Document`] to an HTTP method, a URL path and a query string.
//! Everything here is a pure function of the document and the client options.

use std::collections::BTreeMap;

use bytes::Bytes;
use docfeed_common::http::{GZIP_ENCODING, JSON_CONTENT_TYPE};
use docfeed_common::{HttpMethod, HttpRequestLike};
use http::header::{CONTENT_ENCODING, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue};
use url::Url;

use crate::config::ClientOptions;
use crate::document::{Document, Id, Operation};
use crate::error::Result;

/// HTTP method for a document operation
pub fn http_method(operation: Operation) -> HttpMethod {
    match operation {
        Operation::Put => HttpMethod::Post,
        Operation::Update => HttpMethod::Put,
        Operation::Remove => HttpMethod::Delete,
    }
}

/// Path of a document, with every segment percent-escaped on its own
pub fn url_path(id: &Id) -> String {
    let mut path = String::from("/document/v1/");
    path.push_str(&urlencoding::encode(&id.namespace));
    path.push('/');
    path.push_str(&urlencoding::encode(&id.doc_type));
    if let Some(n) = id.number {
        path.push_str("/number/");
        path.push_str(&n.to_string());
    } else if let Some(group) = id.group() {
        path.push_str("/group/");
        path.push_str(&urlencoding::encode(group));
    } else {
        path.push_str("/docid");
    }
    path.push('/');
    path.push_str(&urlencoding::encode(&id.user_specific));
    path
}

/// Builds method and URL for documents against a fixed base URL
#[derive(Debug, Clone)]
pub struct UrlBuilder {
    base_url: Url,
    /// Parameters shared by every request, derived from the options once
    shared_params: BTreeMap<&'static str, String>,
}

impl UrlBuilder {
    /// Parse the base URL and precompute the option-derived parameters.
    ///
    /// This is the only fallible step of request construction.
    pub fn new(options: &ClientOptions) -> Result<Self> {
        let base_url = Url::parse(&options.base_url)?;
        Ok(Self {
            base_url,
            shared_params: shared_params(options),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Method and absolute URL for a document
    pub fn feed_url(&self, document: &Document) -> (HttpMethod, Url) {
        let mut params = self.shared_params.clone();
        if let Some(condition) = document.condition() {
            params.insert("condition", condition.to_string());
        }
        if document.create {
            params.insert("create", "true".to_string());
        }

        let mut url = self.base_url.clone();
        url.set_path(&url_path(&document.id));
        url.set_query(None);
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params.iter());
        }
        (http_method(document.operation), url)
    }
}

fn shared_params(options: &ClientOptions) -> BTreeMap<&'static str, String> {
    let mut params = BTreeMap::new();
    if !options.timeout.is_zero() {
        params.insert("timeout", format!("{}ms", options.timeout.as_millis()));
    }
    if !options.route.is_empty() {
        params.insert("route", options.route.clone());
    }
    if options.trace_level > 0 {
        params.insert("tracelevel", options.trace_level.to_string());
    }
    params
}

/// A fully built request, ready to hand to a transport
#[derive(Debug, Clone)]
pub struct FeedRequest {
    pub method: HttpMethod,
    pub url: Url,
    pub headers: HeaderMap,
    /// Wire body, gzip-compressed when `Content-Encoding: gzip` is set
    pub body: Bytes,
}

impl FeedRequest {
    /// Create a request with the JSON content type and, if `gzipped`,
    /// the gzip content encoding.
    pub fn new(method: HttpMethod, url: Url, body: Bytes, gzipped: bool) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
        if gzipped {
            headers.insert(CONTENT_ENCODING, HeaderValue::from_static(GZIP_ENCODING));
        }
        Self {
            method,
            url,
            headers,
            body,
        }
    }

    pub fn is_gzipped(&self) -> bool {
        self.content_encoding() == Some(GZIP_ENCODING)
    }
}

impl HttpRequestLike for FeedRequest {
    fn method(&self) -> HttpMethod {
        self.method
    }

    fn url(&self) -> &str {
        self.url.as_str()
    }

    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn body_bytes(&self) -> &[u8] {
        &self.body
    }
}
