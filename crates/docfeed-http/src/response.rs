//! Feed results and response classification

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use bytes::BytesMut;
use docfeed_common::{HttpResponseLike, HttpStatus};
use serde::de::{Deserializer, IgnoredAny, MapAccess, Visitor};
use serde::Deserialize;
use serde_json::value::RawValue;

use crate::document::Id;
use crate::error::FeedError;
use crate::transport::TransportResponse;

/// Final outcome of a single document operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// The operation was applied
    Success,
    /// The test-and-set condition did not match (412)
    ConditionNotMet,
    /// The document store is overloaded or unavailable, or answered with an
    /// unreadable body
    VespaFailure,
    /// The request failed before or while reaching the document store, or
    /// was answered with an unexpected status
    TransportFailure,
}

impl Status {
    /// Classify an HTTP status code
    pub fn from_http_status(status: HttpStatus) -> Self {
        match status {
            HttpStatus::OK => Status::Success,
            HttpStatus::PRECONDITION_FAILED => Status::ConditionNotMet,
            HttpStatus::BAD_GATEWAY
            | HttpStatus::GATEWAY_TIMEOUT
            | HttpStatus::INSUFFICIENT_STORAGE => Status::VespaFailure,
            _ => Status::TransportFailure,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::ConditionNotMet => "condition-not-met",
            Status::VespaFailure => "vespa-failure",
            Status::TransportFailure => "transport-failure",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters for one or more document operations.
///
/// A single send produces counts of 0 or 1 and degenerate latencies
/// (min = max = total). Use [`Stats::add`] to aggregate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    pub requests: u64,
    pub responses: u64,
    pub responses_by_code: HashMap<u16, u64>,
    pub errors: u64,
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub total_latency: Duration,
    pub min_latency: Duration,
    pub max_latency: Duration,
}

impl Stats {
    /// Merge `other` into these stats.
    ///
    /// Latency extremes only come from stats that saw responses, since a
    /// failed call carries no latency.
    pub fn add(&mut self, other: &Stats) {
        if other.responses > 0 {
            if self.responses == 0 || other.min_latency < self.min_latency {
                self.min_latency = other.min_latency;
            }
            self.max_latency = self.max_latency.max(other.max_latency);
        }
        self.requests += other.requests;
        self.responses += other.responses;
        for (code, count) in &other.responses_by_code {
            *self.responses_by_code.entry(*code).or_insert(0) += count;
        }
        self.errors += other.errors;
        self.bytes_sent += other.bytes_sent;
        self.bytes_recv += other.bytes_recv;
        self.total_latency += other.total_latency;
    }

    /// Number of responses with status 200
    pub fn successes(&self) -> u64 {
        self.responses_by_code
            .get(&HttpStatus::OK.code())
            .copied()
            .unwrap_or(0)
    }

    /// Mean latency over all responses
    pub fn avg_latency(&self) -> Duration {
        match u32::try_from(self.responses) {
            Ok(0) => Duration::ZERO,
            Ok(n) => self.total_latency / n,
            Err(_) => Duration::from_secs_f64(
                self.total_latency.as_secs_f64() / self.responses as f64,
            ),
        }
    }
}

/// Result of sending one document
#[derive(Debug)]
pub struct FeedResult {
    pub id: Id,
    pub status: Status,
    /// HTTP status code, 0 when no response was received
    pub http_status: u16,
    pub message: String,
    /// Raw JSON trace returned by the server, empty when absent
    pub trace: String,
    pub err: Option<FeedError>,
    pub stats: Stats,
}

impl FeedResult {
    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    /// Result of a call that never produced a response
    pub(crate) fn failed(id: Id, err: FeedError) -> Self {
        Self {
            id,
            status: Status::TransportFailure,
            http_status: 0,
            message: String::new(),
            trace: String::new(),
            err: Some(err),
            stats: Stats {
                requests: 1,
                errors: 1,
                ..Stats::default()
            },
        }
    }

    /// Classify `response`, read and decode its body, and fill in stats.
    ///
    /// `bytes_sent` is the logical (uncompressed) body length.
    pub(crate) async fn from_response(
        id: Id,
        mut response: TransportResponse,
        bytes_sent: usize,
        elapsed: Duration,
    ) -> Self {
        let http_status = response.status_code();
        let mut status = Status::from_http_status(response.status());
        let mut err = None;
        let mut envelope = ResponseEnvelope::default();

        let mut body = BytesMut::new();
        if let Err(e) = response.read_body(&mut body).await {
            status = Status::VespaFailure;
            err = Some(e);
        } else {
            match decode_envelope(&body) {
                Ok(decoded) => envelope = decoded,
                Err(e) => {
                    status = Status::VespaFailure;
                    err = Some(FeedError::Decode(e));
                }
            }
        }

        let stats = Stats {
            requests: 1,
            responses: 1,
            responses_by_code: HashMap::from([(http_status, 1)]),
            errors: u64::from(status != Status::Success),
            bytes_sent: bytes_sent as u64,
            bytes_recv: body.len() as u64,
            total_latency: elapsed,
            min_latency: elapsed,
            max_latency: elapsed,
        };

        Self {
            id,
            status,
            http_status,
            message: envelope.message.unwrap_or_default(),
            trace: envelope
                .trace
                .map(|raw| raw.get().to_string())
                .unwrap_or_default(),
            err,
            stats,
        }
    }
}

/// Body returned by the document API on every status
#[derive(Debug, Default)]
struct ResponseEnvelope {
    message: Option<String>,
    trace: Option<Box<RawValue>>,
}

/// Decode a response body. `null` decodes to an empty envelope; anything
/// other than an object or `null` is rejected.
fn decode_envelope(body: &[u8]) -> serde_json::Result<ResponseEnvelope> {
    Ok(serde_json::from_slice::<Option<ResponseEnvelope>>(body)?.unwrap_or_default())
}

impl<'de> Deserialize<'de> for ResponseEnvelope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // A derived struct impl would also accept a JSON array
        deserializer.deserialize_map(EnvelopeVisitor)
    }
}

struct EnvelopeVisitor;

impl<'de> Visitor<'de> for EnvelopeVisitor {
    type Value = ResponseEnvelope;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut envelope = ResponseEnvelope::default();
        while let Some(key) = map.next_key::<String>()? {
            match key.as_str() {
                "message" => envelope.message = map.next_value()?,
                "trace" => envelope.trace = map.next_value()?,
                _ => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }
        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ResponseBody;
    use async_trait::async_trait;

    /// Body that yields a prefix and then fails
    struct BrokenBody(&'static [u8]);

    #[async_trait]
    impl ResponseBody for BrokenBody {
        async fn read_to_end(&mut self, buf: &mut BytesMut) -> crate::error::Result<()> {
            buf.extend_from_slice(self.0);
            Err(FeedError::ReadBody("connection reset".to_string()))
        }
    }

    fn id() -> Id {
        Id::new("ns", "t", "d")
    }

    async fn parse(status: u16, body: &'static str) -> FeedResult {
        let response = TransportResponse::buffered(status, body);
        FeedResult::from_response(id(), response, 10, Duration::from_millis(7)).await
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (200, Status::Success),
            (412, Status::ConditionNotMet),
            (502, Status::VespaFailure),
            (504, Status::VespaFailure),
            (507, Status::VespaFailure),
            (404, Status::TransportFailure),
            (500, Status::TransportFailure),
            (429, Status::TransportFailure),
        ];
        for (code, expected) in cases {
            assert_eq!(Status::from_http_status(HttpStatus(code)), expected, "{code}");
        }
    }

    #[tokio::test]
    async fn test_success_response() {
        let result = parse(200, r#"{"message":"ok","trace":[{"message":"hop"}]}"#).await;
        assert!(result.is_success());
        assert_eq!(result.http_status, 200);
        assert_eq!(result.message, "ok");
        assert_eq!(result.trace, r#"[{"message":"hop"}]"#);
        assert!(result.err.is_none());
        assert_eq!(result.stats.requests, 1);
        assert_eq!(result.stats.responses, 1);
        assert_eq!(result.stats.responses_by_code, HashMap::from([(200, 1)]));
        assert_eq!(result.stats.errors, 0);
        assert_eq!(result.stats.bytes_sent, 10);
        assert_eq!(result.stats.bytes_recv, 44);
        assert_eq!(result.stats.total_latency, Duration::from_millis(7));
        assert_eq!(result.stats.min_latency, Duration::from_millis(7));
        assert_eq!(result.stats.max_latency, Duration::from_millis(7));
    }

    #[tokio::test]
    async fn test_missing_fields_are_empty() {
        let result = parse(200, "{}").await;
        assert!(result.is_success());
        assert!(result.message.is_empty());
        assert!(result.trace.is_empty());
    }

    #[tokio::test]
    async fn test_condition_not_met_counts_as_error() {
        let result = parse(412, r#"{"message":"condition not met"}"#).await;
        assert_eq!(result.status, Status::ConditionNotMet);
        assert_eq!(result.message, "condition not met");
        assert!(result.err.is_none());
        assert_eq!(result.stats.errors, 1);
    }

    #[tokio::test]
    async fn test_malformed_json_is_vespa_failure() {
        let body = "<html>bad gateway</html>";
        let result = parse(200, body).await;
        assert_eq!(result.status, Status::VespaFailure);
        assert_eq!(result.http_status, 200);
        let err = result.err.expect("decode error");
        assert!(err.to_string().starts_with("Failed to decode json response"));
        assert_eq!(result.stats.bytes_recv, body.len() as u64);
        assert_eq!(result.stats.errors, 1);
        assert_eq!(result.stats.responses_by_code, HashMap::from([(200, 1)]));
    }

    #[tokio::test]
    async fn test_body_read_failure_is_vespa_failure() {
        let response = TransportResponse::new(200, BrokenBody(b""));
        let result = FeedResult::from_response(id(), response, 3, Duration::ZERO).await;
        assert_eq!(result.status, Status::VespaFailure);
        assert!(matches!(result.err, Some(FeedError::ReadBody(_))));
        assert_eq!(result.stats.bytes_recv, 0);
        assert_eq!(result.stats.errors, 1);
    }

    #[tokio::test]
    async fn test_body_read_failure_counts_partial_bytes() {
        let response = TransportResponse::new(200, BrokenBody(br#"{"message":"tru"#));
        let result = FeedResult::from_response(id(), response, 3, Duration::ZERO).await;
        assert_eq!(result.status, Status::VespaFailure);
        assert!(matches!(result.err, Some(FeedError::ReadBody(_))));
        assert_eq!(result.stats.bytes_recv, 15);
        assert!(result.message.is_empty());
    }

    #[tokio::test]
    async fn test_non_object_bodies_are_rejected() {
        for body in ["[]", r#"["m"]"#, r#""ok""#, "42", ""] {
            let result = parse(200, body).await;
            assert_eq!(result.status, Status::VespaFailure, "body {body:?}");
            assert!(matches!(result.err, Some(FeedError::Decode(_))), "body {body:?}");
            assert!(result.message.is_empty());
        }
    }

    #[tokio::test]
    async fn test_null_body_is_empty_envelope() {
        let result = parse(200, "null").await;
        assert!(result.is_success(), "{:?}", result.err);
        assert!(result.message.is_empty());
        assert!(result.trace.is_empty());
        assert_eq!(result.stats.bytes_recv, 4);
    }

    #[tokio::test]
    async fn test_unknown_and_null_fields_are_ignored() {
        let body = r#"{"id":"id:ns:t::d","pathId":"/x","message":null,"trace":null}"#;
        let result = parse(200, body).await;
        assert!(result.is_success(), "{:?}", result.err);
        assert!(result.message.is_empty());
        assert!(result.trace.is_empty());
    }

    #[tokio::test]
    async fn test_wrongly_typed_message_is_decode_error() {
        let result = parse(200, r#"{"message":7}"#).await;
        assert_eq!(result.status, Status::VespaFailure);
        assert!(matches!(result.err, Some(FeedError::Decode(_))));
    }

    #[test]
    fn test_failed_result() {
        let result = FeedResult::failed(id(), FeedError::Connection("refused".into()));
        assert_eq!(result.status, Status::TransportFailure);
        assert_eq!(result.http_status, 0);
        assert_eq!(result.stats.requests, 1);
        assert_eq!(result.stats.errors, 1);
        assert_eq!(result.stats.responses, 0);
        assert!(result.stats.responses_by_code.is_empty());
    }

    #[test]
    fn test_stats_aggregation() {
        let one = |code: u16, latency_ms: u64, errors: u64| Stats {
            requests: 1,
            responses: 1,
            responses_by_code: HashMap::from([(code, 1)]),
            errors,
            bytes_sent: 100,
            bytes_recv: 20,
            total_latency: Duration::from_millis(latency_ms),
            min_latency: Duration::from_millis(latency_ms),
            max_latency: Duration::from_millis(latency_ms),
        };
        let failed = Stats {
            requests: 1,
            errors: 1,
            ..Stats::default()
        };

        let mut total = Stats::default();
        total.add(&one(200, 30, 0));
        total.add(&failed);
        total.add(&one(200, 10, 0));
        total.add(&one(412, 50, 1));

        assert_eq!(total.requests, 4);
        assert_eq!(total.responses, 3);
        assert_eq!(total.errors, 2);
        assert_eq!(total.successes(), 2);
        assert_eq!(total.responses_by_code.get(&412), Some(&1));
        assert_eq!(total.bytes_sent, 300);
        assert_eq!(total.bytes_recv, 60);
        assert_eq!(total.min_latency, Duration::from_millis(10));
        assert_eq!(total.max_latency, Duration::from_millis(50));
        assert_eq!(total.total_latency, Duration::from_millis(90));
        assert_eq!(total.avg_latency(), Duration::from_millis(30));
    }

    #[test]
    fn test_avg_latency_without_responses() {
        assert_eq!(Stats::default().avg_latency(), Duration::ZERO);
    }
}
