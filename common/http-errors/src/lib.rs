use axum::extract::Request;
use axum::middleware::Next;
use axum::{http::{StatusCode, HeaderValue}, response::{IntoResponse, Response}, Json};
use once_cell::sync::Lazy;
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts};
use serde::Serialize;
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")] pub missing_role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")] pub trace_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")] pub message: Option<String>,
}

#[derive(Debug)]
pub enum ApiError {
    ForbiddenMissingRole { role: &'static str, trace_id: Option<Uuid> },
    Forbidden { trace_id: Option<Uuid> },
    BadRequest { code: &'static str, trace_id: Option<Uuid>, message: Option<String> },
    NotFound { code: &'static str, trace_id: Option<Uuid> },
    Internal { trace_id: Option<Uuid>, message: Option<String> },
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(e: E, trace_id: Option<Uuid>) -> Self { Self::Internal { trace_id, message: Some(e.to_string()) } }
    pub fn bad_request(code: &'static str, trace_id: Option<Uuid>) -> Self { Self::BadRequest { code, trace_id, message: None } }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body, error_code) = match self {
            ApiError::ForbiddenMissingRole { role, trace_id } => (
                StatusCode::FORBIDDEN,
                ErrorBody { code: "missing_role".into(), missing_role: Some(role.into()), trace_id, message: None },
                "missing_role"
            ),
            ApiError::Forbidden { trace_id } => (
                StatusCode::FORBIDDEN,
                ErrorBody { code: "forbidden".into(), missing_role: None, trace_id, message: None },
                "forbidden"
            ),
            ApiError::BadRequest { code, trace_id, message } => (
                StatusCode::BAD_REQUEST,
                ErrorBody { code: code.into(), missing_role: None, trace_id, message },
                code
            ),
            ApiError::NotFound { code, trace_id } => (
                StatusCode::NOT_FOUND,
                ErrorBody { code: code.into(), missing_role: None, trace_id, message: None },
                code
            ),
            ApiError::Internal { trace_id, message } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody { code: "internal_error".into(), missing_role: None, trace_id, message },
                "internal_error"
            ),
        };
        let mut resp = (status, Json(body)).into_response();
        if let Ok(val) = HeaderValue::from_str(error_code) {
            resp.headers_mut().insert("X-Error-Code", val);
        }
        resp
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Cap on distinct `X-Error-Code` label values tracked before further codes
/// collapse into a shared `"overflow"` bucket, so a caller that fabricates
/// unbounded error codes (a bad client retrying with a new idempotency key
/// per attempt, say) cannot blow up this process's metric cardinality.
pub const MAX_ERROR_CODES: usize = 40;

struct ErrorMetrics {
    seen_codes: Mutex<HashSet<String>>,
    by_code: IntCounterVec,
    distinct_codes: IntGauge,
    overflow_total: IntCounter,
}

static METRICS: Lazy<ErrorMetrics> = Lazy::new(|| ErrorMetrics {
    seen_codes: Mutex::new(HashSet::new()),
    by_code: IntCounterVec::new(
        Opts::new("http_errors_total", "HTTP error responses by service and error code"),
        &["service", "code"],
    )
    .expect("valid counter metric"),
    distinct_codes: IntGauge::new(
        "http_error_codes_distinct",
        "Number of distinct error codes admitted into the cardinality guard",
    )
    .expect("valid gauge metric"),
    overflow_total: IntCounter::new(
        "http_error_codes_overflow_total",
        "Error codes rejected by the cardinality guard and folded into 'overflow'",
    )
    .expect("valid counter metric"),
});

fn record_error_code(service: &str, code: &str) {
    let mut seen = METRICS.seen_codes.lock().expect("metrics mutex poisoned");
    if seen.contains(code) {
        drop(seen);
        METRICS.by_code.with_label_values(&[service, code]).inc();
        return;
    }

    if seen.len() < MAX_ERROR_CODES {
        seen.insert(code.to_string());
        METRICS.distinct_codes.set(seen.len() as i64);
        drop(seen);
        METRICS.by_code.with_label_values(&[service, code]).inc();
    } else {
        drop(seen);
        METRICS.overflow_total.inc();
        METRICS.by_code.with_label_values(&[service, "overflow"]).inc();
    }
}

/// Axum middleware that reads every response's `X-Error-Code` header (set by
/// [`ApiError::into_response`]) and records it through the cardinality-guarded
/// counters above. `service` labels every metric recorded through this layer
/// so one process hosting more than one logical service keeps them apart.
pub fn http_error_metrics_layer(
    service: &'static str,
) -> impl Fn(Request, Next) -> Pin<Box<dyn Future<Output = Response> + Send>> + Clone + Send + Sync + 'static
{
    move |req: Request, next: Next| {
        Box::pin(async move {
            let response = next.run(req).await;
            if let Some(code) = response
                .headers()
                .get("X-Error-Code")
                .and_then(|v| v.to_str().ok())
            {
                record_error_code(service, code);
            }
            response
        })
    }
}

#[cfg(feature = "test-helpers")]
pub mod test_helpers {
    //! Drives the cardinality guard directly, without standing up an axum
    //! router, for tests that only care about the guard's own behaviour.
    use super::{record_error_code, METRICS};

    pub fn simulate_error_code(code: &str) {
        record_error_code("test-service", code);
    }

    pub fn distinct_gauge() -> i64 {
        METRICS.distinct_codes.get()
    }

    pub fn overflow_count() -> i64 {
        METRICS.overflow_total.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_code_does_not_grow_distinct_set() {
        record_error_code("svc-a", "AUTH_BAD_CREDENTIALS");
        let before = METRICS.seen_codes.lock().unwrap().len();
        record_error_code("svc-a", "AUTH_BAD_CREDENTIALS");
        let after = METRICS.seen_codes.lock().unwrap().len();
        assert_eq!(before, after);
    }
}
