use tracing::Span;

/// Lets an API error type report a short, stable tag for metrics/log
/// correlation without leaking its full `Display` text, and flag whether the
/// failure is an expected client-facing outcome (4xx) versus a bug (5xx).
pub trait TraceErrorKind {
    fn trace_error_kind(&self) -> &'static str;

    fn is_expected(&self) -> bool {
        true
    }
}

/// Bookkeeping handle returned by `recorded_http_api_request!`: holds the
/// tracing span for the request and reports the outcome back into it.
pub struct ApiRequestRecord {
    pub span: Span,
}

impl ApiRequestRecord {
    pub fn new(span: Span) -> Self {
        Self { span }
    }

    pub fn result<T, E: TraceErrorKind>(self, result: Result<T, E>) -> Result<T, E> {
        match &result {
            Ok(_) => {
                self.span.record("outcome", "success");
            }
            Err(err) => {
                self.span.record("outcome", "failure");
                self.span.record("error_kind", err.trace_error_kind());
                if err.is_expected() {
                    tracing::info!(parent: &self.span, "request failed");
                } else {
                    tracing::error!(parent: &self.span, "request failed unexpectedly");
                }
            }
        }
        result
    }
}

/// Opens a tracing span for one HTTP API handler invocation and returns an
/// [`ApiRequestRecord`] to report the outcome through, matching the shape of
/// the teacher's `recorded_http_api_request!` call sites in
/// `cloud-service/src/api/limits.rs`.
#[macro_export]
macro_rules! recorded_http_api_request {
    ($op:expr) => {
        $crate::metrics::ApiRequestRecord::new(tracing::info_span!(
            "http_api_request",
            operation = $op,
            outcome = tracing::field::Empty,
            error_kind = tracing::field::Empty,
        ))
    };
    ($op:expr, $($field:ident = $value:expr),+ $(,)?) => {
        $crate::metrics::ApiRequestRecord::new(tracing::info_span!(
            "http_api_request",
            operation = $op,
            $($field = tracing::field::display(&$value),)+
            outcome = tracing::field::Empty,
            error_kind = tracing::field::Empty,
        ))
    };
}
