use http::{Request, Response};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::{Instrument, Level};

/// Layer wrapping each outbound request in an `outgoing_http` span.
///
/// Span fields: `pool`, `http.method`, `http.url` (query stripped),
/// `http.status_code` once the response head arrives, and `error=true` for
/// 4xx/5xx statuses or transport failures.
#[derive(Clone, Debug)]
pub struct TraceLayer {
    pool: Arc<str>,
}

impl TraceLayer {
    #[must_use]
    pub fn new(pool: impl Into<Arc<str>>) -> Self {
        Self { pool: pool.into() }
    }
}

impl<S> Layer<S> for TraceLayer {
    type Service = TraceService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TraceService {
            inner,
            pool: Arc::clone(&self.pool),
        }
    }
}

#[derive(Clone, Debug)]
pub struct TraceService<S> {
    inner: S,
    pool: Arc<str>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for TraceService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: std::fmt::Display + Send + 'static,
    ReqBody: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let uri = req.uri();
        let url = format!(
            "{}://{}{}",
            uri.scheme_str().unwrap_or("http"),
            uri.authority().map_or("", http::uri::Authority::as_str),
            uri.path()
        );

        let span = tracing::span!(
            Level::INFO, "outgoing_http",
            pool = %self.pool,
            http.method = %req.method(),
            http.url = %url,
            http.status_code = tracing::field::Empty,
            error = tracing::field::Empty,
        );

        // The instance that was poll_ready'd handles this call.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let result = inner.call(req).instrument(span.clone()).await;

            match &result {
                Ok(response) => {
                    let status = response.status();
                    span.record("http.status_code", status.as_u16());
                    if status.is_client_error() || status.is_server_error() {
                        span.record("error", true);
                    }
                }
                Err(e) => {
                    span.record("error", true);
                    tracing::debug!(parent: &span, error = %e, "request failed");
                }
            }

            result
        })
    }
}
