use crate::error::HttpError;
use crate::request::RequestBuilder;
use crate::response::ResponseBody;
use bytes::Bytes;
use http::{Method, Request, Response};
use http_body_util::Full;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tower::buffer::Buffer;
use url::Url;

/// Future returned by the type-erased service stack.
pub type ServiceFuture =
    Pin<Box<dyn Future<Output = Result<Response<ResponseBody>, HttpError>> + Send>>;

/// Buffered service handle shared by all clones of a [`Client`].
pub type BufferedService = Buffer<Request<Full<Bytes>>, ServiceFuture>;

/// Configured HTTP client bound to one base URL.
///
/// Built by [`ClientFactory`](crate::ClientFactory). `Client` is
/// `Clone + Send + Sync`; clones share the same connection pool, so
/// concurrent callers need no extra locking.
#[derive(Clone)]
pub struct Client {
    pub(crate) service: BufferedService,
    pub(crate) base_url: Arc<Url>,
    pub(crate) pool_name: Arc<str>,
    pub(crate) max_body_size: usize,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.base_url.as_str())
            .field("pool_name", &self.pool_name)
            .field("max_body_size", &self.max_body_size)
            .finish_non_exhaustive()
    }
}

impl Client {
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Name of the connection pool, `"{name}-provider"`.
    #[must_use]
    pub fn pool_name(&self) -> &str {
        &self.pool_name
    }

    /// Start a request for `path`, appended to the base URL path.
    ///
    /// `"/hello"` against `http://host/api` targets `http://host/api/hello`;
    /// an empty `path` targets the base URL unchanged.
    /// Query parameters belong in [`RequestBuilder::query`], not in `path`.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        RequestBuilder::new(
            self.service.clone(),
            self.max_body_size,
            method,
            resolve(&self.base_url, path),
        )
    }
}

fn resolve(base: &Url, path: &str) -> Url {
    let mut url = base.clone();
    if path.is_empty() {
        return url;
    }
    let joined = format!(
        "{}/{}",
        base.path().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    url.set_path(&joined);
    url
}

/// Map buffer errors to `HttpError`.
///
/// Errors from the inner stack arrive boxed and are unwrapped; anything else
/// means the buffer worker is gone.
pub fn map_buffer_error(err: tower::BoxError) -> HttpError {
    match err.downcast::<HttpError>() {
        Ok(http_err) => *http_err,
        Err(err) => {
            tracing::error!(
                error = %err,
                "buffer worker closed unexpectedly; service unavailable"
            );
            HttpError::ServiceClosed
        }
    }
}
