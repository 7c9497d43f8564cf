use crate::error::{BoxError, HttpError};
use crate::response::ResponseBody;
use bytes::Bytes;
use http::{Request, Response};
use http_body::{Body, Frame, SizeHint};
use http_body_util::BodyExt;
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tower::{Layer, Service};

/// Caps the number of connections checked out of the pool at once.
///
/// A permit is taken before the request is dispatched and travels with the
/// response body, so it is only returned once the body has been read to the
/// end or dropped. Until then the connection is still busy and no other
/// request may claim its slot.
#[derive(Clone, Debug)]
pub struct ConnectionLimitLayer {
    permits: Arc<Semaphore>,
}

impl ConnectionLimitLayer {
    #[must_use]
    pub fn new(max: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max)),
        }
    }
}

impl<S> Layer<S> for ConnectionLimitLayer {
    type Service = ConnectionLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ConnectionLimitService {
            inner,
            permits: Arc::clone(&self.permits),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ConnectionLimitService<S> {
    inner: S,
    permits: Arc<Semaphore>,
}

impl<S, ReqBody> Service<Request<ReqBody>> for ConnectionLimitService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResponseBody>, Error = HttpError>
        + Clone
        + Send
        + 'static,
    S::Future: Send,
    ReqBody: Send + 'static,
{
    type Response = Response<ResponseBody>;
    type Error = HttpError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let permits = Arc::clone(&self.permits);
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let permit = permits
                .acquire_owned()
                .await
                .map_err(|_| HttpError::ServiceClosed)?;
            let response = inner.call(req).await?;
            Ok(response.map(|body| PermitBody::new(body, permit).boxed()))
        })
    }
}

pin_project! {
    /// Response body holding a connection permit until end of stream.
    pub struct PermitBody {
        #[pin]
        inner: ResponseBody,
        permit: Option<OwnedSemaphorePermit>,
    }
}

impl PermitBody {
    #[must_use]
    pub fn new(inner: ResponseBody, permit: OwnedSemaphorePermit) -> Self {
        let permit = (!inner.is_end_stream()).then_some(permit);
        Self { inner, permit }
    }
}

impl Body for PermitBody {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let mut this = self.project();
        let polled = this.inner.as_mut().poll_frame(cx);

        let finished = match &polled {
            Poll::Ready(None | Some(Err(_))) => true,
            Poll::Ready(Some(Ok(_))) => this.inner.is_end_stream(),
            Poll::Pending => false,
        };
        if finished {
            this.permit.take();
        }

        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use http_body_util::Full;
    use std::convert::Infallible;
    use tower::ServiceExt;

    /// Answers every request with the same body.
    #[derive(Clone)]
    struct Fixed(&'static str);

    impl Service<Request<()>> for Fixed {
        type Response = Response<ResponseBody>;
        type Error = HttpError;
        type Future = std::future::Ready<Result<Self::Response, Self::Error>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _req: Request<()>) -> Self::Future {
            let body = Full::new(Bytes::from_static(self.0.as_bytes()))
                .map_err(|never: Infallible| match never {})
                .boxed();
            std::future::ready(Ok(Response::new(body)))
        }
    }

    fn limited(body: &'static str) -> (ConnectionLimitService<Fixed>, Arc<Semaphore>) {
        let layer = ConnectionLimitLayer::new(1);
        let permits = Arc::clone(&layer.permits);
        (layer.layer(Fixed(body)), permits)
    }

    #[tokio::test]
    async fn test_permit_held_until_body_is_read() {
        let (svc, permits) = limited("ok");

        let response = svc.oneshot(Request::new(())).await.unwrap();
        assert_eq!(permits.available_permits(), 0, "response head must not free the slot");

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, Bytes::from_static(b"ok"));
        assert_eq!(permits.available_permits(), 1);
    }

    #[tokio::test]
    async fn test_dropped_body_releases_permit() {
        let (svc, permits) = limited("unread");

        let response = svc.oneshot(Request::new(())).await.unwrap();
        assert_eq!(permits.available_permits(), 0);
        drop(response);
        assert_eq!(permits.available_permits(), 1);
    }

    #[tokio::test]
    async fn test_empty_body_releases_permit_at_once() {
        let (svc, permits) = limited("");

        let _response = svc.oneshot(Request::new(())).await.unwrap();
        assert_eq!(permits.available_permits(), 1);
    }

    #[tokio::test]
    async fn test_second_request_waits_for_first_body() {
        let (svc, permits) = limited("first");

        let first = svc.clone().oneshot(Request::new(())).await.unwrap();
        let mut second = tokio::spawn(svc.oneshot(Request::new(())));

        let waited = tokio::time::timeout(std::time::Duration::from_millis(50), &mut second).await;
        assert!(waited.is_err(), "second request must wait for a free slot");

        drop(first);
        let second = second.await.unwrap().unwrap();
        assert_eq!(permits.available_permits(), 0);
        drop(second);
        assert_eq!(permits.available_permits(), 1);
    }
}
