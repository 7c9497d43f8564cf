//! Per-connection read and write timeouts.
//!
//! [`TimeoutConnector`] wraps the TLS connector and hands hyper a
//! [`TimeoutStream`] for every established connection. A read (resp. write)
//! that stays pending for longer than the configured duration without making
//! progress fails with `io::ErrorKind::TimedOut`, which tears the connection
//! down and fails the in-flight request. Progress of any size resets the timer.
//!
//! Because hyper keeps a read pending on idle pooled connections, an idle
//! connection is also closed once the read timeout elapses.

use crate::error::BoxError;
use http::Uri;
use hyper::rt::{Read, ReadBufCursor, Write};
use hyper_util::client::legacy::connect::{Connected, Connection};
use pin_project_lite::pin_project;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::Sleep;
use tower::Service;

/// Connector that installs read/write timeouts on each new connection.
#[derive(Clone, Debug)]
pub struct TimeoutConnector<C> {
    inner: C,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
}

impl<C> TimeoutConnector<C> {
    /// `None` disables the corresponding timeout.
    #[must_use]
    pub fn new(inner: C, read_timeout: Option<Duration>, write_timeout: Option<Duration>) -> Self {
        Self {
            inner,
            read_timeout,
            write_timeout,
        }
    }
}

impl<C> Service<Uri> for TimeoutConnector<C>
where
    C: Service<Uri>,
    C::Response: Read + Write + Connection + Unpin + Send + 'static,
    C::Future: Send + 'static,
    C::Error: Into<BoxError>,
{
    type Response = TimeoutStream<C::Response>;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, uri: Uri) -> Self::Future {
        let connecting = self.inner.call(uri);
        let read_timeout = self.read_timeout;
        let write_timeout = self.write_timeout;

        Box::pin(async move {
            let io = connecting.await.map_err(Into::into)?;
            Ok(TimeoutStream::new(io, read_timeout, write_timeout))
        })
    }
}

/// Inactivity timer for one direction of a connection.
#[derive(Debug)]
struct Deadline {
    timeout: Option<Duration>,
    sleep: Option<Pin<Box<Sleep>>>,
    direction: &'static str,
}

impl Deadline {
    fn new(timeout: Option<Duration>, direction: &'static str) -> Self {
        Self {
            timeout,
            sleep: None,
            direction,
        }
    }

    fn reset(&mut self) {
        self.sleep = None;
    }

    /// Arm the timer on first call and register the waker; errors once elapsed.
    fn poll_elapsed(&mut self, cx: &mut Context<'_>) -> io::Result<()> {
        let Some(timeout) = self.timeout else {
            return Ok(());
        };

        let sleep = self
            .sleep
            .get_or_insert_with(|| Box::pin(tokio::time::sleep(timeout)));

        match sleep.as_mut().poll(cx) {
            Poll::Ready(()) => {
                self.sleep = None;
                Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!(
                        "{} timed out after {}",
                        self.direction,
                        humantime::format_duration(timeout)
                    ),
                ))
            }
            Poll::Pending => Ok(()),
        }
    }

    /// Shared bookkeeping for every poll of this direction.
    fn track<T>(&mut self, cx: &mut Context<'_>, poll: Poll<io::Result<T>>) -> Poll<io::Result<T>> {
        match poll {
            Poll::Pending => match self.poll_elapsed(cx) {
                Ok(()) => Poll::Pending,
                Err(e) => Poll::Ready(Err(e)),
            },
            ready @ Poll::Ready(_) => {
                self.reset();
                ready
            }
        }
    }
}

pin_project! {
    /// Connection wrapper enforcing read and write inactivity timeouts.
    #[derive(Debug)]
    pub struct TimeoutStream<S> {
        #[pin]
        inner: S,
        read: Deadline,
        write: Deadline,
    }
}

impl<S> TimeoutStream<S> {
    #[must_use]
    pub fn new(inner: S, read_timeout: Option<Duration>, write_timeout: Option<Duration>) -> Self {
        Self {
            inner,
            read: Deadline::new(read_timeout, "read"),
            write: Deadline::new(write_timeout, "write"),
        }
    }
}

impl<S: Read> Read for TimeoutStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: ReadBufCursor<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.project();
        let poll = this.inner.poll_read(cx, buf);
        this.read.track(cx, poll)
    }
}

impl<S: Write> Write for TimeoutStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.project();
        let poll = this.inner.poll_write(cx, buf);
        this.write.track(cx, poll)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.project();
        let poll = this.inner.poll_flush(cx);
        this.write.track(cx, poll)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_shutdown(cx)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let this = self.project();
        let poll = this.inner.poll_write_vectored(cx, bufs);
        this.write.track(cx, poll)
    }
}

impl<S: Connection> Connection for TimeoutStream<S> {
    fn connected(&self) -> Connected {
        self.inner.connected()
    }
}
