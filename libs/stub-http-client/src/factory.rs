use crate::client::{BufferedService, Client};
use crate::config::{ClientConfig, DEFAULT_USER_AGENT};
use crate::connector::TimeoutConnector;
use crate::error::{BoxError, HttpError};
use crate::layers::{ConnectionLimitLayer, TraceLayer, UserAgentLayer};
use crate::response::ResponseBody;
use crate::tls::build_https_connector;
use bytes::Bytes;
use http::Response;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::sync::Arc;
use std::time::Duration;
use tower::buffer::Buffer;
use tower::{ServiceBuilder, ServiceExt};

/// Upper bound on buffered response bodies.
pub const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Requests queued in front of the stack before callers wait.
const BUFFER_CAPACITY: usize = 1024;

/// Builds configured [`Client`] instances.
///
/// Stateless: every call yields a client with its own connection pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientFactory;

impl ClientFactory {
    /// Build a client for `config`.
    ///
    /// Must be called from within a tokio runtime: the client's dispatch
    /// worker is spawned onto the current runtime.
    ///
    /// # Errors
    ///
    /// Configuration errors for an unusable `config` (see
    /// [`ClientConfig::validate`]); `HttpError::Tls` if the TLS setup fails
    /// and `HttpError::Construction` outside a tokio runtime.
    pub fn create_client(config: &ClientConfig) -> Result<Client, HttpError> {
        let base_url = config.validate()?;
        let pool_name: Arc<str> = config.pool_name().into();

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| HttpError::Construction(format!("no tokio runtime available: {e}")))?;

        if config.danger_accept_invalid_certs {
            tracing::warn!(
                pool = %pool_name,
                "TLS certificate verification disabled (dangerAcceptInvalidCerts); \
                 use only against stub servers"
            );
        }

        let mut http = HttpConnector::new();
        http.enforce_http(false);
        http.set_nodelay(true);
        http.set_connect_timeout(enabled(config.connection_timeout));

        let https = build_https_connector(http, config.danger_accept_invalid_certs)?;
        let connector = TimeoutConnector::new(
            https,
            enabled(config.read_timeout),
            enabled(config.write_timeout),
        );

        // pool_timer drives idle eviction; None disables it.
        let mut builder = HyperClient::builder(TokioExecutor::new());
        builder
            .pool_timer(TokioTimer::new())
            .pool_idle_timeout(config.max_idle_time);
        if let Some(max) = config.max_connections {
            builder.pool_max_idle_per_host(max);
        }
        let hyper_client = builder.build::<_, Full<Bytes>>(connector);

        // Request flow (outer to inner):
        //   Buffer -> Trace -> ConnectionLimit? -> UserAgent -> hyper_client
        let service = ServiceBuilder::new()
            .layer(UserAgentLayer::try_new(DEFAULT_USER_AGENT)?)
            .service(hyper_client)
            .map_response(box_response_body)
            .map_err(HttpError::from);
        let mut service = service.boxed_clone();

        if let Some(max) = config.max_connections {
            service = ServiceBuilder::new()
                .layer(ConnectionLimitLayer::new(max))
                .service(service)
                .boxed_clone();
        }

        let service = ServiceBuilder::new()
            .layer(TraceLayer::new(Arc::clone(&pool_name)))
            .service(service)
            .boxed_clone();

        let (service, worker): (BufferedService, _) = Buffer::pair(service, BUFFER_CAPACITY);
        runtime.spawn(worker);

        tracing::debug!(
            pool = %pool_name,
            url = %base_url,
            max_connections = ?config.max_connections,
            max_idle_time = ?config.max_idle_time,
            connection_timeout = ?config.connection_timeout,
            read_timeout = ?config.read_timeout,
            write_timeout = ?config.write_timeout,
            "HTTP client created"
        );

        Ok(Client {
            service,
            base_url: Arc::new(base_url),
            pool_name,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        })
    }
}

/// Zero disables a timeout.
fn enabled(timeout: Duration) -> Option<Duration> {
    (!timeout.is_zero()).then_some(timeout)
}

fn box_response_body(response: Response<Incoming>) -> Response<ResponseBody> {
    response.map(|body| body.map_err(|e| -> BoxError { Box::new(e) }).boxed())
}
