use crate::client::Client;
use crate::config::ClientConfig;
use crate::error::HttpError;
use crate::factory::ClientFactory;
use crate::multi_value::MultiValueMap;
use crate::request::RequestBuilder;
use http::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Convenience client for driving a stub server from tests.
///
/// Holds one [`Client`] for its whole lifetime. [`TestClient::new`] targets
/// the local stub at `http://localhost:10001`; use [`TestClient::with_config`]
/// for a server started on a dynamic port.
///
/// ```ignore
/// let stub = TestClient::with_config(ClientConfig {
///     url: server.base_url(),
///     ..ClientConfig::for_testing()
/// })?;
/// let greeting: Option<String> = stub
///     .call_with_response(Method::GET, "/hello", None, None)
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct TestClient {
    client: Client,
    config: ClientConfig,
}

impl TestClient {
    /// Client for the default local stub server.
    ///
    /// # Errors
    /// Same as [`ClientFactory::create_client`].
    pub fn new() -> Result<Self, HttpError> {
        Self::with_config(ClientConfig::for_testing())
    }

    /// # Errors
    /// Same as [`ClientFactory::create_client`].
    pub fn with_config(config: ClientConfig) -> Result<Self, HttpError> {
        let client = ClientFactory::create_client(&config)?;
        Ok(Self { client, config })
    }

    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Call and decode the response body as `T`; an empty body is `None`.
    ///
    /// # Errors
    /// Request-kind errors for transport failures, timeouts and non-2xx
    /// statuses; `HttpError::Decode` if the body does not fit `T`.
    pub async fn call_with_response<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: Option<&MultiValueMap>,
        headers: Option<&MultiValueMap>,
    ) -> Result<Option<T>, HttpError> {
        self.prepare(method, path, params, headers)
            .send()
            .await?
            .decode()
            .await
    }

    /// Call and drain the response body without decoding it.
    ///
    /// # Errors
    /// Request-kind errors for transport failures, timeouts and non-2xx statuses.
    pub async fn call_without_response(
        &self,
        method: Method,
        path: &str,
        params: Option<&MultiValueMap>,
        headers: Option<&MultiValueMap>,
    ) -> Result<(), HttpError> {
        self.prepare(method, path, params, headers)
            .send()
            .await?
            .discard()
            .await
    }

    /// Call with an optional JSON payload and drain the response body.
    ///
    /// Without a body the type parameter still needs naming, e.g.
    /// `call_with_body::<()>(Method::DELETE, "/items/1", None, None, None)`.
    ///
    /// # Errors
    /// Request-kind errors for serialization failures, transport failures,
    /// timeouts and non-2xx statuses.
    pub async fn call_with_body<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        params: Option<&MultiValueMap>,
        headers: Option<&MultiValueMap>,
        body: Option<&B>,
    ) -> Result<(), HttpError> {
        let mut request = self.prepare(method, path, params, headers);
        if let Some(body) = body {
            request = request.json(body)?;
        }
        request.send().await?.discard().await
    }

    fn prepare(
        &self,
        method: Method,
        path: &str,
        params: Option<&MultiValueMap>,
        headers: Option<&MultiValueMap>,
    ) -> RequestBuilder {
        let mut request = self.client.request(method, path);
        if let Some(params) = params {
            request = request.query(params);
        }
        if let Some(headers) = headers {
            request = request.headers(headers);
        }
        request
    }
}
