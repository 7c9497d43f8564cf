use crate::client::{BufferedService, map_buffer_error};
use crate::error::{HttpError, InvalidUriKind};
use crate::multi_value::MultiValueMap;
use crate::response::HttpResponse;
use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, Method, Request};
use http_body_util::Full;
use serde::Serialize;
use tower::{Service, ServiceExt};
use url::Url;

#[derive(Clone, Debug)]
enum BodyKind {
    Empty,
    Bytes(Bytes),
    Json(Bytes),
}

/// Builder for a single request against the client's base URL.
///
/// Created by [`Client::request`](crate::Client::request). Invalid header
/// names or values are remembered and reported by [`send`](Self::send).
#[must_use = "RequestBuilder does nothing until .send() is called"]
pub struct RequestBuilder {
    service: BufferedService,
    max_body_size: usize,
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: BodyKind,
    error: Option<HttpError>,
}

impl RequestBuilder {
    pub(crate) fn new(
        service: BufferedService,
        max_body_size: usize,
        method: Method,
        url: Url,
    ) -> Self {
        Self {
            service,
            max_body_size,
            method,
            url,
            headers: HeaderMap::new(),
            body: BodyKind::Empty,
            error: None,
        }
    }

    /// Append every `(key, value)` pair as a query parameter.
    ///
    /// Keys are emitted in map order and values in list order; keys with no
    /// values are skipped.
    pub fn query(mut self, params: &MultiValueMap) -> Self {
        let mut pairs = params.pairs().peekable();
        if pairs.peek().is_some() {
            self.url.query_pairs_mut().extend_pairs(pairs);
        }
        self
    }

    /// Append a single header value.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if self.error.is_some() {
            return self;
        }

        match parse_header(name, value) {
            Ok((name, value)) => {
                self.headers.append(name, value);
            }
            Err(e) => self.error = Some(e),
        }
        self
    }

    /// Set each listed header to exactly the given values.
    ///
    /// Earlier values of the same name are replaced, including defaults the
    /// client would otherwise add. Keys with no values are skipped.
    pub fn headers(mut self, headers: &MultiValueMap) -> Self {
        if self.error.is_some() {
            return self;
        }

        for (name, values) in headers.iter().filter(|(_, v)| !v.is_empty()) {
            let name = match HeaderName::try_from(name) {
                Ok(name) => name,
                Err(e) => {
                    self.error = Some(HttpError::InvalidHeaderName(e));
                    return self;
                }
            };

            self.headers.remove(&name);
            for value in values {
                match HeaderValue::try_from(value.as_str()) {
                    Ok(value) => {
                        self.headers.append(name.clone(), value);
                    }
                    Err(e) => {
                        self.error = Some(HttpError::InvalidHeaderValue(e));
                        return self;
                    }
                }
            }
        }
        self
    }

    /// Serialize `body` as JSON and use it as the payload.
    ///
    /// `Content-Type: application/json` is added at send time unless a
    /// content type header was set.
    ///
    /// # Errors
    /// Returns a pending header error, or `HttpError::Serialize` if
    /// serialization fails.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, HttpError> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }

        let bytes = serde_json::to_vec(body).map_err(HttpError::Serialize)?;
        self.body = BodyKind::Json(Bytes::from(bytes));
        Ok(self)
    }

    /// Use raw bytes as the payload; no content type is implied.
    pub fn body_bytes(mut self, body: impl Into<Bytes>) -> Self {
        self.body = BodyKind::Bytes(body.into());
        self
    }

    /// Final URL including query parameters.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Dispatch the request and wait for the response head.
    ///
    /// Resolves with `Ok` for every status; use the [`HttpResponse`] helpers
    /// to check the status and read the body.
    ///
    /// # Errors
    /// Returns deferred builder errors, transport and timeout errors.
    pub async fn send(mut self) -> Result<HttpResponse, HttpError> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }

        let uri: http::Uri = self
            .url
            .as_str()
            .parse()
            .map_err(|e: http::uri::InvalidUri| HttpError::InvalidUri {
                url: self.url.to_string(),
                kind: InvalidUriKind::ParseError,
                reason: e.to_string(),
            })?;

        let body = match self.body {
            BodyKind::Empty => Bytes::new(),
            BodyKind::Json(b) => {
                if !self.headers.contains_key(CONTENT_TYPE) {
                    self.headers
                        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                }
                b
            }
            BodyKind::Bytes(b) => b,
        };

        let mut request = Request::builder()
            .method(self.method)
            .uri(uri)
            .body(Full::new(body))?;
        *request.headers_mut() = self.headers;

        let inner = self
            .service
            .ready()
            .await
            .map_err(map_buffer_error)?
            .call(request)
            .await
            .map_err(map_buffer_error)?;

        Ok(HttpResponse {
            inner,
            max_body_size: self.max_body_size,
        })
    }
}

fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), HttpError> {
    Ok((HeaderName::try_from(name)?, HeaderValue::try_from(value)?))
}
