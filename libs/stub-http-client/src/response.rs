use crate::error::{BoxError, HttpError};
use bytes::Bytes;
use http::{HeaderMap, Response, StatusCode};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::de::value::{Error as ValueError, StrDeserializer};
use serde::de::{self, Deserializer as _, Visitor};
use serde_json::de::SliceRead;

/// Maximum number of body bytes kept in error previews.
pub const ERROR_BODY_PREVIEW_LIMIT: usize = 8 * 1024;

/// Type-erased response body produced by the client stack.
pub type ResponseBody = http_body_util::combinators::BoxBody<Bytes, BoxError>;

/// Response wrapper with body-reading helpers.
///
/// Every body read enforces the client's body size limit. `send()` resolves
/// for any status; status checks happen in [`error_for_status`],
/// [`checked_bytes`], [`decode`] and [`discard`].
///
/// [`error_for_status`]: HttpResponse::error_for_status
/// [`checked_bytes`]: HttpResponse::checked_bytes
/// [`decode`]: HttpResponse::decode
/// [`discard`]: HttpResponse::discard
#[derive(Debug)]
pub struct HttpResponse {
    pub(crate) inner: Response<ResponseBody>,
    pub(crate) max_body_size: usize,
}

impl HttpResponse {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.inner.status()
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Fail on non-2xx without reading the body.
    ///
    /// # Errors
    /// Returns `HttpError::HttpStatus` with an empty preview if the status is not 2xx.
    pub fn error_for_status(self) -> Result<Self, HttpError> {
        if self.inner.status().is_success() {
            return Ok(self);
        }

        Err(HttpError::HttpStatus {
            status: self.inner.status(),
            body_preview: String::new(),
            content_type: content_type(self.inner.headers()),
        })
    }

    /// Read the whole body regardless of status.
    ///
    /// # Errors
    /// Returns `HttpError::BodyTooLarge` if the body exceeds the limit, or a
    /// transport / timeout error if the connection fails mid-body.
    pub async fn bytes(self) -> Result<Bytes, HttpError> {
        read_body_limited(self.inner, self.max_body_size).await
    }

    /// Read the whole body, failing on non-2xx with a body preview.
    ///
    /// # Errors
    /// Returns `HttpError::HttpStatus` if the status is not 2xx, plus the
    /// errors of [`bytes`](Self::bytes).
    pub async fn checked_bytes(self) -> Result<Bytes, HttpError> {
        let response = check_status(self.inner, self.max_body_size).await?;
        read_body_limited(response, self.max_body_size).await
    }

    /// Decode the body into `T`.
    ///
    /// An empty body yields `None`. String targets receive the raw body text,
    /// quotes included, whatever the content type. Other targets are parsed
    /// as JSON; a UTF-8 body that is not JSON is offered to them as a plain
    /// string, so `serde_json::Value` still accepts `text/plain` replies.
    ///
    /// # Errors
    /// Returns `HttpError::Decode` if the body cannot be converted, plus the
    /// errors of [`checked_bytes`](Self::checked_bytes).
    pub async fn decode<T: DeserializeOwned>(self) -> Result<Option<T>, HttpError> {
        let body = self.checked_bytes().await?;
        decode_body(&body)
    }

    /// Fail on non-2xx, then drain the body without buffering it.
    ///
    /// # Errors
    /// Returns `HttpError::HttpStatus` if the status is not 2xx, or a
    /// transport / timeout error if the connection fails mid-body.
    pub async fn discard(self) -> Result<(), HttpError> {
        let response = check_status(self.inner, self.max_body_size).await?;
        let mut body = std::pin::pin!(response.into_body());

        while let Some(frame) = body.frame().await {
            frame.map_err(HttpError::from_transport)?;
        }
        Ok(())
    }
}

/// Pass 2xx responses through; turn anything else into `HttpStatus` with a preview.
async fn check_status(
    response: Response<ResponseBody>,
    max_body_size: usize,
) -> Result<Response<ResponseBody>, HttpError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let content_type = content_type(response.headers());

    // A body larger than the preview must not hide the status error.
    let preview_limit = max_body_size.min(ERROR_BODY_PREVIEW_LIMIT);
    let body_preview = match read_body_limited(response, preview_limit).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(HttpError::BodyTooLarge { .. }) => "<body too large for preview>".to_owned(),
        Err(e) => return Err(e),
    };

    Err(HttpError::HttpStatus {
        status,
        body_preview,
        content_type,
    })
}

async fn read_body_limited(
    response: Response<ResponseBody>,
    limit: usize,
) -> Result<Bytes, HttpError> {
    let mut body = std::pin::pin!(response.into_body());
    let mut collected = Vec::new();

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(HttpError::from_transport)?;
        if let Some(chunk) = frame.data_ref() {
            let actual = collected.len() + chunk.len();
            if actual > limit {
                return Err(HttpError::BodyTooLarge { limit, actual });
            }
            collected.extend_from_slice(chunk);
        }
    }

    Ok(Bytes::from(collected))
}

fn content_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

fn preview(body: &[u8]) -> String {
    let end = body.len().min(ERROR_BODY_PREVIEW_LIMIT);
    String::from_utf8_lossy(&body[..end]).into_owned()
}

/// Convert a complete response body into `T`; see [`HttpResponse::decode`].
///
/// # Errors
/// Returns `HttpError::Decode` if neither JSON nor the plain-text fallback fits `T`.
pub fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<Option<T>, HttpError> {
    if body.is_empty() {
        return Ok(None);
    }

    let mut deserializer = BodyDeserializer::new(body);
    let parsed = T::deserialize(&mut deserializer);
    match parsed.and_then(|value| deserializer.finish().map(|()| value)) {
        Ok(value) => Ok(Some(value)),
        Err(source) => {
            if let Ok(text) = std::str::from_utf8(body)
                && let Ok(value) = T::deserialize(StrDeserializer::<ValueError>::new(text))
            {
                return Ok(Some(value));
            }
            Err(HttpError::Decode {
                source,
                body_preview: preview(body),
            })
        }
    }
}

/// JSON deserializer that answers string requests with the raw body.
struct BodyDeserializer<'de> {
    raw: &'de [u8],
    json: serde_json::Deserializer<SliceRead<'de>>,
    raw_taken: bool,
}

impl<'de> BodyDeserializer<'de> {
    fn new(raw: &'de [u8]) -> Self {
        Self {
            raw,
            json: serde_json::Deserializer::from_slice(raw),
            raw_taken: false,
        }
    }

    fn raw_text(&mut self) -> Result<&'de str, serde_json::Error> {
        self.raw_taken = true;
        std::str::from_utf8(self.raw)
            .map_err(|e| de::Error::custom(format_args!("response body is not UTF-8: {e}")))
    }

    /// Trailing input is only an error when the body went through JSON.
    fn finish(mut self) -> Result<(), serde_json::Error> {
        if self.raw_taken {
            return Ok(());
        }
        self.json.end()
    }
}

macro_rules! forward_to_json {
    ($($method:ident)*) => {$(
        fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
            (&mut self.json).$method(visitor)
        }
    )*};
}

impl<'de> de::Deserializer<'de> for &mut BodyDeserializer<'de> {
    type Error = serde_json::Error;

    forward_to_json! {
        deserialize_any deserialize_bool
        deserialize_i8 deserialize_i16 deserialize_i32 deserialize_i64 deserialize_i128
        deserialize_u8 deserialize_u16 deserialize_u32 deserialize_u64 deserialize_u128
        deserialize_f32 deserialize_f64 deserialize_char
        deserialize_bytes deserialize_byte_buf deserialize_option deserialize_unit
        deserialize_seq deserialize_map deserialize_identifier deserialize_ignored_any
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_borrowed_str(self.raw_text()?)
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_borrowed_str(self.raw_text()?)
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        (&mut self.json).deserialize_unit_struct(name, visitor)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        (&mut self.json).deserialize_newtype_struct(name, visitor)
    }

    fn deserialize_tuple<V: Visitor<'de>>(
        self,
        len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        (&mut self.json).deserialize_tuple(len, visitor)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        (&mut self.json).deserialize_tuple_struct(name, len, visitor)
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        (&mut self.json).deserialize_struct(name, fields, visitor)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        (&mut self.json).deserialize_enum(name, variants, visitor)
    }
}
