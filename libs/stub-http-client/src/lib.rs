#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Configurable HTTP client for talking to stub servers
//!
//! This crate provides a hyper-based HTTP client with:
//! - Declarative configuration ([`ClientConfig`]) loadable from YAML and env
//! - Connection pooling with optional connection cap and idle eviction
//! - Connect, read and write timeouts
//! - rustls TLS, with an explicit accept-any-certificate mode for stubs
//! - A [`TestClient`] with one-call helpers for request/response round trips
//!
//! # Example
//!
//! ```ignore
//! use stub_http_client::{ClientConfig, MultiValueMap, TestClient};
//! use http::Method;
//!
//! let stub = TestClient::with_config(ClientConfig {
//!     url: "http://localhost:8089".to_owned(),
//!     ..ClientConfig::for_testing()
//! })?;
//!
//! let mut params = MultiValueMap::new();
//! params.add("page", "1");
//!
//! let items: Option<Vec<Item>> = stub
//!     .call_with_response(Method::GET, "/items", Some(&params), None)
//!     .await?;
//! stub.call_with_body(Method::POST, "/items", None, None, Some(&new_item))
//!     .await?;
//! ```

mod client;
pub mod config;
mod connector;
mod error;
mod factory;
mod layers;
mod multi_value;
mod request;
mod response;
mod runtime;
mod test_client;
mod tls;

pub use client::Client;
pub use config::{ClientConfig, DEFAULT_STUB_URL, DEFAULT_USER_AGENT};
pub use error::{BoxError, ErrorKind, HttpError, InvalidUriKind};
pub use factory::{ClientFactory, DEFAULT_MAX_BODY_SIZE};
pub use multi_value::MultiValueMap;
pub use request::RequestBuilder;
pub use response::{ERROR_BODY_PREVIEW_LIMIT, HttpResponse, ResponseBody};
pub use runtime::run_blocking;
pub use test_client::TestClient;
