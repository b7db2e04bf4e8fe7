//! HTTP client for the assistant backend.

mod auth;
mod error;
mod http;
mod transport;

#[cfg(test)]
pub(crate) mod mock;

pub use auth::{StoredToken, TokenStore};
pub use error::ClientError;
pub use http::{ApiClient, RequestOptions};
pub use transport::{HttpRequest, HttpResponse, Method, ReqwestTransport, Transport};
