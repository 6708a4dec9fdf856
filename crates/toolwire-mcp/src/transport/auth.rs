//! Bearer-token decoration of the HTTP client.
//!
//! The HTTP transports never build requests on a bare `reqwest::Client`; they go
//! through [`AuthorizedClient`], which adds `Authorization: Bearer <token>` to
//! every request when a token is configured. The token therefore travels in a
//! header only and is never part of the dialed URL.

use reqwest::{Client, IntoUrl, RequestBuilder};

#[derive(Clone)]
pub struct AuthorizedClient {
    inner: Client,
    token: Option<String>,
}

impl AuthorizedClient {
    pub fn new(inner: Client) -> Self {
        Self { inner, token: None }
    }

    /// Inject `Authorization: Bearer <token>` on every request
    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.token = if token.is_empty() { None } else { Some(token) };
        self
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    pub fn get<U: IntoUrl>(&self, url: U) -> RequestBuilder {
        self.decorate(self.inner.get(url))
    }

    pub fn post<U: IntoUrl>(&self, url: U) -> RequestBuilder {
        self.decorate(self.inner.post(url))
    }

    pub fn delete<U: IntoUrl>(&self, url: U) -> RequestBuilder {
        self.decorate(self.inner.delete(url))
    }

    fn decorate(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

impl std::fmt::Debug for AuthorizedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizedClient")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
