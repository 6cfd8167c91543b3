//! Request middleware for the HTTP transport.
//!
//! Each middleware receives the outgoing request and returns the request to
//! send instead. They run in registration order, so later middleware see the
//! changes made by earlier ones.
//!
//! ```rust,no_run
//! use chat_engine::{bearer_auth, middleware};
//!
//! let auth = bearer_auth("secret-token");
//! let tagged = middleware(|request| async move {
//!     Ok(request.with_header("X-Client", "docs"))
//! });
//! # let _ = (auth, tagged);
//! ```

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

use crate::Result;

/// An outgoing HTTP request before it is handed to the client.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Set a header, replacing any existing value with the same name.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.headers
            .retain(|(existing, _)| !existing.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[async_trait]
pub trait Middleware: Send + Sync {
    async fn apply(&self, request: HttpRequest) -> Result<HttpRequest>;
}

struct FnMiddleware<F>(F);

#[async_trait]
impl<F, Fut> Middleware for FnMiddleware<F>
where
    F: Fn(HttpRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HttpRequest>> + Send + 'static,
{
    async fn apply(&self, request: HttpRequest) -> Result<HttpRequest> {
        (self.0)(request).await
    }
}

/// Wrap an async closure as middleware.
pub fn middleware<F, Fut>(f: F) -> Arc<dyn Middleware>
where
    F: Fn(HttpRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HttpRequest>> + Send + 'static,
{
    Arc::new(FnMiddleware(f))
}

/// Middleware that adds an `Authorization: Bearer` header.
pub fn bearer_auth(token: impl Into<String>) -> Arc<dyn Middleware> {
    let value = format!("Bearer {}", token.into());
    middleware(move |request| {
        let value = value.clone();
        async move { Ok(request.with_header("Authorization", value)) }
    })
}

/// Run `request` through every middleware in order.
pub async fn apply_all(middleware: &[Arc<dyn Middleware>], mut request: HttpRequest) -> Result<HttpRequest> {
    for m in middleware {
        request = m.apply(request).await?;
    }
    Ok(request)
}
