//! HTTP/HTTPS listener that runs inside each worker.
//!
//! The supervisor treats this layer as a collaborator: it hands over a
//! listen configuration, an [`App`] and an [`UncaughtErrorHook`], and the
//! server does the rest.

mod recovery;
mod server;
pub mod tls;

pub use server::{bind, HttpServer};

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use std::future::Future;
use std::pin::Pin;

use crate::cluster::WorkerError;

/// Response body type produced by apps.
pub type ResponseBody = Full<Bytes>;

/// Error an app may return instead of a response.
pub type AppError = Box<dyn std::error::Error + Send + Sync>;

/// Outcome of one app invocation.
pub type AppResult = std::result::Result<Response<ResponseBody>, AppError>;

/// Boxed future returned by [`App::call`].
pub type AppFuture = Pin<Box<dyn Future<Output = AppResult> + Send>>;

/// The request handler served by every worker.
///
/// Implemented for any `Fn(Request<Incoming>) -> impl Future<Output = AppResult>`.
pub trait App: Send + Sync + 'static {
    fn call(&self, req: Request<Incoming>) -> AppFuture;
}

impl<F, Fut> App for F
where
    F: Fn(Request<Incoming>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AppResult> + Send + 'static,
{
    fn call(&self, req: Request<Incoming>) -> AppFuture {
        Box::pin(self(req))
    }
}

/// Receives every error the app did not handle itself.
#[async_trait]
pub trait UncaughtErrorHook: Send + Sync {
    async fn uncaught(&self, error: WorkerError);
}

/// Plain-text response helper.
pub fn text(status: StatusCode, body: impl Into<Bytes>) -> Response<ResponseBody> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}
