//! Panic capture for app invocations.
//!
//! A panicking request handler must not silently kill its connection task:
//! the panic is captured and turned into a [`WorkerError`] so the configured
//! error policy sees it like any returned error.

use futures::FutureExt;
use hyper::body::Incoming;
use hyper::{Request, Response};
use std::panic::{catch_unwind, AssertUnwindSafe};

use super::{App, ResponseBody};
use crate::cluster::WorkerError;

/// Invoke the app, converting returned errors and panics into [`WorkerError`].
pub(crate) async fn call_app(
    app: &dyn App,
    req: Request<Incoming>,
) -> Result<Response<ResponseBody>, WorkerError> {
    // The call itself may panic before any future exists.
    let future = match catch_unwind(AssertUnwindSafe(|| app.call(req))) {
        Ok(future) => future,
        Err(payload) => return Err(WorkerError::panicked(extract_panic_message(&payload))),
    };

    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(err)) => Err(WorkerError::returned(err.to_string())),
        Err(payload) => Err(WorkerError::panicked(extract_panic_message(&payload))),
    }
}

/// Extract panic message from panic payload.
pub(crate) fn extract_panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic (no message)".to_string()
    }
}
