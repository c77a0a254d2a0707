//! Worker listener - socket setup, accept loop and per-connection HTTP/1.1.

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioIo, TokioTimer};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpSocket};
use tokio_rustls::TlsAcceptor;
use tracing::Instrument;

use super::recovery::call_app;
use super::{text, App, ResponseBody, UncaughtErrorHook};
use crate::types::{AdvancedServerOptions, Error, ListenConfig, Result};

/// Bind the worker's listening socket.
///
/// Every worker binds the same address; `SO_REUSEPORT` lets the kernel
/// spread incoming connections across them.
pub async fn bind(listen: &ListenConfig) -> Result<TcpListener> {
    let target = format!("{}:{}", listen.hostname, listen.port);
    let addr = tokio::net::lookup_host((listen.hostname.as_str(), listen.port))
        .await
        .map_err(|e| Error::listen(format!("cannot resolve {}: {}", target, e)))?
        .next()
        .ok_or_else(|| Error::listen(format!("{} resolved to no addresses", target)))?;

    let listen_err = |e: std::io::Error| Error::listen(format!("{}: {}", addr, e));

    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(listen_err)?;
    socket.set_reuseaddr(true).map_err(listen_err)?;
    #[cfg(unix)]
    socket.set_reuseport(true).map_err(listen_err)?;
    socket.bind(addr).map_err(listen_err)?;
    socket.listen(listen.backlog).map_err(listen_err)
}

/// State shared by every connection of one worker.
struct Shared {
    app: Arc<dyn App>,
    errors: Arc<dyn UncaughtErrorHook>,
    advanced: AdvancedServerOptions,
}

impl Shared {
    async fn handle(&self, req: Request<Incoming>) -> Response<ResponseBody> {
        match call_app(self.app.as_ref(), req).await {
            Ok(response) => response,
            Err(err) => {
                self.errors.uncaught(err).await;
                text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
        }
    }
}

/// HTTP/1.1 server over an already bound listener.
pub struct HttpServer {
    listener: TcpListener,
    tls: Option<TlsAcceptor>,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for HttpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpServer")
            .field("listener", &self.listener)
            .field("tls", &self.tls.is_some())
            .finish()
    }
}

impl HttpServer {
    pub fn new(
        listener: TcpListener,
        app: Arc<dyn App>,
        errors: Arc<dyn UncaughtErrorHook>,
        advanced: AdvancedServerOptions,
    ) -> Self {
        Self {
            listener,
            tls: None,
            shared: Arc::new(Shared {
                app,
                errors,
                advanced,
            }),
        }
    }

    /// Terminate TLS on every accepted connection.
    pub fn with_tls(mut self, acceptor: TlsAcceptor) -> Self {
        self.tls = Some(acceptor);
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until an accept error occurs.
    pub async fn serve(self) -> Result<()> {
        tracing::info!(
            "http_server_listening on {} (tls={})",
            self.listener.local_addr()?,
            self.tls.is_some(),
        );

        loop {
            let (stream, peer) = self.listener.accept().await?;
            let shared = self.shared.clone();
            let tls = self.tls.clone();

            tokio::spawn(async move {
                let served = match tls {
                    Some(acceptor) => match acceptor.accept(stream).await {
                        Ok(stream) => serve_connection(stream, shared).await,
                        Err(e) => {
                            tracing::debug!("tls_handshake_failed from {}: {}", peer, e);
                            return;
                        }
                    },
                    None => serve_connection(stream, shared).await,
                };
                if let Err(e) = served {
                    tracing::debug!("connection from {} error: {}", peer, e);
                }
            }
            .in_current_span());
        }
    }
}

async fn serve_connection<S>(
    stream: S,
    shared: Arc<Shared>,
) -> std::result::Result<(), hyper::Error>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut builder = http1::Builder::new();
    builder.keep_alive(shared.advanced.keep_alive);
    if let Some(timeout) = shared.advanced.header_read_timeout {
        builder.timer(TokioTimer::new()).header_read_timeout(timeout);
    }

    let service = service_fn(move |req| {
        let shared = shared.clone();
        async move { Ok::<_, Infallible>(shared.handle(req).await) }
    });

    builder.serve_connection(TokioIo::new(stream), service).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ListeningCallback;

    fn listen(hostname: &str, port: u16) -> ListenConfig {
        ListenConfig {
            port,
            hostname: hostname.to_string(),
            backlog: 16,
            on_listening: ListeningCallback::default(),
        }
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let listener = bind(&listen("127.0.0.1", 0)).await.unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_two_listeners_share_one_port() {
        let first = bind(&listen("127.0.0.1", 0)).await.unwrap();
        let port = first.local_addr().unwrap().port();

        let second = bind(&listen("127.0.0.1", port)).await.unwrap();
        assert_eq!(second.local_addr().unwrap().port(), port);
    }

    #[tokio::test]
    async fn test_unresolvable_host_is_listen_error() {
        let err = bind(&listen("no such host.invalid", 8080)).await.unwrap_err();
        assert!(matches!(err, Error::Listen(_)));
    }
}
