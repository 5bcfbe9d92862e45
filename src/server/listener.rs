//! Binding and serving the plaintext and TLS listeners.

use std::future::Future;
use std::io;
use std::net::SocketAddr;

use axum::Router;
use hyper::body::Incoming;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tower::Service;
use tracing::{debug, info};

/// Opens listening sockets.
pub trait Binder: Send + Sync {
    /// Bind a TCP listener on `addr`.
    fn bind(&self, addr: SocketAddr) -> impl Future<Output = io::Result<TcpListener>> + Send;
}

/// Binds real TCP sockets.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpBinder;

impl Binder for TcpBinder {
    async fn bind(&self, addr: SocketAddr) -> io::Result<TcpListener> {
        TcpListener::bind(addr).await
    }
}

/// Serve `router` over plain HTTP until the listener fails.
pub async fn serve_plaintext(listener: TcpListener, router: Router) -> io::Result<()> {
    axum::serve(listener, router).await
}

/// Serve `router` over TLS. Returns only on a listener-level failure.
///
/// Handshake and per-connection errors are logged and do not stop the
/// listener.
pub async fn serve_tls(listener: TcpListener, acceptor: TlsAcceptor, router: Router) -> io::Result<()> {
    info!(addr = ?listener.local_addr().ok(), "TLS listener accepting connections");

    loop {
        let (stream, peer) = listener.accept().await?;
        let acceptor = acceptor.clone();
        let router = router.clone();

        tokio::spawn(async move {
            let stream = match acceptor.accept(stream).await {
                Ok(stream) => stream,
                Err(e) => {
                    debug!(peer = %peer, error = %e, "TLS handshake failed");
                    return;
                }
            };

            let service = hyper::service::service_fn(move |request: Request<Incoming>| {
                router.clone().call(request)
            });

            if let Err(e) = auto::Builder::new(TokioExecutor::new())
                .serve_connection_with_upgrades(TokioIo::new(stream), service)
                .await
            {
                debug!(peer = %peer, error = %e, "TLS connection closed with error");
            }
        });
    }
}
