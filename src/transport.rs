// Copyright 2026 scylla-proto contributors
// SPDX-License-Identifier: Apache-2.0

//! The socket abstraction connections are opened over: plain TCP, or (with the `tls` feature)
//! TLS over TCP. Owned exclusively by a connection's actor for reads (§5 Resource scoping);
//! writes may be issued from caller context when the underlying transport tolerates concurrent
//! send/recv, or funneled through the actor otherwise.

use crate::error::{ConnectionError, Error};
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};

/// How long a connect attempt may take before it's considered failed.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// The socket a connection actor drives. Boxed so TLS and plain TCP share one call surface.
pub struct Transport {
    inner: Pin<Box<dyn AsyncReadWrite>>,
}

trait AsyncReadWrite: AsyncRead + AsyncWrite + Send {}
impl<T: AsyncRead + AsyncWrite + Send> AsyncReadWrite for T {}

impl Transport {
    /// Open a plain TCP connection to `addr` with the 5-second connect timeout of §4.D.
    pub async fn connect_tcp(addr: SocketAddr) -> Result<Self, Error> {
        let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::Connection(ConnectionError::ConnectFailed("connect timed out".into())))?
            .map_err(|e| Error::Connection(ConnectionError::ConnectFailed(e.to_string())))?;
        stream.set_nodelay(true).ok();
        Ok(Self { inner: Box::pin(stream) })
    }

    /// Wrap an already-established async stream (e.g. a TLS session) as a [`Transport`].
    pub fn from_stream<S: AsyncRead + AsyncWrite + Send + 'static>(stream: S) -> Self {
        Self { inner: Box::pin(stream) }
    }
}

impl AsyncRead for Transport {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        self.inner.as_mut().poll_read(cx, buf)
    }
}

impl AsyncWrite for Transport {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<std::io::Result<usize>> {
        self.inner.as_mut().poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        self.inner.as_mut().poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        self.inner.as_mut().poll_shutdown(cx)
    }
}

#[cfg(feature = "tls")]
pub mod tls {
    //! TLS transport construction, gated behind the `tls` feature (encryption flag of §6).

    use super::*;
    use std::sync::Arc;
    use tokio_rustls::rustls::{ClientConfig, ServerName};
    use tokio_rustls::TlsConnector;

    /// Wrap a plain TCP connection to `addr` in a TLS session using `config`.
    pub async fn connect_tls(
        addr: SocketAddr,
        server_name: &str,
        config: Arc<ClientConfig>,
    ) -> Result<Transport, Error> {
        let tcp = timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::Connection(ConnectionError::ConnectFailed("connect timed out".into())))?
            .map_err(|e| Error::Connection(ConnectionError::ConnectFailed(e.to_string())))?;
        let connector = TlsConnector::from(config);
        let name = ServerName::try_from(server_name)
            .map_err(|e| Error::Connection(ConnectionError::ConnectFailed(e.to_string())))?;
        let stream = connector
            .connect(name, tcp)
            .await
            .map_err(|e| Error::Connection(ConnectionError::ConnectFailed(e.to_string())))?;
        Ok(Transport::from_stream(stream))
    }
}
