//! TCP listener for the exposition server that dies on descriptor exhaustion.
//!
//! When `accept` fails because the process (EMFILE) or the system (ENFILE)
//! ran out of file descriptors, retrying cannot succeed until someone raises
//! the limit, and the accept loop would spin on the same error forever. The
//! [`FailFastListener`] logs the condition and terminates the process
//! instead. Every other accept error is handed back to the caller unchanged.
//! Accepted connections get TCP keep-alive so half-open scrape connections
//! are eventually detected.

use axum::serve::Listener;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tracing::{debug, error};

/// Keep-alive probe period of accepted connections.
pub const KEEP_ALIVE_PERIOD: Duration = Duration::from_secs(3 * 60);

const ACCEPT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Invoked when accept reports descriptor exhaustion.
pub type ExhaustionHook = Arc<dyn Fn(&io::Error) + Send + Sync>;

/// Streams that can have TCP keep-alive enabled.
pub trait KeepAlive {
    fn set_keepalive(&self, period: Duration) -> io::Result<()>;
}

impl KeepAlive for TcpStream {
    fn set_keepalive(&self, period: Duration) -> io::Result<()> {
        use nix::sys::socket::{setsockopt, sockopt};

        setsockopt(self, sockopt::KeepAlive, &true)?;

        #[cfg(any(target_os = "linux", target_os = "android"))]
        {
            let secs = u32::try_from(period.as_secs()).unwrap_or(u32::MAX);
            setsockopt(self, sockopt::TcpKeepIdle, &secs)?;
            setsockopt(self, sockopt::TcpKeepInterval, &secs)?;
        }
        #[cfg(not(any(target_os = "linux", target_os = "android")))]
        let _ = period;

        Ok(())
    }
}

/// Source of inbound connections.
pub trait Acceptor: Send + 'static {
    type Stream: AsyncRead + AsyncWrite + KeepAlive + Unpin + Send + 'static;

    fn accept(&mut self) -> impl Future<Output = io::Result<(Self::Stream, SocketAddr)>> + Send;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

impl Acceptor for TcpListener {
    type Stream = TcpStream;

    async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpListener::local_addr(self)
    }
}

/// True for errors meaning no file descriptor could be allocated.
pub fn is_descriptor_exhaustion(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(libc::EMFILE) | Some(libc::ENFILE))
}

fn is_connection_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
    )
}

fn terminate(err: &io::Error) {
    error!(error = %err, "running out of file descriptors");
    std::process::exit(1);
}

pub struct FailFastListener<A = TcpListener> {
    inner: A,
    on_exhaustion: ExhaustionHook,
}

impl FailFastListener<TcpListener> {
    pub async fn bind(addr: impl ToSocketAddrs) -> io::Result<Self> {
        Ok(Self::new(TcpListener::bind(addr).await?))
    }
}

impl<A: Acceptor> FailFastListener<A> {
    /// Wraps `inner`; descriptor exhaustion terminates the process.
    pub fn new(inner: A) -> Self {
        Self {
            inner,
            on_exhaustion: Arc::new(terminate),
        }
    }

    /// Replaces the termination behaviour.
    pub fn with_exhaustion_hook(mut self, hook: impl Fn(&io::Error) + Send + Sync + 'static) -> Self {
        self.on_exhaustion = Arc::new(hook);
        self
    }

    /// Accepts one connection.
    ///
    /// Descriptor exhaustion runs the exhaustion hook (which by default never
    /// returns); any other error is returned as is.
    pub async fn accept_checked(&mut self) -> io::Result<(A::Stream, SocketAddr)> {
        match self.inner.accept().await {
            Ok((stream, addr)) => {
                if let Err(e) = stream.set_keepalive(KEEP_ALIVE_PERIOD) {
                    debug!(peer = %addr, error = %e, "failed to enable keep-alive");
                }
                Ok((stream, addr))
            }
            Err(e) => {
                if is_descriptor_exhaustion(&e) {
                    (self.on_exhaustion)(&e);
                }
                Err(e)
            }
        }
    }
}

impl<A: Acceptor> Listener for FailFastListener<A> {
    type Io = A::Stream;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        loop {
            match self.accept_checked().await {
                Ok(conn) => return conn,
                Err(e) if is_connection_error(&e) => continue,
                Err(e) => {
                    error!(error = %e, "accept error");
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                }
            }
        }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        self.inner.local_addr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::DuplexStream;

    impl KeepAlive for DuplexStream {
        fn set_keepalive(&self, _period: Duration) -> io::Result<()> {
            Ok(())
        }
    }

    /// Replays a fixed sequence of accept outcomes.
    struct ScriptedAcceptor {
        script: VecDeque<io::Result<()>>,
    }

    impl ScriptedAcceptor {
        fn new(script: impl IntoIterator<Item = io::Result<()>>) -> Self {
            Self {
                script: script.into_iter().collect(),
            }
        }
    }

    impl Acceptor for ScriptedAcceptor {
        type Stream = DuplexStream;

        async fn accept(&mut self) -> io::Result<(DuplexStream, SocketAddr)> {
            let addr: SocketAddr = "127.0.0.1:40000".parse().unwrap();
            match self.script.pop_front() {
                Some(Ok(())) => Ok((tokio::io::duplex(64).0, addr)),
                Some(Err(e)) => Err(e),
                None => Err(io::Error::new(io::ErrorKind::Other, "script exhausted")),
            }
        }

        fn local_addr(&self) -> io::Result<SocketAddr> {
            Ok("127.0.0.1:9128".parse().unwrap())
        }
    }

    fn counting_listener(
        script: impl IntoIterator<Item = io::Result<()>>,
    ) -> (FailFastListener<ScriptedAcceptor>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let listener = FailFastListener::new(ScriptedAcceptor::new(script))
            .with_exhaustion_hook(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            });
        (listener, calls)
    }

    #[test]
    fn test_exhaustion_classification() {
        assert!(is_descriptor_exhaustion(&io::Error::from_raw_os_error(libc::EMFILE)));
        assert!(is_descriptor_exhaustion(&io::Error::from_raw_os_error(libc::ENFILE)));
        assert!(!is_descriptor_exhaustion(&io::Error::from_raw_os_error(libc::ECONNABORTED)));
        assert!(!is_descriptor_exhaustion(&io::Error::new(io::ErrorKind::Other, "boom")));
    }

    #[tokio::test]
    async fn test_ordinary_error_is_returned() {
        let (mut listener, calls) = counting_listener([Err(io::Error::from(
            io::ErrorKind::ConnectionReset,
        ))]);

        let err = listener.accept_checked().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_emfile_runs_exhaustion_hook() {
        let (mut listener, calls) =
            counting_listener([Err(io::Error::from_raw_os_error(libc::EMFILE))]);

        let err = listener.accept_checked().await.unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EMFILE));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_serve_loop_skips_connection_errors() {
        let (mut listener, calls) = counting_listener([
            Err(io::Error::from(io::ErrorKind::ConnectionAborted)),
            Ok(()),
        ]);

        let (_stream, addr) = Listener::accept(&mut listener).await;
        assert_eq!(addr.port(), 40000);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_accepted_tcp_connection_has_keepalive() {
        use nix::sys::socket::{getsockopt, sockopt};

        let mut listener = FailFastListener::bind("127.0.0.1:0").await.unwrap();
        let addr = Acceptor::local_addr(&listener.inner).unwrap();
        let client = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });

        let (stream, _) = listener.accept_checked().await.unwrap();
        assert!(getsockopt(&stream, sockopt::KeepAlive).unwrap());
        #[cfg(target_os = "linux")]
        assert_eq!(
            getsockopt(&stream, sockopt::TcpKeepIdle).unwrap(),
            KEEP_ALIVE_PERIOD.as_secs() as u32
        );

        drop(client.await.unwrap());
    }
}
