//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};

use quota_proxy::config::ProxyConfig;
use quota_proxy::net::{ConnectionTracker, Listener, ProxyContext};
use quota_proxy::{QuotaLedger, Shutdown};

/// A proxy running on an ephemeral loopback port.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub ledger: Arc<QuotaLedger>,
    pub tracker: ConnectionTracker,
    shutdown: Shutdown,
}

impl TestProxy {
    pub async fn connect(&self) -> TcpStream {
        TcpStream::connect(self.addr).await.unwrap()
    }
}

impl Drop for TestProxy {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start a proxy sharing `ledger`, with short timeouts suitable for tests.
pub async fn start_proxy(ledger: Arc<QuotaLedger>) -> TestProxy {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.timeouts.idle_secs = 2;
    config.timeouts.connect_secs = 2;
    config.timeouts.first_read_secs = 2;

    let listener = Listener::bind(&config.listener).unwrap();
    let addr = listener.local_addr();
    let ctx = Arc::new(ProxyContext::new(Arc::clone(&ledger), &config));
    let tracker = ConnectionTracker::new();
    let shutdown = Shutdown::new();

    tokio::spawn(listener.serve(ctx, tracker.clone(), shutdown.subscribe()));

    TestProxy {
        addr,
        ledger,
        tracker,
        shutdown,
    }
}

/// Start an upstream that echoes every byte back.
#[allow(dead_code)]
pub async fn start_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let (mut rd, mut wr) = socket.split();
                        let _ = tokio::io::copy(&mut rd, &mut wr).await;
                    });
                }
                Err(_) => break,
            }
        }
    });
    addr
}

/// Start an upstream that reports the first chunk it receives, then answers
/// with a fixed HTTP response and closes.
#[allow(dead_code)]
pub async fn start_capturing_backend(response: &'static str) -> (SocketAddr, mpsc::UnboundedReceiver<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        let mut buf = vec![0u8; 4096];
                        let n = socket.read(&mut buf).await.unwrap_or(0);
                        buf.truncate(n);
                        let _ = tx.send(buf);

                        let response_str = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            response.len(),
                            response
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });
    (addr, rx)
}

/// Start an upstream that only counts accepted connections.
#[allow(dead_code)]
pub async fn start_counting_backend() -> (SocketAddr, Arc<AtomicUsize>, broadcast::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let (stop_tx, mut stop_rx) = broadcast::channel(1);

    let counter = Arc::clone(&accepted);
    tokio::spawn(async move {
        loop {
            tokio::select! {
                res = listener.accept() => match res {
                    Ok(_) => {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(_) => break,
                },
                _ = stop_rx.recv() => break,
            }
        }
    });
    (addr, accepted, stop_tx)
}

/// Read until the peer closes.
#[allow(dead_code)]
pub async fn read_to_close(stream: &mut TcpStream) -> Vec<u8> {
    let mut out = Vec::new();
    let _ = stream.read_to_end(&mut out).await;
    out
}
