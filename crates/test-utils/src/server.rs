//! Loopback HTTP servers for acquisition tests.
//!
//! A [`FakeServer`] serves an axum router on `127.0.0.1` with an OS-assigned
//! port and stops when dropped.

use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub struct FakeServer {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl FakeServer {
    /// Bind and start serving `router` in the background.
    pub async fn start(router: Router) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind loopback listener");
        let addr = listener.local_addr().expect("listener address");

        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });

        Self { addr, handle }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Absolute URL for a path on this server.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}/{}", self.addr, path.trim_start_matches('/'))
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// A loopback URL nothing is listening on.
pub fn refused_url(path: &str) -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind loopback listener");
    let addr = listener.local_addr().expect("listener address");
    drop(listener);
    format!("http://{}/{}", addr, path.trim_start_matches('/'))
}
