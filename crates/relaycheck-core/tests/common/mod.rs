//! Shared fixtures for validator tests.

#![allow(dead_code, clippy::unwrap_used)]

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use relaycheck_core::Network;
use relaycheck_target::{Credential, Server, SessionCounter, TargetConfig};
use tokio::net::TcpStream;

pub const USER: &str = "printer@local.test";
pub const PASSWORD: &str = "changeme";

/// Address every redirected name appears to resolve to.
pub const PUBLIC_IP: IpAddr = IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7));

#[derive(Debug, Default)]
pub struct Calls {
    pub resolves: AtomicUsize,
    pub connects: AtomicUsize,
    pub connected_to: Mutex<Option<SocketAddr>>,
}

impl Calls {
    pub fn resolves(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn connected_to(&self) -> Option<SocketAddr> {
        *self.connected_to.lock().unwrap()
    }
}

/// Resolves every name to fixed addresses and connects to a local socket
/// instead of the address it is handed.
#[derive(Debug, Clone)]
pub struct Redirect {
    target: SocketAddr,
    resolved: Option<Vec<IpAddr>>,
    pub calls: Arc<Calls>,
}

impl Redirect {
    pub fn to(target: SocketAddr) -> Self {
        Self::resolving(target, vec![PUBLIC_IP])
    }

    pub fn resolving(target: SocketAddr, resolved: Vec<IpAddr>) -> Self {
        Self {
            target,
            resolved: Some(resolved),
            calls: Arc::default(),
        }
    }

    /// A resolver that knows no names.
    pub fn unresolvable() -> Self {
        Self {
            target: SocketAddr::from(([127, 0, 0, 1], 9)),
            resolved: None,
            calls: Arc::default(),
        }
    }
}

impl Network for Redirect {
    async fn resolve(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        self.calls.resolves.fetch_add(1, Ordering::SeqCst);
        self.resolved.clone().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no such host: {host}"))
        })
    }

    async fn connect(&self, addr: SocketAddr) -> io::Result<TcpStream> {
        self.calls.connects.fetch_add(1, Ordering::SeqCst);
        *self.calls.connected_to.lock().unwrap() = Some(addr);
        TcpStream::connect(self.target).await
    }
}

pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../relaycheck-target/tests/fixtures")
        .join(name)
}

pub fn plain_target() -> TargetConfig {
    TargetConfig::new(SocketAddr::from(([127, 0, 0, 1], 0)))
}

pub fn tls_target() -> TargetConfig {
    plain_target().tls(fixture("cert.pem"), fixture("key.pem"))
}

/// Starts a test target and returns its address and session counter.
pub async fn start_target(config: TargetConfig) -> (SocketAddr, SessionCounter) {
    let server = Server::bind(config, Credential::new(USER, PASSWORD))
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    let sessions = server.sessions();
    tokio::spawn(server.run());
    (addr, sessions)
}

pub async fn wait_until_idle(sessions: &SessionCounter) {
    for _ in 0..200 {
        if sessions.active() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("sessions still active: {}", sessions.active());
}
