//! `Probe`: the black-box `check(socket) -> ok | fails(reason)` collaborator
//! spec §1 names for each wire protocol (HTTP, IMAP, MySQL, PostgreSQL, …).
//! One concrete probe is implemented — a plain TCP connect, which is also
//! the foundation every protocol probe in the original builds on before
//! speaking its own handshake.

use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::error::ProbeError;

/// What a `port`-kind Rule (spec §3) checks against.
pub trait Probe: Send + Sync {
    /// Attempt the protocol exchange against `target`, returning `Ok(())`
    /// on success or a `ProbeError` describing why the check failed.
    fn check(&self, target: &str, timeout: Duration) -> Result<(), ProbeError>;

    fn name(&self) -> &'static str;
}

/// Resolves `target` (host:port) and attempts a bare TCP connect within
/// `timeout`. This is the one concrete, fully working probe (spec §1); the
/// richer application-level probes are represented by [`StubProtocolProbe`].
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnectProbe;

impl Probe for TcpConnectProbe {
    fn check(&self, target: &str, timeout: Duration) -> Result<(), ProbeError> {
        let addr = resolve_one(target)?;
        TcpStream::connect_timeout(&addr, timeout).map_err(ProbeError::Connect)?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "port"
    }
}

fn resolve_one(target: &str) -> Result<SocketAddr, ProbeError> {
    target
        .to_socket_addrs()
        .map_err(ProbeError::Connect)?
        .next()
        .ok_or_else(|| ProbeError::Connect(std::io::Error::new(std::io::ErrorKind::NotFound, "no address resolved")))
}

/// Application-level probes (HTTP, IMAP, MySQL, PostgreSQL, …) are each a
/// black-box `Probe` collaborator per spec §1; this workspace does not
/// implement their handshakes, so each reports [`ProbeError::NotImplemented`]
/// rather than silently succeeding.
#[derive(Debug, Clone, Copy)]
pub struct StubProtocolProbe(pub &'static str);

impl Probe for StubProtocolProbe {
    fn check(&self, _target: &str, _timeout: Duration) -> Result<(), ProbeError> {
        Err(ProbeError::NotImplemented(self.0))
    }

    fn name(&self) -> &'static str {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn tcp_connect_probe_succeeds_against_a_listening_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let probe = TcpConnectProbe;
        assert!(probe.check(&addr.to_string(), Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn tcp_connect_probe_fails_against_a_closed_port() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let probe = TcpConnectProbe;
        assert!(probe.check(&addr.to_string(), Duration::from_millis(200)).is_err());
    }

    #[test]
    fn stub_protocol_probe_reports_not_implemented() {
        let probe = StubProtocolProbe("http");
        let err = probe.check("example.com:80", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ProbeError::NotImplemented("http")));
    }
}
