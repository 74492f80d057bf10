//! Authentication for the HTTP control surface (spec §4.8, §6 "HTTP control
//! surface"): Basic credentials or a Host/Net allow-list; read-only
//! credentials cannot POST actions.

use std::net::IpAddr;

use axum::http::HeaderMap;
use base64::Engine;
use ipnetwork::IpNetwork;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessLevel {
    Denied,
    ReadOnly,
    ReadWrite,
}

#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    pub read_write: Option<(String, String)>,
    pub read_only: Option<(String, String)>,
    pub allow_nets: Vec<IpNetwork>,
}

impl AuthConfig {
    /// No credentials and no allow-list means every request is trusted
    /// read-write — the default local/loopback-only posture Monit ships
    /// with before the admin configures `allow`/`credentials`.
    pub fn open() -> Self {
        Self::default()
    }

    pub fn evaluate(&self, headers: &HeaderMap, peer: IpAddr) -> AccessLevel {
        if self.allow_nets.iter().any(|net| net.contains(peer)) {
            return AccessLevel::ReadWrite;
        }

        if self.read_write.is_none() && self.read_only.is_none() && self.allow_nets.is_empty() {
            return AccessLevel::ReadWrite;
        }

        match basic_auth(headers) {
            Some((user, pass)) => {
                if self.read_write.as_ref().is_some_and(|(u, p)| *u == user && *p == pass) {
                    AccessLevel::ReadWrite
                } else if self.read_only.as_ref().is_some_and(|(u, p)| *u == user && *p == pass) {
                    AccessLevel::ReadOnly
                } else {
                    AccessLevel::Denied
                }
            }
            None => AccessLevel::Denied,
        }
    }
}

fn basic_auth(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = base64::engine::general_purpose::STANDARD.decode(encoded).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (user, pass) = text.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn basic_header(user: &str, pass: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let encoded = base64::engine::general_purpose::STANDARD.encode(format!("{user}:{pass}"));
        headers.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_str(&format!("Basic {encoded}")).unwrap());
        headers
    }

    #[test]
    fn open_config_trusts_everyone() {
        let auth = AuthConfig::open();
        assert_eq!(auth.evaluate(&HeaderMap::new(), "127.0.0.1".parse().unwrap()), AccessLevel::ReadWrite);
    }

    #[test]
    fn allow_listed_peer_is_read_write_without_credentials() {
        let auth = AuthConfig { allow_nets: vec!["192.168.1.0/24".parse().unwrap()], ..Default::default() };
        assert_eq!(auth.evaluate(&HeaderMap::new(), "192.168.1.5".parse().unwrap()), AccessLevel::ReadWrite);
        assert_eq!(auth.evaluate(&HeaderMap::new(), "10.0.0.1".parse().unwrap()), AccessLevel::Denied);
    }

    #[test]
    fn read_only_credentials_are_distinguished_from_read_write() {
        let auth = AuthConfig { read_write: Some(("admin".into(), "secret".into())), read_only: Some(("viewer".into(), "pw".into())), allow_nets: vec![] };
        let rw = basic_header("admin", "secret");
        let ro = basic_header("viewer", "pw");
        assert_eq!(auth.evaluate(&rw, "10.0.0.1".parse().unwrap()), AccessLevel::ReadWrite);
        assert_eq!(auth.evaluate(&ro, "10.0.0.1".parse().unwrap()), AccessLevel::ReadOnly);
    }

    #[test]
    fn unknown_credentials_are_denied() {
        let auth = AuthConfig { read_write: Some(("admin".into(), "secret".into())), ..Default::default() };
        let bad = basic_header("admin", "wrong");
        assert_eq!(auth.evaluate(&bad, "10.0.0.1".parse().unwrap()), AccessLevel::Denied);
    }
}
