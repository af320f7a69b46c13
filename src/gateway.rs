//! Inbound webhook validation: source-IP allow-listing against Telegram's published
//! networks, the optional secret-token check, body-size limits and JSON shape. Every
//! rejection is a typed error that the server maps onto an HTTP status.

use std::net::IpAddr;

use thiserror::Error;
use tracing::error;

use crate::telegram::Update;

/// Networks Telegram sends webhook updates from, IPv4 and IPv6, in CIDR form.
pub const TELEGRAM_NETS: &[&str] = &[
    "91.108.4.0/22",
    "91.108.8.0/22",
    "91.108.12.0/22",
    "91.108.16.0/22",
    "91.108.20.0/22",
    "91.108.56.0/22",
    "149.154.160.0/20",
    "2001:b28:f23d::/48",
    "2001:b28:f23f::/48",
    "2001:67c:4e8::/48",
];

/// Default cap on the webhook body, in bytes.
pub const DEFAULT_MAX_BODY_BYTES: usize = 1_048_576;

#[derive(Debug, Error, PartialEq)]
pub enum GatewayError {
    #[error("source address {0} is outside the Telegram networks")]
    ForbiddenIp(IpAddr),
    #[error("secret token mismatch")]
    InvalidToken,
    #[error("request body of {0} bytes exceeds the limit")]
    OversizedBody(usize),
    #[error("{0}")]
    BadRequest(String),
}

/// Validation settings, fixed at startup.
#[derive(Clone, Debug)]
pub struct GatewayPolicy {
    /// Expected `X-Telegram-Bot-Api-Secret-Token` value; `None` disables the check.
    pub secret: Option<String>,
    /// Maximum accepted body size in bytes.
    pub max_body_bytes: usize,
    /// Whether `X-Forwarded-For` may override the peer address.
    pub trust_forwarded: bool,
}

impl Default for GatewayPolicy {
    fn default() -> Self {
        Self {
            secret: None,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            trust_forwarded: false,
        }
    }
}

impl GatewayPolicy {
    /// Validates one inbound request and decodes its update.
    ///
    /// `forwarded_for` is the raw `X-Forwarded-For` value, `secret_token` the raw
    /// secret header, `declared_len` the client's `Content-Length`.
    pub fn validate(
        &self,
        peer: IpAddr,
        forwarded_for: Option<&str>,
        secret_token: Option<&str>,
        declared_len: Option<usize>,
        body: &[u8],
    ) -> Result<Update, GatewayError> {
        let remote = resolve_remote_ip(forwarded_for, peer, self.trust_forwarded);
        if !is_telegram_ip(remote) {
            error!("rejected request from {remote}");
            return Err(GatewayError::ForbiddenIp(remote));
        }

        if let Some(secret) = &self.secret {
            let presented = secret_token.unwrap_or("");
            if !constant_time_eq(secret.as_bytes(), presented.as_bytes()) {
                error!("rejected token {} from {remote}", mask_token(presented));
                return Err(GatewayError::InvalidToken);
            }
        }

        // The declared size alone is enough to refuse before reading further.
        if let Some(declared) = declared_len {
            if declared > self.max_body_bytes {
                return Err(GatewayError::OversizedBody(declared));
            }
        }
        if body.len() > self.max_body_bytes {
            return Err(GatewayError::OversizedBody(body.len()));
        }

        if body.iter().all(|b| b.is_ascii_whitespace()) {
            error!("empty request body from {remote}");
            return Err(GatewayError::BadRequest("empty request body".into()));
        }

        let update: Update = serde_json::from_slice(body).map_err(|err| {
            error!("undecodable update from {remote}: {err}");
            GatewayError::BadRequest(format!("malformed JSON: {err}"))
        })?;
        if update.message.is_none() {
            error!("update {} carries no message", update.update_id);
            return Err(GatewayError::BadRequest("missing message field".into()));
        }
        Ok(update)
    }
}

/// Picks the address to validate: the first `X-Forwarded-For` hop when the proxy is
/// trusted and the value parses, the socket peer otherwise.
pub fn resolve_remote_ip(forwarded_for: Option<&str>, peer: IpAddr, trust_forwarded: bool) -> IpAddr {
    if !trust_forwarded {
        return peer;
    }
    forwarded_for
        .and_then(|value| value.split(',').next())
        .and_then(|first| first.trim().parse().ok())
        .unwrap_or(peer)
}

/// True when `ip` falls inside any of [`TELEGRAM_NETS`].
pub fn is_telegram_ip(ip: IpAddr) -> bool {
    TELEGRAM_NETS.iter().any(|net| ip_in_cidr(ip, net))
}

/// Prefix match of `ip` against a CIDR range, either address family. Malformed
/// ranges and cross-family comparisons are false, never an error.
pub fn ip_in_cidr(ip: IpAddr, cidr: &str) -> bool {
    let Some((subnet, prefix)) = cidr.split_once('/') else {
        return false;
    };
    let Ok(subnet) = subnet.parse::<IpAddr>() else {
        return false;
    };
    let Ok(prefix) = prefix.parse::<u32>() else {
        return false;
    };
    match (ip, subnet) {
        (IpAddr::V4(ip), IpAddr::V4(subnet)) => masked_eq(&ip.octets(), &subnet.octets(), prefix),
        (IpAddr::V6(ip), IpAddr::V6(subnet)) => masked_eq(&ip.octets(), &subnet.octets(), prefix),
        _ => false,
    }
}

fn masked_eq(ip: &[u8], subnet: &[u8], prefix: u32) -> bool {
    if prefix > ip.len() as u32 * 8 {
        return false;
    }
    let full = (prefix / 8) as usize;
    let bits = prefix % 8;
    if ip[..full] != subnet[..full] {
        return false;
    }
    if bits == 0 {
        return true;
    }
    let mask = 0xffu8 << (8 - bits);
    (ip[full] & mask) == (subnet[full] & mask)
}

// Comparison time must not depend on where the strings diverge.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn mask_token(token: &str) -> String {
    if token.is_empty() {
        String::new()
    } else {
        let prefix: String = token.chars().take(4).collect();
        format!("{prefix}***")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TELEGRAM_PEER: &str = "149.154.160.17";

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn cidr_v4() {
        assert!(ip_in_cidr(ip("149.154.160.1"), "149.154.160.0/20"));
        assert!(ip_in_cidr(ip("149.154.175.255"), "149.154.160.0/20"));
        assert!(!ip_in_cidr(ip("149.154.176.0"), "149.154.160.0/20"));
        assert!(ip_in_cidr(ip("10.1.2.3"), "0.0.0.0/0"));
        assert!(ip_in_cidr(ip("91.108.4.7"), "91.108.4.7/32"));
        assert!(!ip_in_cidr(ip("91.108.4.8"), "91.108.4.7/32"));
    }

    #[test]
    fn cidr_v6() {
        assert!(ip_in_cidr(ip("2001:b28:f23d::1"), "2001:b28:f23d::/48"));
        assert!(!ip_in_cidr(ip("2001:b28:f23e::1"), "2001:b28:f23d::/48"));
    }

    #[test]
    fn cidr_rejects_malformed_and_cross_family() {
        assert!(!ip_in_cidr(ip("10.0.0.1"), "10.0.0.0"));
        assert!(!ip_in_cidr(ip("10.0.0.1"), "10.0.0.0/33"));
        assert!(!ip_in_cidr(ip("10.0.0.1"), "not-an-ip/8"));
        assert!(!ip_in_cidr(ip("10.0.0.1"), "2001:b28:f23d::/48"));
        assert!(!ip_in_cidr(ip("2001:b28:f23d::1"), "10.0.0.0/8"));
    }

    #[test]
    fn telegram_ranges() {
        assert!(is_telegram_ip(ip(TELEGRAM_PEER)));
        assert!(is_telegram_ip(ip("91.108.56.99")));
        assert!(is_telegram_ip(ip("2001:67c:4e8::5")));
        assert!(!is_telegram_ip(ip("8.8.8.8")));
        assert!(!is_telegram_ip(ip("::1")));
    }

    #[test]
    fn forwarded_header_requires_trust() {
        let peer = ip("127.0.0.1");
        assert_eq!(peer, resolve_remote_ip(Some(TELEGRAM_PEER), peer, false));
        assert_eq!(
            ip(TELEGRAM_PEER),
            resolve_remote_ip(Some(TELEGRAM_PEER), peer, true)
        );
        // First hop wins; garbage falls back to the peer.
        assert_eq!(
            ip(TELEGRAM_PEER),
            resolve_remote_ip(Some("149.154.160.17, 10.0.0.1"), peer, true)
        );
        assert_eq!(peer, resolve_remote_ip(Some("garbage"), peer, true));
        assert_eq!(peer, resolve_remote_ip(None, peer, true));
    }

    #[test]
    fn rejects_foreign_ip() {
        let policy = GatewayPolicy::default();
        let err = policy
            .validate(ip("8.8.8.8"), None, None, None, b"{}")
            .unwrap_err();
        assert_eq!(GatewayError::ForbiddenIp(ip("8.8.8.8")), err);
    }

    #[test]
    fn secret_token_check() {
        let policy = GatewayPolicy {
            secret: Some("s3cret".into()),
            ..GatewayPolicy::default()
        };
        let err = policy
            .validate(ip(TELEGRAM_PEER), None, Some("wrong"), None, b"{}")
            .unwrap_err();
        assert_eq!(GatewayError::InvalidToken, err);
        let err = policy
            .validate(ip(TELEGRAM_PEER), None, None, None, b"{}")
            .unwrap_err();
        assert_eq!(GatewayError::InvalidToken, err);

        let update = policy.validate(
            ip(TELEGRAM_PEER),
            None,
            Some("s3cret"),
            None,
            br#"{"update_id": 1, "message": {"chat": {"id": 5}, "text": "hi"}}"#,
        );
        assert!(update.is_ok());
    }

    #[test]
    fn oversized_body() {
        let policy = GatewayPolicy {
            max_body_bytes: 16,
            ..GatewayPolicy::default()
        };
        let err = policy
            .validate(ip(TELEGRAM_PEER), None, None, Some(1000), b"{}")
            .unwrap_err();
        assert_eq!(GatewayError::OversizedBody(1000), err);
        let body = [b'x'; 17];
        let err = policy
            .validate(ip(TELEGRAM_PEER), None, None, None, &body)
            .unwrap_err();
        assert_eq!(GatewayError::OversizedBody(17), err);
    }

    #[test]
    fn malformed_bodies() {
        let policy = GatewayPolicy::default();
        assert_eq!(
            GatewayError::BadRequest("empty request body".into()),
            policy
                .validate(ip(TELEGRAM_PEER), None, None, None, b"  \n")
                .unwrap_err()
        );
        assert!(matches!(
            policy
                .validate(ip(TELEGRAM_PEER), None, None, None, b"{not json")
                .unwrap_err(),
            GatewayError::BadRequest(_)
        ));
        assert_eq!(
            GatewayError::BadRequest("missing message field".into()),
            policy
                .validate(ip(TELEGRAM_PEER), None, None, None, br#"{"update_id": 3}"#)
                .unwrap_err()
        );
    }

    #[test]
    fn accepts_valid_update() {
        let policy = GatewayPolicy::default();
        let update = policy
            .validate(
                ip(TELEGRAM_PEER),
                None,
                None,
                Some(58),
                br#"{"update_id": 1, "message": {"chat": {"id": 5}, "text": "hi"}}"#,
            )
            .unwrap();
        assert_eq!(5, update.message.unwrap().chat.id);
    }

    #[test]
    fn constant_time_eq_basics() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn token_masking() {
        assert_eq!("", mask_token(""));
        assert_eq!("ab***", mask_token("ab"));
        assert_eq!("abcd***", mask_token("abcdefgh"));
    }
}
