//! Connection strings typed in, scanned from a QR code or carried in a
//! deep link.
//!
//! Accepted forms:
//!
//! ```text
//! 10.0.0.5                 bare IPv4, port from the backend kind
//! 10.0.0.5:7777            IPv4 and port
//! 10.0.0.5:7778/mobile     with a request path
//! ws://10.0.0.5:7778/mobile
//! ```
//!
//! A `ws://` prefix forces the message backend. Encrypted `wss://` hosts
//! are not supported.

use std::net::Ipv4Addr;

use mobcast_transport::{DEFAULT_MESSAGE_PATH, Endpoint, TransportKind};

use crate::ProtocolError;

const WS_SCHEME: &str = "ws://";
const WSS_SCHEME: &str = "wss://";

/// Parses a connection string into an [`Endpoint`].
///
/// `default_kind` is the backend the runtime selected; it decides the
/// endpoint kind (unless the input says `ws://`) and the port used when
/// none is given. Paths only matter for message endpoints and default
/// to `/mobile`.
pub fn parse_connection_string(
    input: &str,
    default_kind: TransportKind,
) -> Result<Endpoint, ProtocolError> {
    let invalid = |reason: &str| ProtocolError::InvalidConnectionString {
        input: input.to_owned(),
        reason: reason.to_owned(),
    };

    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(invalid("empty"));
    }
    if strip_scheme(trimmed, WSS_SCHEME).is_some() {
        return Err(invalid("wss:// is not supported"));
    }

    let (kind, rest) = match strip_scheme(trimmed, WS_SCHEME) {
        Some(rest) => (TransportKind::Message, rest),
        None => (default_kind, trimmed),
    };

    let (authority, path) = match rest.find('/') {
        Some(slash) => rest.split_at(slash),
        None => (rest, ""),
    };

    let (host, port) = match authority.split_once(':') {
        Some((host, port)) => {
            let port = parse_port(port)
                .ok_or_else(|| invalid("port must be 1-65535"))?;
            (host, port)
        }
        None => (authority, kind.default_port()),
    };

    if host.parse::<Ipv4Addr>().is_err() {
        return Err(invalid("host must be a dotted-quad IPv4 address"));
    }

    Ok(match kind {
        TransportKind::Stream => Endpoint::stream(host, port),
        TransportKind::Message => {
            let path = if path.is_empty() || path == "/" {
                DEFAULT_MESSAGE_PATH
            } else {
                path
            };
            Endpoint::message(host, port, path)
        }
    })
}

fn strip_scheme<'a>(input: &'a str, scheme: &str) -> Option<&'a str> {
    let head = input.get(..scheme.len())?;
    head.eq_ignore_ascii_case(scheme)
        .then(|| &input[scheme.len()..])
}

fn parse_port(raw: &str) -> Option<u16> {
    match raw.parse::<u16>() {
        Ok(0) | Err(_) => None,
        Ok(port) => Some(port),
    }
}
