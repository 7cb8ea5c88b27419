//! Websocket handshake.
//!
//! [RFC-6455 Section 4](https://datatracker.ietf.org/doc/html/rfc6455#section-4)
//!
//! One-shot negotiation that turns a raw byte stream into a
//! [`Conn`](crate::conn::Conn): the server side accepts an HTTP Upgrade
//! request ([`Upgrader`]), the client side dials ([`dial`], [`client`]).
//!
//! Example exchange:
//!
//! ```text
//! GET /ws HTTP/1.1
//! host: www.example.com
//! upgrade: websocket
//! connection: upgrade
//! sec-websocket-key: dGhlIHNhbXBsZSBub25jZQ==
//! sec-websocket-version: 13
//!
//! HTTP/1.1 101 Switching Protocols
//! upgrade: websocket
//! connection: upgrade
//! sec-websocket-accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=
//! ```

pub mod extension;
pub mod key;

mod client;
mod upgrader;

pub use client::{client, client_with_headers, dial, dial_with_headers};
pub use extension::{parse_extension_header, Extension};
pub use key::{derive_accept_key, new_sec_key};
pub use upgrader::{upgrade, RequestHandler, UpgradeHandler, UpgradeRequest, Upgrader};

use crate::error::{Error, HandshakeError};
use crate::transport::Transport;

/// 258EAFA5-E914-47DA-95CA-C5AB0DC85B11
pub const GUID: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Versions the server side accepts, in preference order.
pub const SUPPORTED_VERSIONS: &[&str] = &["13"];

/// Max decoded headers per message.
pub const MAX_ALLOW_HEADERS: usize = 32;

/// Cap on the handshake head, request line + headers + final CRLF.
pub const MAX_HEAD_SIZE: usize = 8192;

/// Read the HTTP head up to and including the blank line.
///
/// Reads one byte at a time so no frame bytes following the head are
/// consumed from the stream.
pub(crate) fn read_head<T: Transport + ?Sized>(io: &T, buf: &mut Vec<u8>) -> Result<(), Error> {
    let mut byte = [0u8; 1];
    while !buf.ends_with(b"\r\n\r\n") {
        if buf.len() >= MAX_HEAD_SIZE {
            return Err(HandshakeError::TooLarge.into());
        }
        crate::transport::read_full(io, &mut byte)?;
        buf.push(byte[0]);
    }
    Ok(())
}

/// Case-insensitive search for `token` in a comma-separated header
/// value, e.g. `Connection: keep-alive, Upgrade`.
pub(crate) fn contains_token(value: &str, token: &str) -> bool {
    value
        .split(',')
        .any(|part| part.trim().eq_ignore_ascii_case(token))
}

/// First value of `name` among parsed headers, case-insensitive.
pub(crate) fn header_value<'h>(headers: &'h [(String, String)], name: &str) -> Option<&'h str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn token_search() {
        assert!(contains_token("Upgrade", "upgrade"));
        assert!(contains_token("keep-alive, Upgrade", "upgrade"));
        assert!(contains_token("keep-alive , UPGRADE", "upgrade"));
        assert!(!contains_token("keep-alive", "upgrade"));
        assert!(!contains_token("upgraded", "upgrade"));
    }
}
