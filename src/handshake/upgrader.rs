//! Server-side upgrade.
//!
//! [RFC-6455 Section 4.2](https://datatracker.ietf.org/doc/html/rfc6455#section-4.2)

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use url::Url;

use super::extension::{parse_extension_header, Extension};
use super::key::derive_accept_key;
use super::{contains_token, header_value, read_head};
use super::{MAX_ALLOW_HEADERS, SUPPORTED_VERSIONS};
use crate::conn::{Conn, UserValue};
use crate::error::{Error, HandshakeError};
use crate::frame::{acquire_buf, release_buf};
use crate::transport::{write_full, Transport};

const SWITCHING_PROTOCOLS: &[u8] = b"HTTP/1.1 101 Switching Protocols\r\n";
const BAD_REQUEST: &[u8] = b"HTTP/1.1 400 Bad Request\r\n\r\n";
const FORBIDDEN: &[u8] = b"HTTP/1.1 403 Forbidden\r\n\r\n";
const SERVER_ERROR: &[u8] = b"HTTP/1.1 500 Internal Server Error\r\n\r\n";

/// Runs on the established connection after a successful upgrade.
pub type RequestHandler<T> = dyn Fn(Arc<Conn<T>>) + Send + Sync;

/// Custom predicate consulted before upgrading. Returning `false`
/// rejects the request with `403`.
pub type UpgradeHandler = dyn Fn(&mut UpgradeRequest<'_>) -> bool + Send + Sync;

/// A parsed upgrade request, as seen by the [`UpgradeHandler`].
///
/// Values attached with [`set_user_value`](Self::set_user_value) are
/// copied into the connection and retrievable with
/// [`Conn::user_value`].
pub struct UpgradeRequest<'a> {
    path: &'a str,
    headers: &'a [(String, String)],
    extensions: &'a [Extension],
    user_values: HashMap<String, UserValue>,
}

impl UpgradeRequest<'_> {
    #[inline]
    pub fn path(&self) -> &str { self.path }

    #[inline]
    pub fn headers(&self) -> &[(String, String)] { self.headers }

    /// First value of `name`, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> { header_value(self.headers, name) }

    /// Parsed `Sec-WebSocket-Extensions` offers. Informational only;
    /// no extension is applied.
    #[inline]
    pub fn extensions(&self) -> &[Extension] { self.extensions }

    /// Attach a value that the connection handler can read back.
    pub fn set_user_value<V: Any + Send + Sync>(&mut self, key: &str, value: V) {
        self.user_values.insert(key.to_owned(), Arc::new(value));
    }
}

/// Upgrades an HTTP connection to a websocket connection if possible,
/// then executes `handler`.
pub struct Upgrader<T: Transport> {
    /// Handler for established connections.
    pub handler: Arc<RequestHandler<T>>,

    /// Optional predicate; `false` refuses the upgrade.
    pub upgrade_handler: Option<Arc<UpgradeHandler>>,

    /// Accepted subprotocols, in preference order.
    pub protocols: Vec<String>,

    /// When set, the request `Origin` must equal this URI's
    /// `scheme://host` (ASCII case-insensitive).
    pub origin: Option<String>,

    /// Reserved for `permessage-deflate`; offers are parsed but the
    /// extension is never applied.
    pub compress: bool,
}

impl<T: Transport> Upgrader<T> {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(Arc<Conn<T>>) + Send + Sync + 'static,
    {
        Upgrader {
            handler: Arc::new(handler),
            upgrade_handler: None,
            protocols: Vec::new(),
            origin: None,
            compress: false,
        }
    }

    /// Accept the upgrade and run the connection handler. The
    /// connection is closed when the handler returns.
    pub fn upgrade(&self, io: T) -> Result<(), Error> {
        let conn = Arc::new(self.accept(io)?);
        (self.handler)(conn.clone());
        let _ = conn.close();
        Ok(())
    }

    /// Accept the upgrade and hand back the established connection
    /// without invoking the handler.
    ///
    /// On rejection the appropriate HTTP error status is written to the
    /// stream before this returns the error.
    pub fn accept(&self, io: T) -> Result<Conn<T>, Error> {
        let mut head = acquire_buf();
        let res = self.negotiate(&io, &mut head);
        release_buf(head);

        let user_values = res?;
        let conn = Conn::server(io);
        conn.set_user_values(user_values);
        Ok(conn)
    }

    fn negotiate(
        &self,
        io: &T,
        head: &mut Vec<u8>,
    ) -> Result<HashMap<String, UserValue>, Error> {
        read_head(io, head)?;

        let mut storage = [httparse::EMPTY_HEADER; MAX_ALLOW_HEADERS];
        let mut request = httparse::Request::new(&mut storage);
        match request.parse(head) {
            Ok(httparse::Status::Complete(_)) => {}
            Ok(httparse::Status::Partial) => {
                return Err(reject(io, BAD_REQUEST, HandshakeError::TooLarge))
            }
            Err(e) => return Err(reject(io, BAD_REQUEST, e.into())),
        }

        if request.method != Some("GET") {
            return Err(reject(io, BAD_REQUEST, HandshakeError::HttpMethod));
        }
        if request.version != Some(1) {
            return Err(reject(io, BAD_REQUEST, HandshakeError::HttpVersion));
        }
        let path = request.path.unwrap_or("/").to_owned();

        let headers: Vec<(String, String)> = request
            .headers
            .iter()
            .map(|h| {
                (
                    h.name.to_owned(),
                    String::from_utf8_lossy(h.value).into_owned(),
                )
            })
            .collect();

        // connection: ... upgrade ... (the header may repeat)
        let has_upgrade_token = headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case("connection"))
            .any(|(_, v)| contains_token(v, "upgrade"));
        if !has_upgrade_token {
            return Err(reject(io, BAD_REQUEST, HandshakeError::Connection));
        }

        match header_value(&headers, "upgrade") {
            Some(v) if v.eq_ignore_ascii_case("websocket") => {}
            _ => return Err(reject(io, BAD_REQUEST, HandshakeError::Upgrade)),
        }

        match header_value(&headers, "sec-websocket-version") {
            Some(v) if SUPPORTED_VERSIONS.contains(&v.trim()) => {}
            _ => {
                return Err(reject(
                    io,
                    BAD_REQUEST,
                    HandshakeError::SecWebSocketVersion,
                ))
            }
        }

        let sec_key = match header_value(&headers, "sec-websocket-key") {
            Some(v) if !v.is_empty() => v.to_owned(),
            _ => return Err(reject(io, BAD_REQUEST, HandshakeError::SecWebSocketKey)),
        };

        if let Some(allowed) = &self.origin {
            let expected = match origin_of(allowed) {
                Ok(expected) => expected,
                Err(e) => return Err(reject(io, SERVER_ERROR, e)),
            };
            match header_value(&headers, "origin") {
                Some(origin) if origin.eq_ignore_ascii_case(&expected) => {}
                _ => return Err(reject(io, FORBIDDEN, HandshakeError::OriginMismatch)),
            }
        }

        let extensions: Vec<Extension> = headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case("sec-websocket-extensions"))
            .flat_map(|(_, v)| parse_extension_header(v))
            .collect();
        if extensions.iter().any(Extension::is_permessage_deflate) {
            debug!("peer offered permessage-deflate; offer ignored");
        }

        let mut upgrade_request = UpgradeRequest {
            path: &path,
            headers: &headers,
            extensions: &extensions,
            user_values: HashMap::new(),
        };
        if let Some(check) = &self.upgrade_handler {
            if !check(&mut upgrade_request) {
                return Err(reject(io, FORBIDDEN, HandshakeError::Rejected));
            }
        }
        let user_values = upgrade_request.user_values;

        let offers: Vec<String> = headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case("sec-websocket-protocol"))
            .flat_map(|(_, v)| v.split(','))
            .map(|p| p.trim().to_owned())
            .filter(|p| !p.is_empty())
            .collect();

        let accept = derive_accept_key(sec_key.as_bytes());

        let mut response = Vec::with_capacity(256);
        response.extend_from_slice(SWITCHING_PROTOCOLS);
        response.extend_from_slice(b"upgrade: websocket\r\n");
        response.extend_from_slice(b"connection: upgrade\r\n");
        response.extend_from_slice(b"sec-websocket-accept: ");
        response.extend_from_slice(&accept);
        response.extend_from_slice(b"\r\n");
        if let Some(proto) = select_protocol(&offers, &self.protocols) {
            response.extend_from_slice(b"sec-websocket-protocol: ");
            response.extend_from_slice(proto.as_bytes());
            response.extend_from_slice(b"\r\n");
        }
        response.extend_from_slice(b"\r\n");

        write_full(io, &response)?;

        debug!("connection upgraded (path: {})", path);
        Ok(user_values)
    }
}

/// Convenience wrapper: accept one upgrade on `io` with a plain
/// handler and default negotiation settings.
pub fn upgrade<T, F>(io: T, handler: F) -> Result<(), Error>
where
    T: Transport,
    F: Fn(Arc<Conn<T>>) + Send + Sync + 'static,
{
    Upgrader::new(handler).upgrade(io)
}

fn reject<T: Transport>(io: &T, status: &[u8], e: HandshakeError) -> Error {
    let _ = write_full(io, status);
    debug!("upgrade rejected: {}", e);
    e.into()
}

// scheme://host[:port] of the configured origin URI
fn origin_of(uri: &str) -> Result<String, HandshakeError> {
    let url = Url::parse(uri).map_err(|_| HandshakeError::BadUrl)?;
    let host = url.host_str().ok_or(HandshakeError::BadUrl)?;
    Ok(match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    })
}

// first mutually acceptable subprotocol; fall back to the client's
// first offer
fn select_protocol<'a>(offers: &'a [String], accepted: &[String]) -> Option<&'a str> {
    if offers.is_empty() {
        return None;
    }
    offers
        .iter()
        .find(|offer| accepted.iter().any(|a| a == *offer))
        .map(String::as_str)
        .or_else(|| Some(offers[0].as_str()))
}
