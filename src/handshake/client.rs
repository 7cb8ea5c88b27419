//! Client-side upgrade.
//!
//! [RFC-6455 Section 4.1](https://datatracker.ietf.org/doc/html/rfc6455#section-4.1)
//!
//! [`dial`] opens a TCP connection for a `ws://` URL and negotiates;
//! [`client`] negotiates over a caller-provided transport, which is how
//! `wss://` is reached (hand in an already-encrypted stream).

use std::net::TcpStream;

use log::debug;
use url::Url;

use super::key::{derive_accept_key, new_sec_key};
use super::{header_value, read_head, MAX_ALLOW_HEADERS};
use crate::conn::Conn;
use crate::error::{Error, HandshakeError};
use crate::frame::{acquire_buf, release_buf};
use crate::transport::{write_full, Transport};

/// Establish a websocket connection as client.
///
/// The URL must follow the websocket format, i.e. `ws://host:port/path`.
pub fn dial(url: &str) -> Result<Conn<TcpStream>, Error> {
    dial_with_headers(url, &[])
}

/// [`dial`] with extra request headers merged in.
pub fn dial_with_headers(url: &str, headers: &[(&str, &str)]) -> Result<Conn<TcpStream>, Error> {
    let target = Url::parse(url).map_err(|_| HandshakeError::BadUrl)?;
    if target.scheme() != "ws" {
        // wss needs an encrypted transport from the caller, see client()
        return Err(HandshakeError::UnsupportedScheme.into());
    }
    let host = target.host_str().ok_or(HandshakeError::BadUrl)?;
    let port = target.port().unwrap_or(80);

    let tcp = TcpStream::connect((host, port))?;
    client_with_headers(tcp, url, headers)
}

/// Negotiate as client over an existing transport.
pub fn client<T: Transport>(io: T, url: &str) -> Result<Conn<T>, Error> {
    client_with_headers(io, url, &[])
}

/// [`client`] with extra request headers merged in.
pub fn client_with_headers<T: Transport>(
    io: T,
    url: &str,
    headers: &[(&str, &str)],
) -> Result<Conn<T>, Error> {
    let target = Url::parse(url).map_err(|_| HandshakeError::BadUrl)?;
    if !matches!(target.scheme(), "ws" | "wss") {
        return Err(HandshakeError::UnsupportedScheme.into());
    }
    let host = target.host_str().ok_or(HandshakeError::BadUrl)?;
    let host_port = match target.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_owned(),
    };

    let mut path = target.path().to_owned();
    if let Some(query) = target.query() {
        path.push('?');
        path.push_str(query);
    }

    let sec_key = new_sec_key();

    let mut request = acquire_buf();
    request.extend_from_slice(b"GET ");
    request.extend_from_slice(path.as_bytes());
    request.extend_from_slice(b" HTTP/1.1\r\n");
    push_header(&mut request, "host", &host_port);
    push_header(&mut request, "upgrade", "websocket");
    push_header(&mut request, "connection", "upgrade");
    push_header(
        &mut request,
        "sec-websocket-key",
        std::str::from_utf8(&sec_key).unwrap(),
    );
    push_header(&mut request, "sec-websocket-version", "13");
    push_header(
        &mut request,
        "origin",
        &format!("{}://{}", target.scheme(), host_port),
    );
    for (name, value) in headers {
        push_header(&mut request, name, value);
    }
    request.extend_from_slice(b"\r\n");

    let sent = write_full(&io, &request);
    release_buf(request);
    sent?;

    let mut head = acquire_buf();
    let checked = check_response(&io, &mut head, &derive_accept_key(&sec_key));
    release_buf(head);
    checked?;

    debug!("connected to {}", url);
    Ok(Conn::client(io))
}

// require `101` + `upgrade: websocket`, and verify the accept hash
fn check_response<T: Transport>(
    io: &T,
    head: &mut Vec<u8>,
    expected_accept: &[u8; 28],
) -> Result<(), Error> {
    read_head(io, head)?;

    let mut storage = [httparse::EMPTY_HEADER; MAX_ALLOW_HEADERS];
    let mut response = httparse::Response::new(&mut storage);
    match response.parse(head).map_err(HandshakeError::from)? {
        httparse::Status::Complete(_) => {}
        httparse::Status::Partial => return Err(HandshakeError::CannotUpgrade.into()),
    }

    if response.code != Some(101) {
        return Err(HandshakeError::CannotUpgrade.into());
    }

    let parsed: Vec<(String, String)> = response
        .headers
        .iter()
        .map(|h| {
            (
                h.name.to_owned(),
                String::from_utf8_lossy(h.value).into_owned(),
            )
        })
        .collect();

    match header_value(&parsed, "upgrade") {
        Some(v) if v.eq_ignore_ascii_case("websocket") => {}
        _ => return Err(HandshakeError::CannotUpgrade.into()),
    }

    match header_value(&parsed, "sec-websocket-accept") {
        Some(v) if v.as_bytes() == expected_accept => {}
        _ => return Err(HandshakeError::SecWebSocketAccept.into()),
    }

    Ok(())
}

fn push_header(buf: &mut Vec<u8>, name: &str, value: &str) {
    buf.extend_from_slice(name.as_bytes());
    buf.extend_from_slice(b": ");
    buf.extend_from_slice(value.as_bytes());
    buf.extend_from_slice(b"\r\n");
}
