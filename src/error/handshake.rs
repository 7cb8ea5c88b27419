use std::fmt::{Display, Formatter};

/// Upgrade negotiation failures, on either side of the handshake.
#[derive(Debug)]
pub enum HandshakeError {
    // http error
    HttpMethod,

    HttpVersion,

    // websocket error
    Upgrade,

    Connection,

    SecWebSocketKey,

    SecWebSocketAccept,

    SecWebSocketVersion,

    /// Request `Origin` does not match the configured origin.
    OriginMismatch,

    /// The custom upgrade predicate refused the request.
    Rejected,

    /// Client-side: the response was not `101` + `Upgrade: websocket`.
    CannotUpgrade,

    /// Dial URL is not `ws://` (`wss://` needs a caller-provided transport).
    UnsupportedScheme,

    /// Dial URL could not be parsed.
    BadUrl,

    /// Header section exceeds the allowed size.
    TooLarge,

    Httparse(httparse::Error),
}

impl Display for HandshakeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        use HandshakeError::*;
        match self {
            HttpMethod => write!(f, "illegal http method"),

            HttpVersion => write!(f, "illegal http version"),

            Upgrade => write!(f, "missing or illegal upgrade header"),

            Connection => write!(f, "missing or illegal connection header"),

            SecWebSocketKey => write!(f, "missing sec-websocket-key header"),

            SecWebSocketAccept => {
                write!(f, "missing or illegal sec-websocket-accept header")
            }

            SecWebSocketVersion => {
                write!(f, "missing or unsupported sec-websocket-version")
            }

            OriginMismatch => write!(f, "origin is not allowed"),

            Rejected => write!(f, "upgrade rejected by handler"),

            CannotUpgrade => write!(f, "cannot upgrade connection"),

            UnsupportedScheme => write!(f, "unsupported url scheme"),

            BadUrl => write!(f, "malformed url"),

            TooLarge => write!(f, "header section is too large"),

            Httparse(e) => write!(f, "http parse error: {}", e),
        }
    }
}

impl From<httparse::Error> for HandshakeError {
    fn from(e: httparse::Error) -> Self { HandshakeError::Httparse(e) }
}

impl std::error::Error for HandshakeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        if let HandshakeError::Httparse(e) = self {
            Some(e)
        } else {
            None
        }
    }
}
