#![allow(missing_docs)]
//! Errors

mod frame;
mod handshake;

pub use frame::FrameError;
pub use handshake::HandshakeError;

use std::fmt::{Display, Formatter};
use std::io::ErrorKind;

#[derive(Debug)]
pub enum Error {
    /// The connection is closed, or the peer completed the close
    /// handshake. Every operation on a closed connection returns this.
    Closed,

    Frame(FrameError),

    Handshake(HandshakeError),

    Io(std::io::Error),
}

impl Error {
    /// Whether this is the clean end-of-connection marker.
    #[inline]
    pub fn is_closed(&self) -> bool { matches!(self, Error::Closed) }

    /// Whether the underlying stream deadline expired.
    #[inline]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::Io(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut
        )
    }
}

impl From<FrameError> for Error {
    fn from(e: FrameError) -> Self { Error::Frame(e) }
}

impl From<HandshakeError> for Error {
    fn from(e: HandshakeError) -> Self { Error::Handshake(e) }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error { Error::Io(e) }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        use Error::*;
        match self {
            Closed => write!(f, "closed connection"),
            Frame(e) => write!(f, "frame error: {}", e),
            Handshake(e) => write!(f, "handshake error: {}", e),
            Io(e) => write!(f, "io error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        use Error::*;

        match self {
            Closed => None,
            Frame(e) => Some(e),
            Handshake(e) => Some(e),
            Io(e) => Some(e),
        }
    }
}
