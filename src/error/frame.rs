use std::fmt::{Display, Formatter};

/// Frame-level protocol violations.
///
/// Covers both codec failures while parsing a frame from the stream
/// and session-level violations detected while assembling a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Fewer than 2 header bytes were readable.
    BadHeader,

    /// The extended-length bytes could not be read fully.
    BadLength,

    /// The mask key bytes could not be read fully.
    BadMask,

    /// Parsed payload length exceeds the configured maximum,
    /// or the 2^32 sanity cap.
    PayloadTooBig,

    /// A close frame body of length 1 (not 0, not >= 2).
    BadStatusLen,

    /// The 4-bit opcode is one of the reserved values.
    ReservedOpCode,

    /// A control frame without FIN, or with a payload over 125 bytes.
    FragmentedControl,

    /// A data frame with a data opcode arrived between continuations.
    BetweenContinuation,

    /// A client frame without the mask bit, or a masked server frame.
    MaskViolation,
}

impl Display for FrameError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        use FrameError::*;
        match self {
            BadHeader => write!(f, "error reading frame header"),
            BadLength => write!(f, "error reading payload length"),
            BadMask => write!(f, "error reading mask"),
            PayloadTooBig => write!(f, "payload length exceeds the limit"),
            BadStatusLen => write!(f, "close frame body must be empty or at least 2 bytes"),
            ReservedOpCode => write!(f, "reserved opcode value"),
            FragmentedControl => {
                write!(f, "control frames must not be fragmented or exceed 125 bytes")
            }
            BetweenContinuation => write!(f, "received data frame between continuation frames"),
            MaskViolation => write!(f, "frame mask does not match the sender role"),
        }
    }
}

// use default impl
impl std::error::Error for FrameError {}
