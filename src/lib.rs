//! Lightweight websocket (RFC 6455) endpoint library with concurrent
//! frame-level access.
//!
//! Three layers, leaves first:
//!
//! - [`frame`] — the frame codec: pooled [`Frame`](frame::Frame) values
//!   encoded to and decoded from a byte stream.
//! - [`conn`] — the connection session: one [`Conn`](conn::Conn) per
//!   transport, safe for N concurrent writers and M concurrent readers,
//!   with transparent ping/pong handling and the close handshake.
//! - [`handshake`] — the HTTP Upgrade negotiation, server side
//!   ([`Upgrader`]) and client side ([`dial`]/[`client`]).
//!
//! ```no_run
//! use swiftws::{dial, Mode};
//!
//! let conn = dial("ws://127.0.0.1:8080/ws")?;
//! conn.write_message(Mode::Text, b"Hello")?;
//!
//! let mut buf = Vec::new();
//! let mode = conn.read_message(&mut buf)?;
//! println!("{:?}: {:?}", mode, buf);
//! conn.close()?;
//! # Ok::<(), swiftws::Error>(())
//! ```

pub mod conn;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod transport;

pub use conn::{Conn, Role, UserValue};
pub use error::Error;
pub use frame::{acquire_frame, release_frame, CloseCode, Frame, Mode, OpCode};
pub use handshake::{client, client_with_headers, dial, dial_with_headers};
pub use handshake::{upgrade, UpgradeRequest, Upgrader};
pub use transport::Transport;
