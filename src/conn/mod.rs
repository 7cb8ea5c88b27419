//! Websocket connection session.
//!
//! A [`Conn`] owns one transport endpoint for its whole lifetime and
//! mediates concurrent producers and consumers of frames. Two
//! independent critical sections guard it: the read section is held for
//! the duration of one full frame read, the write section for one full
//! frame write. A writer and a reader may run at the same time; multiple
//! writers (or readers) serialize, so bytes of two frames never
//! interleave on the wire.
//!
//! Every method takes `&self`; share a connection across threads with
//! `Arc<Conn<T>>`.

mod gate;

use std::any::Any;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use log::debug;

use crate::error::{Error, FrameError};
use crate::frame::{acquire_frame, release_frame, CloseCode, Frame, Mode, OpCode};
use crate::frame::DEFAULT_MAX_PAYLOAD;
use crate::transport::{Transport, TransportReader, TransportWriter};
use gate::Gate;

/// How long a closing endpoint waits for the peer's close frame.
const CLOSE_WAIT: Duration = Duration::from_secs(5);

/// How long teardown waits for in-flight frame operations to retire.
const DRAIN_WAIT: Duration = Duration::from_secs(1);

/// Which side of the handshake this endpoint was.
///
/// The role decides the mask direction: client frames are masked,
/// server frames are not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

/// Opaque value carried from the upgrade context into the connection.
pub type UserValue = Arc<dyn Any + Send + Sync>;

/// Websocket connection over a [`Transport`].
pub struct Conn<T: Transport> {
    io: T,
    role: Role,

    read_lock: Mutex<()>,
    write_lock: Mutex<()>,

    closed: AtomicBool,
    gate: Gate,

    // Mode as u8: 0 = text, 1 = binary
    mode: AtomicU8,
    max_payload: AtomicU64,
    // millis, 0 = no deadline
    read_timeout: AtomicU64,
    write_timeout: AtomicU64,

    user_values: RwLock<HashMap<String, UserValue>>,
}

impl<T: Transport> Conn<T> {
    /// Wrap a transport whose handshake bytes are already past.
    pub fn new(io: T, role: Role) -> Self {
        Conn {
            io,
            role,
            read_lock: Mutex::new(()),
            write_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
            gate: Gate::new(),
            mode: AtomicU8::new(0),
            max_payload: AtomicU64::new(DEFAULT_MAX_PAYLOAD),
            read_timeout: AtomicU64::new(0),
            write_timeout: AtomicU64::new(0),
            user_values: RwLock::new(HashMap::new()),
        }
    }

    /// Server-side constructor.
    pub fn server(io: T) -> Self { Self::new(io, Role::Server) }

    /// Client-side constructor.
    pub fn client(io: T) -> Self { Self::new(io, Role::Client) }

    // === accessors ===

    #[inline]
    pub fn role(&self) -> Role { self.role }

    #[inline]
    pub fn is_closed(&self) -> bool { self.closed.load(Ordering::SeqCst) }

    pub fn local_addr(&self) -> Option<SocketAddr> { self.io.local_addr() }

    pub fn peer_addr(&self) -> Option<SocketAddr> { self.io.peer_addr() }

    /// Default mode used by [`write`](Self::write).
    pub fn mode(&self) -> Mode {
        match self.mode.load(Ordering::Relaxed) {
            0 => Mode::Text,
            _ => Mode::Binary,
        }
    }

    pub fn set_mode(&self, mode: Mode) {
        self.mode.store(
            match mode {
                Mode::Text => 0,
                Mode::Binary => 1,
            },
            Ordering::Relaxed,
        );
    }

    pub fn max_payload(&self) -> u64 { self.max_payload.load(Ordering::Relaxed) }

    /// Cap on incoming frame bodies; larger frames fail with
    /// [`FrameError::PayloadTooBig`].
    pub fn set_max_payload(&self, max: u64) { self.max_payload.store(max, Ordering::Relaxed); }

    pub fn read_timeout(&self) -> Option<Duration> {
        millis_to_timeout(self.read_timeout.load(Ordering::Relaxed))
    }

    /// Per-frame read deadline, forwarded to the transport at the
    /// boundary of each frame read. `None` blocks forever.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) {
        self.read_timeout
            .store(timeout_to_millis(timeout), Ordering::Relaxed);
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        millis_to_timeout(self.write_timeout.load(Ordering::Relaxed))
    }

    /// Per-frame write deadline, forwarded to the transport at the
    /// boundary of each frame write.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) {
        self.write_timeout
            .store(timeout_to_millis(timeout), Ordering::Relaxed);
    }

    /// The value attached under `key` in the upgrade context, if any.
    pub fn user_value(&self, key: &str) -> Option<UserValue> {
        self.user_values
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    pub fn set_user_value<V: Any + Send + Sync>(&self, key: &str, value: V) {
        self.user_values
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_owned(), Arc::new(value));
    }

    pub(crate) fn set_user_values(&self, values: HashMap<String, UserValue>) {
        self.user_values
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .extend(values);
    }

    // === frame i/o ===

    /// Serialize `fr` and flush it to the stream.
    ///
    /// Atomic with respect to other writers: concurrent callers never
    /// interleave bytes of two frames.
    pub fn write_frame(&self, fr: &Frame) -> Result<u64, Error> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        let _op = self.gate.op();
        self.write_frame_raw(fr)
    }

    // the close protocol writes its own frames after `closed` is set
    fn write_frame_raw(&self, fr: &Frame) -> Result<u64, Error> {
        let _section = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let timeout = self.write_timeout();
        if timeout.is_some() {
            let _ = self.io.set_write_deadline(timeout);
        }

        let mut w = TransportWriter(&self.io);
        let res = fr.write_to(&mut w).map_err(Error::Io);
        if res.is_ok() {
            self.io.flush()?;
            if timeout.is_some() {
                let _ = self.io.set_write_deadline(None);
            }
        }
        res
    }

    /// Fill `fr` with the next frame from the stream.
    ///
    /// Atomic with respect to other readers; frames are observed in
    /// wire order. The payload arrives unmasked; the mask bit and key
    /// are kept for inspection.
    pub fn read_frame(&self, fr: &mut Frame) -> Result<u64, Error> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        let _op = self.gate.op();
        let _section = self.read_lock.lock().unwrap_or_else(|e| e.into_inner());
        if self.is_closed() {
            return Err(Error::Closed);
        }

        fr.set_max_payload(self.max_payload());

        let timeout = self.read_timeout();
        if timeout.is_some() {
            let _ = self.io.set_read_deadline(timeout);
        }

        let mut r = TransportReader(&self.io);
        match fr.read_from(&mut r) {
            Ok(n) => {
                if timeout.is_some() {
                    let _ = self.io.set_read_deadline(None);
                }
                if fr.is_close() {
                    self.gate.mark_close_seen();
                }
                Ok(n)
            }
            // the stream may have been torn down under us
            Err(_) if self.is_closed() => Err(Error::Closed),
            Err(e) => Err(e),
        }
    }

    /// Read the next frame into a pooled [`Frame`].
    ///
    /// The caller is expected to hand the frame back with
    /// [`release_frame`] once done.
    pub fn next_frame(&self) -> Result<Frame, Error> {
        let mut fr = acquire_frame();
        match self.read_frame(&mut fr) {
            Ok(_) => {
                fr.unmask();
                Ok(fr)
            }
            Err(e) => {
                release_frame(fr);
                Err(e)
            }
        }
    }

    // === message i/o ===

    /// Write `b` as a single FIN frame with the given mode, masked when
    /// this side is the client.
    pub fn write_message(&self, mode: Mode, b: &[u8]) -> Result<u64, Error> {
        let mut fr = acquire_frame();
        fr.set_fin();
        fr.set_code(mode.opcode());
        fr.set_payload(b);
        if self.role == Role::Client {
            fr.mask();
        }
        let res = self.write_frame(&fr);
        release_frame(fr);
        res
    }

    /// Write `b` using the connection's default mode.
    pub fn write(&self, b: &[u8]) -> Result<u64, Error> { self.write_message(self.mode(), b) }

    /// Write `s` using the connection's default mode.
    pub fn write_string(&self, s: &str) -> Result<u64, Error> { self.write(s.as_bytes()) }

    /// Send a one-frame message with the given opcode, optional close
    /// status and payload, masked when this side is the client.
    pub fn send_code(
        &self,
        code: OpCode,
        status: Option<CloseCode>,
        b: &[u8],
    ) -> Result<(), Error> {
        let mut fr = acquire_frame();
        fr.set_fin();
        fr.set_code(code);
        if let Some(status) = status {
            fr.set_status(status);
        }
        if !b.is_empty() {
            fr.write(b);
        }
        if self.role == Role::Client {
            fr.mask();
        }
        let res = self.write_frame(&fr).map(|_| ());
        release_frame(fr);
        res
    }

    /// Read frames until FIN, appending payloads to `buf`, and return
    /// the mode of the first data frame.
    ///
    /// Pings are answered transparently, pongs are skipped, and a peer
    /// close frame completes the close handshake before this returns
    /// [`Error::Closed`]. Never returns a partial message.
    pub fn read_message(&self, buf: &mut Vec<u8>) -> Result<Mode, Error> {
        let mut fr = acquire_frame();
        let res = self.read_full(buf, &mut fr);
        release_frame(fr);
        res
    }

    /// [`read_message`](Self::read_message) with a caller-provided
    /// scratch frame.
    pub fn read_full(&self, buf: &mut Vec<u8>, fr: &mut Frame) -> Result<Mode, Error> {
        match self.read_data(buf, fr) {
            Ok(mode) => Ok(mode),
            // a terminal protocol violation maps to a close code,
            // announced before the stream goes down; transport errors
            // and timeouts bubble up without touching the connection
            Err(Error::Frame(fe)) => {
                if let Some(code) = close_code_for(fe) {
                    let _ = self.send_close(code, b"");
                }
                debug!("read message failed: {}", fe);
                let _ = self.force_close(false);
                Err(Error::Frame(fe))
            }
            Err(e) => Err(e),
        }
    }

    fn read_data(&self, buf: &mut Vec<u8>, fr: &mut Frame) -> Result<Mode, Error> {
        // running continuation state: true after a non-FIN data frame,
        // until the FIN fragment arrives
        let mut between_continuation = false;
        let mut mode = None;

        loop {
            fr.reset();
            self.read_frame(fr)?;

            match self.role {
                Role::Server if !fr.is_masked() => return Err(FrameError::MaskViolation.into()),
                Role::Client if fr.is_masked() => return Err(FrameError::MaskViolation.into()),
                _ => {}
            }
            fr.unmask();

            if fr.is_control() {
                match fr.code() {
                    OpCode::Ping => {
                        self.send_code(OpCode::Pong, None, fr.payload())?;
                        continue;
                    }
                    OpCode::Pong => continue,
                    _ => {
                        let _ = self.reply_close(fr);
                        return Err(Error::Closed);
                    }
                }
            }

            if between_continuation && !fr.is_continuation() {
                return Err(FrameError::BetweenContinuation.into());
            }

            if mode.is_none() {
                mode = fr.mode();
            }
            buf.extend_from_slice(fr.payload());

            if fr.is_fin() {
                return Ok(mode.unwrap_or(Mode::Binary));
            }
            between_continuation = true;
        }
    }

    // === close protocol ===

    /// Reply to a peer close frame: echo its status (1000 if none) and
    /// tear the connection down.
    pub fn reply_close(&self, fr: &mut Frame) -> Result<(), Error> {
        fr.set_fin();
        fr.set_close();
        if fr.status().is_none() {
            fr.set_status(CloseCode::Normal);
        }
        if self.role == Role::Client && !fr.is_masked() {
            fr.mask();
        }
        let _ = self.write_frame(fr);
        self.force_close(false)
    }

    /// Gracefully close the connection with status 1000.
    pub fn close(&self) -> Result<(), Error> { self.close_with_reason("") }

    /// Gracefully close the connection with status 1000 and a UTF-8
    /// reason.
    ///
    /// Writes a close frame, reads frames (discarding data) until the
    /// peer answers with its own close frame or a short timeout passes,
    /// then tears the transport down. A second call returns
    /// [`Error::Closed`] without side effects.
    pub fn close_with_reason(&self, reason: &str) -> Result<(), Error> {
        if self
            .closed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::Closed);
        }

        debug!("closing connection (reason: {:?})", reason);
        let _ = self.send_close(CloseCode::Normal, reason.as_bytes());
        self.drain_until_peer_close();
        self.teardown();
        Ok(())
    }

    fn send_close(&self, status: CloseCode, reason: &[u8]) -> Result<(), Error> {
        let mut fr = acquire_frame();
        fr.set_fin();
        fr.set_close();
        fr.set_status(status);
        if !reason.is_empty() {
            fr.write(reason);
        }
        if self.role == Role::Client {
            fr.mask();
        }
        // raw write: the close frame is part of the shutdown itself
        let res = self.write_frame_raw(&fr).map(|_| ());
        release_frame(fr);
        res
    }

    fn force_close(&self, wait_for_peer: bool) -> Result<(), Error> {
        if self
            .closed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::Closed);
        }
        if wait_for_peer {
            self.drain_until_peer_close();
        }
        self.teardown();
        Ok(())
    }

    // discard incoming frames until the peer's close frame shows up, or
    // a blocked reader observes it for us, or the close timeout passes
    fn drain_until_peer_close(&self) {
        let deadline = Instant::now() + CLOSE_WAIT;
        let mut fr = acquire_frame();

        while !self.gate.close_seen() {
            let now = Instant::now();
            if now >= deadline {
                debug!("close: peer close frame did not arrive in time");
                break;
            }
            let remaining = deadline - now;

            match self.read_lock.try_lock() {
                Ok(_section) => {
                    if self.gate.close_seen() {
                        break;
                    }
                    let _ = self.io.set_read_deadline(Some(remaining));
                    fr.reset();
                    fr.set_max_payload(self.max_payload());
                    let mut r = TransportReader(&self.io);
                    match fr.read_from(&mut r) {
                        Ok(_) => {
                            if fr.is_close() {
                                self.gate.mark_close_seen();
                            }
                        }
                        // timeout, eof or a broken stream all end the wait
                        Err(_) => break,
                    }
                }
                Err(_) => {
                    // the read section is owned by a blocked reader; it
                    // will flag the close frame when it sees one
                    self.gate
                        .wait_close_seen(remaining.min(Duration::from_millis(100)));
                }
            }
        }

        let _ = self.io.set_read_deadline(None);
        release_frame(fr);
    }

    fn teardown(&self) {
        let _ = self.io.flush();
        let _ = self.io.shutdown();
        // let in-flight frame operations retire before the close
        // finishes its bookkeeping
        self.gate.wait_idle(DRAIN_WAIT);
        debug!("connection torn down");
    }
}

impl<T: Transport> Drop for Conn<T> {
    fn drop(&mut self) {
        if !self.is_closed() {
            let _ = self.io.shutdown();
        }
    }
}

impl<T: Transport> std::fmt::Debug for Conn<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conn")
            .field("role", &self.role)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn close_code_for(e: FrameError) -> Option<CloseCode> {
    use FrameError::*;
    match e {
        PayloadTooBig => Some(CloseCode::TooBig),
        BadStatusLen => Some(CloseCode::NotConsistent),
        FragmentedControl | BetweenContinuation | MaskViolation | ReservedOpCode => {
            Some(CloseCode::ProtocolError)
        }
        _ => None,
    }
}

#[inline]
fn timeout_to_millis(t: Option<Duration>) -> u64 {
    match t {
        Some(d) => (d.as_millis() as u64).max(1),
        None => 0,
    }
}

#[inline]
fn millis_to_timeout(ms: u64) -> Option<Duration> {
    if ms == 0 {
        None
    } else {
        Some(Duration::from_millis(ms))
    }
}
