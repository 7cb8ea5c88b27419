//! Byte-stream transport consumed by the connection.
//!
//! The core only needs a reliable ordered duplex stream with read, write,
//! close and deadline operations. Methods take `&self` so one endpoint
//! can serve the independent read and write sections of a connection at
//! the same time.

use std::io;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

/// A reliable ordered bidirectional byte stream.
///
/// Deadlines apply to individual read/write calls; `None` removes the
/// deadline. A transport may already be encrypted; the core does not
/// care.
pub trait Transport: Send + Sync {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    fn write(&self, buf: &[u8]) -> io::Result<usize>;

    fn flush(&self) -> io::Result<()>;

    /// Tear down both directions; blocked operations return.
    fn shutdown(&self) -> io::Result<()>;

    fn set_read_deadline(&self, timeout: Option<Duration>) -> io::Result<()>;

    fn set_write_deadline(&self, timeout: Option<Duration>) -> io::Result<()>;

    fn local_addr(&self) -> Option<SocketAddr> { None }

    fn peer_addr(&self) -> Option<SocketAddr> { None }
}

impl Transport for TcpStream {
    #[inline]
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> { io::Read::read(&mut &*self, buf) }

    #[inline]
    fn write(&self, buf: &[u8]) -> io::Result<usize> { io::Write::write(&mut &*self, buf) }

    #[inline]
    fn flush(&self) -> io::Result<()> { io::Write::flush(&mut &*self) }

    #[inline]
    fn shutdown(&self) -> io::Result<()> { TcpStream::shutdown(self, Shutdown::Both) }

    #[inline]
    fn set_read_deadline(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.set_read_timeout(timeout)
    }

    #[inline]
    fn set_write_deadline(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.set_write_timeout(timeout)
    }

    #[inline]
    fn local_addr(&self) -> Option<SocketAddr> { TcpStream::local_addr(self).ok() }

    #[inline]
    fn peer_addr(&self) -> Option<SocketAddr> { TcpStream::peer_addr(self).ok() }
}

/// View a shared transport as [`io::Read`] for the frame codec.
pub(crate) struct TransportReader<'a, T: Transport + ?Sized>(pub &'a T);

impl<T: Transport + ?Sized> io::Read for TransportReader<'_, T> {
    #[inline]
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> { self.0.read(buf) }
}

/// View a shared transport as [`io::Write`] for the frame codec.
pub(crate) struct TransportWriter<'a, T: Transport + ?Sized>(pub &'a T);

impl<T: Transport + ?Sized> io::Write for TransportWriter<'_, T> {
    #[inline]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> { self.0.write(buf) }

    #[inline]
    fn flush(&mut self) -> io::Result<()> { self.0.flush() }
}

/// Write all of `buf`, then flush.
pub(crate) fn write_full<T: Transport + ?Sized>(io: &T, mut buf: &[u8]) -> io::Result<()> {
    while !buf.is_empty() {
        let n = io.write(buf)?;
        if n == 0 {
            return Err(io::ErrorKind::WriteZero.into());
        }
        buf = &buf[n..];
    }
    io.flush()
}

/// Fill all of `buf`, retrying short reads.
pub(crate) fn read_full<T: Transport + ?Sized>(io: &T, mut buf: &mut [u8]) -> io::Result<()> {
    while !buf.is_empty() {
        let n = io.read(buf)?;
        if n == 0 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        buf = &mut buf[n..];
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test {
    //! In-memory duplex pipe used by unit tests.

    use super::Transport;
    use std::io;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    const POLL_SLICE: Duration = Duration::from_millis(20);

    struct Incoming {
        rx: Receiver<Vec<u8>>,
        leftover: Vec<u8>,
    }

    pub(crate) struct Pipe {
        incoming: Mutex<Incoming>,
        outgoing: Mutex<Option<Sender<Vec<u8>>>>,
        read_timeout: Mutex<Option<Duration>>,
        closed: Arc<AtomicBool>,
    }

    /// Two cross-connected in-memory endpoints.
    pub(crate) fn pipe() -> (Pipe, Pipe) {
        let (tx_a, rx_b) = channel();
        let (tx_b, rx_a) = channel();
        let end = |rx, tx| Pipe {
            incoming: Mutex::new(Incoming {
                rx,
                leftover: Vec::new(),
            }),
            outgoing: Mutex::new(Some(tx)),
            read_timeout: Mutex::new(None),
            closed: Arc::new(AtomicBool::new(false)),
        };
        (end(rx_a, tx_a), end(rx_b, tx_b))
    }

    impl Pipe {
        fn deliver(buf: &mut [u8], inc: &mut Incoming, chunk: Vec<u8>) -> usize {
            inc.leftover = chunk;
            let n = buf.len().min(inc.leftover.len());
            buf[..n].copy_from_slice(&inc.leftover[..n]);
            inc.leftover.drain(..n);
            n
        }
    }

    impl Transport for Pipe {
        fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
            let mut inc = self.incoming.lock().unwrap();
            if !inc.leftover.is_empty() {
                let chunk = std::mem::take(&mut inc.leftover);
                return Ok(Self::deliver(buf, &mut inc, chunk));
            }

            let timeout = *self.read_timeout.lock().unwrap();
            let start = Instant::now();
            loop {
                if self.closed.load(Ordering::SeqCst) {
                    return Ok(0);
                }
                match inc.rx.recv_timeout(POLL_SLICE) {
                    Ok(chunk) => return Ok(Self::deliver(buf, &mut inc, chunk)),
                    Err(RecvTimeoutError::Disconnected) => return Ok(0),
                    Err(RecvTimeoutError::Timeout) => {
                        if let Some(t) = timeout {
                            if start.elapsed() >= t {
                                return Err(io::ErrorKind::TimedOut.into());
                            }
                        }
                    }
                }
            }
        }

        fn write(&self, buf: &[u8]) -> io::Result<usize> {
            match self.outgoing.lock().unwrap().as_ref() {
                Some(tx) => tx
                    .send(buf.to_vec())
                    .map(|_| buf.len())
                    .map_err(|_| io::ErrorKind::BrokenPipe.into()),
                None => Err(io::ErrorKind::BrokenPipe.into()),
            }
        }

        fn flush(&self) -> io::Result<()> { Ok(()) }

        fn shutdown(&self) -> io::Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            self.outgoing.lock().unwrap().take();
            Ok(())
        }

        fn set_read_deadline(&self, timeout: Option<Duration>) -> io::Result<()> {
            *self.read_timeout.lock().unwrap() = timeout;
            Ok(())
        }

        fn set_write_deadline(&self, _timeout: Option<Duration>) -> io::Result<()> { Ok(()) }
    }
}
