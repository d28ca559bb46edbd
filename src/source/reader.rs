use super::ByteSource;
use log::debug;
use std::io::{self, Read};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// A forward-only source over any [`Read`] implementation.
///
/// Rewinding is not supported; a stalled reader blocks the caller unless the
/// reader itself has a timeout.
#[derive(Debug)]
pub struct ReaderSource<R: Read> {
    reader: R,
    eof: bool,
}

impl<R: Read> ReaderSource<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, eof: false }
    }

    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl ReaderSource<TcpStream> {
    /// Connects to a TCP endpoint whose reads fail with `WouldBlock` or
    /// `TimedOut` after `timeout` without data.
    pub fn connect_tcp<A: ToSocketAddrs>(addr: A, timeout: Duration) -> io::Result<Self> {
        let addrs: Vec<_> = addr.to_socket_addrs()?.collect();
        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(timeout))?;
                    debug!("connected to {} with {:?} read timeout", addr, timeout);
                    return Ok(Self::new(stream));
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "no socket address resolved")
        }))
    }
}

impl<R: Read> ByteSource for ReaderSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.reader.read(buf)?;
        if n == 0 && !buf.is_empty() {
            self.eof = true;
        }
        Ok(n)
    }

    fn is_eof(&self) -> bool {
        self.eof
    }
}
