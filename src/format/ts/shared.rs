//! Shared access to one demuxer from several consumers.
//!
//! The pull-and-route step of [`TsDemuxer`] mutates the whole demuxer, so
//! it is serialized behind a mutex. Each consumer gets a [`PidStream`] for
//! its own PID and reads through it as if it owned the source.

use super::buffer::PidKind;
use super::demuxer::{DemuxStats, TsDemuxer};
use super::psi::PmtSection;
use crate::error::Result;
use crate::source::ByteSource;
use bytes::Bytes;
use parking_lot::{Mutex, MutexGuard};
use std::io;
use std::sync::Arc;

/// A [`TsDemuxer`] that can be cloned and handed to other threads.
pub struct SharedDemuxer<S> {
    inner: Arc<Mutex<TsDemuxer<S>>>,
}

impl<S> Clone for SharedDemuxer<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: ByteSource> SharedDemuxer<S> {
    pub fn new(demuxer: TsDemuxer<S>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(demuxer)),
        }
    }

    /// Locks the demuxer for direct use.
    pub fn lock(&self) -> MutexGuard<'_, TsDemuxer<S>> {
        self.inner.lock()
    }

    pub fn find_pid_for_stream_types(&self, stream_types: &[u8]) -> Result<u16> {
        self.inner.lock().find_pid_for_stream_types(stream_types)
    }

    pub fn scan_programs(&self) -> Result<Vec<PmtSection>> {
        self.inner.lock().scan_programs()
    }

    pub fn stats(&self) -> DemuxStats {
        self.inner.lock().stats()
    }

    /// Registers `pid` if needed and returns a reader for it.
    pub fn stream(&self, pid: u16) -> Result<PidStream<S>> {
        let mut demuxer = self.inner.lock();
        if !demuxer.is_registered(pid) {
            demuxer.register(pid)?;
        }
        Ok(PidStream {
            demuxer: Arc::clone(&self.inner),
            pid,
            eof: false,
        })
    }

    /// Like [`stream`](Self::stream) with an explicit payload kind.
    pub fn stream_as(&self, pid: u16, kind: PidKind) -> Result<PidStream<S>> {
        self.inner.lock().register_as(pid, kind)?;
        Ok(PidStream {
            demuxer: Arc::clone(&self.inner),
            pid,
            eof: false,
        })
    }
}

/// Byte stream of one PID of a [`SharedDemuxer`].
///
/// Implements [`ByteSource`] and [`io::Read`], so it can feed a decoder
/// directly. Its timestamp is the PID's most recent PTS.
///
/// Reads return whatever the PID has buffered. When nothing is, packets are
/// pulled one per lock acquisition until some arrive, so other consumers
/// with buffered bytes are never held up by a long read.
pub struct PidStream<S> {
    demuxer: Arc<Mutex<TsDemuxer<S>>>,
    pid: u16,
    eof: bool,
}

/// Reads up to `max` bytes of `pid` once any are buffered, releasing the
/// lock between pulls. Empty once the source is exhausted.
fn read_ready<S: ByteSource>(demuxer: &Mutex<TsDemuxer<S>>, pid: u16, max: usize) -> Result<Bytes> {
    loop {
        let mut guard = demuxer.lock();
        if guard.poll_available(pid)? {
            return guard.read_buffered(pid, max);
        }
    }
}

impl<S: ByteSource> PidStream<S> {
    pub fn pid(&self) -> u16 {
        self.pid
    }

    /// Reads up to `max` bytes, returning as soon as any are buffered.
    pub fn read_bytes(&mut self, max: usize) -> Result<Bytes> {
        let bytes = read_ready(&self.demuxer, self.pid, max)?;
        if bytes.is_empty() && max > 0 {
            self.eof = true;
        }
        Ok(bytes)
    }

    /// Copies buffered bytes into `buf`; 0 once the source is exhausted.
    ///
    /// Takes precedence over the [`ByteSource`] and [`io::Read`] methods of
    /// the same name, which both forward here.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let bytes = self.read_bytes(buf.len())?;
        buf[..bytes.len()].copy_from_slice(&bytes);
        Ok(bytes.len())
    }
}

#[cfg(feature = "async")]
impl<S: ByteSource + Send + 'static> PidStream<S> {
    /// Runs [`read_bytes`](Self::read_bytes) on tokio's blocking pool.
    pub async fn read_async(&mut self, max: usize) -> Result<Bytes> {
        let demuxer = Arc::clone(&self.demuxer);
        let pid = self.pid;
        let bytes = tokio::task::spawn_blocking(move || read_ready(&demuxer, pid, max))
            .await
            .map_err(|e| crate::DemuxError::Io(io::Error::other(e)))??;
        if bytes.is_empty() && max > 0 {
            self.eof = true;
        }
        Ok(bytes)
    }
}

impl<S: ByteSource> ByteSource for PidStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(PidStream::read(self, buf)?)
    }

    fn is_eof(&self) -> bool {
        self.eof
    }

    fn timestamp(&self) -> Option<u64> {
        self.demuxer.lock().timestamp(self.pid).ok().flatten()
    }
}

impl<S: ByteSource> io::Read for PidStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(PidStream::read(self, buf)?)
    }
}
