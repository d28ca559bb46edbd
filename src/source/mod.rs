//! # Byte Sources
//!
//! The demultiplexer never knows where its bytes come from. Everything it
//! consumes goes through [`ByteSource`], which mirrors the
//! `read(buffer, count) -> bytes_read` contract of [`std::io::Read`]:
//!
//! - `Ok(0)` for a non-empty buffer is a clean end of stream
//! - `Err(_)` is a failure of the source itself
//! - partial reads are allowed and looped over by the caller
//!
//! Three variants are provided: [`MemorySource`] over an in-memory buffer,
//! [`FileSource`] over a buffered file, and [`ReaderSource`] over any
//! [`std::io::Read`] (sockets, pipes, decompressors).

use std::io;

mod file;
mod memory;
mod reader;

pub use file::FileSource;
pub use memory::MemorySource;
pub use reader::ReaderSource;

/// Capability interface for anything that supplies bytes on request.
pub trait ByteSource {
    /// Reads up to `buf.len()` bytes, returning how many were read.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Restarts the source from its first byte.
    fn rewind(&mut self) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "byte source cannot be rewound",
        ))
    }

    /// Returns true once the source has signalled end of stream.
    fn is_eof(&self) -> bool;

    /// Presentation timestamp (90 kHz) associated with the bytes most
    /// recently read, when the source knows one.
    fn timestamp(&self) -> Option<u64> {
        None
    }
}

impl<S: ByteSource + ?Sized> ByteSource for &mut S {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }

    fn rewind(&mut self) -> io::Result<()> {
        (**self).rewind()
    }

    fn is_eof(&self) -> bool {
        (**self).is_eof()
    }

    fn timestamp(&self) -> Option<u64> {
        (**self).timestamp()
    }
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }

    fn rewind(&mut self) -> io::Result<()> {
        (**self).rewind()
    }

    fn is_eof(&self) -> bool {
        (**self).is_eof()
    }

    fn timestamp(&self) -> Option<u64> {
        (**self).timestamp()
    }
}

/// Reads until `buf` is full or the source ends, retrying interrupted and
/// partial reads. Returns the number of bytes placed in `buf`.
pub fn read_full<S: ByteSource + ?Sized>(source: &mut S, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}


#[cfg(test)]
mod tests {
    use super::test_sources::*;
    use super::*;

    #[test]
    fn test_read_full_loops_partial_reads() {
        let mut source = ChunkedSource {
            inner: MemorySource::new((0u8..=255).collect::<Vec<_>>()),
            chunk: 7,
        };
        let mut buf = [0u8; 100];
        assert_eq!(read_full(&mut source, &mut buf).unwrap(), 100);
        assert_eq!(buf[99], 99);

        let mut rest = [0u8; 200];
        assert_eq!(read_full(&mut source, &mut rest).unwrap(), 156);
        assert!(source.is_eof());
    }

    #[test]
    fn test_read_full_propagates_failure() {
        let mut source = FailingSource {
            inner: MemorySource::new(vec![1u8; 10]),
            ok_bytes: 4,
        };
        let mut buf = [0u8; 8];
        let err = read_full(&mut source, &mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
    }

    #[test]
    fn test_boxed_source_forwards() {
        let mut source: Box<dyn ByteSource> = Box::new(MemorySource::new(vec![9u8; 4]));
        let mut buf = [0u8; 4];
        assert_eq!(source.read(&mut buf).unwrap(), 4);
        source.rewind().unwrap();
        assert_eq!(source.read(&mut buf).unwrap(), 4);
        assert_eq!(source.timestamp(), None);
    }
}
