use super::ByteSource;
use log::debug;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

/// A buffered, rewindable source over a file on disk.
#[derive(Debug)]
pub struct FileSource {
    reader: BufReader<File>,
    eof: bool,
}

impl FileSource {
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        debug!("opening transport stream file {}", path.display());
        Ok(Self::from_file(File::open(path)?))
    }

    pub fn from_file(file: File) -> Self {
        Self {
            reader: BufReader::new(file),
            eof: false,
        }
    }
}

impl ByteSource for FileSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.reader.read(buf)?;
        if n == 0 && !buf.is_empty() {
            self.eof = true;
        }
        Ok(n)
    }

    fn rewind(&mut self) -> io::Result<()> {
        self.reader.seek(SeekFrom::Start(0))?;
        self.eof = false;
        Ok(())
    }

    fn is_eof(&self) -> bool {
        self.eof
    }
}
