use thiserror::Error;

#[derive(Error, Debug)]
pub enum DemuxError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol violation on pid {pid:#06x}: {reason}")]
    ProtocolViolation { pid: u16, reason: String },

    #[error("malformed section: {0}")]
    MalformedSection(String),

    #[error("no elementary stream found for stream types {0:02x?}")]
    PidNotFound(Vec<u8>),

    #[error("pid {0:#06x} is not registered")]
    UnregisteredPid(u16),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
}

impl DemuxError {
    /// Returns true when the error is terminal for the stream: the source
    /// failed or the bytes do not form a transport stream.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DemuxError::Io(_) | DemuxError::ProtocolViolation { .. })
    }
}

impl From<DemuxError> for std::io::Error {
    fn from(err: DemuxError) -> Self {
        match err {
            DemuxError::Io(e) => e,
            DemuxError::Unsupported(what) => {
                std::io::Error::new(std::io::ErrorKind::Unsupported, what)
            }
            other => std::io::Error::new(std::io::ErrorKind::InvalidData, other),
        }
    }
}

pub type Result<T> = std::result::Result<T, DemuxError>;
