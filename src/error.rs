use std::{
    error::Error,
    fmt::{self, Display},
    io,
    time::Duration,
};

/// The result type used across the whole engine.
pub type Result<T> = std::result::Result<T, GdErr>;

/// The engine's error type.
#[derive(Debug)]
pub enum GdErr {
    Io(io::Error),
    Config(serde_json::Error),
    InvalidConfig(String),
    IndexOutOfRange {
        index: u32,
        length: usize,
    },
    CorruptModel {
        what: &'static str,
    },
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    Parse {
        line: usize,
        detail: String,
    },
    SyncFailed {
        node: usize,
        detail: String,
    },
    SyncTimeout {
        node: usize,
        after: Duration,
    },
}

impl Display for GdErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GdErr::Io(e) => write!(f, "io error: {e}"),
            GdErr::Config(e) => write!(f, "failed to parse configuration: {e}"),
            GdErr::InvalidConfig(detail) => write!(f, "invalid configuration: {detail}"),
            GdErr::IndexOutOfRange { index, length } => write!(
                f,
                "model file holds index {index} but the weight table only has {length} entries"
            ),
            GdErr::CorruptModel { what } => write!(f, "corrupt model file: {what}"),
            GdErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(f, "size mismatch in {what}: got {got}, expected {expected}"),
            GdErr::Parse { line, detail } => write!(f, "bad example on line {line}: {detail}"),
            GdErr::SyncFailed { node, detail } => {
                write!(f, "collective synchronization failed at node {node}: {detail}")
            }
            GdErr::SyncTimeout { node, after } => write!(
                f,
                "collective synchronization timed out at node {node} after {after:?}"
            ),
        }
    }
}

impl Error for GdErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            GdErr::Io(e) => Some(e),
            GdErr::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for GdErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for GdErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Config(value)
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<GdErr> for io::Error {
    fn from(value: GdErr) -> Self {
        match value {
            GdErr::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
