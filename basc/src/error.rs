use std::fmt;
use std::io;

#[derive(Debug)]
pub enum Error {
    /// A diagnostic tied to a source line.
    Parse { line: u32, message: String },
    Io(io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Parse { line, message } => write!(f, "line {}: {}", line, message),
            Error::Io(err) => write!(f, "reading source failed: {}", err),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}
