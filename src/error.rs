use std::{fmt, io};

#[derive(Debug)]
pub enum ProtocolError {
    MissingDataTerminator,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::MissingDataTerminator => write!(f, "expected LF after data block"),
        }
    }
}

/// Ends the connection's session loop. Wire-level replies (`ERROR`,
/// `CLIENT_ERROR`, `SERVER_ERROR`) are handled inline by the protocol
/// engine and never reach this type.
#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Protocol(ProtocolError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io: {}", e),
            Self::Protocol(e) => write!(f, "protocol: {}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Error::Protocol(e)
    }
}
