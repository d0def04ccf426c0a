use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid names, hosts, ports, declarations or requirement graphs.
    Config,
    /// A recipe's `hash` script exited non-zero.
    Hash,
    /// A remote command failed or the transport itself broke.
    Remote,
    /// A recipe's deploy procedure failed as a whole.
    Deploy,
    Io,
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Config => "configuration error",
            ErrorKind::Hash => "hash error",
            ErrorKind::Remote => "remote error",
            ErrorKind::Deploy => "deploy error",
            ErrorKind::Io => "io error",
            ErrorKind::Other => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    msg: String,
}

impl Error {
    pub fn msg<M: Into<String>>(msg: M) -> Self {
        Self::new(ErrorKind::Other, msg)
    }

    pub fn new<M: Into<String>>(kind: ErrorKind, msg: M) -> Self {
        Self {
            kind,
            msg: msg.into(),
        }
    }

    pub fn config<M: Into<String>>(msg: M) -> Self {
        Self::new(ErrorKind::Config, msg)
    }

    pub fn hash<M: Into<String>>(msg: M) -> Self {
        Self::new(ErrorKind::Hash, msg)
    }

    pub fn remote<M: Into<String>>(msg: M) -> Self {
        Self::new(ErrorKind::Remote, msg)
    }

    pub fn deploy<M: Into<String>>(msg: M) -> Self {
        Self::new(ErrorKind::Deploy, msg)
    }

    pub fn io<M: Into<String>>(msg: M) -> Self {
        Self::new(ErrorKind::Io, msg)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.msg
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::new(ErrorKind::Io, err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
