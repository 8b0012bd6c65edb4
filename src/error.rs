use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("could not stage write: {0}")]
    Staging(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cryptographic failure")]
    Crypto,

    #[error("wrong password")]
    BadPassword,

    #[error("no such section")]
    NotFound,

    #[error("archive format error: {0}")]
    Format(&'static str),

    #[error("archive is no longer usable: {0}")]
    Unusable(&'static str),
}

impl Error {
    /// Process exit status for errors that escape the session.
    ///
    /// A failed commit is reported but still exits 0; a wrong password is
    /// retried at the prompt and never reaches this mapping.
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::Format(_) => 3,
            Error::Io(_) => 4,
            Error::Crypto => 5,
            _ => 1,
        }
    }
}
