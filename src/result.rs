use std::fmt::Display;

use miette::miette;

/// Errors coming back from the external programs.
///
/// An unavailable stream is kept apart from the other failures so that the
/// user gets a clear message instead of the raw extractor output.
#[derive(Debug)]
pub enum Error {
    UnavailableStream,

    Miette(miette::Report),
}

impl From<miette::Report> for Error {
    fn from(err: miette::Report) -> Self {
        Error::Miette(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Miette(miette!("{err}"))
    }
}

impl From<Error> for miette::Report {
    fn from(err: Error) -> Self {
        match err {
            Error::UnavailableStream => miette!("Video unavailable"),
            Error::Miette(err) => err,
        }
    }
}

impl Error {
    pub fn wrap_err_with<D, F>(self, f: F) -> Error
    where
        D: Display + Send + Sync + 'static,
        F: FnOnce() -> D,
    {
        match self {
            Error::Miette(report) => Error::Miette(report.wrap_err(f())),
            err => err,
        }
    }
}

/// Shorthand for returning an error from a plain message.
pub fn bail<T>(msg: impl Display + Send + Sync + 'static) -> Result<T> {
    Err(Error::Miette(miette!("{msg}")))
}

pub type Result<T> = std::result::Result<T, Error>;
