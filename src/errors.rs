use std::fmt;

use reqwest::StatusCode;

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Json(serde_json::Error),
    Http(reqwest::Error),
    Config(String),
    Storage(String),
    /// Non-success status as returned by the server, before normalization.
    Status(StatusCode, String),
    /// 401 that survived the refresh-and-replay path.
    Unauthorized(StatusCode, String),
    /// Any non-401 failure, carrying the user-facing message.
    OperationFailed {
        status: Option<StatusCode>,
        message: String,
    },
    /// Envelope answered with a non-zero `status`.
    Api(String),
    Attachment(String),
    Cancelled,
}

impl Error {
    /// HTTP status attached to the failure, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Status(status, _) | Error::Unauthorized(status, _) => Some(*status),
            Error::OperationFailed { status, .. } => *status,
            Error::Http(err) => err.status(),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "io error: {err}"),
            Error::Json(err) => write!(f, "invalid json payload: {err}"),
            Error::Http(err) => write!(f, "{err}"),
            Error::Config(msg) => write!(f, "configuration error: {msg}"),
            Error::Storage(msg) => write!(f, "storage error: {msg}"),
            Error::Status(status, msg) => {
                write!(f, "request failed with status {}: {msg}", status.as_u16())
            }
            Error::Unauthorized(status, msg) => {
                write!(f, "unauthorized ({}): {msg}", status.as_u16())
            }
            Error::OperationFailed { message, .. } => write!(f, "{message}"),
            Error::Api(msg) => write!(f, "{msg}"),
            Error::Attachment(msg) => write!(f, "failed to save attachment: {msg}"),
            Error::Cancelled => write!(f, "request cancelled"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Json(err) => Some(err),
            Error::Http(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Http(err)
    }
}
