use std::time::Duration;
use std::{error, fmt, io};

pub type Result<T, E = Error> = anyhow::Result<T, E>;

/// Error categories recognized across the ingestion core.
///
/// Jobs and the data manager branch on these kinds rather than on concrete
/// error sources: a `RateLimited` error terminates an execution as
/// `rate_limited` (a normal state, not a failure), while `Timeout` and
/// `Cancelled` carry their standard markers into the execution ledger.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum ErrorKind {
    /// The external API answered 429 or a local bucket refused admission.
    RateLimited,
    /// The external API answered 404 for the requested entity.
    ExternalNotFound,
    /// 5xx or network-level failure talking to the external API.
    ExternalTransient,
    /// Unrecoverable external response (unexpected 4xx, malformed body).
    ExternalFatal,
    /// Recoverable database failure (pool exhaustion, lost connection).
    PersistenceTransient,
    /// Unrecoverable database failure (constraint violation, bad query).
    PersistenceFatal,
    /// The surrounding execution was cancelled cooperatively.
    Cancelled,
    /// A watchdog or request deadline expired.
    Timeout,
    /// Invalid static configuration (weights, schedules, credentials).
    ConfigInvalid,
    /// Programmer error or an unclassified internal failure.
    Internal,
}

#[derive(Debug)]
enum ErrorRepr {
    WithDescription(ErrorKind, &'static str),
    WithDescriptionAndDetail(ErrorKind, &'static str, String),
    RateLimited(Option<Duration>),
    IoError(io::Error),
    DbError(diesel::result::Error),
    PoolError(r2d2::Error),
    HttpError(reqwest::Error),
    AnyhowError(anyhow::Error),
}

pub struct Error {
    repr: ErrorRepr,
}

impl Error {
    /// Builds a rate-limit error carrying the server-suggested back-off.
    pub fn rate_limited(retry_after: Option<Duration>) -> Error {
        Error {
            repr: ErrorRepr::RateLimited(retry_after),
        }
    }

    /// The category this error maps to under the propagation policy.
    pub fn kind(&self) -> ErrorKind {
        match &self.repr {
            ErrorRepr::WithDescription(kind, _) => *kind,
            ErrorRepr::WithDescriptionAndDetail(kind, _, _) => *kind,
            ErrorRepr::RateLimited(_) => ErrorKind::RateLimited,
            ErrorRepr::IoError(_) => ErrorKind::Internal,
            ErrorRepr::DbError(_) => ErrorKind::PersistenceFatal,
            ErrorRepr::PoolError(_) => ErrorKind::PersistenceTransient,
            ErrorRepr::HttpError(err) => {
                if err.is_timeout() {
                    ErrorKind::Timeout
                } else {
                    ErrorKind::ExternalTransient
                }
            }
            ErrorRepr::AnyhowError(_) => ErrorKind::Internal,
        }
    }

    /// Server-suggested wait, when this is a rate-limit error that carried one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self.repr {
            ErrorRepr::RateLimited(retry_after) => retry_after,
            _ => None,
        }
    }

    /// A short, sanitized message suitable for the execution ledger.
    pub fn ledger_message(&self) -> String {
        match &self.repr {
            ErrorRepr::WithDescription(_, desc) => (*desc).to_string(),
            ErrorRepr::WithDescriptionAndDetail(_, desc, detail) => {
                format!("{desc}: {detail}")
            }
            ErrorRepr::RateLimited(Some(wait)) => {
                format!("rate limited, retry after {}s", wait.as_secs())
            }
            ErrorRepr::RateLimited(None) => "rate limited".to_string(),
            ErrorRepr::IoError(_) => "io error".to_string(),
            ErrorRepr::DbError(err) => format!("database error: {err}"),
            ErrorRepr::PoolError(_) => "connection pool unavailable".to_string(),
            ErrorRepr::HttpError(err) => {
                if err.is_timeout() {
                    "request timed out".to_string()
                } else {
                    "http transport error".to_string()
                }
            }
            ErrorRepr::AnyhowError(err) => format!("{err:#}"),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error {
            repr: ErrorRepr::IoError(err),
        }
    }
}

impl From<diesel::result::Error> for Error {
    fn from(err: diesel::result::Error) -> Error {
        Error {
            repr: ErrorRepr::DbError(err),
        }
    }
}

impl From<r2d2::Error> for Error {
    fn from(err: r2d2::Error) -> Error {
        Error {
            repr: ErrorRepr::PoolError(err),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Error {
        Error {
            repr: ErrorRepr::HttpError(err),
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Error {
        Error {
            repr: ErrorRepr::AnyhowError(err),
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Error {
        Error {
            repr: ErrorRepr::WithDescriptionAndDetail(
                ErrorKind::ConfigInvalid,
                "configuration error",
                err.to_string(),
            ),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Error {
        Error {
            repr: ErrorRepr::WithDescriptionAndDetail(
                ErrorKind::Internal,
                "json serialization error",
                err.to_string(),
            ),
        }
    }
}

impl From<(ErrorKind, &'static str)> for Error {
    fn from((kind, desc): (ErrorKind, &'static str)) -> Error {
        Error {
            repr: ErrorRepr::WithDescription(kind, desc),
        }
    }
}

impl From<(ErrorKind, &'static str, String)> for Error {
    fn from((kind, desc, detail): (ErrorKind, &'static str, String)) -> Error {
        Error {
            repr: ErrorRepr::WithDescriptionAndDetail(kind, desc, detail),
        }
    }
}

impl error::Error for Error {
    fn cause(&self) -> Option<&dyn error::Error> {
        match self.repr {
            ErrorRepr::IoError(ref err) => Some(err as &dyn error::Error),
            ErrorRepr::DbError(ref err) => Some(err as &dyn error::Error),
            ErrorRepr::HttpError(ref err) => Some(err as &dyn error::Error),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.repr {
            ErrorRepr::WithDescription(_, desc) => desc.fmt(f),
            ErrorRepr::WithDescriptionAndDetail(_, desc, ref detail) => {
                desc.fmt(f)?;
                f.write_str(": ")?;
                detail.fmt(f)
            }
            ErrorRepr::RateLimited(Some(ref wait)) => {
                write!(f, "rate limited (retry after {}s)", wait.as_secs())
            }
            ErrorRepr::RateLimited(None) => f.write_str("rate limited"),
            ErrorRepr::IoError(ref err) => err.fmt(f),
            ErrorRepr::DbError(ref err) => err.fmt(f),
            ErrorRepr::PoolError(ref err) => err.fmt(f),
            ErrorRepr::HttpError(ref err) => err.fmt(f),
            ErrorRepr::AnyhowError(ref err) => err.fmt(f),
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
