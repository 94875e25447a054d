use std::fmt;

/// Errors surfaced at the document boundary.
///
/// Content-level problems (an unknown filter, a bad code point, a reference
/// cycle) are tolerated locally and never reach this type.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Malformed PDF beyond recovery.
    Parse {
        message: String,
        offset: Option<usize>,
    },
    /// Well-formed PDF that requires a feature outside this crate's scope.
    Unsupported(String),
}

impl Error {
    pub(crate) fn parse(message: impl Into<String>) -> Self {
        Error::Parse {
            message: message.into(),
            offset: None,
        }
    }

    pub(crate) fn parse_at(message: impl Into<String>, offset: usize) -> Self {
        Error::Parse {
            message: message.into(),
            offset: Some(offset),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Parse {
                message,
                offset: Some(offset),
            } => write!(f, "malformed PDF at byte {}: {}", offset, message),
            Error::Parse {
                message,
                offset: None,
            } => write!(f, "malformed PDF: {}", message),
            Error::Unsupported(message) => write!(f, "unsupported PDF feature: {}", message),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
