use std::collections::BTreeMap;

use crate::analysis::AnalyzerError;
use crate::states::JobState;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("no identity supplied")]
    MissingIdentity,
    #[error("identity could not be decoded: {0}")]
    InvalidIdentity(String),
    #[error("authentication failed")]
    AuthenticationFailed,
}

/// Typed error taxonomy for the core. Adapters translate these into HTTP
/// status codes or bus `*_error` events; the variants never carry transport
/// concerns.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid parameter")]
    InvalidParameter { errors: BTreeMap<String, Vec<String>> },

    #[error("{entity}.{field} must be unique")]
    UniqueConstraint { entity: String, field: String },

    #[error("illegal job transition {from:?} -> {to:?}")]
    InvalidTransition { from: JobState, to: JobState },

    #[error("repository error: {0}")]
    Repository(String),

    #[error("file system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error(transparent)]
    Analyzer(#[from] AnalyzerError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("{0} not found")]
    NotFound(String),
}

impl Error {
    pub fn invalid_parameter(field: impl Into<String>, reason: impl Into<String>) -> Self {
        let mut errors = BTreeMap::new();
        errors.insert(field.into(), vec![reason.into()]);
        Error::InvalidParameter { errors }
    }

    pub fn unique(entity: impl Into<String>, field: impl Into<String>) -> Self {
        Error::UniqueConstraint {
            entity: entity.into(),
            field: field.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
