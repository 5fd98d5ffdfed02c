use std::net::SocketAddr;

use thiserror::Error;

use crate::registry::ParamType;

/// A contributed operation source could not be read. Logged and skipped.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("operation source '{source_name}' failed: {reason}")]
    SourceFailed { source_name: String, reason: String },
    #[error(transparent)]
    Registration(#[from] RegistrationError),
}

/// Rejected at registration time, before any request can reach the operation.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("operation path is empty")]
    EmptyPath,
    #[error("parameter '{parameter}' of {path} declares unsupported type '{type_name}'")]
    UnsupportedType {
        path: String,
        parameter: String,
        type_name: String,
    },
    #[error("parameter '{parameter}' is declared twice on {path}")]
    DuplicateParameter { path: String, parameter: String },
    #[error("default for parameter '{parameter}' of {path} is invalid: {source}")]
    InvalidDefault {
        path: String,
        parameter: String,
        #[source]
        source: ArgumentCoercionError,
    },
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("could not convert '{raw}' to {expected} for parameter '{parameter}'")]
pub struct ArgumentCoercionError {
    pub parameter: String,
    pub raw: String,
    pub expected: ParamType,
}

/// Returned (or raised as a panic) by an operation running on the main tick.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{0}")]
pub struct InvocationError(pub String);

impl From<String> for InvocationError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for InvocationError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResponseLifecycleError {
    #[error("response for {path} was already finalized")]
    AlreadyFinalized { path: String },
    #[error("client for {path} is no longer waiting for a response")]
    ClientGone { path: String },
}

/// Transport level faults of the HTTP listener.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid bind address '{0}'")]
    InvalidAddress(String),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("listener thread failed: {0}")]
    Listener(#[from] std::io::Error),
}
