//! Error types for proxy construction and remote invocation.

use crate::{connection::ConnectionState, types::TypeMismatch};
use thiserror::Error;

/// Errors raised while connecting or building a proxy.
///
/// Nothing here is ever produced at call time; call-time failures travel
/// through the returned [`Completion`](crate::Completion) as [`InvokeError`].
#[derive(Debug, Error)]
pub enum Error {
    /// The connection did not reach [`ConnectionState::Connected`].
    #[error("couldn't connect to host {url}: connection is {state} ({reason})")]
    ConnectFailed {
        url: String,
        state: ConnectionState,
        reason: String,
    },

    /// Proxy construction requires a connected connection.
    #[error("cannot build a proxy: connection is {0}, expected Connected")]
    NotConnected(ConnectionState),

    #[error("invalid hub url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("handshake with hub failed: {0}")]
    Handshake(String),

    #[error("connection already started (state is {0})")]
    AlreadyStarted(ConnectionState),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("method `{method}` is declared more than once in contract `{contract}`")]
    DuplicateMethod { contract: String, method: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// No invoke overload of the connection fits a contract method.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error(
        "method `{method}` cannot be dispatched: no {} invoke overload takes {arity} arguments",
        overload_kind(.generic)
    )]
    NoMatchingOverload {
        method: String,
        arity: usize,
        generic: bool,
    },

    #[error("method `{method}` matches {candidates} invoke overloads taking {arity} arguments")]
    AmbiguousOverload {
        method: String,
        arity: usize,
        candidates: usize,
    },

    #[error("method `{method}` declares a cancellation token at position {position}; it must be the last parameter")]
    MisplacedCancellation { method: String, position: usize },
}

fn overload_kind(generic: &bool) -> &'static str {
    if *generic {
        "typed"
    } else {
        "untyped"
    }
}

/// Misuse of the dynamic call path, detected before anything is sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("no method `{0}` on this proxy")]
    NoSuchMethod(String),

    #[error("method `{method}` takes {expected} arguments, got {actual}")]
    ArgumentCount {
        method: String,
        expected: usize,
        actual: usize,
    },

    #[error("method `{0}` does not declare a cancellation token")]
    CancellationNotDeclared(String),
}

/// Failure of a single remote invocation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvokeError {
    #[error("connection is not connected")]
    NotConnected,

    #[error("connection closed before the invocation completed")]
    ConnectionClosed,

    #[error("invocation was cancelled")]
    Cancelled,

    /// The hub reported a failure.
    #[error("remote error: {0}")]
    Remote(String),

    #[error("payload {0}")]
    Payload(#[from] TypeMismatch),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
