//! The connection seam: what a proxy needs from the transport underneath it.

use crate::{
    invoke::{Completion, Overload, LEADING_ARGS, STANDARD_OVERLOADS},
    types::Value,
};
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Faulted,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Faulted => "Faulted",
        })
    }
}

/// One remote call as handed to [`Connection::send_invocation`].
///
/// The connection handle itself is the receiver of `send_invocation`, so an
/// invocation carries everything after it: the method name, the user
/// arguments and the optional trailing cancellation token.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub method: Arc<str>,
    pub args: Vec<Value>,
    pub cancel: Option<CancellationToken>,
}

impl Invocation {
    /// Number of arguments of the invoke primitive this invocation went
    /// through, leading connection handle and method name included.
    pub fn arg_count(&self) -> usize {
        LEADING_ARGS + self.args.len() + usize::from(self.cancel.is_some())
    }
}

/// A persistent channel to a hub.
///
/// Implementations must tolerate concurrent calls to `send_invocation`; the
/// proxy layer never serializes them.
pub trait Connection: Send + Sync + 'static {
    fn state(&self) -> ConnectionState;

    /// The invoke overloads this connection supports. Proxy construction
    /// fails for any contract method whose shape is not listed here.
    fn overloads(&self) -> &[Overload] {
        &STANDARD_OVERLOADS
    }

    /// Sends `invocation` and returns a handle on its completion.
    fn send_invocation(&self, invocation: Invocation) -> Completion<Value>;
}

impl fmt::Debug for dyn Connection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
