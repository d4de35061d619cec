//! Per-method forwarding from a proxy to its connection.

use crate::{
    connection::Connection,
    invoke::{invoke, invoke_as, Completion},
    resolver::{InvocationShape, ResolvedInvoke},
    types::Value,
};
use futures::TryFutureExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Forwards calls of one contract method to the connection.
pub struct Dispatcher {
    name: Arc<str>,
    resolved: ResolvedInvoke,
    connection: Arc<dyn Connection>,
}

impl Dispatcher {
    pub(crate) fn new(
        name: Arc<str>,
        resolved: ResolvedInvoke,
        connection: Arc<dyn Connection>,
    ) -> Self {
        Self {
            name,
            resolved,
            connection,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> &InvocationShape {
        &self.resolved.shape
    }

    /// Sends `[connection, name, args…, (cancel)]` through the resolved
    /// overload, once. A method declaring a cancellation token always gets
    /// one; callers that have none get a token that never fires.
    pub(crate) fn dispatch(
        &self,
        args: Vec<Value>,
        cancel: Option<CancellationToken>,
    ) -> Completion<Value> {
        let shape = &self.resolved.shape;
        let cancel = shape.cancellable.then(|| cancel.unwrap_or_default());
        trace!(method = &*self.name, args = args.len(), "dispatch");

        match &shape.payload {
            Some(payload) => invoke_as(
                &*self.connection,
                self.name.clone(),
                args,
                cancel,
                payload.clone(),
            ),
            None => Box::pin(
                invoke(&*self.connection, self.name.clone(), args, cancel).map_ok(|()| Value::Nil),
            ),
        }
    }
}
