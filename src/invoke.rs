//! The invoke primitive and the overload table describing its shapes.
//!
//! An invocation is addressed as `[connection, method, args…, (cancel)]`.
//! [`invoke`] is the untyped variant whose completion carries no payload;
//! [`invoke_as`] is the typed variant, bound to a payload [`Type`] that the
//! returned value is checked against.

use crate::{
    connection::{Connection, Invocation},
    error::InvokeError,
    types::{Type, Value},
};
use futures::{future::BoxFuture, TryFutureExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Handle on the eventual outcome of a remote invocation.
///
/// `Completion` (no parameter) is the bare handle; `Completion<T>` carries a
/// single payload.
pub type Completion<T = ()> = BoxFuture<'static, Result<T, InvokeError>>;

/// Leading arguments of every invoke call: the connection and the method name.
pub const LEADING_ARGS: usize = 2;

/// Most user arguments any standard overload accepts.
pub const MAX_INVOKE_ARGS: usize = 10;

const STANDARD_OVERLOAD_COUNT: usize = (MAX_INVOKE_ARGS + 1) * 4;

/// One signature of the invoke primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overload {
    /// Total argument count, leading arguments and cancellation slot included.
    pub arity: usize,
    /// Whether the last argument is a cancellation token.
    pub cancellable: bool,
    /// Whether the overload is bound to a payload type.
    pub generic: bool,
}

impl Overload {
    pub const fn new(user_args: usize, cancellable: bool, generic: bool) -> Self {
        Self {
            arity: LEADING_ARGS + user_args + cancellable as usize,
            cancellable,
            generic,
        }
    }

    /// User arguments this overload takes; `None` when `arity` is too small
    /// to hold the leading arguments and the cancellation slot.
    pub fn user_args(&self) -> Option<usize> {
        self.arity.checked_sub(LEADING_ARGS + usize::from(self.cancellable))
    }
}

/// 0 to [`MAX_INVOKE_ARGS`] user arguments, with and without a trailing
/// cancellation token, untyped and typed.
pub static STANDARD_OVERLOADS: [Overload; STANDARD_OVERLOAD_COUNT] = standard_overloads();

const fn standard_overloads() -> [Overload; STANDARD_OVERLOAD_COUNT] {
    let mut table = [Overload::new(0, false, false); STANDARD_OVERLOAD_COUNT];
    let mut i = 0;
    while i < STANDARD_OVERLOAD_COUNT {
        table[i] = Overload::new(i / 4, i % 4 >= 2, i % 2 == 1);
        i += 1;
    }
    table
}

/// Untyped invoke: completes once the hub acknowledges the call, dropping
/// whatever value it answered with.
pub fn invoke(
    connection: &dyn Connection,
    method: Arc<str>,
    args: Vec<Value>,
    cancel: Option<CancellationToken>,
) -> Completion {
    let pending = connection.send_invocation(Invocation {
        method,
        args,
        cancel,
    });
    Box::pin(pending.map_ok(|_| ()))
}

/// Typed invoke: completes with the hub's answer once it is known to be a
/// `payload`.
pub fn invoke_as(
    connection: &dyn Connection,
    method: Arc<str>,
    args: Vec<Value>,
    cancel: Option<CancellationToken>,
    payload: Type,
) -> Completion<Value> {
    let pending = connection.send_invocation(Invocation {
        method,
        args,
        cancel,
    });
    Box::pin(async move {
        let val = pending.await?;
        payload.check(&val)?;
        Ok(val)
    })
}
