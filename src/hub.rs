use crate::types::{Decode, Encode, Type, TypeMismatch, Typed, Value};
use futures::{
    future::{self, BoxFuture},
    FutureExt,
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt::Display, future::Future};
use thiserror::Error;

/// Server side of a hub: named methods callable with a list of [`Value`]s.
///
/// Methods are registered with [`method`](Hub::method) or
/// [`try_method`](Hub::try_method), called via [`call`](Hub::call), and
/// listed with [`methods`](Hub::methods). See [`net::server`](crate::net::server)
/// for serving a hub over TCP.
#[derive(Default)]
pub struct Hub {
    methods: BTreeMap<String, HubMethod>,
}

struct HubMethod {
    params: Vec<Type>,
    call: Box<DynamicHubMethod>,
}

/// A type-erased hub method
type DynamicHubMethod = dyn Fn(Vec<Value>) -> BoxFuture<'static, CallResult> + Send + Sync;

pub type CallResult = Result<Value, HubError>;

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an infallible method. `A` is the tuple of its arguments.
    pub fn method<F, A, Fut, R>(self, name: &str, handler: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        A: FromArgs + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: Encode + 'static,
    {
        self.try_method(name, move |args: A| handler(args).map(Ok::<R, HubError>))
    }

    /// Registers a method whose failures are reported to the caller as
    /// remote errors.
    pub fn try_method<F, A, Fut, R, E>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        A: FromArgs + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        R: Encode + 'static,
        E: Display + 'static,
    {
        let call = move |args: Vec<Value>| -> BoxFuture<'static, CallResult> {
            match A::from_args(args) {
                Ok(args) => handler(args)
                    .map(|reply| reply.map(R::encode).map_err(|e| HubError::Handler(e.to_string())))
                    .boxed(),
                Err(e) => future::ready(Err(e)).boxed(),
            }
        };
        let method = HubMethod {
            params: A::param_types(),
            call: Box::new(call),
        };
        self.methods.insert(name.to_owned(), method);
        self
    }

    pub async fn call(&self, name: &str, args: Vec<Value>) -> CallResult {
        let method = self
            .methods
            .get(name)
            .ok_or_else(|| HubError::NoSuchMethod(name.to_owned()))?;
        (method.call)(args).await
    }

    pub fn methods(&self) -> Vec<HubMethodInfo> {
        self.methods
            .iter()
            .map(|(name, method)| HubMethodInfo {
                name: name.clone(),
                params: method.params.clone(),
            })
            .collect()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HubMethodInfo {
    pub name: String,
    pub params: Vec<Type>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HubError {
    #[error("no method named `{0}`")]
    NoSuchMethod(String),

    #[error("expected {expected} arguments, got {actual}")]
    ArgumentCount { expected: usize, actual: usize },

    #[error("argument {position}: {mismatch}")]
    Argument {
        position: usize,
        mismatch: TypeMismatch,
    },

    #[error("{0}")]
    Handler(String),
}

/// Argument tuples a hub method can be called with.
pub trait FromArgs: Sized {
    fn param_types() -> Vec<Type>;
    fn from_args(args: Vec<Value>) -> Result<Self, HubError>;
}

macro_rules! impl_from_args {
    ($($arg:ident),*) => {
        impl<$($arg: Decode + Typed),*> FromArgs for ($($arg,)*) {
            fn param_types() -> Vec<Type> {
                vec![$($arg::rpc_type()),*]
            }

            #[allow(unused_mut, unused_variables, unused_assignments, non_snake_case)]
            fn from_args(args: Vec<Value>) -> Result<Self, HubError> {
                let expected = Self::param_types().len();
                if args.len() != expected {
                    return Err(HubError::ArgumentCount {
                        expected,
                        actual: args.len(),
                    });
                }
                let mut args = args.into_iter();
                let mut position = 0;
                $(
                    let $arg = $arg::decode(args.next().unwrap_or(Value::Nil))
                        .map_err(|mismatch| HubError::Argument { position, mismatch })?;
                    position += 1;
                )*
                Ok(($($arg,)*))
            }
        }
    };
}

impl_from_args!();
impl_from_args!(A);
impl_from_args!(A, B);
impl_from_args!(A, B, C);
impl_from_args!(A, B, C, D);

#[cfg(test)]
mod tests {
    use super::*;

    fn calculator() -> Hub {
        Hub::new()
            .method("ping", |()| async {})
            .method("add", |(a, b): (i64, i64)| async move { a + b })
            .try_method("div", |(a, b): (i64, i64)| async move {
                a.checked_div(b).ok_or("division by zero")
            })
    }

    #[tokio::test]
    async fn calls_registered_methods() {
        let hub = calculator();
        assert_eq!(hub.call("ping", vec![]).await, Ok(Value::Nil));
        assert_eq!(
            hub.call("add", vec![Value::from(2), Value::from(3)]).await,
            Ok(Value::Int(5))
        );
    }

    #[tokio::test]
    async fn reports_argument_problems() {
        let hub = calculator();
        assert_eq!(
            hub.call("add", vec![Value::from(2)]).await,
            Err(HubError::ArgumentCount {
                expected: 2,
                actual: 1
            })
        );
        assert!(matches!(
            hub.call("add", vec![Value::from(2), Value::from("three")]).await,
            Err(HubError::Argument { position: 1, .. })
        ));
        assert_eq!(
            hub.call("mul", vec![]).await,
            Err(HubError::NoSuchMethod("mul".into()))
        );
    }

    #[tokio::test]
    async fn handler_errors_become_messages() {
        let hub = calculator();
        let err = hub
            .call("div", vec![Value::from(1), Value::from(0)])
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "division by zero");
    }

    #[test]
    fn lists_methods_with_their_params() {
        let names: Vec<_> = calculator()
            .methods()
            .into_iter()
            .map(|info| (info.name, info.params.len()))
            .collect();
        assert_eq!(
            names,
            [
                ("add".to_owned(), 2),
                ("div".to_owned(), 2),
                ("ping".to_owned(), 0)
            ]
        );
    }
}
