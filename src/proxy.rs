//! Proxy construction: turns a contract's member table into a dispatch table
//! bound to one connection.

use crate::{
    connection::{Connection, ConnectionState},
    contract::{analyze, Arg, Contract, ContractInfo},
    dispatcher::Dispatcher,
    error::{DispatchError, Error, InvokeError, Result},
    invoke::Completion,
    resolver::InvocationResolver,
    types::{Decode, Value},
};
use futures::{future, TryFutureExt};
use std::{collections::BTreeMap, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Recognized connection accessor. A contract listing `HubProxy` as a
/// supertrait gets back the connection its proxy was built on.
pub trait HubProxy {
    fn connection(&self) -> &Arc<dyn Connection>;
}

/// Name-keyed table of dispatchers, one per dispatchable contract method.
pub struct Proxy {
    contract: &'static str,
    connection: Arc<dyn Connection>,
    dispatchers: Vec<Dispatcher>,
    index: BTreeMap<Arc<str>, usize>,
}

impl Proxy {
    pub fn contract(&self) -> &'static str {
        self.contract
    }

    /// The connection this proxy forwards to. The proxy only holds a
    /// reference; it never closes it.
    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    /// Dispatchers in contract declaration order.
    pub fn methods(&self) -> impl Iterator<Item = &Dispatcher> {
        self.dispatchers.iter()
    }

    pub fn dispatcher(&self, name: &str) -> Option<&Dispatcher> {
        self.index.get(name).map(|&i| &self.dispatchers[i])
    }

    /// Calls `name` with `args`. For a method declaring a cancellation token,
    /// a token that never fires is passed.
    pub fn invoke(
        &self,
        name: &str,
        args: Vec<Value>,
    ) -> std::result::Result<Completion<Value>, DispatchError> {
        self.dispatch(name, args, None)
    }

    pub fn invoke_with_cancellation(
        &self,
        name: &str,
        args: Vec<Value>,
        cancel: CancellationToken,
    ) -> std::result::Result<Completion<Value>, DispatchError> {
        self.dispatch(name, args, Some(cancel))
    }

    fn dispatch(
        &self,
        name: &str,
        args: Vec<Value>,
        cancel: Option<CancellationToken>,
    ) -> std::result::Result<Completion<Value>, DispatchError> {
        let dispatcher = self
            .dispatcher(name)
            .ok_or_else(|| DispatchError::NoSuchMethod(name.to_owned()))?;
        let shape = dispatcher.shape();
        if args.len() != shape.user_args {
            return Err(DispatchError::ArgumentCount {
                method: name.to_owned(),
                expected: shape.user_args,
                actual: args.len(),
            });
        }
        if cancel.is_some() && !shape.cancellable {
            return Err(DispatchError::CancellationNotDeclared(name.to_owned()));
        }
        Ok(dispatcher.dispatch(args, cancel))
    }

    #[doc(hidden)]
    pub fn call_bare(&self, name: &str, args: Vec<Arg>) -> Completion {
        let (args, cancel) = split_args(args);
        match self.dispatch(name, args, cancel) {
            Ok(pending) => Box::pin(pending.map_ok(|_| ())),
            Err(e) => Box::pin(future::ready(Err(InvokeError::from(e)))),
        }
    }

    #[doc(hidden)]
    pub fn call_typed<T>(&self, name: &str, args: Vec<Arg>) -> Completion<T>
    where
        T: Decode + Send + 'static,
    {
        let (args, cancel) = split_args(args);
        match self.dispatch(name, args, cancel) {
            Ok(pending) => Box::pin(async move { Ok(T::decode(pending.await?)?) }),
            Err(e) => Box::pin(future::ready(Err(InvokeError::from(e)))),
        }
    }
}

fn split_args(args: Vec<Arg>) -> (Vec<Value>, Option<CancellationToken>) {
    let mut cancel = None;
    let values = args
        .into_iter()
        .filter_map(|arg| match arg {
            Arg::Value(val) => Some(val),
            Arg::Cancel(token) => {
                cancel = Some(token);
                None
            }
        })
        .collect();
    (values, cancel)
}

/// Builds proxies against one connection.
pub struct ProxyBuilder {
    connection: Arc<dyn Connection>,
}

impl ProxyBuilder {
    pub fn new(connection: &Arc<dyn Connection>) -> Self {
        Self {
            connection: connection.clone(),
        }
    }

    /// Resolves every dispatchable member of `info` and binds a dispatcher to
    /// it. Either every method resolves or no proxy is returned.
    pub fn build(&self, info: &ContractInfo) -> Result<Proxy> {
        let state = self.connection.state();
        if state != ConnectionState::Connected {
            return Err(Error::NotConnected(state));
        }

        if info.exposes_connection() {
            debug!(contract = info.name(), "binding connection accessor");
        }

        let resolver = InvocationResolver::new(self.connection.overloads());
        let mut dispatchers = Vec::new();
        let mut index = BTreeMap::new();

        for method in analyze(info) {
            let resolved = resolver.resolve(&method)?;
            if index.insert(method.name.clone(), dispatchers.len()).is_some() {
                return Err(Error::DuplicateMethod {
                    contract: info.name().to_owned(),
                    method: method.name.to_string(),
                });
            }
            dispatchers.push(Dispatcher::new(
                method.name,
                resolved,
                self.connection.clone(),
            ));
        }

        debug!(
            contract = info.name(),
            methods = dispatchers.len(),
            "proxy built"
        );
        Ok(Proxy {
            contract: info.name(),
            connection: self.connection.clone(),
            dispatchers,
            index,
        })
    }
}

/// Builds a client for contract `C` on an already connected `connection`.
pub fn create_proxy<C>(connection: &Arc<dyn Connection>) -> Result<C::Client>
where
    C: Contract + ?Sized,
{
    let proxy = ProxyBuilder::new(connection).build(&C::describe())?;
    Ok(C::bind(proxy))
}
