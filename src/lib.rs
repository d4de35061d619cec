//! Typed clients for remote hubs.
//!
//! A contract is a trait declared with [`contract!`]. [`connect`] opens a
//! [`HubConnection`], and [`create_proxy`] turns the contract into a client
//! whose methods are forwarded to the hub method of the same name:
//!
//! ```no_run
//! use hubproxy::{contract, Completion, HubProxy};
//!
//! contract! {
//!     pub trait Calculator: HubProxy {
//!         fn ping(&self) -> Completion;
//!         fn add(&self, a: i64, b: i64) -> Completion<i64>;
//!     }
//! }
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let calc = hubproxy::connect::<dyn Calculator>("tcp://127.0.0.1:8888").await?;
//! calc.ping().await?;
//! assert_eq!(calc.add(2, 3).await?, 5);
//! # Ok(())
//! # }
//! ```
//!
//! Every method is resolved against the connection's invoke overloads when
//! the proxy is built, so a contract the connection cannot serve is rejected
//! up front rather than at call time.

#[macro_use]
mod macros;

pub mod connection;
pub mod contract;
pub mod dispatcher;
pub mod error;
pub mod hub;
pub mod invoke;
pub mod net;
pub mod proxy;
pub mod resolver;
pub mod types;

pub use connection::{Connection, ConnectionState, Invocation};
pub use contract::{
    analyze, Arg, Argument, Contract, ContractInfo, MemberInfo, MemberKind, MethodDescriptor,
    ParamType, ReturnShape, Visibility,
};
pub use dispatcher::Dispatcher;
pub use error::{DispatchError, Error, InvokeError, ResolveError, Result};
pub use hub::{FromArgs, Hub, HubError};
pub use invoke::{invoke, invoke_as, Completion, Overload, MAX_INVOKE_ARGS};
pub use net::client::{ConnectionBuilder, HubConnection};
pub use proxy::{create_proxy, HubProxy, Proxy, ProxyBuilder};
pub use resolver::{InvocationResolver, InvocationShape, ResolvedInvoke};
pub use tokio_util::sync::CancellationToken;
pub use types::{Decode, Encode, Type, TypeMismatch, Typed, Value};

use std::sync::Arc;
use tracing::debug;

/// Connects to the hub at `url` and builds a client for contract `C`.
pub async fn connect<C>(url: &str) -> Result<C::Client>
where
    C: Contract + ?Sized,
{
    connect_with::<C, _>(url, |builder| builder).await
}

/// Like [`connect`], with a hook to configure the connection first.
pub async fn connect_with<C, F>(url: &str, configure: F) -> Result<C::Client>
where
    C: Contract + ?Sized,
    F: FnOnce(ConnectionBuilder) -> ConnectionBuilder,
{
    let connection = configure(ConnectionBuilder::new(url)).build()?;
    if let Err(e) = connection.start().await {
        return Err(Error::ConnectFailed {
            url: url.to_owned(),
            state: connection.state(),
            reason: e.to_string(),
        });
    }

    let state = connection.state();
    if state != ConnectionState::Connected {
        return Err(Error::ConnectFailed {
            url: url.to_owned(),
            state,
            reason: "hub hung up during start".into(),
        });
    }
    debug!(url, "connected");

    let connection: Arc<dyn Connection> = Arc::new(connection);
    create_proxy::<C>(&connection)
}
