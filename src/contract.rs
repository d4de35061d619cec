//! Contract member tables and the analysis that picks dispatchable methods.
//!
//! A [`ContractInfo`] is normally generated by [`contract!`](crate::contract),
//! but it is plain data and can be assembled by hand to describe a contract
//! that only exists at runtime.

use crate::{
    proxy::Proxy,
    types::{Encode, Type, Typed, Value},
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// A contract: something a [`Proxy`] can be built for.
///
/// Implemented by `contract!` for `dyn Trait`, with `Client = Box<dyn Trait>`.
pub trait Contract {
    type Client;

    /// Every member of the contract, in declaration order.
    fn describe() -> ContractInfo;

    /// Wraps a proxy built from [`describe`](Contract::describe) into the
    /// contract's client type.
    fn bind(proxy: Proxy) -> Self::Client;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Method,
    /// A member exposing state rather than an operation, such as the
    /// connection accessor.
    Accessor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Restricted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnShape {
    /// A completion without payload.
    Bare,
    /// A completion carrying one payload of the given type.
    Payload(Type),
    /// Anything else.
    Opaque,
}

impl ReturnShape {
    pub fn payload<T: Typed>() -> Self {
        ReturnShape::Payload(T::rpc_type())
    }

    fn is_completion(&self) -> bool {
        !matches!(self, ReturnShape::Opaque)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    Value(Type),
    Cancellation,
}

/// An argument as passed through a generated client.
#[derive(Debug, Clone)]
pub enum Arg {
    Value(Value),
    Cancel(CancellationToken),
}

/// Types usable as contract method parameters.
pub trait Argument {
    fn param_type() -> ParamType;
    fn into_arg(self) -> Arg;
}

impl<T: Typed + Encode> Argument for T {
    fn param_type() -> ParamType {
        ParamType::Value(T::rpc_type())
    }

    fn into_arg(self) -> Arg {
        Arg::Value(T::encode(self))
    }
}

impl Argument for CancellationToken {
    fn param_type() -> ParamType {
        ParamType::Cancellation
    }

    fn into_arg(self) -> Arg {
        Arg::Cancel(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    pub name: &'static str,
    pub kind: MemberKind,
    pub visibility: Visibility,
    /// Whether a proxy may supply the implementation.
    pub overridable: bool,
    pub params: Vec<ParamType>,
    pub returns: ReturnShape,
}

impl MemberInfo {
    /// A public method with no implementation of its own.
    pub fn method(name: &'static str, params: Vec<ParamType>, returns: ReturnShape) -> Self {
        Self {
            name,
            kind: MemberKind::Method,
            visibility: Visibility::Public,
            overridable: true,
            params,
            returns,
        }
    }

    /// A method that already has a body in the contract.
    pub fn provided(name: &'static str) -> Self {
        Self {
            overridable: false,
            ..Self::method(name, Vec::new(), ReturnShape::Opaque)
        }
    }

    /// The accessor handing out the proxy's connection.
    pub fn connection_accessor() -> Self {
        Self {
            kind: MemberKind::Accessor,
            ..Self::method(CONNECTION_ACCESSOR, Vec::new(), ReturnShape::Opaque)
        }
    }

    pub fn restricted(self) -> Self {
        Self {
            visibility: Visibility::Restricted,
            ..self
        }
    }

    fn is_connection_accessor(&self) -> bool {
        self.kind == MemberKind::Accessor && self.name == CONNECTION_ACCESSOR
    }
}

const CONNECTION_ACCESSOR: &str = "connection";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractInfo {
    name: &'static str,
    members: Vec<MemberInfo>,
}

impl ContractInfo {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            members: Vec::new(),
        }
    }

    pub fn push(&mut self, member: MemberInfo) {
        self.members.push(member);
    }

    pub fn with(mut self, member: MemberInfo) -> Self {
        self.push(member);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn members(&self) -> &[MemberInfo] {
        &self.members
    }

    /// Whether the contract asks for the connection accessor.
    pub fn exposes_connection(&self) -> bool {
        self.members.iter().any(MemberInfo::is_connection_accessor)
    }
}

/// A contract method selected for remote dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub name: Arc<str>,
    pub params: Vec<ParamType>,
    pub payload: Option<Type>,
}

/// Selects the members of `info` that can be dispatched remotely, in
/// declaration order.
///
/// A member qualifies when it is an overridable, public method returning a
/// completion. Others are skipped, not rejected: a contract may carry helpers
/// and accessors next to its remote surface.
pub fn analyze(info: &ContractInfo) -> Vec<MethodDescriptor> {
    info.members
        .iter()
        .filter(|member| {
            let dispatchable = member.overridable
                && member.kind == MemberKind::Method
                && member.visibility == Visibility::Public
                && member.returns.is_completion();
            if !dispatchable {
                trace!(contract = info.name, member = member.name, "not dispatchable");
            }
            dispatchable
        })
        .map(|member| MethodDescriptor {
            name: member.name.into(),
            params: member.params.clone(),
            payload: match &member.returns {
                ReturnShape::Payload(typ) => Some(typ.clone()),
                _ => None,
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(descriptors: &[MethodDescriptor]) -> Vec<&str> {
        descriptors.iter().map(|d| &*d.name).collect()
    }

    #[test]
    fn keeps_declaration_order() {
        let info = ContractInfo::new("Calc")
            .with(MemberInfo::method("sub", vec![], ReturnShape::payload::<i64>()))
            .with(MemberInfo::method("add", vec![], ReturnShape::payload::<i64>()))
            .with(MemberInfo::method("ping", vec![], ReturnShape::Bare));
        assert_eq!(names(&analyze(&info)), ["sub", "add", "ping"]);
    }

    #[test]
    fn skips_non_dispatchable_members() {
        let info = ContractInfo::new("Mixed")
            .with(MemberInfo::connection_accessor())
            .with(MemberInfo::provided("label"))
            .with(MemberInfo::method("secret", vec![], ReturnShape::Bare).restricted())
            .with(MemberInfo::method("sync", vec![], ReturnShape::Opaque))
            .with(MemberInfo::method("ping", vec![], ReturnShape::Bare));

        assert!(info.exposes_connection());
        assert_eq!(names(&analyze(&info)), ["ping"]);
    }

    #[test]
    fn extracts_payload_and_params() {
        let params = vec![i64::param_type(), CancellationToken::param_type()];
        let info = ContractInfo::new("Calc").with(MemberInfo::method(
            "slow_add",
            params.clone(),
            ReturnShape::payload::<Vec<String>>(),
        ));

        let descriptors = analyze(&info);
        let [desc] = &descriptors[..] else {
            panic!("expected one descriptor");
        };
        assert_eq!(desc.params, params);
        assert_eq!(desc.payload, Some(Type::list(Type::String)));
    }

    #[test]
    fn accessor_named_differently_is_not_recognized() {
        let info = ContractInfo::new("Odd").with(MemberInfo {
            name: "conn",
            ..MemberInfo::connection_accessor()
        });
        assert!(!info.exposes_connection());
    }
}
