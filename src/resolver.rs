//! Matches contract methods against the connection's invoke overloads.

use crate::{
    contract::{MethodDescriptor, ParamType},
    error::ResolveError,
    invoke::{Overload, LEADING_ARGS},
    types::Type,
};
use tracing::trace;

/// How a method has to call the invoke primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationShape {
    pub user_args: usize,
    /// A cancellation token follows the user arguments.
    pub cancellable: bool,
    pub payload: Option<Type>,
}

impl InvocationShape {
    /// Derives the shape of `method`. A cancellation token is only accepted
    /// as the last parameter.
    pub fn of(method: &MethodDescriptor) -> Result<Self, ResolveError> {
        let last = method.params.len().saturating_sub(1);
        if let Some(position) = method
            .params
            .iter()
            .position(|param| *param == ParamType::Cancellation)
            .filter(|position| *position != last)
        {
            return Err(ResolveError::MisplacedCancellation {
                method: method.name.to_string(),
                position,
            });
        }

        let cancellable = method.params.last() == Some(&ParamType::Cancellation);
        Ok(Self {
            user_args: method.params.len() - usize::from(cancellable),
            cancellable,
            payload: method.payload.clone(),
        })
    }

    /// Argument count of the matching overload.
    pub fn arity(&self) -> usize {
        LEADING_ARGS + self.user_args + usize::from(self.cancellable)
    }

    pub fn is_generic(&self) -> bool {
        self.payload.is_some()
    }

    fn fits(&self, overload: &Overload) -> bool {
        overload.arity == self.arity()
            && overload.cancellable == self.cancellable
            && overload.generic == self.is_generic()
    }
}

/// A method's shape together with the overload it resolved to. For a typed
/// overload the payload tag in `shape` is what the overload is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInvoke {
    pub shape: InvocationShape,
    pub overload: Overload,
}

pub struct InvocationResolver<'a> {
    overloads: &'a [Overload],
}

impl<'a> InvocationResolver<'a> {
    pub fn new(overloads: &'a [Overload]) -> Self {
        Self { overloads }
    }

    /// Finds the single overload `method` can be dispatched through.
    pub fn resolve(&self, method: &MethodDescriptor) -> Result<ResolvedInvoke, ResolveError> {
        let shape = InvocationShape::of(method)?;
        let mut candidates = self.overloads.iter().filter(|o| shape.fits(o));

        match (candidates.next(), candidates.count()) {
            (Some(overload), 0) => {
                trace!(method = &*method.name, ?overload, "resolved invoke overload");
                Ok(ResolvedInvoke {
                    overload: *overload,
                    shape,
                })
            }
            (Some(_), more) => Err(ResolveError::AmbiguousOverload {
                method: method.name.to_string(),
                arity: shape.arity(),
                candidates: more + 1,
            }),
            (None, _) => Err(ResolveError::NoMatchingOverload {
                method: method.name.to_string(),
                arity: shape.arity(),
                generic: shape.is_generic(),
            }),
        }
    }
}
