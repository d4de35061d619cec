use serde::{Deserialize, Serialize};
use std::{error::Error, fmt};

/// Type tag for arguments and payloads travelling through a hub connection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub enum Type {
    Nil,
    Bool,
    Int,
    Float,
    String,
    List(Box<Type>),
    /// Accepts any [`Value`].
    Any,
}

impl Type {
    pub fn list(elem: Type) -> Self {
        Type::List(Box::new(elem))
    }

    fn name(&self) -> &'static str {
        use Type::*;
        match self {
            Nil => "Nil",
            Bool => "Bool",
            Int => "Int",
            Float => "Float",
            String => "String",
            List(_) => "List",
            Any => "Any",
        }
    }

    /// Whether `val` is an inhabitant of this type. Ints widen to floats.
    pub fn matches(&self, val: &Value) -> bool {
        match (self, val) {
            (Type::Any, _)
            | (Type::Nil, Value::Nil)
            | (Type::Bool, Value::Bool(_))
            | (Type::Int, Value::Int(_))
            | (Type::Float, Value::Float(_) | Value::Int(_))
            | (Type::String, Value::String(_)) => true,
            (Type::List(elem), Value::List(vals)) => vals.iter().all(|v| elem.matches(v)),
            _ => false,
        }
    }

    pub fn check(&self, val: &Value) -> Result<(), TypeMismatch> {
        if self.matches(val) {
            Ok(())
        } else {
            Err(TypeMismatch::new(val.clone(), self.clone()))
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())?;
        if let Type::List(elem) = self {
            write!(f, "<{elem}>")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
}

pub trait Typed {
    fn rpc_type() -> Type;
}

pub trait Encode {
    fn encode(val: Self) -> Value;
}

pub trait Decode: Sized {
    fn decode(val: Value) -> Result<Self, TypeMismatch>;
}

macro_rules! impl_encode_decode {
    ($rust_type:ty, $rpc_type:expr, $encode_name:pat => $encode_expr:expr, $($from_rpc_arm:tt)*) => {
        impl Typed for $rust_type {
            fn rpc_type() -> Type {
                $rpc_type
            }
        }

        impl Encode for $rust_type {
            fn encode($encode_name: $rust_type) -> Value {
                $encode_expr
            }
        }

        impl Decode for $rust_type {
            fn decode(val: Value) -> Result<Self, TypeMismatch> {
                Ok(match val {
                    $($from_rpc_arm)*,
                    _ => return Err(TypeMismatch::new(val, <Self as Typed>::rpc_type()))
                })
            }
        }

        impl From<$rust_type> for Value {
            fn from(val: $rust_type) -> Value {
                <$rust_type as Encode>::encode(val)
            }
        }
    };
}

impl_encode_decode!((), Type::Nil, () => Value::Nil, Value::Nil => ());
impl_encode_decode!(bool, Type::Bool, b => Value::Bool(b), Value::Bool(b) => b);
impl_encode_decode!(i64, Type::Int, n => Value::Int(n), Value::Int(n) => n);
impl_encode_decode!(f64, Type::Float, x => Value::Float(x), Value::Float(x) => x, Value::Int(n) => n as f64);
impl_encode_decode!(String, Type::String, s => Value::String(s), Value::String(s) => s);

impl<T: Typed> Typed for Vec<T> {
    fn rpc_type() -> Type {
        Type::list(T::rpc_type())
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode(vals: Self) -> Value {
        Value::List(vals.into_iter().map(T::encode).collect())
    }
}

impl<T: Decode + Typed> Decode for Vec<T> {
    fn decode(val: Value) -> Result<Self, TypeMismatch> {
        match val {
            Value::List(vals) => vals.into_iter().map(T::decode).collect(),
            _ => Err(TypeMismatch::new(val, <Self as Typed>::rpc_type())),
        }
    }
}

impl Typed for Value {
    fn rpc_type() -> Type {
        Type::Any
    }
}

impl Encode for Value {
    fn encode(val: Self) -> Value {
        val
    }
}

impl Decode for Value {
    fn decode(val: Value) -> Result<Self, TypeMismatch> {
        Ok(val)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::String(s.to_owned())
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Value {
        Value::Int(n.into())
    }
}

impl From<Vec<Value>> for Value {
    fn from(vals: Vec<Value>) -> Value {
        Value::List(vals)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeMismatch {
    value: Value,
    expected_type: Type,
}

impl TypeMismatch {
    pub(crate) fn new(value: Value, expected_type: Type) -> Self {
        Self {
            value,
            expected_type,
        }
    }

    pub fn expected_type(&self) -> &Type {
        &self.expected_type
    }
}

impl fmt::Display for TypeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "type error: {:?} :/: {}", self.value, self.expected_type)
    }
}

impl Error for TypeMismatch {}
