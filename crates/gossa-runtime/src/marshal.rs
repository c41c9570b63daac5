//! Marshaling contract between interpreted values and native Rust values.
//!
//! Every bridged function declares a [`NativeSignature`]: one [`Kind`] per
//! parameter and result. Arguments are checked against it once, at the call
//! boundary, and then converted with [`FromValue`]; results go back through
//! [`IntoValue`].
//!
//! | Kind      | interpreted value           | Rust type                  |
//! |-----------|-----------------------------|----------------------------|
//! | `Int`     | `Value::Int`                | `i64`, `i32`, `usize`      |
//! | `Uintptr` | `Value::Uintptr` or `Int`   | `u64`                      |
//! | `Float`   | `Value::Float`              | `f64`                      |
//! | `Bool`    | `Value::Bool`               | `bool`                     |
//! | `String`  | `Value::String`             | `String`                   |
//! | `Slice`   | `Value::Slice` or nil       | `Vec<Value>`, `SliceRef`   |
//! | `Func`    | `Value::Func` or nil        | `FuncValue`                |
//! | `Opaque`  | `Value::Native` or nil      | `NativeObject`             |
//! | `Any`     | anything                    | `Value`                    |

use crate::error::RuntimeError;
use crate::value::{FuncValue, NativeObject, SliceRef, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Int,
    Uintptr,
    Float,
    Bool,
    String,
    Slice,
    Func,
    Opaque,
    Any,
}

impl Kind {
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Kind::Any => true,
            Kind::Int => matches!(value, Value::Int(_)),
            Kind::Uintptr => matches!(value, Value::Uintptr(_) | Value::Int(_)),
            Kind::Float => matches!(value, Value::Float(_)),
            Kind::Bool => matches!(value, Value::Bool(_)),
            Kind::String => matches!(value, Value::String(_)),
            Kind::Slice => matches!(value, Value::Slice(_) | Value::Nil),
            Kind::Func => matches!(value, Value::Func(_) | Value::Nil),
            Kind::Opaque => matches!(value, Value::Native(_) | Value::Nil),
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Int => "int",
            Kind::Uintptr => "uintptr",
            Kind::Float => "float64",
            Kind::Bool => "bool",
            Kind::String => "string",
            Kind::Slice => "slice",
            Kind::Func => "func",
            Kind::Opaque => "pointer",
            Kind::Any => "any",
        };
        write!(f, "{}", name)
    }
}

/// Parameter and result kinds of a native function. A variadic signature
/// accepts any number of trailing arguments of its last parameter kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeSignature {
    pub params: Vec<Kind>,
    pub results: Vec<Kind>,
    pub variadic: bool,
}

impl NativeSignature {
    pub fn new(params: Vec<Kind>, results: Vec<Kind>) -> Self {
        Self {
            params,
            results,
            variadic: false,
        }
    }

    pub fn variadic(params: Vec<Kind>, results: Vec<Kind>) -> Self {
        Self {
            params,
            results,
            variadic: true,
        }
    }

    /// Checks call arguments against the signature.
    pub fn check_args(&self, name: &str, args: &[Value]) -> Result<(), RuntimeError> {
        let arity_ok = if self.variadic {
            args.len() + 1 >= self.params.len()
        } else {
            args.len() == self.params.len()
        };
        if !arity_ok {
            return Err(RuntimeError::Marshal {
                name: name.to_string(),
                message: format!(
                    "expected {}{} arguments, got {}",
                    if self.variadic { "at least " } else { "" },
                    self.params.len().saturating_sub(self.variadic as usize),
                    args.len()
                ),
            });
        }
        for (i, arg) in args.iter().enumerate() {
            let kind = match self.params.get(i) {
                Some(kind) => *kind,
                None => match self.params.last() {
                    Some(kind) => *kind,
                    None => Kind::Any,
                },
            };
            if !kind.accepts(arg) {
                return Err(RuntimeError::Marshal {
                    name: name.to_string(),
                    message: format!(
                        "argument {} must be {}, found {}",
                        i,
                        kind,
                        arg.type_name()
                    ),
                });
            }
        }
        Ok(())
    }

    /// Checks native results against the signature.
    pub fn check_results(&self, name: &str, results: &[Value]) -> Result<(), RuntimeError> {
        if results.len() != self.results.len() {
            return Err(RuntimeError::Marshal {
                name: name.to_string(),
                message: format!(
                    "native returned {} results, signature declares {}",
                    results.len(),
                    self.results.len()
                ),
            });
        }
        Ok(())
    }
}

/// Conversion failure for a single value.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionError {
    pub expected: Kind,
    pub found: &'static str,
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected {}, found {}", self.expected, self.found)
    }
}

impl std::error::Error for ConversionError {}

/// Converts an interpreted value to a Rust type.
pub trait FromValue: Sized {
    const KIND: Kind;

    fn from_value(value: &Value) -> Result<Self, ConversionError>;
}

/// Converts a Rust value to an interpreted value.
pub trait IntoValue {
    const KIND: Kind;

    fn into_value(self) -> Value;
}

fn mismatch<T: FromValue>(value: &Value) -> ConversionError {
    ConversionError {
        expected: T::KIND,
        found: value.type_name(),
    }
}

impl FromValue for i64 {
    const KIND: Kind = Kind::Int;

    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Int(i) => Ok(*i),
            _ => Err(mismatch::<Self>(value)),
        }
    }
}

impl FromValue for i32 {
    const KIND: Kind = Kind::Int;

    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Int(i) => Ok(*i as i32),
            _ => Err(mismatch::<Self>(value)),
        }
    }
}

impl FromValue for usize {
    const KIND: Kind = Kind::Int;

    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Int(i) if *i >= 0 => Ok(*i as usize),
            _ => Err(mismatch::<Self>(value)),
        }
    }
}

impl FromValue for u64 {
    const KIND: Kind = Kind::Uintptr;

    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Uintptr(u) => Ok(*u),
            Value::Int(i) if *i >= 0 => Ok(*i as u64),
            _ => Err(mismatch::<Self>(value)),
        }
    }
}

impl FromValue for f64 {
    const KIND: Kind = Kind::Float;

    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Float(x) => Ok(*x),
            _ => Err(mismatch::<Self>(value)),
        }
    }
}

impl FromValue for bool {
    const KIND: Kind = Kind::Bool;

    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Bool(b) => Ok(*b),
            _ => Err(mismatch::<Self>(value)),
        }
    }
}

impl FromValue for String {
    const KIND: Kind = Kind::String;

    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::String(s) => Ok(s.to_string()),
            _ => Err(mismatch::<Self>(value)),
        }
    }
}

impl FromValue for Vec<Value> {
    const KIND: Kind = Kind::Slice;

    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Slice(s) => Ok(s.to_vec()),
            Value::Nil => Ok(Vec::new()),
            _ => Err(mismatch::<Self>(value)),
        }
    }
}

impl FromValue for SliceRef {
    const KIND: Kind = Kind::Slice;

    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Slice(s) => Ok(s.clone()),
            Value::Nil => Ok(SliceRef::new(Vec::new())),
            _ => Err(mismatch::<Self>(value)),
        }
    }
}

impl FromValue for FuncValue {
    const KIND: Kind = Kind::Func;

    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Func(f) => Ok(f.clone()),
            _ => Err(mismatch::<Self>(value)),
        }
    }
}

impl FromValue for NativeObject {
    const KIND: Kind = Kind::Opaque;

    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Native(obj) => Ok(obj.clone()),
            _ => Err(mismatch::<Self>(value)),
        }
    }
}

impl FromValue for Value {
    const KIND: Kind = Kind::Any;

    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        Ok(value.clone())
    }
}

impl IntoValue for i64 {
    const KIND: Kind = Kind::Int;

    fn into_value(self) -> Value {
        Value::Int(self)
    }
}

impl IntoValue for usize {
    const KIND: Kind = Kind::Int;

    fn into_value(self) -> Value {
        Value::Int(self as i64)
    }
}

impl IntoValue for u64 {
    const KIND: Kind = Kind::Uintptr;

    fn into_value(self) -> Value {
        Value::Uintptr(self)
    }
}

impl IntoValue for f64 {
    const KIND: Kind = Kind::Float;

    fn into_value(self) -> Value {
        Value::Float(self)
    }
}

impl IntoValue for bool {
    const KIND: Kind = Kind::Bool;

    fn into_value(self) -> Value {
        Value::Bool(self)
    }
}

impl IntoValue for String {
    const KIND: Kind = Kind::String;

    fn into_value(self) -> Value {
        Value::string(self)
    }
}

impl IntoValue for &str {
    const KIND: Kind = Kind::String;

    fn into_value(self) -> Value {
        Value::string(self)
    }
}

impl IntoValue for Vec<Value> {
    const KIND: Kind = Kind::Slice;

    fn into_value(self) -> Value {
        Value::Slice(SliceRef::new(self))
    }
}

impl IntoValue for NativeObject {
    const KIND: Kind = Kind::Opaque;

    fn into_value(self) -> Value {
        Value::Native(self)
    }
}

impl IntoValue for Value {
    const KIND: Kind = Kind::Any;

    fn into_value(self) -> Value {
        self
    }
}

/// Result list of a native function: `()`, a single value, or a tuple.
pub trait IntoResults {
    fn kinds() -> Vec<Kind>;

    fn into_results(self) -> Vec<Value>;
}

impl IntoResults for () {
    fn kinds() -> Vec<Kind> {
        Vec::new()
    }

    fn into_results(self) -> Vec<Value> {
        Vec::new()
    }
}

impl<T: IntoValue> IntoResults for T {
    fn kinds() -> Vec<Kind> {
        vec![T::KIND]
    }

    fn into_results(self) -> Vec<Value> {
        vec![self.into_value()]
    }
}

impl<A: IntoValue, B: IntoValue> IntoResults for (A, B) {
    fn kinds() -> Vec<Kind> {
        vec![A::KIND, B::KIND]
    }

    fn into_results(self) -> Vec<Value> {
        vec![self.0.into_value(), self.1.into_value()]
    }
}

impl<A: IntoValue, B: IntoValue, C: IntoValue, D: IntoValue> IntoResults for (A, B, C, D) {
    fn kinds() -> Vec<Kind> {
        vec![A::KIND, B::KIND, C::KIND, D::KIND]
    }

    fn into_results(self) -> Vec<Value> {
        vec![
            self.0.into_value(),
            self.1.into_value(),
            self.2.into_value(),
            self.3.into_value(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_signature_rejects_wrong_arity() {
        let sig = NativeSignature::new(vec![Kind::Int], vec![]);
        let err = sig.check_args("os.Exit", &[]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "cannot call os.Exit: expected 1 arguments, got 0"
        );
    }

    #[test]
    fn test_signature_rejects_wrong_kind() {
        let sig = NativeSignature::new(vec![Kind::Int], vec![]);
        let err = sig.check_args("os.Exit", &[Value::string("1")]).unwrap_err();
        assert!(err.to_string().contains("argument 0 must be int, found string"));
    }

    #[test]
    fn test_variadic_signature_checks_trailing_kind() {
        let sig = NativeSignature::variadic(vec![Kind::String, Kind::Any], vec![Kind::String]);
        assert!(sig.check_args("fmt.Sprintf", &[Value::string("%d")]).is_ok());
        assert!(sig
            .check_args("fmt.Sprintf", &[Value::string("%d"), Value::Int(1), Value::Nil])
            .is_ok());
        assert!(sig.check_args("fmt.Sprintf", &[]).is_err());
    }

    #[test]
    fn test_uintptr_accepts_untyped_int() {
        assert_eq!(u64::from_value(&Value::Int(12)), Ok(12));
        assert!(u64::from_value(&Value::Int(-1)).is_err());
        assert!(Kind::Uintptr.accepts(&Value::Int(3)));
    }

    #[test]
    fn test_result_kinds() {
        assert_eq!(<(u64, String, i64, bool)>::kinds(), vec![
            Kind::Uintptr,
            Kind::String,
            Kind::Int,
            Kind::Bool
        ]);
        assert_eq!(<()>::kinds(), Vec::<Kind>::new());
    }
}
