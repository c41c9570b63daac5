//! Runtime values of interpreted programs.
//!
//! Values are cheap to clone: aggregates share their storage through `Arc`,
//! so a copy of a slice or pointer aliases the same backing store, the way
//! the source language's reference types behave.

use crate::ssa::{FuncId, TypeKind, TypeRef};
use crossbeam::channel::{Receiver, Sender};
use parking_lot::RwLock;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Shared mutable cell: the target of a pointer, a global, or a bridged
/// package variable.
pub type Cell = Arc<RwLock<Value>>;

pub fn new_cell(value: Value) -> Cell {
    Arc::new(RwLock::new(value))
}

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Uintptr(u64),
    Float(f64),
    String(Arc<str>),
    /// An `error` value; compares by identity.
    Error(Arc<str>),
    Slice(SliceRef),
    Struct(Arc<[Value]>),
    Tuple(Arc<[Value]>),
    Pointer(Cell),
    Func(FuncValue),
    Chan(ChanRef),
    Native(NativeObject),
}

impl Value {
    pub fn string(s: impl AsRef<str>) -> Value {
        Value::String(Arc::from(s.as_ref()))
    }

    pub fn error(msg: impl AsRef<str>) -> Value {
        Value::Error(Arc::from(msg.as_ref()))
    }

    pub fn tuple(values: Vec<Value>) -> Value {
        Value::Tuple(Arc::from(values))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Type name used in conversion and marshaling errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Uintptr(_) => "uintptr",
            Value::Float(_) => "float64",
            Value::String(_) => "string",
            Value::Error(_) => "error",
            Value::Slice(_) => "slice",
            Value::Struct(_) => "struct",
            Value::Tuple(_) => "tuple",
            Value::Pointer(_) => "pointer",
            Value::Func(_) => "func",
            Value::Chan(_) => "chan",
            Value::Native(obj) => obj.type_name(),
        }
    }

    /// Zero value of a declared type.
    pub fn zero(ty: &TypeRef) -> Value {
        match ty.kind {
            TypeKind::Bool => Value::Bool(false),
            TypeKind::Int => Value::Int(0),
            TypeKind::Uintptr => Value::Uintptr(0),
            TypeKind::Float => Value::Float(0.0),
            TypeKind::String => Value::string(""),
            _ => Value::Nil,
        }
    }

    /// Comparison with `==` semantics.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Uintptr(a), Value::Uintptr(b)) => a == b,
            (Value::Int(a), Value::Uintptr(b)) | (Value::Uintptr(b), Value::Int(a)) => {
                *a >= 0 && *a as u64 == *b
            }
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Error(a), Value::Error(b)) => Arc::ptr_eq(a, b),
            (Value::Struct(a), Value::Struct(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.equals(y))
            }
            (Value::Pointer(a), Value::Pointer(b)) => Arc::ptr_eq(a, b),
            (Value::Chan(a), Value::Chan(b)) => a.same_channel(b),
            (Value::Native(a), Value::Native(b)) => a.same_object(b),
            _ => false,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Uintptr(u) => Some(*u as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

fn format_float(x: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if x.is_nan() {
        return write!(f, "NaN");
    }
    if x.is_infinite() {
        return write!(f, "{}Inf", if x > 0.0 { "+" } else { "-" });
    }
    let abs = x.abs();
    if abs != 0.0 && !(1e-4..1e21).contains(&abs) {
        let s = format!("{:e}", x);
        // Rust writes 1e21 and 1e-5; the expected form is 1e+21 and 1e-05.
        if let Some((mantissa, exp)) = s.split_once('e') {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(d) => ('-', d),
                None => ('+', exp),
            };
            return write!(f, "{}e{}{:0>2}", mantissa, sign, digits);
        }
        return write!(f, "{}", s);
    }
    write!(f, "{}", x)
}

fn write_seq(f: &mut fmt::Formatter<'_>, values: &[Value], sep: &str) -> fmt::Result {
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            write!(f, "{}", sep)?;
        }
        write!(f, "{}", v)?;
    }
    Ok(())
}

/// `%v` formatting.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "<nil>"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Uintptr(u) => write!(f, "{}", u),
            Value::Float(x) => format_float(*x, f),
            Value::String(s) => write!(f, "{}", s),
            Value::Error(e) => write!(f, "{}", e),
            Value::Slice(s) => {
                write!(f, "[")?;
                write_seq(f, &s.to_vec(), " ")?;
                write!(f, "]")
            }
            Value::Struct(fields) => {
                write!(f, "{{")?;
                write_seq(f, fields, " ")?;
                write!(f, "}}")
            }
            Value::Tuple(values) => {
                write!(f, "(")?;
                write_seq(f, values, ", ")?;
                write!(f, ")")
            }
            Value::Pointer(cell) => write!(f, "{:p}", Arc::as_ptr(cell)),
            Value::Func(func) => write!(f, "{}", func),
            Value::Chan(ch) => write!(f, "{:p}", Arc::as_ptr(&ch.inner)),
            Value::Native(obj) => write!(f, "&{}", obj.type_name()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{:?}", s),
            Value::Error(e) => write!(f, "error({:?})", e),
            other => write!(f, "{}", other),
        }
    }
}

/// A function value: an interpreted function with its captured bindings, or
/// a function implemented by the external-function registry.
#[derive(Debug, Clone)]
pub enum FuncValue {
    Interp {
        func: FuncId,
        name: Arc<str>,
        bindings: Arc<[Value]>,
    },
    External(Arc<str>),
}

impl FuncValue {
    pub fn name(&self) -> &str {
        match self {
            FuncValue::Interp { name, .. } => name,
            FuncValue::External(name) => name,
        }
    }
}

impl fmt::Display for FuncValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "func:{}", self.name())
    }
}

/// Slice header over a shared backing array.
#[derive(Clone)]
pub struct SliceRef {
    data: Arc<RwLock<Vec<Value>>>,
    start: usize,
    len: usize,
}

impl SliceRef {
    pub fn new(values: Vec<Value>) -> Self {
        let len = values.len();
        Self {
            data: Arc::new(RwLock::new(values)),
            start: 0,
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Capacity: elements between the start of the slice and the end of the
    /// backing array.
    pub fn cap(&self) -> usize {
        self.data.read().len() - self.start
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        if index >= self.len {
            return None;
        }
        self.data.read().get(self.start + index).cloned()
    }

    pub fn set(&self, index: usize, value: Value) -> bool {
        if index >= self.len {
            return false;
        }
        match self.data.write().get_mut(self.start + index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Reslices to `[low, high)`; `high` may reach the capacity.
    pub fn slice(&self, low: usize, high: usize) -> Option<SliceRef> {
        if low > high || high > self.cap() {
            return None;
        }
        Some(SliceRef {
            data: self.data.clone(),
            start: self.start + low,
            len: high - low,
        })
    }

    pub fn to_vec(&self) -> Vec<Value> {
        let data = self.data.read();
        data[self.start..self.start + self.len].to_vec()
    }

    /// `append`: grows in place when the slice ends at the end of its
    /// backing array, otherwise copies.
    pub fn append(&self, values: Vec<Value>) -> SliceRef {
        {
            let mut data = self.data.write();
            if self.start + self.len == data.len() {
                let added = values.len();
                data.extend(values);
                return SliceRef {
                    data: self.data.clone(),
                    start: self.start,
                    len: self.len + added,
                };
            }
        }
        let mut copy = self.to_vec();
        copy.extend(values);
        SliceRef::new(copy)
    }

    /// Copies `values` into the slice, returning the number copied.
    pub fn copy_from(&self, values: &[Value]) -> usize {
        let n = values.len().min(self.len);
        let mut data = self.data.write();
        for (i, v) in values.iter().take(n).enumerate() {
            data[self.start + i] = v.clone();
        }
        n
    }
}

struct ChanInner {
    tx: Sender<Value>,
    rx: Receiver<Value>,
}

/// Channel value backed by a crossbeam channel. Capacity 0 is a rendezvous.
#[derive(Clone)]
pub struct ChanRef {
    inner: Arc<ChanInner>,
}

impl ChanRef {
    pub fn new(cap: usize) -> Self {
        let (tx, rx) = crossbeam::channel::bounded(cap);
        Self {
            inner: Arc::new(ChanInner { tx, rx }),
        }
    }

    pub fn sender(&self) -> &Sender<Value> {
        &self.inner.tx
    }

    pub fn receiver(&self) -> &Receiver<Value> {
        &self.inner.rx
    }

    pub fn same_channel(&self, other: &ChanRef) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Object owned by native code (`*runtime.Func`, `*testing.T`, ...).
#[derive(Clone)]
pub struct NativeObject {
    type_name: &'static str,
    inner: Arc<dyn Any + Send + Sync>,
}

impl NativeObject {
    pub fn new<T: Any + Send + Sync>(type_name: &'static str, value: T) -> Self {
        Self {
            type_name,
            inner: Arc::new(value),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    pub fn same_object(&self, other: &NativeObject) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::int(Value::Int(-3), "-3")]
    #[case::float_integral(Value::Float(2.0), "2")]
    #[case::float_fraction(Value::Float(1.5), "1.5")]
    #[case::float_large(Value::Float(1e21), "1e+21")]
    #[case::float_small(Value::Float(1.5e-7), "1.5e-07")]
    #[case::nil(Value::Nil, "<nil>")]
    #[case::string(Value::string("x"), "x")]
    #[case::slice(Value::Slice(SliceRef::new(vec![Value::Int(1), Value::Int(2)])), "[1 2]")]
    #[case::strukt(Value::Struct(Arc::from(vec![Value::Int(1), Value::string("a")])), "{1 a}")]
    fn test_display(#[case] value: Value, #[case] expected: &str) {
        assert_eq!(value.to_string(), expected);
    }

    #[test]
    fn test_errors_compare_by_identity() {
        let a = Value::error("boom");
        let b = Value::error("boom");
        assert!(a.equals(&a.clone()));
        assert!(!a.equals(&b));
    }

    #[test]
    fn test_slices_share_backing_store() {
        let s = SliceRef::new(vec![Value::Int(0); 4]);
        let tail = s.slice(2, 4).unwrap();
        assert!(tail.set(0, Value::Int(7)));
        assert_eq!(s.get(2).and_then(|v| v.as_int()), Some(7));
        assert!(s.slice(3, 5).is_none());
        assert!(tail.get(2).is_none());
    }

    #[test]
    fn test_append_in_place_and_copy() {
        let s = SliceRef::new(vec![Value::Int(1)]);
        let grown = s.append(vec![Value::Int(2)]);
        assert_eq!(grown.len(), 2);

        let head = grown.slice(0, 1).unwrap();
        let copied = head.append(vec![Value::Int(9)]);
        assert_eq!(grown.get(1).and_then(|v| v.as_int()), Some(2));
        assert_eq!(copied.get(1).and_then(|v| v.as_int()), Some(9));
    }

    #[test]
    fn test_zero_values() {
        assert!(Value::zero(&TypeRef::new("int", TypeKind::Int)).equals(&Value::Int(0)));
        assert!(Value::zero(&TypeRef::new("error", TypeKind::Error)).is_nil());
        assert_eq!(Value::zero(&TypeRef::new("string", TypeKind::String)).to_string(), "");
    }

    #[test]
    fn test_func_values_debug_by_name() {
        let closure = FuncValue::Interp {
            func: FuncId(3),
            name: Arc::from("main.main$1"),
            bindings: Arc::from(vec![Value::Int(7)]),
        };
        let debug = format!("{:?}", closure);
        assert!(debug.contains("main.main$1"), "{}", debug);
        assert!(debug.contains("bindings: [7]"), "{}", debug);
        assert!(format!("{:?}", FuncValue::External(Arc::from("fmt.Println"))).contains("fmt.Println"));
    }
}
