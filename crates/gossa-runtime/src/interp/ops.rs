//! Arithmetic, comparison and conversion.

use crate::error::RuntimeError;
use crate::interp::Unwind;
use crate::ssa::{BinOp, ConvertKind, UnOp};
use crate::value::Value;

fn invalid(op: impl std::fmt::Debug, x: &Value, y: Option<&Value>) -> Unwind {
    let operands = match y {
        Some(y) => format!("{} and {}", x.type_name(), y.type_name()),
        None => x.type_name().to_string(),
    };
    Unwind::Fatal(RuntimeError::InvalidOperand {
        function: format!("{:?}", op),
        message: format!("unsupported operands {}", operands),
    })
}

pub(crate) fn binop(op: BinOp, x: &Value, y: &Value) -> Result<Value, Unwind> {
    match op {
        BinOp::Eq => return Ok(Value::Bool(x.equals(y))),
        BinOp::Ne => return Ok(Value::Bool(!x.equals(y))),
        _ => {}
    }
    match (x, y) {
        (Value::Int(a), Value::Int(b)) => int_binop(op, *a, *b),
        (Value::Uintptr(a), Value::Uintptr(b)) => uint_binop(op, *a, *b),
        (Value::Uintptr(a), Value::Int(b)) => uint_binop(op, *a, *b as u64),
        (Value::Int(a), Value::Uintptr(b)) => uint_binop(op, *a as u64, *b),
        (Value::Float(a), Value::Float(b)) => float_binop(op, *a, *b),
        (Value::String(a), Value::String(b)) => match op {
            BinOp::Add => Ok(Value::string(format!("{}{}", a, b))),
            BinOp::Lt => Ok(Value::Bool(a < b)),
            BinOp::Le => Ok(Value::Bool(a <= b)),
            BinOp::Gt => Ok(Value::Bool(a > b)),
            BinOp::Ge => Ok(Value::Bool(a >= b)),
            _ => Err(invalid(op, x, Some(y))),
        },
        (Value::Bool(a), Value::Bool(b)) => match op {
            BinOp::And => Ok(Value::Bool(*a && *b)),
            BinOp::Or => Ok(Value::Bool(*a || *b)),
            BinOp::Xor => Ok(Value::Bool(a != b)),
            _ => Err(invalid(op, x, Some(y))),
        },
        _ => Err(invalid(op, x, Some(y))),
    }
}

fn int_binop(op: BinOp, a: i64, b: i64) -> Result<Value, Unwind> {
    let v = match op {
        BinOp::Add => Value::Int(a.wrapping_add(b)),
        BinOp::Sub => Value::Int(a.wrapping_sub(b)),
        BinOp::Mul => Value::Int(a.wrapping_mul(b)),
        BinOp::Div | BinOp::Rem if b == 0 => {
            return Err(Unwind::runtime_error("integer divide by zero"))
        }
        BinOp::Div => Value::Int(a.wrapping_div(b)),
        BinOp::Rem => Value::Int(a.wrapping_rem(b)),
        BinOp::And => Value::Int(a & b),
        BinOp::Or => Value::Int(a | b),
        BinOp::Xor => Value::Int(a ^ b),
        BinOp::Shl | BinOp::Shr if b < 0 => {
            return Err(Unwind::runtime_error("negative shift amount"))
        }
        BinOp::Shl => Value::Int(if b >= 64 { 0 } else { a << b }),
        BinOp::Shr => Value::Int(if b >= 64 { a >> 63 } else { a >> b }),
        BinOp::Lt => Value::Bool(a < b),
        BinOp::Le => Value::Bool(a <= b),
        BinOp::Gt => Value::Bool(a > b),
        BinOp::Ge => Value::Bool(a >= b),
        BinOp::Eq => Value::Bool(a == b),
        BinOp::Ne => Value::Bool(a != b),
    };
    Ok(v)
}

fn uint_binop(op: BinOp, a: u64, b: u64) -> Result<Value, Unwind> {
    let v = match op {
        BinOp::Add => Value::Uintptr(a.wrapping_add(b)),
        BinOp::Sub => Value::Uintptr(a.wrapping_sub(b)),
        BinOp::Mul => Value::Uintptr(a.wrapping_mul(b)),
        BinOp::Div | BinOp::Rem if b == 0 => {
            return Err(Unwind::runtime_error("integer divide by zero"))
        }
        BinOp::Div => Value::Uintptr(a / b),
        BinOp::Rem => Value::Uintptr(a % b),
        BinOp::And => Value::Uintptr(a & b),
        BinOp::Or => Value::Uintptr(a | b),
        BinOp::Xor => Value::Uintptr(a ^ b),
        BinOp::Shl => Value::Uintptr(if b >= 64 { 0 } else { a << b }),
        BinOp::Shr => Value::Uintptr(if b >= 64 { 0 } else { a >> b }),
        BinOp::Lt => Value::Bool(a < b),
        BinOp::Le => Value::Bool(a <= b),
        BinOp::Gt => Value::Bool(a > b),
        BinOp::Ge => Value::Bool(a >= b),
        BinOp::Eq => Value::Bool(a == b),
        BinOp::Ne => Value::Bool(a != b),
    };
    Ok(v)
}

fn float_binop(op: BinOp, a: f64, b: f64) -> Result<Value, Unwind> {
    let v = match op {
        BinOp::Add => Value::Float(a + b),
        BinOp::Sub => Value::Float(a - b),
        BinOp::Mul => Value::Float(a * b),
        BinOp::Div => Value::Float(a / b),
        BinOp::Lt => Value::Bool(a < b),
        BinOp::Le => Value::Bool(a <= b),
        BinOp::Gt => Value::Bool(a > b),
        BinOp::Ge => Value::Bool(a >= b),
        BinOp::Eq => Value::Bool(a == b),
        BinOp::Ne => Value::Bool(a != b),
        _ => return Err(invalid(op, &Value::Float(a), Some(&Value::Float(b)))),
    };
    Ok(v)
}

pub(crate) fn unop(op: UnOp, x: &Value) -> Result<Value, Unwind> {
    match (op, x) {
        (UnOp::Neg, Value::Int(i)) => Ok(Value::Int(i.wrapping_neg())),
        (UnOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnOp::Deref, Value::Pointer(cell)) => Ok(cell.read().clone()),
        (UnOp::Deref, Value::Nil) => Err(nil_dereference()),
        _ => Err(invalid(op, x, None)),
    }
}

pub(crate) fn nil_dereference() -> Unwind {
    Unwind::runtime_error("invalid memory address or nil pointer dereference")
}

pub(crate) fn convert(to: ConvertKind, x: &Value) -> Result<Value, Unwind> {
    let v = match (to, x) {
        (ConvertKind::Int, Value::Int(i)) => Value::Int(*i),
        (ConvertKind::Int, Value::Uintptr(u)) => Value::Int(*u as i64),
        (ConvertKind::Int, Value::Float(f)) => Value::Int(*f as i64),
        (ConvertKind::Uintptr, Value::Int(i)) => Value::Uintptr(*i as u64),
        (ConvertKind::Uintptr, Value::Uintptr(u)) => Value::Uintptr(*u),
        (ConvertKind::Float, Value::Int(i)) => Value::Float(*i as f64),
        (ConvertKind::Float, Value::Uintptr(u)) => Value::Float(*u as f64),
        (ConvertKind::Float, Value::Float(f)) => Value::Float(*f),
        (ConvertKind::String, Value::String(s)) => Value::String(s.clone()),
        (ConvertKind::String, Value::Int(i)) => Value::string(
            u32::try_from(*i)
                .ok()
                .and_then(char::from_u32)
                .unwrap_or(char::REPLACEMENT_CHARACTER)
                .to_string(),
        ),
        // []byte to string
        (ConvertKind::String, Value::Slice(s)) => {
            let bytes: Vec<u8> = s
                .to_vec()
                .iter()
                .map(|b| b.as_int().unwrap_or(0) as u8)
                .collect();
            Value::string(String::from_utf8_lossy(&bytes))
        }
        (ConvertKind::String, Value::Nil) => Value::string(""),
        _ => return Err(invalid(to, x, None)),
    };
    Ok(v)
}
