use std::fmt;

use super::heap::ArrayRef;

/// A tagged stack slot.
///
/// Exactly one payload is present at a time:
/// - Int: 32-bit signed integer
/// - Double: 64-bit IEEE 754 double
/// - ReturnAddress: program index pushed by `Call`
/// - ArrayRef: non-owning handle to a heap array
///
/// `Int`, `Double` and `ReturnAddress` are copied by value. Copying an
/// `ArrayRef` aliases the array it points at.
#[derive(Clone, Copy)]
pub enum Value {
    Int(i32),
    Double(f64),
    ReturnAddress(u32),
    ArrayRef(ArrayRef),
}

impl Value {
    pub fn from_int(v: i32) -> Self {
        Value::Int(v)
    }

    pub fn from_double(v: f64) -> Self {
        Value::Double(v)
    }

    pub fn from_return_address(addr: u32) -> Self {
        Value::ReturnAddress(addr)
    }

    pub fn from_array_ref(r: ArrayRef) -> Self {
        Value::ArrayRef(r)
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Value::Int(_))
    }

    pub fn is_double(&self) -> bool {
        matches!(self, Value::Double(_))
    }

    pub fn is_array_ref(&self) -> bool {
        matches!(self, Value::ArrayRef(_))
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_return_address(&self) -> Option<u32> {
        match self {
            Value::ReturnAddress(addr) => Some(*addr),
            _ => None,
        }
    }

    pub fn as_array_ref(&self) -> Option<ArrayRef> {
        match self {
            Value::ArrayRef(r) => Some(*r),
            _ => None,
        }
    }

    /// Get the type name of this value.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Double(_) => "double",
            Value::ReturnAddress(_) => "return address",
            Value::ArrayRef(_) => "array",
        }
    }
}

impl PartialEq for Value {
    /// Tags must match; array references compare by identity, never by contents.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::ReturnAddress(a), Value::ReturnAddress(b)) => a == b,
            (Value::ArrayRef(a), Value::ArrayRef(b)) => a == b,
            _ => false,
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "Int({})", n),
            Value::Double(d) => write!(f, "Double({})", d),
            Value::ReturnAddress(addr) => write!(f, "ReturnAddress({})", addr),
            Value::ArrayRef(r) => write!(f, "ArrayRef({})", r),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Double(d) => {
                if d.fract() == 0.0 && d.is_finite() {
                    write!(f, "{}.0", d)
                } else {
                    write!(f, "{}", d)
                }
            }
            Value::ReturnAddress(addr) => write!(f, "<ret {}>", addr),
            Value::ArrayRef(r) => write!(f, "<array {}>", r),
        }
    }
}
