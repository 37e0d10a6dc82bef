//! The operand stack, which doubles as the call-frame mechanism.
//!
//! Every accessor checks depth before touching the stack, so a failing
//! operation leaves it exactly as it was.

use super::heap::ArrayRef;
use super::{Value, VmError};

#[derive(Debug, Clone)]
pub struct OperandStack {
    values: Vec<Value>,
    /// Maximum depth (None = unlimited)
    limit: Option<usize>,
}

impl OperandStack {
    pub fn new() -> Self {
        Self::with_limit(None)
    }

    pub fn with_limit(limit: Option<usize>) -> Self {
        Self {
            values: Vec::with_capacity(256),
            limit,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Values from bottom to top.
    pub fn as_slice(&self) -> &[Value] {
        &self.values
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.values.clone()
    }

    pub fn push(&mut self, value: Value) -> Result<(), VmError> {
        if let Some(limit) = self.limit {
            if self.values.len() >= limit {
                return Err(VmError::StackOverflow { limit });
            }
        }
        self.values.push(value);
        Ok(())
    }

    pub fn push_int(&mut self, v: i32) -> Result<(), VmError> {
        self.push(Value::Int(v))
    }

    pub fn push_double(&mut self, v: f64) -> Result<(), VmError> {
        self.push(Value::Double(v))
    }

    fn require(&self, needed: usize) -> Result<(), VmError> {
        if self.values.len() < needed {
            return Err(VmError::StackUnderflow {
                needed,
                depth: self.values.len(),
            });
        }
        Ok(())
    }

    /// Absolute index of the slot `k` positions below the top.
    fn slot(&self, k: u32) -> Result<usize, VmError> {
        let needed = (k as usize).saturating_add(1);
        self.require(needed)?;
        Ok(self.values.len() - needed)
    }

    pub fn pop(&mut self) -> Result<Value, VmError> {
        self.values.pop().ok_or(VmError::StackUnderflow {
            needed: 1,
            depth: 0,
        })
    }

    /// Look at the value `k` slots below the top (0 = top).
    pub fn peek(&self, k: u32) -> Result<Value, VmError> {
        let index = self.slot(k)?;
        Ok(self.values[index])
    }

    /// Remove the top `n` values, returned bottom-to-top.
    pub fn pop_n(&mut self, n: u32) -> Result<Vec<Value>, VmError> {
        self.require(n as usize)?;
        let at = self.values.len() - n as usize;
        Ok(self.values.split_off(at))
    }

    /// Drop the top `n` values.
    pub fn discard(&mut self, n: u32) -> Result<(), VmError> {
        self.require(n as usize)?;
        let at = self.values.len() - n as usize;
        self.values.truncate(at);
        Ok(())
    }

    /// Push a duplicate of the value `k` slots below the top.
    pub fn copy(&mut self, k: u32) -> Result<(), VmError> {
        let value = self.peek(k)?;
        self.push(value)
    }

    /// Pop the top value and store it `k` slots below the new top.
    pub fn set(&mut self, k: u32) -> Result<(), VmError> {
        // The stored value plus k + 1 remaining slots.
        self.require((k as usize).saturating_add(2))?;
        let value = self.pop()?;
        let index = self.slot(k)?;
        self.values[index] = value;
        Ok(())
    }

    pub fn pop_int(&mut self) -> Result<i32, VmError> {
        let v = self.peek(0)?;
        let n = v.as_int().ok_or(VmError::TypeMismatch {
            expected: "int",
            found: v.type_name(),
        })?;
        self.values.pop();
        Ok(n)
    }

    pub fn pop_double(&mut self) -> Result<f64, VmError> {
        let v = self.peek(0)?;
        let d = v.as_double().ok_or(VmError::TypeMismatch {
            expected: "double",
            found: v.type_name(),
        })?;
        self.values.pop();
        Ok(d)
    }

    pub fn pop_array(&mut self) -> Result<ArrayRef, VmError> {
        let v = self.peek(0)?;
        let r = v.as_array_ref().ok_or(VmError::TypeMismatch {
            expected: "array",
            found: v.type_name(),
        })?;
        self.values.pop();
        Ok(r)
    }

    pub fn pop_return_address(&mut self) -> Result<u32, VmError> {
        let v = self.peek(0)?;
        let addr = v.as_return_address().ok_or(VmError::TypeMismatch {
            expected: "return address",
            found: v.type_name(),
        })?;
        self.values.pop();
        Ok(addr)
    }

    /// Push several values, preserving their order.
    /// Fail with `StackOverflow` unless `n` more values fit.
    pub fn ensure_room(&self, n: usize) -> Result<(), VmError> {
        if let Some(limit) = self.limit {
            if self.values.len().saturating_add(n) > limit {
                return Err(VmError::StackOverflow { limit });
            }
        }
        Ok(())
    }

    pub fn extend(&mut self, values: Vec<Value>) -> Result<(), VmError> {
        if let Some(limit) = self.limit {
            if self.values.len() + values.len() > limit {
                return Err(VmError::StackOverflow { limit });
            }
        }
        self.values.extend(values);
        Ok(())
    }
}

impl Default for OperandStack {
    fn default() -> Self {
        Self::new()
    }
}
