use std::fmt;
use std::ops::Index;

use serde::{Deserialize, Serialize};

use super::syscall::Syscall;
use super::Op;

/// An immutable, 0-indexed instruction sequence.
///
/// The engine runs any program as given; [`Program::check`] is an
/// optional static pass for tooling.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Program {
    code: Vec<Op>,
}

/// Severity of a static diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The instruction faults if it is ever reached.
    Error,
    /// Legal, but likely a bytecode bug.
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub pc: usize,
    pub severity: Severity,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {:04}: {}", level, self.pc, self.message)
    }
}

impl Program {
    pub fn new(code: Vec<Op>) -> Self {
        Self { code }
    }

    /// Parse a JSON array of externally tagged instructions,
    /// e.g. `[{"ImmediateInt":5},"AddI"]`.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> String {
        // Serializing plain enums into a String cannot fail.
        serde_json::to_string_pretty(&self.code).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn get(&self, pc: usize) -> Option<&Op> {
        self.code.get(pc)
    }

    pub fn ops(&self) -> &[Op] {
        &self.code
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Op> {
        self.code.iter()
    }

    /// Disassembly, one `NNNN  Mnemonic operand` line per instruction.
    pub fn listing(&self) -> String {
        let mut out = String::new();
        for (pc, op) in self.code.iter().enumerate() {
            out.push_str(&format!("{:04}  {}\n", pc, op));
        }
        out
    }

    /// Static diagnostics, in program order.
    pub fn check(&self) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        let len = self.code.len();
        let has_call = self.code.iter().any(|op| matches!(op, Op::Call(_)));

        for (pc, op) in self.code.iter().enumerate() {
            if let Some(target) = op.branch_target() {
                if target as usize > len {
                    diagnostics.push(Diagnostic {
                        pc,
                        severity: Severity::Error,
                        message: format!(
                            "{} target {} is beyond the end of the program ({} instructions)",
                            op.name(),
                            target,
                            len
                        ),
                    });
                }
            }
            match *op {
                Op::Return(_) if !has_call => diagnostics.push(Diagnostic {
                    pc,
                    severity: Severity::Warning,
                    message: "Return in a program with no Call".to_string(),
                }),
                Op::Syscall(code) if Syscall::from_code(code).is_none() => {
                    diagnostics.push(Diagnostic {
                        pc,
                        severity: Severity::Warning,
                        message: format!("unknown syscall code {}", code),
                    })
                }
                _ => {}
            }
        }
        diagnostics
    }
}

impl From<Vec<Op>> for Program {
    fn from(code: Vec<Op>) -> Self {
        Self::new(code)
    }
}

impl FromIterator<Op> for Program {
    fn from_iter<I: IntoIterator<Item = Op>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl Index<usize> for Program {
    type Output = Op;

    fn index(&self, pc: usize) -> &Op {
        &self.code[pc]
    }
}

impl<'a> IntoIterator for &'a Program {
    type Item = &'a Op;
    type IntoIter = std::slice::Iter<'a, Op>;

    fn into_iter(self) -> Self::IntoIter {
        self.code.iter()
    }
}
