use std::fmt;

use tracing::{debug, trace, warn};

use crate::config::{RuntimeConfig, SyscallMode};
use crate::vm::heap::{ArrayRef, Heap};
use crate::vm::stack::OperandStack;
use crate::vm::syscall::{self, SpellHost, Syscall};
use crate::vm::{Fault, Op, Program, Value, VmError};

/// Lifecycle of the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecState {
    /// No program loaded.
    Idle,
    /// A program is loaded and can be resumed.
    Ready,
    /// The instruction pointer left the program.
    Halted,
    /// Terminal failure.
    Faulted(Fault),
}

/// Why a call to [`Vm::resume`] returned.
#[derive(Debug, Clone, PartialEq)]
pub enum Exit {
    Halted,
    BudgetExhausted,
    /// A syscall was dispatched and `pause_on_syscall` is set.
    Paused(Syscall),
    Faulted(Fault),
}

impl fmt::Display for Exit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exit::Halted => write!(f, "halted"),
            Exit::BudgetExhausted => write!(f, "budget exhausted"),
            Exit::Paused(call) => write!(f, "paused after syscall {}", call),
            Exit::Faulted(fault) => write!(f, "{}", fault),
        }
    }
}

/// Result of one bounded slice of execution.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    /// Instructions completed during this slice.
    pub executed: u64,
    pub exit: Exit,
}

/// GC statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcStats {
    pub cycles: u64,
    pub arrays_freed: u64,
    /// Highest number of simultaneously live arrays.
    pub peak_live: usize,
}

/// Outcome of a run to completion.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub executed: u64,
    pub gc: GcStats,
}

enum Flow {
    Continue,
    Syscall(Syscall),
}

/// The spell virtual machine.
///
/// Owns its operand stack and heap exclusively. The host answers syscalls
/// and is never reached through anything but the bridge.
pub struct Vm<H: SpellHost> {
    program: Program,
    ip: usize,
    stack: OperandStack,
    heap: Heap,
    steps: u64,
    state: ExecState,
    config: RuntimeConfig,
    gc_stats: GcStats,
    host: H,
}

impl<H: SpellHost> Vm<H> {
    pub fn new(host: H) -> Self {
        Self::with_config(host, RuntimeConfig::default())
    }

    pub fn with_config(host: H, config: RuntimeConfig) -> Self {
        Self {
            program: Program::default(),
            ip: 0,
            stack: OperandStack::with_limit(config.max_stack_depth),
            heap: Heap::with_limit(config.heap_limit),
            steps: 0,
            state: ExecState::Idle,
            config,
            gc_stats: GcStats::default(),
            host,
        }
    }

    /// Reset all execution state and run `program` to completion.
    ///
    /// Syscall pauses are ignored; an unbounded program never returns.
    pub fn run(&mut self, program: &Program) -> Result<RunSummary, Fault> {
        self.load(program.clone());
        loop {
            let progress = self.resume(u64::MAX);
            match progress.exit {
                Exit::Halted => {
                    return Ok(RunSummary {
                        executed: self.steps,
                        gc: self.gc_stats.clone(),
                    });
                }
                Exit::Faulted(fault) => return Err(fault),
                Exit::BudgetExhausted | Exit::Paused(_) => {}
            }
        }
    }

    /// Discard the previous stack and heap and install `program`.
    ///
    /// Stack and heap limits from the config are applied here.
    pub fn load(&mut self, program: Program) {
        debug!(instructions = program.len(), "program loaded");
        self.program = program;
        self.ip = 0;
        self.steps = 0;
        self.stack = OperandStack::with_limit(self.config.max_stack_depth);
        self.heap = Heap::with_limit(self.config.heap_limit);
        self.gc_stats = GcStats::default();
        self.state = ExecState::Ready;
    }

    /// Execute at most `budget` instructions.
    ///
    /// Once halted or faulted, further calls execute nothing and report
    /// the same exit.
    pub fn resume(&mut self, budget: u64) -> Progress {
        match &self.state {
            ExecState::Idle | ExecState::Halted => {
                return Progress {
                    executed: 0,
                    exit: Exit::Halted,
                };
            }
            ExecState::Faulted(fault) => {
                return Progress {
                    executed: 0,
                    exit: Exit::Faulted(fault.clone()),
                };
            }
            ExecState::Ready => {}
        }

        let mut executed = 0;
        while executed < budget {
            let Some(&op) = self.program.get(self.ip) else {
                break;
            };
            let pc = self.ip;
            self.ip += 1;
            trace!(pc, op = %op, depth = self.stack.len(), "exec");

            let flow = match self.execute(op) {
                Ok(flow) => flow,
                Err(error) => {
                    let fault = Fault::new(pc, error);
                    warn!(%fault, "program faulted");
                    self.state = ExecState::Faulted(fault.clone());
                    return Progress {
                        executed,
                        exit: Exit::Faulted(fault),
                    };
                }
            };

            executed += 1;
            self.steps += 1;
            if self.config.gc_interval != 0 && self.steps % self.config.gc_interval == 0 {
                self.collect_garbage();
            }

            if let Flow::Syscall(call) = flow {
                if self.config.pause_on_syscall {
                    return Progress {
                        executed,
                        exit: Exit::Paused(call),
                    };
                }
            }
        }

        if self.ip >= self.program.len() {
            debug!(steps = self.steps, depth = self.stack.len(), "program halted");
            self.state = ExecState::Halted;
            return Progress {
                executed,
                exit: Exit::Halted,
            };
        }
        Progress {
            executed,
            exit: Exit::BudgetExhausted,
        }
    }

    /// Execute a single instruction.
    pub fn step(&mut self) -> Progress {
        self.resume(1)
    }

    /// Stop a loaded program. It ends `Faulted` with `Cancelled` at the
    /// current instruction pointer. Returns false if nothing was running.
    pub fn cancel(&mut self) -> bool {
        if self.state != ExecState::Ready {
            return false;
        }
        debug!(ip = self.ip, "program cancelled");
        self.state = ExecState::Faulted(Fault::new(self.ip, VmError::Cancelled));
        true
    }

    /// Run a full collection with the operand stack as roots.
    /// Returns the number of arrays freed.
    pub fn collect_garbage(&mut self) -> usize {
        let freed = self.heap.collect(self.stack.as_slice());
        self.gc_stats.cycles += 1;
        self.gc_stats.arrays_freed += freed as u64;
        debug!(
            freed,
            live = self.heap.live_count(),
            steps = self.steps,
            "gc cycle"
        );
        freed
    }

    pub fn state(&self) -> &ExecState {
        &self.state
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, ExecState::Halted | ExecState::Faulted(_))
    }

    /// Index of the next instruction to execute.
    pub fn ip(&self) -> usize {
        self.ip
    }

    /// Instructions executed since the last load.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn stack(&self) -> &OperandStack {
        &self.stack
    }

    /// Mutable stack access for a host driving the VM between slices.
    pub fn stack_mut(&mut self) -> &mut OperandStack {
        &mut self.stack
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn gc_stats(&self) -> &GcStats {
        &self.gc_stats
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Limits take effect on the next load; everything else immediately.
    pub fn config_mut(&mut self) -> &mut RuntimeConfig {
        &mut self.config
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn into_host(self) -> H {
        self.host
    }

    fn execute(&mut self, op: Op) -> Result<Flow, VmError> {
        match op {
            Op::ImmediateInt(n) => self.stack.push_int(n)?,
            Op::ImmediateDouble(d) => self.stack.push_double(d)?,

            Op::Pop(n) => self.stack.discard(n)?,
            Op::Copy(k) => self.stack.copy(k)?,
            Op::Set(k) => self.stack.set(k)?,

            Op::AddI => self.int_binop(|a, b| Ok(a.wrapping_add(b)))?,
            Op::SubI => self.int_binop(|a, b| Ok(a.wrapping_sub(b)))?,
            Op::MulI => self.int_binop(|a, b| Ok(a.wrapping_mul(b)))?,
            Op::DivI => self.int_binop(|a, b| {
                if b == 0 {
                    return Err(VmError::DivideByZero);
                }
                Ok(a.wrapping_div(b))
            })?,
            Op::ModI => self.int_binop(|a, b| {
                if b == 0 {
                    return Err(VmError::DivideByZero);
                }
                Ok(a.wrapping_rem(b))
            })?,
            Op::AndI => self.int_binop(|a, b| Ok(a & b))?,
            Op::OrI => self.int_binop(|a, b| Ok(a | b))?,
            Op::XorI => self.int_binop(|a, b| Ok(a ^ b))?,
            // Shift amounts are taken modulo 32.
            Op::ShlI => self.int_binop(|a, b| Ok(a.wrapping_shl(b as u32)))?,
            Op::ShrI => self.int_binop(|a, b| Ok(a.wrapping_shr(b as u32)))?,
            Op::ShrlI => self.int_binop(|a, b| Ok((a as u32).wrapping_shr(b as u32) as i32))?,
            Op::LtI => self.int_binop(|a, b| Ok((a < b) as i32))?,
            Op::GeI => self.int_binop(|a, b| Ok((a >= b) as i32))?,
            Op::NotI => {
                let a = expect_int(self.stack.peek(0)?)?;
                self.stack.discard(1)?;
                self.stack.push_int(!a)?;
            }

            Op::AddD => self.double_binop(|a, b| a + b)?,
            Op::SubD => self.double_binop(|a, b| a - b)?,
            Op::MulD => self.double_binop(|a, b| a * b)?,
            Op::DivD => self.double_binop(|a, b| a / b)?,

            Op::ConvID => {
                let a = self.stack.pop_int()?;
                self.stack.push_double(a as f64)?;
            }
            // Truncates toward zero; out-of-range values saturate, NaN becomes 0.
            Op::ConvDI => {
                let a = self.stack.pop_double()?;
                self.stack.push_int(a as i32)?;
            }

            Op::Brz(target) => {
                let cond = expect_int(self.stack.peek(0)?)?;
                if cond == 0 {
                    self.ip = self.check_target(target)?;
                }
                self.stack.discard(1)?;
            }
            Op::Brnz(target) => {
                let cond = expect_int(self.stack.peek(0)?)?;
                if cond != 0 {
                    self.ip = self.check_target(target)?;
                }
                self.stack.discard(1)?;
            }
            Op::Jmp(target) => {
                self.ip = self.check_target(target)?;
            }
            Op::Call(target) => {
                let target = self.check_target(target)?;
                self.stack.push(Value::ReturnAddress(self.ip as u32))?;
                self.ip = target;
            }
            Op::Return(arity) => {
                let addr = expect_return_address(self.stack.peek(arity)?)?;
                let target = self.check_target(addr)?;
                // Results go back in the order they were pushed.
                let results = self.stack.pop_n(arity)?;
                self.stack.discard(1)?;
                self.stack.extend(results)?;
                self.ip = target;
            }

            Op::Syscall(code) => return self.syscall(code),

            Op::AllocA(elem) => {
                let size = expect_int(self.stack.peek(0)?)?;
                let r = self.heap.alloc(size, elem)?;
                self.gc_stats.peak_live = self.gc_stats.peak_live.max(self.heap.live_count());
                self.stack.discard(1)?;
                self.stack.push(Value::ArrayRef(r))?;
            }
            Op::GetA => {
                let index = expect_int(self.stack.peek(0)?)?;
                let r = expect_array(self.stack.peek(1)?)?;
                let value = self.heap.load(r, index)?;
                self.stack.discard(2)?;
                self.stack.push(value)?;
            }
            Op::SetA => {
                let value = self.stack.peek(0)?;
                let index = expect_int(self.stack.peek(1)?)?;
                let r = expect_array(self.stack.peek(2)?)?;
                self.heap.store(r, index, value)?;
                self.stack.discard(3)?;
            }
            Op::LenA => {
                let r = expect_array(self.stack.peek(0)?)?;
                let len = self.heap.len(r)?;
                self.stack.discard(1)?;
                self.stack.push_int(len as i32)?;
            }
        }
        Ok(Flow::Continue)
    }

    fn syscall(&mut self, code: i32) -> Result<Flow, VmError> {
        let Some(call) = Syscall::from_code(code) else {
            return match self.config.syscall_mode {
                SyscallMode::Strict => Err(VmError::UnknownSyscall(code)),
                SyscallMode::Lenient => {
                    warn!(code, pc = self.ip - 1, "unknown syscall ignored");
                    Ok(Flow::Continue)
                }
            };
        };
        trace!(%call, "syscall");
        syscall::dispatch(call, &mut self.host, &mut self.stack)?;
        Ok(Flow::Syscall(call))
    }

    /// Pop `[a, b]`, push `f(a, b)`. The stack is untouched if `f` fails.
    fn int_binop(
        &mut self,
        f: impl FnOnce(i32, i32) -> Result<i32, VmError>,
    ) -> Result<(), VmError> {
        let b = expect_int(self.stack.peek(0)?)?;
        let a = expect_int(self.stack.peek(1)?)?;
        let result = f(a, b)?;
        self.stack.discard(2)?;
        self.stack.push_int(result)
    }

    fn double_binop(&mut self, f: impl FnOnce(f64, f64) -> f64) -> Result<(), VmError> {
        let b = expect_double(self.stack.peek(0)?)?;
        let a = expect_double(self.stack.peek(1)?)?;
        self.stack.discard(2)?;
        self.stack.push_double(f(a, b))
    }

    /// A target equal to the program length halts; anything past it faults.
    fn check_target(&self, target: u32) -> Result<usize, VmError> {
        let target = target as usize;
        if target > self.program.len() {
            return Err(VmError::IndexOutOfRange {
                index: target as i64,
                len: self.program.len(),
            });
        }
        Ok(target)
    }
}

fn mismatch(expected: &'static str, found: Value) -> VmError {
    VmError::TypeMismatch {
        expected,
        found: found.type_name(),
    }
}

fn expect_int(v: Value) -> Result<i32, VmError> {
    v.as_int().ok_or_else(|| mismatch("int", v))
}

fn expect_double(v: Value) -> Result<f64, VmError> {
    v.as_double().ok_or_else(|| mismatch("double", v))
}

fn expect_array(v: Value) -> Result<ArrayRef, VmError> {
    v.as_array_ref().ok_or_else(|| mismatch("array", v))
}

fn expect_return_address(v: Value) -> Result<u32, VmError> {
    v.as_return_address()
        .ok_or_else(|| mismatch("return address", v))
}

impl<H: SpellHost + Default> Default for Vm<H> {
    fn default() -> Self {
        Self::new(H::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::{ElemType, NullHost};

    fn run_code(ops: Vec<Op>) -> Result<Vec<Value>, Fault> {
        let mut vm = Vm::new(NullHost);
        vm.run(&Program::new(ops))?;
        Ok(vm.stack().to_vec())
    }

    fn ints(values: &[i32]) -> Vec<Value> {
        values.iter().map(|&v| Value::Int(v)).collect()
    }

    fn int_arith(a: i32, b: i32, op: Op) -> i32 {
        let stack = run_code(vec![Op::ImmediateInt(a), Op::ImmediateInt(b), op]).unwrap();
        assert_eq!(stack.len(), 1);
        stack[0].as_int().unwrap()
    }

    struct Pool(i32);

    impl SpellHost for Pool {
        fn resource_pool(&mut self) -> i32 {
            self.0
        }
        fn environment(&mut self) -> i32 {
            0
        }
        fn spawn_effect(&mut self, _kind: i32) {}
        fn own_position(&mut self) -> (i32, i32) {
            (0, 0)
        }
        fn opposing_position(&mut self) -> (i32, i32) {
            (0, 0)
        }
        fn emit_char(&mut self, _code: i32) {}
    }

    #[test]
    fn test_immediate() {
        assert_eq!(run_code(vec![Op::ImmediateInt(5)]).unwrap(), ints(&[5]));
        assert_eq!(
            run_code(vec![Op::ImmediateDouble(1.5)]).unwrap(),
            vec![Value::Double(1.5)]
        );
    }

    #[test]
    fn test_pop() {
        let ops = vec![
            Op::ImmediateInt(1),
            Op::ImmediateInt(2),
            Op::ImmediateInt(3),
            Op::Pop(2),
        ];
        assert_eq!(run_code(ops).unwrap(), ints(&[1]));
    }

    #[test]
    fn test_copy_and_set() {
        let push = |extra: Vec<Op>| {
            let mut ops = vec![
                Op::ImmediateInt(1),
                Op::ImmediateInt(2),
                Op::ImmediateInt(3),
            ];
            ops.extend(extra);
            run_code(ops).unwrap()
        };
        assert_eq!(push(vec![Op::Copy(0)]), ints(&[1, 2, 3, 3]));
        assert_eq!(push(vec![Op::Copy(2)]), ints(&[1, 2, 3, 1]));
        assert_eq!(push(vec![Op::ImmediateInt(0), Op::Set(2)]), ints(&[0, 2, 3]));
        assert_eq!(push(vec![Op::ImmediateInt(0), Op::Set(1)]), ints(&[1, 0, 3]));
        assert_eq!(push(vec![Op::ImmediateInt(0), Op::Set(0)]), ints(&[1, 2, 0]));
    }

    #[test]
    fn test_int_wraps() {
        assert_eq!(int_arith(i32::MAX, 1, Op::AddI), i32::MIN);
        assert_eq!(int_arith(i32::MIN, 1, Op::SubI), i32::MAX);
        assert_eq!(int_arith(i32::MAX, 2, Op::MulI), -2);
        assert_eq!(int_arith(i32::MIN, -1, Op::DivI), i32::MIN);
        assert_eq!(int_arith(i32::MIN, -1, Op::ModI), 0);
    }

    #[test]
    fn test_div_mod_truncate() {
        assert_eq!(int_arith(61, -20, Op::DivI), -3);
        assert_eq!(int_arith(-100, 3, Op::ModI), -1);
        assert_eq!(int_arith(7, 2, Op::DivI), 3);
        assert_eq!(int_arith(10, 3, Op::SubI), 7);
    }

    #[test]
    fn test_bitwise() {
        assert_eq!(int_arith(0b10, 0b11, Op::AndI), 0b10);
        assert_eq!(int_arith(0x00ff00ff, 0xff00ff00u32 as i32, Op::AndI), 0);
        assert_eq!(int_arith(0x0f0f, 0x00f0, Op::OrI), 0x0fff);
        assert_eq!(int_arith(0x00ff00ff, 0xff00ff00u32 as i32, Op::OrI), -1);
        assert_eq!(int_arith(0x0f0ff, 0x00f0f, Op::XorI), 0x0fff0);
        assert_eq!(int_arith(0x00ff00ff, 0x0000ff00, Op::XorI), 0x00ffffff);
        let stack = run_code(vec![Op::ImmediateInt(0), Op::NotI]).unwrap();
        assert_eq!(stack, ints(&[-1]));
    }

    #[test]
    fn test_shifts() {
        assert_eq!(int_arith(123, 1, Op::ShlI), 246);
        assert_eq!(int_arith(123, 3, Op::ShlI), 123 * 8);
        assert_eq!(int_arith(1, 33, Op::ShlI), 2);
        assert_eq!(int_arith(-8, 1, Op::ShrI), -4);
        assert_eq!(int_arith(-1, 28, Op::ShrlI), 0xf);
    }

    #[test]
    fn test_comparison() {
        assert_eq!(int_arith(1, 2, Op::LtI), 1);
        assert_eq!(int_arith(2, 2, Op::LtI), 0);
        assert_eq!(int_arith(2, 2, Op::GeI), 1);
        assert_eq!(int_arith(-5, 2, Op::GeI), 0);
    }

    #[test]
    fn test_double_arith_and_conversion() {
        let stack = run_code(vec![
            Op::ImmediateDouble(7.0),
            Op::ImmediateDouble(2.0),
            Op::DivD,
            Op::ImmediateInt(2),
            Op::ConvID,
            Op::SubD,
            Op::ConvDI,
        ])
        .unwrap();
        assert_eq!(stack, ints(&[1]));

        let stack = run_code(vec![
            Op::ImmediateDouble(1.0),
            Op::ImmediateDouble(0.0),
            Op::DivD,
        ])
        .unwrap();
        assert_eq!(stack, vec![Value::Double(f64::INFINITY)]);

        let stack = run_code(vec![Op::ImmediateDouble(-2.9), Op::ConvDI]).unwrap();
        assert_eq!(stack, ints(&[-2]));
    }

    #[test]
    fn test_division_by_zero_faults() {
        let fault = run_code(vec![Op::ImmediateInt(1), Op::ImmediateInt(0), Op::DivI]).unwrap_err();
        assert_eq!(fault, Fault::new(2, VmError::DivideByZero));

        let mut vm = Vm::new(NullHost);
        let program = Program::new(vec![Op::ImmediateInt(1), Op::ImmediateInt(0), Op::ModI]);
        assert!(vm.run(&program).is_err());
        // Operands stay in place for inspection.
        assert_eq!(vm.stack().as_slice(), ints(&[1, 0]).as_slice());
    }

    #[test]
    fn test_type_mismatch_faults() {
        let fault = run_code(vec![Op::ImmediateDouble(1.0), Op::ImmediateInt(1), Op::AddI])
            .unwrap_err();
        assert_eq!(
            fault.error,
            VmError::TypeMismatch {
                expected: "int",
                found: "double"
            }
        );
        assert_eq!(fault.pc, 2);
    }

    #[test]
    fn test_underflow_faults() {
        let fault = run_code(vec![Op::ImmediateInt(1), Op::AddI]).unwrap_err();
        assert_eq!(
            fault,
            Fault::new(
                1,
                VmError::StackUnderflow {
                    needed: 2,
                    depth: 1
                }
            )
        );
        assert!(run_code(vec![Op::Pop(1)]).is_err());
        assert!(run_code(vec![Op::Copy(0)]).is_err());
    }

    #[test]
    fn test_branches() {
        // if 0 then 10 else 20
        let ops = |cond| {
            vec![
                Op::ImmediateInt(cond),
                Op::Brz(4),
                Op::ImmediateInt(20),
                Op::Jmp(5),
                Op::ImmediateInt(10),
            ]
        };
        assert_eq!(run_code(ops(0)).unwrap(), ints(&[10]));
        assert_eq!(run_code(ops(1)).unwrap(), ints(&[20]));

        let ops = vec![Op::ImmediateInt(3), Op::Brnz(3), Op::ImmediateInt(9)];
        assert_eq!(run_code(ops).unwrap(), Vec::<Value>::new());
    }

    #[test]
    fn test_loop_counts_down() {
        // n = 5; while n != 0 { n -= 1 }
        let ops = vec![
            Op::ImmediateInt(5),
            Op::Copy(0),
            Op::Brz(6),
            Op::ImmediateInt(1),
            Op::SubI,
            Op::Jmp(1),
        ];
        assert_eq!(run_code(ops).unwrap(), ints(&[0]));
    }

    #[test]
    fn test_jump_targets() {
        assert_eq!(run_code(vec![Op::Jmp(1)]).unwrap(), Vec::<Value>::new());
        let fault = run_code(vec![Op::Jmp(2)]).unwrap_err();
        assert_eq!(
            fault,
            Fault::new(0, VmError::IndexOutOfRange { index: 2, len: 1 })
        );
    }

    #[test]
    fn test_call_return() {
        let ops = vec![
            Op::ImmediateInt(100), // 0: below the frame
            Op::Call(4),           // 1
            Op::ImmediateInt(7),   // 2: resumes here
            Op::Jmp(8),            // 3
            Op::ImmediateInt(1),   // 4: callee
            Op::ImmediateInt(2),   // 5
            Op::Return(2),         // 6
            Op::ImmediateInt(-1),  // 7: never reached
        ];
        assert_eq!(run_code(ops).unwrap(), ints(&[100, 1, 2, 7]));

        // Return(0) drops the address and hands nothing back.
        let ops = vec![
            Op::ImmediateInt(100), // 0
            Op::Call(3),           // 1
            Op::Jmp(6),            // 2
            Op::ImmediateInt(5),   // 3: callee
            Op::Pop(1),            // 4
            Op::Return(0),         // 5
        ];
        assert_eq!(run_code(ops).unwrap(), ints(&[100]));

        // A return address equal to the program length halts cleanly.
        let mut vm = Vm::new(NullHost);
        vm.load(Program::new(vec![
            Op::Jmp(3),          // 0
            Op::ImmediateInt(8), // 1: callee
            Op::Return(1),       // 2
            Op::Call(1),         // 3: returns to 4
        ]));
        let progress = vm.resume(10);
        assert_eq!(progress.exit, Exit::Halted);
        assert_eq!(progress.executed, 4);
        assert_eq!(vm.stack().as_slice(), ints(&[8]).as_slice());
    }

    #[test]
    fn test_call_return_restores_ip() {
        let mut vm = Vm::new(NullHost);
        vm.load(Program::new(vec![
            Op::Call(2),
            Op::Jmp(4),
            Op::ImmediateInt(9),
            Op::Return(1),
        ]));
        vm.resume(2);
        assert_eq!(vm.ip(), 3);
        vm.step();
        assert_eq!(vm.ip(), 1);
        assert_eq!(vm.stack().as_slice(), ints(&[9]).as_slice());
    }

    #[test]
    fn test_return_without_address_faults() {
        let fault = run_code(vec![Op::ImmediateInt(1), Op::ImmediateInt(2), Op::Return(1)])
            .unwrap_err();
        assert_eq!(fault.pc, 2);
        assert_eq!(
            fault.error,
            VmError::TypeMismatch {
                expected: "return address",
                found: "int"
            }
        );
    }

    #[test]
    fn test_array_round_trip() {
        let ops = vec![
            Op::ImmediateInt(3),
            Op::AllocA(ElemType::Int),
            Op::Copy(0),
            Op::ImmediateInt(1),
            Op::ImmediateInt(7),
            Op::SetA,
            Op::Copy(0),
            Op::ImmediateInt(1),
            Op::GetA,
            Op::Copy(1),
            Op::LenA,
        ];
        let stack = run_code(ops).unwrap();
        assert!(stack[0].is_array_ref());
        assert_eq!(&stack[1..], ints(&[7, 3]).as_slice());
    }

    #[test]
    fn test_array_faults() {
        let alloc = |elem| vec![Op::ImmediateInt(2), Op::AllocA(elem)];

        let mut ops = alloc(ElemType::Int);
        ops.extend([Op::ImmediateInt(2), Op::GetA]);
        assert_eq!(
            run_code(ops).unwrap_err().error,
            VmError::IndexOutOfRange { index: 2, len: 2 }
        );

        let mut ops = alloc(ElemType::Int);
        ops.extend([Op::ImmediateInt(-1), Op::ImmediateInt(0), Op::SetA]);
        assert!(matches!(
            run_code(ops).unwrap_err().error,
            VmError::IndexOutOfRange { index: -1, .. }
        ));

        let mut ops = alloc(ElemType::Double);
        ops.extend([Op::ImmediateInt(0), Op::ImmediateInt(1), Op::SetA]);
        assert!(matches!(
            run_code(ops).unwrap_err().error,
            VmError::TypeMismatch { .. }
        ));

        let ops = vec![Op::ImmediateInt(-3), Op::AllocA(ElemType::Int)];
        assert_eq!(
            run_code(ops).unwrap_err().error,
            VmError::InvalidArraySize(-3)
        );
    }

    #[test]
    fn test_gc_frees_unreachable_arrays() {
        let mut ops = vec![
            Op::ImmediateInt(4),
            Op::AllocA(ElemType::Int),
            Op::Pop(1),
        ];
        // Jumping to the next instruction is a no-op.
        for pc in 3..(3 + 256) {
            ops.push(Op::Jmp(pc + 1));
        }
        let mut vm = Vm::new(NullHost);
        vm.load(Program::new(ops));
        vm.resume(3);
        assert_eq!(vm.heap().live_count(), 1);
        let progress = vm.resume(u64::MAX);
        assert_eq!(progress.exit, Exit::Halted);
        assert_eq!(vm.heap().live_count(), 0);
        assert_eq!(vm.gc_stats().arrays_freed, 1);
        assert_eq!(vm.gc_stats().peak_live, 1);
    }

    #[test]
    fn test_gc_keeps_referenced_arrays() {
        let mut ops = vec![Op::ImmediateInt(4), Op::AllocA(ElemType::Double)];
        for pc in 2..1000 {
            ops.push(Op::Jmp(pc + 1));
        }
        let mut vm = Vm::with_config(NullHost, RuntimeConfig::default().with_gc_interval(16));
        let summary = vm.run(&Program::new(ops)).unwrap();
        assert!(summary.gc.cycles >= 60);
        assert_eq!(summary.gc.arrays_freed, 0);
        assert_eq!(vm.heap().live_count(), 1);
        let r = vm.stack().peek(0).unwrap().as_array_ref().unwrap();
        assert_eq!(vm.heap().len(r), Ok(4));
    }

    #[test]
    fn test_gc_interval_zero_disables_collection() {
        let mut ops = Vec::new();
        for _ in 0..300 {
            ops.extend([Op::ImmediateInt(1), Op::AllocA(ElemType::Int), Op::Pop(1)]);
        }
        let mut vm = Vm::with_config(NullHost, RuntimeConfig::default().with_gc_interval(0));
        let summary = vm.run(&Program::new(ops)).unwrap();
        assert_eq!(summary.gc.cycles, 0);
        assert_eq!(vm.heap().live_count(), 300);
        assert_eq!(vm.collect_garbage(), 300);
    }

    #[test]
    fn test_syscall_pushes_host_result() {
        let mut vm = Vm::new(Pool(42));
        vm.run(&Program::new(vec![Op::Syscall(1)])).unwrap();
        assert_eq!(vm.stack().as_slice(), ints(&[42]).as_slice());
    }

    #[test]
    fn test_unknown_syscall_modes() {
        let program = Program::new(vec![Op::Syscall(99), Op::ImmediateInt(1)]);

        let mut lenient = Vm::new(NullHost);
        lenient.run(&program).unwrap();
        assert_eq!(lenient.stack().as_slice(), ints(&[1]).as_slice());

        let mut strict = Vm::with_config(NullHost, RuntimeConfig::default().strict());
        assert_eq!(
            strict.run(&program),
            Err(Fault::new(0, VmError::UnknownSyscall(99)))
        );
    }

    #[test]
    fn test_pause_on_syscall() {
        let config = RuntimeConfig::default().with_pause_on_syscall(true);
        let mut vm = Vm::with_config(NullHost, config);
        vm.load(Program::new(vec![
            Op::ImmediateInt(0x62),
            Op::Syscall(7),
            Op::ImmediateInt(1),
        ]));
        let progress = vm.resume(100);
        assert_eq!(progress.executed, 2);
        assert_eq!(progress.exit, Exit::Paused(Syscall::EmitChar));
        let progress = vm.resume(100);
        assert_eq!(progress.executed, 1);
        assert_eq!(progress.exit, Exit::Halted);
    }

    #[test]
    fn test_resume_budget() {
        let mut vm = Vm::new(NullHost);
        vm.load(Program::new(vec![Op::Jmp(0)]));
        let progress = vm.resume(1000);
        assert_eq!(progress.executed, 1000);
        assert_eq!(progress.exit, Exit::BudgetExhausted);
        assert_eq!(vm.steps(), 1000);
        assert_eq!(vm.resume(0).exit, Exit::BudgetExhausted);
    }

    #[test]
    fn test_cancel() {
        let mut vm = Vm::new(NullHost);
        assert!(!vm.cancel());
        vm.load(Program::new(vec![Op::Jmp(0)]));
        vm.resume(10);
        assert!(vm.cancel());
        let progress = vm.resume(10);
        assert_eq!(progress.executed, 0);
        assert_eq!(
            progress.exit,
            Exit::Faulted(Fault::new(0, VmError::Cancelled))
        );
        assert!(vm.is_finished());
    }

    #[test]
    fn test_terminal_states_are_sticky() {
        let mut vm = Vm::new(NullHost);
        vm.load(Program::new(vec![Op::ImmediateInt(1), Op::Pop(2)]));
        let first = vm.resume(10);
        assert!(matches!(first.exit, Exit::Faulted(_)));
        assert_eq!(first.executed, 1);
        assert_eq!(vm.resume(10).exit, first.exit);

        vm.load(Program::new(vec![]));
        assert_eq!(vm.resume(10).exit, Exit::Halted);
        assert_eq!(vm.state(), &ExecState::Halted);
    }

    #[test]
    fn test_run_resets_state() {
        let mut vm = Vm::new(NullHost);
        vm.run(&Program::new(vec![
            Op::ImmediateInt(1),
            Op::AllocA(ElemType::Int),
        ]))
        .unwrap();
        assert_eq!(vm.heap().live_count(), 1);
        vm.run(&Program::new(vec![Op::ImmediateInt(5)])).unwrap();
        assert_eq!(vm.stack().as_slice(), ints(&[5]).as_slice());
        assert!(vm.heap().is_empty());
        assert_eq!(vm.steps(), 1);
    }

    #[test]
    fn test_stack_depth_limit() {
        let config = RuntimeConfig {
            max_stack_depth: Some(4),
            ..RuntimeConfig::default()
        };
        let mut vm = Vm::with_config(NullHost, config);
        let fault = vm
            .run(&Program::new(vec![Op::ImmediateInt(0), Op::Copy(0), Op::Jmp(1)]))
            .unwrap_err();
        assert_eq!(fault, Fault::new(1, VmError::StackOverflow { limit: 4 }));
    }

    #[test]
    fn test_syscall_results_need_room() {
        let config = RuntimeConfig {
            max_stack_depth: Some(1),
            ..RuntimeConfig::default()
        };
        let mut vm = Vm::with_config(Pool(3), config);
        let fault = vm
            .run(&Program::new(vec![Op::Syscall(Syscall::OwnPosition.code())]))
            .unwrap_err();
        assert_eq!(fault, Fault::new(0, VmError::StackOverflow { limit: 1 }));
        assert!(vm.stack().is_empty());
    }

    #[test]
    fn test_huge_allocation_faults() {
        let mut vm = Vm::new(NullHost);
        let fault = vm
            .run(&Program::new(vec![
                Op::ImmediateInt(i32::MAX),
                Op::AllocA(ElemType::Int),
            ]))
            .unwrap_err();
        assert_eq!(fault.pc, 1);
        assert!(matches!(fault.error, VmError::HeapLimitExceeded { .. }));
        assert_eq!(vm.stack().as_slice(), ints(&[i32::MAX]).as_slice());
        assert!(vm.heap().is_empty());
    }
}
