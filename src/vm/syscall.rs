//! The syscall bridge between spell programs and the host world.
//!
//! `Syscall(code)` looks the code up in a fixed table. The bridge pops the
//! arguments, calls the matching [`SpellHost`] capability and pushes the
//! results, so a host never touches the operand stack itself.

use std::fmt;

use super::stack::OperandStack;
use super::VmError;

/// The fixed syscall table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Syscall {
    /// Ask the host to move the caster.
    Move = 0,
    /// [] → [int mana]
    ResourcePool = 1,
    /// [] → [int environment id]
    Environment = 2,
    /// [int kind] → []
    SpawnEffect = 3,
    /// [] → [int row, int col]
    OwnPosition = 4,
    /// [] → [int row, int col]
    OpposingPosition = 5,
    /// End the caster's turn.
    YieldTurn = 6,
    /// [int char code] → []
    EmitChar = 7,
}

impl Syscall {
    pub const ALL: [Syscall; 8] = [
        Syscall::Move,
        Syscall::ResourcePool,
        Syscall::Environment,
        Syscall::SpawnEffect,
        Syscall::OwnPosition,
        Syscall::OpposingPosition,
        Syscall::YieldTurn,
        Syscall::EmitChar,
    ];

    pub fn from_code(code: i32) -> Option<Self> {
        usize::try_from(code)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }

    pub fn code(self) -> i32 {
        self as i32
    }

    /// Values the bridge pops before calling the host.
    pub fn pops(self) -> usize {
        match self {
            Syscall::SpawnEffect | Syscall::EmitChar => 1,
            _ => 0,
        }
    }

    /// Values the bridge pushes after the host returns.
    pub fn pushes(self) -> usize {
        match self {
            Syscall::ResourcePool | Syscall::Environment => 1,
            Syscall::OwnPosition | Syscall::OpposingPosition => 2,
            _ => 0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Syscall::Move => "move",
            Syscall::ResourcePool => "resource_pool",
            Syscall::Environment => "environment",
            Syscall::SpawnEffect => "spawn_effect",
            Syscall::OwnPosition => "own_position",
            Syscall::OpposingPosition => "opposing_position",
            Syscall::YieldTurn => "yield_turn",
            Syscall::EmitChar => "emit_char",
        }
    }
}

impl fmt::Display for Syscall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}

/// Capabilities a host world offers to running spells.
///
/// Positions are `(row, col)`.
pub trait SpellHost {
    fn request_move(&mut self) {}
    fn resource_pool(&mut self) -> i32;
    fn environment(&mut self) -> i32;
    fn spawn_effect(&mut self, kind: i32);
    fn own_position(&mut self) -> (i32, i32);
    fn opposing_position(&mut self) -> (i32, i32);
    fn yield_turn(&mut self) {}
    fn emit_char(&mut self, code: i32);
}

impl<H: SpellHost + ?Sized> SpellHost for &mut H {
    fn request_move(&mut self) {
        (**self).request_move()
    }
    fn resource_pool(&mut self) -> i32 {
        (**self).resource_pool()
    }
    fn environment(&mut self) -> i32 {
        (**self).environment()
    }
    fn spawn_effect(&mut self, kind: i32) {
        (**self).spawn_effect(kind)
    }
    fn own_position(&mut self) -> (i32, i32) {
        (**self).own_position()
    }
    fn opposing_position(&mut self) -> (i32, i32) {
        (**self).opposing_position()
    }
    fn yield_turn(&mut self) {
        (**self).yield_turn()
    }
    fn emit_char(&mut self, code: i32) {
        (**self).emit_char(code)
    }
}

impl<H: SpellHost + ?Sized> SpellHost for Box<H> {
    fn request_move(&mut self) {
        (**self).request_move()
    }
    fn resource_pool(&mut self) -> i32 {
        (**self).resource_pool()
    }
    fn environment(&mut self) -> i32 {
        (**self).environment()
    }
    fn spawn_effect(&mut self, kind: i32) {
        (**self).spawn_effect(kind)
    }
    fn own_position(&mut self) -> (i32, i32) {
        (**self).own_position()
    }
    fn opposing_position(&mut self) -> (i32, i32) {
        (**self).opposing_position()
    }
    fn yield_turn(&mut self) {
        (**self).yield_turn()
    }
    fn emit_char(&mut self, code: i32) {
        (**self).emit_char(code)
    }
}

/// A host with an empty world: queries answer zero, effects do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullHost;

impl SpellHost for NullHost {
    fn resource_pool(&mut self) -> i32 {
        0
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

/// Perform one syscall against `host`, applying its stack contract.
///
/// Arguments and room for results are validated before the host is
/// called, so a failed syscall has no host-side effect and leaves the
/// stack unchanged.
pub fn dispatch<H: SpellHost + ?Sized>(
    call: Syscall,
    host: &mut H,
    stack: &mut OperandStack,
) -> Result<(), VmError> {
    stack.ensure_room(call.pushes())?;
    match call {
        Syscall::Move => host.request_move(),
        Syscall::ResourcePool => {
            let mana = host.resource_pool();
            stack.push_int(mana)?;
        }
        Syscall::Environment => {
            let env = host.environment();
            stack.push_int(env)?;
        }
        Syscall::SpawnEffect => {
            let kind = stack.pop_int()?;
            host.spawn_effect(kind);
        }
        Syscall::OwnPosition => {
            let (row, col) = host.own_position();
            stack.push_int(row)?;
            stack.push_int(col)?;
        }
        Syscall::OpposingPosition => {
            let (row, col) = host.opposing_position();
            stack.push_int(row)?;
            stack.push_int(col)?;
        }
        Syscall::YieldTurn => host.yield_turn(),
        Syscall::EmitChar => {
            let code = stack.pop_int()?;
            host.emit_char(code);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::Value;

    #[derive(Default)]
    struct Recorder {
        spawned: Vec<i32>,
        chars: Vec<i32>,
        moves: usize,
        queries: usize,
    }

    impl SpellHost for Recorder {
        fn request_move(&mut self) {
            self.moves += 1;
        }
        fn resource_pool(&mut self) -> i32 {
            self.queries += 1;
            42
        }
        fn environment(&mut self) -> i32 {
            3
        }
        fn spawn_effect(&mut self, kind: i32) {
            self.spawned.push(kind);
        }
        fn own_position(&mut self) -> (i32, i32) {
            self.queries += 1;
            (4, 9)
        }
        fn opposing_position(&mut self) -> (i32, i32) {
            (1, 2)
        }
        fn emit_char(&mut self, code: i32) {
            self.chars.push(code);
        }
    }

    #[test]
    fn test_codes() {
        for (i, call) in Syscall::ALL.iter().enumerate() {
            assert_eq!(call.code(), i as i32);
            assert_eq!(Syscall::from_code(i as i32), Some(*call));
        }
        assert_eq!(Syscall::from_code(8), None);
        assert_eq!(Syscall::from_code(-1), None);
    }

    #[test]
    fn test_contract_matches_dispatch() {
        for call in Syscall::ALL {
            let mut host = Recorder::default();
            let mut stack = OperandStack::new();
            for _ in 0..call.pops() {
                stack.push_int(0x62).unwrap();
            }
            dispatch(call, &mut host, &mut stack).unwrap();
            assert_eq!(stack.len(), call.pushes(), "{}", call);
        }
    }

    #[test]
    fn test_position_pushes_row_then_col() {
        let mut host = Recorder::default();
        let mut stack = OperandStack::new();
        dispatch(Syscall::OwnPosition, &mut host, &mut stack).unwrap();
        assert_eq!(stack.as_slice(), &[Value::Int(4), Value::Int(9)]);
    }

    #[test]
    fn test_spawn_and_emit_pop_their_argument() {
        let mut host = Recorder::default();
        let mut stack = OperandStack::new();
        stack.push_int(7).unwrap();
        stack.push_int(2).unwrap();
        dispatch(Syscall::SpawnEffect, &mut host, &mut stack).unwrap();
        dispatch(Syscall::EmitChar, &mut host, &mut stack).unwrap();
        assert_eq!(host.spawned, vec![2]);
        assert_eq!(host.chars, vec![7]);
        assert!(stack.is_empty());
    }

    #[test]
    fn test_bad_argument_skips_host() {
        let mut host = Recorder::default();
        let mut stack = OperandStack::new();
        stack.push_double(1.0).unwrap();
        assert!(dispatch(Syscall::SpawnEffect, &mut host, &mut stack).is_err());
        assert!(host.spawned.is_empty());
        assert!(dispatch(Syscall::EmitChar, &mut host, &mut OperandStack::new()).is_err());
        assert!(host.chars.is_empty());
    }

    #[test]
    fn test_full_stack_skips_host() {
        let mut host = Recorder::default();
        let mut stack = OperandStack::with_limit(Some(1));
        assert_eq!(
            dispatch(Syscall::OwnPosition, &mut host, &mut stack),
            Err(VmError::StackOverflow { limit: 1 })
        );
        assert!(stack.is_empty());

        stack.push_int(5).unwrap();
        assert!(dispatch(Syscall::ResourcePool, &mut host, &mut stack).is_err());
        assert_eq!(stack.as_slice(), &[Value::Int(5)]);
        assert_eq!(host.queries, 0);
    }
}
