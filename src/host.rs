//! A reference [`SpellHost`] backed by an explicit world context.
//!
//! Spawning an effect costs mana; the host records everything a spell did
//! as a list of [`HostEvent`]s so callers can replay it into their own
//! simulation.

use std::fmt;
use std::io::Write;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::vm::SpellHost;

/// Spell effects a program may spawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Fireball = 0,
    Lightning = 1,
    IceSpike = 2,
    Portal = 3,
}

impl Effect {
    pub fn from_kind(kind: i32) -> Option<Self> {
        match kind {
            0 => Some(Effect::Fireball),
            1 => Some(Effect::Lightning),
            2 => Some(Effect::IceSpike),
            3 => Some(Effect::Portal),
            _ => None,
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Effect::Fireball => "fireball",
            Effect::Lightning => "lightning",
            Effect::IceSpike => "ice spike",
            Effect::Portal => "portal",
        };
        f.write_str(name)
    }
}

/// Something a spell did to the world.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Moved,
    Spawned(Effect),
    /// Not enough mana; nothing happened.
    Refused { effect: Effect, mana: i32 },
    /// Unknown effect kind; no mana spent.
    Fizzled(i32),
    YieldedTurn,
}

impl fmt::Display for HostEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostEvent::Moved => write!(f, "moved"),
            HostEvent::Spawned(effect) => write!(f, "spawned {}", effect),
            HostEvent::Refused { effect, mana } => {
                write!(f, "refused {} (insufficient mana: {})", effect, mana)
            }
            HostEvent::Fizzled(kind) => write!(f, "fizzled (unknown effect {})", kind),
            HostEvent::YieldedTurn => write!(f, "yielded turn"),
        }
    }
}

/// The world a spell runs against. Positions are `(row, col)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct World {
    pub mana: i32,
    pub environment: i32,
    pub player: (i32, i32),
    pub opponent: (i32, i32),
    /// Mana spent per spawned effect
    pub effect_cost: i32,
}

impl Default for World {
    fn default() -> Self {
        Self {
            mana: 20,
            environment: 0,
            player: (0, 0),
            opponent: (0, 0),
            effect_cost: 5,
        }
    }
}

/// Answers syscalls from a [`World`] and records their effects.
pub struct WorldHost {
    pub world: World,
    events: Vec<HostEvent>,
    transcript: String,
    echo: Option<Box<dyn Write>>,
}

impl WorldHost {
    pub fn new(world: World) -> Self {
        Self {
            world,
            events: Vec::new(),
            transcript: String::new(),
            echo: None,
        }
    }

    /// Also write emitted characters to `output` as they arrive.
    pub fn with_echo(mut self, output: Box<dyn Write>) -> Self {
        self.echo = Some(output);
        self
    }

    pub fn events(&self) -> &[HostEvent] {
        &self.events
    }

    /// Characters emitted so far.
    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    /// Drop recorded events and output, keeping the world.
    pub fn reset_log(&mut self) {
        self.events.clear();
        self.transcript.clear();
    }
}

impl Default for WorldHost {
    fn default() -> Self {
        Self::new(World::default())
    }
}

impl fmt::Debug for WorldHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorldHost")
            .field("world", &self.world)
            .field("events", &self.events)
            .field("transcript", &self.transcript)
            .finish_non_exhaustive()
    }
}

impl SpellHost for WorldHost {
    fn request_move(&mut self) {
        debug!("move requested");
        self.events.push(HostEvent::Moved);
    }

    fn resource_pool(&mut self) -> i32 {
        self.world.mana
    }

    fn environment(&mut self) -> i32 {
        self.world.environment
    }

    fn spawn_effect(&mut self, kind: i32) {
        let Some(effect) = Effect::from_kind(kind) else {
            warn!(kind, "unknown effect kind");
            self.events.push(HostEvent::Fizzled(kind));
            return;
        };
        // A negative cost from a config file counts as free.
        let cost = self.world.effect_cost.max(0);
        if self.world.mana < cost {
            info!(%effect, mana = self.world.mana, "insufficient mana");
            self.events.push(HostEvent::Refused {
                effect,
                mana: self.world.mana,
            });
            return;
        }
        self.world.mana = self.world.mana.saturating_sub(cost);
        debug!(%effect, mana = self.world.mana, "effect spawned");
        self.events.push(HostEvent::Spawned(effect));
    }

    fn own_position(&mut self) -> (i32, i32) {
        self.world.player
    }

    fn opposing_position(&mut self) -> (i32, i32) {
        self.world.opponent
    }

    fn yield_turn(&mut self) {
        self.events.push(HostEvent::YieldedTurn);
    }

    fn emit_char(&mut self, code: i32) {
        let c = u32::try_from(code)
            .ok()
            .and_then(char::from_u32)
            .unwrap_or(char::REPLACEMENT_CHARACTER);
        self.transcript.push(c);
        if let Some(out) = self.echo.as_mut() {
            let mut buf = [0u8; 4];
            if let Err(e) = out.write_all(c.encode_utf8(&mut buf).as_bytes()) {
                warn!(error = %e, "failed to echo output");
            }
        }
    }
}
