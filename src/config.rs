//! Runtime configuration types.
//!
//! A config file is TOML with two optional tables:
//!
//! ```toml
//! [runtime]
//! gc_interval = 256
//! syscall_mode = "strict"
//!
//! [world]
//! mana = 20
//! player = [3, 4]
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::host::World;

/// What the engine does with a syscall code outside the table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyscallMode {
    /// Fault with `UnknownSyscall`.
    Strict,
    /// Log a warning and continue with no stack effect.
    #[default]
    Lenient,
}

/// Runtime configuration for the VM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Instructions between automatic collections (0 = never)
    pub gc_interval: u64,
    pub syscall_mode: SyscallMode,
    /// Return control to the caller after every syscall
    pub pause_on_syscall: bool,
    /// Hard limit on operand stack depth (None = unlimited)
    pub max_stack_depth: Option<usize>,
    /// Hard limit on live array elements (None = unlimited)
    pub heap_limit: Option<usize>,
}

/// Default element budget: 16M elements, 256 MiB of array storage.
pub const DEFAULT_HEAP_LIMIT: usize = 16 * 1024 * 1024;

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            gc_interval: 256,
            syscall_mode: SyscallMode::Lenient,
            pause_on_syscall: false,
            max_stack_depth: Some(65_536),
            heap_limit: Some(DEFAULT_HEAP_LIMIT),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Contents of a config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub runtime: RuntimeConfig,
    pub world: World,
}

impl ConfigFile {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }
}

impl RuntimeConfig {
    /// Parse the `[runtime]` table of a config file.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(ConfigFile::from_toml_str(content)?.runtime)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Ok(ConfigFile::load(path)?.runtime)
    }

    pub fn strict(mut self) -> Self {
        self.syscall_mode = SyscallMode::Strict;
        self
    }

    pub fn with_gc_interval(mut self, interval: u64) -> Self {
        self.gc_interval = interval;
        self
    }

    pub fn with_pause_on_syscall(mut self, pause: bool) -> Self {
        self.pause_on_syscall = pause;
        self
    }
}
