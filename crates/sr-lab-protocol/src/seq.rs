//! Modular sequence-number arithmetic.
//!
//! ```text
//!   base / expected          + window_size
//! ------|------------------------|------------------> (mod seq_space)
//!       |<-- window positions -->|
//! ```

use crate::error::ConfigError;
use sr_lab_abstract::{ProtocolConfig, SeqNum};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeqSpace {
    size: usize,
    window: usize,
}

impl SeqSpace {
    /// Validates `seq_space >= 2 * window_size`. With fewer sequence numbers
    /// a new packet can carry the number of an old, already acknowledged one
    /// the receiver still remembers.
    pub fn new(window: usize, size: usize) -> Result<Self, ConfigError> {
        if window == 0 {
            return Err(ConfigError::EmptyWindow);
        }
        if size < window.saturating_mul(2) {
            return Err(ConfigError::SequenceSpaceTooSmall {
                window_size: window,
                seq_space: size,
            });
        }
        if SeqNum::try_from(size).is_err() {
            return Err(ConfigError::SequenceSpaceTooLarge { seq_space: size });
        }
        Ok(Self { size, window })
    }

    pub fn from_config(config: &ProtocolConfig) -> Result<Self, ConfigError> {
        if config.timeout == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Self::new(config.window_size, config.seq_space)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Slot index for a wire sequence number, or `None` when it lies
    /// outside `0..size`.
    pub fn index(&self, seq: SeqNum) -> Option<usize> {
        usize::try_from(seq).ok().filter(|&idx| idx < self.size)
    }

    /// Wire form of a slot index. `idx` is always below `size`, which
    /// `new` checked fits in a `SeqNum`.
    pub fn seq(&self, idx: usize) -> SeqNum {
        (idx % self.size) as SeqNum
    }

    pub fn next(&self, idx: usize) -> usize {
        (idx + 1) % self.size
    }

    /// Forward distance from `from` to `to`, modulo the space.
    pub fn distance(&self, from: usize, to: usize) -> usize {
        (to + self.size - from) % self.size
    }

    /// Window positions `start, start + 1, ..` for `len` steps.
    pub fn run(&self, start: usize, len: usize) -> impl Iterator<Item = usize> + '_ {
        (0..len).map(move |offset| (start + offset) % self.size)
    }
}
