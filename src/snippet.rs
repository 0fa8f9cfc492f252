//! Injectable instruction sequences, held as plain bytes.

use std::borrow::Cow;

use crate::arch;

/// How the executor drives a snippet once it is in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Single-step until the architecture's trap opcode sits at the
    /// instruction pointer. Requires the snippet to end in that opcode.
    UntilTrap,
    /// Single-step exactly this many instructions, then stop.
    Steps(usize),
}

/// A run of target machine code, treated purely as data.
///
/// The per-architecture entries in [`crate::arch`] cover the common cases;
/// callers with custom code build one from owned bytes.
#[derive(Debug, Clone)]
pub struct CodeSnippet {
    bytes: Cow<'static, [u8]>,
    mode: RunMode,
}

impl CodeSnippet {
    /// Table entry for run-to-completion code ending in the trap opcode.
    pub const fn until_trap_static(bytes: &'static [u8]) -> Self {
        Self {
            bytes: Cow::Borrowed(bytes),
            mode: RunMode::UntilTrap,
        }
    }

    /// Table entry for code driven by a fixed instruction count.
    pub const fn steps_static(bytes: &'static [u8], steps: usize) -> Self {
        Self {
            bytes: Cow::Borrowed(bytes),
            mode: RunMode::Steps(steps),
        }
    }

    /// Owned bytes, run until the trap opcode comes up.
    pub fn until_trap(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Cow::Owned(bytes),
            mode: RunMode::UntilTrap,
        }
    }

    /// Owned bytes, driven by a fixed instruction count.
    pub fn steps(bytes: Vec<u8>, steps: usize) -> Self {
        Self {
            bytes: Cow::Owned(bytes),
            mode: RunMode::Steps(steps),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Length in machine words, the tail rounded up to a word boundary.
    pub fn word_len(&self) -> usize {
        (self.bytes.len() + arch::WORD_SIZE - 1) / arch::WORD_SIZE
    }
}
