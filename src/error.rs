use std::io;

use libc::pid_t;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImpelError {
    #[error("{op} on pid {pid} failed: {source}")]
    Ptrace {
        op: &'static str,
        pid: pid_t,
        source: io::Error,
    },

    #[error("tracee {pid} vanished mid-call (wait status {status:#x})")]
    TraceeVanished { pid: pid_t, status: i32 },

    #[error("snippet of {words} words exceeds the {capacity}-word scratch buffer")]
    SnippetTooLong { words: usize, capacity: usize },

    #[error("snippet is empty")]
    EmptySnippet,

    #[error("this architecture has no trap opcode; run the snippet by step count instead")]
    NoTrapOpcode,

    #[error("syscalls take at most {max} arguments, got {given}")]
    TooManyArgs { given: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, ImpelError>;
