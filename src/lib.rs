//! Remote syscall and code execution inside a ptrace-stopped process.
//!
//! `impel` drives a traced process through short injected instruction
//! sequences: it saves the machine words under the tracee's instruction
//! pointer, splices a snippet over them, single-steps the tracee through
//! it, harvests the result register, then restores the displaced words
//! and the original registers. The tracee needs no cooperation beyond
//! being traceable, and syscalls made this way run with the tracee's own
//! credentials, descriptors, and address space.
//!
//! The usual path is [`ptrace::attach`] (or any arrangement that leaves
//! the process ptrace-stopped), [`Tracee::sequence`] to open a scope whose
//! calls share one register baseline, then the named wrappers or
//! [`CallSequence::syscall`] for the calls themselves.

pub mod arch;
pub mod error;
pub mod inject;
pub mod ptrace;
pub mod snippet;

mod syscalls;

#[cfg(all(test, target_arch = "x86_64"))]
pub(crate) mod mock;

pub use error::{ImpelError, Result};
pub use inject::{CallResult, CallSequence, Tracee, SCRATCH_WORDS};
pub use ptrace::{PtraceTarget, TraceTarget, WaitEvent};
pub use snippet::{CodeSnippet, RunMode};
