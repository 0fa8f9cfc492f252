//! Per-architecture register models and snippet tables.
//!
//! Each supported target supplies the same surface: a `UserRegs` register
//! file matching what `PTRACE_GETREGSET` returns for `NT_PRSTATUS`, the
//! machine word size, the optional trap opcode, and prebuilt snippets for
//! the syscall entry sequence.

#[cfg(target_arch = "x86_64")]
pub mod x86_64;

#[cfg(target_arch = "x86_64")]
pub use x86_64::*;

#[cfg(target_arch = "arm")]
pub mod arm;

#[cfg(target_arch = "arm")]
pub use arm::*;

#[cfg(not(any(target_arch = "x86_64", target_arch = "arm")))]
compile_error!("impel has no register model for this target architecture");

/// Arguments a syscall can carry on any supported target.
pub const MAX_SYSCALL_ARGS: usize = 6;
