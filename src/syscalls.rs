//! Named remote syscalls layered over the injection executor.
//!
//! Buffer-taking calls want tracee addresses: the engine never copies
//! caller memory into the tracee, so `read` and pointer-flavored `ioctl`
//! requests must aim at memory that already exists on the other side.

use crate::error::Result;
use crate::inject::CallSequence;
use crate::ptrace::TraceTarget;

impl<T: TraceTarget> CallSequence<'_, T> {
    /// Remote `ioctl`. `arg` is passed through as-is, whether the request
    /// treats it as a value or a tracee address.
    pub fn ioctl(&mut self, fd: i32, request: usize, arg: usize) -> Result<isize> {
        self.syscall(libc::SYS_ioctl, &[fd as usize, request, arg])
    }

    /// Remote `fcntl`.
    pub fn fcntl(&mut self, fd: i32, cmd: i32, arg: usize) -> Result<isize> {
        self.syscall(libc::SYS_fcntl, &[fd as usize, cmd as usize, arg])
    }

    /// Remote `read` into a buffer inside the tracee.
    pub fn read(&mut self, fd: i32, remote_buf: usize, len: usize) -> Result<isize> {
        self.syscall(libc::SYS_read, &[fd as usize, remote_buf, len])
    }

    /// Remote `getpid`, handy as an identity and liveness probe.
    pub fn getpid(&mut self) -> Result<isize> {
        self.syscall(libc::SYS_getpid, &[])
    }
}
