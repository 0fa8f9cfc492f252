//! Thin wrappers over the ptrace interface, and the [`TraceTarget`]
//! seam the executor drives them through.

use std::io;
use std::mem;
use std::ptr;

use libc::{c_long, c_void, iovec, pid_t, ptrace, waitpid, NT_PRSTATUS};

use crate::arch::UserRegs;
use crate::error::{ImpelError, Result};

/// PTRACE_GETREGSET request
pub const PTRACE_GETREGSET: u32 = 0x4204;
/// PTRACE_SETREGSET request
pub const PTRACE_SETREGSET: u32 = 0x4205;

/// What `waitpid` said about the tracee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitEvent {
    /// Stopped by a signal; after a single-step this is normally `SIGTRAP`.
    Stopped(i32),
    /// Exited or was killed. Carries the raw wait status so callers can
    /// pick it apart with the `WIF*` macros.
    Gone(i32),
}

/// The operations the injection engine needs from a stopped process.
///
/// [`PtraceTarget`] is the live implementation; unit tests substitute an
/// in-memory double so the executor can run against scripted state.
pub trait TraceTarget {
    /// Pid used in diagnostics and error values.
    fn pid(&self) -> pid_t;

    /// Read the full user register set.
    fn get_regs(&mut self) -> Result<UserRegs>;

    /// Write the full user register set.
    fn set_regs(&mut self, regs: &UserRegs) -> Result<()>;

    /// Read one machine word of tracee memory.
    fn peek_word(&mut self, addr: usize) -> Result<c_long>;

    /// Write one machine word of tracee memory.
    fn poke_word(&mut self, addr: usize, word: c_long) -> Result<()>;

    /// Resume the tracee for exactly one instruction.
    fn step(&mut self) -> Result<()>;

    /// Block until the tracee stops again or goes away.
    fn wait(&mut self) -> Result<WaitEvent>;
}

/// A process stopped under ptrace, addressed by pid.
#[derive(Debug, Clone, Copy)]
pub struct PtraceTarget {
    pid: pid_t,
}

impl PtraceTarget {
    /// Wrap an already-attached, already-stopped process. Use [`attach`]
    /// first when the process is not yet traced.
    pub fn new(pid: pid_t) -> Self {
        Self { pid }
    }
}

impl TraceTarget for PtraceTarget {
    fn pid(&self) -> pid_t {
        self.pid
    }

    fn get_regs(&mut self) -> Result<UserRegs> {
        ptrace_get_regs(self.pid)
    }

    fn set_regs(&mut self, regs: &UserRegs) -> Result<()> {
        ptrace_set_regs(self.pid, regs)
    }

    fn peek_word(&mut self, addr: usize) -> Result<c_long> {
        ptrace_peek_word(self.pid, addr)
    }

    fn poke_word(&mut self, addr: usize, word: c_long) -> Result<()> {
        ptrace_poke_word(self.pid, addr, word)
    }

    fn step(&mut self) -> Result<()> {
        ptrace_single_step(self.pid)
    }

    fn wait(&mut self) -> Result<WaitEvent> {
        wait_for_stop(self.pid)
    }
}

fn trace_err(op: &'static str, pid: pid_t) -> ImpelError {
    ImpelError::Ptrace {
        op,
        pid,
        source: io::Error::last_os_error(),
    }
}

/// Attach to a running process and wait for the attach stop.
pub fn attach(pid: pid_t) -> Result<()> {
    let ret = unsafe {
        ptrace(
            libc::PTRACE_ATTACH,
            pid,
            ptr::null_mut::<c_void>(),
            ptr::null_mut::<c_void>(),
        )
    };
    if ret == -1 {
        return Err(trace_err("PTRACE_ATTACH", pid));
    }
    match wait_for_stop(pid)? {
        WaitEvent::Stopped(_) => Ok(()),
        WaitEvent::Gone(status) => Err(ImpelError::TraceeVanished { pid, status }),
    }
}

/// Detach and let the process run free again.
pub fn detach(pid: pid_t) -> Result<()> {
    let ret = unsafe {
        ptrace(
            libc::PTRACE_DETACH,
            pid,
            ptr::null_mut::<c_void>(),
            ptr::null_mut::<c_void>(),
        )
    };
    if ret == -1 {
        return Err(trace_err("PTRACE_DETACH", pid));
    }
    Ok(())
}

/// Read the tracee's user registers via the NT_PRSTATUS regset.
pub fn ptrace_get_regs(pid: pid_t) -> Result<UserRegs> {
    let mut regs = UserRegs::default();
    let mut iov = iovec {
        iov_base: &mut regs as *mut _ as *mut c_void,
        iov_len: mem::size_of::<UserRegs>(),
    };

    let ret = unsafe {
        ptrace(
            PTRACE_GETREGSET,
            pid,
            NT_PRSTATUS as *mut c_void,
            &mut iov as *mut _ as *mut c_void,
        )
    };
    if ret == -1 {
        return Err(trace_err("PTRACE_GETREGSET", pid));
    }
    // A short fill means the tracee runs a different register ABI than the
    // one this build was compiled for.
    if iov.iov_len != mem::size_of::<UserRegs>() {
        return Err(ImpelError::Ptrace {
            op: "PTRACE_GETREGSET",
            pid,
            source: io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "register set is {} bytes, expected {}",
                    iov.iov_len,
                    mem::size_of::<UserRegs>()
                ),
            ),
        });
    }
    Ok(regs)
}

/// Write the tracee's user registers via the NT_PRSTATUS regset.
pub fn ptrace_set_regs(pid: pid_t, regs: &UserRegs) -> Result<()> {
    let mut iov = iovec {
        iov_base: regs as *const _ as *mut c_void,
        iov_len: mem::size_of::<UserRegs>(),
    };

    let ret = unsafe {
        ptrace(
            PTRACE_SETREGSET,
            pid,
            NT_PRSTATUS as *mut c_void,
            &mut iov as *mut _ as *mut c_void,
        )
    };
    if ret == -1 {
        return Err(trace_err("PTRACE_SETREGSET", pid));
    }
    Ok(())
}

/// Read one word of tracee memory.
///
/// `PTRACE_PEEKTEXT` returns the word in the call's result, so a real `-1`
/// is told apart from failure by clearing errno first.
pub fn ptrace_peek_word(pid: pid_t, addr: usize) -> Result<c_long> {
    unsafe { *libc::__errno_location() = 0 };
    let word = unsafe {
        ptrace(
            libc::PTRACE_PEEKTEXT,
            pid,
            addr as *mut c_void,
            ptr::null_mut::<c_void>(),
        )
    };
    let errno = unsafe { *libc::__errno_location() };
    if errno != 0 {
        return Err(ImpelError::Ptrace {
            op: "PTRACE_PEEKTEXT",
            pid,
            source: io::Error::from_raw_os_error(errno),
        });
    }
    Ok(word)
}

/// Write one word of tracee memory.
pub fn ptrace_poke_word(pid: pid_t, addr: usize, word: c_long) -> Result<()> {
    let ret = unsafe {
        ptrace(
            libc::PTRACE_POKETEXT,
            pid,
            addr as *mut c_void,
            word as *mut c_void,
        )
    };
    if ret == -1 {
        return Err(trace_err("PTRACE_POKETEXT", pid));
    }
    Ok(())
}

/// Resume the tracee for one instruction; pair with [`wait_for_stop`].
pub fn ptrace_single_step(pid: pid_t) -> Result<()> {
    let ret = unsafe {
        ptrace(
            libc::PTRACE_SINGLESTEP,
            pid,
            ptr::null_mut::<c_void>(),
            ptr::null_mut::<c_void>(),
        )
    };
    if ret == -1 {
        return Err(trace_err("PTRACE_SINGLESTEP", pid));
    }
    Ok(())
}

/// Wait for the tracee's next state change, retrying on `EINTR`.
pub fn wait_for_stop(pid: pid_t) -> Result<WaitEvent> {
    let mut status = 0;
    loop {
        let ret = unsafe { waitpid(pid, &mut status, libc::__WALL) };
        if ret == -1 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            return Err(ImpelError::Ptrace {
                op: "waitpid",
                pid,
                source: err,
            });
        }
        return Ok(classify_status(status));
    }
}

fn classify_status(status: i32) -> WaitEvent {
    if libc::WIFSTOPPED(status) {
        WaitEvent::Stopped(libc::WSTOPSIG(status))
    } else {
        WaitEvent::Gone(status)
    }
}

/// Read consecutive machine words of tracee memory into `dst`.
pub fn ptrace_peek_area(pid: pid_t, addr: usize, dst: &mut [c_long]) -> Result<()> {
    for (i, slot) in dst.iter_mut().enumerate() {
        *slot = ptrace_peek_word(pid, addr + i * mem::size_of::<c_long>())?;
    }
    Ok(())
}

/// Write consecutive machine words of tracee memory from `src`.
pub fn ptrace_poke_area(pid: pid_t, addr: usize, src: &[c_long]) -> Result<()> {
    for (i, &word) in src.iter().enumerate() {
        ptrace_poke_word(pid, addr + i * mem::size_of::<c_long>(), word)?;
    }
    Ok(())
}

/// Read `len` bytes of tracee memory starting at `addr`, which need not be
/// word-aligned.
pub fn ptrace_read_bytes(pid: pid_t, addr: usize, len: usize) -> Result<Vec<u8>> {
    if len == 0 {
        return Ok(Vec::new());
    }
    let word = mem::size_of::<c_long>();
    let start = addr & !(word - 1);
    let nwords = (addr + len - start + word - 1) / word;

    let mut bytes = Vec::with_capacity(nwords * word);
    for i in 0..nwords {
        bytes.extend_from_slice(&ptrace_peek_word(pid, start + i * word)?.to_ne_bytes());
    }
    bytes.drain(..addr - start);
    bytes.truncate(len);
    Ok(bytes)
}
