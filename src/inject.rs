//! The injection executor: run one snippet inside the tracee's own text
//! and put every byte and register back afterwards.

use std::mem;

use libc::c_long;
use log::{debug, error, warn};

use crate::arch::{self, UserRegs, MAX_SYSCALL_ARGS};
use crate::error::{ImpelError, Result};
use crate::ptrace::{TraceTarget, WaitEvent};
use crate::snippet::{CodeSnippet, RunMode};

/// Words of original tracee text a call can displace at once. Snippets
/// needing more are rejected before the tracee is touched.
pub const SCRATCH_WORDS: usize = 512;

// PEEKTEXT transfers c_long-sized words; the arch word size must agree.
const _: () = assert!(arch::WORD_SIZE == mem::size_of::<c_long>());

/// Outcome of one injected call.
#[derive(Debug, Clone, Copy)]
pub struct CallResult {
    /// Raw value of the return register after the snippet ran. Negative
    /// kernel errno encodings pass through uninterpreted.
    pub retval: isize,
    /// Single-steps the call consumed.
    pub steps: usize,
}

/// Handle to the process under control.
///
/// Owns the trace backend plus the two register snapshots the protocol
/// turns on: `baseline`, the state every call restores toward, captured
/// once per [`CallSequence`]; and `working`, the most recently read state,
/// which each call refreshes and marshals before running.
pub struct Tracee<T: TraceTarget> {
    target: T,
    baseline: UserRegs,
    working: UserRegs,
}

impl<T: TraceTarget> Tracee<T> {
    /// Wrap a process that is already attached and stopped.
    pub fn new(target: T) -> Self {
        Self {
            target,
            baseline: UserRegs::default(),
            working: UserRegs::default(),
        }
    }

    pub fn pid(&self) -> libc::pid_t {
        self.target.pid()
    }

    /// The wrapped backend.
    pub fn target(&self) -> &T {
        &self.target
    }

    /// Mutable access to the backend, for callers that need it between
    /// call sequences.
    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }

    /// Open a call sequence: read the tracee's registers and keep them as
    /// the baseline every call in the sequence restores toward.
    ///
    /// The exclusive borrow makes a second in-flight injection against the
    /// same tracee unrepresentable.
    pub fn sequence(&mut self) -> Result<CallSequence<'_, T>> {
        let regs = self.target.get_regs()?;
        self.baseline = regs;
        self.working = regs;
        Ok(CallSequence { tracee: self })
    }
}

/// Scope over which injected calls share one register baseline.
///
/// Dropping the sequence ends the scope; the next [`Tracee::sequence`]
/// captures a fresh baseline from wherever the tracee then stands.
pub struct CallSequence<'a, T: TraceTarget> {
    tracee: &'a mut Tracee<T>,
}

impl<T: TraceTarget> CallSequence<'_, T> {
    /// Run a snippet at the tracee's current position (instruction pointer
    /// aligned down to a word boundary) and return its result register.
    pub fn execute(&mut self, snippet: &CodeSnippet) -> Result<CallResult> {
        let nwords = admit(snippet, arch::TRAP_OPCODE)?;
        self.refresh_working()?;
        self.run(snippet, nwords)
    }

    /// Marshal and execute one syscall in the tracee; returns the raw
    /// signed result, negative errno encodings included.
    pub fn syscall(&mut self, nr: c_long, args: &[usize]) -> Result<isize> {
        if args.len() > MAX_SYSCALL_ARGS {
            return Err(ImpelError::TooManyArgs {
                given: args.len(),
                max: MAX_SYSCALL_ARGS,
            });
        }
        let snippet = &arch::SYSCALL_SNIPPET;
        let nwords = admit(snippet, arch::TRAP_OPCODE)?;
        self.refresh_working()?;
        self.tracee.working.set_syscall(nr as usize, args);
        let res = self.run(snippet, nwords)?;
        Ok(res.retval)
    }

    /// The working set always reflects the stop a call starts from.
    fn refresh_working(&mut self) -> Result<()> {
        self.tracee.working = self.tracee.target.get_regs()?;
        Ok(())
    }

    fn run(&mut self, snippet: &CodeSnippet, nwords: usize) -> Result<CallResult> {
        let tracee = &mut *self.tracee;
        let addr = align_down(tracee.working.ip(), arch::WORD_SIZE);
        tracee.working.set_ip(addr);

        let site = InjectionSite::save(&mut tracee.target, addr, nwords)?;
        debug!(
            "inject pid={} addr={:#x} words={} mode={:?}",
            tracee.target.pid(),
            addr,
            nwords,
            snippet.mode()
        );

        match drive(&mut tracee.target, &mut tracee.working, &site, snippet) {
            Ok(steps) => {
                let retval = tracee.working.syscall_result();
                if let Err(err) = site.restore(&mut tracee.target) {
                    let _ = tracee.target.set_regs(&tracee.baseline);
                    return Err(err);
                }
                tracee.target.set_regs(&tracee.baseline)?;
                debug!(
                    "call done pid={} retval={} steps={}",
                    tracee.target.pid(),
                    retval,
                    steps
                );
                Ok(CallResult { retval, steps })
            }
            Err(err) => {
                // Best-effort teardown; the tracee may already be gone, and
                // the caller has to treat the call as forfeited either way.
                let _ = site.restore(&mut tracee.target);
                let _ = tracee.target.set_regs(&tracee.baseline);
                Err(err)
            }
        }
    }
}

/// Gate a snippet before any tracee access. Run-to-completion mode needs
/// the target architecture to have a trap opcode.
fn admit(snippet: &CodeSnippet, trap_opcode: Option<u8>) -> Result<usize> {
    if snippet.is_empty() {
        return Err(ImpelError::EmptySnippet);
    }
    let words = snippet.word_len();
    if words > SCRATCH_WORDS {
        return Err(ImpelError::SnippetTooLong {
            words,
            capacity: SCRATCH_WORDS,
        });
    }
    if snippet.mode() == RunMode::UntilTrap && trap_opcode.is_none() {
        return Err(ImpelError::NoTrapOpcode);
    }
    Ok(words)
}

/// Install the snippet, push the working registers, and step the tracee to
/// completion. On success `working` holds the post-run registers.
fn drive<T: TraceTarget>(
    target: &mut T,
    working: &mut UserRegs,
    site: &InjectionSite,
    snippet: &CodeSnippet,
) -> Result<usize> {
    site.write_snippet(target, snippet.bytes())?;
    target.set_regs(working)?;

    let steps = match snippet.mode() {
        RunMode::Steps(count) => {
            // The count is the only stop condition; trap opcodes stepped
            // over along the way are not looked at.
            for _ in 0..count {
                step_once(target)?;
            }
            count
        }
        RunMode::UntilTrap => {
            let Some(trap) = arch::TRAP_OPCODE else {
                return Err(ImpelError::NoTrapOpcode);
            };
            let mut steps = 0;
            loop {
                let sig = step_once(target)?;
                steps += 1;
                if sig != libc::SIGTRAP {
                    continue;
                }
                let regs = target.get_regs()?;
                let word = target.peek_word(regs.ip())?;
                // Lowest-addressed byte of the peeked word, i.e. the byte
                // the instruction pointer rests on.
                if word.to_ne_bytes()[0] == trap {
                    break steps;
                }
            }
        }
    };

    // Harvest before teardown: the result lives in the post-step registers.
    *working = target.get_regs()?;
    Ok(steps)
}

fn step_once<T: TraceTarget>(target: &mut T) -> Result<i32> {
    target.step()?;
    match target.wait()? {
        WaitEvent::Stopped(sig) => {
            if sig != libc::SIGTRAP {
                warn!(
                    "tracee {} stopped with signal {} mid-snippet",
                    target.pid(),
                    sig
                );
            }
            Ok(sig)
        }
        WaitEvent::Gone(status) => {
            error!(
                "tracee {} vanished mid-call, status {:#x}",
                target.pid(),
                status
            );
            Err(ImpelError::TraceeVanished {
                pid: target.pid(),
                status,
            })
        }
    }
}

/// One call's worth of displaced tracee text: the aligned injection address
/// and the original words it covered.
struct InjectionSite {
    addr: usize,
    saved: [c_long; SCRATCH_WORDS],
    nwords: usize,
}

impl InjectionSite {
    /// Save the `nwords` original words at `addr` before anything is
    /// written over them.
    fn save<T: TraceTarget>(target: &mut T, addr: usize, nwords: usize) -> Result<Self> {
        let mut saved = [0; SCRATCH_WORDS];
        for (i, slot) in saved[..nwords].iter_mut().enumerate() {
            *slot = target.peek_word(addr + i * arch::WORD_SIZE)?;
        }
        Ok(Self { addr, saved, nwords })
    }

    /// Splice the snippet over the saved word images and write whole words
    /// back, so bytes past the snippet's end keep their original values.
    fn write_snippet<T: TraceTarget>(&self, target: &mut T, bytes: &[u8]) -> Result<()> {
        for i in 0..self.nwords {
            let mut image = self.saved[i].to_ne_bytes();
            for (b, slot) in image.iter_mut().enumerate() {
                if let Some(&byte) = bytes.get(i * arch::WORD_SIZE + b) {
                    *slot = byte;
                }
            }
            target.poke_word(self.addr + i * arch::WORD_SIZE, c_long::from_ne_bytes(image))?;
        }
        Ok(())
    }

    /// Put the original words back. Consumes the site; a site is restored
    /// exactly once.
    fn restore<T: TraceTarget>(self, target: &mut T) -> Result<()> {
        for i in 0..self.nwords {
            target.poke_word(self.addr + i * arch::WORD_SIZE, self.saved[i])?;
        }
        Ok(())
    }
}

fn align_down(addr: usize, align: usize) -> usize {
    addr & !(align - 1)
}
