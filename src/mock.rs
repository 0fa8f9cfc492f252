//! In-memory trace target used by the executor's unit tests.

use std::collections::BTreeMap;

use libc::{c_long, pid_t};

use crate::arch::{UserRegs, WORD_SIZE};
use crate::error::Result;
use crate::ptrace::{TraceTarget, WaitEvent};

pub(crate) const MOCK_PID: pid_t = 4242;

/// Deterministic stand-in for a stopped tracee.
///
/// Memory is a sparse byte map; absent bytes read as zero. `step`
/// interprets just enough x86_64 to exercise the executor: the
/// `0x0f 0x05` syscall pair advances two bytes and runs the scripted
/// `kernel` hook, anything else advances one byte. Every access bumps a
/// counter so tests can assert what the engine touched.
pub(crate) struct MockTarget {
    pub regs: UserRegs,
    pub mem: BTreeMap<usize, u8>,
    pub steps: usize,
    pub peeks: usize,
    pub pokes: usize,
    pub reg_writes: usize,
    /// Runs when a syscall pair is stepped over.
    pub kernel: fn(&mut MockTarget),
    /// Report the tracee gone with this wait status once the step count
    /// reaches the threshold.
    pub gone_after: Option<(usize, i32)>,
    /// Next wait outcome, if something other than a SIGTRAP stop.
    pub pending: Option<WaitEvent>,
}

fn no_kernel(_: &mut MockTarget) {}

impl MockTarget {
    pub fn new(ip: usize) -> Self {
        let mut regs = UserRegs::default();
        regs.set_ip(ip);
        regs.set_sp(0x7ffd_0000);
        Self {
            regs,
            mem: BTreeMap::new(),
            steps: 0,
            peeks: 0,
            pokes: 0,
            reg_writes: 0,
            kernel: no_kernel,
            gone_after: None,
            pending: None,
        }
    }

    /// Pre-fill memory at `addr`.
    pub fn load(&mut self, addr: usize, bytes: &[u8]) {
        for (i, &byte) in bytes.iter().enumerate() {
            self.mem.insert(addr + i, byte);
        }
    }

    /// Copy out `len` bytes starting at `addr`.
    pub fn mem_bytes(&self, addr: usize, len: usize) -> Vec<u8> {
        (addr..addr + len)
            .map(|a| self.mem.get(&a).copied().unwrap_or(0))
            .collect()
    }

    fn byte_at(&self, addr: usize) -> u8 {
        self.mem.get(&addr).copied().unwrap_or(0)
    }
}

impl TraceTarget for MockTarget {
    fn pid(&self) -> pid_t {
        MOCK_PID
    }

    fn get_regs(&mut self) -> Result<UserRegs> {
        Ok(self.regs)
    }

    fn set_regs(&mut self, regs: &UserRegs) -> Result<()> {
        self.reg_writes += 1;
        self.regs = *regs;
        Ok(())
    }

    fn peek_word(&mut self, addr: usize) -> Result<c_long> {
        self.peeks += 1;
        let mut bytes = [0u8; WORD_SIZE];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = self.byte_at(addr + i);
        }
        Ok(c_long::from_ne_bytes(bytes))
    }

    fn poke_word(&mut self, addr: usize, word: c_long) -> Result<()> {
        self.pokes += 1;
        for (i, &byte) in word.to_ne_bytes().iter().enumerate() {
            self.mem.insert(addr + i, byte);
        }
        Ok(())
    }

    fn step(&mut self) -> Result<()> {
        let ip = self.regs.ip();
        if self.byte_at(ip) == 0x0f && self.byte_at(ip + 1) == 0x05 {
            self.regs.set_ip(ip + 2);
            let kernel = self.kernel;
            kernel(self);
        } else {
            self.regs.set_ip(ip + 1);
        }
        self.steps += 1;

        if let Some((threshold, status)) = self.gone_after {
            if self.steps >= threshold {
                self.pending = Some(WaitEvent::Gone(status));
            }
        }
        Ok(())
    }

    fn wait(&mut self) -> Result<WaitEvent> {
        Ok(self
            .pending
            .take()
            .unwrap_or(WaitEvent::Stopped(libc::SIGTRAP)))
    }
}
