//! 32-bit ARM (EABI) register model and snippet table.

use crate::arch::MAX_SYSCALL_ARGS;
use crate::snippet::CodeSnippet;

/// Machine word size in bytes, as `PTRACE_PEEKTEXT` transfers them.
pub const WORD_SIZE: usize = 4;

/// ARM has no single-byte breakpoint to plant behind a snippet, so
/// run-to-completion mode is unavailable; snippets run by step count.
pub const TRAP_OPCODE: Option<u8> = None;

/// `svc #0`: one kernel entry, driven by a single step.
pub const SYSCALL_SNIPPET: CodeSnippet = CodeSnippet::steps_static(&[0x00, 0x00, 0x00, 0xef], 1);

/// `mov r0, r0`, the canonical ARM nop.
pub const NOP_SNIPPET: CodeSnippet = CodeSnippet::steps_static(&[0x00, 0x00, 0xa0, 0xe1], 1);

const REG_SYSCALL: usize = 7;
const REG_SP: usize = 13;
const REG_PC: usize = 15;

/// User-visible register file, laid out like the kernel's ARM `pt_regs`:
/// `r0`..`r15` followed by `cpsr` and `orig_r0`.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UserRegs {
    pub uregs: [u32; 18],
}

impl UserRegs {
    pub fn ip(&self) -> usize {
        self.uregs[REG_PC] as usize
    }

    pub fn set_ip(&mut self, addr: usize) {
        self.uregs[REG_PC] = addr as u32;
    }

    pub fn sp(&self) -> usize {
        self.uregs[REG_SP] as usize
    }

    pub fn set_sp(&mut self, addr: usize) {
        self.uregs[REG_SP] = addr as u32;
    }

    /// Marshal a syscall per the EABI convention: number in `r7`,
    /// arguments in `r0`..`r5`.
    pub fn set_syscall(&mut self, nr: usize, args: &[usize]) {
        self.uregs[REG_SYSCALL] = nr as u32;
        for (i, &arg) in args.iter().take(MAX_SYSCALL_ARGS).enumerate() {
            self.uregs[i] = arg as u32;
        }
    }

    /// The raw signed value in the return register.
    pub fn syscall_result(&self) -> isize {
        self.uregs[0] as i32 as isize
    }
}
