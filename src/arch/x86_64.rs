//! x86_64 register model and snippet table.

use crate::snippet::CodeSnippet;

/// Machine word size in bytes, as `PTRACE_PEEKTEXT` transfers them.
pub const WORD_SIZE: usize = 8;

/// `int3`. Left at the end of run-to-completion snippets; the executor
/// knows a snippet is done when this byte sits at the instruction pointer.
pub const TRAP_OPCODE: Option<u8> = Some(0xcc);

/// `syscall; int3`: one kernel entry, then the completion trap.
pub const SYSCALL_SNIPPET: CodeSnippet = CodeSnippet::until_trap_static(&[0x0f, 0x05, 0xcc]);

/// `nop`, a single side-effect-free instruction.
pub const NOP_SNIPPET: CodeSnippet = CodeSnippet::steps_static(&[0x90], 1);

/// User-visible register file, laid out exactly like the kernel's
/// x86_64 `user_regs_struct`.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UserRegs {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub bp: u64,
    pub bx: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub ax: u64,
    pub cx: u64,
    pub dx: u64,
    pub si: u64,
    pub di: u64,
    pub orig_ax: u64,
    pub ip: u64,
    pub cs: u64,
    pub flags: u64,
    pub sp: u64,
    pub ss: u64,
    pub fs_base: u64,
    pub gs_base: u64,
    pub ds: u64,
    pub es: u64,
    pub fs: u64,
    pub gs: u64,
}

impl UserRegs {
    pub fn ip(&self) -> usize {
        self.ip as usize
    }

    pub fn set_ip(&mut self, addr: usize) {
        self.ip = addr as u64;
    }

    pub fn sp(&self) -> usize {
        self.sp as usize
    }

    pub fn set_sp(&mut self, addr: usize) {
        self.sp = addr as u64;
    }

    /// Marshal a syscall: number in `rax`, arguments in the kernel entry
    /// order `rdi, rsi, rdx, r10, r8, r9`.
    pub fn set_syscall(&mut self, nr: usize, args: &[usize]) {
        self.ax = nr as u64;
        for (i, &arg) in args.iter().enumerate() {
            let arg = arg as u64;
            match i {
                0 => self.di = arg,
                1 => self.si = arg,
                2 => self.dx = arg,
                3 => self.r10 = arg,
                4 => self.r8 = arg,
                5 => self.r9 = arg,
                _ => break,
            }
        }
    }

    /// The raw signed value in the return register.
    pub fn syscall_result(&self) -> isize {
        self.ax as isize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marshal_fills_entry_registers() {
        let mut regs = UserRegs::default();
        regs.set_syscall(39, &[10, 20, 30, 40, 50, 60]);
        assert_eq!(regs.ax, 39);
        assert_eq!(regs.di, 10);
        assert_eq!(regs.si, 20);
        assert_eq!(regs.dx, 30);
        assert_eq!(regs.r10, 40);
        assert_eq!(regs.r8, 50);
        assert_eq!(regs.r9, 60);
    }

    #[test]
    fn result_keeps_sign() {
        let mut regs = UserRegs::default();
        regs.ax = -38i64 as u64;
        assert_eq!(regs.syscall_result(), -38);
    }

    #[test]
    fn ip_accessors_round_trip() {
        let mut regs = UserRegs::default();
        regs.set_ip(0xdead_beef);
        assert_eq!(regs.ip(), 0xdead_beef);
        assert_eq!(regs.ip, 0xdead_beef);
    }
}
