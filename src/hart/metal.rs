//! 裸机 M 模式下的 hart 访问实现
//!
//! 预期陷阱捕获例程约定：`a3` 保存 `TrapInfo` 的地址，`a4` 为临时寄存器。
//! 被捕获的访问指令必须是 4 字节编码（`.option norvc`），例程返回时
//! 把 mepc 加 4 跳过它。

use core::arch::{asm, global_asm};
use core::mem::offset_of;

use crate::register::{csr, mcause, mstatus::Mstatus, misa_bit};
use crate::trap::TrapInfo;

use super::Hart;

#[cfg(target_pointer_width = "64")]
macro_rules! reg_s {
    () => {
        "sd"
    };
}
#[cfg(target_pointer_width = "32")]
macro_rules! reg_s {
    () => {
        "sw"
    };
}
#[cfg(target_pointer_width = "64")]
macro_rules! reg_l {
    () => {
        "ld"
    };
}
#[cfg(target_pointer_width = "32")]
macro_rules! reg_l {
    () => {
        "lw"
    };
}

/// 从 mstatus(h) 中取出 GVA 位到 a4
#[cfg(target_pointer_width = "64")]
macro_rules! load_gva {
    () => {
        "csrr a4, mstatus\n srli a4, a4, 38\n andi a4, a4, 1\n"
    };
}
#[cfg(target_pointer_width = "32")]
macro_rules! load_gva {
    () => {
        "csrr a4, 0x310\n srli a4, a4, 6\n andi a4, a4, 1\n"
    };
}

global_asm!(
    concat!(
        ".section .text\n",
        ".align 2\n",
        ".global __sbi_expected_trap\n",
        "__sbi_expected_trap:\n",
        reg_s!(), " zero, {tval2}(a3)\n",
        reg_s!(), " zero, {tinst}(a3)\n",
        reg_s!(), " zero, {gva}(a3)\n",
        "j __sbi_expected_trap_common\n",
        ".align 2\n",
        ".global __sbi_expected_trap_hext\n",
        "__sbi_expected_trap_hext:\n",
        "csrr a4, 0x34b\n",
        reg_s!(), " a4, {tval2}(a3)\n",
        "csrr a4, 0x34a\n",
        reg_s!(), " a4, {tinst}(a3)\n",
        load_gva!(),
        reg_s!(), " a4, {gva}(a3)\n",
        "__sbi_expected_trap_common:\n",
        "csrr a4, mcause\n",
        reg_s!(), " a4, {cause}(a3)\n",
        "csrr a4, mtval\n",
        reg_s!(), " a4, {tval}(a3)\n",
        "csrr a4, mepc\n",
        "addi a4, a4, 4\n",
        "csrw mepc, a4\n",
        "mret\n",
    ),
    cause = const offset_of!(TrapInfo, cause),
    tval = const offset_of!(TrapInfo, tval),
    tval2 = const offset_of!(TrapInfo, tval2),
    tinst = const offset_of!(TrapInfo, tinst),
    gva = const offset_of!(TrapInfo, gva),
);

extern "C" {
    fn __sbi_expected_trap();
    fn __sbi_expected_trap_hext();
}

/// 固件支持访问的 CSR 编号分发表
///
/// `$op` 是一个以 CSR 编号字面量为参数的局部宏，表中没有的编号走 `$fallback`。
macro_rules! csr_table {
    ($num:expr, $op:ident, $fallback:expr) => {
        match $num {
            csr::SSTATUS => $op!("0x100"),
            csr::SIE => $op!("0x104"),
            csr::STVEC => $op!("0x105"),
            csr::SCOUNTEREN => $op!("0x106"),
            csr::SSCRATCH => $op!("0x140"),
            csr::SEPC => $op!("0x141"),
            csr::SCAUSE => $op!("0x142"),
            csr::STVAL => $op!("0x143"),
            csr::SIP => $op!("0x144"),
            csr::SATP => $op!("0x180"),
            csr::VSSTATUS => $op!("0x200"),
            csr::VSTVEC => $op!("0x205"),
            csr::VSEPC => $op!("0x241"),
            csr::VSCAUSE => $op!("0x242"),
            csr::VSTVAL => $op!("0x243"),
            csr::MSTATUS => $op!("0x300"),
            csr::MISA => $op!("0x301"),
            csr::MEDELEG => $op!("0x302"),
            csr::MIDELEG => $op!("0x303"),
            csr::MIE => $op!("0x304"),
            csr::MTVEC => $op!("0x305"),
            csr::MCOUNTEREN => $op!("0x306"),
            csr::MENVCFG => $op!("0x30a"),
            csr::MSTATUSH => $op!("0x310"),
            csr::MCOUNTINHIBIT => $op!("0x320"),
            csr::MSCRATCH => $op!("0x340"),
            csr::MEPC => $op!("0x341"),
            csr::MCAUSE => $op!("0x342"),
            csr::MTVAL => $op!("0x343"),
            csr::MIP => $op!("0x344"),
            csr::MTINST => $op!("0x34a"),
            csr::MTVAL2 => $op!("0x34b"),
            csr::HSTATUS => $op!("0x600"),
            csr::HEDELEG => $op!("0x602"),
            csr::HIDELEG => $op!("0x603"),
            csr::HTVAL => $op!("0x643"),
            csr::HTINST => $op!("0x64a"),
            csr::CYCLE => $op!("0xc00"),
            csr::TIME => $op!("0xc01"),
            csr::INSTRET => $op!("0xc02"),
            csr::MVENDORID => $op!("0xf11"),
            csr::MARCHID => $op!("0xf12"),
            csr::MIMPID => $op!("0xf13"),
            csr::MHARTID => $op!("0xf14"),
            _ => $fallback,
        }
    };
}

/// 裸机 M 模式下的当前 hart
pub struct MetalHart;

impl Hart for MetalHart {
    fn hart_id(&self) -> usize {
        self.read_csr(csr::MHARTID)
    }

    fn read_csr(&self, num: u16) -> usize {
        macro_rules! read {
            ($csr:literal) => {{
                let ret: usize;
                unsafe { asm!(concat!("csrr {0}, ", $csr), out(reg) ret, options(nostack)) };
                ret
            }};
        }
        csr_table!(num, read, 0)
    }

    fn write_csr(&mut self, num: u16, value: usize) {
        macro_rules! write {
            ($csr:literal) => {
                unsafe { asm!(concat!("csrw ", $csr, ", {0}"), in(reg) value, options(nostack)) }
            };
        }
        csr_table!(num, write, ())
    }

    fn expected_trap_addr(&self) -> usize {
        if self.read_csr(csr::MISA) & misa_bit('H') != 0 {
            __sbi_expected_trap_hext as usize
        } else {
            __sbi_expected_trap as usize
        }
    }

    fn swap_trap_vector(&mut self, vector: usize) -> usize {
        let old: usize;
        unsafe { asm!("csrrw {0}, mtvec, {1}", out(reg) old, in(reg) vector, options(nostack)) };
        old
    }

    unsafe fn csr_read_raw(&mut self, num: u16, trap: &mut TrapInfo) -> usize {
        let tinfo = trap as *mut TrapInfo;
        macro_rules! read {
            ($csr:literal) => {{
                let mut ret: usize = 0;
                asm!(
                    concat!("csrr {ret}, ", $csr),
                    ret = inout(reg) ret,
                    in("a3") tinfo,
                    out("a4") _,
                    options(nostack),
                );
                ret
            }};
        }
        csr_table!(num, read, {
            (*tinfo).cause = mcause::CAUSE_ILLEGAL_INSTRUCTION;
            0
        })
    }

    unsafe fn csr_write_raw(&mut self, num: u16, value: usize, trap: &mut TrapInfo) {
        let tinfo = trap as *mut TrapInfo;
        macro_rules! write {
            ($csr:literal) => {
                asm!(
                    concat!("csrw ", $csr, ", {val}"),
                    val = in(reg) value,
                    in("a3") tinfo,
                    out("a4") _,
                    options(nostack),
                )
            };
        }
        csr_table!(num, write, {
            (*tinfo).cause = mcause::CAUSE_ILLEGAL_INSTRUCTION;
        })
    }

    unsafe fn load_ulong_raw(&mut self, addr: usize, trap: &mut TrapInfo) -> usize {
        let tinfo = trap as *mut TrapInfo;
        let mut ret: usize = 0;
        asm!(
            "csrrs {mstatus}, mstatus, {mprv}",
            ".option push",
            ".option norvc",
            concat!(reg_l!(), " {ret}, 0({addr})"),
            ".option pop",
            "csrw mstatus, {mstatus}",
            mstatus = out(reg) _,
            mprv = in(reg) Mstatus::MPRV.bits(),
            addr = in(reg) addr,
            ret = inout(reg) ret,
            in("a3") tinfo,
            out("a4") _,
            options(nostack),
        );
        ret
    }
}
