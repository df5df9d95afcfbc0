//! 主机测试用的模拟 hart
//!
//! 以表格模拟 CSR、访客内存与寄存器能力标签。访问不存在的 CSR、写只读 CSR、
//! 访问未映射或未对齐的内存都会产生异常：若此时 mtvec 指向预期陷阱例程，
//! 异常被记录到 `TrapInfo`；否则视为固件自身陷入，直接 panic。

use std::collections::BTreeMap;

use crate::cheri::Capability;
use crate::register::{csr, mcause, misa_bit};
use crate::trap::{TrapInfo, TrapRegisters};

use super::Hart;

/// 模拟固件主陷阱向量
pub const SIM_FIRMWARE_VECTOR: usize = 0x8000_0000;
/// 模拟预期陷阱捕获例程
pub const SIM_EXPECTED_TRAP: usize = 0x8000_0400;

const WORD: usize = core::mem::size_of::<usize>();

pub struct SimHart {
    hartid: usize,
    csrs: BTreeMap<u16, usize>,
    memory: BTreeMap<usize, usize>,
    caps: BTreeMap<usize, Capability>,
    /// mtvec 被切换的次数
    pub vector_swaps: usize,
}

impl SimHart {
    pub fn new(hartid: usize) -> Self {
        let mut csrs = BTreeMap::new();
        for num in [
            csr::MSTATUS,
            csr::MEDELEG,
            csr::MIDELEG,
            csr::MIE,
            csr::MIP,
            csr::MSCRATCH,
            csr::MEPC,
            csr::MCAUSE,
            csr::MTVAL,
            csr::SSTATUS,
            csr::SIE,
            csr::STVEC,
            csr::SSCRATCH,
            csr::SEPC,
            csr::SCAUSE,
            csr::STVAL,
            csr::SIP,
            csr::SATP,
        ] {
            csrs.insert(num, 0);
        }
        let misa = misa_bit('I') | misa_bit('M') | misa_bit('A') | misa_bit('C')
            | misa_bit('S') | misa_bit('U');
        csrs.insert(csr::MISA, misa);
        csrs.insert(csr::MTVEC, SIM_FIRMWARE_VECTOR);
        csrs.insert(csr::MHARTID, hartid);

        Self { hartid, csrs, memory: BTreeMap::new(), caps: BTreeMap::new(), vector_swaps: 0 }
    }

    /// 在 misa 中打开扩展；打开 H 时同时提供虚拟化相关 CSR
    pub fn enable_extension(&mut self, ext: char) {
        *self.csrs.entry(csr::MISA).or_insert(0) |= misa_bit(ext);
        if ext == 'H' {
            for num in [
                csr::HSTATUS,
                csr::HEDELEG,
                csr::HIDELEG,
                csr::HTVAL,
                csr::HTINST,
                csr::VSSTATUS,
                csr::VSTVEC,
                csr::VSEPC,
                csr::VSCAUSE,
                csr::VSTVAL,
            ] {
                self.csrs.entry(num).or_insert(0);
            }
        }
    }

    pub fn csr(&self, num: u16) -> Option<usize> {
        self.csrs.get(&num).copied()
    }

    pub fn set_csr(&mut self, num: u16, value: usize) {
        self.csrs.insert(num, value);
    }

    /// 在访客内存中映射一个机器字
    pub fn map_word(&mut self, addr: usize, value: usize) {
        self.memory.insert(addr, value);
    }

    /// 为寄存器槽位 `reg` 设置能力元数据
    pub fn set_capability(&mut self, reg: usize, cap: Capability) {
        self.caps.insert(reg, cap);
    }

    fn fault(&self, trap: &mut TrapInfo, cause: usize, tval: usize) {
        if self.csrs.get(&csr::MTVEC).copied() != Some(SIM_EXPECTED_TRAP) {
            panic!("unexpected M-mode trap: cause={:#x} tval={:#x}", cause, tval);
        }
        *trap = TrapInfo::exception(cause, tval);
    }
}

impl Hart for SimHart {
    fn hart_id(&self) -> usize {
        self.hartid
    }

    fn read_csr(&self, num: u16) -> usize {
        match self.csrs.get(&num) {
            Some(v) => *v,
            None => panic!("read of unimplemented csr {:#x}", num),
        }
    }

    fn write_csr(&mut self, num: u16, value: usize) {
        if !self.csrs.contains_key(&num) || csr::is_read_only(num) {
            panic!("write of unimplemented csr {:#x}", num);
        }
        self.csrs.insert(num, value);
    }

    fn expected_trap_addr(&self) -> usize {
        SIM_EXPECTED_TRAP
    }

    fn swap_trap_vector(&mut self, vector: usize) -> usize {
        self.vector_swaps += 1;
        self.csrs.insert(csr::MTVEC, vector).unwrap_or(0)
    }

    unsafe fn csr_read_raw(&mut self, num: u16, trap: &mut TrapInfo) -> usize {
        match self.csrs.get(&num) {
            Some(v) => *v,
            None => {
                self.fault(trap, mcause::CAUSE_ILLEGAL_INSTRUCTION, 0);
                0
            }
        }
    }

    unsafe fn csr_write_raw(&mut self, num: u16, value: usize, trap: &mut TrapInfo) {
        if !self.csrs.contains_key(&num) || csr::is_read_only(num) {
            self.fault(trap, mcause::CAUSE_ILLEGAL_INSTRUCTION, 0);
            return;
        }
        self.csrs.insert(num, value);
    }

    unsafe fn load_ulong_raw(&mut self, addr: usize, trap: &mut TrapInfo) -> usize {
        if addr % WORD != 0 {
            self.fault(trap, mcause::CAUSE_MISALIGNED_LOAD, addr);
            return 0;
        }
        match self.memory.get(&addr) {
            Some(v) => *v,
            None => {
                self.fault(trap, mcause::CAUSE_LOAD_ACCESS, addr);
                0
            }
        }
    }

    fn guest_capability(&self, regs: &TrapRegisters, reg: usize) -> Capability {
        self.caps
            .get(&reg)
            .copied()
            .unwrap_or_else(|| Capability::from_address(regs.get(reg)))
    }
}
