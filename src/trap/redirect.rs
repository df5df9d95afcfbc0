//! 陷阱重定向：把一次由固件捕获的异常按硬件投递的方式交还给访客
//!
//! 改写保存的 mepc/mstatus 以及监督模式（或虚拟监督模式）的陷阱 CSR，
//! mret 返回后访客直接从自己的陷阱向量开始执行，如同异常由硬件直接投递。

use crate::consts::XLEN;
use crate::error::{SbiError, SbiResult};
use crate::hart::Hart;
use crate::register::csr;
use crate::register::hstatus::enter_hs_trap;
use crate::register::mstatus::{self, enter_supervisor_trap, MPP};

use super::{TrapInfo, TrapRegisters};

/// 陷阱向量寄存器中 BASE 字段以外的 MODE 位
const TVEC_MODE_MASK: usize = 0b11;

/// 将陷阱 `trap` 重定向到陷入前的监督模式软件
///
/// # 流程解释
/// 1. 陷入前的模式必须是 S 或 U，否则没有可以投递的目标
/// 2. 实现了 H 扩展且陷入前处于虚拟化模式时，若该异常在 hedeleg 中被委托，
///    投递给 VS 模式，否则投递给 HS 模式
/// 3. 目标陷阱向量（stvec 或 vstvec）必须已设置
/// 4. 投递给 HS 模式时更新 hstatus 的 SPV/SPVP/GVA 以及 htval/htinst
/// 5. 写入目标模式的 epc/cause/tval，mepc 指向目标陷阱向量，MPP 设为 S，
///    并按硬件陷入行为改写 SPP/SPIE/SIE
///
/// # 返回值
/// - `Ok(())`: 重定向完成
/// - `Err(SbiError::Fatal)`: 没有可用的投递目标，此时 `regs` 与所有 CSR 均未修改
pub fn sbi_trap_redirect<H: Hart + ?Sized>(
    hart: &mut H,
    regs: &mut TrapRegisters,
    trap: &TrapInfo,
) -> SbiResult<()> {
    let prev_mode = mstatus::mpp(regs.mstatus());
    let prev_supervisor = match prev_mode {
        Some(MPP::Supervisor) => true,
        Some(MPP::User) => false,
        _ => return Err(SbiError::Fatal),
    };

    let has_h = hart.has_extension('H');
    let prev_virt = has_h && regs.prev_virt();
    let next_virt = prev_virt
        && trap.cause < XLEN as usize
        && hart.read_csr(csr::HEDELEG) & (1 << trap.cause) != 0;

    let tvec = if next_virt { csr::VSTVEC } else { csr::STVEC };
    let vector = hart.read_csr(tvec) & !TVEC_MODE_MASK;
    if vector == 0 {
        return Err(SbiError::Fatal);
    }

    if has_h {
        regs.set_prev_virt(next_virt);
    }

    if has_h && !next_virt {
        let hstatus = hart.read_csr(csr::HSTATUS);
        let hstatus = enter_hs_trap(hstatus, prev_virt, prev_supervisor, trap.gva != 0);
        hart.write_csr(csr::HSTATUS, hstatus);
        hart.write_csr(csr::HTVAL, trap.tval2);
        hart.write_csr(csr::HTINST, trap.tinst);
    }

    let mut status = regs.mstatus();
    mstatus::set_mpp(&mut status, MPP::Supervisor);

    if next_virt {
        hart.write_csr(csr::VSEPC, regs.mepc());
        hart.write_csr(csr::VSCAUSE, trap.cause);
        hart.write_csr(csr::VSTVAL, trap.tval);

        let vsstatus = hart.read_csr(csr::VSSTATUS);
        hart.write_csr(csr::VSSTATUS, enter_supervisor_trap(vsstatus, prev_supervisor));
    } else {
        hart.write_csr(csr::SEPC, regs.mepc());
        hart.write_csr(csr::SCAUSE, trap.cause);
        hart.write_csr(csr::STVAL, trap.tval);

        status = enter_supervisor_trap(status, prev_supervisor);
    }

    regs.set_mstatus(status);
    regs.set_mepc(vector);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hart::sim::SimHart;
    use crate::register::mcause;
    use crate::register::mstatus::Mstatus;

    const STVEC: usize = 0x8020_0100;

    fn supervisor_regs(mepc: usize, sie: bool) -> TrapRegisters {
        let mut regs = TrapRegisters::new();
        let mut status = if sie { Mstatus::SIE.bits() } else { 0 };
        mstatus::set_mpp(&mut status, MPP::Supervisor);
        regs.set_mstatus(status);
        regs.set_mepc(mepc);
        regs
    }

    #[test]
    fn delivers_to_supervisor_vector() {
        let mut hart = SimHart::new(0);
        hart.set_csr(csr::STVEC, STVEC);
        let mut regs = supervisor_regs(0x8020_4000, true);
        let trap = TrapInfo::exception(mcause::CAUSE_LOAD_ACCESS, 0x1000);

        assert_eq!(sbi_trap_redirect(&mut hart, &mut regs, &trap), Ok(()));

        assert_eq!(regs.mepc(), STVEC);
        assert_eq!(hart.csr(csr::SEPC), Some(0x8020_4000));
        assert_eq!(hart.csr(csr::SCAUSE), Some(mcause::CAUSE_LOAD_ACCESS));
        assert_eq!(hart.csr(csr::STVAL), Some(0x1000));

        let status = Mstatus::from_bits_truncate(regs.mstatus());
        assert_eq!(mstatus::mpp(regs.mstatus()), Some(MPP::Supervisor));
        assert!(status.contains(Mstatus::SPP));
        assert!(status.contains(Mstatus::SPIE));
        assert!(!status.contains(Mstatus::SIE));
    }

    #[test]
    fn vectored_mode_bits_are_dropped() {
        let mut hart = SimHart::new(0);
        hart.set_csr(csr::STVEC, STVEC | 1);
        let mut regs = supervisor_regs(0x8020_4000, false);
        let trap = TrapInfo::exception(mcause::CAUSE_ILLEGAL_INSTRUCTION, 0);
        assert_eq!(sbi_trap_redirect(&mut hart, &mut regs, &trap), Ok(()));
        assert_eq!(regs.mepc(), STVEC);
    }

    #[test]
    fn from_user_clears_spp() {
        let mut hart = SimHart::new(0);
        hart.set_csr(csr::STVEC, STVEC);
        let mut regs = supervisor_regs(0x1_0000, false);
        let mut status = regs.mstatus() | Mstatus::SPP.bits();
        mstatus::set_mpp(&mut status, MPP::User);
        regs.set_mstatus(status);

        let trap = TrapInfo::exception(mcause::CAUSE_LOAD_PAGE_FAULT, 0x40);
        assert_eq!(sbi_trap_redirect(&mut hart, &mut regs, &trap), Ok(()));
        assert!(!Mstatus::from_bits_truncate(regs.mstatus()).contains(Mstatus::SPP));
        assert_eq!(mstatus::mpp(regs.mstatus()), Some(MPP::Supervisor));
    }

    #[test]
    fn missing_vector_is_fatal_and_untouched() {
        let mut hart = SimHart::new(0);
        hart.set_csr(csr::SEPC, 0x77);
        let mut regs = supervisor_regs(0x8020_4000, true);
        let before = regs;
        let trap = TrapInfo::exception(mcause::CAUSE_LOAD_ACCESS, 0x1000);

        assert_eq!(sbi_trap_redirect(&mut hart, &mut regs, &trap), Err(SbiError::Fatal));
        assert_eq!(regs, before);
        assert_eq!(hart.csr(csr::SEPC), Some(0x77));
        assert_eq!(hart.csr(csr::SCAUSE), Some(0));
    }

    #[test]
    fn machine_mode_origin_is_fatal() {
        let mut hart = SimHart::new(0);
        hart.set_csr(csr::STVEC, STVEC);
        let mut regs = TrapRegisters::new();
        let mut status = 0;
        mstatus::set_mpp(&mut status, MPP::Machine);
        regs.set_mstatus(status);
        let before = regs;

        let trap = TrapInfo::exception(mcause::CAUSE_LOAD_ACCESS, 0);
        assert_eq!(sbi_trap_redirect(&mut hart, &mut regs, &trap), Err(SbiError::Fatal));
        assert_eq!(regs, before);
    }

    #[test]
    fn delegated_guest_trap_goes_to_vs_mode() {
        let mut hart = SimHart::new(1);
        hart.enable_extension('H');
        hart.set_csr(csr::VSTVEC, 0x4000_0000);
        hart.set_csr(csr::HEDELEG, 1 << mcause::CAUSE_LOAD_PAGE_FAULT);
        hart.set_csr(csr::VSSTATUS, Mstatus::SIE.bits());

        let mut regs = supervisor_regs(0x4000_2000, false);
        regs.set_prev_virt(true);
        let trap = TrapInfo::exception(mcause::CAUSE_LOAD_PAGE_FAULT, 0x8);

        assert_eq!(sbi_trap_redirect(&mut hart, &mut regs, &trap), Ok(()));
        assert!(regs.prev_virt());
        assert_eq!(regs.mepc(), 0x4000_0000);
        assert_eq!(hart.csr(csr::VSEPC), Some(0x4000_2000));
        assert_eq!(hart.csr(csr::VSCAUSE), Some(mcause::CAUSE_LOAD_PAGE_FAULT));
        assert_eq!(hart.csr(csr::VSTVAL), Some(0x8));
        assert_eq!(hart.csr(csr::SEPC), Some(0));

        let vsstatus = Mstatus::from_bits_truncate(hart.csr(csr::VSSTATUS).unwrap_or(0));
        assert!(vsstatus.contains(Mstatus::SPP | Mstatus::SPIE));
        assert!(!vsstatus.contains(Mstatus::SIE));
    }

    #[test]
    fn undelegated_guest_trap_goes_to_hs_mode() {
        use crate::register::hstatus::Hstatus;

        let mut hart = SimHart::new(1);
        hart.enable_extension('H');
        hart.set_csr(csr::STVEC, STVEC);
        let mut regs = supervisor_regs(0x4000_2000, false);
        regs.set_prev_virt(true);
        let trap = TrapInfo {
            cause: mcause::CAUSE_LOAD_GUEST_PAGE_FAULT,
            tval: 0x8,
            tval2: 0x2,
            tinst: 0x3003,
            gva: 1,
            reserved: 0,
        };

        assert_eq!(sbi_trap_redirect(&mut hart, &mut regs, &trap), Ok(()));
        assert!(!regs.prev_virt());
        assert_eq!(regs.mepc(), STVEC);
        assert_eq!(hart.csr(csr::HTVAL), Some(0x2));
        assert_eq!(hart.csr(csr::HTINST), Some(0x3003));
        let hstatus = Hstatus::from_bits_truncate(hart.csr(csr::HSTATUS).unwrap_or(0));
        assert!(hstatus.contains(Hstatus::SPV | Hstatus::SPVP | Hstatus::GVA));
        assert_eq!(hart.csr(csr::SCAUSE), Some(mcause::CAUSE_LOAD_GUEST_PAGE_FAULT));
    }
}
