//! 机器状态寄存器 (mstatus / mstatush) 位域操作模块
//!
//! 陷阱上下文中保存的 mstatus 只是一个机器字，本模块提供对该值的纯函数操作，
//! 陷阱重定向据此改写访客返回时的特权状态。

use bit_field::BitField;

bitflags! {
    /// mstatus 中各 XLEN 通用的状态位
    ///
    /// sstatus 是 mstatus 的受限视图，SIE/SPIE/SPP 的位置在两者中相同，
    /// 因此重定向改写 vsstatus 时同样使用这些位。
    pub struct Mstatus: usize {
        /// 监督模式全局中断使能
        const SIE = 1 << 1;
        /// 机器模式全局中断使能
        const MIE = 1 << 3;
        /// 陷入前的监督模式中断使能
        const SPIE = 1 << 5;
        const UBE = 1 << 6;
        /// 陷入前的机器模式中断使能
        const MPIE = 1 << 7;
        /// 陷入监督模式前的特权模式（0=用户, 1=监督）
        const SPP = 1 << 8;
        /// 陷入机器模式前的特权模式，两位宽
        const MPP = 0b11 << 11;
        /// 访存时使用 MPP 所指的特权模式进行地址转换与保护检查
        const MPRV = 1 << 17;
        const SUM = 1 << 18;
        const MXR = 1 << 19;
    }
}

/// MPP 字段所在的位区间
const MPP_BITS: core::ops::Range<usize> = 11..13;

/// 64 位 mstatus 中的 GVA 位（tval 为客户虚拟地址）
pub const MSTATUS_GVA: u64 = 1 << 38;
/// 64 位 mstatus 中的 MPV 位（陷入前处于虚拟化模式）
pub const MSTATUS_MPV: u64 = 1 << 39;

/// 32 位 mstatush 中的 GVA 位
pub const MSTATUSH_GVA: usize = 1 << 6;
/// 32 位 mstatush 中的 MPV 位
pub const MSTATUSH_MPV: usize = 1 << 7;

/// 机器模式前的特权模式 (MPP) 枚举
///
/// 表示执行 mret 指令后将返回的特权模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MPP {
    User = 0,
    Supervisor = 1,
    Machine = 3,
}

impl MPP {
    /// 从 MPP 字段的原始值解析特权模式，保留值 2 返回 `None`
    pub fn from_bits(bits: usize) -> Option<Self> {
        match bits {
            0 => Some(MPP::User),
            1 => Some(MPP::Supervisor),
            3 => Some(MPP::Machine),
            _ => None,
        }
    }
}

/// 读取 mstatus 值中的 MPP 字段
#[inline]
pub fn mpp(mstatus: usize) -> Option<MPP> {
    MPP::from_bits(mstatus.get_bits(MPP_BITS))
}

/// 设置 mstatus 值中的 MPP 字段
///
/// # 参数
/// - `mstatus`: 待修改的 mstatus 值
/// - `mpp`: 目标特权模式枚举值
#[inline]
pub fn set_mpp(mstatus: &mut usize, mpp: MPP) {
    mstatus.set_bits(MPP_BITS, mpp as usize);
}

/// 按照一次陷入监督模式的硬件行为改写状态字中的 SPP/SPIE/SIE
///
/// # 流程解释
/// 1. SPP 记录陷入前是否处于监督模式
/// 2. SIE 的当前值保存到 SPIE
/// 3. 清除 SIE，进入陷阱处理程序时中断关闭
///
/// # 参数
/// - `status`: mstatus 或 vsstatus 的值
/// - `from_supervisor`: 陷入前是否为监督模式
///
/// # 返回值
/// 改写后的状态字
pub fn enter_supervisor_trap(status: usize, from_supervisor: bool) -> usize {
    let mut flags = Mstatus::from_bits_truncate(status);
    let untouched = status & !Mstatus::all().bits();

    flags.set(Mstatus::SPP, from_supervisor);
    let sie = flags.contains(Mstatus::SIE);
    flags.set(Mstatus::SPIE, sie);
    flags.remove(Mstatus::SIE);

    untouched | flags.bits()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mpp_round_trip() {
        let mut status = 0usize;
        set_mpp(&mut status, MPP::Supervisor);
        assert_eq!(status, 1 << 11);
        assert_eq!(mpp(status), Some(MPP::Supervisor));
        set_mpp(&mut status, MPP::Machine);
        assert_eq!(mpp(status), Some(MPP::Machine));
        set_mpp(&mut status, MPP::User);
        assert_eq!(status, 0);
    }

    #[test]
    fn reserved_mpp_is_rejected() {
        assert_eq!(mpp(2 << 11), None);
    }

    #[test]
    fn supervisor_trap_entry_moves_sie_to_spie() {
        let status = (Mstatus::SIE | Mstatus::MPRV).bits();
        let out = Mstatus::from_bits_truncate(enter_supervisor_trap(status, true));
        assert!(out.contains(Mstatus::SPP));
        assert!(out.contains(Mstatus::SPIE));
        assert!(!out.contains(Mstatus::SIE));
        assert!(out.contains(Mstatus::MPRV));
    }

    #[test]
    fn supervisor_trap_entry_from_user_keeps_unknown_bits() {
        let status = (1usize << 30) | Mstatus::SPP.bits() | Mstatus::SPIE.bits();
        let out = enter_supervisor_trap(status, false);
        assert_eq!(out & (1 << 30), 1 << 30);
        assert_eq!(out & Mstatus::SPP.bits(), 0);
        assert_eq!(out & Mstatus::SPIE.bits(), 0);
    }
}
