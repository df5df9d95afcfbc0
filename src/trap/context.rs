//! 定义陷阱上下文（Trap Context）的内存布局
//!
//! 底层陷阱入口/出口汇编按固定偏移保存和恢复寄存器，而不是按名字，
//! 因此 [`offset`] 中的下标表是唯一的布局来源：结构体、访问方法以及
//! 汇编使用的字节偏移都由它推导。

use core::mem::size_of;
use core::ptr::NonNull;

use static_assertions::const_assert_eq;

use crate::register::mstatus::{MSTATUSH_GVA, MSTATUSH_MPV, MSTATUS_GVA, MSTATUS_MPV};

/// TrapRegisters 中各寄存器的槽位下标
pub mod offset {
    pub const ZERO: usize = 0;
    pub const RA: usize = 1;
    pub const SP: usize = 2;
    pub const GP: usize = 3;
    pub const TP: usize = 4;
    pub const T0: usize = 5;
    pub const T1: usize = 6;
    pub const T2: usize = 7;
    pub const S0: usize = 8;
    pub const S1: usize = 9;
    pub const A0: usize = 10;
    pub const A1: usize = 11;
    pub const A2: usize = 12;
    pub const A3: usize = 13;
    pub const A4: usize = 14;
    pub const A5: usize = 15;
    pub const A6: usize = 16;
    pub const A7: usize = 17;
    pub const S2: usize = 18;
    pub const S3: usize = 19;
    pub const S4: usize = 20;
    pub const S5: usize = 21;
    pub const S6: usize = 22;
    pub const S7: usize = 23;
    pub const S8: usize = 24;
    pub const S9: usize = 25;
    pub const S10: usize = 26;
    pub const S11: usize = 27;
    pub const T3: usize = 28;
    pub const T4: usize = 29;
    pub const T5: usize = 30;
    pub const T6: usize = 31;
    pub const MEPC: usize = 32;
    pub const MSTATUS: usize = 33;
    /// 仅 32 位目标使用，64 位目标上恒为 0
    pub const MSTATUSH: usize = 34;
    /// 槽位总数
    pub const LAST: usize = 35;

    /// TrapInfo 中各字段的槽位下标
    pub mod info {
        pub const CAUSE: usize = 0;
        pub const TVAL: usize = 1;
        pub const TVAL2: usize = 2;
        pub const TINST: usize = 3;
        pub const GVA: usize = 4;
        pub const RESERVED: usize = 5;
        pub const LAST: usize = 6;
    }
}

/// 寄存器槽位在 TrapRegisters 中的字节偏移
#[inline]
pub const fn trap_regs_offset(index: usize) -> usize {
    index * size_of::<usize>()
}

/// TrapInfo 字段的字节偏移
#[inline]
pub const fn trap_info_offset(index: usize) -> usize {
    index * size_of::<usize>()
}

/// TrapRegisters 的字节大小
pub const TRAP_REGS_SIZE: usize = trap_regs_offset(offset::LAST);
/// TrapInfo 的字节大小
pub const TRAP_INFO_SIZE: usize = trap_info_offset(offset::info::LAST);
/// TrapContext 的字节大小
pub const TRAP_CONTEXT_SIZE: usize = TRAP_REGS_SIZE + TRAP_INFO_SIZE + size_of::<usize>();

/// 陷阱发生时的寄存器现场
///
/// 保存全部 31 个通用寄存器、为下标对称保留的 zero 槽位、陷入时的 PC（mepc）
/// 以及 mstatus（32 位目标上还有高半部分 mstatush）。
/// 该结构体是纯数据（POD），不持有任何资源。
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct TrapRegisters {
    regs: [usize; offset::LAST],
}

/// 为每个命名寄存器生成读写方法，下标来自 [`offset`]
macro_rules! trap_regs_accessors {
    ($($get:ident, $set:ident => $idx:ident;)*) => {
        impl TrapRegisters {
            $(
                #[inline]
                pub fn $get(&self) -> usize {
                    self.regs[offset::$idx]
                }

                #[inline]
                pub fn $set(&mut self, value: usize) {
                    self.set(offset::$idx, value);
                }
            )*
        }
    };
}

trap_regs_accessors! {
    ra, set_ra => RA;
    sp, set_sp => SP;
    gp, set_gp => GP;
    tp, set_tp => TP;
    t0, set_t0 => T0;
    t1, set_t1 => T1;
    t2, set_t2 => T2;
    s0, set_s0 => S0;
    s1, set_s1 => S1;
    a0, set_a0 => A0;
    a1, set_a1 => A1;
    a2, set_a2 => A2;
    a3, set_a3 => A3;
    a4, set_a4 => A4;
    a5, set_a5 => A5;
    a6, set_a6 => A6;
    a7, set_a7 => A7;
    s2, set_s2 => S2;
    s3, set_s3 => S3;
    s4, set_s4 => S4;
    s5, set_s5 => S5;
    s6, set_s6 => S6;
    s7, set_s7 => S7;
    s8, set_s8 => S8;
    s9, set_s9 => S9;
    s10, set_s10 => S10;
    s11, set_s11 => S11;
    t3, set_t3 => T3;
    t4, set_t4 => T4;
    t5, set_t5 => T5;
    t6, set_t6 => T6;
    mepc, set_mepc => MEPC;
    mstatus, set_mstatus => MSTATUS;
    mstatush, set_mstatush => MSTATUSH;
}

impl TrapRegisters {
    pub const fn new() -> Self {
        Self { regs: [0; offset::LAST] }
    }

    /// 按槽位下标读取，越界返回 0
    #[inline]
    pub fn get(&self, index: usize) -> usize {
        self.regs.get(index).copied().unwrap_or(0)
    }

    /// 按槽位下标写入；zero 槽位和越界下标的写入被忽略
    #[inline]
    pub fn set(&mut self, index: usize, value: usize) {
        if index == offset::ZERO {
            return;
        }
        if let Some(slot) = self.regs.get_mut(index) {
            *slot = value;
        }
    }

    /// 陷入前是否处于虚拟化模式（mstatus.MPV / mstatush.MPV）
    pub fn prev_virt(&self) -> bool {
        if cfg!(target_pointer_width = "32") {
            self.mstatush() & MSTATUSH_MPV != 0
        } else {
            self.mstatus() as u64 & MSTATUS_MPV != 0
        }
    }

    /// 设置 mret 返回后是否进入虚拟化模式
    pub fn set_prev_virt(&mut self, virt: bool) {
        if cfg!(target_pointer_width = "32") {
            let h = self.mstatush() & !MSTATUSH_MPV;
            self.set_mstatush(if virt { h | MSTATUSH_MPV } else { h });
        } else {
            let s = self.mstatus() as u64 & !MSTATUS_MPV;
            self.set_mstatus((if virt { s | MSTATUS_MPV } else { s }) as usize);
        }
    }

    /// ecall 处理完成后跳过 ecall 指令
    #[inline]
    pub fn admit_ecall(&mut self) {
        self.set_mepc(self.mepc().wrapping_add(4));
    }
}

impl Default for TrapRegisters {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for TrapRegisters {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TrapRegisters")
            .field("mepc", &format_args!("{:#x}", self.mepc()))
            .field("mstatus", &format_args!("{:#x}", self.mstatus()))
            .field("a0", &format_args!("{:#x}", self.a0()))
            .field("a6", &format_args!("{:#x}", self.a6()))
            .field("a7", &format_args!("{:#x}", self.a7()))
            .finish_non_exhaustive()
    }
}

/// 由 tval 的客户虚拟地址标志推导：tval 是否为客户虚拟地址
///
/// 未实现虚拟化扩展时 GVA 位为 WPRI 字段，读出恒为 0；
/// 特权规范 1.12 之前没有 mstatush，入口代码会将该槽位清零，因此同样视为 false。
pub fn sbi_regs_gva(regs: &TrapRegisters) -> bool {
    regs_gva_xlen(regs, crate::consts::XLEN)
}

pub(crate) fn regs_gva_xlen(regs: &TrapRegisters, xlen: u32) -> bool {
    if xlen == 32 {
        regs.mstatush() & MSTATUSH_GVA != 0
    } else {
        regs.mstatus() as u64 & MSTATUS_GVA != 0
    }
}

/// 陷阱详情
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TrapInfo {
    /// 异常原因（mcause），0 表示没有发生陷阱
    pub cause: usize,
    /// 陷阱值（mtval）
    pub tval: usize,
    /// 第二陷阱值（mtval2），两级地址转换的客户物理地址
    pub tval2: usize,
    /// 陷入指令的编码（mtinst）
    pub tinst: usize,
    /// tval 是否为客户虚拟地址
    pub gva: usize,
    /// 保留字段：保证 TrapContext 按 16 字节对齐，
    /// 能力模式下的 lc/sc 指令要求栈上的上下文 16 字节对齐
    pub reserved: usize,
}

impl TrapInfo {
    /// 构造一个同步异常描述
    pub const fn exception(cause: usize, tval: usize) -> Self {
        Self { cause, tval, tval2: 0, tinst: 0, gva: 0, reserved: 0 }
    }

    /// 是否记录到了陷阱
    #[inline]
    pub const fn is_trapped(&self) -> bool {
        self.cause != 0
    }
}

/// 保存在栈上的陷阱上下文
///
/// 每个 hart 持有唯一一条由 `prev_context` 串起的链：陷阱入口压栈，
/// 出口弹栈；链上的上下文不会跨 hart 共享，也不会活得比对应的陷阱更久。
#[repr(C)]
#[derive(Debug, Default)]
pub struct TrapContext {
    /*   0 */ pub regs: TrapRegisters,
    /* 280 */ pub trap: TrapInfo,
    /* 328 */ pub prev_context: Option<NonNull<TrapContext>>,
}

impl TrapContext {
    pub const fn new(regs: TrapRegisters, trap: TrapInfo) -> Self {
        Self { regs, trap, prev_context: None }
    }

    /// 从当前上下文开始遍历整条陷阱链（从内到外）
    ///
    /// # 安全性
    /// 链上所有 `prev_context` 必须指向仍然存活的上下文，
    /// 这由陷阱入口严格的压栈/弹栈顺序保证。
    pub unsafe fn chain(&self) -> TrapChain<'_> {
        TrapChain { next: Some(self) }
    }
}

/// 陷阱上下文链的迭代器
pub struct TrapChain<'a> {
    next: Option<&'a TrapContext>,
}

impl<'a> Iterator for TrapChain<'a> {
    type Item = &'a TrapContext;

    fn next(&mut self) -> Option<Self::Item> {
        let cur = self.next?;
        // 安全性由 TrapContext::chain 的调用者保证
        self.next = cur.prev_context.map(|p| unsafe { &*p.as_ptr() });
        Some(cur)
    }
}

const_assert_eq!(size_of::<TrapRegisters>(), TRAP_REGS_SIZE);
const_assert_eq!(size_of::<TrapInfo>(), TRAP_INFO_SIZE);
const_assert_eq!(size_of::<TrapContext>(), TRAP_CONTEXT_SIZE);
const_assert_eq!(core::mem::offset_of!(TrapContext, trap), TRAP_REGS_SIZE);
const_assert_eq!(core::mem::offset_of!(TrapContext, prev_context), TRAP_REGS_SIZE + TRAP_INFO_SIZE);
const_assert_eq!(core::mem::offset_of!(TrapInfo, tval), trap_info_offset(offset::info::TVAL));
const_assert_eq!(core::mem::offset_of!(TrapInfo, reserved), trap_info_offset(offset::info::RESERVED));
#[cfg(target_pointer_width = "64")]
static_assertions::const_assert!(TRAP_CONTEXT_SIZE % 16 == 0);
