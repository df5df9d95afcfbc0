//! 机器模式陷阱原因寄存器 (mcause) 编码与分类

use crate::consts::XLEN;

/// mcause 最高位置 1 表示中断
pub const MCAUSE_IRQ_MASK: usize = 1 << (XLEN - 1);

pub const CAUSE_MISALIGNED_FETCH: usize = 0x0;
pub const CAUSE_FETCH_ACCESS: usize = 0x1;
pub const CAUSE_ILLEGAL_INSTRUCTION: usize = 0x2;
pub const CAUSE_BREAKPOINT: usize = 0x3;
pub const CAUSE_MISALIGNED_LOAD: usize = 0x4;
pub const CAUSE_LOAD_ACCESS: usize = 0x5;
pub const CAUSE_MISALIGNED_STORE: usize = 0x6;
pub const CAUSE_STORE_ACCESS: usize = 0x7;
pub const CAUSE_USER_ECALL: usize = 0x8;
pub const CAUSE_SUPERVISOR_ECALL: usize = 0x9;
pub const CAUSE_VIRTUAL_SUPERVISOR_ECALL: usize = 0xa;
pub const CAUSE_MACHINE_ECALL: usize = 0xb;
pub const CAUSE_FETCH_PAGE_FAULT: usize = 0xc;
pub const CAUSE_LOAD_PAGE_FAULT: usize = 0xd;
pub const CAUSE_STORE_PAGE_FAULT: usize = 0xf;
pub const CAUSE_FETCH_GUEST_PAGE_FAULT: usize = 0x14;
pub const CAUSE_LOAD_GUEST_PAGE_FAULT: usize = 0x15;
pub const CAUSE_VIRTUAL_INST_FAULT: usize = 0x16;
pub const CAUSE_STORE_GUEST_PAGE_FAULT: usize = 0x17;

/// 陷阱原因类型枚举
///
/// 表示从 mcause 解析出的陷阱类别，陷阱路由据此选择处理路径。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum McauseType {
    /// 异步中断，携带去掉最高位后的中断号
    Interrupt(usize),
    /// 来自监督模式或机器模式的 ecall
    Ecall,
    /// 其他同步异常，携带异常码
    Exception(usize),
}

/// 解析并返回陷阱原因类型
///
/// # 参数
/// - `mcause`: mcause 的原始值
///
/// # 注意
/// 用户模式 ecall 由监督模式软件处理（已委托），即便到达固件也按普通异常重定向。
pub fn classify(mcause: usize) -> McauseType {
    if mcause & MCAUSE_IRQ_MASK != 0 {
        return McauseType::Interrupt(mcause & !MCAUSE_IRQ_MASK);
    }
    match mcause {
        CAUSE_SUPERVISOR_ECALL | CAUSE_MACHINE_ECALL => McauseType::Ecall,
        code => McauseType::Exception(code),
    }
}
