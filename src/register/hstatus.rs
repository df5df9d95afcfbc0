//! 虚拟化监督状态寄存器 (hstatus) 位域

bitflags! {
    /// hstatus 中陷阱重定向需要维护的位
    pub struct Hstatus: usize {
        /// 陷入 HS 模式的地址是否为客户虚拟地址
        const GVA = 1 << 6;
        /// 陷入 HS 模式前是否处于虚拟化模式
        const SPV = 1 << 7;
        /// 陷入前的虚拟化特权模式（仅在 SPV=1 时更新）
        const SPVP = 1 << 8;
    }
}

/// 按一次从 `prev_virt` 模式陷入 HS 模式的硬件行为改写 hstatus
///
/// # 参数
/// - `hstatus`: 当前 hstatus 值
/// - `prev_virt`: 陷入前是否处于虚拟化模式
/// - `prev_supervisor`: 陷入前是否为（虚拟）监督模式
/// - `gva`: tval 是否为客户虚拟地址
pub fn enter_hs_trap(hstatus: usize, prev_virt: bool, prev_supervisor: bool, gva: bool) -> usize {
    let untouched = hstatus & !Hstatus::all().bits();
    let mut flags = Hstatus::from_bits_truncate(hstatus);

    if prev_virt {
        flags.set(Hstatus::SPVP, prev_supervisor);
    }
    flags.set(Hstatus::SPV, prev_virt);
    flags.set(Hstatus::GVA, gva);

    untouched | flags.bits()
}
