//! 远程栅栏（TLB 维护）请求记录

/// `size` 取此值时表示刷新整个地址空间
pub const SBI_TLB_FLUSH_ALL: usize = usize::MAX;

/// 栅栏类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlbType {
    FenceI,
    SfenceVma,
    SfenceVmaAsid,
    HfenceGvmaVmid,
    HfenceGvma,
    HfenceVvmaAsid,
    HfenceVvma,
}

/// 一次远程栅栏请求
///
/// 由发起 hart 构造后交给投递层，投递层负责在目标 hart 上执行并等待应答。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlbInfo {
    pub start: usize,
    pub size: usize,
    pub asid: usize,
    pub vmid: usize,
    pub ty: TlbType,
    /// 发起请求的 hart
    pub src_hart: usize,
}

impl TlbInfo {
    pub const fn new(
        start: usize,
        size: usize,
        asid: usize,
        vmid: usize,
        ty: TlbType,
        src_hart: usize,
    ) -> Self {
        Self { start, size, asid, vmid, ty, src_hart }
    }

    /// 请求是否覆盖整个地址空间
    ///
    /// 起始地址与大小同时为 0，或大小为 [`SBI_TLB_FLUSH_ALL`]，都表示全部刷新。
    pub const fn is_flush_all(&self) -> bool {
        (self.start == 0 && self.size == 0) || self.size == SBI_TLB_FLUSH_ALL
    }
}
