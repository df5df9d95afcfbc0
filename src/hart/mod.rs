//! 硬件线程（hart）特权访问接口与每 hart 的暂存区

use array_macro::array;

use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicPtr, Ordering};

use crate::cheri::Capability;
use crate::consts::NHART;
use crate::register::{csr, misa_bit};
use crate::trap::{TrapContext, TrapInfo, TrapRegisters};

#[cfg(all(any(target_arch = "riscv32", target_arch = "riscv64"), target_os = "none"))]
pub mod metal;

#[cfg(test)]
pub(crate) mod sim;

/// 当前 hart 上的特权硬件访问
///
/// 固件核心通过此 trait 访问 CSR、陷阱向量和访客内存，而不直接嵌入汇编。
/// 裸机实现见 `metal` 模块；主机测试使用 `sim` 中的模拟实现。
///
/// 带 `_raw` 后缀的方法可能触发异常：只有当陷阱向量（mtvec）已切换到
/// [`Hart::expected_trap_addr`] 时，异常才会被记录到 `trap` 并跳过该指令；
/// 否则异常进入主陷阱路径，对固件自身是致命的。因此这些方法只能在
/// [`crate::csr_detect::ExpectedTrap`] 的作用域内调用。
pub trait Hart {
    /// 当前 hart 的编号（mhartid）
    fn hart_id(&self) -> usize;

    /// 读取 CSR（调用者需确保该 CSR 存在）
    fn read_csr(&self, csr: u16) -> usize;

    /// 写入 CSR（调用者需确保该 CSR 存在且可写）
    fn write_csr(&mut self, csr: u16, value: usize);

    /// 预期陷阱捕获例程的入口地址
    fn expected_trap_addr(&self) -> usize;

    /// 将 mtvec 设置为 `vector` 并返回原值
    fn swap_trap_vector(&mut self, vector: usize) -> usize;

    /// 读取 CSR，异常写入 `trap`
    ///
    /// # 安全性
    /// 必须在陷阱向量指向捕获例程时调用
    unsafe fn csr_read_raw(&mut self, csr: u16, trap: &mut TrapInfo) -> usize;

    /// 写入 CSR，异常写入 `trap`
    ///
    /// # 安全性
    /// 必须在陷阱向量指向捕获例程时调用
    unsafe fn csr_write_raw(&mut self, csr: u16, value: usize, trap: &mut TrapInfo);

    /// 以访客（mstatus.MPP 所指模式）的视角加载一个机器字，异常写入 `trap`
    ///
    /// # 安全性
    /// 必须在陷阱向量指向捕获例程时调用
    unsafe fn load_ulong_raw(&mut self, addr: usize, trap: &mut TrapInfo) -> usize;

    /// 访客寄存器槽位 `reg` 中指针的能力视图
    ///
    /// 没有能力硬件时只有整数地址，标签与权限均为空。
    /// 默认实现总是返回无标签的能力，纯能力模式的校验器会拒绝它，
    /// 因此启用 `cheri` 的 hart 必须覆盖此方法（`MetalHart` 没有覆盖，
    /// 裸机目标上启用 `cheri` 会编译失败）。
    fn guest_capability(&self, regs: &TrapRegisters, reg: usize) -> Capability {
        Capability::from_address(regs.get(reg))
    }

    /// misa 中是否实现了单字母扩展 `ext`
    fn has_extension(&self, ext: char) -> bool {
        self.read_csr(csr::MISA) & misa_bit(ext) != 0
    }
}

/// 每个 hart 的暂存区
///
/// 保存该 hart 当前（最内层）陷阱上下文的指针。暂存区只被所属 hart 访问，
/// 原子指针仅用于让整张表可以被静态共享，访问无需同步顺序。
#[derive(Debug)]
pub struct HartScratch {
    hartid: usize,
    trap_context: AtomicPtr<TrapContext>,
}

impl HartScratch {
    pub const fn new(hartid: usize) -> Self {
        Self { hartid, trap_context: AtomicPtr::new(ptr::null_mut()) }
    }

    #[inline]
    pub fn hartid(&self) -> usize {
        self.hartid
    }

    #[inline]
    pub(crate) fn load_context(&self) -> Option<NonNull<TrapContext>> {
        NonNull::new(self.trap_context.load(Ordering::Relaxed))
    }

    #[inline]
    pub(crate) fn store_context(&self, tcntx: Option<NonNull<TrapContext>>) {
        let p = tcntx.map_or(ptr::null_mut(), NonNull::as_ptr);
        self.trap_context.store(p, Ordering::Relaxed);
    }
}

/// 所有 hart 的暂存区表，按 hart 编号索引
///
/// 入口代码在陷阱开始时取得一次 hart 编号，随后把对应暂存区的引用
/// 显式传递给整条陷阱路径。
pub struct HartScratchTable {
    table: [HartScratch; NHART],
}

impl HartScratchTable {
    pub fn new() -> Self {
        Self {
            table: array![i => HartScratch::new(i); NHART],
        }
    }

    /// 返回 `hartid` 的暂存区，编号超出表容量时返回 `None`
    pub fn scratch(&self, hartid: usize) -> Option<&HartScratch> {
        self.table.get(hartid)
    }
}

impl Default for HartScratchTable {
    fn default() -> Self {
        Self::new()
    }
}
