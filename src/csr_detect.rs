//! 陷阱安全的特权访问
//!
//! 访问可能不存在的 CSR 或访客提供的地址时，先把 mtvec 切换到预期陷阱
//! 捕获例程，再执行访问。访问若发生异常，捕获例程把异常记录到 `TrapInfo`
//! 并跳过该指令，调用者得到的是一个错误值而不是一次固件陷入。

use crate::hart::Hart;
use crate::trap::TrapInfo;

/// 预期陷阱作用域
///
/// 创建时把 mtvec 切换到捕获例程，析构时恢复原值。作用域可以嵌套：
/// 内层恢复的是外层安装的捕获例程，外层再恢复固件主向量（后进先出）。
pub struct ExpectedTrap<'a, H: Hart + ?Sized> {
    hart: &'a mut H,
    saved_vector: usize,
}

impl<'a, H: Hart + ?Sized> ExpectedTrap<'a, H> {
    pub fn install(hart: &'a mut H) -> Self {
        let vector = hart.expected_trap_addr();
        let saved_vector = hart.swap_trap_vector(vector);
        Self { hart, saved_vector }
    }

    /// 作用域内的 hart，用于嵌套安装
    pub fn hart(&mut self) -> &mut H {
        &mut *self.hart
    }

    pub fn read_csr(&mut self, csr: u16) -> Result<usize, TrapInfo> {
        let mut trap = TrapInfo::default();
        // mtvec 已指向捕获例程
        let value = unsafe { self.hart.csr_read_raw(csr, &mut trap) };
        if trap.is_trapped() {
            Err(trap)
        } else {
            Ok(value)
        }
    }

    pub fn write_csr(&mut self, csr: u16, value: usize) -> Result<(), TrapInfo> {
        let mut trap = TrapInfo::default();
        unsafe { self.hart.csr_write_raw(csr, value, &mut trap) };
        if trap.is_trapped() {
            Err(trap)
        } else {
            Ok(())
        }
    }

    /// 以访客视角加载 `addr` 处的一个机器字
    pub fn load_ulong(&mut self, addr: usize) -> Result<usize, TrapInfo> {
        let mut trap = TrapInfo::default();
        let value = unsafe { self.hart.load_ulong_raw(addr, &mut trap) };
        if trap.is_trapped() {
            Err(trap)
        } else {
            Ok(value)
        }
    }
}

impl<'a, H: Hart + ?Sized> Drop for ExpectedTrap<'a, H> {
    fn drop(&mut self) {
        self.hart.swap_trap_vector(self.saved_vector);
    }
}

/// 读取一个可能不存在的 CSR
///
/// # 返回值
/// - `Ok(value)`: 读取成功
/// - `Err(trap)`: 访问产生异常（通常是非法指令），CSR 未被访问
pub fn read_csr_guarded<H: Hart + ?Sized>(hart: &mut H, csr: u16) -> Result<usize, TrapInfo> {
    ExpectedTrap::install(hart).read_csr(csr)
}

/// 写入一个可能不存在或只读的 CSR，失败时目标寄存器保持不变
pub fn write_csr_guarded<H: Hart + ?Sized>(
    hart: &mut H,
    csr: u16,
    value: usize,
) -> Result<(), TrapInfo> {
    ExpectedTrap::install(hart).write_csr(csr, value)
}

/// 以访客视角（mstatus.MPRV）加载一个机器字
pub fn load_ulong_guarded<H: Hart + ?Sized>(hart: &mut H, addr: usize) -> Result<usize, TrapInfo> {
    ExpectedTrap::install(hart).load_ulong(addr)
}
