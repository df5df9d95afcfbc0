//! hart 掩码及其从访客内存的加载

use core::fmt;

use bit_field::BitField;

use crate::consts::XLEN;
use crate::csr_detect::load_ulong_guarded;
use crate::hart::Hart;
use crate::platform::Hsm;
use crate::trap::TrapInfo;

/// 一个机器字宽的 hart 位图，第 i 位对应 `hbase + i` 号 hart
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct HartMask(usize);

impl HartMask {
    pub const fn from_bits(bits: usize) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> usize {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, index: usize) -> bool {
        index < XLEN as usize && self.0.get_bit(index)
    }

    /// 依次返回被选中的位下标
    ///
    /// # 功能说明
    /// 从低位到高位遍历整个机器字，只产生置位的下标。
    ///
    /// # 返回值
    /// 升序的位下标迭代器，下标加上 `hbase` 即为目标 hart 编号
    pub fn iter(self) -> impl Iterator<Item = usize> {
        (0..XLEN as usize).filter(move |&i| self.0.get_bit(i))
    }
}

impl fmt::Debug for HartMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HartMask({:#b})", self.0)
    }
}

/// 读取旧版调用约定传入的 hart 掩码
///
/// # 功能说明
/// 加载期间 mtvec 指向捕获例程，访客地址不可访问时不会使固件崩溃。
///
/// # 参数
/// - `hart`: 执行加载的 hart
/// - `hsm`: 空指针时提供可被中断的 hart 集合
/// - `ptr`: 访客提供的掩码地址，已通过指针校验
///
/// # 返回值
/// - 非空指针：以访客视角陷阱安全地加载该地址处的机器字，
///   加载失败时返回捕获到的异常，调用者需要把它重定向给访客
/// - 空指针：返回所有可被中断的 hart
pub fn load_hart_mask<H, S>(hart: &mut H, hsm: &S, ptr: usize) -> Result<HartMask, TrapInfo>
where
    H: Hart + ?Sized,
    S: Hsm + ?Sized,
{
    if ptr != 0 {
        load_ulong_guarded(hart, ptr).map(HartMask::from_bits)
    } else {
        Ok(hsm.hart_interruptible_mask(0))
    }
}
