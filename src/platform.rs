//! 固件核心依赖的外部协作者
//!
//! 控制台、定时器、核间中断、远程 TLB 请求的投递、hart 状态机以及系统复位
//! 都由平台实现，核心只通过这里的 trait 发出请求，不关心请求如何完成。

use crate::consts::srst;
use crate::error::{SbiError, SbiResult};
use crate::hartmask::HartMask;
use crate::tlb::TlbInfo;

/// 单字符控制台
pub trait Console {
    fn putc(&self, ch: u8);

    /// 读取一个字符，没有输入时返回 `None`
    fn getc(&self) -> Option<u8>;
}

pub trait Timer {
    /// 设置下一次定时器事件的截止时间
    fn event_start(&self, next_event: u64);
}

/// 监督模式核间中断
pub trait Ipi {
    /// 清除本 hart 上挂起的监督模式软件中断
    fn clear_smode(&self);

    /// 向 `hbase` 起始、由 `hmask` 选中的 hart 发送监督模式软件中断
    fn send_smode(&self, hmask: HartMask, hbase: usize) -> SbiResult<()>;
}

/// 远程栅栏请求的投递
pub trait Tlb {
    fn request(&self, hmask: HartMask, hbase: usize, info: &TlbInfo) -> SbiResult<()>;
}

/// hart 状态机
pub trait Hsm {
    /// 当前所有可被中断（已启动或挂起）的 hart，从 `hbase` 开始计数
    fn hart_interruptible_mask(&self, hbase: usize) -> HartMask;
}

/// 系统复位类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ResetType {
    Shutdown = srst::SBI_SRST_RESET_TYPE_SHUTDOWN,
    ColdReboot = srst::SBI_SRST_RESET_TYPE_COLD_REBOOT,
    WarmReboot = srst::SBI_SRST_RESET_TYPE_WARM_REBOOT,
}

/// 系统复位原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ResetReason {
    None = srst::SBI_SRST_RESET_REASON_NONE,
    SystemFailure = srst::SBI_SRST_RESET_REASON_SYSFAIL,
}

impl ResetType {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            srst::SBI_SRST_RESET_TYPE_SHUTDOWN => Some(ResetType::Shutdown),
            srst::SBI_SRST_RESET_TYPE_COLD_REBOOT => Some(ResetType::ColdReboot),
            srst::SBI_SRST_RESET_TYPE_WARM_REBOOT => Some(ResetType::WarmReboot),
            _ => None,
        }
    }
}

pub trait SystemReset {
    fn system_reset(&self, ty: ResetType, reason: ResetReason);
}

/// 平台提供的全部服务
pub trait Platform: Console + Timer + Ipi + Tlb + Hsm + SystemReset {
    /// 处理一个到达机器模式的中断，默认不支持
    fn process_interrupt(&self, _irq: usize) -> SbiResult<()> {
        Err(SbiError::NotSupported)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_type_from_raw() {
        assert_eq!(ResetType::from_raw(0), Some(ResetType::Shutdown));
        assert_eq!(ResetType::from_raw(2), Some(ResetType::WarmReboot));
        assert_eq!(ResetType::from_raw(3), None);
        assert_eq!(ResetReason::SystemFailure as u32, srst::SBI_SRST_RESET_REASON_SYSFAIL);
    }

    #[test]
    fn interrupts_unsupported_by_default() {
        let platform = mock::MockPlatform::new();
        assert_eq!(platform.process_interrupt(3), Err(SbiError::NotSupported));
    }
}
