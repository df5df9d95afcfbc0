//! 固件全局常量配置

/// 支持的最大硬件线程（hart）数量
pub const NHART: usize = 8;

/// 机器字宽（XLEN），32 或 64
pub const XLEN: u32 = usize::BITS;

/// ecall 扩展注册表的容量
pub const MAX_ECALL_EXTENSIONS: usize = 16;

/// 旧版（v0.1）SBI 扩展号，扩展号本身即为功能码
pub mod legacy {
    pub const SBI_EXT_0_1_SET_TIMER: usize = 0x0;
    pub const SBI_EXT_0_1_CONSOLE_PUTCHAR: usize = 0x1;
    pub const SBI_EXT_0_1_CONSOLE_GETCHAR: usize = 0x2;
    pub const SBI_EXT_0_1_CLEAR_IPI: usize = 0x3;
    pub const SBI_EXT_0_1_SEND_IPI: usize = 0x4;
    pub const SBI_EXT_0_1_REMOTE_FENCE_I: usize = 0x5;
    pub const SBI_EXT_0_1_REMOTE_SFENCE_VMA: usize = 0x6;
    pub const SBI_EXT_0_1_REMOTE_SFENCE_VMA_ASID: usize = 0x7;
    pub const SBI_EXT_0_1_SHUTDOWN: usize = 0x8;

    /// 旧版扩展保留的扩展号区间 `[0x00, 0x0F]`，其中未定义的编号返回不支持
    pub const SBI_EXT_0_1_START: usize = 0x00;
    pub const SBI_EXT_0_1_END: usize = 0x0F;

    /// 判断扩展号是否属于旧版调用约定
    #[inline]
    pub const fn is_legacy(extid: usize) -> bool {
        extid <= SBI_EXT_0_1_END
    }
}

/// 系统复位类型与原因（SRST）
pub mod srst {
    pub const SBI_SRST_RESET_TYPE_SHUTDOWN: u32 = 0x0;
    pub const SBI_SRST_RESET_TYPE_COLD_REBOOT: u32 = 0x1;
    pub const SBI_SRST_RESET_TYPE_WARM_REBOOT: u32 = 0x2;

    pub const SBI_SRST_RESET_REASON_NONE: u32 = 0x0;
    pub const SBI_SRST_RESET_REASON_SYSFAIL: u32 = 0x1;
}
