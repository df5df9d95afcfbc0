//! SBI 错误码定义

use core::fmt;

/// SBI 调用结果类型
pub type SbiResult<T> = Result<T, SbiError>;

/// SBI 错误类型
///
/// 除 `Fatal` 外，每个变体都对应 SBI 规范中的一个标准错误码，
/// 会作为普通的 ecall 返回值写回 a0，对访客软件可见。
/// `Fatal` 表示固件无法安全地继续为当前 hart 服务（例如没有可用的陷阱重定向目标），
/// 它从不写回给访客，而是终止本次陷阱处理。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SbiError {
    Failed,
    NotSupported,
    InvalidParam,
    Denied,
    InvalidAddress,
    AlreadyAvailable,
    AlreadyStarted,
    AlreadyStopped,
    NoShmem,
    Fatal,
}

impl SbiError {
    /// 返回写入 a0 的 SBI 错误码（负数）
    pub const fn code(self) -> isize {
        match self {
            SbiError::Failed => -1,
            SbiError::NotSupported => -2,
            SbiError::InvalidParam => -3,
            SbiError::Denied => -4,
            SbiError::InvalidAddress => -5,
            SbiError::AlreadyAvailable => -6,
            SbiError::AlreadyStarted => -7,
            SbiError::AlreadyStopped => -8,
            SbiError::NoShmem => -9,
            // 致命错误不会到达访客，这里仅用于日志
            SbiError::Fatal => -1,
        }
    }

    /// 是否为不可恢复的错误
    #[inline]
    pub const fn is_fatal(self) -> bool {
        matches!(self, SbiError::Fatal)
    }
}

impl fmt::Display for SbiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.code())
    }
}
