//! 能力（capability）指针模型与访客指针校验
//!
//! 旧版 SBI 调用约定直接传递 hart 掩码的地址。在支持 Zcheripurecap 的核心上，
//! 这个地址是一个带标签、带权限的能力，而不是整数；在解引用之前必须确认它
//! 非空、标签有效并且具有读权限。没有能力硬件的构建中，地址只是普通整数，
//! 校验直接通过。两种行为由 [`PointerValidator`] 的两个实现表达，
//! 在构建配置时（`cheri` 特性）选定其一。

use crate::error::{SbiError, SbiResult};

bitflags! {
    /// 能力权限位
    pub struct CapPerms: u32 {
        /// 可以加载/存储能力
        const CAPABILITY = 1 << 0;
        const WRITE = 1 << 1;
        const READ = 1 << 2;
        const EXECUTE = 1 << 3;
        /// 可以访问系统寄存器
        const SYSTEM_REGS = 1 << 4;
        /// 加载出的能力保留写权限
        const LOAD_MUTABLE = 1 << 5;
        const ELEVATE_LEVEL = 1 << 6;
        const STORE_LEVEL = 1 << 7;
        const CAPABILITY_LEVEL = 1 << 8;
    }
}

/// 访客传入的指针
///
/// 在整数构建中只有地址有意义；在能力构建中，`tag` 表示能力是否由合法派生得到
/// （伪造或被破坏的能力标签为 0），`perms` 为其携带的权限。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capability {
    address: usize,
    tag: bool,
    perms: CapPerms,
}

impl Capability {
    /// 由整数地址得到的能力：没有有效标签，也没有权限
    pub const fn from_address(address: usize) -> Self {
        Self { address, tag: false, perms: CapPerms::empty() }
    }

    /// 一个合法派生、带有 `perms` 权限的能力
    pub const fn new(address: usize, perms: CapPerms) -> Self {
        Self { address, tag: true, perms }
    }

    /// 去掉标签后的同一能力
    pub const fn untagged(self) -> Self {
        Self { tag: false, ..self }
    }

    #[inline]
    pub const fn address(&self) -> usize {
        self.address
    }

    #[inline]
    pub const fn is_null(&self) -> bool {
        self.address == 0
    }

    #[inline]
    pub const fn is_valid(&self) -> bool {
        self.tag
    }

    #[inline]
    pub const fn perms(&self) -> CapPerms {
        self.perms
    }
}

/// 访客指针校验器
///
/// 校验是解引用之前的权限门禁，而不是故障处理：只有校验通过的指针才会被
/// 陷阱安全地加载。
pub trait PointerValidator {
    /// 校验指针是否可以用于读取
    ///
    /// # 返回值
    /// - `Ok(())`: 可以继续加载
    /// - `Err(SbiError::InvalidParam)`: 指针不可用
    fn validate(&self, ptr: &Capability) -> SbiResult<()>;
}

/// 整数地址模式：地址不携带额外元数据，任何值（包括空指针）都直接放行
#[derive(Debug, Default, Clone, Copy)]
pub struct IntegerPointers;

impl PointerValidator for IntegerPointers {
    fn validate(&self, _ptr: &Capability) -> SbiResult<()> {
        Ok(())
    }
}

/// 纯能力模式：要求非空、标签有效、具有读权限
#[derive(Debug, Default, Clone, Copy)]
pub struct PurecapPointers;

impl PointerValidator for PurecapPointers {
    fn validate(&self, ptr: &Capability) -> SbiResult<()> {
        if !ptr.is_null() && ptr.is_valid() && ptr.perms().contains(CapPerms::READ) {
            Ok(())
        } else {
            Err(SbiError::InvalidParam)
        }
    }
}

/// 本次构建选用的校验器
#[cfg(feature = "cheri")]
pub type HartMaskValidator = PurecapPointers;
/// 本次构建选用的校验器
#[cfg(not(feature = "cheri"))]
pub type HartMaskValidator = IntegerPointers;

static HART_MASK_VALIDATOR: HartMaskValidator = HartMaskValidator {};

/// 返回本次构建选用的校验器
pub fn hart_mask_validator() -> &'static dyn PointerValidator {
    &HART_MASK_VALIDATOR
}
