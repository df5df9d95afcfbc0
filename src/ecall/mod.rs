//! ecall 扩展注册表与分发
//!
//! 每个扩展占有一段连续的扩展号区间，区间之间互不重叠。注册只在启动时
//! 由单个 hart 完成，之后注册表只读，各 hart 可以无锁地并发查找。

use crate::cheri::{hart_mask_validator, PointerValidator};
use crate::consts::legacy::is_legacy;
use crate::consts::MAX_ECALL_EXTENSIONS;
use crate::error::{SbiError, SbiResult};
use crate::hart::Hart;
use crate::platform::Platform;
use crate::trap::TrapRegisters;

pub mod legacy;

/// 编译进固件的全部扩展，按此顺序初始化
pub static SBI_ECALL_EXTENSIONS: &[&ExtensionDescriptor] = &[&legacy::ECALL_LEGACY];

/// 扩展处理函数
///
/// 处理函数可以读取 `regs` 中的任意寄存器；若它自行把一次异常重定向给了访客
/// （`regs` 已被改写），必须在返回值中设置 `skip_regs_update`。
pub type EcallHandler =
    fn(ctx: &mut EcallContext<'_>, args: &EcallArgs, regs: &mut TrapRegisters) -> SbiResult<EcallReturn>;

/// 扩展描述符，注册后不再改变
pub struct ExtensionDescriptor {
    pub name: &'static str,
    pub extid_start: usize,
    pub extid_end: usize,
    /// 查询扩展是否可用，返回非零值表示可用
    pub probe: Option<fn(extid: usize) -> SbiResult<usize>>,
    pub handler: EcallHandler,
    /// 启动时调用，由扩展自己决定是否（以及以何种区间）注册
    pub register_extensions: fn(registry: &mut EcallRegistry) -> SbiResult<()>,
}

impl ExtensionDescriptor {
    #[inline]
    /// `extid` 是否落在本扩展的区间内（两端包含）
    pub fn owns(&self, extid: usize) -> bool {
        self.extid_start <= extid && extid <= self.extid_end
    }

    fn overlaps(&self, other: &ExtensionDescriptor) -> bool {
        self.extid_start <= other.extid_end && other.extid_start <= self.extid_end
    }
}

/// 处理函数可以使用的 hart 与平台服务
pub struct EcallContext<'a> {
    pub hart: &'a mut dyn Hart,
    pub platform: &'a dyn Platform,
    pub validator: &'a dyn PointerValidator,
}

impl<'a> EcallContext<'a> {
    /// 使用本次构建选用的 hart 掩码指针校验器
    pub fn new(hart: &'a mut dyn Hart, platform: &'a dyn Platform) -> Self {
        Self { hart, platform, validator: hart_mask_validator() }
    }
}

/// 一次 ecall 的参数：a7 为扩展号，a6 为功能号，a0-a5 为参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EcallArgs {
    pub extid: usize,
    pub funcid: usize,
    pub args: [usize; 6],
}

impl EcallArgs {
    pub fn new(extid: usize, funcid: usize, regs: &TrapRegisters) -> Self {
        Self {
            extid,
            funcid,
            args: [regs.a0(), regs.a1(), regs.a2(), regs.a3(), regs.a4(), regs.a5()],
        }
    }
}

/// 处理函数的输出
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EcallReturn {
    pub value: usize,
    /// 处理函数已经重定向了一次陷阱，不能再把结果写回 a0/a1
    pub skip_regs_update: bool,
}

impl EcallReturn {
    pub const fn value(value: usize) -> Self {
        Self { value, skip_regs_update: false }
    }

    pub const fn redirected() -> Self {
        Self { value: 0, skip_regs_update: true }
    }
}

/// 分发结果，`error` 为 SBI 错误码（成功为 0）
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EcallResult {
    pub error: isize,
    pub value: usize,
    pub skip_regs_update: bool,
}

impl EcallResult {
    const fn failed(err: SbiError) -> Self {
        Self { error: err.code(), value: 0, skip_regs_update: false }
    }
}

/// 扩展注册表
pub struct EcallRegistry {
    exts: [Option<&'static ExtensionDescriptor>; MAX_ECALL_EXTENSIONS],
    len: usize,
}

impl EcallRegistry {
    pub const fn new() -> Self {
        Self { exts: [None; MAX_ECALL_EXTENSIONS], len: 0 }
    }

    /// 依次调用所有编译进固件的扩展的注册钩子
    pub fn init(&mut self) -> SbiResult<()> {
        for ext in SBI_ECALL_EXTENSIONS {
            (ext.register_extensions)(self)?;
        }

        #[cfg(feature = "verbose_init_info")]
        for ext in self.iter() {
            println!(
                "ecall: extension {:<8} [{:#x}, {:#x}]",
                ext.name, ext.extid_start, ext.extid_end
            );
        }

        Ok(())
    }

    /// 注册一个扩展
    ///
    /// # 功能说明
    /// 把 `ext` 追加到注册表末尾。注册只在启动时进行，
    /// 同一描述符重复注册与区间重叠同样处理。
    ///
    /// # 参数
    /// - `ext`: 静态的扩展描述符
    ///
    /// # 返回值
    /// - `Ok(())`: 注册成功
    /// - `Err(SbiError::InvalidParam)`: 区间起点大于终点
    /// - `Err(SbiError::AlreadyAvailable)`: 与已注册的区间重叠，注册表不变
    /// - `Err(SbiError::Failed)`: 注册表已满
    pub fn register_extension(&mut self, ext: &'static ExtensionDescriptor) -> SbiResult<()> {
        if ext.extid_end < ext.extid_start {
            return Err(SbiError::InvalidParam);
        }
        if self.iter().any(|t| t.overlaps(ext)) {
            return Err(SbiError::AlreadyAvailable);
        }
        let slot = self.exts.get_mut(self.len).ok_or(SbiError::Failed)?;
        *slot = Some(ext);
        self.len += 1;
        Ok(())
    }

    /// 按注册顺序遍历已注册的扩展
    pub fn iter(&self) -> impl Iterator<Item = &'static ExtensionDescriptor> + '_ {
        self.exts[..self.len].iter().flatten().copied()
    }

    /// 查找占有扩展号 `extid` 的扩展
    ///
    /// # 功能说明
    /// 已注册的区间互不重叠，至多有一个扩展匹配。
    ///
    /// # 返回值
    /// - `Some(ext)`: 区间包含 `extid` 的扩展
    /// - `None`: 没有扩展占有该扩展号
    pub fn find_extension(&self, extid: usize) -> Option<&'static ExtensionDescriptor> {
        self.iter().find(|ext| ext.owns(extid))
    }

    /// 查询扩展是否可用
    ///
    /// # 返回值
    /// - `0`: 没有扩展占有该号，或查询函数返回错误
    /// - `1`: 扩展没有提供查询函数
    /// - 其他: 查询函数的返回值
    pub fn probe(&self, extid: usize) -> usize {
        match self.find_extension(extid) {
            None => 0,
            Some(ext) => match ext.probe {
                None => 1,
                Some(probe) => probe(extid).unwrap_or(0),
            },
        }
    }

    /// 把一次 ecall 分发给占有 `extid` 的扩展
    ///
    /// 处理函数返回的普通错误被转换为 `EcallResult::error` 交还给访客；
    /// 只有 `SbiError::Fatal` 以 `Err` 返回。
    pub fn dispatch(
        &self,
        ctx: &mut EcallContext<'_>,
        extid: usize,
        funcid: usize,
        regs: &mut TrapRegisters,
    ) -> SbiResult<EcallResult> {
        let ext = match self.find_extension(extid) {
            Some(ext) => ext,
            None => return Ok(EcallResult::failed(SbiError::NotSupported)),
        };

        let args = EcallArgs::new(extid, funcid, regs);
        match (ext.handler)(ctx, &args, regs) {
            Ok(out) => Ok(EcallResult {
                error: 0,
                value: out.value,
                skip_regs_update: out.skip_regs_update,
            }),
            Err(SbiError::Fatal) => Err(SbiError::Fatal),
            Err(err) => Ok(EcallResult::failed(err)),
        }
    }
}

impl Default for EcallRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// ecall 陷阱的处理入口
///
/// # 流程解释
/// 1. 从 a7/a6 取出扩展号与功能号并分发
/// 2. 处理函数没有重定向陷阱时，mepc 跳过 ecall 指令并写回结果：
///    新版扩展的错误码写入 a0、返回值写入 a1；
///    旧版扩展只有一个返回值，写入 a0，a1 保持不变
pub fn sbi_ecall_handler(
    registry: &EcallRegistry,
    ctx: &mut EcallContext<'_>,
    regs: &mut TrapRegisters,
) -> SbiResult<()> {
    let extid = regs.a7();
    let funcid = regs.a6();

    let result = registry.dispatch(ctx, extid, funcid, regs)?;

    #[cfg(feature = "trace_ecall")]
    println!(
        "hart{}: ecall ext={:#x} fid={:#x} -> error={} value={:#x}{}",
        ctx.hart.hart_id(),
        extid,
        funcid,
        result.error,
        result.value,
        if result.skip_regs_update { " (redirected)" } else { "" }
    );

    if !result.skip_regs_update {
        regs.admit_ecall();
        if is_legacy(extid) {
            let ret = if result.error != 0 { result.error as usize } else { result.value };
            regs.set_a0(ret);
        } else {
            regs.set_a0(result.error as usize);
            regs.set_a1(result.value);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cheri::IntegerPointers;
    use crate::consts::legacy::{SBI_EXT_0_1_END, SBI_EXT_0_1_START};
    use crate::hart::sim::SimHart;
    use crate::platform::mock::MockPlatform;
    use proptest::prelude::*;

    fn no_register(_: &mut EcallRegistry) -> SbiResult<()> {
        Ok(())
    }

    fn echo_handler(
        _ctx: &mut EcallContext<'_>,
        args: &EcallArgs,
        _regs: &mut TrapRegisters,
    ) -> SbiResult<EcallReturn> {
        match args.funcid {
            0 => Ok(EcallReturn::value(args.args[0] + args.extid)),
            1 => Err(SbiError::Denied),
            2 => Err(SbiError::Fatal),
            _ => Ok(EcallReturn::redirected()),
        }
    }

    fn probe_seven(_: usize) -> SbiResult<usize> {
        Ok(7)
    }

    static BASE: ExtensionDescriptor = ExtensionDescriptor {
        name: "base",
        extid_start: 0x10,
        extid_end: 0x10,
        probe: None,
        handler: echo_handler,
        register_extensions: no_register,
    };

    static TIME: ExtensionDescriptor = ExtensionDescriptor {
        name: "time",
        extid_start: 0x5449_4D45,
        extid_end: 0x5449_4D45,
        probe: Some(probe_seven),
        handler: echo_handler,
        register_extensions: no_register,
    };

    static VENDOR: ExtensionDescriptor = ExtensionDescriptor {
        name: "vendor",
        extid_start: 0x0900_0000,
        extid_end: 0x09FF_FFFF,
        probe: None,
        handler: echo_handler,
        register_extensions: no_register,
    };

    static VENDOR_OVERLAP: ExtensionDescriptor = ExtensionDescriptor {
        name: "overlap",
        extid_start: 0x09FF_0000,
        extid_end: 0x0A00_0000,
        probe: None,
        handler: echo_handler,
        register_extensions: no_register,
    };

    static INVERTED: ExtensionDescriptor = ExtensionDescriptor {
        name: "inverted",
        extid_start: 0x20,
        extid_end: 0x1F,
        probe: None,
        handler: echo_handler,
        register_extensions: no_register,
    };

    fn leak(start: usize, end: usize) -> &'static ExtensionDescriptor {
        Box::leak(Box::new(ExtensionDescriptor {
            name: "leaked",
            extid_start: start,
            extid_end: end,
            probe: None,
            handler: echo_handler,
            register_extensions: no_register,
        }))
    }

    #[test]
    fn register_rejects_overlap_and_inverted() {
        let mut registry = EcallRegistry::new();
        assert_eq!(registry.register_extension(&VENDOR), Ok(()));
        assert_eq!(
            registry.register_extension(&VENDOR_OVERLAP),
            Err(SbiError::AlreadyAvailable)
        );
        assert_eq!(registry.register_extension(&INVERTED), Err(SbiError::InvalidParam));
        assert_eq!(registry.iter().count(), 1);
        assert!(core::ptr::eq(registry.find_extension(0x09FF_0001).unwrap(), &VENDOR));
    }

    #[test]
    fn registering_twice_keeps_one_entry() {
        let mut registry = EcallRegistry::new();
        assert_eq!(registry.register_extension(&legacy::ECALL_LEGACY), Ok(()));
        assert_eq!(
            registry.register_extension(&legacy::ECALL_LEGACY),
            Err(SbiError::AlreadyAvailable)
        );
        assert_eq!(registry.iter().count(), 1);
    }

    #[test]
    fn second_init_fails() {
        let mut registry = EcallRegistry::new();
        assert_eq!(registry.init(), Ok(()));
        assert_eq!(registry.init(), Err(SbiError::AlreadyAvailable));
        assert_eq!(registry.iter().count(), SBI_ECALL_EXTENSIONS.len());
    }

    #[test]
    fn register_fails_when_full() {
        let mut registry = EcallRegistry::new();
        for i in 0..MAX_ECALL_EXTENSIONS {
            assert_eq!(registry.register_extension(leak(0x100 + i, 0x100 + i)), Ok(()));
        }
        assert_eq!(registry.register_extension(&BASE), Err(SbiError::Failed));
    }

    #[test]
    fn probe_values() {
        let mut registry = EcallRegistry::new();
        registry.register_extension(&BASE).unwrap();
        registry.register_extension(&TIME).unwrap();
        assert_eq!(registry.probe(0x10), 1);
        assert_eq!(registry.probe(0x5449_4D45), 7);
        assert_eq!(registry.probe(0x11), 0);
    }

    #[test]
    fn init_registers_legacy_range() {
        let mut registry = EcallRegistry::new();
        registry.init().unwrap();
        for extid in SBI_EXT_0_1_START..=SBI_EXT_0_1_END {
            assert_eq!(registry.find_extension(extid).map(|e| e.name), Some("legacy"));
        }
        assert!(registry.find_extension(SBI_EXT_0_1_END + 1).is_none());
    }

    #[test]
    fn dispatch_maps_handler_errors() {
        let mut hart = SimHart::new(0);
        let platform = MockPlatform::new();
        let mut ctx = EcallContext { hart: &mut hart, platform: &platform, validator: &IntegerPointers };
        let mut registry = EcallRegistry::new();
        registry.register_extension(&BASE).unwrap();
        let mut regs = TrapRegisters::new();
        regs.set_a0(5);

        let ok = registry.dispatch(&mut ctx, 0x10, 0, &mut regs).unwrap();
        assert_eq!(ok, EcallResult { error: 0, value: 0x15, skip_regs_update: false });

        let denied = registry.dispatch(&mut ctx, 0x10, 1, &mut regs).unwrap();
        assert_eq!(denied.error, SbiError::Denied.code());

        assert_eq!(registry.dispatch(&mut ctx, 0x10, 2, &mut regs), Err(SbiError::Fatal));

        let missing = registry.dispatch(&mut ctx, 0x42, 0, &mut regs).unwrap();
        assert_eq!(missing.error, SbiError::NotSupported.code());
        assert_eq!(regs.a0(), 5);
    }

    #[test]
    fn write_back_for_new_and_unknown_extensions() {
        let mut hart = SimHart::new(0);
        let platform = MockPlatform::new();
        let mut ctx = EcallContext::new(&mut hart, &platform);
        let mut registry = EcallRegistry::new();
        registry.register_extension(&BASE).unwrap();

        let mut regs = TrapRegisters::new();
        regs.set_mepc(0x8020_0000);
        regs.set_a7(0x10);
        regs.set_a0(1);
        sbi_ecall_handler(&registry, &mut ctx, &mut regs).unwrap();
        assert_eq!(regs.mepc(), 0x8020_0004);
        assert_eq!(regs.a0(), 0);
        assert_eq!(regs.a1(), 0x11);

        regs.set_a7(0x4242);
        sbi_ecall_handler(&registry, &mut ctx, &mut regs).unwrap();
        assert_eq!(regs.mepc(), 0x8020_0008);
        assert_eq!(regs.a0() as isize, SbiError::NotSupported.code());
        assert_eq!(regs.a1(), 0);
    }

    #[test]
    fn skip_leaves_registers_alone() {
        let mut hart = SimHart::new(0);
        let platform = MockPlatform::new();
        let mut ctx = EcallContext { hart: &mut hart, platform: &platform, validator: &IntegerPointers };
        let mut registry = EcallRegistry::new();
        registry.register_extension(&BASE).unwrap();

        let mut regs = TrapRegisters::new();
        regs.set_mepc(0x8020_0000);
        regs.set_a7(0x10);
        regs.set_a6(3);
        regs.set_a0(0xAA);
        regs.set_a1(0xBB);
        sbi_ecall_handler(&registry, &mut ctx, &mut regs).unwrap();
        assert_eq!(regs.mepc(), 0x8020_0000);
        assert_eq!(regs.a0(), 0xAA);
        assert_eq!(regs.a1(), 0xBB);
    }

    proptest! {
        #[test]
        fn registered_ranges_stay_disjoint(
            ranges in proptest::collection::vec((0usize..256, 0usize..16), 1..32)
        ) {
            let mut registry = EcallRegistry::new();
            for (start, len) in ranges {
                let _ = registry.register_extension(leak(start, start + len));
            }
            let exts: Vec<_> = registry.iter().collect();
            for (i, a) in exts.iter().enumerate() {
                for b in &exts[i + 1..] {
                    prop_assert!(!a.overlaps(b));
                }
            }
            for extid in 0..272 {
                prop_assert!(exts.iter().filter(|e| e.owns(extid)).count() <= 1);
            }
        }
    }
}
