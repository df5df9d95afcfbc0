//! 旧版（v0.1）SBI 扩展
//!
//! 旧版调用约定中扩展号本身就是功能码，返回值只有 a0 一个。
//! 需要 hart 掩码的调用在 a0 中传递掩码的地址而不是掩码本身，
//! 该地址必须先经过指针校验，再以访客视角陷阱安全地加载；
//! 加载失败时把异常重定向给访客，结果不再写回。

use crate::consts::legacy::*;
use crate::consts::XLEN;
use crate::error::{SbiError, SbiResult};
use crate::hartmask::{load_hart_mask, HartMask};
use crate::platform::{ResetReason, ResetType};
use crate::tlb::{TlbInfo, TlbType};
use crate::trap::{offset, sbi_trap_redirect, TrapRegisters};

use super::{EcallArgs, EcallContext, EcallRegistry, EcallReturn, ExtensionDescriptor};

pub static ECALL_LEGACY: ExtensionDescriptor = ExtensionDescriptor {
    name: "legacy",
    extid_start: SBI_EXT_0_1_START,
    extid_end: SBI_EXT_0_1_END,
    probe: None,
    handler: sbi_ecall_legacy_handler,
    register_extensions: sbi_ecall_legacy_register_extensions,
};

fn sbi_ecall_legacy_register_extensions(registry: &mut EcallRegistry) -> SbiResult<()> {
    registry.register_extension(&ECALL_LEGACY)
}

/// 由定时器参数寄存器得到 64 位截止时间
///
/// 32 位目标上 a0 为低 32 位、a1 为高 32 位；64 位目标上只使用 a0。
pub fn legacy_timer_deadline(a0: usize, a1: usize, xlen: u32) -> u64 {
    if xlen == 32 {
        ((a1 as u64 & 0xFFFF_FFFF) << 32) | (a0 as u64 & 0xFFFF_FFFF)
    } else {
        a0 as u64
    }
}

/// 取得 a0 指向的 hart 掩码后执行 `op`
///
/// # 流程解释
/// 1. 校验 a0 中的指针，校验失败返回 `InvalidParam`，不发生任何访问
/// 2. 加载掩码；空指针表示所有可被中断的 hart
/// 3. 加载产生异常时把异常重定向给访客并设置 `skip_regs_update`
fn with_hart_mask<F>(
    ctx: &mut EcallContext<'_>,
    regs: &mut TrapRegisters,
    op: F,
) -> SbiResult<EcallReturn>
where
    F: FnOnce(HartMask) -> SbiResult<()>,
{
    let pmask = ctx.hart.guest_capability(regs, offset::A0);
    ctx.validator.validate(&pmask)?;

    match load_hart_mask(&mut *ctx.hart, ctx.platform, pmask.address()) {
        Ok(hmask) => {
            op(hmask)?;
            Ok(EcallReturn::default())
        }
        Err(trap) => {
            sbi_trap_redirect(&mut *ctx.hart, regs, &trap)?;
            Ok(EcallReturn::redirected())
        }
    }
}

fn sbi_ecall_legacy_handler(
    ctx: &mut EcallContext<'_>,
    args: &EcallArgs,
    regs: &mut TrapRegisters,
) -> SbiResult<EcallReturn> {
    let platform = ctx.platform;
    let source_hart = ctx.hart.hart_id();
    let [a0, a1, a2, a3, ..] = args.args;

    match args.extid {
        SBI_EXT_0_1_SET_TIMER => {
            platform.event_start(legacy_timer_deadline(a0, a1, XLEN));
            Ok(EcallReturn::default())
        }
        SBI_EXT_0_1_CONSOLE_PUTCHAR => {
            platform.putc(a0 as u8);
            Ok(EcallReturn::default())
        }
        SBI_EXT_0_1_CONSOLE_GETCHAR => {
            // 没有输入时返回 -1
            let ch = platform.getc().map_or(usize::MAX, usize::from);
            Ok(EcallReturn::value(ch))
        }
        SBI_EXT_0_1_CLEAR_IPI => {
            platform.clear_smode();
            Ok(EcallReturn::default())
        }
        SBI_EXT_0_1_SEND_IPI => with_hart_mask(ctx, regs, |hmask| platform.send_smode(hmask, 0)),
        SBI_EXT_0_1_REMOTE_FENCE_I => with_hart_mask(ctx, regs, |hmask| {
            let info = TlbInfo::new(0, 0, 0, 0, TlbType::FenceI, source_hart);
            platform.request(hmask, 0, &info)
        }),
        SBI_EXT_0_1_REMOTE_SFENCE_VMA => with_hart_mask(ctx, regs, |hmask| {
            let info = TlbInfo::new(a1, a2, 0, 0, TlbType::SfenceVma, source_hart);
            platform.request(hmask, 0, &info)
        }),
        SBI_EXT_0_1_REMOTE_SFENCE_VMA_ASID => with_hart_mask(ctx, regs, |hmask| {
            let info = TlbInfo::new(a1, a2, a3, 0, TlbType::SfenceVmaAsid, source_hart);
            platform.request(hmask, 0, &info)
        }),
        SBI_EXT_0_1_SHUTDOWN => {
            platform.system_reset(ResetType::Shutdown, ResetReason::None);
            Ok(EcallReturn::default())
        }
        _ => Err(SbiError::NotSupported),
    }
}
