//! 机器模式陷阱处理
//!
//! 底层入口代码把寄存器现场保存为栈上的 [`TrapContext`] 后调用
//! [`sbi_trap_handler`]；处理结束后，出口代码按同一布局恢复寄存器并执行 mret。

use core::fmt;
use core::ptr::NonNull;

use crate::cheri::{hart_mask_validator, PointerValidator};
use crate::ecall::{sbi_ecall_handler, EcallContext, EcallRegistry};
use crate::error::SbiError;
use crate::hart::{Hart, HartScratch};
use crate::platform::Platform;
use crate::register::mcause::{self, McauseType};

mod context;
mod redirect;

pub use context::{
    offset, sbi_regs_gva, trap_info_offset, trap_regs_offset, TrapChain, TrapContext, TrapInfo,
    TrapRegisters, TRAP_CONTEXT_SIZE, TRAP_INFO_SIZE, TRAP_REGS_SIZE,
};
pub use redirect::sbi_trap_redirect;

/// 取得 hart 当前（最内层）的陷阱上下文
///
/// 暂存区不存在（例如 hart 编号超出配置）时返回 `None`。
pub fn sbi_trap_get_context(scratch: Option<&HartScratch>) -> Option<NonNull<TrapContext>> {
    scratch?.load_context()
}

/// 设置 hart 当前的陷阱上下文
pub fn sbi_trap_set_context(scratch: &HartScratch, tcntx: Option<NonNull<TrapContext>>) {
    scratch.store_context(tcntx);
}

/// 一次陷阱处理所需的全部环境
pub struct TrapEnv<'a> {
    pub hart: &'a mut dyn Hart,
    pub scratch: &'a HartScratch,
    pub registry: &'a EcallRegistry,
    pub platform: &'a dyn Platform,
    pub validator: &'a dyn PointerValidator,
}

impl<'a> TrapEnv<'a> {
    /// 构造陷阱处理环境
    ///
    /// 指针校验器固定为本次构建选用的 [`hart_mask_validator`]，
    /// 测试替身需要其他校验器时直接构造结构体。
    pub fn new(
        hart: &'a mut dyn Hart,
        scratch: &'a HartScratch,
        registry: &'a EcallRegistry,
        platform: &'a dyn Platform,
    ) -> Self {
        Self { hart, scratch, registry, platform, validator: hart_mask_validator() }
    }
}

/// 机器模式陷阱的总入口
///
/// # 流程解释
/// 1. 把 `tcntx` 压入本 hart 的陷阱上下文链
/// 2. 按 mcause 分类：中断交给平台，S/M 模式的 ecall 交给分发器，
///    其余异常重定向给访客
/// 3. 处理失败时打印整条陷阱链并停机
/// 4. 弹出 `tcntx`，恢复外层上下文
pub fn sbi_trap_handler(env: &mut TrapEnv<'_>, tcntx: &mut TrapContext) {
    tcntx.prev_context = sbi_trap_get_context(Some(env.scratch));
    sbi_trap_set_context(env.scratch, Some(NonNull::from(&mut *tcntx)));

    let result = match mcause::classify(tcntx.trap.cause) {
        McauseType::Interrupt(irq) => env.platform.process_interrupt(irq),
        McauseType::Ecall => {
            let mut ctx = EcallContext {
                hart: &mut *env.hart,
                platform: env.platform,
                validator: env.validator,
            };
            sbi_ecall_handler(env.registry, &mut ctx, &mut tcntx.regs)
        }
        McauseType::Exception(_) => {
            let trap = tcntx.trap;
            sbi_trap_redirect(&mut *env.hart, &mut tcntx.regs, &trap)
        }
    };

    if let Err(err) = result {
        sbi_trap_error(env.scratch.hartid(), err, tcntx);
    }

    sbi_trap_set_context(env.scratch, tcntx.prev_context);
}

/// 陷阱处理失败：打印从当前到最外层的所有陷阱上下文后停机
pub fn sbi_trap_error(hartid: usize, err: SbiError, tcntx: &TrapContext) -> ! {
    println!("sbi_trap_error: hart{}: trap handler failed ({})", hartid, err);
    let mut out = crate::printf::Print;
    let _ = dump_trap_chain(&mut out, hartid, tcntx);
    panic!("sbi_trap_error");
}

const GPR_NAMES: [&str; 32] = [
    "zero", "ra", "sp", "gp", "tp", "t0", "t1", "t2", "s0", "s1", "a0", "a1", "a2", "a3", "a4",
    "a5", "a6", "a7", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9", "s10", "s11", "t3", "t4",
    "t5", "t6",
];

/// 按从内到外的顺序输出整条陷阱链
pub fn dump_trap_chain<W: fmt::Write>(out: &mut W, hartid: usize, tcntx: &TrapContext) -> fmt::Result {
    // 链上的上下文都位于仍在执行的陷阱栈帧中
    for (depth, ctx) in unsafe { tcntx.chain() }.enumerate() {
        dump_trap_context(out, hartid, depth, ctx)?;
    }
    Ok(())
}

fn dump_trap_context<W: fmt::Write>(
    out: &mut W,
    hartid: usize,
    depth: usize,
    ctx: &TrapContext,
) -> fmt::Result {
    let p = |out: &mut W, name: &str, value: usize| {
        writeln!(out, "hart{} [{}] {:>8}=0x{:016x}", hartid, depth, name, value)
    };

    p(out, "mcause", ctx.trap.cause)?;
    p(out, "mtval", ctx.trap.tval)?;
    if ctx.trap.tval2 != 0 || ctx.trap.tinst != 0 {
        p(out, "mtval2", ctx.trap.tval2)?;
        p(out, "mtinst", ctx.trap.tinst)?;
    }
    p(out, "mepc", ctx.regs.mepc())?;
    p(out, "mstatus", ctx.regs.mstatus())?;
    if cfg!(target_pointer_width = "32") {
        p(out, "mstatush", ctx.regs.mstatush())?;
    }
    for (index, name) in GPR_NAMES.iter().enumerate().skip(1) {
        p(out, *name, ctx.regs.get(index))?;
    }
    Ok(())
}
