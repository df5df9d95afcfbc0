//! 支持能力指针校验的 RISC-V SBI 固件陷阱处理与 ecall 分发核心

#![cfg_attr(not(test), no_std)]
#![warn(rust_2018_idioms)]

// 裸机 hart 目前只能给出整数地址，能力校验会拒绝所有 hart 掩码指针
#[cfg(all(feature = "cheri", target_os = "none"))]
compile_error!("feature `cheri` requires a capability-aware Hart implementation for bare-metal targets");

#[macro_use]
extern crate bitflags;

#[macro_use]
pub mod printf;

pub mod cheri;
pub mod consts;
pub mod csr_detect;
pub mod ecall;
pub mod error;
pub mod hart;
pub mod hartmask;
pub mod platform;
pub mod register;
pub mod spinlock;
pub mod tlb;
pub mod trap;

pub use printf::console_init;
