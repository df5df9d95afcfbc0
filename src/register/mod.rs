//! 定义固件所需 RISC-V 控制状态寄存器（CSR）的编号与位域

pub mod hstatus;
pub mod mcause;
pub mod mstatus;

/// CSR 编号表
///
/// 编号与特权架构手册一致。固件通过 [`crate::hart::Hart`] 以编号访问 CSR，
/// 汇编实现（`hart::metal`）中的编号分发表同样以此为准。
pub mod csr {
    /* 监督模式 */
    pub const SSTATUS: u16 = 0x100;
    pub const SIE: u16 = 0x104;
    pub const STVEC: u16 = 0x105;
    pub const SCOUNTEREN: u16 = 0x106;
    pub const SSCRATCH: u16 = 0x140;
    pub const SEPC: u16 = 0x141;
    pub const SCAUSE: u16 = 0x142;
    pub const STVAL: u16 = 0x143;
    pub const SIP: u16 = 0x144;
    pub const SATP: u16 = 0x180;

    /* 虚拟监督模式 */
    pub const VSSTATUS: u16 = 0x200;
    pub const VSTVEC: u16 = 0x205;
    pub const VSEPC: u16 = 0x241;
    pub const VSCAUSE: u16 = 0x242;
    pub const VSTVAL: u16 = 0x243;

    /* 机器模式 */
    pub const MSTATUS: u16 = 0x300;
    pub const MISA: u16 = 0x301;
    pub const MEDELEG: u16 = 0x302;
    pub const MIDELEG: u16 = 0x303;
    pub const MIE: u16 = 0x304;
    pub const MTVEC: u16 = 0x305;
    pub const MCOUNTEREN: u16 = 0x306;
    pub const MENVCFG: u16 = 0x30a;
    pub const MSTATUSH: u16 = 0x310;
    pub const MCOUNTINHIBIT: u16 = 0x320;
    pub const MSCRATCH: u16 = 0x340;
    pub const MEPC: u16 = 0x341;
    pub const MCAUSE: u16 = 0x342;
    pub const MTVAL: u16 = 0x343;
    pub const MIP: u16 = 0x344;
    pub const MTINST: u16 = 0x34a;
    pub const MTVAL2: u16 = 0x34b;

    /* 虚拟化扩展 */
    pub const HSTATUS: u16 = 0x600;
    pub const HEDELEG: u16 = 0x602;
    pub const HIDELEG: u16 = 0x603;
    pub const HTVAL: u16 = 0x643;
    pub const HTINST: u16 = 0x64a;

    /* 计数器与只读信息 */
    pub const CYCLE: u16 = 0xc00;
    pub const TIME: u16 = 0xc01;
    pub const INSTRET: u16 = 0xc02;
    pub const MVENDORID: u16 = 0xf11;
    pub const MARCHID: u16 = 0xf12;
    pub const MIMPID: u16 = 0xf13;
    pub const MHARTID: u16 = 0xf14;

    /// CSR 编号的 [11:10] 位为 `0b11` 时该寄存器只读，写入会触发非法指令异常
    #[inline]
    pub const fn is_read_only(csr: u16) -> bool {
        (csr >> 10) & 0b11 == 0b11
    }
}

/// misa 寄存器中某个单字母扩展对应的位
///
/// # 参数
/// - `ext`: 扩展字母，必须在 `'A'..='Z'` 之间
///
/// # 返回值
/// 对应位掩码，字母非法时返回 0
#[inline]
pub const fn misa_bit(ext: char) -> usize {
    if ext.is_ascii_uppercase() {
        1 << (ext as u8 - b'A')
    } else {
        0
    }
}
