//! 定义固件的控制台输出方法

use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::platform::Console;
use crate::spinlock::SpinLock;

/// 启动时注册的控制台设备，注册之前的输出被丢弃
static CONSOLE: SpinLock<Option<&'static (dyn Console + Sync)>> = SpinLock::new(None, "console");

/// 是否已经 panic，panic 之后输出不再加锁
static PANICKED: AtomicBool = AtomicBool::new(false);

/// 注册控制台设备
pub fn console_init(console: &'static (dyn Console + Sync)) {
    *CONSOLE.lock() = Some(console);
}

/// 零大小类型（ZST）的打印结构体，直接写入已注册的控制台。
pub struct Print;

impl fmt::Write for Print {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let console = *CONSOLE.lock();
        if let Some(console) = console {
            for byte in s.bytes() {
                console.putc(byte);
            }
        }
        Ok(())
    }
}

/// 核心打印函数（被宏调用）
///
/// # 功能说明
/// 根据系统状态决定是否加锁输出：
/// - 当系统处于panic状态时，直接输出（不加锁）
/// - 正常状态下使用自旋锁保证多个 hart 的输出不交错
pub fn _print(args: fmt::Arguments<'_>) {
    use fmt::Write;
    static PRINT: SpinLock<()> = SpinLock::new((), "print");

    if PANICKED.load(Ordering::Relaxed) {
        let _ = Print.write_fmt(args);
    } else {
        let guard = PRINT.lock();
        let _ = Print.write_fmt(args);
        drop(guard);
    }
}

/// 在控制台输出一串字符
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {
        $crate::printf::_print(format_args!($($arg)*));
    };
}

/// 在控制台输出一行字符
#[macro_export]
macro_rules! println {
    () => {$crate::print!("\n")};
    ($fmt:expr) => {$crate::print!(concat!($fmt, "\n"))};
    ($fmt:expr, $($arg:tt)*) => {
        $crate::print!(concat!($fmt, "\n"), $($arg)*)
    };
}

/// 全局panic处理函数
///
/// 打印panic信息，设置全局panic状态标志后挂起当前 hart
#[cfg(all(target_os = "none", not(test)))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo<'_>) -> ! {
    crate::println!("{}", info);
    PANICKED.store(true, Ordering::Relaxed);
    loop {}
}
