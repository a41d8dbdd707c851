//! Kernel-style print macros for pexec
//!
//! Thread-safe, optionally-flushing debug output similar to Linux kernel's printk.
//! Every leveled line carries a tag naming the thread role and the
//! execution being served, e.g. `[DEBUG] [c1 e42] drained 3 jobs`.
//!
//! # Environment Variables
//!
//! - `PEXEC_FLUSH_EPRINT=1` - Flush stderr after each print (useful for debugging hangs)
//! - `PEXEC_LOG_LEVEL=<level>` - Set log level: 0=off, 1=error, 2=warn, 3=info, 4=debug, 5=trace
//!
//! # Usage
//!
//! ```ignore
//! use pexec_core::{kinfo, kdebug, kwarn};
//!
//! kinfo!("Compute worker {} started", id);
//! kdebug!("Retrying, {} attempts left", remaining);
//! kwarn!("Stream handle dropped without completing");
//! ```

use std::cell::Cell;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Log levels (matches common conventions)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Off,
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    /// Parse a level name or digit, as accepted by `PEXEC_LOG_LEVEL`
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "off" | "0" => Some(LogLevel::Off),
            "error" | "1" => Some(LogLevel::Error),
            "warn" | "2" => Some(LogLevel::Warn),
            "info" | "3" => Some(LogLevel::Info),
            "debug" | "4" => Some(LogLevel::Debug),
            "trace" | "5" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            LogLevel::Off => "",
            LogLevel::Error => "[ERROR]",
            LogLevel::Warn => "[WARN] ",
            LogLevel::Info => "[INFO] ",
            LogLevel::Debug => "[DEBUG]",
            LogLevel::Trace => "[TRACE]",
        }
    }
}

/// Which kind of runtime thread is printing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadTag {
    /// Not a runtime thread
    External,
    /// Compute worker N
    Compute(usize),
    /// Blocking pool thread N
    Blocking(usize),
}

// Global configuration (initialized once)
static FLUSH_ENABLED: AtomicBool = AtomicBool::new(false);
static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);
static INITIALIZED: AtomicBool = AtomicBool::new(false);

thread_local! {
    static THREAD_TAG: Cell<ThreadTag> = const { Cell::new(ThreadTag::External) };
    static EXECUTION_ID: Cell<u64> = const { Cell::new(0) };
}

/// Initialize logging from environment variables
///
/// Called automatically on first log, but can be called explicitly for
/// deterministic initialization.
pub fn init() {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    if let Ok(val) = std::env::var("PEXEC_FLUSH_EPRINT") {
        let flush = matches!(val.as_str(), "1" | "true" | "yes" | "on");
        FLUSH_ENABLED.store(flush, Ordering::Relaxed);
    }

    if let Ok(val) = std::env::var("PEXEC_LOG_LEVEL") {
        let level = LogLevel::parse(&val).unwrap_or(LogLevel::Info);
        LOG_LEVEL.store(level as u8, Ordering::Relaxed);
    }
}

#[inline]
pub fn flush_enabled() -> bool {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    FLUSH_ENABLED.load(Ordering::Relaxed)
}

#[inline]
pub fn log_level() -> LogLevel {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    LogLevel::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

/// Set log level programmatically
///
/// Overrides `PEXEC_LOG_LEVEL`, even if logging was not initialized yet.
pub fn set_log_level(level: LogLevel) {
    INITIALIZED.store(true, Ordering::SeqCst);
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

/// Set flush mode programmatically
pub fn set_flush_enabled(enabled: bool) {
    FLUSH_ENABLED.store(enabled, Ordering::Relaxed);
}

#[inline]
pub fn level_enabled(level: LogLevel) -> bool {
    level as u8 <= log_level() as u8
}

/// Tag this OS thread for log output
pub fn set_thread_tag(tag: ThreadTag) {
    THREAD_TAG.with(|cell| cell.set(tag));
}

/// Record the execution this thread is currently serving (0 = none)
pub fn set_execution_id(id: u64) {
    EXECUTION_ID.with(|cell| cell.set(id));
}

fn write_tag(handle: &mut impl Write) {
    let tag = THREAD_TAG.with(|cell| cell.get());
    let exec = EXECUTION_ID.with(|cell| cell.get());
    let _ = match tag {
        ThreadTag::External => write!(handle, "[ext"),
        ThreadTag::Compute(n) => write!(handle, "[c{}", n),
        ThreadTag::Blocking(n) => write!(handle, "[b{}", n),
    };
    let _ = if exec != 0 {
        write!(handle, " e{}] ", exec)
    } else {
        write!(handle, "] ")
    };
}

#[doc(hidden)]
pub fn _kprintln_impl(args: std::fmt::Arguments<'_>) {
    let stderr = std::io::stderr();
    let mut handle = stderr.lock();
    let _ = handle.write_fmt(args);
    let _ = handle.write_all(b"\n");
    if flush_enabled() {
        let _ = handle.flush();
    }
}

#[doc(hidden)]
pub fn _klog_impl(level: LogLevel, args: std::fmt::Arguments<'_>) {
    if !level_enabled(level) {
        return;
    }
    let stderr = std::io::stderr();
    let mut handle = stderr.lock();
    let _ = write!(handle, "{} ", level.prefix());
    write_tag(&mut handle);
    let _ = handle.write_fmt(args);
    let _ = handle.write_all(b"\n");
    if flush_enabled() {
        let _ = handle.flush();
    }
}

// ============================================================================
// Public Macros
// ============================================================================

/// Print to stderr with newline
///
/// Like `eprintln!` but with optional auto-flush and mutex protection.
#[macro_export]
macro_rules! kprintln {
    () => {{
        $crate::kprint::_kprintln_impl(format_args!(""));
    }};
    ($($arg:tt)*) => {{
        $crate::kprint::_kprintln_impl(format_args!($($arg)*));
    }};
}

/// Error level log (always shown unless logging is off)
#[macro_export]
macro_rules! kerror {
    ($($arg:tt)*) => {{
        $crate::kprint::_klog_impl(
            $crate::kprint::LogLevel::Error,
            format_args!($($arg)*)
        );
    }};
}

#[macro_export]
macro_rules! kwarn {
    ($($arg:tt)*) => {{
        $crate::kprint::_klog_impl(
            $crate::kprint::LogLevel::Warn,
            format_args!($($arg)*)
        );
    }};
}

#[macro_export]
macro_rules! kinfo {
    ($($arg:tt)*) => {{
        $crate::kprint::_klog_impl(
            $crate::kprint::LogLevel::Info,
            format_args!($($arg)*)
        );
    }};
}

#[macro_export]
macro_rules! kdebug {
    ($($arg:tt)*) => {{
        $crate::kprint::_klog_impl(
            $crate::kprint::LogLevel::Debug,
            format_args!($($arg)*)
        );
    }};
}

/// Trace level log (most verbose)
#[macro_export]
macro_rules! ktrace {
    ($($arg:tt)*) => {{
        $crate::kprint::_klog_impl(
            $crate::kprint::LogLevel::Trace,
            format_args!($($arg)*)
        );
    }};
}

// ============================================================================
// Tests
// ============================================================================
