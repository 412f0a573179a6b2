// SPDX-License-Identifier: MIT

use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Quiet,
    Normal,
}

static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Normal as u8);

pub fn set_log_level(level: LogLevel) {
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

pub fn log_level() -> LogLevel {
    match LOG_LEVEL.load(Ordering::Relaxed) {
        0 => LogLevel::Quiet,
        _ => LogLevel::Normal,
    }
}

#[macro_export]
macro_rules! log_step {
    ($($arg:tt)*) => {
        if $crate::log::log_level() != $crate::log::LogLevel::Quiet {
            println!("[sofsmkfs] {}", format_args!($($arg)*));
        }
    };
}
