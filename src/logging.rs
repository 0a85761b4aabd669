//! 로깅 시스템
//!
//! 이 모듈은 커널 전역 로깅 시스템을 제공합니다.
//! 로그는 시리얼 포트로 출력되고, 최근 항목은 인메모리 링에 보관됩니다.

use core::fmt;
use spin::Mutex;

/// 로그 레벨
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// 에러 레벨 (항상 출력)
    Error = 0,
    /// 경고 레벨
    Warn = 1,
    /// 정보 레벨
    Info = 2,
    /// 디버그 레벨
    Debug = 3,
    /// 트레이스 레벨 (가장 상세)
    Trace = 4,
}

/// 현재 로그 레벨 (컴파일 타임에 설정 가능)
pub const LOG_LEVEL: LogLevel = LogLevel::Debug;

const RING_CAPACITY: usize = 256;
const MAX_LOG_LINE_LEN: usize = 128;

/// 구조화된 로그 엔트리
#[derive(Clone, Copy)]
struct LogEntry {
    timestamp_ms: u64,
    level: LogLevel,
    message: [u8; MAX_LOG_LINE_LEN],
    message_len: usize,
}

impl LogEntry {
    const fn new() -> Self {
        Self {
            timestamp_ms: 0,
            level: LogLevel::Info,
            message: [0; MAX_LOG_LINE_LEN],
            message_len: 0,
        }
    }

    fn set(&mut self, timestamp_ms: u64, level: LogLevel, msg: &str) {
        self.timestamp_ms = timestamp_ms;
        self.level = level;
        self.message_len = msg.len().min(MAX_LOG_LINE_LEN - 1);
        self.message[..self.message_len].copy_from_slice(&msg.as_bytes()[..self.message_len]);
        self.message[self.message_len] = 0;
    }

    fn get_message(&self) -> &str {
        core::str::from_utf8(&self.message[..self.message_len]).unwrap_or("")
    }
}

struct LogRing {
    entries: [LogEntry; RING_CAPACITY],
    head: usize,
    count: usize,
}

impl LogRing {
    const fn new() -> Self {
        Self {
            entries: [LogEntry::new(); RING_CAPACITY],
            head: 0,
            count: 0,
        }
    }

    fn push(&mut self, timestamp_ms: u64, level: LogLevel, msg: &str) {
        self.entries[self.head].set(timestamp_ms, level, msg);
        self.head = (self.head + 1) % RING_CAPACITY;
        if self.count < RING_CAPACITY {
            self.count += 1;
        }
    }

    fn for_each<F: FnMut(&LogEntry)>(&self, mut f: F) {
        let start = if self.count == RING_CAPACITY { self.head } else { 0 };
        for i in 0..self.count {
            let idx = (start + i) % RING_CAPACITY;
            f(&self.entries[idx]);
        }
    }
}

static LOG_RING: Mutex<LogRing> = Mutex::new(LogRing::new());

/// 로그 출력 함수
pub fn log(level: LogLevel, args: fmt::Arguments) {
    if level <= LOG_LEVEL {
        let prefix = match level {
            LogLevel::Error => "[ERROR]",
            LogLevel::Warn => "[WARN] ",
            LogLevel::Info => "[INFO] ",
            LogLevel::Debug => "[DEBUG]",
            LogLevel::Trace => "[TRACE]",
        };

        let timestamp_ms = crate::drivers::timer::get_milliseconds();

        // 메시지를 문자열로 포맷팅 (임시 버퍼 사용)
        let mut buf = [0u8; MAX_LOG_LINE_LEN];
        let mut log_buf = LogBuffer { buf: &mut buf, pos: 0 };
        let fmt_result = core::fmt::Write::write_fmt(&mut log_buf, args);
        let msg_len = log_buf.pos.min(MAX_LOG_LINE_LEN - 1);

        crate::serial_print!("{} ", prefix);
        crate::serial_print!("{}\n", args);

        // 로그 버퍼에 저장 (포맷팅 성공 시에만)
        if fmt_result.is_ok() && msg_len > 0 {
            let msg_str = core::str::from_utf8(&buf[..msg_len]).unwrap_or("");
            LOG_RING.lock().push(timestamp_ms, level, msg_str);
        } else {
            LOG_RING.lock().push(timestamp_ms, level, prefix);
        }
    }
}

/// 임시 로그 버퍼 (포맷팅용)
struct LogBuffer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> core::fmt::Write for LogBuffer<'a> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let bytes = s.as_bytes();
        let remaining = self.buf.len().saturating_sub(self.pos);
        let to_write = bytes.len().min(remaining.saturating_sub(1));
        if to_write > 0 {
            self.buf[self.pos..self.pos + to_write].copy_from_slice(&bytes[..to_write]);
            self.pos += to_write;
        }
        Ok(())
    }
}

/// 최근 로그 덤프 (패닉 핸들러와 디버깅에서 사용)
pub fn dump_recent() {
    crate::serial_println!("\n--- Recent Logs ---");
    LOG_RING.lock().for_each(|entry| {
        let level_str = match entry.level {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN ",
            LogLevel::Info => "INFO ",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        };
        crate::serial_println!("[{}ms] [{}] {}", entry.timestamp_ms, level_str, entry.get_message());
    });
    crate::serial_println!("--- End Logs ---\n");
}

#[cfg(test)]
pub(crate) fn recent_contains(needle: &str) -> bool {
    let mut found = false;
    LOG_RING.lock().for_each(|entry| {
        if entry.get_message().contains(needle) {
            found = true;
        }
    });
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn formatted_message_lands_in_ring() {
        crate::log_info!("ring checkpoint {}", 0xBEEFu32);
        assert!(recent_contains("ring checkpoint 48879"));
    }

    #[test_case]
    fn oversized_message_is_clipped() {
        // 한 줄 상한보다 긴 메시지도 링에 들어가되 잘린다
        let long = "x".repeat(MAX_LOG_LINE_LEN * 2);
        log(LogLevel::Warn, format_args!("{}", long));
        assert!(recent_contains(&"x".repeat(MAX_LOG_LINE_LEN - 1)));
    }
}

/// 에러 레벨 로그 매크로
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::logging::log($crate::logging::LogLevel::Error, format_args!($($arg)*));
    };
}

/// 경고 레벨 로그 매크로
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logging::log($crate::logging::LogLevel::Warn, format_args!($($arg)*));
    };
}

/// 정보 레벨 로그 매크로
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logging::log($crate::logging::LogLevel::Info, format_args!($($arg)*));
    };
}

/// 디버그 레벨 로그 매크로
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::logging::log($crate::logging::LogLevel::Debug, format_args!($($arg)*));
    };
}

/// 트레이스 레벨 로그 매크로
#[macro_export]
macro_rules! log_trace {
    ($($arg:tt)*) => {
        $crate::logging::log($crate::logging::LogLevel::Trace, format_args!($($arg)*));
    };
}
