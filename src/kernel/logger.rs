// Copyright (c) 2023 Beihang University, Huawei Technologies Co.,Ltd. All rights reserved.
// Rust-Shyper is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

use log::{Level, Metadata, Record};
use log::{LevelFilter, SetLoggerError};
use spin::Once;

struct VirqLogger;

static CPU_ID: Once<fn() -> usize> = Once::new();

fn level2color(level: Level) -> u8 {
    match level {
        Level::Error => 31, // 31 Red
        Level::Warn => 93,  // 93 BrightYellow
        Level::Info => 34,  // 34 Blue
        Level::Debug => 32, // 32 Green
        Level::Trace => 90, // 90 BrightBlack
    }
}

fn level2tag(level: Level) -> &'static str {
    match level {
        Level::Error => "[E]",
        Level::Warn => "[W]",
        Level::Info => "[I]",
        Level::Debug => "[D]",
        Level::Trace => "[T]",
    }
}

macro_rules! with_color {
    ($color: expr, $($arg:tt)*) => {
        format_args!("\u{1B}[{}m{}\u{1B}[0m", $color as u8, format_args!($($arg)*))
    };
}

impl log::Log for VirqLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let cpu = CPU_ID.get().map_or(0, |cpu_id| cpu_id());
            println!(
                "{}",
                with_color!(
                    level2color(record.level()),
                    "{}>[core {}, {}, {}:{}] {}",
                    level2tag(record.level()),
                    cpu,
                    record.target(),
                    record.file().unwrap_or("Unknown File"),
                    record.line().unwrap_or(0),
                    record.args()
                )
            );
        }
    }

    fn flush(&self) {}
}

static LOGGER: VirqLogger = VirqLogger;

/// Initialize the global logger.
///
/// `cpu_id` reports the physical cpu a record is emitted on, it is usually the
/// scheduler's `current_cpu`.
pub fn logger_init(level: LevelFilter, cpu_id: fn() -> usize) -> Result<(), SetLoggerError> {
    CPU_ID.call_once(|| cpu_id);
    log::set_logger(&LOGGER).map(|()| log::set_max_level(level))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_tags_and_colors() {
        assert_eq!(level2tag(Level::Warn), "[W]");
        assert_eq!(level2color(Level::Error), 31);
        assert_eq!(level2color(Level::Trace), 90);
    }
}
