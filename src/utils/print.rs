// Copyright (c) 2023 Beihang University, Huawei Technologies Co.,Ltd. All rights reserved.
// Rust-Shyper is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

use core::fmt::{Arguments, Write};
use spin::{Mutex, Once};

/// Console sink provided by the embedding hypervisor (usually the uart driver).
pub type ConsoleWrite = fn(&str);

pub struct Writer;

static WRITER: Mutex<Writer> = Mutex::new(Writer);
static CONSOLE: Once<ConsoleWrite> = Once::new();

impl Write for Writer {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        if let Some(putstr) = CONSOLE.get() {
            putstr(s);
        }
        Ok(())
    }
}

/// Register the console sink. Only the first registration takes effect.
pub fn set_console(putstr: ConsoleWrite) {
    CONSOLE.call_once(|| putstr);
}

/// Print a format string to the console.
pub fn _print(args: Arguments) {
    let mut lock = WRITER.lock();
    // Writer never fails, the console drops output until a sink is registered.
    let _ = lock.write_fmt(args);
}
