// Copyright (c) 2023 Beihang University, Huawei Technologies Co.,Ltd. All rights reserved.
// Rust-Shyper is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

use core::fmt::{Display, Formatter};
use core::ops::Range;

use crate::error::{Error, Result};
use crate::kernel::{VirqManager, Vm};

/// Emulated device of a vm, claiming a range of guest physical addresses.
pub trait EmuDev: Send + Sync {
    /// emulated device type
    fn emu_type(&self) -> EmuDeviceType;
    /// emulated device address range
    fn address_range(&self) -> Range<usize>;
    /// emulated device handler, `vcpu_id` is the trapping vcpu
    fn handler(&self, mgr: &VirqManager, vm: &Vm, vcpu_id: usize, emu_ctx: &mut EmuContext) -> Result<()>;
}

/// A trapped guest access, decoded by the stage-2 fault handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmuContext {
    pub address: usize,
    /// access size in bytes
    pub width: usize,
    pub write: bool,
    /// value written, or the value to return on a read
    pub val: usize,
}

impl EmuContext {
    pub fn read(address: usize, width: usize) -> Self {
        Self {
            address,
            width,
            write: false,
            val: 0,
        }
    }

    pub fn write(address: usize, width: usize, val: usize) -> Self {
        Self {
            address,
            width,
            write: true,
            val,
        }
    }

    /// Value of the access truncated to its width.
    pub fn val(&self) -> usize {
        match self.width {
            1 => self.val & 0xff,
            2 => self.val & 0xffff,
            4 => self.val & 0xffff_ffff,
            _ => self.val,
        }
    }

    /// Read as zero, writes ignored.
    pub fn razwi(&mut self) {
        if !self.write {
            self.val = 0;
        }
    }
}

/// Result of handing a trapped access to the interrupt subsystem.
#[derive(Debug)]
pub enum EmuOutcome {
    Handled,
    /// Not ours, or refused; the reason is turned into a guest fault.
    Unhandled(Error),
}

impl EmuOutcome {
    pub fn is_handled(&self) -> bool {
        matches!(self, EmuOutcome::Handled)
    }
}

/// Enumeration representing the type of emulator devices.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmuDeviceType {
    EmuDeviceTGicd = 1,
    EmuDeviceTGICR = 11,
}

impl Display for EmuDeviceType {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            EmuDeviceType::EmuDeviceTGicd => write!(f, "interrupt controller"),
            EmuDeviceType::EmuDeviceTGICR => write!(f, "interrupt controller gicr"),
        }
    }
}
