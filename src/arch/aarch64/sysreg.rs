// Copyright (c) 2023 Beihang University, Huawei Technologies Co.,Ltd. All rights reserved.
// Rust-Shyper is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! GICv3 system register cpu interface of the running core.

use cortex_a::registers::MPIDR_EL1;
use tock_registers::interfaces::Readable;

use super::gicv3::GicCpuInterface;

const ICC_SRE_SRE_BIT: u64 = 0x1;
const ICC_CTLR_EOIMODE_BIT: u64 = 0x1 << 1;
const ICC_IGRPEN1_EN_BIT: u64 = 0x1;
const MPIDR_AFF0_MSK: u64 = 0xff;

// MRS Xd, sysreg
macro_rules! mrs {
    ($reg: ident) => {{
        let r: u64;
        // SAFETY: reading a GIC system register has no side effect beyond
        // the architectural one of the register itself.
        unsafe {
            core::arch::asm!(concat!("mrs {0}, ", stringify!($reg)), out(reg) r, options(nomem, nostack));
        }
        r
    }};
}

// MSR sysreg, Xn
macro_rules! msr {
    ($reg: ident, $val: expr) => {{
        let v: u64 = $val;
        // SAFETY: the hypervisor runs at EL2 and owns the GIC cpu interface.
        unsafe {
            core::arch::asm!(concat!("msr ", stringify!($reg), ", {0}"), in(reg) v, options(nomem, nostack));
            core::arch::asm!("isb", options(nomem, nostack));
        }
    }};
}

macro_rules! lr_access {
    (read $idx: expr, $($n: literal => $reg: ident),*) => {
        match $idx {
            $($n => mrs!($reg),)*
            _ => 0,
        }
    };
    (write $idx: expr, $val: expr, $($n: literal => $reg: ident),*) => {
        match $idx {
            $($n => msr!($reg, $val),)*
            _ => {}
        }
    };
}

/// `cpu_affinity` maps logical cpu `n` to Aff1 = n / 16, Aff0 = n % 16 unless
/// the platform supplies its own table.
pub struct SysRegCpuInterface {
    affinity: Option<&'static [u64]>,
}

impl SysRegCpuInterface {
    pub const fn new(affinity: Option<&'static [u64]>) -> Self {
        Self { affinity }
    }
}

impl GicCpuInterface for SysRegCpuInterface {
    fn cpu_id(&self) -> usize {
        let mpidr = MPIDR_EL1.get();
        match self.affinity {
            Some(table) => table
                .iter()
                .position(|aff| *aff == mpidr & 0xff_00ff_ffff)
                .unwrap_or(0),
            None => (((mpidr >> 8) & 0xff) * 16 + (mpidr & MPIDR_AFF0_MSK)) as usize,
        }
    }

    fn cpu_affinity(&self, cpu: usize) -> u64 {
        match self.affinity.and_then(|table| table.get(cpu)) {
            Some(aff) => *aff,
            None => (((cpu / 16) << 8) | (cpu % 16)) as u64,
        }
    }

    fn init(&self) {
        msr!(ICC_SRE_EL2, mrs!(ICC_SRE_EL2) | ICC_SRE_SRE_BIT);
        msr!(ICC_PMR_EL1, 0xff);
        msr!(ICC_BPR1_EL1, 0);
        msr!(ICC_CTLR_EL1, ICC_CTLR_EOIMODE_BIT);
        msr!(ICC_IGRPEN1_EL1, ICC_IGRPEN1_EN_BIT);
    }

    fn ack(&self) -> u64 {
        mrs!(ICC_IAR1_EL1)
    }

    fn eoi(&self, raw: u64) {
        msr!(ICC_EOIR1_EL1, raw);
    }

    fn deactivate(&self, raw: u64) {
        msr!(ICC_DIR_EL1, raw);
    }

    fn send_sgi(&self, sgi1r: u64) {
        msr!(ICC_SGI1R_EL1, sgi1r);
    }

    fn hcr(&self) -> u64 {
        mrs!(ICH_HCR_EL2)
    }

    fn set_hcr(&self, hcr: u64) {
        msr!(ICH_HCR_EL2, hcr);
    }

    fn vtr(&self) -> u64 {
        mrs!(ICH_VTR_EL2)
    }

    fn lr(&self, idx: usize) -> u64 {
        lr_access!(read idx,
            0 => ICH_LR0_EL2, 1 => ICH_LR1_EL2, 2 => ICH_LR2_EL2, 3 => ICH_LR3_EL2,
            4 => ICH_LR4_EL2, 5 => ICH_LR5_EL2, 6 => ICH_LR6_EL2, 7 => ICH_LR7_EL2,
            8 => ICH_LR8_EL2, 9 => ICH_LR9_EL2, 10 => ICH_LR10_EL2, 11 => ICH_LR11_EL2,
            12 => ICH_LR12_EL2, 13 => ICH_LR13_EL2, 14 => ICH_LR14_EL2, 15 => ICH_LR15_EL2)
    }

    fn set_lr(&self, idx: usize, lr: u64) {
        lr_access!(write idx, lr,
            0 => ICH_LR0_EL2, 1 => ICH_LR1_EL2, 2 => ICH_LR2_EL2, 3 => ICH_LR3_EL2,
            4 => ICH_LR4_EL2, 5 => ICH_LR5_EL2, 6 => ICH_LR6_EL2, 7 => ICH_LR7_EL2,
            8 => ICH_LR8_EL2, 9 => ICH_LR9_EL2, 10 => ICH_LR10_EL2, 11 => ICH_LR11_EL2,
            12 => ICH_LR12_EL2, 13 => ICH_LR13_EL2, 14 => ICH_LR14_EL2, 15 => ICH_LR15_EL2)
    }
}
