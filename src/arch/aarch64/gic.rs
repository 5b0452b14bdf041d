// Copyright (c) 2023 Beihang University, Huawei Technologies Co.,Ltd. All rights reserved.
// Rust-Shyper is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! Definitions shared by the GICv2 and GICv3 drivers.

use tock_registers::register_bitfields;
use tock_registers::LocalRegisterCopy;

use crate::arch::{ListRegister, LrState};

pub const GIC_SGIS_NUM: usize = 16;
pub const GIC_PPIS_NUM: usize = 16;
pub const GIC_PRIVINT_NUM: usize = GIC_SGIS_NUM + GIC_PPIS_NUM;
/// First special interrupt id, 1020..1024 are never real interrupts.
pub const GIC_SPECIAL_INTID: usize = 1020;
pub const GIC_INTS_MAX: usize = 1024;
pub const GIC_PRIO_BITS: usize = 8;
pub const GIC_CONFIG_BITS: usize = 2;
/// Upper bound of list registers any implementation may report.
pub const GIC_LIST_REGS_NUM: usize = 64;

pub const GIC_INT_REGS_NUM: usize = GIC_INTS_MAX / 32;
pub const GIC_PRIO_REGS_NUM: usize = GIC_INTS_MAX * GIC_PRIO_BITS / 32;
pub const GIC_TARGET_REGS_NUM: usize = GIC_INTS_MAX * 8 / 32;
pub const GIC_CONFIG_REGS_NUM: usize = GIC_INTS_MAX * GIC_CONFIG_BITS / 32;

pub const GICD_CTLR_EN_BIT: u32 = 0x1;
pub const GICD_CTLR_ENGRP1A_BIT: u32 = 0x2;
pub const GICD_CTLR_ARE_NS_BIT: u32 = 0x1 << 4;
pub const GICD_CTLR_RWP_BIT: u32 = 0x1 << 31;
pub const GICD_TYPER_ITLINESNUM_MSK: u32 = 0b11111;

pub const GICH_HCR_EN_BIT: u32 = 0x1;
pub const GICH_HCR_UIE_BIT: u32 = 0x1 << 1;

pub const ICFGR_EDGE_BIT: u32 = 0b10;

#[inline]
pub fn gic_is_sgi(int_id: usize) -> bool {
    int_id < GIC_SGIS_NUM
}

#[inline]
pub fn gic_is_priv(int_id: usize) -> bool {
    int_id < GIC_PRIVINT_NUM
}

#[inline]
pub fn gic_prio_reg(int_id: usize) -> usize {
    int_id * GIC_PRIO_BITS / 32
}

#[inline]
pub fn gic_prio_off(int_id: usize) -> usize {
    int_id * GIC_PRIO_BITS % 32
}

#[inline]
pub fn gic_cfg_reg(int_id: usize) -> usize {
    int_id * GIC_CONFIG_BITS / 32
}

#[inline]
pub fn gic_cfg_off(int_id: usize) -> usize {
    int_id * GIC_CONFIG_BITS % 32
}

register_bitfields! {u32,
    pub GICH_LR [
        VIRTUALID OFFSET(0) NUMBITS(10) [],
        PHYSICALID OFFSET(10) NUMBITS(10) [],
        CPUID OFFSET(10) NUMBITS(3) [],
        PRIORITY OFFSET(23) NUMBITS(5) [],
        STATE OFFSET(28) NUMBITS(2) [],
        GRP1 OFFSET(30) NUMBITS(1) [],
        HW OFFSET(31) NUMBITS(1) []
    ]
}

register_bitfields! {u64,
    pub ICH_LR_EL2 [
        VINTID OFFSET(0) NUMBITS(32) [],
        PINTID OFFSET(32) NUMBITS(13) [],
        PRIORITY OFFSET(48) NUMBITS(8) [],
        GROUP OFFSET(60) NUMBITS(1) [],
        HW OFFSET(61) NUMBITS(1) [],
        STATE OFFSET(62) NUMBITS(2) []
    ]
}

impl ListRegister {
    /// Encode for `GICH_LR<n>`. The 5-bit priority keeps the upper bits.
    pub fn to_gicv2(&self) -> u32 {
        let mut lr = LocalRegisterCopy::<u32, GICH_LR::Register>::new(0);
        let id_field = if self.hw {
            GICH_LR::PHYSICALID.val(self.pintid as u32)
        } else {
            GICH_LR::CPUID.val(self.source as u32)
        };
        lr.write(
            GICH_LR::VIRTUALID.val(self.vintid as u32)
                + id_field
                + GICH_LR::PRIORITY.val((self.priority >> 3) as u32)
                + GICH_LR::STATE.val(self.state as u32)
                + GICH_LR::GRP1.val(self.group1 as u32)
                + GICH_LR::HW.val(self.hw as u32),
        );
        lr.get()
    }

    pub fn from_gicv2(value: u32) -> ListRegister {
        let lr = LocalRegisterCopy::<u32, GICH_LR::Register>::new(value);
        let hw = lr.is_set(GICH_LR::HW);
        ListRegister {
            vintid: lr.read(GICH_LR::VIRTUALID) as usize,
            pintid: if hw { lr.read(GICH_LR::PHYSICALID) as usize } else { 0 },
            priority: (lr.read(GICH_LR::PRIORITY) << 3) as u8,
            hw,
            group1: lr.is_set(GICH_LR::GRP1),
            state: LrState::from_bits(lr.read(GICH_LR::STATE) as usize),
            source: if hw { 0 } else { lr.read(GICH_LR::CPUID) as usize },
        }
    }

    /// Encode for `ICH_LR<n>_EL2`.
    pub fn to_gicv3(&self) -> u64 {
        let mut lr = LocalRegisterCopy::<u64, ICH_LR_EL2::Register>::new(0);
        lr.write(
            ICH_LR_EL2::VINTID.val(self.vintid as u64)
                + ICH_LR_EL2::PINTID.val(if self.hw { self.pintid as u64 } else { 0 })
                + ICH_LR_EL2::PRIORITY.val(self.priority as u64)
                + ICH_LR_EL2::GROUP.val(self.group1 as u64)
                + ICH_LR_EL2::HW.val(self.hw as u64)
                + ICH_LR_EL2::STATE.val(self.state as u64),
        );
        lr.get()
    }

    pub fn from_gicv3(value: u64) -> ListRegister {
        let lr = LocalRegisterCopy::<u64, ICH_LR_EL2::Register>::new(value);
        let hw = lr.is_set(ICH_LR_EL2::HW);
        ListRegister {
            vintid: lr.read(ICH_LR_EL2::VINTID) as usize,
            pintid: if hw { lr.read(ICH_LR_EL2::PINTID) as usize } else { 0 },
            priority: lr.read(ICH_LR_EL2::PRIORITY) as u8,
            hw,
            group1: lr.is_set(ICH_LR_EL2::GROUP),
            state: LrState::from_bits(lr.read(ICH_LR_EL2::STATE) as usize),
            source: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gicv2_lr_layout() {
        let lr = ListRegister {
            vintid: 40,
            pintid: 55,
            priority: 0xa0,
            hw: true,
            group1: true,
            state: LrState::Pending,
            source: 0,
        };
        let raw = lr.to_gicv2();
        assert_eq!(raw & 0x3ff, 40);
        assert_eq!((raw >> 10) & 0x3ff, 55);
        assert_eq!((raw >> 23) & 0x1f, 0xa0 >> 3);
        assert_eq!((raw >> 28) & 0x3, 1);
        assert_eq!(raw >> 30, 0b11);
        assert_eq!(ListRegister::from_gicv2(raw), lr);
    }

    #[test]
    fn gicv2_sgi_carries_source() {
        let lr = ListRegister {
            vintid: 3,
            source: 5,
            state: LrState::Active,
            ..ListRegister::EMPTY
        };
        let raw = lr.to_gicv2();
        assert_eq!((raw >> 10) & 0x7, 5);
        assert_eq!(ListRegister::from_gicv2(raw).source, 5);
    }

    #[test]
    fn gicv3_lr_layout() {
        let lr = ListRegister {
            vintid: 40,
            pintid: 0,
            priority: 0xa0,
            hw: false,
            group1: true,
            state: LrState::Pending,
            source: 0,
        };
        let raw = lr.to_gicv3();
        assert_eq!(raw & 0xffff_ffff, 40);
        assert_eq!((raw >> 48) & 0xff, 0xa0);
        assert_eq!((raw >> 60) & 1, 1);
        assert_eq!(raw >> 62, 1);
        assert_eq!(ListRegister::from_gicv3(raw), lr);
        assert_eq!(ListRegister::from_gicv3(0).state, LrState::Inactive);
    }
}
