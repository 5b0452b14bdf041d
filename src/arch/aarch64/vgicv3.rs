// Copyright (c) 2023 Beihang University, Huawei Technologies Co.,Ltd. All rights reserved.
// Rust-Shyper is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! Guest view of a GICv3: the emulated distributor and redistributors.
//!
//! Registers only hold what the guest can not observe elsewhere (CTLR,
//! WAKER). Enable, pending, active, priority, trigger and routing state is
//! read from and written to the vm's descriptors and the vcpus' slot pools
//! through [`VirqManager`].

use alloc::vec::Vec;
use core::ops::Range;

use spin::Mutex;

use crate::arch::{IpiTarget, TriggerType};
use crate::device::{EmuContext, EmuDev, EmuDeviceType};
use crate::error::{ErrorKind, Result};
use crate::kernel::{VirqManager, Vm, VM_SPI_VIRQ_BASE};
use crate::utils::{bit_extract, bit_get};

use super::gic::{GICD_CTLR_ARE_NS_BIT, GICD_CTLR_ENGRP1A_BIT, GIC_PRIVINT_NUM, GIC_SGIS_NUM};
use super::gicv3::GICR_STRIDE;

pub const VGICD_SIZE: usize = 0x10000;

const VGIC_IIDR: usize = 0x43b;
/// ArchRev 3.
const VGIC_PIDR2: usize = 0x3 << 4;
const VGICD_TYPER_CPUNUM_OFF: usize = 5;
const VGICD_TYPER_CPUNUM_MAX: usize = 7;
const VGICD_TYPER_IDBITS_OFF: usize = 19;
const VGICD_TYPER_IDBITS: usize = 9;
const VGICR_TYPER_LAST_BIT: usize = 1 << 4;
const VGICR_TYPER_PROCNUM_OFF: usize = 8;
const VGICR_TYPER_AFF_OFF: usize = 32;
const VGICR_WAKER_PROCESSORSLEEP_BIT: usize = 1 << 1;
const VGICR_WAKER_CHILDRENASLEEP_BIT: usize = 1 << 2;

const VGICD_REG_OFFSET_CTLR: usize = 0x0;
const VGICD_REG_OFFSET_TYPER: usize = 0x4;
const VGICD_REG_OFFSET_IIDR: usize = 0x8;
const VGICD_REG_OFFSET_IGROUPR: Range<usize> = 0x80..0x100;
const VGICD_REG_OFFSET_ISENABLER: Range<usize> = 0x100..0x180;
const VGICD_REG_OFFSET_ICENABLER: Range<usize> = 0x180..0x200;
const VGICD_REG_OFFSET_ISPENDR: Range<usize> = 0x200..0x280;
const VGICD_REG_OFFSET_ICPENDR: Range<usize> = 0x280..0x300;
const VGICD_REG_OFFSET_ISACTIVER: Range<usize> = 0x300..0x380;
const VGICD_REG_OFFSET_ICACTIVER: Range<usize> = 0x380..0x400;
const VGICD_REG_OFFSET_IPRIORITYR: Range<usize> = 0x400..0x800;
const VGICD_REG_OFFSET_ICFGR: Range<usize> = 0xc00..0xd00;
const VGICD_REG_OFFSET_IROUTER: Range<usize> = 0x6000..0x8000;
const VGIC_REG_OFFSET_PIDR2: usize = 0xffe8;

const VGICR_REG_OFFSET_CLTR: usize = 0x0;
const VGICR_REG_OFFSET_IIDR: usize = 0x4;
const VGICR_REG_OFFSET_TYPER: usize = 0x8;
const VGICR_REG_OFFSET_TYPER_HI: usize = 0xc;
const VGICR_REG_OFFSET_WAKER: usize = 0x14;
const VGICR_REG_OFFSET_IGROUPR0: usize = 0x10080;
const VGICR_REG_OFFSET_ISENABLER0: usize = 0x10100;
const VGICR_REG_OFFSET_ICENABLER0: usize = 0x10180;
const VGICR_REG_OFFSET_ISPENDR0: usize = 0x10200;
const VGICR_REG_OFFSET_ICPENDR0: usize = 0x10280;
const VGICR_REG_OFFSET_ISACTIVER0: usize = 0x10300;
const VGICR_REG_OFFSET_ICACTIVER0: usize = 0x10380;
const VGICR_REG_OFFSET_IPRIORITYR: Range<usize> = 0x10400..0x10420;
const VGICR_REG_OFFSET_ICFGR: Range<usize> = 0x10c00..0x10c08;

/// Redistributor registers another vcpu may read.
const VGICR_FOREIGN_READABLE: [usize; 4] = [
    VGICR_REG_OFFSET_IIDR,
    VGICR_REG_OFFSET_TYPER,
    VGICR_REG_OFFSET_TYPER_HI,
    VGIC_REG_OFFSET_PIDR2,
];

const ICC_SGI1R_TARGETS_LEN: usize = 16;
const ICC_SGI1R_AFF1_OFF: usize = 16;
const ICC_SGI1R_INTID_OFF: usize = 24;
const ICC_SGI1R_IRM_OFF: usize = 40;

/// Affinity a guest sees for vcpu `vcpu_id`: Aff1 = id / 16, Aff0 = id % 16.
pub fn vgic_vcpu_affinity(vcpu_id: usize) -> usize {
    ((vcpu_id / 16) << 8) | (vcpu_id % 16)
}

fn vgic_affinity_to_vcpu(aff: usize) -> usize {
    bit_extract(aff, 8, 8) * 16 + bit_extract(aff, 0, 8)
}

/// Decode a guest `ICC_SGI1R_EL1` write of vcpu `sender` into the SGI number
/// and its vcpu targets.
pub fn vgic_sgi1r_decode(sender: usize, sgi1r: usize) -> (usize, IpiTarget) {
    let sgi = bit_extract(sgi1r, ICC_SGI1R_INTID_OFF, 4);
    if bit_get(sgi1r, ICC_SGI1R_IRM_OFF) != 0 {
        return (sgi, IpiTarget::AllButSelf);
    }
    let first = bit_extract(sgi1r, ICC_SGI1R_AFF1_OFF, 8) * 16;
    let list = bit_extract(sgi1r, 0, ICC_SGI1R_TARGETS_LEN);
    let mut mask = 0u64;
    for bit in 0..ICC_SGI1R_TARGETS_LEN {
        let vcpu = first + bit;
        if list & (1 << bit) != 0 && vcpu < u64::BITS as usize {
            mask |= 1 << vcpu;
        }
    }
    if mask == 1 << sender {
        return (sgi, IpiTarget::ToSelf);
    }
    (sgi, IpiTarget::Cpus(mask))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BitReg {
    Enable,
    Pending,
    Active,
}

/// Bitmask registers, one bit per number starting at `first`.
/// Writes take effect per set bit in ascending order.
fn emu_bitmap_access(
    mgr: &VirqManager,
    vm: &Vm,
    vcpu_id: usize,
    first: usize,
    reg: BitReg,
    set: bool,
    emu_ctx: &mut EmuContext,
) {
    let bits = emu_ctx.width * 8;
    if !emu_ctx.write {
        let mut val = 0;
        for bit in 0..bits {
            let vno = first + bit;
            let on = match reg {
                BitReg::Enable => mgr.desc(vm, vcpu_id, vno).is_ok_and(|d| d.enabled),
                BitReg::Pending => mgr.is_pending(vm, vcpu_id, vno),
                BitReg::Active => mgr.is_active(vm, vcpu_id, vno),
            };
            if on {
                val |= 1 << bit;
            }
        }
        emu_ctx.val = val;
        return;
    }

    let val = emu_ctx.val();
    for bit in 0..bits {
        if val & (1 << bit) == 0 {
            continue;
        }
        let vno = first + bit;
        let res = match (reg, set) {
            (BitReg::Enable, true) => mgr.enable(vm, vcpu_id, vno),
            (BitReg::Enable, false) => mgr.disable(vm, vcpu_id, vno),
            (BitReg::Pending, true) => mgr.pend(vm, vcpu_id, vno),
            (BitReg::Pending, false) => mgr.cancel_pending(vm, vcpu_id, vno),
            (BitReg::Active, false) => mgr.clear(vm, vcpu_id, vno),
            // setting the active state by hand is not supported
            (BitReg::Active, true) => {
                debug!("vgic: vm {} vcpu {} ISACTIVER virq {} ignored", vm.id(), vcpu_id, vno);
                Ok(())
            }
        };
        if let Err(err) = res {
            debug!("vgic: vm {} vcpu {} {:?} virq {}: {:?}", vm.id(), vcpu_id, reg, vno, err.kind());
        }
    }
}

/// One byte of priority per number.
fn emu_ipriorityr_access(mgr: &VirqManager, vm: &Vm, vcpu_id: usize, first: usize, emu_ctx: &mut EmuContext) {
    if !emu_ctx.write {
        let mut val = 0;
        for byte in 0..emu_ctx.width {
            if let Ok(desc) = mgr.desc(vm, vcpu_id, first + byte) {
                val |= (desc.priority as usize) << (byte * 8);
            }
        }
        emu_ctx.val = val;
        return;
    }
    let val = emu_ctx.val();
    for byte in 0..emu_ctx.width {
        let prio = bit_extract(val, byte * 8, 8) as u8;
        // out of range numbers are WI
        let _ = mgr.set_priority(vm, vcpu_id, first + byte, prio);
    }
}

/// Two config bits per number, bit 1 set for edge.
fn emu_icfgr_access(mgr: &VirqManager, vm: &Vm, vcpu_id: usize, first: usize, emu_ctx: &mut EmuContext) {
    let nums = emu_ctx.width * 4;
    if !emu_ctx.write {
        let mut val = 0;
        for i in 0..nums {
            if mgr
                .desc(vm, vcpu_id, first + i)
                .is_ok_and(|d| d.trigger == TriggerType::Edge)
            {
                val |= 0b10 << (i * 2);
            }
        }
        emu_ctx.val = val;
        return;
    }
    let val = emu_ctx.val();
    for i in 0..nums {
        let vno = first + i;
        if vno < GIC_SGIS_NUM {
            continue;
        }
        let trigger = if bit_get(val, i * 2 + 1) != 0 {
            TriggerType::Edge
        } else {
            TriggerType::Level
        };
        let _ = mgr.set_trigger_type(vm, vcpu_id, vno, trigger);
    }
}

/// Emulated distributor, shared by all vcpus of a vm.
pub struct Vgicd {
    address_range: Range<usize>,
    ctlr: Mutex<usize>,
}

impl Vgicd {
    pub fn new(base_ipa: usize) -> Self {
        Self {
            address_range: base_ipa..base_ipa + VGICD_SIZE,
            ctlr: Mutex::new(GICD_CTLR_ARE_NS_BIT as usize),
        }
    }

    fn emu_ctrl_access(&self, emu_ctx: &mut EmuContext) {
        let mut ctlr = self.ctlr.lock();
        if emu_ctx.write {
            // affinity routing can not be turned off
            *ctlr = (emu_ctx.val() & GICD_CTLR_ENGRP1A_BIT as usize) | GICD_CTLR_ARE_NS_BIT as usize;
        } else {
            emu_ctx.val = *ctlr;
        }
    }

    fn emu_typer_access(&self, vm: &Vm, emu_ctx: &mut EmuContext) {
        if emu_ctx.write {
            return;
        }
        let lines = (VM_SPI_VIRQ_BASE + vm.shared_nr()).div_ceil(32) - 1;
        let cpus = (vm.cpu_num() - 1).min(VGICD_TYPER_CPUNUM_MAX);
        emu_ctx.val = lines | (cpus << VGICD_TYPER_CPUNUM_OFF) | (VGICD_TYPER_IDBITS << VGICD_TYPER_IDBITS_OFF);
    }

    fn emu_irouter_access(&self, mgr: &VirqManager, vm: &Vm, offset: usize, emu_ctx: &mut EmuContext) {
        let vno = (offset - VGICD_REG_OFFSET_IROUTER.start) / 8;
        let high = offset % 8 != 0;
        if vno < GIC_PRIVINT_NUM {
            emu_ctx.razwi();
            return;
        }
        if !emu_ctx.write {
            emu_ctx.val = match mgr.desc(vm, 0, vno) {
                Ok(desc) if !high => vgic_vcpu_affinity(desc.affinity.vcpu_or(0)),
                _ => 0,
            };
            return;
        }
        if high {
            return;
        }
        let vcpu = vgic_affinity_to_vcpu(emu_ctx.val());
        if let Err(err) = mgr.set_route(vm, vno, vcpu) {
            debug!("vgicd: vm {} route virq {} to vcpu {}: {:?}", vm.id(), vno, vcpu, err.kind());
        }
    }
}

impl EmuDev for Vgicd {
    fn emu_type(&self) -> EmuDeviceType {
        EmuDeviceType::EmuDeviceTGicd
    }

    fn address_range(&self) -> Range<usize> {
        self.address_range.clone()
    }

    fn handler(&self, mgr: &VirqManager, vm: &Vm, vcpu_id: usize, emu_ctx: &mut EmuContext) -> Result<()> {
        let offset = emu_ctx.address - self.address_range.start;
        trace!(
            "vgicd: vm {} vcpu {} offset {:#x} write {} val {:#x}",
            vm.id(),
            vcpu_id,
            offset,
            emu_ctx.write,
            emu_ctx.val
        );

        // local numbers are banked in the redistributors
        let bit_bank = |range: &Range<usize>| {
            let first = (offset - range.start) * 8;
            (first >= GIC_PRIVINT_NUM).then_some(first)
        };

        match offset {
            VGICD_REG_OFFSET_CTLR => self.emu_ctrl_access(emu_ctx),
            VGICD_REG_OFFSET_TYPER => self.emu_typer_access(vm, emu_ctx),
            VGICD_REG_OFFSET_IIDR => {
                if !emu_ctx.write {
                    emu_ctx.val = VGIC_IIDR;
                }
            }
            VGIC_REG_OFFSET_PIDR2 => {
                if !emu_ctx.write {
                    emu_ctx.val = VGIC_PIDR2;
                }
            }
            _ if VGICD_REG_OFFSET_IGROUPR.contains(&offset) => {
                // every interrupt is group 1
                if !emu_ctx.write {
                    emu_ctx.val = if bit_bank(&VGICD_REG_OFFSET_IGROUPR).is_some() {
                        u32::MAX as usize
                    } else {
                        0
                    };
                }
            }
            _ if VGICD_REG_OFFSET_IPRIORITYR.contains(&offset) => {
                let first = offset - VGICD_REG_OFFSET_IPRIORITYR.start;
                if first >= GIC_PRIVINT_NUM {
                    emu_ipriorityr_access(mgr, vm, vcpu_id, first, emu_ctx);
                } else {
                    emu_ctx.razwi();
                }
            }
            _ if VGICD_REG_OFFSET_ICFGR.contains(&offset) => {
                let first = (offset - VGICD_REG_OFFSET_ICFGR.start) * 4;
                if first >= GIC_PRIVINT_NUM {
                    emu_icfgr_access(mgr, vm, vcpu_id, first, emu_ctx);
                } else {
                    emu_ctx.razwi();
                }
            }
            _ if VGICD_REG_OFFSET_IROUTER.contains(&offset) => self.emu_irouter_access(mgr, vm, offset, emu_ctx),
            _ => {
                let banks = [
                    (VGICD_REG_OFFSET_ISENABLER, BitReg::Enable, true),
                    (VGICD_REG_OFFSET_ICENABLER, BitReg::Enable, false),
                    (VGICD_REG_OFFSET_ISPENDR, BitReg::Pending, true),
                    (VGICD_REG_OFFSET_ICPENDR, BitReg::Pending, false),
                    (VGICD_REG_OFFSET_ISACTIVER, BitReg::Active, true),
                    (VGICD_REG_OFFSET_ICACTIVER, BitReg::Active, false),
                ];
                match banks.iter().find(|(range, _, _)| range.contains(&offset)) {
                    Some((range, reg, set)) => match bit_bank(range) {
                        Some(first) => emu_bitmap_access(mgr, vm, vcpu_id, first, *reg, *set, emu_ctx),
                        None => emu_ctx.razwi(),
                    },
                    None => emu_ctx.razwi(),
                }
            }
        }
        Ok(())
    }
}

/// Emulated redistributors, one RD + SGI frame pair per vcpu.
pub struct VgicRedis {
    address_range: Range<usize>,
    waker: Mutex<Vec<usize>>,
}

impl VgicRedis {
    pub fn new(base_ipa: usize, vcpu_num: usize) -> Self {
        Self {
            address_range: base_ipa..base_ipa + vcpu_num * GICR_STRIDE,
            waker: Mutex::new(vec![VGICR_WAKER_PROCESSORSLEEP_BIT | VGICR_WAKER_CHILDRENASLEEP_BIT; vcpu_num]),
        }
    }

    fn vgicr_emul_typer_access(&self, vm: &Vm, vgicr_id: usize, high: bool, emu_ctx: &mut EmuContext) {
        if emu_ctx.write {
            return;
        }
        let mut typer = (vgic_vcpu_affinity(vgicr_id) << VGICR_TYPER_AFF_OFF) | (vgicr_id << VGICR_TYPER_PROCNUM_OFF);
        if vgicr_id + 1 == vm.cpu_num() {
            typer |= VGICR_TYPER_LAST_BIT;
        }
        emu_ctx.val = match (high, emu_ctx.width) {
            (true, _) => typer >> 32,
            (false, 8) => typer,
            (false, _) => typer & 0xffff_ffff,
        };
    }

    fn vgicr_emul_waker_access(&self, vgicr_id: usize, emu_ctx: &mut EmuContext) {
        let mut waker = self.waker.lock();
        let Some(reg) = waker.get_mut(vgicr_id) else {
            emu_ctx.razwi();
            return;
        };
        if emu_ctx.write {
            // ChildrenAsleep follows ProcessorSleep immediately
            let sleep = emu_ctx.val() & VGICR_WAKER_PROCESSORSLEEP_BIT;
            *reg = if sleep != 0 {
                VGICR_WAKER_PROCESSORSLEEP_BIT | VGICR_WAKER_CHILDRENASLEEP_BIT
            } else {
                0
            };
        } else {
            emu_ctx.val = *reg;
        }
    }
}

impl EmuDev for VgicRedis {
    fn emu_type(&self) -> EmuDeviceType {
        EmuDeviceType::EmuDeviceTGICR
    }

    fn address_range(&self) -> Range<usize> {
        self.address_range.clone()
    }

    fn handler(&self, mgr: &VirqManager, vm: &Vm, vcpu_id: usize, emu_ctx: &mut EmuContext) -> Result<()> {
        let rel = emu_ctx.address - self.address_range.start;
        let vgicr_id = rel / GICR_STRIDE;
        let offset = rel % GICR_STRIDE;
        trace!(
            "vgicr: vm {} vcpu {} gicr {} offset {:#x} write {} val {:#x}",
            vm.id(),
            vcpu_id,
            vgicr_id,
            offset,
            emu_ctx.write,
            emu_ctx.val
        );

        if vgicr_id != vcpu_id && (emu_ctx.write || !VGICR_FOREIGN_READABLE.contains(&offset)) {
            warn!(
                "vgicr: vm {} vcpu {} {} gicr {} offset {:#x} denied",
                vm.id(),
                vcpu_id,
                if emu_ctx.write { "write to" } else { "read of" },
                vgicr_id,
                offset
            );
            return ErrorKind::AccessDenied.into();
        }

        match offset {
            VGICR_REG_OFFSET_CLTR => emu_ctx.razwi(),
            VGICR_REG_OFFSET_IIDR => {
                if !emu_ctx.write {
                    emu_ctx.val = VGIC_IIDR;
                }
            }
            VGICR_REG_OFFSET_TYPER => self.vgicr_emul_typer_access(vm, vgicr_id, false, emu_ctx),
            VGICR_REG_OFFSET_TYPER_HI => self.vgicr_emul_typer_access(vm, vgicr_id, true, emu_ctx),
            VGICR_REG_OFFSET_WAKER => self.vgicr_emul_waker_access(vgicr_id, emu_ctx),
            VGIC_REG_OFFSET_PIDR2 => {
                if !emu_ctx.write {
                    emu_ctx.val = VGIC_PIDR2;
                }
            }
            VGICR_REG_OFFSET_IGROUPR0 => {
                if !emu_ctx.write {
                    emu_ctx.val = u32::MAX as usize;
                }
            }
            VGICR_REG_OFFSET_ISENABLER0 => emu_bitmap_access(mgr, vm, vgicr_id, 0, BitReg::Enable, true, emu_ctx),
            VGICR_REG_OFFSET_ICENABLER0 => emu_bitmap_access(mgr, vm, vgicr_id, 0, BitReg::Enable, false, emu_ctx),
            VGICR_REG_OFFSET_ISPENDR0 => emu_bitmap_access(mgr, vm, vgicr_id, 0, BitReg::Pending, true, emu_ctx),
            VGICR_REG_OFFSET_ICPENDR0 => emu_bitmap_access(mgr, vm, vgicr_id, 0, BitReg::Pending, false, emu_ctx),
            VGICR_REG_OFFSET_ISACTIVER0 => emu_bitmap_access(mgr, vm, vgicr_id, 0, BitReg::Active, true, emu_ctx),
            VGICR_REG_OFFSET_ICACTIVER0 => emu_bitmap_access(mgr, vm, vgicr_id, 0, BitReg::Active, false, emu_ctx),
            _ if VGICR_REG_OFFSET_IPRIORITYR.contains(&offset) => {
                let first = offset - VGICR_REG_OFFSET_IPRIORITYR.start;
                emu_ipriorityr_access(mgr, vm, vgicr_id, first, emu_ctx);
            }
            _ if VGICR_REG_OFFSET_ICFGR.contains(&offset) => {
                let first = (offset - VGICR_REG_OFFSET_ICFGR.start) * 4;
                emu_icfgr_access(mgr, vm, vgicr_id, first, emu_ctx);
            }
            _ => emu_ctx.razwi(),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use alloc::sync::Arc;

    use super::*;
    use crate::config::{VmIntcConfig, QEMU_GICD_BASE, QEMU_GICR_BASE};
    use crate::device::EmuOutcome;
    use crate::kernel::mock::{MockIntc, MockSched};
    use crate::kernel::VirqState;

    const GICD: usize = QEMU_GICD_BASE;
    const GICR: usize = QEMU_GICR_BASE;

    fn setup() -> (VirqManager, Arc<Vm>) {
        let intc = Arc::new(MockIntc::new(4));
        let sched = Arc::new(MockSched::default());
        let mgr = VirqManager::new(intc, sched).unwrap();
        let vm = mgr
            .create_descriptor_store(&VmIntcConfig {
                vm_id: 1,
                vcpu_affinity: vec![0, 1],
                spi_nr: 32,
                virtual_nr: 0,
                slot_nr: 4,
                ..Default::default()
            })
            .unwrap();
        (mgr, vm)
    }

    fn read(mgr: &VirqManager, vm: &Vm, vcpu: usize, address: usize) -> core::result::Result<usize, ErrorKind> {
        let mut ctx = EmuContext::read(address, 4);
        match mgr.emu_handler(vm, vcpu, &mut ctx) {
            EmuOutcome::Handled => Ok(ctx.val),
            EmuOutcome::Unhandled(err) => Err(err.kind()),
        }
    }

    fn write(mgr: &VirqManager, vm: &Vm, vcpu: usize, address: usize, val: usize) -> core::result::Result<(), ErrorKind> {
        let mut ctx = EmuContext::write(address, 4, val);
        match mgr.emu_handler(vm, vcpu, &mut ctx) {
            EmuOutcome::Handled => Ok(()),
            EmuOutcome::Unhandled(err) => Err(err.kind()),
        }
    }

    #[test]
    fn distributor_identification() {
        let (mgr, vm) = setup();
        // 64 numbers -> ITLinesNumber 1, two vcpus -> CPUNumber 1
        assert_eq!(read(&mgr, &vm, 0, GICD + 0x4).unwrap(), 1 | (1 << 5) | (9 << 19));
        assert_eq!(read(&mgr, &vm, 0, GICD + 0x8).unwrap(), 0x43b);
        assert_eq!(read(&mgr, &vm, 1, GICD + 0xffe8).unwrap(), 0x30);
        write(&mgr, &vm, 0, GICD, 0x3).unwrap();
        assert_eq!(read(&mgr, &vm, 0, GICD).unwrap(), 0x12);
    }

    #[test]
    fn enable_writes_decompose_per_number() {
        let (mgr, vm) = setup();
        write(&mgr, &vm, 0, GICD + 0x104, (1 << 8) | (1 << 3)).unwrap();
        assert!(mgr.desc(&vm, 0, 35).unwrap().enabled);
        assert!(mgr.desc(&vm, 0, 40).unwrap().enabled);
        assert!(!mgr.desc(&vm, 0, 36).unwrap().enabled);
        assert_eq!(read(&mgr, &vm, 1, GICD + 0x104).unwrap(), (1 << 8) | (1 << 3));

        write(&mgr, &vm, 0, GICD + 0x184, 1 << 3).unwrap();
        assert_eq!(read(&mgr, &vm, 0, GICD + 0x104).unwrap(), 1 << 8);
        // local numbers are RAZ/WI in the distributor
        write(&mgr, &vm, 0, GICD + 0x100, u32::MAX as usize).unwrap();
        assert_eq!(read(&mgr, &vm, 0, GICD + 0x100).unwrap(), 0);
    }

    #[test]
    fn pending_and_priority_registers() {
        let (mgr, vm) = setup();
        write(&mgr, &vm, 0, GICD + 0x104, 1 << 8).unwrap();
        write(&mgr, &vm, 0, GICD + 0x204, 1 << 8).unwrap();
        assert_eq!(vm.vcpu(0).unwrap().virq().state(40), VirqState::Pending);
        assert_eq!(read(&mgr, &vm, 0, GICD + 0x204).unwrap(), 1 << 8);
        write(&mgr, &vm, 0, GICD + 0x284, 1 << 8).unwrap();
        assert_eq!(vm.vcpu(0).unwrap().virq().state(40), VirqState::Inactive);

        let mut ctx = EmuContext::write(GICD + 0x400 + 41, 1, 0x20);
        assert!(mgr.emu_handler(&vm, 0, &mut ctx).is_handled());
        assert_eq!(mgr.desc(&vm, 0, 41).unwrap().priority, 0x20);
        assert_eq!(read(&mgr, &vm, 0, GICD + 0x400 + 40).unwrap(), 0xa0a0_20a0);
    }

    #[test]
    fn active_set_writes_are_ignored() {
        let (mgr, vm) = setup();
        write(&mgr, &vm, 0, GICD + 0x104, 1 << 8).unwrap();
        write(&mgr, &vm, 0, GICD + 0x304, 1 << 8).unwrap();
        assert_eq!(vm.vcpu(0).unwrap().virq().state(40), VirqState::Inactive);
        assert_eq!(read(&mgr, &vm, 0, GICD + 0x304).unwrap(), 0);
    }

    #[test]
    fn router_and_config() {
        let (mgr, vm) = setup();
        let mut ctx = EmuContext::write(GICD + 0x6000 + 40 * 8, 8, 1);
        assert!(mgr.emu_handler(&vm, 0, &mut ctx).is_handled());
        assert_eq!(mgr.desc(&vm, 0, 40).unwrap().affinity.vcpu_or(0), 1);
        let mut ctx = EmuContext::read(GICD + 0x6000 + 40 * 8, 8);
        assert!(mgr.emu_handler(&vm, 0, &mut ctx).is_handled());
        assert_eq!(ctx.val, 1);

        // numbers 32..47 sit in ICFGR2
        write(&mgr, &vm, 0, GICD + 0xc08, 0b10 << 16).unwrap();
        assert_eq!(mgr.desc(&vm, 0, 40).unwrap().trigger, TriggerType::Edge);
        assert_eq!(read(&mgr, &vm, 0, GICD + 0xc08).unwrap(), 0b10 << 16);
    }

    #[test]
    fn redistributor_isolation() {
        let (mgr, vm) = setup();
        let gicr0 = GICR;
        assert_eq!(
            write(&mgr, &vm, 1, gicr0 + 0x10100, 1 << 27),
            Err(ErrorKind::AccessDenied)
        );
        assert_eq!(read(&mgr, &vm, 1, gicr0 + 0x10100), Err(ErrorKind::AccessDenied));
        assert_eq!(write(&mgr, &vm, 1, gicr0 + 0x8, 0), Err(ErrorKind::AccessDenied));
        assert!(!mgr.desc(&vm, 0, 27).unwrap().enabled);

        assert_eq!(read(&mgr, &vm, 1, gicr0 + 0x8).unwrap(), 0);
        assert_eq!(read(&mgr, &vm, 1, gicr0 + 0xc).unwrap(), 0);
        assert_eq!(read(&mgr, &vm, 1, gicr0 + 0x4).unwrap(), 0x43b);
        assert_eq!(read(&mgr, &vm, 1, gicr0 + 0xffe8).unwrap(), 0x30);

        let gicr1 = GICR + GICR_STRIDE;
        assert_eq!(read(&mgr, &vm, 0, gicr1 + 0x8).unwrap(), (1 << 8) | (1 << 4));
        assert_eq!(read(&mgr, &vm, 0, gicr1 + 0xc).unwrap(), 1);
    }

    #[test]
    fn redistributor_banks_are_per_vcpu() {
        let (mgr, vm) = setup();
        let gicr1 = GICR + GICR_STRIDE;
        write(&mgr, &vm, 1, gicr1 + 0x10100, 1 << 27).unwrap();
        assert!(mgr.desc(&vm, 1, 27).unwrap().enabled);
        assert!(!mgr.desc(&vm, 0, 27).unwrap().enabled);
        // SGIs are always enabled
        assert_eq!(read(&mgr, &vm, 1, gicr1 + 0x10100).unwrap(), 0xffff | (1 << 27));
        assert_eq!(read(&mgr, &vm, 1, gicr1 + 0x10c00).unwrap(), 0xaaaa_aaaa);

        write(&mgr, &vm, 1, gicr1 + 0x14, 0).unwrap();
        assert_eq!(read(&mgr, &vm, 1, gicr1 + 0x14).unwrap(), 0);
    }

    #[test]
    fn outside_accesses_are_unhandled() {
        let (mgr, vm) = setup();
        assert_eq!(read(&mgr, &vm, 0, GICD - 4), Err(ErrorKind::Unhandled));
        assert_eq!(read(&mgr, &vm, 0, GICR + 2 * GICR_STRIDE), Err(ErrorKind::Unhandled));
    }

    #[test]
    fn sgi1r_decoding() {
        assert_eq!(vgic_sgi1r_decode(0, (3 << 24) | 0b110), (3, IpiTarget::Cpus(0b110)));
        assert_eq!(vgic_sgi1r_decode(1, (1 << 24) | 0b10), (1, IpiTarget::ToSelf));
        assert_eq!(vgic_sgi1r_decode(0, (5 << 24) | (1 << 16) | 1), (5, IpiTarget::Cpus(1 << 16)));
        assert_eq!(vgic_sgi1r_decode(0, (1 << 40) | (2 << 24)), (2, IpiTarget::AllButSelf));
    }
}
