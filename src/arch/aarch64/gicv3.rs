// Copyright (c) 2023 Beihang University, Huawei Technologies Co.,Ltd. All rights reserved.
// Rust-Shyper is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! GICv3 driver: memory mapped distributor and redistributors, system
//! register cpu interface with 64-bit `ICH_LR<n>_EL2` list registers.

use alloc::boxed::Box;
use alloc::vec::Vec;

use spin::Mutex;
use tock_registers::interfaces::{Readable, Writeable};
use tock_registers::register_structs;
use tock_registers::registers::{ReadOnly, ReadWrite};

use crate::arch::{InterruptController, IpiTarget, IrqAck, ListRegister, TriggerType};
use crate::config::GicDesc;
use crate::error::{ErrorKind, Result};
use crate::kernel::VIRQ_PRIORITY_DEFAULT;
use crate::utils::{bit_extract, bit_insert, MmioBlock};

use super::gic::*;

/// Redistributor frames of one cpu: RD_base followed by SGI_base.
pub const GICR_STRIDE: usize = 0x20000;

const GICR_WAKER_PROCESSORSLEEP_BIT: u32 = 0x1 << 1;
const GICR_WAKER_CHILDRENASLEEP_BIT: u32 = 0x1 << 2;

const ICC_IAR_ID_LEN: usize = 24;
const ICH_VTR_LISTREGS_MSK: u64 = 0x1f;
const ICH_HCR_EN_BIT: u64 = 0x1;
const ICH_HCR_UIE_BIT: u64 = 0x1 << 1;

const ICC_SGI1R_TARGETS_OFF: usize = 0;
const ICC_SGI1R_AFF1_OFF: usize = 16;
const ICC_SGI1R_INTID_OFF: usize = 24;
const ICC_SGI1R_AFF2_OFF: usize = 32;
const ICC_SGI1R_IRM_BIT: u64 = 0x1 << 40;
const ICC_SGI1R_AFF3_OFF: usize = 48;

/// Aff3.Aff2.Aff1.Aff0 bits of an MPIDR value.
const MPIDR_AFF_MSK: u64 = 0xff_00ff_ffff;
/// Polling bound for RWP and ChildrenAsleep.
const GIC_POLL_MAX: usize = 0x10000;

register_structs! {
    #[allow(non_snake_case)]
    pub GicDistributorBlock {
        (0x0000 => CTLR: ReadWrite<u32>),
        (0x0004 => TYPER: ReadOnly<u32>),
        (0x0008 => IIDR: ReadOnly<u32>),
        (0x000c => reserved0),
        (0x0080 => IGROUPR: [ReadWrite<u32>; GIC_INT_REGS_NUM]),
        (0x0100 => ISENABLER: [ReadWrite<u32>; GIC_INT_REGS_NUM]),
        (0x0180 => ICENABLER: [ReadWrite<u32>; GIC_INT_REGS_NUM]),
        (0x0200 => ISPENDR: [ReadWrite<u32>; GIC_INT_REGS_NUM]),
        (0x0280 => ICPENDR: [ReadWrite<u32>; GIC_INT_REGS_NUM]),
        (0x0300 => ISACTIVER: [ReadWrite<u32>; GIC_INT_REGS_NUM]),
        (0x0380 => ICACTIVER: [ReadWrite<u32>; GIC_INT_REGS_NUM]),
        (0x0400 => IPRIORITYR: [ReadWrite<u32>; GIC_PRIO_REGS_NUM]),
        (0x0800 => reserved1),
        (0x0c00 => ICFGR: [ReadWrite<u32>; GIC_CONFIG_REGS_NUM]),
        (0x0d00 => IGRPMODR: [ReadWrite<u32>; GIC_INT_REGS_NUM]),
        (0x0d80 => reserved2),
        (0x6000 => IROUTER: [ReadWrite<u64>; GIC_INTS_MAX]),
        (0x8000 => reserved3),
        (0xffe8 => PIDR2: ReadOnly<u32>),
        (0xffec => reserved4),
        (0x10000 => @END),
    }
}

register_structs! {
    #[allow(non_snake_case)]
    pub GicRedistributorBlock {
        (0x0000 => CTLR: ReadWrite<u32>),
        (0x0004 => IIDR: ReadOnly<u32>),
        (0x0008 => TYPER: ReadOnly<u64>),
        (0x0010 => STATUSR: ReadWrite<u32>),
        (0x0014 => WAKER: ReadWrite<u32>),
        (0x0018 => reserved0),
        (0xffe8 => PIDR2: ReadOnly<u32>),
        (0xffec => reserved1),
        (0x10080 => IGROUPR0: ReadWrite<u32>), // SGI_base frame, all below
        (0x10084 => reserved2),
        (0x10100 => ISENABLER0: ReadWrite<u32>),
        (0x10104 => reserved3),
        (0x10180 => ICENABLER0: ReadWrite<u32>),
        (0x10184 => reserved4),
        (0x10200 => ISPENDR0: ReadWrite<u32>),
        (0x10204 => reserved5),
        (0x10280 => ICPENDR0: ReadWrite<u32>),
        (0x10284 => reserved6),
        (0x10300 => ISACTIVER0: ReadWrite<u32>),
        (0x10304 => reserved7),
        (0x10380 => ICACTIVER0: ReadWrite<u32>),
        (0x10384 => reserved8),
        (0x10400 => IPRIORITYR: [ReadWrite<u32>; 8]),
        (0x10420 => reserved9),
        (0x10c00 => ICFGR: [ReadWrite<u32>; 2]),
        (0x10c08 => reserved10),
        (0x10d00 => IGRPMODR0: ReadWrite<u32>),
        (0x10d04 => reserved11),
        (0x20000 => @END),
    }
}

/// System register half of a GICv3 cpu interface, as seen by the cpu running
/// the driver code.
pub trait GicCpuInterface: Send + Sync {
    /// Physical id of the calling cpu.
    fn cpu_id(&self) -> usize;
    /// MPIDR affinity of physical cpu `cpu`.
    fn cpu_affinity(&self, cpu: usize) -> u64;
    /// Enable the system register interface: split EOI, group 1, virtual interface on.
    fn init(&self);
    /// `ICC_IAR1_EL1`
    fn ack(&self) -> u64;
    /// `ICC_EOIR1_EL1`
    fn eoi(&self, raw: u64);
    /// `ICC_DIR_EL1`
    fn deactivate(&self, raw: u64);
    /// `ICC_SGI1R_EL1`
    fn send_sgi(&self, sgi1r: u64);
    /// `ICH_HCR_EL2`
    fn hcr(&self) -> u64;
    fn set_hcr(&self, hcr: u64);
    /// `ICH_VTR_EL2`
    fn vtr(&self) -> u64;
    /// `ICH_LR<idx>_EL2`
    fn lr(&self, idx: usize) -> u64;
    fn set_lr(&self, idx: usize, lr: u64);
}

pub struct GicV3 {
    gicd: MmioBlock<GicDistributorBlock>,
    gicr: Vec<MmioBlock<GicRedistributorBlock>>,
    cpuif: Box<dyn GicCpuInterface>,
    maintenance_int_id: usize,
    /// Serializes distributor and redistributor read-modify-write sequences.
    lock: Mutex<()>,
}

impl GicV3 {
    /// Map the controller described by `desc` with `cpu_num` redistributors.
    ///
    /// # Safety
    ///
    /// `gicd_addr` must be the mapped distributor and `gicr_addr` the first of
    /// `cpu_num` contiguous 128KiB redistributor frames.
    pub unsafe fn new(desc: &GicDesc, cpu_num: usize, cpuif: Box<dyn GicCpuInterface>) -> Result<GicV3> {
        if cpu_num == 0 {
            return ErrorKind::InvalidParam.into();
        }
        let gicd = MmioBlock::new(desc.gicd_addr).ok_or(ErrorKind::InvalidParam)?;
        let mut gicr = Vec::with_capacity(cpu_num);
        for cpu in 0..cpu_num {
            gicr.push(MmioBlock::new(desc.gicr_addr + cpu * GICR_STRIDE).ok_or(ErrorKind::InvalidParam)?);
        }
        Ok(GicV3 {
            gicd,
            gicr,
            cpuif,
            maintenance_int_id: desc.maintenance_int_id,
            lock: Mutex::new(()),
        })
    }

    fn local_gicr(&self) -> &GicRedistributorBlock {
        let cpu = self.cpuif.cpu_id();
        match self.gicr.get(cpu) {
            Some(gicr) => gicr,
            None => {
                error!("gicv3: no redistributor for cpu {}", cpu);
                &self.gicr[0]
            }
        }
    }

    fn wait_rwp(&self) {
        for _ in 0..GIC_POLL_MAX {
            if self.gicd.CTLR.get() & GICD_CTLR_RWP_BIT == 0 {
                return;
            }
            core::hint::spin_loop();
        }
        warn!("gicv3: distributor RWP timeout");
    }

    fn sgi1r(&self, affinity: u64, targets: u64, sgi: usize) -> u64 {
        let aff = affinity as usize;
        ((bit_extract(aff, 32, 8) as u64) << ICC_SGI1R_AFF3_OFF)
            | ((bit_extract(aff, 16, 8) as u64) << ICC_SGI1R_AFF2_OFF)
            | ((bit_extract(aff, 8, 8) as u64) << ICC_SGI1R_AFF1_OFF)
            | (((sgi & 0xf) as u64) << ICC_SGI1R_INTID_OFF)
            | (targets << ICC_SGI1R_TARGETS_OFF)
    }

    fn send_sgi_to(&self, cpu: usize, sgi: usize) {
        let affinity = self.cpuif.cpu_affinity(cpu) & MPIDR_AFF_MSK;
        let aff0 = affinity & 0xff;
        if aff0 >= 16 {
            warn!("gicv3: cpu {} aff0 {} out of SGI target list", cpu, aff0);
            return;
        }
        self.cpuif.send_sgi(self.sgi1r(affinity, 1 << aff0, sgi));
    }
}

impl InterruptController for GicV3 {
    fn init(&self) {
        let _lock = self.lock.lock();
        let int_num = self.nr_irqs();

        self.gicd.CTLR.set(0);
        self.wait_rwp();
        for i in GIC_PRIVINT_NUM / 32..int_num.div_ceil(32) {
            self.gicd.IGROUPR[i].set(u32::MAX);
            self.gicd.ICENABLER[i].set(u32::MAX);
            self.gicd.ICPENDR[i].set(u32::MAX);
            self.gicd.ICACTIVER[i].set(u32::MAX);
        }
        let boot_affinity = self.cpuif.cpu_affinity(self.cpuif.cpu_id()) & MPIDR_AFF_MSK;
        for int_id in GIC_PRIVINT_NUM..int_num {
            let reg = &self.gicd.IPRIORITYR[gic_prio_reg(int_id)];
            reg.set(bit_insert(
                reg.get() as usize,
                gic_prio_off(int_id),
                GIC_PRIO_BITS,
                VIRQ_PRIORITY_DEFAULT as usize,
            ) as u32);
            self.gicd.IROUTER[int_id].set(boot_affinity);
        }
        self.gicd.CTLR.set(GICD_CTLR_ARE_NS_BIT | GICD_CTLR_ENGRP1A_BIT);
        self.wait_rwp();
        info!("gicv3: distributor init, {} interrupts", int_num);
    }

    fn init_cpu(&self) {
        {
            let _lock = self.lock.lock();
            let gicr = self.local_gicr();
            gicr.WAKER.set(gicr.WAKER.get() & !GICR_WAKER_PROCESSORSLEEP_BIT);
            let mut polls = 0;
            while gicr.WAKER.get() & GICR_WAKER_CHILDRENASLEEP_BIT != 0 && polls < GIC_POLL_MAX {
                core::hint::spin_loop();
                polls += 1;
            }

            gicr.IGROUPR0.set(u32::MAX);
            gicr.ICENABLER0.set(u32::MAX);
            gicr.ICPENDR0.set(u32::MAX);
            gicr.ICACTIVER0.set(u32::MAX);
            let prio = VIRQ_PRIORITY_DEFAULT as u32;
            for reg in gicr.IPRIORITYR.iter() {
                reg.set(prio | prio << 8 | prio << 16 | prio << 24);
            }
        }

        self.cpuif.init();
        for i in 0..self.nr_lrs() {
            self.cpuif.set_lr(i, 0);
        }
        self.cpuif.set_hcr(self.cpuif.hcr() | ICH_HCR_EN_BIT);
    }

    fn nr_irqs(&self) -> usize {
        let lines = (self.gicd.TYPER.get() & GICD_TYPER_ITLINESNUM_MSK) as usize + 1;
        (lines * 32).min(GIC_SPECIAL_INTID)
    }

    fn maintenance_irq(&self) -> usize {
        self.maintenance_int_id
    }

    fn mask(&self, int_id: usize) {
        let _lock = self.lock.lock();
        if gic_is_priv(int_id) {
            self.local_gicr().ICENABLER0.set(1 << int_id);
        } else {
            self.gicd.ICENABLER[int_id / 32].set(1 << (int_id % 32));
        }
    }

    fn unmask(&self, int_id: usize) {
        let _lock = self.lock.lock();
        if gic_is_priv(int_id) {
            self.local_gicr().ISENABLER0.set(1 << int_id);
        } else {
            self.gicd.ISENABLER[int_id / 32].set(1 << (int_id % 32));
        }
    }

    fn set_type(&self, int_id: usize, trigger: TriggerType) {
        if gic_is_sgi(int_id) {
            return;
        }
        let cfg = match trigger {
            TriggerType::Level => 0,
            TriggerType::Edge => ICFGR_EDGE_BIT as usize,
        };
        let _lock = self.lock.lock();
        let reg = if gic_is_priv(int_id) {
            &self.local_gicr().ICFGR[gic_cfg_reg(int_id)]
        } else {
            &self.gicd.ICFGR[gic_cfg_reg(int_id)]
        };
        reg.set(bit_insert(reg.get() as usize, gic_cfg_off(int_id), GIC_CONFIG_BITS, cfg) as u32);
    }

    fn set_priority(&self, int_id: usize, priority: u8) {
        let _lock = self.lock.lock();
        let reg = if gic_is_priv(int_id) {
            &self.local_gicr().IPRIORITYR[gic_prio_reg(int_id)]
        } else {
            &self.gicd.IPRIORITYR[gic_prio_reg(int_id)]
        };
        reg.set(bit_insert(reg.get() as usize, gic_prio_off(int_id), GIC_PRIO_BITS, priority as usize) as u32);
    }

    fn set_affinity(&self, int_id: usize, cpu: usize) {
        if gic_is_priv(int_id) {
            return;
        }
        let affinity = self.cpuif.cpu_affinity(cpu) & MPIDR_AFF_MSK;
        let _lock = self.lock.lock();
        self.gicd.IROUTER[int_id].set(affinity);
    }

    fn send_ipi(&self, target: IpiTarget, sgi: usize) {
        match target {
            IpiTarget::AllButSelf => {
                self.cpuif
                    .send_sgi(ICC_SGI1R_IRM_BIT | (((sgi & 0xf) as u64) << ICC_SGI1R_INTID_OFF));
            }
            IpiTarget::ToSelf => self.send_sgi_to(self.cpuif.cpu_id(), sgi),
            IpiTarget::Cpus(mask) => {
                for cpu in 0..u64::BITS as usize {
                    if mask & (1 << cpu) != 0 {
                        self.send_sgi_to(cpu, sgi);
                    }
                }
            }
        }
    }

    fn read_pending(&self, int_id: usize) -> bool {
        if gic_is_priv(int_id) {
            self.local_gicr().ISPENDR0.get() & (1 << int_id) != 0
        } else {
            self.gicd.ISPENDR[int_id / 32].get() & (1 << (int_id % 32)) != 0
        }
    }

    fn fetch(&self) -> Option<IrqAck> {
        let raw = self.cpuif.ack() as usize;
        let int_id = bit_extract(raw, 0, ICC_IAR_ID_LEN);
        if (GIC_SPECIAL_INTID..GIC_INTS_MAX).contains(&int_id) {
            return None;
        }
        Some(IrqAck { int_id, raw })
    }

    fn eoi(&self, ack: IrqAck) {
        self.cpuif.eoi(ack.raw as u64);
    }

    fn deactivate(&self, ack: IrqAck) {
        self.cpuif.deactivate(ack.raw as u64);
    }

    fn nr_lrs(&self) -> usize {
        ((self.cpuif.vtr() & ICH_VTR_LISTREGS_MSK) as usize + 1).min(GIC_LIST_REGS_NUM)
    }

    fn read_lr(&self, idx: usize) -> ListRegister {
        ListRegister::from_gicv3(self.cpuif.lr(idx))
    }

    fn write_lr(&self, idx: usize, lr: ListRegister) {
        self.cpuif.set_lr(idx, lr.to_gicv3());
    }

    fn set_underflow_irq(&self, enable: bool) {
        let hcr = self.cpuif.hcr();
        if enable {
            self.cpuif.set_hcr(hcr | ICH_HCR_UIE_BIT);
        } else {
            self.cpuif.set_hcr(hcr & !ICH_HCR_UIE_BIT);
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::sync::Arc;
    use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    use super::*;
    use crate::arch::LrState;

    #[derive(Default)]
    struct ShadowCpuIf {
        cpu: AtomicUsize,
        iar: AtomicU64,
        eoir: AtomicU64,
        dir: AtomicU64,
        hcr: AtomicU64,
        lrs: Mutex<[u64; 4]>,
        sgis: Mutex<Vec<u64>>,
    }

    struct CpuIfRef(Arc<ShadowCpuIf>);

    impl GicCpuInterface for CpuIfRef {
        fn cpu_id(&self) -> usize {
            self.0.cpu.load(Ordering::Relaxed)
        }
        // two clusters of two cpus
        fn cpu_affinity(&self, cpu: usize) -> u64 {
            (((cpu / 2) << 8) | (cpu % 2)) as u64
        }
        fn init(&self) {}
        fn ack(&self) -> u64 {
            self.0.iar.load(Ordering::Relaxed)
        }
        fn eoi(&self, raw: u64) {
            self.0.eoir.store(raw, Ordering::Relaxed);
        }
        fn deactivate(&self, raw: u64) {
            self.0.dir.store(raw, Ordering::Relaxed);
        }
        fn send_sgi(&self, sgi1r: u64) {
            self.0.sgis.lock().push(sgi1r);
        }
        fn hcr(&self) -> u64 {
            self.0.hcr.load(Ordering::Relaxed)
        }
        fn set_hcr(&self, hcr: u64) {
            self.0.hcr.store(hcr, Ordering::Relaxed);
        }
        fn vtr(&self) -> u64 {
            3
        }
        fn lr(&self, idx: usize) -> u64 {
            self.0.lrs.lock()[idx]
        }
        fn set_lr(&self, idx: usize, lr: u64) {
            self.0.lrs.lock()[idx] = lr;
        }
    }

    struct Regs {
        gicd: *mut u32,
        gicr: *mut u32,
        cpuif: Arc<ShadowCpuIf>,
    }

    fn alloc_bytes(bytes: usize) -> *mut u32 {
        Vec::leak(vec![0u64; bytes / 8]).as_mut_ptr() as *mut u32
    }

    fn peek(base: *mut u32, offset: usize) -> u32 {
        // SAFETY: test buffers cover every offset used below.
        unsafe { base.add(offset / 4).read_volatile() }
    }

    fn peek64(base: *mut u32, offset: usize) -> u64 {
        // SAFETY: as above, offsets are 8-byte aligned.
        unsafe { (base as *mut u64).add(offset / 8).read_volatile() }
    }

    fn poke(base: *mut u32, offset: usize, val: u32) {
        // SAFETY: as above.
        unsafe { base.add(offset / 4).write_volatile(val) }
    }

    fn gic() -> (GicV3, Regs) {
        let regs = Regs {
            gicd: alloc_bytes(0x10000),
            gicr: alloc_bytes(2 * GICR_STRIDE),
            cpuif: Arc::new(ShadowCpuIf::default()),
        };
        poke(regs.gicd, 0x4, 1);
        let desc = GicDesc {
            compatible: "arm,gic-v3",
            gicd_addr: regs.gicd as usize,
            gicr_addr: regs.gicr as usize,
            maintenance_int_id: 25,
            ..Default::default()
        };
        // SAFETY: the buffers are leaked and sized for one distributor and two redistributors.
        let gic = unsafe { GicV3::new(&desc, 2, Box::new(CpuIfRef(regs.cpuif.clone()))) }.unwrap();
        (gic, regs)
    }

    #[test]
    fn private_interrupts_go_to_the_local_redistributor() {
        let (gic, regs) = gic();
        regs.cpuif.cpu.store(1, Ordering::Relaxed);
        gic.unmask(27);
        assert_eq!(peek(regs.gicr, GICR_STRIDE + 0x10100), 1 << 27);
        assert_eq!(peek(regs.gicr, 0x10100), 0);
        gic.mask(27);
        assert_eq!(peek(regs.gicr, GICR_STRIDE + 0x10180), 1 << 27);

        gic.set_priority(27, 0x40);
        assert_eq!(peek(regs.gicr, GICR_STRIDE + 0x10400 + 24), 0x40 << 24);
        gic.set_type(27, TriggerType::Edge);
        assert_eq!(peek(regs.gicr, GICR_STRIDE + 0x10c04), 0b10 << 22);
    }

    #[test]
    fn shared_interrupts_go_to_the_distributor() {
        let (gic, regs) = gic();
        gic.unmask(55);
        assert_eq!(peek(regs.gicd, 0x104), 1 << 23);
        gic.set_affinity(55, 3);
        assert_eq!(peek64(regs.gicd, 0x6000 + 55 * 8), (1 << 8) | 1);
        // affinity of local interrupts is fixed
        gic.set_affinity(20, 3);
        assert_eq!(peek64(regs.gicd, 0x6000 + 20 * 8), 0);
    }

    #[test]
    fn sgi_routing() {
        let (gic, regs) = gic();
        gic.send_ipi(IpiTarget::Cpus(0b1010), 2);
        gic.send_ipi(IpiTarget::AllButSelf, 3);
        let sgis = regs.cpuif.sgis.lock().clone();
        assert_eq!(sgis.len(), 3);
        // cpu 1: aff1 0, aff0 1
        assert_eq!(sgis[0], (2 << 24) | 0b10);
        // cpu 3: aff1 1, aff0 1
        assert_eq!(sgis[1], (1 << 16) | (2 << 24) | 0b10);
        assert_eq!(sgis[2], (1 << 40) | (3 << 24));
    }

    #[test]
    fn acknowledge_special_ids() {
        let (gic, regs) = gic();
        regs.cpuif.iar.store(1023, Ordering::Relaxed);
        assert!(gic.fetch().is_none());
        regs.cpuif.iar.store(55, Ordering::Relaxed);
        let ack = gic.fetch().unwrap();
        assert_eq!(ack.int_id, 55);
        gic.eoi(ack);
        gic.deactivate(ack);
        assert_eq!(regs.cpuif.eoir.load(Ordering::Relaxed), 55);
        assert_eq!(regs.cpuif.dir.load(Ordering::Relaxed), 55);
    }

    #[test]
    fn list_registers() {
        let (gic, regs) = gic();
        assert_eq!(gic.nr_lrs(), 4);
        let lr = ListRegister {
            vintid: 40,
            priority: 0xa0,
            group1: true,
            state: LrState::Pending,
            ..ListRegister::EMPTY
        };
        gic.write_lr(3, lr);
        assert_eq!(regs.cpuif.lrs.lock()[3], lr.to_gicv3());
        assert_eq!(gic.read_lr(3), lr);

        gic.init_cpu();
        assert_eq!(regs.cpuif.lrs.lock()[3], 0);
        assert_eq!(regs.cpuif.hcr.load(Ordering::Relaxed), ICH_HCR_EN_BIT);
        gic.set_underflow_irq(true);
        assert_eq!(regs.cpuif.hcr.load(Ordering::Relaxed), ICH_HCR_EN_BIT | ICH_HCR_UIE_BIT);
    }

    #[test]
    fn distributor_init() {
        let (gic, regs) = gic();
        gic.init();
        assert_eq!(peek(regs.gicd, 0), GICD_CTLR_ARE_NS_BIT | GICD_CTLR_ENGRP1A_BIT);
        assert_eq!(peek(regs.gicd, 0x400 + 40), 0xa0a0_a0a0);
        assert_eq!(peek(regs.gicd, 0x84), u32::MAX);
    }
}
