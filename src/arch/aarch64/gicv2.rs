// Copyright (c) 2023 Beihang University, Huawei Technologies Co.,Ltd. All rights reserved.
// Rust-Shyper is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! GICv2 driver: memory mapped distributor, cpu interface and virtual
//! interface control (GICH) with 32-bit list registers.

use spin::Mutex;
use tock_registers::interfaces::{Readable, Writeable};
use tock_registers::register_structs;
use tock_registers::registers::{ReadOnly, ReadWrite, WriteOnly};

use crate::arch::{InterruptController, IpiTarget, IrqAck, ListRegister, TriggerType};
use crate::config::GicDesc;
use crate::error::{ErrorKind, Result};
use crate::utils::{bit_insert, MmioBlock};
use crate::kernel::VIRQ_PRIORITY_DEFAULT;

use super::gic::*;

const GICC_CTLR_EN_BIT: u32 = 0x1;
const GICC_CTLR_EOIMODENS_BIT: u32 = 0x1 << 9;
const GICC_IAR_ID_MSK: u32 = 0x3ff;
const GICH_VTR_LISTREGS_MSK: u32 = 0x3f;

const GICD_SGIR_TARGET_LIST: u32 = 0;
const GICD_SGIR_ALL_BUT_SELF: u32 = 1;
const GICD_SGIR_SELF: u32 = 2;
const GICD_SGIR_FILTER_OFF: u32 = 24;
const GICD_SGIR_TARGETS_OFF: u32 = 16;
/// GICv2 addresses at most eight cpus.
const GICV2_CPU_MAX: usize = 8;

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
        (0x0800 => ITARGETSR: [ReadWrite<u32>; GIC_TARGET_REGS_NUM]),
        (0x0c00 => ICFGR: [ReadWrite<u32>; GIC_CONFIG_REGS_NUM]),
        (0x0d00 => reserved1),
        (0x0f00 => SGIR: WriteOnly<u32>),
        (0x0f04 => reserved2),
        (0x0f10 => CPENDSGIR: [ReadWrite<u32>; 4]),
        (0x0f20 => SPENDSGIR: [ReadWrite<u32>; 4]),
        (0x0f30 => reserved3),
        (0x1000 => @END),
    }
}

register_structs! {
    #[allow(non_snake_case)]
    pub GicCpuInterfaceBlock {
        (0x0000 => CTLR: ReadWrite<u32>),
        (0x0004 => PMR: ReadWrite<u32>),
        (0x0008 => BPR: ReadWrite<u32>),
        (0x000c => IAR: ReadOnly<u32>),
        (0x0010 => EOIR: WriteOnly<u32>),
        (0x0014 => RPR: ReadOnly<u32>),
        (0x0018 => HPPIR: ReadOnly<u32>),
        (0x001c => reserved0),
        (0x1000 => DIR: WriteOnly<u32>),
        (0x1004 => reserved1),
        (0x2000 => @END),
    }
}

register_structs! {
    #[allow(non_snake_case)]
    pub GicHypervisorInterfaceBlock {
        (0x0000 => HCR: ReadWrite<u32>),
        (0x0004 => VTR: ReadOnly<u32>),
        (0x0008 => VMCR: ReadWrite<u32>),
        (0x000c => reserved0),
        (0x0010 => MISR: ReadOnly<u32>),
        (0x0014 => reserved1),
        (0x0020 => EISR: [ReadOnly<u32>; 2]),
        (0x0028 => reserved2),
        (0x0030 => ELRSR: [ReadOnly<u32>; 2]),
        (0x0038 => reserved3),
        (0x00f0 => APR: ReadWrite<u32>),
        (0x00f4 => reserved4),
        (0x0100 => LR: [ReadWrite<u32>; GIC_LIST_REGS_NUM]),
        (0x0200 => @END),
    }
}

pub struct GicV2 {
    gicd: MmioBlock<GicDistributorBlock>,
    gicc: MmioBlock<GicCpuInterfaceBlock>,
    gich: MmioBlock<GicHypervisorInterfaceBlock>,
    maintenance_int_id: usize,
    /// Serializes distributor read-modify-write sequences.
    lock: Mutex<()>,
}

impl GicV2 {
    /// Map the controller described by `desc`.
    ///
    /// # Safety
    ///
    /// `gicd_addr`, `gicc_addr` and `gich_addr` must be the mapped bases of the
    /// GICv2 distributor, cpu interface and virtual interface control blocks.
    pub unsafe fn new(desc: &GicDesc) -> Result<GicV2> {
        let gicd = MmioBlock::new(desc.gicd_addr).ok_or(ErrorKind::InvalidParam)?;
        let gicc = MmioBlock::new(desc.gicc_addr).ok_or(ErrorKind::InvalidParam)?;
        let gich = MmioBlock::new(desc.gich_addr).ok_or(ErrorKind::InvalidParam)?;
        Ok(GicV2 {
            gicd,
            gicc,
            gich,
            maintenance_int_id: desc.maintenance_int_id,
            lock: Mutex::new(()),
        })
    }

    fn set_prio_locked(&self, int_id: usize, prio: u8) {
        let reg = &self.gicd.IPRIORITYR[gic_prio_reg(int_id)];
        let value = bit_insert(reg.get() as usize, gic_prio_off(int_id), GIC_PRIO_BITS, prio as usize);
        reg.set(value as u32);
    }
}

impl InterruptController for GicV2 {
    fn init(&self) {
        let _lock = self.lock.lock();
        let int_num = self.nr_irqs();

        self.gicd.CTLR.set(0);
        for i in GIC_PRIVINT_NUM / 32..int_num.div_ceil(32) {
            self.gicd.ICENABLER[i].set(u32::MAX);
            self.gicd.ICPENDR[i].set(u32::MAX);
            self.gicd.ICACTIVER[i].set(u32::MAX);
        }
        for int_id in GIC_PRIVINT_NUM..int_num {
            self.set_prio_locked(int_id, VIRQ_PRIORITY_DEFAULT);
        }
        for i in GIC_PRIVINT_NUM / 4..int_num.div_ceil(4) {
            self.gicd.ITARGETSR[i].set(0);
        }
        self.gicd.CTLR.set(GICD_CTLR_EN_BIT);
        info!("gicv2: distributor init, {} interrupts", int_num);
    }

    fn init_cpu(&self) {
        {
            let _lock = self.lock.lock();
            // banked private interrupts
            self.gicd.ICENABLER[0].set(u32::MAX);
            self.gicd.ICPENDR[0].set(u32::MAX);
            self.gicd.ICACTIVER[0].set(u32::MAX);
            for i in 0..4 {
                self.gicd.CPENDSGIR[i].set(u32::MAX);
            }
            for int_id in 0..GIC_PRIVINT_NUM {
                self.set_prio_locked(int_id, VIRQ_PRIORITY_DEFAULT);
            }
        }

        for i in 0..self.nr_lrs() {
            self.gich.LR[i].set(0);
        }
        self.gicc.PMR.set(0xff);
        self.gicc.CTLR.set(GICC_CTLR_EN_BIT | GICC_CTLR_EOIMODENS_BIT);
        self.gich.HCR.set(GICH_HCR_EN_BIT);
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
        self.gicd.ICENABLER[int_id / 32].set(1 << (int_id % 32));
    }

    fn unmask(&self, int_id: usize) {
        let _lock = self.lock.lock();
        self.gicd.ISENABLER[int_id / 32].set(1 << (int_id % 32));
    }

    fn set_type(&self, int_id: usize, trigger: TriggerType) {
        // SGI configuration is read-only
        if gic_is_sgi(int_id) {
            return;
        }
        let _lock = self.lock.lock();
        let reg = &self.gicd.ICFGR[gic_cfg_reg(int_id)];
        let cfg = match trigger {
            TriggerType::Level => 0,
            TriggerType::Edge => ICFGR_EDGE_BIT as usize,
        };
        reg.set(bit_insert(reg.get() as usize, gic_cfg_off(int_id), GIC_CONFIG_BITS, cfg) as u32);
    }

    fn set_priority(&self, int_id: usize, priority: u8) {
        let _lock = self.lock.lock();
        self.set_prio_locked(int_id, priority);
    }

    fn set_affinity(&self, int_id: usize, cpu: usize) {
        if gic_is_priv(int_id) || cpu >= GICV2_CPU_MAX {
            return;
        }
        let _lock = self.lock.lock();
        let reg = &self.gicd.ITARGETSR[int_id / 4];
        reg.set(bit_insert(reg.get() as usize, (int_id % 4) * 8, 8, 1 << cpu) as u32);
    }

    fn send_ipi(&self, target: IpiTarget, sgi: usize) {
        let (filter, targets) = match target {
            IpiTarget::ToSelf => (GICD_SGIR_SELF, 0),
            IpiTarget::AllButSelf => (GICD_SGIR_ALL_BUT_SELF, 0),
            IpiTarget::Cpus(mask) => (GICD_SGIR_TARGET_LIST, (mask & 0xff) as u32),
        };
        let _lock = self.lock.lock();
        self.gicd.SGIR.set(
            (filter << GICD_SGIR_FILTER_OFF) | (targets << GICD_SGIR_TARGETS_OFF) | (sgi as u32 & 0xf),
        );
    }

    fn read_pending(&self, int_id: usize) -> bool {
        self.gicd.ISPENDR[int_id / 32].get() & (1 << (int_id % 32)) != 0
    }

    fn fetch(&self) -> Option<IrqAck> {
        let raw = self.gicc.IAR.get();
        let int_id = (raw & GICC_IAR_ID_MSK) as usize;
        if int_id >= GIC_SPECIAL_INTID {
            return None;
        }
        Some(IrqAck {
            int_id,
            raw: raw as usize,
        })
    }

    fn eoi(&self, ack: IrqAck) {
        self.gicc.EOIR.set(ack.raw as u32);
    }

    fn deactivate(&self, ack: IrqAck) {
        self.gicc.DIR.set(ack.raw as u32);
    }

    fn nr_lrs(&self) -> usize {
        ((self.gich.VTR.get() & GICH_VTR_LISTREGS_MSK) as usize + 1).min(GIC_LIST_REGS_NUM)
    }

    fn read_lr(&self, idx: usize) -> ListRegister {
        ListRegister::from_gicv2(self.gich.LR[idx].get())
    }

    fn write_lr(&self, idx: usize, lr: ListRegister) {
        self.gich.LR[idx].set(lr.to_gicv2());
    }

    fn set_underflow_irq(&self, enable: bool) {
        let hcr = self.gich.HCR.get();
        if enable {
            self.gich.HCR.set(hcr | GICH_HCR_UIE_BIT);
        } else {
            self.gich.HCR.set(hcr & !GICH_HCR_UIE_BIT);
        }
    }
}
