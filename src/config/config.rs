// Copyright (c) 2023 Beihang University, Huawei Technologies Co.,Ltd. All rights reserved.
// Rust-Shyper is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

use alloc::vec::Vec;

use crate::kernel::VirqFlags;

use super::{QEMU_GICD_BASE, QEMU_GICR_BASE};

/// Default number of interrupt slots per vcpu.
pub const VIRQ_SLOT_NR_DEFAULT: usize = 8;
/// Upper bound of interrupt slots per vcpu.
pub const VIRQ_SLOT_NR_MAX: usize = 64;
/// SGIs and PPIs, banked per vcpu.
pub const VM_LOCAL_VIRQ_NR: usize = 32;
pub const GVM_SPI_VIRQ_NR: usize = 64;
pub const GVM_VIRTUAL_VIRQ_NR: usize = 32;

/// Physical interrupt controller description of a platform.
#[derive(Clone, Copy, Debug, Default)]
pub struct GicDesc {
    /// Device tree compatible string, selects the driver variant.
    pub compatible: &'static str,
    /// Distributor base.
    pub gicd_addr: usize,
    /// GICv2 cpu interface base.
    pub gicc_addr: usize,
    /// GICv2 virtual interface control base.
    pub gich_addr: usize,
    /// GICv3 redistributor base, one 128KiB frame pair per cpu.
    pub gicr_addr: usize,
    /// Virtualization maintenance interrupt.
    pub maintenance_int_id: usize,
}

/// A hardware interrupt passed through to a vm.
#[derive(Clone, Copy, Debug)]
pub struct PassthroughIrq {
    /// Virtual interrupt number seen by the guest.
    pub vno: usize,
    /// Physical interrupt number.
    pub hno: usize,
    /// Vcpu that receives the interrupt.
    pub vcpu: usize,
    pub flags: VirqFlags,
}

/// Interrupt layout of one vm.
#[derive(Clone, Debug)]
pub struct VmIntcConfig {
    pub vm_id: usize,
    /// Physical cpu of every vcpu, indexed by vcpu id.
    pub vcpu_affinity: Vec<usize>,
    /// Number of banked local interrupts per vcpu, at most [`VM_LOCAL_VIRQ_NR`].
    pub local_nr: usize,
    /// Shared interrupts that may be backed by hardware lines.
    pub spi_nr: usize,
    /// Shared interrupts reserved for dynamic, software-only allocation.
    pub virtual_nr: usize,
    /// Interrupt slots per vcpu, at most [`VIRQ_SLOT_NR_MAX`].
    pub slot_nr: usize,
    /// Guest physical base of the emulated distributor.
    pub gicd_base: usize,
    /// Guest physical base of the emulated redistributors.
    pub gicr_base: usize,
    /// Hardware interrupts bound at creation.
    pub passthrough: Vec<PassthroughIrq>,
}

impl Default for VmIntcConfig {
    fn default() -> Self {
        Self {
            vm_id: 0,
            vcpu_affinity: vec![0],
            local_nr: VM_LOCAL_VIRQ_NR,
            spi_nr: GVM_SPI_VIRQ_NR,
            virtual_nr: GVM_VIRTUAL_VIRQ_NR,
            slot_nr: VIRQ_SLOT_NR_DEFAULT,
            gicd_base: QEMU_GICD_BASE,
            gicr_base: QEMU_GICR_BASE,
            passthrough: Vec::new(),
        }
    }
}

impl VmIntcConfig {
    pub fn vcpu_num(&self) -> usize {
        self.vcpu_affinity.len()
    }

    /// Shared descriptors of the vm: hardware-capable ones followed by virtual ones.
    pub fn shared_nr(&self) -> usize {
        self.spi_nr + self.virtual_nr
    }
}
