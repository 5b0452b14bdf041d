// Copyright (c) 2023 Beihang University, Huawei Technologies Co.,Ltd. All rights reserved.
// Rust-Shyper is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! Per-vm virtual interrupt descriptors.
//!
//! Local numbers (SGI and PPI) have one descriptor per vcpu, shared numbers
//! one per vm. A descriptor only records the binding and configuration; the
//! in-flight state lives in the vcpu's [`VirqStruct`](super::VirqStruct).

use alloc::vec::Vec;
use core::ops::{BitOr, Range};

use crate::arch::TriggerType;
use crate::config::VM_LOCAL_VIRQ_NR;
use crate::error::{ErrorKind, Result};
use crate::utils::BitMap;

use super::{IrqDomainKind, IrqDomainRegistry};

pub const VIRQ_PRIORITY_DEFAULT: u8 = 0xa0;
pub const VM_SGI_VIRQ_NR: usize = 16;
/// First shared virtual interrupt number.
pub const VM_SPI_VIRQ_BASE: usize = VM_LOCAL_VIRQ_NR;

/// Request flags of a virtual interrupt.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VirqFlags(u32);

impl VirqFlags {
    pub const ENABLE: VirqFlags = VirqFlags(1 << 0);
    /// Delivery may wake a suspended vm.
    pub const CAN_WAKEUP: VirqFlags = VirqFlags(1 << 1);
    /// Edge triggered, level otherwise.
    pub const EDGE: VirqFlags = VirqFlags(1 << 2);

    pub const fn empty() -> VirqFlags {
        VirqFlags(0)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub const fn contains(&self, other: VirqFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for VirqFlags {
    type Output = VirqFlags;

    fn bitor(self, rhs: VirqFlags) -> VirqFlags {
        VirqFlags(self.0 | rhs.0)
    }
}

/// Which vcpu a virtual interrupt is delivered to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VirqAffinity {
    Vcpu(usize),
    /// Whichever vcpu the sender names; shared interrupts fall back to vcpu 0.
    Any,
}

impl VirqAffinity {
    pub fn vcpu_or(&self, default: usize) -> usize {
        match self {
            VirqAffinity::Vcpu(id) => *id,
            VirqAffinity::Any => default,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VirqDesc {
    pub vno: usize,
    /// Backing hardware interrupt, 0 when there is none.
    pub hno: usize,
    pub hw: bool,
    pub vm_id: usize,
    pub affinity: VirqAffinity,
    pub priority: u8,
    pub enabled: bool,
    pub can_wake: bool,
    pub trigger: TriggerType,
    /// Requested or dynamically allocated.
    pub bound: bool,
}

impl VirqDesc {
    fn new(vm_id: usize, vno: usize, affinity: VirqAffinity) -> VirqDesc {
        let sgi = vno < VM_SGI_VIRQ_NR;
        VirqDesc {
            vno,
            hno: 0,
            hw: false,
            vm_id,
            affinity,
            priority: VIRQ_PRIORITY_DEFAULT,
            // SGIs are always enabled and edge triggered
            enabled: sgi,
            can_wake: false,
            trigger: if sgi { TriggerType::Edge } else { TriggerType::Level },
            bound: sgi,
        }
    }

    fn reset(&mut self) {
        let fresh = VirqDesc::new(self.vm_id, self.vno, self.affinity);
        self.priority = fresh.priority;
        self.enabled = fresh.enabled;
        self.trigger = if self.hw { self.trigger } else { fresh.trigger };
    }
}

/// Virtual interrupt descriptors of one vm.
pub struct VirqDescStore {
    vm_id: usize,
    domains: IrqDomainRegistry,
    local: Vec<Vec<VirqDesc>>,
    shared: Vec<VirqDesc>,
    /// Bound shared descriptors.
    alloc_map: BitMap,
    /// Shared descriptors handed out by `allocate_dynamic`.
    dynamic_map: BitMap,
}

impl VirqDescStore {
    /// Build the store of vm `vm_id`: `local_nr` banked numbers for each of
    /// `vcpu_num` vcpus, then `spi_nr` hardware-capable shared numbers
    /// followed by `virtual_nr` software-only ones.
    pub fn new(vm_id: usize, vcpu_num: usize, local_nr: usize, spi_nr: usize, virtual_nr: usize) -> Result<Self> {
        if vcpu_num == 0 || local_nr == 0 || local_nr > VM_LOCAL_VIRQ_NR {
            return ErrorKind::InvalidParam.into();
        }
        let mut domains = IrqDomainRegistry::new();
        domains.register_domain(IrqDomainKind::Sgi, 0..local_nr.min(VM_SGI_VIRQ_NR))?;
        if local_nr > VM_SGI_VIRQ_NR {
            domains.register_domain(IrqDomainKind::Ppi, VM_SGI_VIRQ_NR..local_nr)?;
        }
        let spi_end = VM_SPI_VIRQ_BASE + spi_nr;
        if spi_nr > 0 {
            domains.register_domain(IrqDomainKind::Spi, VM_SPI_VIRQ_BASE..spi_end)?;
        }
        if virtual_nr > 0 {
            domains.register_domain(IrqDomainKind::Virtual, spi_end..spi_end + virtual_nr)?;
        }

        let local = (0..vcpu_num)
            .map(|vcpu| {
                (0..local_nr)
                    .map(|vno| VirqDesc::new(vm_id, vno, VirqAffinity::Vcpu(vcpu)))
                    .collect()
            })
            .collect();
        let shared_nr = spi_nr + virtual_nr;
        let shared = (0..shared_nr)
            .map(|idx| VirqDesc::new(vm_id, VM_SPI_VIRQ_BASE + idx, VirqAffinity::Vcpu(0)))
            .collect();

        Ok(Self {
            vm_id,
            domains,
            local,
            shared,
            alloc_map: BitMap::new(shared_nr),
            dynamic_map: BitMap::new(shared_nr),
        })
    }

    pub fn vm_id(&self) -> usize {
        self.vm_id
    }

    pub fn vcpu_num(&self) -> usize {
        self.local.len()
    }

    pub fn local_nr(&self) -> usize {
        self.local.first().map_or(0, |descs| descs.len())
    }

    pub fn shared_nr(&self) -> usize {
        self.shared.len()
    }

    /// One past the highest virtual interrupt number of the vm.
    pub fn virq_end(&self) -> usize {
        VM_SPI_VIRQ_BASE + self.shared.len()
    }

    pub fn resolve(&self, vno: usize) -> Result<(IrqDomainKind, usize)> {
        self.domains.resolve(vno)
    }

    pub fn is_local(&self, vno: usize) -> bool {
        matches!(self.resolve(vno), Ok((kind, _)) if kind.is_local())
    }

    fn shared_index(&self, vno: usize) -> Result<usize> {
        match self.resolve(vno)? {
            (kind, _) if kind.is_local() => ErrorKind::InvalidParam.into(),
            _ => Ok(vno - VM_SPI_VIRQ_BASE),
        }
    }

    /// Descriptor of `vno` as seen by vcpu `vcpu_id`.
    pub fn desc(&self, vcpu_id: usize, vno: usize) -> Result<&VirqDesc> {
        let (kind, _) = self.resolve(vno)?;
        if kind.is_local() {
            let descs = self.local.get(vcpu_id).ok_or(ErrorKind::NotFound)?;
            Ok(&descs[vno])
        } else {
            Ok(&self.shared[vno - VM_SPI_VIRQ_BASE])
        }
    }

    pub fn desc_mut(&mut self, vcpu_id: usize, vno: usize) -> Result<&mut VirqDesc> {
        let (kind, _) = self.resolve(vno)?;
        if kind.is_local() {
            let descs = self.local.get_mut(vcpu_id).ok_or(ErrorKind::NotFound)?;
            Ok(&mut descs[vno])
        } else {
            Ok(&mut self.shared[vno - VM_SPI_VIRQ_BASE])
        }
    }

    /// Bind `vno` (on vcpu `vcpu_id` for local numbers, targeting it for shared
    /// ones) to hardware interrupt `hno`, 0 for none. Returns the previous
    /// descriptor so the caller can undo an overwritten hardware route.
    pub fn bind(&mut self, vcpu_id: usize, vno: usize, hno: usize, flags: VirqFlags) -> Result<VirqDesc> {
        if vcpu_id >= self.vcpu_num() {
            return ErrorKind::InvalidParam.into();
        }
        let (kind, _) = self.resolve(vno)?;
        if kind == IrqDomainKind::Sgi && hno != 0 {
            return ErrorKind::InvalidParam.into();
        }
        let vm_id = self.vm_id;
        let desc = self.desc_mut(vcpu_id, vno)?;
        let prev = *desc;
        if prev.bound && kind != IrqDomainKind::Sgi {
            warn!(
                "vm {} virq {} rebound: hno {} -> {}",
                vm_id, vno, prev.hno, hno
            );
        }

        desc.hno = hno;
        desc.hw = hno != 0;
        desc.affinity = VirqAffinity::Vcpu(vcpu_id);
        desc.enabled = flags.contains(VirqFlags::ENABLE) || kind == IrqDomainKind::Sgi;
        desc.can_wake = flags.contains(VirqFlags::CAN_WAKEUP);
        if kind != IrqDomainKind::Sgi {
            desc.trigger = if flags.contains(VirqFlags::EDGE) {
                TriggerType::Edge
            } else {
                TriggerType::Level
            };
        }
        desc.bound = true;

        if !kind.is_local() {
            let idx = vno - VM_SPI_VIRQ_BASE;
            self.alloc_map.set(idx);
            self.dynamic_map.clear(idx);
        }
        Ok(prev)
    }

    /// Return a dynamically allocated number to the pool.
    pub fn release(&mut self, vno: usize) -> Result<VirqDesc> {
        let idx = self.shared_index(vno).map_err(|_| ErrorKind::NotDynamic)?;
        if !self.dynamic_map.get(idx) {
            return ErrorKind::NotDynamic.into();
        }
        self.dynamic_map.clear(idx);
        self.alloc_map.clear(idx);
        let desc = &mut self.shared[idx];
        let prev = *desc;
        *desc = VirqDesc::new(self.vm_id, vno, VirqAffinity::Vcpu(0));
        Ok(prev)
    }

    /// First free software-only shared number, enabled and targeting vcpu 0.
    pub fn allocate_dynamic(&mut self) -> Result<usize> {
        let range = self
            .domains
            .range(IrqDomainKind::Virtual)
            .ok_or(ErrorKind::ResourceExhausted)?;
        let idx_range = range.start - VM_SPI_VIRQ_BASE..range.end - VM_SPI_VIRQ_BASE;
        let idx = self
            .alloc_map
            .first_zero_in(idx_range)
            .ok_or(ErrorKind::ResourceExhausted)?;
        self.alloc_map.set(idx);
        self.dynamic_map.set(idx);

        let desc = &mut self.shared[idx];
        desc.enabled = true;
        desc.bound = true;
        desc.affinity = VirqAffinity::Vcpu(0);
        desc.trigger = TriggerType::Edge;
        Ok(desc.vno)
    }

    pub fn is_dynamic(&self, vno: usize) -> bool {
        self.shared_index(vno).is_ok_and(|idx| self.dynamic_map.get(idx))
    }

    pub fn set_priority(&mut self, vcpu_id: usize, vno: usize, priority: u8) -> Result<VirqDesc> {
        let desc = self.desc_mut(vcpu_id, vno)?;
        desc.priority = priority;
        Ok(*desc)
    }

    /// SGIs stay edge triggered.
    pub fn set_trigger_type(&mut self, vcpu_id: usize, vno: usize, trigger: TriggerType) -> Result<VirqDesc> {
        let desc = self.desc_mut(vcpu_id, vno)?;
        if vno >= VM_SGI_VIRQ_NR {
            desc.trigger = trigger;
        }
        Ok(*desc)
    }

    /// SGIs can not be disabled.
    pub fn set_enabled(&mut self, vcpu_id: usize, vno: usize, enabled: bool) -> Result<VirqDesc> {
        let desc = self.desc_mut(vcpu_id, vno)?;
        if vno >= VM_SGI_VIRQ_NR {
            desc.enabled = enabled;
        }
        Ok(*desc)
    }

    /// Retarget a shared number to vcpu `vcpu_id`.
    pub fn set_affinity(&mut self, vno: usize, vcpu_id: usize) -> Result<VirqDesc> {
        if vcpu_id >= self.vcpu_num() {
            return ErrorKind::InvalidParam.into();
        }
        let idx = self.shared_index(vno)?;
        let desc = &mut self.shared[idx];
        desc.affinity = VirqAffinity::Vcpu(vcpu_id);
        Ok(*desc)
    }

    /// Hardware backed descriptors with the vcpu whose bank holds them
    /// (the target vcpu for shared ones).
    pub fn hw_descs(&self) -> impl Iterator<Item = (usize, &VirqDesc)> + '_ {
        let local = self
            .local
            .iter()
            .enumerate()
            .flat_map(|(vcpu, descs)| descs.iter().map(move |d| (vcpu, d)));
        let shared = self.shared.iter().map(|d| (d.affinity.vcpu_or(0), d));
        local.chain(shared).filter(|(_, d)| d.hw)
    }

    /// Shared numbers in `range` that are bound.
    pub fn bound_shared(&self, range: Range<usize>) -> impl Iterator<Item = &VirqDesc> + '_ {
        self.shared
            .iter()
            .filter(move |d| d.bound && range.contains(&d.vno))
    }

    /// Back to power-on configuration. Bindings survive, every descriptor is
    /// disabled (SGIs excepted) with default priority.
    pub fn reset(&mut self) {
        for desc in self.local.iter_mut().flatten() {
            desc.reset();
        }
        for desc in self.shared.iter_mut() {
            desc.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> VirqDescStore {
        VirqDescStore::new(1, 2, 32, 16, 4).unwrap()
    }

    #[test]
    fn layout() {
        let store = store();
        assert_eq!(store.vcpu_num(), 2);
        assert_eq!(store.local_nr(), 32);
        assert_eq!(store.shared_nr(), 20);
        assert_eq!(store.virq_end(), 52);
        assert_eq!(store.resolve(20).unwrap(), (IrqDomainKind::Ppi, 4));
        assert_eq!(store.resolve(50).unwrap(), (IrqDomainKind::Virtual, 2));
        assert_eq!(store.resolve(52).unwrap_err().kind(), ErrorKind::NotFound);

        let sgi = store.desc(1, 3).unwrap();
        assert!(sgi.enabled);
        assert_eq!(sgi.affinity, VirqAffinity::Vcpu(1));
        assert_eq!(sgi.trigger, TriggerType::Edge);
        let ppi = store.desc(0, 27).unwrap();
        assert!(!ppi.enabled);
        assert_eq!(ppi.priority, VIRQ_PRIORITY_DEFAULT);
        assert_eq!(store.desc(2, 27).unwrap_err().kind(), ErrorKind::NotFound);
        assert!(VirqDescStore::new(0, 0, 32, 0, 0).is_err());
        assert!(VirqDescStore::new(0, 1, 33, 0, 0).is_err());
    }

    #[test]
    fn local_descriptors_are_per_vcpu() {
        let mut store = store();
        store.bind(1, 27, 27, VirqFlags::ENABLE).unwrap();
        assert!(store.desc(1, 27).unwrap().hw);
        assert!(!store.desc(0, 27).unwrap().hw);
        assert_eq!(store.bind(0, 3, 3, VirqFlags::empty()).unwrap_err().kind(), ErrorKind::InvalidParam);
    }

    #[test]
    fn bind_overwrites_and_reports_previous() {
        let mut store = store();
        let prev = store.bind(1, 40, 55, VirqFlags::ENABLE | VirqFlags::EDGE).unwrap();
        assert!(!prev.bound);
        let desc = *store.desc(0, 40).unwrap();
        assert_eq!(desc.hno, 55);
        assert_eq!(desc.affinity, VirqAffinity::Vcpu(1));
        assert_eq!(desc.trigger, TriggerType::Edge);
        assert!(desc.enabled);

        let prev = store.bind(0, 40, 56, VirqFlags::CAN_WAKEUP).unwrap();
        assert_eq!(prev.hno, 55);
        let desc = store.desc(0, 40).unwrap();
        assert_eq!(desc.hno, 56);
        assert!(desc.can_wake);
        assert!(!desc.enabled);
        assert_eq!(store.hw_descs().count(), 1);
    }

    #[test]
    fn dynamic_allocation_and_release() {
        let mut store = store();
        let mut got = Vec::new();
        for _ in 0..4 {
            got.push(store.allocate_dynamic().unwrap());
        }
        assert_eq!(got, vec![48, 49, 50, 51]);
        assert!(store.desc(0, 49).unwrap().enabled);
        assert_eq!(
            store.allocate_dynamic().unwrap_err().kind(),
            ErrorKind::ResourceExhausted
        );

        store.release(49).unwrap();
        assert!(!store.is_dynamic(49));
        assert_eq!(store.allocate_dynamic().unwrap(), 49);

        // static bindings and local numbers are not dynamic
        store.bind(0, 40, 0, VirqFlags::ENABLE).unwrap();
        assert_eq!(store.release(40).unwrap_err().kind(), ErrorKind::NotDynamic);
        assert_eq!(store.release(20).unwrap_err().kind(), ErrorKind::NotDynamic);
        assert_eq!(store.release(500).unwrap_err().kind(), ErrorKind::NotDynamic);
    }

    #[test]
    fn no_virtual_domain_means_exhausted() {
        let mut store = VirqDescStore::new(0, 1, 32, 8, 0).unwrap();
        assert_eq!(
            store.allocate_dynamic().unwrap_err().kind(),
            ErrorKind::ResourceExhausted
        );
    }

    #[test]
    fn sgis_stay_enabled_and_edge() {
        let mut store = store();
        store.set_enabled(0, 2, false).unwrap();
        store.set_trigger_type(0, 2, TriggerType::Level).unwrap();
        let sgi = store.desc(0, 2).unwrap();
        assert!(sgi.enabled);
        assert_eq!(sgi.trigger, TriggerType::Edge);
    }

    #[test]
    fn reset_keeps_bindings() {
        let mut store = store();
        store.bind(1, 40, 55, VirqFlags::ENABLE).unwrap();
        store.set_priority(1, 40, 0x20).unwrap();
        store.set_affinity(40, 0).unwrap();
        store.reset();
        let desc = store.desc(0, 40).unwrap();
        assert_eq!(desc.hno, 55);
        assert!(!desc.enabled);
        assert_eq!(desc.priority, VIRQ_PRIORITY_DEFAULT);
        assert_eq!(desc.affinity, VirqAffinity::Vcpu(0));
        assert_eq!(store.set_affinity(40, 2).unwrap_err().kind(), ErrorKind::InvalidParam);
    }
}
