// Copyright (c) 2023 Beihang University, Huawei Technologies Co.,Ltd. All rights reserved.
// Rust-Shyper is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::{Mutex, MutexGuard};

use crate::arch::{VgicRedis, Vgicd};
use crate::config::{VmIntcConfig, VIRQ_SLOT_NR_MAX};
use crate::device::EmuDev;
use crate::error::{ErrorKind, Result};

use super::{Vcpu, VirqDescStore};

/// Power state of a vm, gates interrupt delivery.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VmState {
    #[default]
    Offline,
    Online,
    /// Only wake-capable interrupts are delivered.
    Suspend,
    Reboot,
}

pub struct Vm {
    id: usize,
    state: Mutex<VmState>,
    vcpus: Vec<Vcpu>,
    store: Mutex<VirqDescStore>,
    emu_devs: Vec<Arc<dyn EmuDev>>,
}

impl Vm {
    /// A vm with its descriptor store, vcpus and emulated interrupt controller
    /// laid out as `config` says. The vm starts Online.
    pub fn new(config: &VmIntcConfig) -> Result<Self> {
        let vcpu_num = config.vcpu_num();
        if vcpu_num == 0 || vcpu_num > u64::BITS as usize {
            return ErrorKind::InvalidParam.into();
        }
        if config.slot_nr == 0 || config.slot_nr > VIRQ_SLOT_NR_MAX {
            warn!(
                "vm {}: {} interrupt slots per vcpu, clamped to 1..={}",
                config.vm_id, config.slot_nr, VIRQ_SLOT_NR_MAX
            );
        }
        let store = VirqDescStore::new(
            config.vm_id,
            vcpu_num,
            config.local_nr,
            config.spi_nr,
            config.virtual_nr,
        )?;
        let vcpus = config
            .vcpu_affinity
            .iter()
            .enumerate()
            .map(|(id, phys_id)| Vcpu::new(config.vm_id, id, *phys_id, config.slot_nr))
            .collect();
        let emu_devs: Vec<Arc<dyn EmuDev>> = vec![
            Arc::new(Vgicd::new(config.gicd_base)),
            Arc::new(VgicRedis::new(config.gicr_base, vcpu_num)),
        ];

        Ok(Self {
            id: config.vm_id,
            state: Mutex::new(VmState::Online),
            vcpus,
            store: Mutex::new(store),
            emu_devs,
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> VmState {
        *self.state.lock()
    }

    pub fn set_state(&self, state: VmState) {
        let mut cur = self.state.lock();
        debug!("vm {} state {:?} -> {:?}", self.id, *cur, state);
        *cur = state;
    }

    pub fn vcpu_list(&self) -> &[Vcpu] {
        &self.vcpus
    }

    pub fn vcpu(&self, index: usize) -> Option<&Vcpu> {
        self.vcpus.get(index)
    }

    pub fn cpu_num(&self) -> usize {
        self.vcpus.len()
    }

    /// Number of shared virtual interrupts.
    pub fn shared_nr(&self) -> usize {
        self.store.lock().shared_nr()
    }

    /// Locks the descriptor store. Taken before any vcpu's virq lock.
    pub fn store(&self) -> MutexGuard<'_, VirqDescStore> {
        self.store.lock()
    }

    pub fn find_emu_dev(&self, ipa: usize) -> Option<&Arc<dyn EmuDev>> {
        self.emu_devs.iter().find(|dev| dev.address_range().contains(&ipa))
    }
}
