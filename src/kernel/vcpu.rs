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

use spin::Mutex;

use super::VirqStruct;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Vcpu state Enum
pub enum VcpuState {
    Invalid = 0,
    Ready = 1,
    Running = 2,
    Sleep = 3,
}

struct VcpuInnerConst {
    id: usize,      // vcpu id
    vm_id: usize,   // owner vm
    phys_id: usize, // binding physical CPU's id
}

pub struct VcpuInner {
    inner_const: VcpuInnerConst,
    state: Mutex<VcpuState>,
    virq: VirqStruct,
}

#[derive(Clone)]
/// Vcpu struct
pub struct Vcpu {
    pub inner: Arc<VcpuInner>,
}

impl PartialEq for Vcpu {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Vcpu {
    /// Vcpu `vcpu_id` of vm `vm_id`, pinned to physical cpu `phys_id`, with
    /// `slot_nr` interrupt slots.
    pub fn new(vm_id: usize, vcpu_id: usize, phys_id: usize, slot_nr: usize) -> Self {
        Self {
            inner: Arc::new(VcpuInner {
                inner_const: VcpuInnerConst {
                    id: vcpu_id,
                    vm_id,
                    phys_id,
                },
                state: Mutex::new(VcpuState::Ready),
                virq: VirqStruct::new(slot_nr),
            }),
        }
    }

    pub fn id(&self) -> usize {
        self.inner.inner_const.id
    }

    pub fn vm_id(&self) -> usize {
        self.inner.inner_const.vm_id
    }

    pub fn phys_id(&self) -> usize {
        self.inner.inner_const.phys_id
    }

    pub fn state(&self) -> VcpuState {
        *self.inner.state.lock()
    }

    pub fn set_state(&self, state: VcpuState) {
        *self.inner.state.lock() = state;
    }

    /// In-flight interrupts of this vcpu.
    pub fn virq(&self) -> &VirqStruct {
        &self.inner.virq
    }

    pub fn has_irq(&self) -> bool {
        self.inner.virq.has_irq()
    }
}
