// Copyright (c) 2023 Beihang University, Huawei Technologies Co.,Ltd. All rights reserved.
// Rust-Shyper is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! Doorbell: the one SGI cpus use to make each other look at their vcpus'
//! slot pools. It carries no message, the pools are the message.

use core::sync::atomic::{fence, Ordering};

use crate::arch::IpiTarget;

use super::VirqManager;

impl VirqManager {
    /// Ring the doorbell of physical cpu `target_id`.
    pub fn ipi_send(&self, target_id: usize) -> bool {
        if target_id >= u64::BITS as usize {
            warn!("ipi_send: core {} not exist", target_id);
            return false;
        }
        // slot updates must be visible before the doorbell
        fence(Ordering::Release);
        self.intc().send_ipi(IpiTarget::Cpus(1 << target_id), self.doorbell());
        true
    }

    /// Doorbell received: kick every local vcpu with interrupts queued.
    pub fn ipi_irq_handler(&self) {
        let cpu_id = self.sched().current_cpu();
        fence(Ordering::Acquire);
        for vm in self.vm_list() {
            for vcpu in vm.vcpu_list().iter().filter(|vcpu| vcpu.phys_id() == cpu_id) {
                if vcpu.has_irq() {
                    let preempt = vcpu.virq().counts().hw > 0;
                    trace!("core {} doorbell: vm {} vcpu {}", cpu_id, vm.id(), vcpu.id());
                    self.sched().kick(vcpu, preempt);
                }
            }
        }
    }
}
