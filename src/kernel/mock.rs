// Copyright (c) 2023 Beihang University, Huawei Technologies Co.,Ltd. All rights reserved.
// Rust-Shyper is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! Test doubles for the interrupt controller and the scheduler.

use alloc::boxed::Box;
use alloc::collections::{BTreeMap, BTreeSet, VecDeque};
use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};

use spin::Mutex;

use crate::arch::{InterruptController, IpiTarget, IrqAck, ListRegister, LrState, TriggerType};

use super::{Scheduler, Vcpu};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntcEvent {
    Mask(usize),
    Unmask(usize),
    Eoi(usize),
    Deactivate(usize),
}

#[derive(Default)]
struct MockIntcInner {
    lrs: Vec<ListRegister>,
    masked: BTreeSet<usize>,
    types: BTreeMap<usize, TriggerType>,
    priorities: BTreeMap<usize, u8>,
    affinity: BTreeMap<usize, usize>,
    history: Vec<IntcEvent>,
    ipis: Vec<(IpiTarget, usize)>,
    fetch: VecDeque<usize>,
    underflow: bool,
}

/// In-memory controller: a list register bank and logs of everything else.
/// Every line starts masked.
pub struct MockIntc {
    inner: Mutex<MockIntcInner>,
}

impl MockIntc {
    pub fn new(nr_lrs: usize) -> Self {
        Self {
            inner: Mutex::new(MockIntcInner {
                lrs: vec![ListRegister::EMPTY; nr_lrs],
                masked: (0..1024).collect(),
                ..Default::default()
            }),
        }
    }

    pub fn lr(&self, idx: usize) -> ListRegister {
        self.inner.lock().lrs[idx]
    }

    fn set_lr_state(&self, vintid: usize, from: &[LrState], to: LrState) {
        let mut inner = self.inner.lock();
        if let Some(lr) = inner
            .lrs
            .iter_mut()
            .find(|lr| lr.vintid == vintid && from.contains(&lr.state))
        {
            lr.state = to;
        }
    }

    /// Guest reads IAR.
    pub fn guest_ack(&self, vintid: usize) {
        self.set_lr_state(vintid, &[LrState::Pending], LrState::Active);
    }

    /// Guest acknowledges (if needed) and deactivates.
    pub fn guest_eoi(&self, vintid: usize) {
        self.set_lr_state(
            vintid,
            &[LrState::Pending, LrState::Active, LrState::PendingActive],
            LrState::Inactive,
        );
    }

    pub fn guest_eoi_all(&self) {
        let mut inner = self.inner.lock();
        inner.lrs.iter_mut().for_each(|lr| lr.state = LrState::Inactive);
    }

    /// Queue `int_id` for the next `fetch`.
    pub fn fire(&self, int_id: usize) {
        self.inner.lock().fetch.push_back(int_id);
    }

    pub fn is_masked(&self, int_id: usize) -> bool {
        self.inner.lock().masked.contains(&int_id)
    }

    pub fn trigger(&self, int_id: usize) -> Option<TriggerType> {
        self.inner.lock().types.get(&int_id).copied()
    }

    pub fn priority(&self, int_id: usize) -> Option<u8> {
        self.inner.lock().priorities.get(&int_id).copied()
    }

    pub fn affinity(&self, int_id: usize) -> Option<usize> {
        self.inner.lock().affinity.get(&int_id).copied()
    }

    pub fn history(&self) -> Vec<IntcEvent> {
        self.inner.lock().history.clone()
    }

    pub fn clear_history(&self) {
        self.inner.lock().history.clear();
    }

    pub fn ipis(&self) -> Vec<(IpiTarget, usize)> {
        self.inner.lock().ipis.clone()
    }

    pub fn underflow(&self) -> bool {
        self.inner.lock().underflow
    }
}

impl InterruptController for MockIntc {
    fn init(&self) {}

    fn init_cpu(&self) {}

    fn nr_irqs(&self) -> usize {
        256
    }

    fn maintenance_irq(&self) -> usize {
        25
    }

    fn mask(&self, int_id: usize) {
        let mut inner = self.inner.lock();
        inner.masked.insert(int_id);
        inner.history.push(IntcEvent::Mask(int_id));
    }

    fn unmask(&self, int_id: usize) {
        let mut inner = self.inner.lock();
        inner.masked.remove(&int_id);
        inner.history.push(IntcEvent::Unmask(int_id));
    }

    fn set_type(&self, int_id: usize, trigger: TriggerType) {
        self.inner.lock().types.insert(int_id, trigger);
    }

    fn set_priority(&self, int_id: usize, priority: u8) {
        self.inner.lock().priorities.insert(int_id, priority);
    }

    fn set_affinity(&self, int_id: usize, cpu: usize) {
        self.inner.lock().affinity.insert(int_id, cpu);
    }

    fn send_ipi(&self, target: IpiTarget, sgi: usize) {
        self.inner.lock().ipis.push((target, sgi));
    }

    fn read_pending(&self, int_id: usize) -> bool {
        self.inner.lock().fetch.contains(&int_id)
    }

    fn fetch(&self) -> Option<IrqAck> {
        let int_id = self.inner.lock().fetch.pop_front()?;
        Some(IrqAck { int_id, raw: int_id })
    }

    fn eoi(&self, ack: IrqAck) {
        self.inner.lock().history.push(IntcEvent::Eoi(ack.int_id));
    }

    fn deactivate(&self, ack: IrqAck) {
        self.inner.lock().history.push(IntcEvent::Deactivate(ack.int_id));
    }

    fn nr_lrs(&self) -> usize {
        self.inner.lock().lrs.len()
    }

    fn read_lr(&self, idx: usize) -> ListRegister {
        self.lr(idx)
    }

    fn write_lr(&self, idx: usize, lr: ListRegister) {
        self.inner.lock().lrs[idx] = lr;
    }

    fn set_underflow_irq(&self, enable: bool) {
        self.inner.lock().underflow = enable;
    }
}

/// Scheduler double: records kicks and runs cross cpu calls inline.
#[derive(Default)]
pub struct MockSched {
    cpu: AtomicUsize,
    kicks: Mutex<Vec<(usize, usize, bool)>>,
    calls: Mutex<Vec<usize>>,
}

impl MockSched {
    pub fn set_cpu(&self, cpu: usize) {
        self.cpu.store(cpu, Ordering::Relaxed);
    }

    /// `(vm_id, vcpu_id, preempt)` of every kick so far.
    pub fn kicks(&self) -> Vec<(usize, usize, bool)> {
        self.kicks.lock().clone()
    }

    /// Target cpus of every cross cpu call so far.
    pub fn calls(&self) -> Vec<usize> {
        self.calls.lock().clone()
    }
}

impl Scheduler for MockSched {
    fn current_cpu(&self) -> usize {
        self.cpu.load(Ordering::Relaxed)
    }

    fn kick(&self, vcpu: &Vcpu, preempt: bool) {
        self.kicks.lock().push((vcpu.vm_id(), vcpu.id(), preempt));
    }

    fn cross_cpu_call(&self, cpu: usize, f: Box<dyn FnOnce() + Send>) {
        self.calls.lock().push(cpu);
        f();
    }
}
