// Copyright (c) 2023 Beihang University, Huawei Technologies Co.,Ltd. All rights reserved.
// Rust-Shyper is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! In-flight virtual interrupts of one vcpu.
//!
//! Every delivery occupies one slot of a fixed pool for as long as the guest
//! has not deactivated it. A slot is Pending while it waits in the FIFO for a
//! free list register and Active once injected. Raising a number that already
//! owns a slot never takes a second one: a Pending slot absorbs the raise, an
//! Active slot is flagged to go back to Pending when it is reclaimed.
//!
//! Nothing here allocates after [`VirqStruct::new`].

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use spin::Mutex;

use crate::arch::{InterruptController, ListRegister, LrState, GIC_INTS_MAX, GIC_LIST_REGS_NUM};
use crate::config::VIRQ_SLOT_NR_MAX;
use crate::error::{ErrorKind, Result};
use crate::utils::BitMap;

/// Ownership checked reference to a slot. Goes stale once the slot is freed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotHandle {
    index: usize,
    generation: u32,
}

impl SlotHandle {
    pub fn index(&self) -> usize {
        self.index
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum VirqState {
    #[default]
    Inactive,
    Pending,
    Active,
}

/// What a sender asks to deliver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VirqRequest {
    pub vno: usize,
    pub hno: usize,
    pub hw: bool,
    pub priority: u8,
    /// Sending vcpu of an SGI.
    pub source: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RaiseStatus {
    /// A fresh slot went Pending.
    Queued(SlotHandle),
    /// Already Pending, nothing changed.
    Coalesced,
    /// Active, will be Pending again after reclaim.
    Repend,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct VirqCounts {
    pub free: usize,
    pub pending: usize,
    pub active: usize,
    pub hw: usize,
    pub virt: usize,
}

#[derive(Clone, Copy, Debug, Default)]
struct VirqSlot {
    generation: u32,
    vno: usize,
    hno: usize,
    hw: bool,
    priority: u8,
    source: usize,
    state: VirqState,
    repend: bool,
    lr: Option<usize>,
    /// List register state saved on exit while the guest still holds it.
    saved: LrState,
    /// Deactivated from another cpu, the owner's exit empties the list
    /// register and retires the slot.
    cleared: bool,
}

/// Hardware lines the caller may unmask after an exit reclaim, as
/// `(vno, hno)`. `hno` is `None` for lines deferred on exhaustion, those are
/// unmasked through the current binding of `vno`.
pub struct ReclaimList {
    entries: [(usize, Option<usize>); RECLAIM_LIST_CAP],
    len: usize,
}

const RECLAIM_LIST_CAP: usize = VIRQ_SLOT_NR_MAX;

impl ReclaimList {
    pub const fn new() -> Self {
        Self {
            entries: [(0, None); RECLAIM_LIST_CAP],
            len: 0,
        }
    }

    fn push(&mut self, vno: usize, hno: Option<usize>) -> bool {
        if self.len == RECLAIM_LIST_CAP {
            return false;
        }
        self.entries[self.len] = (vno, hno);
        self.len += 1;
        true
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &(usize, Option<usize>)> {
        self.entries[..self.len].iter()
    }
}

impl Default for ReclaimList {
    fn default() -> Self {
        Self::new()
    }
}

struct VirqStructInner {
    slots: Vec<VirqSlot>,
    used: BitMap,
    pending: VecDeque<usize>,
    active: VecDeque<usize>,
    lr_used: BitMap,
    hw_count: usize,
    virt_count: usize,
    /// Hardware backed numbers dropped on exhaustion, their lines stay masked.
    deferred: BitMap,
}

impl VirqStructInner {
    fn find(&self, vno: usize) -> Option<usize> {
        self.used.iter_ones().find(|idx| self.slots[*idx].vno == vno)
    }

    fn free(&mut self, idx: usize) {
        let slot = &mut self.slots[idx];
        if slot.hw {
            self.hw_count -= 1;
        } else {
            self.virt_count -= 1;
        }
        *slot = VirqSlot {
            generation: slot.generation.wrapping_add(1),
            ..VirqSlot::default()
        };
        self.used.clear(idx);
    }

    fn release_lr(&mut self, idx: usize, intc: &dyn InterruptController) {
        if let Some(lr) = self.slots[idx].lr.take() {
            intc.write_lr(lr, ListRegister::EMPTY);
            self.lr_used.clear(lr);
        }
    }

    /// Leave Active: back to the FIFO if re-raised, otherwise to the pool.
    /// Returns the hardware line to unmask.
    fn retire(&mut self, idx: usize) -> Option<(usize, usize)> {
        self.active.retain(|i| *i != idx);
        let slot = &mut self.slots[idx];
        if slot.repend {
            slot.repend = false;
            slot.cleared = false;
            slot.state = VirqState::Pending;
            slot.saved = LrState::Inactive;
            self.pending.push_back(idx);
            trace!("virq {} repend", slot.vno);
            return None;
        }
        let line = slot.hw.then_some((slot.vno, slot.hno));
        self.free(idx);
        line
    }

    fn lr_of(&self, idx: usize) -> ListRegister {
        let slot = &self.slots[idx];
        ListRegister {
            vintid: slot.vno,
            pintid: 0,
            priority: slot.priority,
            hw: false,
            group1: true,
            state: LrState::Pending,
            source: slot.source,
        }
    }
}

/// Per-vcpu slot pool.
pub struct VirqStruct {
    capacity: usize,
    inner: Mutex<VirqStructInner>,
}

impl VirqStruct {
    /// A pool of `capacity` slots, clamped to `1..=VIRQ_SLOT_NR_MAX`.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, VIRQ_SLOT_NR_MAX);
        Self {
            capacity,
            inner: Mutex::new(VirqStructInner {
                slots: vec![VirqSlot::default(); capacity],
                used: BitMap::new(capacity),
                pending: VecDeque::with_capacity(capacity),
                active: VecDeque::with_capacity(capacity),
                lr_used: BitMap::new(GIC_LIST_REGS_NUM),
                hw_count: 0,
                virt_count: 0,
                deferred: BitMap::new(GIC_INTS_MAX),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Queue `req.vno` for delivery. The caller kicks the vcpu afterwards,
    /// never under this lock.
    pub fn raise(&self, req: VirqRequest) -> Result<RaiseStatus> {
        let mut inner = self.inner.lock();
        if let Some(idx) = inner.find(req.vno) {
            let slot = &mut inner.slots[idx];
            return match slot.state {
                VirqState::Active => {
                    slot.repend = true;
                    Ok(RaiseStatus::Repend)
                }
                _ => Ok(RaiseStatus::Coalesced),
            };
        }

        let Some(idx) = inner.used.first_zero() else {
            if req.hw && req.vno < GIC_INTS_MAX {
                inner.deferred.set(req.vno);
            }
            warn!("virq {} dropped: {} slots in flight", req.vno, self.capacity);
            return ErrorKind::ResourceExhausted.into();
        };
        inner.used.set(idx);
        if req.hw {
            inner.hw_count += 1;
        } else {
            inner.virt_count += 1;
        }
        let slot = &mut inner.slots[idx];
        slot.vno = req.vno;
        slot.hno = req.hno;
        slot.hw = req.hw;
        slot.priority = req.priority;
        slot.source = req.source;
        slot.state = VirqState::Pending;
        let handle = SlotHandle {
            index: idx,
            generation: slot.generation,
        };
        inner.pending.push_back(idx);
        trace!("virq {} pending in slot {}", req.vno, idx);
        Ok(RaiseStatus::Queued(handle))
    }

    /// Fill free list registers: first restore Active slots saved on the
    /// last exit, then inject Pending slots in FIFO order. Arms the underflow
    /// maintenance interrupt if slots are left waiting. Returns the number of
    /// newly injected slots.
    pub fn on_vcpu_entry(&self, intc: &dyn InterruptController) -> usize {
        let mut inner = self.inner.lock();
        let nr_lrs = intc.nr_lrs().min(GIC_LIST_REGS_NUM);

        for pos in 0..inner.active.len() {
            let idx = inner.active[pos];
            if inner.slots[idx].lr.is_some() {
                continue;
            }
            let Some(lr) = inner.lr_used.first_zero_in(0..nr_lrs) else {
                break;
            };
            let mut reg = inner.lr_of(idx);
            reg.state = inner.slots[idx].saved;
            intc.write_lr(lr, reg);
            inner.lr_used.set(lr);
            inner.slots[idx].lr = Some(lr);
        }

        let mut injected = 0;
        for _ in 0..self.capacity {
            if inner.pending.is_empty() {
                break;
            }
            let Some(lr) = inner.lr_used.first_zero_in(0..nr_lrs) else {
                break;
            };
            let Some(idx) = inner.pending.pop_front() else {
                break;
            };
            intc.write_lr(lr, inner.lr_of(idx));
            inner.lr_used.set(lr);
            let slot = &mut inner.slots[idx];
            slot.lr = Some(lr);
            slot.state = VirqState::Active;
            inner.active.push_back(idx);
            injected += 1;
        }

        intc.set_underflow_irq(!inner.pending.is_empty());
        injected
    }

    /// Read back the list registers of Active slots. Slots the guest is done
    /// with retire, the others are saved and their list registers released.
    /// Returns the hardware lines to unmask, the caller does so after this
    /// returns and only if the binding still holds.
    pub fn on_vcpu_exit(&self, intc: &dyn InterruptController) -> ReclaimList {
        let mut inner = self.inner.lock();
        let mut reclaimed = ReclaimList::new();

        let mut remain = inner.active.len();
        let mut pos = 0;
        while remain > 0 {
            remain -= 1;
            let idx = inner.active[pos];
            let Some(lr) = inner.slots[idx].lr else {
                pos += 1;
                continue;
            };
            let state = intc.read_lr(lr).state;
            intc.write_lr(lr, ListRegister::EMPTY);
            inner.lr_used.clear(lr);
            inner.slots[idx].lr = None;

            if state == LrState::Inactive || inner.slots[idx].cleared {
                if let Some((vno, hno)) = inner.retire(idx) {
                    reclaimed.push(vno, Some(hno));
                }
            } else {
                inner.slots[idx].saved = state;
                pos += 1;
            }
        }

        while let Some(vno) = inner.deferred.first_one_in(0..GIC_INTS_MAX) {
            if !reclaimed.push(vno, None) {
                break;
            }
            inner.deferred.clear(vno);
        }
        intc.set_underflow_irq(false);
        reclaimed
    }

    /// Guest deactivation of an Active `vno` outside the exit hook. Returns
    /// the hardware line to unmask if the slot went back to the pool.
    ///
    /// `intc` is the controller of the cpu the vcpu runs on, `None` when called
    /// from elsewhere. A slot still loaded in a list register is then only
    /// marked, the owner's next exit empties the register and retires it.
    pub fn clear(&self, vno: usize, intc: Option<&dyn InterruptController>) -> Result<Option<usize>> {
        let mut inner = self.inner.lock();
        let idx = match inner.find(vno) {
            Some(idx) if inner.slots[idx].state == VirqState::Active => idx,
            _ => return ErrorKind::NotFound.into(),
        };
        match intc {
            Some(intc) => inner.release_lr(idx, intc),
            None if inner.slots[idx].lr.is_some() => {
                inner.slots[idx].cleared = true;
                trace!("virq {} cleared remotely, retired on exit", vno);
                return Ok(None);
            }
            None => {}
        }
        Ok(inner.retire(idx).map(|(_, hno)| hno))
    }

    /// Withdraw a delivery the guest has not seen yet. An Active slot only
    /// loses its pending re-raise.
    pub fn cancel_pending(&self, vno: usize) -> Result<Option<usize>> {
        let mut inner = self.inner.lock();
        let idx = inner.find(vno).ok_or(ErrorKind::NotFound)?;
        let slot = &mut inner.slots[idx];
        match slot.state {
            VirqState::Active => {
                slot.repend = false;
                Ok(None)
            }
            _ => {
                let line = slot.hw.then_some(slot.hno);
                inner.pending.retain(|i| *i != idx);
                inner.free(idx);
                Ok(line)
            }
        }
    }

    pub fn state(&self, vno: usize) -> VirqState {
        let inner = self.inner.lock();
        inner
            .find(vno)
            .map_or(VirqState::Inactive, |idx| inner.slots[idx].state)
    }

    /// Whether `vno` has a slot that will be Pending again after reclaim.
    pub fn will_repend(&self, vno: usize) -> bool {
        let inner = self.inner.lock();
        inner.find(vno).is_some_and(|idx| inner.slots[idx].repend)
    }

    /// Resolve `handle`, `None` once the slot has been freed.
    pub fn lookup(&self, handle: SlotHandle) -> Option<(usize, VirqState)> {
        let inner = self.inner.lock();
        let slot = inner.slots.get(handle.index)?;
        (inner.used.get(handle.index) && slot.generation == handle.generation).then_some((slot.vno, slot.state))
    }

    pub fn counts(&self) -> VirqCounts {
        let inner = self.inner.lock();
        let used = inner.used.count_ones();
        VirqCounts {
            free: self.capacity - used,
            pending: inner.pending.len(),
            active: inner.active.len(),
            hw: inner.hw_count,
            virt: inner.virt_count,
        }
    }

    pub fn has_irq(&self) -> bool {
        let inner = self.inner.lock();
        !inner.pending.is_empty() || !inner.active.is_empty()
    }

    /// Pending numbers in FIFO order.
    pub fn pending_vnos(&self) -> Vec<usize> {
        let inner = self.inner.lock();
        inner.pending.iter().map(|idx| inner.slots[*idx].vno).collect()
    }

    /// Drop every slot. Only valid while the vcpu is not running, list
    /// registers were already released by its last exit.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        for idx in 0..self.capacity {
            if inner.used.get(idx) {
                inner.free(idx);
            }
        }
        inner.pending.clear();
        inner.active.clear();
        inner.lr_used.clear_all();
        inner.deferred.clear_all();
    }
}
