// Copyright (c) 2023 Beihang University, Huawei Technologies Co.,Ltd. All rights reserved.
// Rust-Shyper is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

/// Trigger mode of an interrupt line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TriggerType {
    #[default]
    Level,
    Edge,
}

/// Destination of a software generated interrupt.
///
/// Used both for physical cpus (doorbells) and for vcpus of one vm (guest SGIs);
/// bit `n` of `Cpus` selects cpu or vcpu `n`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IpiTarget {
    ToSelf,
    Cpus(u64),
    AllButSelf,
}

/// An acknowledged physical interrupt, handed back for EOI and deactivation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IrqAck {
    pub int_id: usize,
    /// Raw acknowledge register value, it carries the SGI source on GICv2.
    pub raw: usize,
}

/// State field of a list register.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LrState {
    #[default]
    Inactive = 0,
    Pending = 1,
    Active = 2,
    PendingActive = 3,
}

impl LrState {
    pub fn from_bits(bits: usize) -> LrState {
        match bits & 0b11 {
            0 => LrState::Inactive,
            1 => LrState::Pending,
            2 => LrState::Active,
            _ => LrState::PendingActive,
        }
    }
}

/// Controller-independent view of one list register.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct ListRegister {
    pub vintid: usize,
    pub pintid: usize,
    pub priority: u8,
    pub hw: bool,
    pub group1: bool,
    pub state: LrState,
    /// Requesting vcpu of an SGI, only encoded by GICv2.
    pub source: usize,
}

impl ListRegister {
    pub const EMPTY: ListRegister = ListRegister {
        vintid: 0,
        pintid: 0,
        priority: 0,
        hw: false,
        group1: false,
        state: LrState::Inactive,
        source: 0,
    };
}

/// Physical interrupt controller driver.
///
/// Object safe so the core can hold the variant picked at boot behind an
/// `Arc<dyn InterruptController>`. Distributor writes are serialized inside the
/// driver; list registers belong to the calling cpu and are not locked.
pub trait InterruptController: Send + Sync {
    /// Global (boot core) initialization.
    fn init(&self);
    /// Per-cpu initialization, run on every physical cpu.
    fn init_cpu(&self);
    /// Number of interrupt ids the distributor implements.
    fn nr_irqs(&self) -> usize;
    /// Interrupt id of the virtualization maintenance interrupt.
    fn maintenance_irq(&self) -> usize;

    fn mask(&self, int_id: usize);
    fn unmask(&self, int_id: usize);
    fn set_type(&self, int_id: usize, trigger: TriggerType);
    fn set_priority(&self, int_id: usize, priority: u8);
    /// Route a shared interrupt to physical cpu `cpu`. Local interrupts ignore it.
    fn set_affinity(&self, int_id: usize, cpu: usize);
    fn send_ipi(&self, target: IpiTarget, sgi: usize);
    fn read_pending(&self, int_id: usize) -> bool;

    /// Acknowledge the highest priority pending interrupt, `None` on spurious.
    fn fetch(&self) -> Option<IrqAck>;
    /// Priority drop.
    fn eoi(&self, ack: IrqAck);
    fn deactivate(&self, ack: IrqAck);

    fn nr_lrs(&self) -> usize;
    fn read_lr(&self, idx: usize) -> ListRegister;
    fn write_lr(&self, idx: usize, lr: ListRegister);
    /// Arm or disarm the maintenance interrupt signalling list register underflow.
    fn set_underflow_irq(&self, enable: bool);
}
