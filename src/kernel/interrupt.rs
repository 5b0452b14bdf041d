// Copyright (c) 2023 Beihang University, Huawei Technologies Co.,Ltd. All rights reserved.
// Rust-Shyper is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! Interrupt delivery core.
//!
//! A forwarded hardware line is masked when it fires and unmasked once the
//! guest has deactivated the virtual interrupt (exit reclaim, `clear` or
//! `cancel_pending`), so every line has at most one delivery in flight.
//!
//! Locks are taken in the order vm descriptor store, vcpu virq struct,
//! driver. None of them is held while calling into the scheduler.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::{Mutex, RwLock};

use crate::arch::{
    vgic_sgi1r_decode, InterruptController, IpiTarget, TriggerType, GIC_INTS_MAX, GIC_PRIVINT_NUM, GIC_SGIS_NUM,
    GIC_SPECIAL_INTID,
};
use crate::config::VmIntcConfig;
use crate::device::{EmuContext, EmuOutcome};
use crate::error::{ErrorKind, Result};

use super::{
    IrqDomainKind, IrqDomainRegistry, RaiseStatus, Scheduler, Vcpu, VcpuState, VirqDesc, VirqFlags, VirqRequest,
    VirqState, Vm, VmState,
};

/// What a physical interrupt is used for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HwRoute {
    /// Forwarded to a vm. `vcpu_id` names the bank of a local line.
    Guest { vm_id: usize, vcpu_id: usize, vno: usize },
    /// Cross cpu kick.
    Doorbell,
    /// List register underflow.
    Maintenance,
}

/// Local lines are keyed by physical cpu, shared ones by `None`.
type RouteKey = (Option<usize>, usize);

#[derive(Clone, Copy, Debug)]
enum HwOp {
    Mask,
    Unmask,
    SetType(TriggerType),
    SetAffinity(usize),
}

pub struct VirqManager {
    intc: Arc<dyn InterruptController>,
    sched: Arc<dyn Scheduler>,
    /// Physical interrupt number space.
    domains: Mutex<IrqDomainRegistry>,
    routes: Mutex<BTreeMap<RouteKey, HwRoute>>,
    vms: RwLock<BTreeMap<usize, Arc<Vm>>>,
    doorbell: usize,
}

impl VirqManager {
    /// Build the core on top of the probed controller. Reserves the doorbell
    /// SGI; the hardware itself is touched by [`Self::init`] and
    /// [`Self::init_cpu`] only.
    pub fn new(intc: Arc<dyn InterruptController>, sched: Arc<dyn Scheduler>) -> Result<Self> {
        let mut domains = IrqDomainRegistry::new();
        domains.register_domain(IrqDomainKind::Sgi, 0..GIC_SGIS_NUM)?;
        domains.register_domain(IrqDomainKind::Ppi, GIC_SGIS_NUM..GIC_PRIVINT_NUM)?;
        let nr_irqs = intc.nr_irqs().min(GIC_SPECIAL_INTID);
        if nr_irqs > GIC_PRIVINT_NUM {
            domains.register_domain(IrqDomainKind::Spi, GIC_PRIVINT_NUM..nr_irqs)?;
        }
        domains.register_domain(IrqDomainKind::Special, GIC_SPECIAL_INTID..GIC_INTS_MAX)?;
        let doorbell = domains.allocate_range(IrqDomainKind::Sgi, 1)?.start;

        let mut routes = BTreeMap::new();
        routes.insert((None, doorbell), HwRoute::Doorbell);
        routes.insert((None, intc.maintenance_irq()), HwRoute::Maintenance);
        info!(
            "virq manager: {} hw interrupts, doorbell sgi {}, maintenance {}",
            nr_irqs,
            doorbell,
            intc.maintenance_irq()
        );

        Ok(Self {
            intc,
            sched,
            domains: Mutex::new(domains),
            routes: Mutex::new(routes),
            vms: RwLock::new(BTreeMap::new()),
            doorbell,
        })
    }

    pub fn intc(&self) -> &Arc<dyn InterruptController> {
        &self.intc
    }

    pub fn sched(&self) -> &Arc<dyn Scheduler> {
        &self.sched
    }

    pub fn doorbell(&self) -> usize {
        self.doorbell
    }

    /// Distributor setup, boot core only.
    pub fn init(&self) {
        self.intc.init();
    }

    /// Per physical cpu setup: cpu interface, doorbell and maintenance lines.
    pub fn init_cpu(&self) {
        self.intc.init_cpu();
        self.intc.unmask(self.doorbell);
        self.intc.unmask(self.intc.maintenance_irq());
        debug!("core {} interrupt init ok", self.sched.current_cpu());
    }

    pub fn vm(&self, vm_id: usize) -> Option<Arc<Vm>> {
        self.vms.read().get(&vm_id).cloned()
    }

    pub(super) fn vm_list(&self) -> Vec<Arc<Vm>> {
        self.vms.read().values().cloned().collect()
    }

    /// Create and register vm `config.vm_id`, then bind its pass-through lines.
    pub fn create_descriptor_store(&self, config: &VmIntcConfig) -> Result<Arc<Vm>> {
        let vm = Arc::new(Vm::new(config)?);
        {
            let mut vms = self.vms.write();
            if vms.contains_key(&config.vm_id) {
                warn!("create_descriptor_store: vm {} exists", config.vm_id);
                return ErrorKind::AlreadyExists.into();
            }
            vms.insert(config.vm_id, vm.clone());
        }
        for irq in config.passthrough.iter() {
            if let Err(err) = self.request(&vm, irq.vcpu, irq.vno, irq.hno, irq.flags) {
                error!(
                    "create_descriptor_store: vm {} pass-through hw {} -> virq {} failed: {:?}",
                    config.vm_id,
                    irq.hno,
                    irq.vno,
                    err.kind()
                );
                let _ = self.destroy_descriptor_store(config.vm_id);
                return Err(err);
            }
        }
        info!(
            "vm {} virq store: {} vcpus, {} shared virqs",
            config.vm_id,
            config.vcpu_num(),
            config.shared_nr()
        );
        Ok(vm)
    }

    /// Unregister vm `vm_id`, masking and unrouting its hardware lines.
    pub fn destroy_descriptor_store(&self, vm_id: usize) -> Result<()> {
        let vm = self.vms.write().remove(&vm_id).ok_or(ErrorKind::NotFound)?;
        self.reset_all(&vm);
        self.routes
            .lock()
            .retain(|_, route| !matches!(route, HwRoute::Guest { vm_id: id, .. } if *id == vm_id));
        vm.set_state(VmState::Offline);
        info!("vm {} virq store destroyed", vm_id);
        Ok(())
    }

    /// Back to power-on state for a reboot: every slot dropped, every
    /// descriptor disabled, hardware lines masked. Bindings are kept.
    /// Vcpus of `vm` must not be running.
    pub fn reset_all(&self, vm: &Vm) {
        let lines: Vec<(usize, usize)> = {
            let mut store = vm.store();
            let lines = store.hw_descs().map(|(vcpu, desc)| (vcpu, desc.hno)).collect();
            store.reset();
            lines
        };
        for vcpu in vm.vcpu_list() {
            vcpu.virq().reset();
        }
        for (vcpu_id, hno) in lines {
            self.hw_op(hno, self.phys_of(vm, vcpu_id), HwOp::Mask);
        }
        debug!("vm {} virqs reset", vm.id());
    }

    /// Change the power state of `vm`. Coming Online re-arms the hardware
    /// lines left masked while deliveries were refused.
    pub fn set_vm_state(&self, vm: &Vm, state: VmState) {
        vm.set_state(state);
        if state != VmState::Online {
            return;
        }
        let lines: Vec<(usize, usize, usize)> = vm
            .store()
            .hw_descs()
            .filter(|(_, desc)| desc.enabled)
            .map(|(vcpu, desc)| (vcpu, desc.vno, desc.hno))
            .collect();
        for (vcpu_id, vno, hno) in lines {
            let idle = vm
                .vcpu(vcpu_id)
                .is_some_and(|vcpu| vcpu.virq().state(vno) == VirqState::Inactive);
            if idle {
                self.hw_op(hno, self.phys_of(vm, vcpu_id), HwOp::Unmask);
            }
        }
    }

    fn phys_of(&self, vm: &Vm, vcpu_id: usize) -> usize {
        vm.vcpu(vcpu_id)
            .map_or_else(|| self.sched.current_cpu(), |vcpu| vcpu.phys_id())
    }

    /// Vcpu whose slot pool carries `desc`: the bank owner for local numbers,
    /// the routing target for shared ones.
    fn owner(desc: &VirqDesc, vcpu_id: usize) -> usize {
        if desc.vno < GIC_PRIVINT_NUM {
            vcpu_id
        } else {
            desc.affinity.vcpu_or(0)
        }
    }

    fn route_key(hno: usize, phys: usize) -> RouteKey {
        if hno < GIC_PRIVINT_NUM {
            (Some(phys), hno)
        } else {
            (None, hno)
        }
    }

    fn route(&self, cpu: usize, hno: usize) -> Option<HwRoute> {
        let routes = self.routes.lock();
        routes
            .get(&(Some(cpu), hno))
            .or_else(|| routes.get(&(None, hno)))
            .copied()
    }

    fn apply(intc: &dyn InterruptController, hno: usize, op: HwOp) {
        match op {
            HwOp::Mask => intc.mask(hno),
            HwOp::Unmask => intc.unmask(hno),
            HwOp::SetType(trigger) => intc.set_type(hno, trigger),
            HwOp::SetAffinity(cpu) => intc.set_affinity(hno, cpu),
        }
    }

    /// Program line `hno`. Local lines are banked, so the access runs on
    /// physical cpu `cpu`.
    fn hw_op(&self, hno: usize, cpu: usize, op: HwOp) {
        if hno >= GIC_PRIVINT_NUM || cpu == self.sched.current_cpu() {
            Self::apply(self.intc.as_ref(), hno, op);
            return;
        }
        let intc = self.intc.clone();
        self.sched
            .cross_cpu_call(cpu, Box::new(move || Self::apply(intc.as_ref(), hno, op)));
    }

    /// Unmask the line behind a retired delivery if `vno` is still enabled and
    /// still bound to it (`hno == None` takes the current binding).
    fn rearm(&self, vm: &Vm, vcpu_id: usize, vno: usize, hno: Option<usize>) {
        let desc = match vm.store().desc(vcpu_id, vno) {
            Ok(desc) => *desc,
            Err(_) => return,
        };
        if desc.hw && desc.enabled && hno.map_or(true, |hno| hno == desc.hno) {
            self.hw_op(desc.hno, self.phys_of(vm, Self::owner(&desc, vcpu_id)), HwOp::Unmask);
        }
    }

    /// Bind `vno` of `vm` (on vcpu `vcpu_id` for local numbers, targeting it
    /// for shared ones) to hardware line `hno`, 0 for none. The line is
    /// programmed and left masked unless the descriptor is enabled.
    pub fn request(&self, vm: &Vm, vcpu_id: usize, vno: usize, hno: usize, flags: VirqFlags) -> Result<()> {
        let phys = vm.vcpu(vcpu_id).ok_or(ErrorKind::InvalidParam)?.phys_id();
        let mut store = vm.store();
        let (vkind, _) = store.resolve(vno)?;

        if hno == 0 {
            let prev = store.bind(vcpu_id, vno, 0, flags)?;
            drop(store);
            if prev.hw {
                let prev_key = Self::route_key(prev.hno, phys);
                self.routes.lock().remove(&prev_key);
                self.hw_op(prev.hno, phys, HwOp::Mask);
            }
            debug!("vm {} vcpu {} virq {} requested", vm.id(), vcpu_id, vno);
            return Ok(());
        }

        let (hkind, _) = self.domains.lock().resolve(hno)?;
        match (hkind, vkind) {
            (IrqDomainKind::Ppi, IrqDomainKind::Ppi) | (IrqDomainKind::Spi, IrqDomainKind::Spi) => {}
            _ => {
                warn!(
                    "request: vm {} can not bind {} hw {} to {} virq {}",
                    vm.id(),
                    hkind,
                    hno,
                    vkind,
                    vno
                );
                return ErrorKind::InvalidParam.into();
            }
        }

        let key = Self::route_key(hno, phys);
        let prev = {
            let mut routes = self.routes.lock();
            // reserved lines are keyed cpu independent
            match routes.get(&key).or_else(|| routes.get(&(None, hno))) {
                Some(HwRoute::Guest {
                    vm_id,
                    vcpu_id: owner,
                    vno: bound,
                }) if *vm_id == vm.id() && *bound == vno && (hkind == IrqDomainKind::Spi || *owner == vcpu_id) => {}
                Some(route) => {
                    warn!("request: hw {} already routed to {:?}", hno, route);
                    return ErrorKind::AlreadyExists.into();
                }
                None => {}
            }
            let prev = store.bind(vcpu_id, vno, hno, flags)?;
            if prev.hw && Self::route_key(prev.hno, phys) != key {
                routes.remove(&Self::route_key(prev.hno, phys));
            }
            routes.insert(
                key,
                HwRoute::Guest {
                    vm_id: vm.id(),
                    vcpu_id,
                    vno,
                },
            );
            prev
        };
        let desc = *store.desc(vcpu_id, vno)?;
        drop(store);

        if prev.hw && prev.hno != hno {
            self.hw_op(prev.hno, phys, HwOp::Mask);
        }
        self.hw_op(hno, phys, HwOp::Mask);
        self.hw_op(hno, phys, HwOp::SetType(desc.trigger));
        if hkind == IrqDomainKind::Spi {
            self.hw_op(hno, phys, HwOp::SetAffinity(phys));
        }
        if desc.enabled {
            self.hw_op(hno, phys, HwOp::Unmask);
        }
        info!(
            "vm {} vcpu {} virq {} bound to hw {} (cpu {})",
            vm.id(),
            vcpu_id,
            vno,
            hno,
            phys
        );
        Ok(())
    }

    /// Bind local `vno` on every vcpu, to the same banked line `hno` if any.
    pub fn request_percpu(&self, vm: &Vm, vno: usize, hno: usize, flags: VirqFlags) -> Result<()> {
        if !vm.store().is_local(vno) {
            return ErrorKind::InvalidParam.into();
        }
        for vcpu_id in 0..vm.cpu_num() {
            self.request(vm, vcpu_id, vno, hno, flags)?;
        }
        Ok(())
    }

    /// Return a dynamically allocated `vno`. Refused while any vcpu still has
    /// it in flight.
    pub fn release(&self, vm: &Vm, vno: usize) -> Result<()> {
        let mut store = vm.store();
        if !store.is_dynamic(vno) {
            return ErrorKind::NotDynamic.into();
        }
        if let Some(vcpu) = vm
            .vcpu_list()
            .iter()
            .find(|vcpu| vcpu.virq().state(vno) != VirqState::Inactive)
        {
            debug!("release: vm {} virq {} in flight on vcpu {}", vm.id(), vno, vcpu.id());
            return ErrorKind::Busy.into();
        }
        store.release(vno)?;
        Ok(())
    }

    pub fn allocate_dynamic(&self, vm: &Vm) -> Result<usize> {
        let vno = vm.store().allocate_dynamic()?;
        debug!("vm {} dynamic virq {}", vm.id(), vno);
        Ok(vno)
    }

    pub fn desc(&self, vm: &Vm, vcpu_id: usize, vno: usize) -> Result<VirqDesc> {
        Ok(*vm.store().desc(vcpu_id, vno)?)
    }

    /// Priority only lives in the list register, the physical line keeps its own.
    pub fn set_priority(&self, vm: &Vm, vcpu_id: usize, vno: usize, priority: u8) -> Result<()> {
        vm.store().set_priority(vcpu_id, vno, priority)?;
        Ok(())
    }

    pub fn set_trigger_type(&self, vm: &Vm, vcpu_id: usize, vno: usize, trigger: TriggerType) -> Result<()> {
        let desc = vm.store().set_trigger_type(vcpu_id, vno, trigger)?;
        if desc.hw {
            let phys = self.phys_of(vm, Self::owner(&desc, vcpu_id));
            self.hw_op(desc.hno, phys, HwOp::SetType(desc.trigger));
        }
        Ok(())
    }

    /// Enable `vno`. A hardware line is unmasked unless a delivery is in
    /// flight, the reclaim of which unmasks it.
    pub fn enable(&self, vm: &Vm, vcpu_id: usize, vno: usize) -> Result<()> {
        let desc = vm.store().set_enabled(vcpu_id, vno, true)?;
        if desc.hw {
            let owner = Self::owner(&desc, vcpu_id);
            let idle = vm
                .vcpu(owner)
                .is_some_and(|vcpu| vcpu.virq().state(vno) == VirqState::Inactive);
            if idle {
                self.hw_op(desc.hno, self.phys_of(vm, owner), HwOp::Unmask);
            }
        }
        Ok(())
    }

    pub fn disable(&self, vm: &Vm, vcpu_id: usize, vno: usize) -> Result<()> {
        let desc = vm.store().set_enabled(vcpu_id, vno, false)?;
        if desc.hw {
            let phys = self.phys_of(vm, Self::owner(&desc, vcpu_id));
            self.hw_op(desc.hno, phys, HwOp::Mask);
        }
        Ok(())
    }

    /// Retarget shared `vno` to vcpu `vcpu_id`, moving its line along.
    pub fn set_route(&self, vm: &Vm, vno: usize, vcpu_id: usize) -> Result<()> {
        let desc = vm.store().set_affinity(vno, vcpu_id)?;
        if desc.hw {
            let phys = self.phys_of(vm, vcpu_id);
            self.hw_op(desc.hno, phys, HwOp::SetAffinity(phys));
        }
        Ok(())
    }

    /// Queue `vno` on vcpu `vcpu_id` and kick it. The descriptor store stays
    /// locked across the raise so a concurrent `release` sees the slot.
    fn deliver(&self, vm: &Vm, vcpu_id: usize, vno: usize, source: usize) -> Result<()> {
        let state = vm.state();
        if matches!(state, VmState::Offline | VmState::Reboot) {
            debug!("deliver: vm {} is {:?}, virq {} refused", vm.id(), state, vno);
            return ErrorKind::InvalidState.into();
        }
        let vcpu = vm.vcpu(vcpu_id).ok_or(ErrorKind::NotFound)?;

        let (status, preempt) = {
            let store = vm.store();
            let desc = store.desc(vcpu_id, vno)?;
            if !desc.enabled {
                trace!("deliver: vm {} virq {} disabled", vm.id(), vno);
                return ErrorKind::InvalidState.into();
            }
            if state == VmState::Suspend && !desc.can_wake {
                return ErrorKind::NotWakeable.into();
            }
            let status = vcpu.virq().raise(VirqRequest {
                vno,
                hno: desc.hno,
                hw: desc.hw,
                priority: desc.priority,
                source,
            })?;
            (status, desc.hw)
        };

        if status != RaiseStatus::Coalesced {
            self.kick(vcpu, preempt);
        }
        Ok(())
    }

    /// Make `vcpu` notice new interrupts: a local kick, or the doorbell of the
    /// cpu it runs on.
    fn kick(&self, vcpu: &Vcpu, preempt: bool) {
        if vcpu.phys_id() == self.sched.current_cpu() {
            self.sched.kick(vcpu, preempt);
        } else {
            self.ipi_send(vcpu.phys_id());
        }
    }

    /// Deliver shared `vno` to its target vcpu.
    pub fn send_to_vm(&self, vm: &Vm, vno: usize) -> Result<()> {
        let target = {
            let store = vm.store();
            if store.is_local(vno) {
                return ErrorKind::InvalidParam.into();
            }
            store.desc(0, vno)?.affinity.vcpu_or(0)
        };
        self.deliver(vm, target, vno, 0)
    }

    /// Deliver `vno` to `vcpu`, whatever its routing says.
    pub fn send_to_vcpu(&self, vcpu: &Vcpu, vno: usize) -> Result<()> {
        let vm = self.vm(vcpu.vm_id()).ok_or(ErrorKind::NotFound)?;
        self.deliver(&vm, vcpu.id(), vno, 0)
    }

    /// SGI `sgi` from `sender` to the vcpus of its vm selected by `targets`.
    /// Every target is tried, the first failure is returned.
    pub fn send_group(&self, sender: &Vcpu, sgi: usize, targets: IpiTarget) -> Result<()> {
        if sgi >= GIC_SGIS_NUM {
            return ErrorKind::InvalidParam.into();
        }
        let vm = self.vm(sender.vm_id()).ok_or(ErrorKind::NotFound)?;
        let all = match vm.cpu_num() {
            n if n >= u64::BITS as usize => u64::MAX,
            n => (1 << n) - 1,
        };
        let mask = match targets {
            IpiTarget::ToSelf => 1 << sender.id(),
            IpiTarget::Cpus(mask) => mask & all,
            IpiTarget::AllButSelf => all & !(1 << sender.id()),
        };

        let mut result = Ok(());
        for vcpu_id in (0..vm.cpu_num()).filter(|id| mask & (1 << *id) != 0) {
            if let Err(err) = self.deliver(&vm, vcpu_id, sgi, sender.id()) {
                warn!(
                    "send_group: vm {} sgi {} vcpu {} -> {}: {:?}",
                    vm.id(),
                    sgi,
                    sender.id(),
                    vcpu_id,
                    err.kind()
                );
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        result
    }

    /// Guest `ICC_SGI1R_EL1` write by vcpu `vcpu_id`.
    pub fn emu_sgi1r(&self, vm: &Vm, vcpu_id: usize, sgi1r: usize) -> Result<()> {
        let sender = vm.vcpu(vcpu_id).ok_or(ErrorKind::NotFound)?;
        let (sgi, targets) = vgic_sgi1r_decode(vcpu_id, sgi1r);
        trace!("emu_sgi1r: vm {} vcpu {} sgi {} {:?}", vm.id(), vcpu_id, sgi, targets);
        self.send_group(sender, sgi, targets)
    }

    /// Set `vno` pending as a guest ISPENDR write does.
    pub fn pend(&self, vm: &Vm, vcpu_id: usize, vno: usize) -> Result<()> {
        if vm.store().is_local(vno) {
            self.deliver(vm, vcpu_id, vno, vcpu_id)
        } else {
            self.send_to_vm(vm, vno)
        }
    }

    fn owner_vcpu<'a>(&self, vm: &'a Vm, vcpu_id: usize, vno: usize) -> Result<&'a Vcpu> {
        let desc = *vm.store().desc(vcpu_id, vno)?;
        vm.vcpu(Self::owner(&desc, vcpu_id)).ok_or_else(|| ErrorKind::NotFound.into())
    }

    pub fn is_pending(&self, vm: &Vm, vcpu_id: usize, vno: usize) -> bool {
        self.owner_vcpu(vm, vcpu_id, vno).is_ok_and(|vcpu| {
            vcpu.virq().state(vno) == VirqState::Pending || vcpu.virq().will_repend(vno)
        })
    }

    pub fn is_active(&self, vm: &Vm, vcpu_id: usize, vno: usize) -> bool {
        self.owner_vcpu(vm, vcpu_id, vno)
            .is_ok_and(|vcpu| vcpu.virq().state(vno) == VirqState::Active)
    }

    /// Withdraw a delivery of `vno` the guest has not seen yet.
    pub fn cancel_pending(&self, vm: &Vm, vcpu_id: usize, vno: usize) -> Result<()> {
        let vcpu = self.owner_vcpu(vm, vcpu_id, vno)?;
        if let Some(hno) = vcpu.virq().cancel_pending(vno)? {
            self.rearm(vm, vcpu.id(), vno, Some(hno));
        }
        Ok(())
    }

    /// Guest deactivation of Active `vno` outside the exit hook. The list
    /// register is only touched on the cpu the vcpu runs on; from any other
    /// cpu the slot retires on the vcpu's next exit.
    pub fn clear(&self, vm: &Vm, vcpu_id: usize, vno: usize) -> Result<()> {
        let vcpu = self.owner_vcpu(vm, vcpu_id, vno)?;
        let local = vcpu.phys_id() == self.sched.current_cpu();
        let intc = local.then_some(self.intc.as_ref());
        if let Some(hno) = vcpu.virq().clear(vno, intc)? {
            self.rearm(vm, vcpu.id(), vno, Some(hno));
        }
        Ok(())
    }

    /// Guest entry of vcpu `vcpu_id`, on the cpu it is pinned to.
    pub fn vcpu_enter(&self, vm: &Vm, vcpu_id: usize) -> Result<usize> {
        let vcpu = vm.vcpu(vcpu_id).ok_or(ErrorKind::NotFound)?;
        vcpu.set_state(VcpuState::Running);
        Ok(vcpu.virq().on_vcpu_entry(self.intc.as_ref()))
    }

    /// Guest exit of vcpu `vcpu_id`: reclaim, then unmask the lines of
    /// retired hardware deliveries.
    pub fn vcpu_exit(&self, vm: &Vm, vcpu_id: usize) -> Result<()> {
        let vcpu = vm.vcpu(vcpu_id).ok_or(ErrorKind::NotFound)?;
        let reclaimed = vcpu.virq().on_vcpu_exit(self.intc.as_ref());
        vcpu.set_state(VcpuState::Ready);
        for (vno, hno) in reclaimed.iter() {
            self.rearm(vm, vcpu_id, *vno, *hno);
        }
        Ok(())
    }

    /// Acknowledge and dispatch one physical interrupt. Returns false on a
    /// spurious acknowledge.
    pub fn handle_irq(&self) -> bool {
        let Some(ack) = self.intc.fetch() else {
            return false;
        };
        if let Err(err) = self.handle_hw_irq(ack.int_id) {
            trace!("handle_irq: int {}: {:?}", ack.int_id, err.kind());
        }
        self.intc.eoi(ack);
        self.intc.deactivate(ack);
        true
    }

    /// Dispatch physical interrupt `int_id` taken on the calling cpu. A
    /// forwarded line is masked here and stays so until its delivery retires.
    pub fn handle_hw_irq(&self, int_id: usize) -> Result<()> {
        let cpu = self.sched.current_cpu();
        match self.route(cpu, int_id) {
            Some(HwRoute::Doorbell) => {
                self.ipi_irq_handler();
                Ok(())
            }
            Some(HwRoute::Maintenance) => {
                // the exit in progress refills the list registers
                self.intc.set_underflow_irq(false);
                trace!("core {} list register underflow", cpu);
                Ok(())
            }
            Some(HwRoute::Guest { vm_id, vcpu_id, vno }) => {
                self.intc.mask(int_id);
                let vm = self.vm(vm_id).ok_or(ErrorKind::NotFound)?;
                let res = if int_id < GIC_PRIVINT_NUM {
                    self.deliver(&vm, vcpu_id, vno, 0)
                } else {
                    self.send_to_vm(&vm, vno)
                };
                if let Err(err) = &res {
                    debug!(
                        "handle_hw_irq: hw {} -> vm {} virq {} held masked: {:?}",
                        int_id,
                        vm_id,
                        vno,
                        err.kind()
                    );
                }
                res
            }
            None => {
                warn!("handle_hw_irq: core {} receive unsupported int {}", cpu, int_id);
                ErrorKind::NotFound.into()
            }
        }
    }

    /// Trapped access of vcpu `vcpu_id` to the emulated interrupt controller.
    pub fn emu_handler(&self, vm: &Vm, vcpu_id: usize, emu_ctx: &mut EmuContext) -> EmuOutcome {
        if !matches!(emu_ctx.width, 1 | 2 | 4 | 8) {
            return EmuOutcome::Unhandled(ErrorKind::InvalidParam.into());
        }
        let Some(dev) = vm.find_emu_dev(emu_ctx.address) else {
            debug!(
                "emu_handler: vm {} vcpu {} no emulated device at {:#x}",
                vm.id(),
                vcpu_id,
                emu_ctx.address
            );
            return EmuOutcome::Unhandled(ErrorKind::Unhandled.into());
        };
        match dev.handler(self, vm, vcpu_id, emu_ctx) {
            Ok(()) => EmuOutcome::Handled,
            Err(err) => EmuOutcome::Unhandled(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PassthroughIrq;
    use crate::kernel::mock::{IntcEvent, MockIntc, MockSched};

    struct Env {
        intc: Arc<MockIntc>,
        sched: Arc<MockSched>,
        mgr: VirqManager,
    }

    fn env() -> Env {
        let intc = Arc::new(MockIntc::new(4));
        let sched = Arc::new(MockSched::default());
        let mgr = VirqManager::new(intc.clone(), sched.clone()).unwrap();
        Env { intc, sched, mgr }
    }

    fn config(vm_id: usize) -> VmIntcConfig {
        VmIntcConfig {
            vm_id,
            vcpu_affinity: vec![0, 1],
            spi_nr: 32,
            virtual_nr: 8,
            slot_nr: 4,
            ..Default::default()
        }
    }

    #[test]
    fn doorbell_is_reserved() {
        let env = env();
        assert_eq!(env.mgr.doorbell(), 0);
        env.mgr.init_cpu();
        assert!(!env.intc.is_masked(0));
        assert!(!env.intc.is_masked(25));
    }

    #[test]
    fn hardware_line_round_trip() {
        let env = env();
        let vm = env.mgr.create_descriptor_store(&config(1)).unwrap();
        env.mgr
            .request(&vm, 1, 40, 55, VirqFlags::ENABLE | VirqFlags::EDGE)
            .unwrap();
        assert!(!env.intc.is_masked(55));
        assert_eq!(env.intc.trigger(55), Some(TriggerType::Edge));
        assert_eq!(env.intc.affinity(55), Some(1));
        let vcpu1 = vm.vcpu(1).unwrap();
        assert_eq!(vcpu1.virq().state(40), VirqState::Inactive);

        // vcpu 1 is pinned to cpu 1, we take the interrupt there
        env.sched.set_cpu(1);
        env.intc.fire(55);
        assert!(env.mgr.handle_irq());
        assert_eq!(vcpu1.virq().state(40), VirqState::Pending);
        assert!(env.intc.is_masked(55));
        assert_eq!(env.sched.kicks(), vec![(1, 1, true)]);

        env.mgr.vcpu_enter(&vm, 1).unwrap();
        assert_eq!(vcpu1.virq().state(40), VirqState::Active);
        assert_eq!(env.intc.lr(0).vintid, 40);
        assert!(env.intc.is_masked(55));

        env.intc.clear_history();
        env.intc.guest_eoi(40);
        env.mgr.vcpu_exit(&vm, 1).unwrap();
        assert_eq!(vcpu1.virq().state(40), VirqState::Inactive);
        assert!(!env.intc.is_masked(55));
        assert_eq!(env.intc.history(), vec![IntcEvent::Unmask(55)]);
    }

    #[test]
    fn remote_vcpus_get_a_doorbell() {
        let env = env();
        let vm = env.mgr.create_descriptor_store(&config(1)).unwrap();
        let vno = env.mgr.allocate_dynamic(&vm).unwrap();
        env.mgr.set_route(&vm, vno, 1).unwrap();
        env.mgr.send_to_vm(&vm, vno).unwrap();
        assert_eq!(env.intc.ipis(), vec![(IpiTarget::Cpus(1 << 1), 0)]);
        assert!(env.sched.kicks().is_empty());

        // cpu 1 takes the doorbell and kicks its vcpu
        env.sched.set_cpu(1);
        env.intc.fire(0);
        assert!(env.mgr.handle_irq());
        assert_eq!(env.sched.kicks(), vec![(1, 1, false)]);
    }

    #[test]
    fn binding_conflicts() {
        let env = env();
        let vm1 = env.mgr.create_descriptor_store(&config(1)).unwrap();
        let vm2 = env.mgr.create_descriptor_store(&config(2)).unwrap();
        env.mgr.request(&vm1, 0, 40, 55, VirqFlags::ENABLE).unwrap();
        assert_eq!(
            env.mgr.request(&vm2, 0, 41, 55, VirqFlags::ENABLE).unwrap_err().kind(),
            ErrorKind::AlreadyExists
        );
        // re-request of the same binding overwrites
        env.mgr.request(&vm1, 1, 40, 55, VirqFlags::empty()).unwrap();
        assert!(env.intc.is_masked(55));
        assert_eq!(env.mgr.desc(&vm1, 0, 40).unwrap().affinity.vcpu_or(0), 1);
        // moving the virq to another line frees the old one
        env.mgr.request(&vm1, 1, 40, 56, VirqFlags::ENABLE).unwrap();
        env.mgr.request(&vm2, 0, 41, 55, VirqFlags::ENABLE).unwrap();

        // class mismatch and reserved lines
        assert_eq!(
            env.mgr.request(&vm1, 0, 42, 27, VirqFlags::ENABLE).unwrap_err().kind(),
            ErrorKind::InvalidParam
        );
        assert_eq!(
            env.mgr.request(&vm1, 0, 27, 25, VirqFlags::ENABLE).unwrap_err().kind(),
            ErrorKind::AlreadyExists
        );
        assert_eq!(
            env.mgr.request(&vm1, 0, 42, 1022, VirqFlags::ENABLE).unwrap_err().kind(),
            ErrorKind::InvalidParam
        );
        assert!(env.mgr.create_descriptor_store(&config(1)).is_err());
    }

    #[test]
    fn private_lines_are_programmed_on_their_cpu() {
        let env = env();
        let vm = env.mgr.create_descriptor_store(&config(1)).unwrap();
        env.mgr
            .request_percpu(&vm, 27, 27, VirqFlags::ENABLE)
            .unwrap();
        // vcpu 0 lives here, vcpu 1 on cpu 1
        assert!(env.sched.calls().contains(&1));
        assert!(!env.sched.calls().contains(&0));
        assert_eq!(
            env.mgr.request_percpu(&vm, 40, 0, VirqFlags::ENABLE).unwrap_err().kind(),
            ErrorKind::InvalidParam
        );

        env.sched.set_cpu(1);
        env.intc.fire(27);
        env.mgr.handle_irq();
        assert_eq!(vm.vcpu(1).unwrap().virq().state(27), VirqState::Pending);
        assert_eq!(vm.vcpu(0).unwrap().virq().state(27), VirqState::Inactive);
    }

    #[test]
    fn power_state_gates_delivery() {
        let env = env();
        let mut cfg = config(1);
        cfg.passthrough.push(PassthroughIrq {
            vno: 41,
            hno: 60,
            vcpu: 0,
            flags: VirqFlags::ENABLE | VirqFlags::CAN_WAKEUP,
        });
        let vm = env.mgr.create_descriptor_store(&cfg).unwrap();
        env.mgr.request(&vm, 0, 40, 0, VirqFlags::ENABLE).unwrap();

        env.mgr.set_vm_state(&vm, VmState::Suspend);
        assert_eq!(env.mgr.send_to_vm(&vm, 40).unwrap_err().kind(), ErrorKind::NotWakeable);
        env.mgr.send_to_vm(&vm, 41).unwrap();

        env.mgr.set_vm_state(&vm, VmState::Reboot);
        assert_eq!(env.mgr.send_to_vm(&vm, 40).unwrap_err().kind(), ErrorKind::InvalidState);
        env.mgr.set_vm_state(&vm, VmState::Online);
        env.mgr.send_to_vm(&vm, 40).unwrap();

        env.mgr.disable(&vm, 0, 40).unwrap();
        assert_eq!(env.mgr.send_to_vm(&vm, 40).unwrap_err().kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn suspended_lines_are_rearmed_on_resume() {
        let env = env();
        let vm = env.mgr.create_descriptor_store(&config(1)).unwrap();
        env.mgr.request(&vm, 0, 40, 55, VirqFlags::ENABLE).unwrap();
        env.mgr.set_vm_state(&vm, VmState::Suspend);
        env.intc.fire(55);
        env.mgr.handle_irq();
        assert!(env.intc.is_masked(55));
        env.mgr.set_vm_state(&vm, VmState::Online);
        assert!(!env.intc.is_masked(55));
    }

    #[test]
    fn release_waits_for_drain() {
        let env = env();
        let vm = env.mgr.create_descriptor_store(&config(1)).unwrap();
        let vno = env.mgr.allocate_dynamic(&vm).unwrap();
        assert_eq!(vno, 64);
        env.mgr.send_to_vm(&vm, vno).unwrap();
        assert_eq!(env.mgr.release(&vm, vno).unwrap_err().kind(), ErrorKind::Busy);

        env.mgr.vcpu_enter(&vm, 0).unwrap();
        env.intc.guest_eoi(vno);
        env.mgr.vcpu_exit(&vm, 0).unwrap();
        env.mgr.release(&vm, vno).unwrap();
        assert_eq!(env.mgr.release(&vm, 40).unwrap_err().kind(), ErrorKind::NotDynamic);
    }

    #[test]
    fn group_sgis() {
        let env = env();
        let mut cfg = config(1);
        cfg.vcpu_affinity = vec![0, 0, 0];
        let vm = env.mgr.create_descriptor_store(&cfg).unwrap();
        let sender = vm.vcpu(1).unwrap();
        env.mgr.send_group(sender, 3, IpiTarget::AllButSelf).unwrap();
        assert_eq!(vm.vcpu(0).unwrap().virq().state(3), VirqState::Pending);
        assert_eq!(vm.vcpu(1).unwrap().virq().state(3), VirqState::Inactive);
        assert_eq!(vm.vcpu(2).unwrap().virq().state(3), VirqState::Pending);

        env.mgr.emu_sgi1r(&vm, 0, (5 << 24) | 0b1).unwrap();
        assert_eq!(vm.vcpu(0).unwrap().virq().state(5), VirqState::Pending);
        assert_eq!(
            env.mgr.send_group(sender, 16, IpiTarget::ToSelf).unwrap_err().kind(),
            ErrorKind::InvalidParam
        );

        env.mgr.vcpu_enter(&vm, 0).unwrap();
        assert_eq!(env.intc.lr(0).source, 1);
    }

    #[test]
    fn exhaustion_defers_the_hardware_line() {
        let env = env();
        let vm = env.mgr.create_descriptor_store(&config(1)).unwrap();
        env.mgr.request(&vm, 0, 40, 55, VirqFlags::ENABLE).unwrap();
        for vno in 41..45 {
            env.mgr.request(&vm, 0, vno, 0, VirqFlags::ENABLE).unwrap();
            env.mgr.send_to_vm(&vm, vno).unwrap();
        }
        env.intc.fire(55);
        env.mgr.handle_irq();
        assert!(env.intc.is_masked(55));

        env.mgr.vcpu_enter(&vm, 0).unwrap();
        env.intc.guest_eoi_all();
        env.mgr.vcpu_exit(&vm, 0).unwrap();
        assert!(!env.intc.is_masked(55));
    }

    #[test]
    fn reset_and_destroy() {
        let env = env();
        let vm = env.mgr.create_descriptor_store(&config(1)).unwrap();
        env.mgr.request(&vm, 0, 40, 55, VirqFlags::ENABLE).unwrap();
        env.mgr.send_to_vm(&vm, 40).unwrap();
        env.mgr.reset_all(&vm);
        assert!(!vm.vcpu(0).unwrap().has_irq());
        assert!(env.intc.is_masked(55));
        assert!(!env.mgr.desc(&vm, 0, 40).unwrap().enabled);
        assert_eq!(env.mgr.desc(&vm, 0, 40).unwrap().hno, 55);

        env.mgr.destroy_descriptor_store(1).unwrap();
        assert!(env.mgr.vm(1).is_none());
        assert_eq!(vm.state(), VmState::Offline);
        let vm2 = env.mgr.create_descriptor_store(&config(2)).unwrap();
        env.mgr.request(&vm2, 0, 40, 55, VirqFlags::ENABLE).unwrap();
        assert_eq!(
            env.mgr.destroy_descriptor_store(1).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn guest_deactivation_paths() {
        let env = env();
        let vm = env.mgr.create_descriptor_store(&config(1)).unwrap();
        env.mgr.request(&vm, 0, 40, 55, VirqFlags::ENABLE).unwrap();
        env.intc.fire(55);
        env.mgr.handle_irq();
        env.mgr.vcpu_enter(&vm, 0).unwrap();
        assert!(env.mgr.is_active(&vm, 0, 40));
        env.mgr.clear(&vm, 0, 40).unwrap();
        assert!(!env.intc.is_masked(55));
        assert_eq!(env.intc.lr(0), crate::arch::ListRegister::EMPTY);

        env.intc.fire(55);
        env.mgr.handle_irq();
        assert!(env.mgr.is_pending(&vm, 1, 40));
        env.mgr.cancel_pending(&vm, 0, 40).unwrap();
        assert!(!env.intc.is_masked(55));
        assert!(!vm.vcpu(0).unwrap().has_irq());
    }

    #[test]
    fn deactivation_from_another_cpu_waits_for_exit() {
        let env = env();
        let vm = env.mgr.create_descriptor_store(&config(1)).unwrap();
        env.mgr.request(&vm, 1, 40, 55, VirqFlags::ENABLE).unwrap();
        env.sched.set_cpu(1);
        env.intc.fire(55);
        env.mgr.handle_irq();
        env.mgr.vcpu_enter(&vm, 1).unwrap();
        assert_eq!(env.intc.lr(0).vintid, 40);

        // ICACTIVER write trapped on vcpu 0, cpu 0
        env.sched.set_cpu(0);
        env.mgr.clear(&vm, 0, 40).unwrap();
        assert!(env.intc.is_masked(55));
        assert_eq!(env.intc.lr(0).vintid, 40);

        env.sched.set_cpu(1);
        env.mgr.vcpu_exit(&vm, 1).unwrap();
        assert_eq!(env.intc.lr(0), crate::arch::ListRegister::EMPTY);
        assert_eq!(vm.vcpu(1).unwrap().virq().state(40), VirqState::Inactive);
        assert!(!env.intc.is_masked(55));
    }
}
