// Copyright (c) 2023 Beihang University, Huawei Technologies Co.,Ltd. All rights reserved.
// Rust-Shyper is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

use alloc::boxed::Box;

use crate::kernel::Vcpu;

/// Scheduler trait, the part of the vcpu scheduler interrupt delivery relies on.
///
/// Never called with a virq or descriptor lock held.
pub trait Scheduler: Send + Sync {
    /// id of the calling physical cpu
    fn current_cpu(&self) -> usize;
    /// mark `vcpu` ready, preempting the running one if `preempt`
    fn kick(&self, vcpu: &Vcpu, preempt: bool);
    /// run `f` on physical cpu `cpu`, inline when `cpu` is the caller
    fn cross_cpu_call(&self, cpu: usize, f: Box<dyn FnOnce() + Send>);
}
