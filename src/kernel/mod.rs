// Copyright (c) 2023 Beihang University, Huawei Technologies Co.,Ltd. All rights reserved.
// Rust-Shyper is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! Virtual interrupt core: descriptors, per-vcpu slot pools and the
//! delivery pipeline tying them to the physical controller.

pub use self::interrupt::*;
pub use self::irq_domain::*;
pub use self::logger::*;
pub use self::sched::*;
pub use self::vcpu::*;
pub use self::virq::*;
pub use self::virq_desc::*;
pub use self::vm::*;

mod interrupt;
mod ipi;
mod irq_domain;
mod logger;
#[cfg(test)]
pub mod mock;
mod sched;
mod vcpu;
mod virq;
mod virq_desc;
mod vm;
