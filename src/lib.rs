// Copyright (c) 2023 Beihang University, Huawei Technologies Co.,Ltd. All rights reserved.
// Rust-Shyper is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! Virtual interrupt subsystem of the Rust-Shyper type-1 hypervisor.
//! The introduces of all modules are showed below:
//! * [arch]: The interrupt controller abstraction, the GICv2 and GICv3 drivers and the vGIC register emulation.
//! * [config]: Platform and per-vm interrupt layout.
//! * [device]: The emulated device interface trapped guest accesses are dispatched through.
//! * [kernel]: Virtual interrupt descriptors, the per-vcpu slot pools and the delivery pipeline.
//! * [utils]: Bitmaps, register accessors and console output.
//! * [macros]: Defines the print macros.
//! * [error]: Defines the error type.

#![cfg_attr(not(test), no_std)]
#![allow(clippy::upper_case_acronyms)]
#![allow(clippy::enum_variant_names)]
#![allow(clippy::module_inception)]
#![allow(clippy::new_without_default)]

#[macro_use]
extern crate alloc;
#[macro_use]
extern crate log;

#[macro_use]
pub mod macros;

pub mod arch;
pub mod config;
pub mod device;
pub mod error;
pub mod kernel;
pub mod utils;
