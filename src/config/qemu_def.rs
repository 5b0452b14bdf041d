// Copyright (c) 2023 Beihang University, Huawei Technologies Co.,Ltd. All rights reserved.
// Rust-Shyper is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

use super::GicDesc;

// qemu virt machine layout
pub const QEMU_GICD_BASE: usize = 0x0800_0000;
pub const QEMU_GICC_BASE: usize = 0x0801_0000;
pub const QEMU_GICH_BASE: usize = 0x0803_0000;
pub const QEMU_GICR_BASE: usize = 0x080a_0000;
pub const QEMU_MAINTENANCE_INT_ID: usize = 25;

pub const QEMU_GICV2_DESC: GicDesc = GicDesc {
    compatible: "arm,cortex-a15-gic",
    gicd_addr: QEMU_GICD_BASE,
    gicc_addr: QEMU_GICC_BASE,
    gich_addr: QEMU_GICH_BASE,
    gicr_addr: 0,
    maintenance_int_id: QEMU_MAINTENANCE_INT_ID,
};

pub const QEMU_GICV3_DESC: GicDesc = GicDesc {
    compatible: "arm,gic-v3",
    gicd_addr: QEMU_GICD_BASE,
    gicc_addr: 0,
    gich_addr: 0,
    gicr_addr: QEMU_GICR_BASE,
    maintenance_int_id: QEMU_MAINTENANCE_INT_ID,
};
