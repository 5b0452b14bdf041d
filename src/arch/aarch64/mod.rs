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

use crate::config::GicDesc;
use crate::error::{ErrorKind, Result};

use super::InterruptController;

pub use self::gic::*;
pub use self::gicv2::GicV2;
pub use self::gicv3::{GicCpuInterface, GicV3, GICR_STRIDE};
pub use self::vgicv3::*;

mod gic;
mod gicv2;
mod gicv3;
mod vgicv3;

cfg_if::cfg_if! {
    if #[cfg(target_arch = "aarch64")] {
        pub use self::sysreg::SysRegCpuInterface;
        mod sysreg;
    }
}

const GICV2_COMPATIBLE: &[&str] = &["arm,gic-400", "arm,cortex-a15-gic", "arm,cortex-a9-gic"];
const GICV3_COMPATIBLE: &[&str] = &["arm,gic-v3"];

/// Select and map the interrupt controller driver for the platform.
///
/// Done once at boot; the core only sees the returned trait object.
///
/// # Safety
///
/// The addresses in `desc` must be mapped device memory of the described
/// controller. `cpu_num` redistributor frames must follow `gicr_addr` on GICv3.
pub unsafe fn intc_probe(desc: &GicDesc, cpu_num: usize) -> Result<Arc<dyn InterruptController>> {
    if GICV2_COMPATIBLE.contains(&desc.compatible) {
        info!("intc_probe: GICv2 ({})", desc.compatible);
        return Ok(Arc::new(GicV2::new(desc)?));
    }
    if GICV3_COMPATIBLE.contains(&desc.compatible) {
        info!("intc_probe: GICv3 ({})", desc.compatible);
        return gicv3_probe(desc, cpu_num);
    }
    error!("intc_probe: unsupported interrupt controller {}", desc.compatible);
    ErrorKind::NotFound.into()
}

cfg_if::cfg_if! {
    if #[cfg(target_arch = "aarch64")] {
        unsafe fn gicv3_probe(desc: &GicDesc, cpu_num: usize) -> Result<Arc<dyn InterruptController>> {
            use alloc::boxed::Box;
            let cpuif = Box::new(SysRegCpuInterface::new(None));
            Ok(Arc::new(GicV3::new(desc, cpu_num, cpuif)?))
        }
    } else {
        unsafe fn gicv3_probe(_desc: &GicDesc, _cpu_num: usize) -> Result<Arc<dyn InterruptController>> {
            error!("intc_probe: GICv3 needs the aarch64 system register interface");
            ErrorKind::NotFound.into()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_controller_is_rejected() {
        let desc = GicDesc {
            compatible: "riscv,plic0",
            ..Default::default()
        };
        // SAFETY: probing fails before any address is mapped.
        let err = unsafe { intc_probe(&desc, 1) }.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
