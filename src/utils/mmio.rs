// Copyright (c) 2023 Beihang University, Huawei Technologies Co.,Ltd. All rights reserved.
// Rust-Shyper is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

use core::mem::align_of;
use core::ops::Deref;
use core::ptr::NonNull;

/// A register block mapped at a fixed address.
pub struct MmioBlock<T> {
    ptr: NonNull<T>,
}

impl<T> MmioBlock<T> {
    /// Map a register block at `base`. Returns `None` for a null or misaligned base.
    ///
    /// # Safety
    ///
    /// `base` must point to memory (device or normal) that is valid as `T` for
    /// the lifetime of the returned block and is only accessed through
    /// volatile register operations.
    pub unsafe fn new(base: usize) -> Option<Self> {
        if base % align_of::<T>() != 0 {
            return None;
        }
        NonNull::new(base as *mut T).map(|ptr| Self { ptr })
    }

    pub fn base(&self) -> usize {
        self.ptr.as_ptr() as usize
    }
}

// SAFETY: Registers are only touched through volatile accesses, drivers
// serialize read-modify-write sequences with their own lock.
unsafe impl<T> Send for MmioBlock<T> {}
unsafe impl<T> Sync for MmioBlock<T> {}

impl<T> Deref for MmioBlock<T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: `ptr` is aligned and valid as `T` as promised by the caller of `new`.
        unsafe { self.ptr.as_ref() }
    }
}
