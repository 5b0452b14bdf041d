// Copyright (c) 2023 Beihang University, Huawei Technologies Co.,Ltd. All rights reserved.
// Rust-Shyper is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

use alloc::vec::Vec;
use core::fmt::{Display, Formatter};
use core::ops::Range;

use crate::error::{ErrorKind, Result};

/// Class of an interrupt number range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum IrqDomainKind {
    /// Software generated, banked per cpu.
    Sgi,
    /// Private peripheral, banked per cpu.
    Ppi,
    /// Shared peripheral.
    Spi,
    /// Dynamically allocated, no hardware line behind it.
    Virtual,
    /// Reserved ids such as the spurious interrupt.
    Special,
}

impl IrqDomainKind {
    /// Local kinds are banked per cpu (or per vcpu).
    pub fn is_local(&self) -> bool {
        matches!(self, IrqDomainKind::Sgi | IrqDomainKind::Ppi)
    }
}

impl Display for IrqDomainKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            IrqDomainKind::Sgi => write!(f, "sgi"),
            IrqDomainKind::Ppi => write!(f, "ppi"),
            IrqDomainKind::Spi => write!(f, "spi"),
            IrqDomainKind::Virtual => write!(f, "virtual"),
            IrqDomainKind::Special => write!(f, "special"),
        }
    }
}

#[derive(Clone, Debug)]
struct IrqDomain {
    kind: IrqDomainKind,
    range: Range<usize>,
    /// Bump pointer for `allocate_range`.
    next: usize,
}

/// Partition of an interrupt number space into typed domains.
#[derive(Clone, Debug, Default)]
pub struct IrqDomainRegistry {
    domains: Vec<IrqDomain>,
}

impl IrqDomainRegistry {
    pub const fn new() -> Self {
        Self { domains: Vec::new() }
    }

    /// Register `range` as a domain of `kind`. One domain per kind, no overlap.
    pub fn register_domain(&mut self, kind: IrqDomainKind, range: Range<usize>) -> Result<()> {
        if range.is_empty() {
            return ErrorKind::InvalidParam.into();
        }
        if let Some(other) = self
            .domains
            .iter()
            .find(|d| d.kind == kind || (d.range.start < range.end && range.start < d.range.end))
        {
            warn!(
                "register_domain: {} {:?} collides with {} {:?}",
                kind, range, other.kind, other.range
            );
            return ErrorKind::DuplicateRange.into();
        }
        debug!("register_domain: {} {:?}", kind, range);
        self.domains.push(IrqDomain {
            kind,
            next: range.start,
            range,
        });
        Ok(())
    }

    /// Carve `count` contiguous numbers out of the domain of `kind`.
    pub fn allocate_range(&mut self, kind: IrqDomainKind, count: usize) -> Result<Range<usize>> {
        if count == 0 {
            return ErrorKind::InvalidParam.into();
        }
        let domain = self
            .domains
            .iter_mut()
            .find(|d| d.kind == kind)
            .ok_or(ErrorKind::NotFound)?;
        if domain.range.end - domain.next < count {
            return ErrorKind::OutOfRange.into();
        }
        let start = domain.next;
        domain.next += count;
        Ok(start..start + count)
    }

    /// Domain kind of `number` and its index inside that domain.
    pub fn resolve(&self, number: usize) -> Result<(IrqDomainKind, usize)> {
        self.domains
            .iter()
            .find(|d| d.range.contains(&number))
            .map(|d| (d.kind, number - d.range.start))
            .ok_or_else(|| ErrorKind::NotFound.into())
    }

    pub fn range(&self, kind: IrqDomainKind) -> Option<Range<usize>> {
        self.domains.iter().find(|d| d.kind == kind).map(|d| d.range.clone())
    }
}
