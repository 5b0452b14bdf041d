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
use core::ops::Range;

const WORD_BITS: usize = usize::BITS as usize;

/// Fixed-length bitmap. The storage is sized once at creation, so none of the
/// accessors allocate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BitMap {
    words: Vec<usize>,
    len: usize,
}

impl BitMap {
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(WORD_BITS)],
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, bit: usize) -> bool {
        if bit >= self.len {
            return false;
        }
        self.words[bit / WORD_BITS] & (1 << (bit % WORD_BITS)) != 0
    }

    pub fn set(&mut self, bit: usize) {
        if bit < self.len {
            self.words[bit / WORD_BITS] |= 1 << (bit % WORD_BITS);
        }
    }

    pub fn clear(&mut self, bit: usize) {
        if bit < self.len {
            self.words[bit / WORD_BITS] &= !(1 << (bit % WORD_BITS));
        }
    }

    pub fn clear_all(&mut self) {
        self.words.iter_mut().for_each(|w| *w = 0);
    }

    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// First clear bit inside `range`, scanning upwards.
    pub fn first_zero_in(&self, range: Range<usize>) -> Option<usize> {
        let end = range.end.min(self.len);
        let mut bit = range.start;
        while bit < end {
            let word = self.words[bit / WORD_BITS];
            if word == usize::MAX && bit % WORD_BITS == 0 {
                bit += WORD_BITS;
                continue;
            }
            if word & (1 << (bit % WORD_BITS)) == 0 {
                return Some(bit);
            }
            bit += 1;
        }
        None
    }

    pub fn first_zero(&self) -> Option<usize> {
        self.first_zero_in(0..self.len)
    }

    /// First set bit inside `range`, scanning upwards.
    pub fn first_one_in(&self, range: Range<usize>) -> Option<usize> {
        let end = range.end.min(self.len);
        let mut bit = range.start;
        while bit < end {
            let word = self.words[bit / WORD_BITS];
            if word == 0 && bit % WORD_BITS == 0 {
                bit += WORD_BITS;
                continue;
            }
            if word & (1 << (bit % WORD_BITS)) != 0 {
                return Some(bit);
            }
            bit += 1;
        }
        None
    }

    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter(move |&bit| self.get(bit))
    }
}
