/*
 * Copyright 2022 - Jahred Love
 *
 * Redistribution and use in source and binary forms, with or without modification,
 * are permitted provided that the following conditions are met:
 *
 * 1. Redistributions of source code must retain the above copyright notice, this
 * list of conditions and the following disclaimer.
 *
 * 2. Redistributions in binary form must reproduce the above copyright notice, this
 * list of conditions and the following disclaimer in the documentation and/or other
 * materials provided with the distribution.
 *
 * 3. Neither the name of the copyright holder nor the names of its contributors may
 * be used to endorse or promote products derived from this software without specific
 * prior written permission.
 *
 * THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS “AS IS” AND
 * ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT LIMITED TO, THE IMPLIED
 * WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE DISCLAIMED.
 * IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT,
 * INDIRECT, INCIDENTAL, SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT
 * NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR SERVICES; LOSS OF USE, DATA, OR
 * PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
 * WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE)
 * ARISING IN ANY WAY OUT OF THE USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE
 * POSSIBILITY OF SUCH DAMAGE.
 */

//! First-pass accumulator.
//!
//! The preprocess pass runs the emitter once with output discarded, and
//! collects what the real pass needs: per-local usage intervals (keyed by
//! reader byte positions) with write flags, the write positions that
//! dominate later reads, and constant-value frequencies for the prelude
//! pool.

use crate::value::{StackOffset, Val};

/// Open-interval sentinel for `UsageInterval::end`.
pub const OPEN: usize = usize::MAX;

#[derive(Clone, Debug)]
pub struct UsageInterval {
    pub start: usize,
    pub end: usize,
    /// Copies of the same local already on the shadow stack at interval
    /// start.
    pub push_count: usize,
    pub has_write: bool,
}

#[derive(Clone, Debug, Default)]
pub struct LocalUsage {
    pub needs_init: bool,
    /// Write positions not shadowed by any branch in an enclosing block.
    pub definite_writes: Vec<usize>,
    /// Write positions since the last branching opcode.
    pub writes_since_branch: Vec<usize>,
    pub intervals: Vec<UsageInterval>,
}

#[derive(Clone, Debug)]
pub struct Constant {
    pub value: Val,
    pub count: usize,
    /// Prelude slot, assigned at the preprocess/emit transition.
    pub slot: StackOffset,
}

#[derive(Default)]
pub struct Preprocess {
    pub active: bool,
    pub locals: Vec<LocalUsage>,
    pub constants: Vec<Constant>,
}

impl Preprocess {
    pub fn reset(&mut self, local_count: usize) {
        self.locals.clear();
        self.locals.resize(local_count, LocalUsage::default());
        self.constants.clear();
    }

    /// A `local.get` at `pos` opens a usage interval. Also decides
    /// whether the local is read before any write can have happened.
    pub fn local_read(&mut self, local: usize, pos: usize, push_count: usize) {
        if !self.active {
            return;
        }
        let info = &mut self.locals[local];
        info.intervals.push(UsageInterval {
            start: pos,
            end: OPEN,
            push_count,
            has_write: false,
        });
        if !info.needs_init
            && info.writes_since_branch.is_empty()
            && !info.definite_writes.iter().any(|&w| w < pos)
        {
            info.needs_init = true;
        }
    }

    /// A `local.set`/`local.tee` at `pos`. `definite` is false when any
    /// enclosing block has already seen a branch.
    pub fn local_write(&mut self, local: usize, pos: usize, definite: bool) {
        if !self.active {
            return;
        }
        let info = &mut self.locals[local];
        for iv in &mut info.intervals {
            if iv.start <= pos && pos <= iv.end {
                iv.has_write = true;
            }
        }
        if definite {
            info.definite_writes.push(pos);
        }
        info.writes_since_branch.push(pos);
    }

    /// Close the most recent open interval of `local` at `pos` (a pop of
    /// the shadow-stack entry backed by it).
    pub fn close_interval(&mut self, local: usize, pos: usize) {
        if !self.active {
            return;
        }
        for iv in self.locals[local].intervals.iter_mut().rev() {
            if iv.end == OPEN {
                iv.end = pos;
                return;
            }
        }
        debug_assert!(false, "no open interval for local {local}");
    }

    /// A branching opcode invalidates every local's
    /// writes-since-last-branch set.
    pub fn branch_seen(&mut self) {
        if !self.active {
            return;
        }
        for info in &mut self.locals {
            info.writes_since_branch.clear();
        }
    }

    /// True when no usage interval containing `pos` has a write, so a
    /// `local.get` may push the home slot directly instead of a copy.
    pub fn direct_ref_ok(&self, local: usize, pos: usize) -> bool {
        self.locals[local]
            .intervals
            .iter()
            .all(|iv| !(iv.start <= pos && pos <= iv.end && iv.has_write))
    }

    /// Count a constant observation; the pool is kept close to `k`
    /// entries by truncating the least-frequent quarter overflow.
    pub fn note_constant(&mut self, value: Val, k: usize) {
        if !self.active {
            return;
        }
        match self.constants.iter_mut().find(|c| c.value == value) {
            Some(c) => c.count += 1,
            None => self.constants.push(Constant {
                value,
                count: 1,
                slot: 0,
            }),
        }
        if self.constants.len() > k + k / 4 {
            self.organize();
            self.constants.truncate(k);
        }
    }

    /// Stable sort by descending frequency.
    pub fn organize(&mut self) {
        self.constants.sort_by(|a, b| b.count.cmp(&a.count));
    }

    /// Slot of a retained constant, valid after the transition pass.
    pub fn find_slot(&self, value: &Val) -> Option<StackOffset> {
        self.constants
            .iter()
            .find(|c| c.value == *value)
            .map(|c| c.slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active() -> Preprocess {
        let mut p = Preprocess::default();
        p.active = true;
        p.reset(2);
        p
    }

    #[test]
    fn read_before_any_write_needs_init() {
        let mut p = active();
        p.local_read(0, 10, 0);
        assert!(p.locals[0].needs_init);
        assert_eq!(p.locals[0].intervals[0].push_count, 0);

        let mut p = active();
        p.local_write(1, 5, true);
        p.local_read(1, 10, 0);
        assert!(!p.locals[1].needs_init);
    }

    #[test]
    fn conditional_write_does_not_dominate() {
        let mut p = active();
        // write under a branch: recorded but not definite, and a branch
        // clears the since-branch set before the read
        p.local_write(0, 5, false);
        p.branch_seen();
        p.local_read(0, 10, 0);
        assert!(p.locals[0].needs_init);
    }

    #[test]
    fn write_inside_open_interval_blocks_direct_ref() {
        let mut p = active();
        p.local_read(0, 10, 0);
        p.local_write(0, 12, true);
        p.close_interval(0, 14);
        assert!(!p.direct_ref_ok(0, 12));
        assert!(p.direct_ref_ok(0, 20));
    }

    #[test]
    fn constant_pool_truncates_to_k() {
        let mut p = active();
        let k = 6;
        for round in 0..10 {
            for v in 0..6u32 {
                p.note_constant(Val::i32(v), k);
                let _ = round;
            }
        }
        // eight singletons push the pool past k + k/4
        for v in 100..108u32 {
            p.note_constant(Val::i32(v), k);
        }
        assert!(p.constants.len() <= k + k / 4);
        p.organize();
        p.constants.truncate(k);
        for c in &p.constants {
            assert!(c.count >= 10, "frequent constants survive truncation");
        }
    }
}
