//! Local-slot allocator.
//!
//! Runs after a body has been emitted and reassigns the offsets of locals
//! and retained constants from live-range intervals, then rewrites every
//! operand offset in the buffer. Entities whose live ranges do not
//! overlap share physical slots; free slots are kept in three
//! width-keyed freelists whose contents always partition the free area:
//! two adjacent free 4-byte slots whose lower offset is 8-aligned merge
//! into an 8-byte slot, two adjacent free 8-byte slots whose lower offset
//! is 16-aligned merge into a 16-byte slot, and allocation splits wider
//! slots back down. Parameters keep their declared home offsets and are
//! never released; prelude constants are pre-allocated the same way.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use tracing::trace;

use super::LocalSlot;
use crate::bytecode::{records, Tail, Writer};
use crate::module::CatchEntry;
use crate::opcode::{Family, Op};
use crate::value::{StackOffset, ValueKind};

pub(crate) struct Input<'a> {
    pub writer: &'a mut Writer,
    pub locals: &'a [LocalSlot],
    pub param_count: usize,
    pub constants: &'a [(ValueKind, StackOffset)],
    pub initial_stack_size: u32,
    pub required_stack_size: &'a mut u32,
    pub catch_table: &'a mut Vec<CatchEntry>,
    /// Per entry of `locals`: the preprocess pass saw a read that no
    /// write dominates.
    pub needs_init_hint: &'a [bool],
    pub collect_debug: bool,
}

pub(crate) struct Outcome {
    pub locals: Vec<(ValueKind, StackOffset)>,
    pub constant_slots: Vec<StackOffset>,
    pub live_ranges: Option<Vec<(StackOffset, usize, usize)>>,
}

const NO_POS: usize = usize::MAX;

struct Entity {
    old: StackOffset,
    kind: ValueKind,
    is_param: bool,
    is_const: bool,
    const_order: usize,
    start: usize,
    end: usize,
    sets: Vec<usize>,
    gets: Vec<usize>,
    needs_init: bool,
    new: StackOffset,
    allocated: bool,
}

impl Entity {
    fn unused(&self) -> bool {
        !self.is_param && (self.start == NO_POS || self.start == self.end)
    }

    fn pinned(&self) -> bool {
        self.is_param || self.is_const
    }
}

#[derive(Default)]
struct FreeLists {
    free4: BTreeSet<u32>,
    free8: BTreeSet<u32>,
    free16: BTreeSet<u32>,
}

impl FreeLists {
    fn alloc(&mut self, width: u32, high: &mut u32) -> u32 {
        match width {
            4 => {
                if let Some(o) = self.free4.pop_first() {
                    o
                } else if let Some(o) = self.free8.pop_first() {
                    self.release(o + 4, 4);
                    o
                } else if let Some(o) = self.free16.pop_first() {
                    self.release(o + 4, 4);
                    self.release(o + 8, 8);
                    o
                } else {
                    self.append(4, high)
                }
            }
            8 => {
                if let Some(o) = self.free8.pop_first() {
                    o
                } else if let Some(o) = self.free16.pop_first() {
                    self.release(o + 8, 8);
                    o
                } else {
                    self.append(8, high)
                }
            }
            _ => {
                if let Some(o) = self.free16.pop_first() {
                    o
                } else {
                    self.append(16, high)
                }
            }
        }
    }

    /// Appends a fresh slot past the high-water mark, aligning it to its
    /// width; padding gaps become free slots again.
    fn append(&mut self, width: u32, high: &mut u32) -> u32 {
        while *high % width != 0 {
            if *high % 8 != 0 {
                self.release(*high, 4);
                *high += 4;
            } else {
                self.release(*high, 8);
                *high += 8;
            }
        }
        let o = *high;
        *high += width;
        o
    }

    /// Inserts a freed slot and merges buddies upward so the freelists
    /// keep partitioning the free area with no gaps.
    fn release(&mut self, mut offset: u32, mut width: u32) {
        loop {
            match width {
                4 => {
                    if offset % 8 == 0 && self.free4.remove(&(offset + 4)) {
                        width = 8;
                    } else if offset % 8 == 4 && self.free4.remove(&(offset - 4)) {
                        offset -= 4;
                        width = 8;
                    } else {
                        self.free4.insert(offset);
                        return;
                    }
                }
                8 => {
                    if offset % 16 == 0 && self.free8.remove(&(offset + 8)) {
                        width = 16;
                    } else if offset % 16 == 8 && self.free8.remove(&(offset - 8)) {
                        offset -= 8;
                        width = 16;
                    } else {
                        self.free8.insert(offset);
                        return;
                    }
                }
                _ => {
                    self.free16.insert(offset);
                    return;
                }
            }
        }
    }
}

pub(crate) fn optimize_locals(input: Input) -> Outcome {
    // Nothing to compact when the function declares no locals; constants
    // keep their preprocess-assigned slots.
    if input.locals.len() == input.param_count {
        return Outcome {
            locals: input.locals.iter().map(|l| (l.kind, l.pos)).collect(),
            constant_slots: input.constants.iter().map(|c| c.1).collect(),
            live_ranges: None,
        };
    }

    let mut entities: Vec<Entity> = Vec::new();
    let mut by_old: BTreeMap<StackOffset, usize> = BTreeMap::new();

    for (i, l) in input.locals.iter().enumerate() {
        let is_param = i < input.param_count;
        let mut e = Entity {
            old: l.pos,
            kind: l.kind,
            is_param,
            is_const: false,
            const_order: 0,
            start: NO_POS,
            end: 0,
            sets: Vec::new(),
            gets: Vec::new(),
            needs_init: false,
            new: 0,
            allocated: false,
        };
        if is_param {
            e.start = 0;
            e.sets.push(0);
        }
        by_old.insert(e.old, entities.len());
        entities.push(e);
    }
    for (order, &(kind, slot)) in input.constants.iter().enumerate() {
        by_old.insert(slot, entities.len());
        entities.push(Entity {
            old: slot,
            kind,
            is_param: false,
            is_const: true,
            const_order: order,
            start: NO_POS,
            end: 0,
            sets: Vec::new(),
            gets: Vec::new(),
            needs_init: false,
            new: 0,
            allocated: false,
        });
    }

    // Step 1: one walk over the records collects naive intervals,
    // set/get positions and the jump graph.
    let mut jumps: Vec<(usize, usize)> = Vec::new();
    let buf_len = input.writer.len();
    {
        let buf = input.writer.bytes();
        let touch = |entities: &mut Vec<Entity>, off: StackOffset, pos: usize, is_set: bool| {
            if let Some(&ei) = by_old.get(&off) {
                let e = &mut entities[ei];
                e.start = e.start.min(pos);
                e.end = e.end.max(pos);
                if is_set {
                    e.sets.push(pos);
                } else {
                    e.gets.push(pos);
                }
            }
        };
        for rec in records(buf) {
            let ops = rec.operands();
            for field in ops.srcs.iter().flatten() {
                let off = u16::from_le_bytes(buf[*field..*field + 2].try_into().unwrap());
                touch(&mut entities, off, rec.pos, false);
            }
            if let Some(field) = ops.dst {
                let off = u16::from_le_bytes(buf[field..field + 2].try_into().unwrap());
                touch(&mut entities, off, rec.pos, true);
            }
            if let Some(Tail::Offsets { pos, count }) = rec.tail() {
                let param_cells = match rec.op.family() {
                    Family::Call => rec.u16_field(2) as usize,
                    Family::CallIndirect => rec.u16_field(4) as usize,
                    _ => count, // end/throw tails are all reads
                };
                for i in 0..count {
                    let off =
                        u16::from_le_bytes(buf[pos + i * 2..pos + i * 2 + 2].try_into().unwrap());
                    touch(&mut entities, off, rec.pos, i >= param_cells);
                }
            }
            for field in rec.jump_target_fields() {
                let rel = i32::from_le_bytes(buf[field..field + 4].try_into().unwrap());
                let target = rec.pos as i64 + i64::from(rel);
                if rel != 0 && target >= 0 && target <= buf_len as i64 {
                    jumps.push((rec.pos, target as usize));
                }
            }
        }
    }

    // Step 2: extend each interval along the jump graph. A use is
    // reachable from a jump site whenever the jump lands after the last
    // write dominating that use, so the value must also be live at the
    // site (and recursively at sites reaching it).
    for e in &mut entities {
        if e.gets.is_empty() {
            continue;
        }
        let mut worklist = e.gets.clone();
        let mut visited: HashSet<usize> = HashSet::new();
        while let Some(p) = worklist.pop() {
            let dominating = match e.sets.partition_point(|&s| s <= p) {
                0 => None,
                n => Some(e.sets[n - 1]),
            };
            let Some(s) = dominating else {
                e.needs_init = true;
                e.start = 0;
                continue;
            };
            e.start = e.start.min(s);
            e.end = e.end.max(p);
            for &(site, target) in &jumps {
                if s < target && target <= p && visited.insert(site) {
                    worklist.push(site);
                }
            }
        }
    }
    for (i, e) in entities.iter_mut().enumerate() {
        if e.is_param {
            e.needs_init = false;
        } else if i < input.locals.len() && input.needs_init_hint[i] && !e.gets.is_empty() {
            e.needs_init = true;
        }
    }

    // Step 3: slot assignment. Parameters and prelude constants first,
    // pinned for the whole body; unreferenced entities share one slot
    // sized to the largest of them.
    let mut high: u32 = 0;
    for e in entities.iter_mut().filter(|e| e.is_param) {
        e.new = e.old;
        e.allocated = true;
        high = high.max(u32::from(e.old) + e.kind.stack_size());
    }
    for e in entities.iter_mut().filter(|e| e.is_const) {
        e.new = high as StackOffset;
        e.allocated = true;
        high += e.kind.stack_size();
    }
    let unused_width = entities
        .iter()
        .filter(|e| e.unused() && !e.is_const)
        .map(|e| e.kind.stack_size())
        .max();
    if let Some(w) = unused_width {
        for e in entities.iter_mut().filter(|e| e.unused() && !e.is_const) {
            e.new = high as StackOffset;
            e.allocated = true;
        }
        high += w;
    }

    let mut lists = FreeLists::default();
    let positions: Vec<usize> = records(input.writer.bytes()).map(|r| r.pos).collect();
    for &p in &positions {
        for e in entities.iter_mut() {
            if e.allocated && !e.pinned() && !e.unused() && e.end == p {
                lists.release(u32::from(e.new), e.kind.stack_size());
            }
        }
        for e in entities.iter_mut() {
            if !e.allocated && !e.unused() && e.start == p {
                e.new = lists.alloc(e.kind.stack_size(), &mut high) as StackOffset;
                e.allocated = true;
            }
        }
    }
    // anything still unplaced (e.g. start past the last record) gets a slot
    for e in entities.iter_mut() {
        if !e.allocated {
            e.new = lists.alloc(e.kind.stack_size(), &mut high) as StackOffset;
            e.allocated = true;
        }
    }

    // Step 4: rewrite every operand. Entity offsets map to their new
    // slots; plain stack values shift by the change of the locals
    // region's extent.
    let diff: i64 = i64::from(input.initial_stack_size) - i64::from(high);
    let remap = |off: StackOffset| -> (StackOffset, Option<ValueKind>) {
        match by_old.get(&off) {
            Some(&ei) => (entities[ei].new, Some(entities[ei].kind)),
            None => (((i64::from(off)) - diff).max(0) as StackOffset, None),
        }
    };

    struct TailPatch {
        pos: usize,
        count: usize,
        split_words: bool,
    }
    let mut fixed: Vec<usize> = Vec::new();
    let mut tails: Vec<TailPatch> = Vec::new();
    for rec in records(input.writer.bytes()) {
        let ops = rec.operands();
        fixed.extend(ops.srcs.iter().flatten().copied());
        fixed.extend(ops.dst);
        if let Some(Tail::Offsets { pos, count }) = rec.tail() {
            tails.push(TailPatch {
                pos,
                count,
                // call/end tails hold one cell per pointer word; throw
                // tails hold one cell per value
                split_words: rec.op != Op::Throw,
            });
        }
    }
    for field in fixed {
        let old = input.writer.read_u16(field);
        let (new, _) = remap(old);
        input.writer.write_u16(field, new);
    }
    for t in tails {
        let mut i = 0;
        while i < t.count {
            let old = input.writer.read_u16(t.pos + i * 2);
            let (new, kind) = remap(old);
            input.writer.write_u16(t.pos + i * 2, new);
            if t.split_words && kind == Some(ValueKind::V128) && i + 1 < t.count {
                input.writer.write_u16(t.pos + (i + 1) * 2, new + 8);
                i += 2;
                continue;
            }
            i += 1;
        }
    }

    *input.required_stack_size =
        (i64::from(*input.required_stack_size) - diff).max(i64::from(high)) as u32;
    for c in input.catch_table.iter_mut() {
        c.stack_size_to_restore = (i64::from(c.stack_size_to_restore) - diff).max(0) as u32;
    }

    // Step 5: zero-initialize entities a read can observe before any
    // write, by prepending constants to the buffer. Relative jumps are
    // unaffected; the catch table holds absolute positions and shifts.
    let mut init = Writer::new();
    for e in entities.iter().filter(|e| e.needs_init && !e.is_param) {
        match e.kind.stack_size() {
            4 => init.emit_const32(e.new, 0),
            8 => init.emit_const64(e.new, 0),
            _ => init.emit_const128(e.new, [0; 16]),
        }
    }
    let shift = init.len();
    if shift > 0 {
        let body = std::mem::take(input.writer.bytes_mut());
        let combined = init.bytes_mut();
        combined.extend_from_slice(&body);
        *input.writer.bytes_mut() = std::mem::take(combined);
        for c in input.catch_table.iter_mut() {
            c.try_start += shift;
            c.try_end += shift;
            c.catch_start += shift;
        }
    }

    trace!(
        entities = entities.len(),
        old_extent = input.initial_stack_size,
        new_extent = high,
        init_bytes = shift,
        "local slots reassigned"
    );

    let live_ranges = input.collect_debug.then(|| {
        entities
            .iter()
            .filter(|e| e.start != NO_POS)
            .map(|e| {
                let s = if e.start > 0 { e.start + shift } else { e.start };
                (e.new, s, e.end + shift)
            })
            .collect()
    });

    let mut constant_slots = vec![0 as StackOffset; input.constants.len()];
    for e in entities.iter().filter(|e| e.is_const) {
        constant_slots[e.const_order] = e.new;
    }
    let locals = entities.iter().map(|e| (e.kind, e.new)).collect();

    Outcome {
        locals,
        constant_slots,
        live_ranges,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freelists_coalesce_buddies() {
        let mut f = FreeLists::default();
        let mut high = 0u32;
        let a = f.alloc(4, &mut high);
        let b = f.alloc(4, &mut high);
        assert_eq!((a, b), (0, 4));
        f.release(a, 4);
        f.release(b, 4);
        // the two 4-slots merged; an 8-byte request reuses them
        assert_eq!(f.alloc(8, &mut high), 0);
        assert_eq!(high, 8);
    }

    #[test]
    fn freelists_split_wider_slots() {
        let mut f = FreeLists::default();
        let mut high = 0u32;
        let v = f.alloc(16, &mut high);
        f.release(v, 16);
        assert_eq!(f.alloc(4, &mut high), 0);
        assert_eq!(f.alloc(8, &mut high), 8);
        assert_eq!(f.alloc(4, &mut high), 4);
        assert_eq!(high, 16, "all requests served from the split 16-slot");
    }

    #[test]
    fn append_aligns_to_width() {
        let mut f = FreeLists::default();
        let mut high = 0u32;
        assert_eq!(f.alloc(4, &mut high), 0);
        // 8-byte slot cannot start at offset 4
        assert_eq!(f.alloc(8, &mut high), 8);
        // the gap at 4 stays available for the next 4-byte request
        assert_eq!(f.alloc(4, &mut high), 4);
        assert_eq!(high, 16);
    }
}
