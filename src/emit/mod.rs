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

//! ## Emitter (compiler ↔ interpreter contract)
//!
//! One `Emitter` translates one function body into stack-offset bytecode.
//! The decoder replays the body twice: a preprocess pass that runs these
//! same handlers with the output thrown away (collecting local liveness,
//! branch structure and constant frequencies), then the real pass. At the
//! transition the buffer is cleared, the top constants get fixed prelude
//! slots, and after the body ends the slot allocator in `slots` rewrites
//! every local and constant offset.
//!
//! Peepholes, in order:
//! - a producer whose next opcode is `local.set` writes the local's home
//!   slot directly (one-byte + LEB128 look-ahead, second pass only);
//! - `local.get` pushes the home slot itself when no write occurs inside
//!   the value's live interval;
//! - a conditional branch consuming the result of the immediately
//!   preceding `i32.eqz` rewinds it and inverts its own polarity;
//! - values crossing a control-flow edge are moved to their canonical
//!   offsets, and only then.
//!
//! While generation is stopped (after `br`, `return`, `throw`,
//! `unreachable`, `br_table`) handlers are gated off until the enclosing
//! block's `end`, `else` or `catch`.

pub(crate) mod block;
pub(crate) mod preprocess;
pub(crate) mod slots;
pub(crate) mod stack;

use tracing::{debug, trace};
use wasmparser::{BlockType, Operator};

use crate::bytecode::Writer;
use crate::decode::{heap_ref_kind, value_kind};
use crate::error::CompileError;
use crate::module::{CatchEntry, CompiledFunction, FunctionDebug, ModuleAssembler};
use crate::opcode::{self, Family, Op};
use crate::value::{StackOffset, Val, ValueKind};
use crate::Config;

use block::{Block, BlockKind, BlockSig, Fixup, FixupKind};
use preprocess::Preprocess;
use stack::StackEntry;

const EQZ_RECORD_SIZE: usize = 8;

#[derive(Clone, Copy)]
pub(crate) struct LocalSlot {
    pub kind: ValueKind,
    pub pos: StackOffset,
}

struct OpenCatch {
    depth: usize,
    try_start: usize,
    try_end: usize,
    catch_start: usize,
    tag: Option<u32>,
}

pub(crate) struct Emitter<'m> {
    asm: &'m ModuleAssembler,
    config: &'m Config,
    wasm: &'m [u8],
    func_index: u32,
    type_index: u32,
    ft: crate::module::FunctionType,
    in_init_expr: bool,

    writer: Writer,
    vm: Vec<StackEntry>,
    blocks: Vec<Block>,
    locals: Vec<LocalSlot>,
    pre: Preprocess,
    open_catches: Vec<OpenCatch>,
    catch_table: Vec<CatchEntry>,

    initial_stack_size: u32,
    stack_size: u32,
    required_stack: u32,

    generating: bool,
    skip_blocks: u32,
    skip_forever: bool,
    last_eqz: Option<usize>,
    pending_local_set: Option<u32>,

    cur_pos: usize,
    code_end: usize,
}

impl<'m> Emitter<'m> {
    /// `ft` is the function's own signature; for initializer expressions
    /// it is synthesized and `type_index` carries no meaning.
    pub fn new(
        asm: &'m ModuleAssembler,
        config: &'m Config,
        wasm: &'m [u8],
        func_index: u32,
        type_index: u32,
        ft: crate::module::FunctionType,
        in_init_expr: bool,
    ) -> Result<Self, CompileError> {
        let mut em = Emitter {
            asm,
            config,
            wasm,
            func_index,
            type_index,
            ft,
            in_init_expr,
            writer: Writer::new(),
            vm: Vec::new(),
            blocks: Vec::new(),
            locals: Vec::new(),
            pre: Preprocess::default(),
            open_catches: Vec::new(),
            catch_table: Vec::new(),
            initial_stack_size: 0,
            stack_size: 0,
            required_stack: 0,
            generating: true,
            skip_blocks: 0,
            skip_forever: false,
            last_eqz: None,
            pending_local_set: None,
            cur_pos: 0,
            code_end: 0,
        };
        let params = em.func_type().params.clone();
        for k in params {
            em.append_local(k)?;
        }
        Ok(em)
    }

    fn func_type(&self) -> &crate::module::FunctionType {
        &self.ft
    }

    /// Declared (non-parameter) locals, after the parameter area.
    pub fn declare_local(&mut self, kind: ValueKind) -> Result<(), CompileError> {
        self.append_local(kind)
    }

    fn append_local(&mut self, kind: ValueKind) -> Result<(), CompileError> {
        let pos = self.initial_stack_size;
        if pos + kind.stack_size() > StackOffset::MAX as u32 {
            return Err(CompileError::StackTooLarge {
                func_index: self.func_index,
            });
        }
        self.locals.push(LocalSlot {
            kind,
            pos: pos as StackOffset,
        });
        self.initial_stack_size += kind.stack_size();
        self.stack_size = self.initial_stack_size;
        self.required_stack = self.required_stack.max(self.stack_size);
        Ok(())
    }

    pub fn set_code_end(&mut self, end: usize) {
        self.code_end = end;
    }

    pub fn start_preprocess(&mut self) {
        self.pre.active = true;
        self.pre.reset(self.locals.len());
    }

    /// Transition from the preprocess pass to real emission: discard
    /// everything emitted so far, pin the most frequent constants to
    /// prelude slots, and materialize them once.
    pub fn end_preprocess(&mut self) -> Result<(), CompileError> {
        self.pre.active = false;
        self.generating = true;
        self.skip_blocks = 0;
        self.skip_forever = false;
        self.last_eqz = None;
        self.writer.clear();
        self.blocks.clear();
        self.vm.clear();
        self.open_catches.clear();
        self.catch_table.clear();

        self.pre.organize();
        self.pre.constants.truncate(self.config.max_retained_constants);
        for i in 0..self.pre.constants.len() {
            let width = self.pre.constants[i].value.kind().stack_size();
            if self.initial_stack_size + width > StackOffset::MAX as u32 {
                return Err(CompileError::StackTooLarge {
                    func_index: self.func_index,
                });
            }
            self.pre.constants[i].slot = self.initial_stack_size as StackOffset;
            self.initial_stack_size += width;
        }

        self.stack_size = self.initial_stack_size;
        self.required_stack = self.stack_size;

        for i in 0..self.pre.constants.len() {
            let (slot, value) = (self.pre.constants[i].slot, self.pre.constants[i].value);
            match value.kind().value_size() {
                4 => self.writer.emit_const32(slot, value.as_u32()),
                8 => self.writer.emit_const64(slot, value.as_u64()),
                _ => self.writer.emit_const128(slot, *value.bytes()),
            }
        }
        trace!(
            func = self.func_index,
            constants = self.pre.constants.len(),
            "constant prelude materialized"
        );
        Ok(())
    }

    pub fn take_pending_local_set(&mut self) -> Option<u32> {
        self.pending_local_set.take()
    }

    // ---- shadow stack -------------------------------------------------

    fn push(&mut self, kind: ValueKind) -> Result<StackOffset, CompileError> {
        let pos = self.stack_size;
        self.push_at(kind, pos as StackOffset, None)?;
        Ok(pos as StackOffset)
    }

    fn push_at(
        &mut self,
        kind: ValueKind,
        pos: StackOffset,
        local: Option<u32>,
    ) -> Result<(), CompileError> {
        if let Some(idx) = local {
            if self.pre.active {
                let push_count = self
                    .vm
                    .iter()
                    .filter(|e| e.local == Some(idx))
                    .count();
                self.pre.local_read(idx as usize, self.cur_pos, push_count);
            }
        }
        let width = kind.stack_size();
        let canonical = self.stack_size;
        if canonical + width > StackOffset::MAX as u32 {
            return Err(CompileError::StackTooLarge {
                func_index: self.func_index,
            });
        }
        self.vm.push(StackEntry {
            kind,
            pos,
            canonical: canonical as StackOffset,
            local,
        });
        self.stack_size += width;
        self.required_stack = self.required_stack.max(self.stack_size);
        Ok(())
    }

    fn pop_info(&mut self) -> Result<StackEntry, CompileError> {
        let entry = self.vm.pop().ok_or_else(|| {
            CompileError::structure("operand stack underflow", Some(self.cur_pos))
        })?;
        self.stack_size -= entry.width();
        if self.pre.active {
            if let Some(idx) = entry.local {
                self.pre.close_interval(idx as usize, self.cur_pos);
            }
        }
        Ok(entry)
    }

    fn pop_kind(&mut self, kind: ValueKind) -> Result<StackEntry, CompileError> {
        let entry = self.pop_info()?;
        if entry.kind != kind {
            return Err(CompileError::structure(
                format!("expected {} operand, got {}", kind.name(), entry.kind.name()),
                Some(self.cur_pos),
            ));
        }
        Ok(entry)
    }

    fn pop_ref(&mut self) -> Result<StackEntry, CompileError> {
        let entry = self.pop_info()?;
        if !entry.kind.is_reference() {
            return Err(CompileError::structure(
                format!("expected reference operand, got {}", entry.kind.name()),
                Some(self.cur_pos),
            ));
        }
        Ok(entry)
    }

    fn peek(&self) -> Result<&StackEntry, CompileError> {
        self.vm.last().ok_or_else(|| {
            CompileError::structure("operand stack underflow", Some(self.cur_pos))
        })
    }

    fn restore_to(&mut self, stack: Vec<StackEntry>, size: u32) {
        while self.vm.len() > stack.len() {
            if let Some(e) = self.vm.pop() {
                self.stack_size -= e.width();
                if self.pre.active {
                    if let Some(idx) = e.local {
                        self.pre.close_interval(idx as usize, self.cur_pos);
                    }
                }
            }
        }
        self.vm = stack;
        self.stack_size = size;
    }

    // ---- result positions and peepholes -------------------------------

    /// One-byte look-ahead for a `local.set` following the current
    /// producer; when found, the producer targets the local's home slot
    /// and the `local.set` itself is consumed.
    fn read_ahead_local_set(&self) -> Option<(u32, usize)> {
        if self.cur_pos >= self.code_end {
            return None;
        }
        if *self.wasm.get(self.cur_pos)? != 0x21 {
            return None;
        }
        let (idx, len) = leb128_u32(&self.wasm[self.cur_pos + 1..self.code_end])?;
        Some((idx, len + 1))
    }

    fn compute_result_position(&mut self, kind: ValueKind) -> Result<StackOffset, CompileError> {
        if !self.pre.active {
            if let Some((idx, _len)) = self.read_ahead_local_set() {
                if let Some(l) = self.locals.get(idx as usize) {
                    if l.kind == kind {
                        let pos = l.pos;
                        self.pending_local_set = Some(idx);
                        return Ok(pos);
                    }
                }
            }
        }
        self.push(kind)
    }

    fn generate_move(&mut self, src: StackOffset, dst: StackOffset, kind: ValueKind) {
        if src != dst {
            self.writer.emit_move(kind, src, dst);
        }
    }

    fn can_invert(&self, cond: StackOffset) -> bool {
        match self.last_eqz {
            Some(p) => {
                // only a plain stack temporary may be rewound: an eqz
                // forwarded into a local's home slot is a visible write
                p + EQZ_RECORD_SIZE == self.writer.len()
                    && self.writer.read_u16(p + 4) == cond
                    && u32::from(cond) >= self.initial_stack_size
            }
            None => false,
        }
    }

    /// Rewinds the buffer past the pending `i32.eqz` and returns its
    /// source, which becomes the branch condition with inverted polarity.
    fn take_inverted_condition(&mut self, cond: StackOffset) -> Option<StackOffset> {
        if !self.can_invert(cond) {
            return None;
        }
        let p = self.last_eqz.take()?;
        let src = self.writer.read_u16(p + 2);
        self.writer.truncate(p);
        Some(src)
    }

    // ---- blocks and branches ------------------------------------------

    fn block_sig(&self, blockty: &BlockType) -> Result<BlockSig, CompileError> {
        Ok(match blockty {
            BlockType::Empty => BlockSig::Void,
            BlockType::Type(vt) => BlockSig::Single(value_kind(*vt, self.cur_pos)?),
            BlockType::FuncType(i) => {
                self.sig_checked(*i)?;
                BlockSig::Type(*i)
            }
        })
    }

    fn new_block(&mut self, kind: BlockKind, sig: BlockSig) -> Result<Block, CompileError> {
        // Multi-value block parameters must sit at their canonical slots
        // so that both entry paths (fallthrough and back-edge) agree.
        if let BlockSig::Type(ti) = sig {
            let n = self.asm.sig(ti).params.len();
            for i in 0..n {
                let idx = self
                    .vm
                    .len()
                    .checked_sub(1 + i)
                    .ok_or_else(|| {
                        CompileError::structure("block parameters missing", Some(self.cur_pos))
                    })?;
                let e = self.vm[idx];
                if e.is_displaced() {
                    self.generate_move(e.pos, e.canonical, e.kind);
                    if self.pre.active {
                        if let Some(l) = e.local {
                            self.pre.close_interval(l as usize, self.cur_pos);
                        }
                    }
                    self.vm[idx].pos = e.canonical;
                    self.vm[idx].local = None;
                }
            }
        }

        let should_restore = match sig {
            BlockSig::Type(ti) => !self.asm.sig(ti).results.is_empty(),
            BlockSig::Single(_) => true,
            BlockSig::Void => false,
        };
        Ok(Block {
            kind,
            sig,
            position: self.writer.len(),
            stack: self.vm.clone(),
            stack_size: self.stack_size,
            should_restore,
            stopped: false,
            seen_branch: false,
            fixups: Vec::new(),
        })
    }

    fn seen_branch(&mut self) {
        if self.pre.active {
            if let Some(b) = self.blocks.last_mut() {
                b.seen_branch = true;
            }
            self.pre.branch_seen();
        }
    }

    fn local_write(&mut self, idx: u32) {
        if self.pre.active {
            let definite = !self.blocks.iter().any(|b| b.seen_branch);
            self.pre.local_write(idx as usize, self.cur_pos, definite);
        }
    }

    fn stop_generation(&mut self) {
        if !self.generating {
            return;
        }
        if let Some(b) = self.blocks.last_mut() {
            b.should_restore = true;
            b.stopped = true;
            self.generating = false;
            self.skip_blocks = 0;
        } else {
            while !self.vm.is_empty() {
                let _ = self.pop_info();
            }
            self.generating = false;
            self.skip_forever = true;
        }
    }

    /// (bytes above the target's snapshot, bytes the target consumes).
    fn drop_sizes(&self, depth: usize) -> (u32, u32) {
        let mut drop = 0u32;
        let mut param = 0u32;
        if depth < self.blocks.len() {
            let b = &self.blocks[self.blocks.len() - 1 - depth];
            if b.stack.len() < self.vm.len() {
                for e in &self.vm[b.stack.len()..] {
                    drop += e.width();
                }
                if b.kind == BlockKind::Loop {
                    if let BlockSig::Type(ti) = b.sig {
                        let ps = self.asm.sig(ti).param_stack_size();
                        drop += ps;
                        param += ps;
                    }
                } else {
                    match b.sig {
                        BlockSig::Type(ti) => param += self.asm.sig(ti).result_stack_size(),
                        BlockSig::Single(k) => param += k.stack_size(),
                        BlockSig::Void => {}
                    }
                }
            }
        } else if !self.blocks.is_empty() {
            let b = &self.blocks[0];
            for e in &self.vm[b.stack.len().min(self.vm.len())..] {
                drop += e.width();
            }
        }
        (drop, param)
    }

    /// Relocate branch arguments from the current top into the canonical
    /// slots of the dropped region, deepest value first so newer values
    /// are not clobbered.
    fn move_values_for_drop(&mut self, drop: (u32, u32)) {
        debug_assert!(drop.1 > 0);
        let len = self.vm.len();
        let mut remain = drop.1 as i64;
        let mut si = 0usize;
        loop {
            if si >= len {
                return;
            }
            remain -= i64::from(self.vm[len - 1 - si].width());
            if remain == 0 {
                break;
            }
            if remain < 0 {
                return; // stack mismatch, no code needed
            }
            si += 1;
        }
        let mut remain = drop.0 as i64;
        let mut di = 0usize;
        loop {
            if di >= len {
                return;
            }
            remain -= i64::from(self.vm[len - 1 - di].width());
            if remain == 0 {
                break;
            }
            if remain < 0 {
                return;
            }
            di += 1;
        }
        let mut remain = drop.1 as i64;
        loop {
            let s = self.vm[len - 1 - si];
            let d = self.vm[len - 1 - di];
            self.generate_move(s.pos, d.canonical, s.kind);
            remain -= i64::from(s.width());
            if remain <= 0 {
                break;
            }
            if si == 0 || di == 0 {
                break;
            }
            si -= 1;
            di -= 1;
        }
    }

    /// Move the loop's live parameters back to their canonical slots
    /// before a back-edge. The shadow entries keep their current
    /// positions: under `br_if` these moves sit on the taken path only,
    /// and the fall-through side still reads the old slots.
    fn restore_loop_params(&mut self, param_count: usize) {
        for i in 0..param_count {
            let Some(idx) = self.vm.len().checked_sub(1 + i) else {
                return;
            };
            let e = self.vm[idx];
            if e.is_displaced() {
                self.generate_move(e.pos, e.canonical, e.kind);
            }
        }
    }

    fn loop_param_count(&self, block_index: usize) -> usize {
        let b = &self.blocks[block_index];
        if b.kind != BlockKind::Loop {
            return 0;
        }
        match b.sig {
            BlockSig::Type(ti) => self.asm.sig(ti).params.len(),
            _ => 0,
        }
    }

    fn materialize_top(&mut self, expect: ValueKind) -> Result<(), CompileError> {
        let idx = self.vm.len().checked_sub(1).ok_or_else(|| {
            CompileError::structure("operand stack underflow", Some(self.cur_pos))
        })?;
        let e = self.vm[idx];
        debug_assert_eq!(e.kind, expect, "block result kind mismatch");
        if e.is_displaced() {
            self.generate_move(e.pos, e.canonical, e.kind);
            self.vm[idx].pos = e.canonical;
        }
        Ok(())
    }

    fn keep_block_results(
        &mut self,
        sig: BlockSig,
        should_restore: bool,
        stopped: bool,
    ) -> Result<(), CompileError> {
        if !should_restore || stopped {
            return Ok(());
        }
        match sig {
            BlockSig::Type(ti) => {
                let results = self.asm.sig(ti).results.clone();
                for &k in results.iter().rev() {
                    self.materialize_top(k)?;
                    self.pop_info()?;
                }
            }
            BlockSig::Single(k) => {
                self.materialize_top(k)?;
                self.pop_info()?;
            }
            BlockSig::Void => {}
        }
        Ok(())
    }

    fn on_if(&mut self, blockty: &BlockType) -> Result<(), CompileError> {
        let cond = self.pop_kind(ValueKind::I32)?;
        let mut src = cond.pos;
        let mut inverted = false;
        if let Some(s) = self.take_inverted_condition(src) {
            src = s;
            inverted = true;
        }

        let sig = self.block_sig(blockty)?;
        let mut b = self.new_block(BlockKind::If, sig)?;
        b.fixups.push(Fixup {
            kind: FixupKind::JumpIf,
            pos: b.position,
        });
        self.blocks.push(b);

        let op = if inverted { Op::JumpIfTrue } else { Op::JumpIfFalse };
        self.writer.emit_jump_if(op, src, 0);
        self.seen_branch();
        Ok(())
    }

    fn on_else(&mut self) -> Result<(), CompileError> {
        self.seen_branch();
        let idx = self.blocks.len().checked_sub(1).ok_or_else(|| {
            CompileError::structure("else outside of if", Some(self.cur_pos))
        })?;
        debug_assert_eq!(self.blocks[idx].kind, BlockKind::If);
        let (sig, should_restore, stopped, position) = {
            let b = &self.blocks[idx];
            (b.sig, b.should_restore, b.stopped, b.position)
        };
        self.keep_block_results(sig, should_restore, stopped)?;

        // drop the if's own conditional fixup; it is patched right here
        if !self.blocks[idx].fixups.is_empty() {
            self.blocks[idx].fixups.remove(0);
        }
        if !stopped {
            let pos = self.writer.len();
            self.blocks[idx].fixups.push(Fixup {
                kind: FixupKind::Jump,
                pos,
            });
            self.writer.emit_jump(0);
        }
        self.blocks[idx].stopped = false;

        let (snapshot, size) = {
            let b = &self.blocks[idx];
            (b.stack.clone(), b.stack_size)
        };
        self.restore_to(snapshot, size);
        let offset = (self.writer.len() - position) as i32;
        self.writer.patch_jump(position, offset);
        Ok(())
    }

    fn on_end(&mut self) -> Result<(), CompileError> {
        // an i32.eqz ending a block cannot fuse with a later branch: the
        // position right after it is a jump target
        self.last_eqz = None;

        let Some(popped) = self.blocks.pop() else {
            return self.generate_end_code(true);
        };

        #[cfg(debug_assertions)]
        if !popped.should_restore {
            if let BlockSig::Single(k) = popped.sig {
                debug_assert_eq!(self.peek().map(|e| e.kind).ok(), Some(k));
            }
        }

        if popped.kind == BlockKind::Try {
            let depth = self.blocks.len() + 1;
            let mut i = 0;
            while i < self.open_catches.len() {
                if self.open_catches[i].depth != depth {
                    i += 1;
                    continue;
                }
                let oc = self.open_catches.remove(i);
                let restore = self.initial_stack_size
                    + popped.stack.iter().map(|e| e.width()).sum::<u32>();
                self.catch_table.push(CatchEntry {
                    try_start: oc.try_start,
                    try_end: oc.try_end,
                    catch_start: oc.catch_start,
                    stack_size_to_restore: restore,
                    tag_index: oc.tag,
                });
            }
        }

        if popped.stopped && popped.fixups.is_empty() {
            self.stop_generation();
            return Ok(());
        }

        self.keep_block_results(popped.sig, popped.should_restore, popped.stopped)?;

        if popped.should_restore {
            self.restore_to(popped.stack.clone(), popped.stack_size);
            match popped.sig {
                BlockSig::Type(ti) => {
                    let params = self.asm.sig(ti).params.clone();
                    let results = self.asm.sig(ti).results.clone();
                    for &k in params.iter().rev() {
                        let e = self.pop_info()?;
                        debug_assert_eq!(e.kind, k);
                    }
                    for k in results {
                        self.push(k)?;
                    }
                }
                BlockSig::Single(k) => {
                    self.push(k)?;
                }
                BlockSig::Void => {}
            }
        }

        let here = self.writer.len();
        for f in &popped.fixups {
            match f.kind {
                FixupKind::Jump | FixupKind::JumpIf => {
                    self.writer.patch_jump(f.pos, (here - f.pos) as i32);
                }
                FixupKind::BrTableEntry => {
                    let cell_value = self.writer.read_i32(f.pos);
                    self.writer
                        .write_i32(f.pos, here as i32 + cell_value - f.pos as i32);
                }
            }
        }
        Ok(())
    }

    fn generate_end_code(&mut self, clear: bool) -> Result<(), CompileError> {
        let results = self.func_type().results.clone();
        if results.len() > self.vm.len() {
            // error case of a malformed initializer expression
            return Ok(());
        }
        let count = self.func_type().result_copy_count();
        let tail = self.writer.emit_end(count);
        let mut offset_index = 0usize;
        for i in 0..results.len() {
            let ty = results[results.len() - 1 - i];
            let sub = ty.copy_count() as usize;
            let entry_pos = u32::from(self.vm[self.vm.len() - 1 - i].pos);
            let mut off_sub = 0usize;
            let mut j = 0u32;
            while j < ty.value_size() {
                let cell = count as usize - offset_index - sub + off_sub;
                self.writer
                    .write_u16(tail + cell * 2, (entry_pos + j) as StackOffset);
                off_sub += 1;
                j += crate::value::POINTER_SIZE;
            }
            offset_index += sub;
        }
        debug_assert_eq!(offset_index, count as usize);
        if clear {
            for _ in 0..results.len() {
                self.pop_info()?;
            }
        }
        Ok(())
    }

    fn generate_function_return(&mut self, clear_by_drop: bool) -> Result<(), CompileError> {
        #[cfg(debug_assertions)]
        {
            let results = &self.func_type().results;
            for (i, &k) in results.iter().rev().enumerate() {
                if let Some(e) = self.vm.get(self.vm.len().wrapping_sub(1 + i)) {
                    debug_assert_eq!(e.kind, k);
                }
            }
        }
        self.generate_end_code(false)?;
        if clear_by_drop {
            let mut drop = self.drop_sizes(self.blocks.len()).0 as i64;
            while drop > 0 {
                drop -= i64::from(self.pop_info()?.width());
            }
        } else {
            for _ in 0..self.func_type().results.len() {
                self.pop_info()?;
            }
            self.stop_generation();
        }
        if self.blocks.is_empty() {
            self.generating = false;
            self.skip_forever = true;
        }
        Ok(())
    }

    fn on_br(&mut self, depth: u32) -> Result<(), CompileError> {
        self.seen_branch();
        if self.blocks.len() == depth as usize {
            self.generate_function_return(true)?;
            self.stop_generation();
            return Ok(());
        }
        let bi = self
            .blocks
            .len()
            .checked_sub(1 + depth as usize)
            .ok_or_else(|| CompileError::structure("branch depth out of range", Some(self.cur_pos)))?;
        let drop = self.drop_sizes(depth as usize);
        if drop.1 > 0 {
            self.move_values_for_drop(drop);
        } else {
            let n = self.loop_param_count(bi);
            if n > 0 {
                self.restore_loop_params(n);
            }
        }
        let is_loop = self.blocks[bi].kind == BlockKind::Loop;
        let site = self.writer.len();
        let offset = if is_loop {
            (self.blocks[bi].position as i64 - site as i64) as i32
        } else {
            self.blocks[bi].fixups.push(Fixup {
                kind: FixupKind::Jump,
                pos: site,
            });
            0
        };
        self.writer.emit_jump(offset);
        self.stop_generation();
        Ok(())
    }

    fn on_br_if(&mut self, depth: u32) -> Result<(), CompileError> {
        self.seen_branch();
        let cond = self.pop_kind(ValueKind::I32)?;
        let mut src = cond.pos;
        let mut inverted = false;
        if let Some(s) = self.take_inverted_condition(src) {
            src = s;
            inverted = true;
        }

        if self.blocks.len() == depth as usize {
            // conditional return: jump over the End on the false side
            let op = if inverted { Op::JumpIfTrue } else { Op::JumpIfFalse };
            let site = self.writer.emit_jump_if(op, src, 0);
            self.generate_end_code(false)?;
            let offset = (self.writer.len() - site) as i32;
            self.writer.patch_jump(site, offset);
            return Ok(());
        }

        let bi = self
            .blocks
            .len()
            .checked_sub(1 + depth as usize)
            .ok_or_else(|| CompileError::structure("branch depth out of range", Some(self.cur_pos)))?;
        let drop = self.drop_sizes(depth as usize);
        let is_loop = self.blocks[bi].kind == BlockKind::Loop;
        let loop_params = self.loop_param_count(bi);

        if drop.1 > 0 || loop_params > 0 {
            // skip the relocation glue when the condition fails
            let skip = if inverted { Op::JumpIfTrue } else { Op::JumpIfFalse };
            let site = self.writer.emit_jump_if(skip, src, 0);
            if drop.1 > 0 {
                self.move_values_for_drop(drop);
            } else {
                self.restore_loop_params(loop_params);
            }
            let jump_site = self.writer.len();
            let offset = if is_loop {
                (self.blocks[bi].position as i64 - jump_site as i64) as i32
            } else {
                self.blocks[bi].fixups.push(Fixup {
                    kind: FixupKind::Jump,
                    pos: jump_site,
                });
                0
            };
            self.writer.emit_jump(offset);
            let skip_offset = (self.writer.len() - site) as i32;
            self.writer.patch_jump(site, skip_offset);
        } else {
            let op = if inverted { Op::JumpIfFalse } else { Op::JumpIfTrue };
            let site = self.writer.len();
            let offset = if is_loop {
                (self.blocks[bi].position as i64 - site as i64) as i32
            } else {
                self.blocks[bi].fixups.push(Fixup {
                    kind: FixupKind::JumpIf,
                    pos: site,
                });
                0
            };
            self.writer.emit_jump_if(op, src, offset);
        }
        Ok(())
    }

    fn on_br_table(&mut self, targets: &[u32], default: u32) -> Result<(), CompileError> {
        self.seen_branch();
        let cond = self.pop_kind(ValueKind::I32)?;

        let table_pos = self.writer.emit_br_table(cond.pos, targets.len() as u32);
        for (i, &depth) in targets.iter().enumerate() {
            self.emit_br_table_case(table_pos, depth, table_pos + 16 + i * 4)?;
        }
        self.emit_br_table_case(table_pos, default, table_pos + 8)?;
        self.stop_generation();
        Ok(())
    }

    fn emit_br_table_case(
        &mut self,
        table_pos: usize,
        depth: u32,
        cell_field: usize,
    ) -> Result<(), CompileError> {
        if self.blocks.len() == depth as usize {
            let offset = (self.writer.len() - table_pos) as i32;
            self.writer.write_i32(cell_field, offset);
            self.generate_end_code(false)?;
            return Ok(());
        }
        let drop = self.drop_sizes(depth as usize);
        if drop.1 > 0 {
            // point the entry at relocation glue emitted past the table
            let offset = (self.writer.len() - table_pos) as i32;
            self.writer.write_i32(cell_field, offset);
            self.on_br(depth)?;
            return Ok(());
        }
        let bi = self
            .blocks
            .len()
            .checked_sub(1 + depth as usize)
            .ok_or_else(|| CompileError::structure("branch depth out of range", Some(self.cur_pos)))?;
        if self.blocks[bi].kind == BlockKind::Loop {
            let offset = (self.blocks[bi].position as i64 - table_pos as i64) as i32;
            self.writer.write_i32(cell_field, offset);
        } else {
            // the cell holds its own offset inside the record until the
            // block end patches it
            self.writer
                .write_i32(cell_field, (cell_field - table_pos) as i32);
            self.blocks[bi].fixups.push(Fixup {
                kind: FixupKind::BrTableEntry,
                pos: cell_field,
            });
        }
        Ok(())
    }

    fn on_try(&mut self, blockty: &BlockType) -> Result<(), CompileError> {
        let sig = self.block_sig(blockty)?;
        let b = self.new_block(BlockKind::Try, sig)?;
        self.blocks.push(b);
        Ok(())
    }

    fn on_catch(&mut self, tag: Option<u32>) -> Result<(), CompileError> {
        let idx = self.blocks.len().checked_sub(1).ok_or_else(|| {
            CompileError::structure("catch outside of try", Some(self.cur_pos))
        })?;
        debug_assert_eq!(self.blocks[idx].kind, BlockKind::Try);
        self.seen_branch();
        let (sig, should_restore, stopped, position) = {
            let b = &self.blocks[idx];
            (b.sig, b.should_restore, b.stopped, b.position)
        };
        self.keep_block_results(sig, should_restore, stopped)?;
        let (snapshot, size) = {
            let b = &self.blocks[idx];
            (b.stack.clone(), b.stack_size)
        };
        self.restore_to(snapshot, size);

        let mut try_end = self.writer.len();
        if let Some(last) = self.open_catches.last() {
            if last.depth == self.blocks.len() {
                // second and later catch of the same try share its extent
                try_end = last.try_end;
            }
        }
        if !stopped {
            let pos = self.writer.len();
            self.blocks[idx].fixups.push(Fixup {
                kind: FixupKind::Jump,
                pos,
            });
            self.writer.emit_jump(0);
        }
        self.blocks[idx].stopped = false;

        self.open_catches.push(OpenCatch {
            depth: self.blocks.len(),
            try_start: position,
            try_end,
            catch_start: self.writer.len(),
            tag,
        });

        if let Some(t) = tag {
            let params = self.tag_sig_checked(t)?.params.clone();
            for k in params {
                self.push(k)?;
            }
        }
        Ok(())
    }

    fn on_throw(&mut self, tag_index: u32) -> Result<(), CompileError> {
        self.seen_branch();
        let params = self.tag_sig_checked(tag_index)?.params.clone();
        if params.len() > self.vm.len() {
            return Err(CompileError::structure(
                "throw operands missing",
                Some(self.cur_pos),
            ));
        }
        let tail = self.writer.emit_throw(tag_index, params.len() as u16);
        for i in 0..params.len() {
            let e = self.vm[self.vm.len() - 1 - i];
            self.writer
                .write_u16(tail + (params.len() - 1 - i) * 2, e.pos);
        }
        for &k in params.iter().rev() {
            let e = self.pop_info()?;
            debug_assert_eq!(e.kind, k);
        }
        self.stop_generation();
        Ok(())
    }

    // ---- calls --------------------------------------------------------

    fn fill_call_offsets(
        &mut self,
        type_index: u32,
        tail: usize,
        param_cells: u16,
    ) -> Result<(), CompileError> {
        let ft = self.sig_checked(type_index)?;
        let params = ft.params.clone();
        let results = ft.results.clone();

        let mut offset_index = 0usize;
        for i in 0..params.len() {
            let ty = params[params.len() - 1 - i];
            let e = self.pop_kind(ty)?;
            let sub = ty.copy_count() as usize;
            let mut off_sub = 0usize;
            let mut j = 0u32;
            while j < ty.value_size() {
                let cell = param_cells as usize - offset_index - sub + off_sub;
                self.writer
                    .write_u16(tail + cell * 2, e.pos + j as StackOffset);
                off_sub += 1;
                j += crate::value::POINTER_SIZE;
            }
            offset_index += sub;
        }

        let mut cell = param_cells as usize;
        for &k in &results {
            let dst = self.push(k)?;
            let mut j = 0u32;
            while j < k.value_size() {
                self.writer.write_u16(tail + cell * 2, dst + j as StackOffset);
                cell += 1;
                j += crate::value::POINTER_SIZE;
            }
        }
        Ok(())
    }

    fn sig_checked(&self, type_index: u32) -> Result<&'m crate::module::FunctionType, CompileError> {
        let asm: &'m ModuleAssembler = self.asm;
        asm.types.get(type_index as usize).ok_or_else(|| {
            CompileError::decode(
                format!("type index {type_index} out of range"),
                self.cur_pos,
            )
        })
    }

    fn tag_sig_checked(
        &self,
        tag_index: u32,
    ) -> Result<&'m crate::module::FunctionType, CompileError> {
        let asm: &'m ModuleAssembler = self.asm;
        let tag = asm.tags.get(tag_index as usize).ok_or_else(|| {
            CompileError::decode(format!("tag index {tag_index} out of range"), self.cur_pos)
        })?;
        self.sig_checked(tag.type_index)
    }

    fn on_call(&mut self, function_index: u32) -> Result<(), CompileError> {
        let type_index = *self
            .asm
            .func_type_indices
            .get(function_index as usize)
            .ok_or_else(|| {
                CompileError::decode(
                    format!("function index {function_index} out of range"),
                    self.cur_pos,
                )
            })?;
        let ft = self.sig_checked(type_index)?;
        let (pc, rc) = (ft.param_copy_count(), ft.result_copy_count());
        let tail = self.writer.emit_call(function_index, pc, rc);
        self.fill_call_offsets(type_index, tail, pc)
    }

    fn on_call_indirect(&mut self, type_index: u32, table_index: u32) -> Result<(), CompileError> {
        let callee = self.pop_kind(ValueKind::I32)?;
        let ft = self.sig_checked(type_index)?;
        let (pc, rc) = (ft.param_copy_count(), ft.result_copy_count());
        let tail = self
            .writer
            .emit_call_indirect(callee.pos, pc, rc, type_index, table_index);
        self.fill_call_offsets(type_index, tail, pc)
    }

    // ---- locals, globals, constants -----------------------------------

    fn local(&self, idx: u32) -> Result<LocalSlot, CompileError> {
        self.locals.get(idx as usize).copied().ok_or_else(|| {
            CompileError::structure(format!("local index {idx} out of range"), Some(self.cur_pos))
        })
    }

    fn on_local_get(&mut self, idx: u32) -> Result<(), CompileError> {
        let l = self.local(idx)?;
        if self.pre.direct_ref_ok(idx as usize, self.cur_pos) {
            self.push_at(l.kind, l.pos, Some(idx))
        } else {
            let pos = self.stack_size;
            self.push_at(l.kind, pos as StackOffset, Some(idx))?;
            self.generate_move(l.pos, pos as StackOffset, l.kind);
            Ok(())
        }
    }

    fn on_local_set(&mut self, idx: u32) -> Result<(), CompileError> {
        let l = self.local(idx)?;
        let src = self.pop_info()?;
        debug_assert_eq!(src.kind, l.kind);
        self.generate_move(src.pos, l.pos, src.kind);
        self.local_write(idx);
        Ok(())
    }

    fn on_local_tee(&mut self, idx: u32) -> Result<(), CompileError> {
        let l = self.local(idx)?;
        let top = *self.peek()?;
        debug_assert_eq!(top.kind, l.kind);
        self.generate_move(top.pos, l.pos, l.kind);
        self.local_write(idx);
        Ok(())
    }

    fn global_kind(&self, index: u32) -> Result<ValueKind, CompileError> {
        self.asm
            .globals
            .get(index as usize)
            .map(|g| g.ty.kind)
            .ok_or_else(|| {
                CompileError::decode(format!("global index {index} out of range"), self.cur_pos)
            })
    }

    fn on_global_get(&mut self, index: u32) -> Result<(), CompileError> {
        let kind = self.global_kind(index)?;
        let dst = self.compute_result_position(kind)?;
        let op = match kind.value_size() {
            4 => Op::GlobalGet32,
            8 => Op::GlobalGet64,
            _ => Op::GlobalGet128,
        };
        self.writer.emit_global(op, dst, index);
        Ok(())
    }

    fn on_global_set(&mut self, index: u32) -> Result<(), CompileError> {
        let kind = self.global_kind(index)?;
        let src = self.peek()?.pos;
        let op = match kind.value_size() {
            4 => Op::GlobalSet32,
            8 => Op::GlobalSet64,
            _ => Op::GlobalSet128,
        };
        self.writer.emit_global(op, src, index);
        self.pop_info()?;
        Ok(())
    }

    fn on_const(&mut self, value: Val) -> Result<(), CompileError> {
        if !self.in_init_expr {
            self.pre
                .note_constant(value, self.config.max_retained_constants);
            if !self.pre.active {
                if let Some(slot) = self.pre.find_slot(&value) {
                    return self.push_at(value.kind(), slot, None);
                }
            }
        }
        let dst = self.compute_result_position(value.kind())?;
        match value.kind().value_size() {
            4 => self.writer.emit_const32(dst, value.as_u32()),
            8 => self.writer.emit_const64(dst, value.as_u64()),
            _ => self.writer.emit_const128(dst, *value.bytes()),
        }
        Ok(())
    }

    // ---- table-driven handlers ----------------------------------------

    fn on_unary(&mut self, op: Op) -> Result<(), CompileError> {
        let src = self.pop_kind(op.param(0).value_kind())?;
        let dst = self.compute_result_position(op.result().value_kind())?;
        let pos = self.writer.emit_unary(op, src.pos, dst);
        if op == Op::I32Eqz {
            self.last_eqz = Some(pos);
        }
        Ok(())
    }

    fn on_binary(&mut self, op: Op) -> Result<(), CompileError> {
        let src1 = self.pop_kind(op.param(1).value_kind())?;
        let src0 = self.pop_kind(op.param(0).value_kind())?;
        let dst = self.compute_result_position(op.result().value_kind())?;
        self.writer.emit_binary(op, src0.pos, src1.pos, dst);
        Ok(())
    }

    fn on_ternary(&mut self, op: Op) -> Result<(), CompileError> {
        let src2 = self.pop_kind(op.param(2).value_kind())?;
        let src1 = self.pop_kind(op.param(1).value_kind())?;
        let src0 = self.pop_kind(op.param(0).value_kind())?;
        let dst = self.compute_result_position(op.result().value_kind())?;
        self.writer
            .emit_ternary(op, src0.pos, src1.pos, src2.pos, dst);
        Ok(())
    }

    fn memarg_offset(&self, memarg: &wasmparser::MemArg) -> Result<u32, CompileError> {
        u32::try_from(memarg.offset).map_err(|_| {
            CompileError::decode("memory offset out of range", self.cur_pos)
        })
    }

    fn on_load(&mut self, op: Op, memarg: &wasmparser::MemArg) -> Result<(), CompileError> {
        let offset = self.memarg_offset(memarg)?;
        let src = self.pop_kind(ValueKind::I32)?;
        let dst = self.compute_result_position(op.result().value_kind())?;
        self.writer.emit_load(op, src.pos, dst, offset);
        Ok(())
    }

    fn on_store(&mut self, op: Op, memarg: &wasmparser::MemArg) -> Result<(), CompileError> {
        let offset = self.memarg_offset(memarg)?;
        let value = self.pop_kind(op.param(1).value_kind())?;
        let addr = self.pop_kind(ValueKind::I32)?;
        self.writer.emit_store(op, addr.pos, value.pos, offset);
        Ok(())
    }

    fn on_atomic_rmw(&mut self, op: Op, memarg: &wasmparser::MemArg) -> Result<(), CompileError> {
        let offset = self.memarg_offset(memarg)?;
        let value = self.pop_kind(op.param(1).value_kind())?;
        let addr = self.pop_kind(ValueKind::I32)?;
        let dst = self.compute_result_position(op.result().value_kind())?;
        self.writer
            .emit_atomic_rmw(op, addr.pos, value.pos, dst, offset);
        Ok(())
    }

    fn on_atomic_cmpxchg(
        &mut self,
        op: Op,
        memarg: &wasmparser::MemArg,
    ) -> Result<(), CompileError> {
        let offset = self.memarg_offset(memarg)?;
        let src2 = self.pop_kind(op.param(2).value_kind())?;
        let src1 = self.pop_kind(op.param(1).value_kind())?;
        let src0 = self.pop_kind(ValueKind::I32)?;
        let dst = self.compute_result_position(op.result().value_kind())?;
        self.writer
            .emit_atomic_cmpxchg(op, src0.pos, src1.pos, src2.pos, dst, offset);
        Ok(())
    }

    fn check_atomic(&self, op: Op) -> Result<(), CompileError> {
        if op.is_atomic() && !self.config.threads {
            return Err(CompileError::unsupported(op.name()));
        }
        Ok(())
    }

    // ---- dispatch -----------------------------------------------------

    pub fn handle(&mut self, op: &Operator, pos: usize) -> Result<(), CompileError> {
        self.cur_pos = pos;

        if !self.generating {
            match op {
                Operator::Block { .. }
                | Operator::Loop { .. }
                | Operator::If { .. }
                | Operator::Try { .. } => self.skip_blocks += 1,
                Operator::End => {
                    if self.skip_blocks > 0 {
                        self.skip_blocks -= 1;
                    } else if !self.skip_forever {
                        self.generating = true;
                        return self.on_end();
                    }
                }
                Operator::Else => {
                    if self.skip_blocks == 0 && !self.skip_forever {
                        self.generating = true;
                        return self.on_else();
                    }
                }
                Operator::Catch { tag_index } => {
                    if self.skip_blocks == 0 && !self.skip_forever {
                        self.generating = true;
                        return self.on_catch(Some(*tag_index));
                    }
                }
                Operator::CatchAll => {
                    if self.skip_blocks == 0 && !self.skip_forever {
                        self.generating = true;
                        return self.on_catch(None);
                    }
                }
                // these change block nesting in ways the skip counter
                // cannot track, so reject them even in dead code
                Operator::Delegate { .. }
                | Operator::Rethrow { .. }
                | Operator::TryTable { .. } => {
                    return Err(CompileError::unsupported(format!("{op:?}")));
                }
                _ => {}
            }
            return Ok(());
        }

        match op {
            Operator::Unreachable => {
                self.seen_branch();
                self.writer.emit_nullary(Op::Unreachable);
                self.stop_generation();
                Ok(())
            }
            Operator::Nop => Ok(()),
            Operator::Block { blockty } => {
                let sig = self.block_sig(blockty)?;
                let b = self.new_block(BlockKind::Block, sig)?;
                self.blocks.push(b);
                Ok(())
            }
            Operator::Loop { blockty } => {
                let sig = self.block_sig(blockty)?;
                let b = self.new_block(BlockKind::Loop, sig)?;
                self.blocks.push(b);
                Ok(())
            }
            Operator::If { blockty } => self.on_if(blockty),
            Operator::Else => self.on_else(),
            Operator::End => self.on_end(),
            Operator::Br { relative_depth } => self.on_br(*relative_depth),
            Operator::BrIf { relative_depth } => self.on_br_if(*relative_depth),
            Operator::BrTable { targets } => {
                let depths: Vec<u32> = targets
                    .targets()
                    .collect::<Result<_, _>>()
                    .map_err(|e| CompileError::decode(e.to_string(), pos))?;
                self.on_br_table(&depths, targets.default())
            }
            Operator::Return => {
                self.seen_branch();
                self.generate_function_return(false)
            }
            Operator::Call { function_index } => self.on_call(*function_index),
            Operator::CallIndirect {
                type_index,
                table_index,
            } => self.on_call_indirect(*type_index, *table_index),
            Operator::Drop => {
                self.pop_info()?;
                Ok(())
            }
            Operator::Select | Operator::TypedSelect { .. } => {
                let cond = self.pop_kind(ValueKind::I32)?;
                let kind = self.peek()?.kind;
                let src1 = self.pop_info()?;
                let src0 = self.pop_kind(kind)?;
                debug_assert_eq!(src0.kind, src1.kind);
                let dst = self.compute_result_position(kind)?;
                self.writer.emit_select(
                    cond.pos,
                    src0.pos,
                    src1.pos,
                    dst,
                    kind.value_size() as u16,
                );
                Ok(())
            }
            Operator::LocalGet { local_index } => self.on_local_get(*local_index),
            Operator::LocalSet { local_index } => self.on_local_set(*local_index),
            Operator::LocalTee { local_index } => self.on_local_tee(*local_index),
            Operator::GlobalGet { global_index } => self.on_global_get(*global_index),
            Operator::GlobalSet { global_index } => self.on_global_set(*global_index),
            Operator::I32Const { value } => self.on_const(Val::i32(*value as u32)),
            Operator::I64Const { value } => self.on_const(Val::i64(*value as u64)),
            Operator::F32Const { value } => self.on_const(Val::f32_bits(value.bits())),
            Operator::F64Const { value } => self.on_const(Val::f64_bits(value.bits())),
            Operator::V128Const { value } => {
                self.on_const(Val::v128((value.i128() as u128).to_le_bytes()))
            }
            Operator::RefNull { hty } => {
                let kind = heap_ref_kind(hty);
                let dst = self.compute_result_position(kind)?;
                self.writer.emit_const64(dst, 0);
                Ok(())
            }
            Operator::RefIsNull => {
                let src = self.pop_ref()?;
                let dst = self.compute_result_position(ValueKind::I32)?;
                self.writer.emit_unary(Op::RefIsNull, src.pos, dst);
                Ok(())
            }
            Operator::RefFunc { function_index } => {
                let dst = self.compute_result_position(ValueKind::FuncRef)?;
                self.writer.emit_ref_func(dst, *function_index);
                Ok(())
            }
            Operator::MemorySize { .. } => {
                let dst = self.compute_result_position(ValueKind::I32)?;
                self.writer.emit_memory_size(dst);
                Ok(())
            }
            Operator::MemoryGrow { .. } => {
                let src = self.pop_kind(ValueKind::I32)?;
                let dst = self.compute_result_position(ValueKind::I32)?;
                self.writer.emit_memory_grow(src.pos, dst);
                Ok(())
            }
            Operator::MemoryInit { data_index, .. } => {
                let s2 = self.pop_kind(ValueKind::I32)?;
                let s1 = self.pop_kind(ValueKind::I32)?;
                let s0 = self.pop_kind(ValueKind::I32)?;
                self.writer
                    .emit_memory_bulk(Op::MemoryInit, s0.pos, s1.pos, s2.pos, *data_index);
                Ok(())
            }
            Operator::MemoryCopy { .. } => {
                let s2 = self.pop_kind(ValueKind::I32)?;
                let s1 = self.pop_kind(ValueKind::I32)?;
                let s0 = self.pop_kind(ValueKind::I32)?;
                self.writer
                    .emit_memory_bulk(Op::MemoryCopy, s0.pos, s1.pos, s2.pos, 0);
                Ok(())
            }
            Operator::MemoryFill { .. } => {
                let s2 = self.pop_kind(ValueKind::I32)?;
                let s1 = self.pop_kind(ValueKind::I32)?;
                let s0 = self.pop_kind(ValueKind::I32)?;
                self.writer
                    .emit_memory_bulk(Op::MemoryFill, s0.pos, s1.pos, s2.pos, 0);
                Ok(())
            }
            Operator::DataDrop { data_index } => {
                self.writer.emit_seg_drop(Op::DataDrop, *data_index);
                Ok(())
            }
            Operator::ElemDrop { elem_index } => {
                self.writer.emit_seg_drop(Op::ElemDrop, *elem_index);
                Ok(())
            }
            Operator::TableGet { table } => {
                let elem = self
                    .asm
                    .tables
                    .get(*table as usize)
                    .map(|t| t.elem)
                    .ok_or_else(|| {
                        CompileError::decode(
                            format!("table index {table} out of range"),
                            self.cur_pos,
                        )
                    })?;
                let src = self.pop_kind(ValueKind::I32)?;
                let dst = self.compute_result_position(elem)?;
                self.writer.emit_table_get(src.pos, dst, *table);
                Ok(())
            }
            Operator::TableSet { table } => {
                let value = self.pop_ref()?;
                let index = self.pop_kind(ValueKind::I32)?;
                self.writer.emit_table_set(index.pos, value.pos, *table);
                Ok(())
            }
            Operator::TableSize { table } => {
                let dst = self.compute_result_position(ValueKind::I32)?;
                self.writer.emit_table_size(dst, *table);
                Ok(())
            }
            Operator::TableGrow { table } => {
                let delta = self.pop_kind(ValueKind::I32)?;
                let init = self.pop_ref()?;
                let dst = self.compute_result_position(ValueKind::I32)?;
                self.writer
                    .emit_table_grow(init.pos, delta.pos, dst, *table);
                Ok(())
            }
            Operator::TableFill { table } => {
                let n = self.pop_kind(ValueKind::I32)?;
                let value = self.pop_ref()?;
                let index = self.pop_kind(ValueKind::I32)?;
                self.writer
                    .emit_table_fill(index.pos, value.pos, n.pos, *table);
                Ok(())
            }
            Operator::TableInit { elem_index, table } => {
                let s2 = self.pop_kind(ValueKind::I32)?;
                let s1 = self.pop_kind(ValueKind::I32)?;
                let s0 = self.pop_kind(ValueKind::I32)?;
                self.writer
                    .emit_table_init(s0.pos, s1.pos, s2.pos, *table, *elem_index);
                Ok(())
            }
            Operator::TableCopy {
                dst_table,
                src_table,
            } => {
                let s2 = self.pop_kind(ValueKind::I32)?;
                let s1 = self.pop_kind(ValueKind::I32)?;
                let s0 = self.pop_kind(ValueKind::I32)?;
                self.writer
                    .emit_table_copy(s0.pos, s1.pos, s2.pos, *dst_table, *src_table);
                Ok(())
            }
            Operator::Try { blockty } => self.on_try(blockty),
            Operator::Catch { tag_index } => self.on_catch(Some(*tag_index)),
            Operator::CatchAll => self.on_catch(None),
            Operator::Throw { tag_index } => self.on_throw(*tag_index),
            Operator::AtomicFence => {
                self.check_atomic(Op::AtomicFence)?;
                self.writer.emit_nullary(Op::AtomicFence);
                Ok(())
            }
            Operator::I8x16Shuffle { lanes } => {
                let src1 = self.pop_kind(ValueKind::V128)?;
                let src0 = self.pop_kind(ValueKind::V128)?;
                let dst = self.compute_result_position(ValueKind::V128)?;
                self.writer.emit_shuffle(src0.pos, src1.pos, dst, *lanes);
                Ok(())
            }
            _ => self.handle_classified(op, pos),
        }
    }

    fn handle_classified(&mut self, op: &Operator, pos: usize) -> Result<(), CompileError> {
        if let Some(o) = opcode::simple_op(op) {
            return match o.family() {
                Family::Unary => self.on_unary(o),
                Family::Binary => self.on_binary(o),
                Family::Ternary => self.on_ternary(o),
                _ => Err(CompileError::unsupported(o.name())),
            };
        }
        if let Some((o, memarg)) = opcode::mem_op(op) {
            self.check_atomic(o)?;
            return match o.family() {
                Family::Load => self.on_load(o, memarg),
                Family::Store => self.on_store(o, memarg),
                Family::AtomicRmw => self.on_atomic_rmw(o, memarg),
                Family::AtomicCmpxchg => self.on_atomic_cmpxchg(o, memarg),
                _ => Err(CompileError::unsupported(o.name())),
            };
        }
        if let Some((o, memarg, lane)) = opcode::mem_lane_op(op) {
            let offset = self.memarg_offset(memarg)?;
            return match o.family() {
                Family::LoadLane => {
                    let vec = self.pop_kind(ValueKind::V128)?;
                    let addr = self.pop_kind(ValueKind::I32)?;
                    let dst = self.compute_result_position(ValueKind::V128)?;
                    self.writer
                        .emit_load_lane(o, addr.pos, vec.pos, dst, offset, lane);
                    Ok(())
                }
                Family::StoreLane => {
                    let vec = self.pop_kind(ValueKind::V128)?;
                    let addr = self.pop_kind(ValueKind::I32)?;
                    self.writer
                        .emit_store_lane(o, addr.pos, vec.pos, offset, lane);
                    Ok(())
                }
                _ => Err(CompileError::unsupported(o.name())),
            };
        }
        if let Some((o, lane)) = opcode::lane_op(op) {
            return match o.family() {
                Family::ExtractLane => {
                    let src = self.pop_kind(ValueKind::V128)?;
                    let dst = self.compute_result_position(o.result().value_kind())?;
                    self.writer.emit_extract_lane(o, src.pos, dst, lane);
                    Ok(())
                }
                Family::ReplaceLane => {
                    let scalar = self.pop_kind(o.param(1).value_kind())?;
                    let vec = self.pop_kind(ValueKind::V128)?;
                    let dst = self.compute_result_position(ValueKind::V128)?;
                    self.writer
                        .emit_replace_lane(o, vec.pos, scalar.pos, dst, lane);
                    Ok(())
                }
                _ => Err(CompileError::unsupported(o.name())),
            };
        }
        let _ = pos;
        Err(CompileError::unsupported(format!("{op:?}")))
    }

    // ---- completion ---------------------------------------------------

    pub fn finish(mut self) -> Result<CompiledFunction, CompileError> {
        self.last_eqz = None;

        #[cfg(debug_assertions)]
        if self.generating && !self.in_init_expr {
            debug_assert!(
                self.vm.is_empty(),
                "shadow stack not empty at function end"
            );
        }

        let param_count = self.func_type().params.len();
        let consts: Vec<(ValueKind, StackOffset)> = self
            .pre
            .constants
            .iter()
            .map(|c| (c.value.kind(), c.slot))
            .collect();
        let needs_init: Vec<bool> = self.pre.locals.iter().map(|l| l.needs_init).collect();

        let mut required = self.required_stack;
        let mut catch_table = std::mem::take(&mut self.catch_table);
        let outcome = slots::optimize_locals(slots::Input {
            writer: &mut self.writer,
            locals: &self.locals,
            param_count,
            constants: &consts,
            initial_stack_size: self.initial_stack_size,
            required_stack_size: &mut required,
            catch_table: &mut catch_table,
            needs_init_hint: &needs_init,
            collect_debug: self.config.dump_bytecode,
        });

        let debug = if self.config.dump_bytecode {
            Some(FunctionDebug {
                live_ranges: outcome.live_ranges.clone().unwrap_or_default(),
                constants: self
                    .pre
                    .constants
                    .iter()
                    .zip(outcome.constant_slots.iter())
                    .map(|(c, &slot)| (c.value, slot))
                    .collect(),
            })
        } else {
            None
        };

        debug!(
            func = self.func_index,
            bytes = self.writer.len(),
            required_stack = required,
            "function body compiled"
        );

        Ok(CompiledFunction {
            type_index: self.type_index,
            bytecode: self.writer.take(),
            required_stack_size: required,
            locals: outcome.locals,
            catch_table,
            debug,
        })
    }
}

pub(crate) fn leb128_u32(bytes: &[u8]) -> Option<(u32, usize)> {
    let mut result = 0u64;
    let mut shift = 0u32;
    for (i, &b) in bytes.iter().enumerate() {
        if shift >= 35 {
            return None;
        }
        result |= u64::from(b & 0x7f) << shift;
        if b & 0x80 == 0 {
            return u32::try_from(result).ok().map(|v| (v, i + 1));
        }
        shift += 7;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leb128_decoding() {
        assert_eq!(leb128_u32(&[0x00]), Some((0, 1)));
        assert_eq!(leb128_u32(&[0x7f]), Some((127, 1)));
        assert_eq!(leb128_u32(&[0x80, 0x01]), Some((128, 2)));
        assert_eq!(leb128_u32(&[0xe5, 0x8e, 0x26]), Some((624485, 3)));
        assert_eq!(leb128_u32(&[0x80]), None, "truncated");
        assert_eq!(
            leb128_u32(&[0xff, 0xff, 0xff, 0xff, 0x7f]),
            None,
            "overflows u32"
        );
    }
}
