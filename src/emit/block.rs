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

//! Nested control-structure records.
//!
//! Blocks form a strict stack; `end` pops exactly one. Each record holds a
//! value snapshot of the shadow stack at entry plus the list of emitted
//! jump sites that must be patched to land just past the block.

use super::stack::StackEntry;
use crate::value::ValueKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockKind {
    Block,
    Loop,
    If,
    Try,
}

/// A block's result type: a plain value kind or an index into the
/// module's function-type table for multi-value blocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockSig {
    Void,
    Single(ValueKind),
    Type(u32),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FixupKind {
    /// Unconditional jump record; patch its offset field.
    Jump,
    /// Conditional jump record; same field position.
    JumpIf,
    /// One i32 target cell inside a br_table record; `pos` addresses the
    /// cell itself, which holds its own offset from the record start.
    BrTableEntry,
}

#[derive(Clone, Copy, Debug)]
pub struct Fixup {
    pub kind: FixupKind,
    pub pos: usize,
}

#[derive(Clone, Debug)]
pub struct Block {
    pub kind: BlockKind,
    pub sig: BlockSig,
    /// Bytecode position at entry. For `if` this is the conditional-jump
    /// site; for `loop` it is the back-edge target.
    pub position: usize,
    /// Shadow stack at entry, by value.
    pub stack: Vec<StackEntry>,
    pub stack_size: u32,
    pub should_restore: bool,
    /// Bytecode generation stopped inside this block (br/return/throw/
    /// unreachable) and has not resumed yet.
    pub stopped: bool,
    /// A branching opcode was seen inside; used by the preprocess pass to
    /// sort local writes into definitive vs conditional.
    pub seen_branch: bool,
    pub fixups: Vec<Fixup>,
}
