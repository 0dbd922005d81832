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

//! Compile-time shadow of the interpreter's operand stack.
//!
//! Each entry mirrors one runtime value: its kind, the offset the emitted
//! code actually uses (`pos`), and the offset it would occupy under strict
//! push/pop semantics (`canonical`). The two differ when the value is
//! served directly from a local's home slot or a constant's prelude slot.
//! Blocks snapshot the whole stack by value; restoration is by value too,
//! so no entry ever points back into the emitter.

use crate::value::{StackOffset, ValueKind};

#[derive(Clone, Copy, Debug)]
pub struct StackEntry {
    pub kind: ValueKind,
    /// Offset the emitted code reads the value from.
    pub pos: StackOffset,
    /// Offset under pure stack-push semantics.
    pub canonical: StackOffset,
    /// Back-link to the local this entry was produced from, if any.
    pub local: Option<u32>,
}

impl StackEntry {
    pub fn width(&self) -> u32 {
        self.kind.stack_size()
    }

    /// The value sits somewhere other than its canonical slot and would
    /// need a move to survive a control-flow edge.
    pub fn is_displaced(&self) -> bool {
        self.pos != self.canonical
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displacement() {
        let e = StackEntry {
            kind: ValueKind::I32,
            pos: 0,
            canonical: 8,
            local: Some(0),
        };
        assert!(e.is_displaced());
        assert_eq!(e.width(), 4);
        let e = StackEntry {
            kind: ValueKind::V128,
            pos: 16,
            canonical: 16,
            local: None,
        };
        assert!(!e.is_displaced());
        assert_eq!(e.width(), 16);
    }
}
