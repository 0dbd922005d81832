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

//! Value kinds and typed constant values.
//!
//! Every value occupies a fixed number of bytes in a function's operand
//! area: 4 for i32/f32, 8 for i64/f64 and (on this 64-bit build)
//! references, 16 for v128. There are no alignment holes inside a single
//! value; offsets are byte indices into the per-function operand area.

/// Byte index into a function's operand area. Fixed per build; exceeding
/// it is the "function stack too large" capacity error.
pub type StackOffset = u16;

pub const POINTER_SIZE: u32 = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    I32,
    I64,
    F32,
    F64,
    V128,
    FuncRef,
    ExternRef,
    Void,
}

impl ValueKind {
    /// Bytes the kind occupies in the operand area.
    pub fn stack_size(self) -> u32 {
        match self {
            ValueKind::I32 | ValueKind::F32 => 4,
            ValueKind::I64 | ValueKind::F64 => 8,
            ValueKind::FuncRef | ValueKind::ExternRef => POINTER_SIZE,
            ValueKind::V128 => 16,
            ValueKind::Void => 0,
        }
    }

    /// Natural width of the payload (equals `stack_size` on this build).
    pub fn value_size(self) -> u32 {
        self.stack_size()
    }

    /// Pointer-words a value of this kind contributes to a call/end tail
    /// array (one stack offset per word).
    pub fn copy_count(self) -> u32 {
        self.stack_size().div_ceil(POINTER_SIZE)
    }

    pub fn is_reference(self) -> bool {
        matches!(self, ValueKind::FuncRef | ValueKind::ExternRef)
    }

    pub fn name(self) -> &'static str {
        match self {
            ValueKind::I32 => "i32",
            ValueKind::I64 => "i64",
            ValueKind::F32 => "f32",
            ValueKind::F64 => "f64",
            ValueKind::V128 => "v128",
            ValueKind::FuncRef => "funcref",
            ValueKind::ExternRef => "externref",
            ValueKind::Void => "void",
        }
    }
}

/// A typed constant observed in the instruction stream. Equality is
/// bit-exact over the payload (NaN payloads distinguish values), which is
/// what constant-pool dedup requires.
#[derive(Clone, Copy, Debug)]
pub struct Val {
    kind: ValueKind,
    bits: [u8; 16],
}

impl Val {
    pub fn i32(v: u32) -> Self {
        Self::from_bytes(ValueKind::I32, &v.to_le_bytes())
    }

    pub fn i64(v: u64) -> Self {
        Self::from_bytes(ValueKind::I64, &v.to_le_bytes())
    }

    pub fn f32_bits(v: u32) -> Self {
        Self::from_bytes(ValueKind::F32, &v.to_le_bytes())
    }

    pub fn f64_bits(v: u64) -> Self {
        Self::from_bytes(ValueKind::F64, &v.to_le_bytes())
    }

    pub fn v128(bytes: [u8; 16]) -> Self {
        Self {
            kind: ValueKind::V128,
            bits: bytes,
        }
    }

    fn from_bytes(kind: ValueKind, payload: &[u8]) -> Self {
        let mut bits = [0u8; 16];
        bits[..payload.len()].copy_from_slice(payload);
        Self { kind, bits }
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn as_u32(&self) -> u32 {
        u32::from_le_bytes(self.bits[..4].try_into().unwrap())
    }

    pub fn as_u64(&self) -> u64 {
        u64::from_le_bytes(self.bits[..8].try_into().unwrap())
    }

    pub fn bytes(&self) -> &[u8; 16] {
        &self.bits
    }
}

impl PartialEq for Val {
    fn eq(&self, other: &Self) -> bool {
        let n = self.kind.value_size() as usize;
        self.kind == other.kind && self.bits[..n] == other.bits[..n]
    }
}

impl Eq for Val {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths_and_copy_counts() {
        assert_eq!(ValueKind::I32.stack_size(), 4);
        assert_eq!(ValueKind::F64.stack_size(), 8);
        assert_eq!(ValueKind::V128.stack_size(), 16);
        assert_eq!(ValueKind::FuncRef.stack_size(), POINTER_SIZE);
        assert_eq!(ValueKind::I32.copy_count(), 1);
        assert_eq!(ValueKind::V128.copy_count(), 2);
    }

    #[test]
    fn constant_equality_is_bit_exact() {
        // Two NaNs with different payloads are different constants.
        let quiet = Val::f32_bits(0x7fc0_0000);
        let payload = Val::f32_bits(0x7fc0_0001);
        assert_ne!(quiet, payload);
        assert_eq!(quiet, Val::f32_bits(0x7fc0_0000));

        // Same bits, different kind: distinct.
        assert_ne!(Val::i32(1), Val::f32_bits(1));

        // i64 compares all eight bytes.
        assert_ne!(Val::i64(1), Val::i64(1 | (1 << 40)));
    }
}
