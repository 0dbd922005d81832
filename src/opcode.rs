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

//! Static opcode metadata.
//!
//! One read-only table describes every opcode the compiler emits: result
//! kind, up to three operand kinds, mnemonic and record family. The table
//! drives the shadow-stack contract (how many bytes an opcode pops and
//! pushes) and the record walkers in `bytecode` (where a record keeps its
//! operand offsets). Immutable data; shared freely across threads.
//!
//! Arithmetic, comparison and conversion opcodes keep their WebAssembly
//! names and map 1:1 onto bytecode tags. Tags past the `special` group
//! (moves, jumps, constants, calls, ...) exist only in the emitted stream.

use wasmparser::{MemArg, Operator};

use crate::value::ValueKind;

/// Operand/result kind column of the table. `None` marks an absent slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CodeKind {
    None,
    I32,
    I64,
    F32,
    F64,
    V128,
}

impl CodeKind {
    pub fn memory_size(self) -> u32 {
        match self {
            CodeKind::None => 0,
            CodeKind::I32 | CodeKind::F32 => 4,
            CodeKind::I64 | CodeKind::F64 => 8,
            CodeKind::V128 => 16,
        }
    }

    pub fn value_kind(self) -> ValueKind {
        match self {
            CodeKind::None => ValueKind::Void,
            CodeKind::I32 => ValueKind::I32,
            CodeKind::I64 => ValueKind::I64,
            CodeKind::F32 => ValueKind::F32,
            CodeKind::F64 => ValueKind::F64,
            CodeKind::V128 => ValueKind::V128,
        }
    }
}

/// Record family: fixes the byte layout of the emitted record and how the
/// walkers in `bytecode` find its operand offsets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Family {
    Nullary,
    Unary,
    Binary,
    Ternary,
    Select,
    Move,
    Const32,
    Const64,
    Const128,
    Jump,
    JumpIf,
    GlobalGet,
    GlobalSet,
    Load,
    Store,
    LoadLane,
    StoreLane,
    ExtractLane,
    ReplaceLane,
    Shuffle,
    Call,
    CallIndirect,
    BrTable,
    End,
    Throw,
    MemorySize,
    MemoryGrow,
    MemoryBulk,
    SegDrop,
    TableGet,
    TableSet,
    TableSize,
    TableGrow,
    TableFill,
    TableInit,
    TableCopy,
    RefFunc,
    AtomicRmw,
    AtomicCmpxchg,
}

pub struct OpInfo {
    pub result: CodeKind,
    pub params: [CodeKind; 3],
    pub name: &'static str,
    pub family: Family,
}

macro_rules! op_table {
    (
        simple { $( ($sname:ident, $sres:ident, $sp0:ident, $sp1:ident, $sp2:ident, $stext:literal, $sfam:ident), )* }
        mem { $( ($mname:ident, $mres:ident, $mp0:ident, $mp1:ident, $mp2:ident, $mtext:literal, $mfam:ident), )* }
        memlane { $( ($mlname:ident, $mlres:ident, $mlp0:ident, $mlp1:ident, $mlp2:ident, $mltext:literal, $mlfam:ident), )* }
        lane { $( ($lname:ident, $lres:ident, $lp0:ident, $lp1:ident, $lp2:ident, $ltext:literal, $lfam:ident), )* }
        special { $( ($pname:ident, $pres:ident, $pp0:ident, $pp1:ident, $pp2:ident, $ptext:literal, $pfam:ident), )* }
    ) => {
        #[repr(u16)]
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum Op {
            $( $sname, )*
            $( $mname, )*
            $( $mlname, )*
            $( $lname, )*
            $( $pname, )*
        }

        static INFO: &[OpInfo] = &[
            $( OpInfo { result: CodeKind::$sres, params: [CodeKind::$sp0, CodeKind::$sp1, CodeKind::$sp2], name: $stext, family: Family::$sfam }, )*
            $( OpInfo { result: CodeKind::$mres, params: [CodeKind::$mp0, CodeKind::$mp1, CodeKind::$mp2], name: $mtext, family: Family::$mfam }, )*
            $( OpInfo { result: CodeKind::$mlres, params: [CodeKind::$mlp0, CodeKind::$mlp1, CodeKind::$mlp2], name: $mltext, family: Family::$mlfam }, )*
            $( OpInfo { result: CodeKind::$lres, params: [CodeKind::$lp0, CodeKind::$lp1, CodeKind::$lp2], name: $ltext, family: Family::$lfam }, )*
            $( OpInfo { result: CodeKind::$pres, params: [CodeKind::$pp0, CodeKind::$pp1, CodeKind::$pp2], name: $ptext, family: Family::$pfam }, )*
        ];

        static OPS: &[Op] = &[
            $( Op::$sname, )*
            $( Op::$mname, )*
            $( Op::$mlname, )*
            $( Op::$lname, )*
            $( Op::$pname, )*
        ];

        /// Map an immediate-free operator (arithmetic, comparison,
        /// conversion, SIMD lanewise) to its table opcode.
        pub(crate) fn simple_op(op: &Operator) -> Option<Op> {
            match op {
                $( Operator::$sname => Some(Op::$sname), )*
                _ => None,
            }
        }

        /// Map a memory-access operator (loads, stores, atomics) to its
        /// table opcode plus its memory argument.
        pub(crate) fn mem_op<'a>(op: &'a Operator) -> Option<(Op, &'a MemArg)> {
            match op {
                $( Operator::$mname { memarg } => Some((Op::$mname, memarg)), )*
                _ => None,
            }
        }

        pub(crate) fn mem_lane_op<'a>(op: &'a Operator) -> Option<(Op, &'a MemArg, u8)> {
            match op {
                $( Operator::$mlname { memarg, lane } => Some((Op::$mlname, memarg, *lane)), )*
                _ => None,
            }
        }

        pub(crate) fn lane_op(op: &Operator) -> Option<(Op, u8)> {
            match op {
                $( Operator::$lname { lane } => Some((Op::$lname, *lane)), )*
                _ => None,
            }
        }
    };
}

op_table! {
    simple {
        // i32 arithmetic / bitwise
        (I32Add, I32, I32, I32, None, "i32.add", Binary),
        (I32Sub, I32, I32, I32, None, "i32.sub", Binary),
        (I32Mul, I32, I32, I32, None, "i32.mul", Binary),
        (I32DivS, I32, I32, I32, None, "i32.div_s", Binary),
        (I32DivU, I32, I32, I32, None, "i32.div_u", Binary),
        (I32RemS, I32, I32, I32, None, "i32.rem_s", Binary),
        (I32RemU, I32, I32, I32, None, "i32.rem_u", Binary),
        (I32And, I32, I32, I32, None, "i32.and", Binary),
        (I32Or, I32, I32, I32, None, "i32.or", Binary),
        (I32Xor, I32, I32, I32, None, "i32.xor", Binary),
        (I32Shl, I32, I32, I32, None, "i32.shl", Binary),
        (I32ShrS, I32, I32, I32, None, "i32.shr_s", Binary),
        (I32ShrU, I32, I32, I32, None, "i32.shr_u", Binary),
        (I32Rotl, I32, I32, I32, None, "i32.rotl", Binary),
        (I32Rotr, I32, I32, I32, None, "i32.rotr", Binary),
        // i32 comparison
        (I32Eq, I32, I32, I32, None, "i32.eq", Binary),
        (I32Ne, I32, I32, I32, None, "i32.ne", Binary),
        (I32LtS, I32, I32, I32, None, "i32.lt_s", Binary),
        (I32LtU, I32, I32, I32, None, "i32.lt_u", Binary),
        (I32GtS, I32, I32, I32, None, "i32.gt_s", Binary),
        (I32GtU, I32, I32, I32, None, "i32.gt_u", Binary),
        (I32LeS, I32, I32, I32, None, "i32.le_s", Binary),
        (I32LeU, I32, I32, I32, None, "i32.le_u", Binary),
        (I32GeS, I32, I32, I32, None, "i32.ge_s", Binary),
        (I32GeU, I32, I32, I32, None, "i32.ge_u", Binary),
        // i32 unary
        (I32Clz, I32, I32, None, None, "i32.clz", Unary),
        (I32Ctz, I32, I32, None, None, "i32.ctz", Unary),
        (I32Popcnt, I32, I32, None, None, "i32.popcnt", Unary),
        (I32Eqz, I32, I32, None, None, "i32.eqz", Unary),
        (I32Extend8S, I32, I32, None, None, "i32.extend8_s", Unary),
        (I32Extend16S, I32, I32, None, None, "i32.extend16_s", Unary),
        // i64 arithmetic / bitwise
        (I64Add, I64, I64, I64, None, "i64.add", Binary),
        (I64Sub, I64, I64, I64, None, "i64.sub", Binary),
        (I64Mul, I64, I64, I64, None, "i64.mul", Binary),
        (I64DivS, I64, I64, I64, None, "i64.div_s", Binary),
        (I64DivU, I64, I64, I64, None, "i64.div_u", Binary),
        (I64RemS, I64, I64, I64, None, "i64.rem_s", Binary),
        (I64RemU, I64, I64, I64, None, "i64.rem_u", Binary),
        (I64And, I64, I64, I64, None, "i64.and", Binary),
        (I64Or, I64, I64, I64, None, "i64.or", Binary),
        (I64Xor, I64, I64, I64, None, "i64.xor", Binary),
        (I64Shl, I64, I64, I64, None, "i64.shl", Binary),
        (I64ShrS, I64, I64, I64, None, "i64.shr_s", Binary),
        (I64ShrU, I64, I64, I64, None, "i64.shr_u", Binary),
        (I64Rotl, I64, I64, I64, None, "i64.rotl", Binary),
        (I64Rotr, I64, I64, I64, None, "i64.rotr", Binary),
        // i64 comparison
        (I64Eq, I32, I64, I64, None, "i64.eq", Binary),
        (I64Ne, I32, I64, I64, None, "i64.ne", Binary),
        (I64LtS, I32, I64, I64, None, "i64.lt_s", Binary),
        (I64LtU, I32, I64, I64, None, "i64.lt_u", Binary),
        (I64GtS, I32, I64, I64, None, "i64.gt_s", Binary),
        (I64GtU, I32, I64, I64, None, "i64.gt_u", Binary),
        (I64LeS, I32, I64, I64, None, "i64.le_s", Binary),
        (I64LeU, I32, I64, I64, None, "i64.le_u", Binary),
        (I64GeS, I32, I64, I64, None, "i64.ge_s", Binary),
        (I64GeU, I32, I64, I64, None, "i64.ge_u", Binary),
        // i64 unary
        (I64Clz, I64, I64, None, None, "i64.clz", Unary),
        (I64Ctz, I64, I64, None, None, "i64.ctz", Unary),
        (I64Popcnt, I64, I64, None, None, "i64.popcnt", Unary),
        (I64Eqz, I32, I64, None, None, "i64.eqz", Unary),
        (I64Extend8S, I64, I64, None, None, "i64.extend8_s", Unary),
        (I64Extend16S, I64, I64, None, None, "i64.extend16_s", Unary),
        (I64Extend32S, I64, I64, None, None, "i64.extend32_s", Unary),
        // f32
        (F32Add, F32, F32, F32, None, "f32.add", Binary),
        (F32Sub, F32, F32, F32, None, "f32.sub", Binary),
        (F32Mul, F32, F32, F32, None, "f32.mul", Binary),
        (F32Div, F32, F32, F32, None, "f32.div", Binary),
        (F32Min, F32, F32, F32, None, "f32.min", Binary),
        (F32Max, F32, F32, F32, None, "f32.max", Binary),
        (F32Copysign, F32, F32, F32, None, "f32.copysign", Binary),
        (F32Eq, I32, F32, F32, None, "f32.eq", Binary),
        (F32Ne, I32, F32, F32, None, "f32.ne", Binary),
        (F32Lt, I32, F32, F32, None, "f32.lt", Binary),
        (F32Gt, I32, F32, F32, None, "f32.gt", Binary),
        (F32Le, I32, F32, F32, None, "f32.le", Binary),
        (F32Ge, I32, F32, F32, None, "f32.ge", Binary),
        (F32Abs, F32, F32, None, None, "f32.abs", Unary),
        (F32Neg, F32, F32, None, None, "f32.neg", Unary),
        (F32Ceil, F32, F32, None, None, "f32.ceil", Unary),
        (F32Floor, F32, F32, None, None, "f32.floor", Unary),
        (F32Trunc, F32, F32, None, None, "f32.trunc", Unary),
        (F32Nearest, F32, F32, None, None, "f32.nearest", Unary),
        (F32Sqrt, F32, F32, None, None, "f32.sqrt", Unary),
        // f64
        (F64Add, F64, F64, F64, None, "f64.add", Binary),
        (F64Sub, F64, F64, F64, None, "f64.sub", Binary),
        (F64Mul, F64, F64, F64, None, "f64.mul", Binary),
        (F64Div, F64, F64, F64, None, "f64.div", Binary),
        (F64Min, F64, F64, F64, None, "f64.min", Binary),
        (F64Max, F64, F64, F64, None, "f64.max", Binary),
        (F64Copysign, F64, F64, F64, None, "f64.copysign", Binary),
        (F64Eq, I32, F64, F64, None, "f64.eq", Binary),
        (F64Ne, I32, F64, F64, None, "f64.ne", Binary),
        (F64Lt, I32, F64, F64, None, "f64.lt", Binary),
        (F64Gt, I32, F64, F64, None, "f64.gt", Binary),
        (F64Le, I32, F64, F64, None, "f64.le", Binary),
        (F64Ge, I32, F64, F64, None, "f64.ge", Binary),
        (F64Abs, F64, F64, None, None, "f64.abs", Unary),
        (F64Neg, F64, F64, None, None, "f64.neg", Unary),
        (F64Ceil, F64, F64, None, None, "f64.ceil", Unary),
        (F64Floor, F64, F64, None, None, "f64.floor", Unary),
        (F64Trunc, F64, F64, None, None, "f64.trunc", Unary),
        (F64Nearest, F64, F64, None, None, "f64.nearest", Unary),
        (F64Sqrt, F64, F64, None, None, "f64.sqrt", Unary),
        // conversions
        (I32WrapI64, I32, I64, None, None, "i32.wrap_i64", Unary),
        (I64ExtendI32S, I64, I32, None, None, "i64.extend_i32_s", Unary),
        (I64ExtendI32U, I64, I32, None, None, "i64.extend_i32_u", Unary),
        (I32TruncF32S, I32, F32, None, None, "i32.trunc_f32_s", Unary),
        (I32TruncF32U, I32, F32, None, None, "i32.trunc_f32_u", Unary),
        (I32TruncF64S, I32, F64, None, None, "i32.trunc_f64_s", Unary),
        (I32TruncF64U, I32, F64, None, None, "i32.trunc_f64_u", Unary),
        (I64TruncF32S, I64, F32, None, None, "i64.trunc_f32_s", Unary),
        (I64TruncF32U, I64, F32, None, None, "i64.trunc_f32_u", Unary),
        (I64TruncF64S, I64, F64, None, None, "i64.trunc_f64_s", Unary),
        (I64TruncF64U, I64, F64, None, None, "i64.trunc_f64_u", Unary),
        (I32TruncSatF32S, I32, F32, None, None, "i32.trunc_sat_f32_s", Unary),
        (I32TruncSatF32U, I32, F32, None, None, "i32.trunc_sat_f32_u", Unary),
        (I32TruncSatF64S, I32, F64, None, None, "i32.trunc_sat_f64_s", Unary),
        (I32TruncSatF64U, I32, F64, None, None, "i32.trunc_sat_f64_u", Unary),
        (I64TruncSatF32S, I64, F32, None, None, "i64.trunc_sat_f32_s", Unary),
        (I64TruncSatF32U, I64, F32, None, None, "i64.trunc_sat_f32_u", Unary),
        (I64TruncSatF64S, I64, F64, None, None, "i64.trunc_sat_f64_s", Unary),
        (I64TruncSatF64U, I64, F64, None, None, "i64.trunc_sat_f64_u", Unary),
        (F32ConvertI32S, F32, I32, None, None, "f32.convert_i32_s", Unary),
        (F32ConvertI32U, F32, I32, None, None, "f32.convert_i32_u", Unary),
        (F32ConvertI64S, F32, I64, None, None, "f32.convert_i64_s", Unary),
        (F32ConvertI64U, F32, I64, None, None, "f32.convert_i64_u", Unary),
        (F32DemoteF64, F32, F64, None, None, "f32.demote_f64", Unary),
        (F64ConvertI32S, F64, I32, None, None, "f64.convert_i32_s", Unary),
        (F64ConvertI32U, F64, I32, None, None, "f64.convert_i32_u", Unary),
        (F64ConvertI64S, F64, I64, None, None, "f64.convert_i64_s", Unary),
        (F64ConvertI64U, F64, I64, None, None, "f64.convert_i64_u", Unary),
        (F64PromoteF32, F64, F32, None, None, "f64.promote_f32", Unary),
        (I32ReinterpretF32, I32, F32, None, None, "i32.reinterpret_f32", Unary),
        (I64ReinterpretF64, I64, F64, None, None, "i64.reinterpret_f64", Unary),
        (F32ReinterpretI32, F32, I32, None, None, "f32.reinterpret_i32", Unary),
        (F64ReinterpretI64, F64, I64, None, None, "f64.reinterpret_i64", Unary),
        // v128 splats / swizzle
        (I8x16Splat, V128, I32, None, None, "i8x16.splat", Unary),
        (I16x8Splat, V128, I32, None, None, "i16x8.splat", Unary),
        (I32x4Splat, V128, I32, None, None, "i32x4.splat", Unary),
        (I64x2Splat, V128, I64, None, None, "i64x2.splat", Unary),
        (F32x4Splat, V128, F32, None, None, "f32x4.splat", Unary),
        (F64x2Splat, V128, F64, None, None, "f64x2.splat", Unary),
        (I8x16Swizzle, V128, V128, V128, None, "i8x16.swizzle", Binary),
        // i8x16
        (I8x16Eq, V128, V128, V128, None, "i8x16.eq", Binary),
        (I8x16Ne, V128, V128, V128, None, "i8x16.ne", Binary),
        (I8x16LtS, V128, V128, V128, None, "i8x16.lt_s", Binary),
        (I8x16LtU, V128, V128, V128, None, "i8x16.lt_u", Binary),
        (I8x16GtS, V128, V128, V128, None, "i8x16.gt_s", Binary),
        (I8x16GtU, V128, V128, V128, None, "i8x16.gt_u", Binary),
        (I8x16LeS, V128, V128, V128, None, "i8x16.le_s", Binary),
        (I8x16LeU, V128, V128, V128, None, "i8x16.le_u", Binary),
        (I8x16GeS, V128, V128, V128, None, "i8x16.ge_s", Binary),
        (I8x16GeU, V128, V128, V128, None, "i8x16.ge_u", Binary),
        (I8x16Abs, V128, V128, None, None, "i8x16.abs", Unary),
        (I8x16Neg, V128, V128, None, None, "i8x16.neg", Unary),
        (I8x16Popcnt, V128, V128, None, None, "i8x16.popcnt", Unary),
        (I8x16AllTrue, I32, V128, None, None, "i8x16.all_true", Unary),
        (I8x16Bitmask, I32, V128, None, None, "i8x16.bitmask", Unary),
        (I8x16NarrowI16x8S, V128, V128, V128, None, "i8x16.narrow_i16x8_s", Binary),
        (I8x16NarrowI16x8U, V128, V128, V128, None, "i8x16.narrow_i16x8_u", Binary),
        (I8x16Shl, V128, V128, I32, None, "i8x16.shl", Binary),
        (I8x16ShrS, V128, V128, I32, None, "i8x16.shr_s", Binary),
        (I8x16ShrU, V128, V128, I32, None, "i8x16.shr_u", Binary),
        (I8x16Add, V128, V128, V128, None, "i8x16.add", Binary),
        (I8x16AddSatS, V128, V128, V128, None, "i8x16.add_sat_s", Binary),
        (I8x16AddSatU, V128, V128, V128, None, "i8x16.add_sat_u", Binary),
        (I8x16Sub, V128, V128, V128, None, "i8x16.sub", Binary),
        (I8x16SubSatS, V128, V128, V128, None, "i8x16.sub_sat_s", Binary),
        (I8x16SubSatU, V128, V128, V128, None, "i8x16.sub_sat_u", Binary),
        (I8x16MinS, V128, V128, V128, None, "i8x16.min_s", Binary),
        (I8x16MinU, V128, V128, V128, None, "i8x16.min_u", Binary),
        (I8x16MaxS, V128, V128, V128, None, "i8x16.max_s", Binary),
        (I8x16MaxU, V128, V128, V128, None, "i8x16.max_u", Binary),
        (I8x16AvgrU, V128, V128, V128, None, "i8x16.avgr_u", Binary),
        // i16x8
        (I16x8ExtAddPairwiseI8x16S, V128, V128, None, None, "i16x8.extadd_pairwise_i8x16_s", Unary),
        (I16x8ExtAddPairwiseI8x16U, V128, V128, None, None, "i16x8.extadd_pairwise_i8x16_u", Unary),
        (I16x8Eq, V128, V128, V128, None, "i16x8.eq", Binary),
        (I16x8Ne, V128, V128, V128, None, "i16x8.ne", Binary),
        (I16x8LtS, V128, V128, V128, None, "i16x8.lt_s", Binary),
        (I16x8LtU, V128, V128, V128, None, "i16x8.lt_u", Binary),
        (I16x8GtS, V128, V128, V128, None, "i16x8.gt_s", Binary),
        (I16x8GtU, V128, V128, V128, None, "i16x8.gt_u", Binary),
        (I16x8LeS, V128, V128, V128, None, "i16x8.le_s", Binary),
        (I16x8LeU, V128, V128, V128, None, "i16x8.le_u", Binary),
        (I16x8GeS, V128, V128, V128, None, "i16x8.ge_s", Binary),
        (I16x8GeU, V128, V128, V128, None, "i16x8.ge_u", Binary),
        (I16x8Abs, V128, V128, None, None, "i16x8.abs", Unary),
        (I16x8Neg, V128, V128, None, None, "i16x8.neg", Unary),
        (I16x8Q15MulrSatS, V128, V128, V128, None, "i16x8.q15mulr_sat_s", Binary),
        (I16x8AllTrue, I32, V128, None, None, "i16x8.all_true", Unary),
        (I16x8Bitmask, I32, V128, None, None, "i16x8.bitmask", Unary),
        (I16x8NarrowI32x4S, V128, V128, V128, None, "i16x8.narrow_i32x4_s", Binary),
        (I16x8NarrowI32x4U, V128, V128, V128, None, "i16x8.narrow_i32x4_u", Binary),
        (I16x8ExtendLowI8x16S, V128, V128, None, None, "i16x8.extend_low_i8x16_s", Unary),
        (I16x8ExtendHighI8x16S, V128, V128, None, None, "i16x8.extend_high_i8x16_s", Unary),
        (I16x8ExtendLowI8x16U, V128, V128, None, None, "i16x8.extend_low_i8x16_u", Unary),
        (I16x8ExtendHighI8x16U, V128, V128, None, None, "i16x8.extend_high_i8x16_u", Unary),
        (I16x8Shl, V128, V128, I32, None, "i16x8.shl", Binary),
        (I16x8ShrS, V128, V128, I32, None, "i16x8.shr_s", Binary),
        (I16x8ShrU, V128, V128, I32, None, "i16x8.shr_u", Binary),
        (I16x8Add, V128, V128, V128, None, "i16x8.add", Binary),
        (I16x8AddSatS, V128, V128, V128, None, "i16x8.add_sat_s", Binary),
        (I16x8AddSatU, V128, V128, V128, None, "i16x8.add_sat_u", Binary),
        (I16x8Sub, V128, V128, V128, None, "i16x8.sub", Binary),
        (I16x8SubSatS, V128, V128, V128, None, "i16x8.sub_sat_s", Binary),
        (I16x8SubSatU, V128, V128, V128, None, "i16x8.sub_sat_u", Binary),
        (I16x8Mul, V128, V128, V128, None, "i16x8.mul", Binary),
        (I16x8MinS, V128, V128, V128, None, "i16x8.min_s", Binary),
        (I16x8MinU, V128, V128, V128, None, "i16x8.min_u", Binary),
        (I16x8MaxS, V128, V128, V128, None, "i16x8.max_s", Binary),
        (I16x8MaxU, V128, V128, V128, None, "i16x8.max_u", Binary),
        (I16x8AvgrU, V128, V128, V128, None, "i16x8.avgr_u", Binary),
        (I16x8ExtMulLowI8x16S, V128, V128, V128, None, "i16x8.extmul_low_i8x16_s", Binary),
        (I16x8ExtMulHighI8x16S, V128, V128, V128, None, "i16x8.extmul_high_i8x16_s", Binary),
        (I16x8ExtMulLowI8x16U, V128, V128, V128, None, "i16x8.extmul_low_i8x16_u", Binary),
        (I16x8ExtMulHighI8x16U, V128, V128, V128, None, "i16x8.extmul_high_i8x16_u", Binary),
        // i32x4
        (I32x4ExtAddPairwiseI16x8S, V128, V128, None, None, "i32x4.extadd_pairwise_i16x8_s", Unary),
        (I32x4ExtAddPairwiseI16x8U, V128, V128, None, None, "i32x4.extadd_pairwise_i16x8_u", Unary),
        (I32x4Eq, V128, V128, V128, None, "i32x4.eq", Binary),
        (I32x4Ne, V128, V128, V128, None, "i32x4.ne", Binary),
        (I32x4LtS, V128, V128, V128, None, "i32x4.lt_s", Binary),
        (I32x4LtU, V128, V128, V128, None, "i32x4.lt_u", Binary),
        (I32x4GtS, V128, V128, V128, None, "i32x4.gt_s", Binary),
        (I32x4GtU, V128, V128, V128, None, "i32x4.gt_u", Binary),
        (I32x4LeS, V128, V128, V128, None, "i32x4.le_s", Binary),
        (I32x4LeU, V128, V128, V128, None, "i32x4.le_u", Binary),
        (I32x4GeS, V128, V128, V128, None, "i32x4.ge_s", Binary),
        (I32x4GeU, V128, V128, V128, None, "i32x4.ge_u", Binary),
        (I32x4Abs, V128, V128, None, None, "i32x4.abs", Unary),
        (I32x4Neg, V128, V128, None, None, "i32x4.neg", Unary),
        (I32x4AllTrue, I32, V128, None, None, "i32x4.all_true", Unary),
        (I32x4Bitmask, I32, V128, None, None, "i32x4.bitmask", Unary),
        (I32x4ExtendLowI16x8S, V128, V128, None, None, "i32x4.extend_low_i16x8_s", Unary),
        (I32x4ExtendHighI16x8S, V128, V128, None, None, "i32x4.extend_high_i16x8_s", Unary),
        (I32x4ExtendLowI16x8U, V128, V128, None, None, "i32x4.extend_low_i16x8_u", Unary),
        (I32x4ExtendHighI16x8U, V128, V128, None, None, "i32x4.extend_high_i16x8_u", Unary),
        (I32x4Shl, V128, V128, I32, None, "i32x4.shl", Binary),
        (I32x4ShrS, V128, V128, I32, None, "i32x4.shr_s", Binary),
        (I32x4ShrU, V128, V128, I32, None, "i32x4.shr_u", Binary),
        (I32x4Add, V128, V128, V128, None, "i32x4.add", Binary),
        (I32x4Sub, V128, V128, V128, None, "i32x4.sub", Binary),
        (I32x4Mul, V128, V128, V128, None, "i32x4.mul", Binary),
        (I32x4MinS, V128, V128, V128, None, "i32x4.min_s", Binary),
        (I32x4MinU, V128, V128, V128, None, "i32x4.min_u", Binary),
        (I32x4MaxS, V128, V128, V128, None, "i32x4.max_s", Binary),
        (I32x4MaxU, V128, V128, V128, None, "i32x4.max_u", Binary),
        (I32x4DotI16x8S, V128, V128, V128, None, "i32x4.dot_i16x8_s", Binary),
        (I32x4ExtMulLowI16x8S, V128, V128, V128, None, "i32x4.extmul_low_i16x8_s", Binary),
        (I32x4ExtMulHighI16x8S, V128, V128, V128, None, "i32x4.extmul_high_i16x8_s", Binary),
        (I32x4ExtMulLowI16x8U, V128, V128, V128, None, "i32x4.extmul_low_i16x8_u", Binary),
        (I32x4ExtMulHighI16x8U, V128, V128, V128, None, "i32x4.extmul_high_i16x8_u", Binary),
        (I32x4TruncSatF32x4S, V128, V128, None, None, "i32x4.trunc_sat_f32x4_s", Unary),
        (I32x4TruncSatF32x4U, V128, V128, None, None, "i32x4.trunc_sat_f32x4_u", Unary),
        (I32x4TruncSatF64x2SZero, V128, V128, None, None, "i32x4.trunc_sat_f64x2_s_zero", Unary),
        (I32x4TruncSatF64x2UZero, V128, V128, None, None, "i32x4.trunc_sat_f64x2_u_zero", Unary),
        // i64x2
        (I64x2Abs, V128, V128, None, None, "i64x2.abs", Unary),
        (I64x2Neg, V128, V128, None, None, "i64x2.neg", Unary),
        (I64x2AllTrue, I32, V128, None, None, "i64x2.all_true", Unary),
        (I64x2Bitmask, I32, V128, None, None, "i64x2.bitmask", Unary),
        (I64x2Eq, V128, V128, V128, None, "i64x2.eq", Binary),
        (I64x2Ne, V128, V128, V128, None, "i64x2.ne", Binary),
        (I64x2LtS, V128, V128, V128, None, "i64x2.lt_s", Binary),
        (I64x2GtS, V128, V128, V128, None, "i64x2.gt_s", Binary),
        (I64x2LeS, V128, V128, V128, None, "i64x2.le_s", Binary),
        (I64x2GeS, V128, V128, V128, None, "i64x2.ge_s", Binary),
        (I64x2ExtendLowI32x4S, V128, V128, None, None, "i64x2.extend_low_i32x4_s", Unary),
        (I64x2ExtendHighI32x4S, V128, V128, None, None, "i64x2.extend_high_i32x4_s", Unary),
        (I64x2ExtendLowI32x4U, V128, V128, None, None, "i64x2.extend_low_i32x4_u", Unary),
        (I64x2ExtendHighI32x4U, V128, V128, None, None, "i64x2.extend_high_i32x4_u", Unary),
        (I64x2Shl, V128, V128, I32, None, "i64x2.shl", Binary),
        (I64x2ShrS, V128, V128, I32, None, "i64x2.shr_s", Binary),
        (I64x2ShrU, V128, V128, I32, None, "i64x2.shr_u", Binary),
        (I64x2Add, V128, V128, V128, None, "i64x2.add", Binary),
        (I64x2Sub, V128, V128, V128, None, "i64x2.sub", Binary),
        (I64x2Mul, V128, V128, V128, None, "i64x2.mul", Binary),
        (I64x2ExtMulLowI32x4S, V128, V128, V128, None, "i64x2.extmul_low_i32x4_s", Binary),
        (I64x2ExtMulHighI32x4S, V128, V128, V128, None, "i64x2.extmul_high_i32x4_s", Binary),
        (I64x2ExtMulLowI32x4U, V128, V128, V128, None, "i64x2.extmul_low_i32x4_u", Binary),
        (I64x2ExtMulHighI32x4U, V128, V128, V128, None, "i64x2.extmul_high_i32x4_u", Binary),
        // f32x4
        (F32x4Eq, V128, V128, V128, None, "f32x4.eq", Binary),
        (F32x4Ne, V128, V128, V128, None, "f32x4.ne", Binary),
        (F32x4Lt, V128, V128, V128, None, "f32x4.lt", Binary),
        (F32x4Gt, V128, V128, V128, None, "f32x4.gt", Binary),
        (F32x4Le, V128, V128, V128, None, "f32x4.le", Binary),
        (F32x4Ge, V128, V128, V128, None, "f32x4.ge", Binary),
        (F32x4Ceil, V128, V128, None, None, "f32x4.ceil", Unary),
        (F32x4Floor, V128, V128, None, None, "f32x4.floor", Unary),
        (F32x4Trunc, V128, V128, None, None, "f32x4.trunc", Unary),
        (F32x4Nearest, V128, V128, None, None, "f32x4.nearest", Unary),
        (F32x4Abs, V128, V128, None, None, "f32x4.abs", Unary),
        (F32x4Neg, V128, V128, None, None, "f32x4.neg", Unary),
        (F32x4Sqrt, V128, V128, None, None, "f32x4.sqrt", Unary),
        (F32x4Add, V128, V128, V128, None, "f32x4.add", Binary),
        (F32x4Sub, V128, V128, V128, None, "f32x4.sub", Binary),
        (F32x4Mul, V128, V128, V128, None, "f32x4.mul", Binary),
        (F32x4Div, V128, V128, V128, None, "f32x4.div", Binary),
        (F32x4Min, V128, V128, V128, None, "f32x4.min", Binary),
        (F32x4Max, V128, V128, V128, None, "f32x4.max", Binary),
        (F32x4PMin, V128, V128, V128, None, "f32x4.pmin", Binary),
        (F32x4PMax, V128, V128, V128, None, "f32x4.pmax", Binary),
        (F32x4DemoteF64x2Zero, V128, V128, None, None, "f32x4.demote_f64x2_zero", Unary),
        (F32x4ConvertI32x4S, V128, V128, None, None, "f32x4.convert_i32x4_s", Unary),
        (F32x4ConvertI32x4U, V128, V128, None, None, "f32x4.convert_i32x4_u", Unary),
        // f64x2
        (F64x2Eq, V128, V128, V128, None, "f64x2.eq", Binary),
        (F64x2Ne, V128, V128, V128, None, "f64x2.ne", Binary),
        (F64x2Lt, V128, V128, V128, None, "f64x2.lt", Binary),
        (F64x2Gt, V128, V128, V128, None, "f64x2.gt", Binary),
        (F64x2Le, V128, V128, V128, None, "f64x2.le", Binary),
        (F64x2Ge, V128, V128, V128, None, "f64x2.ge", Binary),
        (F64x2Ceil, V128, V128, None, None, "f64x2.ceil", Unary),
        (F64x2Floor, V128, V128, None, None, "f64x2.floor", Unary),
        (F64x2Trunc, V128, V128, None, None, "f64x2.trunc", Unary),
        (F64x2Nearest, V128, V128, None, None, "f64x2.nearest", Unary),
        (F64x2Abs, V128, V128, None, None, "f64x2.abs", Unary),
        (F64x2Neg, V128, V128, None, None, "f64x2.neg", Unary),
        (F64x2Sqrt, V128, V128, None, None, "f64x2.sqrt", Unary),
        (F64x2Add, V128, V128, V128, None, "f64x2.add", Binary),
        (F64x2Sub, V128, V128, V128, None, "f64x2.sub", Binary),
        (F64x2Mul, V128, V128, V128, None, "f64x2.mul", Binary),
        (F64x2Div, V128, V128, V128, None, "f64x2.div", Binary),
        (F64x2Min, V128, V128, V128, None, "f64x2.min", Binary),
        (F64x2Max, V128, V128, V128, None, "f64x2.max", Binary),
        (F64x2PMin, V128, V128, V128, None, "f64x2.pmin", Binary),
        (F64x2PMax, V128, V128, V128, None, "f64x2.pmax", Binary),
        (F64x2PromoteLowF32x4, V128, V128, None, None, "f64x2.promote_low_f32x4", Unary),
        (F64x2ConvertLowI32x4S, V128, V128, None, None, "f64x2.convert_low_i32x4_s", Unary),
        (F64x2ConvertLowI32x4U, V128, V128, None, None, "f64x2.convert_low_i32x4_u", Unary),
        // v128 bitwise
        (V128Not, V128, V128, None, None, "v128.not", Unary),
        (V128And, V128, V128, V128, None, "v128.and", Binary),
        (V128AndNot, V128, V128, V128, None, "v128.andnot", Binary),
        (V128Or, V128, V128, V128, None, "v128.or", Binary),
        (V128Xor, V128, V128, V128, None, "v128.xor", Binary),
        (V128AnyTrue, I32, V128, None, None, "v128.any_true", Unary),
        (V128Bitselect, V128, V128, V128, V128, "v128.bitselect", Ternary),
    }
    mem {
        (I32Load, I32, I32, None, None, "i32.load", Load),
        (I64Load, I64, I32, None, None, "i64.load", Load),
        (F32Load, F32, I32, None, None, "f32.load", Load),
        (F64Load, F64, I32, None, None, "f64.load", Load),
        (I32Load8S, I32, I32, None, None, "i32.load8_s", Load),
        (I32Load8U, I32, I32, None, None, "i32.load8_u", Load),
        (I32Load16S, I32, I32, None, None, "i32.load16_s", Load),
        (I32Load16U, I32, I32, None, None, "i32.load16_u", Load),
        (I64Load8S, I64, I32, None, None, "i64.load8_s", Load),
        (I64Load8U, I64, I32, None, None, "i64.load8_u", Load),
        (I64Load16S, I64, I32, None, None, "i64.load16_s", Load),
        (I64Load16U, I64, I32, None, None, "i64.load16_u", Load),
        (I64Load32S, I64, I32, None, None, "i64.load32_s", Load),
        (I64Load32U, I64, I32, None, None, "i64.load32_u", Load),
        (V128Load, V128, I32, None, None, "v128.load", Load),
        (V128Load8x8S, V128, I32, None, None, "v128.load8x8_s", Load),
        (V128Load8x8U, V128, I32, None, None, "v128.load8x8_u", Load),
        (V128Load16x4S, V128, I32, None, None, "v128.load16x4_s", Load),
        (V128Load16x4U, V128, I32, None, None, "v128.load16x4_u", Load),
        (V128Load32x2S, V128, I32, None, None, "v128.load32x2_s", Load),
        (V128Load32x2U, V128, I32, None, None, "v128.load32x2_u", Load),
        (V128Load8Splat, V128, I32, None, None, "v128.load8_splat", Load),
        (V128Load16Splat, V128, I32, None, None, "v128.load16_splat", Load),
        (V128Load32Splat, V128, I32, None, None, "v128.load32_splat", Load),
        (V128Load64Splat, V128, I32, None, None, "v128.load64_splat", Load),
        (V128Load32Zero, V128, I32, None, None, "v128.load32_zero", Load),
        (V128Load64Zero, V128, I32, None, None, "v128.load64_zero", Load),
        (I32Store, None, I32, I32, None, "i32.store", Store),
        (I64Store, None, I32, I64, None, "i64.store", Store),
        (F32Store, None, I32, F32, None, "f32.store", Store),
        (F64Store, None, I32, F64, None, "f64.store", Store),
        (I32Store8, None, I32, I32, None, "i32.store8", Store),
        (I32Store16, None, I32, I32, None, "i32.store16", Store),
        (I64Store8, None, I32, I64, None, "i64.store8", Store),
        (I64Store16, None, I32, I64, None, "i64.store16", Store),
        (I64Store32, None, I32, I64, None, "i64.store32", Store),
        (V128Store, None, I32, V128, None, "v128.store", Store),
        // threads proposal, admitted by Config::threads
        (MemoryAtomicNotify, I32, I32, I32, None, "memory.atomic.notify", AtomicRmw),
        (MemoryAtomicWait32, I32, I32, I32, I64, "memory.atomic.wait32", AtomicCmpxchg),
        (MemoryAtomicWait64, I32, I32, I64, I64, "memory.atomic.wait64", AtomicCmpxchg),
        (I32AtomicLoad, I32, I32, None, None, "i32.atomic.load", Load),
        (I64AtomicLoad, I64, I32, None, None, "i64.atomic.load", Load),
        (I32AtomicLoad8U, I32, I32, None, None, "i32.atomic.load8_u", Load),
        (I32AtomicLoad16U, I32, I32, None, None, "i32.atomic.load16_u", Load),
        (I64AtomicLoad8U, I64, I32, None, None, "i64.atomic.load8_u", Load),
        (I64AtomicLoad16U, I64, I32, None, None, "i64.atomic.load16_u", Load),
        (I64AtomicLoad32U, I64, I32, None, None, "i64.atomic.load32_u", Load),
        (I32AtomicStore, None, I32, I32, None, "i32.atomic.store", Store),
        (I64AtomicStore, None, I32, I64, None, "i64.atomic.store", Store),
        (I32AtomicStore8, None, I32, I32, None, "i32.atomic.store8", Store),
        (I32AtomicStore16, None, I32, I32, None, "i32.atomic.store16", Store),
        (I64AtomicStore8, None, I32, I64, None, "i64.atomic.store8", Store),
        (I64AtomicStore16, None, I32, I64, None, "i64.atomic.store16", Store),
        (I64AtomicStore32, None, I32, I64, None, "i64.atomic.store32", Store),
        (I32AtomicRmwAdd, I32, I32, I32, None, "i32.atomic.rmw.add", AtomicRmw),
        (I64AtomicRmwAdd, I64, I32, I64, None, "i64.atomic.rmw.add", AtomicRmw),
        (I32AtomicRmw8AddU, I32, I32, I32, None, "i32.atomic.rmw8.add_u", AtomicRmw),
        (I32AtomicRmw16AddU, I32, I32, I32, None, "i32.atomic.rmw16.add_u", AtomicRmw),
        (I64AtomicRmw8AddU, I64, I32, I64, None, "i64.atomic.rmw8.add_u", AtomicRmw),
        (I64AtomicRmw16AddU, I64, I32, I64, None, "i64.atomic.rmw16.add_u", AtomicRmw),
        (I64AtomicRmw32AddU, I64, I32, I64, None, "i64.atomic.rmw32.add_u", AtomicRmw),
        (I32AtomicRmwSub, I32, I32, I32, None, "i32.atomic.rmw.sub", AtomicRmw),
        (I64AtomicRmwSub, I64, I32, I64, None, "i64.atomic.rmw.sub", AtomicRmw),
        (I32AtomicRmw8SubU, I32, I32, I32, None, "i32.atomic.rmw8.sub_u", AtomicRmw),
        (I32AtomicRmw16SubU, I32, I32, I32, None, "i32.atomic.rmw16.sub_u", AtomicRmw),
        (I64AtomicRmw8SubU, I64, I32, I64, None, "i64.atomic.rmw8.sub_u", AtomicRmw),
        (I64AtomicRmw16SubU, I64, I32, I64, None, "i64.atomic.rmw16.sub_u", AtomicRmw),
        (I64AtomicRmw32SubU, I64, I32, I64, None, "i64.atomic.rmw32.sub_u", AtomicRmw),
        (I32AtomicRmwAnd, I32, I32, I32, None, "i32.atomic.rmw.and", AtomicRmw),
        (I64AtomicRmwAnd, I64, I32, I64, None, "i64.atomic.rmw.and", AtomicRmw),
        (I32AtomicRmw8AndU, I32, I32, I32, None, "i32.atomic.rmw8.and_u", AtomicRmw),
        (I32AtomicRmw16AndU, I32, I32, I32, None, "i32.atomic.rmw16.and_u", AtomicRmw),
        (I64AtomicRmw8AndU, I64, I32, I64, None, "i64.atomic.rmw8.and_u", AtomicRmw),
        (I64AtomicRmw16AndU, I64, I32, I64, None, "i64.atomic.rmw16.and_u", AtomicRmw),
        (I64AtomicRmw32AndU, I64, I32, I64, None, "i64.atomic.rmw32.and_u", AtomicRmw),
        (I32AtomicRmwOr, I32, I32, I32, None, "i32.atomic.rmw.or", AtomicRmw),
        (I64AtomicRmwOr, I64, I32, I64, None, "i64.atomic.rmw.or", AtomicRmw),
        (I32AtomicRmw8OrU, I32, I32, I32, None, "i32.atomic.rmw8.or_u", AtomicRmw),
        (I32AtomicRmw16OrU, I32, I32, I32, None, "i32.atomic.rmw16.or_u", AtomicRmw),
        (I64AtomicRmw8OrU, I64, I32, I64, None, "i64.atomic.rmw8.or_u", AtomicRmw),
        (I64AtomicRmw16OrU, I64, I32, I64, None, "i64.atomic.rmw16.or_u", AtomicRmw),
        (I64AtomicRmw32OrU, I64, I32, I64, None, "i64.atomic.rmw32.or_u", AtomicRmw),
        (I32AtomicRmwXor, I32, I32, I32, None, "i32.atomic.rmw.xor", AtomicRmw),
        (I64AtomicRmwXor, I64, I32, I64, None, "i64.atomic.rmw.xor", AtomicRmw),
        (I32AtomicRmw8XorU, I32, I32, I32, None, "i32.atomic.rmw8.xor_u", AtomicRmw),
        (I32AtomicRmw16XorU, I32, I32, I32, None, "i32.atomic.rmw16.xor_u", AtomicRmw),
        (I64AtomicRmw8XorU, I64, I32, I64, None, "i64.atomic.rmw8.xor_u", AtomicRmw),
        (I64AtomicRmw16XorU, I64, I32, I64, None, "i64.atomic.rmw16.xor_u", AtomicRmw),
        (I64AtomicRmw32XorU, I64, I32, I64, None, "i64.atomic.rmw32.xor_u", AtomicRmw),
        (I32AtomicRmwXchg, I32, I32, I32, None, "i32.atomic.rmw.xchg", AtomicRmw),
        (I64AtomicRmwXchg, I64, I32, I64, None, "i64.atomic.rmw.xchg", AtomicRmw),
        (I32AtomicRmw8XchgU, I32, I32, I32, None, "i32.atomic.rmw8.xchg_u", AtomicRmw),
        (I32AtomicRmw16XchgU, I32, I32, I32, None, "i32.atomic.rmw16.xchg_u", AtomicRmw),
        (I64AtomicRmw8XchgU, I64, I32, I64, None, "i64.atomic.rmw8.xchg_u", AtomicRmw),
        (I64AtomicRmw16XchgU, I64, I32, I64, None, "i64.atomic.rmw16.xchg_u", AtomicRmw),
        (I64AtomicRmw32XchgU, I64, I32, I64, None, "i64.atomic.rmw32.xchg_u", AtomicRmw),
        (I32AtomicRmwCmpxchg, I32, I32, I32, I32, "i32.atomic.rmw.cmpxchg", AtomicCmpxchg),
        (I64AtomicRmwCmpxchg, I64, I32, I64, I64, "i64.atomic.rmw.cmpxchg", AtomicCmpxchg),
        (I32AtomicRmw8CmpxchgU, I32, I32, I32, I32, "i32.atomic.rmw8.cmpxchg_u", AtomicCmpxchg),
        (I32AtomicRmw16CmpxchgU, I32, I32, I32, I32, "i32.atomic.rmw16.cmpxchg_u", AtomicCmpxchg),
        (I64AtomicRmw8CmpxchgU, I64, I32, I64, I64, "i64.atomic.rmw8.cmpxchg_u", AtomicCmpxchg),
        (I64AtomicRmw16CmpxchgU, I64, I32, I64, I64, "i64.atomic.rmw16.cmpxchg_u", AtomicCmpxchg),
        (I64AtomicRmw32CmpxchgU, I64, I32, I64, I64, "i64.atomic.rmw32.cmpxchg_u", AtomicCmpxchg),
    }
    memlane {
        (V128Load8Lane, V128, I32, V128, None, "v128.load8_lane", LoadLane),
        (V128Load16Lane, V128, I32, V128, None, "v128.load16_lane", LoadLane),
        (V128Load32Lane, V128, I32, V128, None, "v128.load32_lane", LoadLane),
        (V128Load64Lane, V128, I32, V128, None, "v128.load64_lane", LoadLane),
        (V128Store8Lane, None, I32, V128, None, "v128.store8_lane", StoreLane),
        (V128Store16Lane, None, I32, V128, None, "v128.store16_lane", StoreLane),
        (V128Store32Lane, None, I32, V128, None, "v128.store32_lane", StoreLane),
        (V128Store64Lane, None, I32, V128, None, "v128.store64_lane", StoreLane),
    }
    lane {
        (I8x16ExtractLaneS, I32, V128, None, None, "i8x16.extract_lane_s", ExtractLane),
        (I8x16ExtractLaneU, I32, V128, None, None, "i8x16.extract_lane_u", ExtractLane),
        (I16x8ExtractLaneS, I32, V128, None, None, "i16x8.extract_lane_s", ExtractLane),
        (I16x8ExtractLaneU, I32, V128, None, None, "i16x8.extract_lane_u", ExtractLane),
        (I32x4ExtractLane, I32, V128, None, None, "i32x4.extract_lane", ExtractLane),
        (I64x2ExtractLane, I64, V128, None, None, "i64x2.extract_lane", ExtractLane),
        (F32x4ExtractLane, F32, V128, None, None, "f32x4.extract_lane", ExtractLane),
        (F64x2ExtractLane, F64, V128, None, None, "f64x2.extract_lane", ExtractLane),
        (I8x16ReplaceLane, V128, V128, I32, None, "i8x16.replace_lane", ReplaceLane),
        (I16x8ReplaceLane, V128, V128, I32, None, "i16x8.replace_lane", ReplaceLane),
        (I32x4ReplaceLane, V128, V128, I32, None, "i32x4.replace_lane", ReplaceLane),
        (I64x2ReplaceLane, V128, V128, I64, None, "i64x2.replace_lane", ReplaceLane),
        (F32x4ReplaceLane, V128, V128, F32, None, "f32x4.replace_lane", ReplaceLane),
        (F64x2ReplaceLane, V128, V128, F64, None, "f64x2.replace_lane", ReplaceLane),
    }
    special {
        (Unreachable, None, None, None, None, "unreachable", Nullary),
        (Select, None, None, None, None, "select", Select),
        (RefIsNull, I32, None, None, None, "ref.is_null", Unary),
        (RefFunc, None, None, None, None, "ref.func", RefFunc),
        (I8x16Shuffle, V128, V128, V128, None, "i8x16.shuffle", Shuffle),
        (Const32, None, None, None, None, "const32", Const32),
        (Const64, None, None, None, None, "const64", Const64),
        (Const128, None, None, None, None, "const128", Const128),
        (MoveI32, None, I32, None, None, "move.i32", Move),
        (MoveF32, None, F32, None, None, "move.f32", Move),
        (MoveI64, None, I64, None, None, "move.i64", Move),
        (MoveF64, None, F64, None, None, "move.f64", Move),
        (MoveV128, None, V128, None, None, "move.v128", Move),
        (Jump, None, None, None, None, "jump", Jump),
        (JumpIfTrue, None, I32, None, None, "jump_if_true", JumpIf),
        (JumpIfFalse, None, I32, None, None, "jump_if_false", JumpIf),
        (Call, None, None, None, None, "call", Call),
        (CallIndirect, None, None, None, None, "call_indirect", CallIndirect),
        (BrTable, None, I32, None, None, "br_table", BrTable),
        (End, None, None, None, None, "end", End),
        (Throw, None, None, None, None, "throw", Throw),
        (GlobalGet32, None, None, None, None, "global.get32", GlobalGet),
        (GlobalGet64, None, None, None, None, "global.get64", GlobalGet),
        (GlobalGet128, None, None, None, None, "global.get128", GlobalGet),
        (GlobalSet32, None, None, None, None, "global.set32", GlobalSet),
        (GlobalSet64, None, None, None, None, "global.set64", GlobalSet),
        (GlobalSet128, None, None, None, None, "global.set128", GlobalSet),
        (MemorySize, I32, None, None, None, "memory.size", MemorySize),
        (MemoryGrow, I32, I32, None, None, "memory.grow", MemoryGrow),
        (MemoryInit, None, I32, I32, I32, "memory.init", MemoryBulk),
        (MemoryCopy, None, I32, I32, I32, "memory.copy", MemoryBulk),
        (MemoryFill, None, I32, I32, I32, "memory.fill", MemoryBulk),
        (DataDrop, None, None, None, None, "data.drop", SegDrop),
        (ElemDrop, None, None, None, None, "elem.drop", SegDrop),
        (TableGet, None, I32, None, None, "table.get", TableGet),
        (TableSet, None, I32, None, None, "table.set", TableSet),
        (TableSize, I32, None, None, None, "table.size", TableSize),
        (TableGrow, I32, None, I32, None, "table.grow", TableGrow),
        (TableFill, None, I32, None, I32, "table.fill", TableFill),
        (TableInit, None, I32, I32, I32, "table.init", TableInit),
        (TableCopy, None, I32, I32, I32, "table.copy", TableCopy),
        (AtomicFence, None, None, None, None, "atomic.fence", Nullary),
    }
}

impl Op {
    pub fn info(self) -> &'static OpInfo {
        &INFO[self as u16 as usize]
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    pub fn family(self) -> Family {
        self.info().family
    }

    pub fn result(self) -> CodeKind {
        self.info().result
    }

    pub fn param(self, i: usize) -> CodeKind {
        self.info().params[i]
    }

    /// Bytes the opcode removes from the shadow stack.
    pub fn stack_shrink_size(self) -> u32 {
        let p = &self.info().params;
        p[0].memory_size() + p[1].memory_size() + p[2].memory_size()
    }

    /// Bytes the opcode adds to the shadow stack.
    pub fn stack_grow_size(self) -> u32 {
        self.info().result.memory_size()
    }

    /// Threads-proposal opcodes are admitted only when the feature toggle
    /// is set. The rows are contiguous in the table, plus the fence.
    pub fn is_atomic(self) -> bool {
        (Op::MemoryAtomicNotify..=Op::I64AtomicRmw32CmpxchgU).contains(&self)
            || self == Op::AtomicFence
    }

    pub fn from_u16(tag: u16) -> Option<Op> {
        OPS.get(tag as usize).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_self_consistent() {
        for (i, &op) in OPS.iter().enumerate() {
            assert_eq!(op as u16 as usize, i);
            assert_eq!(Op::from_u16(i as u16), Some(op));
        }
        assert_eq!(Op::from_u16(OPS.len() as u16), None);
    }

    #[test]
    fn stack_effect_sizes() {
        assert_eq!(Op::I32Add.stack_shrink_size(), 8);
        assert_eq!(Op::I32Add.stack_grow_size(), 4);
        assert_eq!(Op::I64Eqz.stack_shrink_size(), 8);
        assert_eq!(Op::I64Eqz.stack_grow_size(), 4);
        assert_eq!(Op::V128Bitselect.stack_shrink_size(), 48);
        assert_eq!(Op::V128Bitselect.stack_grow_size(), 16);
        assert_eq!(Op::F64Store.stack_shrink_size(), 12);
        assert_eq!(Op::F64Store.stack_grow_size(), 0);
    }

    #[test]
    fn atomic_range_covers_threads_ops() {
        assert!(Op::I32AtomicLoad.is_atomic());
        assert!(Op::I64AtomicRmw32CmpxchgU.is_atomic());
        assert!(Op::MemoryAtomicNotify.is_atomic());
        assert!(Op::AtomicFence.is_atomic());
        assert!(!Op::I32Load.is_atomic());
        assert!(!Op::I32Add.is_atomic());
    }

    #[test]
    fn mnemonics_follow_wasm_text_format() {
        assert_eq!(Op::I32Add.name(), "i32.add");
        assert_eq!(Op::F64x2PromoteLowF32x4.name(), "f64x2.promote_low_f32x4");
        assert_eq!(Op::JumpIfFalse.name(), "jump_if_false");
    }
}
