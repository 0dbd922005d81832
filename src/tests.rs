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

//! End-to-end scenarios: WAT in, emitted records out.

use crate::bytecode::{self, records, Record, Tail, JUMP_OFFSET_FIELD};
use crate::error::CompileError;
use crate::module::{CompiledFunction, CompiledModule};
use crate::opcode::Op;
use crate::{compile_module, Config};

fn compile_with(src: &str, config: &Config) -> CompiledModule {
    let bytes = wat::parse_str(src).expect("wat parses");
    let module = compile_module(&bytes, config).expect("module compiles");
    for (i, f) in module.functions.iter().enumerate() {
        if !f.bytecode.is_empty() {
            bytecode::validate(&f.bytecode, f.required_stack_size)
                .unwrap_or_else(|msg| panic!("func[{i}] validation failed: {msg}"));
        }
    }
    module
}

fn compile(src: &str) -> CompiledModule {
    compile_with(src, &Config::default())
}

fn ops(f: &CompiledFunction) -> Vec<Op> {
    records(&f.bytecode).map(|r| r.op).collect()
}

fn nth<'a>(f: &'a CompiledFunction, i: usize) -> Record<'a> {
    records(&f.bytecode).nth(i).expect("record index in range")
}

fn offsets_tail(rec: &Record, buf: &[u8]) -> Vec<u16> {
    match rec.tail() {
        Some(Tail::Offsets { pos, count }) => (0..count)
            .map(|i| u16::from_le_bytes(buf[pos + i * 2..pos + i * 2 + 2].try_into().unwrap()))
            .collect(),
        _ => panic!("record has no offset tail"),
    }
}

#[test]
fn constant_prelude_and_direct_local_reference() {
    // the local is never written, so local.get emits no move; the
    // constant is hoisted once into the prelude
    let m = compile("(module (func (param i32) (result i32) local.get 0 i32.const 1 i32.add))");
    let f = &m.functions[0];
    assert_eq!(ops(f), vec![Op::Const32, Op::I32Add, Op::End]);

    let prelude = nth(f, 0);
    assert_eq!(prelude.u16_field(2), 4, "constant slot after the parameter");
    assert_eq!(prelude.u32_field(4), 1);

    let add = nth(f, 1);
    assert_eq!(add.u16_field(2), 0, "src0 reads the parameter in place");
    assert_eq!(add.u16_field(4), 4, "src1 reads the constant slot");
    assert_eq!(add.u16_field(6), 8, "result lands past the fixed slots");

    assert_eq!(offsets_tail(&nth(f, 2), &f.bytecode), vec![8]);
    assert_eq!(f.required_stack_size, 16);
}

#[test]
fn if_else_produces_results_at_canonical_offset() {
    let m = compile(
        "(module (func (param i32 i32) (result i32)
            local.get 0 local.get 1 i32.lt_s
            if (result i32) local.get 0 else local.get 1 end))",
    );
    let f = &m.functions[0];
    assert_eq!(
        ops(f),
        vec![
            Op::I32LtS,
            Op::JumpIfFalse,
            Op::MoveI32,
            Op::Jump,
            Op::MoveI32,
            Op::End
        ]
    );

    let cmp = nth(f, 0);
    assert_eq!((cmp.u16_field(2), cmp.u16_field(4)), (0, 4));
    let cond_dst = cmp.u16_field(6);

    let br = nth(f, 1);
    assert_eq!(br.u16_field(2), cond_dst, "branch consumes the comparison");
    assert_eq!(
        br.pos as i32 + br.i32_field(JUMP_OFFSET_FIELD),
        nth(f, 4).pos as i32,
        "jump-if-false lands on the else arm"
    );

    // both arms park the result at the block's canonical offset
    assert_eq!(nth(f, 2).u16_field(4), 8);
    assert_eq!(nth(f, 4).u16_field(4), 8);

    let skip = nth(f, 3);
    assert_eq!(
        skip.pos as i32 + skip.i32_field(JUMP_OFFSET_FIELD),
        nth(f, 5).pos as i32,
        "then arm jumps past the else arm"
    );
    assert_eq!(offsets_tail(&nth(f, 5), &f.bytecode), vec![8]);
}

#[test]
fn loop_back_edge_restores_parameter_slot() {
    let m = compile(
        "(module (func (param i32) (result i32)
            local.get 0
            loop (param i32) (result i32)
              i32.const 1
              i32.sub
              local.set 0
              local.get 0
              local.get 0
              br_if 0
            end))",
    );
    let f = &m.functions[0];
    assert_eq!(
        ops(f),
        vec![
            Op::Const32,
            Op::MoveI32,
            Op::I32Sub,
            Op::JumpIfFalse,
            Op::MoveI32,
            Op::Jump,
            Op::MoveI32,
            Op::End
        ]
    );

    // the subtraction forwards straight into local.set 0
    let sub = nth(f, 2);
    assert_eq!(sub.u16_field(6), 0, "producer writes the local's home slot");

    // on the taken path, the direct local reference moves into the loop
    // parameter's canonical slot right before the back edge
    let fixup_move = nth(f, 4);
    assert_eq!((fixup_move.u16_field(2), fixup_move.u16_field(4)), (0, 8));

    let back = nth(f, 5);
    let target = back.pos as i32 + back.i32_field(JUMP_OFFSET_FIELD);
    assert_eq!(target, sub.pos as i32, "back edge lands on the loop start");
    assert!(back.i32_field(JUMP_OFFSET_FIELD) < 0);

    // the fall-through side keeps the block result via its own move and
    // the skip jump lands exactly there
    let skip = nth(f, 3);
    assert_eq!(
        skip.pos as i32 + skip.i32_field(JUMP_OFFSET_FIELD),
        nth(f, 6).pos as i32
    );
    assert_eq!((nth(f, 6).u16_field(2), nth(f, 6).u16_field(4)), (0, 8));
}

#[test]
fn eqz_fuses_into_inverted_conditional_branch() {
    let m = compile(
        "(module (func (param i32)
            block local.get 0 i32.eqz br_if 0 end))",
    );
    let f = &m.functions[0];
    assert_eq!(ops(f), vec![Op::JumpIfFalse, Op::End]);
    let br = nth(f, 0);
    assert_eq!(br.u16_field(2), 0, "branch reads the original source");
    assert_eq!(
        br.pos as i32 + br.i32_field(JUMP_OFFSET_FIELD),
        nth(f, 1).pos as i32
    );
}

#[test]
fn eqz_fuses_into_if() {
    let m = compile(
        "(module (func (param i32) (result i32)
            local.get 0 i32.eqz
            if (result i32) i32.const 1 else i32.const 2 end))",
    );
    let f = &m.functions[0];
    let all = ops(f);
    assert!(!all.contains(&Op::I32Eqz));
    assert!(all.contains(&Op::JumpIfTrue), "polarity inverted");
    assert!(!all.contains(&Op::JumpIfFalse));
}

#[test]
fn constant_pool_retains_top_frequencies() {
    let mut body = String::new();
    for v in 100..106u32 {
        for _ in 0..10 {
            body.push_str(&format!("i32.const {v} drop "));
        }
    }
    for v in 0..14u32 {
        body.push_str(&format!("i32.const {v} drop "));
    }
    let m = compile(&format!("(module (func {body}))"));
    let f = &m.functions[0];

    let consts: Vec<Record> = records(&f.bytecode)
        .filter(|r| r.op == Op::Const32)
        .collect();
    assert_eq!(consts.len(), 20, "6 prelude records + 14 inline");

    // prelude slots are the six fixed offsets below the value area
    let prelude: Vec<&Record> = consts.iter().filter(|r| r.u16_field(2) < 24).collect();
    assert_eq!(prelude.len(), 6);
    for r in &prelude {
        assert!((100..106).contains(&r.u32_field(4)), "hot constants retained");
    }
    let inline: Vec<&Record> = consts.iter().filter(|r| r.u16_field(2) >= 24).collect();
    assert_eq!(inline.len(), 14);
    for r in &inline {
        assert!(r.u32_field(4) < 14, "cold constants emitted at use sites");
        assert_eq!(r.u16_field(2), 24, "inline results share the stack top");
    }
}

#[test]
fn retained_constants_share_one_slot() {
    let m = compile("(module (func (result i32) i32.const 7 i32.const 7 i32.add))");
    let f = &m.functions[0];
    assert_eq!(ops(f), vec![Op::Const32, Op::I32Add, Op::End]);
    let slot = nth(f, 0).u16_field(2);
    let add = nth(f, 1);
    assert_eq!(add.u16_field(2), slot);
    assert_eq!(add.u16_field(4), slot);
}

#[test]
fn disjoint_local_live_ranges_share_a_physical_slot() {
    let m = compile(
        "(module (func (param i32) (result i32) (local i32 i32)
            local.get 0
            i32.const 10
            i32.add
            local.set 1
            local.get 1
            local.get 1
            i32.mul
            local.set 2
            local.get 2))",
    );
    let f = &m.functions[0];
    // locals table holds param, both locals, then the retained constant
    assert_eq!(f.locals.len(), 4);
    assert_eq!(f.locals[0].1, 0);
    assert_eq!(
        f.locals[1].1, f.locals[2].1,
        "non-overlapping ranges reuse one slot"
    );
}

#[test]
fn conditionally_skipped_write_forces_zero_init() {
    let m = compile(
        "(module (func (param i32) (result i32) (local i32)
            block
              local.get 0
              br_if 0
              i32.const 5
              local.set 1
            end
            local.get 1))",
    );
    let f = &m.functions[0];
    let first = nth(f, 0);
    assert_eq!(first.op, Op::Const32);
    assert_eq!(first.u32_field(4), 0, "prepended zero initializer");
    assert_eq!(
        first.u16_field(2),
        f.locals[1].1,
        "the initializer targets the local's final slot"
    );
    // the branch target stayed consistent after the prepend
    let br = records(&f.bytecode)
        .find(|r| r.op == Op::JumpIfTrue)
        .expect("conditional branch present");
    let target = (br.pos as i32 + br.i32_field(JUMP_OFFSET_FIELD)) as usize;
    assert!(records(&f.bytecode).any(|r| r.pos == target));
}

#[test]
fn call_tail_lays_out_params_then_results() {
    let m = compile(
        "(module
            (func $f (param i32 i64) (result i64) local.get 1)
            (func (result i64) i32.const 1 i64.const 2 call $f))",
    );
    let f = &m.functions[1];
    let call = records(&f.bytecode)
        .find(|r| r.op == Op::Call)
        .expect("call record");
    assert_eq!(call.u16_field(2), 2, "two parameter cells");
    assert_eq!(call.u16_field(4), 1, "one result cell");
    assert_eq!(call.u32_field(8), 0, "callee index");
    let cells = offsets_tail(&call, &f.bytecode);
    assert_eq!(cells, vec![0, 4, 12], "params in order, then the result");
}

#[test]
fn multi_value_results_fill_end_tail_in_order() {
    let m = compile("(module (func (result i32 i32) i32.const 1 i32.const 2))");
    let f = &m.functions[0];
    let end = records(&f.bytecode).last().expect("end record");
    assert_eq!(end.op, Op::End);
    assert_eq!(offsets_tail(&end, &f.bytecode), vec![0, 4]);
}

#[test]
fn select_record_carries_all_four_operands() {
    let m = compile(
        "(module (func (param i32 i32 i32) (result i32)
            local.get 0 local.get 1 local.get 2 select))",
    );
    let f = &m.functions[0];
    let sel = records(&f.bytecode)
        .find(|r| r.op == Op::Select)
        .expect("select record");
    assert_eq!(sel.u16_field(2), 8, "condition is the last operand pushed");
    assert_eq!((sel.u16_field(4), sel.u16_field(6)), (0, 4));
}

#[test]
fn try_catch_emits_handler_table() {
    let m = compile(
        "(module
            (tag $e (param i32))
            (func (result i32)
              try (result i32)
                i32.const 1
                throw $e
              catch $e
              end))",
    );
    let f = &m.functions[0];
    assert_eq!(f.catch_table.len(), 1);
    let entry = &f.catch_table[0];
    assert_eq!(entry.tag_index, Some(0));
    assert!(entry.try_start < entry.try_end);
    assert!(entry.try_end <= entry.catch_start);
    assert_eq!(entry.stack_size_to_restore, 4);

    let throw = records(&f.bytecode)
        .find(|r| r.op == Op::Throw)
        .expect("throw record");
    assert_eq!(throw.u32_field(4), 0, "tag index");
    assert_eq!(
        offsets_tail(&throw, &f.bytecode),
        vec![0],
        "throw data reads the retained constant's slot"
    );
}

#[test]
fn branch_to_function_depth_acts_like_return() {
    let m = compile("(module (func (result i32) i32.const 3 br 0))");
    let f = &m.functions[0];
    // the br emitted an End; the unreachable trailing End is not doubled
    assert_eq!(
        records(&f.bytecode).filter(|r| r.op == Op::End).count(),
        1
    );
}

#[test]
fn br_table_targets_resolve_to_record_boundaries() {
    let m = compile(
        "(module (func (param i32)
            block
              block
                local.get 0
                br_table 0 1 1
              end
            end))",
    );
    let f = &m.functions[0];
    let table = records(&f.bytecode)
        .find(|r| r.op == Op::BrTable)
        .expect("br_table record");
    assert_eq!(table.u32_field(4), 2, "two explicit targets");
    let starts: Vec<usize> = records(&f.bytecode).map(|r| r.pos).collect();
    for field in table.jump_target_fields() {
        let rel = i32::from_le_bytes(
            f.bytecode[field..field + 4].try_into().unwrap(),
        );
        let target = (table.pos as i32 + rel) as usize;
        assert!(
            starts.contains(&target) || target == f.bytecode.len(),
            "target {target} lands on a record"
        );
    }
}

#[test]
fn globals_and_segments_compile_initializers() {
    let m = compile(
        "(module
            (memory 1)
            (table 2 funcref)
            (global $g (mut i32) (i32.const 42))
            (func $f)
            (elem (i32.const 0) func $f)
            (data (i32.const 8) \"hi\")
            (export \"f\" (func $f))
            (start $f))",
    );
    assert_eq!(m.memories.len(), 1);
    assert_eq!(m.tables.len(), 1);
    assert_eq!(m.start, Some(0));
    assert_eq!(m.exports.len(), 1);
    assert_eq!(m.exports[0].name, "f");

    let init = m.globals[0].init.as_ref().expect("global initializer");
    assert_eq!(ops(init), vec![Op::Const32, Op::End]);
    let c = records(&init.bytecode).next().expect("const record");
    assert_eq!(c.u32_field(4), 42);

    assert_eq!(m.elements.len(), 1);
    assert!(m.elements[0].offset.is_some());
    assert_eq!(m.elements[0].items.len(), 1);

    assert_eq!(m.datas.len(), 1);
    assert_eq!(m.datas[0].data, b"hi");
    assert!(m.datas[0].offset.is_some());
}

#[test]
fn imported_functions_keep_empty_bodies_and_shift_indices() {
    let m = compile(
        "(module
            (import \"env\" \"mul\" (func $mul (param i32 i32) (result i32)))
            (func (result i32) i32.const 2 i32.const 3 call $mul))",
    );
    assert_eq!(m.functions.len(), 2);
    assert!(m.functions[0].bytecode.is_empty());
    let call = records(&m.functions[1].bytecode)
        .find(|r| r.op == Op::Call)
        .expect("call record");
    assert_eq!(call.u32_field(8), 0, "calls the imported function");
}

#[test]
fn atomics_require_the_threads_toggle() {
    let src = "(module (memory 1 1 shared)
        (func (param i32) (result i32) local.get 0 i32.atomic.load))";
    let bytes = wat::parse_str(src).expect("wat parses");

    let err = compile_module(&bytes, &Config::default()).unwrap_err();
    assert!(matches!(err, CompileError::Unsupported { ref mnemonic }
        if mnemonic == "i32.atomic.load"));

    let config = Config {
        threads: true,
        ..Config::default()
    };
    let m = compile_module(&bytes, &config).expect("compiles with threads on");
    assert!(ops(&m.functions[0]).contains(&Op::I32AtomicLoad));
}

#[test]
fn tail_calls_are_reported_unsupported() {
    let bytes =
        wat::parse_str("(module (func $f) (func (return_call $f)))").expect("wat parses");
    let err = compile_module(&bytes, &Config::default()).unwrap_err();
    assert!(matches!(err, CompileError::Unsupported { .. }));
}

#[test]
fn compilation_is_deterministic() {
    let src = "(module (func (param i32) (result i32) (local i32)
        local.get 0 i32.const 3 i32.mul local.set 1
        block local.get 1 br_if 0 i32.const 9 local.set 1 end
        local.get 1))";
    let bytes = wat::parse_str(src).expect("wat parses");
    let a = compile_module(&bytes, &Config::default()).expect("first compile");
    let b = compile_module(&bytes, &Config::default()).expect("second compile");
    assert_eq!(a.functions[0].bytecode, b.functions[0].bytecode);
    assert_eq!(
        a.functions[0].required_stack_size,
        b.functions[0].required_stack_size
    );
}

#[test]
fn operand_offsets_stay_below_the_watermark() {
    // a mix of shapes: calls, branches, memory ops, wide values
    let m = compile(
        "(module
            (memory 1)
            (func $g (param i64) (result i64) local.get 0)
            (func (param i32) (result i64) (local i64)
              local.get 0
              i32.const 8
              i32.add
              i64.load offset=16
              local.set 1
              local.get 1
              call $g))",
    );
    for f in &m.functions {
        if !f.bytecode.is_empty() {
            bytecode::validate(&f.bytecode, f.required_stack_size).expect("validates");
        }
    }
}

#[test]
fn debug_metadata_is_attached_when_dumping() {
    let config = Config {
        dump_bytecode: true,
        ..Config::default()
    };
    let m = compile_with(
        "(module (func (param i32) (result i32) (local i32)
            local.get 0 i32.const 2 i32.mul local.set 1 local.get 1))",
        &config,
    );
    let debug = m.functions[0].debug.as_ref().expect("debug tables");
    assert_eq!(debug.constants.len(), 1);
    assert!(!debug.live_ranges.is_empty());
    assert!(!bytecode::dump(&m.functions[0].bytecode).is_empty());
}
