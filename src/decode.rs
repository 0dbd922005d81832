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

//! Binary decoding driver.
//!
//! Walks the module's sections with `wasmparser`, fills the result
//! assembler, and replays each function body through the emitter twice:
//! once as the preprocess pass, once for real emission. The raw input
//! stays available to the emitter so it can look one byte ahead of the
//! operator stream (the `local.set` forwarding peephole).
//!
//! Initializer expressions (global inits, segment offsets, element
//! expressions) are compiled as tiny functions by the same emitter, with
//! the preprocess pass disabled.

use wasmparser::{
    AbstractHeapType, ConstExpr, DataKind, ElementItems, ElementKind, ExternalKind, FunctionBody,
    HeapType, Operator, Parser, Payload, RefType, TypeRef, ValType,
};

use crate::emit::Emitter;
use crate::error::CompileError;
use crate::module::{
    CompiledFunction, CompiledModule, DataSegment, ElemItem, ElementSegment, ExportItem,
    ExportKind, FunctionType, Global, GlobalType, Import, ImportKind, MemoryType, ModuleAssembler,
    SegmentMode, TableType, TagType,
};
use crate::value::ValueKind;
use crate::Config;

fn perr(e: wasmparser::BinaryReaderError) -> CompileError {
    CompileError::decode(e.message().to_string(), e.offset())
}

pub(crate) fn value_kind(vt: ValType, offset: usize) -> Result<ValueKind, CompileError> {
    Ok(match vt {
        ValType::I32 => ValueKind::I32,
        ValType::I64 => ValueKind::I64,
        ValType::F32 => ValueKind::F32,
        ValType::F64 => ValueKind::F64,
        ValType::V128 => ValueKind::V128,
        ValType::Ref(r) => ref_kind(&r, offset)?,
    })
}

fn ref_kind(r: &RefType, offset: usize) -> Result<ValueKind, CompileError> {
    if r.is_func_ref() {
        Ok(ValueKind::FuncRef)
    } else if r.is_extern_ref() {
        Ok(ValueKind::ExternRef)
    } else {
        Err(CompileError::decode("unsupported reference type", offset))
    }
}

pub(crate) fn heap_ref_kind(hty: &HeapType) -> ValueKind {
    match hty {
        HeapType::Abstract {
            ty: AbstractHeapType::Extern,
            ..
        } => ValueKind::ExternRef,
        _ => ValueKind::FuncRef,
    }
}

fn table_type(t: &wasmparser::TableType, offset: usize) -> Result<TableType, CompileError> {
    Ok(TableType {
        elem: ref_kind(&t.element_type, offset)?,
        min: t.initial,
        max: t.maximum,
    })
}

fn memory_type(m: &wasmparser::MemoryType) -> MemoryType {
    MemoryType {
        min: m.initial,
        max: m.maximum,
        shared: m.shared,
    }
}

pub(crate) fn parse_module(wasm: &[u8], config: &Config) -> Result<CompiledModule, CompileError> {
    let mut asm = ModuleAssembler::default();

    for payload in Parser::new(0).parse_all(wasm) {
        match payload.map_err(perr)? {
            Payload::Version { num, .. } => asm.version = u32::from(num),
            Payload::TypeSection(reader) => {
                for ty in reader.into_iter_err_on_gc_types() {
                    let ft = ty.map_err(perr)?;
                    let params = ft
                        .params()
                        .iter()
                        .map(|&vt| value_kind(vt, 0))
                        .collect::<Result<_, _>>()?;
                    let results = ft
                        .results()
                        .iter()
                        .map(|&vt| value_kind(vt, 0))
                        .collect::<Result<_, _>>()?;
                    asm.types.push(FunctionType::new(params, results));
                }
            }
            Payload::ImportSection(reader) => {
                for import in reader {
                    let import = import.map_err(perr)?;
                    let kind = match import.ty {
                        TypeRef::Func(type_index) => {
                            asm.func_type_indices.push(type_index);
                            asm.bodies.push(CompiledFunction::imported(type_index));
                            ImportKind::Func(type_index)
                        }
                        TypeRef::Table(t) => {
                            let tt = table_type(&t, 0)?;
                            asm.tables.push(tt);
                            ImportKind::Table(tt)
                        }
                        TypeRef::Memory(m) => {
                            let mt = memory_type(&m);
                            asm.memories.push(mt);
                            ImportKind::Memory(mt)
                        }
                        TypeRef::Global(g) => {
                            let gt = GlobalType {
                                kind: value_kind(g.content_type, 0)?,
                                mutable: g.mutable,
                            };
                            asm.globals.push(Global { ty: gt, init: None });
                            ImportKind::Global(gt)
                        }
                        TypeRef::Tag(t) => {
                            let tt = TagType {
                                type_index: t.func_type_idx,
                            };
                            asm.tags.push(tt);
                            ImportKind::Tag(tt)
                        }
                        #[allow(unreachable_patterns)]
                        _ => {
                            return Err(CompileError::decode("unsupported import kind", 0));
                        }
                    };
                    asm.imports.push(Import {
                        module: import.module.to_string(),
                        field: import.name.to_string(),
                        kind,
                    });
                }
            }
            Payload::FunctionSection(reader) => {
                for type_index in reader {
                    asm.func_type_indices.push(type_index.map_err(perr)?);
                }
            }
            Payload::TableSection(reader) => {
                for table in reader {
                    let table = table.map_err(perr)?;
                    asm.tables.push(table_type(&table.ty, 0)?);
                }
            }
            Payload::MemorySection(reader) => {
                for mem in reader {
                    asm.memories.push(memory_type(&mem.map_err(perr)?));
                }
            }
            Payload::TagSection(reader) => {
                for tag in reader {
                    let tag = tag.map_err(perr)?;
                    asm.tags.push(TagType {
                        type_index: tag.func_type_idx,
                    });
                }
            }
            Payload::GlobalSection(reader) => {
                for global in reader {
                    let global = global.map_err(perr)?;
                    let ty = GlobalType {
                        kind: value_kind(global.ty.content_type, 0)?,
                        mutable: global.ty.mutable,
                    };
                    let init = compile_init_expr(&asm, config, wasm, &global.init_expr, ty.kind)?;
                    asm.globals.push(Global {
                        ty,
                        init: Some(init),
                    });
                }
            }
            Payload::ExportSection(reader) => {
                for export in reader {
                    let export = export.map_err(perr)?;
                    let kind = match export.kind {
                        ExternalKind::Func => ExportKind::Func,
                        ExternalKind::Table => ExportKind::Table,
                        ExternalKind::Memory => ExportKind::Memory,
                        ExternalKind::Global => ExportKind::Global,
                        ExternalKind::Tag => ExportKind::Tag,
                        #[allow(unreachable_patterns)]
                        _ => continue,
                    };
                    asm.exports.push(ExportItem {
                        name: export.name.to_string(),
                        kind,
                        index: export.index,
                    });
                }
            }
            Payload::StartSection { func, .. } => asm.start = Some(func),
            Payload::ElementSection(reader) => {
                for elem in reader {
                    let elem = elem.map_err(perr)?;
                    let (mode, table_index, offset) = match elem.kind {
                        ElementKind::Active {
                            table_index,
                            offset_expr,
                        } => {
                            let f = compile_init_expr(
                                &asm,
                                config,
                                wasm,
                                &offset_expr,
                                ValueKind::I32,
                            )?;
                            (SegmentMode::Active, table_index.unwrap_or(0), Some(f))
                        }
                        ElementKind::Passive => (SegmentMode::Passive, 0, None),
                        ElementKind::Declared => (SegmentMode::Declared, 0, None),
                    };
                    let (elem_kind, items) = match elem.items {
                        ElementItems::Functions(r) => {
                            let mut items = Vec::new();
                            for idx in r {
                                items.push(ElemItem::Func(idx.map_err(perr)?));
                            }
                            (ValueKind::FuncRef, items)
                        }
                        ElementItems::Expressions(rt, r) => {
                            let kind = ref_kind(&rt, 0)?;
                            let mut items = Vec::new();
                            for expr in r {
                                let expr = expr.map_err(perr)?;
                                items.push(ElemItem::Expr(compile_init_expr(
                                    &asm, config, wasm, &expr, kind,
                                )?));
                            }
                            (kind, items)
                        }
                    };
                    asm.elements.push(ElementSegment {
                        mode,
                        table_index,
                        elem_kind,
                        offset,
                        items,
                    });
                }
            }
            Payload::DataSection(reader) => {
                for data in reader {
                    let data = data.map_err(perr)?;
                    let (mode, memory_index, offset) = match data.kind {
                        DataKind::Active {
                            memory_index,
                            offset_expr,
                        } => {
                            let f = compile_init_expr(
                                &asm,
                                config,
                                wasm,
                                &offset_expr,
                                ValueKind::I32,
                            )?;
                            (SegmentMode::Active, memory_index, Some(f))
                        }
                        DataKind::Passive => (SegmentMode::Passive, 0, None),
                    };
                    asm.datas.push(DataSegment {
                        mode,
                        memory_index,
                        offset,
                        data: data.data.to_vec(),
                    });
                }
            }
            Payload::CodeSectionEntry(body) => {
                let func_index = asm.bodies.len() as u32;
                let compiled = compile_body(&asm, config, wasm, func_index, &body)?;
                asm.bodies.push(compiled);
            }
            _ => {}
        }
    }

    Ok(asm.finish())
}

fn compile_body(
    asm: &ModuleAssembler,
    config: &Config,
    wasm: &[u8],
    func_index: u32,
    body: &FunctionBody,
) -> Result<CompiledFunction, CompileError> {
    let type_index = *asm
        .func_type_indices
        .get(func_index as usize)
        .ok_or_else(|| {
            CompileError::decode("code entry without function declaration", body.range().start)
        })?;
    let ft = asm
        .types
        .get(type_index as usize)
        .ok_or_else(|| {
            CompileError::decode(
                format!("type index {type_index} out of range"),
                body.range().start,
            )
        })?
        .clone();
    let mut em = Emitter::new(asm, config, wasm, func_index, type_index, ft, false)?;

    let locals = body.get_locals_reader().map_err(perr)?;
    for decl in locals {
        let (count, vt) = decl.map_err(perr)?;
        let kind = value_kind(vt, body.range().start)?;
        for _ in 0..count {
            em.declare_local(kind)?;
        }
    }
    em.set_code_end(body.range().end);

    em.start_preprocess();
    replay(&mut em, body)?;
    em.end_preprocess()?;
    replay(&mut em, body)?;

    em.finish()
}

fn replay(em: &mut Emitter, body: &FunctionBody) -> Result<(), CompileError> {
    let mut reader = body.get_operators_reader().map_err(perr)?;
    while !reader.eof() {
        let op = reader.read().map_err(perr)?;
        let pos = reader.original_position();
        if let Some(idx) = em.take_pending_local_set() {
            // the forwarding peephole already consumed this local.set
            if matches!(op, Operator::LocalSet { local_index } if local_index == idx) {
                continue;
            }
        }
        em.handle(&op, pos)?;
    }
    Ok(())
}

fn compile_init_expr(
    asm: &ModuleAssembler,
    config: &Config,
    wasm: &[u8],
    expr: &ConstExpr,
    result: ValueKind,
) -> Result<CompiledFunction, CompileError> {
    let ft = FunctionType::new(Vec::new(), vec![result]);
    let mut em = Emitter::new(asm, config, wasm, u32::MAX, u32::MAX, ft, true)?;
    let mut reader = expr.get_operators_reader();
    while !reader.eof() {
        let op = reader.read().map_err(perr)?;
        let pos = reader.original_position();
        em.handle(&op, pos)?;
    }
    em.finish()
}
