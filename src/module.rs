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

//! Compiled-module model: everything the runtime receives at module end.

use crate::value::{StackOffset, Val, ValueKind};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionType {
    pub params: Vec<ValueKind>,
    pub results: Vec<ValueKind>,
}

impl FunctionType {
    pub fn new(params: Vec<ValueKind>, results: Vec<ValueKind>) -> Self {
        Self { params, results }
    }

    pub fn param_stack_size(&self) -> u32 {
        self.params.iter().map(|k| k.stack_size()).sum()
    }

    pub fn result_stack_size(&self) -> u32 {
        self.results.iter().map(|k| k.stack_size()).sum()
    }

    /// Pointer-word cells the parameters occupy in a call tail array.
    pub fn param_copy_count(&self) -> u16 {
        self.params.iter().map(|k| k.copy_count() as u16).sum()
    }

    pub fn result_copy_count(&self) -> u16 {
        self.results.iter().map(|k| k.copy_count() as u16).sum()
    }
}

/// One entry of a function's try/catch table.
#[derive(Clone, Debug)]
pub struct CatchEntry {
    pub try_start: usize,
    pub try_end: usize,
    pub catch_start: usize,
    /// Operand-stack extent the handler unwinds to.
    pub stack_size_to_restore: u32,
    /// `None` is catch_all.
    pub tag_index: Option<u32>,
}

/// Observational metadata attached when bytecode dumping is enabled.
#[derive(Clone, Debug, Default)]
pub struct FunctionDebug {
    /// (slot offset, first position, last position) per tracked entity.
    pub live_ranges: Vec<(StackOffset, usize, usize)>,
    /// Retained constants and their prelude slots.
    pub constants: Vec<(Val, StackOffset)>,
}

/// A translated function body. Imported functions keep an empty buffer.
#[derive(Clone, Debug)]
pub struct CompiledFunction {
    pub type_index: u32,
    pub bytecode: Vec<u8>,
    pub required_stack_size: u32,
    /// Post-allocation layout of parameters, locals and anything the slot
    /// allocator tracked, ascending by original position.
    pub locals: Vec<(ValueKind, StackOffset)>,
    pub catch_table: Vec<CatchEntry>,
    pub debug: Option<FunctionDebug>,
}

impl CompiledFunction {
    pub fn imported(type_index: u32) -> Self {
        Self {
            type_index,
            bytecode: Vec::new(),
            required_stack_size: 0,
            locals: Vec::new(),
            catch_table: Vec::new(),
            debug: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GlobalType {
    pub kind: ValueKind,
    pub mutable: bool,
}

#[derive(Debug)]
pub struct Global {
    pub ty: GlobalType,
    /// Initializer expression compiled as a tiny function; imported
    /// globals have none.
    pub init: Option<CompiledFunction>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TableType {
    pub elem: ValueKind,
    pub min: u64,
    pub max: Option<u64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryType {
    pub min: u64,
    pub max: Option<u64>,
    pub shared: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TagType {
    pub type_index: u32,
}

#[derive(Clone, Debug)]
pub enum ImportKind {
    Func(u32),
    Table(TableType),
    Memory(MemoryType),
    Global(GlobalType),
    Tag(TagType),
}

#[derive(Clone, Debug)]
pub struct Import {
    pub module: String,
    pub field: String,
    pub kind: ImportKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportKind {
    Func,
    Table,
    Memory,
    Global,
    Tag,
}

#[derive(Clone, Debug)]
pub struct ExportItem {
    pub name: String,
    pub kind: ExportKind,
    pub index: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SegmentMode {
    Active,
    Passive,
    Declared,
}

#[derive(Debug)]
pub enum ElemItem {
    Func(u32),
    /// Non-trivial element expression, compiled like an initializer.
    Expr(CompiledFunction),
}

#[derive(Debug)]
pub struct ElementSegment {
    pub mode: SegmentMode,
    pub table_index: u32,
    pub elem_kind: ValueKind,
    pub offset: Option<CompiledFunction>,
    pub items: Vec<ElemItem>,
}

#[derive(Debug)]
pub struct DataSegment {
    pub mode: SegmentMode,
    pub memory_index: u32,
    pub offset: Option<CompiledFunction>,
    pub data: Vec<u8>,
}

/// The front-end's output for one module. Ownership transfers to the
/// runtime in a single pass at module end.
#[derive(Debug, Default)]
pub struct CompiledModule {
    pub version: u32,
    pub types: Vec<FunctionType>,
    pub imports: Vec<Import>,
    /// All functions in index order, imports first (with empty bodies).
    pub functions: Vec<CompiledFunction>,
    pub globals: Vec<Global>,
    pub tables: Vec<TableType>,
    pub memories: Vec<MemoryType>,
    pub tags: Vec<TagType>,
    pub exports: Vec<ExportItem>,
    pub elements: Vec<ElementSegment>,
    pub datas: Vec<DataSegment>,
    pub start: Option<u32>,
}

/// Section-level accumulator fed by the binary decoder. Holds everything
/// the per-function emitter needs to read (types, signatures of call
/// targets, global/table/tag types) while bodies are still being
/// compiled; `finish` hands the aggregate to the runtime.
#[derive(Default)]
pub(crate) struct ModuleAssembler {
    pub version: u32,
    pub types: Vec<FunctionType>,
    pub imports: Vec<Import>,
    /// Type index per function, imports first.
    pub func_type_indices: Vec<u32>,
    pub bodies: Vec<CompiledFunction>,
    pub globals: Vec<Global>,
    pub tables: Vec<TableType>,
    pub memories: Vec<MemoryType>,
    pub tags: Vec<TagType>,
    pub exports: Vec<ExportItem>,
    pub elements: Vec<ElementSegment>,
    pub datas: Vec<DataSegment>,
    pub start: Option<u32>,
}

impl ModuleAssembler {
    pub fn sig(&self, type_index: u32) -> &FunctionType {
        &self.types[type_index as usize]
    }

    pub fn finish(self) -> CompiledModule {
        CompiledModule {
            version: self.version,
            types: self.types,
            imports: self.imports,
            functions: self.bodies,
            globals: self.globals,
            tables: self.tables,
            memories: self.memories,
            tags: self.tags,
            exports: self.exports,
            elements: self.elements,
            datas: self.datas,
            start: self.start,
        }
    }
}
