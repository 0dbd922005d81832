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

//! Bytecode front-end of the Coral WebAssembly engine.
//!
//! `compile_module` consumes a binary module and produces, per function,
//! a compact register-style bytecode stream addressed by stack byte
//! offsets, ready for a stack-offset-based interpreter. Each body is
//! parsed twice: a preprocessing pass gathers local liveness, constant
//! frequencies and branch structure; the emission pass then hoists the
//! hottest constants into a prelude, serves locals by direct reference
//! where safe, fuses `i32.eqz` into conditional branches, and finally a
//! live-range allocator compacts local and constant slots.
//!
//! Compilation is single-threaded and synchronous per module; distinct
//! modules may be compiled concurrently with separate emitter state. The
//! input is assumed to have passed validation; structural consistency is
//! still checked and reported as errors rather than trusted.

pub mod bytecode;
mod decode;
mod emit;
pub mod error;
pub mod module;
pub mod opcode;
pub mod value;

#[cfg(test)]
mod tests;

pub use error::CompileError;
pub use module::CompiledModule;

/// Compilation knobs. `Default` matches the engine's shipping
/// configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// How many constants a function may keep in fixed prelude slots.
    pub max_retained_constants: usize,
    /// Admit the threads-proposal atomic opcodes.
    pub threads: bool,
    /// Attach local-range and constant debug metadata to each function.
    pub dump_bytecode: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_retained_constants: 6,
            threads: false,
            dump_bytecode: false,
        }
    }
}

/// Compile one binary module. Ownership of the result transfers to the
/// caller in a single pass; nothing is retained by the compiler.
pub fn compile_module(wasm: &[u8], config: &Config) -> Result<CompiledModule, CompileError> {
    decode::parse_module(wasm, config)
}
