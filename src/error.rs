use thiserror::Error;

/// Compilation failure. The emitter never partially commits: when a
/// function fails, its bytecode buffer is discarded and the error is
/// returned for the whole module.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CompileError {
    /// Malformed binary reported by the decoder.
    #[error("decode error at offset {offset}: {message}")]
    Decode { message: String, offset: usize },

    /// Structural inconsistency in a function body (unbalanced block end,
    /// stack underflow, operand kind mismatch). A validated module never
    /// produces these.
    #[error("malformed function body{}: {message}", fmt_offset(.offset))]
    Structure {
        message: String,
        offset: Option<usize>,
    },

    /// A stack offset left the representable range of the offset type.
    #[error("function stack too large in function {func_index}")]
    StackTooLarge { func_index: u32 },

    /// Opcode outside the configured feature set.
    #[error("unsupported opcode {mnemonic}")]
    Unsupported { mnemonic: String },
}

impl CompileError {
    pub fn decode(message: impl Into<String>, offset: usize) -> Self {
        CompileError::Decode {
            message: message.into(),
            offset,
        }
    }

    pub fn structure(message: impl Into<String>, offset: Option<usize>) -> Self {
        CompileError::Structure {
            message: message.into(),
            offset,
        }
    }

    pub fn unsupported(mnemonic: impl Into<String>) -> Self {
        CompileError::Unsupported {
            mnemonic: mnemonic.into(),
        }
    }
}

fn fmt_offset(offset: &Option<usize>) -> String {
    match offset {
        Some(o) => format!(" at offset {o}"),
        None => String::new(),
    }
}
