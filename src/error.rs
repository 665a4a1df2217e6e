use nom::error::ErrorKind;
use thiserror::Error;

/// A class file that cannot be loaded at all. No output is produced for the class.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ClassFormatError {
    #[error("bad magic number {0:#010x}, expected 0xcafebabe")]
    BadMagic(u32),
    #[error("unsupported class file version {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },
    #[error("class file truncated at byte {offset}")]
    Truncated { offset: usize },
    #[error("invalid constant pool tag {tag} at index {index}")]
    InvalidConstantTag { tag: u8, index: u16 },
    #[error("constant pool index {index} out of range (pool size {size})")]
    BadConstantIndex { index: u16, size: u16 },
    #[error("constant pool entry {index} is not a {expected}")]
    UnexpectedConstant { index: u16, expected: &'static str },
    #[error("malformed {name} attribute")]
    MalformedAttribute { name: String },
}

/// A method body that could not be reconstructed. The method is rendered as a
/// disassembly listing with a failure marker instead.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum MethodError {
    #[error("operand stack underflow at offset {offset}")]
    StackUnderflow { offset: u32 },
    #[error("irreducible control flow at offset {offset}")]
    IrreducibleFlow { offset: u32 },
    #[error("complexity budget exhausted at offset {offset}")]
    BudgetExhausted { offset: u32 },
    #[error("time budget exceeded at offset {offset}")]
    Timeout { offset: u32 },
    #[error("invalid bytecode at offset {offset}: {message}")]
    InvalidBytecode { offset: u32, message: String },
    #[error("unsupported operand stack merge at offset {offset}")]
    UnsupportedStackMerge { offset: u32 },
}

impl MethodError {
    /// Byte offset where reconstruction broke down.
    pub fn offset(&self) -> u32 {
        match self {
            MethodError::StackUnderflow { offset }
            | MethodError::IrreducibleFlow { offset }
            | MethodError::BudgetExhausted { offset }
            | MethodError::Timeout { offset }
            | MethodError::InvalidBytecode { offset, .. }
            | MethodError::UnsupportedStackMerge { offset } => *offset,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DecompileError {
    #[error(transparent)]
    Format(#[from] ClassFormatError),
    #[error("method '{0}' not found")]
    MethodNotFound(String),
}

/// Error type threaded through the nom parsers of the loader.
#[derive(Clone, Debug, PartialEq)]
pub enum ParseError {
    /// A combinator failed; `remaining` is the unconsumed input length at that point.
    Nom { kind: ErrorKind, remaining: usize },
    Format(ClassFormatError),
}

impl ParseError {
    /// Converts into a [`ClassFormatError`], locating truncation relative to the full input length.
    pub fn into_format_error(self, total_len: usize) -> ClassFormatError {
        match self {
            ParseError::Nom { remaining, .. } => ClassFormatError::Truncated {
                offset: total_len.saturating_sub(remaining),
            },
            ParseError::Format(e) => e,
        }
    }
}

impl<'a> nom::error::ParseError<&'a [u8]> for ParseError {
    fn from_error_kind(input: &'a [u8], kind: ErrorKind) -> Self {
        ParseError::Nom {
            kind,
            remaining: input.len(),
        }
    }

    fn append(_input: &'a [u8], _kind: ErrorKind, other: Self) -> Self {
        other
    }
}

/// Shorthand for the nom error wrapper used by every loader parser.
pub type Err = nom::Err<ParseError>;

pub(crate) fn format_failure(error: ClassFormatError) -> Err {
    nom::Err::Failure(ParseError::Format(error))
}
