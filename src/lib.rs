//! A decompiler for [Java Classfiles](https://docs.oracle.com/javase/specs/jvms/se21/html/jvms-4.html).
//!
//! The loader turns raw class bytes into a [`ClassFile`]; the [`decompile`] module
//! turns a loaded class back into Java source text.

#[macro_use]
extern crate bitflags;

pub mod attribute_info;
pub mod constant_info;
pub mod field_info;
pub mod method_info;

pub mod code_attribute;

pub mod decompile;
pub mod error;
pub mod parser;
pub mod types;

pub use decompile::{ClassFamily, ClassLookup, DecompileOptions, Decompiler, RenderedSource};
pub use error::{ClassFormatError, DecompileError, MethodError};
pub use parser::class_parser;
pub use types::*;

use constant_info::ConstantPool;

/// Second-stage parsing for structures whose layout depends on the constant pool.
pub trait InterpretInner {
    fn interpret_inner(&mut self, const_pool: &ConstantPool) -> Result<(), ClassFormatError>;
}

/// Loads a class file from its raw bytes.
///
/// ```rust
/// let result = classfile_decompiler::parse_class(b"this_will_be_parsed_as_classfile");
/// assert!(matches!(
///     result,
///     Err(classfile_decompiler::ClassFormatError::BadMagic(_))
/// ));
/// ```
pub fn parse_class(bytes: &[u8]) -> Result<ClassFile, ClassFormatError> {
    let (rest, mut class) = match class_parser(bytes) {
        Ok(parsed) => parsed,
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            return Err(e.into_format_error(bytes.len()))
        }
        Err(nom::Err::Incomplete(_)) => {
            return Err(ClassFormatError::Truncated {
                offset: bytes.len(),
            })
        }
    };
    if !rest.is_empty() {
        tracing::warn!(
            remaining = rest.len(),
            "not all bytes were consumed when parsing classfile"
        );
    }
    class.interpret()?;
    Ok(class)
}
