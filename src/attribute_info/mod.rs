mod parser;
mod types;

pub use self::parser::*;
pub use self::types::*;

use crate::constant_info::ConstantPool;
use crate::error::{ClassFormatError, Err};
use crate::InterpretInner;

/// Runs `parser` over the whole attribute payload; leftover bytes count as malformed.
fn parse_complete<'a, T>(
    parser: impl Fn(&'a [u8]) -> Result<(&'a [u8], T), Err>,
    info: &'a [u8],
    name: &str,
) -> Result<T, ClassFormatError> {
    match parser(info) {
        Ok((rest, value)) if rest.is_empty() => Ok(value),
        _ => Err(ClassFormatError::MalformedAttribute {
            name: name.to_string(),
        }),
    }
}

impl AttributeInfo {
    pub fn name<'a>(&self, const_pool: &'a ConstantPool) -> Option<&'a str> {
        const_pool.utf8(self.attribute_name_index)
    }
}

impl InterpretInner for AttributeInfo {
    fn interpret_inner(&mut self, const_pool: &ConstantPool) -> Result<(), ClassFormatError> {
        const_pool.check_index(self.attribute_name_index)?;
        let name = const_pool
            .utf8(self.attribute_name_index)
            .ok_or(ClassFormatError::UnexpectedConstant {
                index: self.attribute_name_index,
                expected: "Utf8",
            })?;
        let info = self.info.as_slice();
        let parsed = match name {
            "Code" => {
                let mut code = parse_complete(code_attribute_parser, info, name)?;
                code.interpret_inner(const_pool)?;
                Some(AttributeInfoVariant::Code(code))
            }
            "LineNumberTable" => Some(AttributeInfoVariant::LineNumberTable(parse_complete(
                line_number_table_attribute_parser,
                info,
                name,
            )?)),
            "LocalVariableTable" => Some(AttributeInfoVariant::LocalVariableTable(
                parse_complete(local_variable_table_parser, info, name)?,
            )),
            "LocalVariableTypeTable" => Some(AttributeInfoVariant::LocalVariableTypeTable(
                parse_complete(local_variable_type_table_parser, info, name)?,
            )),
            "Signature" => Some(AttributeInfoVariant::Signature(parse_complete(
                signature_attribute_parser,
                info,
                name,
            )?)),
            "SourceFile" => Some(AttributeInfoVariant::SourceFile(parse_complete(
                sourcefile_attribute_parser,
                info,
                name,
            )?)),
            "InnerClasses" => Some(AttributeInfoVariant::InnerClasses(parse_complete(
                inner_classes_attribute_parser,
                info,
                name,
            )?)),
            "EnclosingMethod" => Some(AttributeInfoVariant::EnclosingMethod(parse_complete(
                enclosing_method_attribute_parser,
                info,
                name,
            )?)),
            "Exceptions" => Some(AttributeInfoVariant::Exceptions(parse_complete(
                exceptions_attribute_parser,
                info,
                name,
            )?)),
            "ConstantValue" => Some(AttributeInfoVariant::ConstantValue(parse_complete(
                constant_value_attribute_parser,
                info,
                name,
            )?)),
            "RuntimeVisibleAnnotations" => Some(AttributeInfoVariant::RuntimeVisibleAnnotations(
                parse_complete(runtime_visible_annotations_attribute_parser, info, name)?,
            )),
            "RuntimeInvisibleAnnotations" => {
                Some(AttributeInfoVariant::RuntimeInvisibleAnnotations(parse_complete(
                    runtime_invisible_annotations_attribute_parser,
                    info,
                    name,
                )?))
            }
            "MethodParameters" => Some(AttributeInfoVariant::MethodParameters(parse_complete(
                method_parameters_attribute_parser,
                info,
                name,
            )?)),
            "BootstrapMethods" => Some(AttributeInfoVariant::BootstrapMethods(parse_complete(
                bootstrap_methods_attribute_parser,
                info,
                name,
            )?)),
            "Synthetic" => Some(AttributeInfoVariant::Synthetic(SyntheticAttribute {})),
            "Deprecated" => Some(AttributeInfoVariant::Deprecated(DeprecatedAttribute {})),
            _ => None,
        };
        self.info_parsed = parsed;
        Ok(())
    }
}

impl InterpretInner for CodeAttribute {
    fn interpret_inner(&mut self, const_pool: &ConstantPool) -> Result<(), ClassFormatError> {
        for entry in &self.exception_table {
            if entry.catch_type != 0 && const_pool.class_name(entry.catch_type).is_none() {
                const_pool.check_index(entry.catch_type)?;
                return Err(ClassFormatError::UnexpectedConstant {
                    index: entry.catch_type,
                    expected: "Class",
                });
            }
        }
        for attr in &mut self.attributes {
            attr.interpret_inner(const_pool)?;
        }
        Ok(())
    }
}

/// First interpreted Signature attribute in `attributes`, resolved to its text.
pub fn find_signature<'a>(
    attributes: &[AttributeInfo],
    const_pool: &'a ConstantPool,
) -> Option<&'a str> {
    attributes.iter().find_map(|a| match &a.info_parsed {
        Some(AttributeInfoVariant::Signature(s)) => const_pool.utf8(s.signature_index),
        _ => None,
    })
}

pub fn has_marker(attributes: &[AttributeInfo], const_pool: &ConstantPool, name: &str) -> bool {
    attributes.iter().any(|a| a.name(const_pool) == Some(name))
}
