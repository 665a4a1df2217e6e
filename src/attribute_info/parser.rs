use nom::{
    bytes::complete::take,
    error::{ErrorKind, ParseError as _},
    multi::count,
    number::complete::{be_u16, be_u32, be_u8},
};

use crate::attribute_info::*;
use crate::code_attribute::{
    LocalVariableTableAttribute, LocalVariableTableItem, LocalVariableTypeTableAttribute,
    LocalVariableTypeTableItem,
};
use crate::error::{Err, ParseError};

pub fn attribute_parser(input: &[u8]) -> Result<(&[u8], AttributeInfo), Err> {
    let (input, attribute_name_index) = be_u16(input)?;
    let (input, attribute_length) = be_u32(input)?;
    let (input, info) = take(attribute_length)(input)?;
    Ok((
        input,
        AttributeInfo {
            attribute_name_index,
            attribute_length,
            info: info.to_owned(),
            info_parsed: None,
        },
    ))
}

pub fn exception_entry_parser(input: &[u8]) -> Result<(&[u8], ExceptionEntry), Err> {
    let (input, start_pc) = be_u16(input)?;
    let (input, end_pc) = be_u16(input)?;
    let (input, handler_pc) = be_u16(input)?;
    let (input, catch_type) = be_u16(input)?;
    Ok((
        input,
        ExceptionEntry {
            start_pc,
            end_pc,
            handler_pc,
            catch_type,
        },
    ))
}

pub fn code_attribute_parser(input: &[u8]) -> Result<(&[u8], CodeAttribute), Err> {
    let (input, max_stack) = be_u16(input)?;
    let (input, max_locals) = be_u16(input)?;
    let (input, code_length) = be_u32(input)?;
    let (input, code) = take(code_length)(input)?;
    let (input, exception_table_length) = be_u16(input)?;
    let (input, exception_table) =
        count(exception_entry_parser, exception_table_length as usize)(input)?;
    let (input, attributes_count) = be_u16(input)?;
    let (input, attributes) = count(attribute_parser, attributes_count as usize)(input)?;
    Ok((
        input,
        CodeAttribute {
            max_stack,
            max_locals,
            code_length,
            code: code.to_owned(),
            exception_table_length,
            exception_table,
            attributes_count,
            attributes,
        },
    ))
}

pub fn method_parameters_attribute_parser(
    input: &[u8],
) -> Result<(&[u8], MethodParametersAttribute), Err> {
    let (input, parameters_count) = be_u8(input)?;
    let (input, parameters) = count(parameters_parser, parameters_count as usize)(input)?;
    Ok((
        input,
        MethodParametersAttribute {
            parameters_count,
            parameters,
        },
    ))
}

pub fn parameters_parser(input: &[u8]) -> Result<(&[u8], ParameterAttribute), Err> {
    let (input, name_index) = be_u16(input)?;
    let (input, access_flags) = be_u16(input)?;
    Ok((
        input,
        ParameterAttribute {
            name_index,
            access_flags,
        },
    ))
}

pub fn inner_classes_attribute_parser(
    input: &[u8],
) -> Result<(&[u8], InnerClassesAttribute), Err> {
    let (input, number_of_classes) = be_u16(input)?;
    let (input, classes) = count(inner_class_info_parser, number_of_classes as usize)(input)?;
    Ok((
        input,
        InnerClassesAttribute {
            number_of_classes,
            classes,
        },
    ))
}

pub fn inner_class_info_parser(input: &[u8]) -> Result<(&[u8], InnerClassInfo), Err> {
    let (input, inner_class_info_index) = be_u16(input)?;
    let (input, outer_class_info_index) = be_u16(input)?;
    let (input, inner_name_index) = be_u16(input)?;
    let (input, inner_class_access_flags) = be_u16(input)?;
    Ok((
        input,
        InnerClassInfo {
            inner_class_info_index,
            outer_class_info_index,
            inner_name_index,
            inner_class_access_flags: InnerClassAccessFlags::from_bits_retain(
                inner_class_access_flags,
            ),
        },
    ))
}

pub fn enclosing_method_attribute_parser(
    input: &[u8],
) -> Result<(&[u8], EnclosingMethodAttribute), Err> {
    let (input, class_index) = be_u16(input)?;
    let (input, method_index) = be_u16(input)?;
    Ok((
        input,
        EnclosingMethodAttribute {
            class_index,
            method_index,
        },
    ))
}

pub fn signature_attribute_parser(input: &[u8]) -> Result<(&[u8], SignatureAttribute), Err> {
    let (input, signature_index) = be_u16(input)?;
    Ok((input, SignatureAttribute { signature_index }))
}

fn annotations_parser(input: &[u8]) -> Result<(&[u8], (u16, Vec<RuntimeAnnotation>)), Err> {
    let (input, num_annotations) = be_u16(input)?;
    let (input, annotations) = count(annotation_parser, num_annotations as usize)(input)?;
    Ok((input, (num_annotations, annotations)))
}

pub fn runtime_visible_annotations_attribute_parser(
    input: &[u8],
) -> Result<(&[u8], RuntimeVisibleAnnotationsAttribute), Err> {
    let (input, (num_annotations, annotations)) = annotations_parser(input)?;
    Ok((
        input,
        RuntimeVisibleAnnotationsAttribute {
            num_annotations,
            annotations,
        },
    ))
}

pub fn runtime_invisible_annotations_attribute_parser(
    input: &[u8],
) -> Result<(&[u8], RuntimeInvisibleAnnotationsAttribute), Err> {
    let (input, (num_annotations, annotations)) = annotations_parser(input)?;
    Ok((
        input,
        RuntimeInvisibleAnnotationsAttribute {
            num_annotations,
            annotations,
        },
    ))
}

fn annotation_parser(input: &[u8]) -> Result<(&[u8], RuntimeAnnotation), Err> {
    let (input, type_index) = be_u16(input)?;
    let (input, num_element_value_pairs) = be_u16(input)?;
    let (input, element_value_pairs) =
        count(element_value_pair_parser, num_element_value_pairs as usize)(input)?;
    Ok((
        input,
        RuntimeAnnotation {
            type_index,
            num_element_value_pairs,
            element_value_pairs,
        },
    ))
}

fn element_value_pair_parser(input: &[u8]) -> Result<(&[u8], ElementValuePair), Err> {
    let (input, element_name_index) = be_u16(input)?;
    let (input, value) = element_value_parser(input)?;
    Ok((
        input,
        ElementValuePair {
            element_name_index,
            value,
        },
    ))
}

fn array_value_parser(input: &[u8]) -> Result<(&[u8], ElementArrayValue), Err> {
    let (input, num_values) = be_u16(input)?;
    let (input, values) = count(element_value_parser, num_values as usize)(input)?;
    Ok((input, ElementArrayValue { num_values, values }))
}

pub fn element_value_parser(input: &[u8]) -> Result<(&[u8], ElementValue), Err> {
    let (input, tag) = be_u8(input)?;
    match tag as char {
        'B' | 'C' | 'I' | 'S' | 'Z' | 'D' | 'F' | 'J' | 's' => {
            let (input, const_value_index) = be_u16(input)?;
            Ok((
                input,
                ElementValue::ConstValueIndex {
                    tag: tag as char,
                    value: const_value_index,
                },
            ))
        }
        'e' => {
            let (input, type_name_index) = be_u16(input)?;
            let (input, const_name_index) = be_u16(input)?;
            Ok((
                input,
                ElementValue::EnumConst(EnumConstValue {
                    type_name_index,
                    const_name_index,
                }),
            ))
        }
        'c' => {
            let (input, class_info_index) = be_u16(input)?;
            Ok((input, ElementValue::ClassInfoIndex(class_info_index)))
        }
        '@' => {
            let (input, annotation_value) = annotation_parser(input)?;
            Ok((input, ElementValue::AnnotationValue(annotation_value)))
        }
        '[' => {
            let (input, array_value) = array_value_parser(input)?;
            Ok((input, ElementValue::ElementArray(array_value)))
        }
        _ => Err(nom::Err::Error(ParseError::from_error_kind(
            input,
            ErrorKind::NoneOf,
        ))),
    }
}

pub fn line_number_table_attribute_parser(
    input: &[u8],
) -> Result<(&[u8], LineNumberTableAttribute), Err> {
    let (input, line_number_table_length) = be_u16(input)?;
    let (input, line_number_table) = count(
        line_number_table_entry_parser,
        line_number_table_length as usize,
    )(input)?;
    Ok((
        input,
        LineNumberTableAttribute {
            line_number_table_length,
            line_number_table,
        },
    ))
}

pub fn line_number_table_entry_parser(
    input: &[u8],
) -> Result<(&[u8], LineNumberTableEntry), Err> {
    let (input, start_pc) = be_u16(input)?;
    let (input, line_number) = be_u16(input)?;
    Ok((
        input,
        LineNumberTableEntry {
            start_pc,
            line_number,
        },
    ))
}

fn local_variable_item_parser(input: &[u8]) -> Result<(&[u8], LocalVariableTableItem), Err> {
    let (input, start_pc) = be_u16(input)?;
    let (input, length) = be_u16(input)?;
    let (input, name_index) = be_u16(input)?;
    let (input, descriptor_index) = be_u16(input)?;
    let (input, index) = be_u16(input)?;
    Ok((
        input,
        LocalVariableTableItem {
            start_pc,
            length,
            name_index,
            descriptor_index,
            index,
        },
    ))
}

pub fn local_variable_table_parser(
    input: &[u8],
) -> Result<(&[u8], LocalVariableTableAttribute), Err> {
    let (input, local_variable_table_length) = be_u16(input)?;
    let (input, items) =
        count(local_variable_item_parser, local_variable_table_length as usize)(input)?;
    Ok((
        input,
        LocalVariableTableAttribute {
            local_variable_table_length,
            items,
        },
    ))
}

fn local_variable_type_item_parser(
    input: &[u8],
) -> Result<(&[u8], LocalVariableTypeTableItem), Err> {
    let (input, start_pc) = be_u16(input)?;
    let (input, length) = be_u16(input)?;
    let (input, name_index) = be_u16(input)?;
    let (input, signature_index) = be_u16(input)?;
    let (input, index) = be_u16(input)?;
    Ok((
        input,
        LocalVariableTypeTableItem {
            start_pc,
            length,
            name_index,
            signature_index,
            index,
        },
    ))
}

pub fn local_variable_type_table_parser(
    input: &[u8],
) -> Result<(&[u8], LocalVariableTypeTableAttribute), Err> {
    let (input, local_variable_type_table_length) = be_u16(input)?;
    let (input, local_variable_type_table) = count(
        local_variable_type_item_parser,
        local_variable_type_table_length as usize,
    )(input)?;
    Ok((
        input,
        LocalVariableTypeTableAttribute {
            local_variable_type_table_length,
            local_variable_type_table,
        },
    ))
}

pub fn exceptions_attribute_parser(input: &[u8]) -> Result<(&[u8], ExceptionsAttribute), Err> {
    let (input, exception_table_length) = be_u16(input)?;
    let (input, exception_table) = count(be_u16, exception_table_length as usize)(input)?;
    Ok((
        input,
        ExceptionsAttribute {
            exception_table_length,
            exception_table,
        },
    ))
}

pub fn constant_value_attribute_parser(
    input: &[u8],
) -> Result<(&[u8], ConstantValueAttribute), Err> {
    let (input, constant_value_index) = be_u16(input)?;
    Ok((
        input,
        ConstantValueAttribute {
            constant_value_index,
        },
    ))
}

fn bootstrap_method_parser(input: &[u8]) -> Result<(&[u8], BootstrapMethod), Err> {
    let (input, bootstrap_method_ref) = be_u16(input)?;
    let (input, num_bootstrap_arguments) = be_u16(input)?;
    let (input, bootstrap_arguments) = count(be_u16, num_bootstrap_arguments as usize)(input)?;
    Ok((
        input,
        BootstrapMethod {
            bootstrap_method_ref,
            num_bootstrap_arguments,
            bootstrap_arguments,
        },
    ))
}

pub fn bootstrap_methods_attribute_parser(
    input: &[u8],
) -> Result<(&[u8], BootstrapMethodsAttribute), Err> {
    let (input, num_bootstrap_methods) = be_u16(input)?;
    let (input, bootstrap_methods) =
        count(bootstrap_method_parser, num_bootstrap_methods as usize)(input)?;
    Ok((
        input,
        BootstrapMethodsAttribute {
            num_bootstrap_methods,
            bootstrap_methods,
        },
    ))
}

pub fn sourcefile_attribute_parser(input: &[u8]) -> Result<(&[u8], SourceFileAttribute), Err> {
    let (input, sourcefile_index) = be_u16(input)?;
    Ok((input, SourceFileAttribute { sourcefile_index }))
}
