use nom::{
    bytes::complete::take,
    number::complete::{be_f32, be_f64, be_i32, be_i64, be_u16, be_u8},
};

use crate::constant_info::*;
use crate::error::{format_failure, ClassFormatError, Err};

/// Decodes the JVM's modified UTF-8: `0xC0 0x80` for NUL and surrogate pairs
/// encoded as two separate three-byte sequences. Malformed sequences decode to U+FFFD.
pub fn decode_modified_utf8(bytes: &[u8]) -> String {
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b & 0x80 == 0 {
            units.push(b as u16);
            i += 1;
        } else if b & 0xE0 == 0xC0 && i + 1 < bytes.len() && bytes[i + 1] & 0xC0 == 0x80 {
            units.push((((b & 0x1F) as u16) << 6) | (bytes[i + 1] & 0x3F) as u16);
            i += 2;
        } else if b & 0xF0 == 0xE0
            && i + 2 < bytes.len()
            && bytes[i + 1] & 0xC0 == 0x80
            && bytes[i + 2] & 0xC0 == 0x80
        {
            units.push(
                (((b & 0x0F) as u16) << 12)
                    | (((bytes[i + 1] & 0x3F) as u16) << 6)
                    | (bytes[i + 2] & 0x3F) as u16,
            );
            i += 3;
        } else {
            units.push(0xFFFD);
            i += 1;
        }
    }
    String::from_utf16_lossy(&units)
}

fn const_utf8(input: &[u8]) -> Result<(&[u8], ConstantInfo), Err> {
    let (input, length) = be_u16(input)?;
    let (input, bytes) = take(length)(input)?;
    Ok((
        input,
        ConstantInfo::Utf8(Utf8Constant {
            utf8_string: decode_modified_utf8(bytes),
        }),
    ))
}

fn const_two_indices(input: &[u8]) -> Result<(&[u8], (u16, u16)), Err> {
    let (input, first) = be_u16(input)?;
    let (input, second) = be_u16(input)?;
    Ok((input, (first, second)))
}

/// Parses one constant pool entry. `index` is the 1-based slot being filled and is
/// only used for error reporting.
pub fn constant_parser(input: &[u8], index: u16) -> Result<(&[u8], ConstantInfo), Err> {
    let (input, tag) = be_u8(input)?;
    match tag {
        1 => const_utf8(input),
        3 => {
            let (input, value) = be_i32(input)?;
            Ok((input, ConstantInfo::Integer(IntegerConstant { value })))
        }
        4 => {
            let (input, value) = be_f32(input)?;
            Ok((input, ConstantInfo::Float(FloatConstant { value })))
        }
        5 => {
            let (input, value) = be_i64(input)?;
            Ok((input, ConstantInfo::Long(LongConstant { value })))
        }
        6 => {
            let (input, value) = be_f64(input)?;
            Ok((input, ConstantInfo::Double(DoubleConstant { value })))
        }
        7 => {
            let (input, name_index) = be_u16(input)?;
            Ok((input, ConstantInfo::Class(ClassConstant { name_index })))
        }
        8 => {
            let (input, string_index) = be_u16(input)?;
            Ok((input, ConstantInfo::String(StringConstant { string_index })))
        }
        9 => {
            let (input, (class_index, name_and_type_index)) = const_two_indices(input)?;
            Ok((
                input,
                ConstantInfo::FieldRef(FieldRefConstant {
                    class_index,
                    name_and_type_index,
                }),
            ))
        }
        10 => {
            let (input, (class_index, name_and_type_index)) = const_two_indices(input)?;
            Ok((
                input,
                ConstantInfo::MethodRef(MethodRefConstant {
                    class_index,
                    name_and_type_index,
                }),
            ))
        }
        11 => {
            let (input, (class_index, name_and_type_index)) = const_two_indices(input)?;
            Ok((
                input,
                ConstantInfo::InterfaceMethodRef(InterfaceMethodRefConstant {
                    class_index,
                    name_and_type_index,
                }),
            ))
        }
        12 => {
            let (input, (name_index, descriptor_index)) = const_two_indices(input)?;
            Ok((
                input,
                ConstantInfo::NameAndType(NameAndTypeConstant {
                    name_index,
                    descriptor_index,
                }),
            ))
        }
        15 => {
            let (input, reference_kind) = be_u8(input)?;
            let (input, reference_index) = be_u16(input)?;
            Ok((
                input,
                ConstantInfo::MethodHandle(MethodHandleConstant {
                    reference_kind,
                    reference_index,
                }),
            ))
        }
        16 => {
            let (input, descriptor_index) = be_u16(input)?;
            Ok((
                input,
                ConstantInfo::MethodType(MethodTypeConstant { descriptor_index }),
            ))
        }
        17 => {
            let (input, (bootstrap_method_attr_index, name_and_type_index)) =
                const_two_indices(input)?;
            Ok((
                input,
                ConstantInfo::Dynamic(DynamicConstant {
                    bootstrap_method_attr_index,
                    name_and_type_index,
                }),
            ))
        }
        18 => {
            let (input, (bootstrap_method_attr_index, name_and_type_index)) =
                const_two_indices(input)?;
            Ok((
                input,
                ConstantInfo::InvokeDynamic(InvokeDynamicConstant {
                    bootstrap_method_attr_index,
                    name_and_type_index,
                }),
            ))
        }
        19 => {
            let (input, name_index) = be_u16(input)?;
            Ok((input, ConstantInfo::Module(ModuleConstant { name_index })))
        }
        20 => {
            let (input, name_index) = be_u16(input)?;
            Ok((input, ConstantInfo::Package(PackageConstant { name_index })))
        }
        _ => Err(format_failure(ClassFormatError::InvalidConstantTag { tag, index })),
    }
}

/// Parses `const_pool_size - 1` slots. Long and Double entries are followed by an
/// [`ConstantInfo::Unusable`] placeholder so slot numbers line up with JVM indices.
pub fn const_pool_parser(input: &[u8], const_pool_size: u16) -> Result<(&[u8], ConstantPool), Err> {
    let mut entries = Vec::with_capacity(const_pool_size as usize);
    let mut input = input;
    let mut index: u16 = 1;
    while index < const_pool_size {
        let (rest, entry) = constant_parser(input, index)?;
        input = rest;
        let wide = entry.is_wide();
        entries.push(entry);
        index = index.saturating_add(1);
        if wide {
            entries.push(ConstantInfo::Unusable);
            index = index.saturating_add(1);
        }
    }
    // A wide entry in the last slot overflows the declared size.
    entries.truncate(const_pool_size.saturating_sub(1) as usize);
    Ok((input, ConstantPool::new(entries)))
}
