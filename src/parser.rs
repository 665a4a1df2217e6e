use nom::{
    multi::count,
    number::complete::{be_u16, be_u32},
};

use crate::attribute_info::attribute_parser;
use crate::constant_info::const_pool_parser;
use crate::error::{format_failure, ClassFormatError, Err};
use crate::field_info::field_parser;
use crate::method_info::method_parser;
use crate::types::{ClassAccessFlags, ClassFile};

pub const MIN_MAJOR_VERSION: u16 = 45;
pub const MAX_MAJOR_VERSION: u16 = 69;

fn magic_parser(input: &[u8]) -> Result<(&[u8], ()), Err> {
    let (input, magic) = be_u32(input)?;
    if magic != 0xCAFE_BABE {
        return Err(format_failure(ClassFormatError::BadMagic(magic)));
    }
    Ok((input, ()))
}

/// Parses the raw structure of a class file. Attributes are left uninterpreted;
/// [`crate::parse_class`] runs validation and interpretation on top of this.
pub fn class_parser(input: &[u8]) -> Result<(&[u8], ClassFile), Err> {
    let (input, _) = magic_parser(input)?;
    let (input, minor_version) = be_u16(input)?;
    let (input, major_version) = be_u16(input)?;
    if !(MIN_MAJOR_VERSION..=MAX_MAJOR_VERSION).contains(&major_version) {
        return Err(format_failure(ClassFormatError::UnsupportedVersion {
            major: major_version,
            minor: minor_version,
        }));
    }
    let (input, const_pool_size) = be_u16(input)?;
    let (input, const_pool) = const_pool_parser(input, const_pool_size)?;
    let (input, access_flags) = be_u16(input)?;
    let (input, this_class) = be_u16(input)?;
    let (input, super_class) = be_u16(input)?;
    let (input, interfaces_count) = be_u16(input)?;
    let (input, interfaces) = count(be_u16, interfaces_count as usize)(input)?;
    let (input, fields_count) = be_u16(input)?;
    let (input, fields) = count(field_parser, fields_count as usize)(input)?;
    let (input, methods_count) = be_u16(input)?;
    let (input, methods) = count(method_parser, methods_count as usize)(input)?;
    let (input, attributes_count) = be_u16(input)?;
    let (input, attributes) = count(attribute_parser, attributes_count as usize)(input)?;
    Ok((
        input,
        ClassFile {
            minor_version,
            major_version,
            const_pool_size,
            const_pool,
            access_flags: ClassAccessFlags::from_bits_retain(access_flags),
            this_class,
            super_class,
            interfaces_count,
            interfaces,
            fields_count,
            fields,
            methods_count,
            methods,
            attributes_count,
            attributes,
        },
    ))
}
