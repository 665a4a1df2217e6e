use crate::attribute_info::{AttributeInfo, AttributeInfoVariant};
use crate::constant_info::ConstantPool;
use crate::error::ClassFormatError;
use crate::InterpretInner;

#[derive(Clone, Debug, PartialEq)]
pub struct FieldInfo {
    pub access_flags: FieldAccessFlags,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes_count: u16,
    pub attributes: Vec<AttributeInfo>,
}

impl FieldInfo {
    /// Pool index of the ConstantValue attribute's value, if the field has one.
    pub fn constant_value_index(&self) -> Option<u16> {
        self.attributes.iter().find_map(|a| match &a.info_parsed {
            Some(AttributeInfoVariant::ConstantValue(c)) => Some(c.constant_value_index),
            _ => None,
        })
    }
}

impl InterpretInner for FieldInfo {
    fn interpret_inner(&mut self, const_pool: &ConstantPool) -> Result<(), ClassFormatError> {
        const_pool.check_index(self.name_index)?;
        const_pool.check_index(self.descriptor_index)?;
        for attr in &mut self.attributes {
            attr.interpret_inner(const_pool)?;
        }
        Ok(())
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct FieldAccessFlags(u16);

bitflags! {
    impl FieldAccessFlags: u16 {
        const PUBLIC = 0x0001;     // 	Declared public; may be accessed from outside its package.
        const PRIVATE = 0x0002;    // 	Declared private; usable only within the defining class.
        const PROTECTED = 0x0004;  // 	Declared protected; may be accessed within subclasses.
        const STATIC = 0x0008;     // 	Declared static.
        const FINAL = 0x0010;      // 	Declared final; never directly assigned to after object construction.
        const VOLATILE = 0x0040;   // 	Declared volatile; cannot be cached.
        const TRANSIENT = 0x0080;  // 	Declared transient; not written or read by a persistent object manager.
        const SYNTHETIC = 0x1000;  // 	Declared synthetic; not present in the source code.
        const ENUM = 0x4000;       // 	Declared as an element of an enum.
    }
}
