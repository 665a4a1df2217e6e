mod parser;
mod types;

pub use self::parser::*;
pub use self::types::*;

use crate::error::ClassFormatError;

/// The constant pool of one class, addressed by 1-based JVM slot numbers.
///
/// Loaded entries never change. Rewrites that need new references (e.g. replacing an
/// accessor call by a direct field access) go through the `add_*` methods, which either
/// return the slot of an identical existing entry or append a new one.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConstantPool {
    entries: Vec<ConstantInfo>,
}

impl ConstantPool {
    pub fn new(entries: Vec<ConstantInfo>) -> Self {
        ConstantPool { entries }
    }

    /// Value of the `constant_pool_count` header item: number of slots plus one.
    pub fn count(&self) -> u16 {
        (self.entries.len() + 1).min(u16::MAX as usize) as u16
    }

    pub fn entries(&self) -> &[ConstantInfo] {
        &self.entries
    }

    pub fn get(&self, index: u16) -> Option<&ConstantInfo> {
        self.entries.get((index as usize).checked_sub(1)?)
    }

    pub fn utf8(&self, index: u16) -> Option<&str> {
        match self.get(index)? {
            ConstantInfo::Utf8(u) => Some(&u.utf8_string),
            _ => None,
        }
    }

    /// Internal name (`java/lang/String`) of a Class entry.
    pub fn class_name(&self, index: u16) -> Option<&str> {
        match self.get(index)? {
            ConstantInfo::Class(c) => self.utf8(c.name_index),
            _ => None,
        }
    }

    pub fn name_and_type(&self, index: u16) -> Option<(&str, &str)> {
        match self.get(index)? {
            ConstantInfo::NameAndType(nat) => {
                Some((self.utf8(nat.name_index)?, self.utf8(nat.descriptor_index)?))
            }
            _ => None,
        }
    }

    pub fn member_ref(&self, index: u16) -> Option<MemberRef<'_>> {
        let (class_index, nat_index, is_interface) = match self.get(index)? {
            ConstantInfo::FieldRef(r) => (r.class_index, r.name_and_type_index, false),
            ConstantInfo::MethodRef(r) => (r.class_index, r.name_and_type_index, false),
            ConstantInfo::InterfaceMethodRef(r) => (r.class_index, r.name_and_type_index, true),
            _ => return None,
        };
        let (name, descriptor) = self.name_and_type(nat_index)?;
        Some(MemberRef {
            class_name: self.class_name(class_index)?,
            name,
            descriptor,
            is_interface,
        })
    }

    /// Name and descriptor of an InvokeDynamic or Dynamic entry.
    pub fn dynamic_name_and_type(&self, index: u16) -> Option<(&str, &str)> {
        match self.get(index)? {
            ConstantInfo::InvokeDynamic(d) => self.name_and_type(d.name_and_type_index),
            ConstantInfo::Dynamic(d) => self.name_and_type(d.name_and_type_index),
            _ => None,
        }
    }

    /// Checks that every cross-reference inside the pool points at an entry of the right kind.
    pub fn validate(&self) -> Result<(), ClassFormatError> {
        for entry in &self.entries {
            match entry {
                ConstantInfo::Class(c) => self.expect_utf8(c.name_index)?,
                ConstantInfo::String(s) => self.expect_utf8(s.string_index)?,
                ConstantInfo::MethodType(m) => self.expect_utf8(m.descriptor_index)?,
                ConstantInfo::Module(m) => self.expect_utf8(m.name_index)?,
                ConstantInfo::Package(p) => self.expect_utf8(p.name_index)?,
                ConstantInfo::NameAndType(nat) => {
                    self.expect_utf8(nat.name_index)?;
                    self.expect_utf8(nat.descriptor_index)?;
                }
                ConstantInfo::FieldRef(FieldRefConstant {
                    class_index,
                    name_and_type_index,
                })
                | ConstantInfo::MethodRef(MethodRefConstant {
                    class_index,
                    name_and_type_index,
                })
                | ConstantInfo::InterfaceMethodRef(InterfaceMethodRefConstant {
                    class_index,
                    name_and_type_index,
                }) => {
                    self.expect(*class_index, "Class", |e| matches!(e, ConstantInfo::Class(_)))?;
                    self.expect_name_and_type(*name_and_type_index)?;
                }
                ConstantInfo::MethodHandle(h) => {
                    self.expect(h.reference_index, "member reference", |e| {
                        matches!(
                            e,
                            ConstantInfo::FieldRef(_)
                                | ConstantInfo::MethodRef(_)
                                | ConstantInfo::InterfaceMethodRef(_)
                        )
                    })?;
                }
                ConstantInfo::Dynamic(d) => self.expect_name_and_type(d.name_and_type_index)?,
                ConstantInfo::InvokeDynamic(d) => {
                    self.expect_name_and_type(d.name_and_type_index)?
                }
                ConstantInfo::Utf8(_)
                | ConstantInfo::Integer(_)
                | ConstantInfo::Float(_)
                | ConstantInfo::Long(_)
                | ConstantInfo::Double(_)
                | ConstantInfo::Unusable => {}
            }
        }
        Ok(())
    }

    /// Fails with [`ClassFormatError::BadConstantIndex`] when `index` is outside the pool.
    pub fn check_index(&self, index: u16) -> Result<&ConstantInfo, ClassFormatError> {
        self.get(index).ok_or(ClassFormatError::BadConstantIndex {
            index,
            size: self.count(),
        })
    }

    fn expect(
        &self,
        index: u16,
        expected: &'static str,
        accept: impl Fn(&ConstantInfo) -> bool,
    ) -> Result<(), ClassFormatError> {
        if accept(self.check_index(index)?) {
            Ok(())
        } else {
            Err(ClassFormatError::UnexpectedConstant { index, expected })
        }
    }

    fn expect_utf8(&self, index: u16) -> Result<(), ClassFormatError> {
        self.expect(index, "Utf8", |e| matches!(e, ConstantInfo::Utf8(_)))
    }

    fn expect_name_and_type(&self, index: u16) -> Result<(), ClassFormatError> {
        self.expect(index, "NameAndType", |e| matches!(e, ConstantInfo::NameAndType(_)))
    }

    fn push(&mut self, entry: ConstantInfo) -> Option<u16> {
        if let Some(pos) = self.entries.iter().position(|e| *e == entry) {
            return Some(pos as u16 + 1);
        }
        // Slot numbers must stay representable as u16 and below the count limit.
        if self.entries.len() + 1 >= u16::MAX as usize {
            return None;
        }
        self.entries.push(entry);
        Some(self.entries.len() as u16)
    }

    pub fn add_utf8(&mut self, value: &str) -> Option<u16> {
        self.push(ConstantInfo::Utf8(Utf8Constant {
            utf8_string: value.to_string(),
        }))
    }

    pub fn add_class(&mut self, internal_name: &str) -> Option<u16> {
        let name_index = self.add_utf8(internal_name)?;
        self.push(ConstantInfo::Class(ClassConstant { name_index }))
    }

    pub fn add_name_and_type(&mut self, name: &str, descriptor: &str) -> Option<u16> {
        let name_index = self.add_utf8(name)?;
        let descriptor_index = self.add_utf8(descriptor)?;
        self.push(ConstantInfo::NameAndType(NameAndTypeConstant {
            name_index,
            descriptor_index,
        }))
    }

    pub fn add_field_ref(&mut self, class: &str, name: &str, descriptor: &str) -> Option<u16> {
        let class_index = self.add_class(class)?;
        let name_and_type_index = self.add_name_and_type(name, descriptor)?;
        self.push(ConstantInfo::FieldRef(FieldRefConstant {
            class_index,
            name_and_type_index,
        }))
    }

    pub fn add_method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> Option<u16> {
        let class_index = self.add_class(class)?;
        let name_and_type_index = self.add_name_and_type(name, descriptor)?;
        self.push(ConstantInfo::MethodRef(MethodRefConstant {
            class_index,
            name_and_type_index,
        }))
    }
}
