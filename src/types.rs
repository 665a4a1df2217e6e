use crate::attribute_info::{find_signature, AttributeInfo, AttributeInfoVariant};
use crate::constant_info::ConstantPool;
use crate::error::ClassFormatError;
use crate::field_info::FieldInfo;
use crate::method_info::MethodInfo;
use crate::InterpretInner;

#[derive(Clone, Debug, PartialEq)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub const_pool_size: u16,
    pub const_pool: ConstantPool,
    pub access_flags: ClassAccessFlags,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces_count: u16,
    pub interfaces: Vec<u16>,
    pub fields_count: u16,
    pub fields: Vec<FieldInfo>,
    pub methods_count: u16,
    pub methods: Vec<MethodInfo>,
    pub attributes_count: u16,
    pub attributes: Vec<AttributeInfo>,
}

impl ClassFile {
    /// Internal name of this class, e.g. `com/example/Outer$Inner`.
    pub fn this_class_name(&self) -> &str {
        self.const_pool.class_name(self.this_class).unwrap_or("")
    }

    /// Internal name of the superclass; `None` for `java/lang/Object` itself.
    pub fn super_class_name(&self) -> Option<&str> {
        if self.super_class == 0 {
            None
        } else {
            self.const_pool.class_name(self.super_class)
        }
    }

    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<&MethodInfo> {
        self.methods.iter().find(|m| {
            m.name(&self.const_pool) == Some(name)
                && m.descriptor(&self.const_pool) == Some(descriptor)
        })
    }

    pub fn find_field(&self, name: &str, descriptor: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| {
            self.const_pool.utf8(f.name_index) == Some(name)
                && self.const_pool.utf8(f.descriptor_index) == Some(descriptor)
        })
    }

    pub fn signature(&self) -> Option<&str> {
        find_signature(&self.attributes, &self.const_pool)
    }

    pub fn source_file(&self) -> Option<&str> {
        self.attributes.iter().find_map(|a| match &a.info_parsed {
            Some(AttributeInfoVariant::SourceFile(s)) => self.const_pool.utf8(s.sourcefile_index),
            _ => None,
        })
    }
}

impl ClassFile {
    /// Validates pool cross-references and interprets every known attribute.
    pub(crate) fn interpret(&mut self) -> Result<(), ClassFormatError> {
        let const_pool = &self.const_pool;
        const_pool.validate()?;
        const_pool.check_index(self.this_class)?;
        if self.super_class != 0 {
            const_pool.check_index(self.super_class)?;
        }
        for iface in &self.interfaces {
            const_pool.check_index(*iface)?;
        }
        for field in &mut self.fields {
            field.interpret_inner(const_pool)?;
        }
        for method in &mut self.methods {
            method.interpret_inner(const_pool)?;
        }
        for attr in &mut self.attributes {
            attr.interpret_inner(const_pool)?;
        }
        Ok(())
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ClassAccessFlags(u16);

bitflags! {
    impl ClassAccessFlags: u16 {
        const PUBLIC = 0x0001;     //	Declared public; may be accessed from outside its package.
        const FINAL = 0x0010;      //	Declared final; no subclasses allowed.
        const SUPER = 0x0020;      //	Treat superclass methods specially when invoked by the invokespecial instruction.
        const INTERFACE = 0x0200;  //	Is an interface, not a class.
        const ABSTRACT = 0x0400;   //	Declared abstract; must not be instantiated.
        const SYNTHETIC = 0x1000;  //	Declared synthetic; not present in the source code.
        const ANNOTATION = 0x2000; //	Declared as an annotation type.
        const ENUM = 0x4000;       //	Declared as an enum type.
        const MODULE = 0x8000;     //	Declared as a module type.
    }
}
