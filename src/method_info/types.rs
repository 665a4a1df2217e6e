use crate::attribute_info::{AttributeInfo, AttributeInfoVariant, CodeAttribute, ExceptionsAttribute};
use crate::constant_info::ConstantPool;
use crate::error::ClassFormatError;
use crate::InterpretInner;

#[derive(Clone, Debug, PartialEq)]
pub struct MethodInfo {
    pub access_flags: MethodAccessFlags,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes_count: u16,
    pub attributes: Vec<AttributeInfo>,
}

impl MethodInfo {
    /// The method's Code attribute; absent for abstract and native methods.
    pub fn code(&self) -> Option<&CodeAttribute> {
        self.attributes.iter().find_map(|a| match &a.info_parsed {
            Some(AttributeInfoVariant::Code(code)) => Some(code),
            _ => None,
        })
    }

    pub fn exceptions(&self) -> Option<&ExceptionsAttribute> {
        self.attributes.iter().find_map(|a| match &a.info_parsed {
            Some(AttributeInfoVariant::Exceptions(e)) => Some(e),
            _ => None,
        })
    }

    pub fn name<'a>(&self, const_pool: &'a ConstantPool) -> Option<&'a str> {
        const_pool.utf8(self.name_index)
    }

    pub fn descriptor<'a>(&self, const_pool: &'a ConstantPool) -> Option<&'a str> {
        const_pool.utf8(self.descriptor_index)
    }
}

impl InterpretInner for MethodInfo {
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
pub struct MethodAccessFlags(u16);

bitflags! {
    impl MethodAccessFlags: u16 {
        const PUBLIC = 0x0001;       // 	Declared public; may be accessed from outside its package.
        const PRIVATE = 0x0002;      // 	Declared private; accessible only within the defining class.
        const PROTECTED = 0x0004;    // 	Declared protected; may be accessed within subclasses.
        const STATIC = 0x0008;       // 	Declared static.
        const FINAL = 0x0010;        // 	Declared final; must not be overridden.
        const SYNCHRONIZED = 0x0020; // 	Declared synchronized; invocation is wrapped by a monitor use.
        const BRIDGE = 0x0040;       // 	A bridge method, generated by the compiler.
        const VARARGS = 0x0080;      // 	Declared with variable number of arguments.
        const NATIVE = 0x0100;       // 	Declared native; implemented in a language other than Java.
        const ABSTRACT = 0x0400;     // 	Declared abstract; no implementation is provided.
        const STRICT = 0x0800;       // 	Declared strictfp; floating-point mode is FP-strict.
        const SYNTHETIC = 0x1000;    // 	Declared synthetic; not present in the source code.
    }
}
